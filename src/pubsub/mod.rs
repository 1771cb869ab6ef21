//! Redis-backed pub/sub with durable per-topic queues.
//!
//! Topics are Redis lists under `pubsub:topic:<topic>`: publishing is a
//! batched `RPUSH` guarded by a queue-depth check, and each subscription
//! runs a two-stage pipeline — one blocking-pop puller feeding a bounded
//! in-process channel, and a pool of typed workers decoding the JSON
//! envelope and invoking the handler.
//!
//! Delivery is at-least-once when a handler panics without recovery (the
//! message was already popped); with recovery it is one attempt then drop.
//! There are no acknowledgements — durability is traded for throughput.
//!
//! ## Example Usage
//! ```no_run
//! use tragopan::pubsub::Broker;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = redis::Client::open("redis://127.0.0.1/").unwrap();
//!     let broker = Broker::new(client);
//!
//!     let sub = broker
//!         .subscribe("greetings", |name: String| async move {
//!             println!("hello, {name}");
//!         })
//!         .unwrap();
//!     sub.start();
//!
//!     broker.publish("greetings", ("world".to_string(),)).await.unwrap();
//!     broker.close().await;
//! }
//! ```

mod handler;

pub use handler::{Handler, HandlerArgs, PublishArgs};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use redis::{AsyncCommands, Client};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::error::PubSubError;
use handler::{dispatch_envelope, BoxFuture, DecodeError};

const KEY_PREFIX: &str = "pubsub:topic:";
const BLPOP_TIMEOUT_SECS: f64 = 1.0;
const DEFAULT_QUEUE_SIZE: i64 = 1000;
const DATA_CHANNEL_CAPACITY: usize = 100;
const STOP_TIMEOUT: Duration = Duration::from_secs(10);
const PULL_RETRY_DELAY: Duration = Duration::from_secs(1);

fn topic_key(topic: &str) -> String {
  format!("{KEY_PREFIX}{topic}")
}

type Dispatcher = Box<dyn Fn(&[u8]) -> Result<BoxFuture, DecodeError> + Send + Sync>;

/// Per-subscription tuning.
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
  /// Parallel workers; zero is normalized to one.
  pub workers: usize,
  /// Contain handler panics; `None` inherits the broker default.
  pub recovery: Option<bool>,
}

impl Default for SubscribeOptions {
  fn default() -> SubscribeOptions {
    SubscribeOptions {
      workers: 1,
      recovery: None,
    }
  }
}

struct Shared {
  closed_tx: watch::Sender<bool>,
  subscriptions: StdMutex<HashMap<String, Vec<Subscription>>>,
}

/// The process-wide broker: publish side plus the subscription registry.
#[derive(Clone)]
pub struct Broker {
  client: Client,
  queue_size: i64,
  recovery: bool,
  shared: Arc<Shared>,
}

impl Broker {
  pub fn new(client: Client) -> Broker {
    let (closed_tx, _) = watch::channel(false);
    Broker {
      client,
      queue_size: DEFAULT_QUEUE_SIZE,
      recovery: false,
      shared: Arc::new(Shared {
        closed_tx,
        subscriptions: StdMutex::new(HashMap::new()),
      }),
    }
  }

  /// Cap on queued messages per topic; zero disables the check.
  pub fn with_queue_size(mut self, queue_size: i64) -> Broker {
    self.queue_size = queue_size.max(0);
    self
  }

  /// Default panic containment for all subscriptions.
  pub fn with_recovery(mut self, recovery: bool) -> Broker {
    self.recovery = recovery;
    self
  }

  fn is_closed(&self) -> bool {
    *self.shared.closed_tx.borrow()
  }

  /// Publish one message: `args` encodes to a JSON array matching the
  /// subscriber handler's arity, e.g. `("hello".to_string(), 7u64)`.
  pub async fn publish<A: PublishArgs>(&self, topic: &str, args: A) -> Result<(), PubSubError> {
    self.publish_payloads(topic, vec![args.encode()?]).await
  }

  /// Publish a batch of distinct messages in one atomic push. The
  /// queue-depth check covers the whole batch: all or nothing.
  pub async fn publish_batch<A: PublishArgs>(
    &self,
    topic: &str,
    batch: &[A],
  ) -> Result<(), PubSubError> {
    if batch.is_empty() {
      return Ok(());
    }
    let payloads = batch
      .iter()
      .map(|args| args.encode())
      .collect::<Result<Vec<_>, _>>()?;
    self.publish_payloads(topic, payloads).await
  }

  async fn publish_payloads(
    &self,
    topic: &str,
    payloads: Vec<Vec<u8>>,
  ) -> Result<(), PubSubError> {
    if self.is_closed() {
      tracing::error!(topic, "cannot publish on closed broker");
      return Err(PubSubError::BrokerClosed);
    }

    let key = topic_key(topic);
    let mut conn = self.client.get_multiplexed_tokio_connection().await?;

    if self.queue_size > 0 {
      let length: i64 = conn.llen(&key).await?;
      if length + payloads.len() as i64 > self.queue_size {
        tracing::warn!(
          topic,
          current_length = length,
          batch_size = payloads.len(),
          queue_size = self.queue_size,
          "publish would exceed queue size"
        );
        return Err(PubSubError::QueueFull(topic.to_string()));
      }
    }

    let count = payloads.len();
    let _: () = conn.rpush(&key, payloads).await?;
    tracing::trace!(topic, batch_size = count, "messages published");
    Ok(())
  }

  /// Bind a typed handler to a topic with default options.
  pub fn subscribe<A, H>(&self, topic: &str, handler: H) -> Result<Subscription, PubSubError>
  where
    A: HandlerArgs,
    H: Handler<A>,
  {
    self.subscribe_with(topic, handler, SubscribeOptions::default())
  }

  /// Bind a typed handler to a topic. The handler's argument tuple fixes
  /// the envelope schema. Workers do not run until
  /// [`Subscription::start`].
  pub fn subscribe_with<A, H>(
    &self,
    topic: &str,
    handler: H,
    options: SubscribeOptions,
  ) -> Result<Subscription, PubSubError>
  where
    A: HandlerArgs,
    H: Handler<A>,
  {
    if self.is_closed() {
      tracing::error!(topic, "cannot subscribe on closed broker");
      return Err(PubSubError::BrokerClosed);
    }

    let workers = options.workers.max(1);
    let recovery = options.recovery.unwrap_or(self.recovery);
    let handler = Arc::new(handler);
    let dispatcher: Dispatcher =
      Box::new(move |payload| dispatch_envelope::<A, H>(handler.as_ref(), payload));

    let (data_tx, data_rx) = mpsc::channel(DATA_CHANNEL_CAPACITY);
    let (stop_tx, _) = watch::channel(false);

    let subscription = Subscription {
      inner: Arc::new(SubscriptionInner {
        topic: topic.to_string(),
        redis_key: topic_key(topic),
        client: self.client.clone(),
        dispatcher,
        workers,
        recovery,
        data_tx,
        data_rx: Mutex::new(data_rx),
        stop_tx,
        closed_rx: self.shared.closed_tx.subscribe(),
        processing: RwLock::new(()),
        tasks: StdMutex::new(Vec::new()),
        started: AtomicBool::new(false),
        stopped: AtomicBool::new(false),
        shared: Arc::downgrade(&self.shared),
      }),
    };

    self
      .shared
      .subscriptions
      .lock()
      .expect("broker subscription map poisoned")
      .entry(topic.to_string())
      .or_default()
      .push(subscription.clone());

    tracing::trace!(topic, workers, recovery, "subscription created");
    Ok(subscription)
  }

  /// Close the broker: no further publishes or subscriptions, and every
  /// live subscription is stopped and drained. Idempotent.
  pub async fn close(&self) {
    if self.shared.closed_tx.send_replace(true) {
      tracing::warn!("broker already closed");
      return;
    }
    tracing::info!("broker closing");

    let all: Vec<Subscription> = {
      let mut subs = self
        .shared
        .subscriptions
        .lock()
        .expect("broker subscription map poisoned");
      subs.drain().flat_map(|(_, list)| list).collect()
    };

    for sub in all {
      if let Err(e) = sub.stop().await {
        tracing::debug!(topic = %sub.topic(), error = %e, "subscription already stopped");
      }
    }
    tracing::info!("broker closed");
  }
}

struct SubscriptionInner {
  topic: String,
  redis_key: String,
  client: Client,
  dispatcher: Dispatcher,
  workers: usize,
  recovery: bool,
  data_tx: mpsc::Sender<Vec<u8>>,
  data_rx: Mutex<mpsc::Receiver<Vec<u8>>>,
  stop_tx: watch::Sender<bool>,
  closed_rx: watch::Receiver<bool>,
  /// Dispatch latch: workers hold it shared around each handler call,
  /// stop takes it exclusively once so the last dispatch finishes first.
  processing: RwLock<()>,
  tasks: StdMutex<Vec<JoinHandle<()>>>,
  started: AtomicBool,
  stopped: AtomicBool,
  shared: Weak<Shared>,
}

/// Handle to one topic subscription; cheap to clone. The broker keeps a
/// copy in its registry until [`Subscription::stop`] or broker close.
#[derive(Clone)]
pub struct Subscription {
  inner: Arc<SubscriptionInner>,
}

impl Subscription {
  pub fn topic(&self) -> &str {
    &self.inner.topic
  }

  /// Spawn the puller and worker tasks. Calling twice, or after a stop,
  /// is a no-op.
  pub fn start(&self) {
    if self.inner.stopped.load(Ordering::SeqCst) || self.inner.started.swap(true, Ordering::SeqCst)
    {
      return;
    }
    let mut tasks = self.inner.tasks.lock().expect("subscription task list poisoned");
    tasks.push(tokio::spawn(puller(self.inner.clone())));
    for worker_id in 0..self.inner.workers {
      tasks.push(tokio::spawn(worker(self.inner.clone(), worker_id)));
    }
    tracing::info!(topic = %self.inner.topic, workers = self.inner.workers, "subscription started");
  }

  /// Stop the subscription: unregister from the broker, let any in-flight
  /// dispatch finish, then drain the puller and workers for up to ten
  /// seconds. A second stop returns [`PubSubError::SubscriptionClosed`].
  pub async fn stop(&self) -> Result<(), PubSubError> {
    if self.inner.stopped.swap(true, Ordering::SeqCst) {
      tracing::warn!(topic = %self.inner.topic, "subscription already stopped");
      return Err(PubSubError::SubscriptionClosed);
    }

    if let Some(shared) = self.inner.shared.upgrade() {
      let mut subs = shared
        .subscriptions
        .lock()
        .expect("broker subscription map poisoned");
      if let Some(list) = subs.get_mut(&self.inner.topic) {
        list.retain(|s| !Arc::ptr_eq(&s.inner, &self.inner));
        if list.is_empty() {
          subs.remove(&self.inner.topic);
        }
      }
    }

    // Exclusive latch: an in-flight dispatch completes before the stop
    // signal lands; dispatches racing in behind us re-check the signal.
    {
      let _latch = self.inner.processing.write().await;
      self.inner.stop_tx.send_replace(true);
    }
    tracing::info!(topic = %self.inner.topic, "subscription stopping");

    let tasks: Vec<JoinHandle<()>> = self
      .inner
      .tasks
      .lock()
      .expect("subscription task list poisoned")
      .drain(..)
      .collect();
    if !tasks.is_empty()
      && tokio::time::timeout(STOP_TIMEOUT, futures::future::join_all(tasks))
        .await
        .is_err()
    {
      tracing::error!(topic = %self.inner.topic, "stop timed out waiting for tasks");
    }
    Ok(())
  }
}

/// The blocking-pop stage: move raw payloads from the topic list into the
/// in-process channel until told to stop.
async fn puller(inner: Arc<SubscriptionInner>) {
  let mut stop_rx = inner.stop_tx.subscribe();
  let mut closed_rx = inner.closed_rx.clone();
  tracing::trace!(topic = %inner.topic, "puller started");

  'reconnect: loop {
    if *stop_rx.borrow() || *closed_rx.borrow() {
      break;
    }
    let mut conn = match inner.client.get_multiplexed_tokio_connection().await {
      Ok(conn) => conn,
      Err(e) => {
        tracing::error!(topic = %inner.topic, error = %e, "puller connection failed");
        tokio::select! {
          _ = tokio::time::sleep(PULL_RETRY_DELAY) => continue 'reconnect,
          _ = stop_rx.changed() => break 'reconnect,
          _ = closed_rx.changed() => break 'reconnect,
        }
      }
    };

    loop {
      if *stop_rx.borrow() || *closed_rx.borrow() {
        break 'reconnect;
      }
      let popped: redis::RedisResult<Option<(String, Vec<u8>)>> = tokio::select! {
        res = conn.blpop::<_, Option<(String, Vec<u8>)>>(&inner.redis_key, BLPOP_TIMEOUT_SECS) => res,
        _ = stop_rx.changed() => break 'reconnect,
        _ = closed_rx.changed() => break 'reconnect,
      };

      match popped {
        Ok(Some((_key, payload))) => {
          tracing::trace!(topic = %inner.topic, bytes = payload.len(), "message pulled");
          tokio::select! {
            sent = inner.data_tx.send(payload) => {
              if sent.is_err() {
                break 'reconnect;
              }
            }
            _ = stop_rx.changed() => {
              tracing::warn!(topic = %inner.topic, "puller stopping, discarding message");
              break 'reconnect;
            }
            _ = closed_rx.changed() => {
              tracing::warn!(topic = %inner.topic, "broker closed, discarding message");
              break 'reconnect;
            }
          }
        }
        // Pop timed out with nothing queued; go around and re-check stop.
        Ok(None) => continue,
        Err(e) => {
          tracing::error!(topic = %inner.topic, error = %e, "blocking pop failed");
          tokio::select! {
            _ = tokio::time::sleep(PULL_RETRY_DELAY) => continue 'reconnect,
            _ = stop_rx.changed() => break 'reconnect,
            _ = closed_rx.changed() => break 'reconnect,
          }
        }
      }
    }
  }
  tracing::trace!(topic = %inner.topic, "puller stopped");
}

/// One worker: decode envelopes off the channel and run the handler.
async fn worker(inner: Arc<SubscriptionInner>, worker_id: usize) {
  let mut stop_rx = inner.stop_tx.subscribe();
  let mut closed_rx = inner.closed_rx.clone();
  tracing::trace!(topic = %inner.topic, worker_id, "worker started");

  loop {
    if *stop_rx.borrow() || *closed_rx.borrow() {
      break;
    }
    let payload = tokio::select! {
      msg = async { inner.data_rx.lock().await.recv().await } => {
        match msg {
          Some(payload) => payload,
          None => break,
        }
      }
      _ = stop_rx.changed() => break,
      _ = closed_rx.changed() => break,
    };
    process(&inner, worker_id, payload, &stop_rx).await;
  }
  tracing::trace!(topic = %inner.topic, worker_id, "worker stopped");
}

async fn process(
  inner: &SubscriptionInner,
  worker_id: usize,
  payload: Vec<u8>,
  stop_rx: &watch::Receiver<bool>,
) {
  let _guard = inner.processing.read().await;
  // The latch may have been held by a stop that just completed; nothing
  // new starts after the signal.
  if *stop_rx.borrow() {
    tracing::warn!(topic = %inner.topic, worker_id, "dispatch aborted, subscription stopping");
    return;
  }

  let fut = match (inner.dispatcher)(&payload) {
    Ok(fut) => fut,
    Err(e) => {
      tracing::error!(
        topic = %inner.topic,
        worker_id,
        payload = %String::from_utf8_lossy(&payload),
        error = %e,
        "dropping undecodable message"
      );
      return;
    }
  };

  if inner.recovery {
    // Spawning isolates a panicking handler; the join error carries it.
    if let Err(e) = tokio::spawn(fut).await {
      if e.is_panic() {
        tracing::error!(topic = %inner.topic, worker_id, "recovered panic in handler");
      }
    }
  } else {
    fut.await;
  }
}
