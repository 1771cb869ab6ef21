//! Heartbeat registrar: keeps this node's presence entry alive with a
//! leased key, and removes it on shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use redis::{AsyncCommands, Client};
use tokio::sync::oneshot;

use crate::error::RegistryError;
use crate::node::NodeInfo;

#[derive(Debug, Clone)]
pub struct RegistryOptions {
  /// Lease on the presence key; must exceed the heartbeat period.
  pub ttl: Duration,
  pub heartbeat: Duration,
}

impl Default for RegistryOptions {
  fn default() -> RegistryOptions {
    RegistryOptions {
      ttl: Duration::from_secs(10),
      heartbeat: Duration::from_secs(3),
    }
  }
}

/// Periodically re-publishes the node's presence record. One background
/// task per registry; `close` signals it to delete the key and exit.
pub struct Registry {
  client: Client,
  node: NodeInfo,
  options: RegistryOptions,
  closed: Arc<AtomicBool>,
  stop_tx: Option<oneshot::Sender<()>>,
}

impl Registry {
  pub fn new(client: Client, node: NodeInfo) -> Registry {
    Registry::with_options(client, node, RegistryOptions::default())
  }

  pub fn with_options(client: Client, node: NodeInfo, options: RegistryOptions) -> Registry {
    Registry {
      client,
      node,
      options,
      closed: Arc::new(AtomicBool::new(false)),
      stop_tx: None,
    }
  }

  /// Start the heartbeat task. The lease outlives a missed beat or two;
  /// a TTL at or below the heartbeat period would flap and is rejected.
  pub fn register(&mut self) -> Result<(), RegistryError> {
    if self.options.ttl <= self.options.heartbeat {
      return Err(RegistryError::InvalidConfig);
    }

    let client = self.client.clone();
    let key = self.node.key();
    let value = self.node.value();
    let ttl = self.options.ttl;
    let heartbeat = self.options.heartbeat;
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    self.stop_tx = Some(stop_tx);

    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(heartbeat);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        tokio::select! {
          _ = ticker.tick() => {
            match client.get_multiplexed_tokio_connection().await {
              Ok(mut conn) => {
                let result: redis::RedisResult<()> =
                  conn.set_ex(&key, &value, ttl.as_secs()).await;
                if let Err(e) = result {
                  tracing::error!(key = %key, error = %e, "presence heartbeat failed");
                }
              }
              Err(e) => tracing::error!(key = %key, error = %e, "presence connection failed"),
            }
          }
          _ = &mut stop_rx => {
            if let Ok(mut conn) = client.get_multiplexed_tokio_connection().await {
              let _: redis::RedisResult<()> = conn.del(&key).await;
            }
            tracing::info!(key = %key, "presence entry removed");
            return;
          }
        }
      }
    });
    Ok(())
  }

  /// Signal the heartbeat task to deregister and exit. Idempotent.
  pub fn close(&mut self) {
    if self
      .closed
      .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
      .is_ok()
    {
      if let Some(tx) = self.stop_tx.take() {
        let _ = tx.send(());
      }
    }
  }
}

impl Drop for Registry {
  fn drop(&mut self) {
    self.close();
  }
}
