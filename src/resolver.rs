//! Service discovery: scan the registry for a service's presence entries,
//! filter endpoints, and feed address updates into a pluggable
//! load-balancer client.

use std::collections::HashSet;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use tokio::sync::{mpsc, oneshot};

use crate::error::ResolveError;
use crate::node::NodeInfo;

const WATCH_INTERVAL: Duration = Duration::from_secs(2);

/// A resolved service address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
  /// `host:port`.
  pub addr: String,
  /// Node id of the presence entry this endpoint came from.
  pub id: String,
  pub server_name: String,
}

/// An allow-listed network in CIDR form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
  addr: IpAddr,
  prefix: u8,
}

impl Subnet {
  pub fn new(addr: IpAddr, prefix: u8) -> Subnet {
    Subnet { addr, prefix }
  }

  pub fn contains(&self, ip: IpAddr) -> bool {
    match (self.addr, ip) {
      (IpAddr::V4(net), IpAddr::V4(ip)) => {
        let bits = 32 - u32::from(self.prefix.min(32));
        let mask = u32::MAX.checked_shl(bits).unwrap_or(0);
        u32::from(net) & mask == u32::from(ip) & mask
      }
      (IpAddr::V6(net), IpAddr::V6(ip)) => {
        let bits = 128 - u32::from(self.prefix.min(128));
        let mask = u128::MAX.checked_shl(bits).unwrap_or(0);
        u128::from(net) & mask == u128::from(ip) & mask
      }
      _ => false,
    }
  }
}

impl FromStr for Subnet {
  type Err = String;

  fn from_str(s: &str) -> Result<Subnet, String> {
    let (addr, prefix) = s.split_once('/').ok_or_else(|| format!("missing '/': {s}"))?;
    let addr: IpAddr = addr.parse().map_err(|e| format!("bad address in {s}: {e}"))?;
    let prefix: u8 = prefix.parse().map_err(|e| format!("bad prefix in {s}: {e}"))?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    if prefix > max {
      return Err(format!("prefix /{prefix} out of range for {addr}"));
    }
    Ok(Subnet { addr, prefix })
  }
}

/// Pure resolver: one scan of the registry for a named service.
#[derive(Clone)]
pub struct Resolver {
  client: Client,
  service: String,
  scheme: String,
  allow: Vec<Subnet>,
}

impl Resolver {
  pub fn new(client: Client, service: impl Into<String>) -> Resolver {
    Resolver {
      client,
      service: service.into(),
      scheme: "grpc".to_string(),
      allow: Vec::new(),
    }
  }

  pub fn with_scheme(mut self, scheme: impl Into<String>) -> Resolver {
    self.scheme = scheme.into();
    self
  }

  /// Restrict endpoints to these subnets; an empty list allows all.
  pub fn with_allowed(mut self, allow: Vec<Subnet>) -> Resolver {
    self.allow = allow;
    self
  }

  fn allowed(&self, ip: IpAddr) -> bool {
    self.allow.is_empty() || self.allow.iter().any(|net| net.contains(ip))
  }

  /// Scan `services:<name>:*`, parse each presence record, and collect
  /// the endpoints that pass the scheme and subnet filters.
  pub async fn resolve(&self) -> Result<Vec<Address>, ResolveError> {
    let mut conn = self.client.get_multiplexed_tokio_connection().await?;
    let keys: Vec<String> = conn.keys(NodeInfo::service_pattern(&self.service)).await?;
    if keys.is_empty() {
      return Ok(Vec::new());
    }

    // MGET wants at least one key and hands back positional options.
    let values: Vec<Option<String>> = conn.mget(&keys).await?;

    let mut addrs = Vec::new();
    for value in values.into_iter().flatten() {
      let node: NodeInfo = match serde_json::from_str(&value) {
        Ok(node) => node,
        Err(e) => {
          tracing::warn!(service = %self.service, error = %e, "skipping unparseable presence entry");
          continue;
        }
      };

      for endpoint in &node.endpoints {
        if endpoint.scheme() != self.scheme {
          continue;
        }
        let (host, port) = match (endpoint.host_str(), endpoint.port()) {
          (Some(host), Some(port)) => (host, port),
          _ => continue,
        };
        let ip: IpAddr = match host.parse() {
          Ok(ip) => ip,
          Err(_) => continue,
        };
        if !self.allowed(ip) {
          continue;
        }
        addrs.push(Address {
          addr: format!("{host}:{port}"),
          id: node.id.clone(),
          server_name: self.service.clone(),
        });
      }
    }
    Ok(addrs)
  }
}

/// Receiving side of address updates; implemented by the load-balancer
/// integration.
#[async_trait]
pub trait LbClient: Send + Sync {
  async fn update_addresses(&self, addrs: Vec<Address>);
  async fn report_error(&self, error: String);
}

/// Drives a [`Resolver`] on a ticker plus an on-demand signal, pushing
/// each result into the client. Resolve failures are reported and the
/// watcher keeps running until [`Watcher::close`].
pub struct Watcher {
  resolve_tx: mpsc::Sender<()>,
  closed: Arc<AtomicBool>,
  stop_tx: Option<oneshot::Sender<()>>,
}

impl Watcher {
  pub fn new(resolver: Resolver, client: Arc<dyn LbClient>) -> Watcher {
    let (resolve_tx, mut resolve_rx) = mpsc::channel::<()>(1);
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(WATCH_INTERVAL);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        let force = tokio::select! {
          _ = ticker.tick() => false,
          signal = resolve_rx.recv() => {
            match signal {
              Some(()) => true,
              None => return,
            }
          }
          _ = &mut stop_rx => return,
        };

        match resolver.resolve().await {
          Ok(addrs) => {
            let addrs = dedup(addrs);
            if addrs.is_empty() && !force {
              client
                .report_error(format!("no live endpoints for service '{}'", resolver.service))
                .await;
              continue;
            }
            client.update_addresses(addrs).await;
          }
          Err(e) => {
            tracing::warn!(service = %resolver.service, error = %e, "resolve failed");
            client.report_error(e.to_string()).await;
          }
        }
      }
    });

    Watcher {
      resolve_tx,
      closed: Arc::new(AtomicBool::new(false)),
      stop_tx: Some(stop_tx),
    }
  }

  /// Ask the watcher to re-resolve immediately, pushing even an empty
  /// address list.
  pub fn resolve_now(&self) {
    let _ = self.resolve_tx.try_send(());
  }

  /// Stop the watcher task. Idempotent.
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

impl Drop for Watcher {
  fn drop(&mut self) {
    self.close();
  }
}

fn dedup(addrs: Vec<Address>) -> Vec<Address> {
  let mut seen = HashSet::new();
  addrs
    .into_iter()
    .filter(|a| seen.insert(a.addr.clone()))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::sync::Mutex;

  #[test]
  fn subnet_parsing_and_membership() {
    let net: Subnet = "10.0.0.0/8".parse().unwrap();
    assert!(net.contains("10.1.2.3".parse().unwrap()));
    assert!(!net.contains("11.0.0.1".parse().unwrap()));

    let host: Subnet = "192.168.1.5/32".parse().unwrap();
    assert!(host.contains("192.168.1.5".parse().unwrap()));
    assert!(!host.contains("192.168.1.6".parse().unwrap()));

    let all: Subnet = "0.0.0.0/0".parse().unwrap();
    assert!(all.contains("203.0.113.9".parse().unwrap()));

    let v6: Subnet = "fd00::/8".parse().unwrap();
    assert!(v6.contains("fd12::1".parse().unwrap()));
    assert!(!v6.contains("fe80::1".parse().unwrap()));
    // Families never mix.
    assert!(!v6.contains("10.0.0.1".parse().unwrap()));

    assert!("10.0.0.0".parse::<Subnet>().is_err());
    assert!("10.0.0.0/40".parse::<Subnet>().is_err());
  }

  #[test]
  fn dedup_keeps_first_occurrence() {
    let addr = |addr: &str, id: &str| Address {
      addr: addr.to_string(),
      id: id.to_string(),
      server_name: "svc".to_string(),
    };
    let out = dedup(vec![
      addr("10.0.0.1:7000", "a"),
      addr("10.0.0.2:7000", "b"),
      addr("10.0.0.1:7000", "c"),
    ]);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].id, "a");
  }

  struct RecordingClient {
    updates: Mutex<Vec<Vec<Address>>>,
    errors: Mutex<Vec<String>>,
  }

  #[async_trait]
  impl LbClient for RecordingClient {
    async fn update_addresses(&self, addrs: Vec<Address>) {
      self.updates.lock().await.push(addrs);
    }

    async fn report_error(&self, error: String) {
      self.errors.lock().await.push(error);
    }
  }

  // Requires a running Redis instance at localhost:6379.
  // Run: `docker run -p 6379:6379 redis`
  #[tokio::test]
  #[ignore]
  async fn resolver_finds_registered_endpoints() {
    let client = Client::open("redis://127.0.0.1/").unwrap();
    let node = NodeInfo::new("n-resolve", "resolve-test")
      .with_endpoint("grpc", "127.0.0.1", 7000)
      .with_endpoint("http", "127.0.0.1", 8080);

    let mut conn = client.get_multiplexed_tokio_connection().await.unwrap();
    let _: () = conn.set_ex(node.key(), node.value(), 30).await.unwrap();

    let resolver = Resolver::new(client.clone(), "resolve-test");
    let addrs = resolver.resolve().await.unwrap();
    assert_eq!(addrs.len(), 1, "only the grpc endpoint passes the filter");
    assert_eq!(addrs[0].addr, "127.0.0.1:7000");
    assert_eq!(addrs[0].id, "n-resolve");

    // A disjoint allow-list hides the endpoint.
    let filtered = Resolver::new(client.clone(), "resolve-test")
      .with_allowed(vec!["10.0.0.0/8".parse().unwrap()]);
    assert!(filtered.resolve().await.unwrap().is_empty());

    let _: () = conn.del(node.key()).await.unwrap();
  }

  // Requires a running Redis instance at localhost:6379.
  #[tokio::test]
  #[ignore]
  async fn watcher_pushes_updates_into_the_client() {
    let client = Client::open("redis://127.0.0.1/").unwrap();
    let node = NodeInfo::new("n-watch", "watch-test").with_endpoint("grpc", "127.0.0.1", 7001);
    let mut conn = client.get_multiplexed_tokio_connection().await.unwrap();
    let _: () = conn.set_ex(node.key(), node.value(), 30).await.unwrap();

    let recording = Arc::new(RecordingClient {
      updates: Mutex::new(Vec::new()),
      errors: Mutex::new(Vec::new()),
    });
    let resolver = Resolver::new(client.clone(), "watch-test");
    let mut watcher = Watcher::new(resolver, recording.clone());
    watcher.resolve_now();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let updates = recording.updates.lock().await;
    assert!(!updates.is_empty());
    assert_eq!(updates[0][0].addr, "127.0.0.1:7001");
    drop(updates);

    watcher.close();
    let _: () = conn.del(node.key()).await.unwrap();
  }
}
