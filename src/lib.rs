//! Infrastructure for a networked multiplayer Guandan card-game service.
//!
//! The crate bundles the Redis-backed plumbing the service is built on —
//! durable pub/sub queues with typed worker pools ([`pubsub`]), a
//! lease-based distributed mutex ([`lock`]), a heartbeat service registry
//! ([`registry`]) with its key-scan resolver ([`resolver`]) — together
//! with the pure in-memory game engine ([`guandan`]): pattern detection
//! with wildcards, legal-move search, and the four-seat round state
//! machine.
//!
//! All distribution components share one [`redis::Client`]; the game
//! engine performs no I/O at all.

pub mod error;
pub mod guandan;
pub mod lock;
pub mod node;
pub mod pubsub;
pub mod registry;
pub mod resolver;

pub use error::{GameError, LockError, PubSubError, RegistryError, ResolveError};
pub use lock::{DistributedLock, LockManager, LockOptions};
pub use node::NodeInfo;
pub use pubsub::{Broker, SubscribeOptions, Subscription};
pub use registry::{Registry, RegistryOptions};
pub use resolver::{Address, LbClient, Resolver, Subnet, Watcher};
