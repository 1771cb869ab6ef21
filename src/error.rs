use redis::RedisError;
use thiserror::Error;

/// Errors surfaced by the pub/sub broker and its subscriptions.
#[derive(Debug, Error)]
pub enum PubSubError {
  #[error("broker is closed")]
  BrokerClosed,

  #[error("queue for topic '{0}' is full")]
  QueueFull(String),

  #[error("invalid handler provided")]
  InvalidHandler,

  #[error("subscription is closed")]
  SubscriptionClosed,

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("backend error: {0}")]
  Backend(#[from] RedisError),
}

/// Errors surfaced by the distributed mutex.
#[derive(Debug, Error)]
pub enum LockError {
  #[error("failed to acquire lock after {0} retries")]
  AcquisitionExhausted(u32),

  #[error("lock not held by this instance or already expired")]
  NotHeld,

  #[error("invalid arguments provided")]
  InvalidArguments,

  #[error("backend error: {0}")]
  Backend(#[from] RedisError),
}

/// Errors surfaced by the heartbeat registry.
#[derive(Debug, Error)]
pub enum RegistryError {
  #[error("registry TTL must be greater than the heartbeat period")]
  InvalidConfig,

  #[error("backend error: {0}")]
  Backend(#[from] RedisError),
}

/// Errors surfaced by the service resolver.
#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("backend error: {0}")]
  Backend(#[from] RedisError),
}

/// Errors surfaced by the game round engine.
///
/// These are conflict signals for the caller's session layer; none of
/// them mutates round state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameError {
  #[error("round is not playing")]
  NotPlaying,

  #[error("not your turn")]
  NotYourTurn,

  #[error("play failed: cards not in hand")]
  PlayFailed,

  #[error("player not found")]
  PlayerNotFound,

  #[error("round is not finished")]
  NotFinished,

  #[error("no winning team")]
  NoWinningTeam,

  #[error("invalid pattern")]
  InvalidPattern,
}
