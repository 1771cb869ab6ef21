//! Typed handler bindings for the broker.
//!
//! The wire envelope is a JSON array whose length equals the handler's
//! arity. Arity and per-position decoding are fixed at bind time from the
//! argument tuple type, so no runtime reflection is involved: subscribing
//! with a two-argument handler derives a two-slot schema, and workers
//! reject any envelope that does not match it.

use std::future::Future;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::value::RawValue;

pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Why a message failed to decode; logged by the worker, message dropped.
#[derive(Debug)]
pub(crate) enum DecodeError {
  Arity { expected: usize, actual: usize },
  Json(serde_json::Error),
}

impl std::fmt::Display for DecodeError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      DecodeError::Arity { expected, actual } => {
        write!(f, "argument count mismatch: expected {expected}, got {actual}")
      }
      DecodeError::Json(e) => write!(f, "argument decode failed: {e}"),
    }
  }
}

/// Argument tuples a handler can receive. Implemented for tuples of up to
/// four [`DeserializeOwned`] positions.
pub trait HandlerArgs: Sized + Send + 'static {
  const ARITY: usize;

  fn decode(parts: &[&RawValue]) -> Result<Self, serde_json::Error>;
}

impl HandlerArgs for () {
  const ARITY: usize = 0;

  fn decode(_parts: &[&RawValue]) -> Result<Self, serde_json::Error> {
    Ok(())
  }
}

macro_rules! impl_handler_args {
  ($arity:expr => $($ty:ident : $idx:tt),+) => {
    impl<$($ty),+> HandlerArgs for ($($ty,)+)
    where
      $($ty: DeserializeOwned + Send + 'static),+
    {
      const ARITY: usize = $arity;

      fn decode(parts: &[&RawValue]) -> Result<Self, serde_json::Error> {
        Ok(($(serde_json::from_str::<$ty>(parts[$idx].get())?,)+))
      }
    }
  };
}

impl_handler_args!(1 => A1: 0);
impl_handler_args!(2 => A1: 0, A2: 1);
impl_handler_args!(3 => A1: 0, A2: 1, A3: 2);
impl_handler_args!(4 => A1: 0, A2: 1, A3: 2, A4: 3);

/// An async handler taking an argument tuple. Blanket-implemented for
/// `Fn` closures of matching arity, so subscribers write plain
/// `|a: String, b: u64| async move { ... }`.
pub trait Handler<Args>: Send + Sync + 'static {
  fn call(&self, args: Args) -> BoxFuture;
}

impl<F, Fut> Handler<()> for F
where
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = ()> + Send + 'static,
{
  fn call(&self, _args: ()) -> BoxFuture {
    Box::pin(self())
  }
}

macro_rules! impl_handler {
  ($($ty:ident : $var:ident),+) => {
    impl<F, Fut, $($ty),+> Handler<($($ty,)+)> for F
    where
      F: Fn($($ty),+) -> Fut + Send + Sync + 'static,
      Fut: Future<Output = ()> + Send + 'static,
      $($ty: Send + 'static),+
    {
      fn call(&self, ($($var,)+): ($($ty,)+)) -> BoxFuture {
        Box::pin(self($($var),+))
      }
    }
  };
}

impl_handler!(A1: a1);
impl_handler!(A1: a1, A2: a2);
impl_handler!(A1: a1, A2: a2, A3: a3);
impl_handler!(A1: a1, A2: a2, A3: a3, A4: a4);

/// Decode an envelope and produce the handler invocation future.
pub(crate) fn dispatch_envelope<A, H>(handler: &H, payload: &[u8]) -> Result<BoxFuture, DecodeError>
where
  A: HandlerArgs,
  H: Handler<A> + ?Sized,
{
  let parts: Vec<&RawValue> = serde_json::from_slice(payload).map_err(DecodeError::Json)?;
  if parts.len() != A::ARITY {
    return Err(DecodeError::Arity {
      expected: A::ARITY,
      actual: parts.len(),
    });
  }
  let args = A::decode(&parts).map_err(DecodeError::Json)?;
  Ok(handler.call(args))
}

/// Argument tuples a publisher can send: encoded as the JSON array the
/// matching [`HandlerArgs`] arity expects.
pub trait PublishArgs: Send + Sync {
  fn encode(&self) -> Result<Vec<u8>, serde_json::Error>;
}

impl PublishArgs for () {
  fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
    Ok(b"[]".to_vec())
  }
}

macro_rules! impl_publish_args {
  ($($ty:ident),+) => {
    impl<$($ty),+> PublishArgs for ($($ty,)+)
    where
      $($ty: Serialize + Send + Sync),+
    {
      fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
      }
    }
  };
}

impl_publish_args!(A1);
impl_publish_args!(A1, A2);
impl_publish_args!(A1, A2, A3);
impl_publish_args!(A1, A2, A3, A4);
