//! Probe message construction and wire framing.
//!
//! Every message the harness produces carries its own identity (a
//! monotonic sequence) and its construction time, so the consumer side can
//! reconcile deliveries without any out-of-band state.

pub mod codec;
pub mod message;

pub use codec::{decode, encode, CodecError};
pub use message::{MessageFactory, ProbeMessage};
