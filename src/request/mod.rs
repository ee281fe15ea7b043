//! Serialized execution of outbound requests.
//!
//! Every request submitted to a [`RequestQueue`] is run by one dedicated
//! worker thread, strictly in submission order. No two requests from the same
//! queue are ever in flight together, which keeps Discord's per-route rate
//! limits and message ordering predictable.

mod error;
mod future;
mod queue;
mod shutdown;

pub use self::{error::*, future::*, queue::*, shutdown::*};
