//! Diagnostic Session Control
//!
//! Ties the adapter driver and the message codec together into one
//! stateful conversation: open the adapter, select or search for a bus
//! protocol, submit requests, and dispatch the per-ECU responses.

mod dispatch;
mod error;
mod session;

pub use dispatch::{correlate, Submission};
pub use error::{ErrorKind, SessionError};
pub use session::{Session, SessionConfig, SessionState};
