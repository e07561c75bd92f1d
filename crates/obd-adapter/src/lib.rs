//! Scan-Tool Adapter Command Driver
//!
//! Drives an ELM-class adapter over a byte-stream transport: one
//! command in flight at a time, carriage-return framing, prompt
//! detection, echo verification, reply classification, and baud-rate
//! probing. Dialect specifics live behind [`AdapterProfile`] so the
//! driver itself stays adapter-family agnostic.

mod driver;
mod error;
mod profile;
mod response;
mod tokenizer;

pub use driver::{CommandDriver, DriverConfig, LineTerminator, BAUD_CANDIDATES};
pub use error::AdapterError;
pub use profile::{AdapterProfile, Elm327};
pub use response::{AdapterResponse, ReplyStatus};
pub use tokenizer::LineTokenizer;
