//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `transport` - Reader transport trait and errors
//! - `serial` - Serial transport for the RFID reader
//! - `replay` - Replays recorded scan windows (tests, offline runs)
//! - `egress` - Change event output to file (JSONL format)
//! - `http` - Prometheus metrics and scanner control endpoint

pub mod egress;
pub mod http;
pub mod replay;
pub mod serial;
pub mod transport;

// Re-export commonly used types
pub use egress::ChangeEgress;
pub use http::{start_http_server, HttpContext};
pub use replay::ReplayTransport;
pub use serial::SerialTransport;
pub use transport::{Transport, TransportError};
