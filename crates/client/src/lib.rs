//! Client code for upguard.
//!
//! This crate provides the HTTP delegate over `reqwest`, the circuit-breaking
//! client that auto-blocks an unreachable remote, and the status observer that
//! logs and distributes remote status changes.

pub mod breaker;
pub mod clock;
pub mod error;
pub mod fetch;
pub mod status_logger;

pub use breaker::{BreakerConfig, CircuitBreakingHttpClient, FibonacciBackoff};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{NetworkError, RemoteError, TransportErrorKind};
pub use fetch::{FetchClient, FetchConfig, HttpDelegate, HttpRequest, HttpResponse, Target, UrlError};
pub use status_logger::RemoteStatusLogger;
