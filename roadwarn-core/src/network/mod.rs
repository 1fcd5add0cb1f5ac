//! The detection-service link.
//!
//! | Module     | Purpose                                               |
//! |------------|-------------------------------------------------------|
//! | `endpoint` | Derives the `ws://` / `wss://` detection URL           |
//! | `backoff`  | Exponential reconnect delay with jitter and a budget   |
//! | `manager`  | [`ConnectionManager`]: session, keepalive, retries     |

pub mod backoff;
pub mod endpoint;
pub mod manager;

pub use backoff::BackoffPolicy;
pub use endpoint::{DETECT_PATH, Endpoint};
pub use manager::{ConnectionEvent, ConnectionManager, LinkConfig, SendOutcome};
