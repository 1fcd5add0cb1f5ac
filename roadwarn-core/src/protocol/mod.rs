//! Wire contract with the detection service.
//!
//! All messages are JSON text frames over a single WebSocket.
//!
//! | Direction        | Message                                    |
//! |------------------|--------------------------------------------|
//! | client → service | [`FrameRequest`], keepalive `{"type":"ping"}` |
//! | service → client | [`DetectionResult`], bare `pong`           |

pub mod request;
pub mod response;

pub use request::{DetectionParams, FrameRequest, KEEPALIVE_PING, KEEPALIVE_PONG};
pub use response::{Detection, DetectionResult, UNREADABLE_RESPONSE};
