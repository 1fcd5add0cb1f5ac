//! # roadwarn-client: console detection client
//!
//! Streams frames from a directory-backed camera to the detection
//! service, keeps a live per-label warning panel on the console, and
//! accepts `on` / `off` / `switch` / `status` / `quit` on stdin.

pub mod camera;
pub mod config;
pub mod console;
pub mod display;
