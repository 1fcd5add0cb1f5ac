//! Connection state machine for the detection-service link.
//!
//! Provides a `ConnectionState` enum that models the full lifecycle
//! of the link, with validated transitions that return `Result`
//! instead of panicking.

use std::fmt;

use crate::error::DetectError;

// ── ConnectionState ──────────────────────────────────────────────

/// The current state of the detection-service link.
///
/// ```text
///                 ┌──────────── retry timer fires ───────────┐
///                 ▼                                          │
///  Disconnected ──► Connecting ──► Open ──► Error ───────────┘
///       ▲               │           │         │
///       │               ▼           ▼         ▼
///       └──────────── Closing ◄─────┴─────────┘
/// ```
///
/// `Connecting ──► Error` covers a failed attempt. An exhausted retry
/// budget forces `Error ──► Disconnected` without passing `Closing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No session. Initial state, and terminal state at rest.
    #[default]
    Disconnected,

    /// A connect attempt is in flight.
    Connecting,

    /// The link is up and accepts frames.
    Open,

    /// Explicit shutdown in progress.
    Closing,

    /// The last attempt or the open link failed; a retry is pending.
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Open => write!(f, "OPEN"),
            Self::Closing => write!(f, "CLOSING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

impl ConnectionState {
    /// Returns `true` when the link accepts frames.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` when no session exists.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Returns `true` while a session is alive (connecting, open or
    /// waiting to retry).
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open | Self::Error)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Disconnected` (enable), `Error` (retry timer fired).
    pub fn begin_connect(&mut self) -> Result<(), DetectError> {
        match self {
            Self::Disconnected | Self::Error => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(DetectError::InvalidTransition(
                "cannot connect: not in Disconnected or Error state",
            )),
        }
    }

    /// Transition to `Open`.
    ///
    /// Valid from: `Connecting`.
    pub fn open(&mut self) -> Result<(), DetectError> {
        match self {
            Self::Connecting => {
                *self = Self::Open;
                Ok(())
            }
            _ => Err(DetectError::InvalidTransition(
                "cannot open: not in Connecting state",
            )),
        }
    }

    /// Transition to `Error`.
    ///
    /// Valid from: `Connecting` (attempt failed), `Open` (link dropped).
    pub fn fail(&mut self) -> Result<(), DetectError> {
        match self {
            Self::Connecting | Self::Open => {
                *self = Self::Error;
                Ok(())
            }
            _ => Err(DetectError::InvalidTransition(
                "cannot fail: not in Connecting or Open state",
            )),
        }
    }

    /// Transition to `Closing`.
    ///
    /// Valid from: `Connecting`, `Open`, `Error`.
    pub fn begin_close(&mut self) -> Result<(), DetectError> {
        match self {
            Self::Connecting | Self::Open | Self::Error => {
                *self = Self::Closing;
                Ok(())
            }
            _ => Err(DetectError::InvalidTransition(
                "cannot close: no active session",
            )),
        }
    }

    /// Transition to `Disconnected`.
    ///
    /// Valid from: `Closing` (explicit disable), `Error` (retry budget
    /// exhausted).
    pub fn finish(&mut self) -> Result<(), DetectError> {
        match self {
            Self::Closing | Self::Error => {
                *self = Self::Disconnected;
                Ok(())
            }
            _ => Err(DetectError::InvalidTransition(
                "cannot finish: not in Closing or Error state",
            )),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
