//! Camera collaborator interface.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::DetectError;

/// Which physical camera is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Front camera, facing the user.
    User,
    /// Rear camera, facing the road.
    #[default]
    Environment,
}

impl Facing {
    /// The other camera.
    pub fn toggled(self) -> Self {
        match self {
            Self::User => Self::Environment,
            Self::Environment => Self::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Environment => "environment",
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Facing {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" | "front" => Ok(Self::User),
            "environment" | "back" | "rear" => Ok(Self::Environment),
            other => Err(DetectError::Other(format!("unknown camera facing: {other}"))),
        }
    }
}

/// Source of JPEG frames.
///
/// `capture_frame` returning `Ok(None)` means the camera is not ready
/// yet; that is not an error.
#[async_trait]
pub trait CameraProvider: Send {
    /// Grab one JPEG-encoded frame.
    async fn capture_frame(&mut self) -> Result<Option<Bytes>, DetectError>;

    /// The camera currently in use. Read fresh on every cycle.
    fn current_facing(&self) -> Facing;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_round_trips() {
        assert_eq!(Facing::User.toggled(), Facing::Environment);
        assert_eq!(Facing::User.toggled().toggled(), Facing::User);
    }

    #[test]
    fn parses_aliases() {
        assert_eq!("front".parse::<Facing>().unwrap(), Facing::User);
        assert_eq!(" Environment ".parse::<Facing>().unwrap(), Facing::Environment);
        assert!("sideways".parse::<Facing>().is_err());
    }
}
