//! Console commands read from stdin.

use std::str::FromStr;

use roadwarn_core::{CameraProvider, DisplaySink, Pipeline};
use tokio::time::Instant;

/// One line typed by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Start detection.
    On,
    /// Stop detection.
    Off,
    /// Toggle front/rear camera.
    Switch,
    /// Print a status summary.
    Status,
    Help,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" | "start" => Ok(Self::On),
            "off" | "stop" => Ok(Self::Off),
            "switch" | "flip" => Ok(Self::Switch),
            "status" | "s" => Ok(Self::Status),
            "help" | "?" | "h" => Ok(Self::Help),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            other => Err(format!("unknown command {other:?}; try `help`")),
        }
    }
}

pub const HELP: &str = "commands: on | off | switch | status | quit";

/// A multi-line summary for the `status` command.
pub fn status_report<C, S>(pipeline: &Pipeline<C, S>) -> String
where
    C: CameraProvider,
    S: DisplaySink,
{
    let manager = pipeline.manager();
    let stats = pipeline.transmitter().stats();
    let queue = pipeline.reconciler().queue();
    let now = Instant::now();
    let mut report = format!(
        "link: {} (session {}, retries {})\n\
         status: {}\n\
         camera: {}\n\
         frames: sent {}, results {}, busy {}, not open {}, empty {}, errors {}, timeouts {}\n\
         warnings: {} live",
        manager.state(),
        manager.session_id(),
        manager.retry_count(),
        pipeline.status(),
        pipeline.camera().current_facing(),
        stats.sent,
        stats.results,
        stats.skipped_busy,
        stats.skipped_not_open,
        stats.empty_captures,
        stats.capture_errors,
        stats.timeouts,
        queue.live(now).count(),
    );
    for entry in queue.live(now) {
        report.push_str(&format!("\n  {} ({}%)", entry.class_name, entry.percent()));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!("on".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::On);
        assert_eq!(" OFF \n".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Off);
        assert_eq!("switch".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Switch);
        assert_eq!("q".parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Quit);
        assert!("launch".parse::<ConsoleCommand>().is_err());
    }
}
