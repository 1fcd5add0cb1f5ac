//! Console warning panel.

use std::io::Write;

use tracing::{info, warn};

use roadwarn_core::reconcile::WarningEntry;
use roadwarn_core::DisplaySink;

/// Renders the warning panel as text lines.
pub struct ConsoleDisplay<W> {
    out: W,
    visible: bool,
    last_status: String,
}

impl ConsoleDisplay<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ConsoleDisplay<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            visible: false,
            last_status: String::new(),
        }
    }

    /// Whether the panel is currently shown.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn last_status(&self) -> &str {
        &self.last_status
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, line: &str) {
        if let Err(e) = writeln!(self.out, "{line}") {
            warn!("display write failed: {e}");
        }
    }
}

/// One panel row, e.g. `⚠ stop (91%) [crop 2.1 KiB]`.
pub fn format_warning(entry: &WarningEntry) -> String {
    let mut line = format!("⚠ {} ({}%)", entry.class_name, entry.percent());
    if let Some(image) = &entry.image {
        line.push_str(&format!(" [crop {:.1} KiB]", image.len() as f64 / 1024.0));
    }
    if entry.sightings > 1 {
        line.push_str(&format!(" x{}", entry.sightings));
    }
    line
}

impl<W: Write + Send> DisplaySink for ConsoleDisplay<W> {
    fn on_warnings(&mut self, warnings: &[WarningEntry]) {
        if warnings.is_empty() {
            if self.visible {
                self.visible = false;
                self.write_line("── warnings cleared ──");
            }
            return;
        }
        self.visible = true;
        self.write_line(&format!("── {} warning(s) ──", warnings.len()));
        for entry in warnings {
            let line = format_warning(entry);
            self.write_line(&line);
        }
    }

    fn on_status(&mut self, status: &str) {
        info!(status, "status");
        self.last_status = status.to_string();
        self.write_line(&format!("[{status}]"));
    }
}
