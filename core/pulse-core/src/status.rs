//! Text and tooltip the host shows in its status line.

use pulse_protocol::HostCommand;

pub const OFFLINE_TOOLTIP: &str =
    "working offline... coding activity will sync next time we are online";
pub const TODAY_TOOLTIP: &str = "Today's coding time. Click to visit dashboard.";
pub const CALCULATING_TOOLTIP: &str = "Calculating time spent today in background...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
    pub tooltip: String,
}

impl StatusLine {
    fn new(text: impl Into<String>, tooltip: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tooltip: tooltip.into(),
        }
    }

    pub fn initializing() -> Self {
        Self::new("Initializing...", "Initializing...")
    }

    pub fn ready() -> Self {
        Self::new("", "Initialized")
    }

    /// Keeps the stats text visible when coding activity is shown.
    pub fn offline(today: Option<&str>, coding_activity: bool) -> Self {
        let text = match today {
            Some(text) if coding_activity => text,
            _ => "",
        };
        Self::new(text, OFFLINE_TOOLTIP)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new("Error", message)
    }

    /// Stats either go in the text (with a fixed tooltip) or, when coding
    /// activity is hidden, into the tooltip.
    pub fn today(text: &str, coding_activity: bool) -> Self {
        let text = text.trim();
        if text.is_empty() {
            Self::new("", CALCULATING_TOOLTIP)
        } else if coding_activity {
            Self::new(text, TODAY_TOOLTIP)
        } else {
            Self::new("", text)
        }
    }

    pub fn is_error(&self) -> bool {
        self.text == "Error"
    }

    pub fn to_command(&self) -> HostCommand {
        HostCommand::SetStatus {
            text: self.text.clone(),
            tooltip: self.tooltip.clone(),
        }
    }
}
