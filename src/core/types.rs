use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::debug;

/// Which kind of conversation is being exported. Controls sender labelling
/// and the transcript line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// One-to-one chat: sender is derived from the bubble color alone.
    #[default]
    Individual,
    /// Multi-participant chat: sender is read from the heading above the bubble.
    Group,
}

impl ChatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::Individual => "individual",
            ChatMode::Group => "group",
        }
    }
}

impl std::fmt::Display for ChatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "individual" | "direct" | "dm" => Ok(ChatMode::Individual),
            "group" => Ok(ChatMode::Group),
            other => Err(format!("unknown chat mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// Events flowing from the export worker to the presentation layer.
///
/// Warnings and errors travel on the same channel as ordinary progress; the
/// severity lives in [`StatusLevel`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    Status { message: String, level: StatusLevel },
    /// Two consecutive scroll passes yielded nothing new. The presentation
    /// layer should offer "stop" / "continue".
    StallAlert,
    Complete,
}

impl StatusEvent {
    pub fn info(message: impl Into<String>) -> Self {
        StatusEvent::Status {
            message: message.into(),
            level: StatusLevel::Info,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        StatusEvent::Status {
            message: message.into(),
            level: StatusLevel::Warning,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StatusEvent::Status {
            message: message.into(),
            level: StatusLevel::Error,
        }
    }
}

/// Presentation-side effects requested by background work (cleanup, login).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiCommand {
    EnableButton,
    UpdateButton { properties: BTreeMap<String, String> },
}

impl UiCommand {
    /// Restore the export control to its idle "Start Export" appearance.
    pub fn reset_export_button() -> Self {
        let mut properties = BTreeMap::new();
        properties.insert("text".to_string(), "Start Export".to_string());
        properties.insert("state".to_string(), "normal".to_string());
        UiCommand::UpdateButton { properties }
    }
}

pub type EventSender = mpsc::UnboundedSender<StatusEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<StatusEvent>;
pub type CommandSender = mpsc::UnboundedSender<UiCommand>;
pub type CommandReceiver = mpsc::UnboundedReceiver<UiCommand>;

/// Create the worker → presentation status channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Create the side-effect command channel.
pub fn command_channel() -> (CommandSender, CommandReceiver) {
    mpsc::unbounded_channel()
}

/// Deliver a status event; a dropped receiver is logged, never an error.
pub fn send_event(events: &EventSender, event: StatusEvent) {
    if events.send(event).is_err() {
        debug!("status receiver dropped");
    }
}

pub fn send_command(commands: &CommandSender, command: UiCommand) {
    if commands.send(command).is_err() {
        debug!("command receiver dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_mode_parses_aliases() {
        assert_eq!("Group".parse::<ChatMode>(), Ok(ChatMode::Group));
        assert_eq!("dm".parse::<ChatMode>(), Ok(ChatMode::Individual));
        assert!("broadcast".parse::<ChatMode>().is_err());
    }

    #[test]
    fn status_event_serializes_with_type_tag() {
        let v = serde_json::to_value(StatusEvent::warning("slow")).unwrap();
        assert_eq!(v["type"], "status");
        assert_eq!(v["level"], "warning");
        assert_eq!(v["message"], "slow");

        let v = serde_json::to_value(UiCommand::EnableButton).unwrap();
        assert_eq!(v["type"], "enable_button");
    }

    #[test]
    fn sending_to_a_dropped_receiver_is_harmless() {
        let (events, rx) = event_channel();
        let (commands, commands_rx) = command_channel();
        drop(rx);
        drop(commands_rx);
        send_event(&events, StatusEvent::Complete);
        send_command(&commands, UiCommand::EnableButton);

        let (events, mut rx) = event_channel();
        send_event(&events, StatusEvent::StallAlert);
        assert_eq!(rx.try_recv().ok(), Some(StatusEvent::StallAlert));
    }
}
