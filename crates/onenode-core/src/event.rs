//! Agent stream events.
//!
//! The query endpoint streams one record per line. Most lines are JSON
//! objects of the form `{channel, command, role, data, thread}`; agents can
//! also push raw lines that are passed through untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What an event asks the consumer to do with its channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Command {
    /// Append `data.content` to the channel.
    Append,
    /// Drop the last fragment written to the channel.
    Rewind,
    /// Mark the start of an anchored block.
    AnchorStart,
    /// A new progress step began.
    NewStep,
    /// The run is finished; no further events follow.
    End,
    Other(String),
}

impl From<String> for Command {
    fn from(s: String) -> Self {
        match s.as_str() {
            "append" => Command::Append,
            "rewind" => Command::Rewind,
            "anchor_start" => Command::AnchorStart,
            "new_step" => Command::NewStep,
            "end" => Command::End,
            _ => Command::Other(s),
        }
    }
}

impl From<Command> for String {
    fn from(c: Command) -> Self {
        match c {
            Command::Append => "append".to_string(),
            Command::Rewind => "rewind".to_string(),
            Command::AnchorStart => "anchor_start".to_string(),
            Command::NewStep => "new_step".to_string(),
            Command::End => "end".to_string(),
            Command::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(default)]
    pub channel: String,
    pub command: Command,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub thread: String,
}

impl StreamEvent {
    /// Text payload carried in `data.content`, if any.
    pub fn content(&self) -> Option<&str> {
        self.data.get("content").and_then(Value::as_str)
    }

    pub fn is_end(&self) -> bool {
        self.command == Command::End
    }
}

/// One decoded line of the agent stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamLine {
    Event(StreamEvent),
    Raw(String),
}

impl StreamLine {
    /// Interpret a line. Anything that is not an event object is raw.
    pub fn parse(line: &str) -> Self {
        match serde_json::from_str::<StreamEvent>(line) {
            Ok(event) => StreamLine::Event(event),
            Err(_) => StreamLine::Raw(line.to_string()),
        }
    }
}
