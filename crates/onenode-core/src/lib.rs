pub mod config;
pub mod event;

pub use config::{parse_duration, ClientConfig, ConfigError};
pub use event::{Command, StreamEvent, StreamLine};
