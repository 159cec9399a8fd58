// Eventually Core Library
// In-process asynchronous publish/subscribe bus

pub mod callback;
pub mod config;
mod dispatcher;
pub mod event;
pub mod schema;
pub mod subscriber;
pub mod telemetry;
pub mod value;

// Export core types
pub use callback::{Callback, DeliveryFailure, FailureKind, IntoCallback};
pub use config::BusConfig;
pub use event::EventBus;
pub use schema::SchemaRegistry;
pub use subscriber::Subscription;
pub use telemetry::BusStats;
pub use value::{Arg, ArgType, IntoArgs, Value};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Invalid listener for topic {topic:?}: callback declares no signature to check")]
    InvalidListener { topic: String },

    #[error("Schema violation on topic {topic:?}: expected {expected}, found {found}")]
    SchemaViolation {
        topic: String,
        expected: String,
        found: String,
    },

    #[error("No such topic: {0:?}")]
    UnknownTopic(String),

    #[error("Callback failure: {0}")]
    CallbackFailure(#[from] DeliveryFailure),

    #[error("Event bus closed")]
    Closed,

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ParseError(#[from] toml::de::Error),
}
pub type Result<T> = std::result::Result<T, BusError>;
