pub mod config;
pub mod context;
pub mod error;
pub mod notify;
pub mod sink;

pub use config::OutboxConfig;
pub use context::{AppContext, EventModule};
pub use sink::{HttpSink, LogSink, NotificationSink};
