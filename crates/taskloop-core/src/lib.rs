pub mod config;
pub mod error;
pub mod notify;

pub use config::TaskloopConfig;
pub use error::{CoreError, Result};
pub use notify::{NotificationSink, Severity};
