pub mod ports;
pub mod runtime;
pub mod stages;

pub use runtime::{ConsumerRuntime, ProgressSender, RuntimeConfig, StageExecutor};
