pub mod config;
pub mod error;
pub mod logging;

pub mod dispatcher;
pub mod engine;
pub mod lock;
pub mod retry;
pub mod runner;
pub mod store;

pub use engine::Engine;
pub use error::{QueueError, Result};
pub use store::{FailedTask, QueueDb, Task, TaskKey};
