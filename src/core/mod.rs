pub mod client;
pub mod config;
pub mod error;
pub mod queue;
pub mod store;
pub mod task;
pub mod tasks;


pub use client::ApiClient;
pub use config::Config;
pub use error::{ApiError, FailureKind};
pub use queue::{QueueApi, QueueService};
pub use store::{RefreshPolicy, SyncState, SyncStore};
pub use task::{QueueStats, Task, TaskStatus};
pub use tasks::{Backend, SubmitOptions, TaskApi};
