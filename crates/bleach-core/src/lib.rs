pub mod api;
pub mod archive;
pub mod bulk;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod io;
pub mod oauth;
pub mod ops;
pub mod orchestrator;
pub mod paths;
pub mod types;

#[cfg(test)]
mod testing;

pub use api::TwitterApi;
pub use bulk::{BulkLoop, LoopPolicy, Operation, Sleeper, ThreadSleeper};
pub use client::HttpClient;
pub use config::{Config, OperationKind};
pub use credentials::{Credentials, SessionStore};
pub use error::{ApiError, ApiResult, BleachError, Result};
pub use orchestrator::{BleachReport, Bleacher, OperationReport};
