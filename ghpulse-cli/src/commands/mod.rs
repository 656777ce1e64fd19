//! CLI command implementations

pub mod checkpoint;
pub mod config;
pub mod fetch;
pub mod limits;

pub use checkpoint::CheckpointArgs;
pub use fetch::FetchArgs;
