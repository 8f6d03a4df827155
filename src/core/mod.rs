pub mod config;
pub mod errors;

pub use config::{AppConfig, AppPaths};
pub use errors::PipelineError;
