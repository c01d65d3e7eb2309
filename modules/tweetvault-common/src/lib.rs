pub mod config;
pub mod error;
pub mod types;
pub mod value;

pub use config::{Config, FetchConfig, MediaConfig, MergePolicy, RetentionPolicy};
pub use error::{Result, VaultError};
pub use types::*;
pub use value::Value;
