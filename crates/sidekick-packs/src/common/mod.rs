//! Common Utilities
//!
//! Shared error handling, paths, and HTTP setup used across the runtime.

pub mod error;
pub mod http;
pub mod paths;
pub mod result;

pub use error::{ErrorCode, PackError};
pub use http::create_http_client;
pub use paths::{config_path, packs_dir, sidekick_dir, sidekick_path};
pub use result::PackResult;
