pub mod clock;
pub mod config;
pub mod error;
pub mod error_info;
pub mod remote;
pub mod session;
pub mod settings;
pub mod signal;

// Re-export common error types
pub use error::InkpostError;
pub use error_info::ErrorInfo;
