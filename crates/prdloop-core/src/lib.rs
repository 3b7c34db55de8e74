pub mod backlog;
pub mod config;
pub mod detect;
pub mod error;
pub mod gate;
pub mod git;
pub mod io;
pub mod paths;
pub mod progress;
pub mod prompt;
pub mod report;
pub mod scheduler;
pub mod select;
pub mod types;
pub mod validate;

pub use error::{CoreError, Result};
