pub mod agent;
pub mod catalog;
pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod pipeline;
pub mod random;
pub mod util;

pub use error::{Error, Result};
