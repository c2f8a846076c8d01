pub mod cli;
pub mod cmd;
pub mod database;
pub mod error;
pub mod k8s;
pub mod race;
pub mod report;
pub mod wait;

pub use error::{Error, Result};
