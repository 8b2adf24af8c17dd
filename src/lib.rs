pub mod attachment;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod telemetry;

pub use client::{MandrillClient, SendResponse};
pub use error::{MandrillError, MandrillResult};
