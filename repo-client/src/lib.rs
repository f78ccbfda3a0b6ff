mod client;
mod error;
mod models;

pub use client::{SourceClient, READ_ROLES};
pub use error::SourceClientError;
pub use models::*;
