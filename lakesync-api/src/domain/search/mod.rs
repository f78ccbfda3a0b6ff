//! Permission-aware semantic search over the content lake's vector index.

mod service;
mod types;

pub use service::{build_permission_filter, SemanticSearchService};
pub use types::*;
