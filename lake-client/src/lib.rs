mod auth;
mod client;
mod error;
mod models;
mod provisioner;

pub use auth::TokenProvider;
pub use client::{
    encode_path_segments, escape_hxql, LakeClient, EMBED_MIXIN, REMOTE_INGEST_MIXIN, SYS_FILE,
    SYS_FOLDER,
};
pub use error::LakeClientError;
pub use models::*;
pub use provisioner::ModelProvisioner;
