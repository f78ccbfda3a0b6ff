//! Capability traits at the seams of the pipeline.
//!
//! These keep the worker, search and RAG services testable with mocks and
//! independent of the concrete clients.

use async_trait::async_trait;
use lake_client::{LakeClient, LakeDocument, LakeEmbedding, VectorSearchResult};
use repo_client::SourceClient;
use serde_json::Value;

use super::error::Result;

/// Text embedding model. Implementations return a fixed-dimension vector and
/// signal oversized inputs with
/// [`PipelineError::EmbeddingInputTooLarge`](super::PipelineError).
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f64>>;
}

/// Chat model used by the RAG pipeline.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<ChatCompletion>;
}

#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub text: String,
    pub model: String,
}

/// Write surface of the content lake used by the transformation worker.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn delete_embeddings(&self, lake_id: &str) -> Result<()>;
    async fn update_embeddings(&self, lake_id: &str, embeddings: &[LakeEmbedding]) -> Result<()>;
    /// Partial update; only the fields present in `payload` are overwritten.
    async fn update_document(&self, lake_id: &str, payload: Value) -> Result<()>;
}

#[async_trait]
impl DocumentStore for LakeClient {
    async fn delete_embeddings(&self, lake_id: &str) -> Result<()> {
        LakeClient::delete_embeddings(self, lake_id).await?;
        Ok(())
    }

    async fn update_embeddings(&self, lake_id: &str, embeddings: &[LakeEmbedding]) -> Result<()> {
        LakeClient::update_embeddings(self, lake_id, embeddings).await?;
        Ok(())
    }

    async fn update_document(&self, lake_id: &str, payload: Value) -> Result<()> {
        self.update_by_id(lake_id, &payload).await?;
        Ok(())
    }
}

/// Read surface of the content lake used by retrieval.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn vector_search(
        &self,
        vector: Vec<f64>,
        embedding_type: Option<&str>,
        hxql_filter: Option<&str>,
        limit: u32,
    ) -> Result<VectorSearchResult>;

    /// Looks a parent document up by its lake id.
    async fn find_document(&self, lake_id: &str) -> Result<Option<LakeDocument>>;
}

#[async_trait]
impl VectorIndex for LakeClient {
    async fn vector_search(
        &self,
        vector: Vec<f64>,
        embedding_type: Option<&str>,
        hxql_filter: Option<&str>,
        limit: u32,
    ) -> Result<VectorSearchResult> {
        Ok(LakeClient::vector_search(self, vector, embedding_type, hxql_filter, limit).await?)
    }

    async fn find_document(&self, lake_id: &str) -> Result<Option<LakeDocument>> {
        let hxql = format!(
            "SELECT * FROM SysContent WHERE sys_id = '{}'",
            lake_client::escape_hxql(lake_id)
        );
        let result = self.query(&hxql, 1, 0).await?;
        Ok(result.documents.into_iter().next())
    }
}

/// Resolves the caller's identity context in the source repository.
#[async_trait]
pub trait AuthorityProvider: Send + Sync {
    async fn repository_id(&self) -> Result<String>;
    async fn list_groups(&self, username: &str) -> Result<Vec<String>>;
}

#[async_trait]
impl AuthorityProvider for SourceClient {
    async fn repository_id(&self) -> Result<String> {
        Ok(SourceClient::repository_id(self).await?)
    }

    async fn list_groups(&self, username: &str) -> Result<Vec<String>> {
        Ok(SourceClient::list_groups(self, username).await?)
    }
}
