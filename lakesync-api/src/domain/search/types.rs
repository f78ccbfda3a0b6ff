use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticSearchRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub embedding_type: Option<String>,
    /// Additional HXQL filter ANDed with the permission clause.
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub min_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticSearchResponse {
    pub query: String,
    pub model: String,
    pub vector_dimension: usize,
    pub result_count: usize,
    pub total_count: i64,
    pub search_time_ms: u64,
    pub results: Vec<SearchHit>,
}

impl SemanticSearchResponse {
    pub fn empty(query: &str, model: &str, vector_dimension: usize, search_time_ms: u64) -> Self {
        Self {
            query: query.to_string(),
            model: model.to_string(),
            vector_dimension,
            result_count: 0,
            total_count: 0,
            search_time_ms,
            results: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// 1-based rank.
    pub rank: usize,
    pub score: f64,
    pub chunk_text: String,
    pub source_document: SourceDocumentRef,
    pub chunk_metadata: ChunkMetadata,
}

/// Parent-document metadata attached to a hit.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDocumentRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl SourceDocumentRef {
    pub fn bare(document_id: Option<String>) -> Self {
        Self {
            document_id,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_type: Option<String>,
    pub chunk_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paragraph: Option<i64>,
}
