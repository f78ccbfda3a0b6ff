use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use lake_client::{LakeDocument, ScoredEmbedding};
use tracing::{debug, info, warn};

use super::types::{
    ChunkMetadata, SearchHit, SemanticSearchRequest, SemanticSearchResponse, SourceDocumentRef,
};
use crate::domain::embedding::EmbeddingService;
use crate::domain::error::Result;
use crate::domain::traits::{AuthorityProvider, EmbeddingModel, VectorIndex};

const MAX_TOP_K: u32 = 50;
const MIN_TOP_K: u32 = 1;
const DEFAULT_TOP_K: u32 = 10;
const BASE_QUERY: &str = "SELECT * FROM SysContent";

const RACL_FIELD: &str = "racl";
const EVERYONE_PRINCIPAL: &str = "__Everyone__";
const GROUP_PREFIX: &str = "GROUP_";
const GROUP_EVERYONE: &str = "GROUP_EVERYONE";
const GROUP_RACL_PREFIX: &str = "g:";

const FALLBACK_MIN_SCORE: f64 = 0.5;

/// Executes permission-scoped semantic searches: embed the query, resolve the
/// caller's authorities, build the `racl` filter, run kNN search, and enrich
/// hits with parent-document metadata.
pub struct SemanticSearchService<M, V, A> {
    embedding: Arc<EmbeddingService<M>>,
    index: Arc<V>,
    authorities: Arc<A>,
    default_min_score: f64,
}

impl<M, V, A> SemanticSearchService<M, V, A>
where
    M: EmbeddingModel,
    V: VectorIndex,
    A: AuthorityProvider,
{
    pub fn new(
        embedding: Arc<EmbeddingService<M>>,
        index: Arc<V>,
        authorities: Arc<A>,
        default_min_score: f64,
    ) -> Self {
        Self {
            embedding,
            index,
            authorities,
            default_min_score,
        }
    }

    pub async fn search(
        &self,
        request: &SemanticSearchRequest,
        username: &str,
    ) -> Result<SemanticSearchResponse> {
        let started = Instant::now();

        let top_k = request
            .top_k
            .unwrap_or(DEFAULT_TOP_K)
            .clamp(MIN_TOP_K, MAX_TOP_K);
        let min_score = resolve_min_score(request.min_score, self.default_min_score);

        info!(
            query = %request.query,
            top_k, min_score, username, "Embedding search query"
        );

        let query_vector = self.embedding.embed_query(&request.query).await?;
        if query_vector.is_empty() {
            warn!(query = %request.query, "Empty embedding vector for query");
            return Ok(SemanticSearchResponse::empty(
                &request.query,
                self.embedding.model_name(),
                0,
                started.elapsed().as_millis() as u64,
            ));
        }

        let authorities = self.resolve_authorities(username).await;
        let repository_id = self.authorities.repository_id().await?;
        let hxql_filter = build_permission_filter(
            username,
            &authorities,
            &repository_id,
            request.filter.as_deref(),
        );
        debug!(filter = %hxql_filter, "Executing vector search");

        let vector_dimension = query_vector.len();
        let vector_result = self
            .index
            .vector_search(
                query_vector,
                request.embedding_type.as_deref(),
                Some(&hxql_filter),
                top_k,
            )
            .await?;

        if vector_result.embeddings.is_empty() {
            info!(query = %request.query, "No results for query");
            return Ok(SemanticSearchResponse::empty(
                &request.query,
                self.embedding.model_name(),
                vector_dimension,
                started.elapsed().as_millis() as u64,
            ));
        }

        let documents = self.fetch_document_metadata(&vector_result.embeddings).await;
        let hits = build_search_hits(&vector_result.embeddings, &documents, min_score);

        let search_time_ms = started.elapsed().as_millis() as u64;
        info!(
            results = hits.len(),
            search_time_ms,
            query = %request.query,
            min_score,
            "Semantic search completed"
        );

        Ok(SemanticSearchResponse {
            query: request.query.clone(),
            model: self.embedding.model_name().to_string(),
            vector_dimension,
            result_count: hits.len(),
            total_count: vector_result
                .total_count
                .unwrap_or(hits.len() as i64),
            search_time_ms,
            results: hits,
        })
    }

    /// The caller's username and `GROUP_EVERYONE`, plus group memberships
    /// when they can be fetched. Group lookup failure degrades to the
    /// guaranteed pair.
    async fn resolve_authorities(&self, username: &str) -> Vec<String> {
        let mut authorities = vec![username.to_string(), GROUP_EVERYONE.to_string()];

        match self.authorities.list_groups(username).await {
            Ok(groups) => authorities.extend(groups),
            Err(e) => {
                warn!(
                    username,
                    error = %e,
                    "Failed to retrieve groups, proceeding with username + everyone"
                );
            }
        }

        authorities
    }

    async fn fetch_document_metadata(
        &self,
        embeddings: &[ScoredEmbedding],
    ) -> HashMap<String, SourceDocumentRef> {
        let mut cache = HashMap::new();

        let doc_ids: HashSet<&String> = embeddings
            .iter()
            .filter_map(|e| e.document_id.as_ref())
            .collect();

        for doc_id in doc_ids {
            match self.index.find_document(doc_id).await {
                Ok(Some(doc)) => {
                    cache.insert(doc_id.clone(), project_document(doc_id, &doc));
                }
                Ok(None) => {
                    debug!(%doc_id, "Parent document not found during enrichment");
                }
                Err(e) => {
                    warn!(%doc_id, error = %e, "Failed to fetch parent document metadata");
                }
            }
        }

        debug!(enriched = cache.len(), "Document metadata enrichment complete");
        cache
    }
}

/// Projects a lake document into the hit metadata: lake id, source node id,
/// and the ingested name/path/mime properties.
fn project_document(doc_id: &str, doc: &LakeDocument) -> SourceDocumentRef {
    let prop = |key: &str| {
        doc.ingest_properties
            .as_ref()
            .and_then(|p| p.get(key))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    };

    SourceDocumentRef {
        document_id: Some(doc_id.to_string()),
        source_id: doc.sys_name.clone(),
        name: prop("name"),
        path: doc
            .paths
            .as_ref()
            .and_then(|p| p.first())
            .cloned()
            .or_else(|| prop("path")),
        mime_type: prop("mimeType"),
    }
}

fn build_search_hits(
    embeddings: &[ScoredEmbedding],
    documents: &HashMap<String, SourceDocumentRef>,
    min_score: f64,
) -> Vec<SearchHit> {
    let mut hits = Vec::new();
    let mut rank = 1;

    for embedding in embeddings {
        let score = embedding.score.unwrap_or(0.0);
        if score < min_score {
            continue;
        }

        let source_document = embedding
            .document_id
            .as_ref()
            .and_then(|id| documents.get(id).cloned())
            .unwrap_or_else(|| SourceDocumentRef::bare(embedding.document_id.clone()));

        let location = embedding.location.as_ref().and_then(|l| l.text.as_ref());

        hits.push(SearchHit {
            rank,
            score,
            chunk_text: embedding.text.clone(),
            source_document,
            chunk_metadata: ChunkMetadata {
                embedding_id: embedding.id.clone(),
                embedding_type: embedding.embedding_type.clone(),
                chunk_length: embedding.text.len(),
                page: location.and_then(|t| t.page),
                paragraph: location.and_then(|t| t.paragraph),
            },
        });
        rank += 1;
    }

    hits
}

/// Builds the permission-scoped HXQL filter: a disjunction over the `racl`
/// field covering `__Everyone__`, the user's external identity, and each
/// group's `g:`-prefixed external identity, ANDed with any caller filter.
pub fn build_permission_filter(
    username: &str,
    authorities: &[String],
    repository_id: &str,
    additional_filter: Option<&str>,
) -> String {
    let suffix = format!("_#_{}", repository_id);

    let mut seen = HashSet::new();
    let cleaned: Vec<&str> = authorities
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .filter(|a| seen.insert(a.to_string()))
        .collect();

    let mut racl_clauses = vec![format!(
        "{} = '{}'",
        RACL_FIELD,
        lake_client::escape_hxql(EVERYONE_PRINCIPAL)
    )];

    if cleaned.is_empty() {
        racl_clauses.push(format!(
            "{} = '{}'",
            RACL_FIELD,
            lake_client::escape_hxql(&format!("{}{}", username, suffix))
        ));
    } else {
        for authority in cleaned {
            if authority == GROUP_EVERYONE {
                continue;
            }
            let principal = if authority.starts_with(GROUP_PREFIX) {
                format!("{}{}{}", GROUP_RACL_PREFIX, authority, suffix)
            } else {
                format!("{}{}", authority, suffix)
            };
            racl_clauses.push(format!(
                "{} = '{}'",
                RACL_FIELD,
                lake_client::escape_hxql(&principal)
            ));
        }
    }

    let mut conditions = vec![format!("({})", racl_clauses.join(" OR "))];
    if let Some(filter) = additional_filter.map(str::trim).filter(|f| !f.is_empty()) {
        conditions.push(format!("({})", filter));
    }

    format!("{} WHERE {}", BASE_QUERY, conditions.join(" AND "))
}

/// NaN and non-positive values fall back to the default; the result is
/// clamped into `[0, 1]`.
fn resolve_min_score(requested: Option<f64>, default_min_score: f64) -> f64 {
    let value = match requested {
        Some(v) if v.is_nan() || v <= 0.0 => default_min_score,
        Some(v) => v,
        None => default_min_score,
    };
    clamp_min_score(value)
}

fn clamp_min_score(value: f64) -> f64 {
    if value.is_nan() {
        return FALLBACK_MIN_SCORE;
    }
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::embedding::mock::MockEmbeddingModel;
    use crate::domain::error::PipelineError;
    use crate::domain::traits::{AuthorityProvider, VectorIndex};
    use async_trait::async_trait;
    use lake_client::{EmbeddingLocation, VectorSearchResult};
    use serde_json::Map;

    struct StaticAuthorities {
        groups: Option<Vec<String>>,
    }

    #[async_trait]
    impl AuthorityProvider for StaticAuthorities {
        async fn repository_id(&self) -> Result<String> {
            Ok("r1".to_string())
        }

        async fn list_groups(&self, _username: &str) -> Result<Vec<String>> {
            self.groups
                .clone()
                .ok_or_else(|| PipelineError::Backend("groups unavailable".to_string()))
        }
    }

    #[derive(Default)]
    struct StaticIndex {
        embeddings: Vec<ScoredEmbedding>,
        documents: HashMap<String, LakeDocument>,
        last_filter: std::sync::Mutex<Option<String>>,
        last_limit: std::sync::Mutex<Option<u32>>,
    }

    #[async_trait]
    impl VectorIndex for StaticIndex {
        async fn vector_search(
            &self,
            _vector: Vec<f64>,
            _embedding_type: Option<&str>,
            hxql_filter: Option<&str>,
            limit: u32,
        ) -> Result<VectorSearchResult> {
            *self.last_filter.lock().unwrap() = hxql_filter.map(|s| s.to_string());
            *self.last_limit.lock().unwrap() = Some(limit);
            Ok(VectorSearchResult {
                embeddings: self.embeddings.clone(),
                total_count: Some(self.embeddings.len() as i64),
            })
        }

        async fn find_document(&self, lake_id: &str) -> Result<Option<LakeDocument>> {
            Ok(self.documents.get(lake_id).cloned())
        }
    }

    fn hit(doc_id: &str, text: &str, score: f64) -> ScoredEmbedding {
        ScoredEmbedding {
            id: Some(format!("emb-{}", doc_id)),
            document_id: Some(doc_id.to_string()),
            embedding_type: Some("test-model".to_string()),
            text: text.to_string(),
            score: Some(score),
            location: Some(EmbeddingLocation::paragraph(0)),
        }
    }

    fn lake_doc(source_id: &str, name: &str) -> LakeDocument {
        let mut props = Map::new();
        props.insert("name".to_string(), name.into());
        props.insert("mimeType".to_string(), "application/pdf".into());
        LakeDocument {
            sys_name: Some(source_id.to_string()),
            paths: Some(vec![format!("/sync/r1/{}", source_id)]),
            ingest_properties: Some(props),
            ..Default::default()
        }
    }

    fn service(
        index: StaticIndex,
        groups: Option<Vec<String>>,
    ) -> SemanticSearchService<MockEmbeddingModel, StaticIndex, StaticAuthorities> {
        SemanticSearchService::new(
            Arc::new(EmbeddingService::new(
                MockEmbeddingModel::new(8),
                "test-model",
                true,
            )),
            Arc::new(index),
            Arc::new(StaticAuthorities { groups }),
            0.5,
        )
    }

    fn request(query: &str) -> SemanticSearchRequest {
        SemanticSearchRequest {
            query: query.to_string(),
            top_k: None,
            embedding_type: None,
            filter: None,
            min_score: None,
        }
    }

    #[test]
    fn permission_filter_contains_exact_clauses() {
        let filter = build_permission_filter(
            "alice",
            &[
                "alice".to_string(),
                "GROUP_users".to_string(),
                "GROUP_EVERYONE".to_string(),
            ],
            "r1",
            None,
        );

        assert_eq!(
            filter,
            "SELECT * FROM SysContent WHERE (racl = '__Everyone__' OR racl = 'alice_#_r1' OR racl = 'g:GROUP_users_#_r1')"
        );
    }

    #[test]
    fn permission_filter_ands_additional_filter() {
        let filter = build_permission_filter(
            "alice",
            &["alice".to_string()],
            "r1",
            Some("mimeType = 'application/pdf'"),
        );

        assert!(filter.starts_with("SELECT * FROM SysContent WHERE (racl = '__Everyone__'"));
        assert!(filter.ends_with("AND (mimeType = 'application/pdf')"));
    }

    #[test]
    fn permission_filter_escapes_quotes() {
        let filter =
            build_permission_filter("o'brien", &["o'brien".to_string()], "r1", None);
        assert!(filter.contains("racl = 'o''brien_#_r1'"));
    }

    #[test]
    fn permission_filter_falls_back_to_username() {
        let filter = build_permission_filter("alice", &[], "r1", None);
        assert!(filter.contains("racl = '__Everyone__'"));
        assert!(filter.contains("racl = 'alice_#_r1'"));
    }

    #[test]
    fn min_score_resolution_clamps_and_defaults() {
        assert_eq!(resolve_min_score(None, 0.5), 0.5);
        assert_eq!(resolve_min_score(Some(0.7), 0.5), 0.7);
        assert_eq!(resolve_min_score(Some(f64::NAN), 0.5), 0.5);
        assert_eq!(resolve_min_score(Some(-0.2), 0.5), 0.5);
        assert_eq!(resolve_min_score(Some(0.0), 0.5), 0.5);
        assert_eq!(resolve_min_score(Some(1.8), 0.5), 1.0);
    }

    #[tokio::test]
    async fn search_builds_filter_from_caller_authorities() {
        let index = StaticIndex::default();
        let svc = service(
            index,
            Some(vec![
                "GROUP_users".to_string(),
                "GROUP_EVERYONE".to_string(),
            ]),
        );

        svc.search(&request("find the budget"), "alice")
            .await
            .unwrap();

        let filter = svc.index.last_filter.lock().unwrap().clone().unwrap();
        assert!(filter.contains("racl = '__Everyone__'"));
        assert!(filter.contains("racl = 'alice_#_r1'"));
        assert!(filter.contains("racl = 'g:GROUP_users_#_r1'"));
        assert!(!filter.contains("GROUP_EVERYONE_"));
    }

    #[tokio::test]
    async fn top_k_is_clamped_into_range() {
        let svc = service(StaticIndex::default(), Some(vec![]));

        let mut req = request("clamp low");
        req.top_k = Some(0);
        svc.search(&req, "alice").await.unwrap();
        assert_eq!(svc.index.last_limit.lock().unwrap().unwrap(), 1);

        let mut req = request("clamp high");
        req.top_k = Some(500);
        svc.search(&req, "alice").await.unwrap();
        assert_eq!(svc.index.last_limit.lock().unwrap().unwrap(), 50);
    }

    #[tokio::test]
    async fn group_lookup_failure_degrades_to_username_and_everyone() {
        let svc = service(StaticIndex::default(), None);

        svc.search(&request("anything"), "bob").await.unwrap();

        let filter = svc.index.last_filter.lock().unwrap().clone().unwrap();
        assert!(filter.contains("racl = '__Everyone__'"));
        assert!(filter.contains("racl = 'bob_#_r1'"));
    }

    #[tokio::test]
    async fn hits_are_ranked_enriched_and_score_filtered() {
        let mut index = StaticIndex {
            embeddings: vec![
                hit("doc-1", "high scoring chunk", 0.9),
                hit("doc-2", "low scoring chunk", 0.2),
                hit("doc-1", "second good chunk", 0.7),
            ],
            ..Default::default()
        };
        index
            .documents
            .insert("doc-1".to_string(), lake_doc("node-1", "report.pdf"));

        let svc = service(index, Some(vec![]));
        let response = svc.search(&request("budget"), "alice").await.unwrap();

        assert_eq!(response.result_count, 2);
        assert_eq!(response.results[0].rank, 1);
        assert_eq!(response.results[1].rank, 2);
        assert!(response.results.iter().all(|h| h.score >= 0.5));

        let doc = &response.results[0].source_document;
        assert_eq!(doc.document_id.as_deref(), Some("doc-1"));
        assert_eq!(doc.source_id.as_deref(), Some("node-1"));
        assert_eq!(doc.name.as_deref(), Some("report.pdf"));
        assert_eq!(doc.mime_type.as_deref(), Some("application/pdf"));
        assert_eq!(response.vector_dimension, 8);
    }

    #[tokio::test]
    async fn unresolvable_document_keeps_bare_id() {
        let index = StaticIndex {
            embeddings: vec![hit("ghost-doc", "orphan chunk", 0.8)],
            ..Default::default()
        };

        let svc = service(index, Some(vec![]));
        let response = svc.search(&request("orphan"), "alice").await.unwrap();

        assert_eq!(response.result_count, 1);
        let doc = &response.results[0].source_document;
        assert_eq!(doc.document_id.as_deref(), Some("ghost-doc"));
        assert!(doc.name.is_none());
    }

    #[tokio::test]
    async fn empty_query_vector_returns_empty_response() {
        let svc = service(StaticIndex::default(), Some(vec![]));
        let response = svc.search(&request("   "), "alice").await.unwrap();

        assert_eq!(response.result_count, 0);
        assert_eq!(response.vector_dimension, 0);
        assert!(response.results.is_empty());
    }
}
