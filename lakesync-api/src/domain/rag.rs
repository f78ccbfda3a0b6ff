//! Retrieval-augmented generation: permission-filtered retrieval, grounded
//! prompt assembly under a character cap, and answer generation.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::error::Result;
use super::search::{SearchHit, SemanticSearchRequest, SemanticSearchService};
use super::traits::{AuthorityProvider, ChatModel, EmbeddingModel, VectorIndex};

const NO_CONTEXT_ANSWER: &str = "I couldn't find any relevant documents to answer your question. \
     Please try rephrasing your query or ensure the relevant documents have been ingested.";
const NO_CONTEXT_MODEL: &str = "none (no context available)";

/// Space that must remain for a truncated entry to be worth appending.
const MIN_TRUNCATED_ENTRY: usize = 100;
const TRUNCATION_MARKER: &str = "\n... (context truncated)";

#[derive(Debug, Clone)]
pub struct RagProperties {
    pub default_top_k: u32,
    pub default_min_score: f64,
    pub max_context_length: usize,
    pub default_system_prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagPromptRequest {
    pub question: String,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub min_score: Option<f64>,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub embedding_type: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub include_context: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RagPromptResponse {
    pub answer: String,
    pub question: String,
    pub model: String,
    pub search_time_ms: u64,
    pub generation_time_ms: u64,
    pub total_time_ms: u64,
    pub sources_used: usize,
    pub sources: Vec<RagSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<ContextChunk>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RagSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub chunk_text: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextChunk {
    pub rank: usize,
    pub score: f64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
}

/// Orchestrates the three-phase pipeline: retrieve, augment, generate.
pub struct RagService<M, V, A, C> {
    search: Arc<SemanticSearchService<M, V, A>>,
    chat: Arc<C>,
    properties: RagProperties,
}

impl<M, V, A, C> RagService<M, V, A, C>
where
    M: EmbeddingModel,
    V: VectorIndex,
    A: AuthorityProvider,
    C: ChatModel,
{
    pub fn new(
        search: Arc<SemanticSearchService<M, V, A>>,
        chat: Arc<C>,
        properties: RagProperties,
    ) -> Self {
        Self {
            search,
            chat,
            properties,
        }
    }

    pub async fn prompt(
        &self,
        request: &RagPromptRequest,
        username: &str,
    ) -> Result<RagPromptResponse> {
        let total_start = Instant::now();

        // 1. Retrieve.
        let top_k = request.top_k.unwrap_or(self.properties.default_top_k);
        let min_score = request
            .min_score
            .filter(|s| *s > 0.0)
            .unwrap_or(self.properties.default_min_score);

        let search_request = SemanticSearchRequest {
            query: request.question.clone(),
            top_k: Some(top_k),
            embedding_type: request.embedding_type.clone(),
            filter: request.filter.clone(),
            min_score: Some(min_score),
        };

        info!(
            question = %request.question,
            top_k, min_score, "RAG retrieve phase"
        );
        let search_response = self.search.search(&search_request, username).await?;
        let search_time_ms = search_response.search_time_ms;
        let hits = search_response.results;
        info!(
            chunks = hits.len(),
            search_time_ms, "RAG retrieve phase complete"
        );

        // 2. Augment.
        let context_block = assemble_context(&hits, self.properties.max_context_length);
        let system_prompt = request
            .system_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(&self.properties.default_system_prompt);
        let user_prompt = build_user_prompt(&request.question, &context_block);
        debug!(
            context_len = context_block.len(),
            sources = hits.len(),
            "RAG augment phase"
        );

        // 3. Generate.
        let generation_start = Instant::now();
        let (answer, model) = if hits.is_empty() {
            (NO_CONTEXT_ANSWER.to_string(), NO_CONTEXT_MODEL.to_string())
        } else {
            match self.chat.complete(system_prompt, &user_prompt).await {
                Ok(completion) => {
                    info!(
                        model = %completion.model,
                        answer_len = completion.text.len(),
                        "RAG generate phase complete"
                    );
                    (completion.text, completion.model)
                }
                Err(e) => {
                    error!(error = %e, "Answer generation failed");
                    (
                        format!("An error occurred while generating the answer: {}", e),
                        "error".to_string(),
                    )
                }
            }
        };
        let generation_time_ms = generation_start.elapsed().as_millis() as u64;

        let sources: Vec<RagSource> = hits
            .iter()
            .map(|hit| RagSource {
                document_id: hit.source_document.document_id.clone(),
                source_id: hit.source_document.source_id.clone(),
                name: hit.source_document.name.clone(),
                path: hit.source_document.path.clone(),
                chunk_text: hit.chunk_text.clone(),
                score: hit.score,
            })
            .collect();

        let context = request.include_context.then(|| {
            hits.iter()
                .map(|hit| ContextChunk {
                    rank: hit.rank,
                    score: hit.score,
                    text: hit.chunk_text.clone(),
                    source_name: hit.source_document.name.clone(),
                    source_path: hit.source_document.path.clone(),
                })
                .collect()
        });

        Ok(RagPromptResponse {
            answer,
            question: request.question.clone(),
            model,
            search_time_ms,
            generation_time_ms,
            total_time_ms: total_start.elapsed().as_millis() as u64,
            sources_used: sources.len(),
            sources,
            context,
        })
    }
}

/// Assembles the context block: labeled chunk entries appended in rank order
/// while they fit under the cap. When the next entry would overflow, a
/// truncated prefix is appended only when at least 100 characters remain,
/// followed by the truncation marker.
pub fn assemble_context(hits: &[SearchHit], max_length: usize) -> String {
    if hits.is_empty() {
        return String::new();
    }

    let mut context = String::new();

    for (i, hit) in hits.iter().enumerate() {
        let source_name = hit
            .source_document
            .name
            .as_deref()
            .unwrap_or("Unknown document");

        let entry = format!(
            "[Source {}: {} (score: {:.2})]\n{}\n\n",
            i + 1,
            source_name,
            hit.score,
            hit.chunk_text
        );

        if context.len() + entry.len() > max_length {
            let remaining = max_length.saturating_sub(context.len());
            if remaining > MIN_TRUNCATED_ENTRY {
                let cut = floor_char_boundary(&entry, remaining);
                context.push_str(&entry[..cut]);
                context.push_str(TRUNCATION_MARKER);
            }
            break;
        }

        context.push_str(&entry);
    }

    context.trim().to_string()
}

pub fn build_user_prompt(question: &str, context: &str) -> String {
    format!(
        "Based on the following document context, answer the question.\n\n--- DOCUMENT CONTEXT ---\n{}\n--- END CONTEXT ---\n\nQuestion: {}\n\nAnswer:",
        context, question
    )
}

fn floor_char_boundary(text: &str, at: usize) -> usize {
    let mut i = at.min(text.len());
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chat::mock::MockChatModel;
    use crate::domain::embedding::mock::MockEmbeddingModel;
    use crate::domain::embedding::EmbeddingService;
    use crate::domain::error::PipelineError;
    use crate::domain::search::{ChunkMetadata, SourceDocumentRef};
    use crate::domain::traits::VectorIndex;
    use async_trait::async_trait;
    use lake_client::{EmbeddingLocation, LakeDocument, ScoredEmbedding, VectorSearchResult};

    fn hit(rank: usize, name: &str, text: &str, score: f64) -> SearchHit {
        SearchHit {
            rank,
            score,
            chunk_text: text.to_string(),
            source_document: SourceDocumentRef {
                document_id: Some(format!("doc-{}", rank)),
                source_id: Some(format!("node-{}", rank)),
                name: Some(name.to_string()),
                path: Some(format!("/docs/{}", name)),
                mime_type: None,
            },
            chunk_metadata: ChunkMetadata::default(),
        }
    }

    #[test]
    fn context_entries_are_labeled_with_rank_and_score() {
        let context = assemble_context(&[hit(1, "a.pdf", "first chunk", 0.91)], 12_000);
        assert_eq!(context, "[Source 1: a.pdf (score: 0.91)]\nfirst chunk");
    }

    #[test]
    fn context_respects_cap_with_truncation_marker() {
        let chunk = "x".repeat(5000);
        let hits = vec![
            hit(1, "a.pdf", &chunk, 0.9),
            hit(2, "b.pdf", &chunk, 0.8),
            hit(3, "c.pdf", &chunk, 0.7),
        ];

        let context = assemble_context(&hits, 12_000);
        assert!(context.len() <= 12_000 + TRUNCATION_MARKER.len());
        assert!(context.contains("[Source 1: a.pdf"));
        assert!(context.contains("[Source 2: b.pdf"));
        assert!(context.contains("[Source 3: c.pdf"));
        assert!(context.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn truncated_tail_is_skipped_when_too_little_room_remains() {
        let hits = vec![
            hit(1, "a.pdf", &"x".repeat(960), 0.9),
            hit(2, "b.pdf", &"y".repeat(500), 0.8),
        ];

        // First entry leaves fewer than 100 chars of room.
        let context = assemble_context(&hits, 1050);
        assert!(!context.contains("(context truncated)"));
        assert!(!context.contains("b.pdf"));
    }

    #[test]
    fn user_prompt_follows_template() {
        let prompt = build_user_prompt("What is the budget?", "CONTEXT HERE");
        assert_eq!(
            prompt,
            "Based on the following document context, answer the question.\n\n--- DOCUMENT CONTEXT ---\nCONTEXT HERE\n--- END CONTEXT ---\n\nQuestion: What is the budget?\n\nAnswer:"
        );
    }

    // Full-pipeline fixtures: a static index with one scored chunk.

    struct OneHitIndex;

    #[async_trait]
    impl VectorIndex for OneHitIndex {
        async fn vector_search(
            &self,
            _vector: Vec<f64>,
            _embedding_type: Option<&str>,
            _filter: Option<&str>,
            _limit: u32,
        ) -> Result<VectorSearchResult> {
            Ok(VectorSearchResult {
                embeddings: vec![ScoredEmbedding {
                    id: Some("emb-1".to_string()),
                    document_id: Some("doc-1".to_string()),
                    embedding_type: Some("test-model".to_string()),
                    text: "The budget is 1.2 million.".to_string(),
                    score: Some(0.92),
                    location: Some(EmbeddingLocation::paragraph(0)),
                }],
                total_count: Some(1),
            })
        }

        async fn find_document(&self, _lake_id: &str) -> Result<Option<LakeDocument>> {
            Ok(Some(LakeDocument {
                sys_name: Some("node-1".to_string()),
                ..Default::default()
            }))
        }
    }

    struct EmptyIndex;

    #[async_trait]
    impl VectorIndex for EmptyIndex {
        async fn vector_search(
            &self,
            _vector: Vec<f64>,
            _embedding_type: Option<&str>,
            _filter: Option<&str>,
            _limit: u32,
        ) -> Result<VectorSearchResult> {
            Ok(VectorSearchResult::default())
        }

        async fn find_document(&self, _lake_id: &str) -> Result<Option<LakeDocument>> {
            Ok(None)
        }
    }

    struct TestAuthorities;

    #[async_trait]
    impl crate::domain::traits::AuthorityProvider for TestAuthorities {
        async fn repository_id(&self) -> Result<String> {
            Ok("r1".to_string())
        }

        async fn list_groups(&self, _username: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    fn properties() -> RagProperties {
        RagProperties {
            default_top_k: 5,
            default_min_score: 0.5,
            max_context_length: 12_000,
            default_system_prompt: "Answer strictly from the given context.".to_string(),
        }
    }

    fn rag_service<V: VectorIndex>(
        index: V,
        chat: MockChatModel,
    ) -> RagService<MockEmbeddingModel, V, TestAuthorities, MockChatModel> {
        let search = Arc::new(SemanticSearchService::new(
            Arc::new(EmbeddingService::new(
                MockEmbeddingModel::new(8),
                "test-model",
                true,
            )),
            Arc::new(index),
            Arc::new(TestAuthorities),
            0.5,
        ));
        RagService::new(search, Arc::new(chat), properties())
    }

    fn prompt_request(question: &str) -> RagPromptRequest {
        RagPromptRequest {
            question: question.to_string(),
            top_k: None,
            min_score: None,
            filter: None,
            embedding_type: None,
            system_prompt: None,
            include_context: false,
        }
    }

    #[tokio::test]
    async fn prompt_returns_grounded_answer_with_sources() {
        let chat = MockChatModel::answering("The budget is 1.2 million [Source 1].");
        let svc = rag_service(OneHitIndex, chat.clone());

        let response = svc
            .prompt(&prompt_request("What is the budget?"), "alice")
            .await
            .unwrap();

        assert_eq!(response.answer, "The budget is 1.2 million [Source 1].");
        assert_eq!(response.model, "mock-chat");
        assert_eq!(response.sources_used, 1);
        assert_eq!(response.sources[0].source_id.as_deref(), Some("node-1"));
        assert!(response.context.is_none());

        let (system, user) = chat.last_prompts().unwrap();
        assert_eq!(system, "Answer strictly from the given context.");
        assert!(user.contains("--- DOCUMENT CONTEXT ---"));
        assert!(user.contains("The budget is 1.2 million."));
        assert!(user.contains("Question: What is the budget?"));
    }

    #[tokio::test]
    async fn no_hits_returns_canned_answer_without_chat_call() {
        let chat = MockChatModel::answering("should never be used");
        let svc = rag_service(EmptyIndex, chat.clone());

        let response = svc
            .prompt(&prompt_request("Anything at all?"), "alice")
            .await
            .unwrap();

        assert_eq!(response.answer, NO_CONTEXT_ANSWER);
        assert_eq!(response.model, NO_CONTEXT_MODEL);
        assert_eq!(response.sources_used, 0);
        assert!(chat.last_prompts().is_none());
    }

    #[tokio::test]
    async fn chat_failure_becomes_answer_text() {
        let svc = rag_service(OneHitIndex, MockChatModel::failing());

        let response = svc
            .prompt(&prompt_request("What is the budget?"), "alice")
            .await
            .unwrap();

        assert_eq!(response.model, "error");
        assert!(response
            .answer
            .starts_with("An error occurred while generating the answer"));
    }

    #[tokio::test]
    async fn include_context_echoes_chunks() {
        let chat = MockChatModel::answering("answer");
        let svc = rag_service(OneHitIndex, chat);

        let mut request = prompt_request("What is the budget?");
        request.include_context = true;

        let response = svc.prompt(&request, "alice").await.unwrap();
        let context = response.context.unwrap();
        assert_eq!(context.len(), 1);
        assert_eq!(context[0].text, "The budget is 1.2 million.");
        assert_eq!(context[0].rank, 1);
    }

    #[tokio::test]
    async fn custom_system_prompt_overrides_default() {
        let chat = MockChatModel::answering("answer");
        let svc = rag_service(OneHitIndex, chat.clone());

        let mut request = prompt_request("question?");
        request.system_prompt = Some("You are a terse auditor.".to_string());

        svc.prompt(&request, "alice").await.unwrap();
        let (system, _) = chat.last_prompts().unwrap();
        assert_eq!(system, "You are a terse auditor.");
    }

    #[tokio::test]
    async fn search_failure_propagates() {
        struct BrokenIndex;

        #[async_trait]
        impl VectorIndex for BrokenIndex {
            async fn vector_search(
                &self,
                _vector: Vec<f64>,
                _embedding_type: Option<&str>,
                _filter: Option<&str>,
                _limit: u32,
            ) -> Result<VectorSearchResult> {
                Err(PipelineError::Backend("index offline".to_string()))
            }

            async fn find_document(&self, _lake_id: &str) -> Result<Option<LakeDocument>> {
                Ok(None)
            }
        }

        let svc = rag_service(BrokenIndex, MockChatModel::answering("x"));
        let err = svc.prompt(&prompt_request("q?"), "alice").await.unwrap_err();
        assert!(matches!(err, PipelineError::Backend(_)));
    }
}
