use std::net::SocketAddr;
use std::sync::Arc;

use lake_client::{LakeClient, ModelProvisioner, TokenProvider};
use repo_client::SourceClient;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::app_state::AppState;
use crate::config::{read_config, Settings};
use crate::domain::chat::OpenAiChatModel;
use crate::domain::chunking::{
    AdaptiveChunking, ChunkingConfig, ChunkingService, ChunkingStrategy, FixedWindowChunking,
    NoiseReduction,
};
use crate::domain::discovery::{Discovery, ExclusionRules};
use crate::domain::embedding::{EmbeddingService, OpenAiEmbeddingModel};
use crate::domain::ingest::{
    BatchIngestionService, JobRegistry, MetadataIngester, TextExtractor, TransformWorkerPool,
    TransformationQueue, WorkerContext,
};
use crate::domain::rag::{RagProperties, RagService};
use crate::domain::search::SemanticSearchService;
use crate::domain::transform::TransformClient;

mod app_state;
mod auth;
mod config;
mod domain;
mod router;
mod routes;

#[tokio::main]
async fn main() {
    dotenvy::from_filename("./lakesync-api/.env.local").ok();
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy()
                .add_directive("hyper=info".parse().unwrap()),
        )
        .init();

    let settings = read_config().expect("Failed to read configuration");

    let repo = Arc::new(SourceClient::new(
        &settings.source.url,
        &settings.source.username,
        &settings.source.password,
    ));

    let tokens = Arc::new(TokenProvider::new(
        &settings.lake.idp.token_url,
        &settings.lake.idp.client_id,
        &settings.lake.idp.client_secret,
        &settings.lake.idp.username,
        &settings.lake.idp.password,
    ));
    let lake = Arc::new(LakeClient::new(
        &settings.lake.url,
        &settings.lake.repository_id,
        tokens,
    ));

    bootstrap_model(&settings, &lake).await;

    let (state, worker_pool) = build_state(&settings, repo, lake);

    let app = router::create(state);

    let socket_addr = format!("{}:{}", settings.application.host, settings.application.port)
        .parse::<SocketAddr>()
        .expect("Failed to parse socket address");

    tracing::info!("Starting server at {}", socket_addr);
    let listener = TcpListener::bind(socket_addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server failed");

    tracing::info!("Shutting down transformation workers");
    worker_pool.shutdown().await;
}

/// Applies the configured model fragments to the lake before anything writes
/// documents. An incomplete bootstrap is a fatal startup error.
async fn bootstrap_model(settings: &Settings, lake: &Arc<LakeClient>) {
    if !settings.lake.model_bootstrap.enabled {
        tracing::info!("Lake model bootstrap disabled");
        return;
    }

    let raw = std::fs::read_to_string(&settings.lake.model_bootstrap.fragments_path)
        .expect("Failed to read model fragments file");
    let fragment: serde_json::Value =
        serde_json::from_str(&raw).expect("Model fragments file is not valid JSON");

    ModelProvisioner::new(lake)
        .ensure_model(&fragment)
        .await
        .expect("Lake model bootstrap failed");
}

fn build_state(
    settings: &Settings,
    repo: Arc<SourceClient>,
    lake: Arc<LakeClient>,
) -> (AppState, TransformWorkerPool) {
    let embedding_settings = &settings.embedding;

    let embedding = Arc::new(EmbeddingService::new(
        OpenAiEmbeddingModel::new(&embedding_settings.url, &embedding_settings.model_name),
        &embedding_settings.model_name,
        embedding_settings.query_instruction_prefix_enabled,
    ));

    let strategy: Box<dyn ChunkingStrategy> = if embedding_settings.adaptive_chunking {
        Box::new(AdaptiveChunking)
    } else {
        Box::new(
            FixedWindowChunking::new(
                embedding_settings.chunk_size,
                embedding_settings.chunk_overlap,
            )
            .expect("Invalid chunking configuration"),
        )
    };
    let chunking = Arc::new(ChunkingService::new(
        NoiseReduction::new(embedding_settings.aggressive_noise_reduction),
        ChunkingConfig {
            min_chunk_size: embedding_settings.min_chunk_size,
            max_chunk_size: embedding_settings.max_chunk_size,
        },
        strategy,
    ));

    let transform = Arc::new(TransformClient::new(
        &settings.transform_service.url,
        settings.transform_service.timeout_ms,
    ));
    let extractor = Arc::new(TextExtractor::new(
        repo.clone(),
        transform,
        settings.transform_service.enabled,
    ));

    let queue = Arc::new(TransformationQueue::new(
        settings.ingestion.transform.queue_capacity,
    ));
    let worker_pool = TransformWorkerPool::start(
        settings.ingestion.transform.worker_threads,
        WorkerContext {
            queue: queue.clone(),
            extractor,
            store: lake.clone(),
            chunking,
            embedding: embedding.clone(),
        },
    );

    let discovery = Arc::new(Discovery::new(
        repo.clone(),
        ExclusionRules::from(&settings.ingestion.exclude),
    ));
    let ingester = Arc::new(MetadataIngester::new(
        repo.clone(),
        lake.clone(),
        settings.lake.target_path.clone(),
    ));
    let jobs = Arc::new(JobRegistry::new());
    let ingestion = BatchIngestionService::new(
        discovery,
        ingester,
        queue.clone(),
        jobs,
        lake.clone(),
        settings.ingestion.sources.clone(),
        settings.batch.max_concurrent_jobs,
    );

    let search = Arc::new(SemanticSearchService::new(
        embedding,
        lake.clone(),
        repo.clone(),
        settings.semantic_search.default_min_score,
    ));
    let rag = Arc::new(RagService::new(
        search.clone(),
        Arc::new(OpenAiChatModel::new(
            &settings.chat.url,
            &settings.chat.model_name,
        )),
        RagProperties {
            default_top_k: settings.rag.default_top_k,
            default_min_score: settings.rag.default_min_score,
            max_context_length: settings.rag.max_context_length,
            default_system_prompt: settings.rag.default_system_prompt.clone(),
        },
    ));

    let state = AppState {
        repo,
        lake,
        queue,
        ingestion,
        search,
        rag,
        embedding_model_name: settings.embedding.model_name.clone(),
        chat_model_name: settings.chat.model_name.clone(),
    };

    (state, worker_pool)
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
}
