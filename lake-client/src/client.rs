use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::auth::TokenProvider;
use crate::error::LakeClientError;
use crate::models::{LakeDocument, LakeEmbedding, QueryResult, VectorQuery, VectorSearchResult};

pub const SYS_FILE: &str = "SysFile";
pub const SYS_FOLDER: &str = "SysFolder";
pub const EMBED_MIXIN: &str = "Embed";
pub const REMOTE_INGEST_MIXIN: &str = "RemoteIngest";

const DEFAULT_QUERY: &str = "SELECT * FROM SysContent";
const JSON_PATCH_CONTENT_TYPE: &str = "application/json-patch+json";

/// Typed client for the content lake REST API.
///
/// Every request carries a bearer token from the [`TokenProvider`] and the
/// `Repository` selector header.
pub struct LakeClient {
    http: reqwest::Client,
    base_url: String,
    repository_id: String,
    tokens: Arc<TokenProvider>,
}

impl LakeClient {
    pub fn new(
        base_url: impl Into<String>,
        repository_id: impl Into<String>,
        tokens: Arc<TokenProvider>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            repository_id: repository_id.into(),
            tokens,
        }
    }

    pub fn repository_id(&self) -> &str {
        &self.repository_id
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, LakeClientError> {
        let token = self.tokens.token().await?;
        Ok(self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .header("Repository", &self.repository_id))
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, LakeClientError> {
        let status = resp.status();
        match status.as_u16() {
            401 | 403 => Err(LakeClientError::Unauthorized),
            404 => Err(LakeClientError::NotFound(resp.url().path().to_string())),
            409 => Err(LakeClientError::Conflict(resp.url().path().to_string())),
            _ if !status.is_success() => {
                let path = resp.url().path().to_string();
                let body = resp.text().await.unwrap_or_default();
                Err(LakeClientError::ResponseError(format!(
                    "{} returned status {}: {}",
                    path, status, body
                )))
            }
            _ => Ok(resp),
        }
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        builder: reqwest::RequestBuilder,
    ) -> Result<T, LakeClientError> {
        let resp = builder
            .send()
            .await
            .map_err(|e| LakeClientError::ResponseError(e.to_string()))?;
        let resp = Self::check_status(resp).await?;
        resp.json::<T>()
            .await
            .map_err(|e| LakeClientError::ParsingError(format!("Failed to parse response: {}", e)))
    }

    // ---------------------------------------------------------------
    // Document operations by id
    // ---------------------------------------------------------------

    pub async fn get_by_id(&self, doc_id: &str) -> Result<LakeDocument, LakeClientError> {
        let builder = self
            .request(Method::GET, &format!("/api/documents/{}", doc_id))
            .await?;
        Self::send_json(builder).await
    }

    /// Full or partial replace; only the fields present in `payload` are
    /// overwritten.
    pub async fn update_by_id(
        &self,
        doc_id: &str,
        payload: &impl serde::Serialize,
    ) -> Result<LakeDocument, LakeClientError> {
        let builder = self
            .request(Method::PUT, &format!("/api/documents/{}", doc_id))
            .await?
            .json(payload);
        Self::send_json(builder).await
    }

    pub async fn patch_by_id(
        &self,
        doc_id: &str,
        ops: &[Value],
    ) -> Result<LakeDocument, LakeClientError> {
        let body = serde_json::to_string(ops)
            .map_err(|e| LakeClientError::ParsingError(e.to_string()))?;
        let builder = self
            .request(Method::PATCH, &format!("/api/documents/{}", doc_id))
            .await?
            .header(reqwest::header::CONTENT_TYPE, JSON_PATCH_CONTENT_TYPE)
            .body(body);
        Self::send_json(builder).await
    }

    pub async fn delete_by_id(&self, doc_id: &str) -> Result<(), LakeClientError> {
        let builder = self
            .request(Method::DELETE, &format!("/api/documents/{}", doc_id))
            .await?;
        let resp = builder
            .send()
            .await
            .map_err(|e| LakeClientError::ResponseError(e.to_string()))?;
        Self::check_status(resp).await?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Path-based operations
    // ---------------------------------------------------------------

    /// Checks whether a document exists at the given absolute path; 404 maps
    /// to `false`, any other client error propagates.
    pub async fn exists_by_path(&self, absolute_path: &str) -> Result<bool, LakeClientError> {
        let clean = strip_leading_slash(absolute_path);
        let builder = self
            .request(
                Method::GET,
                &format!("/api/documents/path/{}", encode_path_segments(clean)),
            )
            .await?;
        let resp = builder
            .send()
            .await
            .map_err(|e| LakeClientError::ResponseError(e.to_string()))?;

        match Self::check_status(resp).await {
            Ok(_) => Ok(true),
            Err(LakeClientError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Creates a document under the given parent path.
    pub async fn create_document(
        &self,
        parent_path: &str,
        document: &LakeDocument,
    ) -> Result<LakeDocument, LakeClientError> {
        let clean = strip_leading_slash(parent_path);
        debug!(path = clean, "Creating document");
        let builder = self
            .request(
                Method::POST,
                &format!(
                    "/api/documents/path/{}?enforceSysName=true",
                    encode_path_segments(clean)
                ),
            )
            .await?
            .json(document);
        Self::send_json(builder).await
    }

    /// Creates a folder under the given parent path, treating 409 Conflict
    /// (folder already exists) as success.
    pub async fn create_folder(
        &self,
        parent_path: &str,
        folder_name: &str,
    ) -> Result<(), LakeClientError> {
        let clean = strip_leading_slash(parent_path);
        let folder = LakeDocument {
            sys_primary_type: Some(SYS_FOLDER.to_string()),
            sys_name: Some(folder_name.to_string()),
            ..Default::default()
        };

        let builder = self
            .request(
                Method::POST,
                &format!(
                    "/api/documents/path/{}?enforceSysName=true",
                    encode_path_segments(clean)
                ),
            )
            .await?
            .json(&folder);
        let resp = builder
            .send()
            .await
            .map_err(|e| LakeClientError::ResponseError(e.to_string()))?;

        match Self::check_status(resp).await {
            Ok(_) | Err(LakeClientError::Conflict(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Ensures the full folder hierarchy exists by creating each path segment
    /// in order. 401/403 on any segment is a permission failure for the whole
    /// path.
    pub async fn ensure_folder(&self, absolute_path: &str) -> Result<(), LakeClientError> {
        let normalized = normalize_absolute_path(absolute_path);
        let clean = strip_leading_slash(&normalized);
        if clean.is_empty() {
            return Ok(());
        }

        let mut parent = String::new();
        for segment in clean.split('/').filter(|s| !s.trim().is_empty()) {
            let current = if parent.is_empty() {
                format!("/{}", segment)
            } else {
                format!("/{}/{}", parent, segment)
            };
            match self.create_folder(&parent, segment).await {
                Ok(()) => {}
                Err(LakeClientError::Unauthorized) => {
                    return Err(LakeClientError::PermissionDenied(format!(
                        "lake denied folder creation at path '{}'",
                        current
                    )));
                }
                Err(e) => return Err(e),
            }
            parent = if parent.is_empty() {
                segment.to_string()
            } else {
                format!("{}/{}", parent, segment)
            };
        }

        Ok(())
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    pub async fn query(
        &self,
        hxql: &str,
        limit: u32,
        offset: u32,
    ) -> Result<QueryResult, LakeClientError> {
        let body = json!({
            "query": hxql,
            "repositoryId": self.repository_id,
            "limit": limit,
            "offset": offset,
        });
        let builder = self.request(Method::POST, "/api/query").await?.json(&body);
        Self::send_json(builder).await
    }

    /// Finds the document whose `sys_name` carries the given source node id.
    /// Lookup failures are logged and treated as "not found" so the caller
    /// falls back to creating a fresh document.
    pub async fn find_by_source_id(&self, source_id: &str) -> Option<LakeDocument> {
        let hxql = format!(
            "SELECT * FROM SysContent WHERE sys_primaryType = 'SysFile' AND sys_name = '{}'",
            escape_hxql(source_id)
        );

        match self.query(&hxql, 1, 0).await {
            Ok(result) => result.documents.into_iter().next(),
            Err(e) => {
                warn!(source_id, error = %e, "Lookup by source id failed, will create a new document");
                None
            }
        }
    }

    /// Performs a kNN vector search.
    pub async fn vector_search(
        &self,
        vector: Vec<f64>,
        embedding_type: Option<&str>,
        hxql_filter: Option<&str>,
        limit: u32,
    ) -> Result<VectorSearchResult, LakeClientError> {
        let query = VectorQuery {
            vector,
            embedding_type: embedding_type.unwrap_or("*").to_string(),
            query: hxql_filter.unwrap_or(DEFAULT_QUERY).to_string(),
            repository_id: self.repository_id.clone(),
            limit,
            offset: 0,
            track_total_count: true,
        };
        let builder = self
            .request(Method::POST, "/api/query/embeddings")
            .await?
            .json(&query);
        Self::send_json(builder).await
    }

    // ---------------------------------------------------------------
    // Embedding management
    // ---------------------------------------------------------------

    /// Replaces the document's embedding list, first ensuring the `Embed`
    /// mixin is present.
    pub async fn update_embeddings(
        &self,
        doc_id: &str,
        embeddings: &[LakeEmbedding],
    ) -> Result<(), LakeClientError> {
        info!(doc_id, count = embeddings.len(), "Updating embeddings");

        let current = self.get_by_id(doc_id).await?;
        if !current.has_mixin(EMBED_MIXIN) {
            debug!(doc_id, "Adding {} mixin", EMBED_MIXIN);
            self.patch_by_id(
                doc_id,
                &[json!({ "op": "add", "path": "/mixins/-", "value": EMBED_MIXIN })],
            )
            .await?;
        }

        self.update_by_id(doc_id, &json!({ "embeddings": embeddings }))
            .await?;

        let vector_dim = embeddings.first().map(|e| e.vector.len()).unwrap_or(0);
        info!(doc_id, count = embeddings.len(), vector_dim, "Embeddings updated");
        Ok(())
    }

    /// Clears the document's embedding list. A document without the `Embed`
    /// mixin has nothing to clear.
    pub async fn delete_embeddings(&self, doc_id: &str) -> Result<(), LakeClientError> {
        let doc = self.get_by_id(doc_id).await?;
        if !doc.has_mixin(EMBED_MIXIN) {
            debug!(doc_id, "No {} mixin, nothing to clear", EMBED_MIXIN);
            return Ok(());
        }

        self.update_by_id(doc_id, &json!({ "embeddings": [] }))
            .await?;
        info!(doc_id, "Cleared embeddings");
        Ok(())
    }

    // ---------------------------------------------------------------
    // Raw model access (used by the provisioner)
    // ---------------------------------------------------------------

    pub(crate) async fn get_model(&self) -> Result<Value, LakeClientError> {
        let builder = self.request(Method::GET, "/api/repository/model").await?;
        Self::send_json(builder).await
    }

    pub(crate) async fn patch_model(&self, ops: &[Value]) -> Result<(), LakeClientError> {
        let body = serde_json::to_string(ops)
            .map_err(|e| LakeClientError::ParsingError(e.to_string()))?;
        let builder = self
            .request(Method::PATCH, "/api/repository/model?validateOnly=false")
            .await?
            .header(reqwest::header::CONTENT_TYPE, JSON_PATCH_CONTENT_TYPE)
            .body(body);
        let resp = builder
            .send()
            .await
            .map_err(|e| LakeClientError::ResponseError(e.to_string()))?;
        Self::check_status(resp).await?;
        Ok(())
    }
}

/// Escapes a string literal for inclusion in an HXQL query by doubling
/// single quotes.
pub fn escape_hxql(value: &str) -> String {
    value.replace('\'', "''")
}

/// Applies RFC 3986 path-segment percent-encoding to each `/`-separated
/// segment, leaving the separators as literal characters. The lake rejects
/// requests carrying an encoded slash.
pub fn encode_path_segments(path: &str) -> String {
    path.split('/')
        .map(encode_path_segment)
        .collect::<Vec<_>>()
        .join("/")
}

fn encode_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        let keep = byte.is_ascii_alphanumeric()
            || matches!(
                byte,
                b'-' | b'.' | b'_' | b'~'
                    | b'!' | b'$' | b'&' | b'\'' | b'(' | b')'
                    | b'*' | b'+' | b',' | b';' | b'=' | b':' | b'@'
            );
        if keep {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn normalize_absolute_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return "/".to_string();
    }
    let with_slash = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    };
    if with_slash.len() > 1 && with_slash.ends_with('/') {
        with_slash[..with_slash.len() - 1].to_string()
    } else {
        with_slash
    }
}

fn strip_leading_slash(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}
