use std::collections::HashSet;
use std::path::PathBuf;

use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::SourceClientError;
use crate::models::{
    EntryResponse, GroupMembership, PagedResponse, Person, RepositoryInfo, SourceNode,
};

const DEFAULT_PAGE_SIZE: u32 = 100;
const GROUPS_PAGE_SIZE: u32 = 1000;

/// Roles that grant read access on a node.
pub const READ_ROLES: [&str; 5] = [
    "Consumer",
    "Contributor",
    "Collaborator",
    "Coordinator",
    "Manager",
];

/// Typed client for the source repository REST API.
///
/// Requests are authenticated with the configured service account, except for
/// ticket validation which authenticates with the ticket itself.
pub struct SourceClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    cached_repository_id: Mutex<Option<String>>,
}

impl SourceClient {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            cached_repository_id: Mutex::new(None),
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, url: String) -> Result<T, SourceClientError> {
        let resp = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| SourceClientError::ResponseError(e.to_string()))?;

        match resp.status().as_u16() {
            401 | 403 => return Err(SourceClientError::Unauthorized),
            404 => return Err(SourceClientError::NotFound(url)),
            s if s >= 400 => {
                return Err(SourceClientError::ResponseError(format!(
                    "{} returned status {}",
                    url, s
                )))
            }
            _ => {}
        }

        resp.json::<T>().await.map_err(|e| {
            SourceClientError::ParsingError(format!("Failed to parse response as JSON: {}", e))
        })
    }

    /// Lists one page of direct children of a folder, including properties,
    /// path and permissions.
    pub async fn list_children(
        &self,
        folder_id: &str,
        skip_count: u32,
        max_items: u32,
    ) -> Result<Vec<SourceNode>, SourceClientError> {
        let url = format!(
            "{}/api/nodes/{}/children?skipCount={}&maxItems={}&include=properties,path,permissions",
            self.base_url, folder_id, skip_count, max_items
        );
        let page: PagedResponse<SourceNode> = self.fetch(url).await?;
        Ok(page.into_entries())
    }

    /// Lists all direct children of a folder by paging until a short page.
    pub async fn list_all_children(
        &self,
        folder_id: &str,
    ) -> Result<Vec<SourceNode>, SourceClientError> {
        let mut all = Vec::new();
        let mut skip_count = 0;

        loop {
            let batch = self
                .list_children(folder_id, skip_count, DEFAULT_PAGE_SIZE)
                .await?;
            let batch_len = batch.len() as u32;
            all.extend(batch);

            if batch_len < DEFAULT_PAGE_SIZE {
                break;
            }
            skip_count += DEFAULT_PAGE_SIZE;
        }

        Ok(all)
    }

    /// Downloads the full content of a node into memory.
    pub async fn get_content(&self, node_id: &str) -> Result<Vec<u8>, SourceClientError> {
        let url = format!("{}/api/nodes/{}/content", self.base_url, node_id);
        let resp = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| SourceClientError::ResponseError(e.to_string()))?;

        match resp.status().as_u16() {
            401 | 403 => return Err(SourceClientError::Unauthorized),
            404 => return Err(SourceClientError::NotFound(node_id.to_string())),
            s if s >= 400 => {
                return Err(SourceClientError::ResponseError(format!(
                    "content download for {} returned status {}",
                    node_id, s
                )))
            }
            _ => {}
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SourceClientError::ResponseError(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    /// Streams the content of a node to a temporary file named
    /// `source-node-<id>-<sanitized file name>`.
    ///
    /// The caller owns the returned path and is responsible for deleting it.
    pub async fn download_to_temp_file(
        &self,
        node_id: &str,
        file_name: &str,
    ) -> Result<PathBuf, SourceClientError> {
        let safe_name = sanitize_file_name(file_name);

        let url = format!("{}/api/nodes/{}/content", self.base_url, node_id);
        let resp = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| SourceClientError::ResponseError(e.to_string()))?;

        match resp.status().as_u16() {
            401 | 403 => return Err(SourceClientError::Unauthorized),
            404 => return Err(SourceClientError::NotFound(node_id.to_string())),
            s if s >= 400 => {
                return Err(SourceClientError::ResponseError(format!(
                    "content download for {} returned status {}",
                    node_id, s
                )))
            }
            _ => {}
        }

        let temp = tempfile::Builder::new()
            .prefix(&format!("source-node-{}-", node_id))
            .suffix(&format!("-{}", safe_name))
            .tempfile()?;
        let path = temp.into_temp_path().keep().map_err(|e| {
            SourceClientError::IoError(std::io::Error::other(e))
        })?;

        let mut file = tokio::fs::File::create(&path).await?;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| SourceClientError::ResponseError(e.to_string()))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        tracing::debug!(node_id, path = %path.display(), "Downloaded content to temp file");
        Ok(path)
    }

    /// Extracts the authority identifiers that have read access on a node:
    /// inherited entries (only when inheritance is enabled) plus locally set
    /// entries, filtered to ALLOWED status and read-capable roles.
    pub fn extract_read_authorities(node: &SourceNode) -> HashSet<String> {
        let mut readers = HashSet::new();

        let Some(permissions) = &node.permissions else {
            return readers;
        };

        let inheritance_enabled = permissions.is_inheritance_enabled.unwrap_or(false);
        if inheritance_enabled {
            if let Some(inherited) = &permissions.inherited {
                add_allowed_readers(&mut readers, inherited);
            }
        }
        if let Some(locally_set) = &permissions.locally_set {
            add_allowed_readers(&mut readers, locally_set);
        }

        readers
    }

    /// Returns the repository identifier, fetching it from the discovery
    /// endpoint once and caching it for subsequent calls.
    pub async fn repository_id(&self) -> Result<String, SourceClientError> {
        let mut cached = self.cached_repository_id.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let url = format!("{}/api/discovery", self.base_url);
        let info: EntryResponse<RepositoryInfo> = self.fetch(url).await?;
        let id = info.entry.repository.id;
        *cached = Some(id.clone());

        Ok(id)
    }

    /// Lists the group memberships of a user, paging with a large page size.
    pub async fn list_groups(&self, username: &str) -> Result<Vec<String>, SourceClientError> {
        let mut groups = Vec::new();
        let mut skip_count = 0;

        loop {
            let url = format!(
                "{}/api/people/{}/groups?skipCount={}&maxItems={}",
                self.base_url, username, skip_count, GROUPS_PAGE_SIZE
            );
            let page: PagedResponse<GroupMembership> = self.fetch(url).await?;
            let entries = page.into_entries();
            let batch_len = entries.len() as u32;
            groups.extend(entries.into_iter().map(|g| g.id));

            if batch_len < GROUPS_PAGE_SIZE {
                break;
            }
            skip_count += GROUPS_PAGE_SIZE;
        }

        Ok(groups)
    }

    /// Validates a username/password pair by requesting a ticket.
    ///
    /// Returns `Ok(true)` on 201, `Ok(false)` when the repository rejected the
    /// credentials, and an error for anything else.
    pub async fn validate_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<bool, SourceClientError> {
        let url = format!("{}/api/authentication/tickets", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "userId": username, "password": password }))
            .send()
            .await
            .map_err(|e| SourceClientError::ResponseError(e.to_string()))?;

        match resp.status().as_u16() {
            201 => Ok(true),
            401 | 403 => Ok(false),
            s => Err(SourceClientError::ResponseError(format!(
                "ticket endpoint returned status {}",
                s
            ))),
        }
    }

    /// Validates a ticket against the `people/-me-` endpoint and resolves the
    /// real username from the response. Returns `None` for invalid tickets.
    pub async fn validate_ticket(
        &self,
        ticket: &str,
    ) -> Result<Option<String>, SourceClientError> {
        let url = format!(
            "{}/api/people/-me-?alf_ticket={}",
            self.base_url, ticket
        );
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceClientError::ResponseError(e.to_string()))?;

        match resp.status().as_u16() {
            200 => {
                let person: EntryResponse<Person> = resp.json().await.map_err(|e| {
                    SourceClientError::ParsingError(format!(
                        "Failed to parse -me- response: {}",
                        e
                    ))
                })?;
                Ok(Some(person.entry.id))
            }
            401 | 403 => Ok(None),
            s => Err(SourceClientError::ResponseError(format!(
                "-me- endpoint returned status {}",
                s
            ))),
        }
    }
}

fn add_allowed_readers(
    readers: &mut HashSet<String>,
    permissions: &[crate::models::PermissionElement],
) {
    use crate::models::AccessStatus;

    for perm in permissions {
        if perm.access_status == AccessStatus::Allowed && READ_ROLES.contains(&perm.name.as_str())
        {
            readers.insert(perm.authority_id.clone());
        }
    }
}

fn sanitize_file_name(file_name: &str) -> String {
    if file_name.trim().is_empty() {
        return "content.bin".to_string();
    }

    let mut sanitized = String::with_capacity(file_name.len());
    let mut last_was_replacement = false;
    for c in file_name.chars() {
        let forbidden = matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
            || c.is_control();
        if forbidden {
            if !last_was_replacement {
                sanitized.push('_');
            }
            last_was_replacement = true;
        } else {
            sanitized.push(c);
            last_was_replacement = false;
        }
    }

    let sanitized = sanitized.trim().to_string();
    if sanitized.is_empty() {
        return "content.bin".to_string();
    }

    sanitized.chars().take(120).collect()
}
