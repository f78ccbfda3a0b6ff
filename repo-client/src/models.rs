use serde::Deserialize;
use time::OffsetDateTime;

/// Generic paged list response from the source repository. Every listing
/// endpoint wraps its items as `list.entries[].entry`.
#[derive(Debug, Deserialize)]
pub struct PagedResponse<T> {
    pub list: EntryList<T>,
}

#[derive(Debug, Deserialize)]
pub struct EntryList<T> {
    pub entries: Vec<Entry<T>>,
}

#[derive(Debug, Deserialize)]
pub struct Entry<T> {
    pub entry: T,
}

impl<T> PagedResponse<T> {
    pub fn into_entries(self) -> Vec<T> {
        self.list.entries.into_iter().map(|e| e.entry).collect()
    }
}

/// Single-entry response wrapper (`{"entry": {...}}`).
#[derive(Debug, Deserialize)]
pub struct EntryResponse<T> {
    pub entry: T,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceNode {
    pub id: String,
    pub name: String,
    pub node_type: String,
    pub is_folder: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub modified_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub aspect_names: Option<Vec<String>>,
    #[serde(default)]
    pub path: Option<PathInfo>,
    #[serde(default)]
    pub content: Option<ContentInfo>,
    #[serde(default)]
    pub permissions: Option<PermissionsInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathInfo {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentInfo {
    pub mime_type: String,
    #[serde(default)]
    pub size_in_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionsInfo {
    #[serde(default)]
    pub is_inheritance_enabled: Option<bool>,
    #[serde(default)]
    pub inherited: Option<Vec<PermissionElement>>,
    #[serde(default)]
    pub locally_set: Option<Vec<PermissionElement>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionElement {
    pub authority_id: String,
    /// Role name, e.g. "Consumer" or "Collaborator".
    pub name: String,
    pub access_status: AccessStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessStatus {
    Allowed,
    Denied,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMembership {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryInfo {
    pub repository: RepositoryEntry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryEntry {
    pub id: String,
}
