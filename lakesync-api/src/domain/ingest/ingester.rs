use std::sync::Arc;

use lake_client::{
    Ace, LakeClient, LakeClientError, LakeDocument, SyncStatus, REMOTE_INGEST_MIXIN, SYS_FILE,
};
use repo_client::{SourceClient, SourceNode};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::TransformationTask;
use crate::domain::error::{PipelineError, Result};

const EVERYONE_PRINCIPAL: &str = "__Everyone__";
const GROUP_PREFIX: &str = "GROUP_";
const GROUP_EVERYONE: &str = "GROUP_EVERYONE";

const P_SOURCE_NODE_ID: &str = "sourceNodeId";
const P_SOURCE_REPO_ID: &str = "sourceRepositoryId";
const P_NAME: &str = "name";
const P_PATH: &str = "path";
const P_MIME_TYPE: &str = "mimeType";
const P_MODIFIED_AT: &str = "modifiedAt";

/// Creates or updates one lake document per discovered source document and
/// emits the transformation task for phase two.
pub struct MetadataIngester {
    repo: Arc<SourceClient>,
    lake: Arc<LakeClient>,
    target_path: String,
}

impl MetadataIngester {
    pub fn new(repo: Arc<SourceClient>, lake: Arc<LakeClient>, target_path: String) -> Self {
        Self {
            repo,
            lake,
            target_path,
        }
    }

    /// Upserts the lake document for a source node and returns the task for
    /// the content phase.
    pub async fn ingest(&self, node: &SourceNode) -> Result<TransformationTask> {
        debug!(node_id = %node.id, name = %node.name, "Ingesting metadata");

        let repository_id = self.repo.repository_id().await?;
        let existing = self.lake.find_by_source_id(&node.id).await;

        let doc = match existing {
            Some(existing) => self.update_document(existing, node, &repository_id).await?,
            None => self.create_document(node, &repository_id).await?,
        };

        let lake_id = doc.sys_id.clone().ok_or_else(|| {
            PipelineError::InvariantViolation(format!(
                "lake returned a document without an id for node {}",
                node.id
            ))
        })?;

        Ok(TransformationTask::new(
            node.id.clone(),
            lake_id,
            node.content.as_ref().map(|c| c.mime_type.clone()),
            Some(node.name.clone()),
            node.path.as_ref().map(|p| p.name.clone()),
        ))
    }

    async fn update_document(
        &self,
        existing: LakeDocument,
        node: &SourceNode,
        repository_id: &str,
    ) -> Result<LakeDocument> {
        let lake_id = existing.sys_id.as_deref().ok_or_else(|| {
            PipelineError::InvariantViolation("existing document has no id".to_string())
        })?;

        let mut doc = self.build_document(node, repository_id);
        doc.sys_id = existing.sys_id.clone();

        // Absent fields are left untouched by the lake, so a previous
        // failure's syncError has to be nulled explicitly.
        let mut payload = serde_json::to_value(&doc).map_err(|e| {
            PipelineError::InvariantViolation(format!("document serialization failed: {}", e))
        })?;
        payload["syncError"] = Value::Null;

        let updated = self.lake.update_by_id(lake_id, &payload).await?;

        info!(lake_id, node_id = %node.id, "Updated lake document");
        Ok(updated)
    }

    async fn create_document(
        &self,
        node: &SourceNode,
        repository_id: &str,
    ) -> Result<LakeDocument> {
        let parent_path = self.build_parent_path(node, repository_id);
        self.lake.ensure_folder(&parent_path).await?;

        let mut doc = self.build_document(node, repository_id);
        doc.paths = Some(vec![join_path(&parent_path, &node.id)]);

        match self.lake.create_document(&parent_path, &doc).await {
            Ok(created) => {
                info!(
                    lake_id = created.sys_id.as_deref().unwrap_or(""),
                    node_id = %node.id,
                    path = %join_path(&parent_path, &node.id),
                    "Created lake document"
                );
                Ok(created)
            }
            Err(LakeClientError::Unauthorized) => Err(PipelineError::PermissionDenied(format!(
                "lake denied document creation at path '{}'",
                parent_path
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Builds the full lake projection of a source node.
    pub fn build_document(&self, node: &SourceNode, repository_id: &str) -> LakeDocument {
        let authorities = {
            let mut readers: Vec<String> =
                SourceClient::extract_read_authorities(node).into_iter().collect();
            readers.sort();
            readers
        };

        let ingest_properties = build_ingest_properties(node, repository_id);
        let ingest_property_names = ingest_properties.keys().cloned().collect();

        LakeDocument {
            sys_primary_type: Some(SYS_FILE.to_string()),
            sys_name: Some(node.id.clone()),
            mixins: Some(vec![REMOTE_INGEST_MIXIN.to_string()]),
            source_repository_id: Some(repository_id.to_string()),
            paths: Some(vec![join_path(
                &self.build_parent_path(node, repository_id),
                &node.id,
            )]),
            acl: Some(build_acl(&authorities, repository_id)),
            ingest_properties: Some(ingest_properties),
            ingest_property_names: Some(ingest_property_names),
            sync_status: Some(SyncStatus::Pending),
            sync_error: None,
            ..Default::default()
        }
    }

    /// Parent path in the lake: the configured target path plus the source
    /// repository id, joined with the document's own directory path. The
    /// repository prefix is omitted when the target path is the root.
    pub fn build_parent_path(&self, node: &SourceNode, repository_id: &str) -> String {
        let base = self.build_repository_root_path(repository_id);
        let Some(node_path) = node.path.as_ref().filter(|p| !p.name.trim().is_empty()) else {
            return base;
        };

        let source_path = normalize_absolute_path(&node_path.name);
        if base == "/" {
            source_path
        } else {
            format!("{}{}", base, source_path)
        }
    }

    fn build_repository_root_path(&self, repository_id: &str) -> String {
        let target = normalize_absolute_path(&self.target_path);
        if repository_id.trim().is_empty() {
            return target;
        }
        join_path(&target, repository_id.trim_start_matches('/'))
    }

    pub fn target_path(&self) -> &str {
        &self.target_path
    }
}

/// Maps source authorities onto the lake's ACL model: `GROUP_EVERYONE`
/// becomes the unsuffixed `__Everyone__` user principal, other authorities
/// get the `_#_<repositoryId>` external-identity suffix, and `GROUP_`
/// identifiers become group principals.
pub fn build_acl(authorities: &[String], repository_id: &str) -> Vec<Ace> {
    let suffix = format!("_#_{}", repository_id);

    authorities
        .iter()
        .map(|authority| {
            if authority == GROUP_EVERYONE {
                Ace::read_for_user(EVERYONE_PRINCIPAL)
            } else if authority.starts_with(GROUP_PREFIX) {
                Ace::read_for_group(format!("{}{}", authority, suffix))
            } else {
                Ace::read_for_user(format!("{}{}", authority, suffix))
            }
        })
        .collect()
}

/// Key-stable ordered projection of source attributes; null values omitted.
pub fn build_ingest_properties(node: &SourceNode, repository_id: &str) -> Map<String, Value> {
    let mut props = Map::new();

    props.insert(P_SOURCE_NODE_ID.to_string(), Value::String(node.id.clone()));
    props.insert(
        P_SOURCE_REPO_ID.to_string(),
        Value::String(repository_id.to_string()),
    );
    props.insert(P_NAME.to_string(), Value::String(node.name.clone()));
    if let Some(path) = node.path.as_ref() {
        props.insert(P_PATH.to_string(), Value::String(path.name.clone()));
    }
    if let Some(content) = node.content.as_ref() {
        props.insert(
            P_MIME_TYPE.to_string(),
            Value::String(content.mime_type.clone()),
        );
    }
    if let Some(modified_at) = node.modified_at {
        if let Ok(formatted) =
            modified_at.format(&time::format_description::well_known::Rfc3339)
        {
            props.insert(P_MODIFIED_AT.to_string(), Value::String(formatted));
        }
    }

    props
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

fn join_path(parent: &str, leaf: &str) -> String {
    let parent = normalize_absolute_path(parent);
    if parent == "/" {
        format!("/{}", leaf)
    } else {
        format!("{}/{}", parent, leaf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repo_client::{ContentInfo, PathInfo};
    use time::macros::datetime;

    fn node() -> SourceNode {
        SourceNode {
            id: "node-42".to_string(),
            name: "budget.pdf".to_string(),
            node_type: "content".to_string(),
            is_folder: false,
            modified_at: Some(datetime!(2025-06-01 10:30:00 UTC)),
            aspect_names: None,
            path: Some(PathInfo {
                name: "/Company Home/Finance".to_string(),
            }),
            content: Some(ContentInfo {
                mime_type: "application/pdf".to_string(),
                size_in_bytes: Some(1024),
            }),
            permissions: None,
        }
    }

    fn ingester(target_path: &str) -> MetadataIngester {
        let repo = Arc::new(SourceClient::new("http://source", "svc", "secret"));
        let tokens = Arc::new(lake_client::TokenProvider::new(
            "http://idp/token",
            "client",
            "secret",
            "svc",
            "secret",
        ));
        let lake = Arc::new(LakeClient::new("http://lake", "repo-1", tokens));
        MetadataIngester::new(repo, lake, target_path.to_string())
    }

    #[test]
    fn acl_maps_everyone_without_suffix() {
        let acl = build_acl(&["GROUP_EVERYONE".to_string()], "r1");
        assert_eq!(acl.len(), 1);
        assert_eq!(acl[0].user.as_ref().unwrap().id, "__Everyone__");
        assert!(acl[0].group.is_none());
    }

    #[test]
    fn acl_suffixes_users_and_groups() {
        let acl = build_acl(
            &["alice".to_string(), "GROUP_finance".to_string()],
            "r1",
        );

        let user = &acl[0];
        assert_eq!(user.user.as_ref().unwrap().id, "alice_#_r1");
        assert_eq!(user.permission, "Read");
        assert!(user.granted);

        let group = &acl[1];
        assert_eq!(group.group.as_ref().unwrap().id, "GROUP_finance_#_r1");
        assert!(group.user.is_none());
    }

    #[test]
    fn ingest_property_names_mirror_keys() {
        let ing = ingester("/sync");
        let doc = ing.build_document(&node(), "r1");

        let props = doc.ingest_properties.as_ref().unwrap();
        let names = doc.ingest_property_names.as_ref().unwrap();
        let keys: Vec<String> = props.keys().cloned().collect();
        assert_eq!(*names, keys);
        assert_eq!(props["sourceNodeId"], "node-42");
        assert_eq!(props["sourceRepositoryId"], "r1");
        assert_eq!(props["mimeType"], "application/pdf");
        assert_eq!(props["modifiedAt"], "2025-06-01T10:30:00Z");
    }

    #[test]
    fn null_properties_are_omitted() {
        let mut n = node();
        n.content = None;
        n.modified_at = None;
        n.path = None;

        let props = build_ingest_properties(&n, "r1");
        assert!(!props.contains_key("mimeType"));
        assert!(!props.contains_key("modifiedAt"));
        assert!(!props.contains_key("path"));
        assert_eq!(props.len(), 3);
    }

    #[test]
    fn document_projection_is_pending_remote_ingest_file() {
        let ing = ingester("/sync");
        let doc = ing.build_document(&node(), "r1");

        assert_eq!(doc.sys_primary_type.as_deref(), Some("SysFile"));
        assert_eq!(doc.sys_name.as_deref(), Some("node-42"));
        assert_eq!(doc.mixins.as_ref().unwrap(), &vec!["RemoteIngest".to_string()]);
        assert_eq!(doc.sync_status, Some(SyncStatus::Pending));
        assert!(doc.sync_error.is_none());
        assert!(doc.embeddings.is_none());
    }

    #[test]
    fn parent_path_includes_repository_prefix() {
        let ing = ingester("/sync");
        let path = ing.build_parent_path(&node(), "r1");
        assert_eq!(path, "/sync/r1/Company Home/Finance");
    }

    #[test]
    fn root_parent_path_omits_leading_base() {
        // A root base (target "/" and no repository id) joins directly with
        // the source path instead of producing a double slash.
        let ing = ingester("/");
        let path = ing.build_parent_path(&node(), "");
        assert_eq!(path, "/Company Home/Finance");
    }

    #[test]
    fn root_target_path_keeps_repository_segment() {
        let ing = ingester("/");
        let path = ing.build_parent_path(&node(), "r1");
        assert_eq!(path, "/r1/Company Home/Finance");
    }

    #[test]
    fn node_without_path_lands_at_repository_root() {
        let ing = ingester("/sync");
        let mut n = node();
        n.path = None;
        assert_eq!(ing.build_parent_path(&n, "r1"), "/sync/r1");
    }

    #[test]
    fn join_path_handles_root() {
        assert_eq!(join_path("/", "leaf"), "/leaf");
        assert_eq!(join_path("/a/b", "leaf"), "/a/b/leaf");
        assert_eq!(join_path("a/b/", "leaf"), "/a/b/leaf");
    }

    #[test]
    fn ingestion_twice_produces_identical_projection() {
        let ing = ingester("/sync");
        let n = node();
        let first = ing.build_document(&n, "r1");
        let second = ing.build_document(&n, "r1");

        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }
}
