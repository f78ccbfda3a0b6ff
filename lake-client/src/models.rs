use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One document in the content lake, as sent to and returned by the lake's
/// document API. Absent fields are omitted from the payload so partial
/// updates only overwrite what is present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LakeDocument {
    #[serde(rename = "sys_id", skip_serializing_if = "Option::is_none")]
    pub sys_id: Option<String>,

    /// "SysFile" or "SysFolder".
    #[serde(rename = "sys_primaryType", skip_serializing_if = "Option::is_none")]
    pub sys_primary_type: Option<String>,

    /// Carries the source node id; unique per source repository.
    #[serde(rename = "sys_name", skip_serializing_if = "Option::is_none")]
    pub sys_name: Option<String>,

    /// "RemoteIngest" marks ingested documents, "Embed" marks documents that
    /// carry embeddings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mixins: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_repository_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,

    /// Flat projection of source-native attributes, key order preserved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingest_properties: Option<Map<String, Value>>,

    /// Mirror of `ingest_properties` keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingest_property_names: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub acl: Option<Vec<Ace>>,

    /// Read-projection of `acl`, maintained by the lake. Queried by the
    /// permission filter, never written by this client.
    #[serde(skip_serializing)]
    #[serde(default)]
    pub racl: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<Vec<LakeEmbedding>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_status: Option<SyncStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_error: Option<String>,
}

impl LakeDocument {
    pub fn has_mixin(&self, mixin: &str) -> bool {
        self.mixins
            .as_ref()
            .is_some_and(|m| m.iter().any(|x| x == mixin))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Pending,
    Processing,
    Indexed,
    Failed,
}

/// A single access-control entry granting one permission to one principal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ace {
    pub granted: bool,
    pub permission: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Principal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<Principal>,
}

impl Ace {
    pub fn read_for_user(id: impl Into<String>) -> Self {
        Self {
            granted: true,
            permission: "Read".to_string(),
            user: Some(Principal { id: id.into() }),
            group: None,
        }
    }

    pub fn read_for_group(id: impl Into<String>) -> Self {
        Self {
            granted: true,
            permission: "Read".to_string(),
            user: None,
            group: Some(Principal { id: id.into() }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Principal {
    pub id: String,
}

/// An embedding stored inline on its parent document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LakeEmbedding {
    /// Embedding model identifier.
    #[serde(rename = "type")]
    pub embedding_type: String,
    pub text: String,
    pub vector: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<EmbeddingLocation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<PositionLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimestampLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spreadsheet: Option<SpreadsheetLocation>,
}

impl EmbeddingLocation {
    pub fn paragraph(index: usize) -> Self {
        Self {
            text: Some(TextLocation {
                page: None,
                paragraph: Some(index as i64),
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paragraph: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadsheetLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
}

/// Result of an HXQL document query.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    #[serde(default)]
    pub documents: Vec<LakeDocument>,
    #[serde(default)]
    pub total_count: i64,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub limit: i64,
}

/// Request body for the vector search endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorQuery {
    pub vector: Vec<f64>,
    pub embedding_type: String,
    pub query: String,
    pub repository_id: String,
    pub limit: u32,
    pub offset: u32,
    pub track_total_count: bool,
}

/// Result of a kNN vector search: scored embeddings with their parent
/// document ids.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorSearchResult {
    #[serde(default)]
    pub embeddings: Vec<ScoredEmbedding>,
    #[serde(default)]
    pub total_count: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredEmbedding {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(rename = "type", default)]
    pub embedding_type: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub location: Option<EmbeddingLocation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_serialization_skips_absent_fields() {
        let doc = LakeDocument {
            sys_name: Some("node-1".to_string()),
            sys_primary_type: Some("SysFile".to_string()),
            ..Default::default()
        };

        let json = serde_json::to_value(&doc).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(obj["sys_name"], "node-1");
        assert_eq!(obj["sys_primaryType"], "SysFile");
    }

    #[test]
    fn ace_serializes_single_principal() {
        let user_ace = Ace::read_for_user("alice_#_repo1");
        let json = serde_json::to_value(&user_ace).unwrap();
        assert_eq!(json["user"]["id"], "alice_#_repo1");
        assert!(json.get("group").is_none());
        assert_eq!(json["permission"], "Read");
        assert_eq!(json["granted"], true);
    }

    #[test]
    fn embedding_location_carries_paragraph_index() {
        let location = EmbeddingLocation::paragraph(3);
        let json = serde_json::to_value(&location).unwrap();
        assert_eq!(json["text"]["paragraph"], 3);
        assert!(json["text"].get("page").is_none());
    }

    #[test]
    fn has_mixin_checks_list() {
        let doc = LakeDocument {
            mixins: Some(vec!["RemoteIngest".to_string(), "Embed".to_string()]),
            ..Default::default()
        };
        assert!(doc.has_mixin("Embed"));
        assert!(!doc.has_mixin("Versioned"));
    }
}
