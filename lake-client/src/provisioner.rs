use serde_json::{json, Value};
use tracing::{info, warn};

use crate::client::LakeClient;
use crate::error::LakeClientError;

/// The model sections the provisioner manages, in patch order.
const SECTIONS: [&str; 3] = ["schemas", "types", "mixinTypes"];

/// Ensures the lake's repository model contains the required schemas, types
/// and mixin types.
///
/// Idempotent: reads the current model, applies JSON-Patch `add` ops for
/// missing entries only, then re-reads and verifies nothing is left missing.
pub struct ModelProvisioner<'a> {
    client: &'a LakeClient,
}

impl<'a> ModelProvisioner<'a> {
    pub fn new(client: &'a LakeClient) -> Self {
        Self { client }
    }

    /// Applies the desired model fragment to the repository model. Fails when
    /// the patch did not fully apply, which would leave ingestion writing
    /// documents the lake cannot index.
    pub async fn ensure_model(&self, desired: &Value) -> Result<(), LakeClientError> {
        let current = self.client.get_model().await?;

        let patch = build_add_only_patch(&current, desired)?;
        if patch.is_empty() {
            info!("Lake model already contains required fragments, no patch needed");
            return Ok(());
        }

        warn!(ops = patch.len(), "Lake model missing entries, applying JSON Patch");
        self.client.patch_model(&patch).await?;

        let after = self.client.get_model().await?;
        let remaining = build_add_only_patch(&after, desired)?;
        if !remaining.is_empty() {
            return Err(LakeClientError::InvariantViolation(format!(
                "model patch did not fully apply, {} ops remaining",
                remaining.len()
            )));
        }

        info!("Lake model provisioned");
        Ok(())
    }
}

/// Computes the add-only JSON Patch that fills any missing top-level entries
/// of the `schemas`, `types` and `mixinTypes` sections: the entire section
/// when it is absent, per-key when it is present but incomplete.
pub fn build_add_only_patch(
    current: &Value,
    desired: &Value,
) -> Result<Vec<Value>, LakeClientError> {
    let mut ops = Vec::new();
    for section in SECTIONS {
        add_missing_section_entries(&mut ops, current, desired, section)?;
    }
    Ok(ops)
}

fn add_missing_section_entries(
    ops: &mut Vec<Value>,
    current: &Value,
    desired: &Value,
    section: &str,
) -> Result<(), LakeClientError> {
    let Some(desired_section) = desired.get(section).and_then(Value::as_object) else {
        return Ok(());
    };

    let current_section = current.get(section);
    match current_section {
        None | Some(Value::Null) => {
            ops.push(patch_add(
                &format!("/{}", section),
                Value::Object(desired_section.clone()),
            ));
            Ok(())
        }
        Some(Value::Object(current_map)) => {
            for (key, value) in desired_section {
                if !current_map.contains_key(key) {
                    ops.push(patch_add(
                        &format!("/{}/{}", section, escape_json_pointer_token(key)),
                        value.clone(),
                    ));
                }
            }
            Ok(())
        }
        Some(_) => Err(LakeClientError::InvariantViolation(format!(
            "lake model section '{}' is not an object",
            section
        ))),
    }
}

fn patch_add(path: &str, value: Value) -> Value {
    json!({ "op": "add", "path": path, "value": value })
}

fn escape_json_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}
