//! Lazy discovery of candidate source documents.

use std::collections::HashSet;
use std::sync::Arc;

use async_stream::try_stream;
use futures::stream::BoxStream;
use regex::Regex;
use repo_client::{SourceClient, SourceClientError, SourceNode};
use tracing::{info, warn};

use crate::config::{ExcludeSettings, SourceFolderSettings};

const PAGE_SIZE: u32 = 100;

/// One discovery root with its filters.
#[derive(Debug, Clone)]
pub struct DiscoveryRoot {
    pub folder: String,
    pub recursive: bool,
    pub types: Vec<String>,
    pub mime_types: Vec<String>,
}

impl From<&SourceFolderSettings> for DiscoveryRoot {
    fn from(s: &SourceFolderSettings) -> Self {
        Self {
            folder: s.folder.clone(),
            recursive: s.recursive,
            types: s.types.clone(),
            mime_types: s.mime_types.clone(),
        }
    }
}

/// Process-wide exclusion rules: aspects and path globs (`*` wildcards,
/// whole-string match).
pub struct ExclusionRules {
    aspects: HashSet<String>,
    path_patterns: Vec<Regex>,
}

impl ExclusionRules {
    pub fn new(aspects: Vec<String>, path_globs: Vec<String>) -> Self {
        let path_patterns = path_globs
            .iter()
            .filter_map(|glob| match Regex::new(&glob_to_regex(glob)) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(glob, error = %e, "Ignoring invalid exclusion pattern");
                    None
                }
            })
            .collect();

        Self {
            aspects: aspects.into_iter().collect(),
            path_patterns,
        }
    }

    fn has_excluded_aspect(&self, node: &SourceNode) -> bool {
        node.aspect_names
            .as_ref()
            .is_some_and(|aspects| aspects.iter().any(|a| self.aspects.contains(a)))
    }

    fn matches_excluded_path(&self, node: &SourceNode) -> bool {
        let Some(path) = node.path.as_ref() else {
            return false;
        };
        self.path_patterns.iter().any(|re| re.is_match(&path.name))
    }

    pub fn excludes(&self, node: &SourceNode) -> bool {
        self.has_excluded_aspect(node) || self.matches_excluded_path(node)
    }
}

impl From<&ExcludeSettings> for ExclusionRules {
    fn from(s: &ExcludeSettings) -> Self {
        Self::new(s.aspects.clone(), s.paths.clone())
    }
}

/// Walks the source repository's tree and yields the documents that pass the
/// type, mime-type and exclusion filters.
///
/// The traversal is lazy: pages are fetched as the stream is consumed, and
/// the consumer controls concurrency.
pub struct Discovery {
    client: Arc<SourceClient>,
    exclude: ExclusionRules,
}

impl Discovery {
    pub fn new(client: Arc<SourceClient>, exclude: ExclusionRules) -> Self {
        Self { client, exclude }
    }

    pub fn stream(
        &self,
        roots: Vec<DiscoveryRoot>,
    ) -> BoxStream<'_, Result<SourceNode, SourceClientError>> {
        Box::pin(try_stream! {
            for root in roots {
                info!(folder = %root.folder, recursive = root.recursive, "Discovering nodes");

                let mut folders = vec![root.folder.clone()];

                while let Some(folder_id) = folders.pop() {
                    let mut skip_count = 0;

                    loop {
                        let page = self
                            .client
                            .list_children(&folder_id, skip_count, PAGE_SIZE)
                            .await?;
                        let page_len = page.len() as u32;

                        for node in page {
                            if node.is_folder {
                                if root.recursive {
                                    folders.push(node.id.clone());
                                }
                                continue;
                            }

                            if matches_filters(&node, &root, &self.exclude) {
                                yield node;
                            }
                        }

                        if page_len < PAGE_SIZE {
                            break;
                        }
                        skip_count += PAGE_SIZE;
                    }
                }
            }
        })
    }
}

fn matches_filters(node: &SourceNode, root: &DiscoveryRoot, exclude: &ExclusionRules) -> bool {
    matches_type(node, &root.types)
        && matches_mime_type(node, &root.mime_types)
        && !exclude.excludes(node)
}

fn matches_type(node: &SourceNode, types: &[String]) -> bool {
    types.is_empty() || types.iter().any(|t| *t == node.node_type)
}

fn matches_mime_type(node: &SourceNode, mime_types: &[String]) -> bool {
    if mime_types.is_empty() {
        return true;
    }
    let Some(content) = node.content.as_ref() else {
        return false;
    };
    mime_types.iter().any(|m| *m == content.mime_type)
}

/// `*` becomes `.*`, everything else is literal; the match is whole-string.
fn glob_to_regex(glob: &str) -> String {
    let escaped: Vec<String> = glob.split('*').map(|part| regex::escape(part)).collect();
    format!("^{}$", escaped.join(".*"))
}
