//! Generation of new descriptor files.

use std::path::{Path, PathBuf};

use chrono::Utc;
use strata_common::{Error, Result, RevisionId};
use tracing::info;
use uuid::Uuid;

use crate::descriptor::Descriptor;
use crate::graph::RevisionGraph;

/// Write a descriptor for a new revision on top of the current head and
/// return its path. Both actions start empty.
pub fn new_revision(
    dir: &Path,
    graph: &RevisionGraph,
    message: &str,
    id: Option<RevisionId>,
) -> Result<PathBuf> {
    let heads = graph.heads();
    let parent = match heads.as_slice() {
        [] => None,
        [head] => Some((*head).clone()),
        _ => {
            return Err(Error::AmbiguousHistory {
                at: "head".into(),
                candidates: heads.iter().map(|h| h.to_string()).collect(),
            });
        }
    };

    let id = match id {
        Some(id) => id,
        None => next_id(graph, parent.as_ref())?,
    };
    if graph.contains(&id) {
        return Err(Error::DuplicateRevision(id.to_string()));
    }

    let descriptor = Descriptor::new(id.clone(), parent)
        .with_message(message)
        .with_created_at(Utc::now());
    let yaml = serde_yaml::to_string(&descriptor)
        .map_err(|e| Error::Descriptor(format!("failed to serialize descriptor {id}: {e}")))?;

    std::fs::create_dir_all(dir)?;
    let slug = slug(message);
    let file_name = if slug.is_empty() {
        format!("{id}.yml")
    } else {
        format!("{id}_{slug}.yml")
    };
    let path = dir.join(file_name);
    if path.exists() {
        return Err(Error::Descriptor(format!("{} already exists", path.display())));
    }
    std::fs::write(&path, yaml)?;
    info!("created revision {id} at {}", path.display());
    Ok(path)
}

/// Continue a numeric history with the same padding, else a short random id.
fn next_id(graph: &RevisionGraph, parent: Option<&RevisionId>) -> Result<RevisionId> {
    let numeric = |id: &RevisionId| id.as_str().chars().all(|c| c.is_ascii_digit());
    let generated = match parent {
        None if graph.is_empty() => "001".to_string(),
        Some(parent) if numeric(parent) => {
            let raw = parent.as_str();
            match raw.parse::<u64>().ok().and_then(|n| n.checked_add(1)) {
                Some(n) => format!("{n:0width$}", width = raw.len()),
                None => random_id(),
            }
        }
        _ => random_id(),
    };
    RevisionId::parse(generated)
}

fn random_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

fn slug(message: &str) -> String {
    let mut out = String::new();
    for c in message.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
        if out.len() >= 40 {
            break;
        }
    }
    out.trim_end_matches('_').to_string()
}
