use std::path::{Path, PathBuf};

use strata_common::{Error, Result};
use tracing::debug;

use crate::descriptor::Descriptor;

const EXTENSIONS: [&str; 4] = ["yml", "yaml", "toml", "json"];

/// Load every descriptor file in `dir`, in file-name order.
pub fn load_dir(dir: &Path) -> Result<Vec<Descriptor>> {
    if !dir.is_dir() {
        return Err(Error::Descriptor(format!(
            "versions directory {} does not exist",
            dir.display()
        )));
    }

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_descriptor_extension(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut descriptors = Vec::with_capacity(paths.len());
    for path in paths {
        let contents = std::fs::read_to_string(&path)?;
        descriptors.push(parse_descriptor(&path, &contents)?);
    }
    debug!(
        "loaded {} descriptor(s) from {}",
        descriptors.len(),
        dir.display()
    );
    Ok(descriptors)
}

fn has_descriptor_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| EXTENSIONS.contains(&e))
}

/// Parse one descriptor, picking the format from the file extension.
pub fn parse_descriptor(path: &Path, contents: &str) -> Result<Descriptor> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let parsed = match ext {
        "yml" | "yaml" => {
            serde_yaml::from_str(contents).map_err(|e| format!("YAML parse error: {e}"))
        }
        "toml" => toml::from_str(contents).map_err(|e| format!("TOML parse error: {e}")),
        "json" => serde_json::from_str(contents).map_err(|e| format!("JSON parse error: {e}")),
        other => Err(format!("unsupported descriptor extension: {other}")),
    };
    parsed.map_err(|e| Error::Descriptor(format!("{}: {e}", path.display())))
}
