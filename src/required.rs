use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use kube::{core::DynamicObject, Resource};
use tracing::{debug, warn};

use crate::{Error, ObjectKey, Result};

/// Objects that must exist, each mapped to the manifest that defines it
pub type RequiredSet = BTreeMap<ObjectKey, PathBuf>;

/// Collect the manifests of kind `K` below `dir`.
///
/// Every `.yaml` / `.yml` file is inspected in sorted order; those whose `kind`
/// matches `K` are keyed by `namespace/name`. Malformed files are skipped with
/// a warning rather than failing the whole load. Only a directory that cannot
/// be traversed is an error.
pub fn load_required<K>(dir: &Path, namespace: &str) -> Result<RequiredSet>
where
    K: Resource,
    K::DynamicType: Default,
{
    let kind = K::kind(&K::DynamicType::default()).to_string();
    let mut required = RequiredSet::new();
    for path in manifests(dir)? {
        let Some(name) = definition_name(&path, &kind) else {
            continue;
        };
        let key = ObjectKey::new(namespace, name);
        if let Some(existing) = required.get(&key) {
            warn!(
                %key,
                path = %path.display(),
                first = %existing.display(),
                "ignoring duplicate definition"
            );
            continue;
        }
        debug!(%key, path = %path.display(), "required {kind}");
        required.insert(key, path);
    }
    Ok(required)
}

/// Name of the object defined in `path` if it is a well formed manifest of `kind`
fn definition_name(path: &Path, kind: &str) -> Option<String> {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping unreadable definition");
            return None;
        }
    };
    let obj: DynamicObject = match serde_yaml::from_slice(&contents) {
        Ok(obj) => obj,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping malformed definition");
            return None;
        }
    };
    if obj.types.as_ref().map(|t| t.kind.as_str()) != Some(kind) {
        return None;
    }
    if obj.metadata.name.is_none() {
        warn!(path = %path.display(), "skipping {kind} definition without a name");
    }
    obj.metadata.name
}

/// All yaml files below `dir`, depth first in name order
fn manifests(dir: &Path) -> Result<Vec<PathBuf>> {
    let load_err = |source| Error::Load {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = fs::read_dir(dir)
        .map_err(load_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(load_err)?;
    entries.sort();

    let mut found = Vec::new();
    for path in entries {
        if path.is_dir() {
            found.extend(manifests(&path)?);
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        ) {
            found.push(path);
        }
    }
    Ok(found)
}
