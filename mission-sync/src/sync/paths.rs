use std::path::{Component, Path};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("path is outside the workspace root")]
    OutsideRoot,
    #[error("path is the workspace root itself")]
    Empty,
    #[error("path contains unsupported component")]
    UnsupportedComponent,
    #[error("path is not valid UTF-8")]
    NonUtf8,
}

/// Maps a local path under `root` to its `/`-separated identity key.
pub fn relative_key(root: &Path, path: &Path) -> Result<String, PathError> {
    let relative = path.strip_prefix(root).map_err(|_| PathError::OutsideRoot)?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or(PathError::NonUtf8)?),
            Component::CurDir => continue,
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(PathError::UnsupportedComponent);
            }
        }
    }
    if parts.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(parts.join("/"))
}

/// Display title for a key: the last segment without its extension.
pub fn title_for(relative_path: &str) -> String {
    let name = relative_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(relative_path);
    match name.rfind('.') {
        Some(dot) if dot > 0 => name[..dot].to_string(),
        _ => name.to_string(),
    }
}
