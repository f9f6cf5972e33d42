use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// One cached OAuth credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// The on-disk store is a JSON map keyed by client id, so several
/// configured apps can share one cache file.
type StoreMap = BTreeMap<String, Credential>;

pub fn resolve_store_path(custom: Option<&Path>) -> Result<PathBuf, SyncError> {
    match custom {
        Some(p) => Ok(p.to_path_buf()),
        None => {
            let dir = dirs::data_dir().ok_or_else(|| {
                SyncError::Config("could not determine data directory".into())
            })?;
            Ok(dir.join("drivemirror").join("credentials.json"))
        }
    }
}

/// Load the credential cached for `client_id`. A missing file or
/// missing key is `CredentialNotFound`, distinct from a corrupt store.
pub fn load(path: &Path, client_id: &str) -> Result<Credential, SyncError> {
    let map = read_store(path)?;
    map.get(client_id)
        .cloned()
        .ok_or_else(|| SyncError::CredentialNotFound {
            client_id: client_id.to_string(),
        })
}

/// Persist a credential for `client_id`, preserving entries for other
/// client ids. Atomic write, owner-only permissions.
pub fn store(path: &Path, client_id: &str, credential: &Credential) -> Result<(), SyncError> {
    let mut map = match read_store(path) {
        Ok(map) => map,
        Err(SyncError::CredentialNotFound { .. }) => StoreMap::new(),
        Err(e) => return Err(e),
    };
    map.insert(client_id.to_string(), credential.clone());

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SyncError::local_fs(parent, e))?;
    }

    let json = serde_json::to_string_pretty(&map)
        .map_err(|e| SyncError::Config(format!("cannot serialize credential store: {e}")))?;

    // Atomic write: tmp file → rename
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| SyncError::local_fs(&tmp, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| SyncError::local_fs(&tmp, e))?;
    }

    std::fs::rename(&tmp, path).map_err(|e| SyncError::local_fs(path, e))?;
    Ok(())
}

/// Delete the whole store file. Used by `erase --remove-creds`.
pub fn remove_store(path: &Path) -> Result<(), SyncError> {
    if path.exists() {
        std::fs::remove_file(path).map_err(|e| SyncError::local_fs(path, e))?;
    }
    Ok(())
}

fn read_store(path: &Path) -> Result<StoreMap, SyncError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SyncError::CredentialNotFound {
                client_id: String::new(),
            })
        }
        Err(e) => return Err(SyncError::local_fs(path, e)),
    };
    serde_json::from_str(&content).map_err(|e| {
        SyncError::Auth(format!(
            "credential store {} is unreadable: {e}",
            path.display()
        ))
    })
}
