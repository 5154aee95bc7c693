//! On-disk storage for the secure tunnel key.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Serialize;

use super::{CredentialError, CredentialStore, TunnelCredential};
use crate::constants;

#[derive(Serialize)]
struct StoredCredential<'a> {
    id: &'a str,
    key: &'a str,
}

/// Writes the installed key where the tunnel commands can pick it up.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `credentials/secure-tunnel.toml` inside `config_dir`.
    #[must_use]
    pub fn in_dir(config_dir: &Path) -> Self {
        Self::new(
            config_dir
                .join(constants::CREDENTIALS_DIR_NAME)
                .join(constants::CREDENTIAL_FILE_NAME),
        )
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn install(&self, credential: &TunnelCredential) -> Result<(), CredentialError> {
        let key = BASE64.decode(credential.key_base64.trim())?;
        if key.is_empty() {
            return Err(CredentialError::Storage("key material is empty".to_string()));
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CredentialError::Storage(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let content = toml::to_string(&StoredCredential {
            id: &credential.id,
            key: credential.key_base64.trim(),
        })
        .map_err(|e| CredentialError::Storage(format!("failed to serialize credential: {e}")))?;

        write_private(&self.path, content.as_bytes()).map_err(|e| {
            CredentialError::Storage(format!("failed to write {}: {e}", self.path.display()))
        })?;

        log::info!(
            "[credentials] installed key {} at {}",
            credential.id,
            self.path.display()
        );
        Ok(())
    }
}

/// Write `content` to a file readable by the owner only (chmod 600).
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;

    // `mode` only applies on creation; tighten a file left by an older install.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(content)?;
    file.flush()
}
