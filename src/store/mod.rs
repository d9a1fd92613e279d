//! Durable per-user storage for the stable token.
//!
//! The engine never touches OS state for the token directly; it goes through
//! a [`TokenStore`]. Nothing here serializes concurrent writers across
//! processes: two first runs racing on the same key each write their own
//! token and the last write wins.

#[cfg(windows)]
mod registry;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::probe::{ProbeError, ProbeResult};

#[cfg(windows)]
pub use registry::RegistryTokenStore;

pub trait TokenStore {
    /// Stored value under `key`, `None` if nothing was stored yet.
    fn get(&self, key: &str) -> ProbeResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> ProbeResult<()>;
}

/// Token store for this platform: the registry on Windows, a TOML file
/// elsewhere (`path` or the default per-user data location).
pub fn default_token_store(path: Option<PathBuf>) -> ProbeResult<Box<dyn TokenStore>> {
    #[cfg(windows)]
    let path = match path {
        Some(path) => Some(path),
        None => return Ok(Box::new(RegistryTokenStore::new())),
    };

    let path = match path {
        Some(path) => path,
        None => FileTokenStore::default_path()?,
    };
    Ok(Box::new(FileTokenStore::new(path)))
}

/// [`default_token_store`] that never fails to open.
///
/// A store that cannot be located degrades to one that rejects every call,
/// so only the stable token ends up absent.
pub fn open_token_store(path: Option<PathBuf>) -> Box<dyn TokenStore> {
    or_unavailable(default_token_store(path))
}

fn or_unavailable(opened: ProbeResult<Box<dyn TokenStore>>) -> Box<dyn TokenStore> {
    match opened {
        Ok(store) => store,
        Err(e) => {
            warn!(error = %e, "token store unavailable, stable token will be absent");
            Box::new(MemoryTokenStore::unavailable())
        }
    }
}

/// Process-local store, mainly for tests.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    values: RefCell<BTreeMap<String, String>>,
    reject_reads: bool,
    reject_writes: bool,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose writes always fail.
    pub fn read_only() -> Self {
        Self {
            reject_writes: true,
            ..Self::default()
        }
    }

    /// Store that cannot be opened at all.
    pub fn unavailable() -> Self {
        Self {
            reject_reads: true,
            reject_writes: true,
            ..Self::default()
        }
    }

    pub fn with_value(self, key: &str, value: &str) -> Self {
        self.values.borrow_mut().insert(key.to_string(), value.to_string());
        self
    }

    pub fn len(&self) -> usize {
        self.values.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.borrow().is_empty()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> ProbeResult<Option<String>> {
        if self.reject_reads {
            return Err(ProbeError::Store("memory store is unavailable".to_string()));
        }
        Ok(self.values.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> ProbeResult<()> {
        if self.reject_writes {
            return Err(ProbeError::Store(format!("cannot write {}", key)));
        }
        self.values.borrow_mut().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenFile {
    #[serde(default)]
    tokens: BTreeMap<String, String>,
}

/// Tokens kept in a small TOML file, one entry per sub-key.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> ProbeResult<PathBuf> {
        dirs::data_local_dir()
            .map(|dir| dir.join("hostprint").join("tokens.toml"))
            .ok_or_else(|| ProbeError::NotFound("per-user data directory".to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> ProbeResult<TokenFile> {
        if !self.path.exists() {
            return Ok(TokenFile::default());
        }

        let contents = fs::read_to_string(&self.path)?;
        toml::from_str(&contents).map_err(|e| ProbeError::parse(self.path.display().to_string(), e))
    }

    fn save(&self, file: &TokenFile) -> ProbeResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(file).map_err(|e| ProbeError::Store(e.to_string()))?;

        // Write-then-rename so a crash never leaves a truncated file behind
        let staging = self.path.with_extension("toml.tmp");
        fs::write(&staging, contents)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&staging)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&staging, perms)?;
        }

        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: &str) -> ProbeResult<Option<String>> {
        Ok(self.load()?.tokens.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> ProbeResult<()> {
        let mut file = self.load()?;
        file.tokens.insert(key.to_string(), value.to_string());
        self.save(&file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested").join("tokens.toml"));

        assert_eq!(store.get("app").unwrap(), None);

        store.set("app", "4a5e1c2b-0000-4000-8000-000000000001").unwrap();
        store.set("other", "value").unwrap();

        let reopened = FileTokenStore::new(store.path());
        assert_eq!(
            reopened.get("app").unwrap().as_deref(),
            Some("4a5e1c2b-0000-4000-8000-000000000001")
        );
        assert_eq!(reopened.get("other").unwrap().as_deref(), Some("value"));
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.toml");
        fs::write(&path, "tokens = [not toml").unwrap();

        let store = FileTokenStore::new(&path);
        assert!(matches!(store.get("app"), Err(ProbeError::Parse { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("tokens.toml"));
        store.set("app", "x").unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_unopenable_store_only_loses_the_token() {
        use crate::fingerprint::{collect, names, Component};
        use crate::probe::fake::FakeProvider;

        let store = or_unavailable(Err(ProbeError::NotFound("per-user data directory".to_string())));
        let provider = FakeProvider::new().with_machine_name("build-01");

        let fingerprint = collect(
            &provider,
            store.as_ref(),
            &[Component::MachineName, Component::StableToken { name: Some("app".to_string()) }],
        );

        assert_eq!(fingerprint.get(names::MACHINE_NAME), Some("build-01"));
        assert_eq!(fingerprint.get(names::STABLE_TOKEN), None);
        assert!(fingerprint.failure(names::STABLE_TOKEN).is_some());
    }

    #[test]
    fn test_opened_store_is_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.toml");

        let store = open_token_store(Some(path.clone()));
        store.set("app", "x").unwrap();
        assert_eq!(FileTokenStore::new(&path).get("app").unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn test_memory_store_modes() {
        let store = MemoryTokenStore::new().with_value("a", "1");
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.len(), 1);

        assert!(MemoryTokenStore::read_only().set("a", "1").is_err());
        assert!(MemoryTokenStore::unavailable().get("a").is_err());
    }
}
