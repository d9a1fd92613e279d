use winreg::RegKey;

use super::TokenStore;
use crate::probe::windows::provider::{predef, value_text};
use crate::probe::{ProbeResult, RegistryHive};

pub const TOKEN_KEY: &str = r"SOFTWARE\Hostprint.DeviceIdToken";

/// Tokens stored as string values under `HKCU\SOFTWARE\Hostprint.DeviceIdToken`.
pub struct RegistryTokenStore {
    key_path: String,
}

impl RegistryTokenStore {
    pub fn new() -> Self {
        Self {
            key_path: TOKEN_KEY.to_string(),
        }
    }

    /// Opens the key for writing, creating it when missing. Reads go through
    /// this too, so the key exists after the first probe either way.
    fn open(&self) -> ProbeResult<RegKey> {
        let (key, _) = predef(RegistryHive::CurrentUser).create_subkey(&self.key_path)?;
        Ok(key)
    }
}

impl Default for RegistryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for RegistryTokenStore {
    fn get(&self, key: &str) -> ProbeResult<Option<String>> {
        value_text(&self.open()?, key)
    }

    fn set(&self, key: &str, value: &str) -> ProbeResult<()> {
        self.open()?.set_value(key, &value.to_string())?;
        Ok(())
    }
}
