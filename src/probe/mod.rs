//! Platform probes behind a single capability trait.
//!
//! The engine only talks to [`MachineInfoProvider`]. Each platform module
//! implements it against its native sources, and [`fake::FakeProvider`]
//! implements it in memory for tests.

pub mod error;
pub mod fake;
#[cfg(any(test, target_os = "linux"))]
pub mod linux;
#[cfg(any(test, target_os = "macos"))]
pub mod macos;
#[cfg(any(test, windows))]
pub mod windows;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use error::{ProbeError, ProbeResult};

/// Management classes understood by every provider.
pub mod classes {
    pub const PROCESSOR: &str = "Win32_Processor";
    pub const COMPUTER_SYSTEM_PRODUCT: &str = "Win32_ComputerSystemProduct";
    pub const BASE_BOARD: &str = "Win32_BaseBoard";
    pub const DISK_DRIVE: &str = "Win32_DiskDrive";
}

/// Link-layer class of a network interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterfaceKind {
    Ethernet,
    Wireless,
    Loopback,
    Virtual,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterfaceInfo {
    pub kind: InterfaceKind,
    pub name: String,
    pub description: String,
    /// Uppercase hex digits without separators, e.g. `AABBCCDDEEFF`.
    pub hardware_address: String,
}

/// Top-level key of a hierarchical registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryHive {
    LocalMachine,
    CurrentUser,
}

/// Parallel 32/64-bit views of the same registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryView {
    Registry32,
    Registry64,
}

/// One result row of a management query. A missing key means the provider
/// reported no value for that field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagementRow(BTreeMap<String, String>);

impl ManagementRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: impl Into<String>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: &str, value: impl Into<String>) {
        self.0.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Field text with a missing value rendered as empty.
    pub fn text(&self, field: &str) -> &str {
        self.get(field).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ManagementRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Everything the fingerprint engine needs from the host.
///
/// Calls are blocking and must release any handle they acquire before
/// returning, on success and on error alike.
pub trait MachineInfoProvider {
    fn machine_name(&self) -> ProbeResult<String>;

    fn os_version(&self) -> ProbeResult<String>;

    fn physical_interfaces(&self) -> ProbeResult<Vec<NetworkInterfaceInfo>>;

    /// Read one named value. `Ok(None)` when the key or value is missing.
    fn read_registry_value(
        &self,
        hive: RegistryHive,
        view: RegistryView,
        key_path: &str,
        value_name: &str,
    ) -> ProbeResult<Option<String>>;

    /// Rows of `class_name` restricted to `fields`, in provider order.
    fn query_management_class(
        &self,
        class_name: &str,
        fields: &[&str],
    ) -> ProbeResult<Vec<ManagementRow>>;

    /// Disk drives that back the system volume, in provider order.
    fn query_system_disk_drives(&self, fields: &[&str]) -> ProbeResult<Vec<ManagementRow>>;

    fn current_process_name(&self) -> ProbeResult<String>;
}

/// Provider for the platform this binary was compiled for.
pub fn default_provider() -> Box<dyn MachineInfoProvider> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::LinuxProvider::new())
    }
    #[cfg(target_os = "macos")]
    {
        Box::new(macos::MacProvider::new())
    }
    #[cfg(windows)]
    {
        Box::new(windows::WindowsProvider::new())
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
    {
        tracing::warn!("no native probes for this platform, every component will be absent");
        Box::new(fake::FakeProvider::unavailable())
    }
}

/// Host name shared by all native providers.
pub fn host_name() -> ProbeResult<String> {
    let name = hostname::get()?
        .into_string()
        .map_err(|raw| ProbeError::parse("host name", format!("not UTF-8: {:?}", raw)))?;
    Ok(name)
}

/// Process name derived from the executable file stem.
pub fn executable_stem() -> ProbeResult<String> {
    let exe = std::env::current_exe()?;
    exe.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| ProbeError::NotFound(format!("file stem of {:?}", exe)))
}

/// Run an external tool and return its trimmed stdout.
#[cfg(any(test, target_os = "macos", windows))]
pub(crate) fn run_command(program: &str, args: &[&str]) -> ProbeResult<String> {
    let output = std::process::Command::new(program).args(args).output()?;

    if !output.status.success() {
        return Err(ProbeError::Command {
            program: program.to_string(),
            status: output.status.to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_text_renders_missing_field_as_empty() {
        let row = ManagementRow::new().with("Name", "cpu");
        assert_eq!(row.get("Name"), Some("cpu"));
        assert_eq!(row.get("Caption"), None);
        assert_eq!(row.text("Caption"), "");
    }

    #[test]
    fn test_row_from_iterator() {
        let row: ManagementRow = [("UUID", "abc")].into_iter().collect();
        assert_eq!(row.text("UUID"), "abc");
        assert!(!row.is_empty());
    }
}
