//! Windows probes.
//!
//! Registry reads go through `winreg` with an explicit WOW64 view. Management
//! classes are read with `Get-CimInstance` and returned as compressed JSON,
//! which keeps this crate free of COM bindings.

use serde_json::Value;

use super::{classes, InterfaceKind, ManagementRow, NetworkInterfaceInfo, ProbeError, ProbeResult};

const IF_TYPE_ETHERNET: u64 = 6;
const IF_TYPE_LOOPBACK: u64 = 24;
const IF_TYPE_PROP_VIRTUAL: u64 = 53;
const IF_TYPE_WIRELESS: u64 = 71;
const IF_TYPE_TUNNEL: u64 = 131;

const NET_ADAPTER_SCRIPT: &str = "Get-NetAdapter | Select-Object Name,InterfaceDescription,MacAddress,InterfaceType | ConvertTo-Json -Compress";

fn is_identifier(ident: &str) -> bool {
    !ident.is_empty() && ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Build a `Get-CimInstance` pipeline selecting `fields` from `class_name`.
fn cim_script(class_name: &str, fields: &[&str]) -> ProbeResult<String> {
    if !is_identifier(class_name) {
        return Err(ProbeError::parse("management class name", class_name));
    }
    if let Some(bad) = fields.iter().find(|field| !is_identifier(field)) {
        return Err(ProbeError::parse("management field name", bad));
    }

    Ok(format!(
        "Get-CimInstance -ClassName {} | Select-Object {} | ConvertTo-Json -Compress",
        class_name,
        fields.join(",")
    ))
}

/// Disk drives behind the partitions of `$env:SystemDrive`.
fn system_drive_script(fields: &[&str]) -> ProbeResult<String> {
    let select = cim_script(classes::DISK_DRIVE, fields)?;
    let select = select
        .split_once("| ")
        .map(|(_, tail)| tail.to_string())
        .unwrap_or(select);

    Ok(format!(
        "$drive = $env:SystemDrive; \
         Get-CimInstance -Query \"ASSOCIATORS OF {{Win32_LogicalDisk.DeviceID='$drive'}} WHERE ResultClass=Win32_DiskPartition\" | \
         ForEach-Object {{ Get-CimAssociatedInstance -InputObject $_ -ResultClassName {} }} | {}",
        classes::DISK_DRIVE, select
    ))
}

/// `ConvertTo-Json` emits a bare object for one result, an array for many
/// and nothing at all for none.
fn json_objects(raw: &str, what: &str) -> ProbeResult<Vec<serde_json::Map<String, Value>>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_str(raw).map_err(|e| ProbeError::parse(what, e))?;
    let items = match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_cim_rows(raw: &str, fields: &[&str]) -> ProbeResult<Vec<ManagementRow>> {
    Ok(json_objects(raw, "CIM query output")?
        .iter()
        .map(|object| {
            fields
                .iter()
                .filter_map(|field| object.get(*field).and_then(scalar_text).map(|text| (*field, text)))
                .collect()
        })
        .collect())
}

fn parse_net_adapters(raw: &str) -> ProbeResult<Vec<NetworkInterfaceInfo>> {
    Ok(json_objects(raw, "Get-NetAdapter output")?
        .iter()
        .map(|adapter| {
            let text = |key: &str| adapter.get(key).and_then(scalar_text).unwrap_or_default();

            let kind = match adapter.get("InterfaceType").and_then(Value::as_u64) {
                Some(IF_TYPE_ETHERNET) => InterfaceKind::Ethernet,
                Some(IF_TYPE_WIRELESS) => InterfaceKind::Wireless,
                Some(IF_TYPE_LOOPBACK) => InterfaceKind::Loopback,
                Some(IF_TYPE_PROP_VIRTUAL) | Some(IF_TYPE_TUNNEL) => InterfaceKind::Virtual,
                _ => InterfaceKind::Other,
            };

            NetworkInterfaceInfo {
                kind,
                name: text("Name"),
                description: text("InterfaceDescription"),
                hardware_address: text("MacAddress").replace('-', "").to_uppercase(),
            }
        })
        .collect())
}

#[cfg(windows)]
pub use provider::WindowsProvider;

#[cfg(windows)]
pub(crate) mod provider {
    use std::io;

    use winreg::enums::{
        RegType, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, KEY_READ, KEY_WOW64_32KEY, KEY_WOW64_64KEY,
    };
    use winreg::types::FromRegValue;
    use winreg::RegKey;

    use super::*;
    use crate::probe::{
        executable_stem, host_name, run_command, MachineInfoProvider, RegistryHive, RegistryView,
    };

    pub struct WindowsProvider;

    impl WindowsProvider {
        pub fn new() -> Self {
            Self
        }

        fn powershell(script: &str) -> ProbeResult<String> {
            run_command("powershell", &["-NoProfile", "-NonInteractive", "-Command", script])
        }
    }

    impl Default for WindowsProvider {
        fn default() -> Self {
            Self::new()
        }
    }

    pub(crate) fn predef(hive: RegistryHive) -> RegKey {
        match hive {
            RegistryHive::LocalMachine => RegKey::predef(HKEY_LOCAL_MACHINE),
            RegistryHive::CurrentUser => RegKey::predef(HKEY_CURRENT_USER),
        }
    }

    /// Registry value rendered as text; DWORD/QWORD values are stringified.
    pub(crate) fn value_text(key: &RegKey, value_name: &str) -> ProbeResult<Option<String>> {
        let raw = match key.get_raw_value(value_name) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let text = match raw.vtype {
            RegType::REG_SZ | RegType::REG_EXPAND_SZ | RegType::REG_MULTI_SZ => String::from_reg_value(&raw)?,
            RegType::REG_DWORD => u32::from_reg_value(&raw)?.to_string(),
            RegType::REG_QWORD => u64::from_reg_value(&raw)?.to_string(),
            other => return Err(ProbeError::parse(value_name, format!("unsupported type {:?}", other))),
        };

        Ok(Some(text))
    }

    impl MachineInfoProvider for WindowsProvider {
        fn machine_name(&self) -> ProbeResult<String> {
            host_name()
        }

        fn os_version(&self) -> ProbeResult<String> {
            Self::powershell("[System.Environment]::OSVersion.VersionString")
        }

        fn physical_interfaces(&self) -> ProbeResult<Vec<NetworkInterfaceInfo>> {
            parse_net_adapters(&Self::powershell(NET_ADAPTER_SCRIPT)?)
        }

        fn read_registry_value(
            &self,
            hive: RegistryHive,
            view: RegistryView,
            key_path: &str,
            value_name: &str,
        ) -> ProbeResult<Option<String>> {
            let flags = match view {
                RegistryView::Registry32 => KEY_READ | KEY_WOW64_32KEY,
                RegistryView::Registry64 => KEY_READ | KEY_WOW64_64KEY,
            };

            let key = match predef(hive).open_subkey_with_flags(key_path, flags) {
                Ok(key) => key,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };

            value_text(&key, value_name)
        }

        fn query_management_class(
            &self,
            class_name: &str,
            fields: &[&str],
        ) -> ProbeResult<Vec<ManagementRow>> {
            let stdout = Self::powershell(&cim_script(class_name, fields)?)?;
            parse_cim_rows(&stdout, fields)
        }

        fn query_system_disk_drives(&self, fields: &[&str]) -> ProbeResult<Vec<ManagementRow>> {
            let stdout = Self::powershell(&system_drive_script(fields)?)?;
            parse_cim_rows(&stdout, fields)
        }

        fn current_process_name(&self) -> ProbeResult<String> {
            executable_stem()
        }
    }
}
