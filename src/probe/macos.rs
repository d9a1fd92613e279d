use serde_json::Value;
use tracing::debug;

use super::{
    classes, executable_stem, host_name, run_command, InterfaceKind, ManagementRow,
    MachineInfoProvider, NetworkInterfaceInfo, ProbeError, ProbeResult, RegistryHive,
    RegistryView,
};

/// Probes backed by `ioreg`, `sysctl` and `networksetup`.
pub struct MacProvider;

impl MacProvider {
    pub fn new() -> Self {
        Self
    }

    fn sysctl(name: &str) -> ProbeResult<String> {
        let value = run_command("sysctl", &["-n", name])?;
        if value.is_empty() {
            return Err(ProbeError::NotFound(format!("sysctl {}", name)));
        }
        Ok(value)
    }

    fn platform_expert() -> ProbeResult<String> {
        run_command("ioreg", &["-rd1", "-c", "IOPlatformExpertDevice"])
    }

    fn processors() -> ProbeResult<Vec<ManagementRow>> {
        let mut row = ManagementRow::new().with("Name", Self::sysctl("machdep.cpu.brand_string")?);

        for (field, name) in [
            ("NumberOfCores", "hw.physicalcpu"),
            ("NumberOfLogicalProcessors", "hw.logicalcpu"),
            ("Caption", "machdep.cpu.vendor"),
        ] {
            match Self::sysctl(name) {
                Ok(value) => row.insert(field, value),
                Err(e) => debug!("sysctl {} unavailable: {}", name, e),
            }
        }

        Ok(vec![row])
    }
}

impl Default for MacProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MachineInfoProvider for MacProvider {
    fn machine_name(&self) -> ProbeResult<String> {
        host_name()
    }

    fn os_version(&self) -> ProbeResult<String> {
        Ok(format!("macOS {}", Self::sysctl("kern.osproductversion")?))
    }

    fn physical_interfaces(&self) -> ProbeResult<Vec<NetworkInterfaceInfo>> {
        let stdout = run_command("networksetup", &["-listallhardwareports"])?;
        Ok(parse_hardware_ports(&stdout))
    }

    fn read_registry_value(
        &self,
        _hive: RegistryHive,
        _view: RegistryView,
        _key_path: &str,
        _value_name: &str,
    ) -> ProbeResult<Option<String>> {
        Err(ProbeError::Unsupported("registry"))
    }

    fn query_management_class(
        &self,
        class_name: &str,
        fields: &[&str],
    ) -> ProbeResult<Vec<ManagementRow>> {
        let row = match class_name {
            classes::PROCESSOR => return Ok(project(Self::processors()?, fields)),
            classes::COMPUTER_SYSTEM_PRODUCT => {
                let stdout = Self::platform_expert()?;
                platform_row(&stdout, &[("UUID", "IOPlatformUUID")])
            }
            classes::BASE_BOARD => {
                let stdout = Self::platform_expert()?;
                platform_row(
                    &stdout,
                    &[
                        ("SerialNumber", "IOPlatformSerialNumber"),
                        ("Product", "board-id"),
                        ("Manufacturer", "manufacturer"),
                    ],
                )
            }
            other => return Err(ProbeError::NotFound(format!("management class {}", other))),
        };

        Ok(project(vec![row], fields))
    }

    fn query_system_disk_drives(&self, fields: &[&str]) -> ProbeResult<Vec<ManagementRow>> {
        let info = run_command("diskutil", &["info", "/"])?;
        let disk = boot_disk(&info)
            .ok_or_else(|| ProbeError::NotFound("whole disk of the boot volume".to_string()))?;

        let profile = run_command(
            "system_profiler",
            &["-json", "SPNVMeDataType", "SPSerialATADataType"],
        )?;
        let rows = storage_rows(&profile, &disk)?;
        Ok(project(rows, fields))
    }

    fn current_process_name(&self) -> ProbeResult<String> {
        executable_stem()
    }
}

fn project(rows: Vec<ManagementRow>, fields: &[&str]) -> Vec<ManagementRow> {
    rows.into_iter()
        .map(|row| {
            fields
                .iter()
                .filter_map(|field| row.get(field).map(|value| (*field, value.to_string())))
                .collect()
        })
        .collect()
}

/// Value of a quoted ioreg property.
///
/// Handles both `"key" = "value"` and `"key" = <"value">` lines.
fn ioreg_property(stdout: &str, key: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        let mut parts = line.split('"');
        if parts.nth(1)? != key {
            return None;
        }
        let value = parts.nth(1)?;
        (!value.is_empty()).then(|| value.to_string())
    })
}

fn platform_row(stdout: &str, mapping: &[(&str, &str)]) -> ManagementRow {
    mapping
        .iter()
        .filter_map(|(field, key)| ioreg_property(stdout, key).map(|value| (*field, value)))
        .collect()
}

/// Whole disk behind `/` in `diskutil info` output. APFS volumes live on a
/// synthesized container, so the physical store wins over `Part of Whole`.
fn boot_disk(info: &str) -> Option<String> {
    let field = |name: &str| {
        info.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            (key.trim() == name).then(|| value.trim())
        })
    };

    field("APFS Physical Store")
        .or_else(|| field("Part of Whole"))
        .and_then(whole_disk)
}

/// `disk0s2` -> `disk0`.
fn whole_disk(device: &str) -> Option<String> {
    let rest = device.trim_start_matches("/dev/").strip_prefix("disk")?;
    let unit: String = rest.chars().take_while(char::is_ascii_digit).collect();
    (!unit.is_empty()).then(|| format!("disk{}", unit))
}

/// `Win32_DiskDrive`-shaped rows for every `system_profiler` storage item
/// whose `bsd_name` is `disk`.
fn storage_rows(profile: &str, disk: &str) -> ProbeResult<Vec<ManagementRow>> {
    let value: Value =
        serde_json::from_str(profile).map_err(|e| ProbeError::parse("system_profiler output", e))?;

    let mut rows = Vec::new();
    collect_storage_items(&value, disk, &mut rows);
    Ok(rows)
}

fn collect_storage_items(value: &Value, disk: &str, rows: &mut Vec<ManagementRow>) {
    match value {
        Value::Object(map) => {
            if map.get("bsd_name").and_then(Value::as_str) == Some(disk) {
                rows.push(
                    [
                        ("SerialNumber", "device_serial"),
                        ("Caption", "device_model"),
                        ("FirmwareRevision", "device_revision"),
                    ]
                    .into_iter()
                    .filter_map(|(field, key)| {
                        map.get(key)
                            .and_then(Value::as_str)
                            .map(|text| (field, text.trim().to_string()))
                    })
                    .collect(),
                );
            }
            for child in map.values() {
                collect_storage_items(child, disk, rows);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_storage_items(item, disk, rows);
            }
        }
        _ => {}
    }
}

fn parse_hardware_ports(stdout: &str) -> Vec<NetworkInterfaceInfo> {
    stdout
        .split("\n\n")
        .filter_map(|block| {
            let mut port = None;
            let mut device = None;
            let mut address = None;

            for line in block.lines() {
                match line.split_once(':') {
                    Some(("Hardware Port", value)) => port = Some(value.trim()),
                    Some(("Device", value)) => device = Some(value.trim()),
                    Some(("Ethernet Address", value)) => address = Some(value.trim()),
                    _ => {}
                }
            }

            let port = port?;
            let kind = if port.contains("Wi-Fi") || port.contains("AirPort") {
                InterfaceKind::Wireless
            } else if port.contains("Bridge") || port.contains("VPN") {
                InterfaceKind::Virtual
            } else if port.contains("Bluetooth") {
                InterfaceKind::Other
            } else {
                InterfaceKind::Ethernet
            };

            let hardware_address = match address {
                Some(addr) if addr.contains(':') => addr.replace(':', "").to_uppercase(),
                _ => String::new(),
            };

            Some(NetworkInterfaceInfo {
                kind,
                name: device?.to_string(),
                description: port.to_string(),
                hardware_address,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const IOREG: &str = r#"+-o J314sAP  <class IOPlatformExpertDevice, id 0x100000205, registered, matched, active, busy 0 (9 ms), retain 37>
    {
      "IOPlatformSerialNumber" = "C02XL0GZJGH5"
      "board-id" = <"Mac-06F11FD93F0323C5">
      "manufacturer" = <"Apple Inc.">
      "IOPlatformUUID" = "6F1A8E3C-2C3B-5D4E-9F10-0A1B2C3D4E5F"
      "serial-number" = <433032584c30475a4a474835000000000000000000>
    }"#;

    #[test]
    fn test_ioreg_property_plain_and_bracketed() {
        assert_eq!(
            ioreg_property(IOREG, "IOPlatformUUID").as_deref(),
            Some("6F1A8E3C-2C3B-5D4E-9F10-0A1B2C3D4E5F")
        );
        assert_eq!(ioreg_property(IOREG, "board-id").as_deref(), Some("Mac-06F11FD93F0323C5"));
        assert_eq!(ioreg_property(IOREG, "serial-number"), None);
        assert_eq!(ioreg_property(IOREG, "missing"), None);
    }

    #[test]
    fn test_platform_row_maps_base_board() {
        let row = platform_row(
            IOREG,
            &[
                ("SerialNumber", "IOPlatformSerialNumber"),
                ("Product", "board-id"),
                ("Manufacturer", "manufacturer"),
            ],
        );
        assert_eq!(row.text("SerialNumber"), "C02XL0GZJGH5");
        assert_eq!(row.text("Product"), "Mac-06F11FD93F0323C5");
        assert_eq!(row.text("Manufacturer"), "Apple Inc.");
    }

    const DISKUTIL_APFS: &str = "   Device Identifier:         disk3s1s1
   Device Node:               /dev/disk3s1s1
   Whole:                     No
   Part of Whole:             disk3

   Volume Name:               Macintosh HD
   Mounted:                   Yes
   Mount Point:               /

   APFS Physical Store:       disk0s2
";

    const PROFILE: &str = r#"{
      "SPNVMeDataType": [
        {
          "_name": "Apple SSD Controller",
          "_items": [
            {
              "_name": "APPLE SSD AP0512Q",
              "bsd_name": "disk0",
              "device_model": "APPLE SSD AP0512Q",
              "device_revision": "387.100.",
              "device_serial": "0ba01813e1c9a22e"
            }
          ]
        }
      ],
      "SPSerialATADataType": [
        {
          "_name": "External SATA",
          "_items": [
            { "bsd_name": "disk4", "device_model": "Other Disk", "device_serial": "X1" }
          ]
        }
      ]
    }"#;

    #[test]
    fn test_boot_disk_prefers_physical_store() {
        assert_eq!(boot_disk(DISKUTIL_APFS).as_deref(), Some("disk0"));
        assert_eq!(
            boot_disk("   Part of Whole:             disk1\n").as_deref(),
            Some("disk1")
        );
        assert_eq!(boot_disk("   Volume Name: Data\n"), None);
    }

    #[test]
    fn test_whole_disk() {
        assert_eq!(whole_disk("disk0s2").as_deref(), Some("disk0"));
        assert_eq!(whole_disk("/dev/disk12").as_deref(), Some("disk12"));
        assert_eq!(whole_disk("nvme0"), None);
    }

    #[test]
    fn test_storage_rows_match_bsd_name() {
        let rows = storage_rows(PROFILE, "disk0").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("SerialNumber"), "0ba01813e1c9a22e");
        assert_eq!(rows[0].text("Caption"), "APPLE SSD AP0512Q");
        assert_eq!(rows[0].text("FirmwareRevision"), "387.100.");

        assert!(storage_rows(PROFILE, "disk9").unwrap().is_empty());
        assert!(storage_rows("not json", "disk0").is_err());
    }

    #[test]
    fn test_parse_hardware_ports() {
        let stdout = "Hardware Port: Ethernet\nDevice: en0\nEthernet Address: ac:de:48:00:11:22\n\n\
                      Hardware Port: Wi-Fi\nDevice: en1\nEthernet Address: f0:18:98:aa:bb:cc\n\n\
                      Hardware Port: Thunderbolt Bridge\nDevice: bridge0\nEthernet Address: N/A\n\n\
                      VLAN Configurations\n===================";

        let ports = parse_hardware_ports(stdout);
        assert_eq!(ports.len(), 3);
        assert_eq!(ports[0].kind, InterfaceKind::Ethernet);
        assert_eq!(ports[0].hardware_address, "ACDE48001122");
        assert_eq!(ports[1].kind, InterfaceKind::Wireless);
        assert_eq!(ports[2].kind, InterfaceKind::Virtual);
        assert_eq!(ports[2].hardware_address, "");
    }
}
