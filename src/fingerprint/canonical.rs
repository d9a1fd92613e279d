//! Turning noisy probe output into stable component values.
//!
//! Everything here is pure. `None` is the representation of "no usable
//! data"; the registry also stores an empty result as absent.

use crate::probe::{InterfaceKind, ManagementRow, NetworkInterfaceInfo};

const ZERO_MAC: &str = "000000000000";

/// Separator between values of a multi-valued component.
pub const LIST_SEPARATOR: &str = ",";

#[derive(Debug, Clone, Copy)]
enum AdapterField {
    Name,
    Description,
}

/// Software/virtual adapters that must not contribute a MAC address,
/// matched as case-insensitive substrings.
const EXCLUDED_ADAPTERS: &[(AdapterField, &str)] = &[
    (AdapterField::Name, "docker0"),
    (AdapterField::Name, "VMware"),
    (AdapterField::Name, "TAP"),
    (AdapterField::Name, "蓝牙"),
    (AdapterField::Description, "Bluetooth"),
    (AdapterField::Description, "Virtual Adapter"),
];

pub fn non_empty(value: impl Into<String>) -> Option<String> {
    let value = value.into();
    (!value.is_empty()).then_some(value)
}

fn is_excluded_adapter(interface: &NetworkInterfaceInfo) -> bool {
    let name = interface.name.to_lowercase();
    let description = interface.description.to_lowercase();

    EXCLUDED_ADAPTERS.iter().any(|(field, marker)| {
        let haystack = match field {
            AdapterField::Name => &name,
            AdapterField::Description => &description,
        };
        haystack.contains(&marker.to_lowercase())
    })
}

/// `AABBCCDDEEFF` -> `AA:BB:CC:DD:EE:FF` for EUI-48 and EUI-64 hex strings.
/// Anything else is returned unchanged.
pub fn format_mac_address(hex: &str) -> String {
    let digits: Vec<char> = hex.chars().collect();
    if digits.len() != 12 && digits.len() != 16 {
        return hex.to_string();
    }

    digits
        .chunks(2)
        .map(|pair| pair.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(":")
}

/// Sorted, comma-joined addresses of the physical Ethernet adapters.
pub fn canonical_mac_addresses(interfaces: &[NetworkInterfaceInfo]) -> Option<String> {
    let mut addresses: Vec<String> = interfaces
        .iter()
        .filter(|interface| interface.kind == InterfaceKind::Ethernet)
        .filter(|interface| !is_excluded_adapter(interface))
        .map(|interface| interface.hardware_address.as_str())
        .filter(|address| !address.is_empty() && *address != ZERO_MAC)
        .map(format_mac_address)
        .collect();

    addresses.sort();
    non_empty(addresses.join(LIST_SEPARATOR))
}

/// Render the first row in which any of `key_fields` is non-empty and stop.
/// Later rows are never looked at.
pub fn first_composite<'a, I, F>(rows: I, key_fields: &[&str], render: F) -> Option<String>
where
    I: IntoIterator<Item = &'a ManagementRow>,
    F: Fn(&ManagementRow) -> String,
{
    rows.into_iter()
        .find(|row| key_fields.iter().any(|field| !row.text(field).is_empty()))
        .map(render)
}

/// `Field:value|Field:value`, empty fields included.
pub fn labelled_composite(row: &ManagementRow, fields: &[&str]) -> String {
    fields
        .iter()
        .map(|field| format!("{}:{}", field, row.text(field)))
        .collect::<Vec<_>>()
        .join("|")
}

pub fn processor_composite(row: &ManagementRow) -> String {
    format!(
        "{}-Core{}-Thread|Name:{}|Caption:{}|ProcessorId:{}",
        row.text("NumberOfCores"),
        row.text("NumberOfLogicalProcessors"),
        row.text("Name"),
        row.text("Caption"),
        row.text("ProcessorId"),
    )
}

/// One field gathered from every row that reports it, sorted and joined.
/// Duplicates and empty strings are kept, so repeats stay adjacent.
pub fn sorted_scalar(rows: &[ManagementRow], field: &str) -> Option<String> {
    let mut values: Vec<&str> = rows.iter().filter_map(|row| row.get(field)).collect();
    if values.is_empty() {
        return None;
    }

    values.sort_unstable();
    Some(values.join(LIST_SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn ethernet(name: &str, description: &str, address: &str) -> NetworkInterfaceInfo {
        NetworkInterfaceInfo {
            kind: InterfaceKind::Ethernet,
            name: name.to_string(),
            description: description.to_string(),
            hardware_address: address.to_string(),
        }
    }

    #[test]
    fn test_format_mac_address_lengths() {
        assert_eq!(format_mac_address("AABBCCDDEEFF"), "AA:BB:CC:DD:EE:FF");
        assert_eq!(format_mac_address("0011223344556677"), "00:11:22:33:44:55:66:77");
        assert_eq!(format_mac_address("ABC"), "ABC");
        assert_eq!(format_mac_address(""), "");
    }

    #[test]
    fn test_mac_drops_zero_and_empty_addresses() {
        let interfaces = vec![
            ethernet("eth0", "Intel", "AABBCCDDEEFF"),
            ethernet("eth1", "Intel", "000000000000"),
            ethernet("eth2", "Intel", ""),
        ];
        assert_eq!(canonical_mac_addresses(&interfaces).as_deref(), Some("AA:BB:CC:DD:EE:FF"));
    }

    #[test]
    fn test_mac_sorted_regardless_of_enumeration_order() {
        let interfaces = vec![
            ethernet("eth1", "", "BBBBBBBBBBBB"),
            ethernet("eth0", "", "AAAAAAAAAAAA"),
        ];
        assert_eq!(
            canonical_mac_addresses(&interfaces).as_deref(),
            Some("AA:AA:AA:AA:AA:AA,BB:BB:BB:BB:BB:BB")
        );
    }

    #[test]
    fn test_mac_excludes_virtual_and_non_ethernet() {
        let mut wifi = ethernet("wlan0", "", "111111111111");
        wifi.kind = InterfaceKind::Wireless;

        let interfaces = vec![
            wifi,
            ethernet("docker0", "", "222222222222"),
            ethernet("VMware Network Adapter VMnet8", "", "333333333333"),
            ethernet("TAP-Windows Adapter", "TAP-Windows Adapter V9", "444444444444"),
            ethernet("tap0", "", "555555555555"),
            ethernet("Ethernet 4", "Bluetooth Device (Personal Area Network)", "666666666666"),
            ethernet("vEthernet", "Hyper-V Virtual Adapter", "777777777777"),
            ethernet("蓝牙网络连接", "", "888888888888"),
        ];
        assert_eq!(canonical_mac_addresses(&interfaces), None);
    }

    #[test]
    fn test_mac_empty_set_is_absent() {
        assert_eq!(canonical_mac_addresses(&[]), None);
    }

    #[test]
    fn test_first_composite_stops_at_first_match() {
        let rows = vec![
            ManagementRow::new().with("SerialNumber", "").with("Product", ""),
            ManagementRow::new(),
            ManagementRow::new().with("Product", "B450M").with("Manufacturer", ""),
            ManagementRow::new().with("SerialNumber", "LATER"),
        ];
        let visited = Cell::new(0);
        let fields = ["SerialNumber", "Product", "Manufacturer"];

        let value = first_composite(
            rows.iter().inspect(|_| visited.set(visited.get() + 1)),
            &fields,
            |row| labelled_composite(row, &fields),
        );

        assert_eq!(value.as_deref(), Some("SerialNumber:|Product:B450M|Manufacturer:"));
        assert_eq!(visited.get(), 3);
    }

    #[test]
    fn test_first_composite_none_when_all_empty() {
        let rows = vec![ManagementRow::new().with("Name", "")];
        assert_eq!(first_composite(&rows, &["Name"], processor_composite), None);
    }

    #[test]
    fn test_processor_composite_format() {
        let row = ManagementRow::new()
            .with("NumberOfCores", "6")
            .with("NumberOfLogicalProcessors", "12")
            .with("Name", "Intel(R) Core(TM) i7-8700")
            .with("ProcessorId", "BFEBFBFF000906EA");

        assert_eq!(
            processor_composite(&row),
            "6-Core12-Thread|Name:Intel(R) Core(TM) i7-8700|Caption:|ProcessorId:BFEBFBFF000906EA"
        );
    }

    #[test]
    fn test_sorted_scalar_keeps_duplicates() {
        let rows = vec![
            ManagementRow::new().with("UUID", "B"),
            ManagementRow::new().with("UUID", "A"),
            ManagementRow::new().with("UUID", "B"),
        ];
        assert_eq!(sorted_scalar(&rows, "UUID").as_deref(), Some("A,B,B"));
    }

    #[test]
    fn test_sorted_scalar_keeps_empty_values() {
        let rows = vec![
            ManagementRow::new().with("UUID", "A"),
            ManagementRow::new(),
            ManagementRow::new().with("UUID", ""),
        ];
        assert_eq!(sorted_scalar(&rows, "UUID").as_deref(), Some(",A"));
    }

    #[test]
    fn test_sorted_scalar_without_field_is_absent() {
        let rows = vec![ManagementRow::new(), ManagementRow::new().with("Name", "x")];
        assert_eq!(sorted_scalar(&rows, "UUID"), None);
        assert_eq!(sorted_scalar(&[], "UUID"), None);
    }
}
