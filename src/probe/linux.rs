//! Linux probes over sysfs and procfs.
//!
//! There is no registry on Linux. The management classes are rebuilt from
//! `/proc/cpuinfo`, `/sys/class/dmi/id` and `/sys/block`, using the same field
//! names the Windows provider reports so composites stay comparable.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{
    classes, executable_stem, host_name, InterfaceKind, ManagementRow, MachineInfoProvider,
    NetworkInterfaceInfo, ProbeError, ProbeResult, RegistryHive, RegistryView,
};

const ARPHRD_ETHER: u32 = 1;
const ARPHRD_LOOPBACK: u32 = 772;

/// Nested device-mapper stacks deeper than this are not followed.
const MAX_SLAVE_DEPTH: usize = 4;

pub struct LinuxProvider {
    sys_root: PathBuf,
    proc_root: PathBuf,
}

impl LinuxProvider {
    pub fn new() -> Self {
        Self::with_roots("/sys", "/proc")
    }

    /// Read from alternative sysfs/procfs mounts (chroots, fixtures).
    pub fn with_roots(sys_root: impl Into<PathBuf>, proc_root: impl Into<PathBuf>) -> Self {
        Self {
            sys_root: sys_root.into(),
            proc_root: proc_root.into(),
        }
    }

    fn dmi(&self, attribute: &str) -> Option<String> {
        read_trimmed(&self.sys_root.join("class/dmi/id").join(attribute))
            .ok()
            .filter(|value| !value.is_empty())
    }

    fn interface(&self, dir: &Path, name: String) -> ProbeResult<NetworkInterfaceInfo> {
        let link_type: u32 = read_trimmed(&dir.join("type"))?
            .parse()
            .map_err(|e| ProbeError::parse(format!("{}/type", name), e))?;

        let kind = if name == "lo" || link_type == ARPHRD_LOOPBACK {
            InterfaceKind::Loopback
        } else if dir.join("wireless").exists() || dir.join("phy80211").exists() {
            InterfaceKind::Wireless
        } else if !dir.join("device").exists() {
            // bridges, veth pairs, tun/tap and bonds have no backing device
            InterfaceKind::Virtual
        } else if link_type == ARPHRD_ETHER {
            InterfaceKind::Ethernet
        } else {
            InterfaceKind::Other
        };

        let description = fs::read_link(dir.join("device/driver"))
            .ok()
            .and_then(|driver| driver.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_default();

        let hardware_address = read_trimmed(&dir.join("address"))
            .map(|address| address.replace(':', "").to_uppercase())
            .unwrap_or_default();

        Ok(NetworkInterfaceInfo {
            kind,
            name,
            description,
            hardware_address,
        })
    }

    fn processors(&self) -> ProbeResult<Vec<ManagementRow>> {
        let cpuinfo = fs::read_to_string(self.proc_root.join("cpuinfo"))?;
        Ok(parse_cpuinfo(&cpuinfo))
    }

    fn system_product(&self) -> Vec<ManagementRow> {
        let mut row = ManagementRow::new();
        if let Some(uuid) = self.dmi("product_uuid") {
            row.insert("UUID", uuid);
        }
        vec![row]
    }

    fn base_board(&self) -> Vec<ManagementRow> {
        let mut row = ManagementRow::new();
        for (field, attribute) in [
            ("SerialNumber", "board_serial"),
            ("Product", "board_name"),
            ("Manufacturer", "board_vendor"),
        ] {
            if let Some(value) = self.dmi(attribute) {
                row.insert(field, value);
            }
        }
        vec![row]
    }

    fn disk_row(&self, disk: &str) -> ManagementRow {
        let device = self.sys_root.join("block").join(disk).join("device");

        let mut row = ManagementRow::new().with("DeviceID", disk);
        if let Some(serial) = first_attribute(&device, &["serial", "vpd_serial"]) {
            row.insert("SerialNumber", serial);
        }
        if let Some(model) = first_attribute(&device, &["model"]) {
            row.insert("Caption", model);
        }
        if let Some(firmware) = first_attribute(&device, &["firmware_rev", "rev"]) {
            row.insert("FirmwareRevision", firmware);
        }
        row
    }

    /// Block device mounted at `/`, e.g. `nvme0n1p2`.
    fn root_block_device(&self) -> ProbeResult<String> {
        let mounts = fs::read_to_string(self.proc_root.join("self/mounts"))?;
        let source = root_mount_source(&mounts)
            .ok_or_else(|| ProbeError::NotFound("root filesystem mount".to_string()))?;

        // /dev/mapper/* and /dev/disk/by-* are symlinks onto the kernel name
        let resolved = fs::canonicalize(source).unwrap_or_else(|_| PathBuf::from(source));
        resolved
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| ProbeError::NotFound(format!("block device for {}", source)))
    }

    /// Whole disks that hold `device`, following partitions and
    /// device-mapper slaves.
    fn backing_disks(&self, device: &str, depth: usize, disks: &mut Vec<String>) -> ProbeResult<()> {
        let block = self.sys_root.join("block");

        if block.join(device).exists() {
            let slaves = block.join(device).join("slaves");
            if slaves.is_dir() && depth < MAX_SLAVE_DEPTH {
                for entry in fs::read_dir(slaves)? {
                    let slave = entry?.file_name().to_string_lossy().into_owned();
                    self.backing_disks(&slave, depth + 1, disks)?;
                }
            } else if !disks.iter().any(|d| d == device) {
                disks.push(device.to_string());
            }
            return Ok(());
        }

        for entry in fs::read_dir(&block)? {
            let entry = entry?;
            if entry.path().join(device).exists() {
                let disk = entry.file_name().to_string_lossy().into_owned();
                if !disks.contains(&disk) {
                    disks.push(disk);
                }
                return Ok(());
            }
        }

        Err(ProbeError::NotFound(format!("disk holding {}", device)))
    }
}

impl Default for LinuxProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MachineInfoProvider for LinuxProvider {
    fn machine_name(&self) -> ProbeResult<String> {
        host_name()
    }

    fn os_version(&self) -> ProbeResult<String> {
        let release = read_trimmed(&self.proc_root.join("sys/kernel/osrelease"))?;
        Ok(format!("Linux {}", release))
    }

    fn physical_interfaces(&self) -> ProbeResult<Vec<NetworkInterfaceInfo>> {
        let mut interfaces = Vec::new();

        for entry in fs::read_dir(self.sys_root.join("class/net"))? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            match self.interface(&entry.path(), name.clone()) {
                Ok(interface) => interfaces.push(interface),
                Err(e) => debug!("skipping interface {}: {}", name, e),
            }
        }

        Ok(interfaces)
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
        let rows = match class_name {
            classes::PROCESSOR => self.processors()?,
            classes::COMPUTER_SYSTEM_PRODUCT => self.system_product(),
            classes::BASE_BOARD => self.base_board(),
            other => return Err(ProbeError::NotFound(format!("management class {}", other))),
        };
        Ok(project(rows, fields))
    }

    fn query_system_disk_drives(&self, fields: &[&str]) -> ProbeResult<Vec<ManagementRow>> {
        let device = self.root_block_device()?;
        let mut disks = Vec::new();
        self.backing_disks(&device, 0, &mut disks)?;

        let rows = disks.iter().map(|disk| self.disk_row(disk)).collect();
        Ok(project(rows, fields))
    }

    fn current_process_name(&self) -> ProbeResult<String> {
        executable_stem()
    }
}

fn read_trimmed(path: &Path) -> ProbeResult<String> {
    Ok(fs::read_to_string(path)?.trim().to_string())
}

fn first_attribute(dir: &Path, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| read_trimmed(&dir.join(name)).ok().filter(|v| !v.is_empty()))
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

fn root_mount_source(mounts: &str) -> Option<&str> {
    mounts
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            Some((parts.next()?, parts.next()?))
        })
        .filter(|(source, target)| *target == "/" && source.starts_with("/dev/"))
        .map(|(source, _)| source)
        .last()
}

/// One `Win32_Processor`-shaped row per physical package.
fn parse_cpuinfo(cpuinfo: &str) -> Vec<ManagementRow> {
    let mut packages: BTreeMap<u32, Vec<BTreeMap<&str, &str>>> = BTreeMap::new();

    for block in cpuinfo.split("\n\n") {
        let fields: BTreeMap<&str, &str> = block
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key.trim(), value.trim()))
            .collect();

        if !fields.contains_key("processor") {
            continue;
        }

        let package = fields
            .get("physical id")
            .and_then(|id| id.parse().ok())
            .unwrap_or(0);
        packages.entry(package).or_default().push(fields);
    }

    packages
        .values()
        .map(|threads| {
            let first = &threads[0];
            let mut row = ManagementRow::new();

            if let Some(name) = first.get("model name").or_else(|| first.get("Hardware")) {
                row.insert("Name", *name);
            }
            if let Some(vendor) = first.get("vendor_id") {
                row.insert(
                    "Caption",
                    format!(
                        "{} Family {} Model {} Stepping {}",
                        vendor,
                        first.get("cpu family").unwrap_or(&""),
                        first.get("model").unwrap_or(&""),
                        first.get("stepping").unwrap_or(&""),
                    ),
                );
            }

            let logical = threads.len().to_string();
            row.insert("NumberOfCores", first.get("cpu cores").copied().unwrap_or(logical.as_str()));
            row.insert(
                "NumberOfLogicalProcessors",
                first.get("siblings").copied().unwrap_or(logical.as_str()),
            );
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    const CPUINFO: &str = "processor\t: 0
vendor_id\t: GenuineIntel
cpu family\t: 6
model\t\t: 158
model name\t: Intel(R) Core(TM) i7-8700 CPU @ 3.20GHz
stepping\t: 10
physical id\t: 0
siblings\t: 12
cpu cores\t: 6

processor\t: 1
vendor_id\t: GenuineIntel
cpu family\t: 6
model\t\t: 158
model name\t: Intel(R) Core(TM) i7-8700 CPU @ 3.20GHz
stepping\t: 10
physical id\t: 0
siblings\t: 12
cpu cores\t: 6
";

    #[test]
    fn test_parse_cpuinfo_groups_by_package() {
        let rows = parse_cpuinfo(CPUINFO);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("Name"), "Intel(R) Core(TM) i7-8700 CPU @ 3.20GHz");
        assert_eq!(rows[0].text("Caption"), "GenuineIntel Family 6 Model 158 Stepping 10");
        assert_eq!(rows[0].text("NumberOfCores"), "6");
        assert_eq!(rows[0].text("NumberOfLogicalProcessors"), "12");
        assert_eq!(rows[0].get("ProcessorId"), None);
    }

    #[test]
    fn test_parse_cpuinfo_counts_threads_without_topology() {
        let rows = parse_cpuinfo("processor\t: 0\nHardware\t: BCM2835\n\nprocessor\t: 1\n");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("Name"), "BCM2835");
        assert_eq!(rows[0].text("NumberOfCores"), "2");
    }

    #[test]
    fn test_root_mount_source() {
        let mounts = "proc /proc proc rw 0 0\n/dev/nvme0n1p2 / ext4 rw 0 0\n/dev/nvme0n1p1 /boot vfat rw 0 0\n";
        assert_eq!(root_mount_source(mounts), Some("/dev/nvme0n1p2"));
        assert_eq!(root_mount_source("overlay / overlay rw 0 0\n"), None);
    }

    #[test]
    fn test_physical_interfaces_classification() {
        let sys = tempdir().unwrap();
        let net = sys.path().join("class/net");

        write(&net.join("eth0/type"), "1\n");
        write(&net.join("eth0/address"), "aa:bb:cc:dd:ee:ff\n");
        fs::create_dir_all(net.join("eth0/device")).unwrap();

        write(&net.join("wlan0/type"), "1\n");
        write(&net.join("wlan0/address"), "11:22:33:44:55:66\n");
        fs::create_dir_all(net.join("wlan0/device")).unwrap();
        fs::create_dir_all(net.join("wlan0/wireless")).unwrap();

        write(&net.join("docker0/type"), "1\n");
        write(&net.join("docker0/address"), "02:42:ac:11:00:01\n");

        write(&net.join("lo/type"), "772\n");
        write(&net.join("lo/address"), "00:00:00:00:00:00\n");

        let provider = LinuxProvider::with_roots(sys.path(), sys.path());
        let mut interfaces = provider.physical_interfaces().unwrap();
        interfaces.sort_by(|a, b| a.name.cmp(&b.name));

        let kinds: Vec<_> = interfaces.iter().map(|i| (i.name.as_str(), i.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("docker0", InterfaceKind::Virtual),
                ("eth0", InterfaceKind::Ethernet),
                ("lo", InterfaceKind::Loopback),
                ("wlan0", InterfaceKind::Wireless),
            ]
        );
        assert_eq!(interfaces[1].hardware_address, "AABBCCDDEEFF");
    }

    #[test]
    fn test_base_board_skips_unreadable_attributes() {
        let sys = tempdir().unwrap();
        write(&sys.path().join("class/dmi/id/board_name"), "B450M\n");
        write(&sys.path().join("class/dmi/id/board_vendor"), "Micro-Star\n");

        let provider = LinuxProvider::with_roots(sys.path(), sys.path());
        let rows = provider
            .query_management_class(classes::BASE_BOARD, &["SerialNumber", "Product", "Manufacturer"])
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("SerialNumber"), None);
        assert_eq!(rows[0].text("Product"), "B450M");
        assert_eq!(rows[0].text("Manufacturer"), "Micro-Star");
    }

    #[test]
    fn test_system_disk_drives_follow_partition_to_disk() {
        let root = tempdir().unwrap();
        let sys = root.path().join("sys");
        let proc_root = root.path().join("proc");

        write(&proc_root.join("self/mounts"), "/dev/nvme0n1p2 / ext4 rw 0 0\n");
        write(&sys.join("block/nvme0n1/device/serial"), "S4EWNX0N\n");
        write(&sys.join("block/nvme0n1/device/model"), "Samsung SSD 970\n");
        write(&sys.join("block/nvme0n1/device/firmware_rev"), "2B2QEXM7\n");
        fs::create_dir_all(sys.join("block/nvme0n1/nvme0n1p2")).unwrap();
        fs::create_dir_all(sys.join("block/sda/device")).unwrap();

        let provider = LinuxProvider::with_roots(&sys, &proc_root);
        let rows = provider
            .query_system_disk_drives(&["SerialNumber", "Caption", "FirmwareRevision"])
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("SerialNumber"), "S4EWNX0N");
        assert_eq!(rows[0].text("Caption"), "Samsung SSD 970");
        assert_eq!(rows[0].text("FirmwareRevision"), "2B2QEXM7");
    }

    #[test]
    fn test_disk_drive_class_is_not_emulated() {
        let sys = tempdir().unwrap();
        fs::create_dir_all(sys.path().join("block/sda/device")).unwrap();

        let provider = LinuxProvider::with_roots(sys.path(), sys.path());
        let result = provider.query_management_class(classes::DISK_DRIVE, &["SerialNumber"]);
        assert!(matches!(result, Err(ProbeError::NotFound(_))));
    }

    #[test]
    fn test_registry_is_unsupported() {
        let provider = LinuxProvider::new();
        let result = provider.read_registry_value(
            RegistryHive::LocalMachine,
            RegistryView::Registry64,
            r"SOFTWARE\Microsoft\Cryptography",
            "MachineGuid",
        );
        assert!(matches!(result, Err(ProbeError::Unsupported(_))));
    }
}
