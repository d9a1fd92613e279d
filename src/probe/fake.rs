//! In-memory [`MachineInfoProvider`] for tests.
//!
//! Every source starts out unavailable. Seed the values a test needs with the
//! `with_*` methods; anything left unseeded fails with [`ProbeError::NotFound`].
//! Calls are recorded so a test can check which probes actually ran.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use super::{
    ManagementRow, MachineInfoProvider, NetworkInterfaceInfo, ProbeError, ProbeResult,
    RegistryHive, RegistryView,
};

type RegistryCell = (RegistryHive, RegistryView, String, String);

#[derive(Debug, Default)]
pub struct FakeProvider {
    machine_name: Option<String>,
    os_version: Option<String>,
    interfaces: Option<Vec<NetworkInterfaceInfo>>,
    registry: BTreeMap<String, String>,
    failing_views: BTreeSet<String>,
    classes: BTreeMap<String, Vec<ManagementRow>>,
    disk_drives: Option<Vec<ManagementRow>>,
    process_name: Option<String>,
    calls: RefCell<Vec<String>>,
}

fn cell_key((hive, view, key_path, value_name): &RegistryCell) -> String {
    format!("{:?}/{:?}/{}/{}", hive, view, key_path, value_name)
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider where every probe fails.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn with_machine_name(mut self, name: &str) -> Self {
        self.machine_name = Some(name.to_string());
        self
    }

    pub fn with_os_version(mut self, version: &str) -> Self {
        self.os_version = Some(version.to_string());
        self
    }

    pub fn with_interfaces(mut self, interfaces: Vec<NetworkInterfaceInfo>) -> Self {
        self.interfaces = Some(interfaces);
        self
    }

    pub fn with_registry_value(
        mut self,
        hive: RegistryHive,
        view: RegistryView,
        key_path: &str,
        value_name: &str,
        value: &str,
    ) -> Self {
        let key = cell_key(&(hive, view, key_path.to_string(), value_name.to_string()));
        self.registry.insert(key, value.to_string());
        self
    }

    /// Make every read through `view` of `hive` fail with an access error.
    pub fn with_failing_view(mut self, hive: RegistryHive, view: RegistryView) -> Self {
        self.failing_views.insert(format!("{:?}/{:?}", hive, view));
        self
    }

    pub fn with_class_rows(mut self, class_name: &str, rows: Vec<ManagementRow>) -> Self {
        self.classes.insert(class_name.to_string(), rows);
        self
    }

    pub fn with_disk_drives(mut self, rows: Vec<ManagementRow>) -> Self {
        self.disk_drives = Some(rows);
        self
    }

    pub fn with_process_name(mut self, name: &str) -> Self {
        self.process_name = Some(name.to_string());
        self
    }

    /// Probe calls in the order they were made.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn project(rows: &[ManagementRow], fields: &[&str]) -> Vec<ManagementRow> {
        rows.iter()
            .map(|row| {
                fields
                    .iter()
                    .filter_map(|field| row.get(field).map(|value| (*field, value)))
                    .collect()
            })
            .collect()
    }
}

fn seeded<T: Clone>(value: &Option<T>, what: &str) -> ProbeResult<T> {
    value
        .clone()
        .ok_or_else(|| ProbeError::NotFound(what.to_string()))
}

impl MachineInfoProvider for FakeProvider {
    fn machine_name(&self) -> ProbeResult<String> {
        self.record("machine_name".to_string());
        seeded(&self.machine_name, "machine name")
    }

    fn os_version(&self) -> ProbeResult<String> {
        self.record("os_version".to_string());
        seeded(&self.os_version, "os version")
    }

    fn physical_interfaces(&self) -> ProbeResult<Vec<NetworkInterfaceInfo>> {
        self.record("physical_interfaces".to_string());
        seeded(&self.interfaces, "network interfaces")
    }

    fn read_registry_value(
        &self,
        hive: RegistryHive,
        view: RegistryView,
        key_path: &str,
        value_name: &str,
    ) -> ProbeResult<Option<String>> {
        self.record(format!("read_registry_value:{:?}:{}", view, value_name));

        if self.failing_views.contains(&format!("{:?}/{:?}", hive, view)) {
            return Err(ProbeError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{:?} view is not accessible", view),
            )));
        }

        let key = cell_key(&(hive, view, key_path.to_string(), value_name.to_string()));
        Ok(self.registry.get(&key).cloned())
    }

    fn query_management_class(
        &self,
        class_name: &str,
        fields: &[&str],
    ) -> ProbeResult<Vec<ManagementRow>> {
        self.record(format!("query_management_class:{}", class_name));
        let rows = self
            .classes
            .get(class_name)
            .ok_or_else(|| ProbeError::NotFound(format!("class {}", class_name)))?;
        Ok(Self::project(rows, fields))
    }

    fn query_system_disk_drives(&self, fields: &[&str]) -> ProbeResult<Vec<ManagementRow>> {
        self.record("query_system_disk_drives".to_string());
        let rows = seeded(&self.disk_drives, "system disk drives")?;
        Ok(Self::project(&rows, fields))
    }

    fn current_process_name(&self) -> ProbeResult<String> {
        self.record("current_process_name".to_string());
        seeded(&self.process_name, "process name")
    }
}
