use std::collections::BTreeMap;

use tracing::{debug, warn};
use uuid::Uuid;

use super::canonical::{
    canonical_mac_addresses, first_composite, labelled_composite, non_empty, processor_composite,
    sorted_scalar,
};
use super::component::Component;
use super::digest::digest;
use super::registry::ComponentRegistry;
use super::Fingerprint;
use crate::probe::{classes, MachineInfoProvider, ProbeResult, RegistryHive, RegistryView};
use crate::store::TokenStore;

/// Views tried by registry-backed components, in priority order.
const REGISTRY_VIEWS: [RegistryView; 2] = [RegistryView::Registry32, RegistryView::Registry64];

const CRYPTOGRAPHY_KEY: &str = r"SOFTWARE\Microsoft\Cryptography";
const CURRENT_VERSION_KEY: &str = r"SOFTWARE\Microsoft\Windows NT\CurrentVersion";
const SQM_CLIENT_KEY: &str = r"SOFTWARE\Microsoft\SQMClient";

const PROCESSOR_KEY_FIELDS: [&str; 3] = ["ProcessorId", "Caption", "Name"];
const PROCESSOR_FIELDS: [&str; 5] = [
    "ProcessorId",
    "Caption",
    "Name",
    "NumberOfCores",
    "NumberOfLogicalProcessors",
];
const BASE_BOARD_FIELDS: [&str; 3] = ["SerialNumber", "Product", "Manufacturer"];
const DISK_DRIVE_FIELDS: [&str; 3] = ["SerialNumber", "Caption", "FirmwareRevision"];

/// Collects components one probe at a time.
///
/// Every `add_*` call runs exactly one probe and overwrites that component's
/// entry. Probe failures never escape: the component becomes absent and the
/// error text is kept on the snapshot.
pub struct DeviceIdBuilder<'a> {
    provider: &'a dyn MachineInfoProvider,
    store: &'a dyn TokenStore,
    registry: ComponentRegistry,
    failures: BTreeMap<String, String>,
}

impl<'a> DeviceIdBuilder<'a> {
    pub fn new(provider: &'a dyn MachineInfoProvider, store: &'a dyn TokenStore) -> Self {
        Self {
            provider,
            store,
            registry: ComponentRegistry::new(),
            failures: BTreeMap::new(),
        }
    }

    pub fn add_component(mut self, name: &str, value: Option<String>) -> Self {
        self.settle(name, Ok(value));
        self
    }

    pub fn add(mut self, component: &Component) -> Self {
        let outcome = self.probe(component);
        self.settle(component.name(), outcome);
        self
    }

    pub fn add_machine_name(self) -> Self {
        self.add(&Component::MachineName)
    }

    pub fn add_os_version(self) -> Self {
        self.add(&Component::OsVersion)
    }

    pub fn add_mac_address(self) -> Self {
        self.add(&Component::MacAddress)
    }

    pub fn add_machine_guid(self) -> Self {
        self.add(&Component::MachineGuid)
    }

    pub fn add_windows_product_id(self) -> Self {
        self.add(&Component::WindowsProductId)
    }

    pub fn add_windows_device_id(self) -> Self {
        self.add(&Component::WindowsDeviceId)
    }

    /// Persisted random token under `name`, or under the process name.
    pub fn add_stable_token(self, name: Option<&str>) -> Self {
        self.add(&Component::StableToken {
            name: name.map(str::to_string),
        })
    }

    pub fn add_processor_info(self) -> Self {
        self.add(&Component::ProcessorInfo)
    }

    pub fn add_system_uuid(self) -> Self {
        self.add(&Component::SystemUuid)
    }

    pub fn add_motherboard_info(self) -> Self {
        self.add(&Component::MotherboardInfo)
    }

    pub fn add_system_drive_info(self) -> Self {
        self.add(&Component::SystemDriveInfo)
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn render(&self) -> String {
        self.registry.render()
    }

    pub fn hash(&self) -> String {
        digest(&self.registry)
    }

    pub fn build(self) -> Fingerprint {
        Fingerprint::new(self.registry, self.failures)
    }

    /// The only place a probe error is turned into an absent value.
    fn settle(&mut self, name: &str, outcome: ProbeResult<Option<String>>) {
        let value = match outcome {
            Ok(value) => {
                self.failures.remove(name);
                value
            }
            Err(e) => {
                debug!(component = name, error = %e, "probe failed, component is absent");
                self.failures.insert(name.to_string(), e.to_string());
                None
            }
        };

        debug!(component = name, present = value.is_some(), "component collected");
        self.registry.set(name, value);
    }

    fn probe(&self, component: &Component) -> ProbeResult<Option<String>> {
        let provider = self.provider;

        match component {
            Component::MachineName => provider.machine_name().map(non_empty),
            Component::OsVersion => provider.os_version().map(non_empty),
            Component::MacAddress => provider
                .physical_interfaces()
                .map(|interfaces| canonical_mac_addresses(&interfaces)),
            Component::MachineGuid => Ok(read_registry_value(
                provider,
                RegistryHive::LocalMachine,
                CRYPTOGRAPHY_KEY,
                "MachineGuid",
            )),
            Component::WindowsProductId => Ok(read_registry_value(
                provider,
                RegistryHive::LocalMachine,
                CURRENT_VERSION_KEY,
                "ProductId",
            )),
            Component::WindowsDeviceId => Ok(read_registry_value(
                provider,
                RegistryHive::LocalMachine,
                SQM_CLIENT_KEY,
                "MachineId",
            )),
            Component::StableToken { name } => stable_token(provider, self.store, name.as_deref()),
            Component::ProcessorInfo => provider
                .query_management_class(classes::PROCESSOR, &PROCESSOR_FIELDS)
                .map(|rows| first_composite(&rows, &PROCESSOR_KEY_FIELDS, processor_composite)),
            Component::SystemUuid => provider
                .query_management_class(classes::COMPUTER_SYSTEM_PRODUCT, &["UUID"])
                .map(|rows| sorted_scalar(&rows, "UUID")),
            Component::MotherboardInfo => provider
                .query_management_class(classes::BASE_BOARD, &BASE_BOARD_FIELDS)
                .map(|rows| {
                    first_composite(&rows, &BASE_BOARD_FIELDS, |row| {
                        labelled_composite(row, &BASE_BOARD_FIELDS)
                    })
                }),
            Component::SystemDriveInfo => provider
                .query_system_disk_drives(&DISK_DRIVE_FIELDS)
                .map(|rows| {
                    first_composite(&rows, &DISK_DRIVE_FIELDS, |row| {
                        labelled_composite(row, &DISK_DRIVE_FIELDS)
                    })
                }),
            Component::Custom { value, .. } => Ok(value.clone()),
        }
    }
}

/// First non-empty value across the 32-bit then 64-bit view.
///
/// A view that errors is skipped like a missing key; each view is tried once.
pub fn read_registry_value(
    provider: &dyn MachineInfoProvider,
    hive: RegistryHive,
    key_path: &str,
    value_name: &str,
) -> Option<String> {
    REGISTRY_VIEWS.iter().find_map(|view| {
        match provider.read_registry_value(hive, *view, key_path, value_name) {
            Ok(value) => value.and_then(non_empty),
            Err(e) => {
                debug!(?view, key = key_path, value = value_name, error = %e, "registry view unreadable");
                None
            }
        }
    })
}

/// Stored token for the sub-key, generating and persisting one on first use.
///
/// A token is only returned once it has been written; a failed write makes
/// the component absent for this run.
pub fn stable_token(
    provider: &dyn MachineInfoProvider,
    store: &dyn TokenStore,
    name: Option<&str>,
) -> ProbeResult<Option<String>> {
    let sub_key = match name {
        Some(name) => name.to_string(),
        None => provider.current_process_name()?,
    };

    if let Some(existing) = store.get(&sub_key)?.and_then(non_empty) {
        return Ok(Some(existing));
    }

    let token = Uuid::new_v4().to_string();
    if let Err(e) = store.set(&sub_key, &token) {
        warn!(key = %sub_key, error = %e, "could not persist stable token");
        return Err(e);
    }

    debug!(key = %sub_key, "generated new stable token");
    Ok(Some(token))
}

/// Run `components` in order and freeze the result.
pub fn collect(
    provider: &dyn MachineInfoProvider,
    store: &dyn TokenStore,
    components: &[Component],
) -> Fingerprint {
    components
        .iter()
        .fold(DeviceIdBuilder::new(provider, store), |builder, component| {
            builder.add(component)
        })
        .build()
}
