use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Registry keys of the standard components. Case-sensitive.
pub mod names {
    pub const MACHINE_NAME: &str = "MachineName";
    pub const OS_VERSION: &str = "OSVersion";
    pub const MAC_ADDRESS: &str = "MacAddress";
    pub const MACHINE_GUID: &str = "MachineGuid";
    pub const WINDOWS_PRODUCT_ID: &str = "WindowsProductId";
    pub const WINDOWS_DEVICE_ID: &str = "WindowsDeviceId";
    pub const STABLE_TOKEN: &str = "WindowsRegistryToken";
    pub const PROCESSOR_INFO: &str = "ProcessorInfo";
    pub const SYSTEM_UUID: &str = "SystemUuid";
    pub const MOTHERBOARD_INFO: &str = "MotherboardInfo";
    pub const SYSTEM_DRIVE_INFO: &str = "SystemDriveInfo";
}

/// Standard probes, as named in config files and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentKind {
    MachineName,
    OsVersion,
    MacAddress,
    MachineGuid,
    WindowsProductId,
    WindowsDeviceId,
    StableToken,
    ProcessorInfo,
    SystemUuid,
    MotherboardInfo,
    SystemDriveInfo,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 11] = [
        ComponentKind::MachineName,
        ComponentKind::OsVersion,
        ComponentKind::MacAddress,
        ComponentKind::MachineGuid,
        ComponentKind::WindowsProductId,
        ComponentKind::WindowsDeviceId,
        ComponentKind::StableToken,
        ComponentKind::ProcessorInfo,
        ComponentKind::SystemUuid,
        ComponentKind::MotherboardInfo,
        ComponentKind::SystemDriveInfo,
    ];

    fn slug(self) -> &'static str {
        match self {
            ComponentKind::MachineName => "machine-name",
            ComponentKind::OsVersion => "os-version",
            ComponentKind::MacAddress => "mac-address",
            ComponentKind::MachineGuid => "machine-guid",
            ComponentKind::WindowsProductId => "windows-product-id",
            ComponentKind::WindowsDeviceId => "windows-device-id",
            ComponentKind::StableToken => "stable-token",
            ComponentKind::ProcessorInfo => "processor-info",
            ComponentKind::SystemUuid => "system-uuid",
            ComponentKind::MotherboardInfo => "motherboard-info",
            ComponentKind::SystemDriveInfo => "system-drive-info",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for ComponentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.slug() == s)
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(|k| k.slug()).collect();
                format!("unknown component '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

/// One probe to run, and the registry entry it fills.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    MachineName,
    OsVersion,
    MacAddress,
    MachineGuid,
    WindowsProductId,
    WindowsDeviceId,
    /// Persisted random token; `name` selects the storage sub-key and
    /// defaults to the current process name.
    StableToken { name: Option<String> },
    ProcessorInfo,
    SystemUuid,
    MotherboardInfo,
    SystemDriveInfo,
    /// Caller-supplied value stored as-is.
    Custom { name: String, value: Option<String> },
}

impl Component {
    pub fn name(&self) -> &str {
        match self {
            Component::MachineName => names::MACHINE_NAME,
            Component::OsVersion => names::OS_VERSION,
            Component::MacAddress => names::MAC_ADDRESS,
            Component::MachineGuid => names::MACHINE_GUID,
            Component::WindowsProductId => names::WINDOWS_PRODUCT_ID,
            Component::WindowsDeviceId => names::WINDOWS_DEVICE_ID,
            Component::StableToken { .. } => names::STABLE_TOKEN,
            Component::ProcessorInfo => names::PROCESSOR_INFO,
            Component::SystemUuid => names::SYSTEM_UUID,
            Component::MotherboardInfo => names::MOTHERBOARD_INFO,
            Component::SystemDriveInfo => names::SYSTEM_DRIVE_INFO,
            Component::Custom { name, .. } => name,
        }
    }

    /// Descriptor for `kind`, using `token_name` for the stable token sub-key.
    pub fn from_kind(kind: ComponentKind, token_name: Option<&str>) -> Self {
        match kind {
            ComponentKind::MachineName => Component::MachineName,
            ComponentKind::OsVersion => Component::OsVersion,
            ComponentKind::MacAddress => Component::MacAddress,
            ComponentKind::MachineGuid => Component::MachineGuid,
            ComponentKind::WindowsProductId => Component::WindowsProductId,
            ComponentKind::WindowsDeviceId => Component::WindowsDeviceId,
            ComponentKind::StableToken => Component::StableToken {
                name: token_name.map(str::to_string),
            },
            ComponentKind::ProcessorInfo => Component::ProcessorInfo,
            ComponentKind::SystemUuid => Component::SystemUuid,
            ComponentKind::MotherboardInfo => Component::MotherboardInfo,
            ComponentKind::SystemDriveInfo => Component::SystemDriveInfo,
        }
    }
}

impl From<ComponentKind> for Component {
    fn from(kind: ComponentKind) -> Self {
        Component::from_kind(kind, None)
    }
}
