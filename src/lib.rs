//! Deterministic machine fingerprints.
//!
//! Hardware and OS facts are gathered through a [`probe::MachineInfoProvider`],
//! canonicalized into a name-ordered component registry and hashed with
//! SHA-256. Absent or failing sources never abort a run; they simply leave
//! their component empty.

pub mod config;
pub mod fingerprint;
pub mod probe;
pub mod store;

pub use fingerprint::{collect, Component, ComponentKind, DeviceIdBuilder, Fingerprint};
pub use probe::{default_provider, MachineInfoProvider, ProbeError, ProbeResult};
pub use store::{default_token_store, open_token_store, TokenStore};
