//! Cached projects, tenant policies and the tracking ledger that links them.

pub mod errors;
pub mod ledger;
pub mod metrics_defs;
pub mod policy;
pub mod registry;
pub mod store;
pub mod types;

pub use errors::{LedgerError, PolicyError, RegistryError, StoreError};
pub use ledger::{Tracked, TrackingLedger};
pub use policy::{PolicyStore, PolicyUpdate};
pub use registry::{ProjectRegistry, UpdateDecision};
pub use store::{Store, StoreConfig};
pub use types::{
    NotificationStyle, PolicyDefaults, Project, TenantPolicy, TrackingEntry, TrackingKey,
    VersionSet,
};
