//! Contract boundary for the legacy device-class backend.
//!
//! The legacy driver family's own primitives (device-class walk, device
//! creation, registry rename) live in a host service outside this crate;
//! this module pins down the interface the orchestrator consumes and ships
//! the stand-in used where no such service exists.

use crate::error::{AdapterError, Result};
use crate::identity::{AdapterIdentity, AdapterRecord};

/// Lifecycle primitives of the legacy backend. Mutations report whether the
/// host wants a reboot for the change to take full effect.
pub trait LegacyService {
    /// Creates an unnamed adapter under the given hardware id. The backend
    /// has no atomic create-with-name; naming is a separate rename step.
    fn create_adapter(
        &self,
        description: &str,
        hardware_id: &str,
    ) -> Result<(AdapterIdentity, bool)>;

    fn delete_adapter(&self, identity: AdapterIdentity) -> Result<bool>;

    /// Walks the device class, yielding one record per adapter whose
    /// hardware id matches the filter case-insensitively. `None` lists
    /// every adapter.
    fn list_adapters(&self, hardware_ids: Option<&[String]>) -> Result<Vec<AdapterRecord>>;

    fn rename_adapter(&self, identity: AdapterIdentity, name: &str) -> Result<()>;
}

/// Used on hosts without a device-class adapter service; every primitive
/// reports the backend as unavailable.
pub struct UnavailableService;

impl LegacyService for UnavailableService {
    fn create_adapter(
        &self,
        _description: &str,
        _hardware_id: &str,
    ) -> Result<(AdapterIdentity, bool)> {
        Err(AdapterError::LegacyUnavailable)
    }

    fn delete_adapter(&self, _identity: AdapterIdentity) -> Result<bool> {
        Err(AdapterError::LegacyUnavailable)
    }

    fn list_adapters(&self, _hardware_ids: Option<&[String]>) -> Result<Vec<AdapterRecord>> {
        Err(AdapterError::LegacyUnavailable)
    }

    fn rename_adapter(&self, _identity: AdapterIdentity, _name: &str) -> Result<()> {
        Err(AdapterError::LegacyUnavailable)
    }
}

/// The legacy service for this host. Platform integrations provide the
/// device-class implementation; everywhere else the backend is reported as
/// unavailable and only the dynamic backend is usable.
pub fn host_service() -> Box<dyn LegacyService> {
    tracing::trace!("No device-class service on this host");
    Box::new(UnavailableService)
}
