//! Adapter lifecycle orchestration.
//!
//! One create/list/delete vocabulary over two backends with different
//! identity models and failure granularity. The legacy family has no atomic
//! create-with-name, so the create path synthesizes transactional semantics
//! (create, validate, rename-or-rollback); the dynamic backend creates
//! atomically and needs none of that. Callers never see the asymmetry.

use crate::dynamic::DynamicProvider;
use crate::error::{AdapterError, Result};
use crate::identity::{AdapterIdentity, AdapterRecord, DeleteTarget};
use crate::legacy::LegacyService;

/// Hardware id selecting the dynamic backend, compared case-insensitively.
pub const DYNAMIC_HWID: &str = "Wintun";

/// Hardware id of the legacy driver family, used when `create` is given no
/// explicit hardware id.
pub const LEGACY_DEFAULT_HWID: &str = "root\\tap0901";

/// Some hosts register the legacy driver without the enumerator prefix.
pub const LEGACY_ALT_HWID: &str = "tap0901";

/// Device description passed to legacy creations.
const LEGACY_DESCRIPTION: &str = "Virtual Ethernet";

/// Default adapter name when creating on the dynamic backend without an
/// explicit `--name`; the dynamic backend has no default-name convention of
/// its own.
pub const DEFAULT_DYNAMIC_NAME: &str = concat!(env!("CARGO_PKG_NAME"), " Wintun");

pub fn is_dynamic_hwid(hardware_id: &str) -> bool {
    hardware_id.eq_ignore_ascii_case(DYNAMIC_HWID)
}

fn names_equal(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Reboot-required advisory accumulated across every mutating operation of
/// one command invocation. Monotonic: once set it stays set.
#[derive(Debug, Default)]
pub struct RebootFlag(bool);

impl RebootFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note(&mut self, reboot_required: bool) {
        self.0 |= reboot_required;
    }

    pub fn is_set(&self) -> bool {
        self.0
    }
}

pub struct Orchestrator<'a> {
    legacy: &'a dyn LegacyService,
    dynamic: &'a mut dyn DynamicProvider,
    reboot: RebootFlag,
}

impl<'a> Orchestrator<'a> {
    pub fn new(legacy: &'a dyn LegacyService, dynamic: &'a mut dyn DynamicProvider) -> Self {
        Self {
            legacy,
            dynamic,
            reboot: RebootFlag::new(),
        }
    }

    /// Whether any operation of this invocation reported reboot-required.
    /// Read once at the end; never downgraded.
    pub fn reboot_required(&self) -> bool {
        self.reboot.is_set()
    }

    /// Creates an adapter and returns its identity.
    pub fn create(&mut self, name: Option<&str>, hardware_id: &str) -> Result<AdapterIdentity> {
        if is_dynamic_hwid(hardware_id) {
            self.create_dynamic(name)
        } else {
            self.create_legacy(name, hardware_id)
        }
    }

    fn create_dynamic(&mut self, name: Option<&str>) -> Result<AdapterIdentity> {
        let service = self.dynamic.ensure_bound()?;
        // The backend requires a name and enforces uniqueness itself.
        let name = match name {
            Some(name) if !name.is_empty() => name,
            _ => DEFAULT_DYNAMIC_NAME,
        };
        let (identity, reboot) = service.create(name)?;
        self.reboot.note(reboot);
        Ok(identity)
    }

    fn create_legacy(&mut self, name: Option<&str>, hardware_id: &str) -> Result<AdapterIdentity> {
        let (identity, reboot) = self.legacy.create_adapter(LEGACY_DESCRIPTION, hardware_id)?;
        self.reboot.note(reboot);
        tracing::debug!(identity = %identity, hwid = %hardware_id, "Created legacy adapter");

        let Some(name) = name else {
            return Ok(identity);
        };

        if let Err(error) = self.apply_name(identity, name, hardware_id) {
            // Roll back the half-finished creation, then surface the
            // original failure, not a rollback error.
            tracing::debug!(identity = %identity, error = %error, "Rolling back adapter creation");
            match self.legacy.delete_adapter(identity) {
                Ok(reboot) => self.reboot.note(reboot),
                Err(rollback_error) => {
                    tracing::warn!(
                        identity = %identity,
                        error = %rollback_error,
                        "Rollback deletion failed; orphan adapter left behind"
                    );
                }
            }
            return Err(error);
        }

        Ok(identity)
    }

    /// Duplicate check scoped to the adapter's own hardware identity, then
    /// the rename. Duplicate-name concerns are per driver family, not
    /// system-wide.
    fn apply_name(&self, identity: AdapterIdentity, name: &str, hardware_id: &str) -> Result<()> {
        let filter = [hardware_id.to_string()];
        let existing = self.legacy.list_adapters(Some(&filter))?;

        if let Some(duplicate) = existing
            .iter()
            .find(|record| record.identity != identity && names_equal(&record.name, name))
        {
            return Err(AdapterError::DuplicateName {
                name: name.to_string(),
                identity: duplicate.identity,
            });
        }

        self.legacy.rename_adapter(identity, name)
    }

    /// Lists adapters, scoped by hardware id. Without a filter the default
    /// covers both spellings of the legacy driver plus the dynamic family.
    pub fn list(&mut self, hardware_id: Option<&str>) -> Result<Vec<AdapterRecord>> {
        match hardware_id {
            Some(hwid) if is_dynamic_hwid(hwid) => {
                let service = self.dynamic.ensure_bound()?;
                service.records()
            }
            Some(hwid) => self.legacy.list_adapters(Some(&[hwid.to_string()])),
            None => {
                let default_filter = [
                    LEGACY_DEFAULT_HWID.to_string(),
                    LEGACY_ALT_HWID.to_string(),
                    DYNAMIC_HWID.to_string(),
                ];
                self.legacy.list_adapters(Some(&default_filter))
            }
        }
    }

    /// Deletes the adapter the argument denotes, trying the dynamic backend
    /// fully before falling back to the legacy family. A GUID or name can
    /// collide in only one backend, so ordered fallback stays deterministic
    /// without a combined cross-backend search.
    pub fn delete(&mut self, target: &str) -> Result<()> {
        let parsed = DeleteTarget::parse(target);

        match self.dynamic.ensure_bound() {
            Ok(service) => {
                let outcome = match &parsed {
                    DeleteTarget::Identity(identity) => service.delete_by_identity(*identity)?,
                    DeleteTarget::Name(name) => service.delete_by_name(name)?,
                };
                if let Some(reboot) = outcome {
                    self.reboot.note(reboot);
                    tracing::debug!(target = %target, "Deleted dynamic adapter");
                    return Ok(());
                }
                tracing::debug!(target = %target, "No dynamic match, trying legacy backend");
            }
            Err(error) => {
                tracing::debug!(error = %error, "Dynamic backend not bindable, trying legacy backend");
            }
        }

        let identity = match parsed {
            DeleteTarget::Identity(identity) => identity,
            DeleteTarget::Name(name) => {
                // The legacy backend has no name index; resolve against the
                // full, unfiltered device class.
                let records = self.legacy.list_adapters(None)?;
                records
                    .iter()
                    .find(|record| names_equal(&record.name, &name))
                    .map(|record| record.identity)
                    .ok_or(AdapterError::NotFound { target: name })?
            }
        };

        let reboot = self.legacy.delete_adapter(identity)?;
        self.reboot.note(reboot);
        tracing::debug!(identity = %identity, "Deleted legacy adapter");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic::DynamicService;
    use crate::identity::BackendKind;
    use std::cell::{Cell, RefCell};
    use std::io;
    use uuid::Uuid;

    fn id(n: u128) -> AdapterIdentity {
        AdapterIdentity::from(Uuid::from_u128(n))
    }

    #[derive(Default)]
    struct FakeLegacy {
        adapters: RefCell<Vec<AdapterRecord>>,
        next_id: Cell<u128>,
        reboot_on_create: bool,
        reboot_on_delete: bool,
        fail_rename: bool,
        last_list_filter: RefCell<Option<Option<Vec<String>>>>,
    }

    impl FakeLegacy {
        fn with_adapter(self, identity: AdapterIdentity, name: &str, hwid: &str) -> Self {
            self.adapters.borrow_mut().push(AdapterRecord {
                identity,
                name: name.to_string(),
                hardware_id: hwid.to_string(),
                backend: BackendKind::DeviceClass,
            });
            self
        }

        fn count(&self, hwid: &str) -> usize {
            self.adapters
                .borrow()
                .iter()
                .filter(|r| r.hardware_id.eq_ignore_ascii_case(hwid))
                .count()
        }

        fn name_of(&self, identity: AdapterIdentity) -> Option<String> {
            self.adapters
                .borrow()
                .iter()
                .find(|r| r.identity == identity)
                .map(|r| r.name.clone())
        }
    }

    impl LegacyService for FakeLegacy {
        fn create_adapter(
            &self,
            _description: &str,
            hardware_id: &str,
        ) -> Result<(AdapterIdentity, bool)> {
            let n = self.next_id.get() + 1;
            self.next_id.set(n);
            let identity = id(0x1000 + n);
            self.adapters.borrow_mut().push(AdapterRecord {
                identity,
                // The device class assigns a default connection name.
                name: format!("Local Area Connection {}", n),
                hardware_id: hardware_id.to_string(),
                backend: BackendKind::DeviceClass,
            });
            Ok((identity, self.reboot_on_create))
        }

        fn delete_adapter(&self, identity: AdapterIdentity) -> Result<bool> {
            let mut adapters = self.adapters.borrow_mut();
            let before = adapters.len();
            adapters.retain(|r| r.identity != identity);
            if adapters.len() == before {
                return Err(AdapterError::BackendDeleteFailed {
                    identity,
                    source: io::Error::from(io::ErrorKind::NotFound),
                });
            }
            Ok(self.reboot_on_delete)
        }

        fn list_adapters(&self, hardware_ids: Option<&[String]>) -> Result<Vec<AdapterRecord>> {
            *self.last_list_filter.borrow_mut() =
                Some(hardware_ids.map(|ids| ids.to_vec()));
            Ok(self
                .adapters
                .borrow()
                .iter()
                .filter(|r| match hardware_ids {
                    None => true,
                    Some(ids) => ids
                        .iter()
                        .any(|h| h.eq_ignore_ascii_case(&r.hardware_id)),
                })
                .cloned()
                .collect())
        }

        fn rename_adapter(&self, identity: AdapterIdentity, name: &str) -> Result<()> {
            if self.fail_rename {
                return Err(AdapterError::BackendRenameFailed {
                    identity,
                    name: name.to_string(),
                    source: io::Error::from(io::ErrorKind::PermissionDenied),
                });
            }
            for record in self.adapters.borrow_mut().iter_mut() {
                if record.identity == identity {
                    record.name = name.to_string();
                    return Ok(());
                }
            }
            Err(AdapterError::NotFound {
                target: identity.to_string(),
            })
        }
    }

    #[derive(Default)]
    struct FakeDynamic {
        adapters: RefCell<Vec<(AdapterIdentity, String)>>,
        next_id: Cell<u128>,
        reboot_on_create: bool,
        reboot_on_delete: bool,
        last_created_name: RefCell<Option<String>>,
    }

    impl DynamicService for FakeDynamic {
        fn create(&self, name: &str) -> Result<(AdapterIdentity, bool)> {
            *self.last_created_name.borrow_mut() = Some(name.to_string());
            let n = self.next_id.get() + 1;
            self.next_id.set(n);
            let identity = id(0x2000 + n);
            self.adapters.borrow_mut().push((identity, name.to_string()));
            Ok((identity, self.reboot_on_create))
        }

        fn delete_by_name(&self, name: &str) -> Result<Option<bool>> {
            let mut adapters = self.adapters.borrow_mut();
            let before = adapters.len();
            adapters.retain(|(_, n)| n != name);
            if adapters.len() == before {
                return Ok(None);
            }
            Ok(Some(self.reboot_on_delete))
        }

        fn delete_by_identity(&self, identity: AdapterIdentity) -> Result<Option<bool>> {
            let mut adapters = self.adapters.borrow_mut();
            let before = adapters.len();
            adapters.retain(|(i, _)| *i != identity);
            if adapters.len() == before {
                return Ok(None);
            }
            Ok(Some(self.reboot_on_delete))
        }

        fn records(&self) -> Result<Vec<AdapterRecord>> {
            Ok(self
                .adapters
                .borrow()
                .iter()
                .map(|(identity, name)| AdapterRecord {
                    identity: *identity,
                    name: name.clone(),
                    hardware_id: DYNAMIC_HWID.to_string(),
                    backend: BackendKind::Dynamic,
                })
                .collect())
        }
    }

    /// `None` models a host where the module cannot be bound.
    struct FakeProvider(Option<FakeDynamic>);

    impl FakeProvider {
        fn bindable() -> Self {
            Self(Some(FakeDynamic::default()))
        }

        fn unbindable() -> Self {
            Self(None)
        }

        fn service(&self) -> &FakeDynamic {
            self.0.as_ref().expect("bindable provider")
        }
    }

    impl DynamicProvider for FakeProvider {
        fn ensure_bound(&mut self) -> Result<&dyn DynamicService> {
            match &self.0 {
                Some(service) => Ok(service),
                None => Err(AdapterError::ModuleLoadFailed {
                    path: "wintun.dll".into(),
                    source: io::Error::from(io::ErrorKind::NotFound),
                }),
            }
        }
    }

    #[test]
    fn legacy_create_without_name_keeps_default() {
        let legacy = FakeLegacy::default();
        let mut provider = FakeProvider::unbindable();
        let mut orch = Orchestrator::new(&legacy, &mut provider);

        let identity = orch.create(None, LEGACY_DEFAULT_HWID).unwrap();
        assert_eq!(
            legacy.name_of(identity).unwrap(),
            "Local Area Connection 1"
        );
    }

    #[test]
    fn legacy_create_renames_case_preserving() {
        let legacy = FakeLegacy::default();
        let mut provider = FakeProvider::unbindable();
        let mut orch = Orchestrator::new(&legacy, &mut provider);

        let identity = orch.create(Some("VEth0"), LEGACY_DEFAULT_HWID).unwrap();
        assert_eq!(legacy.name_of(identity).unwrap(), "VEth0");
    }

    #[test]
    fn duplicate_name_rolls_back_and_leaves_no_orphan() {
        let legacy =
            FakeLegacy::default().with_adapter(id(1), "veth0", LEGACY_DEFAULT_HWID);
        let mut provider = FakeProvider::unbindable();
        let mut orch = Orchestrator::new(&legacy, &mut provider);

        let err = orch.create(Some("VETH0"), LEGACY_DEFAULT_HWID).unwrap_err();
        assert!(matches!(err, AdapterError::DuplicateName { .. }));
        // The unnamed adapter created first was deleted again.
        assert_eq!(legacy.count(LEGACY_DEFAULT_HWID), 1);
    }

    #[test]
    fn duplicate_check_is_scoped_to_the_hardware_id() {
        // Same name under a different driver family does not collide.
        let legacy = FakeLegacy::default().with_adapter(id(1), "veth0", "other\\driver");
        let mut provider = FakeProvider::unbindable();
        let mut orch = Orchestrator::new(&legacy, &mut provider);

        let identity = orch.create(Some("veth0"), LEGACY_DEFAULT_HWID).unwrap();
        assert_eq!(legacy.name_of(identity).unwrap(), "veth0");
    }

    #[test]
    fn rename_failure_rolls_back_and_surfaces_the_rename_error() {
        let legacy = FakeLegacy {
            fail_rename: true,
            ..FakeLegacy::default()
        };
        let mut provider = FakeProvider::unbindable();
        let mut orch = Orchestrator::new(&legacy, &mut provider);

        let err = orch.create(Some("veth0"), LEGACY_DEFAULT_HWID).unwrap_err();
        assert!(matches!(err, AdapterError::BackendRenameFailed { .. }));
        assert_eq!(legacy.count(LEGACY_DEFAULT_HWID), 0);
    }

    #[test]
    fn dynamic_create_uses_default_name_when_none_given() {
        let legacy = FakeLegacy::default();
        let mut provider = FakeProvider::bindable();
        let mut orch = Orchestrator::new(&legacy, &mut provider);

        orch.create(None, "wintun").unwrap();
        assert_eq!(
            provider.service().last_created_name.borrow().as_deref(),
            Some(DEFAULT_DYNAMIC_NAME)
        );
    }

    #[test]
    fn dynamic_create_surfaces_bind_failure() {
        let legacy = FakeLegacy::default();
        let mut provider = FakeProvider::unbindable();
        let mut orch = Orchestrator::new(&legacy, &mut provider);

        let err = orch.create(Some("veth0"), DYNAMIC_HWID).unwrap_err();
        assert!(matches!(err, AdapterError::ModuleLoadFailed { .. }));
    }

    #[test]
    fn delete_by_guid_and_by_name_reach_the_same_state() {
        for target_by_name in [false, true] {
            let legacy =
                FakeLegacy::default().with_adapter(id(7), "veth0", LEGACY_DEFAULT_HWID);
            let mut provider = FakeProvider::unbindable();
            let mut orch = Orchestrator::new(&legacy, &mut provider);

            let target = if target_by_name {
                "veth0".to_string()
            } else {
                id(7).to_string()
            };
            orch.delete(&target).unwrap();
            assert_eq!(legacy.count(LEGACY_DEFAULT_HWID), 0);
        }
    }

    #[test]
    fn delete_falls_back_to_legacy_when_dynamic_has_no_match() {
        // Valid GUID, present only in the legacy backend; dynamic is bound
        // and healthy but its namespace does not contain it.
        let legacy = FakeLegacy::default().with_adapter(id(7), "veth0", LEGACY_DEFAULT_HWID);
        let mut provider = FakeProvider::bindable();
        provider.service().create("unrelated").unwrap();
        let mut orch = Orchestrator::new(&legacy, &mut provider);

        orch.delete(&id(7).to_string()).unwrap();
        assert_eq!(legacy.count(LEGACY_DEFAULT_HWID), 0);
        // The dynamic namespace was left alone.
        assert_eq!(provider.service().adapters.borrow().len(), 1);
    }

    #[test]
    fn delete_prefers_dynamic_and_stops_there_on_success() {
        let legacy = FakeLegacy::default().with_adapter(id(7), "veth0", LEGACY_DEFAULT_HWID);
        let mut provider = FakeProvider::bindable();
        provider.service().create("veth0").unwrap();
        let mut orch = Orchestrator::new(&legacy, &mut provider);

        orch.delete("veth0").unwrap();
        // Only the dynamic adapter is gone; no legacy deletion happened.
        assert!(provider.service().adapters.borrow().is_empty());
        assert_eq!(legacy.count(LEGACY_DEFAULT_HWID), 1);
    }

    #[test]
    fn delete_by_name_resolves_against_the_full_device_class() {
        let legacy = FakeLegacy::default().with_adapter(id(7), "veth0", "other\\driver");
        let mut provider = FakeProvider::unbindable();
        let mut orch = Orchestrator::new(&legacy, &mut provider);

        orch.delete("VETH0").unwrap();
        assert_eq!(legacy.count("other\\driver"), 0);
        // Name resolution must not apply a hardware-id filter.
        assert_eq!(*legacy.last_list_filter.borrow(), Some(None));
    }

    #[test]
    fn delete_of_unknown_name_reports_not_found() {
        let legacy = FakeLegacy::default();
        let mut provider = FakeProvider::unbindable();
        let mut orch = Orchestrator::new(&legacy, &mut provider);

        let err = orch.delete("veth0").unwrap_err();
        assert!(matches!(err, AdapterError::NotFound { .. }));
    }

    #[test]
    fn reboot_flag_is_monotonic_across_operations() {
        let legacy = FakeLegacy {
            reboot_on_create: true,
            reboot_on_delete: false,
            ..FakeLegacy::default()
        };
        let mut provider = FakeProvider::unbindable();
        let mut orch = Orchestrator::new(&legacy, &mut provider);

        let identity = orch.create(None, LEGACY_DEFAULT_HWID).unwrap();
        assert!(orch.reboot_required());

        // A later operation without a reboot request never clears the flag.
        orch.delete(&identity.to_string()).unwrap();
        assert!(orch.reboot_required());
    }

    #[test]
    fn list_scopes_to_the_dynamic_namespace() {
        let legacy = FakeLegacy::default().with_adapter(id(1), "legacy0", LEGACY_DEFAULT_HWID);
        let mut provider = FakeProvider::bindable();
        let mut orch = Orchestrator::new(&legacy, &mut provider);

        // No dynamic adapters: success with an empty listing.
        assert!(orch.list(Some("Wintun")).unwrap().is_empty());

        provider.service().create("veth0").unwrap();
        let mut orch = Orchestrator::new(&legacy, &mut provider);
        let records = orch.list(Some("wintun")).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "veth0");
    }

    #[test]
    fn default_list_covers_both_driver_families() {
        let legacy = FakeLegacy::default();
        let mut provider = FakeProvider::unbindable();
        let mut orch = Orchestrator::new(&legacy, &mut provider);

        orch.list(None).unwrap();
        let filter = legacy.last_list_filter.borrow().clone().flatten().unwrap();
        assert_eq!(filter, [LEGACY_DEFAULT_HWID, LEGACY_ALT_HWID, DYNAMIC_HWID]);
    }

    #[test]
    fn explicit_list_filter_is_passed_through() {
        let legacy = FakeLegacy::default()
            .with_adapter(id(1), "a", LEGACY_DEFAULT_HWID)
            .with_adapter(id(2), "b", "other\\driver");
        let mut provider = FakeProvider::unbindable();
        let mut orch = Orchestrator::new(&legacy, &mut provider);

        let records = orch.list(Some(LEGACY_DEFAULT_HWID)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "a");
    }
}
