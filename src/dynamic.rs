//! Operations against the bound dynamic backend.
//!
//! Everything here is scoped by the namespace identifier derived at bind
//! time: adapters created, enumerated or deleted through this module belong
//! to this application instance only.

use std::ffi::c_void;
use std::io;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::ptr;

use crate::binding::{
    to_wide, wide_to_string, Binding, BindingState, ModuleApi, RawAdapter, RawBool,
    MAX_ADAPTER_NAME,
};
use crate::error::{AdapterError, Result};
use crate::identity::{AdapterIdentity, AdapterRecord, BackendKind};
use crate::lifecycle::DYNAMIC_HWID;

/// An adapter handle owned by this process. Released back to the backend
/// exactly once, on every exit path, when dropped. Deliberately neither
/// `Clone` nor `Copy`; ownership only moves.
pub struct OwnedAdapter {
    raw: RawAdapter,
    api: ModuleApi,
}

impl OwnedAdapter {
    fn from_raw(raw: RawAdapter, api: ModuleApi) -> Option<Self> {
        if raw.is_null() {
            None
        } else {
            Some(Self { raw, api })
        }
    }

    pub fn identity(&self) -> AdapterIdentity {
        identity_of(self.raw)
    }

    pub fn name(&self) -> Result<String> {
        adapter_name(self.raw, &self.api)
    }

    /// Renames the adapter within its namespace.
    pub fn set_name(&self, name: &str) -> Result<()> {
        let wide = to_wide(name);
        let ok = unsafe { (self.api.set_adapter_name)(self.raw, wide.as_ptr()) };
        if ok == 0 {
            return Err(AdapterError::BackendRenameFailed {
                identity: self.identity(),
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    pub fn luid(&self) -> u64 {
        adapter_luid(self.raw, &self.api)
    }
}

impl Drop for OwnedAdapter {
    fn drop(&mut self) {
        unsafe { (self.api.free_adapter)(self.raw) };
    }
}

/// A borrowed view of an adapter during enumeration. The backend owns the
/// underlying handle for the duration of the visit; no release is performed.
pub struct AdapterView<'a> {
    raw: RawAdapter,
    api: &'a ModuleApi,
}

impl AdapterView<'_> {
    pub fn identity(&self) -> AdapterIdentity {
        identity_of(self.raw)
    }

    pub fn name(&self) -> Result<String> {
        adapter_name(self.raw, self.api)
    }

    pub fn luid(&self) -> u64 {
        adapter_luid(self.raw, self.api)
    }

    pub(crate) fn raw(&self) -> RawAdapter {
        self.raw
    }
}

/// The adapter descriptor starts with the configuration GUID; a valid handle
/// always carries one.
fn identity_of(raw: RawAdapter) -> AdapterIdentity {
    let bytes = unsafe { ptr::read_unaligned(raw.cast::<[u8; 16]>()) };
    AdapterIdentity::from_guid_bytes(bytes)
}

fn adapter_name(raw: RawAdapter, api: &ModuleApi) -> Result<String> {
    let mut buffer = [0u16; MAX_ADAPTER_NAME];
    let ok = unsafe { (api.get_adapter_name)(raw, buffer.as_mut_ptr()) };
    if ok == 0 {
        return Err(AdapterError::BackendListFailed {
            source: io::Error::last_os_error(),
        });
    }
    Ok(wide_to_string(&buffer))
}

fn adapter_luid(raw: RawAdapter, api: &ModuleApi) -> u64 {
    let mut luid = 0u64;
    unsafe { (api.get_adapter_luid)(raw, &mut luid) };
    luid
}

struct EnumContext<'a> {
    api: &'a ModuleApi,
    visit: &'a mut dyn FnMut(&AdapterView<'_>) -> ControlFlow<()>,
}

unsafe extern "system" fn enum_trampoline(adapter: RawAdapter, param: *mut c_void) -> RawBool {
    let context = &mut *param.cast::<EnumContext<'_>>();
    let view = AdapterView {
        raw: adapter,
        api: context.api,
    };
    match (context.visit)(&view) {
        ControlFlow::Continue(()) => 1,
        ControlFlow::Break(()) => 0,
    }
}

impl Binding {
    /// Visits every adapter in the bound namespace. Returning `Break` stops
    /// the backend from producing further adapters.
    pub fn enumerate(
        &self,
        mut visit: impl FnMut(&AdapterView<'_>) -> ControlFlow<()>,
    ) -> Result<()> {
        let mut context = EnumContext {
            api: &self.api,
            visit: &mut visit,
        };
        let ok = unsafe {
            (self.api.enum_adapters)(
                self.namespace().as_ptr(),
                enum_trampoline,
                (&mut context as *mut EnumContext<'_>).cast(),
            )
        };
        if ok == 0 {
            return Err(AdapterError::BackendListFailed {
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    /// Opens an adapter in the bound namespace by display name. `None` when
    /// no adapter of that name exists.
    pub fn open(&self, name: &str) -> Option<OwnedAdapter> {
        let wide = to_wide(name);
        let raw = unsafe { (self.api.open_adapter)(self.namespace().as_ptr(), wide.as_ptr()) };
        OwnedAdapter::from_raw(raw, self.api)
    }
}

/// The dynamic backend's lifecycle operations as the orchestrator consumes
/// them. Mutations report whether the host wants a reboot.
pub trait DynamicService {
    /// Creates a named adapter. The backend itself enforces name uniqueness
    /// within the namespace; there is no partial state to roll back.
    fn create(&self, name: &str) -> Result<(AdapterIdentity, bool)>;

    /// Deletes the adapter with the given display name. `Ok(None)` when the
    /// namespace holds no adapter of that name.
    fn delete_by_name(&self, name: &str) -> Result<Option<bool>>;

    /// Deletes the first adapter whose identity matches; at most one adapter
    /// is deleted per call. `Ok(None)` when nothing matched.
    fn delete_by_identity(&self, identity: AdapterIdentity) -> Result<Option<bool>>;

    /// Snapshot of every adapter in the namespace.
    fn records(&self) -> Result<Vec<AdapterRecord>>;
}

impl DynamicService for Binding {
    fn create(&self, name: &str) -> Result<(AdapterIdentity, bool)> {
        let wide = to_wide(name);
        let mut reboot: RawBool = 0;
        let raw = unsafe {
            (self.api.create_adapter)(
                self.namespace().as_ptr(),
                wide.as_ptr(),
                ptr::null(),
                &mut reboot,
            )
        };
        let adapter =
            OwnedAdapter::from_raw(raw, self.api).ok_or_else(|| AdapterError::BackendCreateFailed {
                source: io::Error::last_os_error(),
            })?;
        let identity = adapter.identity();
        tracing::debug!(identity = %identity, name = %name, "Created dynamic adapter");
        Ok((identity, reboot != 0))
    }

    fn delete_by_name(&self, name: &str) -> Result<Option<bool>> {
        let Some(adapter) = self.open(name) else {
            tracing::debug!(name = %name, "No dynamic adapter with that name");
            return Ok(None);
        };
        let mut reboot: RawBool = 0;
        let ok = unsafe { (self.api.delete_adapter)(adapter.raw, 0, &mut reboot) };
        if ok == 0 {
            return Err(AdapterError::BackendDeleteFailed {
                identity: adapter.identity(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(Some(reboot != 0))
    }

    fn delete_by_identity(&self, identity: AdapterIdentity) -> Result<Option<bool>> {
        let mut outcome: Option<Result<bool>> = None;
        self.enumerate(|view| {
            if view.identity() != identity {
                return ControlFlow::Continue(());
            }
            let mut reboot: RawBool = 0;
            let ok = unsafe { (self.api.delete_adapter)(view.raw(), 0, &mut reboot) };
            outcome = Some(if ok == 0 {
                Err(AdapterError::BackendDeleteFailed {
                    identity,
                    source: io::Error::last_os_error(),
                })
            } else {
                Ok(reboot != 0)
            });
            ControlFlow::Break(())
        })?;
        outcome.transpose()
    }

    fn records(&self) -> Result<Vec<AdapterRecord>> {
        let mut records = Vec::new();
        self.enumerate(|view| {
            let name = view.name().unwrap_or_else(|e| {
                tracing::warn!(identity = %view.identity(), error = %e, "Failed to read adapter name");
                String::new()
            });
            records.push(AdapterRecord {
                identity: view.identity(),
                name,
                hardware_id: DYNAMIC_HWID.to_string(),
                backend: BackendKind::Dynamic,
            });
            ControlFlow::Continue(())
        })?;
        Ok(records)
    }
}

/// Hands the orchestrator a bound dynamic service, binding on first use.
pub trait DynamicProvider {
    fn ensure_bound(&mut self) -> Result<&dyn DynamicService>;
}

/// Production provider: a binding state plus the module location and
/// instance suffix it should be bound with.
pub struct ModuleProvider {
    state: BindingState,
    module: PathBuf,
    instance_suffix: Option<String>,
}

impl ModuleProvider {
    pub fn new(module: PathBuf, instance_suffix: Option<String>) -> Self {
        Self {
            state: BindingState::new(),
            module,
            instance_suffix,
        }
    }

    pub fn from_env() -> Self {
        Self::new(crate::clienv::module_path(), crate::clienv::instance_suffix())
    }
}

impl DynamicProvider for ModuleProvider {
    fn ensure_bound(&mut self) -> Result<&dyn DynamicService> {
        let binding = self
            .state
            .ensure(&self.module, self.instance_suffix.as_deref())?;
        Ok(binding)
    }
}
