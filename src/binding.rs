//! Runtime binding to the dynamic backend module.
//!
//! The module is loaded at most once per process, its entry points are
//! resolved into a capability table, and a namespace ("pool") identifier is
//! derived so that only adapters belonging to this application instance are
//! visible through it.

use std::ffi::c_void;
use std::io;
use std::path::{Path, PathBuf};

use libloading::Library;

use crate::error::{AdapterError, Result};

/// Maximum namespace length in wide characters, terminator included. Fixed
/// by the backend module's pool storage.
pub const MAX_NAMESPACE: usize = 256;

/// Maximum adapter display-name length in wide characters, terminator
/// included.
pub const MAX_ADAPTER_NAME: usize = 128;

/// Opaque adapter descriptor owned by the backend module. The first 16 bytes
/// of the descriptor are the adapter's configuration GUID.
pub type RawAdapter = *mut c_void;

/// Win32-style BOOL as used throughout the module ABI.
pub type RawBool = i32;

pub type RawGuid = [u8; 16];

/// Diagnostic severities reported by the module's internal logger.
const MODULE_LOG_WARN: u32 = 1;
const MODULE_LOG_ERR: u32 = 2;

pub type LoggerCallback = unsafe extern "system" fn(level: u32, message: *const u16);
pub type EnumCallback =
    unsafe extern "system" fn(adapter: RawAdapter, param: *mut c_void) -> RawBool;

type CreateAdapterFn = unsafe extern "system" fn(
    pool: *const u16,
    name: *const u16,
    requested_guid: *const RawGuid,
    reboot_required: *mut RawBool,
) -> RawAdapter;
type OpenAdapterFn = unsafe extern "system" fn(pool: *const u16, name: *const u16) -> RawAdapter;
type DeleteAdapterFn = unsafe extern "system" fn(
    adapter: RawAdapter,
    force_close_sessions: RawBool,
    reboot_required: *mut RawBool,
) -> RawBool;
type EnumAdaptersFn = unsafe extern "system" fn(
    pool: *const u16,
    callback: EnumCallback,
    param: *mut c_void,
) -> RawBool;
type FreeAdapterFn = unsafe extern "system" fn(adapter: RawAdapter);
type GetAdapterNameFn = unsafe extern "system" fn(adapter: RawAdapter, name: *mut u16) -> RawBool;
type SetAdapterNameFn = unsafe extern "system" fn(adapter: RawAdapter, name: *const u16) -> RawBool;
type GetAdapterLuidFn = unsafe extern "system" fn(adapter: RawAdapter, luid: *mut u64);
type SetLoggerFn = unsafe extern "system" fn(callback: LoggerCallback);

/// The module's full operation set, resolved atomically: either every entry
/// point is present or the table is never constructed.
///
/// Session and packet entry points are deliberately not resolved; this tool
/// never touches the data path.
#[derive(Clone, Copy)]
pub struct ModuleApi {
    pub(crate) create_adapter: CreateAdapterFn,
    pub(crate) open_adapter: OpenAdapterFn,
    pub(crate) delete_adapter: DeleteAdapterFn,
    pub(crate) enum_adapters: EnumAdaptersFn,
    pub(crate) free_adapter: FreeAdapterFn,
    pub(crate) get_adapter_name: GetAdapterNameFn,
    pub(crate) set_adapter_name: SetAdapterNameFn,
    pub(crate) get_adapter_luid: GetAdapterLuidFn,
    pub(crate) set_logger: SetLoggerFn,
}

impl ModuleApi {
    fn resolve(library: &Library) -> Result<Self> {
        unsafe {
            Ok(Self {
                create_adapter: entry_point(library, "WintunCreateAdapter")?,
                open_adapter: entry_point(library, "WintunOpenAdapter")?,
                delete_adapter: entry_point(library, "WintunDeleteAdapter")?,
                enum_adapters: entry_point(library, "WintunEnumAdapters")?,
                free_adapter: entry_point(library, "WintunFreeAdapter")?,
                get_adapter_name: entry_point(library, "WintunGetAdapterName")?,
                set_adapter_name: entry_point(library, "WintunSetAdapterName")?,
                get_adapter_luid: entry_point(library, "WintunGetAdapterLUID")?,
                set_logger: entry_point(library, "WintunSetLogger")?,
            })
        }
    }
}

unsafe fn entry_point<T: Copy>(library: &Library, name: &'static str) -> Result<T> {
    let symbol = library
        .get::<T>(name.as_bytes())
        .map_err(|e| AdapterError::MissingEntryPoint {
            name,
            source: io::Error::other(e),
        })?;
    Ok(*symbol)
}

/// Routes the module's internal diagnostics into this process's sink.
unsafe extern "system" fn forward_module_log(level: u32, message: *const u16) {
    let text = wide_ptr_to_string(message);
    match level {
        MODULE_LOG_WARN => tracing::warn!("module: {}", text),
        MODULE_LOG_ERR => tracing::error!("module: {}", text),
        _ => tracing::debug!("module: {}", text),
    }
}

/// A successfully bound module: capability table plus the namespace every
/// later call is scoped by.
pub struct Binding {
    pub(crate) api: ModuleApi,
    namespace: Vec<u16>,
    /// Keeps the module mapped for the rest of the process. `None` only when
    /// the table points at in-process functions instead of a loaded module.
    _library: Option<Library>,
}

impl Binding {
    /// NUL-terminated namespace identifier in the module's native encoding.
    pub fn namespace(&self) -> &[u16] {
        &self.namespace
    }

    pub fn namespace_display(&self) -> String {
        wide_to_string(&self.namespace)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(api: ModuleApi, namespace: Vec<u16>) -> Self {
        Self {
            api,
            namespace,
            _library: None,
        }
    }
}

/// Process-wide binding lifecycle: `Unbound` until the first successful
/// `bind`, then `Bound` forever. Held as an explicit value rather than a
/// global so tests can run each case against a fresh state.
#[derive(Default)]
pub struct BindingState {
    bound: Option<Binding>,
}

impl BindingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure query; safe to call from any code path before attempting a
    /// dynamic-backend operation.
    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    pub fn bound(&self) -> Option<&Binding> {
        self.bound.as_ref()
    }

    /// Loads the module, resolves its entry points, installs the log
    /// forwarder and derives the namespace identifier. Fails fast with
    /// `AlreadyBound` if a previous bind succeeded; a failed bind leaves the
    /// state untouched and may be retried.
    pub fn bind(&mut self, module: &Path, instance_suffix: Option<&str>) -> Result<()> {
        if self.bound.is_some() {
            return Err(AdapterError::AlreadyBound);
        }
        self.bound = Some(load_module(module, instance_suffix)?);
        Ok(())
    }

    /// Idempotent variant used by operations that need the dynamic backend:
    /// binds on first use, reuses the existing binding afterwards.
    pub fn ensure(&mut self, module: &Path, instance_suffix: Option<&str>) -> Result<&Binding> {
        if self.bound.is_none() {
            self.bound = Some(load_module(module, instance_suffix)?);
        }
        Ok(self.bound.as_ref().expect("bound above"))
    }

    #[cfg(test)]
    pub(crate) fn install(&mut self, binding: Binding) -> Result<()> {
        if self.bound.is_some() {
            return Err(AdapterError::AlreadyBound);
        }
        self.bound = Some(binding);
        Ok(())
    }
}

fn load_module(module: &Path, instance_suffix: Option<&str>) -> Result<Binding> {
    let path = resolve_module_path(module);
    tracing::debug!(path = %path.display(), "Loading dynamic backend module");

    let library =
        unsafe { Library::new(&path) }.map_err(|e| AdapterError::ModuleLoadFailed {
            path: path.clone(),
            source: io::Error::other(e),
        })?;

    // Resolve everything before the binding becomes observable. On any miss
    // the library drops here, unloading the module.
    let api = ModuleApi::resolve(&library)?;

    unsafe { (api.set_logger)(forward_module_log) };

    let namespace = derive_namespace(instance_suffix);
    tracing::info!(
        module = %path.display(),
        namespace = %wide_to_string(&namespace),
        "Bound dynamic backend module"
    );

    Ok(Binding {
        api,
        namespace,
        _library: Some(library),
    })
}

#[cfg(windows)]
const SYSTEM_LIBRARY_DIR: &str = "C:\\Windows\\System32";
#[cfg(not(windows))]
const SYSTEM_LIBRARY_DIR: &str = "/usr/lib";

/// Restricted search order: an absolute path is taken verbatim; anything
/// else resolves against the application directory, then the trusted system
/// directory. The platform's default unqualified search order is never used,
/// so a module planted in the working directory cannot be picked up.
fn resolve_module_path(module: &Path) -> PathBuf {
    if module.is_absolute() {
        return module.to_path_buf();
    }

    let application_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));

    let mut candidates = Vec::new();
    if let Some(dir) = application_dir {
        candidates.push(dir.join(module));
    }
    candidates.push(Path::new(SYSTEM_LIBRARY_DIR).join(module));

    for candidate in &candidates {
        if candidate.exists() {
            tracing::trace!(path = %candidate.display(), "Resolved module path");
            return candidate.clone();
        }
    }

    // Nothing matched; report the load failure against the most specific
    // candidate so the error names a concrete path.
    candidates.swap_remove(0)
}

/// Namespace identifier: package name plus the optional instance suffix,
/// transcoded to the module's wide-string encoding and truncated to the
/// backend's fixed maximum.
fn derive_namespace(instance_suffix: Option<&str>) -> Vec<u16> {
    let mut namespace = String::from(env!("CARGO_PKG_NAME"));
    if let Some(suffix) = instance_suffix {
        namespace.push_str(suffix);
    }
    let mut wide: Vec<u16> = namespace.encode_utf16().take(MAX_NAMESPACE - 1).collect();
    wide.push(0);
    wide
}

pub(crate) fn to_wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}

pub(crate) fn wide_to_string(wide: &[u16]) -> String {
    let end = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..end])
}

pub(crate) unsafe fn wide_ptr_to_string(mut ptr: *const u16) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let mut units = Vec::new();
    while *ptr != 0 {
        units.push(*ptr);
        ptr = ptr.add(1);
    }
    String::from_utf16_lossy(&units)
}
