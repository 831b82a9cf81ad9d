use std::path::PathBuf;

const ENV_MODULE: &str = "VNETCTL_MODULE";
const ENV_INSTANCE: &str = "VNETCTL_INSTANCE";

/// Platform file name of the dynamic backend module.
#[cfg(target_os = "windows")]
pub const DEFAULT_MODULE_NAME: &str = "wintun.dll";
#[cfg(target_os = "macos")]
pub const DEFAULT_MODULE_NAME: &str = "libwintun.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub const DEFAULT_MODULE_NAME: &str = "libwintun.so";

/// Dynamic backend module location ($VNETCTL_MODULE or the platform default
/// file name, resolved through the restricted search order at bind time).
pub fn module_path() -> PathBuf {
    let path = std::env::var(ENV_MODULE)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_MODULE_NAME));
    tracing::trace!(path = %path.display(), "Resolved module override");
    path
}

/// Optional namespace instance suffix ($VNETCTL_INSTANCE). Lets co-installed
/// copies of this tool manage disjoint adapter pools.
pub fn instance_suffix() -> Option<String> {
    let val = std::env::var(ENV_INSTANCE).ok().filter(|s| !s.is_empty());
    tracing::trace!(value = ?val, "VNETCTL_INSTANCE env var");
    val
}
