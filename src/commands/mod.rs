pub(crate) mod create;
pub(crate) mod delete;
pub(crate) mod list;

use vnetctl::dynamic::ModuleProvider;
use vnetctl::legacy::{self, LegacyService};
use vnetctl::Orchestrator;

pub(crate) fn backends() -> (Box<dyn LegacyService>, ModuleProvider) {
    (legacy::host_service(), ModuleProvider::from_env())
}

/// Printed once per invocation, after the command's own output, whenever any
/// operation reported reboot-required.
pub(crate) fn reboot_advisory(orchestrator: &Orchestrator<'_>) {
    if orchestrator.reboot_required() {
        eprintln!("A system reboot is required.");
    }
}
