use vnetctl::Orchestrator;

pub(crate) fn cmd_delete(target: &str) -> anyhow::Result<()> {
    let (legacy, mut provider) = super::backends();
    let mut orchestrator = Orchestrator::new(legacy.as_ref(), &mut provider);

    match orchestrator.delete(target) {
        Ok(()) => {
            super::reboot_advisory(&orchestrator);
            Ok(())
        }
        Err(e) => {
            eprintln!("Deleting adapter \"{}\" failed: {}", target, e);
            super::reboot_advisory(&orchestrator);
            std::process::exit(1);
        }
    }
}
