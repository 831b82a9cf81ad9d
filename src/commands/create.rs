use vnetctl::lifecycle::LEGACY_DEFAULT_HWID;
use vnetctl::Orchestrator;

pub(crate) fn cmd_create(name: Option<&str>, hwid: Option<&str>) -> anyhow::Result<()> {
    let (legacy, mut provider) = super::backends();
    let mut orchestrator = Orchestrator::new(legacy.as_ref(), &mut provider);

    let hwid = hwid.unwrap_or(LEGACY_DEFAULT_HWID);
    match orchestrator.create(name, hwid) {
        Ok(identity) => {
            println!("{}", identity);
            super::reboot_advisory(&orchestrator);
            Ok(())
        }
        Err(e) => {
            eprintln!("Creating adapter failed: {}", e);
            super::reboot_advisory(&orchestrator);
            std::process::exit(1);
        }
    }
}
