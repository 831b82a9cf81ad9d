use vnetctl::Orchestrator;

pub(crate) fn cmd_list(hwid: Option<&str>) -> anyhow::Result<()> {
    let (legacy, mut provider) = super::backends();
    let mut orchestrator = Orchestrator::new(legacy.as_ref(), &mut provider);

    match orchestrator.list(hwid) {
        Ok(records) => {
            for record in records {
                println!("{}\t{}", record.identity, record.name);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Enumerating adapters failed: {}", e);
            std::process::exit(1);
        }
    }
}
