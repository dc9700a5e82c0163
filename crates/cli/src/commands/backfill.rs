use anyhow::Result;
use scorelabel_core::Curator;

pub fn run(curator: &mut Curator) -> Result<()> {
    let changed = curator.backfill()?;
    println!(
        "Back-filled {changed} records; {} labeled records in {}",
        curator.store().count_labeled(),
        curator.store_path().display()
    );
    Ok(())
}
