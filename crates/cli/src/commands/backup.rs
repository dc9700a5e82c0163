use std::path::Path;

use anyhow::{Context, Result};
use scorelabel_core::backup;
use scorelabel_core::Curator;

pub fn snapshot(curator: &mut Curator) -> Result<()> {
    let path = curator.snapshot()?;
    println!("Backup written: {}", path.display());
    Ok(())
}

/// Works without opening the store, so a corrupt store can still be restored.
pub fn restore(store_path: &Path) -> Result<()> {
    let used = backup::restore(store_path)
        .with_context(|| format!("failed to restore {}", store_path.display()))?;
    println!(
        "Restored {} from {}",
        store_path.display(),
        used.display()
    );
    Ok(())
}
