//! Catalog listing: `qcrun list`.

use anyhow::Result;
use std::path::Path;

use super::super::Cli;

pub fn cmd_list(cli: &Cli, station_dir: &Path) -> Result<()> {
    use qcrun::catalog::load_catalog_or_default;
    use qcrun::config::StationConfig;

    let config = StationConfig::load(station_dir, cli.config.as_deref())?;
    let catalog_file = config.catalog_file();
    let catalog = load_catalog_or_default(catalog_file.as_deref())?;
    let policy = config.retry_policy();

    println!();
    match catalog_file.as_ref().filter(|p| p.exists()) {
        Some(path) => println!("Catalog loaded from: {}", path.display()),
        None => println!("Built-in catalog"),
    }
    println!();
    println!(
        "{:<5} {:<28} {:<17} {:<9} Requires",
        "Id", "Name", "Category", "Attempts"
    );
    println!(
        "{:<5} {:<28} {:<17} {:<9} --------",
        "-----", "----------------------------", "-----------------", "---------"
    );

    for def in catalog.definitions() {
        println!(
            "{:<5} {:<28} {:<17} {:<9} {}",
            def.id,
            def.name,
            def.category().to_string(),
            policy.max_attempts(def.category()),
            def.requires.as_deref().unwrap_or("-")
        );
        if cli.verbose
            && let Some(setup) = &def.setup
        {
            println!("      {}", console::style(setup).dim());
        }
    }
    println!();
    println!("{} tests", catalog.len());
    println!();
    Ok(())
}
