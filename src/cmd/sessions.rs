//! Archived session commands: `qcrun sessions` and `qcrun show`.

use anyhow::Result;
use console::style;
use std::path::Path;

use super::super::Cli;

fn archive(cli: &Cli, station_dir: &Path) -> Result<qcrun::audit::SessionArchive> {
    use qcrun::audit::SessionArchive;
    use qcrun::config::StationConfig;

    let config = StationConfig::load(station_dir, cli.config.as_deref())?;
    Ok(SessionArchive::new(&config.sessions_dir()))
}

pub fn cmd_sessions(cli: &Cli, station_dir: &Path, limit: usize) -> Result<()> {
    let archive = archive(cli, station_dir)?;
    let records = archive.list()?;

    println!();
    if records.is_empty() {
        println!(
            "No sessions recorded in {}",
            archive.sessions_dir().display()
        );
        println!();
        return Ok(());
    }

    println!(
        "{:<8} {:<20} {:<8} {:<9} File",
        "Device", "Started", "Overall", "State"
    );
    println!(
        "{:<8} {:<20} {:<8} {:<9} ----",
        "--------", "--------------------", "--------", "---------"
    );

    for path in records.iter().take(limit) {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match archive.load(path) {
            Ok(record) => {
                let summary = &record.summary;
                println!(
                    "{:<8} {:<20} {:<8} {:<9} {}",
                    summary.device.id,
                    summary
                        .started_at
                        .with_timezone(&chrono::Local)
                        .format("%Y-%m-%d %H:%M:%S")
                        .to_string(),
                    summary.overall_status.to_string(),
                    summary.state.to_string(),
                    file_name
                );
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "unreadable session record");
                println!("{:<8} {}", style("?").red(), file_name);
            }
        }
    }

    println!();
    if records.len() > limit {
        println!(
            "Showing {} of {} sessions. Use --limit to see more.",
            limit,
            records.len()
        );
        println!();
    }
    Ok(())
}

pub fn cmd_show(cli: &Cli, station_dir: &Path, file: &Path) -> Result<()> {
    use qcrun::ui::summary_lines;

    let archive = archive(cli, station_dir)?;
    // Bare file names are looked up in the sessions directory.
    let path = if file.exists() {
        file.to_path_buf()
    } else {
        archive.sessions_dir().join(file)
    };
    let record = archive.load(&path)?;

    println!("Session {}", record.session_id);
    println!(
        "Archived at {}",
        record
            .archived_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(log_file) = &record.log_file {
        println!("Log file: {}", log_file.display());
    }
    for line in summary_lines(&record.summary) {
        println!("{}", line);
    }

    for failure in &record.summary.failures {
        if !failure.notes.is_empty() {
            println!(
                "  {} {}: {}",
                style(&failure.id).red(),
                failure.name,
                failure.notes
            );
        }
    }
    Ok(())
}
