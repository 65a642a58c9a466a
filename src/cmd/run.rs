//! Station loop: `qcrun run`.

use anyhow::Result;
use console::style;
use std::path::Path;

use super::super::Cli;

pub struct RunOptions {
    pub only: Vec<String>,
    pub skip: Vec<String>,
    pub device_id: Option<String>,
    pub device_version: Option<String>,
    pub manufacture_id: Option<String>,
    pub yes: bool,
    pub host: Option<String>,
}

impl RunOptions {
    /// Selection comes from flags instead of the checkbox list.
    fn fixed_selection(&self) -> bool {
        self.yes || !self.only.is_empty() || !self.skip.is_empty()
    }
}

pub async fn cmd_run(cli: &Cli, station_dir: &Path, options: RunOptions) -> Result<()> {
    use qcrun::audit::{DeviceLog, SessionArchive};
    use qcrun::catalog::load_catalog_or_default;
    use qcrun::config::StationConfig;
    use qcrun::errors::OrchestratorError;
    use qcrun::firmware::Uf2Uploader;
    use qcrun::gates::{FixedSelector, TerminalDeviceId, TerminalInteraction, TerminalSelector};
    use qcrun::orchestrator::{
        Collaborators, DeviceIdProvider, DeviceRun, Exporter, Interaction, Selector, Shutdown,
        run_device_session,
    };
    use qcrun::remote::SshExecutor;
    use qcrun::report::{CsvExporter, ExportSet, XlsxExporter};
    use qcrun::ui::StationUI;

    let config = StationConfig::load(station_dir, cli.config.as_deref())?.with_cli_args(
        cli.verbose,
        options.yes,
        options.host.clone(),
    );
    config.ensure_directories()?;
    let _guard = qcrun::logging::init(Some(&config.log_dir()), cli.verbose);

    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    let catalog = load_catalog_or_default(config.catalog_file().as_deref())?;
    let policy = config.retry_policy();
    let command_timeout = config.toml.remote.command_timeout();

    let mut selector: Box<dyn Selector> = if options.fixed_selection() {
        Box::new(FixedSelector::new(
            options.only.clone(),
            options.skip.clone(),
        ))
    } else {
        Box::new(TerminalSelector)
    };
    let mut device_ids = TerminalDeviceId::new(options.device_id.clone()).with_details(
        options.device_version.clone(),
        options.manufacture_id.clone(),
    );
    let mut interaction = TerminalInteraction::new(config.yes);
    let ssh = SshExecutor::new(config.toml.remote.clone());
    let uploader = Uf2Uploader::new(
        config.toml.firmware.clone(),
        config.uf2_dir(),
        config.files_dir(),
    );

    println!();
    println!(
        "{} {}",
        style("QC station").bold(),
        style(format!("({} tests, remote {})", catalog.len(), ssh.target())).dim()
    );
    tracing::info!(
        station = %config.station_dir.display(),
        remote = %ssh.target(),
        tests = catalog.len(),
        "station started"
    );

    loop {
        let selected = selector.select(&catalog)?;
        if selected.is_empty() {
            println!(
                "{}",
                style("No tests selected; the session will record every test as skipped.")
                    .yellow()
            );
        }

        let device = device_ids.device_info()?;
        let device_id = device.id.clone();
        let log = DeviceLog::new(&config.log_dir(), &device_id);
        let exporter = ExportSet::new(vec![
            Box::new(SessionArchive::new(&config.sessions_dir()).with_log_file(log.path()))
                as Box<dyn Exporter>,
            Box::new(CsvExporter::new(&config.results_csv()).with_log_file(log.path())),
            Box::new(XlsxExporter::new(
                &config.results_xlsx(),
                &config.results_csv(),
            )),
        ]);

        let ui = StationUI::new(cli.verbose);
        let io = Collaborators {
            interaction: &mut interaction,
            remote: &ssh,
            firmware: &uploader,
            log: &log,
            display: &ui,
        };
        let run = DeviceRun {
            catalog: &catalog,
            policy,
            command_timeout,
            device,
            selected,
        };

        let result = run_device_session(run, io, &exporter).await;
        ui.finish();

        match result {
            Ok(summary) => {
                ui.print_summary(&summary);
                println!(
                    "  Log: {}\n  Results: {}\n  Workbook: {}",
                    log.path().display(),
                    config.results_csv().display(),
                    config.results_xlsx().display()
                );
            }
            Err(e @ OrchestratorError::ExportFailed { .. }) => {
                return Err(e.into());
            }
            Err(e) => {
                println!(
                    "{} Session for device {} was interrupted; results were saved.",
                    style("!").yellow().bold(),
                    device_id
                );
                return Err(e.into());
            }
        }

        // Powering the device off is never automatic.
        if !config.yes && interaction.confirm("Shut down the device?")? {
            if ssh.shutdown_remote().await {
                println!("Shutdown command sent to {}", ssh.target());
            } else {
                println!(
                    "{} Could not reach {} to shut it down",
                    style("!").yellow().bold(),
                    ssh.target()
                );
            }
        }

        if config.yes || !interaction.confirm("Test another device?")? {
            break;
        }
    }

    println!();
    println!("Station stopped.");
    Ok(())
}
