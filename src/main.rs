use acs_warehouse::{
    cli::{Cli, Commands},
    config::ApiConfig,
    download::{fetch_catalog, CensusClient, HttpTransport},
    logging::{export_log_report, init_logging, LogConfig},
    pipeline,
    report::RUN_REPORT,
    ui::{SilentUi, UiApp},
};
use anyhow::{Context, Result};
use std::time::Instant;
use tracing::error;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Load(args) => {
            let start = Instant::now();
            let no_tui = args.no_tui;
            let config = args.into_config()?;
            std::fs::create_dir_all(&config.output_dir).with_context(|| {
                format!("Failed to create output directory {:?}", config.output_dir)
            })?;

            let mut log_config = LogConfig::new(&config.output_dir);
            log_config.console = no_tui;
            let guard = init_logging(&log_config)?;

            let transport = HttpTransport::new()?;

            let result = if no_tui {
                pipeline::run(&config, &transport, &mut SilentUi::new())
            } else {
                let mut ui = UiApp::new()?;
                let result = pipeline::run(&config, &transport, &mut ui);
                match &result {
                    Ok(summary) => ui.finish(&summary.to_string())?,
                    Err(_) => ui.restore()?,
                }
                result
            };

            let summary = match result {
                Ok(summary) => summary,
                Err(e) => {
                    error!("Run aborted: {}", e);
                    return Err(e.into());
                }
            };

            let report = config.output_dir.join(RUN_REPORT);
            summary
                .write_csv(&report)
                .with_context(|| format!("Failed to write {:?}", report))?;

            // Flush every log sink before converting the main log
            drop(guard);
            let log_report = export_log_report(&config.output_dir)?;

            println!(
                "\n{} in {:.1}s\nReport: {:?}\nLog: {:?}",
                summary,
                start.elapsed().as_secs_f64(),
                report,
                log_report
            );
            for skipped in summary.skipped_units() {
                println!("  skipped {} {} {}", skipped.year, skipped.geography, skipped.table_id);
            }
        }

        Commands::ListTables { manifest_url } => {
            let transport = HttpTransport::new()?;
            let mut api = ApiConfig::new("");
            api.manifest_url = manifest_url;
            let client = CensusClient::new(&transport, &api);

            let catalog = fetch_catalog(&client)?;
            println!("{} tables:\n", catalog.len());
            for table in catalog.iter() {
                println!("  {:<10} {}", table.table_id, table.title);
            }
        }
    }

    Ok(())
}
