pub mod analyze;
pub mod cli;
pub mod config;
pub mod data;
pub mod diagnosis;
pub mod error;
pub mod fields;
pub mod hierarchy;
pub mod io_utils;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    cli::{Cli, Commands},
    config::AnalysisConfig,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("ad_diagnostics", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze(args) => analyze::execute(&args),
        Commands::Fields(args) => handle_fields(&args),
        Commands::Config(args) => handle_config(&args),
    }
}

fn handle_fields(args: &cli::FieldsArgs) -> Result<()> {
    let (config, table) = analyze::load_input(&args.input)?;
    let fields = fields::FieldMap::resolve(&table.headers, &config.fields);
    info!(
        "Resolved {} of {} field(s) from {} header(s)",
        fields.len(),
        config.fields.fields().count(),
        table.headers.len()
    );
    table::print_table(&report::field_report_headers(), &report::field_report(&fields));
    Ok(())
}

fn handle_config(args: &cli::ConfigArgs) -> Result<()> {
    let config = AnalysisConfig::default();
    match args.output.as_deref().filter(|p| !io_utils::is_dash(p)) {
        Some(path) => {
            config
                .save(path)
                .with_context(|| format!("Writing config to {path:?}"))?;
            info!("Default configuration written to {path:?}");
        }
        None => {
            let yaml = config.to_yaml_string()?;
            io_utils::write_output(None, &yaml, None)?;
        }
    }
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
