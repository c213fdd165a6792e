use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::{AnalyzeArgs, InputArgs, OutputFormat},
    config::AnalysisConfig,
    data::RawTable,
    io_utils,
    pipeline::{self, Analysis},
    report,
};

/// Loads the configuration and decodes the input named by `args`.
pub fn load_input(args: &InputArgs) -> Result<(AnalysisConfig, RawTable)> {
    let config = AnalysisConfig::load_or_default(args.config.as_deref())?;
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    info!(
        "Reading '{}' with delimiter '{}'",
        args.input.display(),
        crate::printable_delimiter(delimiter)
    );
    let table = io_utils::read_table(&args.input, delimiter, encoding)?;
    Ok((config, table))
}

pub fn execute(args: &AnalyzeArgs) -> Result<()> {
    let output_encoding = io_utils::resolve_encoding(args.output_encoding.as_deref())?;
    let (config, table) = load_input(&args.input)?;
    let mut analysis = pipeline::analyze(&table, &config)
        .with_context(|| format!("Analyzing {:?}", args.input.input))?;
    if args.sort_by_spend {
        report::sort_by_spend(&mut analysis.campaigns);
        report::sort_rows_by_spend(&mut analysis.rows);
    }
    let rendered = render(&analysis, args.format, args.flat)?;
    io_utils::write_output(args.output.as_deref(), &rendered, output_encoding)?;
    if let Some(path) = args.output.as_deref().filter(|p| !io_utils::is_dash(p)) {
        info!("Report written to {path:?}");
    }
    Ok(())
}

pub fn render(analysis: &Analysis, format: OutputFormat, flat: bool) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(report::render_table(analysis, flat)),
        OutputFormat::Json => report::render_json(analysis, flat),
        OutputFormat::Csv => report::render_csv(analysis, flat),
    }
}
