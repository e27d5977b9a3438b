use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::anyhow;
use clap::Parser as ClapParser;
use clap::Subcommand;
use indexmap::IndexMap;
use pbit_lineage::config::Config;
use pbit_lineage::export::{used_tables, write_csv};
use pbit_lineage::lineage::{LineageRecord, extract_from_pbit, extract_lineage};
use pbit_lineage::resolver::{Dialect, ResolvedLineage, SqlParserResolver, resolve_all};
use serde::Serialize;

#[derive(clap::Parser)]
#[command(name = "pbit-lineage")]
#[command(about = "Power BI template lineage extractor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract lineage from one or more template files.
    Extract(ExtractCommand),
    /// Export the tables used by one or more template files as CSV.
    ExportTables(ExportCommand),
}

#[derive(clap::Args)]
struct InputArgs {
    /// Path to the template file or directory containing template files.
    #[arg(value_name = "PBIT_[FILE|DIR]")]
    input: PathBuf,
    /// Inputs are extracted schema JSON files instead of templates.
    #[arg(long)]
    schema_json: bool,
    /// SQL dialect used to resolve tables [default: tsql].
    #[arg(long)]
    dialect: Option<Dialect>,
    /// Resolve tables one record at a time.
    #[arg(long)]
    sequential: bool,
    /// Path to a TOML file with default options.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(clap::Args)]
struct ExtractCommand {
    #[command(flatten)]
    input: InputArgs,
    /// Do not resolve the tables read by each query.
    #[arg(long)]
    no_resolve: bool,
    /// Pretty-print the output lineage.
    #[arg(long)]
    pretty: bool,
}

#[derive(clap::Args)]
struct ExportCommand {
    #[command(flatten)]
    input: InputArgs,
    /// Path of the CSV file to write, stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Options after merging command-line flags over the config file.
struct Options {
    schema_json: bool,
    dialect: Dialect,
    resolve: bool,
    parallel: bool,
    pretty: bool,
}

impl Options {
    fn new(input: &InputArgs, no_resolve: bool, pretty: bool) -> anyhow::Result<Self> {
        let config = match &input.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        Ok(Self {
            schema_json: input.schema_json,
            dialect: input.dialect.or(config.dialect).unwrap_or_default(),
            resolve: !no_resolve && config.resolve.unwrap_or(true),
            parallel: !input.sequential && config.parallel.unwrap_or(true),
            pretty: pretty || config.pretty.unwrap_or(false),
        })
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum OutLineage {
    Resolved(Vec<ResolvedLineage>),
    Records(Vec<LineageRecord>),
    ErrLineage { error: String },
}

fn read_records(options: &Options, file_path: &Path) -> anyhow::Result<Vec<LineageRecord>> {
    let records = if options.schema_json {
        let schema = std::fs::read_to_string(file_path).map_err(|_| {
            anyhow!("Failed to read schema file {}", file_path.display())
        })?;
        extract_lineage(&schema)?
    } else {
        let pbit = std::fs::read(file_path)
            .map_err(|_| anyhow!("Failed to read template file {}", file_path.display()))?;
        extract_from_pbit(&pbit)?
    };
    log::info!(
        "Extracted {} lineage records from {}",
        records.len(),
        file_path.display()
    );
    Ok(records)
}

fn output_lineage(options: &Options, file_path: &Path) -> OutLineage {
    match read_records(options, file_path) {
        Ok(records) if options.resolve => OutLineage::Resolved(resolve_all(
            records,
            &SqlParserResolver,
            options.dialect,
            options.parallel,
        )),
        Ok(records) => OutLineage::Records(records),
        Err(err) => OutLineage::ErrLineage {
            error: format!(
                "Could not extract lineage from file {} due to error: {}",
                file_path.display(),
                err
            ),
        },
    }
}

fn input_files(options: &Options, input: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let extension = if options.schema_json { "json" } else { "pbit" };
    let mut files: Vec<_> = std::fs::read_dir(input)?
        .filter_map(|res| res.ok())
        .map(|entry| entry.path())
        .filter(|file| file.extension().is_some_and(|ext| ext == extension))
        .collect();
    files.sort();
    Ok(files)
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<String> {
    Ok(if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    })
}

fn extract(command: &ExtractCommand) -> anyhow::Result<()> {
    let options = Options::new(&command.input, command.no_resolve, command.pretty)?;
    let input = &command.input.input;
    let out_str = if input.is_dir() {
        let mut file_lineages: IndexMap<String, OutLineage> = IndexMap::new();
        for file in input_files(&options, input)? {
            let out_lineage = output_lineage(&options, &file);
            file_lineages.insert(std::path::absolute(file)?.display().to_string(), out_lineage);
        }
        to_json(&file_lineages, options.pretty)?
    } else {
        to_json(&output_lineage(&options, input), options.pretty)?
    };
    println!("{}", out_str);
    Ok(())
}

fn export_tables(command: &ExportCommand) -> anyhow::Result<()> {
    let options = Options::new(&command.input, false, false)?;
    let input = &command.input.input;
    let files = if input.is_dir() {
        input_files(&options, input)?
    } else {
        vec![input.clone()]
    };

    let mut resolved = vec![];
    for file in files {
        match read_records(&options, &file) {
            Ok(records) => resolved.extend(resolve_all(
                records,
                &SqlParserResolver,
                options.dialect,
                options.parallel,
            )),
            Err(err) => log::warn!("Skipping {}: {}", file.display(), err),
        }
    }

    let used = used_tables(&resolved);
    match &command.output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .map_err(|_| anyhow!("Failed to create output file {}", path.display()))?;
            write_csv(&used, file)?;
        }
        None => write_csv(&used, std::io::stdout().lock())?,
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let now = Instant::now();

    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Extract(command) => extract(command)?,
        Commands::ExportTables(command) => export_tables(command)?,
    }

    let elapsed = now.elapsed();
    log::info!("Elapsed: {:.2?}", elapsed);

    Ok(())
}
