use std::fs;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use allele_beacon::access_levels::AccessLevelRequest;
use allele_beacon::config::ConfigLoader;
use allele_beacon::domain::{CallerContext, RawAlleleRequest};
use allele_beacon::error::{BeaconError, ErrorKind};
use allele_beacon::output::{JsonOutput, OutputMode};

#[derive(Parser)]
#[command(name = "allele-beacon")]
#[command(about = "Answer GA4GH Beacon allele queries against configured variant backends")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    compact: bool,

    #[command(flatten)]
    caller: CallerArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CallerArgs {
    #[arg(long, global = true)]
    authenticated: bool,

    #[arg(
        long = "authorized-dataset",
        global = true,
        help = "Controlled dataset the caller holds a grant for (repeatable)"
    )]
    authorized_datasets: Vec<String>,
}

impl CallerArgs {
    fn context(&self) -> CallerContext {
        if self.authenticated || !self.authorized_datasets.is_empty() {
            CallerContext::authenticated(self.authorized_datasets.iter().cloned())
        } else {
            CallerContext::anonymous()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Ask whether an allele exists in the accessible datasets")]
    Query(QueryArgs),
    #[command(about = "List configured datasets")]
    Datasets(DatasetsArgs),
    #[command(about = "List the ontology terms accepted as filters")]
    FilteringTerms,
    #[command(about = "List access levels of response fields and datasets")]
    AccessLevels(AccessLevelsArgs),
}

#[derive(Args)]
struct QueryArgs {
    #[arg(
        long,
        conflicts_with_all = ["assembly_id", "reference_name", "reference_bases"],
        help = "JSON file holding the request in its camelCase wire form"
    )]
    request: Option<String>,

    #[arg(long)]
    assembly_id: Option<String>,

    #[arg(long)]
    reference_name: Option<String>,

    #[arg(long)]
    reference_bases: Option<String>,

    #[arg(long)]
    alternate_bases: Option<String>,

    #[arg(long)]
    variant_type: Option<String>,

    #[arg(long)]
    start: Option<u64>,

    #[arg(long)]
    end: Option<u64>,

    #[arg(long)]
    start_min: Option<u64>,

    #[arg(long)]
    start_max: Option<u64>,

    #[arg(long)]
    end_min: Option<u64>,

    #[arg(long)]
    end_max: Option<u64>,

    #[arg(long)]
    mate_name: Option<String>,

    #[arg(long = "dataset-id")]
    dataset_ids: Vec<String>,

    #[arg(long = "filter")]
    filters: Vec<String>,

    #[arg(long = "include")]
    include_dataset_responses: Option<String>,
}

impl QueryArgs {
    fn into_request(self) -> miette::Result<RawAlleleRequest> {
        if let Some(path) = self.request {
            let content = fs::read_to_string(&path).into_diagnostic()?;
            return serde_json::from_str(&content).into_diagnostic();
        }
        Ok(RawAlleleRequest {
            assembly_id: self.assembly_id,
            reference_name: self.reference_name,
            reference_bases: self.reference_bases,
            alternate_bases: self.alternate_bases,
            variant_type: self.variant_type,
            start: self.start,
            end: self.end,
            start_min: self.start_min,
            start_max: self.start_max,
            end_min: self.end_min,
            end_max: self.end_max,
            mate_name: self.mate_name,
            dataset_ids: self.dataset_ids,
            filters: self.filters,
            include_dataset_responses: self.include_dataset_responses,
        })
    }
}

#[derive(Args)]
struct DatasetsArgs {
    #[arg(long)]
    assembly: Option<String>,
}

#[derive(Args)]
struct AccessLevelsArgs {
    #[arg(long = "field")]
    fields: Vec<String>,

    #[arg(long = "dataset-id")]
    dataset_ids: Vec<String>,

    #[arg(long)]
    level: Option<String>,

    #[arg(long)]
    include_field_details: bool,

    #[arg(long)]
    include_dataset_details: bool,
}

impl AccessLevelsArgs {
    fn into_request(self) -> AccessLevelRequest {
        AccessLevelRequest {
            fields: self.fields,
            dataset_ids: self.dataset_ids,
            level: self.level,
            include_field_details: self.include_field_details,
            include_dataset_details: self.include_dataset_details,
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(err) = report.downcast_ref::<BeaconError>() {
                return ExitCode::from(map_exit_code(err));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &BeaconError) -> u8 {
    match error {
        BeaconError::MissingConfig => 2,
        other if other.kind() == ErrorKind::Config => 1,
        other => exit_code_for(other.kind().code()),
    }
}

fn exit_code_for(error_code: u16) -> u8 {
    match error_code {
        400 | 401 | 404 => 2,
        503 => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<u8> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = JsonOutput::new(if cli.compact {
        OutputMode::Compact
    } else {
        OutputMode::Pretty
    });
    let caller = cli.caller.context();

    let resolved = ConfigLoader::resolve(cli.config.as_deref())?;
    let engine = resolved.build_engine()?;

    match cli.command {
        Commands::Query(args) => {
            let request = args.into_request()?;
            let response = engine.query(&request, &caller);
            output.print_response(&response).into_diagnostic()?;
            Ok(response
                .error
                .map(|error| exit_code_for(error.error_code))
                .unwrap_or(0))
        }
        Commands::Datasets(args) => {
            let listing = engine.list_datasets(args.assembly.as_deref(), &caller);
            output.print_listing(&listing).into_diagnostic()?;
            Ok(0)
        }
        Commands::FilteringTerms => {
            output.print_terms(&engine.list_filtering_terms()).into_diagnostic()?;
            Ok(0)
        }
        Commands::AccessLevels(args) => {
            let levels = engine.list_access_levels(&args.into_request())?;
            output.print_access_levels(&levels).into_diagnostic()?;
            Ok(0)
        }
    }
}
