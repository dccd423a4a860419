use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use hubmap_bags::app::{App, BuildInput, BuildOptions, DatasetOutcome, Outcome, ReportOptions};
use hubmap_bags::assets::AssetsHttpClient;
use hubmap_bags::config::{ConfigLoader, ResolvedConfig};
use hubmap_bags::domain::{HubmapId, Instance};
use hubmap_bags::entity::EntityHttpClient;
use hubmap_bags::error::BagsError;
use hubmap_bags::output::{HumanOutput, JsonOutput, LogSink, OutputMode};
use hubmap_bags::search::SearchHttpClient;
use hubmap_bags::store::Store;
use hubmap_bags::uuid_api::UuidHttpClient;

type HttpApp = App<EntityHttpClient, SearchHttpClient, UuidHttpClient>;

#[derive(Parser)]
#[command(name = "hubmapbags")]
#[command(about = "Build CFDE C2M2 bags from HuBMAP datasets")]
#[command(version, author)]
struct Cli {
    /// Path to hubmapbags.json.
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    instance: Option<Instance>,

    #[arg(long, global = true, env = "TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Threads used for hashing and report lookups.
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Build the bag for a dataset id, a dataset TSV, or the configured datasets")]
    Build(BuildArgs),
    #[command(about = "Compute the file inventory and file.tsv only")]
    Inventory(BuildArgs),
    #[command(about = "Build every published primary dataset")]
    Submission(SubmissionArgs),
    #[command(about = "Attach (and optionally mint) file UUIDs")]
    Uuids(UuidArgs),
    #[command(about = "Build the daily status report and plots")]
    Report(ReportArgs),
    #[command(about = "Count files and bytes per published dataset")]
    FileReport,
    #[command(about = "Check that registered files are served by the assets server")]
    Assets(AssetsArgs),
    #[command(about = "Merge every bag into submission/")]
    Aggregate,
    #[command(about = "Inspect or reset dataset checkpoints")]
    Checkpoint(CheckpointArgs),
    #[command(about = "Show a dataset summary")]
    Info(InfoArgs),
}

#[derive(Args, Clone)]
struct BuildArgs {
    /// HuBMAP id or dataset TSV; omitted means the datasets in the config file.
    input: Option<String>,

    #[arg(long)]
    overwrite: bool,

    #[arg(long)]
    archive: bool,

    #[arg(long)]
    refresh: bool,

    #[arg(long)]
    dbgap_study_id: Option<String>,
}

#[derive(Args)]
struct SubmissionArgs {
    #[arg(long)]
    overwrite: bool,

    #[arg(long)]
    archive: bool,
}

#[derive(Args)]
struct UuidArgs {
    id: String,

    /// Mint UUIDs when the uuid-api has none for this dataset.
    #[arg(long)]
    generate: bool,
}

#[derive(Args)]
struct ReportArgs {
    /// Rebuild today's report even if it exists.
    #[arg(long)]
    refresh: bool,
}

#[derive(Args)]
struct AssetsArgs {
    id: String,
}

#[derive(Args)]
struct CheckpointArgs {
    #[command(subcommand)]
    command: CheckpointCommand,
}

#[derive(Subcommand)]
enum CheckpointCommand {
    #[command(about = "Show the markers for a dataset id or data directory")]
    Status { target: String },
    #[command(about = "Remove every marker for a dataset id or data directory")]
    Clear { target: String },
}

#[derive(Args)]
struct InfoArgs {
    id: String,

    #[arg(long)]
    refresh: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(bags) = report.downcast_ref::<BagsError>() {
                return ExitCode::from(map_exit_code(bags));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &BagsError) -> u8 {
    match error {
        BagsError::NotFound { .. }
        | BagsError::InvalidHubmapId(_)
        | BagsError::InvalidInstance(_)
        | BagsError::InvalidInput(_)
        | BagsError::MissingConfig(_)
        | BagsError::MissingToken => 2,
        BagsError::Http { .. }
        | BagsError::Status { .. }
        | BagsError::Unauthorized { .. }
        | BagsError::MalformedResponse { .. } => 3,
        BagsError::Broken { .. } => 4,
        _ => 1,
    }
}

fn batch_exit_code(items: &[DatasetOutcome], single: bool) -> ExitCode {
    let has = |outcome: Outcome| items.iter().any(|item| item.outcome == outcome);
    if has(Outcome::Broken) || (single && has(Outcome::InProgress)) {
        ExitCode::from(4)
    } else if has(Outcome::Failed) {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(instance) = cli.instance {
        config.instance = instance;
    }
    if let Some(workers) = cli.workers {
        config.workers = workers.max(1);
    }
    tracing::debug!(instance = %config.instance, workers = config.workers, "resolved config");

    let token = cli.token.as_deref().unwrap_or_default();
    let instance = config.instance;
    let app = build_app(config, token)?;
    match cli.command {
        Commands::Build(args) => run_build(&app, args, false, output_mode),
        Commands::Inventory(args) => run_build(&app, args, true, output_mode),
        Commands::Submission(args) => {
            let options = BuildOptions {
                overwrite: args.overwrite,
                archive: args.archive,
                ..BuildOptions::default()
            };
            let result = with_sink(output_mode, |sink| app.submission(options, sink))?;
            match output_mode {
                OutputMode::Json => JsonOutput::print(&result).into_diagnostic()?,
                OutputMode::Human => HumanOutput::print_submission(&result).into_diagnostic()?,
            }
            Ok(batch_exit_code(&result.items, false))
        }
        Commands::Uuids(args) => {
            let id: HubmapId = args.id.parse()?;
            let result =
                with_sink(output_mode, |sink| app.populate_uuids(&id, args.generate, sink))?;
            match output_mode {
                OutputMode::Json => JsonOutput::print(&result).into_diagnostic()?,
                OutputMode::Human => HumanOutput::print_uuids(&result).into_diagnostic()?,
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Report(args) => {
            let options = ReportOptions {
                date: chrono::Local::now().date_naive(),
                refresh: args.refresh,
            };
            let result = with_sink(output_mode, |sink| app.report(options, sink))?;
            match output_mode {
                OutputMode::Json => JsonOutput::print(&result).into_diagnostic()?,
                OutputMode::Human => HumanOutput::print_report(&result).into_diagnostic()?,
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::FileReport => {
            let date = chrono::Local::now().date_naive();
            let result = with_sink(output_mode, |sink| app.file_report(date, sink))?;
            match output_mode {
                OutputMode::Json => JsonOutput::print(&result).into_diagnostic()?,
                OutputMode::Human => HumanOutput::print_file_report(&result).into_diagnostic()?,
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Assets(args) => {
            let id: HubmapId = args.id.parse()?;
            let client = AssetsHttpClient::new(instance, token)?;
            let result = with_sink(output_mode, |sink| app.check_assets(&id, &client, sink))?;
            match output_mode {
                OutputMode::Json => JsonOutput::print(&result).into_diagnostic()?,
                OutputMode::Human => HumanOutput::print_assets(&result).into_diagnostic()?,
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Aggregate => {
            let result = with_sink(output_mode, |sink| app.aggregate(sink))?;
            match output_mode {
                OutputMode::Json => JsonOutput::print(&result).into_diagnostic()?,
                OutputMode::Human => HumanOutput::print_aggregate(&result).into_diagnostic()?,
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Checkpoint(args) => match args.command {
            CheckpointCommand::Status { target } => {
                let result = app.checkpoint_status(&target)?;
                match output_mode {
                    OutputMode::Json => JsonOutput::print(&result).into_diagnostic()?,
                    OutputMode::Human => HumanOutput::print_checkpoint(&result).into_diagnostic()?,
                }
                Ok(ExitCode::SUCCESS)
            }
            CheckpointCommand::Clear { target } => {
                let result = app.checkpoint_clear(&target)?;
                match output_mode {
                    OutputMode::Json => JsonOutput::print(&result).into_diagnostic()?,
                    OutputMode::Human => HumanOutput::print_clear(&result).into_diagnostic()?,
                }
                Ok(ExitCode::SUCCESS)
            }
        },
        Commands::Info(args) => {
            let id: HubmapId = args.id.parse()?;
            let summary = app.info(&id, args.refresh)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print(&summary).into_diagnostic()?,
                OutputMode::Human => HumanOutput::print_info(&summary).into_diagnostic()?,
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Clients check the token per request, so offline commands run without one.
fn build_app(config: ResolvedConfig, token: &str) -> Result<HttpApp, BagsError> {
    let store = Store::from_work_dir(&config.work_dir)?;
    let entity = EntityHttpClient::new(config.instance, token)?;
    let search = SearchHttpClient::new(config.instance, token)?;
    let uuid = UuidHttpClient::new(config.instance, token)?;
    Ok(App::new(store, config, entity, search, uuid))
}

fn run_build(
    app: &HttpApp,
    args: BuildArgs,
    inventory_only: bool,
    output_mode: OutputMode,
) -> miette::Result<ExitCode> {
    let (input, single) = match args.input.as_deref().map(str::trim) {
        None | Some("") => (BuildInput::Configured, false),
        Some(input) => match input.parse::<HubmapId>() {
            Ok(id) => (BuildInput::Id(id), true),
            Err(_) if input.ends_with(".tsv") => (BuildInput::Tsv(Utf8PathBuf::from(input)), false),
            Err(err) => return Err(err.into()),
        },
    };
    let options = BuildOptions {
        overwrite: args.overwrite,
        archive: args.archive,
        inventory_only,
        refresh: args.refresh,
        dbgap_study_id: args.dbgap_study_id,
    };

    let result = with_sink(output_mode, |sink| app.build(input, options, sink))?;
    match output_mode {
        OutputMode::Json => JsonOutput::print(&result).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_build(&result).into_diagnostic()?,
    }
    Ok(batch_exit_code(&result.items, single))
}

fn with_sink<T>(
    output_mode: OutputMode,
    f: impl FnOnce(&dyn hubmap_bags::app::ProgressSink) -> Result<T, BagsError>,
) -> Result<T, BagsError> {
    match output_mode {
        OutputMode::Json => f(&JsonOutput),
        OutputMode::Human => f(&LogSink),
    }
}
