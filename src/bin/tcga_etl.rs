use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use tcga_etl::app::{App, ProgressSink};
use tcga_etl::browser::WebDriverBrowser;
use tcga_etl::clinical::ClinicalSource;
use tcga_etl::config::{ConfigLoader, ResolvedConfig};
use tcga_etl::document_store::FsDocumentStore;
use tcga_etl::domain::GenePanel;
use tcga_etl::error::EtlError;
use tcga_etl::fetch::HttpMatrixFetcher;
use tcga_etl::object_store::FsObjectStore;
use tcga_etl::output::{ConsoleOutput, JsonOutput, OutputMode};
use tcga_etl::query::{QueryError, QueryService};

#[derive(Parser)]
#[command(name = "tcga-etl")]
#[command(about = "Scrape, load and join TCGA cohort gene expression with clinical survival data")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Resolve cohort download links from the catalog page")]
    Discover,
    #[command(about = "Discover cohorts, download their matrices and store the raw TSV")]
    Ingest,
    #[command(about = "Load stored matrices into the gene_expression collection")]
    Sync,
    #[command(about = "Join clinical survival records with gene expression documents")]
    Join(JoinArgs),
    #[command(about = "Run discover, ingest, sync and join in sequence")]
    Run(JoinArgs),
    #[command(about = "Serve GET /gene_expression?patient_id=...")]
    Serve(ServeArgs),
    #[command(about = "Look up one patient's gene expression document")]
    Lookup(LookupArgs),
}

#[derive(Args, Clone)]
struct JoinArgs {
    #[arg(long)]
    clinical: Option<PathBuf>,

    #[arg(long, conflicts_with = "clinical")]
    from_collection: bool,
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long)]
    bind: Option<String>,
}

#[derive(Args)]
struct LookupArgs {
    patient_id: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<EtlError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &EtlError) -> u8 {
    match error {
        EtlError::ConfigRead(_)
        | EtlError::ConfigParse(_)
        | EtlError::ConfigValue(_)
        | EtlError::ClinicalRead { .. }
        | EtlError::ClinicalColumn(_) => 2,
        EtlError::BrowserHttp(_)
        | EtlError::BrowserStatus { .. }
        | EtlError::BrowserProtocol(_)
        | EtlError::Http(_)
        | EtlError::HttpStatus { .. }
        | EtlError::Server(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Interactive => &ConsoleOutput,
        OutputMode::NonInteractive => &JsonOutput,
    };

    match cli.command {
        Commands::Discover => {
            let app = build_app(&config);
            let browser = WebDriverBrowser::connect(&config.webdriver_url, config.headless)?;
            let result = app.discover(browser, &config.catalog_url, config.discovery, sink);
            match output_mode {
                OutputMode::Interactive => ConsoleOutput::print_discover(&result),
                OutputMode::NonInteractive => JsonOutput::print(&result).into_diagnostic()?,
            }
            Ok(())
        }
        Commands::Ingest => {
            let app = build_app(&config);
            let browser = WebDriverBrowser::connect(&config.webdriver_url, config.headless)?;
            let fetcher = HttpMatrixFetcher::new(config.download_timeout)?;
            let discovered = app.discover(browser, &config.catalog_url, config.discovery, sink);
            let result = app.ingest(
                &discovered.cohorts,
                &fetcher,
                &GenePanel::discovery(),
                sink,
            )?;
            match output_mode {
                OutputMode::Interactive => ConsoleOutput::print_ingest(&result),
                OutputMode::NonInteractive => JsonOutput::print(&result).into_diagnostic()?,
            }
            Ok(())
        }
        Commands::Sync => {
            let app = build_app(&config);
            let result = app.sync(GenePanel::catalog(), sink)?;
            match output_mode {
                OutputMode::Interactive => ConsoleOutput::print_sync(&result),
                OutputMode::NonInteractive => JsonOutput::print(&result).into_diagnostic()?,
            }
            Ok(())
        }
        Commands::Join(args) => {
            let app = build_app(&config);
            let result = app.join(clinical_source(&args, &config), sink)?;
            match output_mode {
                OutputMode::Interactive => ConsoleOutput::print_join(&result),
                OutputMode::NonInteractive => JsonOutput::print(&result).into_diagnostic()?,
            }
            Ok(())
        }
        Commands::Run(args) => {
            let app = build_app(&config);
            let browser = WebDriverBrowser::connect(&config.webdriver_url, config.headless)?;
            let fetcher = HttpMatrixFetcher::new(config.download_timeout)?;
            let result = app.run(
                browser,
                &fetcher,
                &config.catalog_url,
                config.discovery,
                clinical_source(&args, &config),
                sink,
            )?;
            match output_mode {
                OutputMode::Interactive => ConsoleOutput::print_run(&result),
                OutputMode::NonInteractive => JsonOutput::print(&result).into_diagnostic()?,
            }
            Ok(())
        }
        Commands::Serve(args) => {
            let bind = match args.bind {
                Some(bind) => bind.parse::<SocketAddr>().into_diagnostic()?,
                None => config.bind,
            };
            let documents = FsDocumentStore::new(&config.document_root, &config.database);
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .into_diagnostic()?;
            runtime.block_on(tcga_etl::server::serve(bind, QueryService::new(documents)))?;
            Ok(())
        }
        Commands::Lookup(args) => {
            let documents = FsDocumentStore::new(&config.document_root, &config.database);
            let service = QueryService::new(documents);
            match service.lookup(Some(&args.patient_id)) {
                Ok(document) => JsonOutput::print(&document).into_diagnostic(),
                Err(QueryError::Store(err)) => Err(err.into()),
                Err(err) => Err(miette::Report::msg(err.to_string())),
            }
        }
    }
}

fn build_app(config: &ResolvedConfig) -> App<FsObjectStore, FsDocumentStore> {
    App::new(
        FsObjectStore::new(config.object_root.clone()),
        FsDocumentStore::new(&config.document_root, &config.database),
        config.bucket.clone(),
    )
}

fn clinical_source(args: &JoinArgs, config: &ResolvedConfig) -> ClinicalSource {
    if args.from_collection {
        return ClinicalSource::Collection;
    }
    ClinicalSource::Table(
        args.clinical
            .clone()
            .unwrap_or_else(|| config.clinical_table.clone()),
    )
}
