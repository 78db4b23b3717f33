/*!
 * cdm-ingest CLI
 *
 * Every transfer subcommand builds a work list, hands it to the fan-out
 * dispatcher, and prints one summary. Exit status is 0 when no item failed,
 * 1 when some items failed, and 2 when the run could not start.
 */

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use cdm_ingest::{
    config::{IngestConfig, LogLevel},
    discovery::{
        genome_ids_with_lineage,
        targets::{
            download_targets, fastani_upload_targets, genome_upload_targets, link_targets,
            read_clade_ids,
        },
    },
    dispatch::{FanOutDispatcher, RunReport},
    error::{CdmError, Result, EXIT_SUCCESS},
    logging,
    normalize::{self, BATCH_DIR_PREFIX},
    output::OutputWriter,
    store::{ObjectStore, S3Store},
    transfer::{Downloader, FileTransferer, Linker, Uploader},
};

const DEFAULT_COLLECTIONS_ROOT: &str = "/global/cfs/cdirs/kbase/collections";
const DEFAULT_NCBI_SOURCE: &str = "/global/cfs/cdirs/kbase/collections/sourcedata/NCBI/NONE";

#[derive(Parser)]
#[command(name = "cdm-ingest")]
#[command(version, about = "Stage genome files and tool results for the CDM data lake", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Maximum number of items in flight
    #[arg(short = 'w', long, global = true)]
    workers: Option<usize>,

    /// Object store endpoint URL
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Bucket name
    #[arg(long, global = true)]
    bucket: Option<String>,

    /// Access key ID
    #[arg(long, global = true)]
    access_key: Option<String>,

    /// Environment variable that holds the secret key
    #[arg(long, value_name = "VAR", global = true)]
    secret_key_env: Option<String>,

    /// Log level
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Write JSON logs to this file instead of stderr
    #[arg(long, value_name = "FILE", global = true)]
    log_file: Option<PathBuf>,

    /// Debug logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Print the summary as one JSON object
    #[arg(long, global = true)]
    json: bool,

    /// Hide the progress bar
    #[arg(long, global = true)]
    no_progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LineageArgs {
    /// GTDB taxonomy files (e.g. bac120_taxonomy_r214.tsv)
    #[arg(short = 't', long = "taxonomy", required = true, num_args = 1..)]
    taxonomy_files: Vec<PathBuf>,

    /// Lineage substrings to select (e.g. c__Alphaproteobacteria)
    #[arg(short = 'l', long = "lineage", required = true, num_args = 1..)]
    lineages: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Link NCBI genome directories into a collection source version
    Link {
        #[command(flatten)]
        lineage: LineageArgs,

        /// Collections root
        #[arg(long, default_value = DEFAULT_COLLECTIONS_ROOT)]
        collections_root: PathBuf,

        /// Collection name
        #[arg(long, default_value = "CDM")]
        collection: String,

        /// Source version directory to create
        #[arg(long, default_value = "eggNOG")]
        source_version: String,

        /// Suffixes every linked genome directory must contain
        #[arg(long = "require", default_values_t = vec!["protein.faa.gz".to_string()])]
        required_suffixes: Vec<String>,
    },

    /// Upload one file per selected genome
    UploadGenomes {
        #[command(flatten)]
        lineage: LineageArgs,

        /// Directory holding one subdirectory per genome id
        #[arg(long, default_value = DEFAULT_NCBI_SOURCE)]
        source_dir: PathBuf,

        /// File name suffix to upload
        #[arg(long, default_value = "protein.faa.gz")]
        suffix: String,

        /// Object key prefix
        #[arg(long, default_value = "NCBI")]
        key_prefix: String,
    },

    /// Upload FastANI result files for a list of clades
    UploadFastani {
        /// Directory of merged FastANI output
        #[arg(long)]
        results_dir: PathBuf,

        /// File with one clade name per line
        #[arg(long)]
        clade_file: PathBuf,

        /// Object key prefix
        #[arg(long, default_value = "FastANI/Rhodanobacteraceae")]
        key_prefix: String,

        /// Result file suffixes
        #[arg(long = "suffix", default_values_t = vec![".txt".to_string(), ".txt.matrix".to_string()])]
        suffixes: Vec<String>,
    },

    /// Download objects by suffix into per-genome directories
    Download {
        /// Key prefix to list (empty lists the whole bucket)
        #[arg(long, default_value = "")]
        prefix: String,

        /// Suffixes to download (case-insensitive)
        #[arg(long = "suffix", default_values_t = vec![".faa".to_string()])]
        suffixes: Vec<String>,

        /// Local destination root
        #[arg(long)]
        dest: PathBuf,
    },

    /// Normalize eggNOG annotation workbooks under a collection data directory
    NormalizeEggnog {
        /// Directory containing batch/genome result directories
        #[arg(long)]
        data_dir: PathBuf,
    },

    /// Merge FastANI results for a list of clades into one CSV
    NormalizeFastani {
        #[arg(long)]
        results_dir: PathBuf,

        #[arg(long)]
        clade_file: PathBuf,

        #[arg(long, default_value = "processed_fastani_results.csv")]
        output: PathBuf,
    },

    /// Normalize IMG submission eggNOG results and upload the CSVs
    ProcessEggnog {
        /// eggNOG result directory containing batch directories
        #[arg(long)]
        result_dir: PathBuf,

        /// Batch directory name prefix
        #[arg(long, default_value = BATCH_DIR_PREFIX)]
        batch_prefix: String,

        /// Object key prefix
        #[arg(long, default_value = "IMG-source/eggnog_results")]
        key_prefix: String,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let (output, result) = match load_config(&cli) {
        Ok(config) => {
            let output = OutputWriter::for_config(&config);
            let result = run(cli.command, config, &output);
            (output, result)
        }
        Err(e) => (OutputWriter::new(cli.json), Err(e)),
    };

    let code = match result {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            if !matches!(e, CdmError::PartialFailure { .. }) {
                output.error(&e.category().to_string(), &e.to_string());
            }
            e.exit_code()
        }
    };
    std::process::exit(code);
}

/// Config file (or defaults) with command-line overrides applied
fn load_config(cli: &Cli) -> Result<IngestConfig> {
    let mut config = match cli.config {
        Some(ref path) => IngestConfig::from_file(path)?,
        None => IngestConfig::default(),
    };
    apply_overrides(&mut config, cli);
    config.validate()?;
    Ok(config)
}

fn run(command: Commands, config: IngestConfig, output: &OutputWriter) -> Result<()> {
    if let Err(e) = logging::init_logging(&config) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CdmError::Other(format!("Failed to start async runtime: {}", e)))?;

    runtime.block_on(handle_command(command, config, output))
}

fn apply_overrides(config: &mut IngestConfig, cli: &Cli) {
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(ref endpoint) = cli.endpoint {
        config.store.endpoint = endpoint.clone();
    }
    if let Some(ref bucket) = cli.bucket {
        config.store.bucket = bucket.clone();
    }
    if let Some(ref access_key) = cli.access_key {
        config.store.access_key = access_key.clone();
    }
    if let Some(ref var) = cli.secret_key_env {
        config.store.secret_key_env = var.clone();
    }
    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    if cli.log_file.is_some() {
        config.log_file = cli.log_file.clone();
    }
    config.verbose |= cli.verbose;
    config.json_output |= cli.json;
    config.show_progress = config.show_progress && !cli.no_progress && !config.json_output;
}

fn dispatcher(config: &IngestConfig) -> FanOutDispatcher {
    FanOutDispatcher::new(config.workers)
        .with_progress(config.show_progress)
        .with_sample_size(config.sample_size)
}

async fn connect_store(config: &mut IngestConfig) -> Result<Arc<dyn ObjectStore>> {
    config.store.resolve_secret()?;
    config.store.validate()?;
    let store = S3Store::connect(&config.store).await?;
    store.test_connection().await?;
    info!(endpoint = %config.store.endpoint, bucket = %config.store.bucket, "connected to object store");
    Ok(Arc::new(store))
}

/// Turn a finished run into the process result
fn finish(output: &OutputWriter, operation: &str, report: RunReport) -> Result<()> {
    output.print_summary(operation, &report);
    let summary = report.summary;
    if summary.has_failures() {
        return Err(CdmError::PartialFailure {
            failed: summary.failed,
            total: summary.total,
        });
    }
    Ok(())
}

async fn handle_command(
    command: Commands,
    mut config: IngestConfig,
    output: &OutputWriter,
) -> Result<()> {
    match command {
        Commands::Link {
            lineage,
            collections_root,
            collection,
            source_version,
            required_suffixes,
        } => {
            let genome_ids = genome_ids_with_lineage(&lineage.taxonomy_files, &lineage.lineages)?;
            let source_root = collections_root.join("sourcedata").join("NCBI").join("NONE");
            let collection_dir = collections_root
                .join("collectionssource")
                .join("NONE")
                .join(&collection)
                .join(&source_version);
            std::fs::create_dir_all(&collection_dir).map_err(|e| {
                CdmError::Link(format!("cannot create {}: {}", collection_dir.display(), e))
            })?;

            let targets = link_targets(&genome_ids, &source_root, &collection_dir);
            let linker: Arc<dyn FileTransferer> = Arc::new(Linker::new(required_suffixes));
            let summary = dispatcher(&config).run(targets.items.clone(), linker).await;
            finish(output, "link", RunReport::new(summary).with_targets(&targets))
        }

        Commands::UploadGenomes {
            lineage,
            source_dir,
            suffix,
            key_prefix,
        } => {
            let genome_ids = genome_ids_with_lineage(&lineage.taxonomy_files, &lineage.lineages)?;
            let targets = genome_upload_targets(&genome_ids, &source_dir, &suffix, &key_prefix);

            let store = connect_store(&mut config).await?;
            let uploader: Arc<dyn FileTransferer> = Arc::new(Uploader::new(store));
            let summary = dispatcher(&config).run(targets.items.clone(), uploader).await;
            finish(output, "upload-genomes", RunReport::new(summary).with_targets(&targets))
        }

        Commands::UploadFastani {
            results_dir,
            clade_file,
            key_prefix,
            suffixes,
        } => {
            let clade_ids = read_clade_ids(&clade_file)?;
            let targets = fastani_upload_targets(&results_dir, &clade_ids, &suffixes, &key_prefix)?;

            let store = connect_store(&mut config).await?;
            let uploader: Arc<dyn FileTransferer> = Arc::new(Uploader::new(store));
            let summary = dispatcher(&config).run(targets.items.clone(), uploader).await;
            finish(output, "upload-fastani", RunReport::new(summary).with_targets(&targets))
        }

        Commands::Download {
            prefix,
            suffixes,
            dest,
        } => {
            let store = connect_store(&mut config).await?;
            let objects = store.list(&prefix).await?;
            let targets = download_targets(&objects, &suffixes, &dest);
            info!(listed = objects.len(), selected = targets.len(), "objects to download");

            let downloader: Arc<dyn FileTransferer> = Arc::new(Downloader::new(store));
            let summary = dispatcher(&config).run(targets.items.clone(), downloader).await;
            finish(output, "download", RunReport::new(summary).with_targets(&targets))
        }

        Commands::NormalizeEggnog { data_dir } => {
            let summary = normalize::normalize_eggnog_results(&data_dir, &dispatcher(&config)).await?;
            finish(output, "normalize-eggnog", RunReport::new(summary))
        }

        Commands::NormalizeFastani {
            results_dir,
            clade_file,
            output: csv_path,
        } => {
            let clade_ids = read_clade_ids(&clade_file)?;
            let rows = normalize::normalize_fastani_results(&results_dir, &clade_ids, &csv_path)?;
            info!(rows, "FastANI normalization finished");
            output.print_written("normalize-fastani", &[csv_path]);
            Ok(())
        }

        Commands::ProcessEggnog {
            result_dir,
            batch_prefix,
            key_prefix,
        } => {
            let submissions = normalize::submission_dirs(&result_dir, &batch_prefix)?;
            let store = connect_store(&mut config).await?;
            let uploader: Arc<dyn FileTransferer> = Arc::new(Uploader::new(store));

            let summary = dispatcher(&config)
                .run_with(
                    submissions,
                    |(data_id, _)| data_id.clone(),
                    move |(data_id, data_dir)| {
                        normalize::process_and_upload(
                            data_dir,
                            data_id,
                            key_prefix.clone(),
                            Arc::clone(&uploader),
                        )
                    },
                )
                .await;
            finish(output, "process-eggnog", RunReport::new(summary))
        }
    }
}
