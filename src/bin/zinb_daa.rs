//! zinb-daa - per-feature ZINB differential abundance CLI

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use zinb_daa::correct::{PerCovariateBh, QValueAdjuster};
use zinb_daa::data::Dataset;
use zinb_daa::error::Result;
use zinb_daa::logging::init_logger;
use zinb_daa::model::ZinbFitter;
use zinb_daa::pipeline::{run_batch, run_dataset, BatchManifest, RunOptions, Transformation};

/// Per-feature zero-inflated negative binomial association testing
#[derive(Parser)]
#[command(name = "zinb-daa")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log progress at info level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by both subcommands
#[derive(clap::Args)]
struct RunArgs {
    /// Run options YAML (transformation, multiple_qvalues, true_positive_suffix, parallel_features)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Response transformation; only NONE is supported
    #[arg(long)]
    transformation: Option<Transformation>,

    /// Use per-covariate q-values instead of BH over all rows
    #[arg(long)]
    multiple_qvalues: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Test one dataset
    Run {
        /// Feature table TSV (features as rows, samples as columns)
        #[arg(short, long)]
        features: PathBuf,

        /// Sample sheet TSV
        #[arg(short, long)]
        metadata: PathBuf,

        /// Sample sheet column holding subject IDs
        #[arg(long, default_value = "ID")]
        id_column: String,

        /// Covariates to test (comma-separated); all other columns by default
        #[arg(long, value_delimiter = ',')]
        covariates: Option<Vec<String>>,

        /// Output path for results TSV
        #[arg(short, long)]
        output: PathBuf,

        /// Also write results as JSON
        #[arg(long)]
        json: Option<PathBuf>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Test every dataset listed in a YAML manifest
    Batch {
        /// Batch manifest YAML
        #[arg(long)]
        manifest: PathBuf,

        /// Directory receiving one `<name>.tsv` per successful dataset
        #[arg(short, long)]
        output_dir: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            features,
            metadata,
            id_column,
            covariates,
            output,
            json,
            run,
        } => cmd_run(
            &features,
            &metadata,
            &id_column,
            covariates.as_deref(),
            &output,
            json.as_deref(),
            &run,
        ),
        Commands::Batch {
            manifest,
            output_dir,
            run,
        } => cmd_batch(&manifest, &output_dir, &run),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Command-line flags override the options file, which overrides `base`.
fn resolve_options(args: &RunArgs, base: RunOptions) -> Result<RunOptions> {
    let mut options = match &args.config {
        Some(path) => RunOptions::from_yaml(&std::fs::read_to_string(path)?)?,
        None => base,
    };
    if let Some(t) = args.transformation {
        options.transformation = t;
    }
    if args.multiple_qvalues {
        options.multiple_qvalues = true;
    }
    Ok(options)
}

fn adjuster_for(options: &RunOptions) -> Option<&'static dyn QValueAdjuster> {
    if options.multiple_qvalues {
        Some(&PerCovariateBh)
    } else {
        None
    }
}

fn cmd_run(
    features_path: &Path,
    metadata_path: &Path,
    id_column: &str,
    covariates: Option<&[String]>,
    output_path: &Path,
    json_path: Option<&Path>,
    args: &RunArgs,
) -> Result<()> {
    let options = resolve_options(args, RunOptions::default())?;

    eprintln!("Loading data...");
    let name = features_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    let dataset = Dataset::from_tsv_files(name, features_path, metadata_path, id_column, covariates)?;

    eprintln!(
        "Loaded {} features x {} samples, {} covariates",
        dataset.features.n_features(),
        dataset.n_samples(),
        dataset.metadata.n_covariates()
    );

    let fitter = ZinbFitter::new();
    let result = run_dataset(&dataset, &fitter, &options, adjuster_for(&options))?;

    eprintln!("Writing results to {:?}...", output_path);
    result.to_tsv(output_path)?;
    if let Some(path) = json_path {
        std::fs::write(path, result.to_json()?)?;
    }

    eprintln!("{}", result);
    Ok(())
}

fn cmd_batch(manifest_path: &Path, output_dir: &Path, args: &RunArgs) -> Result<()> {
    let manifest = BatchManifest::from_file(manifest_path)?;
    let options = resolve_options(args, manifest.options.clone())?;
    let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));

    let mut datasets = Vec::with_capacity(manifest.datasets.len());
    for entry in &manifest.datasets {
        match entry.load(base) {
            Ok(dataset) => datasets.push(dataset),
            Err(e) => log::warn!("Skipping dataset '{}': {}", entry.name, e),
        }
    }

    let fitter = ZinbFitter::new();
    let results = run_batch(&datasets, &fitter, &options, adjuster_for(&options));

    std::fs::create_dir_all(output_dir)?;
    for result in &results {
        let path = output_dir.join(format!("{}.tsv", result.name));
        result.to_tsv(&path)?;
        eprintln!("{}: {} rows -> {:?}", result.name, result.len(), path);
    }

    eprintln!(
        "Done! {} of {} datasets completed",
        results.len(),
        manifest.datasets.len()
    );
    Ok(())
}
