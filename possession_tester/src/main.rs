// possession_tester/src/main.rs
//
// Command-line driver for the possession engine. It reads decoded frames from a
// directory (`frame_<n>.png`), the per-frame detection artifacts written by the
// detection stage, runs the two-pass possession analysis and writes:
// - one annotated `frame_<n>.png` per analysed frame into the output directory,
// - the final possession report, as text or JSON, on stdout.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use log::info;
use possession_vision::config::PipelineConfig;
use possession_vision::core_modules::artifact_store::ArtifactStore;
use possession_vision::core_modules::frame_source::{FrameSource, ImageDirectory};
use possession_vision::core_modules::team_classifier::TeamModel;
use possession_vision::parallel_pipeline::ParallelPossessionPipeline;
use possession_vision::pipeline::PossessionPipeline;
use possession_vision::report::RunReport;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Possession tester: per-team ball possession from football footage",
    long_about = "Runs the possession_vision two-pass analysis over decoded frames and their detection artifacts."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging (RUST_LOG takes precedence when set)
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classifies teams, tallies possession and writes annotated frames
    Analyze(AnalyzeArgs),
    /// Fits the team colour model only and saves it as JSON
    Fit(FitArgs),
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Directory of decoded frames named frame_<n>.png / .jpg
    #[arg(short = 'f', long = "frames", value_name = "FRAMES_DIR")]
    frames: PathBuf,

    /// Root of the per-frame detection artifacts (frame_<n>/player/labels/image0.txt)
    #[arg(short = 'd', long = "detections", value_name = "DETECTIONS_DIR")]
    detections: PathBuf,

    /// Optional: JSON pipeline configuration; omitted fields keep their defaults
    #[arg(short = 'c', long = "config", value_name = "CONFIG_JSON")]
    config: Option<PathBuf>,

    /// Optional: Override the clustering seed
    #[arg(long, value_name = "SEED", env = "POSSESSION_SEED")]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Directory for annotated frames. An existing directory is never overwritten;
    /// a numbered sibling (<dir>_1, <dir>_2, ...) is used instead.
    #[arg(short = 'o', long = "output", value_name = "OUTPUT_DIR", conflicts_with = "workers")]
    output: Option<PathBuf>,

    /// Optional: Override the possession distance threshold, in pixels
    #[arg(short = 't', long, value_name = "PIXELS", env = "POSSESSION_THRESHOLD")]
    threshold: Option<f64>,

    /// Reuse a saved team model instead of fitting one
    #[arg(long, value_name = "MODEL_JSON")]
    load_model: Option<PathBuf>,

    /// Save the fitted team model
    #[arg(long, value_name = "MODEL_JSON")]
    save_model: Option<PathBuf>,

    /// Analyse frames on a worker pool of this size (no annotated output)
    #[arg(short = 'w', long, value_name = "COUNT", value_parser = clap::value_parser!(u16).range(1..))]
    workers: Option<u16>,

    /// Print the report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug)]
struct FitArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Where to write the fitted team model
    #[arg(short = 'm', long = "model", value_name = "MODEL_JSON")]
    model: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Analyze(args) => analyze(args).await,
        Commands::Fit(args) => fit(args),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn load_config(input: &InputArgs, threshold: Option<f64>) -> Result<PipelineConfig> {
    let mut config = match &input.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(threshold) = threshold {
        config.possession.threshold_px = threshold;
    }
    if let Some(seed) = input.seed {
        config.clustering.seed = seed;
    }
    config.validate()?;
    Ok(config)
}

fn open_inputs(input: &InputArgs) -> Result<(ImageDirectory, ArtifactStore)> {
    let frames = ImageDirectory::open(&input.frames)
        .with_context(|| format!("Failed to open frames directory {}", input.frames.display()))?;
    if frames.is_empty() {
        bail!("No frame_<n> images found in {}", input.frames.display());
    }
    if !input.detections.is_dir() {
        bail!("Detections directory {} does not exist", input.detections.display());
    }
    info!(
        "Found {} frames in {}, detections in {}",
        frames.len(),
        input.frames.display(),
        input.detections.display()
    );
    Ok((frames, ArtifactStore::new(&input.detections)))
}

/// `requested` itself when it does not exist yet, otherwise the first free
/// `<requested>_<n>` sibling.
fn unique_output_dir(requested: &Path) -> PathBuf {
    if !requested.exists() {
        return requested.to_path_buf();
    }
    let name = requested
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let mut suffix = 1;
    loop {
        let candidate = requested.with_file_name(format!("{name}_{suffix}"));
        if !candidate.exists() {
            return candidate;
        }
        suffix += 1;
    }
}

fn save_model(model: Option<&TeamModel>, path: &Path) -> Result<()> {
    let model = model.context("No fitted team model to save")?;
    model
        .save_json(path)
        .with_context(|| format!("Failed to save team model to {}", path.display()))?;
    info!("Saved team model to {}", path.display());
    Ok(())
}

async fn analyze(args: AnalyzeArgs) -> Result<()> {
    // --- 1. Configuration & Inputs ---
    let config = load_config(&args.input, args.threshold)?;
    let (frames, store) = open_inputs(&args.input)?;

    let mut pipeline = PossessionPipeline::new(config.clone(), store.clone())?;
    if let Some(path) = &args.load_model {
        let model = TeamModel::load_json(path)
            .with_context(|| format!("Failed to load team model from {}", path.display()))?;
        info!("Loaded team model from {}", path.display());
        pipeline = pipeline.with_team_model(model);
    }

    // --- 2. Analysis ---
    let report: RunReport = match args.workers {
        Some(workers) => {
            // Stages 1 and 2 stay sequential; only the per-frame pass fans out.
            let mut samples_collected = 0;
            if pipeline.team_model().is_none() {
                let samples = pipeline.collect_samples(&frames)?;
                samples_collected = samples.len();
                pipeline.fit(&samples)?;
            }
            if let Some(path) = &args.save_model {
                save_model(pipeline.team_model(), path)?;
            }
            let model = pipeline
                .team_model()
                .cloned()
                .context("Team model missing after fitting")?;

            let parallel = ParallelPossessionPipeline::new(config, store, model)?.with_workers(usize::from(workers));
            let mut report = parallel.run(Arc::new(frames)).await?.report;
            report.samples_collected = samples_collected;
            report
        }
        None => {
            let report = match args.output.as_deref().map(unique_output_dir) {
                Some(output_dir) => {
                    fs::create_dir_all(&output_dir)
                        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;
                    let report = pipeline.run_with_sink(&frames, |index, frame| {
                        frame.save(output_dir.join(format!("frame_{index}.png")))?;
                        Ok(())
                    })?;
                    info!("Annotated frames written to {}", output_dir.display());
                    report
                }
                None => pipeline.run(&frames)?,
            };
            if let Some(path) = &args.save_model {
                save_model(pipeline.team_model(), path)?;
            }
            report
        }
    };

    // --- 3. Report ---
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn fit(args: FitArgs) -> Result<()> {
    let config = load_config(&args.input, None)?;
    let (frames, store) = open_inputs(&args.input)?;

    let mut pipeline = PossessionPipeline::new(config, store)?;
    let samples = pipeline.collect_samples(&frames)?;
    let model = pipeline.fit(&samples)?;
    for (index, centroid) in model.centroids.iter().enumerate() {
        let lab = centroid.lab();
        println!("Team{}: L={:.2} a={:.2} b={:.2}", index + 1, lab.l, lab.a, lab.b);
    }
    save_model(pipeline.team_model(), &args.model)?;
    println!("Fitted on {} samples, saved to {}", samples.len(), args.model.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fresh_output_dir_is_used_as_is() {
        let dir = tempdir().expect("temp dir");
        let requested = dir.path().join("annotated");
        assert_eq!(unique_output_dir(&requested), requested);
    }

    #[test]
    fn existing_output_dirs_get_numbered_siblings() {
        let dir = tempdir().expect("temp dir");
        let requested = dir.path().join("annotated");
        fs::create_dir_all(&requested).expect("mkdir");
        fs::create_dir_all(dir.path().join("annotated_1")).expect("mkdir");
        assert_eq!(unique_output_dir(&requested), dir.path().join("annotated_2"));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
