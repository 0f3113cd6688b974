//! CLI command definitions for sam-forge.
//!
//! `infer` dispatches chunks, `worker` runs one chunk inside a cluster job,
//! `aggregate` consolidates job directories and `template` renders the
//! conversation dataset.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregate::{
    aggregate, discover_job_dirs, load_collection, missing_indices, write_collection,
    AggregateSummary, MissingReport,
};
use crate::annotations::AnnotationIndex;
use crate::inference::{InferenceStep, ProcessSegmenter};
use crate::pipeline::{resolve_job_dir, ChunkReport, ChunkWorker, ForgeConfig, OutputLayout};
use crate::scheduler::{
    ChunkSpec, DispatchManifest, DispatchReport, Dispatcher, InlineScheduler, JobScheduler,
    JobStatus, RejectedChunk, ResourceSpec, SlurmScheduler, WorkerCommand,
};
use crate::template::{write_dataset, AssistantRole, TemplateProjector};

/// Default shared output directory.
const DEFAULT_OUTPUT_DIR: &str = "./sam-outputs";

/// Default dataset file written by `template`.
const DEFAULT_DATASET_FILE: &str = "llava_object_detection.json";

/// Environment variable holding the cluster job id inside a Slurm job.
const SLURM_JOB_ID_ENV: &str = "SLURM_JOB_ID";

/// Segmentation-driven conversation dataset builder.
#[derive(Parser)]
#[command(name = "sam-forge")]
#[command(about = "Run a segmentation model over COCO images on a cluster and build a 'where is X' dataset")]
#[command(version)]
#[command(
    long_about = "sam-forge runs a segmentation model over every image of a COCO panoptic annotation file, \
split into cluster jobs, then merges the per-image results into a conversation dataset.\n\n\
Example usage:\n  \
sam-forge infer --annotations panoptic_train2017.json --image-root train2017 --njobs 64 --ngpus 1\n  \
sam-forge aggregate --output-dir ./sam-outputs --annotations panoptic_train2017.json\n  \
sam-forge template --input ./sam-outputs/consolidated.json"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Partition the annotation index and submit one job per chunk.
    Infer(InferArgs),

    /// Process one chunk into a job directory (run by each cluster job).
    Worker(WorkerArgs),

    /// Merge every job directory into one consolidated file.
    #[command(alias = "agg")]
    Aggregate(AggregateArgs),

    /// Render the consolidated file into a conversation dataset.
    Template(TemplateArgs),
}

/// Inputs every inference process needs.
#[derive(clap::Args, Debug, Clone)]
pub struct InputArgs {
    /// COCO panoptic annotation file.
    #[arg(long, env = "SAM_FORGE_ANNOTATIONS")]
    pub annotations: PathBuf,

    /// Directory the annotation file names are relative to.
    #[arg(long, env = "SAM_FORGE_IMAGE_ROOT")]
    pub image_root: PathBuf,

    /// Command line that starts the segmentation model server.
    #[arg(long, env = "SAM_FORGE_SEGMENTER_CMD")]
    pub segmenter_cmd: String,

    /// Log a progress line every N items within a chunk.
    #[arg(long, default_value = "100")]
    pub log_every: usize,
}

/// Arguments for `sam-forge infer`.
#[derive(Parser, Debug)]
pub struct InferArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Shared output directory for job results.
    #[arg(short = 'o', long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Number of jobs to split the index space into.
    #[arg(long, default_value = "1")]
    pub njobs: usize,

    /// GPUs per node.
    #[arg(long, default_value = "1")]
    pub ngpus: u32,

    /// Nodes per job.
    #[arg(long, default_value = "1")]
    pub nodes: u32,

    /// Job time budget in minutes.
    #[arg(long, default_value = "4320")]
    pub timeout: u32,

    /// Cluster partition; `local` runs everything in this process.
    #[arg(long, default_value = "slurm")]
    pub partition: String,

    /// Comment attached to each job.
    #[arg(long)]
    pub comment: Option<String>,

    /// Nodes to exclude, in scheduler syntax.
    #[arg(long)]
    pub exclude: Option<String>,

    /// Resubmit only the indices listed in a missing-index report.
    #[arg(long)]
    pub retry_from: Option<PathBuf>,
}

/// Arguments for `sam-forge worker`.
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Chunk assignment written by `infer`.
    #[arg(long)]
    pub chunk_file: PathBuf,

    /// Job output directory; `%j` is replaced by the scheduler job id.
    #[arg(long)]
    pub job_dir: PathBuf,
}

/// Arguments for `sam-forge aggregate`.
#[derive(Parser, Debug)]
pub struct AggregateArgs {
    /// Shared output directory of the run.
    #[arg(short = 'o', long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Explicit job directories to scan instead of discovering them.
    #[arg(long = "job-dir")]
    pub job_dirs: Vec<PathBuf>,

    /// Annotation file; enables the missing-index report.
    #[arg(long, env = "SAM_FORGE_ANNOTATIONS")]
    pub annotations: Option<PathBuf>,

    /// Consolidated output file (default: <output-dir>/consolidated.json).
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// Arguments for `sam-forge template`.
#[derive(Parser, Debug)]
pub struct TemplateArgs {
    /// Consolidated file written by `aggregate`.
    #[arg(short = 'i', long)]
    pub input: PathBuf,

    /// Dataset file to write.
    #[arg(short = 'o', long, default_value = DEFAULT_DATASET_FILE)]
    pub output: PathBuf,

    /// Speaker label of the answer turn.
    #[arg(long, value_enum, default_value_t = AssistantRole::Gpt4)]
    pub assistant_role: AssistantRole,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For more control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Infer(args) => run_infer_command(args, &cli.log_level).await,
        Commands::Worker(args) => run_worker_command(args).await,
        Commands::Aggregate(args) => run_aggregate_command(args).await,
        Commands::Template(args) => run_template_command(args).await,
    }
}

// ============================================================================
// Shared setup
// ============================================================================

fn forge_config(input: &InputArgs, output_dir: &Path) -> anyhow::Result<ForgeConfig> {
    let config = ForgeConfig::new()
        .with_annotation_path(&input.annotations)
        .with_image_root(&input.image_root)
        .with_segmenter_command(&input.segmenter_cmd)
        .with_output_dir(output_dir)
        .with_log_every(input.log_every);
    config.validate()?;
    Ok(config)
}

fn build_worker(config: &ForgeConfig, index: Arc<AnnotationIndex>) -> anyhow::Result<ChunkWorker> {
    let segmenter = ProcessSegmenter::from_command_line(&config.segmenter_command)
        .ok_or_else(|| anyhow::anyhow!("Segmenter command is empty"))?;
    let step = InferenceStep::new(index, &config.image_root, Arc::new(segmenter));
    Ok(ChunkWorker::new(step).with_log_every(config.log_every))
}

fn load_index(path: &Path) -> anyhow::Result<Arc<AnnotationIndex>> {
    let index = AnnotationIndex::load(path)
        .with_context(|| format!("Failed to load annotations from {}", path.display()))?;
    Ok(Arc::new(index))
}

// ============================================================================
// Infer Command Implementation
// ============================================================================

#[derive(Debug, Serialize)]
struct JobOutput {
    chunk_index: usize,
    job_id: String,
    status: JobStatus,
    items: usize,
    output_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<ChunkReport>,
}

#[derive(Debug, Serialize)]
struct InferOutput {
    status: String,
    run_id: String,
    scheduler: String,
    total_count: usize,
    submitted: usize,
    jobs: Vec<JobOutput>,
    rejected: Vec<RejectedChunk>,
    manifest: String,
}

impl InferOutput {
    fn new(report: &DispatchReport, scheduler: &str, total_count: usize, manifest: &Path) -> Self {
        let status = if report.is_complete() {
            "success"
        } else if report.handles.is_empty() {
            "failed"
        } else {
            "partial"
        };
        Self {
            status: status.to_string(),
            run_id: report.run_id.clone(),
            scheduler: scheduler.to_string(),
            total_count,
            submitted: report.submitted(),
            jobs: report
                .handles
                .iter()
                .map(|h| JobOutput {
                    chunk_index: h.chunk.chunk_index,
                    job_id: h.job_id.clone(),
                    status: h.status,
                    items: h.chunk.len(),
                    output_dir: h.output_dir.display().to_string(),
                    report: h.report.clone(),
                })
                .collect(),
            rejected: report.rejected.clone(),
            manifest: manifest.display().to_string(),
        }
    }
}

async fn run_infer_command(args: InferArgs, log_level: &str) -> anyhow::Result<()> {
    let config = forge_config(&args.input, &args.output_dir)?;
    let layout = config.layout();
    let index = load_index(&config.annotation_path)?;

    let resources = ResourceSpec::new()
        .with_nodes(args.nodes)
        .with_gpus_per_node(args.ngpus)
        .with_timeout_min(args.timeout)
        .with_partition(&args.partition)
        .with_comment(args.comment.clone())
        .with_exclude(args.exclude.clone());

    let (scheduler, num_chunks): (Arc<dyn JobScheduler>, usize) = if resources.is_local() {
        if args.njobs > 1 {
            info!(njobs = args.njobs, "Local partition runs a single chunk in-process");
        }
        let worker = build_worker(&config, index.clone())?;
        (Arc::new(InlineScheduler::new(worker, layout.clone())), 1)
    } else {
        let exe = std::env::current_exe().context("Failed to locate the sam-forge executable")?;
        let worker = WorkerCommand::new(exe).args([
            "--log-level".to_string(),
            log_level.to_string(),
            "worker".to_string(),
            "--annotations".to_string(),
            config.annotation_path.display().to_string(),
            "--image-root".to_string(),
            config.image_root.display().to_string(),
            "--segmenter-cmd".to_string(),
            config.segmenter_command.clone(),
            "--log-every".to_string(),
            config.log_every.to_string(),
        ]);
        (Arc::new(SlurmScheduler::new(layout.clone(), worker)), args.njobs)
    };

    let dispatcher = Dispatcher::new(scheduler, resources);
    let report = match &args.retry_from {
        Some(path) => {
            let missing = MissingReport::load(path)
                .await
                .with_context(|| format!("Failed to read missing-index report {}", path.display()))?;
            info!(
                path = %path.display(),
                missing = missing.missing.len(),
                "Resubmitting missing indices"
            );
            dispatcher.dispatch_indices(&missing.missing, num_chunks).await?
        }
        None => dispatcher.dispatch(index.len(), num_chunks).await?,
    };

    let manifest = DispatchManifest::from_report(&report, dispatcher.scheduler_name(), index.len());
    let manifest_path = manifest
        .save(&layout)
        .await
        .context("Failed to write dispatch manifest")?;

    if !report.is_complete() {
        warn!(
            rejected = report.rejected.len(),
            submitted = report.submitted(),
            "Some chunks were not submitted; their indices will be reported missing"
        );
    }

    let output = InferOutput::new(&report, dispatcher.scheduler_name(), index.len(), &manifest_path);
    let json_output = serde_json::to_string_pretty(&output)
        .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
    println!("{}", json_output);

    Ok(())
}

// ============================================================================
// Worker Command Implementation
// ============================================================================

async fn run_worker_command(args: WorkerArgs) -> anyhow::Result<()> {
    let job_id = std::env::var(SLURM_JOB_ID_ENV).ok();
    let job_dir = resolve_job_dir(&args.job_dir, job_id.as_deref())?;

    let chunk = ChunkSpec::load(&args.chunk_file)
        .await
        .with_context(|| format!("Failed to read chunk file {}", args.chunk_file.display()))?;

    let config = ForgeConfig::new()
        .with_annotation_path(&args.input.annotations)
        .with_image_root(&args.input.image_root)
        .with_segmenter_command(&args.input.segmenter_cmd)
        .with_log_every(args.input.log_every);
    config.validate()?;

    info!(
        job_id = job_id.as_deref().unwrap_or("-"),
        chunk = chunk.chunk_index,
        items = chunk.len(),
        job_dir = %job_dir.display(),
        "Worker starting"
    );

    let index = load_index(&config.annotation_path)?;
    let worker = build_worker(&config, index)?;
    let report = worker
        .process(&chunk, &job_dir)
        .await
        .with_context(|| format!("Chunk {} failed", chunk.chunk_index))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

// ============================================================================
// Aggregate Command Implementation
// ============================================================================

#[derive(Debug, Serialize)]
struct AggregateOutput {
    #[serde(flatten)]
    summary: AggregateSummary,
    consolidated: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    missing: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    missing_report: Option<String>,
}

async fn run_aggregate_command(args: AggregateArgs) -> anyhow::Result<()> {
    let layout = OutputLayout::new(&args.output_dir);
    let dirs = if args.job_dirs.is_empty() {
        discover_job_dirs(&layout).await
    } else {
        args.job_dirs.clone()
    };
    info!(dirs = dirs.len(), "Aggregating job directories");

    let report = aggregate(&dirs).await;
    let out = args.out.clone().unwrap_or_else(|| layout.consolidated_path());
    write_collection(&out, &report.collection)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;

    let mut output = AggregateOutput {
        summary: report.summary(),
        consolidated: out.display().to_string(),
        expected: None,
        missing: None,
        missing_report: None,
    };

    match &args.annotations {
        Some(path) => {
            let index = load_index(path)?;
            let missing = missing_indices(&report.collection, &index);
            let missing_path = layout.missing_report_path();
            missing
                .save(&missing_path)
                .await
                .context("Failed to write missing-index report")?;

            if missing.is_complete() {
                info!(produced = missing.produced, expected = missing.expected, "All indices produced");
            } else {
                warn!(
                    produced = missing.produced,
                    expected = missing.expected,
                    missing = missing.missing.len(),
                    report = %missing_path.display(),
                    "Indices without an artifact"
                );
            }

            output.expected = Some(missing.expected);
            output.missing = Some(missing.missing.len());
            output.missing_report = Some(missing_path.display().to_string());
        }
        None => info!(
            produced = report.collection.len(),
            "Consolidated artifacts (pass --annotations to report missing indices)"
        ),
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

// ============================================================================
// Template Command Implementation
// ============================================================================

async fn run_template_command(args: TemplateArgs) -> anyhow::Result<()> {
    let collection = load_collection(&args.input)
        .await
        .with_context(|| format!("Failed to read consolidated file {}", args.input.display()))?;

    let projector = TemplateProjector::new()?.with_assistant_role(args.assistant_role);
    let dataset = projector.build_dataset(&collection)?;
    write_dataset(&args.output, &dataset).await?;

    let output = serde_json::json!({
        "images": collection.len(),
        "records": dataset.len(),
        "output": args.output.display().to_string(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_defaults() {
        let args = vec![
            "sam-forge",
            "infer",
            "--annotations",
            "a.json",
            "--image-root",
            "imgs",
            "--segmenter-cmd",
            "python -m sam_server",
        ];
        let cli = Cli::try_parse_from(args).expect("should parse");
        assert_eq!(cli.log_level, "info");

        match cli.command {
            Commands::Infer(args) => {
                assert_eq!(args.njobs, 1);
                assert_eq!(args.ngpus, 1);
                assert_eq!(args.nodes, 1);
                assert_eq!(args.timeout, 4320);
                assert_eq!(args.partition, "slurm");
                assert_eq!(args.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
                assert!(args.retry_from.is_none());
                assert_eq!(args.input.log_every, 100);
            }
            _ => panic!("Expected Infer command"),
        }
    }

    #[test]
    fn test_infer_all_options() {
        let args = vec![
            "sam-forge",
            "-l",
            "debug",
            "infer",
            "--annotations",
            "a.json",
            "--image-root",
            "imgs",
            "--segmenter-cmd",
            "sam",
            "--njobs",
            "64",
            "--ngpus",
            "8",
            "--nodes",
            "2",
            "--timeout",
            "60",
            "--partition",
            "learnfair",
            "--comment",
            "deadline",
            "--exclude",
            "node01",
            "-o",
            "/scratch/run",
        ];
        let cli = Cli::try_parse_from(args).expect("should parse");
        assert_eq!(cli.log_level, "debug");

        match cli.command {
            Commands::Infer(args) => {
                assert_eq!(args.njobs, 64);
                assert_eq!(args.ngpus, 8);
                assert_eq!(args.nodes, 2);
                assert_eq!(args.timeout, 60);
                assert_eq!(args.partition, "learnfair");
                assert_eq!(args.comment.as_deref(), Some("deadline"));
                assert_eq!(args.exclude.as_deref(), Some("node01"));
                assert_eq!(args.output_dir, PathBuf::from("/scratch/run"));
            }
            _ => panic!("Expected Infer command"),
        }
    }

    #[test]
    fn test_worker_args() {
        let args = vec![
            "sam-forge",
            "worker",
            "--annotations",
            "a.json",
            "--image-root",
            "imgs",
            "--segmenter-cmd",
            "sam",
            "--chunk-file",
            "/out/chunks/r/chunk-0002.json",
            "--job-dir",
            "/out/jobs/%j",
        ];
        let cli = Cli::try_parse_from(args).expect("should parse");
        match cli.command {
            Commands::Worker(args) => {
                assert_eq!(args.job_dir, PathBuf::from("/out/jobs/%j"));
                assert_eq!(
                    args.chunk_file,
                    PathBuf::from("/out/chunks/r/chunk-0002.json")
                );
            }
            _ => panic!("Expected Worker command"),
        }
    }

    #[test]
    fn test_aggregate_alias_and_job_dirs() {
        let args = vec![
            "sam-forge",
            "agg",
            "--job-dir",
            "/a",
            "--job-dir",
            "/b",
        ];
        let cli = Cli::try_parse_from(args).expect("should parse with alias");
        match cli.command {
            Commands::Aggregate(args) => {
                assert_eq!(args.job_dirs, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
                assert!(args.out.is_none());
            }
            _ => panic!("Expected Aggregate command"),
        }
    }

    #[test]
    fn test_template_assistant_role() {
        let args = vec![
            "sam-forge",
            "template",
            "-i",
            "consolidated.json",
            "--assistant-role",
            "assistant",
        ];
        let cli = Cli::try_parse_from(args).expect("should parse");
        match cli.command {
            Commands::Template(args) => {
                assert_eq!(args.assistant_role, AssistantRole::Assistant);
                assert_eq!(args.output, PathBuf::from(DEFAULT_DATASET_FILE));
            }
            _ => panic!("Expected Template command"),
        }
    }

    /// Writes `n` one-pixel images, their annotation file and a segmenter
    /// script that answers every frame with one box.
    #[cfg(unix)]
    fn local_run_fixture(dir: &Path, n: usize) -> (PathBuf, PathBuf, PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let image_root = dir.join("images");
        std::fs::create_dir_all(&image_root).expect("mkdir");
        let mut images = Vec::new();
        let mut annotations = Vec::new();
        for i in 0..n {
            let name = format!("img{}.png", i);
            image::RgbImage::new(1, 1)
                .save(image_root.join(&name))
                .expect("save png");
            images.push(serde_json::json!({"id": i, "file_name": name}));
            annotations.push(serde_json::json!({
                "segments_info": [{"category_id": 1, "bbox": [0, 0, 1, 1]}]
            }));
        }
        let annotation_path = dir.join("panoptic.json");
        let file = serde_json::json!({
            "images": images,
            "annotations": annotations,
            "categories": [{"id": 1, "name": "thing"}]
        });
        std::fs::write(&annotation_path, serde_json::to_vec(&file).expect("json")).expect("write");

        let segmenter = dir.join("segmenter.sh");
        std::fs::write(
            &segmenter,
            "#!/bin/sh\nwhile read header; do head -c 3 > /dev/null; echo '{\"regions\": [{\"bbox\": [0, 0, 1, 1]}]}'; done\n",
        )
        .expect("write script");
        std::fs::set_permissions(&segmenter, std::fs::Permissions::from_mode(0o755))
            .expect("chmod");

        (annotation_path, image_root, segmenter)
    }

    #[cfg(unix)]
    fn infer_cli(
        annotations: &Path,
        image_root: &Path,
        segmenter: &Path,
        output_dir: &Path,
        extra: &[&str],
    ) -> InferArgs {
        let mut argv = vec![
            "sam-forge".to_string(),
            "infer".to_string(),
            "--annotations".to_string(),
            annotations.display().to_string(),
            "--image-root".to_string(),
            image_root.display().to_string(),
            "--segmenter-cmd".to_string(),
            segmenter.display().to_string(),
            "-o".to_string(),
            output_dir.display().to_string(),
            "--partition".to_string(),
            "local".to_string(),
            "--njobs".to_string(),
            "3".to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        match Cli::try_parse_from(argv).expect("should parse").command {
            Commands::Infer(args) => args,
            _ => panic!("Expected Infer command"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_infer_local_then_retry_missing() {
        use crate::scheduler::ChunkIndices;

        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let (annotations, image_root, segmenter) = local_run_fixture(temp_dir.path(), 5);
        let output_dir = temp_dir.path().join("out");
        let layout = OutputLayout::new(&output_dir);
        let job_dir = layout.job_dir("local-0000");

        run_infer_command(
            infer_cli(&annotations, &image_root, &segmenter, &output_dir, &[]),
            "info",
        )
        .await
        .expect("local infer should succeed");

        // Local mode ignores --njobs and runs one chunk covering everything.
        for i in 0..5 {
            assert!(job_dir.join(format!("img{}.json", i)).exists());
        }
        let manifests = DispatchManifest::load_all(&layout.dispatches_dir()).await;
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].scheduler, "local");
        assert_eq!(manifests[0].total_count, 5);
        assert_eq!(manifests[0].chunks.len(), 1);
        assert_eq!(
            manifests[0].chunks[0].indices,
            ChunkIndices::Range { start: 0, end: 5 }
        );

        std::fs::remove_file(job_dir.join("img1.json")).expect("remove");
        std::fs::remove_file(job_dir.join("img3.json")).expect("remove");
        let report_path = temp_dir.path().join("missing_indices.json");
        MissingReport {
            expected: 5,
            produced: 3,
            missing: vec![1, 3],
            missing_ranges: vec![[1, 2], [3, 4]],
        }
        .save(&report_path)
        .await
        .expect("save report");

        let retry_from = report_path.display().to_string();
        run_infer_command(
            infer_cli(
                &annotations,
                &image_root,
                &segmenter,
                &output_dir,
                &["--retry-from", &retry_from],
            ),
            "info",
        )
        .await
        .expect("retry should succeed");

        assert!(job_dir.join("img1.json").exists());
        assert!(job_dir.join("img3.json").exists());
        let manifests = DispatchManifest::load_all(&layout.dispatches_dir()).await;
        assert_eq!(manifests.len(), 2);
        assert!(manifests.iter().any(|m| m.chunks.len() == 1
            && m.chunks[0].indices == ChunkIndices::List { indices: vec![1, 3] }));
    }

    #[tokio::test]
    async fn test_infer_unreadable_retry_report_is_error() {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let annotations = temp_dir.path().join("panoptic.json");
        std::fs::write(
            &annotations,
            br#"{"images": [], "annotations": [], "categories": []}"#,
        )
        .expect("write");
        let missing = temp_dir.path().join("absent.json").display().to_string();
        let cli = Cli::try_parse_from(vec![
            "sam-forge".to_string(),
            "infer".to_string(),
            "--annotations".to_string(),
            annotations.display().to_string(),
            "--image-root".to_string(),
            temp_dir.path().display().to_string(),
            "--segmenter-cmd".to_string(),
            "sam".to_string(),
            "-o".to_string(),
            temp_dir.path().join("out").display().to_string(),
            "--partition".to_string(),
            "local".to_string(),
            "--retry-from".to_string(),
            missing,
        ])
        .expect("should parse");

        let result = run_with_cli(cli).await;
        let err = result.expect_err("missing report should fail");
        assert!(err.to_string().contains("missing-index report"));
    }

    #[test]
    fn test_template_default_role() {
        let cli = Cli::try_parse_from(vec!["sam-forge", "template", "-i", "c.json"])
            .expect("should parse");
        match cli.command {
            Commands::Template(args) => assert_eq!(args.assistant_role, AssistantRole::Gpt4),
            _ => panic!("Expected Template command"),
        }
    }
}
