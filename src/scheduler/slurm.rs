//! Slurm backend: one `sbatch` submission per chunk.
//!
//! The chunk assignment is written to `chunks/<run_id>/chunk-NNNN.json` on
//! the shared filesystem, then a batch script is rendered and piped to
//! `sbatch --parsable`. The script runs the worker subcommand exactly once
//! per job, with `--job-dir <output_dir>/jobs/%j`; the worker substitutes
//! `%j` from `SLURM_JOB_ID` when it starts.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tera::{Context, Tera};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::job::{ChunkSpec, JobHandle};
use super::resources::ResourceSpec;
use super::JobScheduler;
use crate::error::SchedulerError;
use crate::pipeline::OutputLayout;

const SBATCH_TEMPLATE: &str = r#"#!/bin/bash
#SBATCH --job-name={{ job_name }}
#SBATCH --partition={{ partition }}
#SBATCH --nodes={{ nodes }}
#SBATCH --ntasks-per-node={{ tasks_per_node }}
{% if gpus_per_node > 0 %}#SBATCH --gpus-per-node={{ gpus_per_node }}
{% endif %}#SBATCH --cpus-per-task={{ cpus_per_task }}
#SBATCH --mem={{ mem_gb }}G
#SBATCH --time={{ timeout_min }}
#SBATCH --signal=USR2@{{ signal_delay_s }}
#SBATCH --output={{ log_path }}
#SBATCH --error={{ log_path }}
{% if comment %}#SBATCH --comment="{{ comment }}"
{% endif %}{% if exclude %}#SBATCH --exclude={{ exclude }}
{% endif %}
exec {{ command }}
"#;

/// Program and leading arguments that start a chunk worker.
///
/// The scheduler appends `--chunk-file` and `--job-dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Renders the full command line with every word shell-quoted.
    pub fn to_shell(&self, extra: &[String]) -> String {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .chain(extra.iter().cloned())
            .map(|word| shell_quote(&word))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Submits chunks with `sbatch`.
pub struct SlurmScheduler {
    layout: OutputLayout,
    worker: WorkerCommand,
    submit_program: String,
    submit_args: Vec<String>,
}

impl SlurmScheduler {
    pub fn new(layout: OutputLayout, worker: WorkerCommand) -> Self {
        Self {
            layout,
            worker,
            submit_program: "sbatch".to_string(),
            submit_args: vec!["--parsable".to_string()],
        }
    }

    /// Replaces the submission command. The script is always fed on stdin.
    pub fn with_submit_command(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.submit_program = program.into();
        self.submit_args = args;
        self
    }

    pub fn chunk_path(&self, run_id: &str, chunk: &ChunkSpec) -> PathBuf {
        self.layout
            .chunks_dir()
            .join(run_id)
            .join(format!("chunk-{:04}.json", chunk.chunk_index))
    }

    /// Renders the batch script for one chunk.
    pub fn render_script(
        &self,
        chunk_file: &Path,
        resources: &ResourceSpec,
    ) -> Result<String, SchedulerError> {
        let extra = vec![
            "--chunk-file".to_string(),
            chunk_file.to_string_lossy().into_owned(),
            "--job-dir".to_string(),
            self.layout.job_dir_template().to_string_lossy().into_owned(),
        ];

        let mut context = Context::new();
        context.insert("job_name", &resources.job_name);
        context.insert("partition", &resources.partition);
        context.insert("nodes", &resources.nodes);
        context.insert("tasks_per_node", &resources.tasks_per_node);
        context.insert("gpus_per_node", &resources.gpus_per_node);
        context.insert("cpus_per_task", &resources.cpus_per_task);
        context.insert("mem_gb", &resources.mem_gb());
        context.insert("timeout_min", &resources.timeout_min);
        context.insert("signal_delay_s", &resources.signal_delay_s);
        context.insert("comment", &resources.comment);
        context.insert("exclude", &resources.exclude);
        context.insert(
            "log_path",
            &self.layout.logs_dir().join("%j.out").to_string_lossy(),
        );
        context.insert("command", &self.worker.to_shell(&extra));

        Ok(Tera::one_off(SBATCH_TEMPLATE, &context, false)?)
    }

    async fn run_submit(&self, chunk: &ChunkSpec, script: &str) -> Result<String, SchedulerError> {
        let mut child = Command::new(&self.submit_program)
            .args(&self.submit_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SchedulerError::Spawn {
                program: self.submit_program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(script.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = if stderr.trim().is_empty() {
                format!("{} exited with {}", self.submit_program, output.status)
            } else {
                stderr.trim().to_string()
            };
            return Err(SchedulerError::Rejected {
                chunk: chunk.chunk_index,
                reason,
            });
        }

        parse_job_id(&stdout)
    }
}

#[async_trait]
impl JobScheduler for SlurmScheduler {
    fn name(&self) -> &str {
        "slurm"
    }

    async fn submit(
        &self,
        run_id: &str,
        chunk: &ChunkSpec,
        resources: &ResourceSpec,
    ) -> Result<JobHandle, SchedulerError> {
        let chunk_file = self.chunk_path(run_id, chunk);
        chunk.save(&chunk_file).await?;
        fs::create_dir_all(self.layout.logs_dir()).await?;

        let script = self.render_script(&chunk_file, resources)?;
        debug!(chunk = chunk.chunk_index, script = %script, "Rendered batch script");

        let job_id = self.run_submit(chunk, &script).await?;
        let output_dir = self.layout.job_dir(&job_id);
        Ok(JobHandle::submitted(job_id, chunk.clone(), output_dir))
    }
}

static JOB_ID_RE: OnceLock<Option<Regex>> = OnceLock::new();

/// Extracts the numeric job id from `sbatch --parsable` output
/// (`<id>` or `<id>;<cluster>`).
pub fn parse_job_id(stdout: &str) -> Result<String, SchedulerError> {
    let re = JOB_ID_RE
        .get_or_init(|| Regex::new(r"^\s*(\d+)").ok())
        .as_ref()
        .ok_or_else(|| SchedulerError::UnparsableJobId(stdout.to_string()))?;
    re.captures(stdout)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| SchedulerError::UnparsableJobId(stdout.trim().to_string()))
}

/// Quotes `word` for a POSIX shell unless it is made only of safe characters.
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=@%+,".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
