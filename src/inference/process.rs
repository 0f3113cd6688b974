//! Segmenter backed by a long-lived model server process.
//!
//! Loading SAM weights takes far longer than segmenting one image, so the
//! model runs as one child process per chunk and is fed images over stdin.
//!
//! # Protocol
//!
//! For each image the parent writes one JSON header line followed by the raw
//! pixel buffer (`width * height * 3` bytes, row-major RGB):
//!
//! ```text
//! {"width": 640, "height": 480}\n
//! <921600 bytes>
//! ```
//!
//! The child answers with exactly one JSON line, either
//! `{"regions": [{"bbox": [...], "segmentation": {...}, ...}]}` or
//! `{"error": "message"}`. Child stderr is inherited so model logs end up in
//! the job log.

use std::process::Stdio;

use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{ProposedRegion, Segmenter};
use crate::error::InferenceError;

#[derive(Debug, Serialize)]
struct FrameHeader {
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Reply {
    Regions { regions: Vec<ProposedRegion> },
    Error { error: String },
}

struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// Runs `program args...` once and streams images to it.
pub struct ProcessSegmenter {
    program: String,
    args: Vec<String>,
    session: Mutex<Option<Session>>,
}

impl ProcessSegmenter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            session: Mutex::new(None),
        }
    }

    /// Splits a whitespace-separated command line into program and args.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    fn spawn(&self) -> Result<Session, InferenceError> {
        info!(program = %self.program, args = ?self.args, "Starting segmenter process");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                InferenceError::Model(format!("failed to spawn {}: {}", self.program, e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| InferenceError::Model("segmenter stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| InferenceError::Model("segmenter stdout not captured".to_string()))?;

        Ok(Session {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    async fn exchange(
        session: &mut Session,
        image: &RgbImage,
    ) -> Result<Option<String>, std::io::Error> {
        let (width, height) = image.dimensions();
        let mut header = serde_json::to_vec(&FrameHeader { width, height })?;
        header.push(b'\n');

        session.stdin.write_all(&header).await?;
        session.stdin.write_all(image.as_raw()).await?;
        session.stdin.flush().await?;

        session.stdout.next_line().await
    }
}

#[async_trait]
impl Segmenter for ProcessSegmenter {
    async fn segment(&self, image: &RgbImage) -> Result<Vec<ProposedRegion>, InferenceError> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            *guard = Some(self.spawn()?);
        }
        let session = guard
            .as_mut()
            .ok_or_else(|| InferenceError::Model("segmenter session missing".to_string()))?;

        let line = match Self::exchange(session, image).await {
            Ok(Some(line)) => line,
            Ok(None) => {
                let status = session.child.try_wait().ok().flatten();
                warn!(?status, "Segmenter process closed its output; will restart");
                *guard = None;
                return Err(InferenceError::Model(
                    "segmenter process exited".to_string(),
                ));
            }
            Err(e) => {
                warn!(error = %e, "Segmenter pipe failed; will restart");
                *guard = None;
                return Err(InferenceError::Model(format!("segmenter pipe error: {}", e)));
            }
        };

        match serde_json::from_str::<Reply>(&line) {
            Ok(Reply::Regions { regions }) => Ok(regions),
            Ok(Reply::Error { error }) => Err(InferenceError::Model(error)),
            Err(e) => {
                // Framing is lost once a reply fails to parse.
                *guard = None;
                Err(InferenceError::Model(format!(
                    "unparsable segmenter reply: {}",
                    e
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_command_line() {
        let seg = ProcessSegmenter::from_command_line("python -m sam_server --model vit_h")
            .expect("non-empty command");
        assert_eq!(seg.program, "python");
        assert_eq!(seg.args, vec!["-m", "sam_server", "--model", "vit_h"]);

        assert!(ProcessSegmenter::from_command_line("   ").is_none());
    }

    #[test]
    fn test_reply_parsing() {
        let ok: Reply = serde_json::from_str(r#"{"regions": [{"bbox": [0, 0, 1, 1]}]}"#)
            .expect("regions reply");
        assert!(matches!(ok, Reply::Regions { ref regions } if regions.len() == 1));

        let err: Reply = serde_json::from_str(r#"{"error": "boom"}"#).expect("error reply");
        assert!(matches!(err, Reply::Error { ref error } if error == "boom"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_segment_via_shell_server() {
        // Reads the header line and the 3-byte pixel, then replies once.
        let script = r#"read header; head -c 3 > /dev/null; echo '{"regions": [{"bbox": [0, 0, 1, 1], "area": 1}]}'"#;
        let seg = ProcessSegmenter::new("sh", vec!["-c".to_string(), script.to_string()]);

        let regions = seg
            .segment(&RgbImage::new(1, 1))
            .await
            .expect("segment should succeed");
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].extra.get("area"), Some(&serde_json::json!(1)));

        // The server exits after one reply; the next call surfaces a model error.
        let second = seg.segment(&RgbImage::new(1, 1)).await;
        assert!(matches!(second, Err(InferenceError::Model(_))));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_model_error() {
        let seg = ProcessSegmenter::new("/nonexistent/sam-server", vec![]);
        let result = seg.segment(&RgbImage::new(1, 1)).await;
        assert!(matches!(result, Err(InferenceError::Model(_))));
    }
}
