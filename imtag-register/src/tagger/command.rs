//! External-command tagger
//!
//! Runs an inference program once per image. The image bytes are written to
//! the program's stdin and a JSON object is expected on stdout:
//!
//! ```json
//! {"general": [["1girl", 0.79], ["cardigan", 2.32]], "rating": [["rating_safe", 3.21]]}
//! ```
//!
//! Scores below the configured threshold are dropped.

use super::{Tagger, TaggerError};
use crate::models::TaggerResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Raw program output: category → (tag, score) pairs
type RawTags = BTreeMap<String, Vec<(String, f32)>>;

/// Tagger backed by an external inference program
pub struct CommandTagger {
    program: String,
    args: Vec<String>,
    threshold: f32,
    initialized: bool,
}

impl CommandTagger {
    pub fn new(program: impl Into<String>, args: Vec<String>, threshold: f32) -> Self {
        Self {
            program: program.into(),
            args,
            threshold,
            initialized: false,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).kill_on_drop(true);
        command
    }

    /// Parse program stdout into a thresholded result
    fn parse_output(&self, stdout: &[u8]) -> Result<TaggerResult, TaggerError> {
        let raw: RawTags = serde_json::from_slice(stdout)
            .map_err(|e| TaggerError::TaggingFailed(format!("Invalid tagger output: {}", e)))?;
        Ok(TaggerResult::from_scores(raw, self.threshold))
    }
}

#[async_trait]
impl Tagger for CommandTagger {
    /// Check the program can be started
    async fn initialize(&mut self) -> Result<(), TaggerError> {
        let mut child = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => TaggerError::InitializationFailed(format!(
                    "Tagger program not found: {}",
                    self.program
                )),
                _ => TaggerError::InitializationFailed(format!(
                    "Failed to start {}: {}",
                    self.program, e
                )),
            })?;

        // Only the spawn matters here
        let _ = child.start_kill();
        let _ = child.wait().await;

        self.initialized = true;
        info!(
            program = %self.program,
            threshold = self.threshold,
            "Command tagger initialized"
        );
        Ok(())
    }

    async fn tag(&self, image_binary: &[u8]) -> Result<TaggerResult, TaggerError> {
        if !self.initialized {
            return Err(TaggerError::NotInitialized);
        }

        let format = image::guess_format(image_binary)
            .map_err(|e| TaggerError::UnsupportedFormat(e.to_string()))?;

        debug!(program = %self.program, ?format, bytes = image_binary.len(), "Running tagger");

        let mut child = self
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TaggerError::TaggingFailed(format!("Failed to start {}: {}", self.program, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| TaggerError::TaggingFailed("Tagger stdin unavailable".to_string()))?;

        // Feed stdin concurrently so a chatty program cannot deadlock on a full stdout pipe
        let payload = image_binary.to_vec();
        let writer = tokio::spawn(async move {
            stdin.write_all(&payload).await?;
            stdin.shutdown().await
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| TaggerError::TaggingFailed(format!("Tagger did not finish: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TaggerError::TaggingFailed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        match writer.await {
            Ok(Ok(())) => {}
            // The program answered without consuming the whole image
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!(program = %self.program, "Tagger closed stdin early");
            }
            Ok(Err(e)) => {
                return Err(TaggerError::TaggingFailed(format!(
                    "Failed to send image to tagger: {}",
                    e
                )))
            }
            Err(e) => return Err(TaggerError::TaggingFailed(e.to_string())),
        }

        self.parse_output(&output.stdout)
    }
}
