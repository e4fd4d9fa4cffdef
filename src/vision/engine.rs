//! Recognition engine adapters
//!
//! The OCR engine itself is an external collaborator. These adapters either
//! read detections that were produced ahead of time, or run an external
//! recognizer process that prints its detections as JSON.

use anyhow::{bail, Context, Result};
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::debug;

use super::fragment::RawDetection;

/// Anything that turns page image bytes into raw detections
pub trait RecognitionEngine {
    fn recognize(&self, image: &[u8]) -> Result<Vec<RawDetection>>;
}

/// Parse a JSON detection list
pub fn parse_detections(json: &[u8]) -> Result<Vec<RawDetection>> {
    serde_json::from_slice(json).context("Failed to parse recognition output as a detection list")
}

/// Engine whose "image" bytes already are a JSON detection list
///
/// Used when recognition ran upstream and the page arrives as its output.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDetectionsEngine;

impl RecognitionEngine for JsonDetectionsEngine {
    fn recognize(&self, image: &[u8]) -> Result<Vec<RawDetection>> {
        parse_detections(image)
    }
}

/// Engine backed by an external recognizer process
///
/// Image bytes go to the process on stdin, a JSON detection list is expected
/// on stdout.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
}

impl CommandEngine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a whitespace-separated command line
    pub fn from_command_line(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().context("Recognition command is empty")?;
        Ok(Self::new(program, parts.collect()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl RecognitionEngine for CommandEngine {
    fn recognize(&self, image: &[u8]) -> Result<Vec<RawDetection>> {
        debug!("Running recognizer '{}' on {} bytes", self.program, image.len());
        let stdout = run_with_stdin(&self.program, &self.args, image)?;
        parse_detections(&stdout)
    }
}

/// Run a process, feed `input` on stdin and collect stdout
pub(crate) fn run_with_stdin(program: &str, args: &[String], input: &[u8]) -> Result<Vec<u8>> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to start '{}'", program))?;

    let mut stdin = child.stdin.take().context("Child stdin unavailable")?;
    let payload = input.to_vec();
    // Fed from its own thread while stdout is drained below
    let writer = std::thread::spawn(move || stdin.write_all(&payload));

    let output = child
        .wait_with_output()
        .with_context(|| format!("Failed to wait for '{}'", program))?;

    match writer.join() {
        Ok(result) => result.with_context(|| format!("Failed to write input to '{}'", program))?,
        Err(_) => bail!("Input writer for '{}' panicked", program),
    }

    if !output.status.success() {
        bail!(
            "'{}' exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(output.stdout)
}
