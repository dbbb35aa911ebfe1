//! Persistent build service
//!
//! One JSON request per line on stdin, one JSON response per line on
//! stdout. The service holds a [`ProjectCache`] across requests, which is
//! the whole point of keeping it resident: an unchanged rebuild skips
//! every parse. A malformed request or an internal failure produces a
//! failed response and the loop keeps going.

use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::diagnostics::{reportable, Diagnostic};
use crate::project::ProjectCache;

/// One build request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BuildRequest {
    pub project_file: String,
    pub out_file: String,
}

/// One build response
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BuildResponse {
    pub success: bool,
    pub elapsed_ms: u64,
    pub diagnostics: Vec<Diagnostic>,
}

impl BuildResponse {
    fn failed() -> Self {
        Self {
            success: false,
            elapsed_ms: 0,
            diagnostics: Vec::new(),
        }
    }
}

/// The resident build service
#[derive(Default)]
pub struct BuildService {
    cache: ProjectCache,
}

impl BuildService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &ProjectCache {
        &self.cache
    }

    /// Handle one build request
    pub fn handle(&mut self, request: &BuildRequest) -> BuildResponse {
        let started = Instant::now();

        let output = match self.cache.build(Path::new(&request.project_file)) {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(project = %request.project_file, %err, "build failed");
                return BuildResponse::failed();
            }
        };

        let (diagnostics, failed) = reportable(output.diagnostics);
        let success = if failed {
            false
        } else {
            match std::fs::write(&request.out_file, output.image.encode()) {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(out = %request.out_file, %err, "image write failed");
                    false
                }
            }
        };

        BuildResponse {
            success,
            elapsed_ms: elapsed_ms(started.elapsed()),
            diagnostics,
        }
    }

    /// Handle one request line; malformed input answers a failed response
    pub fn handle_line(&mut self, line: &str) -> BuildResponse {
        match serde_json::from_str::<BuildRequest>(line) {
            Ok(request) => {
                tracing::info!(project = %request.project_file, "compiling");
                self.handle(&request)
            }
            Err(err) => {
                tracing::warn!(%err, "malformed request");
                BuildResponse::failed()
            }
        }
    }

    /// Run the request loop until the input stream closes
    pub fn run(&mut self, input: impl BufRead, mut output: impl Write) -> std::io::Result<()> {
        for line in input.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let response = self.handle_line(&line);
            let json = serde_json::to_string(&response)
                .unwrap_or_else(|_| r#"{"Success":false,"ElapsedMs":0,"Diagnostics":[]}"#.into());
            writeln!(output, "{json}")?;
            output.flush()?;
        }
        Ok(())
    }
}

/// Wall-clock duration as rounded milliseconds
fn elapsed_ms(elapsed: Duration) -> u64 {
    (elapsed.as_secs_f64() * 1000.0).round() as u64
}
