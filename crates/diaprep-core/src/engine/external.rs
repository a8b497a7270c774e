use std::process::Command;

use tracing::{debug, info};

use crate::consts::ENGINE_STDERR_TAIL_LINES;
use crate::error::{DiaError, Result};

use super::{CommandSpec, DiffEngine, EngineRequest, EngineVariant};

/// Runs the engine as a child process and waits for it.
#[derive(Clone, Debug)]
pub struct ExternalEngine {
    variant: EngineVariant,
    command: CommandSpec,
    name: String,
}

impl ExternalEngine {
    pub fn new(variant: EngineVariant, command: CommandSpec) -> Self {
        let name = format!("{} ({variant})", command.program);
        Self {
            variant,
            command,
            name,
        }
    }

    pub fn command(&self) -> &CommandSpec {
        &self.command
    }

    fn failure(&self, reason: String) -> DiaError {
        DiaError::Engine {
            variant: self.variant.to_string(),
            reason,
        }
    }
}

impl DiffEngine for ExternalEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn variant(&self) -> EngineVariant {
        self.variant
    }

    fn subtract(&self, request: &EngineRequest) -> Result<()> {
        let args = request.to_args()?;
        info!(
            program = %self.command.program,
            variant = %self.variant,
            input = %request.loc_data.display(),
            output = %request.loc_output.display(),
            "Starting subtraction engine"
        );
        debug!(args = ?args, "Engine arguments");

        let output = Command::new(&self.command.program)
            .args(&self.command.args)
            .args(&args)
            .output()
            .map_err(|e| {
                self.failure(format!("failed to start '{}': {e}", self.command.program))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            debug!(target: "diaprep::engine", "{line}");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failure(format!(
                "exited with {}; stderr:\n{}",
                output.status,
                stderr_tail(&stderr, ENGINE_STDERR_TAIL_LINES)
            )));
        }
        Ok(())
    }
}

/// Last `n` lines of `text`.
fn stderr_tail(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
