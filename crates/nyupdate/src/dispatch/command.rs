//! Add-action backed by an external program.

use std::process::Stdio;

use async_trait::async_trait;
use snafu::prelude::*;
use tokio::process::Command;
use tracing::debug;

use super::AddAction;
use crate::error::{AddError, ExitStatusSnafu, SpawnSnafu};

/// Runs `program args... <item_key>` and treats exit status 0 as success.
///
/// The default is `transmission-remote --add <url>`.
#[derive(Debug, Clone)]
pub struct CommandAction {
    program: String,
    args: Vec<String>,
}

impl CommandAction {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a `[program, args...]` list. Returns `None` when empty.
    pub fn from_command_line(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

#[async_trait]
impl AddAction for CommandAction {
    async fn add(&self, item_key: &str) -> Result<(), AddError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(item_key)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .context(SpawnSnafu {
                program: &self.program,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(
            program = %self.program,
            item = item_key,
            status = ?output.status.code(),
            stdout = stdout.trim(),
            stderr = stderr.trim(),
            "Dispatch command finished"
        );

        ensure!(
            output.status.success(),
            ExitStatusSnafu {
                program: &self.program,
                code: output.status.code(),
            }
        );
        Ok(())
    }
}
