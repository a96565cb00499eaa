//! Probe that runs an external command

use async_trait::async_trait;
use lvs_core::{LvsError, MonitorConfig, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::monitor::Probe;
use crate::types::ProbeOutcome;

/// Exit status 0 is up; any other exit or a signal is down.
///
/// The child is killed if the check is cancelled or times out.
#[derive(Debug, Clone)]
pub struct RunCommandProbe {
    command: String,
    arguments: Vec<String>,
    log_output: bool,
}

impl RunCommandProbe {
    pub const NAME: &'static str = "RunCommand";

    pub fn new(command: impl Into<String>, arguments: Vec<String>) -> Self {
        Self {
            command: command.into(),
            arguments,
            log_output: true,
        }
    }

    /// Options `runcommand.command`, `runcommand.arguments` and
    /// `runcommand.log-output`. Missing or empty arguments mean none;
    /// malformed ones are an error.
    pub fn from_config(config: &MonitorConfig<'_>) -> Result<Self> {
        let command = config.get_string("command")?;
        let arguments = config.get_optional_string_list("arguments")?;
        let log_output = config.get_bool("log-output", Some(true))?;

        Ok(Self {
            command,
            arguments,
            log_output,
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }
}

fn escape_control(text: &str) -> String {
    text.replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

#[async_trait]
impl Probe for RunCommandProbe {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn default_interval(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_secs(20)
    }

    #[instrument(skip(self), fields(command = %self.command))]
    async fn probe(&self) -> Result<ProbeOutcome> {
        let output = Command::new(&self.command)
            .args(&self.arguments)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| LvsError::ProbeFault(format!("cannot run {}: {}", self.command, e)))?;

        if self.log_output && !output.stdout.is_empty() {
            debug!(
                stdout = %escape_control(&String::from_utf8_lossy(&output.stdout)),
                "Command output"
            );
        }

        if output.status.success() {
            return Ok(ProbeOutcome::Up);
        }
        Ok(ProbeOutcome::Down(match output.status.code() {
            Some(code) => format!("Command {} exited with status {}", self.command, code),
            None => format!("Command {} was terminated by a signal", self.command),
        }))
    }
}
