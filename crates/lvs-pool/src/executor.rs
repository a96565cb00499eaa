//! Applying command batches to the forwarding table

use async_trait::async_trait;
use lvs_core::{ExecutorConfig, LvsError, Result};
use parking_lot::Mutex;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::command::IpvsCommand;

/// Applies a batch of commands, in order, to the kernel table
#[async_trait]
pub trait TableExecutor: Send + Sync {
    async fn apply(&self, commands: &[IpvsCommand]) -> Result<()>;
}

/// Feeds batches to `ipvsadm -R`, one command per line
#[derive(Debug, Clone, Default)]
pub struct IpvsadmExecutor {
    config: ExecutorConfig,
}

impl IpvsadmExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    async fn restore(&self, input: &str) -> Result<()> {
        let path = &self.config.ipvsadm_path;
        let mut child = Command::new(path)
            .arg("-R")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LvsError::TableApply(format!("cannot run {}: {}", path, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|e| LvsError::TableApply(format!("writing to {} failed: {}", path, e)))?;
            // Closing stdin ends the restore input
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| LvsError::TableApply(format!("waiting for {} failed: {}", path, e)))?;

        if !output.status.success() {
            return Err(LvsError::TableApply(format!(
                "{} -R exited with {}: {}",
                path,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TableExecutor for IpvsadmExecutor {
    #[instrument(skip(self, commands), fields(count = commands.len()))]
    async fn apply(&self, commands: &[IpvsCommand]) -> Result<()> {
        if commands.is_empty() {
            return Ok(());
        }

        let lines: Vec<String> = commands.iter().map(ToString::to_string).collect();
        if self.config.debug {
            info!(commands = ?lines, "ipvsadm command batch");
        }
        if self.config.dry_run {
            debug!(commands = lines.len(), "Dry run, table left untouched");
            return Ok(());
        }

        let mut input = lines.join("\n");
        input.push('\n');
        self.restore(&input).await
    }
}

/// Captures rendered batches instead of applying them
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    batches: Mutex<Vec<Vec<String>>>,
    failing: AtomicBool,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later batch fail with `TableApply` after being recorded
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().clone()
    }

    pub fn last_batch(&self) -> Option<Vec<String>> {
        self.batches.lock().last().cloned()
    }

    /// All recorded commands in application order
    pub fn commands(&self) -> Vec<String> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    pub fn clear(&self) {
        self.batches.lock().clear();
    }
}

#[async_trait]
impl TableExecutor for RecordingExecutor {
    async fn apply(&self, commands: &[IpvsCommand]) -> Result<()> {
        self.batches
            .lock()
            .push(commands.iter().map(ToString::to_string).collect());

        if self.failing.load(Ordering::SeqCst) {
            return Err(LvsError::TableApply("recorded failure".to_string()));
        }
        Ok(())
    }
}
