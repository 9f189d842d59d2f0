//! Turns a mirrored source tree into the tree that gets published.

pub mod steps;

use crate::fs::reset_dir;
use crate::fs::walker::{walk_files, WalkOptions};
use crate::mirror::cursor::CURSOR_FILE;
use crate::utils::Result;
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

pub use steps::{BuildStep, CleanOptions, CommandOptions, CopyOptions, MoveOptions, StepContext};

#[async_trait]
pub trait Builder: Send + Sync {
    /// Produce `destination` from `source`. `source` must not be modified.
    async fn build(&self, source: &Path, destination: &Path) -> Result<()>;
}

/// Resets the output, copies the source into it, then runs the steps in order.
#[derive(Debug, Clone, Default)]
pub struct StepPipeline {
    steps: Vec<BuildStep>,
}

impl StepPipeline {
    pub fn from_steps(steps: impl IntoIterator<Item = BuildStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }
}

#[async_trait]
impl Builder for StepPipeline {
    async fn build(&self, source: &Path, destination: &Path) -> Result<()> {
        reset_dir(destination).await?;

        let from = source.to_path_buf();
        let to = destination.to_path_buf();
        let copied = tokio::task::spawn_blocking(move || {
            let files = walk_files(&from, &WalkOptions::skipping([CURSOR_FILE]));
            steps::copy_files(&from, &to, &files)
        })
        .await??;
        info!("Staged {} files into {}", copied, destination.display());

        let ctx = StepContext {
            source: source.to_path_buf(),
            output: destination.to_path_buf(),
        };
        for step in &self.steps {
            step.run(&ctx).await?;
        }

        Ok(())
    }
}
