//! Typed build steps.
//!
//! Each step is selected by its `step` tag and carries its own options:
//!
//! ```toml
//! build = [
//!     { step = "copy", from = "images", to = "images" },
//!     { step = "command", program = "hugo", args = ["--minify"] },
//!     { step = "move", from = "_code/scripts", to = "assets/scripts" },
//!     { step = "clean", path = "_code" },
//! ]
//! ```

use crate::fs::{key_to_path, normalize_key, remove_path};
use crate::utils::errors::{io_err, Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directories a step operates on.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// The mirrored source tree (read only)
    pub source: PathBuf,
    /// The output tree being built
    pub output: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum BuildStep {
    Copy(CopyOptions),
    Move(MoveOptions),
    Clean(CleanOptions),
    Command(CommandOptions),
}

impl BuildStep {
    pub fn name(&self) -> &'static str {
        match self {
            BuildStep::Copy(_) => "copy",
            BuildStep::Move(_) => "move",
            BuildStep::Clean(_) => "clean",
            BuildStep::Command(_) => "command",
        }
    }

    pub async fn run(&self, ctx: &StepContext) -> Result<()> {
        debug!("Running build step {}", self.name());
        match self {
            BuildStep::Copy(options) => options.run(ctx).await,
            BuildStep::Move(options) => options.run(ctx).await,
            BuildStep::Clean(options) => options.run(ctx).await,
            BuildStep::Command(options) => options.run(ctx).await,
        }
    }
}

/// Resolve a configured relative path below `root`, rejecting escapes.
fn resolve(root: &Path, raw: &str, step: &str) -> Result<PathBuf> {
    let key = normalize_key(raw).ok_or_else(|| {
        SyncError::Build(format!("{}: invalid path {:?}", step, raw))
    })?;
    Ok(key_to_path(root, &key))
}

/// Copy `from` in the source tree to `to` in the output tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyOptions {
    pub from: String,
    pub to: String,
}

impl CopyOptions {
    async fn run(&self, ctx: &StepContext) -> Result<()> {
        let from = resolve(&ctx.source, &self.from, "copy")?;
        let to = resolve(&ctx.output, &self.to, "copy")?;

        let copied = tokio::task::spawn_blocking(move || copy_tree(&from, &to)).await??;
        info!("Copied {} files from {} to {}", copied, self.from, self.to);
        Ok(())
    }
}

/// Copy a file or directory tree, returning the number of files copied.
pub(crate) fn copy_tree(from: &Path, to: &Path) -> Result<usize> {
    use crate::fs::walker::{walk_files, WalkOptions};

    let metadata = std::fs::metadata(from).map_err(|e| io_err(from, e))?;
    if metadata.is_file() {
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        std::fs::copy(from, to).map_err(|e| io_err(from, e))?;
        return Ok(1);
    }

    copy_files(from, to, &walk_files(from, &WalkOptions::default()))
}

pub(crate) fn copy_files(
    from: &Path,
    to: &Path,
    files: &[crate::fs::walker::FileInfo],
) -> Result<usize> {
    std::fs::create_dir_all(to).map_err(|e| io_err(to, e))?;
    for file in files {
        let target = key_to_path(to, &file.key);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        std::fs::copy(&file.path, &target).map_err(|e| io_err(&file.path, e))?;
    }
    debug!("Copied {} -> {}", from.display(), to.display());
    Ok(files.len())
}

/// Move `from` to `to`, both inside the output tree. `to` is replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOptions {
    pub from: String,
    pub to: String,
}

impl MoveOptions {
    async fn run(&self, ctx: &StepContext) -> Result<()> {
        let from = resolve(&ctx.output, &self.from, "move")?;
        let to = resolve(&ctx.output, &self.to, "move")?;

        if tokio::fs::symlink_metadata(&from).await.is_err() {
            debug!("move: {} does not exist, nothing to do", self.from);
            return Ok(());
        }
        if to.starts_with(&from) {
            return Err(SyncError::Build(format!(
                "move: cannot move {} into itself ({})",
                self.from, self.to
            )));
        }

        remove_path(&to).await?;
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err(parent, e))?;
        }
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| io_err(&from, e))?;

        info!("Moved {} to {}", self.from, self.to);
        Ok(())
    }
}

/// Remove `path` from the output tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanOptions {
    pub path: String,
}

impl CleanOptions {
    async fn run(&self, ctx: &StepContext) -> Result<()> {
        let path = resolve(&ctx.output, &self.path, "clean")?;
        remove_path(&path).await?;
        info!("Cleaned {}", self.path);
        Ok(())
    }
}

/// Run an external program with the output tree as working directory.
///
/// `SITE_SYNC_SOURCE` and `SITE_SYNC_OUTPUT` are set in its environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOptions {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandOptions {
    async fn run(&self, ctx: &StepContext) -> Result<()> {
        info!("Running {} {}", self.program, self.args.join(" "));

        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .current_dir(&ctx.output)
            .env("SITE_SYNC_SOURCE", &ctx.source)
            .env("SITE_SYNC_OUTPUT", &ctx.output)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SyncError::Build(format!("failed to start {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(20).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(SyncError::Build(format!(
                "{} exited with {}:\n{}",
                self.program,
                output.status,
                tail.join("\n")
            )));
        }

        Ok(())
    }
}
