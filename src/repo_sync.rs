//! Keeps the local clone of the blog repository present and reasonably fresh.
//!
//! Workflow:
//! 1. Path absent → create it and `git clone` into it. Failure is fatal and
//!    the half-created directory is removed so the next run clones again.
//! 2. Path present and last modified more than `refresh_after` ago →
//!    `git pull`. Failure is logged and the existing checkout is used as-is.
//! 3. Otherwise leave it alone.
//!
//! The content subdirectory's size is printed either way.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, SystemTime};

use crate::config::RepositoryConfig;
use crate::error::RagError;
use crate::stats;

/// What [`plan`] decided to do with the local path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPlan {
    Clone,
    Refresh,
    UpToDate,
}

/// What actually happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Cloned,
    Refreshed,
    /// The refresh failed; the previous checkout is being used.
    RefreshFailed(String),
    UpToDate,
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    pub content_dir: PathBuf,
}

/// Decide between cloning, refreshing, and doing nothing, using the path's
/// modification time relative to `now`.
pub fn plan(path: &Path, now: SystemTime, max_age: Duration) -> Result<SyncPlan> {
    if !path.exists() {
        return Ok(SyncPlan::Clone);
    }

    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to read modification time of {}", path.display()))?;

    let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
    if age > max_age {
        Ok(SyncPlan::Refresh)
    } else {
        Ok(SyncPlan::UpToDate)
    }
}

/// Ensure the checkout exists and is fresh, then report the content size.
pub fn sync_repository(config: &RepositoryConfig) -> Result<SyncReport> {
    sync_repository_at(config, SystemTime::now())
}

/// [`sync_repository`] with an explicit clock.
pub fn sync_repository_at(config: &RepositoryConfig, now: SystemTime) -> Result<SyncReport> {
    let path = &config.path;

    let outcome = match plan(path, now, config.refresh_after())? {
        SyncPlan::Clone => {
            println!("Cloning the blogging repository");
            git_clone(&config.url, path)?;
            SyncOutcome::Cloned
        }
        SyncPlan::Refresh => {
            println!("Pulling the latest changes from the blogging repository");
            match git_pull(path) {
                Ok(()) => {
                    touch(path, now);
                    SyncOutcome::Refreshed
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %format!("{:#}", e),
                        "repository refresh failed, using the existing checkout"
                    );
                    SyncOutcome::RefreshFailed(format!("{:#}", e))
                }
            }
        }
        SyncPlan::UpToDate => {
            tracing::debug!(path = %path.display(), "checkout is recent, not refreshing");
            SyncOutcome::UpToDate
        }
    };

    let content_dir = config.content_dir();
    stats::print_dir_size("Size of the blogging directory:", &content_dir);

    Ok(SyncReport {
        outcome,
        content_dir,
    })
}

fn git_clone(url: &str, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create clone directory: {}", dest.display()))?;

    let result = Command::new("git")
        .arg("clone")
        .arg(url)
        .arg(dest)
        .output()
        .with_context(|| "Failed to execute 'git clone'. Is git installed?")
        .and_then(|output| {
            if output.status.success() {
                Ok(())
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(RagError::CloneFailed(stderr.trim().to_string()).into())
            }
        });

    if result.is_err() {
        if let Err(e) = std::fs::remove_dir_all(dest) {
            tracing::warn!(path = %dest.display(), error = %e, "could not remove failed clone");
        }
    }
    result
}

fn git_pull(repo_dir: &Path) -> Result<()> {
    // Without this check git would walk up and pull whatever repository
    // encloses the directory.
    if !repo_dir.join(".git").exists() {
        anyhow::bail!("{} is not a git checkout", repo_dir.display());
    }

    let output = Command::new("git")
        .arg("pull")
        .current_dir(repo_dir)
        .output()
        .with_context(|| "Failed to execute 'git pull'")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("git pull failed: {}", stderr.trim());
    }
    Ok(())
}

/// Mark the checkout as refreshed at `now`. `git pull` does not necessarily
/// change the top-level directory's mtime.
fn touch(path: &Path, now: SystemTime) {
    let result = File::open(path).and_then(|f| f.set_modified(now));
    if let Err(e) = result {
        tracing::debug!(path = %path.display(), error = %e, "could not update checkout mtime");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    #[test]
    fn test_plan_missing_path_clones() {
        let tmp = tempfile::TempDir::new().unwrap();
        let plan = plan(&tmp.path().join("blog"), SystemTime::now(), 24 * HOUR).unwrap();
        assert_eq!(plan, SyncPlan::Clone);
    }

    #[test]
    fn test_plan_refreshes_after_threshold() {
        let tmp = tempfile::TempDir::new().unwrap();
        let now = SystemTime::now();
        assert_eq!(
            plan(tmp.path(), now + 25 * HOUR, 24 * HOUR).unwrap(),
            SyncPlan::Refresh
        );
        assert_eq!(
            plan(tmp.path(), now + HOUR, 24 * HOUR).unwrap(),
            SyncPlan::UpToDate
        );
    }

    #[test]
    fn test_plan_clock_behind_mtime_is_up_to_date() {
        let tmp = tempfile::TempDir::new().unwrap();
        let past = SystemTime::now() - 48 * HOUR;
        assert_eq!(plan(tmp.path(), past, 24 * HOUR).unwrap(), SyncPlan::UpToDate);
    }

    #[test]
    fn test_failed_refresh_is_not_fatal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = RepositoryConfig {
            path: tmp.path().to_path_buf(),
            ..RepositoryConfig::default()
        };

        let report = sync_repository_at(&config, SystemTime::now() + 25 * HOUR).unwrap();
        match report.outcome {
            SyncOutcome::RefreshFailed(reason) => assert!(reason.contains("not a git checkout")),
            other => panic!("expected RefreshFailed, got {:?}", other),
        }
        assert_eq!(report.content_dir, tmp.path().join("_posts"));
    }

    #[test]
    fn test_recent_checkout_left_alone() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = RepositoryConfig {
            path: tmp.path().to_path_buf(),
            ..RepositoryConfig::default()
        };
        let report = sync_repository_at(&config, SystemTime::now() + HOUR).unwrap();
        assert_eq!(report.outcome, SyncOutcome::UpToDate);
    }

    #[test]
    fn test_failed_clone_is_fatal_and_cleans_up() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dest = tmp.path().join("blog");
        let config = RepositoryConfig {
            url: tmp.path().join("no-such-remote").display().to_string(),
            path: dest.clone(),
            ..RepositoryConfig::default()
        };

        assert!(sync_repository(&config).is_err());
        assert!(!dest.exists());
    }
}
