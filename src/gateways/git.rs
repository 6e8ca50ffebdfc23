//! Git gateway backed by the `git` command line.
//!
//! Every failed command surfaces a single error joining stderr and the exit
//! status, so workflow progress events carry the underlying git message.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::GitConfig;
use crate::errors::GatewayError;

use super::GitCli;

pub struct GitCommandLine {
    cfg: GitConfig,
}

impl GitCommandLine {
    /// Verify the tool is present and set the global identity used for
    /// automation commits. Run once at startup.
    pub async fn global_setup(cfg: GitConfig) -> Result<Self, GatewayError> {
        run(Command::new("git").arg("version"), "checking git version").await?;
        run(
            Command::new("git").args(["config", "--global", "user.email", "devportal@tempo.com.vc"]),
            "setting git user email",
        )
        .await?;
        run(
            Command::new("git").args(["config", "--global", "user.name", "devportal"]),
            "setting git user name",
        )
        .await?;
        run(
            Command::new("git").args(["config", "--global", "pull.rebase", "true"]),
            "setting git pull rebase",
        )
        .await?;
        Ok(Self { cfg })
    }

    /// Build an adapter without touching global git config (tests).
    #[cfg(test)]
    pub fn unconfigured(cfg: GitConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl GitCli for GitCommandLine {
    async fn clone_repository(
        &self,
        repository: &str,
        branch: &str,
        path: &Path,
    ) -> Result<(), GatewayError> {
        let url = self.cfg.remote_url(repository);
        run(
            Command::new("git")
                .args(["clone", "-b", branch, url.as_str()])
                .arg(path),
            &format!("cloning {url} repository"),
        )
        .await
    }

    async fn checkout(&self, path: &Path, branch: &str) -> Result<(), GatewayError> {
        run(
            Command::new("git").args(["checkout", branch]).current_dir(path),
            &format!("checking out to {branch} branch"),
        )
        .await
    }

    async fn branch(&self, path: &Path, branch: &str) -> Result<(), GatewayError> {
        run(
            Command::new("git")
                .args(["checkout", "-b", branch])
                .current_dir(path),
            &format!("creating {branch} branch"),
        )
        .await
    }

    async fn commit(&self, path: &Path, message: &str) -> Result<(), GatewayError> {
        if !self.has_changes(path).await? {
            tracing::debug!(path = %path.display(), "no changes to commit, skipping");
            return Ok(());
        }
        run(
            Command::new("git").args(["add", "."]).current_dir(path),
            "adding files to stage",
        )
        .await?;
        run(
            Command::new("git")
                .args(["commit", "-m", message])
                .current_dir(path),
            "committing files to git",
        )
        .await
    }

    async fn push(&self, path: &Path, branch: &str) -> Result<(), GatewayError> {
        run(
            Command::new("git")
                .args(["push", "-u", "origin", branch])
                .current_dir(path),
            &format!("pushing changes to {branch} branch"),
        )
        .await
    }

    async fn pull(&self, path: &Path, branch: &str) -> Result<(), GatewayError> {
        run(
            Command::new("git")
                .args(["pull", "origin", branch])
                .current_dir(path),
            &format!("pulling changes from {branch} branch"),
        )
        .await
    }

    async fn has_changes(&self, path: &Path) -> Result<bool, GatewayError> {
        let output = Command::new("git")
            .args(["status", "--porcelain"])
            .current_dir(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| GatewayError::Spawn {
                command: "git status".to_string(),
                source: e,
            })?;
        if !output.status.success() {
            return Err(command_error("getting git status", &output));
        }
        let status = String::from_utf8_lossy(&output.stdout);
        Ok(!status.trim().is_empty())
    }
}

async fn run(cmd: &mut Command, action: &str) -> Result<(), GatewayError> {
    tracing::debug!(action);
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| GatewayError::Spawn {
            command: action.to_string(),
            source: e,
        })?;
    if output.status.success() {
        return Ok(());
    }
    Err(command_error(action, &output))
}

fn command_error(action: &str, output: &std::process::Output) -> GatewayError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    GatewayError::Command {
        action: action.to_string(),
        detail: format!("{}\n{}", stderr.trim_end(), output.status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GitProtocol;
    use std::fs;
    use tempfile::tempdir;

    fn adapter() -> GitCommandLine {
        GitCommandLine::unconfigured(GitConfig {
            host: "bitbucket.org".to_string(),
            user_name: "devportal".to_string(),
            token: String::new(),
            project: "tempo".to_string(),
            protocol: GitProtocol::Https,
        })
    }

    async fn init_repo(path: &Path) {
        run(Command::new("git").args(["init", "-q"]).current_dir(path), "init").await.unwrap();
        run(
            Command::new("git")
                .args(["config", "user.email", "test@test.com"])
                .current_dir(path),
            "config email",
        )
        .await
        .unwrap();
        run(
            Command::new("git")
                .args(["config", "user.name", "test"])
                .current_dir(path),
            "config name",
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn has_changes_reflects_working_tree() {
        let dir = tempdir().unwrap();
        init_repo(dir.path()).await;
        let git = adapter();

        assert!(!git.has_changes(dir.path()).await.unwrap());
        fs::write(dir.path().join("new.txt"), "content").unwrap();
        assert!(git.has_changes(dir.path()).await.unwrap());
    }

    #[tokio::test]
    async fn commit_stages_everything_and_clears_status() {
        let dir = tempdir().unwrap();
        init_repo(dir.path()).await;
        let git = adapter();

        fs::write(dir.path().join("a.txt"), "one").unwrap();
        git.commit(dir.path(), "feat: add a").await.unwrap();
        assert!(!git.has_changes(dir.path()).await.unwrap());
    }

    #[tokio::test]
    async fn commit_with_clean_tree_is_a_silent_no_op() {
        let dir = tempdir().unwrap();
        init_repo(dir.path()).await;
        let git = adapter();
        git.commit(dir.path(), "nothing to do").await.unwrap();
    }

    #[tokio::test]
    async fn branch_creates_and_switches() {
        let dir = tempdir().unwrap();
        init_repo(dir.path()).await;
        let git = adapter();
        fs::write(dir.path().join("a.txt"), "one").unwrap();
        git.commit(dir.path(), "init").await.unwrap();

        git.branch(dir.path(), "feature/orders-svc/argo-cd").await.unwrap();
        let output = Command::new("git")
            .args(["rev-parse", "--abbrev-ref", "HEAD"])
            .current_dir(dir.path())
            .output()
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(&output.stdout).trim(),
            "feature/orders-svc/argo-cd"
        );
    }

    #[tokio::test]
    async fn failed_command_joins_stderr_and_status() {
        let dir = tempdir().unwrap();
        init_repo(dir.path()).await;
        let git = adapter();

        let err = git.checkout(dir.path(), "no-such-branch").await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("checking out to no-such-branch branch"));
        assert!(text.contains("exit status") || text.contains("exit code"));
    }
}
