use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::GenError;

/// Start/stop control over the generation server, owned by the caller.
#[allow(async_fn_in_trait)]
pub trait ServerLifecycle {
    async fn start(&self) -> Result<(), GenError>;
    async fn stop(&self) -> Result<(), GenError>;
    async fn is_running(&self) -> Result<bool, GenError>;

    /// Whether `start` has anything to run. Checked before a restart stops
    /// the server.
    fn can_start(&self) -> bool {
        true
    }
}

/// The server is managed elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLifecycle;

impl ServerLifecycle for NoopLifecycle {
    async fn start(&self) -> Result<(), GenError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), GenError> {
        Ok(())
    }

    async fn is_running(&self) -> Result<bool, GenError> {
        Ok(true)
    }
}

/// Finds the server by command-line pattern (`pgrep -f`), stops it with
/// `pkill -f` and starts it with a configured launch command.
#[derive(Debug, Clone)]
pub struct ProcessLifecycle {
    pub pattern: String,
    /// argv of the launch command; empty when the server cannot be started.
    pub launch: Vec<String>,
    pub workdir: Option<PathBuf>,
    /// Pause after `pkill` before checking the processes are gone.
    pub settle: Duration,
}

impl ProcessLifecycle {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            launch: Vec::new(),
            workdir: None,
            settle: Duration::from_secs(2),
        }
    }

    async fn run_quiet(&self, program: &str) -> Result<bool, GenError> {
        let status = Command::new(program)
            .arg("-f")
            .arg(&self.pattern)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| GenError::Lifecycle(format!("failed to run {program}: {e}")))?;
        Ok(status.success())
    }
}

impl ServerLifecycle for ProcessLifecycle {
    async fn start(&self) -> Result<(), GenError> {
        let Some((program, args)) = self.launch.split_first() else {
            return Err(GenError::Lifecycle(
                "no launch command configured under [server]".into(),
            ));
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        let child = cmd
            .spawn()
            .map_err(|e| GenError::Lifecycle(format!("failed to launch {program}: {e}")))?;
        tracing::info!(pid = ?child.id(), %program, "server launched");
        Ok(())
    }

    async fn stop(&self) -> Result<(), GenError> {
        // pkill exits 1 when nothing matched; that is not an error here.
        self.run_quiet("pkill").await?;
        tokio::time::sleep(self.settle).await;

        if self.is_running().await? {
            tracing::warn!(pattern = %self.pattern, "server processes still running after pkill");
        } else {
            tracing::info!(pattern = %self.pattern, "server stopped");
        }
        Ok(())
    }

    async fn is_running(&self) -> Result<bool, GenError> {
        self.run_quiet("pgrep").await
    }

    fn can_start(&self) -> bool {
        !self.launch.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_without_launch_command_fails() {
        let lifecycle = ProcessLifecycle::new("python main.py");
        let err = lifecycle.start().await.unwrap_err();
        assert!(matches!(err, GenError::Lifecycle(ref m) if m.contains("launch")));
    }

    #[test]
    fn can_start_only_with_launch_command() {
        assert!(!ProcessLifecycle::new("python main.py").can_start());
        let lifecycle = ProcessLifecycle {
            launch: vec!["python".into(), "main.py".into()],
            ..ProcessLifecycle::new("python main.py")
        };
        assert!(lifecycle.can_start());
        assert!(NoopLifecycle.can_start());
    }

    #[tokio::test]
    async fn missing_launch_binary_is_reported() {
        let lifecycle = ProcessLifecycle {
            launch: vec!["/nonexistent/localgen-server".into()],
            ..ProcessLifecycle::new("localgen-server")
        };
        assert!(matches!(
            lifecycle.start().await,
            Err(GenError::Lifecycle(_))
        ));
    }

    #[tokio::test]
    async fn noop_reports_running() {
        assert!(NoopLifecycle.is_running().await.unwrap());
        NoopLifecycle.stop().await.unwrap();
    }
}
