use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time;
use tracing::{error, info};

use crate::error::AlarmHandlerError;

/// Checked in order when no service manager is configured.
const SERVICE_MANAGERS: [&str; 2] = ["/usr/bin/systemctl", "/bin/systemctl"];

/// What a successful recovery action left behind.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryReport {
    pub action: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RecoveryReport {
    fn without_output(action: impl Into<String>) -> Self {
        RecoveryReport {
            action: action.into(),
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

/// A corrective action run once per alert. Implementations never retry.
#[async_trait]
pub trait Recover: Send + Sync {
    fn describe(&self) -> String;

    async fn recover(&self) -> Result<RecoveryReport, AlarmHandlerError>;
}

/// Runs an executable with no arguments, e.g. a restart script baked into
/// the deployment.
pub struct ScriptRecovery {
    path: PathBuf,
    timeout: Duration,
}

impl ScriptRecovery {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        ScriptRecovery {
            path: path.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Recover for ScriptRecovery {
    fn describe(&self) -> String {
        format!("script {}", self.path.display())
    }

    async fn recover(&self) -> Result<RecoveryReport, AlarmHandlerError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => {
                return Err(AlarmHandlerError::RecoveryActionNotFound(format!(
                    "{} is not a file",
                    self.path.display()
                )))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AlarmHandlerError::RecoveryActionNotFound(
                    self.path.display().to_string(),
                ))
            }
            Err(e) => {
                return Err(AlarmHandlerError::RecoveryMechanismUnavailable(format!(
                    "cannot inspect {}: {}",
                    self.path.display(),
                    e
                )))
            }
        }

        run_command(Command::new(&self.path), &self.describe(), self.timeout).await
    }
}

/// Restarts a unit through the host's service manager.
pub struct ServiceRestartRecovery {
    service: String,
    service_manager: PathBuf,
    timeout: Duration,
}

impl ServiceRestartRecovery {
    /// Uses the first service manager found on the host. When none exists
    /// the first candidate is kept so `recover` reports it as unavailable.
    pub fn new(service: impl Into<String>, timeout: Duration) -> Self {
        let service_manager = locate_service_manager(&SERVICE_MANAGERS)
            .unwrap_or_else(|| PathBuf::from(SERVICE_MANAGERS[0]));
        Self::with_service_manager(service, service_manager, timeout)
    }

    pub fn with_service_manager(
        service: impl Into<String>,
        service_manager: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        ServiceRestartRecovery {
            service: service.into(),
            service_manager: service_manager.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Recover for ServiceRestartRecovery {
    fn describe(&self) -> String {
        format!("{} restart {}", self.service_manager.display(), self.service)
    }

    async fn recover(&self) -> Result<RecoveryReport, AlarmHandlerError> {
        if !is_file(&self.service_manager).await {
            return Err(AlarmHandlerError::RecoveryMechanismUnavailable(format!(
                "service manager {} not found on host",
                self.service_manager.display()
            )));
        }

        let mut command = Command::new(&self.service_manager);
        command.arg("restart").arg(&self.service);
        run_command(command, &self.describe(), self.timeout).await
    }
}

/// Alert-only deployments: nothing is run and the action always succeeds.
pub struct NoopRecovery;

#[async_trait]
impl Recover for NoopRecovery {
    fn describe(&self) -> String {
        "none".to_string()
    }

    async fn recover(&self) -> Result<RecoveryReport, AlarmHandlerError> {
        info!("recovery disabled, nothing to run");
        Ok(RecoveryReport::without_output(self.describe()))
    }
}

fn locate_service_manager(candidates: &[&str]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|candidate| PathBuf::from(*candidate))
        .find(|candidate| candidate.is_file())
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}

async fn run_command(
    mut command: Command,
    action: &str,
    timeout: Duration,
) -> Result<RecoveryReport, AlarmHandlerError> {
    command.stdin(Stdio::null()).kill_on_drop(true);
    info!(action, timeout_secs = timeout.as_secs(), "executing recovery action");

    let output = match time::timeout(timeout, command.output()).await {
        Err(_) => {
            return Err(AlarmHandlerError::RecoveryActionFailure(format!(
                "{} timed out after {} seconds",
                action,
                timeout.as_secs()
            )))
        }
        Ok(Err(e)) => return Err(spawn_error(action, e)),
        Ok(Ok(output)) => output,
    };

    let report = RecoveryReport {
        action: action.to_string(),
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    if output.status.success() {
        info!(action, stdout = %report.stdout.trim_end(), "recovery action finished");
        Ok(report)
    } else {
        error!(
            action,
            exit_code = ?report.exit_code,
            stderr = %report.stderr.trim_end(),
            "recovery action failed"
        );
        Err(AlarmHandlerError::RecoveryActionFailure(format!(
            "{} exited with {}: {}",
            action,
            output.status,
            report.stderr.trim_end()
        )))
    }
}

fn spawn_error(action: &str, e: std::io::Error) -> AlarmHandlerError {
    match e.kind() {
        ErrorKind::NotFound => AlarmHandlerError::RecoveryActionNotFound(action.to_string()),
        ErrorKind::PermissionDenied => AlarmHandlerError::RecoveryMechanismUnavailable(format!(
            "{} is not executable: {}",
            action, e
        )),
        _ => AlarmHandlerError::RecoveryActionFailure(format!("{} could not start: {}", action, e)),
    }
}
