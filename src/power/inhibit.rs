use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::resource::{AcquireError, ReleaseError, ResourceKind};
use crate::retry::FlakyResource;

use super::LockKind;

/// How long a freshly spawned inhibitor must survive to count as holding
/// the lock.
const SETTLE: Duration = Duration::from_millis(200);

/// Holds an inhibitor lock for as long as a helper process (by default
/// `systemd-inhibit ... sleep infinity`) stays alive.
#[derive(Debug, Clone)]
pub struct InhibitBackend {
    program: String,
    args: Vec<String>,
}

impl InhibitBackend {
    /// `command[0]` is run with `--what=<kind>` followed by the rest of
    /// `command`.
    pub fn new(command: &[String]) -> Self {
        let (program, args) = command
            .split_first()
            .map(|(program, args)| (program.clone(), args.to_vec()))
            .unwrap_or_default();
        Self { program, args }
    }
}

/// A running inhibitor process.
pub struct InhibitLease {
    child: Child,
}

#[async_trait]
impl FlakyResource for InhibitBackend {
    type Input = LockKind;
    type Lease = InhibitLease;

    fn kind(&self) -> ResourceKind {
        ResourceKind::PowerLock
    }

    async fn attempt(&self, kind: &LockKind) -> Result<InhibitLease, AcquireError> {
        if self.program.is_empty() {
            return Err(AcquireError::Unavailable("no inhibitor command configured".to_string()));
        }

        let mut child = Command::new(&self.program)
            .arg(format!("--what={}", kind))
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        match tokio::time::timeout(SETTLE, child.wait()).await {
            Ok(Ok(status)) => Err(AcquireError::Unavailable(format!(
                "inhibitor exited early ({})",
                status
            ))),
            Ok(Err(err)) => Err(AcquireError::Io(err)),
            Err(_) => {
                tracing::info!(kind = %kind, pid = ?child.id(), "Power lock held");
                Ok(InhibitLease { child })
            }
        }
    }

    async fn lost(&self, lease: &mut InhibitLease) {
        match lease.child.wait().await {
            Ok(status) => tracing::debug!(%status, "Inhibitor exited"),
            Err(err) => tracing::debug!(error = %err, "Inhibitor wait failed"),
        }
    }

    async fn release(&self, mut lease: InhibitLease) -> Result<(), ReleaseError> {
        match lease.child.try_wait() {
            Ok(Some(_)) => Err(ReleaseError::AlreadyClosed),
            Ok(None) => lease
                .child
                .kill()
                .await
                .map_err(|err| ReleaseError::Failed(err.to_string())),
            Err(err) => Err(ReleaseError::Failed(err.to_string())),
        }
    }
}
