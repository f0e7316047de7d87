use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;

use crate::capture::{CaptureHandle, CaptureOptions, CommandCaptureProvider};
use crate::config::Config;
use crate::guard::{ExitCallback, ExitGuardProvider, ExitGuards, GuardRegistration};
use crate::power::{InhibitBackend, LockKind};
use crate::resource::Resource;
use crate::retry::{LeaseHandle, ReadinessSignal, RetryDriver};
use crate::session::Action;
use crate::sink::{FileSinkProvider, SinkHandle, SinkOptions};
use crate::teardown::TeardownReport;

pub type CaptureProvider = Arc<dyn Resource<Input = CaptureOptions, Handle = CaptureHandle>>;
pub type SinkProvider = Arc<dyn Resource<Input = SinkOptions, Handle = SinkHandle>>;
pub type PowerLockProvider = Arc<dyn Resource<Input = LockKind, Handle = LeaseHandle>>;
pub type ExitGuardResource = Arc<dyn Resource<Input = ExitCallback, Handle = GuardRegistration>>;

/// Resources a recorder acquires per session. Side resources are optional;
/// a missing provider is skipped.
#[derive(Clone)]
pub struct Providers {
    pub capture: CaptureProvider,
    pub sink: SinkProvider,
    pub power_lock: Option<PowerLockProvider>,
    pub exit_guard: Option<ExitGuardResource>,
}

impl Providers {
    pub fn new(capture: CaptureProvider, sink: SinkProvider) -> Self {
        Self {
            capture,
            sink,
            power_lock: None,
            exit_guard: None,
        }
    }

    pub fn with_power_lock(mut self, provider: PowerLockProvider) -> Self {
        self.power_lock = Some(provider);
        self
    }

    pub fn with_exit_guard(mut self, provider: ExitGuardResource) -> Self {
        self.exit_guard = Some(provider);
        self
    }

    /// The stock providers: command capture, file sink, `systemd-inhibit`
    /// behind the retry driver, and the process-wide exit guards.
    pub fn from_config(
        config: &Config,
        guards: ExitGuards,
        foreground: Arc<dyn ReadinessSignal>,
    ) -> Self {
        let mut providers = Self::new(
            Arc::new(CommandCaptureProvider),
            Arc::new(FileSinkProvider),
        );

        if config.power_lock.enabled {
            let backend = InhibitBackend::new(&config.power_lock.command);
            providers = providers.with_power_lock(Arc::new(RetryDriver::new(
                backend,
                config.power_lock.policy(),
                foreground,
            )));
        }

        if config.exit_guard.enabled {
            providers = providers.with_exit_guard(Arc::new(ExitGuardProvider::new(guards)));
        }

        providers
    }
}

/// Runtime knobs that are not part of a record action.
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderSettings {
    /// Sink grace period during teardown.
    pub grace: Duration,
    pub lock_kind: LockKind,
    /// Returned by the session's exit guard callback.
    pub block_exit: bool,
}

impl RecorderSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            grace: config.sink.grace(),
            lock_kind: config.power_lock.kind,
            block_exit: config.exit_guard.block_exit,
        }
    }
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            grace: Duration::from_millis(1000),
            lock_kind: LockKind::default(),
            block_exit: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Recorder has shut down")]
    Closed,
}

pub(crate) enum RecorderCommand {
    Action(Action),
    Shutdown {
        respond_to: oneshot::Sender<Vec<TeardownReport>>,
    },
}
