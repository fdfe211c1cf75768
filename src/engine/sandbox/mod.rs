mod language;
mod process;
mod workspace;

use std::time::Duration;

use async_trait::async_trait;

pub use language::{LanguageRegistry, RuntimeDescriptor};
pub use process::ProcessSupervisor;
pub use workspace::Workspace;

/// Bytes kept from one output stream plus how many the process actually wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedStream {
    pub bytes: Vec<u8>,
    pub total_bytes: u64,
}

impl CapturedStream {
    pub fn is_empty(&self) -> bool {
        self.total_bytes == 0
    }

    pub fn truncated(&self) -> bool {
        self.total_bytes > self.bytes.len() as u64
    }
}

/// Launches a descriptor's interpreter inside a provisioned workspace.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, descriptor: &RuntimeDescriptor, workspace: &Workspace) -> RawOutcome;
}

/// Which terminal state produced a result; the exit code alone cannot tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Completed,
    TimedOut,
    LaunchFailed,
}

/// Terminal state of one supervised process.
#[derive(Debug, Clone)]
pub enum RawOutcome {
    Completed {
        exit_code: i32,
        stdout: CapturedStream,
        stderr: CapturedStream,
    },
    TimedOut {
        timeout: Duration,
    },
    LaunchFailed {
        exit_code: Option<i32>,
        message: String,
        stdout: CapturedStream,
        stderr: CapturedStream,
    },
}

impl RawOutcome {
    pub fn launch_failed(exit_code: Option<i32>, message: impl Into<String>) -> Self {
        Self::LaunchFailed {
            exit_code,
            message: message.into(),
            stdout: CapturedStream::default(),
            stderr: CapturedStream::default(),
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Completed { .. } => OutcomeKind::Completed,
            Self::TimedOut { .. } => OutcomeKind::TimedOut,
            Self::LaunchFailed { .. } => OutcomeKind::LaunchFailed,
        }
    }
}
