use std::time::Instant;

use crate::engine::{
    models::{ExecutionResult, TIMEOUT_EXIT_CODE},
    sandbox::{CapturedStream, OutcomeKind, RawOutcome},
};

/// Maps a supervisor outcome onto the fixed result shape.
///
/// The kind travels alongside the result: a program may exit 124 on its own.
pub fn classify(outcome: RawOutcome, started: Instant) -> (ExecutionResult, OutcomeKind) {
    let kind = outcome.kind();
    let (stdout, stderr, exit_code) = match outcome {
        RawOutcome::Completed {
            exit_code,
            stdout,
            stderr,
        } => (render(stdout), render(stderr), exit_code),
        RawOutcome::TimedOut { timeout } => (
            String::new(),
            format!("Execution timed out after {}ms", timeout.as_millis()),
            TIMEOUT_EXIT_CODE,
        ),
        RawOutcome::LaunchFailed {
            exit_code,
            message,
            stdout,
            stderr,
        } => {
            let stderr = if stderr.is_empty() {
                message
            } else {
                render(stderr)
            };
            (render(stdout), stderr, exit_code.unwrap_or(1))
        }
    };

    let result = ExecutionResult {
        stdout,
        stderr,
        exit_code,
        execution_time: started.elapsed().as_millis() as u64,
    };
    (result, kind)
}

fn render(stream: CapturedStream) -> String {
    let truncated = stream.truncated();
    let total = stream.total_bytes;
    let mut text = String::from_utf8_lossy(&stream.bytes).into_owned();
    if truncated {
        if !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&format!(
            "[output truncated: showing {} of {} bytes]",
            stream.bytes.len(),
            total
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::classify;
    use crate::engine::sandbox::{CapturedStream, OutcomeKind, RawOutcome};

    fn stream(text: &str) -> CapturedStream {
        CapturedStream {
            bytes: text.as_bytes().to_vec(),
            total_bytes: text.len() as u64,
        }
    }

    #[test]
    fn completed_runs_keep_streams_and_code() {
        let (result, kind) = classify(
            RawOutcome::Completed {
                exit_code: 7,
                stdout: stream("out\n"),
                stderr: stream("boom\n"),
            },
            Instant::now(),
        );
        assert_eq!(kind, OutcomeKind::Completed);
        assert_eq!(result.exit_code, 7);
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "boom\n");
    }

    #[test]
    fn self_reported_124_is_still_completed() {
        let (result, kind) = classify(
            RawOutcome::Completed {
                exit_code: 124,
                stdout: stream("done\n"),
                stderr: CapturedStream::default(),
            },
            Instant::now(),
        );
        assert_eq!(result.exit_code, 124);
        assert_eq!(result.stdout, "done\n");
        assert_eq!(kind, OutcomeKind::Completed);
    }

    #[test]
    fn timeout_discards_output_and_explains() {
        let (result, kind) = classify(
            RawOutcome::TimedOut {
                timeout: Duration::from_millis(10_000),
            },
            Instant::now(),
        );
        assert_eq!(result.exit_code, 124);
        assert_eq!(result.stdout, "");
        assert_eq!(result.stderr, "Execution timed out after 10000ms");
        assert_eq!(kind, OutcomeKind::TimedOut);
    }

    #[test]
    fn launch_failure_defaults_to_code_one() {
        let (result, kind) = classify(
            RawOutcome::launch_failed(None, "failed waiting for process"),
            Instant::now(),
        );
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.stderr, "failed waiting for process");
        assert_eq!(result.stdout, "");
        assert_eq!(kind, OutcomeKind::LaunchFailed);
    }

    #[test]
    fn crash_prefers_captured_stderr() {
        let (result, _) = classify(
            RawOutcome::LaunchFailed {
                exit_code: None,
                message: "Process terminated by signal 11".to_string(),
                stdout: stream("before crash\n"),
                stderr: stream("Segmentation fault\n"),
            },
            Instant::now(),
        );
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.stdout, "before crash\n");
        assert_eq!(result.stderr, "Segmentation fault\n");
    }

    #[test]
    fn truncated_stream_gets_marker() {
        let (result, _) = classify(
            RawOutcome::Completed {
                exit_code: 0,
                stdout: CapturedStream {
                    bytes: b"abcd".to_vec(),
                    total_bytes: 4096,
                },
                stderr: CapturedStream::default(),
            },
            Instant::now(),
        );
        assert_eq!(result.stdout, "abcd\n[output truncated: showing 4 of 4096 bytes]");
        assert_eq!(result.stderr, "");
    }

    #[test]
    fn execution_time_counts_from_start() {
        let started = Instant::now() - Duration::from_millis(250);
        let (result, _) = classify(
            RawOutcome::Completed {
                exit_code: 0,
                stdout: CapturedStream::default(),
                stderr: CapturedStream::default(),
            },
            started,
        );
        assert!(result.execution_time >= 250);
    }
}
