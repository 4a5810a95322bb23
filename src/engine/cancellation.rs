//! Cooperative cancellation and timeout primitives (spec §5).
//!
//! Modeled on the teacher's `cancelled_jobs` / `wait_requests` `HashSet`s
//! in `EngineState`: cancellation here is a shared flag threaded through
//! every suspension point (remote calls, filesystem I/O, persistence
//! calls) rather than a hard kill, so the active pipeline step always
//! gets a chance to observe it and exit promptly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AbortError {
    #[error("ABORTED")]
    Aborted,
}

/// Shared cancellation handle for one job execution. Cloning shares the
/// same underlying flag; `forceStopAll` and `stopJob` both set it, the
/// difference is only in which status/message the caller records
/// afterwards (spec §4.1).
#[derive(Clone, Default)]
pub struct AbortSignal {
    aborted: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self {
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Returns `Err(AbortError::Aborted)` if the signal has fired;
    /// intended to be called at the start of every suspension point.
    pub fn check(&self) -> Result<(), AbortError> {
        if self.is_aborted() {
            Err(AbortError::Aborted)
        } else {
            Ok(())
        }
    }
}

/// Runs `f` on a helper thread and waits up to `ms` milliseconds for it to
/// finish. `ms <= 0` disables the timeout (spec §5 "the polling-timeout
/// flag enables or disables this wrapping"). On expiry, returns an error
/// naming `label`; the helper thread is detached and left to finish (or
/// observe `signal` and exit) on its own, matching the source's
/// fire-and-forget timeout semantics for unkillable remote calls.
pub fn with_timeout<T, F>(ms: i64, label: &str, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    if ms <= 0 {
        return f();
    }

    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name(format!("with-timeout-{label}"))
        .spawn(move || {
            let result = f();
            let _ = tx.send(result);
        })
        .map_err(|err| anyhow!("failed to spawn timeout worker for {label}: {err}"))?;

    match rx.recv_timeout(Duration::from_millis(ms as u64)) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(anyhow!("{label} timed out after {ms}ms")),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(anyhow!("{label} worker thread dropped without a result"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_timeout_disabled_runs_inline() {
        let result = with_timeout(0, "noop", || Ok(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn with_timeout_returns_value_within_budget() {
        let result = with_timeout(500, "fast", || Ok("ok".to_string()));
        assert_eq!(result.unwrap(), "ok");
    }

    #[test]
    fn with_timeout_rejects_on_expiry() {
        let result: Result<()> = with_timeout(20, "slow", || {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        });
        let err = result.unwrap_err();
        assert!(err.to_string().contains("slow timed out"));
    }

    #[test]
    fn abort_signal_check_reports_aborted() {
        let signal = AbortSignal::new();
        assert!(signal.check().is_ok());
        signal.abort();
        assert!(matches!(signal.check(), Err(AbortError::Aborted)));
    }
}
