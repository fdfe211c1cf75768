use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::engine::error::EngineError;

/// Bounds how many executions hold a child process at once.
///
/// Callers beyond `max_concurrent` wait in a bounded queue; once that queue is
/// full, or a waiter exceeds `max_wait`, the request is rejected as overloaded.
#[derive(Clone)]
pub struct AdmissionGate {
    permits: Arc<Semaphore>,
    waiting: Arc<AtomicUsize>,
    max_waiting: usize,
    max_wait: Duration,
}

impl AdmissionGate {
    pub fn new(max_concurrent: usize, max_waiting: usize, max_wait: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            waiting: Arc::new(AtomicUsize::new(0)),
            max_waiting,
            max_wait,
        }
    }

    pub async fn admit(&self) -> Result<OwnedSemaphorePermit, EngineError> {
        if let Ok(permit) = self.permits.clone().try_acquire_owned() {
            return Ok(permit);
        }

        let slot = QueueSlot::claim(&self.waiting);
        if slot.position >= self.max_waiting {
            return Err(EngineError::Overloaded);
        }

        match tokio::time::timeout(self.max_wait, self.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(EngineError::Internal("admission gate closed".to_string())),
            Err(_) => Err(EngineError::Overloaded),
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Relaxed)
    }
}

struct QueueSlot<'a> {
    counter: &'a AtomicUsize,
    position: usize,
}

impl<'a> QueueSlot<'a> {
    fn claim(counter: &'a AtomicUsize) -> Self {
        let position = counter.fetch_add(1, Ordering::AcqRel);
        Self { counter, position }
    }
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::AdmissionGate;
    use crate::engine::error::EngineError;

    #[tokio::test]
    async fn rejects_when_queue_is_full() {
        let gate = AdmissionGate::new(1, 0, Duration::from_secs(5));
        let held = gate.admit().await.unwrap();
        assert_eq!(gate.available(), 0);

        let err = gate.admit().await.unwrap_err();
        assert!(matches!(err, EngineError::Overloaded));
        assert_eq!(gate.waiting(), 0);

        drop(held);
        assert!(gate.admit().await.is_ok());
    }

    #[tokio::test]
    async fn waiter_times_out_as_overloaded() {
        let gate = AdmissionGate::new(1, 4, Duration::from_millis(50));
        let _held = gate.admit().await.unwrap();
        let err = gate.admit().await.unwrap_err();
        assert!(matches!(err, EngineError::Overloaded));
        assert_eq!(gate.waiting(), 0);
    }

    #[tokio::test]
    async fn waiter_is_admitted_when_permit_frees() {
        let gate = AdmissionGate::new(1, 4, Duration::from_secs(5));
        let held = gate.admit().await.unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.admit().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert!(waiter.await.unwrap().is_ok());
    }
}
