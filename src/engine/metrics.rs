use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    submitted_total: AtomicU64,
    succeeded_total: AtomicU64,
    failed_total: AtomicU64,
    timed_out_total: AtomicU64,
    rejected_total: AtomicU64,
    overloaded_total: AtomicU64,
    internal_errors_total: AtomicU64,
    in_flight: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) {
        self.submitted_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn started(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn finished(&self) {
        self.decrement_in_flight();
    }

    pub fn succeeded(&self) {
        self.succeeded_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failed(&self) {
        self.failed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn timed_out(&self) {
        self.timed_out_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected(&self) {
        self.rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn overloaded(&self) {
        self.overloaded_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn internal_error(&self) {
        self.internal_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn render_prometheus(&self) -> String {
        format!(
            concat!(
                "# TYPE execution_submitted_total counter\n",
                "execution_submitted_total {}\n",
                "# TYPE execution_succeeded_total counter\n",
                "execution_succeeded_total {}\n",
                "# TYPE execution_failed_total counter\n",
                "execution_failed_total {}\n",
                "# TYPE execution_timed_out_total counter\n",
                "execution_timed_out_total {}\n",
                "# TYPE execution_rejected_total counter\n",
                "execution_rejected_total {}\n",
                "# TYPE execution_overloaded_total counter\n",
                "execution_overloaded_total {}\n",
                "# TYPE execution_internal_errors_total counter\n",
                "execution_internal_errors_total {}\n",
                "# TYPE execution_in_flight gauge\n",
                "execution_in_flight {}\n"
            ),
            self.submitted_total.load(Ordering::Relaxed),
            self.succeeded_total.load(Ordering::Relaxed),
            self.failed_total.load(Ordering::Relaxed),
            self.timed_out_total.load(Ordering::Relaxed),
            self.rejected_total.load(Ordering::Relaxed),
            self.overloaded_total.load(Ordering::Relaxed),
            self.internal_errors_total.load(Ordering::Relaxed),
            self.in_flight.load(Ordering::Relaxed),
        )
    }

    fn decrement_in_flight(&self) {
        let mut current = self.in_flight.load(Ordering::Relaxed);
        while current > 0 {
            match self.in_flight.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MetricsRegistry;

    #[test]
    fn in_flight_does_not_underflow() {
        let metrics = MetricsRegistry::new();
        metrics.finished();
        let rendered = metrics.render_prometheus();
        assert!(rendered.contains("execution_in_flight 0"));
    }

    #[test]
    fn renders_outcome_counters() {
        let metrics = MetricsRegistry::new();
        metrics.submitted();
        metrics.submitted();
        metrics.timed_out();
        metrics.rejected();
        let rendered = metrics.render_prometheus();
        assert!(rendered.contains("execution_submitted_total 2"));
        assert!(rendered.contains("execution_timed_out_total 1"));
        assert!(rendered.contains("execution_rejected_total 1"));
    }
}
