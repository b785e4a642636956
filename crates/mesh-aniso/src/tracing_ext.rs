//! Structured logging helpers built on `tracing`.
//!
//! Pipeline stages wrap themselves in an [`OperationTimer`] so every run
//! leaves a uniform trail of `stage started` / `stage completed` events with
//! elapsed times, without any manual bookkeeping at the call sites.

use std::time::Instant;
use tracing::{debug, info, info_span, Span};

/// Drop-guard timing a named operation.
///
/// Logs at `debug` level when created and at `info` level with the elapsed
/// milliseconds when dropped.
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    span: Span,
}

impl OperationTimer {
    pub fn new(name: &'static str) -> Self {
        let span = info_span!("operation", name = name);
        {
            let _guard = span.enter();
            debug!("{} started", name);
        }
        OperationTimer {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Elapsed time since creation.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let _guard = self.span.enter();
        info!(
            elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0,
            "{} completed",
            self.name
        );
    }
}

/// Logs the headline numbers of a finished meshing run.
pub fn log_mesh_stats(nodes: usize, triangles: usize, quads: usize, qmin: f64) {
    info!(nodes, triangles, quads, qmin, "mesh statistics");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_measures_time() {
        let timer = OperationTimer::new("test-op");
        std::thread::sleep(std::time::Duration::from_millis(1));
        assert!(timer.elapsed().as_nanos() > 0);
    }
}
