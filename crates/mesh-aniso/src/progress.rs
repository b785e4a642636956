//! Cooperative progress reporting and cancellation.
//!
//! Long-running operations call the handler at a handful of checkpoints with
//! the overall completion fraction in `[0, 1]`. Returning `false` requests
//! cancellation: the operation unwinds at the next checkpoint, leaves its
//! data bundle consistent, and reports [`WarningCode::Interruption`] instead
//! of failing.
//!
//! [`WarningCode::Interruption`]: crate::error::WarningCode::Interruption

use std::sync::Arc;

/// Callback invoked at progress checkpoints. Returns `false` to cancel.
pub type InterruptHandler = Arc<dyn Fn(f64) -> bool + Send + Sync>;

/// A sub-interval of the overall progress range, handed down to nested
/// pipeline stages so each stage reports in global coordinates.
#[derive(Clone)]
pub struct ProgressRange {
    handler: Option<InterruptHandler>,
    start: f64,
    range: f64,
}

impl ProgressRange {
    /// Full `[0, 1]` range with no handler (progress is dropped, nothing can
    /// cancel).
    pub fn silent() -> Self {
        ProgressRange {
            handler: None,
            start: 0.0,
            range: 1.0,
        }
    }

    /// Range `[start, start + range]` reporting through `handler`.
    pub fn new(handler: Option<InterruptHandler>, start: f64, range: f64) -> Self {
        ProgressRange {
            handler,
            start,
            range: range.max(0.0),
        }
    }

    /// Sub-range covering the fraction `[begin, begin + share]` of this one.
    pub fn child(&self, begin: f64, share: f64) -> Self {
        ProgressRange {
            handler: self.handler.clone(),
            start: self.start + self.range * begin,
            range: self.range * share,
        }
    }

    /// Reports the local fraction `frac` in `[0, 1]`.
    /// Returns `false` when the handler requests cancellation.
    #[must_use]
    pub fn report(&self, frac: f64) -> bool {
        match &self.handler {
            Some(handler) => handler(self.start + self.range * frac.clamp(0.0, 1.0)),
            None => true,
        }
    }

    /// Start of this range in global coordinates.
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Width of this range in global coordinates.
    pub fn range(&self) -> f64 {
        self.range
    }

    /// The underlying handler, for forwarding into mesher settings.
    pub fn handler(&self) -> Option<InterruptHandler> {
        self.handler.clone()
    }
}

impl std::fmt::Debug for ProgressRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressRange")
            .field("start", &self.start)
            .field("range", &self.range)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}
