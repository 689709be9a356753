//! Progress reporting and cooperative cancellation for long computations.
//!
//! Long running operations take a `&dyn Progress` context. They report the
//! fraction of work done and poll [`Progress::is_cancelled`] between steps,
//! stopping early with `Ok(None)` when it returns `true`. Reports are purely
//! advisory: they never change a result.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use indicatif::ProgressBar;

/// Receives progress reports and decides whether to stop
pub trait Progress {
    /// Called with the fraction of the work done so far, in `[0, 1]`
    fn report_progress(&self, fraction: f64);

    /// Checked between steps; returning `true` stops the computation
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Ignores every report and never cancels
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn report_progress(&self, _fraction: f64) {}
}

/// A cancellation flag that can be shared between threads.
///
/// Clones refer to the same flag, so one can be handed to a computation
/// while another is kept to call [`CancellationToken::cancel`].
/// ```
/// use phylonj::progress::{CancellationToken, Progress};
///
/// let token = CancellationToken::new();
/// let handle = token.clone();
/// assert!(!token.is_cancelled());
///
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    // f64 bits of the last reported fraction
    last: Arc<AtomicU64>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the computation to stop at its next check
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Last fraction reported through this token
    pub fn last_reported(&self) -> f64 {
        f64::from_bits(self.last.load(Ordering::Relaxed))
    }
}

impl Progress for CancellationToken {
    fn report_progress(&self, fraction: f64) {
        self.last.store(fraction.to_bits(), Ordering::Relaxed);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Number of steps of a progress bar driven by fractions
pub const BAR_LENGTH: u64 = 1000;

impl Progress for ProgressBar {
    fn report_progress(&self, fraction: f64) {
        let length = self.length().unwrap_or(BAR_LENGTH);
        self.set_position((fraction.clamp(0.0, 1.0) * length as f64).round() as u64);
    }
}

/// A sub-range of a parent context.
///
/// Fractions reported to a phase are mapped to `[start, start + width]` in
/// the parent, and cancellation is read from the parent. This is how a
/// computation made of successive steps (e.g. computing a distance matrix,
/// then building a tree) reports a single, monotone progress.
/// ```
/// use phylonj::progress::{CancellationToken, Phase, Progress};
///
/// let token = CancellationToken::new();
/// let second_half = Phase::new(&token, 0.5, 0.5);
/// second_half.report_progress(0.5);
///
/// assert_eq!(token.last_reported(), 0.75);
/// ```
pub struct Phase<'a> {
    parent: &'a dyn Progress,
    start: f64,
    width: f64,
}

impl<'a> Phase<'a> {
    /// Creates a phase covering `[start, start + width]` of the parent's range
    pub fn new(parent: &'a dyn Progress, start: f64, width: f64) -> Self {
        Self {
            parent,
            start,
            width,
        }
    }

    /// Splits the parent range into consecutive phases of the given relative
    /// sizes
    pub fn split(parent: &'a dyn Progress, sizes: &[f64]) -> Vec<Self> {
        let total: f64 = sizes.iter().sum();
        let mut start = 0.0;
        sizes
            .iter()
            .map(|size| {
                let width = if total > 0.0 { size / total } else { 0.0 };
                let phase = Self::new(parent, start, width);
                start += width;
                phase
            })
            .collect()
    }
}

impl Progress for Phase<'_> {
    fn report_progress(&self, fraction: f64) {
        self.parent
            .report_progress(self.start + self.width * fraction.clamp(0.0, 1.0));
    }

    fn is_cancelled(&self) -> bool {
        self.parent.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Records every report it receives
    #[derive(Default)]
    struct Recorder {
        reports: RefCell<Vec<f64>>,
    }

    impl Progress for Recorder {
        fn report_progress(&self, fraction: f64) {
            self.reports.borrow_mut().push(fraction);
        }
    }

    #[test]
    fn phases_are_consecutive() {
        let recorder = Recorder::default();
        let phases = Phase::split(&recorder, &[1.0, 3.0]);
        phases[0].report_progress(1.0);
        phases[1].report_progress(0.0);
        phases[1].report_progress(1.0);

        assert_eq!(*recorder.reports.borrow(), vec![0.25, 0.25, 1.0]);
    }

    #[test]
    fn nested_phases() {
        let recorder = Recorder::default();
        let outer = Phase::new(&recorder, 0.5, 0.5);
        let inner = Phase::new(&outer, 0.5, 0.5);
        inner.report_progress(0.0);

        assert_eq!(*recorder.reports.borrow(), vec![0.75]);
    }

    #[test]
    fn cancellation_goes_through_phases() {
        let token = CancellationToken::new();
        let phase = Phase::new(&token, 0.0, 0.5);
        assert!(!phase.is_cancelled());
        token.cancel();
        assert!(phase.is_cancelled());
    }

    #[test]
    fn cancel_from_other_thread() {
        let token = CancellationToken::new();
        let handle = token.clone();
        std::thread::spawn(move || handle.cancel()).join().unwrap();
        assert!(token.is_cancelled());
    }

    #[test]
    fn progress_bar() {
        let bar = ProgressBar::hidden();
        bar.set_length(BAR_LENGTH);
        bar.report_progress(0.5);
        assert_eq!(bar.position(), 500);
        assert!(!bar.is_cancelled());

        bar.report_progress(2.0);
        assert_eq!(bar.position(), BAR_LENGTH);
    }
}
