//! Progress reporting for imports.
//!
//! The pipeline pushes [`ProgressEvent`]s on a 0..=100 scale; sinks decide
//! where they go.

use crossbeam::channel::Sender;
use tracing::info;

/// Full scale of every event the pipeline emits
pub const PROGRESS_SCALE: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub expected: u64,
    pub current: u64,
    pub done: bool,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(current: u64, message: impl Into<String>) -> Self {
        Self {
            expected: PROGRESS_SCALE,
            current: current.min(PROGRESS_SCALE),
            done: false,
            message: message.into(),
        }
    }

    pub fn finished(message: impl Into<String>) -> Self {
        Self {
            expected: PROGRESS_SCALE,
            current: PROGRESS_SCALE,
            done: true,
            message: message.into(),
        }
    }

    /// Completed fraction in `0.0..=1.0`
    pub fn fraction(&self) -> f64 {
        if self.expected == 0 {
            0.0
        } else {
            self.current as f64 / self.expected as f64
        }
    }
}

pub trait ProgressSink: Send {
    fn report(&mut self, event: &ProgressEvent);
}

/// Drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _event: &ProgressEvent) {}
}

/// Calls a closure for every event
pub struct ProgressFn<F>(pub F);

impl<F: FnMut(&ProgressEvent) + Send> ProgressSink for ProgressFn<F> {
    fn report(&mut self, event: &ProgressEvent) {
        (self.0)(event)
    }
}

/// Forwards events to another thread. A dropped receiver is not an error.
pub struct ChannelProgress(pub Sender<ProgressEvent>);

impl ProgressSink for ChannelProgress {
    fn report(&mut self, event: &ProgressEvent) {
        let _ = self.0.send(event.clone());
    }
}

/// Writes events to the `tracing` log, tagged with the track being imported
pub struct LogProgress {
    label: String,
}

impl LogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl ProgressSink for LogProgress {
    fn report(&mut self, event: &ProgressEvent) {
        info!(
            track = %self.label,
            percent = event.current * 100 / event.expected.max(1),
            done = event.done,
            "{}",
            event.message
        );
    }
}

/// Maps the full scale of the wrapped pipeline onto `[from, to]` of the
/// inner sink, for when one import is a step of a larger job
pub struct ScaledProgress<S> {
    inner: S,
    from: u64,
    to: u64,
    expected: u64,
}

impl<S: ProgressSink> ScaledProgress<S> {
    pub fn new(inner: S, from: u64, to: u64, expected: u64) -> Self {
        Self {
            inner,
            from: from.min(to),
            to: to.max(from),
            expected,
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: ProgressSink> ProgressSink for ScaledProgress<S> {
    fn report(&mut self, event: &ProgressEvent) {
        let span = self.to - self.from;
        let current = self.from + span * event.current / event.expected.max(1);
        let scaled = ProgressEvent {
            expected: self.expected,
            current,
            done: event.done && self.to >= self.expected,
            message: event.message.clone(),
        };
        self.inner.report(&scaled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_progress() {
        let mut seen = Vec::new();
        {
            let mut sink = ScaledProgress::new(ProgressFn(|e: &ProgressEvent| seen.push((e.current, e.done))), 50, 100, 100);
            sink.report(&ProgressEvent::new(0, "start"));
            sink.report(&ProgressEvent::new(50, "half"));
            sink.report(&ProgressEvent::finished("done"));
        }
        assert_eq!(seen, vec![(50, false), (75, false), (100, true)]);

        let mut first_half = Vec::new();
        {
            let mut sink = ScaledProgress::new(ProgressFn(|e: &ProgressEvent| first_half.push(e.done)), 0, 50, 100);
            sink.report(&ProgressEvent::finished("done"));
        }
        assert_eq!(first_half, vec![false]);
    }

    #[test]
    fn test_channel_progress() {
        let (tx, rx) = crossbeam::channel::unbounded();
        let mut sink = ChannelProgress(tx);
        sink.report(&ProgressEvent::new(120, "clamped"));
        let event = rx.recv().unwrap();
        assert_eq!(event.current, 100);
        assert_eq!(event.fraction(), 1.0);

        drop(rx);
        sink.report(&ProgressEvent::finished("nobody listening"));
    }
}
