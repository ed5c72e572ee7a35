/// Progress notifications emitted while a recording is demultiplexed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Emitted once before the first chunk file is opened.
    Start {
        total_chunks: usize,
        /// Combined size of all chunk files, if every one could be measured.
        total_bytes: Option<u64>,
    },
    /// Input bytes consumed so far, headers included.
    Advance { processed_bytes: u64 },
    /// Emitted once after every output has been finalized.
    Finish,
}

/// Receiver for [`ProgressEvent`]s.
pub trait ProgressReporter {
    fn report(&mut self, _event: ProgressEvent) {}
}

/// Adapter turning a closure into a [`ProgressReporter`].
pub(crate) struct FnReporter<F>(pub(crate) F);

impl<F: FnMut(ProgressEvent)> ProgressReporter for FnReporter<F> {
    fn report(&mut self, event: ProgressEvent) {
        (self.0)(event)
    }
}

/// Reporter that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {}
