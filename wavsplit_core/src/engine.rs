use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use log::{info, warn};

use crate::error::WavSplitError;
use crate::header::{parse_header, FormatDescriptor};
use crate::output::{ChannelOutputSet, ChannelSummary};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::session::OutputLayout;

/// Default total buffer budget: 4 GiB, roughly seven minutes of 32 channels
/// of 24-bit audio at 96 kHz.
pub const DEFAULT_BUFFER_BUDGET_BYTES: u64 = 4096 * 1024 * 1024;

const READ_BUFFER_BYTES: usize = 1 << 20;
const PROGRESS_INTERVAL_BYTES: u64 = 8 << 20;

/// Total memory available for channel buffers, shared evenly by all channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferBudget {
    total_bytes: u64,
}

impl BufferBudget {
    pub fn new(total_bytes: u64) -> Result<Self, WavSplitError> {
        if total_bytes == 0 {
            return Err(WavSplitError::invalid_config(
                "buffer budget must be greater than zero",
            ));
        }
        Ok(Self { total_bytes })
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Buffer capacity of each channel of `format`: the even share of the
    /// budget rounded down to whole samples.
    pub fn per_channel(&self, format: &FormatDescriptor) -> Result<usize, WavSplitError> {
        let sample_width = format.bytes_per_sample() as u64;
        let share = self.total_bytes / u64::from(format.channel_count.max(1));
        let capacity = share - share % sample_width.max(1);
        if capacity < sample_width {
            return Err(WavSplitError::invalid_config(format!(
                "a buffer budget of {} bytes cannot hold one {}-byte sample for each of {} channels",
                self.total_bytes, sample_width, format.channel_count
            )));
        }
        usize::try_from(capacity).map_err(|_| {
            WavSplitError::invalid_config("per-channel buffer exceeds the address space")
        })
    }
}

impl Default for BufferBudget {
    fn default() -> Self {
        Self {
            total_bytes: DEFAULT_BUFFER_BUDGET_BYTES,
        }
    }
}

/// Figures collected over a whole session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DemuxMetrics {
    pub chunks_processed: u64,
    pub frames_processed: u64,
    /// Bytes of partial frames found at the end of chunk files and ignored.
    pub trailing_bytes_dropped: u64,
    pub buffer_capacity_bytes: usize,
    pub flushes: u64,
    pub channels: Vec<ChannelSummary>,
}

/// Lifecycle stage of a [`DemuxEngine`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// No chunk has been read; outputs do not exist yet.
    AwaitingFirstChunk,
    /// The session format is fixed and outputs are open.
    Streaming,
}

struct Streaming {
    format: FormatDescriptor,
    outputs: ChannelOutputSet,
}

struct ChunkStats {
    frames: u64,
    trailing_bytes: usize,
}

/// Splits a sequence of interleaved chunk streams into one file per channel.
///
/// The first chunk fixes the session format and creates the outputs; every
/// chunk, including the first, is then drained frame by frame into the
/// channel buffers. [`DemuxEngine::finish`] flushes the tails and writes the
/// final headers. Dropping the engine early closes the outputs and leaves
/// their headers provisional.
pub struct DemuxEngine {
    budget: BufferBudget,
    layout: OutputLayout,
    overwrite: bool,
    verify_format: bool,
    session: Option<Streaming>,
    metrics: DemuxMetrics,
    processed_bytes: u64,
}

impl DemuxEngine {
    pub fn new(budget: BufferBudget, layout: OutputLayout) -> Self {
        Self {
            budget,
            layout,
            overwrite: false,
            verify_format: true,
            session: None,
            metrics: DemuxMetrics::default(),
            processed_bytes: 0,
        }
    }

    /// Truncate existing output files instead of refusing to touch them.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Compare every chunk's format with the first one (on by default).
    pub fn verify_format(mut self, verify: bool) -> Self {
        self.verify_format = verify;
        self
    }

    pub fn state(&self) -> EngineState {
        match self.session {
            Some(_) => EngineState::Streaming,
            None => EngineState::AwaitingFirstChunk,
        }
    }

    pub fn format(&self) -> Option<&FormatDescriptor> {
        self.session.as_ref().map(|s| &s.format)
    }

    /// Bytes flushed to `channel`'s file so far, if outputs exist.
    pub fn bytes_written(&self, channel: usize) -> Option<u64> {
        self.session
            .as_ref()
            .filter(|s| channel < s.outputs.channel_count())
            .map(|s| s.outputs.bytes_written(channel))
    }

    /// Open the chunk file at `path` and demultiplex all of its frames.
    pub fn process_chunk_file(
        &mut self,
        path: &Path,
        progress: &mut dyn ProgressReporter,
    ) -> Result<(), WavSplitError> {
        info!("processing chunk file '{}'", path.display());
        let file = File::open(path).map_err(|source| WavSplitError::MissingChunkFile {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_BYTES, file);
        self.process_reader(&mut reader, path, progress)
    }

    /// Demultiplex one chunk read from `reader`. `source` names the chunk in
    /// errors and logs.
    pub fn process_reader<R: Read>(
        &mut self,
        reader: R,
        source: &Path,
        progress: &mut dyn ProgressReporter,
    ) -> Result<(), WavSplitError> {
        let mut reader = CountingReader::new(reader);
        let parsed = parse_header(&mut reader)?;
        let base_bytes = self.processed_bytes;

        let session = match &mut self.session {
            Some(session) => {
                if session.format != parsed.format {
                    if self.verify_format {
                        return Err(WavSplitError::FormatMismatch {
                            path: source.to_path_buf(),
                            expected: session.format,
                            found: parsed.format,
                        });
                    }
                    warn!(
                        "'{}' is {}, demultiplexing it as {}",
                        source.display(),
                        parsed.format,
                        session.format
                    );
                }
                session
            }
            None => {
                let capacity = self.budget.per_channel(&parsed.format)?;
                info!(
                    "session format: {}; {} bytes of buffer per channel",
                    parsed.format, capacity
                );
                let outputs = ChannelOutputSet::create(
                    &parsed.format,
                    &self.layout,
                    capacity,
                    self.overwrite,
                )?;
                self.metrics.buffer_capacity_bytes = outputs.buffer_capacity();
                self.session.insert(Streaming {
                    format: parsed.format,
                    outputs,
                })
            }
        };

        let stats = demux_frames(
            &mut reader,
            &session.format,
            &mut session.outputs,
            progress,
            base_bytes,
        )?;

        if stats.trailing_bytes > 0 {
            warn!(
                "dropped {} trailing bytes of an incomplete frame in '{}'",
                stats.trailing_bytes,
                source.display()
            );
        }

        self.processed_bytes += reader.count();
        self.metrics.chunks_processed += 1;
        self.metrics.frames_processed += stats.frames;
        self.metrics.trailing_bytes_dropped += stats.trailing_bytes as u64;
        progress.report(ProgressEvent::Advance {
            processed_bytes: self.processed_bytes,
        });
        Ok(())
    }

    /// Flush every channel's remaining samples and write the final headers.
    pub fn finish(self) -> Result<DemuxMetrics, WavSplitError> {
        let Some(mut session) = self.session else {
            return Err(WavSplitError::NoInputChunks {
                path: self.layout.directory().to_path_buf(),
            });
        };

        session.outputs.flush_all()?;
        let mut metrics = self.metrics;
        metrics.flushes = session.outputs.flushes();
        metrics.channels = session.outputs.finalize()?;

        info!(
            "finalized {} channel file(s) from {} frame(s) in {} chunk(s)",
            metrics.channels.len(),
            metrics.frames_processed,
            metrics.chunks_processed
        );
        Ok(metrics)
    }
}

fn demux_frames<R: Read>(
    reader: &mut CountingReader<R>,
    format: &FormatDescriptor,
    outputs: &mut ChannelOutputSet,
    progress: &mut dyn ProgressReporter,
    base_bytes: u64,
) -> Result<ChunkStats, WavSplitError> {
    let sample_width = format.bytes_per_sample();
    let mut frame = vec![0u8; format.frame_stride()];
    let mut frames = 0u64;
    let mut next_report = reader.count() + PROGRESS_INTERVAL_BYTES;

    loop {
        let filled = read_frame(reader, &mut frame)?;
        if filled < frame.len() {
            return Ok(ChunkStats {
                frames,
                trailing_bytes: filled,
            });
        }

        for (channel, sample) in frame.chunks_exact(sample_width).enumerate() {
            outputs.push_sample(channel, sample)?;
        }
        frames += 1;

        if reader.count() >= next_report {
            progress.report(ProgressEvent::Advance {
                processed_bytes: base_bytes + reader.count(),
            });
            next_report = reader.count() + PROGRESS_INTERVAL_BYTES;
        }
    }
}

/// Fill `frame` from `reader`, returning fewer bytes than its length only at
/// the end of the stream.
fn read_frame<R: Read>(reader: &mut R, frame: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < frame.len() {
        match reader.read(&mut frame[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R> CountingReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }

    fn count(&self) -> u64 {
        self.count
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.count += read as u64;
        Ok(read)
    }
}
