//! Demultiplex interleaved multi-channel WAV recordings into one mono WAV
//! file per channel.
//!
//! The input is either a single WAV file or a recorder session: a directory
//! of same-format chunk files (`00000001.WAV`, `00000002.WAV`, ...) that
//! together hold one continuous recording. Samples are copied byte for byte;
//! nothing is decoded or resampled.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::{info, warn};

pub mod buffer;
pub mod engine;
pub mod error;
pub mod header;
pub mod output;
pub mod progress;
pub mod session;

pub use engine::{
    BufferBudget, DemuxEngine, DemuxMetrics, EngineState, DEFAULT_BUFFER_BUDGET_BYTES,
};
pub use error::WavSplitError;
pub use header::{
    parse_header, write_header, ContainerHeader, FormatDescriptor, ParsedHeader,
};
pub use output::{ChannelOutputSet, ChannelSummary};
pub use progress::{NoProgress, ProgressEvent, ProgressReporter};
pub use session::{InputSource, OutputLayout};

use progress::FnReporter;

/// Configuration for a demultiplexing run.
#[derive(Clone, Debug)]
pub struct Config {
    /// Canonicalized input: a single file or a session directory.
    pub input: InputSource,
    /// Directory into which the channel files will be written.
    pub output_dir: PathBuf,
    /// Memory shared by the channel buffers.
    pub buffer_budget: BufferBudget,
    /// Whether existing channel files may be truncated.
    pub overwrite: bool,
    /// Whether every chunk must share the first chunk's format.
    pub verify_format: bool,
}

impl Config {
    /// Construct a [`Config`] with the default output directory.
    pub fn new<P: AsRef<Path>>(input: P, buffer_budget_bytes: u64) -> Result<Self, WavSplitError> {
        Self::builder(input)
            .buffer_budget_bytes(buffer_budget_bytes)
            .build()
    }

    /// Start building a [`Config`] for `input`.
    pub fn builder<P: AsRef<Path>>(input: P) -> ConfigBuilder {
        ConfigBuilder::new(input.as_ref().to_path_buf())
    }

    /// Output layout describing the channel file names.
    pub fn output_layout(&self) -> Result<OutputLayout, WavSplitError> {
        self.input.output_layout(self.output_dir.clone())
    }
}

/// Builder for [`Config`].
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    input: PathBuf,
    output_dir: Option<PathBuf>,
    buffer_budget_bytes: u64,
    overwrite: bool,
    verify_format: bool,
}

impl ConfigBuilder {
    fn new(input: PathBuf) -> Self {
        Self {
            input,
            output_dir: None,
            buffer_budget_bytes: DEFAULT_BUFFER_BUDGET_BYTES,
            overwrite: false,
            verify_format: true,
        }
    }

    /// Write the channel files into `dir` instead of the default location.
    pub fn output_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.output_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn buffer_budget_bytes(mut self, bytes: u64) -> Self {
        self.buffer_budget_bytes = bytes;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn verify_format(mut self, verify: bool) -> Self {
        self.verify_format = verify;
        self
    }

    pub fn build(self) -> Result<Config, WavSplitError> {
        let buffer_budget = BufferBudget::new(self.buffer_budget_bytes)?;

        let input_path = match fs::canonicalize(&self.input) {
            Ok(path) => path,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(WavSplitError::MissingInput(self.input));
            }
            Err(err) => return Err(err.into()),
        };
        let input = InputSource::detect(input_path);
        let output_dir = self
            .output_dir
            .unwrap_or_else(|| input.default_output_dir());

        Ok(Config {
            input,
            output_dir,
            buffer_budget,
            overwrite: self.overwrite,
            verify_format: self.verify_format,
        })
    }
}

/// Perform the demultiplexing described by `config`.
pub fn run(config: Config) -> Result<(), WavSplitError> {
    run_with_metrics(config, &mut NoProgress).map(|_| ())
}

/// Like [`run`], delivering [`ProgressEvent`]s to `on_event`.
pub fn run_with_progress<F>(config: Config, on_event: F) -> Result<(), WavSplitError>
where
    F: FnMut(ProgressEvent),
{
    let mut reporter = FnReporter(on_event);
    run_with_metrics(config, &mut reporter).map(|_| ())
}

/// Like [`run`], reporting progress to `progress` and returning the session
/// metrics.
pub fn run_with_metrics<P: ProgressReporter>(
    config: Config,
    progress: &mut P,
) -> Result<DemuxMetrics, WavSplitError> {
    let chunks = config.input.chunk_paths()?;
    let layout = config.output_layout()?;
    prepare_output_dir(&config)?;

    if !config.verify_format {
        warn!("chunk formats will not be compared with the first chunk");
    }

    info!(
        "demultiplexing {} chunk file(s) with a {} byte buffer budget",
        chunks.len(),
        config.buffer_budget.total_bytes()
    );
    progress.report(ProgressEvent::Start {
        total_chunks: chunks.len(),
        total_bytes: total_size(&chunks),
    });

    let mut engine = DemuxEngine::new(config.buffer_budget, layout)
        .overwrite(config.overwrite)
        .verify_format(config.verify_format);
    for chunk in &chunks {
        engine.process_chunk_file(chunk, &mut *progress)?;
    }
    let metrics = engine.finish()?;

    progress.report(ProgressEvent::Finish);
    info!(
        "wrote {} channel file(s) to '{}'",
        metrics.channels.len(),
        config.output_dir.display()
    );
    Ok(metrics)
}

/// Paths of the channel files a run of `config` would create.
///
/// Only the header of the first chunk is read; nothing is written.
pub fn plan_outputs(config: &Config) -> Result<Vec<PathBuf>, WavSplitError> {
    let chunks = config.input.chunk_paths()?;
    let layout = config.output_layout()?;
    let Some(first) = chunks.first() else {
        return Err(WavSplitError::NoInputChunks {
            path: config.input.path().to_path_buf(),
        });
    };

    let file = File::open(first).map_err(|source| WavSplitError::MissingChunkFile {
        path: first.clone(),
        source,
    })?;
    let parsed = parse_header(&mut BufReader::new(file))?;
    config.buffer_budget.per_channel(&parsed.format)?;

    Ok(layout.channel_paths(usize::from(parsed.format.channel_count)))
}

fn prepare_output_dir(config: &Config) -> Result<(), WavSplitError> {
    if config.output_dir.is_dir() {
        return Ok(());
    }

    let session_default = matches!(config.input, InputSource::Session(_))
        && config.output_dir == config.input.default_output_dir();
    if !session_default {
        return Err(WavSplitError::MissingOutputDirectory(
            config.output_dir.clone(),
        ));
    }

    info!(
        "creating output directory '{}'",
        config.output_dir.display()
    );
    fs::create_dir(&config.output_dir)?;
    Ok(())
}

fn total_size(chunks: &[PathBuf]) -> Option<u64> {
    chunks
        .iter()
        .map(|path| fs::metadata(path).ok().map(|meta| meta.len()))
        .sum()
}
