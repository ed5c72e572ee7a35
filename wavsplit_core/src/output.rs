use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::buffer::ChannelBuffer;
use crate::error::WavSplitError;
use crate::header::{write_header, FormatDescriptor, MAX_DATA_BYTES};
use crate::session::OutputLayout;

/// Final size of one channel file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelSummary {
    pub path: PathBuf,
    /// Audio bytes appended after the header.
    pub bytes_written: u64,
}

#[derive(Debug)]
struct ChannelOutput {
    path: PathBuf,
    file: File,
    buffer: ChannelBuffer,
    bytes_written: u64,
}

impl ChannelOutput {
    fn write_failure(&self, source: io::Error) -> WavSplitError {
        WavSplitError::WriteFailure {
            target: format!("channel output '{}'", self.path.display()),
            source,
        }
    }
}

/// The open output files of a session, one per channel, each with its own
/// write buffer.
///
/// Every file starts with a provisional header claiming zero data bytes; the
/// real lengths are written by [`ChannelOutputSet::finalize`]. Dropping the
/// set without finalizing closes the files and leaves the provisional
/// headers in place.
#[derive(Debug)]
pub struct ChannelOutputSet {
    format: FormatDescriptor,
    channels: Vec<ChannelOutput>,
    flushes: u64,
}

impl ChannelOutputSet {
    /// Create one output per channel of `format` following `layout`, each
    /// with a buffer of `buffer_capacity` bytes.
    ///
    /// Without `overwrite`, an existing file is reported as
    /// [`WavSplitError::OutputExists`]. If any channel fails, the files opened
    /// so far are closed before the error is returned.
    pub fn create(
        format: &FormatDescriptor,
        layout: &OutputLayout,
        buffer_capacity: usize,
        overwrite: bool,
    ) -> Result<Self, WavSplitError> {
        let channel_count = usize::from(format.channel_count);

        let mut channels = Vec::new();
        channels
            .try_reserve_exact(channel_count)
            .map_err(|_| WavSplitError::AllocationFailure {
                bytes: channel_count * std::mem::size_of::<ChannelOutput>(),
            })?;

        for channel in 0..channel_count {
            let path = layout.channel_path(channel);
            let mut file = open_output(&path, overwrite)?;
            write_header(&mut file, format, 1, 0)
                .map_err(|err| err.in_target(format!("header of '{}'", path.display())))?;
            let buffer = ChannelBuffer::with_capacity(buffer_capacity, format.bytes_per_sample())?;
            channels.push(ChannelOutput {
                path,
                file,
                buffer,
                bytes_written: 0,
            });
        }

        info!(
            "created {} channel output(s) in '{}'",
            channel_count,
            layout.directory().display()
        );

        Ok(Self {
            format: *format,
            channels,
            flushes: 0,
        })
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Bytes appended to `channel`'s file so far, excluding the header and
    /// anything still buffered.
    pub fn bytes_written(&self, channel: usize) -> u64 {
        self.channels[channel].bytes_written
    }

    pub fn buffered_bytes(&self, channel: usize) -> usize {
        self.channels[channel].buffer.len()
    }

    pub fn buffer_capacity(&self) -> usize {
        self.channels
            .first()
            .map(|c| c.buffer.capacity())
            .unwrap_or_default()
    }

    /// Number of buffer drains that wrote data.
    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    /// Append one sample to `channel`, flushing its buffer as soon as it
    /// fills up.
    pub fn push_sample(&mut self, channel: usize, sample: &[u8]) -> Result<(), WavSplitError> {
        if self.channels[channel].buffer.push(sample) {
            self.flush(channel)?;
        }
        Ok(())
    }

    /// Append the buffered bytes of `channel` to its file. A no-op when the
    /// buffer is empty.
    pub fn flush(&mut self, channel: usize) -> Result<(), WavSplitError> {
        let output = &mut self.channels[channel];
        let pending = output.buffer.len() as u64;
        if pending == 0 {
            return Ok(());
        }

        let total = output.bytes_written + pending;
        if total > MAX_DATA_BYTES {
            return Err(WavSplitError::ContainerTooLarge {
                channel: channel + 1,
                bytes: total,
            });
        }

        let drained = output
            .buffer
            .drain_to(&mut output.file)
            .map_err(|source| output.write_failure(source))?;
        output.bytes_written += drained as u64;
        self.flushes += 1;
        debug!(
            "flushed {} bytes to channel {} ({} total)",
            drained,
            channel + 1,
            output.bytes_written
        );
        Ok(())
    }

    pub fn flush_all(&mut self) -> Result<(), WavSplitError> {
        for channel in 0..self.channels.len() {
            self.flush(channel)?;
        }
        Ok(())
    }

    /// Flush what is left, release the buffers, and rewrite every header with
    /// the final data length before closing the files.
    pub fn finalize(mut self) -> Result<Vec<ChannelSummary>, WavSplitError> {
        self.flush_all()?;

        let format = self.format;
        let mut summaries = Vec::with_capacity(self.channels.len());
        for output in self.channels {
            let ChannelOutput {
                path,
                mut file,
                buffer,
                bytes_written,
            } = output;
            drop(buffer);

            // Bounded by MAX_DATA_BYTES in flush.
            let data_bytes = u32::try_from(bytes_written).unwrap_or(u32::MAX);
            rewrite_header(&mut file, &format, data_bytes)
                .map_err(|err| err.in_target(format!("final header of '{}'", path.display())))?;

            debug!(
                "finalized '{}' with {} data bytes",
                path.display(),
                bytes_written
            );
            summaries.push(ChannelSummary {
                path,
                bytes_written,
            });
        }

        Ok(summaries)
    }
}

fn rewrite_header(
    file: &mut File,
    format: &FormatDescriptor,
    data_bytes: u32,
) -> Result<(), WavSplitError> {
    let failure = |source| WavSplitError::WriteFailure {
        target: String::from("container header"),
        source,
    };
    file.seek(SeekFrom::Start(0)).map_err(failure)?;
    write_header(file, format, 1, data_bytes)?;
    file.flush().map_err(failure)
}

fn open_output(path: &Path, overwrite: bool) -> Result<File, WavSplitError> {
    let mut options = OpenOptions::new();
    options.read(true).write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    options.open(path).map_err(|source| match source.kind() {
        io::ErrorKind::AlreadyExists => WavSplitError::OutputExists(path.to_path_buf()),
        _ => WavSplitError::WriteFailure {
            target: format!("output file '{}'", path.display()),
            source,
        },
    })
}
