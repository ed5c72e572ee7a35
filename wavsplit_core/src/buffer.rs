use std::io::{self, Write};

use crate::error::WavSplitError;

/// Fixed-capacity append buffer holding whole samples of one channel.
///
/// The capacity is rounded down to a multiple of the sample width so a push
/// never straddles the end of the buffer.
#[derive(Debug)]
pub struct ChannelBuffer {
    data: Vec<u8>,
    capacity: usize,
    sample_width: usize,
}

impl ChannelBuffer {
    /// Allocate a buffer of at most `capacity` bytes for samples that are
    /// `sample_width` bytes wide.
    pub fn with_capacity(capacity: usize, sample_width: usize) -> Result<Self, WavSplitError> {
        if sample_width == 0 {
            return Err(WavSplitError::invalid_config("sample width must be non-zero"));
        }
        let capacity = capacity - capacity % sample_width;
        if capacity == 0 {
            return Err(WavSplitError::invalid_config(format!(
                "a channel buffer must hold at least one {sample_width}-byte sample"
            )));
        }

        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| WavSplitError::AllocationFailure { bytes: capacity })?;

        Ok(Self {
            data,
            capacity,
            sample_width,
        })
    }

    /// Append one sample. Returns `true` when the buffer is now full and must
    /// be drained before the next push.
    pub fn push(&mut self, sample: &[u8]) -> bool {
        debug_assert_eq!(sample.len(), self.sample_width);
        debug_assert!(!self.is_full(), "push into a full channel buffer");
        self.data.extend_from_slice(sample);
        self.is_full()
    }

    /// Write the buffered bytes to `writer` and empty the buffer. Returns the
    /// number of bytes written; an empty buffer writes nothing.
    pub fn drain_to<W: Write>(&mut self, writer: &mut W) -> io::Result<usize> {
        if self.data.is_empty() {
            return Ok(0);
        }
        writer.write_all(&self.data)?;
        let drained = self.data.len();
        self.data.clear();
        Ok(drained)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
