//! Input discovery and output naming.
//!
//! A session is a directory of chunk files named by an ascending, 1-based
//! index rendered as eight upper-case hexadecimal digits (`00000001.WAV`,
//! `00000002.WAV`, ...). A plain WAV file is treated as a session of one.
//! Chunks are processed from index 1 up to the first missing index.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::WavSplitError;

pub const CHUNK_EXTENSION: &str = "WAV";

/// Name of the directory created inside a session for the channel files.
pub const SESSION_OUTPUT_DIR: &str = "out";

/// File name of the chunk with the given 1-based index.
pub fn chunk_file_name(index: u64) -> String {
    format!("{index:08X}.{CHUNK_EXTENSION}")
}

/// Parse the index out of a chunk file name, accepting either case for the
/// digits and the extension.
pub fn parse_chunk_index(file_name: &str) -> Option<u64> {
    let (stem, extension) = file_name.rsplit_once('.')?;
    if !extension.eq_ignore_ascii_case(CHUNK_EXTENSION) {
        return None;
    }
    if stem.len() != 8 || !stem.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(stem, 16).ok()
}

/// Scan `dir` for chunk files and return them keyed by index, with the file
/// names as they appear on disk.
///
/// When the same index is present under names differing only in case, the
/// canonical upper-case name wins.
pub fn enumerate_chunks(dir: &Path) -> Result<BTreeMap<u64, PathBuf>, WavSplitError> {
    let mut chunks = BTreeMap::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(index) = parse_chunk_index(name).filter(|&index| index > 0) else {
            continue;
        };
        debug!("found chunk file {name} (index {index})");

        let canonical = name == chunk_file_name(index);
        match chunks.entry(index) {
            Entry::Vacant(slot) => {
                slot.insert(entry.path());
            }
            Entry::Occupied(mut slot) => {
                warn!(
                    "chunk {index} is present more than once in '{}'",
                    dir.display()
                );
                if canonical {
                    slot.insert(entry.path());
                }
            }
        }
    }
    Ok(chunks)
}

/// Where the interleaved audio comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputSource {
    /// A single multi-channel WAV file.
    File(PathBuf),
    /// A directory of numbered chunk files forming one recording.
    Session(PathBuf),
}

impl InputSource {
    /// Classify `path`: directories are sessions, anything else a single file.
    pub fn detect(path: PathBuf) -> Self {
        if path.is_dir() {
            Self::Session(path)
        } else {
            Self::File(path)
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::File(path) | Self::Session(path) => path,
        }
    }

    /// Ordered paths of the chunk files to demultiplex.
    pub fn chunk_paths(&self) -> Result<Vec<PathBuf>, WavSplitError> {
        match self {
            Self::File(path) => Ok(vec![path.clone()]),
            Self::Session(dir) => {
                let found = enumerate_chunks(dir)?;
                if found.is_empty() {
                    return Err(WavSplitError::NoInputChunks { path: dir.clone() });
                }
                Ok(contiguous_chunks(dir, found))
            }
        }
    }

    /// Directory the channel files go to when none is configured.
    pub fn default_output_dir(&self) -> PathBuf {
        match self {
            Self::File(path) => path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
            Self::Session(dir) => dir.join(SESSION_OUTPUT_DIR),
        }
    }

    /// Naming scheme for the channel files written into `directory`.
    pub fn output_layout(&self, directory: PathBuf) -> Result<OutputLayout, WavSplitError> {
        let naming = match self {
            Self::File(path) => {
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .ok_or(WavSplitError::InvalidInputName)?;
                ChannelNaming::Stem(stem.to_owned())
            }
            Self::Session(_) => ChannelNaming::Index,
        };
        Ok(OutputLayout { directory, naming })
    }
}

/// Paths of the chunks `1, 2, ...` in order. At the first missing index the
/// list ends with the path that chunk would have, so opening it reports the
/// gap after the chunks before it have been processed.
fn contiguous_chunks(dir: &Path, found: BTreeMap<u64, PathBuf>) -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(found.len());
    for (expected, (index, path)) in (1u64..).zip(found) {
        if index != expected {
            warn!(
                "session '{}' has no chunk {expected}; later chunks are not processed",
                dir.display()
            );
            paths.push(dir.join(chunk_file_name(expected)));
            break;
        }
        paths.push(path);
    }
    paths
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum ChannelNaming {
    /// `ch_<n>.wav`
    Index,
    /// `<stem>_channel_<n>.wav`
    Stem(String),
}

/// Directory and naming scheme of the per-channel output files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputLayout {
    directory: PathBuf,
    naming: ChannelNaming,
}

impl OutputLayout {
    /// Layout producing `ch_<n>.wav` files in `directory`.
    pub fn indexed(directory: PathBuf) -> Self {
        Self {
            directory,
            naming: ChannelNaming::Index,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the output for the 0-based `channel`; names are 1-based.
    pub fn channel_path(&self, channel: usize) -> PathBuf {
        let number = channel + 1;
        let file_name = match &self.naming {
            ChannelNaming::Index => format!("ch_{number}.wav"),
            ChannelNaming::Stem(stem) => format!("{stem}_channel_{number}.wav"),
        };
        self.directory.join(file_name)
    }

    pub fn channel_paths(&self, channel_count: usize) -> Vec<PathBuf> {
        (0..channel_count).map(|c| self.channel_path(c)).collect()
    }
}
