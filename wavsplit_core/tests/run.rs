use std::error::Error;
use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::get_probe;
use tempfile::tempdir;
use wavsplit_core::session::chunk_file_name;
use wavsplit_core::{
    parse_header, plan_outputs, run, run_with_metrics, run_with_progress, BufferBudget, Config,
    DemuxEngine, NoProgress, OutputLayout, ProgressEvent, WavSplitError,
};

/// Interleaved PCM fixture described by its layout and raw frame bytes.
///
/// Fixtures are synthesised at runtime so that no binary assets need to be
/// stored in the repository. Every sample encodes its frame and channel so
/// misplaced bytes are easy to spot.
struct Fixture {
    channels: u16,
    bits_per_sample: u16,
    sample_rate: u32,
    data: Vec<u8>,
}

impl Fixture {
    fn new(channels: u16, bits_per_sample: u16, frames: usize, seed: u32) -> Self {
        let width = usize::from(bits_per_sample / 8);
        let mut data = Vec::with_capacity(frames * width * usize::from(channels));
        for frame in 0..frames {
            for channel in 0..channels {
                let value = seed
                    .wrapping_mul(7_919)
                    .wrapping_add(frame as u32 * 97)
                    .wrapping_add(u32::from(channel) * 13);
                data.extend_from_slice(&value.to_le_bytes()[..width]);
            }
        }
        Self {
            channels,
            bits_per_sample,
            sample_rate: 48_000,
            data,
        }
    }

    fn width(&self) -> usize {
        usize::from(self.bits_per_sample / 8)
    }

    fn frames(&self) -> usize {
        self.data.len() / (self.width() * usize::from(self.channels))
    }

    fn channel(&self, channel: usize) -> Vec<u8> {
        let width = self.width();
        self.data
            .chunks_exact(width * usize::from(self.channels))
            .flat_map(|frame| frame[channel * width..(channel + 1) * width].to_vec())
            .collect()
    }

    fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn Error>> {
        self.write_with_chunks(path, &[])
    }

    /// Write the fixture with extra sub-chunks placed before `fmt `.
    fn write_with_chunks<P: AsRef<Path>>(
        &self,
        path: P,
        extra: &[(&[u8; 4], &[u8])],
    ) -> Result<(), Box<dyn Error>> {
        let block_align = self.channels * (self.bits_per_sample / 8);
        let byte_rate = self.sample_rate * u32::from(block_align);
        let data_len = self.data.len() as u32;

        let mut file = File::create(path)?;
        file.write_all(b"RIFF")?;
        file.write_all(&(36u32 + data_len).to_le_bytes())?;
        file.write_all(b"WAVE")?;
        for (tag, payload) in extra {
            file.write_all(*tag)?;
            file.write_all(&(payload.len() as u32).to_le_bytes())?;
            file.write_all(payload)?;
        }
        file.write_all(b"fmt ")?;
        file.write_all(&16u32.to_le_bytes())?; // PCM header size
        file.write_all(&1u16.to_le_bytes())?; // audio format = PCM
        file.write_all(&self.channels.to_le_bytes())?;
        file.write_all(&self.sample_rate.to_le_bytes())?;
        file.write_all(&byte_rate.to_le_bytes())?;
        file.write_all(&block_align.to_le_bytes())?;
        file.write_all(&self.bits_per_sample.to_le_bytes())?;
        file.write_all(b"data")?;
        file.write_all(&data_len.to_le_bytes())?;
        file.write_all(&self.data)?;
        Ok(())
    }
}

/// Header fields and payload of a written channel file.
struct ChannelFile {
    riff_size: u32,
    data_bytes: u32,
    channels: u16,
    data: Vec<u8>,
}

fn read_channel_file(path: &Path) -> Result<ChannelFile, Box<dyn Error>> {
    let bytes = fs::read(path)?;
    let riff_size = u32::from_le_bytes(bytes[4..8].try_into()?);
    let parsed = parse_header(&mut Cursor::new(&bytes))?;
    Ok(ChannelFile {
        riff_size,
        data_bytes: parsed.declared_data_bytes,
        channels: parsed.format.channel_count,
        data: bytes[44..].to_vec(),
    })
}

fn write_session(dir: &Path, chunks: &[&Fixture]) -> Result<(), Box<dyn Error>> {
    for (index, chunk) in chunks.iter().enumerate() {
        chunk.write(dir.join(chunk_file_name(index as u64 + 1)))?;
    }
    Ok(())
}

fn session_output(dir: &Path, channel: usize) -> PathBuf {
    dir.join("out").join(format!("ch_{}.wav", channel + 1))
}

#[test]
fn run_round_trips_stereo_input() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("take.wav");
    let fixture = Fixture::new(2, 16, 1_001, 1);
    fixture.write(&input_path)?;

    run(Config::new(&input_path, 1 << 20)?)?;

    let left = read_channel_file(&work_dir.path().join("take_channel_1.wav"))?;
    let right = read_channel_file(&work_dir.path().join("take_channel_2.wav"))?;
    assert_eq!(left.channels, 1);

    let mut interleaved = Vec::with_capacity(fixture.data.len());
    for (l, r) in left.data.chunks_exact(2).zip(right.data.chunks_exact(2)) {
        interleaved.extend_from_slice(l);
        interleaved.extend_from_slice(r);
    }
    assert_eq!(interleaved, fixture.data);

    work_dir.close()?;
    Ok(())
}

#[test]
fn headers_match_bytes_written_for_any_budget() -> Result<(), Box<dyn Error>> {
    let fixture = Fixture::new(3, 24, 517, 2);

    for budget in [9u64, 30, 1_000, 1 << 20] {
        let work_dir = tempdir()?;
        let input_path = work_dir.path().join("take.wav");
        fixture.write(&input_path)?;

        let config = Config::new(&input_path, budget)?;
        let metrics = run_with_metrics(config, &mut NoProgress)?;
        assert_eq!(metrics.frames_processed, fixture.frames() as u64);

        for (channel, summary) in metrics.channels.iter().enumerate() {
            let written = read_channel_file(&summary.path)?;
            let expected = (fixture.frames() * fixture.width()) as u64;
            assert_eq!(summary.bytes_written, expected, "budget {budget}");
            assert_eq!(u64::from(written.data_bytes), summary.bytes_written);
            assert_eq!(written.riff_size, 36 + written.data_bytes);
            assert_eq!(written.data, fixture.channel(channel));
        }

        work_dir.close()?;
    }
    Ok(())
}

#[test]
fn flush_boundaries_do_not_change_output() -> Result<(), Box<dyn Error>> {
    let fixture = Fixture::new(2, 16, 100, 3);
    let mut results = Vec::new();

    // Three frames' worth of one channel per buffer, then effectively unbounded.
    for budget in [2 * 3 * 2, 1 << 20] {
        let work_dir = tempdir()?;
        let input_path = work_dir.path().join("take.wav");
        fixture.write(&input_path)?;
        let metrics = run_with_metrics(Config::new(&input_path, budget)?, &mut NoProgress)?;
        let outputs = metrics
            .channels
            .iter()
            .map(|c| fs::read(&c.path))
            .collect::<Result<Vec<_>, _>>()?;
        results.push((metrics.flushes, outputs));
        work_dir.close()?;
    }

    assert!(results[0].0 > results[1].0);
    assert_eq!(results[0].1, results[1].1);
    Ok(())
}

#[test]
fn unknown_sub_chunks_are_skipped() -> Result<(), Box<dyn Error>> {
    let fixture = Fixture::new(2, 16, 64, 4);
    let work_dir = tempdir()?;

    let plain = work_dir.path().join("plain.wav");
    fixture.write(&plain)?;
    let tagged = work_dir.path().join("tagged.wav");
    fixture.write_with_chunks(
        &tagged,
        &[(b"LIST", &b"INFOISFTabcd"[..]), (b"bext", &b"xy"[..])],
    )?;

    run(Config::new(&plain, 1 << 20)?)?;
    run(Config::new(&tagged, 1 << 20)?)?;

    for channel in 1..=2 {
        let a = fs::read(work_dir.path().join(format!("plain_channel_{channel}.wav")))?;
        let b = fs::read(work_dir.path().join(format!("tagged_channel_{channel}.wav")))?;
        assert_eq!(a, b);
    }

    work_dir.close()?;
    Ok(())
}

#[test]
fn session_chunks_are_joined_without_gaps() -> Result<(), Box<dyn Error>> {
    let session = tempdir()?;
    let chunks = [
        Fixture::new(4, 16, 40, 10),
        Fixture::new(4, 16, 7, 11),
        Fixture::new(4, 16, 23, 12),
    ];
    write_session(session.path(), &[&chunks[0], &chunks[1], &chunks[2]])?;

    // Buffers of 5 samples never line up with the chunk boundaries.
    let metrics = run_with_metrics(Config::new(session.path(), 4 * 10)?, &mut NoProgress)?;
    assert_eq!(metrics.chunks_processed, 3);

    for channel in 0..4 {
        let written = read_channel_file(&session_output(session.path(), channel))?;
        let expected: Vec<u8> = chunks.iter().flat_map(|c| c.channel(channel)).collect();
        assert_eq!(written.data_bytes as usize, (40 + 7 + 23) * 2);
        assert_eq!(written.data, expected);
    }

    session.close()?;
    Ok(())
}

#[test]
fn lowercase_session_names_are_processed() -> Result<(), Box<dyn Error>> {
    let session = tempdir()?;
    let chunks = [Fixture::new(2, 16, 12, 20), Fixture::new(2, 16, 9, 21)];
    chunks[0].write(session.path().join("00000001.wav"))?;
    chunks[1].write(session.path().join("00000002.wav"))?;

    let metrics = run_with_metrics(Config::new(session.path(), 1 << 20)?, &mut NoProgress)?;
    assert_eq!(metrics.chunks_processed, 2);

    for channel in 0..2 {
        let written = read_channel_file(&session_output(session.path(), channel))?;
        let expected: Vec<u8> = chunks.iter().flat_map(|c| c.channel(channel)).collect();
        assert_eq!(written.data, expected);
    }

    session.close()?;
    Ok(())
}

#[test]
fn stray_high_index_reports_first_gap() -> Result<(), Box<dyn Error>> {
    let session = tempdir()?;
    let fixture = Fixture::new(2, 16, 8, 22);
    fixture.write(session.path().join(chunk_file_name(1)))?;
    fixture.write(session.path().join("FFFFFFFF.WAV"))?;

    let err = run(Config::new(session.path(), 1 << 20)?).expect_err("chunk 2 is missing");
    match err {
        WavSplitError::MissingChunkFile { path, .. } => {
            assert!(path.ends_with(chunk_file_name(2)));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    session.close()?;
    Ok(())
}

#[test]
fn missing_chunk_leaves_headers_provisional() -> Result<(), Box<dyn Error>> {
    let session = tempdir()?;
    let fixture = Fixture::new(2, 16, 50, 5);
    fixture.write(session.path().join(chunk_file_name(1)))?;
    fixture.write(session.path().join(chunk_file_name(2)))?;
    fixture.write(session.path().join(chunk_file_name(4)))?;

    let err = run(Config::new(session.path(), 16)?).expect_err("chunk 3 is missing");
    match err {
        WavSplitError::MissingChunkFile { path, .. } => {
            assert!(path.ends_with(chunk_file_name(3)));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    for channel in 0..2 {
        let written = read_channel_file(&session_output(session.path(), channel))?;
        assert_eq!(written.data_bytes, 0);
        assert_eq!(written.riff_size, 36);
        assert!(!written.data.is_empty());
    }

    session.close()?;
    Ok(())
}

#[test]
fn empty_session_creates_nothing() -> Result<(), Box<dyn Error>> {
    let session = tempdir()?;
    File::create(session.path().join("notes.txt"))?;

    let err = run(Config::new(session.path(), 1 << 20)?).expect_err("no chunks");
    assert!(matches!(err, WavSplitError::NoInputChunks { .. }));
    assert!(!session.path().join("out").exists());

    session.close()?;
    Ok(())
}

#[test]
fn session_format_change_is_reported() -> Result<(), Box<dyn Error>> {
    let session = tempdir()?;
    let first = Fixture::new(2, 16, 10, 6);
    let second = Fixture::new(2, 24, 10, 7);
    write_session(session.path(), &[&first, &second])?;

    let err = run(Config::new(session.path(), 1 << 20)?).expect_err("formats differ");
    assert!(matches!(err, WavSplitError::FormatMismatch { .. }));

    let config = Config::builder(session.path())
        .buffer_budget_bytes(1 << 20)
        .verify_format(false)
        .overwrite(true)
        .build()?;
    run(config)?;

    session.close()?;
    Ok(())
}

#[test]
fn existing_outputs_require_overwrite() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("take.wav");
    Fixture::new(2, 16, 10, 8).write(&input_path)?;

    run(Config::new(&input_path, 1 << 20)?)?;
    let err = run(Config::new(&input_path, 1 << 20)?).expect_err("outputs exist");
    assert!(matches!(err, WavSplitError::OutputExists(_)));

    let config = Config::builder(&input_path)
        .buffer_budget_bytes(1 << 20)
        .overwrite(true)
        .build()?;
    run(config)?;

    work_dir.close()?;
    Ok(())
}

#[test]
fn run_detects_missing_output_directory() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("tone.wav");
    Fixture::new(2, 16, 10, 9).write(&input_path)?;

    let output_dir = tempdir()?;
    let output_path = output_dir.path().to_path_buf();
    let config = Config::builder(&input_path)
        .output_dir(&output_path)
        .build()?;

    // Remove the directory after configuration has been created to simulate external deletion.
    drop(output_dir);
    assert!(!output_path.exists());

    let err = run(config).expect_err("missing output directory should be reported");
    match err {
        WavSplitError::MissingOutputDirectory(path) => {
            assert_eq!(path, output_path);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    work_dir.close()?;
    Ok(())
}

#[test]
fn run_reports_malformed_input() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("input.bin");
    File::create(&input_path)?.write_all(b"not an audio file")?;

    let err = run(Config::new(&input_path, 1 << 20)?).expect_err("garbage input should fail");
    assert!(matches!(err, WavSplitError::MalformedContainer { .. }));

    work_dir.close()?;
    Ok(())
}

#[test]
fn config_rejects_unusable_budgets() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("take.wav");
    Fixture::new(4, 24, 10, 10).write(&input_path)?;

    assert!(matches!(
        Config::new(&input_path, 0),
        Err(WavSplitError::InvalidConfiguration { .. })
    ));

    // Four channels of three-byte samples need at least twelve bytes.
    let err = run(Config::new(&input_path, 11)?).expect_err("budget too small");
    assert!(matches!(err, WavSplitError::InvalidConfiguration { .. }));
    assert!(!work_dir.path().join("take_channel_1.wav").exists());

    assert!(matches!(
        Config::new(work_dir.path().join("absent.wav"), 1),
        Err(WavSplitError::MissingInput(_))
    ));

    work_dir.close()?;
    Ok(())
}

#[test]
fn outputs_decode_as_standalone_mono_files() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let input_path = work_dir.path().join("take.wav");
    let fixture = Fixture::new(3, 16, 480, 11);
    fixture.write(&input_path)?;
    run(Config::new(&input_path, 1 << 16)?)?;

    for channel in 1..=3 {
        let path = work_dir.path().join(format!("take_channel_{channel}.wav"));
        let mut hint = Hint::new();
        hint.with_extension("wav");
        let mss = MediaSourceStream::new(Box::new(File::open(&path)?), Default::default());
        let opened = get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let track = opened
            .format
            .default_track()
            .ok_or("output has no default track")?;
        let params = &track.codec_params;
        assert_eq!(params.sample_rate, Some(fixture.sample_rate));
        assert_eq!(params.channels.map(|c| c.count()), Some(1));
        assert_eq!(params.n_frames, Some(fixture.frames() as u64));
    }

    work_dir.close()?;
    Ok(())
}

#[test]
fn plan_lists_outputs_without_writing() -> Result<(), Box<dyn Error>> {
    let session = tempdir()?;
    write_session(session.path(), &[&Fixture::new(3, 16, 4, 12)])?;

    let config = Config::new(session.path(), 1 << 20)?;
    let plan = plan_outputs(&config)?;
    assert_eq!(
        plan,
        (0..3)
            .map(|c| session_output(config.input.path(), c))
            .collect::<Vec<_>>()
    );
    assert!(!session.path().join("out").exists());

    session.close()?;
    Ok(())
}

#[test]
fn engine_can_be_driven_chunk_by_chunk() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let chunks = [Fixture::new(3, 16, 5, 23), Fixture::new(3, 16, 4, 24)];
    for (index, chunk) in chunks.iter().enumerate() {
        chunk.write(work_dir.path().join(chunk_file_name(index as u64 + 1)))?;
    }
    let out_dir = work_dir.path().join("split");
    fs::create_dir(&out_dir)?;

    let mut engine =
        DemuxEngine::new(BufferBudget::new(64)?, OutputLayout::indexed(out_dir.clone()));
    for index in 1..=2 {
        let chunk = work_dir.path().join(chunk_file_name(index));
        engine.process_chunk_file(&chunk, &mut NoProgress)?;
    }
    let metrics = engine.finish()?;
    assert_eq!(metrics.frames_processed, 9);

    for channel in 0..3 {
        let written = read_channel_file(&out_dir.join(format!("ch_{}.wav", channel + 1)))?;
        let expected: Vec<u8> = chunks.iter().flat_map(|c| c.channel(channel)).collect();
        assert_eq!(written.data, expected);
    }

    work_dir.close()?;
    Ok(())
}

#[test]
fn progress_events_bracket_the_run() -> Result<(), Box<dyn Error>> {
    let session = tempdir()?;
    let a = Fixture::new(2, 16, 30, 13);
    let b = Fixture::new(2, 16, 20, 14);
    write_session(session.path(), &[&a, &b])?;
    let expected_total = 2 * 44 + (a.data.len() + b.data.len()) as u64;

    let mut events = Vec::new();
    run_with_progress(Config::new(session.path(), 1 << 20)?, |event| {
        events.push(event)
    })?;

    assert_eq!(
        events.first(),
        Some(&ProgressEvent::Start {
            total_chunks: 2,
            total_bytes: Some(expected_total),
        })
    );
    assert_eq!(events.last(), Some(&ProgressEvent::Finish));
    assert!(events.contains(&ProgressEvent::Advance {
        processed_bytes: expected_total
    }));

    session.close()?;
    Ok(())
}
