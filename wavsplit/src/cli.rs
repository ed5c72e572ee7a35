pub mod size;

use std::path::PathBuf;

use clap::{builder::ValueParser, value_parser, Arg, ArgAction, Command};

pub const DEFAULT_BUFFER_SIZE: &str = "4096MiB";

pub fn build_cli() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .about("Split multi-channel WAV recordings into one mono file per channel")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("buffer-size")
                .short('m')
                .long("buffer-size")
                .value_name("SIZE")
                .help("Memory shared by the channel buffers (e.g. 512, 64KiB, 1.5G; bare numbers are MiB)")
                .default_value(DEFAULT_BUFFER_SIZE)
                .value_parser(ValueParser::new(size::parse_byte_size)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("OUTPUT_DIR")
                .help("Existing directory for the channel files [default: <session>/out or the input file's directory]")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("overwrite")
                .long("overwrite")
                .help("Allow overwriting existing channel files")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("List the channel files that would be written without writing them")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("skip-format-check")
                .long("skip-format-check")
                .help("Do not require every chunk to match the first chunk's format")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("input")
                .value_name("INPUT")
                .help("Session directory of numbered chunk files, or a single WAV file")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
}
