#[macro_use]
extern crate clap;

use clap::{Arg, SubCommand};
use flipjump::memory::io::StdIo;
use flipjump::{GarbageHandling, RunConfig, SparseMemory, WordSize};
use std::fs::File;
use std::io::prelude::*;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

#[derive(Debug)]
enum IOErrorContext {
    ReadInput,
    WriteOutput,
}

#[derive(Debug)]
enum Error {
    Assemble(fjasm::Error),
    FileFormat(fjbin::FileFormatError),
    Runtime(flipjump::RuntimeError),
    Io(std::io::Error, IOErrorContext, PathBuf),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err, context, path) => write!(
                f,
                "{} file \"{}\" failed: {}",
                match context {
                    IOErrorContext::ReadInput => "Reading input",
                    IOErrorContext::WriteOutput => "Writing output",
                },
                path.display(),
                err
            ),
            Error::Assemble(err) => write!(f, "Assembling input failed: {}", err),
            Error::FileFormat(err) => write!(f, "Reading image failed: {}", err),
            Error::Runtime(err) => write!(f, "Execution failed: {}", err),
        }
    }
}

fn main() {
    let matches = app_from_crate!()
        .subcommand(
            SubCommand::with_name("assemble")
                .about("Assembles FlipJump source into a .fjm image")
                .arg(
                    Arg::with_name("INPUT")
                        .help("Sets the source file to assemble")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("output")
                        .short("o")
                        .long("output")
                        .takes_value(true)
                        .value_name("OUTPUT")
                        .help("Sets the .fjm file to write to"),
                )
                .arg(
                    Arg::with_name("word_size")
                        .short("w")
                        .long("word-size")
                        .takes_value(true)
                        .value_name("BITS")
                        .default_value("64")
                        .help("Word size in bits: 8, 16, 32, or 64"),
                )
                .arg(
                    Arg::with_name("version")
                        .long("image-version")
                        .takes_value(true)
                        .value_name("VERSION")
                        .default_value("1")
                        .help(".fjm format version to emit: 0 or 1"),
                ),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Loads and runs a .fjm image")
                .arg(
                    Arg::with_name("INPUT")
                        .help("Sets the .fjm file to run")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("garbage")
                        .long("garbage-handling")
                        .takes_value(true)
                        .value_name("POLICY")
                        .default_value("continue")
                        .help("stop, slow-read, only-warning, or continue"),
                )
                .arg(
                    Arg::with_name("trace")
                        .long("trace")
                        .help("Emit one tracing event per executed step"),
                ),
        )
        .get_matches();

    let result = match matches.subcommand() {
        ("assemble", Some(m)) => assemble_cmd(m),
        ("run", Some(m)) => run_cmd(m),
        _ => {
            eprintln!("{}", matches.usage());
            std::process::exit(1);
        }
    };

    if let Err(err) = result {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

fn assemble_cmd(matches: &clap::ArgMatches) -> Result<(), Error> {
    let input = matches.value_of("INPUT").unwrap();
    let input_path = Path::new(input);

    let mut source = String::new();
    File::open(input_path)
        .and_then(|mut f| f.read_to_string(&mut source))
        .map_err(|e| Error::Io(e, IOErrorContext::ReadInput, input_path.to_owned()))?;

    let bits: u32 = matches
        .value_of("word_size")
        .unwrap()
        .parse()
        .unwrap_or(64);
    let word_size = WordSize::from_bits(bits).unwrap_or_default();
    let version: u64 = matches.value_of("version").unwrap().parse().unwrap_or(1);

    let _ = tracing_subscriber::fmt::try_init();

    let config = fjasm::AssembleConfig {
        word_size,
        warnings_as_errors: false,
    };
    let writer =
        fjasm::assemble_to_writer(&source, &config, version, 0).map_err(Error::Assemble)?;

    let output_path: PathBuf = matches
        .value_of("output")
        .map(PathBuf::from)
        .unwrap_or_else(|| input_path.with_extension("fjm"));

    let mut out = BufWriter::new(
        File::create(&output_path)
            .map_err(|e| Error::Io(e, IOErrorContext::WriteOutput, output_path.clone()))?,
    );
    writer
        .write(&mut out)
        .map_err(Error::FileFormat)
}

fn run_cmd(matches: &clap::ArgMatches) -> Result<(), Error> {
    let input = matches.value_of("INPUT").unwrap();
    let input_path = Path::new(input);

    let file = File::open(input_path)
        .map_err(|e| Error::Io(e, IOErrorContext::ReadInput, input_path.to_owned()))?;
    let mut reader = BufReader::new(file);
    let image = fjbin::read(&mut reader).map_err(Error::FileFormat)?;

    let word_size = WordSize::from_bits(image.word_size as u32).ok_or_else(|| {
        Error::FileFormat(fjbin::FileFormatError::UnsupportedWordSize(image.word_size))
    })?;

    let garbage_handling: GarbageHandling = matches
        .value_of("garbage")
        .unwrap()
        .parse()
        .unwrap_or_default();
    let config = RunConfig {
        garbage_handling,
        show_trace: matches.is_present("trace"),
    };

    let max_level = if config.show_trace {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(max_level)
        .try_init();

    let mut mem = SparseMemory::with_garbage_handling(word_size, config.garbage_handling);
    for seg in &image.segments {
        let data =
            &image.data[seg.data_start as usize..(seg.data_start + seg.data_length) as usize];
        mem.add_segment(seg.segment_start, seg.segment_length, data);
    }

    let mut io = StdIo::new(std::io::stdin(), std::io::stdout(), true);
    let stats = flipjump::run(&mut mem, &mut io, None).map_err(Error::Runtime)?;
    tracing::info!(%stats, "run finished");
    Ok(())
}
