use std::fs;
use std::io::{self, prelude::*};
use std::path;
use std::process;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use ext_byte_sort::{ExternalSorterBuilder, ReadMode, WriteSink};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let order: Order = arg_parser.value_of_t_or_exit("sort");
    let read_mode: Mode = arg_parser.value_of_t_or_exit("read_mode");
    let tmp_dir: Option<&str> = arg_parser.value_of("tmp_dir");
    let scratch: Option<&str> = arg_parser.value_of("scratch");
    let buffer_size = arg_parser.value_of("buffer_size").expect("value is defaulted");
    let threads: Option<usize> = arg_parser
        .is_present("threads")
        .then(|| arg_parser.value_of_t_or_exit("threads"));

    let input = arg_parser.value_of("input").expect("value is required");
    let input_stream = match fs::File::open(input) {
        Ok(file) => io::BufReader::with_capacity(65 * 1024, file),
        Err(err) => {
            log::error!("input file opening error: {}", err);
            process::exit(1);
        }
    };

    let output = arg_parser.value_of("output").expect("value is required");
    let mut sink = match fs::File::create(output) {
        Ok(file) => WriteSink::new(io::BufWriter::with_capacity(65 * 1024, file)),
        Err(err) => {
            log::error!("output file creation error: {}", err);
            process::exit(1);
        }
    };

    let mut sorter_builder = ExternalSorterBuilder::new()
        .with_read_mode(read_mode.into())
        .with_buffer_capacity(buffer_size.parse::<ByteSize>().expect("value is pre-validated").as_u64() as usize);

    if let Some(threads) = threads {
        sorter_builder = sorter_builder.with_threads_number(threads);
    }

    if let Some(tmp_dir) = tmp_dir {
        sorter_builder = sorter_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }

    if let Some(scratch) = scratch {
        sorter_builder = sorter_builder.with_scratch_path(path::Path::new(scratch));
    }

    let sorter = match sorter_builder.build() {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("sorter initialization error: {}", err);
            process::exit(1);
        }
    };

    let result = match order {
        Order::Asc => sorter.sort(Lines::new(input_stream), &mut sink),
        Order::Desc => sorter.sort_by(Lines::new(input_stream), |a, b| a.cmp(b).reverse(), &mut sink),
    };

    match result {
        Ok(stats) => log::info!(
            "sorted {} records in {} runs ({} scratch bytes, longest record {} bytes)",
            stats.records,
            stats.runs,
            stats.scratch_bytes,
            stats.max_record_len
        ),
        Err(err) => {
            log::error!("data sorting error: {}", err);
            process::exit(1);
        }
    }
}

/// Newline-terminated records of a text stream. A final unterminated line gets a newline appended.
struct Lines<R: BufRead> {
    reader: R,
}

impl<R: BufRead> Lines<R> {
    fn new(reader: R) -> Self {
        Lines { reader }
    }
}

impl<R: BufRead> Iterator for Lines<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = Vec::new();
        match self.reader.read_until(b'\n', &mut line) {
            Ok(0) => None,
            Ok(_) => {
                if line.last() != Some(&b'\n') {
                    line.push(b'\n');
                }
                Some(Ok(line))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum Order {
    Asc,
    Desc,
}

impl Order {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Order::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for Order {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Order as clap::ArgEnum>::from_str(s, false)
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum Mode {
    Mmap,
    Buffered,
}

impl Mode {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Mode::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Mode as clap::ArgEnum>::from_str(s, false)
    }
}

impl From<Mode> for ReadMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Mmap => ReadMode::Mmap,
            Mode::Buffered => ReadMode::Buffered,
        }
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("ext-byte-sort")
        .about("external sorter for newline-separated records")
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("file to be sorted")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("result file")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("sort")
                .short('s')
                .long("sort")
                .help("sorting order")
                .takes_value(true)
                .default_value("asc")
                .possible_values(Order::possible_values()),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .arg(
            clap::Arg::new("read_mode")
                .short('m')
                .long("read-mode")
                .help("scratch file access mode during merge")
                .takes_value(true)
                .default_value("mmap")
                .possible_values(Mode::possible_values()),
        )
        .arg(
            clap::Arg::new("threads")
                .short('t')
                .long("threads")
                .help("number of threads to use for sorting runs")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory to be used to store the temporary scratch file")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("scratch")
                .long("scratch")
                .help("scratch file path, kept after sorting")
                .takes_value(true)
                .conflicts_with("tmp_dir"),
        )
        .arg(
            clap::Arg::new("buffer_size")
                .short('b')
                .long("buffer-size")
                .help("run buffer size")
                .takes_value(true)
                .default_value("2MiB")
                .validator(|v| match v.parse::<ByteSize>() {
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Buffer size format incorrect: {}", err)),
                }),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
