use std::fs;
use std::io::{self, prelude::*};
use std::path;

use env_logger;
use log;

use ext_byte_sort::{ExternalSorterBuilder, ReadMode, WriteSink};

fn main() {
    env_logger::Builder::new().filter_level(log::LevelFilter::Debug).init();

    let mut input_reader = io::BufReader::new(fs::File::open("data.txt").unwrap());
    let mut sink = WriteSink::new(io::BufWriter::new(fs::File::create("sorted.txt").unwrap()));

    let sorter = ExternalSorterBuilder::new()
        .with_tmp_dir(path::Path::new("./"))
        .with_buffer_capacity(2 * 1024 * 1024)
        .with_read_mode(ReadMode::Mmap)
        .build()
        .unwrap();

    let lines = std::iter::from_fn(|| {
        let mut line = Vec::new();
        match input_reader.read_until(b'\n', &mut line) {
            Ok(0) => None,
            Ok(_) => Some(Ok(line)),
            Err(err) => Some(Err(err)),
        }
    });

    let stats = sorter.sort(lines, &mut sink).unwrap();
    log::info!("sorted {} records using {} runs", stats.records, stats.runs);
}
