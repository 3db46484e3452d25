//! Writes test records, one per line: shuffled zero-padded 16-digit numbers, or random UUID strings.
//!
//! Usage: `cargo run --example make_data -- [count] [path] [uuid]`

use std::env;
use std::fs;
use std::io::{self, prelude::*};

use env_logger;
use log;
use rand::seq::SliceRandom;
use rand::Rng;

const PART_LEN: usize = 1_000_000;

fn write_numbers<W: Write>(writer: &mut W, count: usize) -> io::Result<()> {
    let mut rng = rand::thread_rng();
    let mut part = Vec::with_capacity(PART_LEN.min(count));

    // numbers are shuffled within parts of PART_LEN
    let mut next = 0u64;
    while (next as usize) < count {
        let len = PART_LEN.min(count - next as usize);
        part.clear();
        part.extend(next..next + len as u64);
        part.shuffle(&mut rng);

        for number in &part {
            writeln!(writer, "{:016}", number)?;
        }
        next += len as u64;
    }

    return Ok(());
}

/// Random version 4 UUID in its 36 byte hyphenated form.
fn uuid_v4<R: Rng>(rng: &mut R) -> String {
    let mut bytes: [u8; 16] = rng.gen();
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let mut uuid = String::with_capacity(36);
    for (idx, byte) in bytes.iter().enumerate() {
        if matches!(idx, 4 | 6 | 8 | 10) {
            uuid.push('-');
        }
        uuid.push_str(&format!("{:02x}", byte));
    }

    return uuid;
}

fn write_uuids<W: Write>(writer: &mut W, count: usize) -> io::Result<()> {
    let mut rng = rand::thread_rng();
    for _ in 0..count {
        writeln!(writer, "{}", uuid_v4(&mut rng))?;
    }

    return Ok(());
}

fn main() -> io::Result<()> {
    env_logger::Builder::new().filter_level(log::LevelFilter::Info).init();

    let mut args = env::args().skip(1);
    let count: usize = args.next().map_or(20_000_000, |arg| arg.parse().expect("count must be a number"));
    let path = args.next().unwrap_or_else(|| "data.txt".into());
    let uuid = match args.next().as_deref() {
        None => false,
        Some("uuid") => true,
        Some(other) => panic!("unknown record kind: {}", other),
    };

    let mut writer = io::BufWriter::with_capacity(65 * 1024, fs::File::create(&path)?);
    if uuid {
        log::info!("writing {} UUID records to {}", count, path);
        write_uuids(&mut writer, count)?;
    } else {
        log::info!("writing {} number records to {}", count, path);
        write_numbers(&mut writer, count)?;
    }

    writer.flush()
}
