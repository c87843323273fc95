// This program measures server-side answering throughput of the cube PIR scheme.
// It fills a random database, sets up two replica servers over it, and then retrieves randomly chosen entries,
// timing how long each server takes to answer. Every retrieved entry is checked against the database.
//
// Usage: throughput [--log2-num-entries 20] [--blocks-per-entry 1] [--dimensions 3] [--samples 16]
// Set RUST_LOG=cube_pir=debug to see per-query logs.

use clap::Parser;
use cube_pir::{client::Client, server::Server};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::{error::Error, time::Instant};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "throughput")]
#[command(about = "Measure per-server answering throughput of two-server cube PIR")]
struct Args {
    /// Database holds 2^log2_num_entries entries.
    #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u32).range(0..=40))]
    log2_num_entries: u32,

    /// Number of 32 -bytes blocks in each entry.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=1024))]
    blocks_per_entry: u32,

    /// Number of cube axes, either 2 or 3.
    #[arg(long, default_value_t = 3)]
    dimensions: usize,

    /// Number of entries to retrieve.
    #[arg(long, default_value_t = 16, value_parser = clap::value_parser!(u32).range(1..))]
    samples: u32,
}

fn mean_and_std(samples: &[f64]) -> (f64, f64) {
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|sample| (sample - mean).powi(2)).sum::<f64>() / n;

    (mean, variance.sqrt())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("cube_pir=info".parse()?))
        .init();

    let args = Args::parse();
    let blocks_per_entry = args.blocks_per_entry as usize;
    let dimensions = args.dimensions;
    let num_samples = args.samples as usize;

    let num_entries = 1usize.checked_shl(args.log2_num_entries).ok_or("database size overflows usize")?;
    let entry_byte_len = blocks_per_entry * 32;
    let db_byte_len = num_entries.checked_mul(entry_byte_len).ok_or("database byte length overflows usize")?;

    let mut rng = ChaCha8Rng::from_os_rng();

    let mut db = vec![0u8; db_byte_len];
    rng.fill_bytes(&mut db);

    let server_a = Server::setup(&db, blocks_per_entry, dimensions)?;
    let server_b = Server::setup(&db, blocks_per_entry, dimensions)?;
    let client = Client::setup(*server_a.geometry());

    println!(
        "Database of {} entries, {} -bytes each, as a {}-dimensional cube of side {}",
        num_entries,
        entry_byte_len,
        dimensions,
        client.geometry().axis_len()
    );

    let db_mib = db.len() as f64 / (1024.0 * 1024.0);
    let mut throughputs = Vec::with_capacity(2 * num_samples);

    for _ in 0..num_samples {
        let linear_index = rng.random_range(0..num_entries);
        let queries = client.query(linear_index)?;

        let begin = Instant::now();
        let answer_a = server_a.answer(queries.base())?;
        let answered_a = Instant::now();
        let answer_b = server_b.answer(queries.probe())?;
        let answered_b = Instant::now();

        throughputs.push(db_mib / (answered_a - begin).as_secs_f64());
        throughputs.push(db_mib / (answered_b - answered_a).as_secs_f64());

        let entry = client.reconstruct(&queries, &answer_a, &answer_b)?;
        if entry.as_bytes() == &db[linear_index * entry_byte_len..(linear_index + 1) * entry_byte_len] {
            println!("✅ Entry {} retrieved, servers took {:?} and {:?}", linear_index, answered_a - begin, answered_b - answered_a);
        } else {
            println!("⚠️⚠️⚠️ Entry {} doesn't match the database", linear_index);
        }
    }

    let (mean, std) = mean_and_std(&throughputs);
    println!("Per server throughput: {:.2} ± {:.2} MiB/s", mean, std);

    Ok(())
}
