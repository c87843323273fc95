use cube_pir::{AnswerConfig, XorBackend, client, server};
use divan;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::time::Duration;

fn main() {
    divan::main();
}

fn generate_random_database(rng: &mut ChaCha8Rng, num_entries: usize, blocks_per_entry: usize) -> Vec<u8> {
    assert!(num_entries > 0);
    assert!(blocks_per_entry > 0);

    let mut db = vec![0u8; num_entries * blocks_per_entry * 32];
    rng.fill_bytes(&mut db);

    db
}

#[derive(Debug)]
struct DBConfig {
    db_entry_count: usize,
    blocks_per_entry: usize,
}

const ARGS: &[DBConfig] = &[
    DBConfig {
        db_entry_count: 1usize << 16,
        blocks_per_entry: 1,
    },
    DBConfig {
        db_entry_count: 1usize << 20,
        blocks_per_entry: 1,
    },
    DBConfig {
        db_entry_count: 1usize << 16,
        blocks_per_entry: 8,
    },
];
const DIMENSIONS: [usize; 2] = [2, 3];

#[divan::bench(args = ARGS, consts = DIMENSIONS, max_time = Duration::from_secs(100), skip_ext_time = true)]
fn client_query<const D: usize>(bencher: divan::Bencher, db_config: &DBConfig) {
    let mut rng = ChaCha8Rng::from_os_rng();

    let db = generate_random_database(&mut rng, db_config.db_entry_count, db_config.blocks_per_entry);
    let server = server::Server::setup(&db, db_config.blocks_per_entry, D).unwrap();
    let client = client::Client::setup(*server.geometry());

    let linear_index = rng.random_range(0..db_config.db_entry_count);

    bencher.bench(|| divan::black_box(&client).query(divan::black_box(linear_index)));
}

#[divan::bench(args = ARGS, consts = DIMENSIONS, max_time = Duration::from_secs(100), skip_ext_time = true)]
fn server_respond<const D: usize>(bencher: divan::Bencher, db_config: &DBConfig) {
    let mut rng = ChaCha8Rng::from_os_rng();

    let db = generate_random_database(&mut rng, db_config.db_entry_count, db_config.blocks_per_entry);
    let server = server::Server::setup(&db, db_config.blocks_per_entry, D).unwrap();
    let client = client::Client::setup(*server.geometry());

    let linear_index = rng.random_range(0..db_config.db_entry_count);
    let query_bytes = client.query(linear_index).unwrap().base().to_bytes();

    bencher.bench(|| divan::black_box(&server).respond(divan::black_box(&query_bytes)));
}

#[divan::bench(args = ARGS, consts = DIMENSIONS, max_time = Duration::from_secs(100), skip_ext_time = true)]
fn server_respond_scalar<const D: usize>(bencher: divan::Bencher, db_config: &DBConfig) {
    let mut rng = ChaCha8Rng::from_os_rng();

    let db = generate_random_database(&mut rng, db_config.db_entry_count, db_config.blocks_per_entry);
    let config = AnswerConfig {
        backend: XorBackend::Scalar,
        ..AnswerConfig::default()
    };
    let server = server::Server::setup_with_config(&db, db_config.blocks_per_entry, D, config).unwrap();
    let client = client::Client::setup(*server.geometry());

    let linear_index = rng.random_range(0..db_config.db_entry_count);
    let query_bytes = client.query(linear_index).unwrap().base().to_bytes();

    bencher.bench(|| divan::black_box(&server).respond(divan::black_box(&query_bytes)));
}

#[divan::bench(args = ARGS, consts = DIMENSIONS, max_time = Duration::from_secs(100), skip_ext_time = true)]
fn client_process_responses<const D: usize>(bencher: divan::Bencher, db_config: &DBConfig) {
    let mut rng = ChaCha8Rng::from_os_rng();

    let db = generate_random_database(&mut rng, db_config.db_entry_count, db_config.blocks_per_entry);
    let server = server::Server::setup(&db, db_config.blocks_per_entry, D).unwrap();
    let client = client::Client::setup(*server.geometry());

    let linear_index = rng.random_range(0..db_config.db_entry_count);
    let queries = client.query(linear_index).unwrap();

    let base_response = server.respond(&queries.base().to_bytes()).unwrap();
    let probe_response = server.respond(&queries.probe().to_bytes()).unwrap();

    bencher.bench(|| {
        divan::black_box(&client).process_responses(
            divan::black_box(&queries),
            divan::black_box(&base_response),
            divan::black_box(&probe_response),
        )
    });
}
