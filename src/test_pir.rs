#![cfg(test)]

use crate::{
    AnswerConfig, AnswerSet, Coordinate, CubePIRError, Database, Entry, Geometry, Query, SEED_BYTE_LEN, XorBackend, answer,
    client::Client,
    reconstruct,
    server::Server,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use test_case::test_case;

fn generate_random_database(num_entries: usize, blocks_per_entry: usize) -> Vec<u8> {
    let mut rng = ChaCha8Rng::from_os_rng();

    let mut db = vec![0u8; num_entries * blocks_per_entry * 32];
    rng.fill_bytes(&mut db);

    db
}

#[test_case(16, 1, 2; "Perfect square")]
#[test_case(17, 1, 2; "One past perfect square")]
#[test_case(99, 3, 2; "One short of perfect square")]
#[test_case(27, 2, 3; "Perfect cube")]
#[test_case(28, 1, 3; "One past perfect cube")]
#[test_case(215, 2, 3; "One short of perfect cube")]
#[test_case(1, 1, 3; "Single entry")]
fn test_every_entry_is_retrievable(num_entries: usize, blocks_per_entry: usize, dimensions: usize) {
    let db = generate_random_database(num_entries, blocks_per_entry);

    let server_a = Server::setup(&db, blocks_per_entry, dimensions).expect("Server setup failed");
    let server_b = Server::setup(&db, blocks_per_entry, dimensions).expect("Server setup failed");
    let client = Client::setup(*server_a.geometry());

    let entry_byte_len = blocks_per_entry * 32;

    for (linear_index, expected) in db.chunks_exact(entry_byte_len).enumerate() {
        let queries = client.query(linear_index).expect("Failed to prepare query");

        let answer_a = server_a.answer(queries.base()).expect("Server can't answer");
        let answer_b = server_b.answer(queries.probe()).expect("Server can't answer");

        let entry = client.reconstruct(&queries, &answer_a, &answer_b).expect("Client can't reconstruct entry");
        assert_eq!(entry.as_bytes(), expected, "linear_index = {}", linear_index);
    }
}

#[test]
fn test_retrieval_from_small_square() {
    // Entry `i` is 32 bytes, all set to `i`, so the 4x4 square holds 0..16 in row-major order.
    let db = (0..16u8).flat_map(|i| [i; 32]).collect::<Vec<u8>>();

    let server_a = Server::setup(&db, 1, 2).unwrap();
    let server_b = Server::setup(&db, 1, 2).unwrap();
    assert_eq!(server_a.geometry().axis_len(), 4);

    let client = Client::setup(*server_a.geometry());
    let coordinate = Coordinate::new(&[2, 1]).unwrap();
    let queries = client.query_coordinate(coordinate).unwrap();

    let answer_a = server_a.answer(queries.base()).unwrap();
    let answer_b = server_b.answer(queries.probe()).unwrap();

    let entry = client.reconstruct(&queries, &answer_a, &answer_b).unwrap();
    assert_eq!(entry.into_bytes(), vec![9u8; 32]);
}

#[test]
fn test_replicas_agree_on_same_query() {
    let db = generate_random_database(27, 1);

    let server_a = Server::setup(&db, 1, 3).unwrap();
    let server_b = Server::setup_with_config(
        &db,
        1,
        3,
        AnswerConfig {
            prefetch_distance: 0,
            backend: XorBackend::Scalar,
        },
    )
    .unwrap();

    let query = Query::generate(3, 3).unwrap();

    let answer_a = server_a.answer(&query).unwrap();
    let answer_b = server_b.answer(&query).unwrap();

    assert_eq!(answer_a.cube_sum(), answer_b.cube_sum());
    assert_eq!(answer_a, answer_b);
}

#[test]
fn test_server_setup_checks_backend_availability() {
    let db = generate_random_database(27, 1);

    let config = AnswerConfig {
        backend: XorBackend::Avx2,
        ..AnswerConfig::default()
    };
    let server = Server::setup_with_config(&db, 1, 3, config);

    if XorBackend::Avx2.is_available() {
        let server = server.unwrap();
        let query = Query::generate(3, 3).unwrap();
        assert_eq!(server.answer(&query), Server::setup(&db, 1, 3).unwrap().answer(&query));
    } else {
        assert_eq!(server.map(|_| ()), Err(CubePIRError::BackendUnavailable));
    }
}

#[test]
fn test_byte_level_client_server_flow() {
    const NUM_ENTRIES: usize = 1usize << 10;
    const BLOCKS_PER_ENTRY: usize = 2;

    let db = generate_random_database(NUM_ENTRIES, BLOCKS_PER_ENTRY);

    for dimensions in 2..=3 {
        let server_a = Server::setup(&db, BLOCKS_PER_ENTRY, dimensions).unwrap();
        let server_b = Server::setup(&db, BLOCKS_PER_ENTRY, dimensions).unwrap();
        let client = Client::setup(*server_a.geometry());

        let mut rng = ChaCha8Rng::from_os_rng();
        for _ in 0..32 {
            let linear_index = rng.random_range(0..NUM_ENTRIES);
            let queries = client.query(linear_index).unwrap();

            let query_a = queries.base().to_bytes();
            let query_b = queries.probe().to_bytes();
            assert_eq!(query_a.len(), Query::byte_len(client.geometry().axis_len(), dimensions));

            let response_a = server_a.respond(&query_a).expect("Server can't respond");
            let response_b = server_b.respond(&query_b).expect("Server can't respond");
            assert_eq!(response_a.len(), AnswerSet::byte_len(client.geometry()));

            let entry = client.process_responses(&queries, &response_a, &response_b).expect("Client can't process responses");

            let entry_byte_len = BLOCKS_PER_ENTRY * 32;
            assert_eq!(entry, &db[linear_index * entry_byte_len..(linear_index + 1) * entry_byte_len]);
        }
    }
}

#[test]
fn test_concurrent_answers_match_sequential_ones() {
    const NUM_QUERIES: usize = 8;

    let db = generate_random_database(500, 2);
    let server = Server::setup(&db, 2, 3).unwrap();
    let axis_len = server.geometry().axis_len();

    let queries = (0..NUM_QUERIES).map(|_| Query::generate(axis_len, 3).unwrap()).collect::<Vec<Query>>();
    let sequential = queries.iter().map(|query| server.answer(query).unwrap()).collect::<Vec<AnswerSet>>();

    let concurrent = std::thread::scope(|scope| {
        let handles = queries.iter().map(|query| scope.spawn(move || server.answer(query).unwrap())).collect::<Vec<_>>();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect::<Vec<AnswerSet>>()
    });

    assert_eq!(sequential, concurrent);
}

#[test]
fn test_base_answer_serves_any_target() {
    // The base answer is computed without knowing the target, so it pairs with a probe for any coordinate.
    let db = generate_random_database(64, 1);
    let server = Server::setup(&db, 1, 3).unwrap();
    let client = Client::setup(*server.geometry());

    let queries = client.query(5).unwrap();
    let answer_a = server.answer(queries.base()).unwrap();

    let other_target = client.query_coordinate(Coordinate::new(&[3, 2, 1]).unwrap()).unwrap();
    let reprobed = queries.base().probe(other_target.coordinate()).unwrap();
    let answer_b = server.answer(&reprobed).unwrap();

    let entry = reconstruct(other_target.coordinate(), &answer_a, &answer_b).unwrap();
    assert_eq!(entry.as_bytes(), &db[(3 * 16 + 2 * 4 + 1) * 32..(3 * 16 + 2 * 4 + 2) * 32]);
}

#[test]
fn test_zeroed_database_yields_zeroed_entries() {
    let db = vec![0u8; 100 * 32];
    let server = Server::setup(&db, 1, 2).unwrap();
    let client = Client::setup(*server.geometry());

    let queries = client.query(42).unwrap();
    let answer_a = server.answer(queries.base()).unwrap();
    let answer_b = server.answer(queries.probe()).unwrap();

    assert!(client.reconstruct(&queries, &answer_a, &answer_b).unwrap().is_zero());
}

/// Recovers an entry the brute-force way, with one server per subset of axes: each one answers the base query with exactly
/// that subset of axes flipped at the target coordinate. XOR of all their cube sums is the target entry.
fn brute_force_retrieve(db: &Database<'_>, base: &Query, coordinate: &Coordinate) -> Entry {
    let dimensions = coordinate.dimensions();
    let mut entry = Entry::zeroed(db.geometry().blocks_per_entry());

    for subset in 0..(1usize << dimensions) {
        let mut query = base.clone();
        for axis in (0..dimensions).filter(|axis| (subset >> axis) & 1 == 1) {
            query.flip(axis, coordinate[axis]).unwrap();
        }

        let answer = answer(db, &query, &AnswerConfig::default()).unwrap();
        entry.xor_blocks(answer.cube_sum());
    }

    entry
}

#[test_case(36, 2; "Square")]
#[test_case(60, 3; "Partial cube")]
fn test_two_server_retrieval_agrees_with_brute_force(num_entries: usize, dimensions: usize) {
    let bytes = generate_random_database(num_entries, 2);
    let db = Database::new(&bytes, 2, dimensions).unwrap();
    let geometry = *db.geometry();

    let mut rng = ChaCha8Rng::from_os_rng();

    for linear_index in 0..num_entries {
        let coordinate = geometry.coordinate(linear_index).unwrap();
        let base = Query::generate_with_rng(&mut rng, geometry.axis_len(), dimensions).unwrap();
        let probe = base.probe(&coordinate).unwrap();

        let base_answer = answer(&db, &base, &AnswerConfig::default()).unwrap();
        let probe_answer = answer(&db, &probe, &AnswerConfig::default()).unwrap();

        let two_server = reconstruct(&coordinate, &base_answer, &probe_answer).unwrap();
        let brute_force = brute_force_retrieve(&db, &base, &coordinate);

        assert_eq!(two_server, brute_force);
        assert_eq!(two_server, db.entry_at(&coordinate).unwrap());
    }
}

#[test]
fn test_seeded_queries_retrieve_entries() {
    let db = generate_random_database(125, 1);
    let server = Server::setup(&db, 1, 3).unwrap();
    let geometry = *server.geometry();

    let mut rng = ChaCha8Rng::from_os_rng();
    let mut seed = [0u8; SEED_BYTE_LEN];
    rng.fill_bytes(&mut seed);

    let base = Query::generate_from_seed(&seed, geometry.axis_len(), geometry.dimensions()).unwrap();
    let coordinate = Coordinate::new(&[4, 0, 2]).unwrap();
    let probe = base.probe(&coordinate).unwrap();

    let entry = reconstruct(&coordinate, &server.answer(&base).unwrap(), &server.answer(&probe).unwrap()).unwrap();
    assert_eq!(entry.as_bytes(), &db[(4 * 25 + 2) * 32..(4 * 25 + 3) * 32]);
}

#[test]
fn test_client_rejects_unreachable_targets() {
    let geometry = Geometry::new(10, 1, 2).unwrap();
    let client = Client::setup(geometry);

    // 10 entries sit in a 4x4 square: cells 10..16 exist but aren't backed by entries, 16 onwards isn't even in the square.
    assert!(client.query(9).is_ok());
    assert_eq!(client.query(10).map(|_| ()), Err(CubePIRError::GeometryOverflow));
    assert_eq!(client.query(16).map(|_| ()), Err(CubePIRError::CoordinateOutOfRange));
    assert_eq!(client.query_coordinate(Coordinate::new(&[0, 0, 0]).unwrap()).map(|_| ()), Err(CubePIRError::CoordinateOutOfRange));

    // Both entry points agree on which cells can be asked for.
    assert!(client.query_coordinate(Coordinate::new(&[2, 1]).unwrap()).is_ok());
    assert_eq!(client.query_coordinate(Coordinate::new(&[2, 2]).unwrap()).map(|_| ()), Err(CubePIRError::GeometryOverflow));
    assert_eq!(client.query_coordinate(Coordinate::new(&[3, 3]).unwrap()).map(|_| ()), Err(CubePIRError::GeometryOverflow));
    assert_eq!(client.query_coordinate(Coordinate::new(&[0, 4]).unwrap()).map(|_| ()), Err(CubePIRError::CoordinateOutOfRange));
}

#[test]
fn test_mismatching_geometries_are_rejected() {
    let db = generate_random_database(64, 1);

    let square = Server::setup(&db, 1, 2).unwrap();
    let cube = Server::setup(&db, 1, 3).unwrap();

    let client = Client::setup(*square.geometry());
    let queries = client.query(7).unwrap();

    // A query sized for the square doesn't fit the cube.
    assert_eq!(cube.respond(&queries.base().to_bytes()), Err(CubePIRError::FailedToDeserializeQuery));
    assert_eq!(cube.answer(queries.base()), Err(CubePIRError::QueryGeometryMismatch));

    let cube_queries = Client::setup(*cube.geometry()).query(7).unwrap();
    let answer_a = cube.answer(cube_queries.base()).unwrap();
    let answer_b = cube.answer(cube_queries.probe()).unwrap();
    assert_eq!(client.reconstruct(&queries, &answer_a, &answer_b), Err(CubePIRError::AnswerGeometryMismatch));

    let response = square.respond(&queries.base().to_bytes()).unwrap();
    assert_eq!(client.process_responses(&queries, &response, &response[..32]), Err(CubePIRError::FailedToDeserializeAnswer));
}
