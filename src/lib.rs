//! CubePIR: A Rust library implementation of multi-server, information-theoretic **P**rivate **I**nformation **R**etrieval (PIR),
//! over a database laid out as a 2 or 3 dimensional cube, with all server-side arithmetic being XOR.
//!
//! This crate lets a client fetch the `i`-th fixed size entry of a database, replicated across two non-colluding servers, without
//! either server learning `i`. The database of `N` entries is viewed as a cube with side `L = ceil(N^(1/D))`. The client sends each server
//! `D` random selector bit vectors of length `L`, the two queries differing in exactly one bit per axis. Each server answers with the
//! XOR of all entries selected on every axis, along with one profile per axis, and the client XORs the two answers together to recover the entry.
//!
//! ## Features
//!
//! * **Information-theoretic privacy:** Each query, seen alone, is uniformly random. Privacy holds as long as the two servers don't collude.
//! * **No offline phase:** Servers answer directly over a caller provided, read-only byte buffer. Nothing is preprocessed, nothing is hinted.
//! * **Fast answering:** XOR accumulation is vectorized with AVX2 when available, entries are software-prefetched ahead of the scan and
//!   per-axis profiles are computed in parallel.
//!
//! ## Usage
//!
//! This crate is designed to be used in conjunction with other crates which provide the communication mechanism between client and servers.
//! You'll typically interact with the `Client` and `Server` structs to prepare queries, answer them and reconstruct entries.
//!
//! ```rust
//! use cube_pir::{client::Client, server::Server};
//!
//! // 16 entries, each one 32 -bytes block, entry `i` filled with byte `i`.
//! let db = (0..16u8).flat_map(|i| [i; 32]).collect::<Vec<u8>>();
//!
//! // Two replicas of the same database, laid out as a 4x4 square.
//! let server_a = Server::setup(&db, 1, 2).expect("Server setup failed");
//! let server_b = Server::setup(&db, 1, 2).expect("Server setup failed");
//!
//! let client = Client::setup(*server_a.geometry());
//! let queries = client.query(9).expect("Failed to prepare query");
//!
//! // Send `base` query to the first server and `probe` query to the second one.
//! let response_a = server_a.respond(&queries.base().to_bytes()).expect("Server failed to respond");
//! let response_b = server_b.respond(&queries.probe().to_bytes()).expect("Server failed to respond");
//!
//! let entry = client.process_responses(&queries, &response_a, &response_b).expect("Failed to reconstruct entry");
//! assert_eq!(entry, vec![9u8; 32]);
//! ```
//!
//! ## Modules
//!
//! * `server`: Contains the `Server` struct and associated methods for answering client queries over a database buffer.
//! * `client`: Contains the `Client` struct and associated methods for preparing query pairs and reconstructing entries from answers.

pub use pir_internals::answer::{AnswerConfig, AnswerSet, answer};
pub use pir_internals::block::{Block, Entry, XorBackend};
pub use pir_internals::database::Database;
pub use pir_internals::error::CubePIRError;
pub use pir_internals::geometry::{Coordinate, Geometry};
pub use pir_internals::params::{BLOCK_BYTE_LEN, DEFAULT_PREFETCH_DISTANCE, SEED_BYTE_LEN};
pub use pir_internals::query::Query;
pub use pir_internals::reconstruct::reconstruct;
pub use pir_internals::selector::SelectorVector;
pub mod client;
pub mod server;

mod pir_internals;

mod test_pir;
