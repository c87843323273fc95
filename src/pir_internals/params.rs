/// Byte width of one SIMD lane, the atomic unit of XOR.
pub const BLOCK_BYTE_LEN: usize = 32;
pub const CACHE_LINE_BYTE_LEN: usize = 64;

/// Upper bound on cache lines prefetched for a single database entry.
pub const MAX_PREFETCH_LINES: usize = 32;
/// How many active-index steps ahead of the innermost scan position the server prefetches.
pub const DEFAULT_PREFETCH_DISTANCE: usize = 8;

pub const SEED_BYTE_LEN: usize = 32;

pub const MIN_DIMENSIONS: usize = 2;
pub const MAX_DIMENSIONS: usize = 3;
