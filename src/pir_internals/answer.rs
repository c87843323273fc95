use super::{
    block::{Block, ScalarXor, VectorXor, XorBackend, blocks_as_bytes},
    branch_opt_util,
    database::Database,
    error::CubePIRError,
    geometry::Geometry,
    params::{BLOCK_BYTE_LEN, DEFAULT_PREFETCH_DISTANCE, MAX_DIMENSIONS},
    query::Query,
    selector::SelectorVector,
};
use rayon::prelude::*;

#[cfg(target_arch = "x86_64")]
use super::block::Avx2Xor;

/// Throughput knobs for answer computation. None of them changes the computed answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnswerConfig {
    /// How many active-index steps ahead of the innermost scan position to prefetch. Zero disables prefetching.
    pub prefetch_distance: usize,
    pub backend: XorBackend,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        AnswerConfig {
            prefetch_distance: DEFAULT_PREFETCH_DISTANCE,
            backend: XorBackend::Auto,
        }
    }
}

/// A server's answer to one query.
///
/// Holds the *cube sum*, the XOR of every entry whose coordinates are all selected, and, for every axis `d` and every value `k` along it,
/// the *profile* entry: XOR of every entry with `d`-th coordinate `k` and all other coordinates selected, blinded with the cube sum.
///
/// Stored as one contiguous block buffer, profiles first (axis-major), cube sum last.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnswerSet {
    geometry: Geometry,
    blocks: Vec<Block>,
}

impl AnswerSet {
    #[inline(always)]
    fn num_blocks(geometry: &Geometry) -> usize {
        (geometry.dimensions() * geometry.axis_len() + 1) * geometry.blocks_per_entry()
    }

    /// Zero initialized storage for an answer, obtained all at once, or not at all.
    fn allocate(geometry: &Geometry) -> Result<AnswerSet, CubePIRError> {
        let num_blocks = AnswerSet::num_blocks(geometry);

        let mut blocks = Vec::new();
        if branch_opt_util::unlikely(blocks.try_reserve_exact(num_blocks).is_err()) {
            return Err(CubePIRError::AllocationFailure);
        }
        blocks.resize(num_blocks, Block::ZERO);

        Ok(AnswerSet { geometry: *geometry, blocks })
    }

    #[inline(always)]
    pub const fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn cube_sum(&self) -> &[Block] {
        let blocks_per_entry = self.geometry.blocks_per_entry();
        &self.blocks[self.blocks.len() - blocks_per_entry..]
    }

    /// Blinded profile entry for value `axis_value` along `axis`, if both are in range.
    pub fn profile(&self, axis: usize, axis_value: usize) -> Option<&[Block]> {
        let axis_len = self.geometry.axis_len();
        if branch_opt_util::unlikely(axis >= self.geometry.dimensions() || axis_value >= axis_len) {
            return None;
        }

        let blocks_per_entry = self.geometry.blocks_per_entry();
        let begin = (axis * axis_len + axis_value) * blocks_per_entry;

        Some(&self.blocks[begin..begin + blocks_per_entry])
    }

    /// Number of bytes a serialized answer takes for the given geometry.
    pub fn byte_len(geometry: &Geometry) -> usize {
        AnswerSet::num_blocks(geometry) * BLOCK_BYTE_LEN
    }

    /// Serializes the answer as its raw blocks, in storage order.
    pub fn to_bytes(&self) -> Vec<u8> {
        blocks_as_bytes(&self.blocks).to_vec()
    }

    /// Parses an answer serialized by [`AnswerSet::to_bytes`], given the agreed geometry.
    pub fn from_bytes(bytes: &[u8], geometry: &Geometry) -> Result<AnswerSet, CubePIRError> {
        if branch_opt_util::unlikely(bytes.len() != AnswerSet::byte_len(geometry)) {
            return Err(CubePIRError::FailedToDeserializeAnswer);
        }

        let mut answer = AnswerSet::allocate(geometry)?;
        ScalarXor.xor_bytes_into(&mut answer.blocks, bytes);

        Ok(answer)
    }
}

/// Computes the answer set of `db` for `query`.
///
/// This is a pure function of its inputs: no state is kept across calls and the database is only read, so any number of calls
/// may run concurrently against the same database. Which database bytes get read depends only on the query's selectors.
///
/// # Returns
///
/// * `Result<AnswerSet, CubePIRError>` - The answer, `QueryGeometryMismatch` if the query's shape doesn't fit the database,
///   `BackendUnavailable` if AVX2 was explicitly asked for on a CPU without it, or `AllocationFailure` if answer storage
///   couldn't be obtained. No partial answer is ever returned.
pub fn answer(db: &Database<'_>, query: &Query, config: &AnswerConfig) -> Result<AnswerSet, CubePIRError> {
    if branch_opt_util::unlikely(!query.matches(db.geometry())) {
        return Err(CubePIRError::QueryGeometryMismatch);
    }

    tracing::debug!(
        dimensions = db.geometry().dimensions(),
        axis_len = db.geometry().axis_len(),
        popcounts = ?query.selectors().iter().map(SelectorVector::popcount).collect::<Vec<usize>>(),
        "answering query"
    );

    if config.backend == XorBackend::Scalar {
        return answer_with(ScalarXor, db, query, config.prefetch_distance);
    }

    #[cfg(target_arch = "x86_64")]
    {
        if let Some(kernel) = Avx2Xor::detect() {
            return answer_with(kernel, db, query, config.prefetch_distance);
        }
    }

    match config.backend {
        XorBackend::Avx2 => {
            branch_opt_util::cold();
            Err(CubePIRError::BackendUnavailable)
        }
        _ => answer_with(ScalarXor, db, query, config.prefetch_distance),
    }
}

fn answer_with<K: VectorXor>(kernel: K, db: &Database<'_>, query: &Query, prefetch_distance: usize) -> Result<AnswerSet, CubePIRError> {
    tracing::trace!(backend = K::NAME, prefetch_distance, "selected xor kernel");

    let geometry = db.geometry();
    let mut answer = AnswerSet::allocate(geometry)?;

    let dimensions = geometry.dimensions();
    let axis_len = geometry.axis_len();
    let blocks_per_entry = geometry.blocks_per_entry();

    let active_indices = query.selectors().iter().map(SelectorVector::active_indices).collect::<Vec<Vec<usize>>>();
    let full_axis = (0..axis_len).collect::<Vec<usize>>();

    let cube_sum_axes = active_indices.iter().map(Vec::as_slice).collect::<Vec<&[usize]>>();
    let (profiles, cube_sum) = answer.blocks.split_at_mut(dimensions * axis_len * blocks_per_entry);

    scan(kernel, db, &cube_sum_axes, None, cube_sum, prefetch_distance);

    // The axis being profiled is walked over every value, all other axes only over their selected values.
    profiles.par_chunks_mut(axis_len * blocks_per_entry).enumerate().for_each(|(axis, profile)| {
        let mut axes = cube_sum_axes.clone();
        axes[axis] = &full_axis;

        scan(kernel, db, &axes, Some(axis), profile, prefetch_distance);
    });

    let cube_sum = &*cube_sum;
    profiles.par_chunks_mut(blocks_per_entry).for_each(|profile_entry| kernel.xor_blocks_into(profile_entry, cube_sum));

    Ok(answer)
}

/// XOR-accumulates every reachable cube cell whose per-axis values are drawn from `axes` into `out`.
///
/// With `profiled_axis == None`, everything lands in the single entry `out`. Otherwise `out` holds one entry per value of the
/// profiled axis and each cell lands in the entry indexed by its value along that axis.
fn scan<K: VectorXor>(kernel: K, db: &Database<'_>, axes: &[&[usize]], profiled_axis: Option<usize>, out: &mut [Block], prefetch_distance: usize) {
    if axes.iter().any(|axis_values| axis_values.is_empty()) {
        return;
    }

    let geometry = db.geometry();
    let blocks_per_entry = geometry.blocks_per_entry();
    let dimensions = axes.len();

    let (outer_axes, inner_axis) = axes.split_at(dimensions - 1);
    let inner_axis = inner_axis[0];
    let inner_is_profiled = profiled_axis == Some(dimensions - 1);

    let mut strides = [0usize; MAX_DIMENSIONS];
    strides.iter_mut().take(dimensions).enumerate().for_each(|(axis, stride)| *stride = geometry.stride(axis));

    // Odometer over positions in the outer axes' value lists.
    let mut cursor = [0usize; MAX_DIMENSIONS];

    loop {
        let mut row_begin = 0;
        let mut outer_slot = 0;

        for (axis, axis_values) in outer_axes.iter().enumerate() {
            let axis_value = axis_values[cursor[axis]];

            row_begin += axis_value * strides[axis];
            if profiled_axis == Some(axis) {
                outer_slot = axis_value;
            }
        }

        for (step, &inner_value) in inner_axis.iter().enumerate() {
            if prefetch_distance > 0 {
                if let Some(&ahead) = inner_axis.get(step + prefetch_distance) {
                    db.prefetch_entry(row_begin + ahead);
                }
            }

            // Inner axis values ascend, so once a cell is past the provisioned buffer, so is the rest of this row.
            let Some(entry) = db.entry_bytes(row_begin + inner_value) else {
                break;
            };

            let slot = if inner_is_profiled { inner_value } else { outer_slot };
            let begin = slot * blocks_per_entry;

            kernel.xor_bytes_into(&mut out[begin..begin + blocks_per_entry], entry);
        }

        let mut axis = dimensions - 1;
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;

            cursor[axis] += 1;
            if cursor[axis] < outer_axes[axis].len() {
                break;
            }
            cursor[axis] = 0;
        }
    }
}
