use super::{answer::AnswerSet, block::Entry, branch_opt_util, error::CubePIRError, geometry::Coordinate};

/// Recovers the entry at `coordinate` from two answers: `base`, computed over some query `q`, and `probe`, computed over `q.probe(coordinate)`.
///
/// Every cube cell other than the target shows up an even number of times across the XOR-ed cube sums and profiles, so only the target survives.
///
/// # Returns
///
/// * `Result<Entry, CubePIRError>` - The recovered entry, `AnswerGeometryMismatch` if the two answers don't share a geometry,
///   or `CoordinateOutOfRange` if the coordinate doesn't lie inside their cube.
pub fn reconstruct(coordinate: &Coordinate, base: &AnswerSet, probe: &AnswerSet) -> Result<Entry, CubePIRError> {
    if branch_opt_util::unlikely(base.geometry() != probe.geometry()) {
        return Err(CubePIRError::AnswerGeometryMismatch);
    }

    let geometry = base.geometry();
    if branch_opt_util::unlikely(geometry.linear_index(coordinate).is_err()) {
        return Err(CubePIRError::CoordinateOutOfRange);
    }

    let mut entry = Entry::from_blocks(base.cube_sum());
    entry.xor_blocks(probe.cube_sum());

    // With two axes, each probe-side profile equals its base-side twin XOR the target entry. Folding both sides in
    // would cancel the target, so only the base side is used. With three axes both sides are needed, and the cube sum
    // blinding of the six profiles cancels out against the two cube sums.
    let fold_probe_profiles = geometry.dimensions() % 2 == 1;

    for (axis, &axis_value) in coordinate.as_slice().iter().enumerate() {
        let base_profile = base.profile(axis, axis_value).ok_or(CubePIRError::CoordinateOutOfRange)?;
        entry.xor_blocks(base_profile);

        if fold_probe_profiles {
            let probe_profile = probe.profile(axis, axis_value).ok_or(CubePIRError::CoordinateOutOfRange)?;
            entry.xor_blocks(probe_profile);
        }
    }

    Ok(entry)
}
