use super::{branch_opt_util, error::CubePIRError, params};
use std::ops::Index;

/// A point inside the D-dimensional database cube, one value in `[0, L)` per axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Coordinate {
    axes: [usize; params::MAX_DIMENSIONS],
    dimensions: usize,
}

impl Coordinate {
    /// Builds a coordinate from per-axis values, ordered from the slowest varying (outermost) axis to the fastest varying one.
    pub fn new(axes: &[usize]) -> Result<Coordinate, CubePIRError> {
        if branch_opt_util::unlikely(!(params::MIN_DIMENSIONS..=params::MAX_DIMENSIONS).contains(&axes.len())) {
            return Err(CubePIRError::UnsupportedDimensionCount(axes.len()));
        }

        let mut coordinate = Coordinate {
            axes: [0; params::MAX_DIMENSIONS],
            dimensions: axes.len(),
        };
        coordinate.axes[..axes.len()].copy_from_slice(axes);

        Ok(coordinate)
    }

    #[inline(always)]
    pub const fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[inline(always)]
    pub fn as_slice(&self) -> &[usize] {
        &self.axes[..self.dimensions]
    }
}

impl Index<usize> for Coordinate {
    type Output = usize;

    #[inline(always)]
    fn index(&self, axis: usize) -> &Self::Output {
        &self.as_slice()[axis]
    }
}

/// Shape of a database laid out as a D-dimensional cube of fixed-size entries.
///
/// The cube has `L = ceil(N^(1/D))` values along every axis, so `L^D` may exceed the number of provisioned entries `N`.
/// Entries are stored in row-major coordinate order, i.e. the last axis is contiguous in memory. Cube cells at linear index
/// `>= N` are not backed by the database buffer, they are structurally unreachable and contribute nothing to any aggregate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    num_entries: usize,
    blocks_per_entry: usize,
    dimensions: usize,
    axis_len: usize,
    cube_len: usize,
}

impl Geometry {
    /// Derives cube geometry for a database of `num_entries` entries, each made of `blocks_per_entry` 32 -bytes blocks.
    ///
    /// # Arguments
    ///
    /// * `num_entries` - Number of entries `N` provisioned in the database buffer, must be non-zero.
    /// * `blocks_per_entry` - Number of 32 -bytes blocks making up a single entry, must be non-zero.
    /// * `dimensions` - Number of cube axes `D`, either 2 or 3.
    ///
    /// # Returns
    ///
    /// * `Result<Geometry, CubePIRError>` - Cube geometry, or an error if any argument is invalid or the resulting cube can't be addressed.
    pub fn new(num_entries: usize, blocks_per_entry: usize, dimensions: usize) -> Result<Geometry, CubePIRError> {
        if branch_opt_util::unlikely(!(params::MIN_DIMENSIONS..=params::MAX_DIMENSIONS).contains(&dimensions)) {
            return Err(CubePIRError::UnsupportedDimensionCount(dimensions));
        }
        if branch_opt_util::unlikely(blocks_per_entry == 0) {
            return Err(CubePIRError::ZeroBlocksPerEntry);
        }
        if branch_opt_util::unlikely(num_entries == 0) {
            return Err(CubePIRError::EmptyDatabase);
        }

        let axis_len = ceil_root(num_entries, dimensions).ok_or(CubePIRError::GeometryTooLarge)?;
        let cube_len = checked_pow(axis_len, dimensions).ok_or(CubePIRError::GeometryTooLarge)?;

        let entry_byte_len = blocks_per_entry.checked_mul(params::BLOCK_BYTE_LEN).ok_or(CubePIRError::GeometryTooLarge)?;
        cube_len.checked_mul(entry_byte_len).ok_or(CubePIRError::GeometryTooLarge)?;

        Ok(Geometry {
            num_entries,
            blocks_per_entry,
            dimensions,
            axis_len,
            cube_len,
        })
    }

    /// Derives cube geometry from the byte length of a database buffer. Trailing bytes which don't make up a whole entry are ignored.
    pub fn from_database_len(db_byte_len: usize, blocks_per_entry: usize, dimensions: usize) -> Result<Geometry, CubePIRError> {
        if branch_opt_util::unlikely(blocks_per_entry == 0) {
            return Err(CubePIRError::ZeroBlocksPerEntry);
        }

        let entry_byte_len = blocks_per_entry.checked_mul(params::BLOCK_BYTE_LEN).ok_or(CubePIRError::GeometryTooLarge)?;
        Geometry::new(db_byte_len / entry_byte_len, blocks_per_entry, dimensions)
    }

    #[inline(always)]
    pub const fn num_entries(&self) -> usize {
        self.num_entries
    }
    #[inline(always)]
    pub const fn blocks_per_entry(&self) -> usize {
        self.blocks_per_entry
    }
    #[inline(always)]
    pub const fn dimensions(&self) -> usize {
        self.dimensions
    }
    /// Number of values `L` along each axis of the cube, which is also the length of every selector vector.
    #[inline(always)]
    pub const fn axis_len(&self) -> usize {
        self.axis_len
    }
    /// Number of cells `L^D` in the cube, reachable or not.
    #[inline(always)]
    pub const fn cube_len(&self) -> usize {
        self.cube_len
    }
    #[inline(always)]
    pub const fn entry_byte_len(&self) -> usize {
        self.blocks_per_entry * params::BLOCK_BYTE_LEN
    }
    #[inline(always)]
    pub const fn provisioned_byte_len(&self) -> usize {
        self.num_entries * self.entry_byte_len()
    }

    /// Distance, in entries, between two cells which differ by one along `axis`.
    #[inline(always)]
    pub fn stride(&self, axis: usize) -> usize {
        debug_assert!(axis < self.dimensions);
        self.axis_len.pow((self.dimensions - 1 - axis) as u32)
    }

    pub fn linear_index(&self, coordinate: &Coordinate) -> Result<usize, CubePIRError> {
        if branch_opt_util::unlikely(coordinate.dimensions() != self.dimensions) {
            return Err(CubePIRError::CoordinateOutOfRange);
        }

        coordinate.as_slice().iter().try_fold(0usize, |acc, &axis_value| {
            if branch_opt_util::likely(axis_value < self.axis_len) {
                Ok(acc * self.axis_len + axis_value)
            } else {
                Err(CubePIRError::CoordinateOutOfRange)
            }
        })
    }

    pub fn coordinate(&self, linear_index: usize) -> Result<Coordinate, CubePIRError> {
        if branch_opt_util::unlikely(linear_index >= self.cube_len) {
            return Err(CubePIRError::CoordinateOutOfRange);
        }

        let mut axes = [0usize; params::MAX_DIMENSIONS];
        let mut rest = linear_index;

        for axis in (0..self.dimensions).rev() {
            axes[axis] = rest % self.axis_len;
            rest /= self.axis_len;
        }

        Coordinate::new(&axes[..self.dimensions])
    }

    /// Byte offset of the entry living at `coordinate`, which may lie past the provisioned buffer when the cube is not full.
    pub fn byte_offset(&self, coordinate: &Coordinate) -> Result<usize, CubePIRError> {
        Ok(self.linear_index(coordinate)? * self.entry_byte_len())
    }

    /// Whether the cell at `coordinate` is backed by a provisioned database entry.
    pub fn is_reachable(&self, coordinate: &Coordinate) -> bool {
        self.linear_index(coordinate).is_ok_and(|linear_index| linear_index < self.num_entries)
    }
}

fn checked_pow(base: usize, exp: usize) -> Option<usize> {
    (0..exp).try_fold(1usize, |acc, _| acc.checked_mul(base))
}

/// Smallest `l` s.t. `l^exp >= n`.
fn ceil_root(n: usize, exp: usize) -> Option<usize> {
    let mut root = (n as f64).powf(1.0 / exp as f64).round().max(1.0) as usize;

    while checked_pow(root, exp).is_some_and(|pow| pow < n) {
        root += 1;
    }
    while root > 1 && checked_pow(root - 1, exp).is_none_or(|pow| pow >= n) {
        root -= 1;
    }

    checked_pow(root, exp).map(|_| root)
}

#[cfg(test)]
mod test {
    use super::{Coordinate, Geometry, ceil_root};
    use crate::CubePIRError;
    use test_case::test_case;

    #[test_case(1, 2 => Some(1); "Single entry square")]
    #[test_case(16, 2 => Some(4); "Perfect square")]
    #[test_case(17, 2 => Some(5); "One past perfect square")]
    #[test_case(27, 3 => Some(3); "Perfect cube")]
    #[test_case(26, 3 => Some(3); "One short of perfect cube")]
    #[test_case(28, 3 => Some(4); "One past perfect cube")]
    #[test_case(1usize << 25, 3 => Some(323); "Non-power-of-two cube root")]
    #[test_case(1usize << 30, 2 => Some(1usize << 15); "Large perfect square")]
    fn ceil_root_is_exact(n: usize, exp: usize) -> Option<usize> {
        ceil_root(n, exp)
    }

    #[test_case(16, 1, 2 => matches Ok(_); "Square cube geometry is valid")]
    #[test_case(27, 4, 3 => matches Ok(_); "Cubic geometry is valid")]
    #[test_case(16, 1, 1 => Err(CubePIRError::UnsupportedDimensionCount(1)); "Single axis is not supported")]
    #[test_case(16, 1, 4 => Err(CubePIRError::UnsupportedDimensionCount(4)); "Four axes are not supported")]
    #[test_case(16, 0, 2 => Err(CubePIRError::ZeroBlocksPerEntry); "Entry must have at least one block")]
    #[test_case(0, 1, 2 => Err(CubePIRError::EmptyDatabase); "Database must have at least one entry")]
    #[test_case(usize::MAX, 1, 2 => Err(CubePIRError::GeometryTooLarge); "Cube must be addressable")]
    fn geometry_constructor_api(num_entries: usize, blocks_per_entry: usize, dimensions: usize) -> Result<Geometry, CubePIRError> {
        Geometry::new(num_entries, blocks_per_entry, dimensions)
    }

    #[test]
    fn geometry_from_database_len_ignores_partial_trailing_entry() {
        let geometry = Geometry::from_database_len(16 * 64 + 63, 2, 2).unwrap();

        assert_eq!(geometry.num_entries(), 16);
        assert_eq!(geometry.axis_len(), 4);
        assert_eq!(geometry.entry_byte_len(), 64);
        assert_eq!(geometry.provisioned_byte_len(), 16 * 64);

        assert_eq!(Geometry::from_database_len(31, 1, 3), Err(CubePIRError::EmptyDatabase));
    }

    #[test_case(16, 2; "Full square")]
    #[test_case(13, 2; "Partial square")]
    #[test_case(27, 3; "Full cube")]
    #[test_case(20, 3; "Partial cube")]
    fn coordinate_and_linear_index_are_bijective(num_entries: usize, dimensions: usize) {
        let geometry = Geometry::new(num_entries, 1, dimensions).unwrap();

        for linear_index in 0..geometry.cube_len() {
            let coordinate = geometry.coordinate(linear_index).unwrap();

            assert_eq!(coordinate.dimensions(), dimensions);
            assert!(coordinate.as_slice().iter().all(|&v| v < geometry.axis_len()));
            assert_eq!(geometry.linear_index(&coordinate), Ok(linear_index));
            assert_eq!(geometry.byte_offset(&coordinate), Ok(linear_index * geometry.entry_byte_len()));
            assert_eq!(geometry.is_reachable(&coordinate), linear_index < num_entries);
        }

        assert_eq!(geometry.coordinate(geometry.cube_len()), Err(CubePIRError::CoordinateOutOfRange));
    }

    #[test]
    fn row_major_offsets_match_strides() {
        let geometry = Geometry::new(27, 3, 3).unwrap();
        let coordinate = Coordinate::new(&[2, 0, 1]).unwrap();

        assert_eq!(geometry.stride(0), 9);
        assert_eq!(geometry.stride(1), 3);
        assert_eq!(geometry.stride(2), 1);
        assert_eq!(geometry.linear_index(&coordinate), Ok(19));
        assert_eq!(geometry.byte_offset(&coordinate), Ok(19 * 96));
    }

    #[test_case(&[4, 0] => Err(CubePIRError::CoordinateOutOfRange); "Axis value must be less than axis length")]
    #[test_case(&[0, 0, 0] => Err(CubePIRError::CoordinateOutOfRange); "Coordinate arity must match geometry")]
    #[test_case(&[3, 3] => Ok(15); "Last cell of the square")]
    fn linear_index_validates_coordinate(axes: &[usize]) -> Result<usize, CubePIRError> {
        let geometry = Geometry::new(16, 1, 2).unwrap();
        geometry.linear_index(&Coordinate::new(axes).unwrap())
    }

    #[test]
    fn coordinate_arity_is_validated() {
        assert_eq!(Coordinate::new(&[1]), Err(CubePIRError::UnsupportedDimensionCount(1)));
        assert_eq!(Coordinate::new(&[1, 2, 3, 4]), Err(CubePIRError::UnsupportedDimensionCount(4)));
        assert_eq!(Coordinate::new(&[1, 2, 3]).map(|c| c[2]), Ok(3));
    }
}
