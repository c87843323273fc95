use super::{
    block::Entry,
    branch_opt_util,
    error::CubePIRError,
    geometry::{Coordinate, Geometry},
    params::{CACHE_LINE_BYTE_LEN, MAX_PREFETCH_LINES},
};

/// Read-only view of a caller provisioned database buffer, interpreted as a cube of fixed-size entries.
///
/// The buffer is only borrowed, it is never copied, allocated or mutated. Its byte alignment doesn't matter.
#[derive(Clone, Copy, Debug)]
pub struct Database<'a> {
    bytes: &'a [u8],
    geometry: Geometry,
    prefetch_lines: usize,
}

impl<'a> Database<'a> {
    /// Wraps `bytes` as a database of `bytes.len() / (blocks_per_entry * 32)` entries, laid out over `dimensions` axes.
    pub fn new(bytes: &'a [u8], blocks_per_entry: usize, dimensions: usize) -> Result<Database<'a>, CubePIRError> {
        let geometry = Geometry::from_database_len(bytes.len(), blocks_per_entry, dimensions)?;
        Database::with_geometry(bytes, geometry)
    }

    /// Wraps `bytes` using an already agreed upon geometry. Fails if the buffer is too short to back every entry the geometry claims.
    pub fn with_geometry(bytes: &'a [u8], geometry: Geometry) -> Result<Database<'a>, CubePIRError> {
        let provisioned_byte_len = geometry.provisioned_byte_len();
        if branch_opt_util::unlikely(bytes.len() < provisioned_byte_len) {
            return Err(CubePIRError::GeometryOverflow);
        }

        let prefetch_lines = geometry.entry_byte_len().div_ceil(CACHE_LINE_BYTE_LEN).min(MAX_PREFETCH_LINES);

        Ok(Database {
            bytes: &bytes[..provisioned_byte_len],
            geometry,
            prefetch_lines,
        })
    }

    #[inline(always)]
    pub const fn geometry(&self) -> &Geometry {
        &self.geometry
    }
    #[inline(always)]
    pub const fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Bytes of the entry at cube cell `linear_index`, or `None` when that cell lies past the provisioned buffer.
    #[inline(always)]
    pub(crate) fn entry_bytes(&self, linear_index: usize) -> Option<&'a [u8]> {
        let entry_byte_len = self.geometry.entry_byte_len();
        let begin = linear_index * entry_byte_len;

        self.bytes.get(begin..begin + entry_byte_len)
    }

    /// Hints the CPU to start pulling the entry at cube cell `linear_index` into cache. No-op for unreachable cells.
    #[inline(always)]
    pub(crate) fn prefetch_entry(&self, linear_index: usize) {
        if let Some(entry) = self.entry_bytes(linear_index) {
            prefetch_read(entry, self.prefetch_lines);
        }
    }

    /// Copies out the entry living at `coordinate`.
    ///
    /// # Returns
    ///
    /// * `Result<Entry, CubePIRError>` - The entry, `CoordinateOutOfRange` if the coordinate isn't inside the cube,
    ///   or `GeometryOverflow` if the cell it names isn't backed by the provisioned buffer.
    pub fn entry_at(&self, coordinate: &Coordinate) -> Result<Entry, CubePIRError> {
        let linear_index = self.geometry.linear_index(coordinate)?;

        match self.entry_bytes(linear_index).and_then(Entry::from_bytes) {
            Some(entry) => Ok(entry),
            None => {
                branch_opt_util::cold();
                Err(CubePIRError::GeometryOverflow)
            }
        }
    }
}

#[inline(always)]
fn prefetch_read(bytes: &[u8], num_lines: usize) {
    #[cfg(target_arch = "x86_64")]
    {
        use std::arch::x86_64::{_MM_HINT_T0, _mm_prefetch};

        for line in bytes.chunks(CACHE_LINE_BYTE_LEN).take(num_lines) {
            // Prefetch is only a hint, it can't fault, and the address is in-bounds anyway.
            #[allow(unused_unsafe)]
            unsafe {
                _mm_prefetch::<_MM_HINT_T0>(line.as_ptr().cast::<i8>())
            };
        }
    }

    #[cfg(not(target_arch = "x86_64"))]
    {
        let _ = (bytes, num_lines);
    }
}

#[cfg(test)]
mod test {
    use super::Database;
    use crate::{
        CubePIRError,
        pir_internals::geometry::{Coordinate, Geometry},
    };

    fn indexed_database(num_entries: usize, blocks_per_entry: usize) -> Vec<u8> {
        (0..num_entries).flat_map(|idx| vec![idx as u8; blocks_per_entry * 32]).collect()
    }

    #[test]
    fn entry_at_reads_row_major_layout() {
        let bytes = indexed_database(27, 2);
        let db = Database::new(&bytes, 2, 3).unwrap();

        assert_eq!(db.geometry().axis_len(), 3);

        for linear_index in 0..27 {
            let coordinate = db.geometry().coordinate(linear_index).unwrap();
            let entry = db.entry_at(&coordinate).unwrap();

            assert_eq!(entry.as_bytes(), vec![linear_index as u8; 64].as_slice());
        }
    }

    #[test]
    fn cells_past_provisioned_buffer_overflow() {
        let bytes = indexed_database(10, 1);
        let db = Database::new(&bytes, 1, 2).unwrap();

        assert_eq!(db.geometry().axis_len(), 4);
        assert_eq!(db.geometry().cube_len(), 16);

        assert!(db.entry_at(&Coordinate::new(&[2, 1]).unwrap()).is_ok());
        assert_eq!(db.entry_at(&Coordinate::new(&[2, 2]).unwrap()), Err(CubePIRError::GeometryOverflow));
        assert_eq!(db.entry_at(&Coordinate::new(&[3, 3]).unwrap()), Err(CubePIRError::GeometryOverflow));
        assert_eq!(db.entry_at(&Coordinate::new(&[4, 0]).unwrap()), Err(CubePIRError::CoordinateOutOfRange));

        // Prefetching unreachable cells must be harmless.
        db.prefetch_entry(15);
        db.prefetch_entry(0);
    }

    #[test]
    fn agreed_geometry_must_fit_in_buffer() {
        let bytes = indexed_database(16, 1);
        let geometry = Geometry::new(17, 1, 2).unwrap();

        assert_eq!(Database::with_geometry(&bytes, geometry).map(|_| ()), Err(CubePIRError::GeometryOverflow));

        let geometry = Geometry::new(12, 1, 2).unwrap();
        let db = Database::with_geometry(&bytes, geometry).unwrap();

        assert_eq!(db.as_bytes().len(), 12 * 32);
        assert!(db.entry_bytes(12).is_none());
    }
}
