use super::{
    branch_opt_util,
    error::CubePIRError,
    geometry::{Coordinate, Geometry},
    params::{MAX_DIMENSIONS, MIN_DIMENSIONS, SEED_BYTE_LEN},
    selector::SelectorVector,
    serialization,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use turboshake::TurboShake128;

/// A PIR query: one selector vector per cube axis.
///
/// A query on its own is just uniformly random bits, it carries no information about the record being fetched.
/// Only the relation between a query and its [probe](Query::probe) does, which is why the two must go to non-colluding servers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    selectors: Vec<SelectorVector>,
}

impl Query {
    /// Builds a query from explicit selectors. All of them must have the same, non-zero, length.
    pub fn from_selectors(selectors: Vec<SelectorVector>) -> Result<Query, CubePIRError> {
        if branch_opt_util::unlikely(!(MIN_DIMENSIONS..=MAX_DIMENSIONS).contains(&selectors.len())) {
            return Err(CubePIRError::UnsupportedDimensionCount(selectors.len()));
        }

        let axis_len = selectors[0].len();
        if branch_opt_util::unlikely(axis_len == 0 || selectors.iter().any(|selector| selector.len() != axis_len)) {
            return Err(CubePIRError::QueryGeometryMismatch);
        }

        Ok(Query { selectors })
    }

    /// Samples a fresh query, with `dimensions` selectors of `axis_len` fair coin flips each, using an OS seeded CSPRNG.
    pub fn generate(axis_len: usize, dimensions: usize) -> Result<Query, CubePIRError> {
        let mut rng = ChaCha8Rng::from_os_rng();
        Query::generate_with_rng(&mut rng, axis_len, dimensions)
    }

    /// Same as [`Query::generate`], but draws coins from a caller provided generator.
    pub fn generate_with_rng<R: Rng>(rng: &mut R, axis_len: usize, dimensions: usize) -> Result<Query, CubePIRError> {
        let selectors = (0..dimensions)
            .map(|_| SelectorVector::new((0..axis_len).map(|_| rng.random::<bool>()).collect()))
            .collect();

        Query::from_selectors(selectors)
    }

    /// Deterministically expands a seed into a query, by squeezing one bit per selector element out of TurboSHAKE128.
    ///
    /// Axis length and dimension count are absorbed along with the seed, so the same seed yields unrelated queries for different geometries.
    pub fn generate_from_seed(seed: &[u8; SEED_BYTE_LEN], axis_len: usize, dimensions: usize) -> Result<Query, CubePIRError> {
        let mut hasher = TurboShake128::default();
        hasher.absorb(seed);
        hasher.absorb(&(axis_len as u64).to_le_bytes());
        hasher.absorb(&(dimensions as u64).to_le_bytes());
        hasher.finalize::<{ TurboShake128::DEFAULT_DOMAIN_SEPARATOR }>();

        let selector_byte_len = serialization::packed_byte_len(axis_len);
        let mut selector_bytes = vec![0u8; selector_byte_len];

        let selectors = (0..dimensions)
            .map(|_| {
                hasher.squeeze(&mut selector_bytes);
                SelectorVector::new(serialization::unpack_bits(&selector_bytes, axis_len))
            })
            .collect();

        Query::from_selectors(selectors)
    }

    #[inline(always)]
    pub fn dimensions(&self) -> usize {
        self.selectors.len()
    }
    #[inline(always)]
    pub fn axis_len(&self) -> usize {
        self.selectors[0].len()
    }
    #[inline(always)]
    pub fn selectors(&self) -> &[SelectorVector] {
        &self.selectors
    }

    /// Whether this query has the selector count and selector length a server holding a database of given geometry expects.
    pub fn matches(&self, geometry: &Geometry) -> bool {
        self.dimensions() == geometry.dimensions() && self.axis_len() == geometry.axis_len()
    }

    /// Flips bit `idx` of the selector along `axis`.
    pub fn flip(&mut self, axis: usize, idx: usize) -> Result<(), CubePIRError> {
        match self.selectors.get_mut(axis) {
            Some(selector) => selector.flip(idx),
            None => {
                branch_opt_util::cold();
                Err(CubePIRError::CoordinateOutOfRange)
            }
        }
    }

    /// Derives the probe query for `coordinate`: identical to this query, except that in every selector `d`, bit `coordinate[d]` is flipped.
    pub fn probe(&self, coordinate: &Coordinate) -> Result<Query, CubePIRError> {
        if branch_opt_util::unlikely(coordinate.dimensions() != self.dimensions()) {
            return Err(CubePIRError::CoordinateOutOfRange);
        }

        let mut probe = self.clone();
        for (axis, &axis_value) in coordinate.as_slice().iter().enumerate() {
            probe.flip(axis, axis_value)?;
        }

        Ok(probe)
    }

    /// Number of bytes a serialized query takes for the given geometry. Saturates at `usize::MAX`, which no byte slice can match.
    pub const fn byte_len(axis_len: usize, dimensions: usize) -> usize {
        dimensions.saturating_mul(serialization::packed_byte_len(axis_len))
    }

    /// Serializes the query as its selectors, one after another, each bit-packed least significant bit first.
    pub fn to_bytes(&self) -> Vec<u8> {
        let selector_byte_len = serialization::packed_byte_len(self.axis_len());
        let mut bytes = vec![0u8; Query::byte_len(self.axis_len(), self.dimensions())];

        bytes
            .chunks_exact_mut(selector_byte_len)
            .zip(&self.selectors)
            .for_each(|(chunk, selector)| serialization::pack_bits(selector.as_slice(), chunk));

        bytes
    }

    /// Parses a query serialized by [`Query::to_bytes`], given the agreed geometry. Lengths and padding bits are checked.
    pub fn from_bytes(bytes: &[u8], axis_len: usize, dimensions: usize) -> Result<Query, CubePIRError> {
        if branch_opt_util::unlikely(!(MIN_DIMENSIONS..=MAX_DIMENSIONS).contains(&dimensions)) {
            return Err(CubePIRError::FailedToDeserializeQuery);
        }
        if branch_opt_util::unlikely(axis_len == 0 || bytes.len() != Query::byte_len(axis_len, dimensions)) {
            return Err(CubePIRError::FailedToDeserializeQuery);
        }

        let selector_byte_len = serialization::packed_byte_len(axis_len);
        let mut selectors = Vec::with_capacity(dimensions);

        for chunk in bytes.chunks_exact(selector_byte_len) {
            if branch_opt_util::unlikely(!serialization::padding_is_zero(chunk, axis_len)) {
                return Err(CubePIRError::FailedToDeserializeQuery);
            }
            selectors.push(SelectorVector::new(serialization::unpack_bits(chunk, axis_len)));
        }

        Query::from_selectors(selectors)
    }
}

#[cfg(test)]
mod test {
    use super::Query;
    use crate::{
        CubePIRError,
        pir_internals::{geometry::Coordinate, selector::SelectorVector},
    };
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;
    use test_case::test_case;

    #[test_case(4, 2 => matches Ok(_); "Two axes")]
    #[test_case(3, 3 => matches Ok(_); "Three axes")]
    #[test_case(4, 1 => Err(CubePIRError::UnsupportedDimensionCount(1)); "Single axis is not supported")]
    #[test_case(4, 4 => Err(CubePIRError::UnsupportedDimensionCount(4)); "Four axes are not supported")]
    #[test_case(0, 2 => Err(CubePIRError::QueryGeometryMismatch); "Selectors can't be empty")]
    fn query_generation_api(axis_len: usize, dimensions: usize) -> Result<Query, CubePIRError> {
        Query::generate(axis_len, dimensions)
    }

    #[test]
    fn selectors_must_share_length() {
        let selectors = vec![SelectorVector::new(vec![true; 4]), SelectorVector::new(vec![false; 3])];
        assert_eq!(Query::from_selectors(selectors), Err(CubePIRError::QueryGeometryMismatch));
    }

    #[test]
    fn generated_selectors_are_roughly_balanced() {
        const AXIS_LEN: usize = 1usize << 14;

        let mut rng = ChaCha8Rng::from_os_rng();
        let query = Query::generate_with_rng(&mut rng, AXIS_LEN, 3).unwrap();

        for selector in query.selectors() {
            // Binomial(2^14, 1/2) has a standard deviation of 64, this is a 10 sigma margin.
            let popcount = selector.popcount();
            assert!(popcount.abs_diff(AXIS_LEN / 2) < 640, "popcount = {}", popcount);
        }
    }

    #[test]
    fn probe_flips_exactly_one_bit_per_axis() {
        let mut rng = ChaCha8Rng::from_os_rng();

        for dimensions in 2..=3 {
            let axis_len = rng.random_range(1..64);
            let query = Query::generate_with_rng(&mut rng, axis_len, dimensions).unwrap();

            let axes = (0..dimensions).map(|_| rng.random_range(0..axis_len)).collect::<Vec<usize>>();
            let coordinate = Coordinate::new(&axes).unwrap();
            let probe = query.probe(&coordinate).unwrap();

            for (axis, (lhs, rhs)) in query.selectors().iter().zip(probe.selectors()).enumerate() {
                let differing = lhs.as_slice().iter().zip(rhs.as_slice()).enumerate().filter(|(_, (a, b))| a != b).map(|(idx, _)| idx).collect::<Vec<usize>>();
                assert_eq!(differing, vec![axes[axis]]);
            }

            assert_eq!(probe.probe(&coordinate).unwrap(), query);
        }
    }

    #[test]
    fn probe_rejects_out_of_range_coordinates() {
        let query = Query::generate(4, 2).unwrap();

        assert_eq!(query.probe(&Coordinate::new(&[0, 4]).unwrap()), Err(CubePIRError::CoordinateOutOfRange));
        assert_eq!(query.probe(&Coordinate::new(&[0, 0, 0]).unwrap()), Err(CubePIRError::CoordinateOutOfRange));
    }

    #[test]
    fn seeded_generation_is_deterministic() {
        let mut rng = ChaCha8Rng::from_os_rng();
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);

        let lhs = Query::generate_from_seed(&seed, 100, 3).unwrap();
        let rhs = Query::generate_from_seed(&seed, 100, 3).unwrap();
        assert_eq!(lhs, rhs);

        let other_geometry = Query::generate_from_seed(&seed, 100, 2).unwrap();
        assert_ne!(lhs.selectors()[0], other_geometry.selectors()[0]);

        seed[0] ^= 1;
        let other_seed = Query::generate_from_seed(&seed, 100, 3).unwrap();
        assert_ne!(lhs, other_seed);
    }

    #[test]
    fn serialized_query_can_be_deserialized() {
        let mut rng = ChaCha8Rng::from_os_rng();

        for dimensions in 2..=3 {
            for axis_len in 1..=40 {
                let query = Query::generate_with_rng(&mut rng, axis_len, dimensions).unwrap();
                let bytes = query.to_bytes();

                assert_eq!(bytes.len(), Query::byte_len(axis_len, dimensions));
                assert_eq!(Query::from_bytes(&bytes, axis_len, dimensions), Ok(query));
            }
        }
    }

    #[test]
    fn serialized_length_never_wraps() {
        assert_eq!(Query::byte_len(10, 3), 6);
        assert_eq!(Query::byte_len(usize::MAX, 3), usize::MAX);
        assert_eq!(Query::byte_len(16, usize::MAX), usize::MAX);
    }

    #[test]
    fn malformed_query_bytes_are_rejected() {
        let query = Query::generate(10, 2).unwrap();
        let bytes = query.to_bytes();

        assert_eq!(Query::from_bytes(&bytes[1..], 10, 2), Err(CubePIRError::FailedToDeserializeQuery));
        assert_eq!(Query::from_bytes(&bytes, 10, 3), Err(CubePIRError::FailedToDeserializeQuery));
        assert_eq!(Query::from_bytes(&bytes, 0, 2), Err(CubePIRError::FailedToDeserializeQuery));

        assert_eq!(Query::from_bytes(&bytes, 10, usize::MAX), Err(CubePIRError::FailedToDeserializeQuery));
        assert_eq!(Query::from_bytes(&bytes, usize::MAX, 2), Err(CubePIRError::FailedToDeserializeQuery));
        assert_eq!(Query::from_bytes(&[], 10, 0), Err(CubePIRError::FailedToDeserializeQuery));

        let mut dirty_padding = bytes.clone();
        dirty_padding[1] |= 0b1000_0000;
        assert_eq!(Query::from_bytes(&dirty_padding, 10, 2), Err(CubePIRError::FailedToDeserializeQuery));
    }
}
