use super::{branch_opt_util, error::CubePIRError};

/// Boolean vector over one cube axis, marking which axis values take part in a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectorVector {
    bits: Vec<bool>,
}

impl SelectorVector {
    pub fn new(bits: Vec<bool>) -> SelectorVector {
        SelectorVector { bits }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.bits.len()
    }
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }
    #[inline(always)]
    pub fn as_slice(&self) -> &[bool] {
        &self.bits
    }

    pub fn get(&self, idx: usize) -> Option<bool> {
        self.bits.get(idx).copied()
    }

    /// Number of set bits, which is what the server's scan cost along this axis is proportional to.
    pub fn popcount(&self) -> usize {
        self.bits.iter().filter(|&&bit| bit).count()
    }

    /// Toggles the bit at `idx`.
    pub fn flip(&mut self, idx: usize) -> Result<(), CubePIRError> {
        match self.bits.get_mut(idx) {
            Some(bit) => {
                *bit = !*bit;
                Ok(())
            }
            None => {
                branch_opt_util::cold();
                Err(CubePIRError::CoordinateOutOfRange)
            }
        }
    }

    /// Compacts set bits into a list of their indices, in ascending order.
    ///
    /// Scanning this list instead of testing each bit keeps data-dependent branches out of the server's innermost loop.
    pub fn active_indices(&self) -> Vec<usize> {
        let mut active = Vec::with_capacity(self.bits.len());
        let mut num_active = 0;

        active.resize(self.bits.len(), 0);
        for (idx, &bit) in self.bits.iter().enumerate() {
            active[num_active] = idx;
            num_active += bit as usize;
        }

        active.truncate(num_active);
        active
    }
}

#[cfg(test)]
mod test {
    use super::SelectorVector;
    use crate::CubePIRError;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;
    use test_case::test_case;

    #[test_case(vec![] => Vec::<usize>::new(); "Empty selector has no active index")]
    #[test_case(vec![false, false, false] => Vec::<usize>::new(); "All unset")]
    #[test_case(vec![true, true, true] => vec![0, 1, 2]; "All set")]
    #[test_case(vec![false, true, false, true, true] => vec![1, 3, 4]; "Mixed")]
    fn active_indices_are_set_bits_in_order(bits: Vec<bool>) -> Vec<usize> {
        SelectorVector::new(bits).active_indices()
    }

    #[test]
    fn active_indices_agree_with_popcount_on_random_selectors() {
        let mut rng = ChaCha8Rng::from_os_rng();

        for len in 1..=256 {
            let bits = (0..len).map(|_| rng.random::<bool>()).collect::<Vec<bool>>();
            let selector = SelectorVector::new(bits.clone());
            let active = selector.active_indices();

            assert_eq!(active.len(), selector.popcount());
            assert!(active.windows(2).all(|w| w[0] < w[1]));
            assert!(active.iter().all(|&idx| bits[idx]));
        }
    }

    #[test]
    fn flipping_twice_restores_selector() {
        let mut selector = SelectorVector::new(vec![true, false, true, false]);
        let original = selector.clone();

        selector.flip(1).unwrap();
        assert_eq!(selector.get(1), Some(true));
        assert_eq!(selector.popcount(), 3);

        selector.flip(1).unwrap();
        assert_eq!(selector, original);

        assert_eq!(selector.flip(4), Err(CubePIRError::CoordinateOutOfRange));
    }
}
