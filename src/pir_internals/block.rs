use super::params::BLOCK_BYTE_LEN;

/// One SIMD lane worth of bytes. Entries are made of a fixed number of blocks, and blocks are what gets XOR-ed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C, align(32))]
pub struct Block(pub [u8; BLOCK_BYTE_LEN]);

impl Block {
    pub const ZERO: Block = Block([0u8; BLOCK_BYTE_LEN]);

    #[inline(always)]
    pub fn is_zero(&self) -> bool {
        self.0.iter().fold(0u8, |acc, &byte| acc | byte) == 0
    }
}

/// Views a slice of blocks as its underlying bytes.
#[inline(always)]
pub fn blocks_as_bytes(blocks: &[Block]) -> &[u8] {
    // `Block` is `repr(C)` over a byte array whose length is a multiple of its alignment, so it carries no padding.
    unsafe { core::slice::from_raw_parts(blocks.as_ptr().cast::<u8>(), std::mem::size_of_val(blocks)) }
}

/// XOR-accumulate kernel over blocks, with interchangeable instruction set backends.
pub trait VectorXor: Copy + Send + Sync {
    const NAME: &'static str;

    /// Computes `acc[i] ^= src[i * 32..(i + 1) * 32]` for every block of `acc`. `src` must be exactly `acc.len() * 32` bytes long.
    fn xor_bytes_into(&self, acc: &mut [Block], src: &[u8]);

    #[inline(always)]
    fn xor_blocks_into(&self, acc: &mut [Block], src: &[Block]) {
        self.xor_bytes_into(acc, blocks_as_bytes(src));
    }
}

/// Portable backend, plain byte-wise XOR which the compiler is free to auto-vectorize.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScalarXor;

impl VectorXor for ScalarXor {
    const NAME: &'static str = "scalar";

    #[inline(always)]
    fn xor_bytes_into(&self, acc: &mut [Block], src: &[u8]) {
        debug_assert_eq!(src.len(), acc.len() * BLOCK_BYTE_LEN);

        acc.iter_mut().zip(src.chunks_exact(BLOCK_BYTE_LEN)).for_each(|(acc_block, src_block)| {
            acc_block.0.iter_mut().zip(src_block).for_each(|(a, &s)| *a ^= s);
        });
    }
}

/// 256 -bit AVX2 backend. Can only be obtained through [`Avx2Xor::detect`], so holding one proves the running CPU supports AVX2.
#[cfg(target_arch = "x86_64")]
#[derive(Clone, Copy, Debug)]
pub struct Avx2Xor {
    _detected: (),
}

#[cfg(target_arch = "x86_64")]
impl Avx2Xor {
    pub fn detect() -> Option<Avx2Xor> {
        if std::arch::is_x86_feature_detected!("avx2") {
            Some(Avx2Xor { _detected: () })
        } else {
            None
        }
    }

    #[target_feature(enable = "avx2")]
    #[inline]
    unsafe fn xor_bytes_into_avx2(acc: &mut [Block], src: &[u8]) {
        use std::arch::x86_64::{__m256i, _mm256_load_si256, _mm256_loadu_si256, _mm256_store_si256, _mm256_xor_si256};

        for (acc_block, src_block) in acc.iter_mut().zip(src.chunks_exact(BLOCK_BYTE_LEN)) {
            // Accumulator blocks are 32 -bytes aligned, database bytes carry no alignment guarantee.
            unsafe {
                let acc_ptr = (acc_block as *mut Block).cast::<__m256i>();
                let lhs = _mm256_load_si256(acc_ptr);
                let rhs = _mm256_loadu_si256(src_block.as_ptr().cast::<__m256i>());
                _mm256_store_si256(acc_ptr, _mm256_xor_si256(lhs, rhs));
            }
        }
    }
}

#[cfg(target_arch = "x86_64")]
impl VectorXor for Avx2Xor {
    const NAME: &'static str = "avx2";

    #[inline(always)]
    fn xor_bytes_into(&self, acc: &mut [Block], src: &[u8]) {
        debug_assert_eq!(src.len(), acc.len() * BLOCK_BYTE_LEN);
        unsafe { Self::xor_bytes_into_avx2(acc, src) }
    }
}

/// Which XOR kernel the server should use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum XorBackend {
    /// Widest backend supported by the running CPU, falling back to scalar.
    #[default]
    Auto,
    /// AVX2 only. Answering fails with `BackendUnavailable` on CPUs without it.
    Avx2,
    Scalar,
}

impl XorBackend {
    /// Whether the running CPU can execute this backend.
    pub fn is_available(self) -> bool {
        match self {
            XorBackend::Auto | XorBackend::Scalar => true,
            #[cfg(target_arch = "x86_64")]
            XorBackend::Avx2 => Avx2Xor::detect().is_some(),
            #[cfg(not(target_arch = "x86_64"))]
            XorBackend::Avx2 => false,
        }
    }
}

/// A database record: a fixed number of blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    blocks: Vec<Block>,
}

impl Entry {
    pub fn zeroed(blocks_per_entry: usize) -> Entry {
        Entry {
            blocks: vec![Block::ZERO; blocks_per_entry],
        }
    }

    pub fn from_blocks(blocks: &[Block]) -> Entry {
        Entry { blocks: blocks.to_vec() }
    }

    /// Copies a byte slice, whose length must be a multiple of 32, into a new entry.
    pub fn from_bytes(bytes: &[u8]) -> Option<Entry> {
        if bytes.len() % BLOCK_BYTE_LEN != 0 {
            return None;
        }

        let mut entry = Entry::zeroed(bytes.len() / BLOCK_BYTE_LEN);
        ScalarXor.xor_bytes_into(&mut entry.blocks, bytes);

        Some(entry)
    }

    #[inline(always)]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }
    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        blocks_as_bytes(&self.blocks)
    }
    pub fn into_bytes(self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    /// XORs `rhs` into this entry, block by block. `rhs` must have as many blocks as this entry.
    #[inline(always)]
    pub fn xor_blocks(&mut self, rhs: &[Block]) {
        ScalarXor.xor_blocks_into(&mut self.blocks, rhs);
    }

    pub fn is_zero(&self) -> bool {
        self.blocks.iter().all(Block::is_zero)
    }
}
