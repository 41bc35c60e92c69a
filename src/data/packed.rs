//! # Bit-Packed Field Vectors
//!
//! Fixed-width fields (1, 2 or 4 bits) packed little-endian into `u64` words.
//! Encoders read whole words at a time, so the bits past the last field must
//! stay zero: a stray `11` in the padding of a genotype vector reads as a
//! missing call. Every mutating method restores that invariant before
//! returning.

use bitvec::prelude::*;

/// Owned vector of `len` fields of `width` bits each
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackedBits {
    bits: BitVec<u64, Lsb0>,
    width: usize,
    len: usize,
}

/// Low bit of every 2-bit field in a word
pub const LOW_BITS_2: u64 = 0x5555_5555_5555_5555;

impl PackedBits {
    /// Create a zero-filled vector
    pub fn new(len: usize, width: usize) -> Self {
        debug_assert!(matches!(width, 1 | 2 | 4));
        Self {
            bits: bitvec![u64, Lsb0; 0; len * width],
            width,
            len,
        }
    }

    /// Adopt raw words produced elsewhere (e.g. by a decoder).
    ///
    /// Missing words are zero-filled and everything past `len * width` is
    /// cleared, whatever the caller left there.
    pub fn from_raw_words(words: Vec<u64>, len: usize, width: usize) -> Self {
        debug_assert!(matches!(width, 1 | 2 | 4));
        let mut bits = BitVec::<u64, Lsb0>::from_vec(words);
        bits.resize(len * width, false);
        bits.set_uninitialized(false);
        Self { bits, width, len }
    }

    /// Resize to `len` fields and zero everything, keeping capacity
    pub fn reset(&mut self, len: usize) {
        self.bits.clear();
        self.bits.resize(len * self.width, false);
        self.bits.set_uninitialized(false);
        self.len = len;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Read field `idx`
    #[inline]
    pub fn get(&self, idx: usize) -> u8 {
        let start = idx * self.width;
        self.bits[start..start + self.width].load_le::<u8>()
    }

    /// Write field `idx` (value is masked to the field width)
    #[inline]
    pub fn set(&mut self, idx: usize, value: u8) {
        let start = idx * self.width;
        let mask = ((1u16 << self.width) - 1) as u8;
        self.bits[start..start + self.width].store_le::<u8>(value & mask);
    }

    /// Raw words; padding bits are guaranteed zero
    #[inline]
    pub fn words(&self) -> &[u64] {
        self.bits.as_raw_slice()
    }

    /// Bytes of the packed representation, little-endian, padding included
    pub fn bytes(&self) -> impl Iterator<Item = u8> + '_ {
        let byte_ct = (self.len * self.width).div_ceil(8);
        self.words()
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .take(byte_ct)
    }

    /// Overwrite the packed representation from little-endian bytes.
    ///
    /// Bytes beyond the vector are ignored, missing bytes read as zero, and
    /// anything the input carried past the last field is cleared.
    pub fn load_bytes(&mut self, bytes: &[u8]) {
        self.load_bytes_mapped(bytes, |b| b);
    }

    /// Like [`load_bytes`](Self::load_bytes), passing every input byte
    /// through `map` first (e.g. a foreign 2-bit encoding)
    pub fn load_bytes_mapped(&mut self, bytes: &[u8], map: impl Fn(u8) -> u8) {
        for (word, chunk) in self
            .bits
            .as_raw_mut_slice()
            .iter_mut()
            .zip(bytes.chunks(8).chain(std::iter::repeat(&[][..])))
        {
            let mut buf = [0u8; 8];
            for (dst, &src) in buf.iter_mut().zip(chunk) {
                *dst = map(src);
            }
            *word = u64::from_le_bytes(buf);
        }
        self.zero_trailing();
    }

    /// Clear every bit past the last field
    pub fn zero_trailing(&mut self) {
        self.bits.set_uninitialized(false);
    }

    /// Swap genotype codes 0 and 2 in place (2-bit vectors only).
    ///
    /// Codes 1 and 3 are unchanged. The XOR turns padding zeros into `10`, so
    /// the trailing bits are cleared again afterwards.
    pub fn invert_alleles(&mut self) {
        debug_assert_eq!(self.width, 2);
        for word in self.bits.as_raw_mut_slice() {
            *word ^= (!*word & LOW_BITS_2) << 1;
        }
        self.zero_trailing();
    }

    /// Count fields equal to `value`
    pub fn count_value(&self, value: u8) -> usize {
        (0..self.len).filter(|&i| self.get(i) == value).count()
    }

    /// Iterate all fields
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }
}

/// Compress the even bits of a word into the low 32 bits
#[inline]
pub fn pack_even_bits(mut x: u64) -> u32 {
    x &= LOW_BITS_2;
    x = (x | (x >> 1)) & 0x3333_3333_3333_3333;
    x = (x | (x >> 2)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x >> 4)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x >> 8)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x >> 16)) & 0x0000_0000_FFFF_FFFF;
    x as u32
}
