//! # PLINK1 Variant Rows
//!
//! Re-codes one oriented record as a PLINK1 row (A1 = ALT printed first):
//!
//! | code | meaning      | PLINK1 |
//! |------|--------------|--------|
//! | 0    | hom A1       | `00`   |
//! | 1    | het          | `10`   |
//! | 2    | hom A2       | `11`   |
//! | 3    | missing      | `01`   |
//!
//! The transpose pipeline turns these rows into the sample-major file.

use crate::data::VariantRecord;
use crate::error::Result;
use crate::export::{EncodeScratch, FormatEncoder, VariantContext};
use crate::io::source::DecodeFeatures;

const fn plink1_byte_table() -> [u8; 256] {
    let map = [0b00u8, 0b10, 0b11, 0b01];
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut v = 0u8;
        let mut k = 0;
        while k < 4 {
            v |= map[(i >> (2 * k)) & 3] << (2 * k);
            k += 1;
        }
        table[i] = v;
        i += 1;
    }
    table
}

/// Four codes per byte in, four PLINK1 cells per byte out
pub static TO_PLINK1: [u8; 256] = plink1_byte_table();

/// Variant-major PLINK1 row encoder
#[derive(Clone, Debug, Default)]
pub struct BedEncoder;

impl BedEncoder {
    pub fn new() -> Self {
        Self
    }

    pub fn row_bytes(sample_ct: usize) -> usize {
        sample_ct.div_ceil(4)
    }
}

impl FormatEncoder for BedEncoder {
    fn name(&self) -> &'static str {
        "ind-major-bed"
    }

    fn required_decode_features(&self) -> DecodeFeatures {
        DecodeFeatures::HARDCALLS
    }

    fn alt_first(&self) -> bool {
        true
    }

    fn max_encoded_len(&self, sample_ct: usize) -> usize {
        Self::row_bytes(sample_ct)
    }

    fn encode_variant(
        &self,
        _vctx: &VariantContext<'_>,
        record: &VariantRecord,
        _scratch: &mut EncodeScratch,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        let row_bytes = Self::row_bytes(record.sample_ct());
        out.extend(
            record
                .genotypes
                .codes
                .bytes()
                .take(row_bytes)
                .map(|b| TO_PLINK1[b as usize]),
        );
        Ok(())
    }
}
