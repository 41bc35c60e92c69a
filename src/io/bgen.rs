//! # BGEN Output
//!
//! Header, optional sample identifier block and per-variant identifying
//! data. Genotype blocks arrive already encoded. All integers are
//! little-endian.
//!
//! ```text
//! offset u32 | LH u32 = 20 | M u32 | N u32 | "bgen" | flags u32
//! [ LSI u32 | N u32 | (len u16, id) * N ]          v1.2+ only
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::data::Variant;
use crate::error::Result;
use crate::export::BgenCompression;
use crate::io::oxford::write_sample_file;
use crate::io::sink::{checked_u16, checked_u32, create_output, with_suffix, ExportMeta, RecordWriter};
use crate::model::MissingCounts;

const HEADER_LEN: u32 = 20;
const MAGIC: &[u8; 4] = b"bgen";

/// Which BGEN container to write
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BgenLayout {
    /// v1.1 (layout 1), zlib-compressed or not
    V11 { compressed: bool },
    /// v1.2 / v1.3 (layout 2) with a sample identifier block
    V12 { compression: BgenCompression },
}

impl BgenLayout {
    fn flags(self) -> u32 {
        match self {
            BgenLayout::V11 { compressed } => compressed as u32 | (1 << 2),
            BgenLayout::V12 { compression } => compression.flag() | (2 << 2) | (1 << 31),
        }
    }
}

/// BGEN record writer with a `.sample` companion
pub struct BgenRecordWriter {
    out: BufWriter<File>,
    prefix: PathBuf,
    layout: BgenLayout,
    written: u64,
}

impl BgenRecordWriter {
    pub fn create(prefix: &Path, layout: BgenLayout) -> Result<Self> {
        Ok(Self {
            out: create_output(&with_suffix(prefix, "bgen"))?,
            prefix: prefix.to_path_buf(),
            layout,
            written: 0,
        })
    }

    fn put_u16_str(buf: &mut Vec<u8>, s: &str, what: &str) -> Result<()> {
        buf.extend_from_slice(&checked_u16(s.len(), what)?.to_le_bytes());
        buf.extend_from_slice(s.as_bytes());
        Ok(())
    }

    fn put_u32_str(buf: &mut Vec<u8>, s: &str, what: &str) -> Result<()> {
        buf.extend_from_slice(&checked_u32(s.len(), what)?.to_le_bytes());
        buf.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

/// Header plus sample block for `layout`
pub fn bgen_header(meta: &ExportMeta<'_>, layout: BgenLayout) -> Result<Vec<u8>> {
    let m = checked_u32(meta.variants.len(), "variant count")?;
    let n = checked_u32(meta.samples.len(), "sample count")?;

    let mut sample_block = Vec::new();
    if let BgenLayout::V12 { .. } = layout {
        let ids: Vec<String> = meta.samples.iter().map(|s| s.output_id()).collect();
        let lsi = 8 + ids.iter().map(|id| 2 + id.len()).sum::<usize>();
        sample_block.extend_from_slice(&checked_u32(lsi, "sample identifier block")?.to_le_bytes());
        sample_block.extend_from_slice(&n.to_le_bytes());
        for id in &ids {
            BgenRecordWriter::put_u16_str(&mut sample_block, id, "sample ID")?;
        }
    }

    let offset = checked_u32(HEADER_LEN as usize + sample_block.len(), "variant data offset")?;
    let mut header = Vec::with_capacity(4 + HEADER_LEN as usize + sample_block.len());
    header.extend_from_slice(&offset.to_le_bytes());
    header.extend_from_slice(&HEADER_LEN.to_le_bytes());
    header.extend_from_slice(&m.to_le_bytes());
    header.extend_from_slice(&n.to_le_bytes());
    header.extend_from_slice(MAGIC);
    header.extend_from_slice(&layout.flags().to_le_bytes());
    header.extend_from_slice(&sample_block);
    Ok(header)
}

impl RecordWriter for BgenRecordWriter {
    fn write_header(&mut self, meta: &ExportMeta<'_>) -> Result<()> {
        let header = bgen_header(meta, self.layout)?;
        self.out.write_all(&header)?;
        Ok(())
    }

    fn write_record(&mut self, meta: &ExportMeta<'_>, variant: &Variant, payload: &[u8]) -> Result<()> {
        let (a, b) = variant.ordered_alleles(meta.alt_first);
        let mut block = Vec::with_capacity(32 + variant.id.len() * 2 + a.len() + b.len());
        if let BgenLayout::V11 { .. } = self.layout {
            block.extend_from_slice(&checked_u32(meta.samples.len(), "sample count")?.to_le_bytes());
        }
        Self::put_u16_str(&mut block, &variant.id, "variant ID")?;
        Self::put_u16_str(&mut block, &variant.id, "rsid")?;
        Self::put_u16_str(&mut block, meta.chrom_name(variant), "chromosome name")?;
        block.extend_from_slice(&variant.pos.to_le_bytes());
        if let BgenLayout::V12 { .. } = self.layout {
            block.extend_from_slice(&2u16.to_le_bytes());
        }
        Self::put_u32_str(&mut block, a, "allele")?;
        Self::put_u32_str(&mut block, b, "allele")?;
        self.out.write_all(&block)?;
        self.out.write_all(payload)?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self, meta: &ExportMeta<'_>, missing: &MissingCounts) -> Result<Vec<PathBuf>> {
        debug_assert_eq!(self.written, meta.variants.len() as u64);
        self.out.flush()?;
        let sample = with_suffix(&self.prefix, "sample");
        write_sample_file(&sample, meta, missing)?;
        Ok(vec![with_suffix(&self.prefix, "bgen"), sample])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ChromTable, Sample, SampleTable, Sex, VariantTable};

    fn u32_at(b: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
    }

    fn tables() -> (SampleTable, VariantTable, ChromTable) {
        let mut chroms = ChromTable::new();
        let c = chroms.intern("1");
        (
            SampleTable::new(vec![
                Sample::new(0, "0", "ab", Sex::Male),
                Sample::new(1, "0", "cde", Sex::Female),
            ]),
            VariantTable::new(vec![Variant::new(0, c, 7, "rs1", "A", "GT")]),
            chroms,
        )
    }

    #[test]
    fn test_v11_header() {
        let (samples, variants, chroms) = tables();
        let meta = ExportMeta { samples: &samples, variants: &variants, chroms: &chroms, alt_first: false };
        let h = bgen_header(&meta, BgenLayout::V11 { compressed: true }).unwrap();
        assert_eq!(h.len(), 24);
        assert_eq!(u32_at(&h, 0), 20);
        assert_eq!(u32_at(&h, 8), 1);
        assert_eq!(u32_at(&h, 12), 2);
        assert_eq!(&h[16..20], b"bgen");
        assert_eq!(u32_at(&h, 20), 0b101);
    }

    #[test]
    fn test_v13_header_has_sample_block() {
        let (samples, variants, chroms) = tables();
        let meta = ExportMeta { samples: &samples, variants: &variants, chroms: &chroms, alt_first: false };
        let h = bgen_header(&meta, BgenLayout::V12 { compression: BgenCompression::Zstd }).unwrap();
        let lsi = 8 + 2 + 2 + 2 + 3;
        assert_eq!(u32_at(&h, 0) as usize, 20 + lsi);
        assert_eq!(h.len(), 24 + lsi);
        assert_eq!(u32_at(&h, 20), 2 | (2 << 2) | (1 << 31));
        assert_eq!(u32_at(&h, 24) as usize, lsi);
        assert_eq!(&h[34..36], b"ab");
        assert_eq!(&h[38..41], b"cde");
    }

    #[test]
    fn test_variant_block_v12() {
        let (samples, variants, chroms) = tables();
        let meta = ExportMeta { samples: &samples, variants: &variants, chroms: &chroms, alt_first: true };
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("o");
        let layout = BgenLayout::V12 { compression: BgenCompression::None };
        let mut w = BgenRecordWriter::create(&prefix, layout).unwrap();
        w.write_header(&meta).unwrap();
        w.write_record(&meta, variants.get(0), &[9, 9]).unwrap();
        let paths = w.finish(&meta, &MissingCounts::new(2)).unwrap();
        let bytes = std::fs::read(&paths[0]).unwrap();
        let start = 4 + u32_at(&bytes, 0) as usize;
        let mut expected = Vec::new();
        expected.extend_from_slice(&[3, 0]);
        expected.extend_from_slice(b"rs1");
        expected.extend_from_slice(&[3, 0]);
        expected.extend_from_slice(b"rs1");
        expected.extend_from_slice(&[1, 0]);
        expected.extend_from_slice(b"1");
        expected.extend_from_slice(&7u32.to_le_bytes());
        expected.extend_from_slice(&[2, 0]);
        expected.extend_from_slice(&2u32.to_le_bytes());
        expected.extend_from_slice(b"GT");
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.extend_from_slice(b"A");
        expected.extend_from_slice(&[9, 9]);
        assert_eq!(&bytes[start..], &expected[..]);
        assert!(paths[1].exists());
    }

    #[test]
    fn test_overlong_sample_id_hits_format_limit() {
        let (_, variants, chroms) = tables();
        let samples = SampleTable::new(vec![Sample::new(0, "0", &"x".repeat(70000), Sex::Male)]);
        let meta = ExportMeta { samples: &samples, variants: &variants, chroms: &chroms, alt_first: false };
        let err = bgen_header(&meta, BgenLayout::V12 { compression: BgenCompression::Zlib }).unwrap_err();
        assert!(matches!(err, crate::error::ExportError::FormatLimit { .. }));
    }
}
