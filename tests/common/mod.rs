//! Helpers shared by the integration tests
#![allow(dead_code)]

use std::io::Read;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use gtexport::io::{MemorySource, MemoryVariant};
use gtexport::{ChromTable, Sample, SampleTable, Sex, Variant, VariantTable};

// --- Synthetic inputs ---

/// In-memory input with its tables
pub struct Fixture {
    pub source: MemorySource,
    pub samples: SampleTable,
    pub variants: VariantTable,
    pub chroms: ChromTable,
}

pub struct FixtureBuilder {
    rows: Vec<MemoryVariant>,
    chrom: String,
    sexes: Option<Vec<Sex>>,
    poison: bool,
}

impl FixtureBuilder {
    /// Variant-major code matrix (0 hom REF, 1 het, 2 hom ALT, 3 missing)
    pub fn from_codes(rows: &[Vec<u8>]) -> Self {
        Self::from_variants(rows.iter().cloned().map(MemoryVariant::from_codes).collect())
    }

    pub fn from_variants(rows: Vec<MemoryVariant>) -> Self {
        Self {
            rows,
            chrom: "1".to_string(),
            sexes: None,
            poison: false,
        }
    }

    pub fn chrom(mut self, name: &str) -> Self {
        self.chrom = name.to_string();
        self
    }

    pub fn sexes(mut self, sexes: Vec<Sex>) -> Self {
        self.sexes = Some(sexes);
        self
    }

    pub fn poison_padding(mut self) -> Self {
        self.poison = true;
        self
    }

    pub fn build(self) -> Fixture {
        let sample_ct = self.rows.first().map_or(0, |v| v.codes.len());
        let sexes = self
            .sexes
            .unwrap_or_else(|| (0..sample_ct).map(|i| if i % 2 == 0 { Sex::Female } else { Sex::Male }).collect());
        let mut chroms = ChromTable::new();
        let c = chroms.intern(&self.chrom);
        let samples = SampleTable::new(
            sexes
                .iter()
                .enumerate()
                .map(|(i, &sex)| Sample::new(i, "FAM", &format!("S{}", i + 1), sex))
                .collect(),
        );
        let variants = VariantTable::new(
            (0..self.rows.len())
                .map(|i| Variant::new(i, c, 1000 + 10 * i as u32, &format!("rs{}", i + 1), "A", "G"))
                .collect(),
        );
        Fixture {
            source: MemorySource::new(sample_ct, self.rows).with_padding_poison(self.poison),
            samples,
            variants,
            chroms,
        }
    }
}

/// Seeded random hardcalls with about 5% missing
pub fn random_codes(seed: u64, variant_ct: usize, sample_ct: usize) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..variant_ct)
        .map(|_| {
            (0..sample_ct)
                .map(|_| if rng.gen_bool(0.05) { 3 } else { rng.gen_range(0..3) })
                .collect()
        })
        .collect()
}

/// Seeded random variants carrying phase, dosages and dosage phase
pub fn random_dosage_variants(seed: u64, variant_ct: usize, sample_ct: usize) -> Vec<MemoryVariant> {
    let mut rng = StdRng::seed_from_u64(seed);
    let codes = random_codes(seed ^ 0x5eed, variant_ct, sample_ct);
    codes
        .into_iter()
        .map(|mut codes| {
            let mut dosages = vec![None; sample_ct];
            let mut dphase = vec![None; sample_ct];
            for s in 0..sample_ct {
                if codes[s] == 3 || !rng.gen_bool(0.3) {
                    continue;
                }
                let d: u16 = rng.gen_range(0..=32768);
                match d {
                    0 => codes[s] = 0,
                    16384 => codes[s] = 1,
                    32768 => codes[s] = 2,
                    _ => {}
                }
                dosages[s] = Some(d);
                if rng.gen_bool(0.5) {
                    let limit = d.min(32768 - d) as i32;
                    dphase[s] = Some(rng.gen_range(-limit..=limit) as i16);
                }
            }
            let orientation: Vec<bool> = (0..sample_ct).map(|_| rng.gen_bool(0.5)).collect();
            MemoryVariant::from_codes(codes)
                .with_phase(|s| orientation[s])
                .with_dosages(dosages)
                .with_dosage_phase(dphase)
        })
        .collect()
}

// --- Output readers ---

/// Output prefix inside `dir`
pub fn prefix(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
}

/// Decode a sample-major `.bed` back into a variant-major code matrix
/// (codes relative to REF, as the input was given)
pub fn read_sample_major_bed(path: &Path, sample_ct: usize, variant_ct: usize) -> Vec<Vec<u8>> {
    let bytes = std::fs::read(path).expect("read .bed");
    assert_eq!(&bytes[..3], &[0x6c, 0x1b, 0x00], "sample-major magic");
    let row_bytes = variant_ct.div_ceil(4);
    assert_eq!(bytes.len(), 3 + row_bytes * sample_ct, ".bed size");
    let mut codes = vec![vec![0u8; sample_ct]; variant_ct];
    for s in 0..sample_ct {
        let row = &bytes[3 + s * row_bytes..3 + (s + 1) * row_bytes];
        for (v, variant_codes) in codes.iter_mut().enumerate() {
            let cell = (row[v / 4] >> (2 * (v % 4))) & 3;
            // 00 hom A1 (ALT), 01 missing, 10 het, 11 hom A2 (REF)
            variant_codes[s] = [2, 3, 1, 0][cell as usize];
        }
        for v in variant_ct..row_bytes * 4 {
            assert_eq!((row[v / 4] >> (2 * (v % 4))) & 3, 0, "padding cell of sample {}", s);
        }
    }
    codes
}

/// One variant of a BGEN file as read back
#[derive(Debug)]
pub struct BgenVariant {
    pub id: String,
    pub chrom: String,
    pub pos: u32,
    pub alleles: [String; 2],
    /// Uncompressed genotype block
    pub block: Vec<u8>,
}

/// The parts of a BGEN file the tests look at
#[derive(Debug)]
pub struct BgenFile {
    pub variant_ct: u32,
    pub sample_ct: u32,
    pub flags: u32,
    pub sample_ids: Vec<String>,
    pub variants: Vec<BgenVariant>,
}

struct Cursor<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> &'a [u8] {
        let s = &self.bytes[self.at..self.at + n];
        self.at += n;
        s
    }

    fn u16(&mut self) -> u16 {
        let b = self.take(2);
        u16::from_le_bytes([b[0], b[1]])
    }

    fn u32(&mut self) -> u32 {
        let b = self.take(4);
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    fn str16(&mut self) -> String {
        let n = self.u16() as usize;
        String::from_utf8(self.take(n).to_vec()).expect("utf8")
    }

    fn str32(&mut self) -> String {
        let n = self.u32() as usize;
        String::from_utf8(self.take(n).to_vec()).expect("utf8")
    }
}

/// Minimal BGEN reader for layouts 1 and 2
pub fn read_bgen(path: &Path) -> BgenFile {
    let bytes = std::fs::read(path).expect("read .bgen");
    let mut c = Cursor { bytes: &bytes, at: 0 };
    let offset = c.u32() as usize;
    let header_len = c.u32() as usize;
    let variant_ct = c.u32();
    let sample_ct = c.u32();
    assert_eq!(c.take(4), b"bgen");
    let flags = c.u32();
    c.at = 4 + header_len;
    let compression = flags & 3;
    let layout = (flags >> 2) & 0xF;

    let mut sample_ids = Vec::new();
    if flags >> 31 == 1 {
        let _block_len = c.u32();
        let n = c.u32();
        for _ in 0..n {
            sample_ids.push(c.str16());
        }
    }
    c.at = 4 + offset;

    let mut variants = Vec::new();
    for _ in 0..variant_ct {
        if layout == 1 {
            assert_eq!(c.u32(), sample_ct);
        }
        let id = c.str16();
        let _rsid = c.str16();
        let chrom = c.str16();
        let pos = c.u32();
        if layout == 2 {
            assert_eq!(c.u16(), 2);
        }
        let alleles = [c.str32(), c.str32()];
        let block = if layout == 1 {
            let len = c.u32() as usize;
            let data = c.take(len);
            if compression == 0 {
                data.to_vec()
            } else {
                let mut out = Vec::new();
                flate2::read::ZlibDecoder::new(data).read_to_end(&mut out).expect("inflate");
                out
            }
        } else {
            let len = c.u32() as usize;
            if compression == 0 {
                c.take(len).to_vec()
            } else {
                let d = c.u32() as usize;
                let data = c.take(len - 4);
                let out = if compression == 1 {
                    let mut out = Vec::new();
                    flate2::read::ZlibDecoder::new(data).read_to_end(&mut out).expect("inflate");
                    out
                } else {
                    zstd::decode_all(data).expect("zstd")
                };
                assert_eq!(out.len(), d);
                out
            }
        };
        variants.push(BgenVariant {
            id,
            chrom,
            pos,
            alleles,
            block,
        });
    }
    assert_eq!(c.at, bytes.len(), "trailing bytes after last variant");
    BgenFile {
        variant_ct,
        sample_ct,
        flags,
        sample_ids,
        variants,
    }
}

/// Decoded layout-2 block of a biallelic diploid variant
#[derive(Debug)]
pub struct Layout2Block {
    pub missing: Vec<bool>,
    pub phased: bool,
    pub bits: u8,
    /// Two stored values per sample
    pub values: Vec<[u32; 2]>,
}

pub fn parse_layout2(block: &[u8]) -> Layout2Block {
    let mut c = Cursor { bytes: block, at: 0 };
    let n = c.u32() as usize;
    assert_eq!(c.u16(), 2);
    assert_eq!(c.take(2), &[2, 2]);
    let missing = c.take(n).iter().map(|&b| b & 0x80 != 0).collect();
    let phased = c.take(1)[0] == 1;
    let bits = c.take(1)[0];
    let data = &block[c.at..];
    let mut bit = 0usize;
    let mut read = |width: usize| -> u32 {
        let mut v = 0u32;
        for k in 0..width {
            let b = bit + k;
            v |= (((data[b / 8] >> (b % 8)) & 1) as u32) << k;
        }
        bit += width;
        v
    };
    let values = (0..n).map(|_| [read(bits as usize), read(bits as usize)]).collect();
    assert_eq!(data.len(), (bit).div_ceil(8));
    Layout2Block {
        missing,
        phased,
        bits,
        values,
    }
}

/// Most likely genotype (0, 1, 2) of an unphased layout-2 probability pair
pub fn unphased_call(values: [u32; 2], bits: u8) -> u8 {
    let max = (1u32 << bits) - 1;
    let p = [values[0], values[1], max - values[0] - values[1]];
    (0..3).max_by_key(|&i| p[i]).unwrap_or(0) as u8
}
