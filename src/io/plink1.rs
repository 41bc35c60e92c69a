//! # PLINK1 Fileset I/O
//!
//! Reads a variant-major `.bed`/`.bim`/`.fam` trio as a [`GenotypeSource`]
//! and writes the `.bim`/`.fam` companions of a sample-major export. Also
//! parses the plain ID lists used to select samples and variants.
//!
//! PLINK1 stores `.bim` column 6 (A2) as the reference allele, so it becomes
//! stored allele 0. Cells decode as `00` hom A1, `01` missing, `10` het,
//! `11` hom A2.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::ops::Range;
use std::path::Path;

use memmap2::Mmap;
use tracing::debug;

use crate::data::{ChromTable, GenotypeRecord, RefAllele, Sample, SampleSubset, SampleTable, Sex, Variant, VariantTable};
use crate::error::{ExportError, Result};
use crate::io::sink::{create_output, with_suffix, ExportMeta};
use crate::io::source::{GenotypeSource, SourceInfo};

/// First two bytes of every `.bed`
pub const BED_MAGIC: [u8; 2] = [0x6c, 0x1b];
/// Third byte of a variant-major `.bed`
pub const VARIANT_MAJOR: u8 = 0x01;
/// Third byte of a sample-major `.bed`
pub const SAMPLE_MAJOR: u8 = 0x00;

const fn plink1_decode_table() -> [u8; 256] {
    let map = [2u8, 3, 1, 0];
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

/// Four PLINK1 cells per byte in, four genotype codes per byte out
static FROM_PLINK1: [u8; 256] = plink1_decode_table();

/// Memory-mapped variant-major `.bed`
pub struct BedSource {
    mmap: Mmap,
    raw_sample_ct: usize,
    raw_variant_ct: usize,
    row_bytes: usize,
}

/// Rows of one staged block, copied out of the mapping
#[derive(Clone, Debug, Default)]
pub struct BedBlock {
    range: Range<usize>,
    bytes: Vec<u8>,
}

impl BedSource {
    pub fn open(path: &Path, raw_sample_ct: usize, raw_variant_ct: usize) -> Result<Self> {
        let file = File::open(path).map_err(|e| ExportError::open_failed(path, e))?;
        let display = path.display().to_string();
        let row_bytes = raw_sample_ct.div_ceil(4);
        let expected = 3 + row_bytes * raw_variant_ct;
        let actual = file
            .metadata()
            .map_err(|e| ExportError::open_failed(path, e))?
            .len() as usize;
        if actual < 3 {
            return Err(ExportError::parse(&display, 0, "file is too short for a .bed header"));
        }
        // SAFETY: the mapping is read-only and the file is not modified while mapped
        let mmap = unsafe { Mmap::map(&file).map_err(|e| ExportError::open_failed(path, e))? };
        if mmap[..2] != BED_MAGIC {
            return Err(ExportError::parse(&display, 0, "not a PLINK1 .bed file"));
        }
        if mmap[2] != VARIANT_MAJOR {
            return Err(ExportError::unsupported(format!(
                "{} is sample-major; only variant-major .bed input is supported",
                display
            )));
        }
        if actual != expected {
            return Err(ExportError::parse(
                &display,
                0,
                format!(
                    "size {} does not match {} variants x {} samples ({} bytes expected)",
                    actual, raw_variant_ct, raw_sample_ct, expected
                ),
            ));
        }
        debug!(path = %path.display(), raw_sample_ct, raw_variant_ct, "mapped .bed");
        Ok(Self {
            mmap,
            raw_sample_ct,
            raw_variant_ct,
            row_bytes,
        })
    }

    fn staged<'a>(&self, block: &'a BedBlock, raw_idx: usize) -> Result<&'a [u8]> {
        if !block.range.contains(&raw_idx) {
            return Err(ExportError::read_failed(raw_idx, "variant was not staged"));
        }
        let start = (raw_idx - block.range.start) * self.row_bytes;
        Ok(&block.bytes[start..start + self.row_bytes])
    }
}

impl GenotypeSource for BedSource {
    type Block = BedBlock;

    fn info(&self) -> SourceInfo {
        SourceInfo {
            raw_sample_ct: self.raw_sample_ct,
            raw_variant_ct: self.raw_variant_ct,
            ..SourceInfo::default()
        }
    }

    fn staged_bytes_per_variant(&self) -> usize {
        self.row_bytes
    }

    fn stage_block(&self, raw_range: Range<usize>, block: &mut BedBlock) -> Result<()> {
        if raw_range.end > self.raw_variant_ct {
            return Err(ExportError::read_failed(
                raw_range.end - 1,
                format!(".bed holds only {} variants", self.raw_variant_ct),
            ));
        }
        let start = 3 + raw_range.start * self.row_bytes;
        let end = 3 + raw_range.end * self.row_bytes;
        block.bytes.clear();
        block.bytes.extend_from_slice(&self.mmap[start..end]);
        block.range = raw_range;
        Ok(())
    }

    fn decode(
        &self,
        block: &BedBlock,
        raw_idx: usize,
        samples: &SampleSubset,
        out: &mut GenotypeRecord,
    ) -> Result<()> {
        let row = self.staged(block, raw_idx)?;
        if samples.is_identity(self.raw_sample_ct) {
            out.codes.load_bytes_mapped(row, |b| FROM_PLINK1[b as usize]);
            return Ok(());
        }
        for (i, &raw) in samples.raw_indices.iter().enumerate() {
            let raw = raw as usize;
            let cell = (row[raw / 4] >> (2 * (raw % 4))) & 3;
            out.codes.set(i, FROM_PLINK1[cell as usize] & 3);
        }
        Ok(())
    }
}

fn open_lines(path: &Path) -> Result<impl Iterator<Item = (usize, std::io::Result<String>)>> {
    let file = File::open(path).map_err(|e| ExportError::open_failed(path, e))?;
    Ok(BufReader::new(file).lines().enumerate().map(|(i, l)| (i + 1, l)))
}

/// Read a `.fam`; raw sample indices follow line order
pub fn read_fam(path: &Path) -> Result<Vec<Sample>> {
    let display = path.display().to_string();
    let mut samples = Vec::new();
    for (line_no, line) in open_lines(path)? {
        let line = line.map_err(|e| ExportError::parse(&display, line_no, e.to_string()))?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < 6 {
            return Err(ExportError::parse(
                &display,
                line_no,
                format!("expected 6 columns, found {}", fields.len()),
            ));
        }
        let mut sample = Sample::new(samples.len(), fields[0], fields[1], Sex::from_code(fields[4]));
        sample.father = fields[2].to_string();
        sample.mother = fields[3].to_string();
        sample.phenotype = fields[5].to_string();
        samples.push(sample);
    }
    Ok(samples)
}

/// Read a `.bim`, interning chromosome names into `chroms`
pub fn read_bim(path: &Path, chroms: &mut ChromTable) -> Result<Vec<Variant>> {
    let display = path.display().to_string();
    let mut variants = Vec::new();
    for (line_no, line) in open_lines(path)? {
        let line = line.map_err(|e| ExportError::parse(&display, line_no, e.to_string()))?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < 6 {
            return Err(ExportError::parse(
                &display,
                line_no,
                format!("expected 6 columns, found {}", fields.len()),
            ));
        }
        let pos: u32 = fields[3].parse().map_err(|_| {
            ExportError::parse(&display, line_no, format!("invalid position '{}'", fields[3]))
        })?;
        let chrom = chroms.intern(fields[0]);
        variants.push(Variant::new(variants.len(), chrom, pos, fields[1], fields[5], fields[4]));
    }
    Ok(variants)
}

/// A variant-major PLINK1 fileset and the current selection of it
pub struct Plink1Fileset {
    pub source: BedSource,
    pub samples: Vec<Sample>,
    pub variants: Vec<Variant>,
    pub chroms: ChromTable,
}

impl Plink1Fileset {
    /// Open `prefix.bed`, `prefix.bim` and `prefix.fam`; everything starts selected
    pub fn open(prefix: &Path) -> Result<Self> {
        let samples = read_fam(&with_suffix(prefix, "fam"))?;
        let mut chroms = ChromTable::new();
        let variants = read_bim(&with_suffix(prefix, "bim"), &mut chroms)?;
        let source = BedSource::open(&with_suffix(prefix, "bed"), samples.len(), variants.len())?;
        Ok(Self {
            source,
            samples,
            variants,
            chroms,
        })
    }

    pub fn keep_samples(&mut self, keep: &SampleIdList) {
        self.samples.retain(|s| keep.contains(s));
    }

    pub fn extract_variants(&mut self, ids: &HashSet<String>) {
        self.variants.retain(|v| ids.contains(&v.id));
    }

    /// Mark listed variants as having stored allele 1 (A1) as REF.
    ///
    /// Returns how many selected variants were marked.
    pub fn set_ref_second(&mut self, ids: &HashSet<String>) -> usize {
        let mut marked = 0;
        for v in self.variants.iter_mut().filter(|v| ids.contains(&v.id)) {
            v.ref_allele = RefAllele::Second;
            marked += 1;
        }
        marked
    }

    /// Split into the source and the selected tables
    pub fn into_tables(self) -> (BedSource, SampleTable, VariantTable, ChromTable) {
        (
            self.source,
            SampleTable::new(self.samples),
            VariantTable::new(self.variants),
            self.chroms,
        )
    }
}

/// Write the `.fam` of an export, one line per exported sample
pub fn write_fam(path: &Path, meta: &ExportMeta<'_>) -> Result<()> {
    let mut out = create_output(path)?;
    for s in meta.samples.iter() {
        writeln!(
            out,
            "{} {} {} {} {} {}",
            s.fid,
            s.iid,
            s.father,
            s.mother,
            s.sex.code(),
            s.phenotype
        )?;
    }
    out.flush()?;
    Ok(())
}

/// Write the `.bim` of an export: A1 (column 5) is the allele printed first
pub fn write_bim(path: &Path, meta: &ExportMeta<'_>) -> Result<()> {
    let mut out = create_output(path)?;
    for v in meta.variants.iter() {
        let (a1, a2) = v.ordered_alleles(meta.alt_first);
        writeln!(out, "{}\t{}\t0\t{}\t{}\t{}", meta.chrom_name(v), v.id, v.pos, a1, a2)?;
    }
    out.flush()?;
    Ok(())
}

/// Samples named in a keep list: `IID` lines or `FID IID` lines
#[derive(Clone, Debug, Default)]
pub struct SampleIdList {
    pairs: HashSet<(String, String)>,
    iids: HashSet<String>,
}

impl SampleIdList {
    pub fn read(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let mut list = Self::default();
        for (line_no, line) in open_lines(path)? {
            let line = line.map_err(|e| ExportError::parse(&display, line_no, e.to_string()))?;
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (None, _) => {}
                (Some(id), None) if id.starts_with('#') => {}
                (Some(iid), None) => {
                    list.iids.insert(iid.to_string());
                }
                (Some(fid), Some(iid)) => {
                    if fid.starts_with('#') {
                        continue;
                    }
                    list.pairs.insert((fid.to_string(), iid.to_string()));
                }
            }
        }
        Ok(list)
    }

    pub fn contains(&self, sample: &Sample) -> bool {
        self.iids.contains(&sample.iid)
            || self.pairs.contains(&(sample.fid.clone(), sample.iid.clone()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len() + self.iids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// First token of every non-empty line (variant IDs)
pub fn read_id_set(path: &Path) -> Result<HashSet<String>> {
    let display = path.display().to_string();
    let mut ids = HashSet::new();
    for (line_no, line) in open_lines(path)? {
        let line = line.map_err(|e| ExportError::parse(&display, line_no, e.to_string()))?;
        if let Some(id) = line.split_whitespace().next() {
            ids.insert(id.to_string());
        }
    }
    Ok(ids)
}
