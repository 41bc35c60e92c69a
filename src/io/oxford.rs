//! # Oxford Text Outputs
//!
//! `.gen`, `.haps`, `.hap` + `.legend`, and the `.sample` companion shared by
//! those formats and BGEN.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::data::{Sex, Variant};
use crate::error::Result;
use crate::io::sink::{create_output, with_suffix, ExportMeta, RecordWriter};
use crate::model::MissingCounts;

/// Write a `.sample` file with per-sample missing rates
pub fn write_sample_file(path: &Path, meta: &ExportMeta<'_>, missing: &MissingCounts) -> Result<()> {
    let mut out = create_output(path)?;
    out.write_all(b"ID_1 ID_2 missing sex\n0 0 0 D\n")?;
    let mut rate_buf = ryu::Buffer::new();
    for (i, sample) in meta.samples.iter().enumerate() {
        let rate = missing.missing_rate(i, sample.sex == Sex::Male);
        let sex = match sample.sex {
            Sex::Male => "1",
            Sex::Female => "2",
            Sex::Unknown => "NA",
        };
        writeln!(out, "{} {} {} {}", sample.fid, sample.iid, rate_buf.format(rate), sex)?;
    }
    out.flush()?;
    Ok(())
}

/// `.gen` lines: `chr id rsid pos A B` then probability triples
pub struct GenRecordWriter {
    out: BufWriter<File>,
    prefix: PathBuf,
    line: Vec<u8>,
}

impl GenRecordWriter {
    pub fn create(prefix: &Path) -> Result<Self> {
        Ok(Self {
            out: create_output(&with_suffix(prefix, "gen"))?,
            prefix: prefix.to_path_buf(),
            line: Vec::new(),
        })
    }
}

impl RecordWriter for GenRecordWriter {
    fn write_header(&mut self, _meta: &ExportMeta<'_>) -> Result<()> {
        Ok(())
    }

    fn write_record(&mut self, meta: &ExportMeta<'_>, variant: &Variant, payload: &[u8]) -> Result<()> {
        let (a, b) = variant.ordered_alleles(meta.alt_first);
        self.line.clear();
        write!(
            self.line,
            "{} {} {} {} {} {}",
            meta.chrom_name(variant),
            variant.id,
            variant.id,
            variant.pos,
            a,
            b
        )?;
        self.line.extend_from_slice(payload);
        self.line.push(b'\n');
        self.out.write_all(&self.line)?;
        Ok(())
    }

    fn finish(&mut self, meta: &ExportMeta<'_>, missing: &MissingCounts) -> Result<Vec<PathBuf>> {
        self.out.flush()?;
        let sample = with_suffix(&self.prefix, "sample");
        write_sample_file(&sample, meta, missing)?;
        Ok(vec![with_suffix(&self.prefix, "gen"), sample])
    }
}

/// `.haps` lines, or `.hap` lines plus a `.legend` row per variant
pub struct HapsRecordWriter {
    out: BufWriter<File>,
    legend: Option<BufWriter<File>>,
    prefix: PathBuf,
    line: Vec<u8>,
}

impl HapsRecordWriter {
    pub fn create(prefix: &Path, legend: bool) -> Result<Self> {
        let (main_ext, legend) = if legend {
            ("hap", Some(create_output(&with_suffix(prefix, "legend"))?))
        } else {
            ("haps", None)
        };
        Ok(Self {
            out: create_output(&with_suffix(prefix, main_ext))?,
            legend,
            prefix: prefix.to_path_buf(),
            line: Vec::new(),
        })
    }
}

impl RecordWriter for HapsRecordWriter {
    fn write_header(&mut self, _meta: &ExportMeta<'_>) -> Result<()> {
        if let Some(legend) = self.legend.as_mut() {
            legend.write_all(b"id position a0 a1\n")?;
        }
        Ok(())
    }

    fn write_record(&mut self, meta: &ExportMeta<'_>, variant: &Variant, payload: &[u8]) -> Result<()> {
        let (a, b) = variant.ordered_alleles(meta.alt_first);
        self.line.clear();
        match self.legend.as_mut() {
            Some(legend) => {
                writeln!(legend, "{} {} {} {}", variant.id, variant.pos, a, b)?;
                // payload starts with the separator of the first sample
                self.line.extend_from_slice(payload.get(1..).unwrap_or_default());
            }
            None => {
                write!(self.line, "{} {} {} {} {}", meta.chrom_name(variant), variant.id, variant.pos, a, b)?;
                self.line.extend_from_slice(payload);
            }
        }
        self.line.push(b'\n');
        self.out.write_all(&self.line)?;
        Ok(())
    }

    fn finish(&mut self, meta: &ExportMeta<'_>, missing: &MissingCounts) -> Result<Vec<PathBuf>> {
        self.out.flush()?;
        let mut paths = Vec::with_capacity(3);
        match self.legend.as_mut() {
            Some(legend) => {
                legend.flush()?;
                paths.push(with_suffix(&self.prefix, "hap"));
                paths.push(with_suffix(&self.prefix, "legend"));
            }
            None => paths.push(with_suffix(&self.prefix, "haps")),
        }
        let sample = with_suffix(&self.prefix, "sample");
        write_sample_file(&sample, meta, missing)?;
        paths.push(sample);
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ChromTable, Sample, SampleTable, VariantTable};

    struct Fixture {
        samples: SampleTable,
        variants: VariantTable,
        chroms: ChromTable,
    }

    impl Fixture {
        fn new() -> Self {
            let mut chroms = ChromTable::new();
            let c = chroms.intern("2");
            Self {
                samples: SampleTable::new(vec![
                    Sample::new(0, "F1", "A", Sex::Male),
                    Sample::new(1, "F2", "B", Sex::Unknown),
                ]),
                variants: VariantTable::new(vec![Variant::new(0, c, 55, "rs9", "A", "T")]),
                chroms,
            }
        }

        fn meta(&self, alt_first: bool) -> ExportMeta<'_> {
            ExportMeta {
                samples: &self.samples,
                variants: &self.variants,
                chroms: &self.chroms,
                alt_first,
            }
        }
    }

    #[test]
    fn test_sample_file() {
        let fx = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.sample");
        let mut missing = MissingCounts::new(2);
        missing.variant_ct = 4;
        missing.counts = vec![1, 0];
        write_sample_file(&path, &fx.meta(false), &missing).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "ID_1 ID_2 missing sex\n0 0 0 D\nF1 A 0.25 1\nF2 B 0.0 NA\n");
    }

    #[test]
    fn test_gen_lines_and_companions() {
        let fx = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("out");
        let meta = fx.meta(true);
        let mut w = GenRecordWriter::create(&prefix).unwrap();
        w.write_header(&meta).unwrap();
        w.write_record(&meta, fx.variants.get(0), b" 1 0 0 0 1 0").unwrap();
        let paths = w.finish(&meta, &MissingCounts::new(2)).unwrap();
        assert_eq!(paths.len(), 2);
        let text = std::fs::read_to_string(&paths[0]).unwrap();
        assert_eq!(text, "2 rs9 rs9 55 T A 1 0 0 0 1 0\n");
        assert!(paths[1].exists());
    }

    #[test]
    fn test_hap_legend_pair() {
        let fx = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("out");
        let meta = fx.meta(false);
        let mut w = HapsRecordWriter::create(&prefix, true).unwrap();
        w.write_header(&meta).unwrap();
        w.write_record(&meta, fx.variants.get(0), b" 0 - 1 0").unwrap();
        let paths = w.finish(&meta, &MissingCounts::new(2)).unwrap();
        assert_eq!(std::fs::read_to_string(&paths[0]).unwrap(), "0 - 1 0\n");
        assert_eq!(
            std::fs::read_to_string(&paths[1]).unwrap(),
            "id position a0 a1\nrs9 55 A T\n"
        );
        assert!(paths[2].ends_with("out.sample"));
    }

    #[test]
    fn test_haps_line() {
        let fx = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("out");
        let meta = fx.meta(false);
        let mut w = HapsRecordWriter::create(&prefix, false).unwrap();
        w.write_header(&meta).unwrap();
        w.write_record(&meta, fx.variants.get(0), b" 0 - 1 0").unwrap();
        let paths = w.finish(&meta, &MissingCounts::new(2)).unwrap();
        assert_eq!(std::fs::read_to_string(&paths[0]).unwrap(), "2 rs9 55 A T 0 - 1 0\n");
    }
}
