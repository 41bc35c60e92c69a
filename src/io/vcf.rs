//! # VCF Output
//!
//! Writes plain `.vcf` or BGZF-compressed `.vcf.gz` (picked by extension)
//! and the header ahead of the first record. Header lines from an existing
//! VCF can be passed through; they are validated with `noodles-vcf` first so
//! a malformed template fails before any output is written.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use noodles_bgzf as bgzf;
use tracing::info_span;

use crate::data::Variant;
use crate::error::{ExportError, Result};
use crate::export::VcfFields;
use crate::io::sink::{create_output, ExportMeta, RecordWriter};
use crate::model::MissingCounts;

const FORMAT_LINES: [(&str, &str); 4] = [
    ("GT", "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">"),
    ("DS", "##FORMAT=<ID=DS,Number=A,Type=Float,Description=\"Estimated alternate allele dosage\">"),
    ("HDS", "##FORMAT=<ID=HDS,Number=.,Type=Float,Description=\"Estimated haploid alternate allele dosage\">"),
    ("GP", "##FORMAT=<ID=GP,Number=G,Type=Float,Description=\"Estimated posterior probabilities for genotypes\">"),
];

/// Read the `##` meta lines of an existing (optionally BGZF) VCF
pub fn read_passthrough_header(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|e| ExportError::open_failed(path, e))?;
    let reader: Box<dyn Read> = if is_bgzf_path(path) {
        Box::new(bgzf::io::Reader::new(file))
    } else {
        Box::new(file)
    };
    let display = path.display().to_string();

    let mut text = String::new();
    let mut meta = Vec::new();
    for (i, line) in BufReader::new(reader).lines().enumerate() {
        let line = line.map_err(|e| ExportError::parse(&display, i + 1, e.to_string()))?;
        text.push_str(&line);
        text.push('\n');
        if line.starts_with("##") {
            meta.push(line);
        } else if line.starts_with("#CHROM") {
            break;
        } else {
            return Err(ExportError::parse(&display, i + 1, "header ended without a #CHROM line"));
        }
    }
    text.parse::<noodles_vcf::Header>()
        .map_err(|e| ExportError::parse(&display, 0, e.to_string()))?;
    Ok(meta)
}

fn is_bgzf_path(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "gz" || e == "bgz")
}

enum VcfSink {
    Plain(BufWriter<File>),
    Bgzf(BufWriter<bgzf::io::Writer<File>>),
}

impl VcfSink {
    fn finish(&mut self) -> std::io::Result<()> {
        match self {
            VcfSink::Plain(w) => w.flush(),
            VcfSink::Bgzf(w) => {
                w.flush()?;
                w.get_mut().try_finish()
            }
        }
    }
}

impl Write for VcfSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            VcfSink::Plain(w) => w.write(buf),
            VcfSink::Bgzf(w) => w.write(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            VcfSink::Plain(w) => w.write_all(buf),
            VcfSink::Bgzf(w) => w.write_all(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            VcfSink::Plain(w) => w.flush(),
            VcfSink::Bgzf(w) => w.flush(),
        }
    }
}

/// VCF record writer
pub struct VcfRecordWriter {
    sink: VcfSink,
    path: PathBuf,
    fields: VcfFields,
    format_key: String,
    passthrough: Vec<String>,
    line: Vec<u8>,
}

impl VcfRecordWriter {
    /// Create the output; `.gz`/`.bgz` paths are BGZF-compressed
    pub fn create(path: &Path, fields: VcfFields) -> Result<Self> {
        let sink = if is_bgzf_path(path) {
            let file = File::create(path).map_err(|e| ExportError::open_failed(path, e))?;
            VcfSink::Bgzf(BufWriter::with_capacity(1 << 20, bgzf::io::Writer::new(file)))
        } else {
            VcfSink::Plain(create_output(path)?)
        };
        Ok(Self {
            sink,
            path: path.to_path_buf(),
            fields,
            format_key: fields.format_key(),
            passthrough: Vec::new(),
            line: Vec::new(),
        })
    }

    /// Meta lines copied into the header after `##source`
    pub fn with_passthrough(mut self, lines: Vec<String>) -> Self {
        self.passthrough = lines;
        self
    }

    fn header_text(&self, meta: &ExportMeta<'_>) -> String {
        let own_format = |line: &str| {
            FORMAT_LINES
                .iter()
                .any(|(id, _)| line.starts_with(&format!("##FORMAT=<ID={},", id)))
        };
        let mut text = String::new();
        text.push_str("##fileformat=VCFv4.3\n");
        text.push_str("##source=gtexport\n");
        let mut passed_contigs = Vec::new();
        for line in &self.passthrough {
            if line.starts_with("##fileformat=") || line.starts_with("##source=") || own_format(line) {
                continue;
            }
            if let Some(rest) = line.strip_prefix("##contig=<ID=") {
                let id = rest.split([',', '>']).next().unwrap_or("");
                passed_contigs.push(id.to_string());
            }
            text.push_str(line);
            text.push('\n');
        }
        for idx in meta.variants.chrom_order() {
            let info = meta.chroms.get(idx);
            if passed_contigs.iter().any(|c| c == &info.name) {
                continue;
            }
            match info.length {
                Some(len) => text.push_str(&format!("##contig=<ID={},length={}>\n", info.name, len)),
                None => text.push_str(&format!("##contig=<ID={}>\n", info.name)),
            }
        }
        let wanted = [true, self.fields.ds, self.fields.hds, self.fields.gp];
        for ((_, line), on) in FORMAT_LINES.iter().zip(wanted) {
            if on {
                text.push_str(line);
                text.push('\n');
            }
        }
        text.push_str("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT");
        for sample in meta.samples.iter() {
            text.push('\t');
            text.push_str(&sample.output_id());
        }
        text.push('\n');
        text
    }
}

impl RecordWriter for VcfRecordWriter {
    fn write_header(&mut self, meta: &ExportMeta<'_>) -> Result<()> {
        info_span!("vcf_write_header").in_scope(|| {
            let text = self.header_text(meta);
            self.sink.write_all(text.as_bytes())?;
            Ok(())
        })
    }

    fn write_record(&mut self, meta: &ExportMeta<'_>, variant: &Variant, payload: &[u8]) -> Result<()> {
        let id = if variant.id.is_empty() { "." } else { variant.id.as_str() };
        self.line.clear();
        write!(
            self.line,
            "{}\t{}\t{}\t{}\t{}\t.\t.\t.\t{}",
            meta.chrom_name(variant),
            variant.pos,
            id,
            variant.ref_str(),
            variant.alt_list(),
            self.format_key
        )?;
        self.line.extend_from_slice(payload);
        self.line.push(b'\n');
        self.sink.write_all(&self.line)?;
        Ok(())
    }

    fn finish(&mut self, _meta: &ExportMeta<'_>, _missing: &MissingCounts) -> Result<Vec<PathBuf>> {
        self.sink.finish()?;
        Ok(vec![self.path.clone()])
    }
}
