//! # Output Writers
//!
//! The output coordinator owns exactly one [`RecordWriter`] per export. It
//! writes the header before the first block, then interleaves variant
//! metadata with encoded payloads strictly in export order, then writes the
//! companion files once missingness is known.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::data::{ChromTable, SampleTable, Variant, VariantTable};
use crate::error::{ExportError, Result};
use crate::model::MissingCounts;

/// Everything a writer may print besides payloads
#[derive(Clone, Copy)]
pub struct ExportMeta<'a> {
    pub samples: &'a SampleTable,
    pub variants: &'a VariantTable,
    pub chroms: &'a ChromTable,
    /// Allele printed first is ALT
    pub alt_first: bool,
}

impl ExportMeta<'_> {
    pub fn chrom_name(&self, variant: &Variant) -> &str {
        self.chroms.name(variant.chrom)
    }
}

/// Sink for encoded variants of one output format
pub trait RecordWriter: Send {
    fn write_header(&mut self, meta: &ExportMeta<'_>) -> Result<()>;

    /// Write one variant: its metadata followed by `payload`
    fn write_record(&mut self, meta: &ExportMeta<'_>, variant: &Variant, payload: &[u8]) -> Result<()>;

    /// Flush the main file and write companions. Returns every path written.
    fn finish(&mut self, meta: &ExportMeta<'_>, missing: &MissingCounts) -> Result<Vec<PathBuf>>;
}

/// Create (truncate) an output file behind a buffer
pub fn create_output(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| ExportError::open_failed(path, e))?;
    Ok(BufWriter::with_capacity(1 << 20, file))
}

/// `prefix` + `.ext`, keeping dots already in the prefix
pub fn with_suffix(prefix: &Path, ext: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Length-checked `u16` for format length fields
pub(crate) fn checked_u16(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| ExportError::format_limit(format!("{} is {} bytes, at most 65535 allowed", what, len)))
}

/// Length-checked `u32` for format count and length fields
pub(crate) fn checked_u32(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| ExportError::format_limit(format!("{} is {}, at most {} allowed", what, len, u32::MAX)))
}
