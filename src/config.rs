//! # Configuration
//!
//! Command-line arguments of the `gtexport` binary and their translation into
//! an [`ExportFormat`] plus [`ExportOptions`]. The library never sees clap
//! types besides the two value enums it shares with the CLI.

use std::path::PathBuf;

use clap::Parser;

use crate::error::{ExportError, Result};
use crate::export::{BgenCompression, VcfDosageMode};
use crate::io::sink::with_suffix;
use crate::pipelines::{ExportFormat, ExportOptions, DEFAULT_READ_BLOCK_SIZE};
use crate::utils::threading::default_thread_count;
use crate::utils::MAX_EXPORT_THREADS;

/// `--export` values
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportKind {
    /// VCF v4.3 (`.vcf`, or `.vcf.gz` with --bgz)
    Vcf,
    /// BGEN v1.1 + `.sample`
    #[value(name = "bgen-1.1")]
    Bgen11,
    /// BGEN v1.2 + `.sample`
    #[value(name = "bgen-1.2")]
    Bgen12,
    /// BGEN v1.3 + `.sample`
    #[value(name = "bgen-1.3")]
    Bgen13,
    /// Oxford `.gen` + `.sample`
    Oxford,
    /// `.haps` + `.sample`
    Haps,
    /// `.hap` + `.legend` + `.sample`
    Hapslegend,
    /// Sample-major `.bed` + `.bim` + `.fam`
    IndMajorBed,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "gtexport")]
#[command(version = "0.1.0")]
#[command(about = "Export PLINK1 genotypes to VCF, BGEN, Oxford or sample-major BED", long_about = None)]
pub struct Config {
    /// Input PLINK1 fileset prefix (.bed/.bim/.fam)
    #[arg(long, value_name = "PREFIX")]
    pub bfile: PathBuf,

    /// Output format
    #[arg(long, value_enum)]
    pub export: ExportKind,

    /// Output prefix
    #[arg(long, value_name = "PREFIX", default_value = "gtexport")]
    pub out: PathBuf,

    /// Worker threads (0 = all cores)
    #[arg(long, default_value = "0")]
    pub threads: usize,

    /// Memory budget for block and row buffers, in MiB
    #[arg(long, value_name = "MIB")]
    pub memory: Option<usize>,

    /// Raw variants per read block
    #[arg(long, default_value_t = DEFAULT_READ_BLOCK_SIZE)]
    pub read_block_size: usize,

    /// BGEN v1.2/1.3 probability precision in bits (1-16)
    #[arg(long, default_value = "16")]
    pub bgen_bits: u8,

    /// BGEN v1.3 genotype block compression
    #[arg(long, value_enum, default_value = "zlib")]
    pub bgen_compression: BgenCompression,

    /// Print REF after ALT in BGEN, Oxford and haps output
    #[arg(long)]
    pub ref_last: bool,

    /// VCF dosage fields
    #[arg(long, value_enum, default_value = "none")]
    pub vcf_dosage: VcfDosageMode,

    /// Add GP to VCF output
    #[arg(long)]
    pub vcf_gp: bool,

    /// BGZF-compress VCF output
    #[arg(long)]
    pub bgz: bool,

    /// Keep only samples listed in FILE (IID or FID IID per line)
    #[arg(long, value_name = "FILE")]
    pub keep: Option<PathBuf>,

    /// Keep only variants whose ID is listed in FILE
    #[arg(long, value_name = "FILE")]
    pub extract: Option<PathBuf>,

    /// Variants listed in FILE have A1 (not A2) as reference
    #[arg(long, value_name = "FILE")]
    pub ref_second: Option<PathBuf>,

    /// VCF whose meta lines are copied into the output header
    #[arg(long, value_name = "FILE")]
    pub vcf_header: Option<PathBuf>,

    /// Log span timings
    #[arg(long)]
    pub profile: bool,

    /// Seconds between progress reports (0 disables)
    #[arg(long, default_value = "10")]
    pub heartbeat: u64,
}

impl Config {
    /// Parse command line arguments and validate them
    pub fn parse_and_validate() -> Result<Self> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.threads > MAX_EXPORT_THREADS {
            return Err(ExportError::config(format!(
                "--threads must be at most {} (got {})",
                MAX_EXPORT_THREADS, self.threads
            )));
        }
        if self.read_block_size == 0 {
            return Err(ExportError::config("--read-block-size must be positive"));
        }
        if !(1..=16).contains(&self.bgen_bits) {
            return Err(ExportError::config(format!(
                "--bgen-bits must be between 1 and 16 (got {})",
                self.bgen_bits
            )));
        }
        if self.memory == Some(0) {
            return Err(ExportError::config("--memory must be positive"));
        }
        let bgen = matches!(self.export, ExportKind::Bgen12 | ExportKind::Bgen13);
        if self.bgen_compression == BgenCompression::Zstd && self.export != ExportKind::Bgen13 {
            return Err(ExportError::config("--bgen-compression zstd requires --export bgen-1.3"));
        }
        if self.bgen_bits != 16 && !bgen {
            return Err(ExportError::config("--bgen-bits only applies to bgen-1.2 and bgen-1.3"));
        }
        let vcf = self.export == ExportKind::Vcf;
        if !vcf && (self.bgz || self.vcf_gp || self.vcf_dosage != VcfDosageMode::None || self.vcf_header.is_some()) {
            return Err(ExportError::config("--bgz, --vcf-gp, --vcf-dosage and --vcf-header require --export vcf"));
        }
        if !with_suffix(&self.bfile, "bed").exists() {
            return Err(ExportError::config(format!(
                "input fileset {} not found",
                self.bfile.display()
            )));
        }
        Ok(())
    }

    pub fn nthreads(&self) -> usize {
        if self.threads == 0 {
            default_thread_count()
        } else {
            self.threads
        }
    }

    pub fn format(&self) -> ExportFormat {
        let ref_first = !self.ref_last;
        match self.export {
            ExportKind::Vcf => ExportFormat::Vcf {
                dosage: self.vcf_dosage,
                gp: self.vcf_gp,
                bgz: self.bgz,
            },
            ExportKind::Bgen11 => ExportFormat::Bgen11 { ref_first },
            ExportKind::Bgen12 => ExportFormat::Bgen12 {
                ref_first,
                bits: self.bgen_bits,
            },
            ExportKind::Bgen13 => ExportFormat::Bgen13 {
                ref_first,
                bits: self.bgen_bits,
                compression: self.bgen_compression,
            },
            ExportKind::Oxford => ExportFormat::Oxford { ref_first },
            ExportKind::Haps => ExportFormat::Haps {
                ref_first,
                legend: false,
            },
            ExportKind::Hapslegend => ExportFormat::Haps {
                ref_first,
                legend: true,
            },
            ExportKind::IndMajorBed => ExportFormat::IndMajorBed,
        }
    }

    /// Library options, minus the VCF pass-through lines and telemetry
    pub fn options(&self) -> ExportOptions {
        let mut options = ExportOptions::default()
            .with_threads(self.nthreads())
            .with_read_block_size(self.read_block_size);
        if let Some(mib) = self.memory {
            options = options.with_memory_limit(mib.saturating_mul(1 << 20));
        }
        options
    }
}
