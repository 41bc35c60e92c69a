//! Output bytes must not depend on the thread count or the block size.

mod common;

use std::path::Path;

use gtexport::io::MemoryVariant;
use gtexport::utils::telemetry::TelemetryBlackboard;
use gtexport::{export, BgenCompression, ExportFormat, ExportOptions, VcfDosageMode};

use common::{prefix, random_codes, random_dosage_variants, Fixture, FixtureBuilder};

const VARIANTS: usize = 157;
// not a multiple of 4, so every packed row ends in padding
const SAMPLES: usize = 37;

fn dosage_fixture() -> Fixture {
    FixtureBuilder::from_variants(random_dosage_variants(11, VARIANTS, SAMPLES)).build()
}

fn phased_fixture() -> Fixture {
    let rows = random_codes(23, VARIANTS, SAMPLES)
        .into_iter()
        .enumerate()
        .map(|(v, codes)| {
            let codes = codes.into_iter().map(|c| if c == 3 { 0 } else { c }).collect();
            MemoryVariant::from_codes(codes).with_phase(|s| (s + v) % 3 == 0)
        })
        .collect();
    FixtureBuilder::from_variants(rows).build()
}

/// Every file written for one run, in summary order
fn run(fx: &Fixture, format: &ExportFormat, dir: &Path, threads: usize, read_block_size: usize) -> Vec<Vec<u8>> {
    let name = format!("{}-t{}-b{}", format.name(), threads, read_block_size);
    let options = ExportOptions::default()
        .with_threads(threads)
        .with_read_block_size(read_block_size);
    let summary = export(
        &fx.source,
        &fx.samples,
        &fx.variants,
        &fx.chroms,
        format,
        &prefix(dir, &name),
        &options,
    )
    .unwrap_or_else(|e| panic!("{} with {} threads: {}", format.name(), threads, e));
    summary
        .files
        .iter()
        .map(|p| std::fs::read(p).expect("read output"))
        .collect()
}

fn assert_invariant(fx: &Fixture, format: ExportFormat) {
    let dir = tempfile::tempdir().expect("tempdir");
    let reference = run(fx, &format, dir.path(), 1, 64);
    assert!(!reference.is_empty());
    for (threads, rbs) in [(2, 64), (8, 64), (8, 5), (3, 1)] {
        let other = run(fx, &format, dir.path(), threads, rbs);
        assert_eq!(reference.len(), other.len());
        for (i, (a, b)) in reference.iter().zip(&other).enumerate() {
            assert!(
                a == b,
                "{}: file {} differs with {} threads, block size {}",
                format.name(),
                i,
                threads,
                rbs
            );
        }
    }
}

#[test]
fn test_vcf_thread_invariance() {
    let fx = dosage_fixture();
    assert_invariant(
        &fx,
        ExportFormat::Vcf {
            dosage: VcfDosageMode::HdsForce,
            gp: true,
            bgz: false,
        },
    );
    assert_invariant(
        &fx,
        ExportFormat::Vcf {
            dosage: VcfDosageMode::Ds,
            gp: false,
            bgz: true,
        },
    );
}

#[test]
fn test_bgen_thread_invariance() {
    let fx = dosage_fixture();
    assert_invariant(&fx, ExportFormat::Bgen11 { ref_first: true });
    assert_invariant(
        &fx,
        ExportFormat::Bgen12 {
            ref_first: false,
            bits: 16,
        },
    );
    assert_invariant(
        &fx,
        ExportFormat::Bgen13 {
            ref_first: true,
            bits: 8,
            compression: BgenCompression::Zstd,
        },
    );
}

#[test]
fn test_oxford_thread_invariance() {
    assert_invariant(&dosage_fixture(), ExportFormat::Oxford { ref_first: true });
}

#[test]
fn test_haps_thread_invariance() {
    let fx = phased_fixture();
    assert_invariant(
        &fx,
        ExportFormat::Haps {
            ref_first: true,
            legend: false,
        },
    );
    assert_invariant(
        &fx,
        ExportFormat::Haps {
            ref_first: false,
            legend: true,
        },
    );
}

#[test]
fn test_bed_thread_invariance() {
    let fx = FixtureBuilder::from_codes(&random_codes(5, VARIANTS, SAMPLES)).build();
    assert_invariant(&fx, ExportFormat::IndMajorBed);
}

#[test]
fn test_multi_pass_transpose_matches_single_pass() {
    let codes = random_codes(31, 203, 61);
    let fx = FixtureBuilder::from_codes(&codes).build();
    let dir = tempfile::tempdir().expect("tempdir");

    let single = export(
        &fx.source,
        &fx.samples,
        &fx.variants,
        &fx.chroms,
        &ExportFormat::IndMajorBed,
        &prefix(dir.path(), "single"),
        &ExportOptions::default().with_threads(4),
    )
    .expect("single pass");
    assert_eq!(single.passes, 1);

    // 4 KiB: 16-variant blocks, leaving room for 50 of the 51-byte rows
    let telemetry = TelemetryBlackboard::new();
    let mut options = ExportOptions::default().with_threads(4).with_memory_limit(4 << 10);
    options.telemetry = Some(telemetry.clone());
    let multi = export(
        &fx.source,
        &fx.samples,
        &fx.variants,
        &fx.chroms,
        &ExportFormat::IndMajorBed,
        &prefix(dir.path(), "multi"),
        &options,
    )
    .expect("multi pass");
    assert_eq!(multi.passes, 2);

    // every pass re-reads every block
    assert_eq!(telemetry.total_variants(), 2 * 203);
    assert_eq!(telemetry.variants_encoded(), telemetry.total_variants());
    assert_eq!(telemetry.total_blocks(), 2 * multi.blocks as u64);
    assert_eq!(telemetry.blocks_flushed(), telemetry.total_blocks());

    assert_eq!(
        std::fs::read(&single.files[0]).unwrap(),
        std::fs::read(&multi.files[0]).unwrap()
    );
    assert_eq!(single.missing, multi.missing);
    assert_eq!(common::read_sample_major_bed(&multi.files[0], 61, 203), codes);
}

#[test]
fn test_transpose_memory_too_small() {
    let fx = FixtureBuilder::from_codes(&random_codes(1, 40, 9)).build();
    let dir = tempfile::tempdir().expect("tempdir");
    let err = export(
        &fx.source,
        &fx.samples,
        &fx.variants,
        &fx.chroms,
        &ExportFormat::IndMajorBed,
        &prefix(dir.path(), "tiny"),
        &ExportOptions::default().with_memory_limit(8),
    )
    .unwrap_err();
    assert!(matches!(err, gtexport::ExportError::OutOfMemory { .. }), "{}", err);
}
