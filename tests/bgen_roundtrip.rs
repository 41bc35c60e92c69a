mod common;

use std::path::Path;

use gtexport::io::MemoryVariant;
use gtexport::{export, BgenCompression, ExportError, ExportFormat, ExportOptions, ExportSummary, Sex};

use common::{parse_layout2, prefix, random_codes, read_bgen, unphased_call, Fixture, FixtureBuilder};

fn run(fx: &Fixture, format: ExportFormat, dir: &Path, name: &str) -> ExportSummary {
    export(
        &fx.source,
        &fx.samples,
        &fx.variants,
        &fx.chroms,
        &format,
        &prefix(dir, name),
        &ExportOptions::default().with_threads(3).with_read_block_size(7),
    )
    .expect("export")
}

/// Exact dosages on a few calls; they agree with the hardcalls
fn with_exact_dosages(codes: Vec<Vec<u8>>) -> Vec<MemoryVariant> {
    codes
        .into_iter()
        .enumerate()
        .map(|(v, codes)| {
            let dosages = codes
                .iter()
                .enumerate()
                .map(|(s, &c)| match c {
                    0..=2 if (s + v) % 4 == 0 => Some(c as u16 * 16384),
                    _ => None,
                })
                .collect();
            MemoryVariant::from_codes(codes).with_dosages(dosages)
        })
        .collect()
}

#[test]
fn test_layout2_hardcalls_at_each_precision() {
    let codes = random_codes(7, 41, 23);
    let fx = FixtureBuilder::from_variants(with_exact_dosages(codes.clone())).build();
    let dir = tempfile::tempdir().expect("tempdir");

    for (bits, compression) in [
        (1, BgenCompression::Zlib),
        (8, BgenCompression::Zstd),
        (16, BgenCompression::None),
    ] {
        let format = ExportFormat::Bgen13 {
            ref_first: true,
            bits,
            compression,
        };
        let summary = run(&fx, format, dir.path(), &format!("b{}", bits));
        let bgen = read_bgen(&summary.files[0]);
        assert_eq!(bgen.variant_ct, 41);
        assert_eq!(bgen.sample_ct, 23);
        assert_eq!(bgen.flags, compression.flag() | (2 << 2) | (1 << 31));
        assert_eq!(bgen.sample_ids[0], "FAM_S1");

        for (v, (row, variant)) in codes.iter().zip(&bgen.variants).enumerate() {
            assert_eq!(variant.id, format!("rs{}", v + 1));
            assert_eq!(variant.chrom, "1");
            assert_eq!(variant.pos, 1000 + 10 * v as u32);
            assert_eq!(variant.alleles, ["A".to_string(), "G".to_string()]);
            let block = parse_layout2(&variant.block);
            assert!(!block.phased);
            assert_eq!(block.bits, bits);
            for (s, &code) in row.iter().enumerate() {
                assert_eq!(block.missing[s], code == 3, "variant {} sample {}", v, s);
                if code != 3 {
                    assert_eq!(unphased_call(block.values[s], bits), code, "variant {} sample {}", v, s);
                }
            }
        }
    }
}

#[test]
fn test_ref_last_swaps_alleles_and_probabilities() {
    let codes = vec![vec![0, 1, 2, 0, 2], vec![2, 2, 1, 0, 0]];
    let fx = FixtureBuilder::from_codes(&codes).build();
    let dir = tempfile::tempdir().expect("tempdir");
    let summary = run(
        &fx,
        ExportFormat::Bgen12 {
            ref_first: false,
            bits: 8,
        },
        dir.path(),
        "swapped",
    );
    let bgen = read_bgen(&summary.files[0]);
    for (row, variant) in codes.iter().zip(&bgen.variants) {
        assert_eq!(variant.alleles, ["G".to_string(), "A".to_string()]);
        let block = parse_layout2(&variant.block);
        let calls: Vec<u8> = block.values.iter().map(|&p| unphased_call(p, 8)).collect();
        let expected: Vec<u8> = row.iter().map(|&c| 2 - c).collect();
        assert_eq!(calls, expected);
    }
}

#[test]
fn test_phased_variant_uses_haplotype_probabilities() {
    let v = MemoryVariant::from_codes(vec![0, 1, 2, 1]).with_phase(|s| s == 1);
    let fx = FixtureBuilder::from_variants(vec![v]).build();
    let dir = tempfile::tempdir().expect("tempdir");
    let summary = run(
        &fx,
        ExportFormat::Bgen13 {
            ref_first: true,
            bits: 8,
            compression: BgenCompression::Zlib,
        },
        dir.path(),
        "phased",
    );
    let bgen = read_bgen(&summary.files[0]);
    let block = parse_layout2(&bgen.variants[0].block);
    assert!(block.phased);
    // probability that each haplotype carries the first allele
    assert_eq!(block.values[0], [255, 255]);
    assert_eq!(block.values[2], [0, 0]);
    let mut hets = [block.values[1], block.values[3]];
    hets.sort();
    assert_eq!(hets, [[0, 255], [255, 0]]);
    assert_ne!(block.values[1], block.values[3]);
}

#[test]
fn test_layout1_probability_triples() {
    let codes = vec![vec![0, 1, 2, 3], vec![3, 3, 1, 1]];
    let fx = FixtureBuilder::from_codes(&codes).build();
    let dir = tempfile::tempdir().expect("tempdir");
    let summary = run(&fx, ExportFormat::Bgen11 { ref_first: true }, dir.path(), "v11");
    assert!(summary.files[1].to_string_lossy().ends_with(".sample"));

    let bgen = read_bgen(&summary.files[0]);
    assert_eq!(bgen.flags, 1 | (1 << 2));
    assert!(bgen.sample_ids.is_empty());
    for (row, variant) in codes.iter().zip(&bgen.variants) {
        assert_eq!(variant.block.len(), 6 * row.len());
        for (s, &code) in row.iter().enumerate() {
            let p: Vec<u16> = variant.block[6 * s..6 * s + 6]
                .chunks(2)
                .map(|b| u16::from_le_bytes([b[0], b[1]]))
                .collect();
            let mut expected = vec![0u16; 3];
            if code != 3 {
                expected[code as usize] = 32768;
            }
            assert_eq!(p, expected);
        }
    }
}

#[test]
fn test_chr_x_with_a_male_is_refused() {
    let fx = FixtureBuilder::from_codes(&[vec![0, 2, 1]])
        .chrom("X")
        .sexes(vec![Sex::Female, Sex::Male, Sex::Female])
        .build();
    let dir = tempfile::tempdir().expect("tempdir");
    let err = export(
        &fx.source,
        &fx.samples,
        &fx.variants,
        &fx.chroms,
        &ExportFormat::Bgen12 {
            ref_first: true,
            bits: 16,
        },
        &prefix(dir.path(), "x"),
        &ExportOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ExportError::UnsupportedConfiguration { .. }), "{}", err);
}

#[test]
fn test_chr_x_without_males_is_exported_diploid() {
    let codes = vec![vec![0, 2, 1, 3], vec![1, 1, 0, 2]];
    let fx = FixtureBuilder::from_codes(&codes)
        .chrom("X")
        .sexes(vec![Sex::Female, Sex::Unknown, Sex::Female, Sex::Female])
        .build();
    let dir = tempfile::tempdir().expect("tempdir");
    let summary = run(
        &fx,
        ExportFormat::Bgen13 {
            ref_first: true,
            bits: 8,
            compression: BgenCompression::Zstd,
        },
        dir.path(),
        "x_female",
    );
    let bgen = read_bgen(&summary.files[0]);
    for (row, variant) in codes.iter().zip(&bgen.variants) {
        assert_eq!(variant.chrom, "X");
        let block = parse_layout2(&variant.block);
        for (s, &code) in row.iter().enumerate() {
            assert_eq!(block.missing[s], code == 3);
            if code != 3 {
                assert_eq!(unphased_call(block.values[s], 8), code);
            }
        }
    }
}
