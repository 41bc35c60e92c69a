mod common;

use std::io::BufReader;

use gtexport::{export, ExportFormat, ExportOptions, Sex, VcfDosageMode};

use common::{prefix, read_sample_major_bed, FixtureBuilder};

fn three_by_four() -> Vec<Vec<u8>> {
    vec![vec![0, 1, 2, 3], vec![1, 1, 1, 1], vec![3, 3, 0, 0]]
}

#[test]
fn test_bed_transpose_round_trip() {
    let rows = three_by_four();
    let fx = FixtureBuilder::from_codes(&rows).build();
    let dir = tempfile::tempdir().expect("tempdir");
    let out = prefix(dir.path(), "t");

    let summary = export(
        &fx.source,
        &fx.samples,
        &fx.variants,
        &fx.chroms,
        &ExportFormat::IndMajorBed,
        &out,
        &ExportOptions::default(),
    )
    .expect("export");

    assert_eq!(summary.files.len(), 3);
    assert_eq!(read_sample_major_bed(&summary.files[0], 4, 3), rows);
    assert_eq!(summary.missing.counts, vec![1, 1, 0, 1]);

    let bim = std::fs::read_to_string(&summary.files[1]).expect("bim");
    assert_eq!(bim.lines().next(), Some("1\trs1\t0\t1000\tG\tA"));
    let fam = std::fs::read_to_string(&summary.files[2]).expect("fam");
    assert_eq!(fam.lines().count(), 4);
    assert!(fam.starts_with("FAM S1 0 0 2 -9\n"));
}

#[test]
fn test_vcf_rows_and_contig() {
    let fx = FixtureBuilder::from_codes(&three_by_four())
        .sexes(vec![Sex::Female; 4])
        .build();
    let dir = tempfile::tempdir().expect("tempdir");
    let out = prefix(dir.path(), "v");
    let format = ExportFormat::Vcf {
        dosage: VcfDosageMode::None,
        gp: false,
        bgz: false,
    };

    let summary = export(
        &fx.source,
        &fx.samples,
        &fx.variants,
        &fx.chroms,
        &format,
        &out,
        &ExportOptions::default(),
    )
    .expect("export");
    let text = std::fs::read_to_string(&summary.files[0]).expect("vcf");

    assert!(text.lines().any(|l| l.starts_with("##contig=<ID=1")));
    let records: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(records.len(), 3);
    assert_eq!(records.iter().filter(|l| !l.contains("./.")).count(), 1);
    assert_eq!(records[0], "1\t1000\trs1\tA\tG\t.\t.\t.\tGT\t0/0\t0/1\t1/1\t./.");
    assert_eq!(records[1], "1\t1010\trs2\tA\tG\t.\t.\t.\tGT\t0/1\t0/1\t0/1\t0/1");

    let mut reader = noodles_vcf::io::Reader::new(BufReader::new(std::fs::File::open(&summary.files[0]).unwrap()));
    let header = reader.read_header().expect("header parses");
    assert_eq!(header.sample_names().len(), 4);
    assert!(header.contigs().contains_key("1"));
}

#[test]
fn test_bgzf_vcf_decompresses_to_plain_output() {
    let fx = FixtureBuilder::from_codes(&three_by_four()).build();
    let dir = tempfile::tempdir().expect("tempdir");
    let run = |bgz: bool, name: &str| {
        export(
            &fx.source,
            &fx.samples,
            &fx.variants,
            &fx.chroms,
            &ExportFormat::Vcf {
                dosage: VcfDosageMode::None,
                gp: false,
                bgz,
            },
            &prefix(dir.path(), name),
            &ExportOptions::default(),
        )
        .expect("export")
    };
    let plain = run(false, "plain");
    let gz = run(true, "gz");
    assert!(gz.files[0].to_string_lossy().ends_with(".vcf.gz"));

    let mut reader = noodles_bgzf::io::Reader::new(std::fs::File::open(&gz.files[0]).unwrap());
    let mut inflated = Vec::new();
    std::io::Read::read_to_end(&mut reader, &mut inflated).expect("bgzf");
    assert_eq!(inflated, std::fs::read(&plain.files[0]).unwrap());
}

#[test]
fn test_poisoned_padding_does_not_change_output() {
    // 5 samples: the last packed byte has three padding cells
    let rows = vec![vec![0, 1, 2, 3, 1], vec![2, 2, 0, 0, 3], vec![1, 0, 1, 0, 2]];
    let dir = tempfile::tempdir().expect("tempdir");
    let formats = [
        ExportFormat::IndMajorBed,
        ExportFormat::Bgen12 {
            ref_first: true,
            bits: 8,
        },
        ExportFormat::Oxford { ref_first: true },
        ExportFormat::Vcf {
            dosage: VcfDosageMode::None,
            gp: true,
            bgz: false,
        },
    ];
    for format in formats {
        let mut outputs = Vec::new();
        for poison in [false, true] {
            let mut builder = FixtureBuilder::from_codes(&rows).sexes(vec![Sex::Female; 5]);
            if poison {
                builder = builder.poison_padding();
            }
            let fx = builder.build();
            let name = format!("{}-{}", format.name(), poison);
            let summary = export(
                &fx.source,
                &fx.samples,
                &fx.variants,
                &fx.chroms,
                &format,
                &prefix(dir.path(), &name),
                &ExportOptions::default().with_threads(2),
            )
            .expect("export");
            assert_eq!(summary.missing.counts, vec![0, 0, 0, 1, 1]);
            outputs.push(std::fs::read(&summary.files[0]).expect("read output"));
        }
        assert_eq!(outputs[0], outputs[1], "{}", format.name());
    }
}

#[test]
fn test_cli_exports_plink1_fileset() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = prefix(dir.path(), "in");
    std::fs::write(input.with_extension("fam"), "F A 0 0 1 -9\nF B 0 0 2 -9\nF C 0 0 2 -9\n").unwrap();
    std::fs::write(input.with_extension("bim"), "1 v1 0 10 T C\n1 v2 0 20 G A\n").unwrap();
    // variant-major: v1 = hom A1, het, missing; v2 = hom A2 x3
    std::fs::write(input.with_extension("bed"), [0x6c, 0x1b, 0x01, 0b01_10_00, 0b11_11_11]).unwrap();
    let keep = dir.path().join("keep.txt");
    std::fs::write(&keep, "F A\nF C\n").unwrap();
    let out = prefix(dir.path(), "out");

    let status = std::process::Command::new(env!("CARGO_BIN_EXE_gtexport"))
        .arg("--bfile")
        .arg(&input)
        .args(["--export", "vcf", "--threads", "2", "--heartbeat", "0"])
        .arg("--keep")
        .arg(&keep)
        .arg("--out")
        .arg(&out)
        .status()
        .expect("run gtexport");
    assert!(status.success());

    let text = std::fs::read_to_string(out.with_extension("vcf")).expect("vcf");
    let records: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(records[0], "1\t10\tv1\tC\tT\t.\t.\t.\tGT\t1/1\t./.");
    assert_eq!(records[1], "1\t20\tv2\tA\tG\t.\t.\t.\tGT\t0/0\t0/0");
    assert!(text.contains("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tF_A\tF_C\n"));
}

#[test]
fn test_cli_reports_missing_input() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = std::process::Command::new(env!("CARGO_BIN_EXE_gtexport"))
        .arg("--bfile")
        .arg(dir.path().join("absent"))
        .args(["--export", "oxford"])
        .output()
        .expect("run gtexport");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).starts_with("Error: "));
}
