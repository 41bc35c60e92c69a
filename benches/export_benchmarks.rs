use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gtexport::data::GenotypeRecord;
use gtexport::model::{transpose_tile, write_fixed, write_requantized_16384, MissingnessAccumulator};
use gtexport::{export, ChromTable, ExportFormat, ExportOptions, MemorySource, Sample, SampleTable, Sex, Variant, VariantTable};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

/// Fixed-point formatting of dosage-scale values
fn bench_decimal(c: &mut Criterion) {
    let mut group = c.benchmark_group("decimal");
    let mut rng = StdRng::seed_from_u64(1);
    let values: Vec<u32> = (0..4096).map(|_| rng.gen_range(0..=32768)).collect();
    group.throughput(Throughput::Elements(values.len() as u64));

    group.bench_function("write_fixed_16384", |b| {
        let mut out = Vec::with_capacity(values.len() * 8);
        b.iter(|| {
            out.clear();
            for &v in &values {
                write_fixed(black_box(v), 16384, &mut out);
                out.push(b'\t');
            }
            black_box(out.len())
        })
    });

    group.bench_function("write_requantized_16384", |b| {
        let mut out = Vec::with_capacity(values.len() * 8);
        b.iter(|| {
            out.clear();
            for &v in &values {
                write_requantized_16384(black_box(v), &mut out);
                out.push(b'\t');
            }
            black_box(out.len())
        })
    });

    group.finish();
}

/// Missing-call accumulation across the nibble and byte flush points
fn bench_missingness(c: &mut Criterion) {
    let mut group = c.benchmark_group("missingness");

    for sample_ct in [1_000usize, 100_000] {
        let mut rng = StdRng::seed_from_u64(2);
        let records: Vec<GenotypeRecord> = (0..64)
            .map(|_| {
                let mut record = GenotypeRecord::new(sample_ct);
                for s in 0..sample_ct {
                    // about one call in eight missing
                    let code = if rng.gen_ratio(1, 8) { 3 } else { rng.gen_range(0..3) };
                    record.codes.set(s, code);
                }
                record
            })
            .collect();
        group.throughput(Throughput::Elements((sample_ct * records.len()) as u64));

        group.bench_with_input(BenchmarkId::new("samples", sample_ct), &sample_ct, |b, &n| {
            b.iter(|| {
                let mut acc = MissingnessAccumulator::new(n);
                for record in &records {
                    acc.update(black_box(record), None, None);
                }
                black_box(acc.finalize()[0])
            })
        });
    }

    group.finish();
}

/// 2-bit tile transpose for the sample-major BED path
fn bench_transpose(c: &mut Criterion) {
    let mut group = c.benchmark_group("transpose_tile");

    for sample_ct in [1_000usize, 10_000] {
        let n_variants = 256;
        let row_bytes = sample_ct.div_ceil(4);
        let mut rng = StdRng::seed_from_u64(3);
        let input: Vec<u8> = (0..n_variants * row_bytes).map(|_| rng.gen()).collect();
        group.throughput(Throughput::Bytes(input.len() as u64));

        group.bench_with_input(BenchmarkId::new("samples", sample_ct), &sample_ct, |b, &n| {
            let mut out = Vec::new();
            b.iter(|| {
                let width = transpose_tile(black_box(&input), row_bytes, n, n_variants, 0, &mut out);
                black_box(width)
            })
        });
    }

    group.finish();
}

fn synthetic(variant_ct: usize, sample_ct: usize) -> (MemorySource, SampleTable, VariantTable, ChromTable) {
    let mut rng = StdRng::seed_from_u64(4);
    let rows: Vec<Vec<u8>> = (0..variant_ct)
        .map(|_| (0..sample_ct).map(|_| rng.gen_range(0..4)).collect())
        .collect();
    let mut chroms = ChromTable::new();
    let c1 = chroms.intern("1");
    let samples = SampleTable::new(
        (0..sample_ct)
            .map(|i| Sample::new(i, "0", &format!("s{}", i), Sex::Female))
            .collect(),
    );
    let variants = VariantTable::new(
        (0..variant_ct)
            .map(|i| Variant::new(i, c1, 100 + i as u32, &format!("v{}", i), "A", "C"))
            .collect(),
    );
    (MemorySource::from_codes(&rows), samples, variants, chroms)
}

/// Whole export of a small in-memory matrix
fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("export");
    group.sample_size(10);
    let (source, samples, variants, chroms) = synthetic(2_000, 500);
    let dir = tempfile::tempdir().expect("tempdir");
    group.throughput(Throughput::Elements(2_000 * 500));

    let formats = [
        ExportFormat::Vcf {
            dosage: Default::default(),
            gp: false,
            bgz: false,
        },
        ExportFormat::Bgen12 {
            ref_first: true,
            bits: 8,
        },
        ExportFormat::IndMajorBed,
    ];
    for format in formats {
        for threads in [1, 4] {
            let id = BenchmarkId::new(format.name(), threads);
            group.bench_with_input(id, &threads, |b, &threads| {
                let out = dir.path().join(format!("{}-{}", format.name(), threads));
                let options = ExportOptions::default().with_threads(threads);
                b.iter(|| {
                    let summary = export(&source, &samples, &variants, &chroms, &format, &out, &options)
                        .expect("export");
                    black_box(summary.variant_ct)
                })
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_decimal, bench_missingness, bench_transpose, bench_pipeline);
criterion_main!(benches);
