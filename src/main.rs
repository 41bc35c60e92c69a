//! # gtexport: Multithreaded Genotype Export
//!
//! Converts a PLINK1 fileset into another genotype format.
//!
//! ## Usage
//! ```bash
//! # VCF with dosages, BGZF-compressed
//! gtexport --bfile data --export vcf --vcf-dosage ds --bgz --out data
//!
//! # BGEN v1.3, 8-bit probabilities, zstd
//! gtexport --bfile data --export bgen-1.3 --bgen-bits 8 --bgen-compression zstd --out data
//!
//! # Sample-major BED within 512 MiB
//! gtexport --bfile data --export ind-major-bed --memory 512 --out data_t
//!
//! # With profiling output
//! gtexport --bfile data --export oxford --out data --profile
//! ```

use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{info, warn};

use gtexport::config::Config;
use gtexport::io::plink1::read_id_set;
use gtexport::io::vcf::read_passthrough_header;
use gtexport::io::{Plink1Fileset, SampleIdList};
use gtexport::utils::telemetry::{HeartbeatConfig, HeartbeatHandle, Stage, TelemetryBlackboard};
use gtexport::export;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing subscriber for hierarchical profiling output
fn init_profiling() {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_span_events(FmtSpan::CLOSE)
                .with_target(false)
                .with_timer(fmt::time::uptime()),
        )
        .init();
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let start = Instant::now();

    let config = Config::parse_and_validate()?;

    if config.profile {
        init_profiling();
        eprintln!("=== Profiling enabled ===\n");
    } else {
        init_logging();
    }

    let telemetry = TelemetryBlackboard::new();
    let heartbeat = if config.heartbeat > 0 {
        let hb_config = HeartbeatConfig {
            interval_secs: config.heartbeat,
            ..HeartbeatConfig::default()
        };
        match HeartbeatHandle::spawn(telemetry.clone(), hb_config) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "progress reporting disabled");
                None
            }
        }
    } else {
        None
    };

    telemetry.set_stage(Stage::LoadingMetadata);
    let mut fileset = Plink1Fileset::open(&config.bfile)
        .with_context(|| format!("loading PLINK1 fileset {}", config.bfile.display()))?;
    info!(
        samples = fileset.samples.len(),
        variants = fileset.variants.len(),
        bfile = %config.bfile.display(),
        "loaded PLINK1 fileset"
    );
    if let Some(path) = &config.keep {
        fileset.keep_samples(&SampleIdList::read(path)?);
        info!(samples = fileset.samples.len(), "applied --keep");
    }
    if let Some(path) = &config.extract {
        fileset.extract_variants(&read_id_set(path)?);
        info!(variants = fileset.variants.len(), "applied --extract");
    }
    if let Some(path) = &config.ref_second {
        let marked = fileset.set_ref_second(&read_id_set(path)?);
        info!(variants = marked, "applied --ref-second");
    }

    let mut options = config.options();
    options.telemetry = Some(telemetry.clone());
    if let Some(path) = &config.vcf_header {
        options.vcf_passthrough = read_passthrough_header(path)?;
    }

    let (source, samples, variants, chroms) = fileset.into_tables();
    let format = config.format();
    let summary = export(&source, &samples, &variants, &chroms, &format, &config.out, &options)
        .with_context(|| format!("{} export to {}", format.name(), config.out.display()))?;

    telemetry.set_stage(Stage::Complete);
    if let Some(heartbeat) = heartbeat {
        heartbeat.shutdown();
    }

    info!("{}", summary);
    for file in &summary.files {
        info!(path = %file.display(), "written");
    }
    eprintln!("\nCompleted in {:.2}s", start.elapsed().as_secs_f64());

    Ok(())
}
