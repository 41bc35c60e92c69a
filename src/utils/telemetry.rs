//! # Export Progress Blackboard
//!
//! Workers and the output coordinator bump relaxed atomic counters; a
//! background heartbeat thread samples them and reports progress, so the
//! hot loop never formats or prints anything.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::info;

/// Processing stage of an export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Stage {
    Initializing = 0,
    LoadingMetadata = 1,
    Exporting = 2,
    TransposePass = 3,
    WritingCompanions = 4,
    Complete = 5,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Initializing => "Initializing",
            Stage::LoadingMetadata => "Loading metadata",
            Stage::Exporting => "Exporting",
            Stage::TransposePass => "Transposing",
            Stage::WritingCompanions => "Writing companions",
            Stage::Complete => "Complete",
        }
    }

    fn from_u64(val: u64) -> Self {
        match val {
            0 => Stage::Initializing,
            1 => Stage::LoadingMetadata,
            2 => Stage::Exporting,
            3 => Stage::TransposePass,
            4 => Stage::WritingCompanions,
            _ => Stage::Complete,
        }
    }
}

/// Shared progress counters; every access is relaxed
#[derive(Debug)]
pub struct TelemetryBlackboard {
    stage: AtomicU64,

    current_pass: AtomicU64,
    total_passes: AtomicU64,
    blocks_flushed: AtomicU64,
    total_blocks: AtomicU64,

    variants_encoded: AtomicU64,
    total_variants: AtomicU64,

    start_time: Instant,
    last_progress_nanos: AtomicU64,

    shutdown: AtomicBool,
}

impl TelemetryBlackboard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[inline]
    pub fn set_stage(&self, stage: Stage) {
        self.stage.store(stage as u64, Ordering::Relaxed);
        self.touch_progress();
    }

    #[inline]
    pub fn stage(&self) -> Stage {
        Stage::from_u64(self.stage.load(Ordering::Relaxed))
    }

    /// Announce the shape of the work: passes, blocks per pass, variants per pass
    pub fn set_totals(&self, passes: u64, blocks: u64, variants: u64) {
        self.total_passes.store(passes, Ordering::Relaxed);
        self.total_blocks.store(passes * blocks, Ordering::Relaxed);
        self.total_variants.store(passes * variants, Ordering::Relaxed);
    }

    pub fn set_pass(&self, pass: u64) {
        self.current_pass.store(pass, Ordering::Relaxed);
        self.touch_progress();
    }

    #[inline]
    pub fn add_variants(&self, n: u64) {
        self.variants_encoded.fetch_add(n, Ordering::Relaxed);
        self.touch_progress();
    }

    #[inline]
    pub fn block_flushed(&self) {
        self.blocks_flushed.fetch_add(1, Ordering::Relaxed);
        self.touch_progress();
    }

    pub fn variants_encoded(&self) -> u64 {
        self.variants_encoded.load(Ordering::Relaxed)
    }

    pub fn blocks_flushed(&self) -> u64 {
        self.blocks_flushed.load(Ordering::Relaxed)
    }

    /// Blocks to flush over all passes
    pub fn total_blocks(&self) -> u64 {
        self.total_blocks.load(Ordering::Relaxed)
    }

    /// Variants to encode over all passes
    pub fn total_variants(&self) -> u64 {
        self.total_variants.load(Ordering::Relaxed)
    }

    #[inline]
    fn touch_progress(&self) {
        let elapsed = self.start_time.elapsed().as_nanos() as u64;
        self.last_progress_nanos.store(elapsed, Ordering::Relaxed);
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    fn progress(&self) -> Progress {
        let now = self.start_time.elapsed().as_nanos() as u64;
        let last = self.last_progress_nanos.load(Ordering::Relaxed);
        Progress {
            stage: self.stage(),
            pass: self.current_pass.load(Ordering::Relaxed),
            passes: self.total_passes.load(Ordering::Relaxed),
            blocks: self.blocks_flushed.load(Ordering::Relaxed),
            total_blocks: self.total_blocks.load(Ordering::Relaxed),
            variants: self.variants_encoded.load(Ordering::Relaxed),
            total_variants: self.total_variants.load(Ordering::Relaxed),
            elapsed_secs: self.elapsed_secs(),
            idle_secs: now.saturating_sub(last) / 1_000_000_000,
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

impl Default for TelemetryBlackboard {
    fn default() -> Self {
        Self {
            stage: AtomicU64::new(Stage::Initializing as u64),
            current_pass: AtomicU64::new(0),
            total_passes: AtomicU64::new(0),
            blocks_flushed: AtomicU64::new(0),
            total_blocks: AtomicU64::new(0),
            variants_encoded: AtomicU64::new(0),
            total_variants: AtomicU64::new(0),
            start_time: Instant::now(),
            last_progress_nanos: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        }
    }
}

/// Counters as read by one heartbeat tick
struct Progress {
    stage: Stage,
    pass: u64,
    passes: u64,
    blocks: u64,
    total_blocks: u64,
    variants: u64,
    total_variants: u64,
    elapsed_secs: f64,
    idle_secs: u64,
}

impl Progress {
    fn percent(&self) -> f64 {
        if self.total_variants == 0 {
            return 0.0;
        }
        (100.0 * self.variants as f64 / self.total_variants as f64).min(100.0)
    }

    fn eta(&self, rate: f64) -> Option<f64> {
        (rate > 0.0 && self.total_variants > self.variants)
            .then(|| (self.total_variants - self.variants) as f64 / rate)
    }
}

/// Heartbeat settings
#[derive(Clone, Copy, Debug)]
pub struct HeartbeatConfig {
    pub interval_secs: u64,
    /// Seconds without counter movement before a report says "stalled"
    pub stall_threshold_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            stall_threshold_secs: 300,
        }
    }
}

/// Background thread logging progress until shut down
pub struct HeartbeatHandle {
    thread: Option<JoinHandle<()>>,
    blackboard: Arc<TelemetryBlackboard>,
}

impl HeartbeatHandle {
    pub fn spawn(blackboard: Arc<TelemetryBlackboard>, config: HeartbeatConfig) -> io::Result<Self> {
        let bb = Arc::clone(&blackboard);
        let thread = thread::Builder::new()
            .name("heartbeat".to_string())
            .spawn(move || run_heartbeat(&bb, config))?;
        Ok(Self {
            thread: Some(thread),
            blackboard,
        })
    }

    /// Stop the thread and wait for it
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.blackboard.signal_shutdown();
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            let _ = thread.join();
        }
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Resident set size in MiB, where the platform exposes it cheaply
fn resident_mib() -> Option<u64> {
    if !cfg!(target_os = "linux") {
        return None;
    }
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * 4096 >> 20)
}

fn format_duration(secs: f64) -> String {
    let whole = secs.round() as u64;
    match whole {
        0..=59 => format!("{}s", whole),
        60..=3599 => format!("{}m{}s", whole / 60, whole % 60),
        _ => format!("{:.1}h", secs / 3600.0),
    }
}

fn run_heartbeat(bb: &TelemetryBlackboard, config: HeartbeatConfig) {
    let interval = Duration::from_secs(config.interval_secs.max(1));
    let mut prev_variants = 0u64;
    let mut prev_tick = Instant::now();

    loop {
        // unparked early by shutdown
        let deadline = Instant::now() + interval;
        while !bb.is_shutdown() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::park_timeout(deadline - now);
        }
        if bb.is_shutdown() {
            return;
        }

        let p = bb.progress();
        let tick = Instant::now();
        let dt = tick.duration_since(prev_tick).as_secs_f64();
        let rate = if dt > 0.0 {
            p.variants.saturating_sub(prev_variants) as f64 / dt
        } else {
            0.0
        };
        prev_variants = p.variants;
        prev_tick = tick;

        let eta = p.eta(rate).map_or_else(|| "unknown".to_string(), format_duration);
        info!(
            stage = p.stage.as_str(),
            pass = p.pass.max(1),
            passes = p.passes,
            blocks = %format_args!("{}/{}", p.blocks, p.total_blocks),
            variants = %format_args!("{}/{}", p.variants, p.total_variants),
            percent = %format_args!("{:.1}", p.percent()),
            rate = %format_args!("{:.0}/s", rate),
            elapsed = %format_duration(p.elapsed_secs),
            eta = eta.as_str(),
            rss_mib = resident_mib().unwrap_or(0),
            stalled = p.idle_secs > config.stall_threshold_secs,
            "progress"
        );
    }
}
