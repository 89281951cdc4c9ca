use scoreboard_capture::CaptureObserver;
use scoreboard_common::frame::DecodedValues;
use scoreboard_vision::PreviewFrames;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use sysinfo::System;
use tracing::info;

struct Window {
    system: System,
    started: Instant,
    ticks: u64,
}

/// Logs global CPU usage and processed-tick throughput at a fixed interval.
pub struct CpuSampler {
    interval: Duration,
    window: Mutex<Window>,
}

impl CpuSampler {
    pub fn new(interval: Duration) -> Self {
        let mut system = System::new();
        // First reading is the baseline for the next delta
        system.refresh_cpu_usage();
        Self {
            interval,
            window: Mutex::new(Window {
                system,
                started: Instant::now(),
                ticks: 0,
            }),
        }
    }

    /// Count one tick; returns `(cpu_percent, ticks_per_sec)` when a window closes.
    fn record_tick(&self) -> Option<(f32, f64)> {
        if self.interval.is_zero() {
            return None;
        }
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        window.ticks += 1;
        let elapsed = window.started.elapsed();
        if elapsed < self.interval {
            return None;
        }

        window.system.refresh_cpu_usage();
        let cpu = window.system.global_cpu_usage();
        let rate = window.ticks as f64 / elapsed.as_secs_f64();
        window.started = Instant::now();
        window.ticks = 0;
        Some((cpu, rate))
    }
}

impl CaptureObserver for CpuSampler {
    fn notify(&self, _values: &DecodedValues, _previews: &PreviewFrames) {
        if let Some((cpu_percent, ticks_per_sec)) = self.record_tick() {
            info!(cpu_percent, ticks_per_sec, "capture throughput");
        }
    }

    fn name(&self) -> &str {
        "cpu-sampler"
    }
}
