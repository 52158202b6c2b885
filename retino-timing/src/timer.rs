use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Trait for high-precision wall-clock timers
pub trait Timer: Clone + Send + Sync {
    type Timestamp: Copy + Clone + Send + Sync;
    fn now(&self) -> Self::Timestamp;
    fn elapsed(&self, ts: Self::Timestamp) -> Duration;
    /// Seconds since the timer was started or last reset.
    fn elapsed_secs(&self) -> f64;
    fn reset(&mut self);
    fn sleep(&self, d: Duration);
    fn record_frame(&mut self, d: Duration);
    fn frame_count(&self) -> usize;
    fn calibration_stats(&self) -> CalibrationStats;
}

#[derive(Debug, Clone, Default)]
pub struct CalibrationStats {
    pub average_frame_time_ns: f64,
    pub jitter_ns: f64,
    pub min_frame_time_ns: f64,
    pub max_frame_time_ns: f64,
    pub effective_fps: f64,
}

#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    pub start: Instant,
    pub frame_times: VecDeque<Duration>,
    pub max_samples: usize,
}

impl Timer for HighPrecisionTimer {
    type Timestamp = u64;
    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }
    fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
    fn reset(&mut self) {
        self.start = Instant::now();
        self.frame_times.clear();
    }
    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }
    fn record_frame(&mut self, d: Duration) {
        if self.frame_times.len() >= self.max_samples {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(d);
    }
    fn frame_count(&self) -> usize {
        self.frame_times.len()
    }
    fn calibration_stats(&self) -> CalibrationStats {
        if self.frame_times.is_empty() {
            return CalibrationStats::default();
        }
        let times: Vec<f64> = self
            .frame_times
            .iter()
            .map(|d| d.as_nanos() as f64)
            .collect();
        let avg = times.iter().sum::<f64>() / times.len() as f64;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / times.len() as f64;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        CalibrationStats {
            average_frame_time_ns: avg,
            jitter_ns: var.sqrt(),
            min_frame_time_ns: min,
            max_frame_time_ns: max,
            effective_fps: if avg > 0.0 { 1e9 / avg } else { 0.0 },
        }
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            start: Instant::now(),
            frame_times: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Sleeps until `deadline` seconds after start; returns at once if already past.
    pub fn sleep_until_secs(&self, deadline: f64) {
        let remaining = deadline - self.elapsed_secs();
        if remaining > 0.0 {
            self.high_precision_sleep(Duration::from_secs_f64(remaining));
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        #[cfg(target_os = "windows")]
        self.windows_sleep(duration);
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(target_os = "macos")]
        self.macos_sleep(duration);
        #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
        std::thread::sleep(duration);
    }

    #[cfg(target_os = "windows")]
    fn windows_sleep(&self, duration: Duration) {
        use windows::core::PCWSTR;
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::{
            CreateWaitableTimerW, SetWaitableTimer, WaitForSingleObject, INFINITE,
        };

        // Negative due time is relative, in 100 ns units.
        let due_time = -((duration.as_nanos() / 100) as i64);

        unsafe {
            let Ok(timer) = CreateWaitableTimerW(None, true, PCWSTR::null()) else {
                std::thread::sleep(duration);
                return;
            };
            if SetWaitableTimer(timer, &due_time, 0, None, None, false).is_ok() {
                WaitForSingleObject(timer, INFINITE);
            } else {
                std::thread::sleep(duration);
            }
            let _ = CloseHandle(timer);
        }
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC};

        let req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };

        unsafe {
            clock_nanosleep(CLOCK_MONOTONIC, 0, &req, std::ptr::null_mut());
        }
    }

    #[cfg(target_os = "macos")]
    fn macos_sleep(&self, duration: Duration) {
        use mach2::mach_time::{mach_absolute_time, mach_timebase_info, mach_timebase_info_data_t};

        if duration.as_nanos() < 100_000 {
            unsafe {
                let start = mach_absolute_time();
                let mut timebase = mach_timebase_info_data_t { numer: 0, denom: 0 };
                mach_timebase_info(&mut timebase);

                let target_ticks =
                    duration.as_nanos() as u64 * timebase.denom as u64 / timebase.numer as u64;

                while mach_absolute_time() - start < target_ticks {
                    std::hint::spin_loop();
                }
            }
        } else {
            std::thread::sleep(duration);
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_buffer_keeps_latest_samples() {
        let mut timer = HighPrecisionTimer::with_capacity(3);
        for ms in 1..=5 {
            timer.record_frame(Duration::from_millis(ms));
        }
        assert_eq!(timer.frame_count(), 3);
        let stats = timer.calibration_stats();
        assert_eq!(stats.min_frame_time_ns, 3e6);
        assert_eq!(stats.max_frame_time_ns, 5e6);
        assert!((stats.average_frame_time_ns - 4e6).abs() < 1e-6);
        assert!((stats.effective_fps - 250.0).abs() < 1e-9);
    }

    #[test]
    fn empty_timer_reports_zeroed_stats() {
        let stats = HighPrecisionTimer::new().calibration_stats();
        assert_eq!(stats.effective_fps, 0.0);
        assert_eq!(stats.jitter_ns, 0.0);
    }

    #[test]
    fn sleep_until_waits_past_deadline() {
        let timer = HighPrecisionTimer::new();
        timer.sleep_until_secs(0.005);
        assert!(timer.elapsed_secs() >= 0.005);
    }
}
