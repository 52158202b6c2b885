use crate::error::CounterError;
use crate::timer::Timer;

/// Source of the monotonically non-decreasing frame index that drives a run.
pub trait FrameClock {
    fn current_frame(&mut self) -> Result<u64, CounterError>;

    /// Called once right before the first iteration.
    fn restart(&mut self) {}

    /// Hands back any exclusively owned device. Later calls are no-ops.
    fn release(&mut self) -> Result<(), CounterError> {
        Ok(())
    }

    fn describe(&self) -> String;
}

impl<C: FrameClock + ?Sized> FrameClock for Box<C> {
    fn current_frame(&mut self) -> Result<u64, CounterError> {
        (**self).current_frame()
    }
    fn restart(&mut self) {
        (**self).restart()
    }
    fn release(&mut self) -> Result<(), CounterError> {
        (**self).release()
    }
    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Frame index derived from elapsed wall-clock time: `floor(rate * secs)`.
#[derive(Debug, Clone)]
pub struct FreeRunningClock<T: Timer> {
    timer: T,
    sample_rate_hz: f64,
}

impl<T: Timer> FreeRunningClock<T> {
    pub fn new(timer: T, sample_rate_hz: f64) -> Self {
        Self {
            timer,
            sample_rate_hz,
        }
    }

    pub fn frame_at(sample_rate_hz: f64, elapsed_secs: f64) -> u64 {
        (sample_rate_hz * elapsed_secs).floor().max(0.0) as u64
    }
}

impl<T: Timer> FrameClock for FreeRunningClock<T> {
    fn current_frame(&mut self) -> Result<u64, CounterError> {
        Ok(Self::frame_at(self.sample_rate_hz, self.timer.elapsed_secs()))
    }

    fn restart(&mut self) {
        self.timer.reset();
    }

    fn describe(&self) -> String {
        format!("free-running clock at {} Hz", self.sample_rate_hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::HighPrecisionTimer;

    #[test]
    fn frame_is_floor_of_rate_times_elapsed() {
        assert_eq!(FreeRunningClock::<HighPrecisionTimer>::frame_at(10.0, 0.0), 0);
        assert_eq!(FreeRunningClock::<HighPrecisionTimer>::frame_at(10.0, 0.099), 0);
        assert_eq!(FreeRunningClock::<HighPrecisionTimer>::frame_at(10.0, 0.1), 1);
        assert_eq!(FreeRunningClock::<HighPrecisionTimer>::frame_at(10.0, 2.57), 25);
    }

    #[test]
    fn free_running_frames_never_decrease() {
        let mut clock = FreeRunningClock::new(HighPrecisionTimer::new(), 2000.0);
        clock.restart();
        let mut last = 0;
        for _ in 0..200 {
            let f = clock.current_frame().unwrap();
            assert!(f >= last);
            last = f;
        }
        assert!(clock.release().is_ok());
    }
}
