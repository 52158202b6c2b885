use crate::clock::FrameClock;
use crate::error::CounterError;
use tracing::{info, warn};

/// An external edge counter (e.g. imaging-frame pulses).
pub trait CounterDevice {
    /// Current cumulative count. Blocks up to the device timeout.
    fn read(&mut self) -> Result<u32, CounterError>;

    /// Stops and clears the counting task.
    fn release(&mut self) -> Result<(), CounterError>;

    fn name(&self) -> &str;
}

/// Exclusive owner of a counter device for the duration of a run.
///
/// The device is released exactly once: either through `release`, or on drop
/// when the run ends on an error path.
pub struct CounterClock<D: CounterDevice> {
    device: D,
    released: bool,
}

impl<D: CounterDevice> CounterClock<D> {
    pub fn new(device: D) -> Self {
        info!(device = device.name(), "frame counter acquired");
        Self {
            device,
            released: false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl<D: CounterDevice> FrameClock for CounterClock<D> {
    fn current_frame(&mut self) -> Result<u64, CounterError> {
        if self.released {
            return Err(CounterError::Released);
        }
        self.device.read().map(u64::from)
    }

    fn release(&mut self) -> Result<(), CounterError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let result = self.device.release();
        info!(device = self.device.name(), "frame counter released");
        result
    }

    fn describe(&self) -> String {
        format!("hardware counter on {}", self.device.name())
    }
}

impl<D: CounterDevice> Drop for CounterClock<D> {
    fn drop(&mut self) {
        if let Err(e) = FrameClock::release(self) {
            warn!("failed to release frame counter: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct FakeCounter {
        counts: Vec<u32>,
        releases: Rc<Cell<usize>>,
    }

    impl CounterDevice for FakeCounter {
        fn read(&mut self) -> Result<u32, CounterError> {
            if self.counts.is_empty() {
                return Err(CounterError::Driver {
                    call: "read",
                    code: -200474,
                    message: "timeout".into(),
                });
            }
            Ok(self.counts.remove(0))
        }
        fn release(&mut self) -> Result<(), CounterError> {
            self.releases.set(self.releases.get() + 1);
            Ok(())
        }
        fn name(&self) -> &str {
            "fake/ctr0"
        }
    }

    #[test]
    fn reads_pass_through_and_errors_propagate() {
        let releases = Rc::new(Cell::new(0));
        let mut clock = CounterClock::new(FakeCounter {
            counts: vec![0, 3, 7],
            releases: releases.clone(),
        });
        assert_eq!(clock.current_frame().unwrap(), 0);
        assert_eq!(clock.current_frame().unwrap(), 3);
        assert_eq!(clock.current_frame().unwrap(), 7);
        assert!(matches!(
            clock.current_frame(),
            Err(CounterError::Driver { code: -200474, .. })
        ));
    }

    #[test]
    fn release_happens_once_across_explicit_and_drop() {
        let releases = Rc::new(Cell::new(0));
        {
            let mut clock = CounterClock::new(FakeCounter {
                counts: vec![1],
                releases: releases.clone(),
            });
            clock.release().unwrap();
            clock.release().unwrap();
            assert!(clock.is_released());
            assert!(matches!(clock.current_frame(), Err(CounterError::Released)));
        }
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn drop_releases_when_run_aborts() {
        let releases = Rc::new(Cell::new(0));
        {
            let _clock = CounterClock::new(FakeCounter {
                counts: vec![],
                releases: releases.clone(),
            });
        }
        assert_eq!(releases.get(), 1);
    }
}
