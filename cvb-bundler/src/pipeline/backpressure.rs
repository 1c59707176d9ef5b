//! In-flight fetch accounting with pause/resume hysteresis
//!
//! The controller never touches the row source itself; it returns a
//! `FlowSignal` and the pipeline forwards it to `SourceControl`.

use cvb_common::{Error, Result};

/// Default pause threshold
pub const DEFAULT_HIGH_WATERMARK: usize = 50;
/// Default resume threshold
pub const DEFAULT_LOW_WATERMARK: usize = 25;

/// Instruction for the upstream row source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowSignal {
    Pause,
    Resume,
}

/// Two-threshold state machine over the in-flight fetch count
#[derive(Debug)]
pub struct BackpressureController {
    in_flight: usize,
    high_watermark: usize,
    low_watermark: usize,
    paused: bool,
}

impl BackpressureController {
    /// Fails unless `0 < low_watermark < high_watermark`
    pub fn new(high_watermark: usize, low_watermark: usize) -> Result<Self> {
        if low_watermark == 0 {
            return Err(Error::Config(
                "low watermark must be at least 1 or the source never resumes".to_string(),
            ));
        }
        if low_watermark >= high_watermark {
            return Err(Error::Config(format!(
                "low watermark {} must be below high watermark {}",
                low_watermark, high_watermark
            )));
        }
        Ok(Self {
            in_flight: 0,
            high_watermark,
            low_watermark,
            paused: false,
        })
    }

    /// Count a fetch that is about to start
    pub fn fetch_started(&mut self) -> Option<FlowSignal> {
        self.in_flight += 1;
        if !self.paused && self.in_flight > self.high_watermark {
            self.paused = true;
            return Some(FlowSignal::Pause);
        }
        None
    }

    /// Count a fetch that reached a terminal state (success or failure)
    pub fn fetch_finished(&mut self) -> Option<FlowSignal> {
        debug_assert!(self.in_flight > 0, "fetch finished with none in flight");
        self.in_flight = self.in_flight.saturating_sub(1);
        if self.paused && self.in_flight < self.low_watermark {
            self.paused = false;
            return Some(FlowSignal::Resume);
        }
        None
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

impl Default for BackpressureController {
    fn default() -> Self {
        Self {
            in_flight: 0,
            high_watermark: DEFAULT_HIGH_WATERMARK,
            low_watermark: DEFAULT_LOW_WATERMARK,
            paused: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pauses_on_51st_start() {
        let mut controller = BackpressureController::default();
        for _ in 0..50 {
            assert_eq!(controller.fetch_started(), None);
        }
        assert!(!controller.is_paused());
        assert_eq!(controller.fetch_started(), Some(FlowSignal::Pause));
        assert!(controller.is_paused());
        assert_eq!(controller.in_flight(), 51);
    }

    #[test]
    fn test_resumes_only_below_low_watermark() {
        let mut controller = BackpressureController::default();
        for _ in 0..51 {
            controller.fetch_started();
        }

        // 51 → 25: still paused at 50, 26 and 25
        for _ in 0..26 {
            assert_eq!(controller.fetch_finished(), None);
        }
        assert_eq!(controller.in_flight(), 25);
        assert!(controller.is_paused());

        assert_eq!(controller.fetch_finished(), Some(FlowSignal::Resume));
        assert_eq!(controller.in_flight(), 24);
        assert!(!controller.is_paused());
    }

    #[test]
    fn test_pause_signalled_once() {
        let mut controller = BackpressureController::new(2, 1).unwrap();
        controller.fetch_started();
        controller.fetch_started();
        assert_eq!(controller.fetch_started(), Some(FlowSignal::Pause));
        assert_eq!(controller.fetch_started(), None);
        assert_eq!(controller.fetch_started(), None);
    }

    #[test]
    fn test_no_resume_without_pause() {
        let mut controller = BackpressureController::new(4, 2).unwrap();
        controller.fetch_started();
        assert_eq!(controller.fetch_finished(), None);
        assert_eq!(controller.in_flight(), 0);
    }

    #[test]
    fn test_invalid_thresholds() {
        assert!(BackpressureController::new(10, 10).is_err());
        assert!(BackpressureController::new(10, 20).is_err());
        assert!(BackpressureController::new(10, 9).is_ok());
        assert!(BackpressureController::new(10, 0).is_err());
    }

    #[test]
    fn test_in_flight_never_negative_under_interleaving() {
        let mut controller = BackpressureController::new(3, 1).unwrap();
        let mut started = 0usize;
        for step in 0..200usize {
            if step % 3 == 2 && started > 0 {
                controller.fetch_finished();
                started -= 1;
            } else {
                controller.fetch_started();
                started += 1;
            }
            assert_eq!(controller.in_flight(), started);
        }
    }
}
