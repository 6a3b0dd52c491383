use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Slice used when sleeping so a stop request is noticed quickly.
const STOP_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlePoint {
    PortalLoaded,
    DisclaimerAccepted,
    ModeSelected,
    IdentityEntered,
    SearchSubmitted,
    DetailOpened,
}

impl SettlePoint {
    fn default_wait(self) -> Duration {
        match self {
            SettlePoint::PortalLoaded | SettlePoint::DisclaimerAccepted => Duration::from_secs(2),
            SettlePoint::ModeSelected | SettlePoint::IdentityEntered => Duration::from_secs(1),
            SettlePoint::SearchSubmitted | SettlePoint::DetailOpened => Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    /// Fixed pause between two identities of a batch.
    pub identity_pause: Duration,
    /// Whether to wait after each page interaction.
    pub settle_steps: bool,
}

impl PacingPolicy {
    pub fn new(identity_pause: Duration) -> Self {
        PacingPolicy {
            identity_pause,
            settle_steps: true,
        }
    }

    /// No waiting at all.
    pub fn immediate() -> Self {
        PacingPolicy {
            identity_pause: Duration::ZERO,
            settle_steps: false,
        }
    }

    pub fn settle(&self, point: SettlePoint) {
        if !self.settle_steps {
            return;
        }
        let wait = point.default_wait();
        debug!("Settling {:?} for {:?}", point, wait);
        thread::sleep(wait);
    }

    /// Sleeps the identity pause. Returns `false` if `stop` was raised meanwhile.
    pub fn pause_between_identities(&self, stop: &AtomicBool) -> bool {
        if self.identity_pause.is_zero() {
            return !stop.load(Ordering::SeqCst);
        }
        info!("Waiting for {:?} before the next identity...", self.identity_pause);
        let mut remaining = self.identity_pause;
        while !remaining.is_zero() {
            if stop.load(Ordering::SeqCst) {
                return false;
            }
            let slice = remaining.min(STOP_POLL);
            thread::sleep(slice);
            remaining -= slice;
        }
        !stop.load(Ordering::SeqCst)
    }
}

impl Default for PacingPolicy {
    fn default() -> Self {
        PacingPolicy::new(Duration::from_secs(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn pause_reports_a_raised_stop_flag() {
        let pacing = PacingPolicy {
            identity_pause: Duration::from_secs(30),
            settle_steps: false,
        };
        let stop = AtomicBool::new(true);
        let started = Instant::now();
        assert!(!pacing.pause_between_identities(&stop));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn short_pause_completes() {
        let pacing = PacingPolicy::new(Duration::from_millis(20));
        let stop = AtomicBool::new(false);
        assert!(pacing.pause_between_identities(&stop));
    }
}
