use std::time::{Duration, Instant};

/// Trailing-edge debounce: fires once `window` after the most recent poke.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
    }

    /// Restarts the window from `now`.
    pub fn poke(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// True once per armed window, when `now` reaches the deadline.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_after_quiet_window() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(500));
        debouncer.poke(start);
        assert!(!debouncer.due(start + Duration::from_millis(499)));
        assert!(debouncer.due(start + Duration::from_millis(500)));
        assert!(!debouncer.due(start + Duration::from_millis(900)));
    }

    #[test]
    fn poking_again_pushes_the_deadline() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(500));
        debouncer.poke(start);
        debouncer.poke(start + Duration::from_millis(400));
        assert!(!debouncer.due(start + Duration::from_millis(600)));
        assert!(debouncer.due(start + Duration::from_millis(900)));
    }

    #[test]
    fn idle_debouncer_never_fires() {
        let mut debouncer = Debouncer::new(Duration::from_millis(10));
        assert!(!debouncer.due(Instant::now() + Duration::from_secs(5)));
        debouncer.poke(Instant::now());
        debouncer.cancel();
        assert!(!debouncer.is_pending());
    }
}
