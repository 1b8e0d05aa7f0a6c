use std::collections::VecDeque;

/// Declares a count stable once it has stayed unchanged across `window`
/// consecutive observations after the first.
///
/// One unchanged observation is never enough, so the window has a floor of 2.
#[derive(Debug, Clone)]
pub struct StabilityTracker {
    window: usize,
    history: VecDeque<usize>,
}

impl StabilityTracker {
    pub fn new(window: usize) -> Self {
        let window = window.max(2);
        Self {
            window,
            history: VecDeque::with_capacity(window + 1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Record a count and report whether it is now stable.
    pub fn record(&mut self, count: usize) -> bool {
        if self.history.len() == self.window + 1 {
            self.history.pop_front();
        }
        self.history.push_back(count);
        self.is_stable()
    }

    /// True when the last `window + 1` counts are all equal.
    pub fn is_stable(&self) -> bool {
        self.history.len() == self.window + 1
            && self.history.iter().all(|c| Some(c) == self.history.back())
    }

    /// Number of trailing observations equal to the latest, excluding it.
    pub fn unchanged_run(&self) -> usize {
        let Some(last) = self.history.back() else {
            return 0;
        };
        self.history
            .iter()
            .rev()
            .skip(1)
            .take_while(|c| *c == last)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_unchanged_step_is_not_stable() {
        let mut t = StabilityTracker::new(2);
        assert!(!t.record(5));
        assert!(!t.record(5));
        assert!(t.record(5));
    }

    #[test]
    fn test_growth_resets_stability() {
        let mut t = StabilityTracker::new(2);
        for (count, expected) in [(3, false), (5, false), (5, false), (5, true)] {
            assert_eq!(t.record(count), expected, "after {count}");
        }
        assert!(!t.record(6));
        assert_eq!(t.unchanged_run(), 0);
    }

    #[test]
    fn test_window_floor() {
        let mut t = StabilityTracker::new(1);
        assert_eq!(t.window(), 2);
        t.record(4);
        assert!(!t.record(4));
        assert_eq!(t.unchanged_run(), 1);
    }

    #[test]
    fn test_larger_window() {
        let mut t = StabilityTracker::new(3);
        let stable: Vec<bool> = [2, 2, 2, 2].iter().map(|c| t.record(*c)).collect();
        assert_eq!(stable, vec![false, false, false, true]);
    }
}
