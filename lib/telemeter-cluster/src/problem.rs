use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default window within which 4 consecutive failures mark a node as
/// problematic.
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(2 * 60);

/// Minimum failure count within the expiry window before a node is
/// considered to have problems.
const FAIL_THRESHOLD: u32 = 4;

#[derive(Debug, Clone, Copy)]
struct NodeProblem {
    fail_count: u32,
    last_fail: Instant,
}

/// Tracks recent forward failures per member name, so the write path can
/// bypass a node that's currently failing instead of retrying into it.
/// Entries are never proactively swept; a record simply stops being
/// reported once its last failure falls outside the expiry window, and a
/// fresh failure after that resets its count to 1.
pub struct ProblemTracker {
    problems: Mutex<HashMap<String, NodeProblem>>,
    expiry: Duration,
}

impl ProblemTracker {
    pub fn new(expiry: Duration) -> Self {
        ProblemTracker {
            problems: Mutex::new(HashMap::new()),
            expiry,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, NodeProblem>> {
        self.problems
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records a forward failure against `name`, bumping its fail count if
    /// the last failure is still within the expiry window, or starting a
    /// fresh count of 1 otherwise.
    pub fn problem_detected(&self, name: &str) {
        let now = Instant::now();
        let mut problems = self.lock();
        problems
            .entry(name.to_string())
            .and_modify(|p| {
                if now.duration_since(p.last_fail) < self.expiry {
                    p.fail_count += 1;
                } else {
                    p.fail_count = 1;
                }
                p.last_fail = now;
            })
            .or_insert(NodeProblem {
                fail_count: 1,
                last_fail: now,
            });
    }

    /// True iff `name` has failed at least [`FAIL_THRESHOLD`] times with
    /// its most recent failure inside the expiry window.
    pub fn has_problems(&self, name: &str) -> bool {
        let problems = self.lock();
        match problems.get(name) {
            Some(p) => {
                p.fail_count >= FAIL_THRESHOLD && p.last_fail.elapsed() < self.expiry
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_node_with_no_failures_has_no_problems() {
        let tracker = ProblemTracker::new(DEFAULT_EXPIRY);
        assert!(!tracker.has_problems("node-a"));
    }

    #[test]
    fn flags_a_node_after_the_failure_threshold() {
        let tracker = ProblemTracker::new(DEFAULT_EXPIRY);
        for _ in 0..3 {
            tracker.problem_detected("node-a");
        }
        assert!(!tracker.has_problems("node-a"));
        tracker.problem_detected("node-a");
        assert!(tracker.has_problems("node-a"));
    }

    #[test]
    fn evicts_once_the_expiry_elapses() {
        let tracker = ProblemTracker::new(Duration::from_millis(20));
        for _ in 0..4 {
            tracker.problem_detected("node-a");
        }
        assert!(tracker.has_problems("node-a"));
        std::thread::sleep(Duration::from_millis(40));
        assert!(!tracker.has_problems("node-a"));
    }

    #[test]
    fn tracks_members_independently() {
        let tracker = ProblemTracker::new(DEFAULT_EXPIRY);
        for _ in 0..4 {
            tracker.problem_detected("node-a");
        }
        assert!(tracker.has_problems("node-a"));
        assert!(!tracker.has_problems("node-b"));
    }
}
