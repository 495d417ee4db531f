//! Share acceptance.
//!
//! The relay does not look at real proof-of-work. Each connection draws one
//! simulated work value and the value is classified by a fixed modulo rule.
//! This is a placeholder and must not be treated as a validity check.

use crate::types::{ShareOutcome, WorkSubmission};
use rand::Rng;

/// Lowest simulated work value
pub const MIN_WORK_VALUE: u64 = 1;
/// Highest simulated work value
pub const MAX_WORK_VALUE: u64 = 10_000;

/// Classify a work value.
///
/// The stale check runs first, so a value divisible by both 10 and 5 is
/// stale, never rejected.
pub fn classify_share(value: u64) -> ShareOutcome {
    if value % 10 == 0 {
        ShareOutcome::Stale
    } else if value % 5 == 0 {
        ShareOutcome::Rejected
    } else {
        ShareOutcome::Accepted
    }
}

/// Source of the work value evaluated for each connection
pub trait WorkSource: Send + Sync {
    fn next_work(&self) -> WorkSubmission;
}

/// Uniformly random work values in `[MIN_WORK_VALUE, MAX_WORK_VALUE]`
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomWorkSource;

impl WorkSource for RandomWorkSource {
    fn next_work(&self) -> WorkSubmission {
        let value = rand::thread_rng().gen_range(MIN_WORK_VALUE..=MAX_WORK_VALUE);
        WorkSubmission::new(value)
    }
}

/// Replays a fixed list of values, cycling when exhausted
#[cfg(test)]
pub struct SequenceWorkSource {
    values: Vec<u64>,
    cursor: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl SequenceWorkSource {
    pub fn new(values: Vec<u64>) -> Self {
        assert!(!values.is_empty(), "sequence must not be empty");
        Self {
            values,
            cursor: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

#[cfg(test)]
impl WorkSource for SequenceWorkSource {
    fn next_work(&self) -> WorkSubmission {
        let index = self.cursor.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        WorkSubmission::new(self.values[index % self.values.len()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiples_of_ten_are_stale() {
        for value in (10..=MAX_WORK_VALUE).step_by(10) {
            assert_eq!(classify_share(value), ShareOutcome::Stale, "value {}", value);
        }
    }

    #[test]
    fn test_odd_multiples_of_five_are_rejected() {
        for value in (5..=MAX_WORK_VALUE).step_by(10) {
            assert_eq!(classify_share(value), ShareOutcome::Rejected, "value {}", value);
        }
    }

    #[test]
    fn test_everything_else_is_accepted() {
        for value in MIN_WORK_VALUE..=MAX_WORK_VALUE {
            if value % 5 != 0 {
                assert_eq!(classify_share(value), ShareOutcome::Accepted, "value {}", value);
            }
        }
    }

    #[test]
    fn test_random_source_stays_in_range() {
        let source = RandomWorkSource;
        for _ in 0..1000 {
            let work = source.next_work();
            assert!((MIN_WORK_VALUE..=MAX_WORK_VALUE).contains(&work.value));
        }
    }

    #[test]
    fn test_sequence_source_cycles() {
        let source = SequenceWorkSource::new(vec![7, 10]);
        let values: Vec<u64> = (0..4).map(|_| source.next_work().value).collect();
        assert_eq!(values, vec![7, 10, 7, 10]);
    }
}
