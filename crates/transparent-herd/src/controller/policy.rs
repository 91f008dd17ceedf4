//! Sizing and spawn decisions.
//!
//! Every function here is pure: it sees the number of calls still waiting in
//! the queue, the number of running workers and the configured bounds, and
//! nothing else. The controller evaluates them while holding its state lock.

use crate::config::Config;

/// What the controller does when a worker finishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Continuation {
    /// Apoptosis: the worker is not replaced.
    Retire,
    /// The worker is replaced by exactly one new worker.
    Replace,
    /// Mitosis: the worker is replaced by two new workers.
    Split,
}

/// Even share of the queue for one of `running` workers, never below one.
fn share(queued: usize, running: usize) -> usize {
    (queued / running.max(1)).max(1)
}

/// Number of calls a worker claims when it starts, `running` including that
/// worker.
pub(crate) fn slice_size(queued: usize, running: usize, max_batch_size: Option<usize>) -> usize {
    let take = share(queued, running);
    match max_batch_size {
        Some(cap) => take.min(cap),
        None => take,
    }
}

/// Whether a finishing worker may die without replacement.
///
/// True once the queue is drained, or when running one worker fewer than
/// `running` is allowed and still keeps slices within the batch size cap.
pub(crate) fn apoptosis(queued: usize, running: usize, config: &Config) -> bool {
    if queued == 0 {
        return true;
    }
    running > config.min_concurrent
        && config
            .max_batch_size
            .is_none_or(|cap| share(queued, running - 1) <= cap)
}

/// Whether a finishing worker should be replaced by two.
///
/// Only possible with both a concurrency ceiling and a batch size cap, when
/// the ceiling is not reached yet and the current share of the queue exceeds
/// the cap.
pub(crate) fn mitosis(queued: usize, running: usize, config: &Config) -> bool {
    let (Some(max_concurrent), Some(cap)) = (config.max_concurrent, config.max_batch_size) else {
        return false;
    };
    running < max_concurrent && share(queued, running) > cap
}

/// Decision taken when one of `running` workers finishes, before it leaves
/// the running set.
pub(crate) fn continuation(queued: usize, running: usize, config: &Config) -> Continuation {
    if apoptosis(queued, running, config) {
        Continuation::Retire
    } else if mitosis(queued, running, config) {
        Continuation::Split
    } else {
        Continuation::Replace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(min: usize, max: Option<usize>, batch: Option<usize>) -> Config {
        Config {
            min_concurrent: min,
            max_concurrent: max,
            max_batch_size: batch,
        }
    }

    #[test]
    fn slice_divides_the_queue_evenly() {
        assert_eq!(slice_size(10, 2, None), 5);
        assert_eq!(slice_size(7, 2, None), 3);
        assert_eq!(slice_size(1, 2, None), 1);
        assert_eq!(slice_size(0, 1, None), 1);
    }

    #[test]
    fn slice_respects_the_cap() {
        assert_eq!(slice_size(10, 1, Some(4)), 4);
        assert_eq!(slice_size(6, 2, Some(2)), 2);
        assert_eq!(slice_size(3, 1, Some(100)), 3);
    }

    #[test]
    fn empty_queue_always_retires() {
        for running in 1..4 {
            let cfg = config(2, Some(4), Some(1));
            assert_eq!(continuation(0, running, &cfg), Continuation::Retire);
        }
    }

    #[test]
    fn never_retires_at_the_floor_with_a_backlog() {
        let cfg = config(2, None, None);
        assert!(!apoptosis(5, 2, &cfg));
        assert_eq!(continuation(5, 2, &cfg), Continuation::Replace);
    }

    #[test]
    fn retires_above_the_floor_without_a_cap() {
        let cfg = config(1, None, None);
        assert!(apoptosis(100, 2, &cfg));
    }

    #[test]
    fn retires_only_when_one_fewer_worker_stays_under_the_cap() {
        let cfg = config(1, Some(2), Some(2));
        // 2 queued over 1 worker is still within the cap of 2.
        assert!(apoptosis(2, 2, &cfg));
        // 3 queued over 1 worker is not.
        assert!(!apoptosis(3, 2, &cfg));
    }

    #[test]
    fn splits_when_the_share_exceeds_the_cap() {
        let cfg = config(1, Some(2), Some(1));
        assert_eq!(continuation(6, 1, &cfg), Continuation::Split);
    }

    #[test]
    fn never_splits_at_the_ceiling() {
        let cfg = config(1, Some(2), Some(1));
        assert!(!mitosis(6, 2, &cfg));
        assert_eq!(continuation(6, 2, &cfg), Continuation::Replace);
    }

    #[test]
    fn never_splits_without_a_ceiling() {
        let cfg = config(1, None, Some(1));
        assert!(!mitosis(100, 1, &cfg));
        assert_eq!(continuation(100, 1, &cfg), Continuation::Replace);
    }

    #[test]
    fn default_config_replaces_while_work_remains() {
        let cfg = Config::default();
        assert_eq!(continuation(3, 1, &cfg), Continuation::Replace);
        assert_eq!(continuation(0, 1, &cfg), Continuation::Retire);
    }
}
