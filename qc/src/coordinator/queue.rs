//! Callback queue
//!
//! Strict FIFO of completion callbacks waiting on the current drain cycle.
//! Owned and mutated by the control task only.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::{debug, warn};

use super::messages::QueryOutcome;

/// A completion callback, invoked exactly once on the control task
pub type InfoCallback<I> = Box<dyn FnOnce(Completion<'_, I>) + Send + 'static>;

/// View of a finished cycle handed to each callback
pub struct Completion<'a, I> {
    outcome: &'a QueryOutcome,
    info: Option<&'a I>,
    queue: &'a mut CallbackQueue<I>,
}

impl<'a, I> Completion<'a, I> {
    pub fn outcome(&self) -> &QueryOutcome {
        self.outcome
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// The cached information; `None` when the cycle failed
    pub fn info(&self) -> Option<&'a I> {
        self.info
    }

    /// Request the same information again from inside this callback.
    ///
    /// The callback joins the cycle currently draining and fires before the
    /// drain finishes, with the same outcome. No new query is started.
    pub fn request_again<F>(&mut self, callback: F)
    where
        F: FnOnce(Completion<'_, I>) + Send + 'static,
    {
        debug!("Completion::request_again: called");
        self.queue.push_reentrant(Box::new(callback));
    }
}

/// FIFO of pending completion callbacks
pub struct CallbackQueue<I> {
    callbacks: VecDeque<InfoCallback<I>>,
    reentrant: u64,
}

impl<I> CallbackQueue<I> {
    pub fn new() -> Self {
        Self {
            callbacks: VecDeque::new(),
            reentrant: 0,
        }
    }

    pub fn push(&mut self, callback: InfoCallback<I>) {
        self.callbacks.push_back(callback);
    }

    fn push_reentrant(&mut self, callback: InfoCallback<I>) {
        self.reentrant += 1;
        self.callbacks.push_back(callback);
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Total callbacks added from inside a drain
    pub fn reentrant_count(&self) -> u64 {
        self.reentrant
    }

    /// Invoke and remove callbacks front to back until the queue is empty.
    ///
    /// The length is re-read after every callback so that reentrant requests
    /// are delivered within this same drain. A panicking callback is logged
    /// and the drain moves on to the next one. Returns how many callbacks ran.
    pub fn drain(&mut self, outcome: &QueryOutcome, info: Option<&I>) -> usize {
        debug!(pending = self.callbacks.len(), ?outcome, "CallbackQueue::drain: called");
        let mut delivered = 0;
        while let Some(callback) = self.callbacks.pop_front() {
            let completion = Completion {
                outcome,
                info,
                queue: &mut *self,
            };
            if catch_unwind(AssertUnwindSafe(|| callback(completion))).is_err() {
                warn!(position = delivered, "Completion callback panicked");
            }
            delivered += 1;
        }
        delivered
    }
}

impl<I> Default for CallbackQueue<I> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::FailureReason;
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};

    fn recorder() -> Arc<Mutex<Vec<u32>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn record(log: &Arc<Mutex<Vec<u32>>>, id: u32) -> InfoCallback<u32> {
        let log = Arc::clone(log);
        Box::new(move |_: Completion<'_, u32>| log.lock().unwrap().push(id))
    }

    #[test]
    fn test_drain_is_fifo() {
        let log = recorder();
        let mut queue = CallbackQueue::new();
        for id in [1, 2, 3] {
            queue.push(record(&log, id));
        }

        let delivered = queue.drain(&QueryOutcome::Succeeded, Some(&0));

        assert_eq!(delivered, 3);
        assert!(queue.is_empty());
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_identical_callbacks_not_deduplicated() {
        let log = recorder();
        let mut queue = CallbackQueue::new();
        queue.push(record(&log, 5));
        queue.push(record(&log, 5));
        assert_eq!(queue.len(), 2);

        queue.drain(&QueryOutcome::Succeeded, Some(&0));
        assert_eq!(*log.lock().unwrap(), vec![5, 5]);
    }

    #[test]
    fn test_reentrant_push_drained_in_same_pass() {
        let log = recorder();
        let mut queue = CallbackQueue::new();

        let inner_log = Arc::clone(&log);
        queue.push(Box::new(move |mut done: Completion<'_, u32>| {
            inner_log.lock().unwrap().push(1);
            let again_log = Arc::clone(&inner_log);
            done.request_again(move |done| {
                assert!(done.is_success());
                assert_eq!(done.info(), Some(&42));
                again_log.lock().unwrap().push(3);
            });
        }));
        queue.push(record(&log, 2));

        let delivered = queue.drain(&QueryOutcome::Succeeded, Some(&42));

        assert_eq!(delivered, 3);
        assert_eq!(queue.reentrant_count(), 1);
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_panicking_callback_does_not_stop_drain() {
        let log = recorder();
        let mut queue = CallbackQueue::new();

        fn explode(_: Completion<'_, u32>) {
            panic!("subscriber bug");
        }

        queue.push(Box::new(explode));
        queue.push(record(&log, 2));
        let again_log = Arc::clone(&log);
        queue.push(Box::new(move |mut done: Completion<'_, u32>| {
            let inner = Arc::clone(&again_log);
            done.request_again(move |_| inner.lock().unwrap().push(4));
            if done.is_success() {
                panic!("after re-requesting");
            }
        }));

        let delivered = queue.drain(&QueryOutcome::Succeeded, Some(&0));

        assert_eq!(delivered, 4);
        assert!(queue.is_empty());
        // Requests made before a panic are still honoured
        assert_eq!(*log.lock().unwrap(), vec![2, 4]);
    }

    #[test]
    fn test_failure_hides_info() {
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = Arc::clone(&seen);
        let mut queue: CallbackQueue<u32> = CallbackQueue::new();
        queue.push(Box::new(move |done: Completion<'_, u32>| {
            *seen_clone.lock().unwrap() = Some((done.is_success(), done.info().copied()));
        }));

        queue.drain(&QueryOutcome::Failed(FailureReason::NotScheduled), None);
        assert_eq!(*seen.lock().unwrap(), Some((false, None)));
    }

    proptest! {
        #[test]
        fn prop_drain_order_matches_push_order(ids in proptest::collection::vec(0u32..1000, 0..40),
                                               reenter in proptest::collection::vec(any::<bool>(), 40)) {
            let log = recorder();
            let mut queue = CallbackQueue::new();
            let mut expected_tail = Vec::new();

            for (idx, id) in ids.iter().copied().enumerate() {
                let log = Arc::clone(&log);
                let again = reenter[idx];
                if again {
                    expected_tail.push(id + 1000);
                }
                queue.push(Box::new(move |mut done: Completion<'_, u32>| {
                    log.lock().unwrap().push(id);
                    if again {
                        let log = Arc::clone(&log);
                        done.request_again(move |_| log.lock().unwrap().push(id + 1000));
                    }
                }));
            }

            queue.drain(&QueryOutcome::Succeeded, Some(&0));

            let mut expected = ids.clone();
            expected.extend(expected_tail);
            prop_assert_eq!(log.lock().unwrap().clone(), expected);
            prop_assert!(queue.is_empty());
        }
    }
}
