//! Request handles for nonblocking collective operations.

use tracing::warn;

use crate::error::Result;
use crate::staging::Landing;
use crate::transport::Pending;

/// A callback run once an operation has completed.
type Callback<'a> = Box<dyn FnOnce() + 'a>;

/// A handle to a nonblocking operation.
///
/// This type represents an in-flight operation together with the work that
/// must happen once the transport reports completion: copying a staged
/// result back into a non-contiguous destination view, followed by any
/// callbacks registered with [`on_complete`](Self::on_complete).
///
/// The request mutably borrows its destination for `'a`, so the destination
/// cannot be read or modified until the request is gone.
///
/// # Lifecycle
///
/// 1. Created in flight by a nonblocking [`Communicator`](crate::Communicator) method
/// 2. Completed by [`wait()`](Self::wait) or a [`test()`](Self::test) that returns `true`;
///    reconciliation and callbacks run exactly once, in registration order.
///    If the transport fails, neither runs, and callbacks registered later
///    are dropped as well
/// 3. Inert: further `wait()` calls return `Ok(())` without doing anything,
///    further `test()` calls return `Ok(true)`
///
/// # Example
///
/// ```
/// use ferrodist::{LocalCluster, ReduceOp};
/// use ndarray::Array2;
///
/// LocalCluster::run(2, |world| {
///     let send = Array2::<f32>::ones((10, 2));
///     let mut recv = Array2::<f32>::zeros((2, 10));
///
///     // Start nonblocking all-reduce into a transposed (non-contiguous) view
///     let mut request = world
///         .iallreduce(send.view(), recv.view_mut().reversed_axes(), ReduceOp::Sum)
///         .unwrap();
///
///     // Do other work while communication proceeds...
///
///     // Wait for completion; the staged result is copied back here
///     request.wait().unwrap();
///     drop(request);
///
///     assert!(recv.iter().all(|&x| x == 2.0));
/// }).unwrap();
/// ```
pub struct Request<'a> {
    inflight: Option<Pending>,
    landing: Option<Box<dyn Landing + 'a>>,
    callbacks: Vec<Callback<'a>>,
    completed: bool,
    failed: bool,
}

impl<'a> Request<'a> {
    /// Create a new request from an in-flight transport operation and the
    /// destination it writes into, if any.
    pub(crate) fn new(inflight: Pending, landing: Option<Box<dyn Landing + 'a>>) -> Self {
        Request {
            inflight: Some(inflight),
            landing,
            callbacks: Vec::new(),
            completed: false,
            failed: false,
        }
    }

    /// Check if this request has been completed.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Register `callback` to run after completion, after every callback
    /// registered before it.
    ///
    /// On an already completed request the callback runs immediately, unless
    /// the operation failed, in which case it is dropped without running.
    pub fn on_complete(&mut self, callback: impl FnOnce() + 'a) {
        if self.failed {
            return;
        }
        if self.completed {
            callback();
        } else {
            self.callbacks.push(Box::new(callback));
        }
    }

    /// Wait for this operation to complete.
    ///
    /// Blocks until the operation is finished and its results are visible in
    /// the destination view. Waiting on a completed request is a no-op.
    pub fn wait(&mut self) -> Result<()> {
        if self.completed {
            return Ok(());
        }
        self.finish()
    }

    /// Test if this operation has completed without blocking.
    ///
    /// Returns `true` once the operation is complete, finishing it (and running
    /// reconciliation) the first time completion is observed.
    pub fn test(&mut self) -> Result<bool> {
        if self.completed {
            return Ok(true);
        }
        let done = match self.inflight.as_mut() {
            Some(inflight) => inflight.test()?,
            None => true,
        };
        if done {
            self.finish()?;
        }
        Ok(done)
    }

    /// Wait for all requests in a collection to complete.
    ///
    /// Every request is waited on, in order, even if an earlier one fails;
    /// the first error is returned.
    pub fn wait_all(requests: impl IntoIterator<Item = Request<'a>>) -> Result<()> {
        let mut first_error = None;
        for mut request in requests {
            if let Err(err) = request.wait() {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn finish(&mut self) -> Result<()> {
        let mut landing = self.landing.take();
        let outcome = match self.inflight.take() {
            Some(inflight) => match landing.as_mut() {
                Some(landing) => inflight.complete(landing.bytes_mut()),
                None => inflight.complete(&mut []),
            },
            None => Ok(()),
        };
        self.completed = true;
        if outcome.is_err() {
            self.failed = true;
            self.callbacks.clear();
        }
        outcome?;

        if let Some(landing) = landing {
            landing.reconcile();
        }
        for callback in self.callbacks.drain(..) {
            callback();
        }
        Ok(())
    }
}

impl Drop for Request<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        // If the request wasn't waited on, drive the transport to completion so
        // the rest of the group is not left waiting; staged results are lost.
        if let Some(inflight) = self.inflight.take() {
            let outcome = match self.landing.as_mut() {
                Some(landing) => inflight.complete(landing.bytes_mut()),
                None => inflight.complete(&mut []),
            };
            warn!(
                reconciled = false,
                ok = outcome.is_ok(),
                "request dropped before wait; results were not reconciled"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::staging::prepare_destination;
    use crate::transport::{Completed, InFlight};
    use ndarray::Array2;
    use std::cell::RefCell;

    /// Finishes after a fixed number of polls and writes a fixed payload.
    struct Countdown {
        polls_left: usize,
        payload: Vec<u8>,
    }

    impl InFlight for Countdown {
        fn test(&mut self) -> Result<bool> {
            if self.polls_left == 0 {
                return Ok(true);
            }
            self.polls_left -= 1;
            Ok(false)
        }

        fn complete(self: Box<Self>, landing: &mut [u8]) -> Result<()> {
            landing.copy_from_slice(&self.payload);
            Ok(())
        }
    }

    struct Broken;

    impl InFlight for Broken {
        fn test(&mut self) -> Result<bool> {
            Ok(true)
        }

        fn complete(self: Box<Self>, _landing: &mut [u8]) -> Result<()> {
            Err(Error::transport("peer vanished"))
        }
    }

    #[test]
    fn second_wait_is_a_noop() {
        let log = RefCell::new(Vec::new());
        let mut request = Request::new(Box::new(Completed), None);
        request.on_complete(|| log.borrow_mut().push("done"));
        request.wait().unwrap();
        request.wait().unwrap();
        assert!(request.is_completed());
        drop(request);
        assert_eq!(log.into_inner(), vec!["done"]);
    }

    #[test]
    fn callbacks_run_in_registration_order_after_reconciliation() {
        let mut out = Array2::<i32>::zeros((3, 2));
        let log = RefCell::new(Vec::new());
        {
            let landing = prepare_destination(out.view_mut().reversed_axes().into_dyn()).unwrap();
            let payload = bytemuck::cast_slice(&[1i32, 2, 3, 4, 5, 6]).to_vec();
            let inflight = Box::new(Countdown {
                polls_left: 0,
                payload,
            });
            let mut request = Request::new(inflight, Some(Box::new(landing)));
            request.on_complete(|| log.borrow_mut().push(1));
            request.on_complete(|| log.borrow_mut().push(2));
            request.wait().unwrap();
        }
        assert_eq!(log.into_inner(), vec![1, 2]);
        assert_eq!(out, ndarray::arr2(&[[1, 4], [2, 5], [3, 6]]));
    }

    #[test]
    fn test_polls_until_done_and_reconciles_once() {
        let mut out = Array2::<u8>::zeros((2, 2));
        let count = RefCell::new(0);
        {
            let landing = prepare_destination(out.view_mut().reversed_axes().into_dyn()).unwrap();
            let inflight = Box::new(Countdown {
                polls_left: 2,
                payload: vec![1, 2, 3, 4],
            });
            let mut request = Request::new(inflight, Some(Box::new(landing)));
            request.on_complete(|| *count.borrow_mut() += 1);
            assert!(!request.test().unwrap());
            assert!(!request.test().unwrap());
            assert!(request.test().unwrap());
            assert!(request.test().unwrap());
            request.wait().unwrap();
        }
        assert_eq!(count.into_inner(), 1);
        assert_eq!(out, ndarray::arr2(&[[1, 3], [2, 4]]));
    }

    #[test]
    fn transport_failure_skips_reconciliation() {
        let mut out = Array2::<u8>::from_elem((2, 2), 9);
        {
            let landing = prepare_destination(out.view_mut().reversed_axes().into_dyn()).unwrap();
            let mut request = Request::new(Box::new(Broken), Some(Box::new(landing)));
            assert!(matches!(request.wait(), Err(Error::TransportFailure(_))));
            assert!(request.is_completed());
            request.wait().unwrap();
        }
        assert!(out.iter().all(|&x| x == 9));
    }

    #[test]
    fn failed_request_never_runs_callbacks() {
        let ran = RefCell::new(Vec::new());
        let mut request = Request::new(Box::new(Broken), None);
        request.on_complete(|| ran.borrow_mut().push("early"));
        assert!(request.wait().is_err());
        request.on_complete(|| ran.borrow_mut().push("late"));
        assert!(request.test().unwrap());
        drop(request);
        assert!(ran.into_inner().is_empty());
    }

    #[test]
    fn wait_all_reports_first_error_after_waiting_everything() {
        let done = RefCell::new(0);
        let mut ok = Request::new(Box::new(Completed), None);
        ok.on_complete(|| *done.borrow_mut() += 1);
        let broken = Request::new(Box::new(Broken), None);
        let mut late = Request::new(Box::new(Completed), None);
        late.on_complete(|| *done.borrow_mut() += 1);

        let outcome = Request::wait_all(vec![ok, broken, late]);
        assert!(matches!(outcome, Err(Error::TransportFailure(_))));
        assert_eq!(done.into_inner(), 2);
    }

    #[test]
    fn dropped_request_does_not_reconcile() {
        let mut out = Array2::<u8>::zeros((2, 2));
        {
            let landing = prepare_destination(out.view_mut().reversed_axes().into_dyn()).unwrap();
            let inflight = Box::new(Countdown {
                polls_left: 0,
                payload: vec![7, 7, 7, 7],
            });
            let _request = Request::new(inflight, Some(Box::new(landing)));
        }
        assert!(out.iter().all(|&x| x == 0));
    }
}
