// Copyright (c) 2019 The lathe developers
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
// THE SOFTWARE.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::SharedFailure;

type Work<T> = Box<dyn FnOnce() -> Result<T, SharedFailure> + Send>;

enum State<T> {
    /// The closure has not been claimed yet. Whoever claims it first (a pool
    /// worker or the first joiner) runs it.
    Queued(Work<T>),

    /// Someone is running the closure right now.
    Running,

    /// The closure finished; all joiners see this same result.
    Done(Result<T, SharedFailure>),
}

struct Shared<T> {
    state: Mutex<State<T>>,
    cvar: Condvar,
}

/// A single-assignment value that resolves at most once.
///
/// The deferred closure travels *inside* the future until it is claimed.
/// A pool worker claims it when its queue entry comes up; a joiner claims it
/// if it gets there first. Joiners therefore never deadlock waiting for a
/// free worker: a thread that blocks on a child runs the child itself when
/// no worker has picked it up yet. With a pool of zero threads this
/// degenerates into the fully synchronous mode, where every closure runs on
/// the first `join` in a deterministic order.
pub struct Future<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Future {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Future<T>
where
    T: Clone,
{
    /// Creates a future whose value is computed by the given closure.
    pub fn deferred<F>(f: F) -> Future<T>
    where
        F: FnOnce() -> Result<T, SharedFailure> + Send + 'static,
    {
        Future {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Queued(Box::new(f))),
                cvar: Condvar::new(),
            }),
        }
    }

    /// Creates an already-resolved future.
    pub fn done(result: Result<T, SharedFailure>) -> Future<T> {
        Future {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Done(result)),
                cvar: Condvar::new(),
            }),
        }
    }

    /// Claims and runs the deferred closure if no one else has. Pool workers
    /// call this; it is a no-op when a joiner got there first.
    pub fn run(&self) {
        let work = {
            let mut state = self.shared.state.lock();

            match &*state {
                State::Queued(_) => {
                    match std::mem::replace(&mut *state, State::Running) {
                        State::Queued(work) => work,
                        _ => unreachable!(),
                    }
                }
                _ => return,
            }
        };

        self.finish(work());
    }

    fn finish(&self, result: Result<T, SharedFailure>) {
        let mut state = self.shared.state.lock();
        *state = State::Done(result);
        self.shared.cvar.notify_all();
    }

    /// Blocks until the value is available, running the closure on this
    /// thread if it has not been claimed yet.
    pub fn join(&self) -> Result<T, SharedFailure> {
        let work = {
            let mut state = self.shared.state.lock();

            loop {
                match &*state {
                    State::Done(result) => return result.clone(),
                    State::Running => {
                        self.shared.cvar.wait(&mut state);
                    }
                    State::Queued(_) => {
                        match std::mem::replace(&mut *state, State::Running)
                        {
                            State::Queued(work) => break work,
                            _ => unreachable!(),
                        }
                    }
                }
            }
        };

        let result = work();
        self.finish(result.clone());
        result
    }

    /// Returns the result without blocking, or `None` while unresolved.
    pub fn peek(&self) -> Option<Result<T, SharedFailure>> {
        match &*self.shared.state.lock() {
            State::Done(result) => Some(result.clone()),
            _ => None,
        }
    }
}

/// Joins every future, in order. Successes are delivered through `each` as
/// they are joined; on failure the first error is returned, but only after
/// every future has been drained so that no work is left dangling.
pub fn parallel_join<T, F>(
    futures: &[Future<T>],
    mut each: F,
) -> Result<(), SharedFailure>
where
    T: Clone,
    F: FnMut(usize, T),
{
    let mut first_err = None;

    for (i, future) in futures.iter().enumerate() {
        match future.join() {
            Ok(value) => each(i, value),
            Err(err) => {
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
    }

    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Joins every future and collects the values in argument order.
pub fn parallel_collect<T>(
    futures: &[Future<T>],
) -> Result<Vec<T>, SharedFailure>
where
    T: Clone,
{
    let mut values = Vec::with_capacity(futures.len());
    parallel_join(futures, |_, v| values.push(v))?;
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use failure::format_err;
    use std::thread;

    #[test]
    fn join_runs_unclaimed_work() {
        let future = Future::deferred(|| Ok(42));
        assert!(future.peek().is_none());
        assert_eq!(future.join().unwrap(), 42);
        assert_eq!(future.peek().unwrap().unwrap(), 42);
    }

    #[test]
    fn join_is_idempotent() {
        let future = Future::deferred(|| Ok(1));
        assert_eq!(future.join().unwrap(), 1);
        assert_eq!(future.join().unwrap(), 1);
    }

    #[test]
    fn many_joiners_share_one_result() {
        let future: Future<u32> = Future::deferred(|| Ok(7));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let future = future.clone();
            handles.push(thread::spawn(move || future.join().unwrap()));
        }

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 7);
        }
    }

    #[test]
    fn errors_are_shared() {
        let future: Future<u32> =
            Future::deferred(|| Err(format_err!("boom").into()));

        assert!(future.join().is_err());
        assert!(future.join().is_err());
    }

    #[test]
    fn parallel_join_drains_after_failure() {
        let futures = vec![
            Future::deferred(|| Ok(1)),
            Future::<u32>::deferred(|| Err(format_err!("bad").into())),
            Future::deferred(|| Ok(3)),
        ];

        let mut seen = Vec::new();
        let result = parallel_join(&futures, |i, v| seen.push((i, v)));

        assert!(result.is_err());
        assert_eq!(seen, vec![(0, 1), (2, 3)]);

        // The failing future was still resolved.
        assert!(futures[1].peek().is_some());
    }

    #[test]
    fn collect_preserves_argument_order() {
        let futures: Vec<_> =
            (0..16).map(|i| Future::deferred(move || Ok(i))).collect();

        assert_eq!(
            parallel_collect(&futures).unwrap(),
            (0..16).collect::<Vec<_>>()
        );
    }
}
