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
use std::thread;

use crossbeam::channel;
use parking_lot::Mutex;

type Task = Box<dyn FnOnce() + Send>;

struct Inner {
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

/// A fixed-size pool of worker threads fed from one unbounded FIFO channel.
///
/// `None` on the channel is a stop signal; `resize` shrinks the pool by
/// queueing one per worker to retire. A pool of size zero spawns no threads
/// at all, in which case deferred work runs on the joining thread (the
/// deterministic "serial" mode).
pub struct Pool {
    sender: channel::Sender<Option<Task>>,
    receiver: channel::Receiver<Option<Task>>,
    inner: Arc<Inner>,
    size: usize,
}

/// Returns the default pool arity: one less than the number of logical
/// cores, and never less than one.
pub fn default_threads() -> usize {
    std::cmp::max(1, num_cpus::get() - 1)
}

fn worker(receiver: channel::Receiver<Option<Task>>) {
    loop {
        match receiver.recv() {
            Ok(Some(task)) => task(),
            // A stop signal, or every sender is gone.
            Ok(None) | Err(_) => break,
        }
    }
}

impl Pool {
    pub fn new(size: usize) -> Pool {
        let (sender, receiver) = channel::unbounded();

        let workers = (0..size)
            .map(|i| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("lathe-worker-{}", i))
                    .spawn(move || worker(receiver))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Pool {
            sender,
            receiver,
            inner: Arc::new(Inner {
                workers: Mutex::new(workers),
            }),
            size,
        }
    }

    /// `true` when the pool has no worker threads and all work runs on
    /// joining threads.
    pub fn is_serial(&self) -> bool {
        self.size == 0
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Dispatches a task. In serial mode this is a no-op; the task stays
    /// queued inside its future until someone joins it.
    pub fn spawn<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.size > 0 {
            // The channel cannot be disconnected while we hold a sender.
            self.sender.send(Some(Box::new(task))).unwrap();
        }
    }

    /// Grows the pool by spawning threads or shrinks it by queueing stop
    /// signals, which workers consume in FIFO order.
    pub fn resize(&mut self, size: usize) {
        if size > self.size {
            let mut workers = self.inner.workers.lock();

            for i in self.size..size {
                let receiver = self.receiver.clone();
                workers.push(
                    thread::Builder::new()
                        .name(format!("lathe-worker-{}", i))
                        .spawn(move || worker(receiver))
                        .expect("failed to spawn worker thread"),
                );
            }
        } else {
            for _ in size..self.size {
                self.sender.send(None).unwrap();
            }
        }

        self.size = size;
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        for _ in 0..self.size {
            let _ = self.sender.send(None);
        }

        let mut workers = self.inner.workers.lock();

        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn runs_tasks() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = Pool::new(4);

        for _ in 0..64 {
            let counter = counter.clone();
            pool.spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        drop(pool);
        assert_eq!(counter.load(Ordering::SeqCst), 64);
    }

    #[test]
    fn serial_pool_spawns_nothing() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = Pool::new(0);

        {
            let counter = counter.clone();
            pool.spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
