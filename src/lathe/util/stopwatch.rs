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

use std::time::{Duration, Instant};

/// A pausable stopwatch.
///
/// Build actions pause it while they wait on a child build and resume it
/// when the child resolves, so that the accumulated time is exclusive of
/// everything the node did not do itself. Pause and resume calls must come
/// in pairs.
pub struct Stopwatch {
    accum: Duration,
    since: Option<Instant>,
}

impl Stopwatch {
    /// Creates a stopwatch that is already running.
    pub fn started() -> Stopwatch {
        Stopwatch {
            accum: Duration::from_secs(0),
            since: Some(Instant::now()),
        }
    }

    pub fn pause(&mut self) {
        if let Some(since) = self.since.take() {
            self.accum += since.elapsed();
        }
    }

    pub fn resume(&mut self) {
        if self.since.is_none() {
            self.since = Some(Instant::now());
        }
    }

    /// Stops the stopwatch and returns the accumulated running time.
    pub fn stop(mut self) -> Duration {
        self.pause();
        self.accum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn excludes_paused_time() {
        let mut sw = Stopwatch::started();
        sw.pause();
        thread::sleep(Duration::from_millis(20));
        sw.resume();

        // Well under the slept duration.
        assert!(sw.stop() < Duration::from_millis(20));
    }

    #[test]
    fn pause_is_idempotent() {
        let mut sw = Stopwatch::started();
        sw.pause();
        sw.pause();
        sw.resume();
        sw.resume();
        sw.pause();

        let _ = sw.stop();
    }
}
