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

//! The engine does not handle any sort of display for the user. Instead, it
//! broadcasts events along channels for consumption by user-facing logging.
//! Handlers must be non-blocking; anything heavy belongs on the receiving
//! side of the channel.

use std::ops::Deref;
use std::sync::mpsc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::alias::Alias;

/// How a node build ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeOutcome {
    /// The action ran and a new stamp was recorded.
    Built,

    /// Every recorded stamp matched; the action was skipped.
    UpToDate,

    /// The build failed.
    Failed,
}

/// A single engine event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Event {
    /// A write port opened and builds are about to be scheduled.
    BeginGraph {
        /// The number of worker threads (zero means serial).
        threads: usize,
    },

    /// The write port finished all scheduled work.
    EndGraph {
        /// The number of nodes that failed.
        failures: usize,
    },

    /// A node's execution has started.
    BeginNode { alias: Alias },

    /// A node's execution has finished.
    EndNode {
        alias: Alias,
        outcome: NodeOutcome,
        /// Wall-clock time including waits on children.
        duration: Duration,
        /// Display form of the failure, when there is one.
        error: Option<String>,
    },
}

/// A wrapper to timestamp events.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Timestamped<T> {
    timestamp: DateTime<Utc>,
    inner: T,
}

impl<T> Timestamped<T> {
    pub fn timestamp(&self) -> &DateTime<Utc> {
        &self.timestamp
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> From<T> for Timestamped<T> {
    fn from(inner: T) -> Self {
        Timestamped {
            timestamp: Utc::now(),
            inner,
        }
    }
}

impl<T> Deref for Timestamped<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// A concurrent multi-subscriber event stream. Each subscriber gets its own
/// channel; sending never blocks, and subscribers whose receiving end is
/// gone are pruned on the next broadcast.
#[derive(Default)]
pub struct Broadcast {
    subscribers: Mutex<Vec<mpsc::Sender<Timestamped<Event>>>>,
}

impl Broadcast {
    pub fn new() -> Broadcast {
        Broadcast::default()
    }

    /// Registers a new subscriber and returns its receiving end.
    pub fn subscribe(&self) -> mpsc::Receiver<Timestamped<Event>> {
        let (sender, receiver) = mpsc::channel();
        self.subscribers.lock().push(sender);
        receiver
    }

    /// Broadcasts one event to every live subscriber.
    pub fn send(&self, event: Event) {
        let mut subscribers = self.subscribers.lock();

        if subscribers.is_empty() {
            return;
        }

        let event = Timestamped::from(event);
        subscribers.retain(|s| s.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_reaches_every_subscriber() {
        let broadcast = Broadcast::new();
        let a = broadcast.subscribe();
        let b = broadcast.subscribe();

        broadcast.send(Event::BeginGraph { threads: 2 });

        for rx in &[a, b] {
            match rx.recv().unwrap().into_inner() {
                Event::BeginGraph { threads } => assert_eq!(threads, 2),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[test]
    fn dead_subscribers_are_pruned() {
        let broadcast = Broadcast::new();
        drop(broadcast.subscribe());

        broadcast.send(Event::EndGraph { failures: 0 });
        assert!(broadcast.subscribers.lock().is_empty());
    }
}
