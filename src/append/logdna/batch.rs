// Copyright 2024 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;

use super::line::LogLine;

/// Number of buffered lines that triggers a delivery.
pub const DEFAULT_CAPACITY: usize = 100;

/// An ordered buffer of log lines with a capacity threshold.
///
/// The threshold check happens in the same critical section as the append, so exactly one
/// appender observes each crossing. The delivery it triggers runs outside the lock.
#[derive(Debug)]
pub struct Batch {
    capacity: usize,
    state: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    lines: Vec<LogLine>,
    // a delivery has been requested for the current crossing
    armed: bool,
}

impl Batch {
    /// Creates an empty batch that reports ready at `capacity` lines.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: RwLock::new(State {
                lines: Vec::with_capacity(capacity),
                armed: false,
            }),
        }
    }

    /// The number of lines that triggers a delivery.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends a line and returns whether the caller should dispatch a delivery.
    ///
    /// Returns `true` at most once per threshold crossing. Later appends return `false` until
    /// the batch has been drained below its capacity and filled again.
    pub fn append(&self, line: LogLine) -> bool {
        let mut state = self.write();
        state.lines.push(line);
        if state.lines.len() >= self.capacity && !state.armed {
            state.armed = true;
            true
        } else {
            false
        }
    }

    /// Drops every buffered line.
    pub fn flush(&self) {
        let mut state = self.write();
        state.lines = Vec::new();
        state.armed = false;
    }

    /// The number of buffered lines.
    pub fn size(&self) -> usize {
        self.read().lines.len()
    }

    /// Removes and returns up to `max` of the oldest lines.
    pub fn take(&self, max: usize) -> Vec<LogLine> {
        let mut state = self.write();
        let n = max.min(state.lines.len());
        let lines = state.lines.drain(..n).collect();
        if state.lines.len() < self.capacity {
            state.armed = false;
        }
        lines
    }

    /// Puts lines back in front of the buffered ones.
    pub fn restore(&self, mut lines: Vec<LogLine>) {
        if lines.is_empty() {
            return;
        }
        let mut state = self.write();
        lines.append(&mut state.lines);
        state.lines = lines;
        state.armed = false;
    }

    // a panicking producer must not disable the backend for everyone else
    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;

    fn line(n: usize) -> LogLine {
        LogLine::new(format!("line {n}"), "test")
    }

    #[test]
    fn test_below_capacity_never_ready() {
        let batch = Batch::default();
        for n in 0..99 {
            assert!(!batch.append(line(n)));
        }
        assert_eq!(batch.size(), 99);
    }

    #[test]
    fn test_ready_exactly_once_per_crossing() {
        let batch = Batch::default();
        let ready = (0..150).filter(|n| batch.append(line(*n))).count();
        assert_eq!(ready, 1);
        assert_eq!(batch.size(), 150);

        // 50 remain after the delivery carried the first 100
        let taken = batch.take(batch.capacity());
        assert_eq!(taken.len(), 100);
        assert_eq!(taken[0].line(), "line 0");
        assert_eq!(taken[99].line(), "line 99");
        assert_eq!(batch.size(), 50);

        let ready = (150..250).filter(|n| batch.append(line(*n))).count();
        assert_eq!(ready, 1);
    }

    #[test]
    fn test_hundredth_append_is_the_trigger() {
        let batch = Batch::default();
        for n in 0..99 {
            batch.append(line(n));
        }
        assert!(batch.append(line(99)));
        assert!(!batch.append(line(100)));
    }

    #[test]
    fn test_flush_resets() {
        let batch = Batch::new(3);
        assert!(!batch.append(line(0)));
        assert!(!batch.append(line(1)));
        assert!(batch.append(line(2)));
        batch.flush();
        assert_eq!(batch.size(), 0);

        batch.flush();
        assert_eq!(batch.size(), 0);

        assert!(!batch.append(line(3)));
        assert!(!batch.append(line(4)));
        assert!(batch.append(line(5)));
    }

    #[test]
    fn test_take_keeps_armed_while_still_full() {
        let batch = Batch::new(2);
        for n in 0..5 {
            batch.append(line(n));
        }
        assert_eq!(batch.take(2).len(), 2);
        // 3 remain, still at or above capacity
        assert!(!batch.append(line(5)));
        assert_eq!(batch.take(2).len(), 2);
        assert_eq!(batch.take(2).len(), 2);
        assert_eq!(batch.size(), 0);
        assert!(batch.take(2).is_empty());
    }

    #[test]
    fn test_restore_preserves_order() {
        let batch = Batch::new(10);
        for n in 0..4 {
            batch.append(line(n));
        }
        let taken = batch.take(2);
        batch.append(line(4));
        batch.restore(taken);

        let lines = batch.take(10);
        let lines = lines.iter().map(LogLine::line).collect::<Vec<_>>();
        assert_eq!(lines, ["line 0", "line 1", "line 2", "line 3", "line 4"]);
    }

    #[test]
    fn test_concurrent_appends_lose_nothing() {
        let batch = Arc::new(Batch::default());
        let ready = Arc::new(AtomicUsize::new(0));

        let handles = (0..8)
            .map(|t| {
                let batch = batch.clone();
                let ready = ready.clone();
                std::thread::spawn(move || {
                    for n in 0..1000 {
                        if batch.append(line(t * 1000 + n)) {
                            ready.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(batch.size(), 8000);
        // nobody drained the batch, so the crossing fired once
        assert_eq!(ready.load(Ordering::SeqCst), 1);
    }
}
