//! Completion barrier for recursive sub-item resyncs.

/// Counts finished child resyncs against the number launched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubtreeBarrier {
    expected: usize,
    finished: usize,
    failed: usize,
}

impl SubtreeBarrier {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            finished: 0,
            failed: 0,
        }
    }

    /// Record one child finishing. Returns true once every child has
    /// reported. Reports past the expected count are ignored.
    pub fn record(&mut self, success: bool) -> bool {
        if self.finished < self.expected {
            self.finished += 1;
            if !success {
                self.failed += 1;
            }
        }
        self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.finished >= self.expected
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn finished(&self) -> usize {
        self.finished
    }

    pub fn failed(&self) -> usize {
        self.failed
    }
}
