//! Cursor Position Calculator
//!
//! Elements finish out of order. The calculator tracks the longest prefix of
//! sequence numbers that has fully finished (the frontier), which is the only
//! position that is safe to checkpoint.

use std::collections::BTreeSet;

/// Tracks contiguous progress over finished sequence numbers.
#[derive(Debug, Clone, Default)]
pub struct CursorPositionCalculator {
    baseline: u64,
    frontier: u64,
    pending: BTreeSet<u64>,
    consumed: usize,
}

impl CursorPositionCalculator {
    /// Start tracking after `baseline` (the next expected number is `baseline + 1`)
    pub fn new(baseline: u64) -> Self {
        Self { baseline, frontier: baseline, pending: BTreeSet::new(), consumed: 0 }
    }

    /// Record a finished sequence number.
    ///
    /// Numbers at or below the frontier were already folded and are ignored.
    pub fn append(&mut self, sequence_number: u64) {
        if sequence_number <= self.frontier {
            return;
        }

        self.pending.insert(sequence_number);
        while self.pending.remove(&(self.frontier + 1)) {
            self.frontier += 1;
            self.consumed += 1;
        }
    }

    /// Finished items since the last clear: folded plus still pending
    pub fn count(&self) -> usize {
        self.consumed + self.pending.len()
    }

    /// How far the frontier moved since the last clear
    pub fn sequence_length(&self) -> u64 {
        self.frontier - self.baseline
    }

    /// Last sequence number of the contiguous prefix
    pub fn position(&self) -> u64 {
        self.frontier
    }

    /// Start a new run at the current frontier. Pending numbers are kept.
    pub fn clear_sequence(&mut self) {
        self.baseline = self.frontier;
        self.consumed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator_with(numbers: &[u64]) -> CursorPositionCalculator {
        let mut calculator = CursorPositionCalculator::new(0);
        for n in numbers {
            calculator.append(*n);
        }
        calculator
    }

    #[test]
    fn test_gap_at_start() {
        let calculator = calculator_with(&[2]);

        assert_eq!(calculator.count(), 1);
        assert_eq!(calculator.sequence_length(), 0);
    }

    #[test]
    fn test_first_element() {
        let calculator = calculator_with(&[1]);

        assert_eq!(calculator.count(), 1);
        assert_eq!(calculator.sequence_length(), 1);
        assert_eq!(calculator.position(), 1);
    }

    #[test]
    fn test_gap_filled_late() {
        let calculator = calculator_with(&[2, 3, 5, 1]);

        assert_eq!(calculator.count(), 4);
        assert_eq!(calculator.sequence_length(), 3);
        assert_eq!(calculator.position(), 3);
    }

    #[test]
    fn test_clear_keeps_pending() {
        let mut calculator = calculator_with(&[1, 2, 4]);

        calculator.clear_sequence();

        assert_eq!(calculator.count(), 1);
        assert_eq!(calculator.sequence_length(), 0);

        calculator.append(3);
        assert_eq!(calculator.sequence_length(), 2);
        assert_eq!(calculator.position(), 4);
        assert_eq!(calculator.count(), 2);
    }

    #[test]
    fn test_already_folded_numbers_are_ignored() {
        let mut calculator = calculator_with(&[1, 2]);

        calculator.append(2);
        calculator.append(1);

        assert_eq!(calculator.count(), 2);
        assert_eq!(calculator.sequence_length(), 2);
    }

    #[test]
    fn test_non_zero_baseline() {
        let mut calculator = CursorPositionCalculator::new(10);

        calculator.append(12);
        assert_eq!(calculator.sequence_length(), 0);

        calculator.append(11);
        assert_eq!(calculator.sequence_length(), 2);
        assert_eq!(calculator.position(), 12);
    }
}
