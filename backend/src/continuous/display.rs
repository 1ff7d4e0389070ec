//! Lock-free handoff of a continuous value to a render thread
//!
//! The simulation thread publishes; a render thread polls. Neither side
//! ever blocks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Single-writer / single-reader cell holding the latest published value
///
/// # Example
///
/// ```rust
/// use queuesim_core_rs::continuous::DisplayCell;
///
/// let cell = DisplayCell::shared(0.0);
/// let reader = cell.clone();
///
/// cell.publish(12.5);
/// assert_eq!(reader.take_if_changed(), Some(12.5));
/// assert_eq!(reader.take_if_changed(), None);
/// assert_eq!(reader.current(), 12.5);
/// ```
#[derive(Debug)]
pub struct DisplayCell {
    bits: AtomicU64,
    changed: AtomicBool,
}

impl DisplayCell {
    pub fn new(initial: f64) -> Self {
        Self {
            bits: AtomicU64::new(initial.to_bits()),
            changed: AtomicBool::new(false),
        }
    }

    /// New cell behind an `Arc`, ready to hand to a reader
    pub fn shared(initial: f64) -> Arc<Self> {
        Arc::new(Self::new(initial))
    }

    /// Store a new value and raise the changed flag
    pub fn publish(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
        self.changed.store(true, Ordering::Release);
    }

    /// Latest value if it changed since the previous call
    pub fn take_if_changed(&self) -> Option<f64> {
        if self.changed.swap(false, Ordering::AcqRel) {
            Some(self.current())
        } else {
            None
        }
    }

    /// Latest value, without touching the changed flag
    pub fn current(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_initial_value_is_not_a_change() {
        let cell = DisplayCell::new(3.0);
        assert_eq!(cell.take_if_changed(), None);
        assert_eq!(cell.current(), 3.0);
    }

    #[test]
    fn test_reader_thread_sees_last_value() {
        let cell = DisplayCell::shared(0.0);
        let writer = Arc::clone(&cell);

        let handle = thread::spawn(move || {
            for i in 1..=1000 {
                writer.publish(i as f64);
            }
        });
        handle.join().unwrap();

        assert_eq!(cell.take_if_changed(), Some(1000.0));
    }
}
