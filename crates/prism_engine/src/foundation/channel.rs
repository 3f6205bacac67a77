//! Lossy single-slot channel
//!
//! Cross-thread handoff where only the most recent value matters.
//! Writers always overwrite; the reader takes-and-clears. This is a
//! deliberate coalescing design, not a queue: intermediate values
//! published faster than the reader consumes them are dropped.

use std::sync::Mutex;

/// Single-slot store-latest / take-and-clear exchange point.
///
/// The engine uses one of these to carry pending framebuffer resizes
/// from the event-polling thread to the render thread. Callers must
/// not assume delivery of every stored value.
#[derive(Debug, Default)]
pub struct LatestSlot<T> {
    slot: Mutex<Option<T>>,
}

impl<T> LatestSlot<T> {
    /// Create an empty slot
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Store a value, replacing any value not yet taken
    pub fn store(&self, value: T) {
        let mut guard = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(value);
    }

    /// Take the latest value, leaving the slot empty
    pub fn take(&self) -> Option<T> {
        let mut guard = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        guard.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn take_on_empty_slot_is_none() {
        let slot: LatestSlot<u32> = LatestSlot::new();
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn take_clears_the_slot() {
        let slot = LatestSlot::new();
        slot.store(7u32);
        assert_eq!(slot.take(), Some(7));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn rapid_stores_coalesce_to_the_last_value() {
        // N stores faster than one take: exactly the last value is
        // observed, never an intermediate one.
        let slot = LatestSlot::new();
        for size in [(100u32, 50u32), (640, 480), (800, 600), (1920, 1080)] {
            slot.store(size);
        }
        assert_eq!(slot.take(), Some((1920, 1080)));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn contended_stores_coalesce_and_never_go_backwards() {
        // Reader races the writer: whatever subset of values it
        // observes must move strictly forward, and the final store is
        // never lost.
        let slot = Arc::new(LatestSlot::new());
        let writer = {
            let slot = Arc::clone(&slot);
            std::thread::spawn(move || {
                for i in 1..=1000u32 {
                    slot.store(i);
                    if i % 64 == 0 {
                        std::thread::yield_now();
                    }
                }
            })
        };

        let mut seen = Vec::new();
        while !writer.is_finished() {
            if let Some(value) = slot.take() {
                seen.push(value);
            }
        }
        writer.join().unwrap();
        if let Some(value) = slot.take() {
            seen.push(value);
        }

        assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(seen.last(), Some(&1000));
    }

    #[test]
    fn cross_thread_store_is_visible_to_reader() {
        let slot = Arc::new(LatestSlot::new());
        let writer = {
            let slot = Arc::clone(&slot);
            std::thread::spawn(move || {
                for i in 0..100u32 {
                    slot.store(i);
                }
            })
        };
        writer.join().unwrap();
        assert_eq!(slot.take(), Some(99));
    }
}
