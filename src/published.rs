//! Shared state written by one activity and read by any number of others.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Single-slot, last-write-wins cell. Readers always get a whole value.
#[derive(Debug)]
pub struct Published<T> {
    slot: RwLock<Option<T>>,
}

impl<T: Clone> Published<T> {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    pub fn publish(&self, value: T) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    pub fn clear(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn latest(&self) -> Option<T> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<T: Clone> Default for Published<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide alive flag. Goes from alive to dead exactly once.
#[derive(Debug, Clone)]
pub struct Lifeline(Arc<AtomicBool>);

impl Lifeline {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns true only for the call that actually flipped the flag.
    pub fn cut(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

impl Default for Lifeline {
    fn default() -> Self {
        Self::new()
    }
}
