//! Staged filter method selection
//!
//! Three single-byte slots: `previous`, `current`, `next`. Any thread may
//! write `next` at any time. Only the scan loop calls [`FilterRegistry::rotate`],
//! once at the top of each cycle, so every tag filter sees one consistent
//! method for the whole cycle and a requested change lands at the next
//! cycle boundary.

use crate::domain::types::FilterMethod;
use std::sync::atomic::{AtomicU8, Ordering};

/// Method pair in effect for one scan cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterTransition {
    pub previous: FilterMethod,
    pub current: FilterMethod,
}

impl FilterTransition {
    /// A transition with no pending change
    pub fn steady(method: FilterMethod) -> Self {
        Self { previous: method, current: method }
    }

    #[inline]
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }

    /// True on the cycle where `method` becomes active
    #[inline]
    pub fn entered(&self, method: FilterMethod) -> bool {
        self.current == method && self.previous != method
    }
}

#[derive(Debug)]
pub struct FilterRegistry {
    previous: AtomicU8,
    current: AtomicU8,
    next: AtomicU8,
}

impl FilterRegistry {
    pub fn new(initial: FilterMethod) -> Self {
        let value = initial.as_u8();
        Self {
            previous: AtomicU8::new(value),
            current: AtomicU8::new(value),
            next: AtomicU8::new(value),
        }
    }

    /// Request a method change, applied at the next cycle boundary
    pub fn request(&self, method: FilterMethod) {
        self.next.store(method.as_u8(), Ordering::Release);
    }

    /// Advance `previous <- current <- next`. Single caller: the scan loop.
    pub fn rotate(&self) -> FilterTransition {
        let current = self.current.load(Ordering::Acquire);
        let next = self.next.load(Ordering::Acquire);
        self.previous.store(current, Ordering::Release);
        self.current.store(next, Ordering::Release);
        FilterTransition { previous: decode(current), current: decode(next) }
    }

    pub fn current(&self) -> FilterMethod {
        decode(self.current.load(Ordering::Acquire))
    }

    pub fn requested(&self) -> FilterMethod {
        decode(self.next.load(Ordering::Acquire))
    }

    pub fn transition(&self) -> FilterTransition {
        FilterTransition {
            previous: decode(self.previous.load(Ordering::Acquire)),
            current: decode(self.current.load(Ordering::Acquire)),
        }
    }
}

#[inline]
fn decode(value: u8) -> FilterMethod {
    // Slots are only ever written from a FilterMethod
    FilterMethod::from_u8(value).unwrap_or(FilterMethod::NoFiltering)
}
