//! Lock-free parameter handoff between the control lane and the audio lane.
//!
//! The control lane is the only writer and the audio callback the only
//! reader, so a single atomic per value is enough: the callback reads a
//! consistent value once per quantum without ever blocking.

use std::sync::atomic::{AtomicBool, Ordering};

use atomic_float::AtomicF32;

/// Cache-line aligned `f32` parameter.
#[derive(Debug)]
#[repr(align(64))]
pub struct SharedParam {
    value: AtomicF32,
}

impl SharedParam {
    pub fn new(value: f32) -> Self {
        Self {
            value: AtomicF32::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.value.store(value, Ordering::Release);
    }
}

impl Default for SharedParam {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Cache-line aligned boolean flag.
#[derive(Debug, Default)]
#[repr(align(64))]
pub struct SharedFlag {
    value: AtomicBool,
}

impl SharedFlag {
    pub const fn new(value: bool) -> Self {
        Self {
            value: AtomicBool::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: bool) {
        self.value.store(value, Ordering::Release);
    }

    /// Set the flag and return its previous value.
    #[inline]
    pub fn replace(&self, value: bool) -> bool {
        self.value.swap(value, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_param_set_get() {
        let param = SharedParam::new(1.5);
        assert_eq!(param.get(), 1.5);
        param.set(-7.25);
        assert_eq!(param.get(), -7.25);
    }

    #[test]
    fn test_flag_replace() {
        let flag = SharedFlag::new(false);
        assert!(!flag.replace(true));
        assert!(flag.replace(true));
        assert!(flag.get());
    }

    #[test]
    fn test_cross_thread_visibility() {
        let param = Arc::new(SharedParam::default());
        let writer = Arc::clone(&param);
        std::thread::spawn(move || writer.set(12.0)).join().unwrap();
        assert_eq!(param.get(), 12.0);
    }
}
