use std::sync::{Condvar, Mutex};

use crate::error::StoreError;

/// Serializes every mutation of a store onto one logical writer.
///
/// Backed by `Mutex<bool>` + `Condvar`. Holding a [`WriterGuard`] is the proof
/// a caller needs to use the `*_locked` entry points.
pub struct WriterGate {
    state: Mutex<bool>,
    wake: Condvar,
}

impl WriterGate {
    pub fn new() -> Self {
        WriterGate {
            state: Mutex::new(false),
            wake: Condvar::new(),
        }
    }

    /// Block until the gate is free, then take it.
    pub fn acquire(&self) -> Result<WriterGuard<'_>, StoreError> {
        let mut locked = self
            .state
            .lock()
            .map_err(|_| StoreError::LockPoisoned("writer acquire"))?;
        while *locked {
            locked = self
                .wake
                .wait(locked)
                .map_err(|_| StoreError::LockPoisoned("writer wait"))?;
        }
        *locked = true;
        Ok(WriterGuard { gate: self })
    }

    pub fn try_acquire(&self) -> Result<Option<WriterGuard<'_>>, StoreError> {
        let mut locked = self
            .state
            .lock()
            .map_err(|_| StoreError::LockPoisoned("writer try_acquire"))?;
        if *locked {
            Ok(None)
        } else {
            *locked = true;
            Ok(Some(WriterGuard { gate: self }))
        }
    }

    fn release(&self) {
        // A poisoned flag can still be cleared; waiters must not hang on it.
        let mut locked = match self.state.lock() {
            Ok(locked) => locked,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *locked {
            *locked = false;
            self.wake.notify_one();
        }
    }
}

impl Default for WriterGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Held while mutating; releases the gate on drop.
pub struct WriterGuard<'a> {
    gate: &'a WriterGate,
}

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn gate_is_free_by_default() {
        let gate = WriterGate::new();
        assert!(gate.try_acquire().unwrap().is_some());
    }

    #[test]
    fn held_gate_rejects_try_acquire() {
        let gate = WriterGate::new();
        let _guard = gate.acquire().unwrap();
        assert!(gate.try_acquire().unwrap().is_none());
    }

    #[test]
    fn dropping_guard_releases() {
        let gate = WriterGate::new();
        drop(gate.acquire().unwrap());
        assert!(gate.try_acquire().unwrap().is_some());
    }

    #[test]
    fn waiter_proceeds_after_release() {
        let gate = Arc::new(WriterGate::new());
        let guard = gate.acquire().unwrap();

        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.acquire().map(|_| ()).is_ok())
        };

        drop(guard);
        assert!(waiter.join().unwrap());
    }
}
