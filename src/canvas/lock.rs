//! The drawing lock.
//!
//! Raster mutations run one at a time through [`DrawingLock::with_exclusive_raster`].
//! Every mutation also counts as "pending" from the moment it asks for the
//! lock until it returns or unwinds, so a refresh can wait for in-flight
//! draws without ever holding up a draw itself.

use std::sync::{Condvar, Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct DrawingLock<T> {
    data: Mutex<T>,
    pending: Mutex<usize>,
    idle: Condvar,
}

struct PendingGuard<'a> {
    pending: &'a Mutex<usize>,
    idle: &'a Condvar,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }
}

impl<T> DrawingLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            data: Mutex::new(value),
            pending: Mutex::new(0),
            idle: Condvar::new(),
        }
    }

    fn begin(&self) -> PendingGuard<'_> {
        *self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
        PendingGuard {
            pending: &self.pending,
            idle: &self.idle,
        }
    }

    fn lock_data(&self) -> MutexGuard<'_, T> {
        self.data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `op` with exclusive access. The lock is released on every exit
    /// path, unwinding included.
    pub fn with_exclusive_raster<R>(&self, op: impl FnOnce(&mut T) -> R) -> R {
        let _pending = self.begin();
        let mut guard = self.lock_data();
        op(&mut guard)
    }

    /// Like [`Self::with_exclusive_raster`] but gives up instead of blocking.
    pub fn try_with_exclusive_raster<R>(&self, op: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut guard = match self.data.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        let _pending = self.begin();
        Some(op(&mut guard))
    }

    /// Read access that does not count as a pending draw.
    pub fn read<R>(&self, op: impl FnOnce(&T) -> R) -> R {
        let guard = self.lock_data();
        op(&guard)
    }

    pub fn pending_draws(&self) -> usize {
        *self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_busy(&self) -> bool {
        self.pending_draws() > 0
    }

    /// Blocks until no draw is pending or `timeout` elapses. Returns `false`
    /// on timeout.
    pub fn wait_until_free(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while *pending > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, _) = self
                .idle
                .wait_timeout(pending, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            pending = next;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn exclusive_access_serializes_mutations() {
        let lock = Arc::new(DrawingLock::new(Vec::new()));
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || {
                    for i in 0..50 {
                        lock.with_exclusive_raster(|log: &mut Vec<(i32, i32)>| {
                            log.push((worker, i));
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }
        assert_eq!(lock.read(|log| log.len()), 200);
        assert!(!lock.is_busy());
    }

    #[test]
    fn lock_is_released_after_panic() {
        let lock = DrawingLock::new(0_u32);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            lock.with_exclusive_raster(|_| panic!("draw failed"));
        }));
        assert!(result.is_err());
        assert_eq!(lock.pending_draws(), 0);
        lock.with_exclusive_raster(|value| *value += 1);
        assert_eq!(lock.read(|value| *value), 1);
    }

    #[test]
    fn wait_until_free_returns_once_draw_finishes() {
        let lock = Arc::new(DrawingLock::new(()));
        let (started_tx, started_rx) = channel();
        let (release_tx, release_rx) = channel::<()>();
        let worker = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                lock.with_exclusive_raster(|_| {
                    started_tx.send(()).expect("signal start");
                    let _ = release_rx.recv_timeout(Duration::from_secs(5));
                });
            })
        };
        started_rx.recv().expect("draw started");
        assert!(lock.is_busy());
        assert!(!lock.wait_until_free(Duration::from_millis(30)));

        release_tx.send(()).expect("release");
        assert!(lock.wait_until_free(Duration::from_secs(5)));
        worker.join().expect("join");
    }

    #[test]
    fn try_access_gives_up_while_held() {
        let lock = Arc::new(DrawingLock::new(()));
        let (held_tx, held_rx) = channel();
        let (release_tx, release_rx) = channel::<()>();
        let worker = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                lock.with_exclusive_raster(|_| {
                    held_tx.send(()).expect("signal");
                    let _ = release_rx.recv_timeout(Duration::from_secs(5));
                });
            })
        };
        held_rx.recv().expect("held");
        assert!(lock.try_with_exclusive_raster(|_| ()).is_none());
        release_tx.send(()).expect("release");
        worker.join().expect("join");
        assert!(lock.try_with_exclusive_raster(|_| ()).is_some());
    }
}
