use std::sync::{Mutex, MutexGuard, OnceLock};

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Exclusive access to the process environment for one test.
///
/// Holds a process-wide lock for its lifetime and puts every variable it
/// touched back to its previous value on drop.
pub(crate) struct ScopedEnv {
    _lock: MutexGuard<'static, ()>,
    saved: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    pub(crate) fn new() -> Self {
        // A panicking test poisons the lock; the environment is restored by
        // `Drop` regardless, so the guard is still usable.
        let lock = env_lock().lock().unwrap_or_else(|e| e.into_inner());
        Self {
            _lock: lock,
            saved: Vec::new(),
        }
    }

    /// Starts from a clean slate for `keys`.
    pub(crate) fn cleared(keys: &[&str]) -> Self {
        let mut env = Self::new();
        for key in keys {
            env.remove(key);
        }
        env
    }

    pub(crate) fn set(&mut self, key: &str, value: &str) {
        self.remember(key);
        // SAFETY: mutation is serialized by the env lock held in `self`.
        unsafe {
            std::env::set_var(key, value);
        }
    }

    pub(crate) fn remove(&mut self, key: &str) {
        self.remember(key);
        // SAFETY: mutation is serialized by the env lock held in `self`.
        unsafe {
            std::env::remove_var(key);
        }
    }

    fn remember(&mut self, key: &str) {
        if self.saved.iter().all(|(saved, _)| saved != key) {
            self.saved.push((key.to_string(), std::env::var(key).ok()));
        }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (key, value) in self.saved.drain(..).rev() {
            // SAFETY: the env lock is still held until `_lock` drops after this.
            unsafe {
                match value {
                    Some(value) => std::env::set_var(&key, value),
                    None => std::env::remove_var(&key),
                }
            }
        }
    }
}
