use std::env;
use std::ffi::OsStr;

/// Sets (or clears) an environment variable for the lifetime of the guard and puts the
/// previous value back on drop.
///
/// Mostly useful in tests that exercise `XFER_*` overrides; pair it with
/// `serial_test::serial` since the process environment is shared between threads.
///
/// ```no_run
/// use utils::EnvVarGuard;
///
/// let _guard = EnvVarGuard::set("XFER_PROGRESS_POLL_INTERVAL", "20ms");
/// ```
pub struct EnvVarGuard {
    key: &'static str,
    prev: Option<String>,
}

impl EnvVarGuard {
    pub fn set(key: &'static str, value: impl AsRef<OsStr>) -> Self {
        let prev = env::var(key).ok();
        #[allow(unused_unsafe)]
        unsafe {
            env::set_var(key, value);
        }
        Self { key, prev }
    }

    pub fn unset(key: &'static str) -> Self {
        let prev = env::var(key).ok();
        #[allow(unused_unsafe)]
        unsafe {
            env::remove_var(key);
        }
        Self { key, prev }
    }
}

impl Drop for EnvVarGuard {
    #[allow(unused_unsafe)]
    fn drop(&mut self) {
        match &self.prev {
            Some(v) => unsafe { env::set_var(self.key, v) },
            None => unsafe { env::remove_var(self.key) },
        }
    }
}
