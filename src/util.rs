use std::sync::{Mutex, MutexGuard, PoisonError};
use lazy_static::lazy_static;

lazy_static! {
    static ref INIT: () = {
        let env = env_logger::Env::default().default_filter_or("info");
        // Another logger may already be installed by the host; that one wins.
        let _ = env_logger::Builder::from_env(env).try_init();
    };
}

/// Install the process logger (`env_logger`, honouring `RUST_LOG`, default level `info`).
///
/// Calling this multiple times is permitted, and only the first call will have an effect.
/// Hosts that want their own logging setup can skip this entirely; the crate only talks to the
/// `log` facade.
pub fn init_logging() {
    lazy_static::initialize(&INIT);
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn log_panic(panic: Box<dyn std::any::Any + Send>) {
    if let Some(panic) = panic.downcast_ref::<String>() {
        log::error!(target: "RenderCallbackPanic", "{panic}");
    } else if let Some(panic) = panic.downcast_ref::<&str>() {
        log::error!(target: "RenderCallbackPanic", "{panic}");
    } else {
        log::error!(target: "RenderCallbackPanic", "render callback panicked with a non-string payload");
    }
}

/// Run a closure, logging instead of unwinding if it panics. Returns `None` on panic.
pub(crate) fn catch_panic<R>(f: impl FnOnce() -> R) -> Option<R> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(panic) => {
            log_panic(panic);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_can_be_called_twice() {
        init_logging();
        init_logging();
    }

    #[test]
    fn catch_panic_returns_value_or_none() {
        assert_eq!(catch_panic(|| 5), Some(5));
        assert_eq!(catch_panic(|| -> u32 { panic!("boom") }), None);
    }

    #[test]
    fn lock_recovers_from_poison() {
        let mutex = std::sync::Arc::new(Mutex::new(1));
        let m = mutex.clone();
        let _ = std::thread::spawn(move || {
            let _guard = m.lock().unwrap();
            panic!("poison it");
        })
        .join();

        assert!(mutex.is_poisoned());
        *lock(&mutex) += 1;
        assert_eq!(*lock(&mutex), 2);
    }
}
