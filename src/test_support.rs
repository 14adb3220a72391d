use crate::api::logging::DEBUG_PAYLOAD_ENV;
use crate::config::{
    API_KEY_ENV, API_URL_ENV, IDLE_TIMEOUT_ENV, LOG_FILTER_ENV, LOG_PATH_ENV, POLL_INTERVAL_ENV,
    RESULT_PREVIEW_ENV, STREAMING_RESUME_ENV, THREAD_LIST_LIMIT_ENV,
};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

const INBOX_ENV: [&str; 10] = [
    API_URL_ENV,
    API_KEY_ENV,
    POLL_INTERVAL_ENV,
    IDLE_TIMEOUT_ENV,
    THREAD_LIST_LIMIT_ENV,
    RESULT_PREVIEW_ENV,
    STREAMING_RESUME_ENV,
    LOG_FILTER_ENV,
    LOG_PATH_ENV,
    DEBUG_PAYLOAD_ENV,
];

/// Exclusive use of the process environment for one sync test. Every inbox
/// variable is unset on entry and again on drop.
pub struct CleanEnv {
    _lock: MutexGuard<'static, ()>,
}

impl CleanEnv {
    pub fn acquire() -> Self {
        let lock = ENV_LOCK.blocking_lock();
        clear();
        Self { _lock: lock }
    }

    pub fn set(&self, name: &str, value: &str) {
        std::env::set_var(name, value);
    }
}

impl Drop for CleanEnv {
    fn drop(&mut self) {
        clear();
    }
}

fn clear() {
    for name in INBOX_ENV {
        std::env::remove_var(name);
    }
}
