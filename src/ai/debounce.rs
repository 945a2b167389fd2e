use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebounceOutcome<T> {
    Completed(T),
    /// 等待期間有更新的請求
    Superseded,
    /// 上一個請求還沒結束
    Busy,
}

impl<T> DebounceOutcome<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            DebounceOutcome::Completed(value) => Some(value),
            DebounceOutcome::Superseded | DebounceOutcome::Busy => None,
        }
    }
}

/// 建議請求的防抖：最後一個請求勝出，執行中拒絕新請求
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    generation: AtomicU64,
    in_flight: AtomicBool,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: AtomicU64::new(0),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub async fn run<F, Fut, T>(&self, task: F) -> DebounceOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;

        if self.generation.load(Ordering::SeqCst) != ticket {
            tracing::debug!("Suggestion request {} superseded", ticket);
            return DebounceOutcome::Superseded;
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            tracing::debug!("Suggestion request {} refused, another is in flight", ticket);
            return DebounceOutcome::Busy;
        }

        let _guard = InFlightGuard(&self.in_flight);
        DebounceOutcome::Completed(task().await)
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(Duration::from_millis(300))
    }
}
