use std::{thread, time::Duration};

use chrono::{DateTime, Utc};

/// 定義取得目前時間與等待的行為。
///
/// 令牌過期判斷與 DNS 輪詢都經由此 trait 取得時間，測試時可替換為假時鐘。
pub trait Clock {
    /// 回傳目前的 UTC 時間。
    fn now(&self) -> DateTime<Utc>;

    /// 阻塞目前執行緒指定的時間。
    fn sleep(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// 使用系統時間與 [`thread::sleep`] 的實作。
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// 測試用的假時鐘：`sleep` 只推進內部時間並記錄每次等待。
#[cfg(test)]
#[derive(Debug)]
pub struct FakeClock {
    now: std::cell::Cell<DateTime<Utc>>,
    sleeps: std::cell::RefCell<Vec<Duration>>,
}

#[cfg(test)]
impl FakeClock {
    pub fn new() -> Self {
        Self {
            now: std::cell::Cell::new(
                DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp"),
            ),
            sleeps: std::cell::RefCell::new(Vec::new()),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let delta = chrono::Duration::from_std(duration).expect("duration in range");
        self.now.set(self.now.get() + delta);
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps.borrow().iter().sum()
    }
}

#[cfg(test)]
impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_clock_sleep_advances_time() {
        let clock = FakeClock::new();
        let start = clock.now();
        clock.sleep(Duration::from_secs(5));
        clock.sleep(Duration::from_secs(7));
        assert_eq!((clock.now() - start).num_seconds(), 12);
        assert_eq!(clock.total_slept(), Duration::from_secs(12));
    }
}
