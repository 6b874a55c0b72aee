//! 固定間隔、有上限的重試迴圈。
//!
//! DNS 輪詢與憑證取回共用 [`retry`]：每次嘗試由呼叫端提供的 `probe` 判斷結果，
//! 兩次嘗試之間透過 [`Clock`] 等待，最後一次嘗試之後不再等待。

use std::time::Duration;

use crate::clock::Clock;

/// 重試策略。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 兩次嘗試之間的等待時間
    pub interval: Duration,
    /// 最多嘗試次數
    pub max_attempts: usize,
    /// 可選的總耗時上限；下一次等待會超出此上限時即停止
    pub max_elapsed: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(interval: Duration, max_attempts: usize) -> Self {
        Self {
            interval,
            max_attempts,
            max_elapsed: None,
        }
    }

    pub fn max_elapsed(mut self, max_elapsed: Option<Duration>) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }
}

/// 重試結束時的結果。
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome<T> {
    /// `probe` 在第 `attempts` 次嘗試時回傳了值
    Ready { value: T, attempts: usize },
    /// 用盡嘗試次數或時間預算仍未成功
    Exhausted { attempts: usize },
}

/// 依照 `policy` 反覆呼叫 `probe`，直到取得值或預算用盡。
///
/// `probe` 收到從 1 開始的嘗試編號：
///
/// - `Ok(Some(value))`：成功，立即回傳，不再等待。
/// - `Ok(None)`：尚未就緒，等待 `interval` 後重試。
/// - `Err(e)`：致命錯誤，直接向上傳遞。
///
/// # 回傳
///
/// 最多呼叫 `probe` `max_attempts` 次，最多等待 `max_attempts - 1` 次。
pub fn retry<T, E, F>(policy: &RetryPolicy, clock: &dyn Clock, mut probe: F) -> Result<Outcome<T>, E>
where
    F: FnMut(usize) -> Result<Option<T>, E>,
{
    let start = clock.now();

    for attempt in 1..=policy.max_attempts {
        if let Some(value) = probe(attempt)? {
            return Ok(Outcome::Ready {
                value,
                attempts: attempt,
            });
        }

        if attempt == policy.max_attempts {
            break;
        }

        if let Some(max_elapsed) = policy.max_elapsed {
            let elapsed = (clock.now() - start).to_std().unwrap_or_default();
            if elapsed + policy.interval > max_elapsed {
                log::debug!(
                    "Retry budget of {}s exhausted after {} attempt(s)",
                    max_elapsed.as_secs(),
                    attempt
                );
                return Ok(Outcome::Exhausted { attempts: attempt });
            }
        }

        clock.sleep(policy.interval);
    }

    Ok(Outcome::Exhausted {
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;
    use crate::clock::FakeClock;

    #[test]
    fn test_ready_on_first_attempt_does_not_sleep() {
        let clock = FakeClock::new();
        let policy = RetryPolicy::new(Duration::from_secs(30), 5);

        let outcome = retry(&policy, &clock, |_| Ok::<_, Infallible>(Some("done"))).unwrap();

        assert_eq!(
            outcome,
            Outcome::Ready {
                value: "done",
                attempts: 1
            }
        );
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_ready_on_third_attempt() {
        let clock = FakeClock::new();
        let policy = RetryPolicy::new(Duration::from_secs(10), 5);

        let outcome = retry(&policy, &clock, |attempt| {
            Ok::<_, Infallible>((attempt == 3).then_some(attempt))
        })
        .unwrap();

        assert_eq!(
            outcome,
            Outcome::Ready {
                value: 3,
                attempts: 3
            }
        );
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(10); 2]);
    }

    #[test]
    fn test_exhaustion_bounds_attempts_and_sleeps() {
        let clock = FakeClock::new();
        let policy = RetryPolicy::new(Duration::from_secs(7), 4);
        let mut calls = 0;

        let outcome: Outcome<()> = retry(&policy, &clock, |_| {
            calls += 1;
            Ok::<_, Infallible>(None)
        })
        .unwrap();

        assert_eq!(outcome, Outcome::Exhausted { attempts: 4 });
        assert_eq!(calls, 4);
        assert_eq!(clock.sleeps().len(), 3);
        assert!(clock.total_slept() <= policy.interval * policy.max_attempts as u32);
    }

    #[test]
    fn test_max_elapsed_stops_early() {
        let clock = FakeClock::new();
        let policy = RetryPolicy::new(Duration::from_secs(10), 100)
            .max_elapsed(Some(Duration::from_secs(25)));
        let mut calls = 0;

        let outcome: Outcome<()> = retry(&policy, &clock, |_| {
            calls += 1;
            Ok::<_, Infallible>(None)
        })
        .unwrap();

        assert_eq!(outcome, Outcome::Exhausted { attempts: 3 });
        assert_eq!(calls, 3);
        assert_eq!(clock.total_slept(), Duration::from_secs(20));
    }

    #[test]
    fn test_error_is_propagated_immediately() {
        let clock = FakeClock::new();
        let policy = RetryPolicy::new(Duration::from_secs(1), 5);

        let result: Result<Outcome<()>, &str> = retry(&policy, &clock, |attempt| {
            if attempt == 2 {
                Err("fatal")
            } else {
                Ok(None)
            }
        });

        assert_eq!(result, Err("fatal"));
        assert_eq!(clock.sleeps().len(), 1);
    }

    #[test]
    fn test_zero_attempts_never_probes() {
        let clock = FakeClock::new();
        let policy = RetryPolicy::new(Duration::from_secs(1), 0);

        let outcome: Outcome<()> =
            retry(&policy, &clock, |_| -> Result<Option<()>, Infallible> {
                panic!("probe must not run")
            })
            .unwrap();

        assert_eq!(outcome, Outcome::Exhausted { attempts: 0 });
    }
}
