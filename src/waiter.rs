//! 驗證等待器：在「挑戰已核發」與「挑戰已滿足」之間搭橋。
//!
//! 先向操作者顯示要建立的 TXT 記錄並等待明確確認（不設逾時），
//! 之後以固定間隔輪詢公開 DNS，直到看到相符的值或用盡重試預算。

use std::{
    convert::Infallible,
    io::{self, BufRead, Write},
    time::Duration,
};

use thiserror::Error;

use crate::{
    challenge::ValidationChallenge,
    clock::Clock,
    resolver::TxtResolver,
    retry::{retry, Outcome, RetryPolicy},
};

/// 等待驗證過程中可能發生的錯誤。
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Failed to read confirmation: {0}")]
    Prompt(#[from] io::Error),
    #[error("Aborted by operator before DNS validation")]
    Aborted,
    #[error("TXT record {record} not observed after {attempts} lookup(s)")]
    Timeout { record: String, attempts: usize },
}

type Result<T> = std::result::Result<T, ValidationError>;

/// 定義向操作者索取確認的行為。
pub trait Prompt {
    /// 顯示 `message` 並阻塞直到操作者回應；回傳 `false` 代表操作者拒絕繼續。
    fn confirm(&self, message: &str) -> io::Result<bool>;
}

/// 從標準輸入讀取確認；提示訊息寫到標準錯誤，避免混入憑證輸出。
///
/// 直接按 Enter 視為同意，輸入 `n`/`no` 或讀到 EOF 視為拒絕。
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePrompt;

impl Prompt for ConsolePrompt {
    fn confirm(&self, message: &str) -> io::Result<bool> {
        let mut stderr = io::stderr();
        write!(stderr, "{} ", message)?;
        stderr.flush()?;

        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Ok(false);
        }
        let answer = line.trim().to_lowercase();
        Ok(!matches!(answer.as_str(), "n" | "no"))
    }
}

/// 不詢問、直接同意的確認實作，用於記錄已事先建立的情境。
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoConfirm;

impl Prompt for AutoConfirm {
    fn confirm(&self, _message: &str) -> io::Result<bool> {
        Ok(true)
    }
}

/// 驗證等待器的設定。
#[derive(Debug, Clone)]
pub struct WaiterOptions {
    /// 操作者確認後、第一次查詢前的等待時間
    pub initial_delay: Duration,
    /// DNS 輪詢的重試策略
    pub policy: RetryPolicy,
    /// 操作說明的語言代碼
    pub lang: String,
}

/// 驗證等待器。
pub struct ValidationWaiter<'a> {
    resolver: &'a dyn TxtResolver,
    prompt: &'a dyn Prompt,
    clock: &'a dyn Clock,
    options: WaiterOptions,
}

impl<'a> ValidationWaiter<'a> {
    pub fn new(
        resolver: &'a dyn TxtResolver,
        prompt: &'a dyn Prompt,
        clock: &'a dyn Clock,
        options: WaiterOptions,
    ) -> Self {
        Self {
            resolver,
            prompt,
            clock,
            options,
        }
    }

    /// 顯示挑戰、等待操作者確認，然後輪詢 DNS 直到記錄出現。
    ///
    /// # 回傳
    ///
    /// 成功時回傳找到記錄時的查詢次數。
    ///
    /// # 錯誤
    ///
    /// 操作者拒絕時回傳 `ValidationError::Aborted`；預算用盡仍未看到相符的值時回傳
    /// `ValidationError::Timeout`。
    pub fn wait(&self, challenge: &ValidationChallenge) -> Result<usize> {
        eprintln!("===== DNS validation =====");
        eprintln!("{}", challenge.get_instructions(&self.options.lang));
        eprintln!("==========================");

        if !self
            .prompt
            .confirm("Press Enter after the DNS record has been created...")?
        {
            return Err(ValidationError::Aborted);
        }

        if !self.options.initial_delay.is_zero() {
            log::info!(
                "Waiting {}s for DNS propagation",
                self.options.initial_delay.as_secs()
            );
            self.clock.sleep(self.options.initial_delay);
        }

        self.poll(challenge)
    }

    /// 只做 DNS 輪詢，不經過操作者確認。
    pub fn poll(&self, challenge: &ValidationChallenge) -> Result<usize> {
        let record = challenge.record_name();
        let outcome = retry::<_, Infallible, _>(&self.options.policy, self.clock, |attempt| {
            Ok(self.observe(challenge, attempt).then_some(()))
        })
        .unwrap_or_else(|never| match never {});

        match outcome {
            Outcome::Ready { attempts, .. } => {
                log::info!("TXT record {} matches (attempt {})", record, attempts);
                Ok(attempts)
            }
            Outcome::Exhausted { attempts } => Err(ValidationError::Timeout {
                record: record.to_string(),
                attempts,
            }),
        }
    }

    /// 單次查詢；任何解析錯誤都視為記錄尚未出現。
    fn observe(&self, challenge: &ValidationChallenge, attempt: usize) -> bool {
        let record = challenge.record_name();
        match self.resolver.lookup_txt(record) {
            Ok(values) if values.iter().any(|v| challenge.matches(v)) => true,
            Ok(values) if values.is_empty() => {
                log::info!("Attempt {}: no TXT record at {} yet", attempt, record);
                false
            }
            Ok(values) => {
                log::info!(
                    "Attempt {}: TXT record at {} does not match yet",
                    attempt,
                    record
                );
                log::debug!("Resolved values: {:?}", values);
                false
            }
            Err(e) => {
                log::info!("Attempt {}: TXT record at {} not found yet", attempt, record);
                log::debug!("Lookup error: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::{clock::FakeClock, resolver::ScriptedResolver};

    struct ScriptedPrompt {
        answer: bool,
        asked: Cell<usize>,
    }

    impl ScriptedPrompt {
        fn new(answer: bool) -> Self {
            Self {
                answer,
                asked: Cell::new(0),
            }
        }
    }

    impl Prompt for ScriptedPrompt {
        fn confirm(&self, _message: &str) -> io::Result<bool> {
            self.asked.set(self.asked.get() + 1);
            Ok(self.answer)
        }
    }

    fn options(max_attempts: usize) -> WaiterOptions {
        WaiterOptions {
            initial_delay: Duration::from_secs(30),
            policy: RetryPolicy::new(Duration::from_secs(10), max_attempts),
            lang: "en".into(),
        }
    }

    fn challenge() -> ValidationChallenge {
        ValidationChallenge::txt("host.domain.com", None, "abc123", None)
    }

    #[test]
    fn test_match_on_third_attempt() {
        let resolver = ScriptedResolver::new(vec![
            None,
            Some(vec!["stale"]),
            Some(vec!["other", "abc123"]),
        ]);
        let prompt = ScriptedPrompt::new(true);
        let clock = FakeClock::new();
        let waiter = ValidationWaiter::new(&resolver, &prompt, &clock, options(5));

        let attempts = waiter.wait(&challenge()).unwrap();

        assert_eq!(attempts, 3);
        assert_eq!(resolver.lookups(), 3);
        assert_eq!(prompt.asked.get(), 1);
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_secs(30),
                Duration::from_secs(10),
                Duration::from_secs(10)
            ]
        );
    }

    #[test]
    fn test_timeout_after_max_attempts() {
        let resolver = ScriptedResolver::new(vec![Some(vec!["ABC123"])]);
        let prompt = ScriptedPrompt::new(true);
        let clock = FakeClock::new();
        let waiter = ValidationWaiter::new(&resolver, &prompt, &clock, options(4));

        let err = waiter.wait(&challenge()).unwrap_err();

        assert!(matches!(
            err,
            ValidationError::Timeout { attempts: 4, ref record } if record == "_dnsauth.host.domain.com"
        ));
        assert_eq!(resolver.lookups(), 4);
        // 初始等待之外，輪詢最多等待 max_attempts - 1 次
        assert_eq!(
            clock.total_slept(),
            Duration::from_secs(30) + Duration::from_secs(10) * 3
        );
    }

    #[test]
    fn test_declined_confirmation_never_polls() {
        let resolver = ScriptedResolver::new(vec![Some(vec!["abc123"])]);
        let prompt = ScriptedPrompt::new(false);
        let clock = FakeClock::new();
        let waiter = ValidationWaiter::new(&resolver, &prompt, &clock, options(3));

        assert!(matches!(
            waiter.wait(&challenge()),
            Err(ValidationError::Aborted)
        ));
        assert_eq!(resolver.lookups(), 0);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_immediate_match_skips_interval() {
        let resolver = ScriptedResolver::new(vec![Some(vec!["\"abc123\""])]);
        let clock = FakeClock::new();
        let waiter = ValidationWaiter::new(&resolver, &AutoConfirm, &clock, options(3));

        assert_eq!(waiter.poll(&challenge()).unwrap(), 1);
        assert!(clock.sleeps().is_empty());
    }
}
