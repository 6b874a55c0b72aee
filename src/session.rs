use chrono::{DateTime, Duration, TimeDelta, Utc};

/// 令牌在真正過期前多久就視為失效，避免請求途中過期。
const EXPIRY_MARGIN_SECS: i64 = 30;

/// 經銷商 API 核發的存取令牌。
#[derive(Clone)]
pub struct Token {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl Token {
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// 以 `expires_in` 秒數計算絕對過期時間。
    ///
    /// # 回傳
    ///
    /// `expires_in` 使時間溢位時回傳 `None`。
    pub fn issued_at(
        access_token: impl Into<String>,
        now: DateTime<Utc>,
        expires_in: i64,
    ) -> Option<Self> {
        let expires_at = now.checked_add_signed(TimeDelta::try_seconds(expires_in)?)?;
        Some(Self::new(access_token, expires_at))
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// 判斷令牌在 `now` 時是否仍可使用（已扣除安全邊界）。
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > now
    }
}

// 令牌不可出現在日誌中
impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// 單一行程內的令牌快取，由 API 用戶端獨佔持有。
#[derive(Debug, Default)]
pub struct Session {
    token: Option<Token>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// 回傳在 `now` 時仍有效的快取令牌。
    pub fn current(&self, now: DateTime<Utc>) -> Option<&Token> {
        self.token.as_ref().filter(|token| token.is_valid_at(now))
    }

    pub fn store(&mut self, token: Token) {
        self.token = Some(token);
    }

    /// 丟棄快取令牌，下一次呼叫會重新認證。
    pub fn invalidate(&mut self) {
        self.token = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_token_validity_respects_margin() {
        let token = Token::issued_at("abc", at(1_000), 3600).unwrap();
        assert!(token.is_valid_at(at(1_000)));
        assert!(token.is_valid_at(at(1_000 + 3600 - 31)));
        assert!(!token.is_valid_at(at(1_000 + 3600 - 30)));
        assert!(!token.is_valid_at(at(1_000 + 3600)));
    }

    #[test]
    fn test_session_cache_and_invalidate() {
        let mut session = Session::new();
        assert!(session.current(at(0)).is_none());

        session.store(Token::issued_at("abc", at(0), 3600).unwrap());
        assert_eq!(session.current(at(10)).unwrap().access_token(), "abc");
        assert!(session.current(at(3600)).is_none());

        session.invalidate();
        assert!(session.current(at(10)).is_none());
    }

    #[test]
    fn test_overflowing_expiry_is_rejected() {
        assert!(Token::issued_at("abc", at(0), i64::MAX).is_none());
        assert!(Token::issued_at("abc", at(0), i64::MAX / 1000).is_none());
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = Token::issued_at("super-secret", at(0), 60).unwrap();
        assert!(!format!("{:?}", token).contains("super-secret"));
    }
}
