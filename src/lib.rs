//! # CertCenter DV Certificate Request Library
//!
//! 本庫透過 CertCenter 經銷商 API，以 DNS TXT 驗證自動化 DV 憑證的申請流程：
//!
//! - **client**: 取得並快取 OAuth2 存取令牌，呼叫資格檢查、DNS 驗證資料、下單與取回憑證等 API。
//! - **waiter**: 顯示 DNS 記錄指示並等待操作者確認，之後輪詢公開 DNS 直到記錄出現。
//! - **bundle**: 整理回傳的憑證鏈，去除空行與自簽根憑證。
//! - **workflow**: 將上述步驟串接為一次完整的簽發。
//!
//! 所有外部互動（HTTP、DNS、時間、終端機輸入）都經由 trait 注入，測試時可完全替換。
//!
//! ## 示例
//!
//! ```no_run
//! use request_cert::{
//!     clock::SystemClock,
//!     config::Config,
//!     resolver::DohResolver,
//!     transport::HttpTransport,
//!     waiter::ConsolePrompt,
//!     workflow::{IssueOptions, Issuer, Output},
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     let transport = HttpTransport::new(config.api_timeout())?;
//!     let resolver = DohResolver::new(DohResolver::DEFAULT_URL, config.dns_timeout())?;
//!
//!     let options = IssueOptions {
//!         fqdn: "host.example.com".into(),
//!         csr_path: "host.csr".into(),
//!         validity: Some(90),
//!         output: Output::Stdout,
//!         lang: "zh-tw".into(),
//!     };
//!     Issuer::new(config, transport, &resolver, &ConsolePrompt, &SystemClock).run(&options)?;
//!     Ok(())
//! }
//! ```

pub mod bundle;
pub mod certificate;
pub mod challenge;
pub mod client;
pub mod clock;
pub mod config;
pub mod csr;
pub mod payload;
pub mod resolver;
pub mod retry;
pub mod session;
pub mod transport;
pub mod waiter;
pub mod workflow;

#[cfg(test)]
mod test_support;
