use std::time::Duration;

use reqwest::{blocking::Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

/// TXT 查詢可能發生的錯誤。對驗證等待器而言，這些錯誤都代表「記錄尚未出現」。
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Resolver returned HTTP {0}")]
    Http(StatusCode),
    #[error("Name does not exist: {0}")]
    NxDomain(String),
    #[error("Resolver returned DNS status {status} for {name}")]
    ServerFailure { name: String, status: u32 },
}

type Result<T> = std::result::Result<T, ResolveError>;

/// 定義查詢 TXT 記錄的行為。
pub trait TxtResolver {
    /// 回傳 `name` 上所有 TXT 記錄的值；每筆記錄內的多段字串已串接，外圍引號已移除。
    fn lookup_txt(&self, name: &str) -> Result<Vec<String>>;
}

/// DNS 回應碼：NXDOMAIN。
const RCODE_NXDOMAIN: u32 = 3;
/// DNS 記錄類型：TXT。
const TYPE_TXT: u16 = 16;

/// 透過 DNS-over-HTTPS JSON API（預設為 Google Public DNS）查詢公開 DNS 的實作。
#[derive(Debug, Clone)]
pub struct DohResolver {
    client: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

impl DohResolver {
    pub const DEFAULT_URL: &'static str = "https://dns.google/resolve";

    /// 建立一個新的 `DohResolver`。
    ///
    /// # 參數
    ///
    /// - `url`: JSON API 端點，例如 `https://dns.google/resolve`
    /// - `timeout`: 單次查詢的逾時時間
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl TxtResolver for DohResolver {
    fn lookup_txt(&self, name: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("name", name), ("type", "TXT")])
            .header("Accept", "application/dns-json")
            .send()?;
        if !response.status().is_success() {
            return Err(ResolveError::Http(response.status()));
        }
        let body = response.text()?;
        parse_doh_response(name, &body)
    }
}

fn parse_doh_response(name: &str, body: &str) -> Result<Vec<String>> {
    let response: DohResponse = serde_json::from_str(body)?;
    match response.status {
        0 => {}
        RCODE_NXDOMAIN => return Err(ResolveError::NxDomain(name.to_string())),
        status => {
            return Err(ResolveError::ServerFailure {
                name: name.to_string(),
                status,
            })
        }
    }

    Ok(response
        .answer
        .iter()
        .filter(|answer| answer.record_type == TYPE_TXT)
        .map(|answer| join_txt_strings(&answer.data))
        .collect())
}

/// 將 `"part1" "part2"` 形式的 TXT 資料串接為單一字串。
///
/// 不以引號開頭的資料原樣回傳。
fn join_txt_strings(data: &str) -> String {
    let data = data.trim();
    if !data.starts_with('"') {
        return data.to_string();
    }

    let mut out = String::with_capacity(data.len());
    let mut in_quotes = false;
    let mut chars = data.chars();
    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', _) => in_quotes = !in_quotes,
            ('\\', true) => out.extend(chars.next()),
            (c, true) => out.push(c),
            (_, false) => {}
        }
    }
    out
}

/// 測試用的解析器：依序回傳預先排好的結果，`None` 代表 NXDOMAIN。最後一個結果會被重複使用。
#[cfg(test)]
#[derive(Debug)]
pub struct ScriptedResolver {
    script: std::cell::RefCell<std::collections::VecDeque<Option<Vec<String>>>>,
    lookups: std::cell::Cell<usize>,
}

#[cfg(test)]
impl ScriptedResolver {
    pub fn new(script: Vec<Option<Vec<&str>>>) -> Self {
        let script = script
            .into_iter()
            .map(|step| step.map(|values| values.into_iter().map(String::from).collect()))
            .collect();
        Self {
            script: std::cell::RefCell::new(script),
            lookups: std::cell::Cell::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.get()
    }
}

#[cfg(test)]
impl TxtResolver for ScriptedResolver {
    fn lookup_txt(&self, name: &str) -> Result<Vec<String>> {
        self.lookups.set(self.lookups.get() + 1);
        let mut script = self.script.borrow_mut();
        let step = if script.len() > 1 {
            script.pop_front().flatten()
        } else {
            script.front().cloned().flatten()
        };
        step.ok_or_else(|| ResolveError::NxDomain(name.to_string()))
    }
}
