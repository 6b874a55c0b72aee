use std::time::Duration;

use reqwest::{blocking::Client, StatusCode};
use thiserror::Error;

/// 表示傳送 HTTP 請求時可能發生的錯誤。
#[derive(Debug, Error)]
pub enum TransportError {
    /// 連線、逾時或讀取回應失敗。
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
}

type Result<T> = std::result::Result<T, TransportError>;

/// 支援的 HTTP 方法。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// 一個與具體 HTTP 函式庫無關的請求描述。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    /// 若存在，會以 `Authorization: Bearer <token>` 送出
    pub bearer: Option<String>,
    /// JSON 格式的請求內容
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            bearer: None,
            body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: String) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            bearer: None,
            body: Some(body),
        }
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }
}

/// 伺服器回應的狀態碼與內容。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// 定義送出 HTTP 請求的行為。
///
/// API 用戶端只透過此 trait 與網路互動，測試時以模擬實作取代。
pub trait Transport {
    /// 送出請求並回傳完整的回應；非 2xx 狀態碼不視為錯誤，由呼叫端判斷。
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        (**self).send(request)
    }
}

/// 透過 `reqwest` 阻塞式用戶端送出請求的實作。
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// 建立一個新的 `HttpTransport`，所有請求共用同一個連線池與逾時設定。
    ///
    /// # 參數
    ///
    /// - `timeout`: 單一請求（含讀取回應）的逾時時間
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder
                .header("Content-Type", "application/json")
                .body(body.clone());
        }

        let response = builder.send()?;
        let status = response.status();
        let body = response.text()?;
        log::debug!("{:?} {} -> {}", request.method, request.url, status);

        Ok(HttpResponse { status, body })
    }
}

/// 測試用的模擬傳輸層：依 URL 片段回傳預先排好的回應，並記錄所有請求。
///
/// 同一路徑排了多個回應時依序取用，最後一個回應會被重複使用。
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: std::cell::RefCell<Vec<(String, std::collections::VecDeque<HttpResponse>)>>,
    requests: std::cell::RefCell<Vec<HttpRequest>>,
}

#[cfg(test)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url_part: &str, status: u16, body: serde_json::Value) -> Self {
        let response = HttpResponse::new(
            StatusCode::from_u16(status).expect("valid status"),
            body.to_string(),
        );
        {
            let mut routes = self.routes.borrow_mut();
            match routes.iter_mut().find(|(part, _)| part == url_part) {
                Some((_, queue)) => queue.push_back(response),
                None => routes.push((url_part.to_string(), [response].into())),
            }
        }
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.borrow().clone()
    }

    pub fn count(&self, url_part: &str) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|r| r.url.contains(url_part))
            .count()
    }
}

#[cfg(test)]
impl Transport for MockTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.requests.borrow_mut().push(request.clone());
        let mut routes = self.routes.borrow_mut();
        // 最長的片段優先，讓 `/Order/<id>` 不會被 `/Order` 搶走
        let (_, queue) = routes
            .iter_mut()
            .filter(|(part, _)| request.url.contains(part.as_str()))
            .max_by_key(|(part, _)| part.len())
            .unwrap_or_else(|| panic!("no mock response for {}", request.url));
        let response = if queue.len() > 1 {
            queue.pop_front().expect("non-empty queue")
        } else {
            queue.front().cloned().expect("route without responses")
        };
        Ok(response)
    }
}
