//! CertCenter 經銷商 REST API 用戶端。
//!
//! 負責取得並快取存取令牌，以及域名資格檢查、取得 DNS 驗證資料、提交 CSR 與取回憑證。
//! 令牌過期或伺服器回應 401 時會自動重新認證一次，而不是讓整個流程失敗。

use std::fmt;

use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;

use crate::{
    bundle::{BundleError, CertificateBundle},
    challenge::ValidationChallenge,
    clock::Clock,
    config::CertCenterConfig,
    csr::Csr,
    payload::{DnsDataPayload, OrderPayload, PayloadT, TokenPayload, ValidateNamePayload},
    session::{Session, Token},
    transport::{HttpRequest, HttpResponse, Method, Transport, TransportError},
};

/// 定義所有 API 操作可能產生的錯誤。
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Domain {0} is not eligible for the configured product")]
    IneligibleDomain(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Certificate for order {0} is not ready yet")]
    NotReady(RequestId),
    #[error("Invalid request payload: {0}")]
    InvalidPayload(String),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Serde JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Certificate chain error: {0}")]
    Bundle(#[from] BundleError),
}

type Result<T> = std::result::Result<T, ClientError>;

const TOKEN_PATH: &str = "/oauth2/token";
const VALIDATE_NAME_PATH: &str = "/rest/v1/ValidateName";
const DNS_DATA_PATH: &str = "/rest/v1/DNSData";
const ORDER_PATH: &str = "/rest/v1/Order";

/// 令牌回應未提供 `expires_in` 時採用的有效秒數。
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// 下單後由經銷商核發的訂單編號（`CertCenterOrderID`）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 域名資格檢查的結果；只有符合資格時才會回傳。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityResult {
    pub common_name: String,
}

/// 一次憑證申請的內容，建立後只提交一次。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    pub fqdn: String,
    pub csr: String,
    pub validity_period: u32,
    pub product_code: String,
}

impl CertificateRequest {
    pub fn new(fqdn: &str, csr: &Csr, validity_period: u32, product_code: &str) -> Self {
        Self {
            fqdn: fqdn.to_string(),
            csr: csr.pem().to_string(),
            validity_period,
            product_code: product_code.to_string(),
        }
    }
}

/// 取回的憑證鏈（尚未去除根憑證）與到期日。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedCertificate {
    pub bundle: CertificateBundle,
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValidateNameResponse {
    #[serde(default)]
    success: bool,
    #[serde(rename = "IsQualified", default)]
    is_qualified: bool,
    #[serde(rename = "Message")]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DnsDataResponse {
    #[serde(default = "default_true")]
    success: bool,
    #[serde(rename = "DNSAuthDetails")]
    dns_auth_details: Option<DnsAuthDetails>,
    #[serde(rename = "Message")]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DnsAuthDetails {
    #[serde(rename = "DNSEntry")]
    dns_entry: Option<String>,
    #[serde(rename = "DNSValue")]
    dns_value: Option<String>,
    #[serde(rename = "Example")]
    example: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(default)]
    success: bool,
    #[serde(rename = "CertCenterOrderID")]
    order_id: Option<RequestId>,
    #[serde(rename = "Message")]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderInfoResponse {
    #[serde(default)]
    success: bool,
    #[serde(rename = "OrderInfo")]
    order_info: Option<OrderInfo>,
    #[serde(rename = "Fulfillment")]
    fulfillment: Option<Fulfillment>,
    #[serde(rename = "Message")]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderInfo {
    #[serde(rename = "OrderStatus")]
    order_status: Option<OrderStatus>,
}

#[derive(Debug, Deserialize)]
struct OrderStatus {
    #[serde(rename = "MajorStatus")]
    major_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Fulfillment {
    #[serde(rename = "Certificate")]
    certificate: Option<String>,
    #[serde(rename = "Intermediate")]
    intermediate: Option<String>,
    #[serde(rename = "EndDate")]
    end_date: Option<String>,
}

/// 失敗回應中的訊息欄位。
#[derive(Debug, Deserialize)]
struct ApiFailure {
    #[serde(rename = "Message")]
    message: Option<String>,
}

fn default_true() -> bool {
    true
}

/// CertCenter API 用戶端，獨佔持有令牌快取。
pub struct CertCenterClient<T: Transport, C: Clock> {
    transport: T,
    clock: C,
    settings: CertCenterConfig,
    session: Session,
}

impl<T: Transport, C: Clock> CertCenterClient<T, C> {
    /// 建立一個新的用戶端。
    ///
    /// # 參數
    ///
    /// - `transport`: 送出 HTTP 請求的傳輸層
    /// - `clock`: 用於判斷令牌是否過期
    /// - `settings`: API 位址、憑證資訊與產品代碼
    pub fn new(transport: T, clock: C, settings: CertCenterConfig) -> Self {
        Self {
            transport,
            clock,
            settings,
            session: Session::new(),
        }
    }

    pub fn product_code(&self) -> &str {
        &self.settings.product_code
    }

    /// 以 client credentials 向授權端點取得新的存取令牌並放入快取。
    ///
    /// # 錯誤
    ///
    /// 憑證資訊錯誤、回應缺少令牌或網路失敗時回傳 `ClientError::Auth`。
    pub fn authenticate(&mut self) -> Result<Token> {
        let payload = TokenPayload::new(&self.settings.client_id, &self.settings.client_secret);
        payload
            .validate()
            .map_err(|e| ClientError::Auth(e.to_string()))?;

        let request = HttpRequest::post_json(self.url(TOKEN_PATH), payload.to_json_string()?);
        let response = self
            .transport
            .send(&request)
            .map_err(|e| ClientError::Auth(format!("token request failed: {}", e)))?;

        let status = response.status;
        let body: Option<TokenResponse> = serde_json::from_str(&response.body).ok();
        if !status.is_success() {
            let detail = body
                .and_then(|b| b.error_description.or(b.error))
                .unwrap_or(response.body);
            return Err(ClientError::Auth(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    format!("check client_id / client_secret ({}): {}", status, detail)
                }
                _ => format!("{}: {}", status, detail),
            }));
        }

        let body = body.ok_or_else(|| ClientError::Auth("malformed token response".into()))?;
        let access_token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ClientError::Auth("token response without access_token".into()))?;
        let expires_in = body.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let token = Token::issued_at(access_token, self.clock.now(), expires_in).ok_or_else(|| {
            ClientError::Auth(format!("token response with invalid expires_in {}", expires_in))
        })?;
        log::debug!("Acquired access token, expires at {}", token.expires_at());

        self.session.store(token.clone());
        Ok(token)
    }

    /// 檢查域名是否可申請設定中的產品。
    ///
    /// # 錯誤
    ///
    /// 不符合資格時回傳 `ClientError::IneligibleDomain`。
    pub fn check_eligibility(&mut self, fqdn: &str) -> Result<EligibilityResult> {
        let response: ValidateNameResponse =
            self.post(VALIDATE_NAME_PATH, &ValidateNamePayload::new(fqdn))?;

        if !response.success {
            return Err(ClientError::Api(
                response
                    .message
                    .unwrap_or_else(|| "name validation failed".into()),
            ));
        }
        if !response.is_qualified {
            return Err(ClientError::IneligibleDomain(fqdn.to_string()));
        }

        Ok(EligibilityResult {
            common_name: fqdn.to_string(),
        })
    }

    /// 為 CSR 取得 DNS 驗證資料。
    ///
    /// # 錯誤
    ///
    /// 回應失敗或缺少 `DNSValue` 時回傳 `ClientError::Api`。
    pub fn request_challenge(&mut self, fqdn: &str, csr: &Csr) -> Result<ValidationChallenge> {
        let payload = DnsDataPayload::new(csr.pem(), &self.settings.product_code);
        let response: DnsDataResponse = self.post(DNS_DATA_PATH, &payload)?;

        if !response.success {
            return Err(ClientError::Api(
                response
                    .message
                    .unwrap_or_else(|| "DNS data request failed".into()),
            ));
        }
        let details = response
            .dns_auth_details
            .ok_or_else(|| ClientError::Api("response without DNSAuthDetails".into()))?;
        let value = details
            .dns_value
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ClientError::Api("response without DNSValue".into()))?;

        Ok(ValidationChallenge::txt(
            fqdn,
            details.dns_entry.as_deref(),
            &value,
            details.example,
        ))
    }

    /// 提交 CSR 下單。不會自動重試，重複提交可能產生重複的付費訂單。
    pub fn submit_csr(&mut self, request: &CertificateRequest) -> Result<RequestId> {
        let payload = OrderPayload::new(
            &request.product_code,
            &request.csr,
            request.validity_period,
        );
        let response: OrderResponse = self.post(ORDER_PATH, &payload)?;

        if !response.success {
            return Err(ClientError::Api(
                response
                    .message
                    .unwrap_or_else(|| "certificate request failed".into()),
            ));
        }
        response
            .order_id
            .ok_or_else(|| ClientError::Api("order response without CertCenterOrderID".into()))
    }

    /// 取回已簽發的憑證。
    ///
    /// # 錯誤
    ///
    /// 仍在簽發中時回傳 `ClientError::NotReady`，呼叫端可稍後重試。
    pub fn retrieve_certificate(&mut self, id: RequestId) -> Result<RetrievedCertificate> {
        let path = format!("{}/{}?includeFulfillment=True", ORDER_PATH, id);
        let response: OrderInfoResponse = self.get(&path)?;

        if !response.success {
            return Err(ClientError::Api(
                response
                    .message
                    .unwrap_or_else(|| format!("cannot fetch order {}", id)),
            ));
        }

        let major_status = response
            .order_info
            .and_then(|info| info.order_status)
            .and_then(|status| status.major_status);
        if let Some(status) = &major_status {
            if matches!(status.to_uppercase().as_str(), "CANCELLED" | "REVOKED") {
                return Err(ClientError::Api(format!("order {} is {}", id, status)));
            }
        }

        let fulfillment = match response.fulfillment {
            Some(f) if f.certificate.as_deref().is_some_and(|c| !c.trim().is_empty()) => f,
            _ => return Err(ClientError::NotReady(id)),
        };

        let bundle = CertificateBundle::from_parts(
            fulfillment.certificate.as_deref().unwrap_or_default(),
            fulfillment.intermediate.as_deref().unwrap_or_default(),
        )?;

        Ok(RetrievedCertificate {
            bundle,
            end_date: fulfillment.end_date,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.api_base.trim_end_matches('/'), path)
    }

    /// 取得可用的令牌：快取有效時直接使用，否則重新認證。
    fn access_token(&mut self) -> Result<String> {
        if let Some(token) = self.session.current(self.clock.now()) {
            log::debug!("Using cached access token");
            return Ok(token.access_token().to_string());
        }
        Ok(self.authenticate()?.access_token().to_string())
    }

    /// 附帶令牌送出請求；收到 401 時丟棄令牌、重新認證並重送一次。
    fn send_authorized(
        &mut self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<HttpResponse> {
        let url = self.url(path);
        let mut retried = false;

        loop {
            let token = self.access_token()?;
            let request = HttpRequest {
                method,
                url: url.clone(),
                bearer: Some(token),
                body: body.clone(),
            };
            let response = self.transport.send(&request)?;

            if response.status != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            self.session.invalidate();
            if retried {
                return Err(ClientError::Auth(format!(
                    "access token rejected by {} after re-authentication",
                    path
                )));
            }
            log::info!("Access token rejected, re-authenticating");
            retried = true;
        }
    }

    fn post<P: PayloadT, R: DeserializeOwned>(&mut self, path: &str, payload: &P) -> Result<R> {
        payload
            .validate()
            .map_err(|e| ClientError::InvalidPayload(e.to_string()))?;
        let body = payload.to_json_string()?;
        let response = self.send_authorized(Method::Post, path, Some(body))?;
        parse_response(response)
    }

    fn get<R: DeserializeOwned>(&mut self, path: &str) -> Result<R> {
        let response = self.send_authorized(Method::Get, path, None)?;
        parse_response(response)
    }
}

fn parse_response<R: DeserializeOwned>(response: HttpResponse) -> Result<R> {
    if !response.status.is_success() {
        let message = serde_json::from_str::<ApiFailure>(&response.body)
            .ok()
            .and_then(|f| f.message)
            .unwrap_or(response.body);
        return Err(ClientError::Api(format!("{}: {}", response.status, message)));
    }
    Ok(serde_json::from_str(&response.body)?)
}
