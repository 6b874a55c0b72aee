use serde::{Deserialize, Serialize};
use std::error::Error;

/// 定義所有 API 載荷（Payload）必須實作的功能。
///
/// 該 trait 要求實作者能夠序列化、反序列化，並提供轉換成 JSON 字串的功能，
/// 同時必須實作自定義的驗證邏輯；用戶端在送出請求前一律先呼叫 [`PayloadT::validate`]。
pub trait PayloadT: Serialize + for<'de> Deserialize<'de> {
    /// 將載荷轉換成 JSON 格式的字串。
    ///
    /// # 錯誤
    ///
    /// 若序列化失敗，則回傳 [`serde_json::Error`]。
    fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// 驗證載荷資料是否符合預期的規範。
    ///
    /// # 錯誤
    ///
    /// 若驗證失敗，則回傳對應的錯誤。
    fn validate(&self) -> Result<(), Box<dyn Error>>;
}

/// 以 client credentials 取得存取令牌所需的載荷。
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPayload {
    grant_type: String,
    client_id: String,
    client_secret: String,
    scope: String,
}

impl TokenPayload {
    /// 令牌申請時使用的權限範圍。
    const SCOPE: &'static str = "order";

    pub fn new(client_id: &str, client_secret: &str) -> Self {
        TokenPayload {
            grant_type: "client_credentials".to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            scope: Self::SCOPE.to_string(),
        }
    }
}

impl PayloadT for TokenPayload {
    /// client_id 與 client_secret 皆不得為空。
    fn validate(&self) -> Result<(), Box<dyn Error>> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err("client_id and client_secret are required".into());
        }
        Ok(())
    }
}

/// 檢查域名是否可申請憑證的載荷。
#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateNamePayload {
    #[serde(rename = "CommonName")]
    pub common_name: String,
}

impl ValidateNamePayload {
    pub fn new(fqdn: &str) -> Self {
        ValidateNamePayload {
            common_name: fqdn.to_string(),
        }
    }
}

impl PayloadT for ValidateNamePayload {
    /// 域名不得為空且不得含有空白字元。
    fn validate(&self) -> Result<(), Box<dyn Error>> {
        validate_fqdn(&self.common_name)
    }
}

/// 取得 DNS 驗證資料（TXT 記錄）的載荷。
#[derive(Debug, Serialize, Deserialize)]
pub struct DnsDataPayload {
    #[serde(rename = "CSR")]
    pub csr: String,
    #[serde(rename = "ProductCode")]
    pub product_code: String,
}

impl DnsDataPayload {
    pub fn new(csr: &str, product_code: &str) -> Self {
        DnsDataPayload {
            csr: csr.to_string(),
            product_code: product_code.to_string(),
        }
    }
}

impl PayloadT for DnsDataPayload {
    fn validate(&self) -> Result<(), Box<dyn Error>> {
        if self.csr.trim().is_empty() {
            return Err("CSR is required".into());
        }
        if self.product_code.is_empty() {
            return Err("Product code is required".into());
        }
        Ok(())
    }
}

/// 下單參數，對應 `OrderParameters` 物件。
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderParameters {
    #[serde(rename = "ProductCode")]
    pub product_code: String,
    #[serde(rename = "CSR")]
    pub csr: String,
    #[serde(rename = "ValidityPeriod")]
    pub validity_period: u32,
    #[serde(rename = "DVAuthMethod")]
    pub dv_auth_method: String,
}

/// 提交 CSR 下單的載荷。
///
/// 驗證方式固定為 `DNS`，與先前取得的 TXT 驗證資料對應。
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderPayload {
    #[serde(rename = "OrderParameters")]
    pub order_parameters: OrderParameters,
}

impl OrderPayload {
    pub fn new(product_code: &str, csr: &str, validity_period: u32) -> Self {
        OrderPayload {
            order_parameters: OrderParameters {
                product_code: product_code.to_string(),
                csr: csr.to_string(),
                validity_period,
                dv_auth_method: "DNS".to_string(),
            },
        }
    }
}

impl PayloadT for OrderPayload {
    /// 驗證下單載荷資料：
    ///
    /// - CSR 與產品代碼不得為空。
    /// - 有效天數必須介於 1 到 365 之間。
    fn validate(&self) -> Result<(), Box<dyn Error>> {
        let params = &self.order_parameters;
        if params.csr.trim().is_empty() {
            return Err("CSR is required".into());
        }
        if params.product_code.is_empty() {
            return Err("Product code is required".into());
        }
        if !(1..=365).contains(&params.validity_period) {
            return Err(format!(
                "Validity period must be between 1 and 365 days, got {}",
                params.validity_period
            )
            .into());
        }
        Ok(())
    }
}

fn validate_fqdn(fqdn: &str) -> Result<(), Box<dyn Error>> {
    if fqdn.is_empty() {
        return Err("Domain name cannot be empty".into());
    }
    if fqdn.chars().any(char::is_whitespace) {
        return Err(format!("Domain name contains whitespace: {:?}", fqdn).into());
    }
    Ok(())
}
