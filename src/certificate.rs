use chrono::{DateTime, Utc};
use openssl::{
    asn1::Asn1Time,
    nid::Nid,
    x509::{X509VerifyResult, X509},
};
use thiserror::Error;

/// 證書相關操作可能出現的錯誤類型
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("Failed to parse certificate: {0}")]
    ParseError(#[from] openssl::error::ErrorStack),
}

/// 自定義結果型別，錯誤類型為 `CertificateError`
type Result<T> = std::result::Result<T, CertificateError>;

/// X.509 證書封裝結構，提供鏈格式整理與結果摘要所需的查詢
pub struct Certificate {
    /// 內部使用的 X509 證書對象
    pub cert: X509,
}

impl Certificate {
    /// 建立一個 `Certificate` 實例
    ///
    /// 根據傳入的 PEM 格式字串解析生成 X.509 證書，若格式錯誤將回傳對應錯誤。
    ///
    /// # 參數
    ///
    /// - `pem`: 包含證書資訊的 PEM 格式字串
    pub fn new(pem: &str) -> Result<Self> {
        let cert = X509::from_pem(pem.as_bytes())?;
        Ok(Certificate { cert })
    }

    /// 判斷證書是否為自簽（根憑證）
    ///
    /// 主體與簽發者名稱相同，且簽章可用自身公鑰驗證時才視為自簽。
    pub fn is_self_signed(&self) -> Result<bool> {
        if self.cert.issued(&self.cert) != X509VerifyResult::OK {
            return Ok(false);
        }
        let public_key = self.cert.public_key()?;
        Ok(self.cert.verify(&public_key)?)
    }

    /// 取得主體的 Common Name（若存在）
    pub fn common_name(&self) -> Option<String> {
        self.cert
            .subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .and_then(|entry| entry.data().as_utf8().ok())
            .map(|cn| cn.to_string())
    }

    /// 以文字表示的到期時間，例如 `Jan  1 00:00:00 2027 GMT`
    pub fn not_after(&self) -> String {
        self.cert.not_after().to_string()
    }

    /// 計算從 `now` 起算證書剩餘的完整天數；已過期時為負值
    pub fn days_remaining(&self, now: DateTime<Utc>) -> Result<i64> {
        let now_asn1 = Asn1Time::from_unix(now.timestamp())?;
        let diff = now_asn1.diff(self.cert.not_after())?;
        Ok(diff.days as i64)
    }
}
