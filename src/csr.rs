use std::{fs, io, path::Path, result};

use openssl::{nid::Nid, x509::X509Req};
use thiserror::Error;

/// 用於描述讀取與檢查 CSR（證書簽名請求）過程中可能發生的錯誤。
#[derive(Debug, Error)]
pub enum CsrError {
    #[error("Cannot read CSR file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Invalid CSR: {0}")]
    OpensslError(#[from] openssl::error::ErrorStack),
    #[error("CSR signature does not verify")]
    BadSignature,
    #[error("CSR common name {found:?} does not match requested FQDN {expected:?}")]
    SubjectMismatch { expected: String, found: String },
}

/// 為簡化錯誤處理定義 Result 類型
type Result<T> = result::Result<T, CsrError>;

/// 一份已檢查過的 PEM 格式 CSR。
///
/// 本工具不產生金鑰，CSR 由操作者事先準備；載入時確認它能被解析且自身簽章正確。
#[derive(Debug, Clone)]
pub struct Csr {
    pem: String,
    common_name: Option<String>,
}

impl Csr {
    /// 從檔案讀取 CSR。
    ///
    /// # 錯誤
    ///
    /// 檔案無法讀取時回傳 `CsrError::Io`；內容不是合法 CSR 時回傳 `CsrError::OpensslError`
    /// 或 `CsrError::BadSignature`。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let pem = fs::read_to_string(path).map_err(|source| CsrError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_pem(&pem)
    }

    /// 解析 PEM 字串並驗證 CSR 的簽章。
    pub fn from_pem(pem: &str) -> Result<Self> {
        let req = X509Req::from_pem(pem.trim().as_bytes())?;
        let public_key = req.public_key()?;
        if !req.verify(&public_key)? {
            return Err(CsrError::BadSignature);
        }

        let common_name = req
            .subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .and_then(|entry| entry.data().as_utf8().ok())
            .map(|cn| cn.to_string());

        Ok(Csr {
            pem: format!("{}\n", pem.trim()),
            common_name,
        })
    }

    /// 確認 CSR 的主體 CN 與要申請的 FQDN 相同（不分大小寫）。
    ///
    /// CSR 沒有 CN 時不做檢查。
    pub fn ensure_subject(&self, fqdn: &str) -> Result<()> {
        match &self.common_name {
            Some(cn) if !cn.eq_ignore_ascii_case(fqdn) => Err(CsrError::SubjectMismatch {
                expected: fqdn.to_string(),
                found: cn.clone(),
            }),
            _ => Ok(()),
        }
    }

    pub fn pem(&self) -> &str {
        &self.pem
    }

    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }
}
