//! 憑證鏈的整理與輸出。
//!
//! 上游回傳的中繼憑證文字可能夾帶根憑證與多餘空行，這裡把它們拆成獨立的 PEM 區塊，
//! 去掉自簽的根憑證後，輸出「葉憑證 + 中繼憑證」且不含任何空行的鏈。
//! 上游格式曾在未通知的情況下改變，根憑證的判斷只能盡力而為。

use thiserror::Error;

use crate::certificate::Certificate;

/// 整理憑證鏈時可能發生的錯誤。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BundleError {
    #[error("No certificate found in the response")]
    MissingLeaf,
    #[error("Unterminated PEM block starting with {0:?}")]
    UnterminatedBlock(String),
}

type Result<T> = std::result::Result<T, BundleError>;

/// 葉憑證與依序排列的中繼憑證。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    leaf: String,
    intermediates: Vec<String>,
}

impl CertificateBundle {
    /// 由上游的葉憑證文字與中繼憑證文字建立。
    ///
    /// 葉憑證欄位若含有多個區塊，第一個視為葉憑證，其餘依序排在中繼憑證之前。
    pub fn from_parts(leaf_text: &str, intermediate_text: &str) -> Result<Self> {
        Self::from_entries([leaf_text, intermediate_text])
    }

    /// 由依序排列的鏈項目建立，第一個 PEM 區塊為葉憑證。空白項目會被略過。
    pub fn from_entries<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut blocks = Vec::new();
        for entry in entries {
            blocks.extend(split_pem_blocks(entry.as_ref())?);
        }

        let mut blocks = blocks.into_iter();
        let leaf = blocks.next().ok_or(BundleError::MissingLeaf)?;

        Ok(Self {
            leaf,
            intermediates: blocks.collect(),
        })
    }

    /// 移除中繼憑證中的自簽根憑證。
    ///
    /// 無法解析為 X.509 的區塊會保留下來並記錄警告。
    pub fn without_root(self) -> Self {
        let intermediates = self
            .intermediates
            .into_iter()
            .filter(|pem| match Certificate::new(pem).and_then(|c| c.is_self_signed()) {
                Ok(true) => {
                    log::debug!("Dropping self-signed root certificate from chain");
                    false
                }
                Ok(false) => true,
                Err(e) => {
                    log::warn!("Keeping unparsable chain entry: {}", e);
                    true
                }
            })
            .collect();

        Self {
            leaf: self.leaf,
            intermediates,
        }
    }

    pub fn leaf(&self) -> &str {
        &self.leaf
    }

    pub fn intermediates(&self) -> &[String] {
        &self.intermediates
    }

    /// 葉憑證與中繼憑證依序串接的 PEM 文字。
    pub fn chain_pem(&self) -> String {
        let mut out = self.leaf.clone();
        for intermediate in &self.intermediates {
            out.push_str(intermediate);
        }
        out
    }
}

/// 將文字拆成獨立的 PEM 區塊。
///
/// 每行去除前後空白，空行被丟棄；區塊以換行結尾。區塊之外的非空文字會被忽略。
pub fn split_pem_blocks(text: &str) -> Result<Vec<String>> {
    let mut blocks = Vec::new();
    let mut current: Option<String> = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match current.as_mut() {
            None if line.starts_with("-----BEGIN ") => {
                current = Some(format!("{}\n", line));
            }
            None => {
                log::debug!("Ignoring text outside PEM block: {}", line);
            }
            Some(block) => {
                block.push_str(line);
                block.push('\n');
                if line.starts_with("-----END ") {
                    blocks.extend(current.take());
                }
            }
        }
    }

    match current {
        Some(block) => Err(BundleError::UnterminatedBlock(
            block.lines().next().unwrap_or_default().to_string(),
        )),
        None => Ok(blocks),
    }
}
