use std::{collections::HashMap, fmt, sync::OnceLock};

/// 挑戰要求的 DNS 記錄類型。目前經銷商只核發 TXT 驗證。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    Txt,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Txt => "TXT",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 表示一個網域驗證挑戰：操作者必須在 `record_name` 發布內容為 `expected_value` 的 TXT 記錄。
///
/// 由 API 用戶端建立後即不可變更，交由驗證等待器使用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationChallenge {
    domain: String,
    record_type: RecordType,
    record_name: String,
    expected_value: String,
    id: String,
    example: Option<String>,
}

impl ValidationChallenge {
    /// 未指定記錄名稱時使用的前綴。
    pub const DEFAULT_RECORD_PREFIX: &'static str = "_dnsauth";

    /// 建立一個 TXT 挑戰。
    ///
    /// # 參數
    ///
    /// - `domain`: 要申請憑證的 FQDN
    /// - `record_name`: API 指定的記錄名稱；為 `None` 時使用 `_dnsauth.<domain>`
    /// - `expected_value`: TXT 記錄應包含的值
    /// - `example`: API 提供的區域檔範例（可選）
    pub fn txt(
        domain: &str,
        record_name: Option<&str>,
        expected_value: &str,
        example: Option<String>,
    ) -> Self {
        let record_name = record_name
            .map(|name| name.trim().trim_end_matches('.').to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("{}.{}", Self::DEFAULT_RECORD_PREFIX, domain));
        let id = format!("{}:{}", record_name, expected_value);

        Self {
            domain: domain.to_string(),
            record_type: RecordType::Txt,
            record_name,
            expected_value: expected_value.to_string(),
            id,
            example,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn record_name(&self) -> &str {
        &self.record_name
    }

    pub fn expected_value(&self) -> &str {
        &self.expected_value
    }

    /// 挑戰識別碼，由記錄名稱與期望值組成。
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn example(&self) -> Option<&str> {
        self.example.as_deref()
    }

    /// 判斷解析到的 TXT 值是否符合期望值（完全相符、區分大小寫）。
    ///
    /// 只會去除值外圍的一對雙引號（與部分解析器的輸出格式一致），不去除空白。
    pub fn matches(&self, resolved: &str) -> bool {
        let value = resolved
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(resolved);
        value == self.expected_value
    }

    /// 根據語言取得操作者應執行的步驟說明。
    ///
    /// # 參數
    ///
    /// - `lang`: 語言代碼，例如 "zh-tw" 或 "en"；不支援的代碼會退回英文。
    pub fn get_instructions(&self, lang: &str) -> String {
        let instructions = INSTRUCTIONS.get_or_init(init_instructions);
        let template = instructions
            .get(lang.to_lowercase().as_str())
            .or_else(|| instructions.get("en"))
            .copied()
            .unwrap_or_default();

        let mut text = template
            .replace("{name}", &self.record_name)
            .replace("{type}", self.record_type.as_str())
            .replace("{value}", &self.expected_value);
        if let Some(example) = &self.example {
            text.push_str("\n   ");
            text.push_str(example.trim());
        }
        text
    }
}

/// 靜態儲存各語言的操作指引，僅初始化一次。
static INSTRUCTIONS: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();

fn init_instructions() -> HashMap<&'static str, &'static str> {
    let mut m = HashMap::new();

    m.insert(
        "zh-tw",
        "DNS 驗證步驟：\n\
         1. 新增 {type} 記錄\n\
         2. 主機名稱：{name}\n\
         3. 記錄值：{value}\n\
         4. TTL 建議設為 300 秒\n\
         5. 建立完成後按 Enter 繼續",
    );

    m.insert(
        "en",
        "DNS Validation Steps:\n\
         1. Add a {type} record\n\
         2. Hostname: {name}\n\
         3. Value: {value}\n\
         4. Recommended TTL: 300\n\
         5. Press Enter once the record is created",
    );

    m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_record_name() {
        let challenge = ValidationChallenge::txt("host.domain.com", None, "abc123", None);
        assert_eq!(challenge.record_name(), "_dnsauth.host.domain.com");
        assert_eq!(challenge.record_type(), RecordType::Txt);
        assert_eq!(challenge.domain(), "host.domain.com");
    }

    #[test]
    fn test_api_record_name_is_normalized() {
        let challenge = ValidationChallenge::txt(
            "host.domain.com",
            Some(" _dnsauth.host.domain.com. "),
            "abc123",
            None,
        );
        assert_eq!(challenge.record_name(), "_dnsauth.host.domain.com");

        let blank = ValidationChallenge::txt("a.com", Some("  "), "v", None);
        assert_eq!(blank.record_name(), "_dnsauth.a.com");
    }

    #[test]
    fn test_matches_is_exact_and_case_sensitive() {
        let challenge = ValidationChallenge::txt("a.com", None, "AbC123", None);
        assert!(challenge.matches("AbC123"));
        assert!(challenge.matches("\"AbC123\""));
        assert!(!challenge.matches("abc123"));
        assert!(!challenge.matches("AbC1234"));
        assert!(!challenge.matches(""));
    }

    #[test]
    fn test_matches_does_not_ignore_whitespace() {
        let challenge = ValidationChallenge::txt("a.com", None, "abc123", None);
        assert!(!challenge.matches(" abc123 "));
        assert!(!challenge.matches("\" abc123\""));
        assert!(!challenge.matches("abc123\n"));
        assert!(!challenge.matches("\"\"abc123\"\""));
    }

    #[test]
    fn test_instructions_contain_record_details() {
        let challenge = ValidationChallenge::txt(
            "a.com",
            None,
            "v4lue",
            Some("_dnsauth.a.com. 300 IN TXT \"v4lue\"".into()),
        );
        let en = challenge.get_instructions("en");
        assert!(en.contains("_dnsauth.a.com"));
        assert!(en.contains("v4lue"));
        assert!(en.contains("TXT"));
        assert!(en.contains("300 IN TXT"));

        let zh = challenge.get_instructions("zh-TW");
        assert!(zh.contains("主機名稱：_dnsauth.a.com"));

        assert_eq!(challenge.get_instructions("fr"), en);
    }
}
