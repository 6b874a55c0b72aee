//! 完整的簽發流程：設定檢查、CSR 載入、認證、資格檢查、DNS 驗證、提交、取回與輸出。
//!
//! 每一步失敗都會中止整個流程，不保存任何中間狀態。

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{
    bundle::{BundleError, CertificateBundle},
    certificate::{Certificate, CertificateError},
    client::{CertCenterClient, CertificateRequest, ClientError, RequestId},
    clock::Clock,
    config::{Config, ConfigError},
    csr::{Csr, CsrError},
    resolver::TxtResolver,
    retry::{retry, Outcome},
    transport::Transport,
    waiter::{Prompt, ValidationError, ValidationWaiter, WaiterOptions},
};

/// 簽發流程中任何一步的錯誤。
#[derive(Debug, Error)]
pub enum IssueError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Csr(#[from] CsrError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Bundle(#[from] BundleError),
    #[error("Certificate for order {id} still not issued after {attempts} attempt(s)")]
    NotIssued { id: RequestId, attempts: usize },
    #[error("Cannot write {path}: {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

type Result<T> = std::result::Result<T, IssueError>;

/// 憑證輸出位置。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// 將憑證鏈寫到標準輸出
    Stdout,
    /// 將憑證鏈寫到指定檔案
    File(PathBuf),
    /// 在目錄中寫出 `<fqdn>_cert.pem` 與 `<fqdn>_cert-chained.pem`
    Directory(PathBuf),
}

/// 一次簽發的輸入。
#[derive(Debug, Clone)]
pub struct IssueOptions {
    pub fqdn: String,
    pub csr_path: PathBuf,
    /// 命令列指定的有效天數，優先於設定檔
    pub validity: Option<u32>,
    pub output: Output,
    pub lang: String,
}

/// 簽發成功的結果。
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub request_id: RequestId,
    /// 已去除根憑證的憑證鏈
    pub bundle: CertificateBundle,
    pub end_date: Option<String>,
}

/// 串接各元件的簽發器；所有外部互動都經由注入的元件。
pub struct Issuer<'a, T: Transport> {
    config: Config,
    transport: T,
    resolver: &'a dyn TxtResolver,
    prompt: &'a dyn Prompt,
    clock: &'a dyn Clock,
}

impl<'a, T: Transport> Issuer<'a, T> {
    pub fn new(
        config: Config,
        transport: T,
        resolver: &'a dyn TxtResolver,
        prompt: &'a dyn Prompt,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            config,
            transport,
            resolver,
            prompt,
            clock,
        }
    }

    /// 執行完整的簽發流程。
    ///
    /// # 參數
    ///
    /// - `options`: 要申請的 FQDN、CSR 路徑與輸出位置
    ///
    /// # 錯誤
    ///
    /// 設定與 CSR 的問題會在任何網路請求之前回報。
    pub fn run(self, options: &IssueOptions) -> Result<IssuedCertificate> {
        let Issuer {
            mut config,
            transport,
            resolver,
            prompt,
            clock,
        } = self;

        config.certcenter.cert_validity_period = config.validity_period(options.validity)?;
        config.validate()?;

        let csr = Csr::from_file(&options.csr_path)?;
        csr.ensure_subject(&options.fqdn)?;
        log::info!(
            "Requesting {} certificate for {} ({} days)",
            config.certcenter.product_code,
            options.fqdn,
            config.certcenter.cert_validity_period
        );

        let mut client = CertCenterClient::new(transport, clock, config.certcenter.clone());
        client.authenticate()?;
        client.check_eligibility(&options.fqdn)?;
        log::info!("{} is eligible", options.fqdn);

        let challenge = client.request_challenge(&options.fqdn, &csr)?;
        log::info!("Received DNS challenge for {}", challenge.record_name());

        let waiter = ValidationWaiter::new(
            resolver,
            prompt,
            clock,
            WaiterOptions {
                initial_delay: config.dns_initial_delay(),
                policy: config.dns_policy(),
                lang: options.lang.clone(),
            },
        );
        waiter.wait(&challenge)?;

        let request = CertificateRequest::new(
            &options.fqdn,
            &csr,
            config.certcenter.cert_validity_period,
            &config.certcenter.product_code,
        );
        let id = client.submit_csr(&request)?;
        log::info!("Order {} submitted", id);

        let outcome = retry(&config.retrieval_policy(), clock, |attempt| {
            match client.retrieve_certificate(id) {
                Ok(retrieved) => Ok(Some(retrieved)),
                Err(ClientError::NotReady(_)) => {
                    log::info!("Attempt {}: certificate not issued yet", attempt);
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })?;
        let retrieved = match outcome {
            Outcome::Ready { value, .. } => value,
            Outcome::Exhausted { attempts } => return Err(IssueError::NotIssued { id, attempts }),
        };

        let bundle = retrieved.bundle.without_root();
        write_output(&options.output, &options.fqdn, &bundle)?;
        if let Err(e) = log_expiry(&bundle, clock) {
            log::warn!("Cannot summarize issued certificate: {}", e);
        }

        Ok(IssuedCertificate {
            request_id: id,
            bundle,
            end_date: retrieved.end_date,
        })
    }
}

/// 記錄葉憑證的到期資訊；僅供顯示，失敗不影響簽發結果。
fn log_expiry(
    bundle: &CertificateBundle,
    clock: &dyn Clock,
) -> std::result::Result<(), CertificateError> {
    let leaf = Certificate::new(bundle.leaf())?;
    log::info!(
        "Issued certificate for {} expires {} ({} days remaining)",
        leaf.common_name().unwrap_or_default(),
        leaf.not_after(),
        leaf.days_remaining(clock.now())?
    );
    Ok(())
}

/// 依輸出位置寫出憑證。
pub fn write_output(output: &Output, fqdn: &str, bundle: &CertificateBundle) -> Result<()> {
    match output {
        Output::Stdout => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(bundle.chain_pem().as_bytes())
                .and_then(|_| stdout.flush())
                .map_err(|source| IssueError::FileIo {
                    path: PathBuf::from("<stdout>"),
                    source,
                })
        }
        Output::File(path) => write_file(path, &bundle.chain_pem()),
        Output::Directory(dir) => {
            write_file(&dir.join(format!("{}_cert.pem", fqdn)), bundle.leaf())?;
            write_file(
                &dir.join(format!("{}_cert-chained.pem", fqdn)),
                &bundle.chain_pem(),
            )
        }
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|source| IssueError::FileIo {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("Wrote {}", path.display());
    Ok(())
}
