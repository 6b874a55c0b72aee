//! request_cert - 透過 CertCenter 以 DNS 驗證申請 DV 憑證

use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;

use request_cert::{
    clock::SystemClock,
    config::Config,
    resolver::DohResolver,
    transport::HttpTransport,
    waiter::{AutoConfirm, ConsolePrompt, Prompt},
    workflow::{IssueOptions, Issuer, Output},
};

/// 命令列參數
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Fully qualified domain name to certify
    #[arg(long)]
    fqdn: String,

    /// Path to the PEM encoded CSR
    #[arg(long)]
    csr: PathBuf,

    /// Certificate validity in days (1-365), overrides the config file
    #[arg(long)]
    validity: Option<u32>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file path (default: ./request_cert.toml)
    #[arg(short, long, env = "REQUEST_CERT_CONFIG")]
    config: Option<PathBuf>,

    /// Write the certificate chain to this file instead of stdout
    #[arg(short, long, conflicts_with = "output_dir")]
    output: Option<PathBuf>,

    /// Write <fqdn>_cert.pem and <fqdn>_cert-chained.pem into this directory
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Do not wait for confirmation; the TXT record is already published
    #[arg(short, long)]
    yes: bool,

    /// Language of the DNS instructions (en, zh-tw)
    #[arg(long, default_value = "en", value_parser = ["en", "zh-tw"])]
    lang: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    log::debug!("Using configuration: {:?}", config);

    let transport =
        HttpTransport::new(config.api_timeout()).context("Failed to build HTTP client")?;
    let resolver = DohResolver::new(config.dns.resolver_url.clone(), config.dns_timeout())
        .context("Failed to build DNS resolver")?;
    let prompt: &dyn Prompt = if args.yes { &AutoConfirm } else { &ConsolePrompt };

    let output = match (args.output, args.output_dir) {
        (Some(path), _) => Output::File(path),
        (None, Some(dir)) => Output::Directory(dir),
        (None, None) => Output::Stdout,
    };
    let options = IssueOptions {
        fqdn: args.fqdn,
        csr_path: args.csr,
        validity: args.validity,
        output,
        lang: args.lang,
    };

    let issued = Issuer::new(config, transport, &resolver, prompt, &SystemClock)
        .run(&options)
        .with_context(|| format!("Certificate request for {} failed", options.fqdn))?;

    log::info!(
        "Order {} completed{}",
        issued.request_id,
        issued
            .end_date
            .map(|d| format!(", valid until {}", d))
            .unwrap_or_default()
    );
    Ok(())
}
