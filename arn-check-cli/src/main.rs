use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use arn_check_core::{run_audit, AuditConfig, ConfigOverrides};
use clap::Parser;
use log::debug;

mod output;

/// Find principal ARNs in S3 bucket policies and IAM role trust policies that
/// no longer exist.
///
/// For every profile, each cross-account principal is installed into the
/// trust policy of a disposable probe role; IAM rejecting it proves the
/// principal is gone. The probe role is deleted at the end of each account.
#[derive(Debug, Parser)]
#[command(name = "arn-check", version, about, long_about)]
struct Cli {
    /// JSON configuration file
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// AWS profile to audit; repeat for several accounts
    #[arg(
        long = "profile",
        short = 'p',
        value_name = "NAME",
        env = "ARN_CHECK_PROFILES",
        value_delimiter = ','
    )]
    profiles: Vec<String>,

    /// Name of the disposable probe role
    #[arg(long, value_name = "NAME")]
    probe_role_name: Option<String>,

    /// Region used for every profile
    #[arg(long)]
    region: Option<String>,

    /// Timeout for each AWS call, in seconds
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// Number of accounts audited at the same time
    #[arg(long)]
    concurrency: Option<usize>,

    /// Abort an account's probe pass after this many consecutive unexpected errors (0 = never)
    #[arg(long, value_name = "N")]
    max_consecutive_failures: Option<usize>,

    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            profiles: self.profiles.clone(),
            probe_role_name: self.probe_role_name.clone(),
            region: self.region.clone(),
            api_timeout_secs: self.timeout_secs,
            concurrency: self.concurrency,
            max_consecutive_failures: self.max_consecutive_failures,
        }
    }

    fn load_config(&self) -> Result<AuditConfig> {
        let base = match &self.config {
            Some(path) => AuditConfig::from_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => AuditConfig::default(),
        };
        let config = base.with_overrides(self.overrides());
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.load_config()?;
    debug!("Effective configuration: {:?}", config);
    output::note(&format!(
        "auditing {} profile(s) with probe role '{}'",
        config.profiles.len(),
        config.probe_role_name
    ));

    let report = run_audit(&config).await.context("Audit failed")?;

    output::print_summary(&report);
    let pretty = cli.pretty || atty::is(atty::Stream::Stdout);
    output::output_report(&report, pretty)?;

    let failed = report.failed_profiles();
    if !failed.is_empty() {
        bail!(
            "{} of {} profile(s) could not be audited: {}",
            failed.len(),
            report.accounts.len(),
            failed.join(", ")
        );
    }
    Ok(())
}
