use anyhow::{Context, Result};
use arn_check_core::api::model::ValidationStatus;
use arn_check_core::{AccountResult, AuditReport, CleanupStatus};
use log::debug;
use std::io::{self, Write};

pub(crate) fn note(msg: &str) {
    let _ = writeln!(io::stderr(), "arn-check: {}", msg);
}

pub(crate) fn warn(msg: &str) {
    let _ = writeln!(io::stderr(), "arn-check (warning): {}", msg);
}

/// Human summary on stderr; the JSON report goes to stdout
pub(crate) fn print_summary(report: &AuditReport) {
    let stderr = io::stderr();
    let mut w = stderr.lock();
    let _ = writeln!(w, "arn-check summary");
    for entry in &report.accounts {
        let _ = writeln!(w);
        match &entry.result {
            AccountResult::Failed { error } => {
                let _ = writeln!(w, "Profile:   {} (FAILED)", entry.profile);
                let _ = writeln!(w, "Error:     {}", error);
            }
            AccountResult::Audited(account) => {
                let _ = writeln!(
                    w,
                    "Profile:   {} ({})",
                    entry.profile,
                    account.account_id.as_deref().unwrap_or("unknown account")
                );
                let _ = writeln!(
                    w,
                    "Scanned:   {} buckets, {} roles, {} distinct principals",
                    account.buckets_scanned, account.roles_scanned, account.candidates
                );
                if account.validation == ValidationStatus::NoCandidates {
                    let _ = writeln!(w, "No ARNs found for this profile.");
                    continue;
                }
                let _ = writeln!(
                    w,
                    "Verdicts:  {} non-existent, {} accepted, {} skipped, {} not probed",
                    account.non_existent.len(),
                    account.accepted.len(),
                    account.skipped_principals.len(),
                    account.excluded.len()
                );
                for missing in &account.non_existent {
                    let _ = writeln!(
                        w,
                        "  - {} (referenced by {})",
                        missing.principal,
                        missing.referenced_by.join(", ")
                    );
                }
                for skipped in &account.skipped_resources {
                    let _ = writeln!(w, "  skipped {}: {}", skipped.resource, skipped.reason);
                }
                if let ValidationStatus::Aborted(reason) = &account.validation {
                    let _ = writeln!(w, "Note: {}", reason);
                }
                if let CleanupStatus::Failed { error } = &account.probe_role_cleanup {
                    warn(&format!(
                        "probe role for profile {} could not be deleted: {}",
                        entry.profile, error
                    ));
                }
            }
        }
    }
    let _ = writeln!(w);
    let _ = writeln!(w, "Note: {}", report.note);
}

/// Output the report as JSON to stdout
pub(crate) fn output_report(report: &AuditReport, pretty: bool) -> Result<()> {
    debug!("Formatting audit report as JSON (pretty: {})", pretty);

    let json_output = if pretty {
        serde_json::to_string_pretty(report).context("Failed to serialize report to pretty JSON")?
    } else {
        serde_json::to_string(report).context("Failed to serialize report to JSON")?
    };

    // Output to stdout (not using println! to avoid extra newline in compact mode)
    print!("{}", json_output);
    if pretty {
        println!(); // Add newline for pretty output
    }

    debug!("Report JSON written to stdout");
    Ok(())
}
