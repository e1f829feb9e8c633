//! Result rendering for the CLI: colored table, JSON, saved text file

use std::fmt::Write as _;
use std::path::Path;

use colored::Colorize;

use crate::device_info::{AuthStatus, DeviceReport};
use crate::error::Result;

fn status_label(report: &DeviceReport) -> String {
    match (report.status, report.scheme) {
        (AuthStatus::Success, Some(scheme)) => format!("success({})", scheme),
        (status, _) => status.as_str().to_string(),
    }
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}

/// Human-readable table; diagnostics and stream URIs only with `verbose`
pub fn render_table(reports: &[DeviceReport], verbose: bool) -> String {
    let mut out = String::new();
    if reports.is_empty() {
        let _ = writeln!(out, "{}", "No ONVIF devices found".yellow());
        return out;
    }

    let _ = writeln!(
        out,
        "{}",
        format!(
            "{:<4} {:<16} {:<6} {:<24} {:<20} {:<10} {:<4} {}",
            "#", "ADDRESS", "PORT", "NAME", "AUTH", "USER", "CH", "XADDR"
        )
        .bold()
    );

    for (i, r) in reports.iter().enumerate() {
        let label = format!("{:<20}", status_label(r));
        let label = match r.status {
            AuthStatus::Success => label.green(),
            AuthStatus::AuthRequired | AuthStatus::CredentialsRejected => label.yellow(),
            AuthStatus::Unreachable => label.red(),
        };
        let _ = writeln!(
            out,
            "{:<4} {:<16} {:<6} {:<24} {} {:<10} {:<4} {}",
            i + 1,
            r.candidate.address,
            r.candidate.port,
            or_dash(&r.name),
            label,
            or_dash(r.username.as_deref().unwrap_or_default()),
            r.channels.len(),
            r.candidate.xaddr
        );

        if verbose {
            for ch in &r.channels {
                let _ = writeln!(
                    out,
                    "       ch{} {} [{}] {}",
                    ch.index,
                    ch.name,
                    ch.profile_token,
                    ch.stream_uri.as_deref().unwrap_or("-")
                );
            }
            if let Some(err) = &r.error {
                let _ = writeln!(out, "       {}", err.red());
            }
            for d in &r.diagnostics {
                let _ = writeln!(out, "       {}", d.dimmed());
            }
        }
    }

    let ok = reports
        .iter()
        .filter(|r| r.status == AuthStatus::Success)
        .count();
    let _ = writeln!(
        out,
        "\n{} device(s), {} authenticated",
        reports.len(),
        ok
    );
    out
}

pub fn render_json(reports: &[DeviceReport]) -> Result<String> {
    Ok(serde_json::to_string_pretty(reports)?)
}

/// Plain tab-separated listing with a generation header
pub fn render_saved(
    reports: &[DeviceReport],
    generated: chrono::DateTime<chrono::Local>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# ONVIF discovery results");
    let _ = writeln!(out, "# Generated: {}", generated.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out, "# Devices: {}", reports.len());
    let _ = writeln!(out, "address\tport\tname\tauth\tuser\tchannels\txaddr");
    for r in reports {
        let _ = writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            r.candidate.address,
            r.candidate.port,
            or_dash(&r.name),
            status_label(r),
            or_dash(r.username.as_deref().unwrap_or_default()),
            r.channels.len(),
            r.candidate.xaddr
        );
        for ch in &r.channels {
            if let Some(uri) = &ch.stream_uri {
                let _ = writeln!(out, "\t\tch{}\t{}\t{}", ch.index, ch.name, uri);
            }
        }
    }
    out
}

pub fn save(path: &Path, reports: &[DeviceReport]) -> Result<()> {
    std::fs::write(path, render_saved(reports, chrono::Local::now()))?;
    tracing::info!(path = %path.display(), devices = reports.len(), "Results saved");
    Ok(())
}
