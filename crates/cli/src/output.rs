//! Terminal rendering for run summaries and reports

use std::collections::BTreeMap;

use anyhow::Result;
use colored::Colorize;
use herald::{Adaptation, RunSummary, ValidationVerdict};
use serde::Serialize;

use crate::commands::DoctorReport;
use crate::OutputFormat;

/// Prints `value` as pretty JSON, or through `text` for the text format.
pub fn emit<T: Serialize>(value: &T, format: OutputFormat, text: impl FnOnce(&T)) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => text(value),
    }
    Ok(())
}

fn mark(ok: bool) -> colored::ColoredString {
    if ok {
        "✓".green()
    } else {
        "✗".red()
    }
}

pub fn print_rejection(reason: &str, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "status": "rejected",
                "reason": reason,
            }))?
        ),
        OutputFormat::Text => println!("{} {}", "Rejected:".red().bold(), reason),
    }
    Ok(())
}

pub fn print_verdict(verdict: &ValidationVerdict) {
    let label = if verdict.is_eligible {
        "eligible".green().bold()
    } else {
        "not eligible".red().bold()
    };
    println!("{} {}", mark(verdict.is_eligible), label);
    println!("  {}", verdict.reason.dimmed());
    if verdict.fail_open {
        println!("  {}", "classifier unavailable, allowed by policy".yellow());
    }
}

pub fn print_adaptations(adaptations: &BTreeMap<String, Adaptation>) {
    for (network, adaptation) in adaptations {
        println!();
        println!("{} {}", mark(adaptation.is_ok()), network.bright_white().bold());
        match &adaptation.error {
            Some(error) => println!("  {}", error.red()),
            None => {
                for line in adaptation.text.lines() {
                    println!("  {}", line);
                }
                if !adaptation.hashtags.is_empty() {
                    println!("  {}", adaptation.hashtags.join(" ").cyan());
                }
                if let Some(hook) = &adaptation.video_hook {
                    println!("  {} {}", "hook:".dimmed(), hook);
                }
                if let Some(prompt) = &adaptation.image_prompt {
                    println!("  {} {}", "image:".dimmed(), prompt);
                }
            }
        }
    }
}

pub fn print_summary(summary: &RunSummary) {
    println!(
        "{} {}",
        "Run".bright_cyan().bold(),
        summary.run_id.to_string().dimmed()
    );
    if summary.validation.fail_open {
        println!("  {}", "validation skipped: classifier unavailable".yellow());
    }

    for (network, result) in &summary.results {
        let detail = if result.is_success() {
            result
                .link
                .clone()
                .or_else(|| result.post_id.clone())
                .unwrap_or_else(|| "published".to_string())
        } else {
            format!(
                "{} ({})",
                result.error_detail.as_deref().unwrap_or("failed"),
                result
                    .failure_kind
                    .map(|k| k.to_string())
                    .unwrap_or_default()
            )
        };
        println!("  {} {:<10} {}", mark(result.is_success()), network, detail);
    }

    println!(
        "  {}/{} published, {} failed, {} skipped in {:.1}s",
        summary.success_count.to_string().green(),
        summary.total_requested,
        summary.failure_count,
        summary.skipped_count,
        summary.duration_seconds
    );
}

pub fn print_doctor(report: &DoctorReport) {
    println!("{}", "Networks".bright_cyan().bold());
    for network in &report.configured_networks {
        println!("  {} {}", mark(true), network);
    }
    for network in &report.missing_networks {
        println!("  {} {} {}", mark(false), network, "(credentials missing)".dimmed());
    }

    println!("{}", "Services".bright_cyan().bold());
    println!("  {} llm", mark(report.llm_key_present));
    for (name, present) in &report.services {
        println!("  {} {}", mark(*present), name);
    }

    println!("{}", "Media tools".bright_cyan().bold());
    println!("  {} ffmpeg", mark(report.media_tools.is_ready()));
}
