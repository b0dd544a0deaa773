use std::path::Path;

use {
    anyhow::{Result, bail},
    herald_config::{Severity, ValidationResult, validate},
};

const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Validate the configuration and print diagnostics to stderr. Fails when
/// any diagnostic is an error.
pub fn check(path: Option<&Path>, verbose: bool) -> Result<()> {
    let result = validate::validate(path);

    match result.config_path {
        Some(ref path) => eprintln!("Checking {}\n", path.display()),
        None => eprintln!("No config file found; checking defaults.\n"),
    }

    let lines = render(&result, verbose);
    for line in &lines {
        eprintln!("  {line}");
    }
    if !lines.is_empty() {
        eprintln!();
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);
    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        bail!("configuration has {errors} error(s)");
    }
    Ok(())
}

fn render(result: &ValidationResult, verbose: bool) -> Vec<String> {
    result
        .diagnostics
        .iter()
        .filter(|d| verbose || d.severity != Severity::Info)
        .map(|d| {
            let color = match d.severity {
                Severity::Error => RED,
                Severity::Warning => YELLOW,
                Severity::Info => CYAN,
            };
            let label = d.severity;
            if d.path.is_empty() {
                format!("{BOLD}{color}{label}{RESET} {}", d.message)
            } else {
                format!("{BOLD}{color}{label}{RESET} {}: {}", d.path, d.message)
            }
        })
        .collect()
}
