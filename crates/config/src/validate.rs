//! Configuration validation.
//!
//! Reports unknown fields, unparsable targets, unresolved `${ENV}`
//! placeholders and timing values that would stall dispatch.

use std::path::{Path, PathBuf};

use herald_channels::Target;

use crate::{
    env_subst::unresolved_placeholders,
    loader::{find_config_file, parse_config, parse_config_value, read_substituted},
    schema::HeraldConfig,
};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "target", "timing", "env"
    pub category: &'static str,
    /// Dotted path, e.g. "modules.players.targets[1]"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

const TOP_LEVEL_KEYS: &[&str] = &["dispatch", "metrics", "modules"];
const DISPATCH_KEYS: &[&str] = &["debounce_ms", "accumulator_flush_ms"];
const METRICS_KEYS: &[&str] = &["enabled", "labels"];
const MODULE_KEYS: &[&str] = &["enabled", "targets", "debounce_ms"];

/// Validate a config file. With `None`, the standard locations are searched
/// and the defaults are validated when nothing is found.
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = path.map(Path::to_path_buf).or_else(find_config_file);
    let Some(ref file) = config_path else {
        return ValidationResult {
            diagnostics: validate_config(&HeraldConfig::default()),
            config_path: None,
        };
    };

    let mut diagnostics = Vec::new();
    let raw = match read_substituted(file) {
        Ok(raw) => raw,
        Err(e) => {
            diagnostics.push(Diagnostic::new(Severity::Error, "syntax", "", e.to_string()));
            return ValidationResult {
                diagnostics,
                config_path,
            };
        },
    };

    for name in unresolved_placeholders(&raw) {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "env",
            "",
            format!("environment variable {name} is not set"),
        ));
    }

    match parse_config_value(&raw, file) {
        Ok(value) => check_unknown_fields(&value, &mut diagnostics),
        Err(e) => {
            diagnostics.push(Diagnostic::new(Severity::Error, "syntax", "", e.to_string()));
            return ValidationResult {
                diagnostics,
                config_path,
            };
        },
    }

    match parse_config(&raw, file) {
        Ok(cfg) => diagnostics.extend(validate_config(&cfg)),
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            e.to_string(),
        )),
    }

    diagnostics.sort_by(|a, b| a.severity.cmp(&b.severity).then(a.path.cmp(&b.path)));
    ValidationResult {
        diagnostics,
        config_path,
    }
}

/// Semantic checks on an already-parsed config.
pub fn validate_config(cfg: &HeraldConfig) -> Vec<Diagnostic> {
    let mut out = Vec::new();

    if cfg.dispatch.debounce_ms == 0 {
        out.push(Diagnostic::new(
            Severity::Error,
            "timing",
            "dispatch.debounce_ms",
            "debounce delay must be greater than zero",
        ));
    }
    if cfg.dispatch.accumulator_flush_ms == 0 {
        out.push(Diagnostic::new(
            Severity::Error,
            "timing",
            "dispatch.accumulator_flush_ms",
            "accumulator window must be greater than zero",
        ));
    }

    for (name, module) in &cfg.modules {
        if module.debounce_ms == Some(0) {
            out.push(Diagnostic::new(
                Severity::Error,
                "timing",
                format!("modules.{name}.debounce_ms"),
                "debounce delay must be greater than zero",
            ));
        }
        for (idx, raw) in module.targets.iter().enumerate() {
            if raw.parse::<Target>().is_err() {
                out.push(Diagnostic::new(
                    Severity::Warning,
                    "target",
                    format!("modules.{name}.targets[{idx}]"),
                    format!("\"{raw}\" is not a target (expected channel:<id> or dm:<id>)"),
                ));
            }
        }
        if module.enabled && cfg.targets_for(name).is_empty() {
            out.push(Diagnostic::new(
                Severity::Info,
                "target",
                format!("modules.{name}"),
                "module is enabled but has no valid targets; it will stay idle",
            ));
        }
    }

    out
}

fn check_unknown_fields(value: &serde_json::Value, out: &mut Vec<Diagnostic>) {
    let Some(root) = value.as_object() else {
        out.push(Diagnostic::new(
            Severity::Error,
            "syntax",
            "",
            "top level must be a table",
        ));
        return;
    };

    for (key, child) in root {
        match key.as_str() {
            "dispatch" => check_keys(child, "dispatch", DISPATCH_KEYS, out),
            "metrics" => check_keys(child, "metrics", METRICS_KEYS, out),
            "modules" => {
                if let Some(modules) = child.as_object() {
                    for (name, module) in modules {
                        check_keys(module, &format!("modules.{name}"), MODULE_KEYS, out);
                    }
                }
            },
            other => out.push(unknown(other, TOP_LEVEL_KEYS)),
        }
    }
}

fn check_keys(value: &serde_json::Value, prefix: &str, known: &[&str], out: &mut Vec<Diagnostic>) {
    let Some(table) = value.as_object() else {
        return;
    };
    for key in table.keys() {
        if !known.contains(&key.as_str()) {
            let mut diag = unknown(key, known);
            diag.path = format!("{prefix}.{key}");
            out.push(diag);
        }
    }
}

fn unknown(key: &str, known: &[&str]) -> Diagnostic {
    let message = match suggest(key, known) {
        Some(hint) => format!("unknown field \"{key}\" (did you mean \"{hint}\"?)"),
        None => format!("unknown field \"{key}\""),
    };
    Diagnostic::new(Severity::Warning, "unknown-field", key, message)
}

/// Closest known key within edit distance 2.
fn suggest<'a>(key: &str, known: &[&'a str]) -> Option<&'a str> {
    known
        .iter()
        .map(|k| (*k, levenshtein(key, k)))
        .filter(|(_, d)| *d <= 2)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| k)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut cur = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        prev = cur;
    }
    prev[b.len()]
}
