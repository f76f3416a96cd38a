//! Configuration validation.
//!
//! Parses the config file into an untyped tree, reports unknown or
//! misspelled fields, then checks the typed config for settings that will
//! misbehave at runtime.

use std::path::{Path, PathBuf};

use crate::schema::{HandoverConfig, StoreBackend};

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
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "store", "routing"
    pub category: &'static str,
    /// Dotted path, e.g. "routing.operator_allowlist[0]"
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
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Known sections and their fields.
const SCHEMA: &[(&str, &[&str])] = &[
    ("routing", &[
        "reject_if_no_aggregation",
        "create_dedicated_conversation",
        "operator_allowlist",
    ]),
    ("store", &["backend", "path"]),
];

/// Validate the config at `path`, or the discovered config file when `None`.
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = path
        .map(Path::to_path_buf)
        .or_else(crate::loader::find_config_file);

    let Some(actual_path) = config_path else {
        let mut diagnostics = vec![Diagnostic::new(
            Severity::Info,
            "syntax",
            "",
            "no config file found; using defaults",
        )];
        check_semantics(&HandoverConfig::default(), &mut diagnostics);
        return ValidationResult {
            diagnostics,
            config_path: None,
        };
    };

    let diagnostics = match crate::loader::load_config_value(&actual_path) {
        Ok(value) => validate_value(&value),
        Err(e) => vec![Diagnostic::new(
            Severity::Error,
            "syntax",
            "",
            format!("failed to parse config file: {e}"),
        )],
    };
    ValidationResult {
        diagnostics,
        config_path: Some(actual_path),
    }
}

/// Validate an already-parsed config tree.
pub fn validate_value(value: &serde_json::Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    check_unknown_fields(value, &mut diagnostics);

    match serde_json::from_value::<HandoverConfig>(value.clone()) {
        Ok(config) => check_semantics(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            format!("type error: {e}"),
        )),
    }
    diagnostics
}

fn check_unknown_fields(value: &serde_json::Value, diagnostics: &mut Vec<Diagnostic>) {
    let Some(root) = value.as_object() else {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            "config root must be a table",
        ));
        return;
    };
    let sections: Vec<&str> = SCHEMA.iter().map(|(name, _)| *name).collect();

    for (key, child) in root {
        let Some((_, fields)) = SCHEMA.iter().find(|(name, _)| name == key) else {
            diagnostics.push(unknown_field(key, key, &sections));
            continue;
        };
        let Some(table) = child.as_object() else {
            continue;
        };
        for field in table.keys() {
            if !fields.contains(&field.as_str()) {
                diagnostics.push(unknown_field(&format!("{key}.{field}"), field, fields));
            }
        }
    }
}

fn unknown_field(path: &str, key: &str, candidates: &[&str]) -> Diagnostic {
    let message = match suggest(key, candidates, 3) {
        Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
        None => "unknown field".to_string(),
    };
    Diagnostic::new(Severity::Error, "unknown-field", path, message)
}

fn check_semantics(config: &HandoverConfig, diagnostics: &mut Vec<Diagnostic>) {
    match config.store.backend {
        StoreBackend::Sqlite if config.store.resolved_path().is_none() => {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "store",
                "store.path",
                "sqlite backend needs a path and no user data directory is available",
            ));
        },
        StoreBackend::Memory if config.store.path.is_some() => {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "store",
                "store.path",
                "path is ignored by the memory backend",
            ));
        },
        StoreBackend::Memory => {
            diagnostics.push(Diagnostic::new(
                Severity::Info,
                "store",
                "store.backend",
                "routing state is process-local and lost on restart",
            ));
        },
        StoreBackend::Sqlite => {},
    }

    for (i, pattern) in config.routing.operator_allowlist.iter().enumerate() {
        if pattern.trim().is_empty() {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "routing",
                format!("routing.operator_allowlist[{i}]"),
                "empty pattern never matches",
            ));
        } else if pattern.trim() == "*" {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "routing",
                format!("routing.operator_allowlist[{i}]"),
                "\"*\" lets every account accept connection requests",
            ));
        }
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (*c, levenshtein(needle, c)))
        .filter(|(_, d)| *d <= max_distance)
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c)
}
