//! Build diagnostics
//!
//! Every parse or codegen problem is reported as a [`Diagnostic`] with a
//! stable `SB`-prefixed code and a 1-based source position. The wire shape
//! matches what the build service emits.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How severe a diagnostic is
///
/// Hidden diagnostics are recorded internally but never reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Hidden,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Severity::Hidden => "hidden",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(text)
    }
}

/// One reportable problem in a source file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Diagnostic {
    pub filename: String,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
    pub severity: Severity,
    /// Stable code, e.g. "SB0001"
    pub code: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        filename: impl Into<String>,
        line: u32,
        column: u32,
        severity: Severity,
        code: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            line,
            column,
            severity,
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn error(
        filename: impl Into<String>,
        line: u32,
        column: u32,
        code: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::new(filename, line, column, Severity::Error, code, message)
    }

    pub fn warning(
        filename: impl Into<String>,
        line: u32,
        column: u32,
        code: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::new(filename, line, column, Severity::Warning, code, message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({},{}): {} {}: {}",
            self.filename, self.line, self.column, self.severity, self.code, self.message
        )
    }
}

/// Diagnostic codes emitted by the compiler
pub mod codes {
    /// Syntax error
    pub const SYNTAX: &str = "SB0001";
    /// Unknown type name
    pub const UNKNOWN_TYPE: &str = "SB0002";
    /// Duplicate class definition
    pub const DUPLICATE_CLASS: &str = "SB0003";
    /// Unknown identifier in an expression
    pub const UNKNOWN_IDENTIFIER: &str = "SB0004";
    /// `var` is a deprecated alias of `field`
    pub const VAR_DEPRECATED: &str = "SB0100";
    /// Two methods share a name and parameter count
    pub const DUPLICATE_OVERLOAD: &str = "SB0102";
}

/// Drop Hidden diagnostics and report whether any Error remains
pub fn reportable(diagnostics: Vec<Diagnostic>) -> (Vec<Diagnostic>, bool) {
    let visible: Vec<Diagnostic> = diagnostics
        .into_iter()
        .filter(|d| d.severity != Severity::Hidden)
        .collect();
    let failed = visible.iter().any(|d| d.severity == Severity::Error);
    (visible, failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_pascal_case() {
        let diag = Diagnostic::error("player.sb", 3, 7, codes::SYNTAX, "unexpected token");
        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json["Filename"], "player.sb");
        assert_eq!(json["Line"], 3);
        assert_eq!(json["Column"], 7);
        assert_eq!(json["Severity"], "Error");
        assert_eq!(json["Code"], "SB0001");
    }

    #[test]
    fn test_hidden_diagnostics_are_dropped() {
        let hidden = Diagnostic::new("a.sb", 1, 1, Severity::Hidden, "SB9999", "internal");
        let warn = Diagnostic::warning("a.sb", 2, 1, codes::VAR_DEPRECATED, "deprecated");
        let (visible, failed) = reportable(vec![hidden, warn]);
        assert_eq!(visible.len(), 1);
        assert!(!failed);
    }

    #[test]
    fn test_errors_mark_failure() {
        let err = Diagnostic::error("a.sb", 1, 1, codes::SYNTAX, "bad");
        let (_, failed) = reportable(vec![err]);
        assert!(failed);
    }
}
