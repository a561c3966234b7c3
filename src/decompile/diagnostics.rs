use crate::util::Offset;
use std::fmt;

/// Problem found while analyzing a method that did not stop the analysis
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// Instruction the problem was detected at
    pub address: Offset,
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Constraints on a value or variable had nothing in common (the loosest type is kept)
    TypeConflict,

    /// A referenced class had to be given a guessed hierarchy
    HierarchyUnavailable,

    /// Some of the control flow could only be expressed with explicit jumps
    StructuringFailure,

    /// A type kept narrowing past the per-node bound
    RecursiveTypeNarrowing,
}

impl DiagnosticKind {
    pub fn severity(self) -> Severity {
        match self {
            DiagnosticKind::TypeConflict | DiagnosticKind::RecursiveTypeNarrowing => {
                Severity::Error
            }
            DiagnosticKind::HierarchyUnavailable | DiagnosticKind::StructuringFailure => {
                Severity::Warning
            }
        }
    }

    fn label(self) -> &'static str {
        match self {
            DiagnosticKind::TypeConflict => "type-conflict",
            DiagnosticKind::HierarchyUnavailable => "hierarchy-unavailable",
            DiagnosticKind::StructuringFailure => "structuring-failure",
            DiagnosticKind::RecursiveTypeNarrowing => "recursive-type-narrowing",
        }
    }
}

impl Diagnostic {
    /// New diagnostic, logged as a warning as it gets created
    pub fn new(kind: DiagnosticKind, address: Offset, message: String) -> Diagnostic {
        log::warn!("{} [{}] {}", address, kind.label(), message);
        Diagnostic {
            address,
            severity: kind.severity(),
            kind,
            message,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(
            f,
            "{} {} [{}]: {}",
            self.address,
            severity,
            self.kind.label(),
            self.message
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        let diagnostic = Diagnostic::new(
            DiagnosticKind::StructuringFailure,
            Offset(12),
            String::from("irreducible loop"),
        );
        assert_eq!(diagnostic.severity, Severity::Warning);
        assert_eq!(
            diagnostic.to_string(),
            "@12 warning [structuring-failure]: irreducible loop"
        );
    }
}
