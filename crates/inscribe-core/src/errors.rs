//! Typed pipeline errors.
//!
//! Every error names the step that failed and the group or batch it concerns.
//! All kinds are fatal; oversized groups are reported through
//! [`SizeViolation`](crate::pack::SizeViolation) instead.

use serde::Serialize;

/// Pipeline error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// A group is missing, unreadable, or its size cannot be computed.
    Input,
    /// Canonicalization of a batch's content failed.
    Serialization,
    /// The compression step failed.
    Compression,
    /// Hash computation or hash verification failed.
    Integrity,
    /// Writing an artifact or the manifest failed.
    Io,
    /// Invalid configuration.
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Input => "InputError",
            Self::Serialization => "SerializationError",
            Self::Compression => "CompressionError",
            Self::Integrity => "IntegrityError",
            Self::Io => "IoError",
            Self::Config => "ConfigError",
        };
        f.write_str(name)
    }
}

/// Pipeline step in which an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Config,
    Load,
    Pack,
    Canonicalize,
    Compress,
    Hash,
    Persist,
    Index,
    Export,
    Verify,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Config => "config",
            Self::Load => "load",
            Self::Pack => "pack",
            Self::Canonicalize => "canonicalize",
            Self::Compress => "compress",
            Self::Hash => "hash",
            Self::Persist => "persist",
            Self::Index => "index",
            Self::Export => "export",
            Self::Verify => "verify",
        };
        f.write_str(name)
    }
}

/// Result alias for pipeline operations.
pub type PackResult<T> = Result<T, PackError>;

/// Typed pipeline error with the offending subject and step.
#[derive(Debug, thiserror::Error)]
#[error("{kind} at step '{step}' for '{subject}': {message}")]
pub struct PackError {
    pub kind: ErrorKind,
    pub step: Step,
    /// Group id, batch id, or path the error concerns.
    pub subject: String,
    pub message: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl PackError {
    pub fn new(
        kind: ErrorKind,
        step: Step,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            step,
            subject: subject.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn input(group_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Input, Step::Load, group_id, message)
    }

    pub fn serialization(batch_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Serialization,
            Step::Canonicalize,
            batch_id,
            message,
        )
    }

    pub fn compression(batch_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Compression, Step::Compress, batch_id, message)
    }

    pub fn integrity(step: Step, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Integrity, step, subject, message)
    }

    pub fn io(step: Step, subject: impl Into<String>, err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, step, subject, err.to_string()).with_source(err)
    }

    pub fn config(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, Step::Config, subject, message)
    }

    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.message = format!("{}: {}", context.into(), self.message);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Suggested exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self.kind {
            ErrorKind::Integrity | ErrorKind::Serialization | ErrorKind::Compression => 1,
            ErrorKind::Input | ErrorKind::Config => 2,
            ErrorKind::Io => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_kind_step_and_subject() {
        let err = PackError::input("tarot", "group file missing");
        let text = err.to_string();
        assert!(text.contains("InputError"));
        assert!(text.contains("'load'"));
        assert!(text.contains("'tarot'"));
        assert!(text.contains("group file missing"));
    }

    #[test]
    fn test_with_context_prefixes_message() {
        let err = PackError::serialization("batch_001", "bad float").with_context("group runes");
        assert_eq!(err.message, "group runes: bad float");
        assert_eq!(err.step, Step::Canonicalize);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(PackError::input("g", "x").exit_code(), 2);
        assert_eq!(PackError::config("parallel", "x").exit_code(), 2);
        assert_eq!(
            PackError::integrity(Step::Verify, "batch_001", "x").exit_code(),
            1
        );
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(PackError::io(Step::Persist, "out", io).exit_code(), 3);
    }

    #[test]
    fn test_io_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = PackError::io(Step::Export, "manifest.json", io);
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.source.is_some());
    }
}
