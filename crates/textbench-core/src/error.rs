//! Core error types.

use thiserror::Error;

use crate::model::{BackendKind, ElementType};

/// Errors raised by every corpus backend.
///
/// The variants are backend-agnostic: driver failures are wrapped in
/// [`CorpusError::Native`] so callers only ever match on this enum.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// No document with the given external id is stored.
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// A document with the given external id is already stored.
    #[error("document already stored: {0}")]
    DuplicateDocument(String),

    /// The element type cannot be counted by this backend or operation.
    #[error("element type {element} cannot be counted by the {backend} backend")]
    TypeNotCountable {
        element: ElementType,
        backend: BackendKind,
    },

    /// Value-based counting requested for a type that carries no value.
    #[error("element type {0} carries no value")]
    TypeHasNoValue(ElementType),

    /// The backend cannot perform the operation at all.
    #[error("{backend} backend does not support {operation}")]
    Unsupported {
        backend: BackendKind,
        operation: &'static str,
    },

    /// The annotated input violates the document model invariants.
    #[error("invalid document {id}: {reason}")]
    InvalidDocument { id: String, reason: String },

    /// Wrapped driver or storage error.
    #[error("{backend} backend error: {source}")]
    Native {
        backend: BackendKind,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl CorpusError {
    /// Wrap a native driver error.
    pub fn native(
        backend: BackendKind,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Native {
            backend,
            source: source.into(),
        }
    }

    /// Shorthand for [`CorpusError::Unsupported`].
    pub fn unsupported(backend: BackendKind, operation: &'static str) -> Self {
        Self::Unsupported { backend, operation }
    }

    /// Shorthand for [`CorpusError::InvalidDocument`].
    pub fn invalid_document(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDocument {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error only reflects a limitation of the backend.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Whether the error is a wrapped driver failure.
    pub fn is_native(&self) -> bool {
        matches!(self, Self::Native { .. })
    }

    /// Stable short name used in reports and logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::DocumentNotFound(_) => "document_not_found",
            Self::DuplicateDocument(_) => "duplicate_document",
            Self::TypeNotCountable { .. } => "type_not_countable",
            Self::TypeHasNoValue(_) => "type_has_no_value",
            Self::Unsupported { .. } => "unsupported",
            Self::InvalidDocument { .. } => "invalid_document",
            Self::Native { .. } => "native",
        }
    }
}

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CorpusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CorpusError::TypeHasNoValue(ElementType::Document);
        assert_eq!(err.to_string(), "element type Document carries no value");

        let err = CorpusError::unsupported(BackendKind::Xml, "store_token");
        assert_eq!(err.to_string(), "xml backend does not support store_token");
        assert!(err.is_unsupported());
        assert_eq!(err.kind_name(), "unsupported");
    }

    #[test]
    fn test_native_wraps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = CorpusError::native(BackendKind::Graph, io);
        assert!(err.is_native());
        assert!(err.to_string().contains("disk on fire"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
