//! Mapping of engine errors into [`CorpusError`].

use textbench_core::{BackendKind, CorpusError, Result};

/// Wrap any engine error as [`CorpusError::Native`] for one backend.
pub(crate) trait NativeResultExt<T> {
    fn native(self, backend: BackendKind) -> Result<T>;
}

impl<T, E> NativeResultExt<T> for std::result::Result<T, E>
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn native(self, backend: BackendKind) -> Result<T> {
        self.map_err(|e| CorpusError::native(backend, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_keeps_backend_and_message() {
        let failed: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"));
        let err = failed.native(BackendKind::WideColumn).unwrap_err();
        assert!(err.is_native());
        assert_eq!(err.to_string(), "wide-column backend error: disk gone");
    }
}
