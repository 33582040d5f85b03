use thiserror::Error;

/// Errors raised by the simulated fetchers.
///
/// `Failed` carries the injected failure message and displays it verbatim;
/// the UI renders the text as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("{0}")]
    Failed(String),

    #[error("No page starts at offset {0}")]
    InvalidPageToken(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_displays_message_verbatim() {
        let err = FetchError::Failed("Failed to fetch users from local database".to_string());
        assert_eq!(err.to_string(), "Failed to fetch users from local database");
    }
}
