// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for remote backend calls.

/// An error from a remote backend call.
///
/// The variants classify the failure for logging purposes only. The cache layer treats all
/// of them the same way: the call failed and the backend may be unhealthy.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No remote backend was configured for this process.
    #[error("no remote backend is configured")]
    NotConfigured,

    /// The backend could not be reached or rejected the call.
    #[error("remote backend is unreachable")]
    Unreachable(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The backend did not answer in time.
    #[error("remote backend call timed out")]
    Timeout,

    /// The backend answered with something the adapter did not expect.
    #[error("unexpected response from remote backend: {0}")]
    Protocol(String),
}

impl Error {
    /// Creates an [`Error::Unreachable`] from any error or message.
    ///
    /// # Examples
    ///
    /// ```
    /// use lifeboat_remote::Error;
    ///
    /// let error = Error::unreachable("connection refused");
    /// assert!(matches!(error, Error::Unreachable(_)));
    /// ```
    pub fn unreachable(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Unreachable(cause.into())
    }
}

/// A specialized [`Result`] type for remote backend calls.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn unreachable_keeps_cause_as_source() {
        let error = Error::unreachable("connection refused");
        let source = error.source().expect("unreachable errors carry a source");
        assert_eq!(source.to_string(), "connection refused");
    }

    #[test]
    fn protocol_display_contains_message() {
        let error = Error::Protocol("expected PONG".to_string());
        assert!(error.to_string().contains("expected PONG"));
    }

    #[test]
    fn result_alias_propagates_errors() {
        fn fails() -> Result<u32> {
            Err(Error::Timeout)
        }

        assert!(matches!(fails(), Err(Error::Timeout)));
    }
}
