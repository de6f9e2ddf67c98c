//! Gateway errors.

use displaydoc::Display;
use serde::Serialize;
use thiserror::Error;

use crate::graphql;
use crate::json_ext::Path;

/// Error types for backend fetches.
///
/// Note that these are not actually returned to the client, but are instead converted to JSON for
/// [`struct@graphql::Error`].
#[derive(Error, Display, Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(untagged)]
#[ignore_extra_doc_attributes]
#[non_exhaustive]
pub enum FetchError {
    /// request was malformed: {reason}
    MalformedRequest {
        /// The reason the request could not be built.
        reason: String,
    },

    /// response was malformed: {reason}
    MalformedResponse {
        /// The reason the response could not be interpreted.
        reason: String,
    },

    /// HTTP fetch failed from '{service}': {reason}
    ///
    /// note that this relates to a transport error and not a GraphQL error
    SubrequestHttpError {
        status_code: Option<u16>,

        /// The service failed.
        service: String,

        /// The reason the fetch failed.
        reason: String,
    },

    /// service '{service}' response was malformed: {reason}
    SubrequestMalformedResponse {
        /// The service that responded with the malformed response.
        service: String,

        /// The reason the deserialization failed.
        reason: String,
    },

    /// batching error for '{service}': {reason}
    SubrequestBatchingError {
        /// The service for which batch processing failed.
        service: String,

        /// The reason batch processing failed.
        reason: String,
    },
}

impl FetchError {
    /// Convert the fetch error to a GraphQL error.
    pub fn to_graphql_error(&self, path: Option<Path>) -> graphql::Error {
        let mut extensions = serde_json_bytes::to_value(self)
            .ok()
            .and_then(|value| value.as_object().cloned())
            .unwrap_or_default();
        extensions
            .entry("code")
            .or_insert_with(|| self.extension_code().into());
        if let FetchError::SubrequestHttpError { status_code, .. } = self {
            extensions.remove("status_code");
            if let Some(status_code) = status_code {
                extensions.insert("http", serde_json_bytes::json!({ "status": status_code }));
            }
        }

        let builder = graphql::Error::builder()
            .message(self.to_string())
            .extensions(extensions);
        match path {
            Some(path) => builder.path(path).build(),
            None => builder.build(),
        }
    }

    /// The status code of the transport failure wrapped by this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::SubrequestHttpError { status_code, .. } => *status_code,
            _ => None,
        }
    }

    pub(crate) fn extension_code(&self) -> &'static str {
        match self {
            FetchError::MalformedRequest { .. } => "MALFORMED_REQUEST",
            FetchError::MalformedResponse { .. } => "MALFORMED_RESPONSE",
            FetchError::SubrequestHttpError { .. } => "SUBREQUEST_HTTP_ERROR",
            FetchError::SubrequestMalformedResponse { .. } => "SUBREQUEST_MALFORMED_RESPONSE",
            FetchError::SubrequestBatchingError { .. } => "SUBREQUEST_BATCHING_ERROR",
        }
    }
}

impl From<FetchError> for graphql::Error {
    fn from(error: FetchError) -> Self {
        error.to_graphql_error(None)
    }
}

/// Invalid GraphQL document.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum SpecError {
    /// parsing error: {reason}
    ParseError {
        /// The failure reason.
        reason: String,
    },

    /// can only use `@{name}` once
    DuplicateDirective {
        /// The directive that was used more than once.
        name: String,
    },
}

impl SpecError {
    pub(crate) fn extension_code(&self) -> &'static str {
        match self {
            SpecError::ParseError { .. } => "GRAPHQL_PARSE_FAILED",
            SpecError::DuplicateDirective { .. } => "GRAPHQL_VALIDATION_FAILED",
        }
    }
}

impl From<SpecError> for graphql::Error {
    fn from(error: SpecError) -> Self {
        graphql::Error::builder()
            .message(error.to_string())
            .extension_code(error.extension_code())
            .build()
    }
}

/// Invalid pagination arguments.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum PaginationError {
    /// `first`/`after`/`last`/`before` cannot be combined with `page`/`size`
    ExclusivePagination,

    /// cursor '{cursor}' is not a valid position cursor
    InvalidCursor {
        /// The cursor that failed to decode.
        cursor: String,
    },

    /// `last` requires a `before` cursor
    LastWithoutBefore,

    /// page numbering starts at 1
    InvalidPage,
}

impl From<PaginationError> for graphql::Error {
    fn from(error: PaginationError) -> Self {
        graphql::Error::builder()
            .message(error.to_string())
            .extension_code("BAD_USER_INPUT")
            .build()
    }
}

/// Error in the gateway configuration.
#[derive(Error, Display, Debug)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// could not parse configuration: {0}
    InvalidConfiguration(#[from] serde_yaml::Error),

    /// backend '{name}' is declared more than once
    DuplicateBackend {
        /// The backend service name.
        name: String,
    },
}
