//! API error types for the issue tracker and merge host clients

use std::fmt;

/// Errors that can occur when interacting with external APIs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// 401 Unauthorized - API key invalid or expired
    Unauthorized { provider: String },
    /// 403 Forbidden - key lacks required permissions
    Forbidden { provider: String },
    /// 404 - the requested issue/project does not exist
    NotFound { provider: String, resource: String },
    /// 422 - the provider rejected the payload (e.g. duplicate merge request)
    Rejected { provider: String, message: String },
    /// Network, TLS or timeout error
    NetworkError { provider: String, message: String },
    /// Other HTTP errors, or an unparseable body (status 0)
    HttpError {
        provider: String,
        status: u16,
        message: String,
    },
    /// Provider not configured (no base URL or credentials)
    NotConfigured { provider: String },
}

impl ApiError {
    pub fn unauthorized(provider: impl Into<String>) -> Self {
        ApiError::Unauthorized {
            provider: provider.into(),
        }
    }

    pub fn forbidden(provider: impl Into<String>) -> Self {
        ApiError::Forbidden {
            provider: provider.into(),
        }
    }

    pub fn not_found(provider: impl Into<String>, resource: impl Into<String>) -> Self {
        ApiError::NotFound {
            provider: provider.into(),
            resource: resource.into(),
        }
    }

    pub fn rejected(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Rejected {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::NetworkError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn http(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        ApiError::HttpError {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    pub fn not_configured(provider: impl Into<String>) -> Self {
        ApiError::NotConfigured {
            provider: provider.into(),
        }
    }

    /// Map a non-success HTTP status to an error
    pub fn from_status(
        provider: &str,
        status: u16,
        resource: &str,
        body: impl Into<String>,
    ) -> Self {
        match status {
            401 => ApiError::unauthorized(provider),
            403 => ApiError::forbidden(provider),
            404 => ApiError::not_found(provider, resource),
            409 | 422 => ApiError::rejected(provider, body),
            _ => ApiError::http(provider, status, body),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized { provider } => {
                write!(f, "{}: Unauthorized (401) - check the API key", provider)
            }
            ApiError::Forbidden { provider } => {
                write!(
                    f,
                    "{}: Forbidden (403) - insufficient permissions",
                    provider
                )
            }
            ApiError::NotFound { provider, resource } => {
                write!(f, "{}: Not found - {}", provider, resource)
            }
            ApiError::Rejected { provider, message } => {
                write!(f, "{}: Rejected - {}", provider, message)
            }
            ApiError::NetworkError { provider, message } => {
                write!(f, "{}: Network error - {}", provider, message)
            }
            ApiError::HttpError {
                provider,
                status,
                message,
            } => {
                write!(f, "{}: HTTP {} - {}", provider, status, message)
            }
            ApiError::NotConfigured { provider } => {
                write!(f, "{}: Not configured (no base URL or credentials)", provider)
            }
        }
    }
}

impl std::error::Error for ApiError {}
