use thiserror::Error;

/// Rejected CORS configuration, returned by `CorsMiddlewareBuilder::build()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorsConfigError {
    /// `*` together with `allow_credentials(true)`; browsers refuse that combination.
    #[error("CORS configuration error: wildcard origin (*) cannot be combined with credentials")]
    WildcardWithCredentials,
    /// An origin that is not `scheme://host[:port]`.
    #[error("CORS configuration error: invalid origin '{origin}', expected scheme://host[:port]")]
    InvalidOrigin { origin: String },
    /// Credentials were requested but no origin was listed.
    #[error("CORS configuration error: credentials require at least one allowed origin")]
    EmptyOriginsWithCredentials,
}
