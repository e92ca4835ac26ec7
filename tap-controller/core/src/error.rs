/// Errors surfaced to tap clients.
///
/// Variants correspond to the gRPC status codes carried on the client
/// protocol's trailing error frame.
#[derive(Debug, thiserror::Error)]
pub enum TapError {
    /// The request was malformed: a missing target, an unparseable match
    /// tree, or a non-positive rate limit.
    #[error("{0}")]
    InvalidArgument(String),

    /// The request referenced a match operator or target kind that the
    /// server does not support.
    #[error("{0}")]
    Unimplemented(String),

    /// No pods remained after resolving the target selector.
    #[error("{0}")]
    NotFound(String),

    /// A transient dependency failure.
    #[error("{0}")]
    Unavailable(String),

    /// An unexpected failure, e.g. an unknown wire event variant.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl TapError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn unimplemented(msg: impl Into<String>) -> Self {
        Self::Unimplemented(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// The numeric gRPC status code for this error.
    pub fn grpc_code(&self) -> u32 {
        match self {
            Self::InvalidArgument(_) => 3,
            Self::NotFound(_) => 5,
            Self::Unimplemented(_) => 12,
            Self::Internal(_) => 13,
            Self::Unavailable(_) => 14,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_grpc_numbering() {
        assert_eq!(TapError::invalid_argument("x").grpc_code(), 3);
        assert_eq!(TapError::not_found("x").grpc_code(), 5);
        assert_eq!(TapError::unimplemented("x").grpc_code(), 12);
        assert_eq!(TapError::Internal(anyhow::anyhow!("x")).grpc_code(), 13);
        assert_eq!(TapError::unavailable("x").grpc_code(), 14);
    }
}
