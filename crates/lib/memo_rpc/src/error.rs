//! gRPC error mapping.

use memo_core::auth::{AuthError, ErrorKind};
use thiserror::Error;
use tonic::{Code, Status};
use tracing::error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// A header could not be carried as gRPC metadata.
    #[error("metadata error: {0}")]
    Metadata(String),
}

impl From<RpcError> for Status {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Auth(e) => {
                let message = e.public_message();
                match e.kind() {
                    ErrorKind::Unauthenticated => Status::unauthenticated(message),
                    ErrorKind::PermissionDenied => Status::permission_denied(message),
                    ErrorKind::InvalidArgument => Status::invalid_argument(message),
                    ErrorKind::NotFound => Status::not_found(message),
                    ErrorKind::Internal => {
                        error!("internal service error: {}", e);
                        Status::internal(Code::Internal.description())
                    }
                }
            }
            RpcError::Metadata(m) => {
                error!("metadata error: {}", m);
                Status::internal(Code::Internal.description())
            }
        }
    }
}
