//! Native gRPC adapter for the memo auth core.
//!
//! [`layer::AuthLayer`] gates every call by its method path before it reaches
//! a service; [`service::AuthServiceRpc`] exposes the auth operations with
//! cookies carried as response metadata, and [`server`] mounts them as tonic
//! services.

pub mod codec;
pub mod error;
pub mod layer;
pub mod metadata;
pub mod server;
pub mod service;

pub use error::RpcError;
pub use layer::AuthLayer;
pub use server::{AuthServiceServer, UserServiceServer};
pub use service::AuthServiceRpc;
