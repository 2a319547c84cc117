//! gRPC adapter for the shortening service (`shortener.v1.Shortener`).
//!
//! Implements the `gurls-core` [`LinkBackend`](gurls_core::backend::LinkBackend)
//! port over tonic.

pub mod backend;
pub mod proto;

pub use backend::GrpcBackend;
