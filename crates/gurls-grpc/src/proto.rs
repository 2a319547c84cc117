//! Generated wire types and client for `shortener/v1/shortener.proto`.

tonic::include_proto!("shortener.v1");

pub use prost_types::Timestamp;
