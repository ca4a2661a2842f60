//! Core library for protogate - a control plane bridging annotated protobuf
//! services to HTTP routes through a Consul-compatible KV registry.
//!
//! Producer side: [`registrator::Registrator`] publishes a server's
//! [`pb::FileDescriptorProto`]s into the registry, content-addressed and
//! CAS-guarded, then bumps a notify key.
//!
//! Consumer side: [`registry::Registry`] long-polls the notify key,
//! incrementally reconciles a per-server descriptor cache, and rebuilds
//! content through an [`registry::Extractor`] - typically
//! [`registry::RouteExtractor`], which runs the [`descriptor::Parser`] and
//! [`resolve::resolve_routes`] to produce the executable route table an
//! HTTP gateway dispatches on.

pub mod descriptor;
pub mod error;
pub mod kv;
pub mod metadata;
pub mod pb;
pub mod registrator;
pub mod registry;
pub mod resolve;

pub use error::{Error, Result};
