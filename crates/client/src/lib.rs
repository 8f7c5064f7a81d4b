//! Remote cache client.
//!
//! [`RemoteCache`] implements the `strata-core` contract by serializing each
//! operation into a [`transport::CacheRequest`] and handing it to a
//! [`transport::Transport`]. The transport is a pluggable seam: production
//! deployments wire in a network protocol, tests use an in-process loopback.
//!
//! Only the point-operation subset of the contract travels over the wire;
//! streaming and server-side processing return `Error::NotSupported` so
//! callers can detect the capability gap without a round trip.

pub mod remote;
pub mod transport;

pub use remote::RemoteCache;
pub use transport::{CacheRequest, CacheResponse, Transport, WireEntry, WireWriteOptions};
