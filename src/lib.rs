//! An embedded, document-flavored relational data engine core: a thin,
//! host-agnostic layer over SQLite that shapes rows into a tagged host value
//! union, tracks which records the host has already seen via an identity
//! cache, and wraps batched mutations in a single transaction.
//!
//! The top-level entry point is [`Connection`]. Everything else is either a
//! supporting type ([`HostValue`], [`OpenOptions`], [`BatchOperation`]) or an
//! internal implementation detail kept module-private.

mod batch;
mod binder;
mod config;
mod connection;
mod error;
mod identity_cache;
mod logging;
mod raw;
mod schema;
mod shaper;
mod transaction;
mod value;

pub use batch::{BatchOperation, CacheBehavior};
pub use config::{ConnectionPath, OpenOptions, PlatformHints};
pub use connection::Connection;
pub use error::{EngineError, EngineResult};
pub use logging::{Logger, NullLogger, TracingLogger};
pub use value::HostValue;
