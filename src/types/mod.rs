//! Type definitions shared across the bridge
//!
//! Product identifiers used to key the client registry and the per-call
//! request options accepted by the gateway verbs.

pub mod product;
pub mod request;

pub use product::Product;
pub use request::{RequestOptions, RequestOptionsBuilder};
