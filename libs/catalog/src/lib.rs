//! Service-catalog data model and tag-based instance selection.
//!
//! The catalog holds one record per service instance: node, address, port and
//! an ordered list of `key=value` tag strings. Tags carry the coordination
//! protocol for rolling updates: a claim tag marks an instance as currently
//! being replaced, an image tag marks it as already running the target image.
//!
//! The durable copy of every record lives in the external registry; this
//! crate only works on transient in-memory views fetched per operation.

mod error;
mod instance;
mod registry;
mod selector;
mod tag;

pub use error::CatalogError;
pub use instance::ServiceInstance;
pub use registry::{HttpRegistry, ServiceRegistry};
pub use selector::{add_tag, delete_tag, search_with_tag, search_without_tag};
pub use tag::Tag;
