//! Symbolic tag layer: document walker, address mapping and value cache.

pub mod cache;
pub mod document;
pub mod mapping;

pub use cache::{TagCacheService, TagFilter, TransportClients};
pub use document::Visit;
pub use mapping::{AddressMapping, NativeBinding, TagMappingService};
