//! Record storage for the watch registry.
//!
//! Watch records live in a freelist slab and are addressed by a stable
//! [`SlabIndex`]. The registry's lookup maps store slab indices, so renaming
//! a record only touches the map keyed by the changed field.

mod entry;
mod index_types;
mod slab;

pub use index_types::SlabIndex;
pub use slab::Slab;
