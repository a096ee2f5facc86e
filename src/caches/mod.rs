//! Mutable caches that survive into the parallel render phase.
//!
//! Everything here has genuine read/write interleaving while workers run, so
//! it cannot move into the immutable snapshot. All of it is owned by the
//! [`BuildContext`](crate::engine::BuildContext) and handed to components by
//! reference - no process globals. Tiered locks sit at
//! [`Tier::RenderCache`](crate::locks::Tier); the content-hash registry is
//! sharded (dashmap) instead of tier-locked.

mod content_hash;
mod generated;
mod provenance;

pub use content_hash::ContentHashRegistry;
pub use generated::{GeneratedPage, GeneratedPageCache};
pub use provenance::{Provenance, ProvenanceStore};
