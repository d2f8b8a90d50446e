//! Snapshot providers (§4.6): three ways of handing a module a read-only view of the live world.
//!
//! All three share the same conceptual contract — `acquire_view` / `release_view` / `refresh` —
//! but their ownership shapes differ enough (a borrowed mirror, an owned pool handle, a shared
//! refcounted handle) that forcing them under one Rust trait would cost more in contortion than
//! it returns in reuse; each is its own concrete type behind a common vocabulary of methods
//! instead of one trait object.
//!
//! `mirror` is refreshed explicitly by the host at the sync point (§4.8 step 3); `pool` and
//! `shared` refresh lazily inside `acquire_view` instead, since paying for a sync nobody asked
//! for this frame would be wasted work.

pub mod mirror;
pub mod pool;
pub mod shared;

pub use mirror::MirrorProvider;
pub use pool::{PooledProvider, PooledView};
pub use shared::{SharedProvider, SharedView};
