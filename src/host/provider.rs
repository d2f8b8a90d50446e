//! Normalises the three concrete snapshot provider types (§4.6) behind one enum a `Parallel`
//! module's registration can carry, without unifying them under a shared trait (see
//! `crate::snapshot`'s module doc for why not).

use std::sync::Arc;

use crate::repository::EntityRepository;
use crate::snapshot::{MirrorProvider, PooledProvider, SharedProvider};

/// Which provider a `Parallel` module's view comes from this frame.
pub enum ProviderHandle {
    Mirror(MirrorProvider),
    Pooled(PooledProvider),
    /// `Arc` because several module registrations may point at the same shared provider
    /// instance (that's the point of the "convoy" provider).
    Shared(Arc<SharedProvider>),
}

impl ProviderHandle {
    /// Refresh this handle's replica against `live`, if it's a mirror. Pooled/shared providers
    /// refresh lazily on acquisition instead, so this is a no-op for them.
    pub fn refresh_if_mirror(&mut self, live: &EntityRepository) {
        if let ProviderHandle::Mirror(provider) = self {
            provider.refresh(live);
        }
    }
}
