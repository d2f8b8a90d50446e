//! Thread-safe component type registration.
//!
//! A `DashMap<TypeId, ComponentId>` gives lock-free reads on the common path, with a
//! `RwLock<Vec<...>>` side table for the rarer registration writes. Conflict detection catches
//! two registrations of the same type disagreeing on storage/policy; a 256-id ceiling ties
//! registration to `BitMask256`; and a lock closes registration once entities exist.

use std::any::TypeId;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use dashmap::DashMap;

use crate::component::{Component, ComponentId, ComponentInfo, RetentionPolicy, StorageKind};
use crate::error::{Error, Result};
use crate::mask::{BitMask256, BITS};

/// A thread-safe component type registry.
///
/// Most things in the repository are not `Sync` by design (mutation is exclusive, single
/// writer per tick), but the registry itself is read from every module thread during a tick, so
/// it alone needs to be safe to share.
pub struct Registry {
    type_map: DashMap<TypeId, ComponentId>,
    infos: RwLock<Vec<ComponentInfo>>,
    next_id: AtomicU32,
    locked: AtomicBool,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// An empty, unlocked registry.
    pub fn new() -> Self {
        Self {
            type_map: DashMap::new(),
            infos: RwLock::new(Vec::new()),
            next_id: AtomicU32::new(0),
            locked: AtomicBool::new(false),
        }
    }

    /// Register `T` with the given storage kind and retention policy.
    ///
    /// Re-registering the same type with matching storage/policy is a no-op that returns the
    /// existing id. Re-registering with a conflicting storage or policy is a [`Error::SchemaError`].
    /// Registering after the registry has been [`lock`](Self::lock)ed (i.e. once entities exist)
    /// is also a [`Error::SchemaError`], per §4.1.
    pub fn register<T: Component>(
        &self,
        storage: StorageKind,
        policy: RetentionPolicy,
    ) -> Result<ComponentId> {
        let type_id = TypeId::of::<T>();

        if let Some(entry) = self.type_map.get(&type_id) {
            let id = *entry;
            drop(entry);
            return self.check_conflict(id, storage, policy).map(|_| id);
        }

        if self.locked.load(Ordering::Acquire) {
            return Err(Error::SchemaError {
                message: format!(
                    "cannot register component {} after entities exist",
                    std::any::type_name::<T>()
                ),
            });
        }

        let mut result = Ok(ComponentId::new(0));
        self.type_map.entry(type_id).or_insert_with(|| {
            let raw = self.next_id.fetch_add(1, Ordering::Relaxed);
            if raw as usize >= BITS {
                result = Err(Error::SchemaError {
                    message: format!(
                        "component registration limit ({BITS}) exceeded registering {}",
                        std::any::type_name::<T>()
                    ),
                });
                return ComponentId::new(raw as u16);
            }
            let id = ComponentId::new(raw as u16);
            let mut infos = self.infos.write().unwrap();
            infos.push(ComponentInfo {
                id,
                type_id,
                storage,
                policy,
            });
            log::debug!(
                "registered component {} as {id:?} ({storage:?}, {policy:?})",
                std::any::type_name::<T>()
            );
            result = Ok(id);
            id
        });

        result
    }

    fn check_conflict(
        &self,
        id: ComponentId,
        storage: StorageKind,
        policy: RetentionPolicy,
    ) -> Result<()> {
        let infos = self.infos.read().unwrap();
        let existing = infos
            .iter()
            .find(|info| info.id() == id)
            .expect("type_map and infos must stay in sync");
        if existing.storage() != storage || existing.policy() != policy {
            return Err(Error::SchemaError {
                message: format!(
                    "component re-registered with conflicting storage/policy (existing {:?}/{:?}, got {:?}/{:?})",
                    existing.storage(),
                    existing.policy(),
                    storage,
                    policy
                ),
            });
        }
        Ok(())
    }

    /// Look up the id for an already-registered type.
    #[inline]
    pub fn get<T: Component>(&self) -> Option<ComponentId> {
        self.type_map.get(&TypeId::of::<T>()).map(|entry| *entry)
    }

    /// Look up registration info for an already-registered type.
    pub fn get_info<T: Component>(&self) -> Option<ComponentInfo> {
        let id = self.get::<T>()?;
        self.get_info_by_id(id)
    }

    /// Look up registration info by id.
    pub fn get_info_by_id(&self, id: ComponentId) -> Option<ComponentInfo> {
        self.infos
            .read()
            .unwrap()
            .iter()
            .find(|info| info.id() == id)
            .copied()
    }

    /// A mask with every currently-registered component id set. Used as the default scope for a
    /// `sync_from` call that doesn't name an explicit mask.
    pub fn all_ids(&self) -> BitMask256 {
        let mut mask = BitMask256::EMPTY;
        for info in self.infos.read().unwrap().iter() {
            mask.set(info.id().value());
        }
        mask
    }

    /// How many distinct component types are registered.
    pub fn len(&self) -> usize {
        self.infos.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close registration. Called by the repository the first time an entity is created;
    /// further `register` calls for *new* types become errors, while re-registering a known
    /// type remains a no-op.
    pub fn lock(&self) {
        self.locked.store(true, Ordering::Release);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}
