//! IdentityMap - One live instance per primary key
//!
//! TigerStyle: Explicit shared state. Created once, injected where needed,
//! cleared only on request.
//!
//! # Concurrency
//!
//! ```text
//! slots: Mutex<HashMap<(type, key), Arc<OnceCell<Resident>>>>
//!            │
//!            │ lock, find-or-create slot, unlock
//!            ↓
//!        OnceCell::get_or_try_init ── storage get (map lock NOT held)
//! ```
//!
//! Concurrent loads of one key wait on the same slot and share one fetch.
//! Loads of different keys never wait on each other.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::{OnceCell, RwLock};

use crate::backref::BackRefs;
use crate::constants::BACKREFS_ATTRIBUTE;
use crate::error::{OdmError, OdmResult};
use crate::key::Key;
use crate::model::Model;
use crate::storage::StorageBackend;
use crate::Record;

/// A shared, cached model instance.
pub type Instance<T> = Arc<Tracked<T>>;

type SlotKey = (&'static str, Key);
type Slot = Arc<OnceCell<Resident>>;

/// Bookkeeping that travels with an instance, cached or not.
#[derive(Debug, Default)]
struct ResidentMeta {
    /// A record exists in storage under the instance key
    stored: bool,
    /// `__backrefs` of the stored record
    backrefs: BackRefs,
    /// Record as last read or written; `None` until fully saved
    persisted: Option<Record>,
}

/// Shared handle to the bookkeeping of one instance.
#[derive(Debug, Clone, Default)]
pub(crate) struct MetaHandle(Arc<Mutex<ResidentMeta>>);

impl MetaHandle {
    fn new(meta: ResidentMeta) -> Self {
        Self(Arc::new(Mutex::new(meta)))
    }

    fn lock(&self) -> MutexGuard<'_, ResidentMeta> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// True once a record was written or read under the instance key.
    pub(crate) fn is_stored(&self) -> bool {
        self.lock().stored
    }

    pub(crate) fn mark_stored(&self) {
        self.lock().stored = true;
    }

    /// The record no longer exists.
    pub(crate) fn forget(&self) {
        let mut meta = self.lock();
        meta.stored = false;
        meta.persisted = None;
        meta.backrefs = BackRefs::default();
    }

    /// Record as last read or written.
    pub(crate) fn persisted(&self) -> Option<Record> {
        self.lock().persisted.clone()
    }

    pub(crate) fn set_persisted(&self, record: Record) {
        self.lock().persisted = Some(record);
    }

    /// `__backrefs` of the stored record.
    pub(crate) fn backrefs(&self) -> BackRefs {
        self.lock().backrefs.clone()
    }

    pub(crate) fn set_backrefs(&self, backrefs: BackRefs) {
        self.lock().backrefs = backrefs;
    }
}

/// A model value behind an async lock, plus its storage bookkeeping.
///
/// Dereferences to the lock, so `instance.read().await` and
/// `instance.write().await` work directly on an [`Instance`].
#[derive(Debug)]
pub struct Tracked<T> {
    value: RwLock<T>,
    meta: MetaHandle,
}

impl<T> Tracked<T> {
    /// Wrap a value that has not been stored yet.
    pub(crate) fn new(value: T) -> Self {
        Self::with_meta(value, MetaHandle::default())
    }

    fn with_meta(value: T, meta: MetaHandle) -> Self {
        Self {
            value: RwLock::new(value),
            meta,
        }
    }

    /// True if a record for this instance exists in storage, as far as the
    /// session knows.
    #[must_use]
    pub fn is_stored(&self) -> bool {
        self.meta.is_stored()
    }

    pub(crate) fn meta(&self) -> &MetaHandle {
        &self.meta
    }
}

impl<T> Deref for Tracked<T> {
    type Target = RwLock<T>;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

/// A cached instance with its bookkeeping.
#[derive(Clone)]
pub(crate) struct Resident {
    instance: Arc<dyn Any + Send + Sync>,
    meta: MetaHandle,
}

impl Resident {
    fn of<T: Model>(instance: &Instance<T>) -> Self {
        Self {
            meta: instance.meta().clone(),
            instance: Arc::clone(instance) as Arc<dyn Any + Send + Sync>,
        }
    }

    /// Split a stored record into instance and bookkeeping.
    fn from_record<T: Model>(mut record: Record) -> OdmResult<Self> {
        let backrefs = BackRefs::from_value(record.remove(BACKREFS_ATTRIBUTE).as_ref());
        let value: T = serde_json::from_value(Value::Object(record.clone()))?;
        let meta = MetaHandle::new(ResidentMeta {
            stored: true,
            backrefs,
            persisted: Some(record),
        });
        Ok(Self::of::<T>(&Arc::new(Tracked::with_meta(value, meta))))
    }

    fn instance<T: Model>(&self, key: &Key) -> OdmResult<Instance<T>> {
        Arc::clone(&self.instance)
            .downcast::<Tracked<T>>()
            .map_err(|_| OdmError::TypeMismatch {
                type_name: T::NAME.to_string(),
                key: key.clone(),
            })
    }

    pub(crate) fn meta(&self) -> &MetaHandle {
        &self.meta
    }
}

impl std::fmt::Debug for Resident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resident").finish_non_exhaustive()
    }
}

enum Miss {
    Absent,
    Failed(OdmError),
}

/// Cache guaranteeing at most one live instance per `(type, key)`.
#[derive(Debug, Default)]
pub struct IdentityMap {
    slots: Mutex<HashMap<SlotKey, Slot>>,
}

impl IdentityMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<SlotKey, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of resident instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    /// True if nothing is resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if `key` of `type_name` is resident.
    #[must_use]
    pub fn contains(&self, type_name: &'static str, key: &Key) -> bool {
        self.resident(type_name, key).is_some()
    }

    // =========================================================================
    // Typed access
    // =========================================================================

    /// The resident instance under `key`, without touching storage.
    ///
    /// # Errors
    /// `TypeMismatch` if the slot holds another Rust type under `T::NAME`.
    pub fn get<T: Model>(&self, key: &Key) -> OdmResult<Option<Instance<T>>> {
        self.resident(T::NAME, key)
            .map(|resident| resident.instance::<T>(key))
            .transpose()
    }

    /// Return the resident instance, or fetch it with one `get` and cache it.
    ///
    /// Absent records are not cached.
    ///
    /// # Errors
    /// Storage and deserialization errors; nothing is cached on error.
    pub async fn load<T: Model>(
        &self,
        storage: &dyn StorageBackend,
        key: &Key,
    ) -> OdmResult<Option<Instance<T>>> {
        let resident = self
            .resident_or_init(T::NAME, key, move || fetch_resident::<T>(storage, key))
            .await?;

        resident.map(|r| r.instance::<T>(key)).transpose()
    }

    /// Turn a fetched record into an instance, reusing a resident one.
    ///
    /// A resident instance wins over the record: unsaved in-memory edits are
    /// never overwritten by a query result.
    ///
    /// # Errors
    /// `MissingKey` if the record has no primary key; deserialization errors.
    pub async fn hydrate<T: Model>(&self, record: Record) -> OdmResult<Instance<T>> {
        let key = record
            .get(T::primary_name())
            .and_then(Key::from_value)
            .ok_or_else(|| OdmError::missing_key(T::NAME, T::primary_name()))?;

        let resident = self
            .resident_or_init(T::NAME, &key, move || {
                std::future::ready(Resident::from_record::<T>(record).map(Some))
            })
            .await?;

        match resident {
            Some(resident) => resident.instance::<T>(&key),
            None => Err(OdmError::missing_key(T::NAME, T::primary_name())),
        }
    }

    // =========================================================================
    // Eviction
    // =========================================================================

    /// Evict one key. Returns true if something was resident.
    pub fn clear(&self, type_name: &'static str, key: &Key) -> bool {
        let removed = self.slots().remove(&(type_name, key.clone()));
        removed.is_some_and(|slot| slot.initialized())
    }

    /// Evict every key of one type. Returns how many were resident.
    pub fn clear_type(&self, type_name: &'static str) -> usize {
        let mut slots = self.slots();
        let before = slots.len();
        let mut resident = 0;
        slots.retain(|(name, _), slot| {
            let keep = *name != type_name;
            if !keep && slot.initialized() {
                resident += 1;
            }
            keep
        });
        tracing::debug!(type_name, evicted = before - slots.len(), "cleared type");
        resident
    }

    /// Evict everything.
    pub fn clear_all(&self) {
        self.slots().clear();
    }

    // =========================================================================
    // Crate internals
    // =========================================================================

    pub(crate) fn resident(&self, type_name: &'static str, key: &Key) -> Option<Resident> {
        let slot = self.slots().get(&(type_name, key.clone())).cloned()?;
        slot.get().cloned()
    }

    /// Cache `instance` under `key` unless another instance is resident.
    ///
    /// A slot with a fetch in flight is left to that fetch.
    pub(crate) fn adopt<T: Model>(&self, key: &Key, instance: &Instance<T>) {
        let slot = Arc::clone(
            self.slots()
                .entry((T::NAME, key.clone()))
                .or_insert_with(|| Arc::new(OnceCell::new())),
        );
        if slot.set(Resident::of(instance)).is_err() {
            tracing::trace!(model = T::NAME, %key, "another instance is resident");
        }
    }

    async fn resident_or_init<F, Fut>(
        &self,
        type_name: &'static str,
        key: &Key,
        init: F,
    ) -> OdmResult<Option<Resident>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = OdmResult<Option<Resident>>>,
    {
        let slot_key = (type_name, key.clone());
        let slot = Arc::clone(
            self.slots()
                .entry(slot_key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        );

        if let Some(resident) = slot.get() {
            tracing::trace!(type_name, %key, "identity map hit");
            return Ok(Some(resident.clone()));
        }

        let result = slot
            .get_or_try_init(move || async move {
                tracing::debug!(type_name, %key, "identity map miss");
                match init().await {
                    Ok(Some(resident)) => Ok(resident),
                    Ok(None) => Err(Miss::Absent),
                    Err(e) => Err(Miss::Failed(e)),
                }
            })
            .await;

        match result {
            Ok(resident) => Ok(Some(resident.clone())),
            Err(miss) => {
                self.discard_empty(&slot_key, &slot);
                match miss {
                    Miss::Absent => Ok(None),
                    Miss::Failed(e) => Err(e),
                }
            }
        }
    }

    /// Drop a slot that never got a value, unless it was replaced meanwhile.
    fn discard_empty(&self, slot_key: &SlotKey, slot: &Slot) {
        let mut slots = self.slots();
        let stale = slots
            .get(slot_key)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && !current.initialized());
        if stale {
            slots.remove(slot_key);
        }
    }
}

async fn fetch_resident<T: Model>(
    storage: &dyn StorageBackend,
    key: &Key,
) -> OdmResult<Option<Resident>> {
    match storage.get(T::primary_name(), key).await? {
        Some(record) => Resident::from_record::<T>(record).map(Some),
        None => Ok(None),
    }
}
