//! Session - Typed persistence over registered backends
//!
//! TigerStyle: The session owns no records. Instances live in the injected
//! [`IdentityMap`]; records live in the backends.
//!
//! # Save
//!
//! ```text
//! save(instance)
//!   ├─ not yet stored ─→ insert (or insert_generated) ─→ adopt into map
//!   ├─ stored         ─→ update with the full record
//!   └─ per relation with a back-reference, per attached/detached key:
//!        lock(target) ─→ read __backrefs ─→ update(target, {"__backrefs": ...})
//! ```
//!
//! Whether an instance is stored travels with the instance, so saving after
//! the identity map was cleared still updates.
//!
//! Saves are not atomic. If a back-reference update fails, the owner record
//! stays written and the error is returned. The relation diff is only
//! committed on success, so saving again re-applies it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};

use serde_json::Value;
use tokio::sync::Mutex;

use crate::backref::{relation_keys, BackRef, BackRefs};
use crate::config::OdmConfig;
use crate::constants::BACKREFS_ATTRIBUTE;
use crate::error::{OdmError, OdmResult};
use crate::identity::{IdentityMap, Instance, Tracked};
use crate::key::Key;
use crate::model::{Model, Relation};
use crate::query::Query;
use crate::result_set::ResultSet;
use crate::storage::{KeyGenerator, StorageBackend};
use crate::Record;

#[derive(Debug, Clone)]
struct Registration {
    storage: Arc<dyn StorageBackend>,
    primary_name: &'static str,
}

/// One async lock per back-reference target, created on demand.
///
/// Serializes the read-modify-write of a target's `__backrefs`.
#[derive(Debug, Default)]
struct TargetLocks {
    locks: StdMutex<HashMap<(&'static str, Key), Arc<Mutex<()>>>>,
}

impl TargetLocks {
    fn acquire(&self, type_name: &'static str, key: &Key) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry((type_name, key.clone())).or_default())
    }

    /// Drop the entry once no other task holds or waits on it.
    fn release(&self, type_name: &'static str, key: &Key, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // map + ours
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&(type_name, key.clone()));
        }
    }

    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Entry point for loading, saving and querying models.
#[derive(Debug)]
pub struct Session {
    identity: Arc<IdentityMap>,
    registry: StdRwLock<HashMap<&'static str, Registration>>,
    keygen: KeyGenerator,
    config: OdmConfig,
    target_locks: TargetLocks,
}

impl Session {
    /// Create a session over a shared identity map with default config.
    #[must_use]
    pub fn new(identity: Arc<IdentityMap>) -> Self {
        Self::with_config(identity, OdmConfig::default())
    }

    /// Create a session with explicit config.
    #[must_use]
    pub fn with_config(identity: Arc<IdentityMap>, config: OdmConfig) -> Self {
        Self {
            identity,
            registry: StdRwLock::new(HashMap::new()),
            keygen: KeyGenerator::from_config(&config),
            config,
            target_locks: TargetLocks::default(),
        }
    }

    /// Replace the key generator (seeded generators for simulation).
    #[must_use]
    pub fn with_keygen(mut self, keygen: KeyGenerator) -> Self {
        self.keygen = keygen;
        self
    }

    /// The identity map.
    #[must_use]
    pub fn identity(&self) -> &Arc<IdentityMap> {
        &self.identity
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &OdmConfig {
        &self.config
    }

    /// Store `T` in `storage`. Registering again replaces the backend.
    pub fn register<T: Model>(&self, storage: Arc<dyn StorageBackend>) {
        tracing::debug!(model = T::NAME, collection = storage.collection(), "registered model");
        self.registry
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                T::NAME,
                Registration {
                    storage,
                    primary_name: T::primary_name(),
                },
            );
    }

    fn registration(&self, type_name: &str) -> OdmResult<Registration> {
        self.registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(type_name)
            .cloned()
            .ok_or_else(|| OdmError::UnregisteredModel(type_name.to_string()))
    }

    /// The backend registered for `T`.
    ///
    /// # Errors
    /// `UnregisteredModel` if `T` was never registered.
    pub fn storage<T: Model>(&self) -> OdmResult<Arc<dyn StorageBackend>> {
        Ok(self.registration(T::NAME)?.storage)
    }

    /// Wrap a new value. It is not cached or stored until saved.
    #[must_use]
    pub fn create<T: Model>(&self, value: T) -> Instance<T> {
        Arc::new(Tracked::new(value))
    }

    // =========================================================================
    // Load
    // =========================================================================

    /// The instance under `key`: from the identity map, else one storage get.
    ///
    /// # Errors
    /// Storage or deserialization errors. Absence is `Ok(None)`.
    pub async fn load<T: Model>(&self, key: impl Into<Key>) -> OdmResult<Option<Instance<T>>> {
        let key = key.into();
        let registration = self.registration(T::NAME)?;
        self.identity
            .load::<T>(registration.storage.as_ref(), &key)
            .await
    }

    /// Like [`load`](Self::load), but absence is an error.
    ///
    /// # Errors
    /// `NotFound` if no record has `key`.
    pub async fn load_required<T: Model>(&self, key: impl Into<Key>) -> OdmResult<Instance<T>> {
        let key = key.into();
        self.load::<T>(key.clone())
            .await?
            .ok_or_else(|| OdmError::NotFound {
                type_name: T::NAME.to_string(),
                key,
            })
    }

    // =========================================================================
    // Save / Delete
    // =========================================================================

    /// Persist `instance` and the back-references of its relations.
    ///
    /// A new instance without a key gets a generated one, written back with
    /// `set_key`. Returns the key.
    ///
    /// # Errors
    /// `DuplicateKey` when inserting a new instance under a taken key;
    /// `KeyGenerationExhausted`; any storage error from back-reference
    /// updates.
    pub async fn save<T: Model>(&self, instance: &Instance<T>) -> OdmResult<Key> {
        let registration = self.registration(T::NAME)?;
        let primary_name = registration.primary_name;
        let storage = registration.storage.as_ref();
        let meta = instance.meta();

        let (mut record, key) = {
            let guard = instance.read().await;
            (to_record(&*guard)?, guard.key())
        };
        record.remove(BACKREFS_ATTRIBUTE);
        let previous = meta.persisted();

        let key = match key {
            Some(key) if meta.is_stored() => {
                record.insert(primary_name.to_string(), key.to_value());
                let updated = storage.update(primary_name, &key, record.clone()).await?;
                if !updated {
                    tracing::warn!(model = T::NAME, %key, "stored record vanished, inserting again");
                    storage.insert(primary_name, &key, record.clone()).await?;
                }
                key
            }
            Some(key) => {
                record.insert(primary_name.to_string(), key.to_value());
                storage.insert(primary_name, &key, record.clone()).await?;
                key
            }
            None => {
                let key = storage
                    .insert_generated(primary_name, record.clone(), &self.keygen)
                    .await?;
                record.insert(primary_name.to_string(), key.to_value());
                instance.write().await.set_key(key.clone());
                key
            }
        };
        meta.mark_stored();
        self.identity.adopt(&key, instance);

        self.sync_backrefs::<T>(&key, previous.as_ref(), &record)
            .await?;
        meta.set_persisted(record);

        tracing::debug!(model = T::NAME, %key, "saved");
        Ok(key)
    }

    /// Delete the stored record of `instance`, detach its back-references
    /// and evict it. Returns false if nothing was stored.
    ///
    /// # Errors
    /// `MissingKey` if the instance has no key; storage errors.
    pub async fn delete<T: Model>(&self, instance: &Instance<T>) -> OdmResult<bool> {
        let registration = self.registration(T::NAME)?;
        let (key, current) = {
            let guard = instance.read().await;
            (guard.key(), to_record(&*guard)?)
        };
        let key = key.ok_or_else(|| OdmError::missing_key(T::NAME, registration.primary_name))?;
        let previous = instance.meta().persisted().unwrap_or(current);

        let removed = registration
            .storage
            .remove(&[Query::eq(registration.primary_name, key.to_value())])
            .await?;
        self.identity.clear(T::NAME, &key);
        instance.meta().forget();

        if removed > 0 {
            self.sync_backrefs::<T>(&key, Some(&previous), &Record::new())
                .await?;
        }
        Ok(removed > 0)
    }

    /// Delete every `T` matching all `query` units and evict each one.
    ///
    /// Back-references held by other records are left as they are.
    ///
    /// # Errors
    /// Storage errors.
    pub async fn remove<T: Model>(&self, query: &[Query]) -> OdmResult<u64> {
        let registration = self.registration(T::NAME)?;
        let doomed = registration.storage.find(query).await?.to_vec().await?;
        let removed = registration.storage.remove(query).await?;

        for record in &doomed {
            if let Some(key) = record.get(registration.primary_name).and_then(Key::from_value) {
                self.identity.clear(T::NAME, &key);
            }
        }
        tracing::debug!(model = T::NAME, removed, "removed");
        Ok(removed)
    }

    // =========================================================================
    // Query
    // =========================================================================

    /// Lazy result set of every `T` matching all `query` units.
    ///
    /// # Errors
    /// Query translation errors.
    pub async fn find<T: Model>(&self, query: &[Query]) -> OdmResult<ResultSet<T>> {
        let registration = self.registration(T::NAME)?;
        let cursor = registration.storage.find(query).await?;
        Ok(ResultSet::new(
            cursor,
            Arc::clone(&self.identity),
            self.config.batch_size,
        ))
    }

    /// First `T` matching all `query` units.
    ///
    /// # Errors
    /// Storage or deserialization errors. No match is `Ok(None)`.
    pub async fn find_one<T: Model>(&self, query: &[Query]) -> OdmResult<Option<Instance<T>>> {
        let registration = self.registration(T::NAME)?;
        match registration.storage.find_one(query).await? {
            Some(record) => Ok(Some(self.identity.hydrate::<T>(record).await?)),
            None => Ok(None),
        }
    }

    /// Lazy result set of every `T`.
    ///
    /// # Errors
    /// Storage errors.
    pub async fn find_all<T: Model>(&self) -> OdmResult<ResultSet<T>> {
        let registration = self.registration(T::NAME)?;
        let cursor = registration.storage.find_all().await?;
        Ok(ResultSet::new(
            cursor,
            Arc::clone(&self.identity),
            self.config.batch_size,
        ))
    }

    // =========================================================================
    // Back-references
    // =========================================================================

    /// Owners listed under back-reference `name` of `instance`.
    ///
    /// # Errors
    /// Storage errors when `instance` is not resident.
    pub async fn backrefs<T: Model>(&self, instance: &Instance<T>, name: &str) -> OdmResult<Vec<BackRef>> {
        let Some(key) = instance.read().await.key() else {
            return Ok(Vec::new());
        };

        if let Some(resident) = self.identity.resident(T::NAME, &key) {
            return Ok(resident.meta().backrefs().list(name));
        }

        let registration = self.registration(T::NAME)?;
        let record = registration
            .storage
            .get(registration.primary_name, &key)
            .await?;
        Ok(record
            .map(|record| BackRefs::from_value(record.get(BACKREFS_ATTRIBUTE)).list(name))
            .unwrap_or_default())
    }

    /// Load the `Owner` instances listed under back-reference `name`.
    ///
    /// Owners that no longer exist are skipped.
    ///
    /// # Errors
    /// Storage or deserialization errors.
    pub async fn resolve_backrefs<Owner: Model, T: Model>(
        &self,
        instance: &Instance<T>,
        name: &str,
    ) -> OdmResult<Vec<Instance<Owner>>> {
        let mut owners = Vec::new();
        for backref in self.backrefs(instance, name).await? {
            if backref.owner_type != Owner::NAME {
                continue;
            }
            if let Some(owner) = self.load::<Owner>(backref.key).await? {
                if !owners.iter().any(|o| Arc::ptr_eq(o, &owner)) {
                    owners.push(owner);
                }
            }
        }
        Ok(owners)
    }

    /// Attach or detach `owner` on every key a relation gained or lost.
    async fn sync_backrefs<T: Model>(
        &self,
        owner: &Key,
        previous: Option<&Record>,
        current: &Record,
    ) -> OdmResult<()> {
        for relation in T::relations() {
            let Some(name) = relation.backref else {
                continue;
            };
            let before = previous
                .map(|record| relation_keys(record, relation))
                .unwrap_or_default();
            let after = relation_keys(current, relation);

            for target in after.iter().filter(|key| !before.contains(key)) {
                self.update_backref(relation, name, T::NAME, owner, target, true)
                    .await?;
            }
            for target in before.iter().filter(|key| !after.contains(key)) {
                self.update_backref(relation, name, T::NAME, owner, target, false)
                    .await?;
            }
        }
        Ok(())
    }

    async fn update_backref(
        &self,
        relation: &Relation,
        name: &str,
        owner_type: &str,
        owner: &Key,
        target: &Key,
        attach: bool,
    ) -> OdmResult<()> {
        let lock = self.target_locks.acquire(relation.target, target);
        let result = {
            let _guard = lock.lock().await;
            self.write_backref(relation, name, owner_type, owner, target, attach)
                .await
        };
        self.target_locks.release(relation.target, target, lock);
        result
    }

    /// Read-modify-write of one target's `__backrefs`. Caller holds the
    /// target lock.
    async fn write_backref(
        &self,
        relation: &Relation,
        name: &str,
        owner_type: &str,
        owner: &Key,
        target: &Key,
        attach: bool,
    ) -> OdmResult<()> {
        let registration = self.registration(relation.target)?;
        let resident = self.identity.resident(relation.target, target);

        let mut backrefs = match &resident {
            Some(resident) => resident.meta().backrefs(),
            None => match registration
                .storage
                .get(registration.primary_name, target)
                .await?
            {
                Some(record) => BackRefs::from_value(record.get(BACKREFS_ATTRIBUTE)),
                None => {
                    tracing::warn!(target_type = relation.target, %target, "relation points at a missing record");
                    return Ok(());
                }
            },
        };

        let changed = if attach {
            backrefs.add(name, owner_type, relation.field, owner)
        } else {
            backrefs.remove(name, owner_type, relation.field, owner)
        };
        if !changed {
            return Ok(());
        }

        let mut patch = Record::new();
        patch.insert(BACKREFS_ATTRIBUTE.to_string(), backrefs.to_value());
        let updated = registration
            .storage
            .update(registration.primary_name, target, patch)
            .await?;
        if !updated {
            tracing::warn!(target_type = relation.target, %target, "back-reference target vanished");
        }

        if let Some(resident) = resident {
            resident.meta().set_backrefs(backrefs);
        }
        Ok(())
    }

    /// Back-reference targets currently locked or waited on.
    #[must_use]
    pub fn pending_backref_targets(&self) -> usize {
        self.target_locks.len()
    }

    // =========================================================================
    // Cache
    // =========================================================================

    /// Evict one `T`.
    pub fn clear<T: Model>(&self, key: &Key) -> bool {
        self.identity.clear(T::NAME, key)
    }

    /// Evict every `T`.
    pub fn clear_type<T: Model>(&self) -> usize {
        self.identity.clear_type(T::NAME)
    }

    /// Evict everything.
    pub fn clear_all(&self) {
        self.identity.clear_all();
    }
}

fn to_record<T: Model>(value: &T) -> OdmResult<Record> {
    match serde_json::to_value(value)? {
        Value::Object(record) => Ok(record),
        _ => Err(OdmError::NotARecord {
            type_name: T::NAME.to_string(),
        }),
    }
}
