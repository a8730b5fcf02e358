//! StateStore — redb-backed persistence for service and volume records.
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SERVICES).map_err(map_err!(Table))?;
        txn.open_table(VOLUMES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn put<T: Serialize>(
        &self,
        table_def: JsonTable,
        key: &str,
        record: &T,
    ) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table_def).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(
        &self,
        table_def: JsonTable,
        key: &str,
    ) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn list<T: DeserializeOwned>(
        &self,
        table_def: JsonTable,
    ) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: T =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    fn delete(&self, table_def: JsonTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table_def).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Services ───────────────────────────────────────────────────

    /// Insert or update a service record.
    pub fn put_service(&self, service: &ServiceRecord) -> StateResult<()> {
        let key = service.table_key();
        self.put(SERVICES, &key, service)?;
        debug!(%key, "service stored");
        Ok(())
    }

    /// Get a service by topic and host.
    pub fn get_service(&self, topic: &str, host: &str) -> StateResult<Option<ServiceRecord>> {
        self.get(SERVICES, &format!("{topic}/{host}"))
    }

    /// List every service record, ordered by `{topic}/{host}`.
    pub fn list_services(&self) -> StateResult<Vec<ServiceRecord>> {
        self.list(SERVICES)
    }

    /// List services on one topic matching the given disabled/frozen flags.
    pub fn list_services_by_topic(
        &self,
        topic: &str,
        disabled: bool,
        frozen: bool,
    ) -> StateResult<Vec<ServiceRecord>> {
        Ok(self
            .list_services()?
            .into_iter()
            .filter(|s| s.topic == topic && s.disabled == disabled && s.frozen == frozen)
            .collect())
    }

    /// Delete a service. Returns true if it existed.
    pub fn delete_service(&self, topic: &str, host: &str) -> StateResult<bool> {
        let key = format!("{topic}/{host}");
        let existed = self.delete(SERVICES, &key)?;
        debug!(%key, existed, "service deleted");
        Ok(existed)
    }

    // ── Volumes ────────────────────────────────────────────────────

    /// Insert or update a volume record.
    pub fn put_volume(&self, volume: &VolumeRecord) -> StateResult<()> {
        self.put(VOLUMES, &volume.table_key(), volume)
    }

    /// Get a volume by ID.
    pub fn get_volume(&self, id: &Uuid) -> StateResult<Option<VolumeRecord>> {
        self.get(VOLUMES, &id.to_string())
    }

    /// List all volumes.
    pub fn list_volumes(&self) -> StateResult<Vec<VolumeRecord>> {
        self.list(VOLUMES)
    }

    /// Delete a volume. Returns true if it existed.
    pub fn delete_volume(&self, id: &Uuid) -> StateResult<bool> {
        self.delete(VOLUMES, &id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_store() -> StateStore {
        StateStore::open_in_memory().unwrap()
    }

    fn service(topic: &str, host: &str) -> ServiceRecord {
        ServiceRecord {
            host: host.to_string(),
            topic: topic.to_string(),
            binary: "blockgrid-volume".to_string(),
            disabled: false,
            disabled_reason: None,
            frozen: false,
            forced_down: false,
            cluster_name: None,
            cluster_disabled: false,
            availability_zone: "az1".to_string(),
            created_at: Utc::now(),
            updated_at: Some(Utc::now()),
        }
    }

    #[test]
    fn service_crud() {
        let store = test_store();
        let svc = service("volume", "node1@lvm");
        store.put_service(&svc).unwrap();

        let got = store.get_service("volume", "node1@lvm").unwrap().unwrap();
        assert_eq!(got, svc);

        assert!(store.delete_service("volume", "node1@lvm").unwrap());
        assert!(!store.delete_service("volume", "node1@lvm").unwrap());
        assert!(store.get_service("volume", "node1@lvm").unwrap().is_none());
    }

    #[test]
    fn list_by_topic_honours_flags() {
        let store = test_store();
        store.put_service(&service("volume", "a@lvm")).unwrap();
        let mut disabled = service("volume", "b@lvm");
        disabled.disabled = true;
        store.put_service(&disabled).unwrap();
        store.put_service(&service("backup", "c")).unwrap();

        let live = store.list_services_by_topic("volume", false, false).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].host, "a@lvm");

        let off = store.list_services_by_topic("volume", true, false).unwrap();
        assert_eq!(off.len(), 1);
        assert_eq!(off[0].host, "b@lvm");
    }

    #[test]
    fn volume_crud() {
        let store = test_store();
        let vol = VolumeRecord {
            id: Uuid::new_v4(),
            host: Some("node1@lvm#fast".to_string()),
            size_gb: 10,
            project_id: None,
            status: "available".to_string(),
        };
        store.put_volume(&vol).unwrap();
        assert_eq!(store.get_volume(&vol.id).unwrap(), Some(vol.clone()));
        assert_eq!(store.list_volumes().unwrap().len(), 1);
        assert!(store.delete_volume(&vol.id).unwrap());
        assert!(store.get_volume(&vol.id).unwrap().is_none());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.redb");
        {
            let store = StateStore::open(&path).unwrap();
            store.put_service(&service("volume", "node1@lvm")).unwrap();
        }
        let store = StateStore::open(&path).unwrap();
        assert!(store.get_service("volume", "node1@lvm").unwrap().is_some());
    }
}
