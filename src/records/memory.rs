//! In-memory record store.
//!
//! Stores all records in memory with no persistence. Useful for testing
//! and ephemeral deployments. Uses `RwLock<HashMap>` for thread-safe access.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use super::store::{new_record_id, Example, ExampleRecord, RecordStore};

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<String, ExampleRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().expect("rwlock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryRecordStore {
    fn create(
        &self,
        example: Example,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ExampleRecord>> + Send + '_>> {
        Box::pin(async move {
            let record = ExampleRecord::from_example(new_record_id(), example);
            let mut records = self.records.write().expect("rwlock poisoned");
            records.insert(record.id.clone(), record.clone());
            Ok(record)
        })
    }

    fn get(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ExampleRecord>>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(async move {
            let records = self.records.read().expect("rwlock poisoned");
            Ok(records.get(&id).cloned())
        })
    }

    fn update(
        &self,
        record: ExampleRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        Box::pin(async move {
            let mut records = self.records.write().expect("rwlock poisoned");
            match records.get_mut(&record.id) {
                Some(existing) => {
                    *existing = record;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn delete(&self, id: &str) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(async move {
            let mut records = self.records.write().expect("rwlock poisoned");
            Ok(records.remove(&id).is_some())
        })
    }
}
