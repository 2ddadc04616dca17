use tokio::sync::RwLock;

use super::{DeviceStore, Table};
use crate::{device::Device, error::StoreError};

/// Volatile device store. All records are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: RwLock<Table>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl DeviceStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<Option<Device>, StoreError> {
        Ok(self.table.read().await.get(name))
    }

    async fn put(&self, device: Device) -> Result<(), StoreError> {
        self.table.write().await.put(device);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.table.write().await.delete(name))
    }

    async fn list_all(&self) -> Result<Vec<Device>, StoreError> {
        Ok(self.table.read().await.list())
    }
}
