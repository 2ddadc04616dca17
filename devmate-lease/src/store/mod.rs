//! Device record storage.
//!
//! Stores provide plain keyed reads and writes. They do not lock across a
//! read and a later write; callers that need an atomic read-modify-write go
//! through the [`TransitionCoordinator`](crate::TransitionCoordinator).

mod file;
mod memory;

use std::{collections::HashMap, future::Future, sync::Arc};

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::{device::Device, error::StoreError};

/// Durable keyed storage for devices, keyed by device name.
///
/// Once `put` or `delete` returns `Ok`, every later `get` on the same name
/// observes the change.
pub trait DeviceStore: Send + Sync + 'static {
    fn get(&self, name: &str) -> impl Future<Output = Result<Option<Device>, StoreError>> + Send;

    /// Insert or replace the record named by `device.name()`.
    fn put(&self, device: Device) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove a record, returning whether it existed.
    fn delete(&self, name: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// All records, in insertion order.
    fn list_all(&self) -> impl Future<Output = Result<Vec<Device>, StoreError>> + Send;
}

impl<S: DeviceStore> DeviceStore for Arc<S> {
    fn get(&self, name: &str) -> impl Future<Output = Result<Option<Device>, StoreError>> + Send {
        (**self).get(name)
    }

    fn put(&self, device: Device) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).put(device)
    }

    fn delete(&self, name: &str) -> impl Future<Output = Result<bool, StoreError>> + Send {
        (**self).delete(name)
    }

    fn list_all(&self) -> impl Future<Output = Result<Vec<Device>, StoreError>> + Send {
        (**self).list_all()
    }
}

/// Device rows with a stable insertion sequence.
#[derive(Debug, Clone, Default)]
struct Table {
    next_seq: u64,
    rows: HashMap<String, (u64, Device)>,
}

impl Table {
    fn get(&self, name: &str) -> Option<Device> {
        self.rows.get(name).map(|(_, device)| device.clone())
    }

    fn put(&mut self, device: Device) {
        match self.rows.get_mut(device.name()) {
            Some((_, existing)) => *existing = device,
            None => {
                self.next_seq += 1;
                self.rows
                    .insert(device.name().to_owned(), (self.next_seq, device));
            }
        }
    }

    fn delete(&mut self, name: &str) -> bool {
        self.rows.remove(name).is_some()
    }

    fn list(&self) -> Vec<Device> {
        let mut rows: Vec<_> = self.rows.values().collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, device)| device.clone()).collect()
    }
}

impl FromIterator<Device> for Table {
    fn from_iter<I: IntoIterator<Item = Device>>(iter: I) -> Self {
        let mut table = Table::default();
        for device in iter {
            table.put(device);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lists_in_insertion_order() {
        let mut table = Table::default();
        table.put(Device::new("zeta", "m"));
        table.put(Device::new("alpha", "m"));
        table.put(Device::new("mid", "m"));
        // Replacing keeps the original position.
        table.put(Device::new("zeta", "m2"));

        let names: Vec<_> = table.list().iter().map(|d| d.name().to_owned()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(table.get("zeta").unwrap().model(), "m2");
    }

    #[test]
    fn table_delete_reports_existence() {
        let mut table = Table::default();
        table.put(Device::new("d", "m"));
        assert!(table.delete("d"));
        assert!(!table.delete("d"));
        assert!(table.get("d").is_none());
    }
}
