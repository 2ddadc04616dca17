use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use tokio::{fs, io::AsyncWriteExt, sync::RwLock};
use tracing::{debug, info};

use super::{DeviceStore, Table};
use crate::{device::Device, error::StoreError};

#[derive(Serialize, Deserialize)]
struct Document {
    devices: Vec<Device>,
}

/// Device store persisted as a single JSON document.
///
/// Each write replaces the whole document through a temporary file and a
/// rename, so a crash leaves either the old or the new table on disk.
///
/// A write runs in its own task holding the table lock. Dropping the caller
/// of `put` or `delete` mid-write still lets memory follow the disk.
#[derive(Debug)]
pub struct JsonFileStore {
    path: Arc<Path>,
    table: Arc<RwLock<Table>>,
}

impl JsonFileStore {
    /// Open the store at `path`, creating an empty table if the file does
    /// not exist yet.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()), err)]
    pub async fn open(path: impl AsRef<Path>) -> Result<JsonFileStore, StoreError> {
        let path: Arc<Path> = Arc::from(path.as_ref());
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let table = match fs::read(&path).await {
            Ok(bytes) => {
                let doc: Document = serde_json::from_slice(&bytes)?;
                info!(devices = doc.devices.len(), "loaded device table");
                doc.devices.into_iter().collect()
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!("creating empty device table");
                let table = Table::default();
                persist(&path, &table).await?;
                table
            }
            Err(err) => return Err(err.into()),
        };
        Ok(JsonFileStore {
            path,
            table: Arc::new(RwLock::new(table)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy of the table, persist it, then swap it in.
    /// A `change` returning `None` leaves the table and file as they are.
    ///
    /// Once the table lock is taken the write finishes even if the caller
    /// is dropped.
    async fn write<T, F>(&self, change: F) -> Result<T, StoreError>
    where
        T: Default + Send + 'static,
        F: FnOnce(&mut Table) -> Option<T> + Send + 'static,
    {
        let mut table = self.table.clone().write_owned().await;
        let path = self.path.clone();
        tokio::spawn(async move {
            let mut next = table.clone();
            let Some(out) = change(&mut next) else {
                return Ok(T::default());
            };
            persist(&path, &next).await?;
            *table = next;
            Ok::<_, StoreError>(out)
        })
        .await?
    }
}

async fn persist(path: &Path, table: &Table) -> Result<(), StoreError> {
    let doc = Document {
        devices: table.list(),
    };
    let bytes = serde_json::to_vec_pretty(&doc)?;

    let mut tmp_path = path.to_path_buf().into_os_string();
    tmp_path.push(".tmp");
    let tmp_path = PathBuf::from(tmp_path);

    let mut file = fs::File::create(&tmp_path).await?;
    file.write_all(&bytes).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(&tmp_path, path).await?;
    debug!(devices = doc.devices.len(), "persisted device table");
    Ok(())
}

impl DeviceStore for JsonFileStore {
    async fn get(&self, name: &str) -> Result<Option<Device>, StoreError> {
        Ok(self.table.read().await.get(name))
    }

    async fn put(&self, device: Device) -> Result<(), StoreError> {
        self.write(move |table| {
            table.put(device);
            Some(())
        })
        .await
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let name = name.to_owned();
        // An absent name leaves the file untouched.
        self.write(move |table| table.delete(&name).then_some(true))
            .await
    }

    async fn list_all(&self) -> Result<Vec<Device>, StoreError> {
        Ok(self.table.read().await.list())
    }
}
