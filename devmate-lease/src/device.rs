//! Device entity and its wire representation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Coarse device status, as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Free,
    Reserved,
    Offline,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Free => "free",
            Status::Reserved => "reserved",
            Status::Offline => "offline",
        })
    }
}

/// Lease state of a device.
///
/// An owner and a reservation time exist only while the device is reserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceState {
    Free,
    Reserved { owner: String, since: DateTime<Utc> },
    Offline,
}

impl DeviceState {
    pub fn status(&self) -> Status {
        match self {
            DeviceState::Free => Status::Free,
            DeviceState::Reserved { .. } => Status::Reserved,
            DeviceState::Offline => Status::Offline,
        }
    }
}

/// A named physical device in the shared pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "DeviceRecord", try_from = "DeviceRecord")]
pub struct Device {
    name: String,
    model: String,
    state: DeviceState,
}

impl Device {
    /// Create a free device.
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Device {
        Device {
            name: name.into(),
            model: model.into(),
            state: DeviceState::Free,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn status(&self) -> Status {
        self.state.status()
    }

    pub fn owner(&self) -> Option<&str> {
        match &self.state {
            DeviceState::Reserved { owner, .. } => Some(owner),
            _ => None,
        }
    }

    pub fn reserved_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            DeviceState::Reserved { since, .. } => Some(*since),
            _ => None,
        }
    }

    /// The same device in a different lease state.
    pub fn with_state(&self, state: DeviceState) -> Device {
        Device {
            name: self.name.clone(),
            model: self.model.clone(),
            state,
        }
    }
}

/// Flat serialized form of a [`Device`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub name: String,
    pub model: String,
    pub status: Status,
    pub user: Option<String>,
    pub reservation_time: Option<DateTime<Utc>>,
}

impl From<Device> for DeviceRecord {
    fn from(device: Device) -> Self {
        let status = device.status();
        let (user, reservation_time) = match device.state {
            DeviceState::Reserved { owner, since } => (Some(owner), Some(since)),
            DeviceState::Free | DeviceState::Offline => (None, None),
        };
        DeviceRecord {
            name: device.name,
            model: device.model,
            status,
            user,
            reservation_time,
        }
    }
}

impl TryFrom<DeviceRecord> for Device {
    type Error = StoreError;

    fn try_from(record: DeviceRecord) -> Result<Self, Self::Error> {
        let corrupt = |reason: &str| StoreError::Corrupt {
            name: record.name.clone(),
            reason: reason.to_owned(),
        };
        let state = match (record.status, &record.user, record.reservation_time) {
            (Status::Reserved, Some(owner), Some(since)) => DeviceState::Reserved {
                owner: owner.clone(),
                since,
            },
            (Status::Reserved, _, _) => {
                return Err(corrupt("reserved without owner and reservation time"))
            }
            (Status::Free, None, None) => DeviceState::Free,
            (Status::Offline, None, None) => DeviceState::Offline,
            (_, _, _) => return Err(corrupt("owner or reservation time on unreserved device")),
        };
        Ok(Device {
            name: record.name,
            model: record.model,
            state,
        })
    }
}
