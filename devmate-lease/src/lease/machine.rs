//! Lease state transitions.

use chrono::{DateTime, Utc};

use crate::{
    device::{Device, DeviceState},
    error::{LeaseError, Result},
};

/// A requested change to a single device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Add { model: String },
    Reserve { user: String },
    Release,
    SetOffline,
    SetOnline,
    Delete,
}

/// What to write back to the store once a transition is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    Put(Device),
    Remove(Device),
}

impl Next {
    pub fn device(&self) -> &Device {
        match self {
            Next::Put(device) | Next::Remove(device) => device,
        }
    }

    pub fn into_device(self) -> Device {
        match self {
            Next::Put(device) | Next::Remove(device) => device,
        }
    }
}

/// Compute the next state of device `name` under `action`.
///
/// `now` becomes the reservation time when a reserve is accepted; it is
/// ignored by every other action.
pub fn transition(
    name: &str,
    current: Option<&Device>,
    action: &Action,
    now: DateTime<Utc>,
) -> Result<Next> {
    let device = match (current, action) {
        (Some(_), Action::Add { .. }) => return Err(LeaseError::AlreadyExists),
        (None, Action::Add { model }) => return Ok(Next::Put(Device::new(name, model.as_str()))),
        (None, _) => return Err(LeaseError::NotFound),
        (Some(device), _) => device,
    };

    match (device.state(), action) {
        (_, Action::Add { .. }) => Err(LeaseError::AlreadyExists),

        (DeviceState::Free, Action::Reserve { user }) => {
            Ok(Next::Put(device.with_state(DeviceState::Reserved {
                owner: user.clone(),
                since: now,
            })))
        }
        (state, Action::Reserve { .. }) => Err(LeaseError::Conflict {
            status: state.status(),
            owner: device.owner().map(str::to_owned),
        }),

        (DeviceState::Reserved { .. }, Action::Release) => {
            Ok(Next::Put(device.with_state(DeviceState::Free)))
        }
        (DeviceState::Free | DeviceState::Offline, Action::Release) => Err(LeaseError::NoOp),

        // Taking a device offline drops any reservation without a release.
        (DeviceState::Offline, Action::SetOffline) => Err(LeaseError::NoOp),
        (DeviceState::Free | DeviceState::Reserved { .. }, Action::SetOffline) => {
            Ok(Next::Put(device.with_state(DeviceState::Offline)))
        }

        (DeviceState::Offline, Action::SetOnline) => {
            Ok(Next::Put(device.with_state(DeviceState::Free)))
        }
        (DeviceState::Free | DeviceState::Reserved { .. }, Action::SetOnline) => {
            Err(LeaseError::NoOp)
        }

        (_, Action::Delete) => Ok(Next::Remove(device.clone())),
    }
}
