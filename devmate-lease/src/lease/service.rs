use std::sync::Arc;

use tracing::{debug, error, info};

use super::{
    coordinator::TransitionCoordinator,
    machine::{transition, Action, Next},
};
use crate::{
    clock::{Clock, SystemClock},
    device::Device,
    error::{LeaseError, Result, StoreError},
    store::DeviceStore,
    validation::require_non_empty,
};

/// Device operations offered to the API layer.
pub struct LeaseService<S, C = SystemClock> {
    coordinator: Arc<TransitionCoordinator<S>>,
    clock: Arc<C>,
}

impl<S: DeviceStore> LeaseService<S> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock::new())
    }
}

impl<S: DeviceStore, C: Clock> LeaseService<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        LeaseService {
            coordinator: Arc::new(TransitionCoordinator::new(store)),
            clock: Arc::new(clock),
        }
    }

    pub fn store(&self) -> &S {
        self.coordinator.store()
    }

    pub fn coordinator(&self) -> &TransitionCoordinator<S> {
        &self.coordinator
    }

    /// Snapshot of all devices. Not synchronized with in-flight transitions.
    pub async fn list(&self) -> Result<Vec<Device>> {
        let devices = self.store().list_all().await?;
        debug!(count = devices.len(), "listed devices");
        Ok(devices)
    }

    /// Register a new free device.
    pub async fn add(&self, name: &str, model: &str) -> Result<Device> {
        require_non_empty(&[("device", name), ("model", model)])?;
        self.apply(
            name,
            Action::Add {
                model: model.to_owned(),
            },
        )
        .await
        .map(Next::into_device)
    }

    /// Reserve a free device for `user`.
    pub async fn reserve(&self, name: &str, user: &str) -> Result<Device> {
        require_non_empty(&[("device", name), ("username", user)])?;
        self.apply(
            name,
            Action::Reserve {
                user: user.to_owned(),
            },
        )
        .await
        .map(Next::into_device)
    }

    pub async fn release(&self, name: &str) -> Result<Device> {
        require_non_empty(&[("device", name)])?;
        self.apply(name, Action::Release)
            .await
            .map(Next::into_device)
    }

    /// Take a device out of service, discarding any active reservation.
    pub async fn set_offline(&self, name: &str) -> Result<Device> {
        require_non_empty(&[("device", name)])?;
        self.apply(name, Action::SetOffline)
            .await
            .map(Next::into_device)
    }

    /// Return an offline device to service.
    pub async fn set_online(&self, name: &str) -> Result<Device> {
        require_non_empty(&[("device", name)])?;
        self.apply(name, Action::SetOnline)
            .await
            .map(Next::into_device)
    }

    /// Remove a device, returning its last state.
    pub async fn delete(&self, name: &str) -> Result<Device> {
        require_non_empty(&[("device", name)])?;
        self.apply(name, Action::Delete)
            .await
            .map(Next::into_device)
    }

    /// Run one transition in its own task, so a dropped caller cannot cut
    /// it off between the store write and the lock release.
    #[tracing::instrument(skip(self))]
    async fn apply(&self, name: &str, action: Action) -> Result<Next> {
        let coordinator = self.coordinator.clone();
        let clock = self.clock.clone();
        let owned_name = name.to_owned();
        let result = tokio::spawn(async move {
            let name = owned_name.as_str();
            coordinator
                .with_exclusive_access(name, |current| {
                    transition(name, current, &action, clock.now())
                })
                .await
        })
        .await
        .unwrap_or_else(|err| Err(StoreError::from(err).into()));

        match &result {
            Ok(next) => {
                let device = next.device();
                match next {
                    Next::Put(_) => info!(
                        status = %device.status(),
                        owner = device.owner(),
                        "device updated"
                    ),
                    Next::Remove(_) => info!("device deleted"),
                }
            }
            Err(LeaseError::Store(err)) => error!(%err, "storage failure"),
            Err(err) => debug!(%err, "transition rejected"),
        }
        result
    }
}
