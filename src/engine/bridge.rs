//! Bridge orchestrator.
//!
//! Owns the shadow store and one [`DeviceEngine`] per configured device.
//! This is the host-facing surface: hosts submit intents and read
//! snapshots here, and are told about changes through their
//! [`ShadowListener`].

use super::device::DeviceEngine;
use crate::config::{Config, DeviceConfig, EngineSettings};
use crate::device::{RemoteKey, profile_for};
use crate::error::{BridgeError, Result};
use crate::input::DeviceGateway;
use crate::shadow::{DeviceId, Shadow, ShadowListener, ShadowStore, Target};
use futures_util::future::join_all;
use log::{error, info, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct Bridge {
    config: Config,
    gateway: Arc<dyn DeviceGateway>,
    listener: Arc<dyn ShadowListener>,
    store: ShadowStore,
    engines: RwLock<HashMap<DeviceId, Arc<DeviceEngine>>>,
    cancel: CancellationToken,
}

impl Bridge {
    pub fn new(
        config: Config,
        gateway: Arc<dyn DeviceGateway>,
        listener: Arc<dyn ShadowListener>,
    ) -> Self {
        Self {
            config,
            gateway,
            listener,
            store: ShadowStore::new(),
            engines: RwLock::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Start an engine for every configured device.
    ///
    /// A device with invalid settings is reported through the listener and
    /// left out; the rest start normally. Returns the number started.
    pub fn start(&self) -> usize {
        if self.config.devices.is_empty() {
            warn!("[Bridge] No devices configured");
            return 0;
        }

        let mut started = 0;
        for device in &self.config.devices {
            match self.add_device(device) {
                Ok(true) => started += 1,
                Ok(false) => {}
                Err(e) => error!("[Bridge] {} not started: {}", device.id, e),
            }
        }
        info!(
            "[Bridge] {} of {} devices running",
            started,
            self.config.devices.len()
        );
        started
    }

    /// Validate and start one device. `Ok(false)` if it is hidden.
    pub fn add_device(&self, device: &DeviceConfig) -> Result<bool> {
        if self.config.is_hidden(&device.id) {
            info!("[Bridge] {} is hidden, skipping", device.id);
            return Ok(false);
        }

        let identity = device.identity();
        if self.engines.read().contains_key(&identity.id) {
            return Err(BridgeError::ConfigurationError(format!(
                "device {} configured twice",
                identity.id
            )));
        }

        let settings = match EngineSettings::resolve(&self.config.options, device) {
            Ok(settings) => settings,
            Err(e) => {
                self.listener
                    .on_error(&identity.id, e.kind(), &e.to_string());
                return Err(e);
            }
        };

        let profile = profile_for(identity.kind, &self.config.options);
        let id = identity.id.clone();
        let engine = DeviceEngine::spawn(
            identity,
            self.store.handle(&id),
            Arc::clone(&self.gateway),
            profile,
            Arc::clone(&self.listener),
            settings,
            self.cancel.child_token(),
        );
        self.engines.write().insert(id, Arc::new(engine));
        Ok(true)
    }

    fn engine(&self, id: &DeviceId) -> Result<Arc<DeviceEngine>> {
        self.engines
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| BridgeError::UnknownDevice(id.to_string()))
    }

    /// Submit a local intent for `id`.
    pub fn on_intent_change(&self, id: &DeviceId, target: Target) -> Result<()> {
        self.engine(id)?.on_intent_change(target)
    }

    /// Poll `id` now instead of waiting for its next tick.
    pub fn refresh_now(&self, id: &DeviceId) -> Result<()> {
        self.engine(id)?.refresh_now();
        Ok(())
    }

    pub async fn send_key(&self, id: &DeviceId, key: RemoteKey) -> Result<()> {
        let engine = self.engine(id)?;
        engine.send_key(key).await
    }

    /// Snapshot of a running device's shadow.
    pub fn shadow(&self, id: &DeviceId) -> Option<Shadow> {
        if !self.engines.read().contains_key(id) {
            return None;
        }
        self.store.peek(id)
    }

    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<_> = self.engines.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop a device's tasks and destroy its shadow.
    pub async fn remove_device(&self, id: &DeviceId) -> Result<()> {
        let engine = self
            .engines
            .write()
            .remove(id)
            .ok_or_else(|| BridgeError::UnknownDevice(id.to_string()))?;
        engine.shutdown().await;
        self.store.remove(id);
        info!("[Bridge] {} removed", id);
        Ok(())
    }

    /// Cancel every timer and task and wait for them to finish.
    pub async fn shutdown(&self) {
        info!("[Bridge] Shutting down");
        self.cancel.cancel();
        let engines: Vec<_> = self.engines.write().drain().map(|(_, e)| e).collect();
        join_all(engines.iter().map(|engine| engine.shutdown())).await;
    }
}
