//! Per-device engine: shared context plus the poller and coalescer tasks.

use super::reconciler::{self, SettleAction};
use super::{coalescer, poller};
use crate::config::EngineSettings;
use crate::device::{DeviceProfile, RemoteKey};
use crate::error::{BridgeError, Result};
use crate::input::{CommandRequest, DeviceGateway};
use crate::shadow::{
    DeviceIdentity, LastError, MotionState, Shadow, ShadowHandle, ShadowListener, Target,
};
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use std::future::Future;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Everything one device's tasks share.
pub(crate) struct DeviceContext {
    pub identity: DeviceIdentity,
    pub shadow: ShadowHandle,
    pub gateway: Arc<dyn DeviceGateway>,
    pub profile: Arc<dyn DeviceProfile>,
    pub listener: Arc<dyn ShadowListener>,
    pub settings: EngineSettings,
    /// Wakes the poller to re-evaluate its period.
    pub poll_kick: Notify,
    /// Intent-change signal for the coalescer.
    pub push_signal: Notify,
    /// Serializes writes to the device.
    write_lock: tokio::sync::Mutex<()>,
    settle_task: Mutex<Option<JoinHandle<()>>>,
    pub cancel: CancellationToken,
    pub tracker: TaskTracker,
    /// Runtime the engine was started on; host callbacks may arrive from
    /// threads outside it.
    runtime: Handle,
}

impl DeviceContext {
    pub fn name(&self) -> String {
        self.identity.display_name()
    }

    /// Mutate the shadow and notify the listener if anything visible changed.
    ///
    /// The listener runs after the shadow lock is released.
    pub fn commit<R>(&self, f: impl FnOnce(&mut Shadow) -> R) -> R {
        let (result, changed) = self.shadow.mutate_tracked(f);
        if let Some(snapshot) = changed {
            self.listener.on_shadow_updated(&self.identity.id, &snapshot);
        }
        result
    }

    /// Store `error` as the device's last error and report it.
    pub fn record_error(&self, error: &BridgeError) {
        let kind = error.kind();
        let message = error.to_string();
        self.commit(|s| s.last_error = Some(LastError::new(kind, message.clone())));
        self.listener.on_error(&self.identity.id, kind, &message);
    }

    /// Spawn a device task on the engine's runtime.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn_on(task, &self.runtime)
    }

    /// Period the poller should use right now.
    pub fn poll_period(&self) -> Duration {
        let shadow = self.shadow.get();
        if shadow.assumed_motion || shadow.motion_state != MotionState::Idle {
            self.settings.moving_refresh_rate
        } else {
            self.settings.refresh_rate
        }
    }

    /// Carry out a settle-timer action returned by the reconciler.
    pub fn apply_settle(self: &Arc<Self>, action: SettleAction) {
        match action {
            SettleAction::Keep => {}
            SettleAction::Cancel => {
                if let Some(handle) = self.settle_task.lock().take() {
                    handle.abort();
                }
            }
            SettleAction::Start(epoch) => {
                let ctx = Arc::clone(self);
                let handle = self.spawn(async move {
                    tokio::select! {
                        _ = ctx.cancel.cancelled() => {}
                        _ = tokio::time::sleep(ctx.settings.settle) => {
                            if ctx.commit(|s| reconciler::apply_settle_expired(s, epoch)) {
                                debug!("[Settle] {} settle window expired", ctx.name());
                            }
                        }
                    }
                });
                if let Some(previous) = self.settle_task.lock().replace(handle) {
                    previous.abort();
                }
            }
        }
    }

    /// Send one command and check the API envelope. Writes to the same
    /// device never overlap.
    pub async fn write(&self, command: &CommandRequest) -> Result<()> {
        let _lock = self.write_lock.lock().await;
        self.gateway
            .write_command(&self.identity.id, command)
            .await?
            .into_success()
            .map(|_| ())
    }
}

/// Handle to a running device engine.
pub struct DeviceEngine {
    ctx: Arc<DeviceContext>,
}

impl DeviceEngine {
    /// Start the poller (for pollable devices) and the coalescer.
    ///
    /// Must be called from within a Tokio runtime. Later calls such as
    /// [`on_intent_change`](Self::on_intent_change) may come from any thread.
    pub fn spawn(
        identity: DeviceIdentity,
        shadow: ShadowHandle,
        gateway: Arc<dyn DeviceGateway>,
        profile: Arc<dyn DeviceProfile>,
        listener: Arc<dyn ShadowListener>,
        settings: EngineSettings,
        cancel: CancellationToken,
    ) -> Self {
        let ctx = Arc::new(DeviceContext {
            identity,
            shadow,
            gateway,
            profile,
            listener,
            settings,
            poll_kick: Notify::new(),
            push_signal: Notify::new(),
            write_lock: tokio::sync::Mutex::new(()),
            settle_task: Mutex::new(None),
            cancel,
            tracker: TaskTracker::new(),
            runtime: Handle::current(),
        });

        info!(
            "[Engine] {} started (refresh {:?}, push window {:?})",
            ctx.name(),
            ctx.settings.refresh_rate,
            ctx.settings.push_rate
        );

        if ctx.profile.is_pollable() {
            ctx.spawn(poller::run(Arc::clone(&ctx)));
        }
        ctx.spawn(coalescer::run(Arc::clone(&ctx)));

        Self { ctx }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.ctx.identity
    }

    pub fn shadow(&self) -> Shadow {
        self.ctx.shadow.get()
    }

    /// Record a local intent and schedule its push.
    pub fn on_intent_change(&self, target: Target) -> Result<()> {
        let target = self.ctx.profile.validate_target(target).map_err(|reason| {
            BridgeError::UnsupportedIntent {
                device: self.ctx.identity.id.to_string(),
                reason,
            }
        })?;

        debug!("[Engine] {} intent: {}", self.ctx.name(), target);
        let action = self.ctx.commit(|s| reconciler::apply_intent(s, target));
        self.ctx.apply_settle(action);
        self.ctx.poll_kick.notify_one();
        self.ctx.push_signal.notify_one();
        Ok(())
    }

    /// Poll now, out of band. Subject to the same skip rule as ticks.
    pub fn refresh_now(&self) {
        if !self.ctx.profile.is_pollable() {
            debug!("[Poll] {} has no status endpoint", self.ctx.name());
            return;
        }
        poller::poll_tick(&self.ctx);
    }

    /// Press a momentary remote key. Bypasses the coalescer's state
    /// comparison but still waits for any write in flight.
    pub async fn send_key(&self, key: RemoteKey) -> Result<()> {
        let command = self.ctx.profile.key_command(key).ok_or_else(|| {
            BridgeError::UnsupportedIntent {
                device: self.ctx.identity.id.to_string(),
                reason: format!("no remote key {}", key),
            }
        })?;

        info!(
            "[Push] {} key {} -> {} {} ({})",
            self.ctx.name(),
            key,
            command.command,
            command.parameter,
            command.command_type
        );
        let result = self.ctx.write(&command).await;
        match &result {
            Ok(()) => self.ctx.commit(|s| s.last_error = None),
            Err(e) => self.ctx.record_error(e),
        }
        result
    }

    /// Cancel every task of this device and wait for them to finish.
    pub async fn shutdown(&self) {
        self.ctx.cancel.cancel();
        self.ctx.tracker.close();
        self.ctx.tracker.wait().await;
        debug!("[Engine] {} stopped", self.ctx.name());
    }
}
