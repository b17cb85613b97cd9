//! Status poller.
//!
//! One timer per device. A tick is dropped, not queued, while a read for
//! the same device is still outstanding. Pending or in-flight pushes do not
//! hold polls back.

use super::device::DeviceContext;
use super::reconciler;
use crate::error::Result;
use crate::shadow::Observed;
use log::{debug, error, info};
use std::sync::Arc;
use tokio::time::{Instant, sleep_until};

/// Holds `poll_in_flight` for the duration of one read.
struct PollGuard {
    ctx: Arc<DeviceContext>,
}

impl PollGuard {
    fn try_acquire(ctx: &Arc<DeviceContext>) -> Option<Self> {
        let acquired = ctx.shadow.mutate(|s| {
            if s.poll_in_flight {
                false
            } else {
                s.poll_in_flight = true;
                true
            }
        });
        acquired.then(|| Self {
            ctx: Arc::clone(ctx),
        })
    }
}

impl Drop for PollGuard {
    fn drop(&mut self) {
        self.ctx.shadow.mutate(|s| s.poll_in_flight = false);
    }
}

pub(crate) async fn run(ctx: Arc<DeviceContext>) {
    info!(
        "[Poll] {} polling every {:?} ({:?} while moving)",
        ctx.name(),
        ctx.settings.refresh_rate,
        ctx.settings.moving_refresh_rate
    );

    let mut last_tick = Instant::now();
    poll_tick(&ctx);

    loop {
        // Re-evaluated on every kick, so an intent shortens a pending
        // idle-period sleep to the moving period.
        let deadline = last_tick + ctx.poll_period();
        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            _ = sleep_until(deadline) => {
                last_tick = Instant::now();
                poll_tick(&ctx);
            }
            _ = ctx.poll_kick.notified() => {}
        }
    }

    debug!("[Poll] {} poller stopped", ctx.name());
}

/// Start one read unless another is outstanding. Never waits for the read.
pub(crate) fn poll_tick(ctx: &Arc<DeviceContext>) {
    let Some(guard) = PollGuard::try_acquire(ctx) else {
        debug!("[Poll] {} busy, skipping tick", ctx.name());
        return;
    };

    let task = Arc::clone(ctx);
    ctx.spawn(async move {
        let ctx = task;
        let _guard = guard;
        tokio::select! {
            _ = ctx.cancel.cancelled() => {}
            result = read(&ctx) => match result {
                Ok(observed) => {
                    debug!("[Poll] {} status {:?}", ctx.name(), observed);
                    let clamp = ctx.profile.clamp();
                    let action = ctx.commit(|s| {
                        s.last_error = None;
                        reconciler::apply_poll(s, &observed, &clamp)
                    });
                    ctx.apply_settle(action);
                    ctx.poll_kick.notify_one();
                }
                Err(e) => {
                    error!("[Poll] {} refresh failed: {}", ctx.name(), e);
                    ctx.record_error(&e);
                }
            }
        }
    });
}

async fn read(ctx: &DeviceContext) -> Result<Observed> {
    let body = ctx
        .gateway
        .read_status(&ctx.identity.id)
        .await?
        .into_success()?;
    ctx.profile.decode_status(&body)
}
