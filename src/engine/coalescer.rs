//! Command coalescer.
//!
//! Intent changes only raise a signal. The coalescer waits until the
//! signal has been quiet for `push_rate`, then reads the latest intended
//! target and sends at most one write for it. Signals that arrive during
//! a write start a new window once the write completes.

use super::device::DeviceContext;
use super::reconciler;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::time::{Instant, sleep};

/// Holds `push_in_flight` from the first signal until the write completes.
struct PushGuard<'a> {
    ctx: &'a DeviceContext,
}

impl<'a> PushGuard<'a> {
    fn acquire(ctx: &'a DeviceContext) -> Self {
        ctx.shadow.mutate(|s| s.push_in_flight = true);
        Self { ctx }
    }
}

impl Drop for PushGuard<'_> {
    fn drop(&mut self) {
        self.ctx.shadow.mutate(|s| s.push_in_flight = false);
    }
}

pub(crate) async fn run(ctx: Arc<DeviceContext>) {
    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            _ = ctx.push_signal.notified() => {}
        }

        let _guard = PushGuard::acquire(&ctx);
        if !debounce(&ctx).await {
            break;
        }
        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            _ = push(&ctx) => {}
        }
    }

    debug!("[Push] {} coalescer stopped", ctx.name());
}

/// Wait until no signal has arrived for the push window. False if the
/// device was cancelled meanwhile.
async fn debounce(ctx: &DeviceContext) -> bool {
    let window = ctx.settings.push_rate;
    let quiet = sleep(window);
    tokio::pin!(quiet);

    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => return false,
            _ = &mut quiet => return true,
            _ = ctx.push_signal.notified() => {
                quiet.as_mut().reset(Instant::now() + window);
            }
        }
    }
}

async fn push(ctx: &Arc<DeviceContext>) {
    let shadow = ctx.shadow.get();
    let Some(target) = shadow.intended_target else {
        debug!("[Push] {} nothing pending", ctx.name());
        return;
    };
    if target.is_satisfied_by(&shadow.observed) {
        debug!("[Push] {} already at {}, skipping", ctx.name(), target);
        return;
    }
    let Some(command) = ctx.profile.command_for(target) else {
        warn!("[Push] {} has no command for {}", ctx.name(), target);
        return;
    };

    info!(
        "[Push] {} sending {} {} ({})",
        ctx.name(),
        command.command,
        command.parameter,
        command.command_type
    );

    match ctx.write(&command).await {
        Ok(()) => {
            debug!("[Push] {} {} acknowledged", ctx.name(), target);
            let echo = !ctx.profile.is_pollable();
            let action = ctx.commit(|s| {
                s.last_error = None;
                if echo {
                    reconciler::apply_write_echo(s, target)
                } else {
                    reconciler::apply_write_sent(s, target)
                }
            });
            ctx.apply_settle(action);
        }
        Err(e) => {
            // Not retried; the next poll reconciles whatever the device did.
            error!("[Push] {} command failed: {}", ctx.name(), e);
            ctx.record_error(&e);
        }
    }
}
