//! Simulated SwitchBot cloud for development and testing.
//!
//! Curtains move at a fixed speed toward the last `setPosition`, optionally
//! after a start delay during which the backend still reports them idle.
//! Responses can be scripted, failures injected, and reads or writes held
//! back to model a slow backend.

use super::{CommandRequest, DeviceGateway, StatusResponse};
use crate::error::{BridgeError, Result};
use crate::shadow::DeviceId;
use async_trait::async_trait;
use log::{debug, info};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tokio::time::Instant;

/// Injected failure for the next read or write of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The request never completes successfully at the transport level.
    Transport,
    /// The API answers with a non-success message.
    Api { status_code: i64, message: String },
}

impl Fault {
    fn into_response(self, device: &DeviceId) -> Result<StatusResponse> {
        match self {
            Fault::Transport => Err(BridgeError::TransportFailure(format!(
                "simulated timeout talking to {}",
                device
            ))),
            Fault::Api {
                status_code,
                message,
            } => Ok(StatusResponse {
                status_code,
                message,
                body: Value::Null,
            }),
        }
    }
}

struct SimCurtain {
    /// SwitchBot slide position: 0 is fully open, 100 fully closed.
    slide: f64,
    target_slide: f64,
    /// Percent per second.
    speed: f64,
    motion_delay: Duration,
    starts_at: Instant,
    updated: Instant,
}

impl SimCurtain {
    fn new(position: u8, speed: f64, motion_delay: Duration) -> Self {
        let slide = 100.0 - f64::from(position.min(100));
        let now = Instant::now();
        Self {
            slide,
            target_slide: slide,
            speed,
            motion_delay,
            starts_at: now,
            updated: now,
        }
    }

    fn advance(&mut self, now: Instant) {
        let from = self.updated.max(self.starts_at);
        if now > from {
            let step = self.speed * (now - from).as_secs_f64();
            let delta = self.target_slide - self.slide;
            if delta.abs() <= step {
                self.slide = self.target_slide;
            } else {
                self.slide += step * delta.signum();
            }
        }
        self.updated = self.updated.max(now);
    }

    fn moving(&self, now: Instant) -> bool {
        now >= self.starts_at && (self.slide - self.target_slide).abs() > f64::EPSILON
    }

    fn set_target(&mut self, slide: u8, now: Instant) {
        self.advance(now);
        self.target_slide = f64::from(slide.min(100));
        self.starts_at = now + self.motion_delay;
    }

    fn position(&self) -> u8 {
        (100.0 - self.slide).round().clamp(0.0, 100.0) as u8
    }

    fn body(&self, device: &DeviceId, now: Instant) -> Value {
        json!({
            "deviceId": device.as_str(),
            "deviceType": "Curtain",
            "calibrate": true,
            "group": false,
            "moving": self.moving(now),
            "slidePosition": self.slide.round() as i64,
        })
    }
}

enum SimDevice {
    Curtain(SimCurtain),
    Meter { temperature: f32, humidity: u8 },
    AirPurifier { on: bool },
}

#[derive(Default)]
struct CloudState {
    devices: HashMap<DeviceId, SimDevice>,
    scripted: HashMap<DeviceId, VecDeque<Value>>,
    read_faults: HashMap<DeviceId, VecDeque<Fault>>,
    write_faults: HashMap<DeviceId, VecDeque<Fault>>,
    reads: HashMap<DeviceId, usize>,
    writes: Vec<(DeviceId, CommandRequest)>,
}

impl CloudState {
    fn read(&mut self, device: &DeviceId) -> Result<StatusResponse> {
        if let Some(fault) = self.read_faults.get_mut(device).and_then(VecDeque::pop_front) {
            return fault.into_response(device);
        }
        if let Some(body) = self.scripted.get_mut(device).and_then(VecDeque::pop_front) {
            return Ok(StatusResponse::success(body));
        }

        let now = Instant::now();
        let body = match self.devices.get_mut(device) {
            Some(SimDevice::Curtain(curtain)) => {
                curtain.advance(now);
                curtain.body(device, now)
            }
            Some(SimDevice::Meter {
                temperature,
                humidity,
            }) => json!({
                "deviceId": device.as_str(),
                "deviceType": "Meter",
                "temperature": temperature,
                "humidity": humidity,
            }),
            Some(SimDevice::AirPurifier { .. }) => {
                return Ok(api_error(160, "infrared remotes have no status"));
            }
            None => return Ok(api_error(152, "device not found")),
        };
        Ok(StatusResponse::success(body))
    }

    fn write(&mut self, device: &DeviceId, command: &CommandRequest) -> Result<StatusResponse> {
        if let Some(fault) = self.write_faults.get_mut(device).and_then(VecDeque::pop_front) {
            return fault.into_response(device);
        }

        let now = Instant::now();
        match (self.devices.get_mut(device), command.command.as_str()) {
            (Some(SimDevice::Curtain(curtain)), "setPosition") => {
                let Some(slide) = parse_slide(&command.parameter) else {
                    return Ok(api_error(160, "invalid setPosition parameter"));
                };
                curtain.set_target(slide, now);
                info!("[Sim] {} curtain moving to slide position {}", device, slide);
            }
            (Some(SimDevice::Curtain(curtain)), "turnOpen") => curtain.set_target(0, now),
            (Some(SimDevice::Curtain(curtain)), "turnClose") => curtain.set_target(100, now),
            (Some(SimDevice::AirPurifier { on }), "turnOn") => *on = true,
            (Some(SimDevice::AirPurifier { on }), "turnOff") => *on = false,
            (Some(SimDevice::AirPurifier { .. }), "volumeAdd" | "volumeSub") => {}
            (Some(_), _) => return Ok(api_error(160, "command is not supported")),
            (None, _) => return Ok(api_error(152, "device not found")),
        }
        Ok(StatusResponse::success(json!({})))
    }
}

fn api_error(status_code: i64, message: &str) -> StatusResponse {
    StatusResponse {
        status_code,
        message: message.to_string(),
        body: Value::Null,
    }
}

/// `"0,ff,<slide>"` -> slide position.
fn parse_slide(parameter: &str) -> Option<u8> {
    let mut parts = parameter.split(',');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(_), Some(slide), None) => slide.trim().parse::<u8>().ok().filter(|s| *s <= 100),
        _ => None,
    }
}

/// In-process stand-in for the SwitchBot cloud.
pub struct SimulatedCloud {
    state: Mutex<CloudState>,
    read_gate: Arc<RwLock<()>>,
    write_gate: Arc<RwLock<()>>,
}

impl Default for SimulatedCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCloud {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CloudState::default()),
            read_gate: Arc::new(RwLock::new(())),
            write_gate: Arc::new(RwLock::new(())),
        }
    }

    /// Add a curtain at `position` (0 closed, 100 open) moving 10%/s.
    pub fn with_curtain(self, id: impl Into<DeviceId>, position: u8) -> Self {
        self.with_curtain_motion(id, position, 10.0, Duration::ZERO)
    }

    /// Add a curtain with explicit motor speed and start delay.
    pub fn with_curtain_motion(
        self,
        id: impl Into<DeviceId>,
        position: u8,
        speed: f64,
        motion_delay: Duration,
    ) -> Self {
        self.state.lock().devices.insert(
            id.into(),
            SimDevice::Curtain(SimCurtain::new(position, speed, motion_delay)),
        );
        self
    }

    pub fn with_meter(self, id: impl Into<DeviceId>, temperature: f32, humidity: u8) -> Self {
        self.state.lock().devices.insert(
            id.into(),
            SimDevice::Meter {
                temperature,
                humidity,
            },
        );
        self
    }

    pub fn with_air_purifier(self, id: impl Into<DeviceId>) -> Self {
        self.state
            .lock()
            .devices
            .insert(id.into(), SimDevice::AirPurifier { on: false });
        self
    }

    /// Return `body` as the next successful status of `id`, ahead of the
    /// simulated device state.
    pub fn script_status(&self, id: &DeviceId, body: Value) {
        self.state
            .lock()
            .scripted
            .entry(id.clone())
            .or_default()
            .push_back(body);
    }

    pub fn fail_next_read(&self, id: &DeviceId, fault: Fault) {
        self.state
            .lock()
            .read_faults
            .entry(id.clone())
            .or_default()
            .push_back(fault);
    }

    pub fn fail_next_write(&self, id: &DeviceId, fault: Fault) {
        self.state
            .lock()
            .write_faults
            .entry(id.clone())
            .or_default()
            .push_back(fault);
    }

    /// Block every read until the returned guard is dropped.
    pub async fn hold_reads(&self) -> OwnedRwLockWriteGuard<()> {
        self.read_gate.clone().write_owned().await
    }

    /// Block every write until the returned guard is dropped.
    pub async fn hold_writes(&self) -> OwnedRwLockWriteGuard<()> {
        self.write_gate.clone().write_owned().await
    }

    /// Number of status reads issued for `id`, including held ones.
    pub fn read_count(&self, id: &DeviceId) -> usize {
        self.state.lock().reads.get(id).copied().unwrap_or(0)
    }

    /// Every command written to `id`, oldest first, including held ones.
    pub fn writes(&self, id: &DeviceId) -> Vec<CommandRequest> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|(d, _)| d == id)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn set_meter(&self, id: &DeviceId, temperature: f32, humidity: u8) {
        if let Some(SimDevice::Meter {
            temperature: t,
            humidity: h,
        }) = self.state.lock().devices.get_mut(id)
        {
            *t = temperature;
            *h = humidity;
        }
    }

    /// Host-facing position (0 closed, 100 open) of a simulated curtain.
    pub fn curtain_position(&self, id: &DeviceId) -> Option<u8> {
        let mut state = self.state.lock();
        match state.devices.get_mut(id) {
            Some(SimDevice::Curtain(curtain)) => {
                curtain.advance(Instant::now());
                Some(curtain.position())
            }
            _ => None,
        }
    }

    pub fn purifier_on(&self, id: &DeviceId) -> Option<bool> {
        match self.state.lock().devices.get(id) {
            Some(SimDevice::AirPurifier { on }) => Some(*on),
            _ => None,
        }
    }
}

#[async_trait]
impl DeviceGateway for SimulatedCloud {
    async fn read_status(&self, device: &DeviceId) -> Result<StatusResponse> {
        *self.state.lock().reads.entry(device.clone()).or_default() += 1;
        let _gate = self.read_gate.read().await;
        debug!("[Sim] status read for {}", device);
        self.state.lock().read(device)
    }

    async fn write_command(
        &self,
        device: &DeviceId,
        command: &CommandRequest,
    ) -> Result<StatusResponse> {
        self.state
            .lock()
            .writes
            .push((device.clone(), command.clone()));
        let _gate = self.write_gate.read().await;
        debug!("[Sim] command for {}: {:?}", device, command);
        self.state.lock().write(device, command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slide() {
        assert_eq!(parse_slide("0,ff,20"), Some(20));
        assert_eq!(parse_slide("0,ff,101"), None);
        assert_eq!(parse_slide("20"), None);
        assert_eq!(parse_slide("0,ff,20,1"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_curtain_moves_toward_target() {
        let id = DeviceId::new("C1");
        let cloud = SimulatedCloud::new().with_curtain(id.clone(), 20);

        let body = cloud.read_status(&id).await.unwrap().into_success().unwrap();
        assert_eq!(body["slidePosition"], 80);
        assert_eq!(body["moving"], false);

        cloud
            .write_command(&id, &CommandRequest::command("setPosition", "0,ff,20"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        let body = cloud.read_status(&id).await.unwrap().into_success().unwrap();
        assert_eq!(body["moving"], true);
        assert_eq!(body["slidePosition"], 50);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(cloud.curtain_position(&id), Some(80));
        let body = cloud.read_status(&id).await.unwrap().into_success().unwrap();
        assert_eq!(body["moving"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn test_motion_delay_reports_idle_first() {
        let id = DeviceId::new("C1");
        let cloud = SimulatedCloud::new().with_curtain_motion(
            id.clone(),
            0,
            10.0,
            Duration::from_secs(2),
        );
        cloud
            .write_command(&id, &CommandRequest::command("setPosition", "0,ff,0"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let body = cloud.read_status(&id).await.unwrap().into_success().unwrap();
        assert_eq!(body["moving"], false);
        assert_eq!(body["slidePosition"], 100);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let body = cloud.read_status(&id).await.unwrap().into_success().unwrap();
        assert_eq!(body["moving"], true);
    }

    #[tokio::test]
    async fn test_scripted_and_faults() {
        let id = DeviceId::new("M1");
        let cloud = SimulatedCloud::new().with_meter(id.clone(), 21.5, 40);

        cloud.fail_next_read(&id, Fault::Transport);
        cloud.fail_next_read(
            &id,
            Fault::Api {
                status_code: 161,
                message: "device offline".into(),
            },
        );
        cloud.script_status(&id, json!({"temperature": 30.0, "humidity": 10}));

        assert!(cloud.read_status(&id).await.is_err());
        assert!(!cloud.read_status(&id).await.unwrap().is_success());
        let body = cloud.read_status(&id).await.unwrap().into_success().unwrap();
        assert_eq!(body["humidity"], 10);
        let body = cloud.read_status(&id).await.unwrap().into_success().unwrap();
        assert_eq!(body["humidity"], 40);
        assert_eq!(cloud.read_count(&id), 4);
    }

    #[tokio::test]
    async fn test_purifier_commands() {
        let id = DeviceId::new("IR1");
        let cloud = SimulatedCloud::new().with_air_purifier(id.clone());

        let resp = cloud
            .write_command(&id, &CommandRequest::command("turnOn", "default"))
            .await
            .unwrap();
        assert!(resp.is_success());
        assert_eq!(cloud.purifier_on(&id), Some(true));
        assert!(!cloud.read_status(&id).await.unwrap().is_success());
        assert_eq!(cloud.writes(&id).len(), 1);

        let unknown = cloud
            .write_command(&DeviceId::new("nope"), &CommandRequest::command("turnOn", "default"))
            .await
            .unwrap();
        assert_eq!(unknown.status_code, 152);
    }
}
