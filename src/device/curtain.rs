//! Curtain motor profile.
//!
//! The cloud reports `slidePosition` as percent closed; the host model is
//! percent open, so every value crossing the boundary is inverted.

use super::DeviceProfile;
use crate::config::CurtainOptions;
use crate::engine::ClampPolicy;
use crate::error::Result;
use crate::input::CommandRequest;
use crate::shadow::{DeviceKind, Observed, Target};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurtainStatus {
    slide_position: u8,
    #[serde(default)]
    moving: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CurtainProfile {
    clamp: ClampPolicy,
    /// Targets snap to multiples of this step when set.
    min_step: Option<u8>,
}

impl CurtainProfile {
    pub fn from_options(options: &CurtainOptions) -> Self {
        Self {
            clamp: ClampPolicy::new(options.set_min, options.set_max),
            min_step: options.set_min_step.filter(|step| *step > 1),
        }
    }

    fn snap(&self, position: u8) -> u8 {
        let position = position.min(100);
        match self.min_step {
            Some(step) => {
                let snapped = (u16::from(position) + u16::from(step) / 2) / u16::from(step)
                    * u16::from(step);
                snapped.min(100) as u8
            }
            None => position,
        }
    }
}

impl DeviceProfile for CurtainProfile {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Curtain
    }

    fn clamp(&self) -> ClampPolicy {
        self.clamp
    }

    fn decode_status(&self, body: &Value) -> Result<Observed> {
        let status = CurtainStatus::deserialize(body)?;
        Ok(Observed {
            position: Some(100 - status.slide_position.min(100)),
            moving: Some(status.moving),
            ..Default::default()
        })
    }

    fn validate_target(&self, target: Target) -> std::result::Result<Target, String> {
        match target {
            Target::Position(p) => Ok(Target::Position(self.snap(p))),
            Target::Power(_) => Err("curtains accept position targets only".to_string()),
        }
    }

    fn command_for(&self, target: Target) -> Option<CommandRequest> {
        match target {
            Target::Position(p) => Some(CommandRequest::command(
                "setPosition",
                format!("0,ff,{}", 100 - p.min(100)),
            )),
            Target::Power(_) => None,
        }
    }
}
