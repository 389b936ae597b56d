//! Device session layer.
//!
//! The vendor SDK adapter lives behind [`SessionFactory`]; everything above
//! it only sees trait objects, so the panel runs against the bundled
//! simulator or against real hardware without code changes.

use common::command::RobotCommand;
use common::req::ErrorCode;
use thiserror::Error;

use crate::config::DeviceConfig;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no robot found for serial {0}")]
    NotFound(String),
    #[error("robot did not grant control before the timeout")]
    ControlTimeout,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("sdk failure: {0}")]
    Sdk(String),
}

/// Map a device failure onto the code surfaced to the request layer.
/// Transport failures land in the catch-all; callers that want to retry
/// them must do so before classifying.
pub fn classify(err: &DeviceError) -> ErrorCode {
    match err {
        DeviceError::NotFound(_) => ErrorCode::DeviceNotFound,
        DeviceError::ControlTimeout => ErrorCode::DeviceBusy,
        DeviceError::Transport(_) | DeviceError::Sdk(_) => ErrorCode::MultipleDevicesOrUnknown,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub requires_behavior_control: bool,
    pub cache_animation_list: bool,
    pub enable_camera_feed: bool,
}

impl SessionOptions {
    /// Read-only telemetry pull: no behavior control, no animation cache.
    pub fn telemetry() -> Self {
        Self {
            requires_behavior_control: false,
            cache_animation_list: false,
            enable_camera_feed: false,
        }
    }

    /// Full control session used for command batches.
    pub fn control() -> Self {
        Self {
            requires_behavior_control: true,
            cache_animation_list: true,
            enable_camera_feed: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VersionState {
    pub os_version: String,
}

#[derive(Debug, Clone)]
pub struct BatteryState {
    pub battery_volts: f32,
    pub battery_level: i32,
    pub is_on_charger_platform: bool,
    /// Absent when no cube is paired.
    pub cube_battery: Option<CubeBattery>,
}

#[derive(Debug, Clone)]
pub struct CubeBattery {
    pub factory_id: String,
    pub level: i32,
    pub battery_volts: f32,
}

/// A scoped connection to one robot. Dropped when the refresh or the
/// command batch it was opened for is over.
pub trait RobotSession {
    fn version_state(&mut self) -> Result<VersionState, DeviceError>;
    fn battery_state(&mut self) -> Result<BatteryState, DeviceError>;

    fn drive_on_charger(&mut self) -> Result<String, DeviceError>;
    fn drive_off_charger(&mut self) -> Result<String, DeviceError>;
    fn connect_cube(&mut self) -> Result<String, DeviceError>;
    fn disconnect_cube(&mut self) -> Result<String, DeviceError>;
    fn dock_with_cube(&mut self) -> Result<String, DeviceError>;
    fn set_lift_height(&mut self, height: f32, max_speed: Option<f32>)
        -> Result<String, DeviceError>;
}

pub trait SessionFactory: Send + Sync {
    fn open(
        &self,
        device: &DeviceConfig,
        options: SessionOptions,
    ) -> Result<Box<dyn RobotSession>, DeviceError>;
}

/// Route a parsed command to the matching session capability.
pub fn run_command(
    session: &mut dyn RobotSession,
    command: &RobotCommand,
) -> Result<String, DeviceError> {
    match command {
        RobotCommand::DriveOnCharger => session.drive_on_charger(),
        RobotCommand::DriveOffCharger => session.drive_off_charger(),
        RobotCommand::ConnectCube => session.connect_cube(),
        RobotCommand::DisconnectCube => session.disconnect_cube(),
        RobotCommand::DockWithCube => session.dock_with_cube(),
        RobotCommand::SetLiftHeight { height, max_speed } => {
            session.set_lift_height(*height, *max_speed)
        }
    }
}

/// Deterministic in-process robot. Stands in for the vendor SDK adapter in
/// development setups and in tests that want a live-looking device.
#[derive(Debug, Default)]
pub struct SimFactory;

impl SessionFactory for SimFactory {
    fn open(
        &self,
        device: &DeviceConfig,
        options: SessionOptions,
    ) -> Result<Box<dyn RobotSession>, DeviceError> {
        log::debug!(
            "sim session for {} ({}), behavior_control={}",
            device.name,
            device.serial,
            options.requires_behavior_control
        );
        Ok(Box::new(SimSession {
            name: device.name.clone(),
            docked: true,
            cube_connected: false,
        }))
    }
}

pub struct SimSession {
    name: String,
    docked: bool,
    cube_connected: bool,
}

impl RobotSession for SimSession {
    fn version_state(&mut self) -> Result<VersionState, DeviceError> {
        Ok(VersionState {
            os_version: "1.8.1.6051".to_string(),
        })
    }

    fn battery_state(&mut self) -> Result<BatteryState, DeviceError> {
        Ok(BatteryState {
            battery_volts: if self.docked { 4.2 } else { 3.8 },
            battery_level: if self.docked { 3 } else { 2 },
            is_on_charger_platform: self.docked,
            cube_battery: Some(CubeBattery {
                factory_id: "1a:2b:3c:4d".to_string(),
                level: 2,
                battery_volts: 1.42,
            }),
        })
    }

    fn drive_on_charger(&mut self) -> Result<String, DeviceError> {
        self.docked = true;
        Ok(format!("{} drove onto the charger", self.name))
    }

    fn drive_off_charger(&mut self) -> Result<String, DeviceError> {
        self.docked = false;
        Ok(format!("{} drove off the charger", self.name))
    }

    fn connect_cube(&mut self) -> Result<String, DeviceError> {
        self.cube_connected = true;
        Ok("connected to cube 1a:2b:3c:4d".to_string())
    }

    fn disconnect_cube(&mut self) -> Result<String, DeviceError> {
        self.cube_connected = false;
        Ok("cube disconnected".to_string())
    }

    fn dock_with_cube(&mut self) -> Result<String, DeviceError> {
        if !self.cube_connected {
            return Err(DeviceError::Sdk("no cube connected".to_string()));
        }
        Ok("docked with cube".to_string())
    }

    fn set_lift_height(
        &mut self,
        height: f32,
        max_speed: Option<f32>,
    ) -> Result<String, DeviceError> {
        match max_speed {
            Some(speed) => Ok(format!("lift at {height} (max speed {speed})")),
            None => Ok(format!("lift at {height}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim() -> Box<dyn RobotSession> {
        let device = DeviceConfig {
            serial: "00e20100".to_string(),
            ip: "192.168.1.50".to_string(),
            name: "Robot-K4F".to_string(),
        };
        SimFactory.open(&device, SessionOptions::control()).unwrap()
    }

    #[test]
    fn classify_covers_the_taxonomy() {
        assert_eq!(
            classify(&DeviceError::NotFound("x".into())),
            ErrorCode::DeviceNotFound
        );
        assert_eq!(classify(&DeviceError::ControlTimeout), ErrorCode::DeviceBusy);
        assert_eq!(
            classify(&DeviceError::Transport("reset".into())),
            ErrorCode::MultipleDevicesOrUnknown
        );
        assert_eq!(
            classify(&DeviceError::Sdk("boom".into())),
            ErrorCode::MultipleDevicesOrUnknown
        );
    }

    #[test]
    fn sim_reports_full_telemetry() {
        let mut session = sim();
        let battery = session.battery_state().unwrap();
        assert!(battery.is_on_charger_platform);
        assert!(battery.cube_battery.is_some());
        assert!(!session.version_state().unwrap().os_version.is_empty());
    }

    #[test]
    fn sim_requires_a_cube_before_docking() {
        let mut session = sim();
        assert!(session.dock_with_cube().is_err());
        session.connect_cube().unwrap();
        assert!(session.dock_with_cube().is_ok());
    }

    #[test]
    fn run_command_reaches_every_capability() {
        let mut session = sim();
        let commands = [
            RobotCommand::DriveOffCharger,
            RobotCommand::ConnectCube,
            RobotCommand::DockWithCube,
            RobotCommand::SetLiftHeight {
                height: 100.0,
                max_speed: None,
            },
            RobotCommand::DisconnectCube,
            RobotCommand::DriveOnCharger,
        ];
        for command in &commands {
            assert!(run_command(session.as_mut(), command).is_ok());
        }
    }
}
