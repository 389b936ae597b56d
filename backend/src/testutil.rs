//! Shared fixtures for the status-cache and dispatcher tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::{DeviceConfig, PanelConfig};
use crate::db::Db;
use crate::robot::{
    BatteryState, CubeBattery, DeviceError, RobotSession, SessionFactory, SessionOptions,
    VersionState,
};

pub fn test_db() -> Mutex<Db> {
    Mutex::new(Db::connect_to(":memory:").expect("in-memory database"))
}

pub fn test_cfg() -> PanelConfig {
    PanelConfig::default()
}

/// Session factory with a scripted open sequence. An empty script means
/// every open succeeds; each scripted `Err` fails one open in order.
pub struct MockFactory {
    opens: AtomicUsize,
    script: Mutex<Vec<Result<(), DeviceError>>>,
    executed: Arc<Mutex<Vec<String>>>,
}

impl MockFactory {
    pub fn succeeding() -> Self {
        Self::scripted(Vec::new())
    }

    pub fn scripted(script: Vec<Result<(), DeviceError>>) -> Self {
        Self {
            opens: AtomicUsize::new(0),
            script: Mutex::new(script),
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

impl SessionFactory for MockFactory {
    fn open(
        &self,
        _device: &DeviceConfig,
        _options: SessionOptions,
    ) -> Result<Box<dyn RobotSession>, DeviceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        if !script.is_empty() {
            script.remove(0)?;
        }
        Ok(Box::new(MockSession {
            executed: self.executed.clone(),
        }))
    }
}

pub struct MockSession {
    executed: Arc<Mutex<Vec<String>>>,
}

impl MockSession {
    fn record(&mut self, name: &str) -> Result<String, DeviceError> {
        self.executed.lock().unwrap().push(name.to_string());
        Ok(format!("{name}: done"))
    }
}

impl RobotSession for MockSession {
    fn version_state(&mut self) -> Result<VersionState, DeviceError> {
        Ok(VersionState {
            os_version: "2.0.1".to_string(),
        })
    }

    fn battery_state(&mut self) -> Result<BatteryState, DeviceError> {
        Ok(BatteryState {
            battery_volts: 4.1,
            battery_level: 3,
            is_on_charger_platform: true,
            cube_battery: Some(CubeBattery {
                factory_id: "aa:bb:cc:dd".to_string(),
                level: 2,
                battery_volts: 1.39,
            }),
        })
    }

    fn drive_on_charger(&mut self) -> Result<String, DeviceError> {
        self.record("drive_on_charger")
    }

    fn drive_off_charger(&mut self) -> Result<String, DeviceError> {
        self.record("drive_off_charger")
    }

    fn connect_cube(&mut self) -> Result<String, DeviceError> {
        self.record("connect_cube")
    }

    fn disconnect_cube(&mut self) -> Result<String, DeviceError> {
        self.record("disconnect_cube")
    }

    fn dock_with_cube(&mut self) -> Result<String, DeviceError> {
        self.record("dock_with_cube")
    }

    fn set_lift_height(
        &mut self,
        height: f32,
        _max_speed: Option<f32>,
    ) -> Result<String, DeviceError> {
        self.record(&format!("set_lift_height({height})"))
    }
}
