//! Device status cache.
//!
//! A single row holds the last telemetry pull. Refreshes are throttled by
//! the staleness threshold; inside the window the row's timestamp is merely
//! touched and the device is never contacted.

use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use common::req::ErrorCode;

use crate::config::PanelConfig;
use crate::db::{self, Db, NewStatus};
use crate::robot::{classify, DeviceError, SessionFactory, SessionOptions};
use crate::utils;

/// Seconds after which the cached row counts as stale.
pub const REFRESH_THRESHOLD_SECS: i64 = 15;
/// A freshly created row is backdated past the threshold so the next call
/// performs a real refresh.
const BACKDATE_SECS: i64 = 20;
const TRANSPORT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Refresh the cached status row, or touch it if it is still fresh and
/// `force` is off. A transient transport failure is retried exactly once,
/// forced, after a short delay. Failures come back as error codes; nothing
/// here takes the process down.
pub fn refresh_status(
    db: &Mutex<Db>,
    factory: &dyn SessionFactory,
    cfg: &PanelConfig,
    force: bool,
) -> Result<(), ErrorCode> {
    match try_refresh(db, factory, cfg, force) {
        Ok(()) => Ok(()),
        Err(err) => match err.downcast_ref::<DeviceError>() {
            Some(DeviceError::Transport(reason)) => {
                log::warn!("transient transport failure, retrying once: {reason}");
                thread::sleep(TRANSPORT_RETRY_DELAY);
                try_refresh(db, factory, cfg, true).map_err(|retry_err| to_code(&retry_err))
            }
            _ => Err(to_code(&err)),
        },
    }
}

fn to_code(err: &anyhow::Error) -> ErrorCode {
    match err.downcast_ref::<DeviceError>() {
        Some(device_err) => classify(device_err),
        None => {
            log::error!("status refresh failed: {err:#}");
            ErrorCode::MultipleDevicesOrUnknown
        }
    }
}

fn try_refresh(
    db: &Mutex<Db>,
    factory: &dyn SessionFactory,
    cfg: &PanelConfig,
    force: bool,
) -> Result<()> {
    let now = utils::unix_time();
    let current = db::lock(db)?.status()?;

    match current {
        None => {
            db::lock(db)?.insert_status_stub(now - BACKDATE_SECS)?;
            Ok(())
        }
        Some(row) if force || now - row.timestamp > REFRESH_THRESHOLD_SECS => {
            let device = cfg.device()?;
            let (version, battery) = {
                let mut session = factory.open(&device, SessionOptions::telemetry())?;
                (session.version_state()?, session.battery_state()?)
            };

            let cube = battery.cube_battery.as_ref();
            db::lock(db)?.replace_status(&NewStatus {
                timestamp: now,
                version: Some(version.os_version),
                battery_voltage: Some(battery.battery_volts),
                battery_level: Some(battery.battery_level),
                is_charging: Some(battery.is_on_charger_platform),
                cube_battery_level: cube.map(|c| c.level),
                cube_id: cube.map(|c| c.factory_id.clone()),
                cube_battery_voltage: cube.map(|c| c.battery_volts),
                ip: Some(device.ip),
                name: Some(device.name),
            })?;
            Ok(())
        }
        Some(_) => {
            // Keep the freshness clock alive without a device round trip.
            db::lock(db)?.touch_status(now)?;
            Ok(())
        }
    }
}
