//! Command queue dispatcher.
//!
//! One device session per batch. Every queued command is parsed, executed,
//! and its output persisted immediately; the queue and the outputs are gone
//! by the time `dispatch` returns, on every path.

use std::sync::Mutex;

use anyhow::Result;
use common::command::{RobotCommand, UnknownCommand};
use common::req::ErrorCode;

use crate::config::PanelConfig;
use crate::db::{self, Db};
use crate::robot::{classify, run_command, DeviceError, SessionFactory, SessionOptions};
use crate::status;

pub const DOCK_MESSAGE: &str = "Dock Command Complete!";
pub const UNDOCK_MESSAGE: &str = "Undock Command Complete!";
pub const CONNECT_CUBE_MESSAGE: &str = "Cube Connected!";
pub const PICKUP_CUBE_MESSAGE: &str = "Cube picked up!";

/// Execute every pending command against one device session and return the
/// user-facing result message. An override message wins verbatim; otherwise
/// the message is built from the last persisted output only.
pub fn dispatch(
    db: &Mutex<Db>,
    factory: &dyn SessionFactory,
    cfg: &PanelConfig,
    override_message: Option<&str>,
) -> Result<String, ErrorCode> {
    let message = run_batch(db, factory, cfg).and_then(|_| build_message(db, override_message));

    // Retries always start from an empty queue, whatever happened above.
    if let Err(err) = db::lock(db).and_then(|mut guard| guard.drain_queue()) {
        log::error!("failed to drain the command queue: {err:#}");
    }

    message.map_err(|err| {
        if err.downcast_ref::<UnknownCommand>().is_some() {
            ErrorCode::CommandNotFound
        } else if let Some(device_err) = err.downcast_ref::<DeviceError>() {
            classify(device_err)
        } else {
            log::error!("dispatch failed: {err:#}");
            ErrorCode::MultipleDevicesOrUnknown
        }
    })
}

fn run_batch(db: &Mutex<Db>, factory: &dyn SessionFactory, cfg: &PanelConfig) -> Result<()> {
    let queued = db::lock(db)?.pending_commands()?;
    let device = cfg.device()?;
    let mut session = factory.open(&device, SessionOptions::control())?;

    for item in &queued {
        let command: RobotCommand = item.command.parse()?;
        let output = run_command(session.as_mut(), &command)?;
        // persisted one by one, so partial progress survives a later failure
        db::lock(db)?.insert_output(&output)?;
    }
    Ok(())
}

fn build_message(db: &Mutex<Db>, override_message: Option<&str>) -> Result<String> {
    if let Some(message) = override_message {
        return Ok(message.to_string());
    }
    let outputs = db::lock(db)?.outputs()?;
    // Last output wins; the earlier ones were only ever visible in the
    // outputs table.
    Ok(match outputs.last() {
        Some(last) => format!("Command completed successfully! Output: {}", last.output),
        None => "Command completed successfully!".to_string(),
    })
}

/// Clear the queue and stage the given commands as the whole batch.
fn stage(db: &Mutex<Db>, sequence: &[RobotCommand]) -> Result<(), ErrorCode> {
    let staged = db::lock(db).and_then(|mut guard| {
        guard.clear_commands()?;
        for command in sequence {
            guard.enqueue_command(&command.to_string())?;
        }
        Ok(())
    });
    staged.map_err(storage_error)
}

fn clear_queue(db: &Mutex<Db>) {
    if let Err(err) = db::lock(db).and_then(|mut guard| guard.clear_commands()) {
        log::error!("failed to clear the command queue: {err:#}");
    }
}

fn storage_error(err: anyhow::Error) -> ErrorCode {
    log::error!("command staging failed: {err:#}");
    ErrorCode::MultipleDevicesOrUnknown
}

pub fn dock(
    db: &Mutex<Db>,
    factory: &dyn SessionFactory,
    cfg: &PanelConfig,
) -> Result<String, ErrorCode> {
    stage(db, &[RobotCommand::DriveOnCharger])?;
    dispatch(db, factory, cfg, Some(DOCK_MESSAGE)).map_err(|code| {
        clear_queue(db);
        code
    })
}

/// Undock, then force a status refresh so the charger flag is current.
pub fn undock(
    db: &Mutex<Db>,
    factory: &dyn SessionFactory,
    cfg: &PanelConfig,
) -> Result<String, ErrorCode> {
    stage(db, &[RobotCommand::DriveOffCharger])?;
    match dispatch(db, factory, cfg, Some(UNDOCK_MESSAGE)) {
        Ok(message) => {
            status::refresh_status(db, factory, cfg, true)?;
            Ok(message)
        }
        Err(code) => {
            clear_queue(db);
            Err(code)
        }
    }
}

pub fn connect_cube(
    db: &Mutex<Db>,
    factory: &dyn SessionFactory,
    cfg: &PanelConfig,
) -> Result<String, ErrorCode> {
    stage(db, &[RobotCommand::ConnectCube])?;
    dispatch(db, factory, cfg, Some(CONNECT_CUBE_MESSAGE)).map_err(|code| {
        clear_queue(db);
        code
    })
}

/// Full pickup sequence: leave the charger, grab the cube, lift and set it
/// back down, let go.
pub fn pickup_cube(
    db: &Mutex<Db>,
    factory: &dyn SessionFactory,
    cfg: &PanelConfig,
) -> Result<String, ErrorCode> {
    stage(
        db,
        &[
            RobotCommand::DriveOffCharger,
            RobotCommand::ConnectCube,
            RobotCommand::DockWithCube,
            RobotCommand::SetLiftHeight {
                height: 100.0,
                max_speed: None,
            },
            RobotCommand::SetLiftHeight {
                height: 0.0,
                max_speed: Some(10.0),
            },
            RobotCommand::DisconnectCube,
        ],
    )?;
    dispatch(db, factory, cfg, Some(PICKUP_CUBE_MESSAGE)).map_err(|code| {
        clear_queue(db);
        code
    })
}
