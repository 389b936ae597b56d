//! The closed command vocabulary understood by the robot.
//!
//! Queued commands are persisted as text in their canonical dotted call
//! form (`robot.behavior.drive_off_charger()`) and parsed back into
//! [`RobotCommand`] before execution. A string that does not parse never
//! reaches the device.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum RobotCommand {
    DriveOnCharger,
    DriveOffCharger,
    ConnectCube,
    DisconnectCube,
    DockWithCube,
    SetLiftHeight { height: f32, max_speed: Option<f32> },
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("unknown robot command: {0}")]
pub struct UnknownCommand(pub String);

impl FromStr for RobotCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let err = || UnknownCommand(text.to_string());

        let (path, args) = split_call(text).ok_or_else(err)?;
        let path = path.strip_prefix("robot.").unwrap_or(path);

        match path {
            "behavior.drive_on_charger" if args.is_empty() => Ok(Self::DriveOnCharger),
            "behavior.drive_off_charger" if args.is_empty() => Ok(Self::DriveOffCharger),
            "world.connect_cube" if args.is_empty() => Ok(Self::ConnectCube),
            "world.disconnect_cube" if args.is_empty() => Ok(Self::DisconnectCube),
            // the cube handle is implicit here, extra arguments are tolerated
            "behavior.dock_with_cube" => Ok(Self::DockWithCube),
            "behavior.set_lift_height" => parse_lift(&args).ok_or_else(err),
            _ => Err(err()),
        }
    }
}

impl fmt::Display for RobotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DriveOnCharger => write!(f, "robot.behavior.drive_on_charger()"),
            Self::DriveOffCharger => write!(f, "robot.behavior.drive_off_charger()"),
            Self::ConnectCube => write!(f, "robot.world.connect_cube()"),
            Self::DisconnectCube => write!(f, "robot.world.disconnect_cube()"),
            Self::DockWithCube => write!(f, "robot.behavior.dock_with_cube()"),
            Self::SetLiftHeight {
                height,
                max_speed: Some(speed),
            } => write!(f, "robot.behavior.set_lift_height({height}, max_speed={speed})"),
            Self::SetLiftHeight {
                height,
                max_speed: None,
            } => write!(f, "robot.behavior.set_lift_height({height})"),
        }
    }
}

fn split_call(text: &str) -> Option<(&str, Vec<&str>)> {
    let open = text.find('(')?;
    let close = text.rfind(')')?;
    if close != text.len() - 1 || close < open {
        return None;
    }

    let path = text[..open].trim();
    let inner = text[open + 1..close].trim();
    let args = if inner.is_empty() {
        Vec::new()
    } else {
        inner.split(',').map(str::trim).collect()
    };
    Some((path, args))
}

fn parse_lift(args: &[&str]) -> Option<RobotCommand> {
    let mut positional = Vec::new();
    let mut max_speed = None;

    for arg in args {
        match arg.split_once('=') {
            Some((key, value)) if key.trim() == "max_speed" => {
                max_speed = Some(value.trim().parse::<f32>().ok()?);
            }
            Some(_) => return None,
            None => positional.push(arg.parse::<f32>().ok()?),
        }
    }

    match positional.as_slice() {
        [height] => Some(RobotCommand::SetLiftHeight {
            height: *height,
            max_speed,
        }),
        [height, speed] if max_speed.is_none() => Some(RobotCommand::SetLiftHeight {
            height: *height,
            max_speed: Some(*speed),
        }),
        _ => None,
    }
}
