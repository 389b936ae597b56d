//! Wire types shared with panel clients.

use serde::{Deserialize, Serialize};

/// Failure codes surfaced to the request layer. Every device or dispatch
/// failure maps onto one of these; nothing below this boundary panics the
/// panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    DeviceNotFound,
    DeviceBusy,
    MultipleDevicesOrUnknown,
    CommandNotFound,
}

impl ErrorCode {
    /// Path of the dedicated error page a client should land on.
    pub fn page(&self) -> &'static str {
        match self {
            Self::DeviceNotFound => "/error/device_not_found",
            Self::DeviceBusy => "/error/device_busy",
            Self::MultipleDevicesOrUnknown => "/error/multiple_devices",
            Self::CommandNotFound => "/error/command_not_found",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorCode,
    pub page: String,
}

impl ErrorResponse {
    pub fn new(error: ErrorCode) -> Self {
        Self {
            error,
            page: error.page().to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
}
