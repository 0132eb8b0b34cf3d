//! Common response shapes

use serde::{Deserialize, Serialize};

/// `{"success": bool, "message": string}` envelope used by every gate
/// denial and by admin mutations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonMessage {
    pub success: bool,
    pub message: String,
}

impl JsonMessage {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
