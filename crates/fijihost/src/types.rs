//! Values that cross the host boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Class name reported when a script returns nothing or fails.
pub const NULL_CLASS: &str = "null";

/// Result of running script text against the live host.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Success {
        returned_object_class: String,
        returned_object: Value,
    },
    Failure {
        error_message: String,
    },
}

impl ExecutionOutcome {
    pub fn success(class: impl Into<String>, object: Value) -> Self {
        ExecutionOutcome::Success {
            returned_object_class: class.into(),
            returned_object: object,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        ExecutionOutcome::Failure {
            error_message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }

    /// Render as the pretty-printed report handed to MCP clients.
    pub fn to_report_text(&self) -> String {
        let report = ExecutionReport::from(self.clone());
        // A struct of strings, bools and serde_json values always serializes
        serde_json::to_string_pretty(&report).unwrap_or_default()
    }
}

/// Wire/report form of an [`ExecutionOutcome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    #[serde(default)]
    pub returned_object_class: Option<String>,
    #[serde(default)]
    pub returned_object: Value,
    pub execution_success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl From<ExecutionOutcome> for ExecutionReport {
    fn from(outcome: ExecutionOutcome) -> Self {
        match outcome {
            ExecutionOutcome::Success {
                returned_object_class,
                returned_object,
            } => ExecutionReport {
                returned_object_class: Some(returned_object_class),
                returned_object,
                execution_success: true,
                error_message: None,
            },
            ExecutionOutcome::Failure { error_message } => ExecutionReport {
                returned_object_class: Some(NULL_CLASS.to_string()),
                returned_object: Value::Null,
                execution_success: false,
                error_message: Some(error_message),
            },
        }
    }
}

impl From<ExecutionReport> for ExecutionOutcome {
    fn from(report: ExecutionReport) -> Self {
        if report.execution_success {
            ExecutionOutcome::Success {
                returned_object_class: report
                    .returned_object_class
                    .unwrap_or_else(|| NULL_CLASS.to_string()),
                returned_object: report.returned_object,
            }
        } else {
            let message = report
                .error_message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "Script failed without an error message".to_string());
            ExecutionOutcome::Failure {
                error_message: message,
            }
        }
    }
}

/// One open image and its current position, as the host describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescription {
    pub title: String,
    pub is_the_active_one: bool,
    pub x_size_pix: u32,
    pub y_size_pix: u32,
    pub z_size_pix: u32,
    pub n_channels: u32,
    pub n_timepoints: u32,
    pub current_active_channel: u32,
    pub current_active_zslice: u32,
    pub current_active_timepoint: u32,
}

/// Render image descriptions the way `get_opened_images_information` returns them.
pub fn images_to_text(images: &[ImageDescription]) -> String {
    serde_json::to_string_pretty(images).unwrap_or_else(|_| "[]".to_string())
}
