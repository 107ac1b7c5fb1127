// crates/plcsim-rs/src/error.rs

use crate::types::StatusCode;
use thiserror::Error;

/// Defines a descriptive error type for the simulator core.
///
/// Errors raised while resolving a single batch item are reported in that
/// item's result slot. Errors raised while building the static address space
/// abort `create_address_space`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlcError {
    /// The identifier does not belong to this manager or names no node.
    #[error("The node id is unknown")]
    NodeIdUnknown,
    /// The identifier is syntactically invalid or its component path does not resolve.
    #[error("The node id is invalid")]
    NodeIdInvalid,
    /// A node with the same identifier already exists.
    #[error("A node with the id {0} already exists")]
    NodeIdExists(String),
    /// The node does not support the requested operation (e.g. it is not an event notifier).
    #[error("The operation is not supported by the node")]
    NotSupported,
    /// The requested monitoring filter cannot be applied to the attribute or node.
    #[error("The monitoring filter is not allowed for this attribute")]
    FilterNotAllowed,
    /// The attribute is not valid for the node.
    #[error("The attribute id is not valid for the node")]
    AttributeIdInvalid,
    /// The attribute cannot be written.
    #[error("The attribute is not writable")]
    NotWritable,
    /// The written value's type does not match the variable's data type.
    #[error("The value's type does not match the variable's data type")]
    TypeMismatch,
    /// The value is outside the range accepted by the node.
    #[error("The value is out of range")]
    OutOfRange,
    /// No monitored item with that id is owned by this manager.
    #[error("The monitored item id is invalid")]
    MonitoredItemIdInvalid,
    /// The browse continuation point is unknown or was released.
    #[error("The continuation point is invalid")]
    ContinuationPointInvalid,
    /// The method does not exist on the object.
    #[error("The method is not valid for the object")]
    MethodInvalid,
    /// The condition is disabled and cannot change state.
    #[error("The condition is disabled")]
    ConditionDisabled,
    /// The condition is already in the requested state.
    #[error("The condition is already in the requested state")]
    InvalidState,
    /// A non-random double ramp was configured over a range spanning zero.
    #[error("No ramp direction is defined for the range [{min}, {max}]")]
    RangeError { min: f64, max: f64 },
    /// Randomization was requested for a range holding a single value.
    #[error("Node group '{group}' requests randomization over a degenerate range")]
    DegenerateRange { group: String },
    /// The static configuration is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// The address space was already created.
    #[error("The address space has already been created")]
    AddressSpaceExists,
    /// A simulation timer thread could not be spawned.
    #[error("Failed to spawn timer thread: {0}")]
    TimerSpawn(String),
}

impl PlcError {
    /// The status code reported to clients for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NodeIdUnknown => StatusCode::BAD_NODE_ID_UNKNOWN,
            Self::NodeIdInvalid => StatusCode::BAD_NODE_ID_INVALID,
            Self::NodeIdExists(_) => StatusCode::BAD_NODE_ID_EXISTS,
            Self::NotSupported => StatusCode::BAD_NOT_SUPPORTED,
            Self::FilterNotAllowed => StatusCode::BAD_FILTER_NOT_ALLOWED,
            Self::AttributeIdInvalid => StatusCode::BAD_ATTRIBUTE_ID_INVALID,
            Self::NotWritable => StatusCode::BAD_NOT_WRITABLE,
            Self::TypeMismatch => StatusCode::BAD_TYPE_MISMATCH,
            Self::OutOfRange => StatusCode::BAD_OUT_OF_RANGE,
            Self::MonitoredItemIdInvalid => StatusCode::BAD_MONITORED_ITEM_ID_INVALID,
            Self::ContinuationPointInvalid => StatusCode::BAD_CONTINUATION_POINT_INVALID,
            Self::MethodInvalid => StatusCode::BAD_METHOD_INVALID,
            Self::ConditionDisabled => StatusCode::BAD_CONDITION_DISABLED,
            Self::InvalidState => StatusCode::BAD_INVALID_STATE,
            Self::RangeError { .. } | Self::DegenerateRange { .. } => StatusCode::BAD_OUT_OF_RANGE,
            Self::InvalidConfiguration(_) => StatusCode::BAD_CONFIGURATION_ERROR,
            Self::AddressSpaceExists | Self::TimerSpawn(_) => StatusCode::BAD_INTERNAL_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_bad() {
        let errors = [
            PlcError::NodeIdUnknown,
            PlcError::FilterNotAllowed,
            PlcError::RangeError { min: -1.0, max: 1.0 },
            PlcError::DegenerateRange {
                group: "Slow".into(),
            },
            PlcError::TimerSpawn("no threads".into()),
        ];
        for error in errors {
            assert!(error.status_code().0 & 0x8000_0000 != 0, "{error} should map to a bad status");
        }
    }

    #[test]
    fn test_display_includes_context() {
        let err = PlcError::RangeError { min: -5.0, max: 5.0 };
        assert_eq!(err.to_string(), "No ramp direction is defined for the range [-5, 5]");
        let err = PlcError::DegenerateRange {
            group: "Fast".into(),
        };
        assert!(err.to_string().contains("'Fast'"));
    }
}
