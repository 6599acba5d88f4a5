//! Serving status.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Service name of the overall status.
pub const OVERALL: &str = "";

/// Serving status of a service.
///
/// Serializes as its integer value, matching the health protocol enum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ServingStatus {
    /// Not yet determined.
    #[default]
    Unknown = 0,
    /// Healthy.
    Serving = 1,
    /// Unhealthy.
    NotServing = 2,
    /// The service name is not known.
    ServiceUnknown = 3,
}

impl ServingStatus {
    /// Returns the protocol value.
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Converts a protocol value; out-of-range values are `Unknown`.
    pub const fn from_i32(value: i32) -> Self {
        match value {
            1 => Self::Serving,
            2 => Self::NotServing,
            3 => Self::ServiceUnknown,
            _ => Self::Unknown,
        }
    }

    /// Returns the protocol name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Serving => "SERVING",
            Self::NotServing => "NOT_SERVING",
            Self::ServiceUnknown => "SERVICE_UNKNOWN",
        }
    }

    /// Returns `true` for `Serving`.
    pub const fn is_serving(self) -> bool {
        matches!(self, Self::Serving)
    }
}

impl fmt::Display for ServingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ServingStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_i32())
    }
}

impl<'de> Deserialize<'de> for ServingStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i32::deserialize(deserializer).map(Self::from_i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_values() {
        for status in [
            ServingStatus::Unknown,
            ServingStatus::Serving,
            ServingStatus::NotServing,
            ServingStatus::ServiceUnknown,
        ] {
            assert_eq!(ServingStatus::from_i32(status.as_i32()), status);
        }
        assert_eq!(ServingStatus::from_i32(42), ServingStatus::Unknown);
    }

    #[test]
    fn serializes_as_integer() {
        assert_eq!(serde_json::to_string(&ServingStatus::NotServing).unwrap(), "2");
        let status: ServingStatus = serde_json::from_str("1").unwrap();
        assert!(status.is_serving());
        assert_eq!(status.to_string(), "SERVING");
    }
}
