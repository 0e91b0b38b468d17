//! Event types for the dynamic ambient (dynamb) data stream.
//!
//! A dynamb event carries a device identity, a wire timestamp in epoch
//! milliseconds and an open-ended set of named properties (environmental
//! readings, button presses, motion flags, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Separator between device identifier and identifier type in a signature.
pub const SIGNATURE_SEPARATOR: char = '/';

/// A stable device identity: `deviceId/deviceIdType`.
///
/// Two events refer to the same physical device iff their signatures are
/// equal, which makes this the mapping key throughout the crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct DeviceSignature {
    device_id: String,
    id_type: u8,
}

impl DeviceSignature {
    /// Create a signature from its parts.
    pub fn new(device_id: impl Into<String>, id_type: u8) -> Self {
        Self {
            device_id: device_id.into(),
            id_type,
        }
    }

    /// The device identifier portion.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The identifier-type discriminant (e.g. EUI-64 = 1, EUI-48 = 2).
    pub fn id_type(&self) -> u8 {
        self.id_type
    }
}

impl fmt::Display for DeviceSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.device_id, SIGNATURE_SEPARATOR, self.id_type)
    }
}

impl FromStr for DeviceSignature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (device_id, id_type) = s
            .rsplit_once(SIGNATURE_SEPARATOR)
            .ok_or(SignatureError::MissingSeparator)?;
        if device_id.is_empty() {
            return Err(SignatureError::EmptyDeviceId);
        }
        let id_type: u8 = id_type.parse().map_err(|_| SignatureError::InvalidIdType)?;
        Ok(Self::new(device_id, id_type))
    }
}

impl From<DeviceSignature> for String {
    fn from(signature: DeviceSignature) -> Self {
        signature.to_string()
    }
}

impl TryFrom<String> for DeviceSignature {
    type Error = SignatureError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Errors from parsing a device signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    MissingSeparator,
    EmptyDeviceId,
    InvalidIdType,
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureError::MissingSeparator => {
                write!(f, "Signature is missing the '/' separator")
            }
            SignatureError::EmptyDeviceId => write!(f, "Signature has an empty device identifier"),
            SignatureError::InvalidIdType => write!(f, "Signature identifier type is not a number"),
        }
    }
}

impl std::error::Error for SignatureError {}

/// A single dynamb property value.
///
/// The wire format is untyped JSON; the variants cover the shapes that
/// actually occur: scalars (`temperature: 21.5`), flag arrays
/// (`isButtonPressed: [true]`), vectors (`acceleration: [0.1, -0.2, 0.98]`)
/// and free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Boolean(bool),
    Number(f64),
    Text(String),
    BooleanArray(Vec<bool>),
    NumberArray(Vec<f64>),
    /// Anything else on the wire (nested structures, mixed arrays)
    Other(serde_json::Value),
}

impl PropertyValue {
    /// The numeric value, for scalar numbers only.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Whether a flag-style value is asserted.
    ///
    /// Flag properties arrive as arrays with one entry per sensing element
    /// (`isMotionDetected: [false, true]`); any true entry counts.
    pub fn is_asserted(&self) -> bool {
        match self {
            PropertyValue::Boolean(value) => *value,
            PropertyValue::BooleanArray(values) => values.contains(&true),
            _ => false,
        }
    }

    /// Whether this value is a flag (boolean or boolean array).
    pub fn is_flag(&self) -> bool {
        matches!(
            self,
            PropertyValue::Boolean(_) | PropertyValue::BooleanArray(_)
        )
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Boolean(value) => write!(f, "{value}"),
            PropertyValue::Number(value) => write!(f, "{value}"),
            PropertyValue::Text(value) => write!(f, "{value}"),
            PropertyValue::BooleanArray(values) => {
                let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            PropertyValue::NumberArray(values) => {
                let rendered: Vec<String> = values.iter().map(|v| format!("{v:.2}")).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            PropertyValue::Other(value) => write!(f, "{value}"),
        }
    }
}

/// A dynamic ambient data event for one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynambEvent {
    /// Device identifier
    pub device_id: String,
    /// Identifier-type discriminant
    pub device_id_type: u8,
    /// Wire timestamp in epoch milliseconds
    pub timestamp: i64,
    /// Named ambient properties carried by this event
    #[serde(flatten)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl DynambEvent {
    /// Create an event timestamped now, without properties.
    pub fn new(device_id: impl Into<String>, device_id_type: u8) -> Self {
        Self {
            device_id: device_id.into(),
            device_id_type,
            timestamp: Utc::now().timestamp_millis(),
            properties: BTreeMap::new(),
        }
    }

    /// The signature identifying the originating device.
    pub fn signature(&self) -> DeviceSignature {
        DeviceSignature::new(self.device_id.clone(), self.device_id_type)
    }

    /// The wire timestamp as a UTC datetime.
    ///
    /// An out-of-range timestamp falls back to the Unix epoch rather than
    /// failing; dynamb producers are not trusted to be well-behaved.
    pub fn observed_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp).unwrap_or_default()
    }
}
