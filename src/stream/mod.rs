//! Dynamb event stream: wire types and the synthetic emulator.

pub mod emulator;
pub mod types;

// Re-export commonly used types
pub use emulator::{EmulatedDevice, Emulator, EmulatorConfig, EmulatorError};
pub use types::{
    DeviceSignature, DynambEvent, PropertyValue, SignatureError, SIGNATURE_SEPARATOR,
};
