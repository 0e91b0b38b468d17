//! Synthetic dynamb event source.
//!
//! Emulates a small roster of ambient devices so the agent can run without
//! a live backend. Each tick, one device in the roster emits a dynamb with
//! randomized property values; devices without dynamb properties are
//! skipped but still consume their slot in the cycle.

use crate::stream::types::{DynambEvent, PropertyValue};
use crossbeam_channel::{bounded, Receiver, Sender};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A device in the emulated roster.
#[derive(Debug, Clone)]
pub struct EmulatedDevice {
    pub device_id: String,
    pub id_type: u8,
    /// Dynamb properties this device reports
    pub properties: Vec<String>,
}

impl EmulatedDevice {
    pub fn new(device_id: impl Into<String>, id_type: u8, properties: &[&str]) -> Self {
        Self {
            device_id: device_id.into(),
            id_type,
            properties: properties.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Configuration for the emulator.
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// Devices to cycle through
    pub devices: Vec<EmulatedDevice>,
    /// Duration of one full cycle through the roster
    pub cycle: Duration,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            devices: vec![
                EmulatedDevice::new("fee150bada55", 2, &[]),
                EmulatedDevice::new("ac233fa00001", 2, &["acceleration"]),
                EmulatedDevice::new("ac233fa00002", 2, &["temperature", "relativeHumidity"]),
                EmulatedDevice::new("ac233fa00003", 2, &["isButtonPressed"]),
                EmulatedDevice::new("e50000000001", 3, &["illuminance", "isMotionDetected"]),
                EmulatedDevice::new(
                    "e50010000002",
                    3,
                    &[
                        "acceleration",
                        "illuminance",
                        "isContactDetected",
                        "isMotionDetected",
                        "temperature",
                        "relativeHumidity",
                    ],
                ),
            ],
            cycle: Duration::from_secs(4),
        }
    }
}

/// Errors that can occur when driving the emulator.
#[derive(Debug)]
pub enum EmulatorError {
    AlreadyRunning,
    EmptyRoster,
}

impl std::fmt::Display for EmulatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmulatorError::AlreadyRunning => write!(f, "Emulator is already running"),
            EmulatorError::EmptyRoster => write!(f, "Emulator roster has no devices"),
        }
    }
}

impl std::error::Error for EmulatorError {}

/// Background emulator producing dynamb events on a channel.
pub struct Emulator {
    config: EmulatorConfig,
    sender: Sender<DynambEvent>,
    receiver: Receiver<DynambEvent>,
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Emulator {
    /// Create a new emulator with the given configuration.
    pub fn new(config: EmulatorConfig) -> Self {
        let (sender, receiver) = bounded(10_000);
        Self {
            config,
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Start emitting events.
    pub fn start(&mut self) -> Result<(), EmulatorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(EmulatorError::AlreadyRunning);
        }
        if self.config.devices.is_empty() {
            return Err(EmulatorError::EmptyRoster);
        }
        self.running.store(true, Ordering::SeqCst);

        let devices = self.config.devices.clone();
        let interval = self.config.cycle / devices.len() as u32;
        let sender = self.sender.clone();
        let running = self.running.clone();

        let handle = thread::spawn(move || {
            let mut rng = rand::thread_rng();
            let mut index = 0usize;

            while running.load(Ordering::SeqCst) {
                if let Some(event) = synthesize_dynamb(&devices[index], &mut rng) {
                    // Drop the event if the consumer is gone or lagging.
                    if sender.try_send(event).is_err() && sender.is_full() {
                        tracing::debug!("emulator channel full, dropping event");
                    }
                }
                index = (index + 1) % devices.len();
                thread::sleep(interval);
            }
        });

        self.handle = Some(handle);
        Ok(())
    }

    /// Stop emitting events.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Check if the emulator is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for emulated dynamb events.
    pub fn receiver(&self) -> &Receiver<DynambEvent> {
        &self.receiver
    }
}

impl Drop for Emulator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build a dynamb for the given device, or None if it reports nothing.
fn synthesize_dynamb(device: &EmulatedDevice, rng: &mut impl Rng) -> Option<DynambEvent> {
    if device.properties.is_empty() {
        return None;
    }

    let mut event = DynambEvent::new(device.device_id.clone(), device.id_type);
    for property in &device.properties {
        if let Some(value) = synthesize_property(property, rng) {
            event.properties.insert(property.clone(), value);
        }
    }

    Some(event)
}

/// Fabricate a plausible value for the named dynamb property.
fn synthesize_property(property: &str, rng: &mut impl Rng) -> Option<PropertyValue> {
    match property {
        "acceleration" => Some(PropertyValue::NumberArray(
            (0..3).map(|_| rng.gen_range(-1.0..1.0)).collect(),
        )),
        "illuminance" => Some(PropertyValue::Number(rng.gen_range(0..=10_000) as f64)),
        "isButtonPressed" | "isContactDetected" | "isMotionDetected" => {
            Some(PropertyValue::BooleanArray(vec![rng.gen_bool(0.5)]))
        }
        "temperature" => Some(PropertyValue::Number(rng.gen_range(15..=35) as f64)),
        "relativeHumidity" => Some(PropertyValue::Number(rng.gen_range(0..=100) as f64)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roster() {
        let config = EmulatorConfig::default();
        assert_eq!(config.devices.len(), 6);
        assert!(config.devices[0].properties.is_empty());
    }

    #[test]
    fn test_synthesized_property_ranges() {
        let mut rng = rand::thread_rng();

        for _ in 0..50 {
            match synthesize_property("temperature", &mut rng) {
                Some(PropertyValue::Number(value)) => {
                    assert!((15.0..=35.0).contains(&value));
                }
                other => panic!("unexpected temperature value: {other:?}"),
            }

            match synthesize_property("acceleration", &mut rng) {
                Some(PropertyValue::NumberArray(values)) => {
                    assert_eq!(values.len(), 3);
                    assert!(values.iter().all(|v| (-1.0..1.0).contains(v)));
                }
                other => panic!("unexpected acceleration value: {other:?}"),
            }
        }

        assert!(synthesize_property("unknown", &mut rng).is_none());
    }

    #[test]
    fn test_property_less_device_yields_nothing() {
        let mut rng = rand::thread_rng();
        let silent = EmulatedDevice::new("fee150bada55", 2, &[]);
        assert!(synthesize_dynamb(&silent, &mut rng).is_none());
    }

    #[test]
    fn test_emulator_emits_roster_events() {
        let config = EmulatorConfig {
            devices: vec![
                EmulatedDevice::new("ac233fa00002", 2, &["temperature"]),
                EmulatedDevice::new("e50000000001", 3, &["isMotionDetected"]),
            ],
            cycle: Duration::from_millis(40),
        };
        let mut emulator = Emulator::new(config);
        emulator.start().unwrap();
        assert!(matches!(
            emulator.start(),
            Err(EmulatorError::AlreadyRunning)
        ));

        let mut signatures = Vec::new();
        for _ in 0..4 {
            let event = emulator
                .receiver()
                .recv_timeout(Duration::from_secs(2))
                .expect("emulator should emit events");
            signatures.push(event.signature().to_string());
        }
        emulator.stop();
        assert!(!emulator.is_running());

        assert!(signatures.contains(&"ac233fa00002/2".to_string()));
        assert!(signatures.contains(&"e50000000001/3".to_string()));
    }
}
