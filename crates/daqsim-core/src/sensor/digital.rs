//! Digital (on/off) sensor.

use super::{Quantizer, Sensor};

/// Name prefix for digital channels.
const PREFIX: &str = "DI";

const ON: &str = "ON";
const OFF: &str = "OFF";

/// Digital sensor, a one bit reading.
#[derive(Debug)]
pub struct DigitalSensor {
    quantizer: Quantizer,
}

impl DigitalSensor {
    /// Creates a new digital sensor.
    pub fn new(id: u32) -> Self {
        Self {
            quantizer: Quantizer::new(id, PREFIX, 1),
        }
    }

    /// Returns true when the input is on.
    pub fn value(&self) -> bool {
        self.quantizer.raw() != 0
    }
}

impl Default for DigitalSensor {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Sensor for DigitalSensor {
    fn quantizer(&self) -> &Quantizer {
        &self.quantizer
    }

    fn quantizer_mut(&mut self) -> &mut Quantizer {
        &mut self.quantizer
    }

    fn value_string(&self) -> String {
        let text = if self.value() { ON } else { OFF };
        text.to_string()
    }
}
