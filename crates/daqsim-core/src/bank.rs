//! Ordered sensor collection.
//!
//! Log columns are positional, so the bank keeps a stable order: analogue
//! channels by ascending id, then digital channels by ascending id.

use crate::sensor::{AnalogueSensor, DigitalSensor, Sensor};
use tracing::info;

/// Layout of a simulated sensor bank.
#[derive(Debug, Clone, PartialEq)]
pub struct BankConfig {
    /// Number of analogue channels
    pub analogue_count: u32,
    /// Id of the first analogue channel
    pub analogue_first_id: u32,
    /// Lower end of the analogue range
    pub analogue_min: f64,
    /// Upper end of the analogue range
    pub analogue_max: f64,
    /// Analogue bit resolution
    pub analogue_bits: u32,
    /// Decimals in analogue string forms
    pub analogue_decimals: usize,
    /// Number of digital channels
    pub digital_count: u32,
    /// Id of the first digital channel
    pub digital_first_id: u32,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            analogue_count: 5,
            analogue_first_id: 0,
            analogue_min: -1.0,
            analogue_max: 1.0,
            analogue_bits: 10,
            analogue_decimals: 3,
            digital_count: 3,
            digital_first_id: 20,
        }
    }
}

/// Sensors sampled together.
#[derive(Debug, Default)]
pub struct SensorBank {
    analogue: Vec<AnalogueSensor>,
    digital: Vec<DigitalSensor>,
}

impl SensorBank {
    /// Creates a bank from the given sensors, sorting each group by id.
    pub fn new(mut analogue: Vec<AnalogueSensor>, mut digital: Vec<DigitalSensor>) -> Self {
        analogue.sort_by_key(|s| s.id());
        digital.sort_by_key(|s| s.id());
        Self { analogue, digital }
    }

    /// Creates a bank of simulated sensors laid out by `config`.
    pub fn simulated(config: &BankConfig) -> Self {
        let analogue = (0..config.analogue_count)
            .map(|i| {
                AnalogueSensor::new(
                    config.analogue_first_id.saturating_add(i),
                    config.analogue_min,
                    config.analogue_max,
                    config.analogue_bits,
                )
                .with_decimals(config.analogue_decimals)
            })
            .collect();
        let digital = (0..config.digital_count)
            .map(|i| DigitalSensor::new(config.digital_first_id.saturating_add(i)))
            .collect();

        let bank = Self::new(analogue, digital);
        info!(
            "Sensor bank: {} analogue, {} digital channels",
            bank.analogue.len(),
            bank.digital.len()
        );
        bank
    }

    /// Samples every sensor, analogue first.
    pub fn sample_all(&mut self) {
        for sensor in &mut self.analogue {
            sensor.sample();
        }
        for sensor in &mut self.digital {
            sensor.sample();
        }
    }

    /// Returns the analogue sensors in column order.
    pub fn analogue(&self) -> &[AnalogueSensor] {
        &self.analogue
    }

    /// Returns the digital sensors in column order.
    pub fn digital(&self) -> &[DigitalSensor] {
        &self.digital
    }

    /// Returns mutable access to the analogue sensors, e.g. to add observers.
    pub fn analogue_mut(&mut self) -> &mut [AnalogueSensor] {
        &mut self.analogue
    }

    /// Returns mutable access to the digital sensors.
    pub fn digital_mut(&mut self) -> &mut [DigitalSensor] {
        &mut self.digital
    }

    /// Iterates over all sensors in column order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Sensor> {
        self.analogue
            .iter()
            .map(|s| s as &dyn Sensor)
            .chain(self.digital.iter().map(|s| s as &dyn Sensor))
    }

    /// Returns channel names in column order.
    pub fn header(&self) -> Vec<String> {
        self.iter().map(|s| s.name().to_string()).collect()
    }

    /// Returns the total number of channels.
    pub fn len(&self) -> usize {
        self.analogue.len() + self.digital.len()
    }

    /// Returns true if the bank has no channels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
