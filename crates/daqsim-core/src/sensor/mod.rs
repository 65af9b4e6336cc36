//! Simulated sensors.
//!
//! Every sensor stores its reading as a quantized integer with a fixed bit
//! resolution. Variants interpret that integer differently: analogue
//! sensors map it linearly onto a range, digital sensors treat it as a
//! boolean.

mod analogue;
mod digital;

pub use analogue::AnalogueSensor;
pub use digital::DigitalSensor;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

/// Maximum supported bit resolution.
pub const MAX_BITS: u32 = 32;

/// Callback invoked after a sensor's raw value changes.
pub type ChangeObserver = Box<dyn Fn(&Quantizer) + Send + Sync>;

/// Quantized reading shared by all sensor variants.
///
/// Holds the raw integer, the bit resolution and the seeded random source
/// used to simulate acquisitions.
pub struct Quantizer {
    id: u32,
    name: String,
    num_bits: u32,
    max_int_val: u64,
    raw: u32,
    rng: StdRng,
    observers: Vec<ChangeObserver>,
}

impl Quantizer {
    /// Creates a quantizer for sensor `id` with the given type prefix.
    ///
    /// The bit width is clamped to `1..=32`. The random source is seeded
    /// from `id`, so the same id always yields the same reading sequence.
    pub fn new(id: u32, prefix: &str, bits: u32) -> Self {
        let num_bits = bits.clamp(1, MAX_BITS);
        Self {
            id,
            name: format!("{}{}", prefix, id),
            num_bits,
            max_int_val: 1u64 << num_bits,
            raw: 0,
            rng: StdRng::seed_from_u64(u64::from(id)),
            observers: Vec::new(),
        }
    }

    /// Returns the sensor id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the sensor name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the bit resolution.
    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }

    /// Returns the number of quantization levels (`2^num_bits`).
    pub fn max_int_val(&self) -> u64 {
        self.max_int_val
    }

    /// Returns the current raw reading.
    pub fn raw(&self) -> u32 {
        self.raw
    }

    /// Draws a new uniformly distributed reading in `[0, max_int_val - 1]`.
    pub fn sample(&mut self) {
        let next = self.rng.gen_range(0..self.max_int_val) as u32;
        self.set_raw(next);
    }

    fn set_raw(&mut self, value: u32) {
        if value == self.raw {
            return;
        }
        self.raw = value;
        trace!("{}: raw value {}", self.name, value);
        for observer in &self.observers {
            observer(self);
        }
    }

    fn subscribe(&mut self, observer: ChangeObserver) {
        self.observers.push(observer);
    }
}

impl std::fmt::Debug for Quantizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Quantizer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("num_bits", &self.num_bits)
            .field("raw", &self.raw)
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Trait for all sensors.
///
/// The strongly typed scaled value is exposed by each variant; this trait
/// covers what every sensor shares.
pub trait Sensor: Send + Sync {
    /// Returns the underlying quantized reading.
    fn quantizer(&self) -> &Quantizer;

    /// Returns the underlying quantized reading mutably.
    fn quantizer_mut(&mut self) -> &mut Quantizer;

    /// Returns the current value formatted for display and logging.
    fn value_string(&self) -> String;

    /// Returns the sensor id.
    fn id(&self) -> u32 {
        self.quantizer().id()
    }

    /// Returns the sensor name.
    fn name(&self) -> &str {
        self.quantizer().name()
    }

    /// Returns the bit resolution.
    fn num_bits(&self) -> u32 {
        self.quantizer().num_bits()
    }

    /// Returns the number of quantization levels.
    fn max_int_val(&self) -> u64 {
        self.quantizer().max_int_val()
    }

    /// Returns the current raw reading.
    fn raw_value(&self) -> u32 {
        self.quantizer().raw()
    }

    /// Simulates an acquisition.
    fn sample(&mut self) {
        self.quantizer_mut().sample();
    }

    /// Registers an observer called after every change of the raw value.
    fn on_change(&mut self, observer: ChangeObserver) {
        self.quantizer_mut().subscribe(observer);
    }
}
