//! Analogue sensor with linear range scaling.

use super::{Quantizer, Sensor};
use tracing::warn;

/// Name prefix for analogue channels.
const PREFIX: &str = "AI";

/// Smallest and largest number of decimals in the string form.
const MIN_DECIMALS: usize = 3;
const MAX_DECIMALS: usize = 6;

/// Analogue sensor.
///
/// The raw reading is mapped linearly onto `[min, max]`: raw 0 gives `min`,
/// the highest level gives `max`.
#[derive(Debug)]
pub struct AnalogueSensor {
    quantizer: Quantizer,
    min: f64,
    max: f64,
    decimals: usize,
}

impl AnalogueSensor {
    /// Creates a new analogue sensor.
    ///
    /// A reversed range is swapped; an empty or non-finite range is widened
    /// to one unit above `min`.
    pub fn new(id: u32, min: f64, max: f64, bits: u32) -> Self {
        let (min, max) = Self::fix_range(id, min, max);
        Self {
            quantizer: Quantizer::new(id, PREFIX, bits),
            min,
            max,
            decimals: MIN_DECIMALS,
        }
    }

    /// Sets the number of decimals in the string form (clamped to 3-6).
    pub fn with_decimals(mut self, decimals: usize) -> Self {
        self.decimals = decimals.clamp(MIN_DECIMALS, MAX_DECIMALS);
        self
    }

    fn fix_range(id: u32, min: f64, max: f64) -> (f64, f64) {
        let min = if min.is_finite() { min } else { 0.0 };
        if max.is_finite() && max > min {
            (min, max)
        } else if max.is_finite() && max < min {
            (max, min)
        } else {
            warn!(
                "{}{}: invalid range [{}, {}], using [{}, {}]",
                PREFIX,
                id,
                min,
                max,
                min,
                min + 1.0
            );
            (min, min + 1.0)
        }
    }

    /// Returns the lower end of the output range.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Returns the upper end of the output range.
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Returns the number of decimals in the string form.
    pub fn decimals(&self) -> usize {
        self.decimals
    }

    /// Scales an arbitrary raw level onto the output range.
    ///
    /// The result stays within `[min, max]` even where rounding would push
    /// the top level past `max`.
    pub fn scale(&self, raw: u32) -> f64 {
        let top = (self.quantizer.max_int_val() - 1) as f64;
        let ratio = f64::from(raw) / top;
        (self.min + ratio * (self.max - self.min)).clamp(self.min, self.max)
    }

    /// Returns the current scaled value.
    pub fn value(&self) -> f64 {
        self.scale(self.quantizer.raw())
    }

    /// Formats a value with this sensor's precision.
    pub fn format(&self, value: f64) -> String {
        format!("{:.*}", self.decimals, value)
    }
}

impl Default for AnalogueSensor {
    /// Range 0-10, 8 bit resolution.
    fn default() -> Self {
        Self::new(0, 0.0, 10.0, 8)
    }
}

impl Sensor for AnalogueSensor {
    fn quantizer(&self) -> &Quantizer {
        &self.quantizer
    }

    fn quantizer_mut(&mut self) -> &mut Quantizer {
        &mut self.quantizer
    }

    fn value_string(&self) -> String {
        self.format(self.value())
    }
}
