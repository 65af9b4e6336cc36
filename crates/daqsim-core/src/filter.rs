//! Sliding window moving-average filter.

use crate::DEFAULT_WINDOW;
use tracing::trace;

/// Moving-average filter over a fixed window.
///
/// The first value fills the whole window so the output does not start
/// biased towards zero.
#[derive(Debug, Clone)]
pub struct MovingAverageFilter {
    name: String,
    window: Vec<f64>,
    cursor: Option<usize>,
    output: f64,
}

impl MovingAverageFilter {
    /// Creates a filter. A window size of 0 is replaced by the default of 10.
    pub fn new(name: impl Into<String>, window_size: usize) -> Self {
        let size = if window_size == 0 {
            DEFAULT_WINDOW
        } else {
            window_size
        };
        Self {
            name: name.into(),
            window: vec![0.0; size],
            cursor: None,
            output: 0.0,
        }
    }

    /// Adds a value and recomputes the average.
    pub fn add(&mut self, value: f64) {
        let len = self.window.len();
        match self.cursor {
            None => {
                self.window.fill(value);
                self.cursor = Some(1 % len);
            }
            Some(cursor) => {
                self.window[cursor] = value;
                self.cursor = Some((cursor + 1) % len);
            }
        }

        self.output = self.window.iter().sum::<f64>() / len as f64;
        trace!("{}\t{:?}\t{}", self.name, self.window, self.output);
    }

    /// Returns the last computed average.
    pub fn output(&self) -> f64 {
        self.output
    }

    /// Returns the filter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the window length.
    pub fn window_size(&self) -> usize {
        self.window.len()
    }

    /// Returns the window contents in slot order.
    pub fn window(&self) -> &[f64] {
        &self.window
    }

    /// Returns true once the first value has been added.
    pub fn is_primed(&self) -> bool {
        self.cursor.is_some()
    }

    /// Forgets all values.
    pub fn reset(&mut self) {
        self.window.fill(0.0);
        self.cursor = None;
        self.output = 0.0;
    }
}
