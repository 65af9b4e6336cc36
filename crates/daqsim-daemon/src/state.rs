//! Acquisition state management.
//!
//! Glues the core components together: the sampling timer samples the
//! sensor bank and feeds the analogue filters, the logging timer writes the
//! filtered values to the data log. Both timers re-arm themselves after
//! their work is done, even when an observer panics.

use daqsim_core::{DataLog, IntervalTimer, MovingAverageFilter, Sensor, SensorBank};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info, warn};

use crate::config::Settings;

/// Reading of one analogue channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalogueReading {
    /// Channel name
    pub name: String,
    /// Quantized reading
    pub raw: u32,
    /// Scaled value
    pub value: f64,
    /// Moving average of the scaled value
    pub filtered: f64,
}

/// Reading of one digital channel.
#[derive(Debug, Clone, PartialEq)]
pub struct DigitalReading {
    /// Channel name
    pub name: String,
    /// Input state
    pub on: bool,
}

/// All readings of one sampling tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Analogue channels in column order
    pub analogue: Vec<AnalogueReading>,
    /// Digital channels in column order
    pub digital: Vec<DigitalReading>,
}

/// Outcome of one logging tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogStatus {
    /// Data records written so far
    pub entries: u64,
    /// Whether this write succeeded
    pub ok: bool,
}

type SampleObserver = Arc<dyn Fn(&Snapshot) + Send + Sync>;
type LogObserver = Arc<dyn Fn(LogStatus) + Send + Sync>;

/// Sensors and their filters. Locked as one unit so the logging timer never
/// sees a half-updated filter window.
struct Channels {
    bank: SensorBank,
    filters: Vec<MovingAverageFilter>,
}

/// Shared acquisition state.
pub struct Acquisition {
    /// Sensors and analogue filters
    channels: Mutex<Channels>,

    /// Data log
    log: Mutex<DataLog>,

    /// Sampling cadence
    sample_timer: IntervalTimer,

    /// Logging cadence
    log_timer: IntervalTimer,

    /// Sampling subscribers
    sample_observers: Mutex<Vec<SampleObserver>>,

    /// Logging subscribers
    log_observers: Mutex<Vec<LogObserver>>,
}

impl Acquisition {
    /// Creates the acquisition state with a new log file in the configured
    /// directory.
    pub fn new(settings: &Settings) -> Arc<Self> {
        let log = DataLog::create(&settings.log_dir, settings.delimiter);
        Self::with_log(settings, log)
    }

    /// Creates the acquisition state around an existing log and writes the
    /// header row.
    pub fn with_log(settings: &Settings, mut log: DataLog) -> Arc<Self> {
        let bank = SensorBank::simulated(&settings.bank);
        let filters = bank
            .analogue()
            .iter()
            .map(|s| MovingAverageFilter::new(s.name(), settings.filter_window))
            .collect();

        if !log.write_header(&bank.header(), true) {
            info!("Header not written, data log unavailable");
        }

        Arc::new_cyclic(|weak: &Weak<Self>| {
            let sample_timer = IntervalTimer::new("sample-timer", settings.sample_interval);
            let weak_sample = weak.clone();
            sample_timer.on_ready(move || {
                if let Some(acq) = weak_sample.upgrade() {
                    acq.sample();
                    acq.arm_sampling();
                }
            });

            let log_timer = IntervalTimer::new("log-timer", settings.log_interval);
            let weak_log = weak.clone();
            log_timer.on_ready(move || {
                if let Some(acq) = weak_log.upgrade() {
                    acq.log();
                    acq.arm_logging();
                }
            });

            Self {
                channels: Mutex::new(Channels { bank, filters }),
                log: Mutex::new(log),
                sample_timer,
                log_timer,
                sample_observers: Mutex::new(Vec::new()),
                log_observers: Mutex::new(Vec::new()),
            }
        })
    }

    /// Registers a callback run on the sampling thread after every sample.
    pub fn on_sample<F>(&self, f: F)
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        self.sample_observers.lock().unwrap().push(Arc::new(f));
    }

    /// Registers a callback run on the logging thread after every write
    /// attempt.
    pub fn on_log<F>(&self, f: F)
    where
        F: Fn(LogStatus) + Send + Sync + 'static,
    {
        self.log_observers.lock().unwrap().push(Arc::new(f));
    }

    /// Arms both timers. Sampling and logging then continue on their own.
    pub fn start(&self) -> bool {
        let sampling = self.arm_sampling();
        let logging = self.arm_logging();
        info!(
            "Acquisition started (sample every {:?}, log every {:?})",
            self.sample_timer.interval(),
            self.log_timer.interval()
        );
        sampling && logging
    }

    /// Arms the sampling timer.
    pub fn arm_sampling(&self) -> bool {
        self.sample_timer.go()
    }

    /// Arms the logging timer.
    pub fn arm_logging(&self) -> bool {
        self.log_timer.go()
    }

    /// Stops both timers. No callbacks run once this returns.
    ///
    /// Must not be called while holding a lock a callback might need.
    pub fn stop(&self) {
        self.sample_timer.stop();
        self.log_timer.stop();
        info!("Acquisition stopped");
    }

    /// Samples all sensors and updates the analogue filters.
    pub fn sample(&self) -> Snapshot {
        let snapshot = {
            let mut channels = self.channels.lock().unwrap();
            let Channels { bank, filters } = &mut *channels;
            bank.sample_all();

            let analogue = bank
                .analogue()
                .iter()
                .zip(filters.iter_mut())
                .map(|(sensor, filter)| {
                    filter.add(sensor.value());
                    AnalogueReading {
                        name: sensor.name().to_string(),
                        raw: sensor.raw_value(),
                        value: sensor.value(),
                        filtered: filter.output(),
                    }
                })
                .collect();
            let digital = bank
                .digital()
                .iter()
                .map(|sensor| DigitalReading {
                    name: sensor.name().to_string(),
                    on: sensor.value(),
                })
                .collect();

            Snapshot { analogue, digital }
        };

        debug!(
            "Sampled {} channels",
            snapshot.analogue.len() + snapshot.digital.len()
        );
        let observers = self.sample_observers.lock().unwrap().clone();
        for observer in observers {
            notify("sample", || observer(&snapshot));
        }
        snapshot
    }

    /// Writes one log record: the filtered analogue values followed by the
    /// unfiltered digital states.
    pub fn log(&self) -> bool {
        let fields = self.record_fields();

        let status = {
            let mut log = self.log.lock().unwrap();
            for field in fields {
                log.buffer_field(field);
            }
            let ok = log.write_record(true, true);
            LogStatus {
                entries: log.entries(),
                ok,
            }
        };

        let observers = self.log_observers.lock().unwrap().clone();
        for observer in observers {
            notify("log", || observer(status));
        }
        status.ok
    }

    fn record_fields(&self) -> Vec<String> {
        let channels = self.channels.lock().unwrap();
        let analogue = channels
            .bank
            .analogue()
            .iter()
            .zip(&channels.filters)
            .map(|(sensor, filter)| {
                if filter.is_primed() {
                    sensor.format(filter.output())
                } else {
                    sensor.value_string()
                }
            });
        let digital = channels.bank.digital().iter().map(|s| s.value_string());
        analogue.chain(digital).collect()
    }

    /// Returns the column names in log order, without the time column.
    pub fn header(&self) -> Vec<String> {
        self.channels.lock().unwrap().bank.header()
    }

    /// Returns the number of data records written.
    pub fn entries(&self) -> u64 {
        self.log.lock().unwrap().entries()
    }

    /// Returns the log file path.
    pub fn log_path(&self) -> PathBuf {
        self.log.lock().unwrap().file_path().to_path_buf()
    }

    /// Returns true if the data log can be written.
    pub fn is_log_usable(&self) -> bool {
        self.log.lock().unwrap().is_usable()
    }
}

/// Runs one observer. A panic is logged and the remaining observers still run.
fn notify(kind: &str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        warn!("A {} observer panicked", kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daqsim_core::BankConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    fn settings(dir: &std::path::Path) -> Settings {
        Settings {
            sample_interval: Duration::from_millis(10),
            log_interval: Duration::from_millis(30),
            log_dir: dir.to_path_buf(),
            delimiter: ',',
            filter_window: 4,
            bank: BankConfig {
                analogue_count: 2,
                digital_count: 1,
                ..BankConfig::default()
            },
        }
    }

    fn lines(acq: &Acquisition) -> Vec<String> {
        std::fs::read_to_string(acq.log_path())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_header_written_on_creation() {
        let tmp = tempfile::tempdir().unwrap();
        let acq = Acquisition::new(&settings(tmp.path()));
        assert!(acq.is_log_usable());
        assert_eq!(acq.header(), vec!["AI0", "AI1", "DI20"]);
        assert_eq!(lines(&acq), vec!["Time,AI0,AI1,DI20"]);
        assert_eq!(acq.entries(), 0);
    }

    #[test]
    fn test_sample_updates_filters() {
        let tmp = tempfile::tempdir().unwrap();
        let acq = Acquisition::new(&settings(tmp.path()));

        let first = acq.sample();
        assert_eq!(first.analogue.len(), 2);
        assert_eq!(first.digital.len(), 1);
        for reading in &first.analogue {
            // Filter primed with the first value
            assert_eq!(reading.filtered, reading.value);
            assert!((-1.0..=1.0).contains(&reading.value));
        }

        let mut values = vec![first.analogue[0].value];
        for _ in 0..3 {
            values.push(acq.sample().analogue[0].value);
        }
        let last = acq.sample();
        values.push(last.analogue[0].value);
        // Window of 4 holds the last four values
        let expected: f64 = values[1..].iter().sum::<f64>() / 4.0;
        assert!((last.analogue[0].filtered - expected).abs() < 1e-9);
    }

    #[test]
    fn test_log_record_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let acq = Acquisition::new(&settings(tmp.path()));
        let snapshot = acq.sample();

        assert!(acq.log());
        assert_eq!(acq.entries(), 1);

        let lines = lines(&acq);
        assert_eq!(lines.len(), 2);
        let fields: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[1], format!("{:.3}", snapshot.analogue[0].filtered));
        assert_eq!(fields[2], format!("{:.3}", snapshot.analogue[1].filtered));
        assert!(fields[3] == "ON" || fields[3] == "OFF");
    }

    #[test]
    fn test_log_before_first_sample() {
        let tmp = tempfile::tempdir().unwrap();
        let acq = Acquisition::new(&settings(tmp.path()));
        assert!(acq.log());
        let lines = lines(&acq);
        assert!(lines[1].ends_with(",-1.000,-1.000,OFF"));
    }

    #[test]
    fn test_unusable_log_reports_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "").unwrap();

        let acq = Acquisition::new(&settings(&blocker.join("LogData")));
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        acq.on_log(move |status| {
            let _ = tx.lock().unwrap().send(status);
        });

        assert!(!acq.is_log_usable());
        assert!(!acq.log());
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            LogStatus {
                entries: 0,
                ok: false
            }
        );
    }

    #[test]
    fn test_timers_drive_sampling_and_logging() {
        let tmp = tempfile::tempdir().unwrap();
        let acq = Acquisition::new(&settings(tmp.path()));

        let samples = Arc::new(AtomicUsize::new(0));
        let counter = samples.clone();
        acq.on_sample(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        acq.on_log(move |status| {
            let _ = tx.lock().unwrap().send(status);
        });

        assert!(acq.start());
        // Already armed
        assert!(!acq.arm_sampling());

        let mut last = None;
        for _ in 0..3 {
            last = Some(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        }
        acq.stop();

        let last = last.unwrap();
        assert!(last.ok);
        assert!(last.entries >= 3);
        assert!(samples.load(Ordering::SeqCst) >= 3);

        let entries = acq.entries();
        assert_eq!(lines(&acq).len() as u64, entries + 1);
        assert!(!acq.arm_sampling());
        assert!(!acq.arm_logging());
    }

    #[test]
    fn test_panicking_observer_keeps_timers_running() {
        let tmp = tempfile::tempdir().unwrap();
        let acq = Acquisition::new(&settings(tmp.path()));

        let samples = Arc::new(AtomicUsize::new(0));
        let counter = samples.clone();
        acq.on_sample(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first sample observer failure");
            }
        });

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        acq.on_log(move |status| {
            let _ = tx.lock().unwrap().send(status);
            panic!("log observer failure");
        });

        assert!(acq.start());
        for _ in 0..3 {
            assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap().ok);
        }
        acq.stop();

        // Sampling kept re-arming after the first observer panic
        assert!(samples.load(Ordering::SeqCst) >= 3);
        assert!(acq.entries() >= 3);
    }
}
