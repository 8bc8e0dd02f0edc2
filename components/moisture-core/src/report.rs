use core::fmt::Write as _;

use embassy_time::Duration;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_io_async::Write;
use heapless::String;

use crate::config;
use crate::sensor::AnalogInput;
use crate::sensor::moisture::{Calibration, MoistureError, MoistureSensor, Wetness, delay_ms};

const LINE_BUFFER_SIZE: usize = 96;

/// Where the percent of a report comes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Sampling {
    /// The percent is converted from a second, independent sample. Both
    /// numbers of a line may therefore disagree.
    #[default]
    Double,
    /// Raw value and percent come from the same sample.
    Single,
}

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub calibration: Calibration,
    pub settle_time: Duration,
    pub report_interval: Duration,
    pub sampling: Sampling,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            calibration: Calibration::default(),
            settle_time: Duration::from_millis(config::SETTLE_TIME_MS),
            report_interval: Duration::from_millis(config::REPORT_INTERVAL_MS),
            sampling: Sampling::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Report {
    pub counter: u32,
    pub raw: u16,
    pub percent: i32,
}

impl Report {
    pub fn to_line(&self) -> Result<String<LINE_BUFFER_SIZE>, ReportError> {
        let mut line = String::new();
        write!(line, "{} - moisture value = {} - moisture percent = {}\r\n", self.counter, self.raw, self.percent)
            .map_err(|_| ReportError::Format)?;
        Ok(line)
    }

    pub fn is_too_dry(&self, wetness: Wetness) -> bool {
        self.percent < wetness.threshold()
    }
}

#[derive(Debug, Eq, PartialEq)]
pub enum ReportError {
    Sensor(MoistureError),
    Output,
    Format,
}

#[cfg(feature = "defmt")]
impl defmt::Format for ReportError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ReportError::Sensor(e) => defmt::write!(f, "Sensor({:?})", e),
            ReportError::Output => defmt::write!(f, "Output Error"),
            ReportError::Format => defmt::write!(f, "Format Error"),
        }
    }
}

impl From<MoistureError> for ReportError {
    fn from(err: MoistureError) -> Self {
        ReportError::Sensor(err)
    }
}

pub struct Runner<Adc, Power, SensorDelay, Output, Delay>
where
    Adc: AnalogInput,
    Power: OutputPin,
    SensorDelay: DelayNs,
    Output: Write,
    Delay: DelayNs,
{
    sensor: MoistureSensor<Adc, Power, SensorDelay>,
    output: Output,
    delay: Delay,
    report_interval: Duration,
    sampling: Sampling,
    counter: u32,
}

pub fn new<Adc, Power, SensorDelay, Output, Delay>(
    config: Config,
    adc: Adc,
    power: Power,
    sensor_delay: SensorDelay,
    output: Output,
    delay: Delay,
) -> Result<Runner<Adc, Power, SensorDelay, Output, Delay>, MoistureError>
where
    Adc: AnalogInput,
    Power: OutputPin,
    SensorDelay: DelayNs,
    Output: Write,
    Delay: DelayNs,
{
    Ok(Runner {
        sensor: MoistureSensor::new(adc, power, sensor_delay, config.calibration, config.settle_time)?,
        output,
        delay,
        report_interval: config.report_interval,
        sampling: config.sampling,
        counter: 1,
    })
}

impl<Adc, Power, SensorDelay, Output, Delay> Runner<Adc, Power, SensorDelay, Output, Delay>
where
    Adc: AnalogInput,
    Power: OutputPin,
    SensorDelay: DelayNs,
    Output: Write,
    Delay: DelayNs,
{
    /// One report, then the counter advances and the interval elapses, also
    /// when the report failed.
    pub async fn cycle(&mut self) -> Option<Report> {
        let report = match self.report_once().await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("Moisture.Report> #{} failed: {:?}", self.counter, e);
                None
            }
        };
        self.counter = self.counter.wrapping_add(1);
        self.delay.delay_ms(delay_ms(self.report_interval)).await;
        report
    }

    pub async fn report_once(&mut self) -> Result<Report, ReportError> {
        let raw = self.sensor.acquire_raw_reading().await?;
        let percent = match self.sampling {
            Sampling::Double => self.sensor.read_percent().await?,
            Sampling::Single => self.sensor.calibration().percent(raw),
        };
        let report = Report {
            counter: self.counter,
            raw,
            percent,
        };
        let line = report.to_line()?;
        self.output.write_all(line.as_bytes()).await.map_err(|_| ReportError::Output)?;
        self.output.flush().await.map_err(|_| ReportError::Output)?;
        info!("Moisture.Report> #{} raw {} => {}%", report.counter, report.raw, report.percent);
        Ok(report)
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::sensor::moisture::tests::{Event, Events, MockAdc, MockDelay, MockPin, events};

    #[derive(Debug)]
    struct MockOutputError;

    impl embedded_io_async::Error for MockOutputError {
        fn kind(&self) -> embedded_io_async::ErrorKind {
            embedded_io_async::ErrorKind::Other
        }
    }

    #[derive(Default)]
    struct MockOutput {
        written: Vec<u8>,
        fail: bool,
    }

    impl MockOutput {
        fn text(&self) -> &str {
            core::str::from_utf8(&self.written).unwrap()
        }
    }

    impl embedded_io_async::ErrorType for MockOutput {
        type Error = MockOutputError;
    }

    impl Write for MockOutput {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            if self.fail {
                return Err(MockOutputError);
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        async fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    fn test_config(sampling: Sampling) -> Config {
        Config {
            calibration: Calibration::ARDUINO_10BIT,
            settle_time: Duration::from_millis(25),
            report_interval: Duration::from_millis(1000),
            sampling,
        }
    }

    fn runner(events: &Events, samples: &[u16], sampling: Sampling) -> Runner<MockAdc, MockPin, MockDelay, MockOutput, MockDelay> {
        new(
            test_config(sampling),
            MockAdc::new(events, samples),
            MockPin::new(events),
            MockDelay::new(events),
            MockOutput::default(),
            MockDelay::new(events),
        )
        .unwrap()
    }

    #[test]
    fn test_line_format() {
        let report = Report {
            counter: 1,
            raw: 661,
            percent: 50,
        };
        assert_eq!(report.to_line().unwrap().as_str(), "1 - moisture value = 661 - moisture percent = 50\r\n");
    }

    #[test]
    fn test_line_format_out_of_range() {
        let report = Report {
            counter: 4294967295,
            raw: 65535,
            percent: -8964,
        };
        assert_eq!(
            report.to_line().unwrap().as_str(),
            "4294967295 - moisture value = 65535 - moisture percent = -8964\r\n"
        );
    }

    #[test]
    fn test_default_config() {
        let defaults = Config::default();
        assert_eq!(defaults.sampling, Sampling::Double);
        assert_eq!(defaults.calibration, Calibration::default());
        assert_eq!(defaults.settle_time, Duration::from_millis(config::SETTLE_TIME_MS));
        assert_eq!(defaults.report_interval, Duration::from_millis(config::REPORT_INTERVAL_MS));
    }

    #[tokio::test]
    async fn test_double_sampling_reads_twice() {
        let events = events();
        let mut runner = runner(&events, &[300, 1023], Sampling::Double);
        events.borrow_mut().clear();

        let report = runner.report_once().await.unwrap();

        assert_eq!(
            report,
            Report {
                counter: 1,
                raw: 300,
                percent: 0
            }
        );
        let samples = events.borrow().iter().filter(|e| **e == Event::Sample).count();
        assert_eq!(samples, 2);
        assert_eq!(runner.output.text(), "1 - moisture value = 300 - moisture percent = 0\r\n");
    }

    #[tokio::test]
    async fn test_single_sampling_reads_once() {
        let events = events();
        let mut runner = runner(&events, &[661, 1023], Sampling::Single);
        events.borrow_mut().clear();

        let report = runner.report_once().await.unwrap();

        assert_eq!(report.raw, 661);
        assert_eq!(report.percent, 50);
        assert_eq!(*events.borrow(), [Event::PowerHigh, Event::DelayMs(25), Event::Sample, Event::PowerLow]);
    }

    #[tokio::test]
    async fn test_counter_starts_at_one_and_increments() {
        let events = events();
        let mut runner = runner(&events, &[300, 300, 661, 661, 1023, 1023], Sampling::Double);

        assert_eq!(runner.counter(), 1);
        for expected in 1..=3 {
            let report = runner.cycle().await.unwrap();
            assert_eq!(report.counter, expected);
            assert_eq!(runner.counter(), expected + 1);
        }

        assert_eq!(
            runner.output.text(),
            "1 - moisture value = 300 - moisture percent = 100\r\n\
             2 - moisture value = 661 - moisture percent = 50\r\n\
             3 - moisture value = 1023 - moisture percent = 0\r\n"
        );
    }

    #[tokio::test]
    async fn test_cycle_waits_report_interval() {
        let events = events();
        let mut runner = runner(&events, &[500, 500], Sampling::Double);
        events.borrow_mut().clear();

        runner.cycle().await.unwrap();

        assert_eq!(events.borrow().last(), Some(&Event::DelayMs(1000)));
        let settles = events.borrow().iter().filter(|e| **e == Event::DelayMs(25)).count();
        assert_eq!(settles, 2);
    }

    #[tokio::test]
    async fn test_long_report_interval_saturates() {
        let events = events();
        let mut config = test_config(Sampling::Single);
        config.report_interval = Duration::from_millis(u32::MAX as u64 + 1000);
        let mut runner = new(
            config,
            MockAdc::new(&events, &[500]),
            MockPin::new(&events),
            MockDelay::new(&events),
            MockOutput::default(),
            MockDelay::new(&events),
        )
        .unwrap();

        runner.cycle().await.unwrap();

        assert_eq!(events.borrow().last(), Some(&Event::DelayMs(u32::MAX)));
    }

    #[tokio::test]
    async fn test_sensor_failure_keeps_counting() {
        let events = events();
        let mut runner = new(
            test_config(Sampling::Double),
            MockAdc::failing(&events),
            MockPin::new(&events),
            MockDelay::new(&events),
            MockOutput::default(),
            MockDelay::new(&events),
        )
        .unwrap();

        assert!(runner.cycle().await.is_none());
        assert_eq!(runner.counter(), 2);
        assert!(runner.output.written.is_empty());

        let report = runner.cycle().await.unwrap();
        assert_eq!(report.counter, 2);
    }

    #[tokio::test]
    async fn test_output_failure() {
        let events = events();
        let mut runner = runner(&events, &[400, 400], Sampling::Double);
        runner.output.fail = true;

        assert_eq!(runner.report_once().await, Err(ReportError::Output));
    }

    #[test]
    fn test_report_too_dry() {
        let report = Report {
            counter: 7,
            raw: 800,
            percent: 31,
        };
        assert!(report.is_too_dry(Wetness::Dry));
        assert!(!Report { percent: 72, ..report }.is_too_dry(Wetness::Wet));
    }
}
