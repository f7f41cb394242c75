use crate::phlib::{
    Mode, ACQTMAX, ACQTMIN, BINSTEPSMAX, DISCRMAX, DISCRMIN, OFFSETMAX, OFFSETMIN,
    PHR800LVMAX, PHR800LVMIN, STOPCNTMAX, STOPCNTMIN, TTREADMAX, TTREAD_STEP, ZCMAX, ZCMIN,
};
use crate::Error;
use confique::Config;
use std::path::Path;

/// Run configuration. Every field has a default taken from the vendor demo
/// programs, so an empty or missing file is a valid configuration.
#[derive(Config, Debug, Clone)]
pub struct Conf {
    #[config(nested)]
    pub device: DeviceSettings,
    #[config(nested)]
    pub acquisition: AcquisitionSettings,
    #[config(nested)]
    pub inputs: InputSettings,
    #[config(nested)]
    pub histogram: HistogramSettings,
    #[config(nested)]
    pub tttr: TttrSettings,
    #[config(nested)]
    pub routing: RoutingSettings,
}

#[derive(Config, Debug, Clone)]
pub struct DeviceSettings {
    /// Use the device with this serial number instead of the first one found.
    #[config(env = "PHDAQ_SERIAL")]
    pub serial: Option<String>,
    /// Sleep between completion polls, in microseconds. Zero busy-waits.
    #[config(default = 0)]
    pub poll_interval_us: u64,
    /// Wait before the first count rate reading after configuration.
    #[config(default = 200)]
    pub settle_ms: u64,
}

#[derive(Config, Debug, Clone)]
pub struct AcquisitionSettings {
    #[config(default = 0)]
    pub binning: i32,
    #[config(default = 0)]
    pub offset: i32,
    /// Measurement time in milliseconds.
    #[config(default = 1000, env = "PHDAQ_TACQ")]
    pub acquisition_time: i32,
    #[config(default = 8)]
    pub sync_divider: i32,
}

/// Constant-fraction discriminator settings of both inputs, in millivolts.
#[derive(Config, Debug, Clone)]
pub struct InputSettings {
    #[config(default = 100)]
    pub cfd_level0: i32,
    #[config(default = 10)]
    pub cfd_zero_cross0: i32,
    #[config(default = 100)]
    pub cfd_level1: i32,
    #[config(default = 10)]
    pub cfd_zero_cross1: i32,
}

#[derive(Config, Debug, Clone)]
pub struct HistogramSettings {
    #[config(default = "dlldemo.out")]
    pub output: String,
    #[config(default = true)]
    pub stop_overflow: bool,
    #[config(default = 65535)]
    pub stop_count: i32,
    /// Run this many cycles without prompting. Unset means interactive.
    pub cycles: Option<u32>,
}

/// Time-tagged mode keeps its own timing and discriminator settings; the
/// sync divider in particular must suit the mode (see the PHLib manual).
#[derive(Config, Debug, Clone)]
pub struct TttrSettings {
    #[config(default = "T2")]
    pub mode: Mode,
    #[config(default = 10000)]
    pub acquisition_time: i32,
    #[config(default = 1)]
    pub sync_divider: i32,
    #[config(default = 50)]
    pub cfd_level0: i32,
    #[config(default = 10)]
    pub cfd_zero_cross0: i32,
    #[config(default = 150)]
    pub cfd_level1: i32,
    #[config(default = 10)]
    pub cfd_zero_cross1: i32,
    #[config(default = "tttrmode.out")]
    pub output: String,
    /// Records requested per FIFO read; a multiple of 512.
    #[config(default = 131072)]
    pub block_size: usize,
}

#[derive(Config, Debug, Clone)]
pub struct RoutingSettings {
    #[config(default = "routing.out")]
    pub output: String,
    #[config(default = -200)]
    pub phr800_level: i32,
    #[config(default = 0)]
    pub phr800_edge: i32,
    #[config(default = 100)]
    pub phr800_cfd_level: i32,
    #[config(default = 10)]
    pub phr800_cfd_zero_cross: i32,
}

/// Values applied to the device for one measurement mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSetup {
    pub binning: i32,
    pub offset: i32,
    pub acquisition_time: i32,
    pub sync_divider: i32,
    pub cfd_level0: i32,
    pub cfd_zero_cross0: i32,
    pub cfd_level1: i32,
    pub cfd_zero_cross1: i32,
}

fn check_setup(setup: &DeviceSetup, timing: &str, inputs: &str) -> Result<(), Error> {
    in_range("acquisition.binning", setup.binning, 0, BINSTEPSMAX - 1)?;
    in_range("acquisition.offset", setup.offset, OFFSETMIN, OFFSETMAX)?;
    in_range(
        &format!("{}.acquisition_time", timing),
        setup.acquisition_time,
        ACQTMIN,
        ACQTMAX,
    )?;
    if ![1, 2, 4, 8].contains(&setup.sync_divider) {
        return Err(Error::InvalidConfig(format!(
            "{}.sync_divider = {} must be one of 1, 2, 4, 8",
            timing, setup.sync_divider
        )));
    }
    in_range(&format!("{}.cfd_level0", inputs), setup.cfd_level0, DISCRMIN, DISCRMAX)?;
    in_range(&format!("{}.cfd_level1", inputs), setup.cfd_level1, DISCRMIN, DISCRMAX)?;
    in_range(&format!("{}.cfd_zero_cross0", inputs), setup.cfd_zero_cross0, ZCMIN, ZCMAX)?;
    in_range(&format!("{}.cfd_zero_cross1", inputs), setup.cfd_zero_cross1, ZCMIN, ZCMAX)?;
    Ok(())
}

fn in_range(name: &str, value: i32, min: i32, max: i32) -> Result<(), Error> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "{} = {} is outside {}..={}",
            name, value, min, max
        )))
    }
}

impl Conf {
    /// Loads defaults, then the file at `path` if it exists, then `PHDAQ_*`
    /// environment overrides (highest priority).
    pub fn load(path: Option<&Path>) -> Result<Conf, confique::Error> {
        let mut builder = Conf::builder().env();
        if let Some(path) = path {
            builder = builder.file(path);
        }
        builder.load()
    }

    pub fn defaults() -> Result<Conf, confique::Error> {
        Conf::builder().load()
    }

    /// Checks every value against the ranges the library accepts, before
    /// any of them reaches the device.
    pub fn validate(&self) -> Result<(), Error> {
        check_setup(&self.setup(Mode::Histogram), "acquisition", "inputs")?;
        check_setup(&self.setup(Mode::T2), "tttr", "tttr")?;

        if self.histogram.cycles == Some(0) {
            return Err(Error::InvalidConfig(
                "histogram.cycles must be at least 1".to_string(),
            ));
        }
        in_range(
            "histogram.stop_count",
            self.histogram.stop_count,
            STOPCNTMIN,
            STOPCNTMAX,
        )?;

        let block = self.tttr.block_size;
        if block == 0 || block > TTREADMAX || block % TTREAD_STEP != 0 {
            return Err(Error::InvalidConfig(format!(
                "tttr.block_size = {} must be a non-zero multiple of {} up to {}",
                block, TTREAD_STEP, TTREADMAX
            )));
        }
        if !self.tttr.mode.is_tttr() {
            return Err(Error::InvalidConfig(
                "tttr.mode must be T2 or T3".to_string(),
            ));
        }

        let routing = &self.routing;
        in_range("routing.phr800_level", routing.phr800_level, PHR800LVMIN, PHR800LVMAX)?;
        in_range("routing.phr800_edge", routing.phr800_edge, 0, 1)?;
        in_range(
            "routing.phr800_cfd_level",
            routing.phr800_cfd_level,
            DISCRMIN,
            DISCRMAX,
        )?;
        in_range(
            "routing.phr800_cfd_zero_cross",
            routing.phr800_cfd_zero_cross,
            ZCMIN,
            ZCMAX,
        )?;
        Ok(())
    }

    /// Histogram and routing runs use `[acquisition]` and `[inputs]`;
    /// T2/T3 runs take timing and discriminators from `[tttr]`.
    pub fn setup(&self, mode: Mode) -> DeviceSetup {
        let acq = &self.acquisition;
        if mode.is_tttr() {
            let tttr = &self.tttr;
            DeviceSetup {
                binning: acq.binning,
                offset: acq.offset,
                acquisition_time: tttr.acquisition_time,
                sync_divider: tttr.sync_divider,
                cfd_level0: tttr.cfd_level0,
                cfd_zero_cross0: tttr.cfd_zero_cross0,
                cfd_level1: tttr.cfd_level1,
                cfd_zero_cross1: tttr.cfd_zero_cross1,
            }
        } else {
            let inputs = &self.inputs;
            DeviceSetup {
                binning: acq.binning,
                offset: acq.offset,
                acquisition_time: acq.acquisition_time,
                sync_divider: acq.sync_divider,
                cfd_level0: inputs.cfd_level0,
                cfd_zero_cross0: inputs.cfd_zero_cross0,
                cfd_level1: inputs.cfd_level1,
                cfd_zero_cross1: inputs.cfd_zero_cross1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_histogram_demo() {
        let conf = Conf::defaults().unwrap();
        assert_eq!(conf.acquisition.binning, 0);
        assert_eq!(conf.acquisition.acquisition_time, 1000);
        assert_eq!(conf.acquisition.sync_divider, 8);
        assert_eq!(conf.inputs.cfd_level0, 100);
        assert_eq!(conf.inputs.cfd_zero_cross1, 10);
        assert_eq!(conf.tttr.mode, Mode::T2);
        assert_eq!(conf.tttr.block_size, TTREADMAX);
        assert!(conf.histogram.cycles.is_none());
        conf.validate().unwrap();
    }

    #[test]
    fn rejects_unsupported_sync_divider() {
        let mut conf = Conf::defaults().unwrap();
        conf.acquisition.sync_divider = 3;
        assert!(matches!(conf.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_out_of_range_discriminator() {
        let mut conf = Conf::defaults().unwrap();
        conf.inputs.cfd_level1 = DISCRMAX + 1;
        assert!(matches!(conf.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_unaligned_block_size() {
        let mut conf = Conf::defaults().unwrap();
        conf.tttr.block_size = 1000;
        assert!(matches!(conf.validate(), Err(Error::InvalidConfig(_))));
        conf.tttr.block_size = 1024;
        conf.validate().unwrap();
    }

    #[test]
    fn tttr_setup_has_its_own_defaults() {
        let conf = Conf::defaults().unwrap();
        let hist = conf.setup(Mode::Histogram);
        assert_eq!(hist.sync_divider, 8);
        assert_eq!(hist.acquisition_time, 1000);
        assert_eq!((hist.cfd_level0, hist.cfd_level1), (100, 100));

        let t2 = conf.setup(Mode::T2);
        assert_eq!(t2.sync_divider, 1);
        assert_eq!(t2.acquisition_time, 10000);
        assert_eq!((t2.cfd_level0, t2.cfd_level1), (50, 150));
        assert_eq!((t2.cfd_zero_cross0, t2.cfd_zero_cross1), (10, 10));
        assert_eq!(conf.setup(Mode::T3), t2);
    }

    #[test]
    fn tttr_values_are_range_checked() {
        let mut conf = Conf::defaults().unwrap();
        conf.tttr.sync_divider = 16;
        match conf.validate() {
            Err(Error::InvalidConfig(msg)) => assert!(msg.starts_with("tttr.sync_divider")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn zero_cycles_is_rejected() {
        let mut conf = Conf::defaults().unwrap();
        conf.histogram.cycles = Some(0);
        assert!(matches!(conf.validate(), Err(Error::InvalidConfig(_))));
        conf.histogram.cycles = Some(1);
        conf.validate().unwrap();
    }

    #[test]
    fn histogram_mode_is_not_a_tttr_mode() {
        let mut conf = Conf::defaults().unwrap();
        conf.tttr.mode = Mode::Histogram;
        assert!(conf.validate().is_err());
    }
}
