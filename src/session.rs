use crate::config::Conf;
use crate::library::{HardwareInfo, LibResult, PhLib};
use crate::phlib::{Flags, Mode, PhLibReturn, LIB_VERSION, MAXDEVNUM};
use crate::{Error, Histogram, RecordBuffer, Result};
use log::{debug, error, info, warn};
use std::thread::sleep;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Closed,
    Opened,
    Initialized,
    Calibrated,
    Configured,
    Acquiring,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedDevice {
    pub index: i32,
    pub serial: String,
}

/// One measurement session on one device.
///
/// The session owns the library handle, the configuration and the data
/// buffers. Every library call goes through [`Session::call`]: a negative
/// status is looked up, logged, and tears the session down (stop a running
/// measurement, close all device indices) before the error is returned.
/// Teardown happens at most once; dropping the session performs it too.
#[derive(Debug)]
pub struct Session<L: PhLib> {
    lib: L,
    conf: Conf,
    state: SessionState,
    opened: Vec<OpenedDevice>,
    device: i32,
    mode: Mode,
    torn_down: bool,
    histograms: Vec<Histogram>,
    records: Option<RecordBuffer>,
}

impl<L: PhLib> Session<L> {
    pub fn new(mut lib: L, conf: Conf) -> Result<Self> {
        conf.validate()?;
        match lib.library_version() {
            Ok(version) => {
                info!("PHLib version is {}", version);
                if version != LIB_VERSION {
                    warn!("This program was built for PHLib version {}", LIB_VERSION);
                }
            }
            Err(code) => warn!("Could not read library version (error {})", code),
        }
        Ok(Self {
            lib,
            conf,
            state: SessionState::Closed,
            opened: Vec::new(),
            device: 0,
            mode: Mode::Histogram,
            torn_down: false,
            histograms: Vec::new(),
            records: None,
        })
    }

    pub fn conf(&self) -> &Conf {
        &self.conf
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn device(&self) -> i32 {
        self.device
    }

    pub fn opened(&self) -> &[OpenedDevice] {
        &self.opened
    }

    pub fn histogram(&self, block: usize) -> Option<&Histogram> {
        self.histograms.get(block)
    }

    pub fn histograms(&self) -> &[Histogram] {
        &self.histograms
    }

    pub fn records(&self, n: usize) -> &[u32] {
        match &self.records {
            Some(buf) => buf.filled(n),
            None => &[],
        }
    }

    pub fn call<T>(
        &mut self,
        name: &'static str,
        f: impl FnOnce(&mut L, i32) -> LibResult<T>,
    ) -> Result<T> {
        if self.torn_down {
            return Err(Error::SessionClosed);
        }
        let res = f(&mut self.lib, self.device);
        self.check(name, res)
    }

    /// The single error path: on failure, fetch the library's message,
    /// log it, tear everything down and return the error.
    pub fn check<T>(&mut self, name: &'static str, res: LibResult<T>) -> Result<T> {
        match res {
            Ok(value) => Ok(value),
            Err(code) => {
                let message = self.describe(code);
                error!("{} error {} ({}). Aborted.", name, code, message);
                self.teardown();
                Err(Error::Library {
                    call: name,
                    code,
                    message,
                })
            }
        }
    }

    pub fn io<T>(&mut self, res: std::io::Result<T>) -> Result<T> {
        res.map_err(|e| {
            error!("I/O error: {}. Aborted.", e);
            self.teardown();
            Error::Io(e)
        })
    }

    fn describe(&mut self, code: i32) -> String {
        self.lib
            .error_string(code)
            .unwrap_or_else(|_| format!("{:?}", PhLibReturn::from(code)))
    }

    /// Scans every device index, keeps those that open, and selects the
    /// device to use. Fails with [`Error::NoDeviceFound`] (after closing
    /// all indices) if none opened or none matches the configured serial.
    pub fn open(&mut self) -> Result<()> {
        info!("Searching for PicoHarp devices...");
        for index in 0..MAXDEVNUM as i32 {
            match self.lib.open_device(index) {
                Ok(serial) => {
                    info!("  {}        S/N {}", index, serial);
                    self.opened.push(OpenedDevice { index, serial });
                }
                Err(code) if PhLibReturn::from(code) == PhLibReturn::DeviceOpenFail => {
                    info!("  {}        no device", index);
                }
                Err(code) => {
                    let message = self.describe(code);
                    info!("  {}        {}", index, message);
                }
            }
        }

        let chosen = match &self.conf.device.serial {
            Some(serial) => self.opened.iter().find(|d| &d.serial == serial),
            None => self.opened.first(),
        };
        match chosen {
            Some(dev) => {
                self.device = dev.index;
                self.state = SessionState::Opened;
                info!("Using device #{}", self.device);
                Ok(())
            }
            None => {
                error!("No device available.");
                self.teardown();
                Err(Error::NoDeviceFound)
            }
        }
    }

    fn require(&mut self, at_least: SessionState, what: &str) -> Result<()> {
        if self.torn_down {
            return Err(Error::SessionClosed);
        }
        if self.state < at_least {
            return Err(Error::InvalidState(format!(
                "{} requires the session to be {:?}, but it is {:?}",
                what, at_least, self.state
            )));
        }
        Ok(())
    }

    pub fn initialize(&mut self, mode: Mode) -> Result<HardwareInfo> {
        self.require(SessionState::Opened, "initialize")?;
        info!("Initializing the device...");
        self.call("PH_Initialize", |lib, dev| lib.initialize(dev, mode))?;
        self.mode = mode;
        let hw = self.call("PH_GetHardwareInfo", |lib, dev| lib.hardware_info(dev))?;
        info!(
            "Found Model {} Partnum {} Version {}",
            hw.model, hw.part_number, hw.version
        );
        self.state = SessionState::Initialized;
        Ok(hw)
    }

    pub fn calibrate(&mut self) -> Result<()> {
        self.require(SessionState::Initialized, "calibrate")?;
        info!("Calibrating...");
        self.call("PH_Calibrate", |lib, dev| lib.calibrate(dev))?;
        self.state = SessionState::Calibrated;
        Ok(())
    }

    /// Applies sync divider, discriminators, binning and offset for the
    /// initialized mode, then reports the resolution and, after the
    /// settling time, the count rates.
    pub fn configure(&mut self) -> Result<()> {
        self.configure_with(|_| Ok(()))
    }

    /// Like [`Session::configure`], running `after_offset` once the input
    /// settings are applied and before the resolution is read. Routing is
    /// enabled at that point.
    pub fn configure_with<T>(
        &mut self,
        after_offset: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.require(SessionState::Calibrated, "configure")?;
        let setup = self.conf.setup(self.mode);

        self.call("PH_SetSyncDiv", |lib, dev| {
            lib.set_sync_div(dev, setup.sync_divider)
        })?;
        self.call("PH_SetInputCFD", |lib, dev| {
            lib.set_input_cfd(dev, 0, setup.cfd_level0, setup.cfd_zero_cross0)
        })?;
        self.call("PH_SetInputCFD", |lib, dev| {
            lib.set_input_cfd(dev, 1, setup.cfd_level1, setup.cfd_zero_cross1)
        })?;
        self.call("PH_SetBinning", |lib, dev| lib.set_binning(dev, setup.binning))?;
        self.call("PH_SetOffset", |lib, dev| lib.set_offset(dev, setup.offset))?;
        let extra = after_offset(self)?;
        let resolution = self.call("PH_GetResolution", |lib, dev| lib.resolution(dev))?;

        // count rates are only valid 100 ms after init or a sync divider change
        sleep(Duration::from_millis(self.conf.device.settle_ms));
        let (rate0, rate1) = self.count_rates()?;
        info!(
            "Resolution={} Countrate0={}/s Countrate1={}/s",
            resolution, rate0, rate1
        );
        self.state = SessionState::Configured;
        Ok(extra)
    }

    pub fn prepare(&mut self, mode: Mode) -> Result<HardwareInfo> {
        self.prepare_with(mode, |_| Ok(())).map(|(hw, ())| hw)
    }

    pub fn prepare_with<T>(
        &mut self,
        mode: Mode,
        after_offset: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<(HardwareInfo, T)> {
        self.open()?;
        let hw = self.initialize(mode)?;
        self.calibrate()?;
        let extra = self.configure_with(after_offset)?;
        Ok((hw, extra))
    }

    pub fn count_rates(&mut self) -> Result<(i32, i32)> {
        let rate0 = self.call("PH_GetCountRate", |lib, dev| lib.count_rate(dev, 0))?;
        let rate1 = self.call("PH_GetCountRate", |lib, dev| lib.count_rate(dev, 1))?;
        Ok((rate0, rate1))
    }

    pub fn flags(&mut self) -> Result<Flags> {
        self.call("PH_GetFlags", |lib, dev| lib.flags(dev))
    }

    pub fn set_stop_overflow(&mut self, stop: bool, stop_count: i32) -> Result<()> {
        self.call("PH_SetStopOverflow", |lib, dev| {
            lib.set_stop_overflow(dev, stop, stop_count)
        })
    }

    pub fn clear_histogram(&mut self, block: i32) -> Result<()> {
        self.call("PH_ClearHistMem", |lib, dev| lib.clear_hist_mem(dev, block))
    }

    pub fn start(&mut self) -> Result<()> {
        self.require(SessionState::Configured, "start")?;
        let tacq = self.conf.setup(self.mode).acquisition_time;
        self.call("PH_StartMeas", |lib, dev| lib.start_meas(dev, tacq))?;
        self.state = SessionState::Acquiring;
        debug!("Measuring for {} milliseconds...", tacq);
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.call("PH_StopMeas", |lib, dev| lib.stop_meas(dev))?;
        self.state = SessionState::Idle;
        Ok(())
    }

    pub fn ctc_done(&mut self) -> Result<bool> {
        self.call("PH_CTCStatus", |lib, dev| lib.ctc_status(dev))
    }

    /// Polls the completion status until the acquisition timer expires and
    /// returns the number of polls. Busy-waits unless a poll interval is
    /// configured.
    pub fn poll_until_complete(&mut self) -> Result<u64> {
        let interval = Duration::from_micros(self.conf.device.poll_interval_us);
        let mut polls = 0u64;
        loop {
            polls += 1;
            if self.ctc_done()? {
                return Ok(polls);
            }
            if !interval.is_zero() {
                sleep(interval);
            }
        }
    }

    pub fn read_histogram(&mut self, block: usize) -> Result<u64> {
        while self.histograms.len() <= block {
            self.histograms.push(Histogram::new());
        }
        if self.torn_down {
            return Err(Error::SessionClosed);
        }
        let res = self
            .lib
            .histogram(self.device, &mut self.histograms[block], block as i32);
        self.check("PH_GetHistogram", res)?;
        Ok(self.histograms[block].integral())
    }

    pub fn read_fifo(&mut self, count: usize) -> Result<usize> {
        if self.torn_down {
            return Err(Error::SessionClosed);
        }
        let buffer = self.records.get_or_insert_with(RecordBuffer::new);
        let res = self.lib.read_fifo(self.device, buffer, count);
        self.check("PH_ReadFiFo", res)
    }

    pub fn enable_routing(&mut self) -> Result<()> {
        self.call("PH_EnableRouting", |lib, dev| lib.enable_routing(dev, true))
    }

    /// Gives the routing flow access to calls whose failures it tolerates.
    pub(crate) fn lib_mut(&mut self) -> (&mut L, i32) {
        (&mut self.lib, self.device)
    }

    /// Stops a running measurement if there is one, then closes every
    /// device index. Idempotent.
    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        if self.state == SessionState::Acquiring {
            if let Err(code) = self.lib.stop_meas(self.device) {
                warn!("PH_StopMeas during teardown failed with {}", code);
            }
        }
        // no harm in closing indices that were never opened
        for index in 0..MAXDEVNUM as i32 {
            let _ = self.lib.close_device(index);
        }
        self.torn_down = true;
        self.state = SessionState::Closed;
        debug!("Session closed");
    }

    pub fn close(&mut self) {
        self.teardown();
    }

    pub fn is_closed(&self) -> bool {
        self.torn_down
    }
}

impl<L: PhLib> Drop for Session<L> {
    fn drop(&mut self) {
        self.teardown();
    }
}
