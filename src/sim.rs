//! An in-process stand-in for PHLib.
//!
//! `SimulatedLib` honours the call contract of the vendor library (status
//! codes, per-index device table, mode and calibration preconditions) and
//! produces plausible data, but does not model the hardware. It records
//! every call so tests can assert on the exact sequence a flow issued.
//!
//! Cloning a `SimulatedLib` yields another handle onto the same state,
//! which lets a test keep a handle after moving one into a session.

use crate::library::{HardwareInfo, LibResult, PhLib, RouterInfo};
use crate::phlib::{Flags, Mode, PhLibReturn, MAXDEVNUM, ROUTING_CHANNELS};
use crate::{Histogram, RecordBuffer};
use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

/// One recorded library call: entry point name and device index (or the
/// error code for `PH_GetErrorString`, `-1` for index-less calls), plus
/// the integer arguments that followed the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub name: &'static str,
    pub index: i32,
    pub args: Vec<i32>,
}

#[derive(Debug, Default, Clone, Copy)]
struct DeviceState {
    open: bool,
    mode: Option<Mode>,
    calibrated: bool,
    running: bool,
    routing: bool,
    ctc_remaining: usize,
}

#[derive(Debug)]
struct SimState {
    version: String,
    serials: HashMap<i32, String>,
    devices: [DeviceState; MAXDEVNUM],
    failures: HashMap<&'static str, i32>,
    fifo_counts: VecDeque<usize>,
    flags: VecDeque<i32>,
    ctc_polls: usize,
    routing_channels: i32,
    router_model: String,
    max_count: u32,
    next_record: u32,
    rng: StdRng,
    calls: Vec<Call>,
}

#[derive(Debug, Clone)]
pub struct SimulatedLib {
    state: Rc<RefCell<SimState>>,
}

impl Default for SimulatedLib {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedLib {
    /// One device at index 0, histograms with up to 10 counts per channel,
    /// measurements that complete on the third status poll.
    pub fn new() -> Self {
        let state = SimState {
            version: crate::phlib::LIB_VERSION.to_string(),
            serials: HashMap::from([(0, "1020304".to_string())]),
            devices: [DeviceState::default(); MAXDEVNUM],
            failures: HashMap::new(),
            fifo_counts: VecDeque::new(),
            flags: VecDeque::new(),
            ctc_polls: 3,
            routing_channels: ROUTING_CHANNELS as i32,
            router_model: "PHR 800".to_string(),
            max_count: 10,
            next_record: 0,
            rng: StdRng::seed_from_u64(0x5048_3330),
            calls: Vec::new(),
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Replaces the set of attached devices. Serials are derived from the index.
    pub fn with_devices(self, indices: &[i32]) -> Self {
        self.state.borrow_mut().serials = indices
            .iter()
            .map(|&i| (i, format!("10203{:02}", i)))
            .collect();
        self
    }

    pub fn with_version(self, version: &str) -> Self {
        self.state.borrow_mut().version = version.to_string();
        self
    }

    /// Makes every call to the entry point `name` (e.g. `"PH_Calibrate"`)
    /// fail with `code`.
    pub fn fail_on(self, name: &'static str, code: i32) -> Self {
        self.state.borrow_mut().failures.insert(name, code);
        self
    }

    /// Number of records each successive FIFO read returns. Once the
    /// script runs out, reads return zero records.
    pub fn with_fifo_counts(self, counts: impl IntoIterator<Item = usize>) -> Self {
        self.state.borrow_mut().fifo_counts = counts.into_iter().collect();
        self
    }

    /// Raw flag words returned by successive `PH_GetFlags` calls; zero after that.
    pub fn with_flags(self, flags: impl IntoIterator<Item = i32>) -> Self {
        self.state.borrow_mut().flags = flags.into_iter().collect();
        self
    }

    /// Number of `PH_CTCStatus` polls until a started measurement reports done.
    pub fn with_ctc_polls(self, polls: usize) -> Self {
        self.state.borrow_mut().ctc_polls = polls.max(1);
        self
    }

    pub fn with_routing_channels(self, channels: i32) -> Self {
        self.state.borrow_mut().routing_channels = channels;
        self
    }

    pub fn with_router_model(self, model: &str) -> Self {
        self.state.borrow_mut().router_model = model.to_string();
        self
    }

    pub fn with_max_count(self, max_count: u32) -> Self {
        self.state.borrow_mut().max_count = max_count.max(1);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn call_names(&self) -> Vec<&'static str> {
        self.state.borrow().calls.iter().map(|c| c.name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| c.name == name)
            .count()
    }

    /// Arguments of every call to `name`, in call order.
    pub fn args(&self, name: &str) -> Vec<Vec<i32>> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| c.name == name)
            .map(|c| c.args.clone())
            .collect()
    }

    pub fn closed_indices(&self) -> Vec<i32> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| c.name == "PH_CloseDevice")
            .map(|c| c.index)
            .collect()
    }

    pub fn is_running(&self, index: i32) -> bool {
        self.state
            .borrow()
            .device(index)
            .map(|d| d.running)
            .unwrap_or(false)
    }

    fn enter(
        &self,
        name: &'static str,
        index: i32,
        args: &[i32],
    ) -> LibResult<std::cell::RefMut<'_, SimState>> {
        let mut state = self.state.borrow_mut();
        trace!("{}({}, {:?})", name, index, args);
        state.calls.push(Call {
            name,
            index,
            args: args.to_vec(),
        });
        if let Some(&code) = state.failures.get(name) {
            return Err(code);
        }
        Ok(state)
    }

    /// Like `enter`, but also requires the device to be open and initialized.
    fn enter_ready(
        &self,
        name: &'static str,
        index: i32,
        args: &[i32],
    ) -> LibResult<std::cell::RefMut<'_, SimState>> {
        let state = self.enter(name, index, args)?;
        let refused = match state.device(index) {
            None => Some(PhLibReturn::InvalidArgument),
            Some(dev) if !dev.open => Some(PhLibReturn::DeviceNotOpen),
            Some(dev) if dev.mode.is_none() => Some(PhLibReturn::NotInitialized),
            Some(_) => None,
        };
        match refused {
            Some(code) => Err(code as i32),
            None => Ok(state),
        }
    }
}

impl SimState {
    fn device(&self, index: i32) -> Option<&DeviceState> {
        usize::try_from(index).ok().and_then(|i| self.devices.get(i))
    }

    fn device_mut(&mut self, index: i32) -> &mut DeviceState {
        // callers have already validated the index
        &mut self.devices[index as usize]
    }
}

fn error_text(code: i32) -> &'static str {
    match PhLibReturn::from(code) {
        PhLibReturn::None => "no error",
        PhLibReturn::DeviceOpenFail => "device open failed",
        PhLibReturn::DeviceBusy => "device busy",
        PhLibReturn::DeviceNotOpen => "device not open",
        PhLibReturn::DeviceLocked => "device locked",
        PhLibReturn::InvalidArgument => "invalid argument",
        PhLibReturn::InvalidMode => "invalid mode",
        PhLibReturn::NotInitialized => "not initialized",
        PhLibReturn::NotCalibrated => "not calibrated",
        PhLibReturn::DmaFail => "DMA failure",
        PhLibReturn::StatusFail => "status failure",
        PhLibReturn::UsbBulkrdFail => "USB bulk read failed",
        _ => "unknown error",
    }
}

impl PhLib for SimulatedLib {
    fn library_version(&mut self) -> LibResult<String> {
        let state = self.enter("PH_GetLibraryVersion", -1, &[])?;
        Ok(state.version.clone())
    }

    fn error_string(&mut self, code: i32) -> LibResult<String> {
        self.enter("PH_GetErrorString", code, &[])?;
        Ok(error_text(code).to_string())
    }

    fn open_device(&mut self, index: i32) -> LibResult<String> {
        let mut state = self.enter("PH_OpenDevice", index, &[])?;
        if state.device(index).is_none() {
            return Err(PhLibReturn::InvalidArgument as i32);
        }
        let serial = state
            .serials
            .get(&index)
            .cloned()
            .ok_or(PhLibReturn::DeviceOpenFail as i32)?;
        *state.device_mut(index) = DeviceState {
            open: true,
            ..Default::default()
        };
        Ok(serial)
    }

    fn close_device(&mut self, index: i32) -> LibResult<()> {
        let mut state = self.enter("PH_CloseDevice", index, &[])?;
        if state.device(index).is_none() {
            return Err(PhLibReturn::InvalidArgument as i32);
        }
        *state.device_mut(index) = DeviceState::default();
        Ok(())
    }

    fn initialize(&mut self, index: i32, mode: Mode) -> LibResult<()> {
        let mut state = self.enter("PH_Initialize", index, &[mode as i32])?;
        match state.device(index) {
            Some(dev) if dev.open => {}
            _ => return Err(PhLibReturn::DeviceNotOpen as i32),
        }
        let dev = state.device_mut(index);
        dev.mode = Some(mode);
        dev.calibrated = false;
        Ok(())
    }

    fn hardware_info(&mut self, index: i32) -> LibResult<HardwareInfo> {
        self.enter_ready("PH_GetHardwareInfo", index, &[])?;
        Ok(HardwareInfo {
            model: "PicoHarp 300".to_string(),
            part_number: "930004".to_string(),
            version: "2.0".to_string(),
        })
    }

    fn calibrate(&mut self, index: i32) -> LibResult<()> {
        let mut state = self.enter_ready("PH_Calibrate", index, &[])?;
        state.device_mut(index).calibrated = true;
        Ok(())
    }

    fn set_sync_div(&mut self, index: i32, divider: i32) -> LibResult<()> {
        self.enter_ready("PH_SetSyncDiv", index, &[divider])?;
        match divider {
            1 | 2 | 4 | 8 => Ok(()),
            _ => Err(PhLibReturn::InvalidArgument as i32),
        }
    }

    fn set_input_cfd(
        &mut self,
        index: i32,
        channel: i32,
        level: i32,
        zero_cross: i32,
    ) -> LibResult<()> {
        self.enter_ready("PH_SetInputCFD", index, &[channel, level, zero_cross])?;
        if !(0..=1).contains(&channel) {
            return Err(PhLibReturn::InvalidArgument as i32);
        }
        Ok(())
    }

    fn set_binning(&mut self, index: i32, binning: i32) -> LibResult<()> {
        self.enter_ready("PH_SetBinning", index, &[binning])?;
        Ok(())
    }

    fn set_offset(&mut self, index: i32, offset: i32) -> LibResult<()> {
        self.enter_ready("PH_SetOffset", index, &[offset])?;
        Ok(())
    }

    fn resolution(&mut self, index: i32) -> LibResult<f64> {
        self.enter_ready("PH_GetResolution", index, &[])?;
        Ok(4.0)
    }

    fn count_rate(&mut self, index: i32, channel: i32) -> LibResult<i32> {
        let mut state = self.enter_ready("PH_GetCountRate", index, &[channel])?;
        Ok(state.rng.random_range(1_000..50_000) * (channel + 1))
    }

    fn set_stop_overflow(&mut self, index: i32, stop: bool, stop_count: i32) -> LibResult<()> {
        self.enter_ready("PH_SetStopOverflow", index, &[stop as i32, stop_count])?;
        Ok(())
    }

    fn clear_hist_mem(&mut self, index: i32, block: i32) -> LibResult<()> {
        self.enter_ready("PH_ClearHistMem", index, &[block])?;
        Ok(())
    }

    fn start_meas(&mut self, index: i32, acquisition_time: i32) -> LibResult<()> {
        let mut state = self.enter_ready("PH_StartMeas", index, &[acquisition_time])?;
        let polls = state.ctc_polls;
        let dev = state.device_mut(index);
        if !dev.calibrated {
            return Err(PhLibReturn::NotCalibrated as i32);
        }
        if dev.running {
            return Err(PhLibReturn::InstanceRunning as i32);
        }
        dev.running = true;
        dev.ctc_remaining = polls;
        Ok(())
    }

    fn stop_meas(&mut self, index: i32) -> LibResult<()> {
        let mut state = self.enter_ready("PH_StopMeas", index, &[])?;
        state.device_mut(index).running = false;
        Ok(())
    }

    fn ctc_status(&mut self, index: i32) -> LibResult<bool> {
        let mut state = self.enter_ready("PH_CTCStatus", index, &[])?;
        let dev = state.device_mut(index);
        if dev.ctc_remaining > 0 {
            dev.ctc_remaining -= 1;
        }
        Ok(dev.ctc_remaining == 0)
    }

    fn histogram(&mut self, index: i32, counts: &mut Histogram, block: i32) -> LibResult<()> {
        let mut state = self.enter_ready("PH_GetHistogram", index, &[block])?;
        let blocks = if state.device_mut(index).routing {
            ROUTING_CHANNELS as i32
        } else {
            1
        };
        if !(0..blocks).contains(&block) {
            return Err(PhLibReturn::InvalidArgument as i32);
        }
        let max = state.max_count;
        for count in counts.iter_mut() {
            *count = state.rng.random_range(0..max);
        }
        Ok(())
    }

    fn flags(&mut self, index: i32) -> LibResult<Flags> {
        let mut state = self.enter_ready("PH_GetFlags", index, &[])?;
        let flags = state.flags.pop_front().unwrap_or(0);
        Ok(Flags::from_bits_retain(flags))
    }

    fn read_fifo(
        &mut self,
        index: i32,
        buffer: &mut RecordBuffer,
        count: usize,
    ) -> LibResult<usize> {
        let mut state = self.enter_ready("PH_ReadFiFo", index, &[count as i32])?;
        match state.device(index).and_then(|d| d.mode) {
            Some(mode) if mode.is_tttr() => {}
            _ => return Err(PhLibReturn::InvalidMode as i32),
        }
        let n = state
            .fifo_counts
            .pop_front()
            .unwrap_or(0)
            .min(count)
            .min(buffer.capacity());
        for record in buffer.as_mut_slice()[..n].iter_mut() {
            *record = state.next_record;
            state.next_record = state.next_record.wrapping_add(1);
        }
        Ok(n)
    }

    fn enable_routing(&mut self, index: i32, enable: bool) -> LibResult<()> {
        let mut state = self.enter_ready("PH_EnableRouting", index, &[enable as i32])?;
        state.device_mut(index).routing = enable;
        Ok(())
    }

    fn routing_channels(&mut self, index: i32) -> LibResult<i32> {
        let state = self.enter_ready("PH_GetRoutingChannels", index, &[])?;
        Ok(state.routing_channels)
    }

    fn router_version(&mut self, index: i32) -> LibResult<RouterInfo> {
        let state = self.enter_ready("PH_GetRouterVersion", index, &[])?;
        Ok(RouterInfo {
            model: state.router_model.clone(),
            version: "1.0".to_string(),
        })
    }

    fn set_phr800_input(
        &mut self,
        index: i32,
        channel: i32,
        level: i32,
        edge: i32,
    ) -> LibResult<()> {
        self.enter_ready("PH_SetPHR800Input", index, &[channel, level, edge])?;
        Ok(())
    }

    fn set_phr800_cfd(
        &mut self,
        index: i32,
        channel: i32,
        level: i32,
        zero_cross: i32,
    ) -> LibResult<()> {
        self.enter_ready("PH_SetPHR800CFD", index, &[channel, level, zero_cross])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_attached_indices_open() {
        let mut lib = SimulatedLib::new().with_devices(&[2]);
        assert_eq!(lib.open_device(0), Err(PhLibReturn::DeviceOpenFail as i32));
        assert_eq!(lib.open_device(2), Ok("1020302".to_string()));
        assert_eq!(lib.open_device(8), Err(PhLibReturn::InvalidArgument as i32));
    }

    #[test]
    fn calls_before_initialize_are_rejected() {
        let mut lib = SimulatedLib::new();
        lib.open_device(0).unwrap();
        assert_eq!(lib.calibrate(0), Err(PhLibReturn::NotInitialized as i32));
        lib.initialize(0, Mode::Histogram).unwrap();
        assert_eq!(lib.calibrate(0), Ok(()));
    }

    #[test]
    fn measurement_completes_after_configured_polls() {
        let mut lib = SimulatedLib::new().with_ctc_polls(2);
        lib.open_device(0).unwrap();
        lib.initialize(0, Mode::Histogram).unwrap();
        lib.calibrate(0).unwrap();
        lib.start_meas(0, 10).unwrap();
        assert_eq!(lib.ctc_status(0), Ok(false));
        assert_eq!(lib.ctc_status(0), Ok(true));
        assert!(lib.is_running(0));
        lib.stop_meas(0).unwrap();
        assert!(!lib.is_running(0));
    }

    #[test]
    fn fifo_script_is_consumed_in_order() {
        let mut lib = SimulatedLib::new().with_fifo_counts([3, 0, 2]);
        let mut buf = RecordBuffer::new();
        lib.open_device(0).unwrap();
        lib.initialize(0, Mode::T2).unwrap();
        assert_eq!(lib.read_fifo(0, &mut buf, 512), Ok(3));
        assert_eq!(buf.filled(3), &[0, 1, 2]);
        assert_eq!(lib.read_fifo(0, &mut buf, 512), Ok(0));
        assert_eq!(lib.read_fifo(0, &mut buf, 512), Ok(2));
        assert_eq!(buf.filled(2), &[3, 4]);
        assert_eq!(lib.read_fifo(0, &mut buf, 512), Ok(0));
    }

    #[test]
    fn fifo_read_is_invalid_in_histogram_mode() {
        let mut lib = SimulatedLib::new();
        let mut buf = RecordBuffer::new();
        lib.open_device(0).unwrap();
        lib.initialize(0, Mode::Histogram).unwrap();
        assert_eq!(
            lib.read_fifo(0, &mut buf, 512),
            Err(PhLibReturn::InvalidMode as i32)
        );
    }

    #[test]
    fn injected_failures_are_recorded() {
        let mut lib = SimulatedLib::new().fail_on("PH_GetFlags", -29);
        let handle = lib.clone();
        lib.open_device(0).unwrap();
        lib.initialize(0, Mode::T2).unwrap();
        assert_eq!(lib.flags(0), Err(-29));
        assert_eq!(handle.count("PH_GetFlags"), 1);
        assert_eq!(
            handle.call_names(),
            vec!["PH_OpenDevice", "PH_Initialize", "PH_GetFlags"]
        );
    }
}
