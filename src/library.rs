use crate::phlib::{Flags, Mode};
use crate::{Histogram, RecordBuffer};

/// Raw status code returned by a failing library call (always negative).
pub type LibResult<T> = Result<T, i32>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HardwareInfo {
    pub model: String,
    pub part_number: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouterInfo {
    pub model: String,
    pub version: String,
}

/// The PHLib call surface used by this crate.
///
/// Every method corresponds to exactly one library entry point and takes
/// the device index first, as the vendor ABI does. Failures carry the
/// raw negative status code; translating it into a message is left to
/// [`PhLib::error_string`] so the caller decides how to report it.
pub trait PhLib {
    fn library_version(&mut self) -> LibResult<String>;
    fn error_string(&mut self, code: i32) -> LibResult<String>;

    /// Opens the device at `index` and returns its serial number.
    fn open_device(&mut self, index: i32) -> LibResult<String>;
    fn close_device(&mut self, index: i32) -> LibResult<()>;
    fn initialize(&mut self, index: i32, mode: Mode) -> LibResult<()>;
    fn hardware_info(&mut self, index: i32) -> LibResult<HardwareInfo>;
    fn calibrate(&mut self, index: i32) -> LibResult<()>;

    fn set_sync_div(&mut self, index: i32, divider: i32) -> LibResult<()>;
    fn set_input_cfd(
        &mut self,
        index: i32,
        channel: i32,
        level: i32,
        zero_cross: i32,
    ) -> LibResult<()>;
    fn set_binning(&mut self, index: i32, binning: i32) -> LibResult<()>;
    fn set_offset(&mut self, index: i32, offset: i32) -> LibResult<()>;
    fn resolution(&mut self, index: i32) -> LibResult<f64>;
    fn count_rate(&mut self, index: i32, channel: i32) -> LibResult<i32>;
    fn set_stop_overflow(&mut self, index: i32, stop: bool, stop_count: i32) -> LibResult<()>;

    fn clear_hist_mem(&mut self, index: i32, block: i32) -> LibResult<()>;
    fn start_meas(&mut self, index: i32, acquisition_time: i32) -> LibResult<()>;
    fn stop_meas(&mut self, index: i32) -> LibResult<()>;
    /// Returns `true` once the acquisition timer has expired.
    fn ctc_status(&mut self, index: i32) -> LibResult<bool>;
    fn histogram(&mut self, index: i32, counts: &mut Histogram, block: i32) -> LibResult<()>;
    fn flags(&mut self, index: i32) -> LibResult<Flags>;
    /// Reads up to `count` records into the front of `buffer` and returns
    /// how many were actually transferred. May return fewer, including zero.
    fn read_fifo(&mut self, index: i32, buffer: &mut RecordBuffer, count: usize)
        -> LibResult<usize>;

    fn enable_routing(&mut self, index: i32, enable: bool) -> LibResult<()>;
    fn routing_channels(&mut self, index: i32) -> LibResult<i32>;
    fn router_version(&mut self, index: i32) -> LibResult<RouterInfo>;
    fn set_phr800_input(&mut self, index: i32, channel: i32, level: i32, edge: i32)
        -> LibResult<()>;
    fn set_phr800_cfd(
        &mut self,
        index: i32,
        channel: i32,
        level: i32,
        zero_cross: i32,
    ) -> LibResult<()>;
}
