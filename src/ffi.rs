//! Bindings to the vendor PHLib shared library.
//!
//! Only compiled with the `phlib` feature. The declarations follow
//! `phlib.h` of PHLib v3.0; all functions return an `int` status code that
//! is negative on failure.

#![allow(non_snake_case)]

use crate::library::{HardwareInfo, LibResult, PhLib, RouterInfo};
use crate::phlib::{
    c_buffer_to_string, check, Flags, Mode, ERROR_STRING_LEN, LIB_VERSION_LEN, MODEL_LEN,
    PARTNO_LEN, SERIAL_LEN, TTREADMAX, VERSION_LEN,
};
use crate::{Histogram, RecordBuffer};
use libc::{c_char, c_double, c_int, c_uint};

extern "C" {
    fn PH_GetLibraryVersion(vers: *mut c_char) -> c_int;
    fn PH_GetErrorString(errstring: *mut c_char, errcode: c_int) -> c_int;

    fn PH_OpenDevice(devidx: c_int, serial: *mut c_char) -> c_int;
    fn PH_CloseDevice(devidx: c_int) -> c_int;
    fn PH_Initialize(devidx: c_int, mode: c_int) -> c_int;
    fn PH_GetHardwareInfo(
        devidx: c_int,
        model: *mut c_char,
        partno: *mut c_char,
        version: *mut c_char,
    ) -> c_int;
    fn PH_Calibrate(devidx: c_int) -> c_int;

    fn PH_SetSyncDiv(devidx: c_int, div: c_int) -> c_int;
    fn PH_SetInputCFD(devidx: c_int, channel: c_int, level: c_int, zc: c_int) -> c_int;
    fn PH_SetBinning(devidx: c_int, binning: c_int) -> c_int;
    fn PH_SetOffset(devidx: c_int, offset: c_int) -> c_int;
    fn PH_GetResolution(devidx: c_int, resolution: *mut c_double) -> c_int;
    fn PH_GetCountRate(devidx: c_int, channel: c_int, rate: *mut c_int) -> c_int;
    fn PH_SetStopOverflow(devidx: c_int, stop_ovfl: c_int, stopcount: c_int) -> c_int;

    fn PH_ClearHistMem(devidx: c_int, block: c_int) -> c_int;
    fn PH_StartMeas(devidx: c_int, tacq: c_int) -> c_int;
    fn PH_StopMeas(devidx: c_int) -> c_int;
    fn PH_CTCStatus(devidx: c_int, ctcstatus: *mut c_int) -> c_int;
    fn PH_GetHistogram(devidx: c_int, chcount: *mut c_uint, block: c_int) -> c_int;
    fn PH_GetFlags(devidx: c_int, flags: *mut c_int) -> c_int;
    fn PH_ReadFiFo(
        devidx: c_int,
        buffer: *mut c_uint,
        count: c_int,
        nactual: *mut c_int,
    ) -> c_int;

    fn PH_EnableRouting(devidx: c_int, enable: c_int) -> c_int;
    fn PH_GetRoutingChannels(devidx: c_int, rtchannels: *mut c_int) -> c_int;
    fn PH_GetRouterVersion(devidx: c_int, model: *mut c_char, version: *mut c_char) -> c_int;
    fn PH_SetPHR800Input(devidx: c_int, channel: c_int, level: c_int, edge: c_int) -> c_int;
    fn PH_SetPHR800CFD(devidx: c_int, channel: c_int, dscrlevel: c_int, zerocross: c_int)
        -> c_int;
}

/// The real library. Stateless on the Rust side; the vendor library keeps
/// its own per-index device table.
#[derive(Debug, Default)]
pub struct VendorLib;

impl VendorLib {
    pub fn new() -> Self {
        VendorLib
    }
}

impl PhLib for VendorLib {
    fn library_version(&mut self) -> LibResult<String> {
        let mut vers = vec![0u8; LIB_VERSION_LEN];
        check(unsafe { PH_GetLibraryVersion(vers.as_mut_ptr() as *mut c_char) })?;
        Ok(c_buffer_to_string(vers))
    }

    fn error_string(&mut self, code: i32) -> LibResult<String> {
        let mut msg = vec![0u8; ERROR_STRING_LEN];
        check(unsafe { PH_GetErrorString(msg.as_mut_ptr() as *mut c_char, code) })?;
        Ok(c_buffer_to_string(msg))
    }

    fn open_device(&mut self, index: i32) -> LibResult<String> {
        let mut serial = vec![0u8; SERIAL_LEN];
        check(unsafe { PH_OpenDevice(index, serial.as_mut_ptr() as *mut c_char) })?;
        Ok(c_buffer_to_string(serial))
    }

    fn close_device(&mut self, index: i32) -> LibResult<()> {
        check(unsafe { PH_CloseDevice(index) })?;
        Ok(())
    }

    fn initialize(&mut self, index: i32, mode: Mode) -> LibResult<()> {
        check(unsafe { PH_Initialize(index, mode as c_int) })?;
        Ok(())
    }

    fn hardware_info(&mut self, index: i32) -> LibResult<HardwareInfo> {
        let mut model = vec![0u8; MODEL_LEN];
        let mut partno = vec![0u8; PARTNO_LEN];
        let mut version = vec![0u8; VERSION_LEN];
        check(unsafe {
            PH_GetHardwareInfo(
                index,
                model.as_mut_ptr() as *mut c_char,
                partno.as_mut_ptr() as *mut c_char,
                version.as_mut_ptr() as *mut c_char,
            )
        })?;
        Ok(HardwareInfo {
            model: c_buffer_to_string(model),
            part_number: c_buffer_to_string(partno),
            version: c_buffer_to_string(version),
        })
    }

    fn calibrate(&mut self, index: i32) -> LibResult<()> {
        check(unsafe { PH_Calibrate(index) })?;
        Ok(())
    }

    fn set_sync_div(&mut self, index: i32, divider: i32) -> LibResult<()> {
        check(unsafe { PH_SetSyncDiv(index, divider) })?;
        Ok(())
    }

    fn set_input_cfd(
        &mut self,
        index: i32,
        channel: i32,
        level: i32,
        zero_cross: i32,
    ) -> LibResult<()> {
        check(unsafe { PH_SetInputCFD(index, channel, level, zero_cross) })?;
        Ok(())
    }

    fn set_binning(&mut self, index: i32, binning: i32) -> LibResult<()> {
        check(unsafe { PH_SetBinning(index, binning) })?;
        Ok(())
    }

    fn set_offset(&mut self, index: i32, offset: i32) -> LibResult<()> {
        check(unsafe { PH_SetOffset(index, offset) })?;
        Ok(())
    }

    fn resolution(&mut self, index: i32) -> LibResult<f64> {
        let mut resolution: c_double = 0.0;
        check(unsafe { PH_GetResolution(index, &mut resolution) })?;
        Ok(resolution)
    }

    fn count_rate(&mut self, index: i32, channel: i32) -> LibResult<i32> {
        let mut rate: c_int = 0;
        check(unsafe { PH_GetCountRate(index, channel, &mut rate) })?;
        Ok(rate)
    }

    fn set_stop_overflow(&mut self, index: i32, stop: bool, stop_count: i32) -> LibResult<()> {
        check(unsafe { PH_SetStopOverflow(index, stop as c_int, stop_count) })?;
        Ok(())
    }

    fn clear_hist_mem(&mut self, index: i32, block: i32) -> LibResult<()> {
        check(unsafe { PH_ClearHistMem(index, block) })?;
        Ok(())
    }

    fn start_meas(&mut self, index: i32, acquisition_time: i32) -> LibResult<()> {
        check(unsafe { PH_StartMeas(index, acquisition_time) })?;
        Ok(())
    }

    fn stop_meas(&mut self, index: i32) -> LibResult<()> {
        check(unsafe { PH_StopMeas(index) })?;
        Ok(())
    }

    fn ctc_status(&mut self, index: i32) -> LibResult<bool> {
        let mut status: c_int = 0;
        check(unsafe { PH_CTCStatus(index, &mut status) })?;
        Ok(status != 0)
    }

    fn histogram(&mut self, index: i32, counts: &mut Histogram, block: i32) -> LibResult<()> {
        // The library writes exactly HISTCHAN values through this pointer.
        check(unsafe { PH_GetHistogram(index, counts.as_mut_ptr(), block) })?;
        Ok(())
    }

    fn flags(&mut self, index: i32) -> LibResult<Flags> {
        let mut flags: c_int = 0;
        check(unsafe { PH_GetFlags(index, &mut flags) })?;
        Ok(Flags::from_bits_retain(flags))
    }

    fn read_fifo(
        &mut self,
        index: i32,
        buffer: &mut RecordBuffer,
        count: usize,
    ) -> LibResult<usize> {
        let count = count.min(TTREADMAX) as c_int;
        let mut nactual: c_int = 0;
        check(unsafe { PH_ReadFiFo(index, buffer.as_mut_ptr(), count, &mut nactual) })?;
        Ok(nactual.max(0) as usize)
    }

    fn enable_routing(&mut self, index: i32, enable: bool) -> LibResult<()> {
        check(unsafe { PH_EnableRouting(index, enable as c_int) })?;
        Ok(())
    }

    fn routing_channels(&mut self, index: i32) -> LibResult<i32> {
        let mut channels: c_int = 0;
        check(unsafe { PH_GetRoutingChannels(index, &mut channels) })?;
        Ok(channels)
    }

    fn router_version(&mut self, index: i32) -> LibResult<RouterInfo> {
        let mut model = vec![0u8; VERSION_LEN];
        let mut version = vec![0u8; VERSION_LEN];
        check(unsafe {
            PH_GetRouterVersion(
                index,
                model.as_mut_ptr() as *mut c_char,
                version.as_mut_ptr() as *mut c_char,
            )
        })?;
        Ok(RouterInfo {
            model: c_buffer_to_string(model),
            version: c_buffer_to_string(version),
        })
    }

    fn set_phr800_input(
        &mut self,
        index: i32,
        channel: i32,
        level: i32,
        edge: i32,
    ) -> LibResult<()> {
        check(unsafe { PH_SetPHR800Input(index, channel, level, edge) })?;
        Ok(())
    }

    fn set_phr800_cfd(
        &mut self,
        index: i32,
        channel: i32,
        level: i32,
        zero_cross: i32,
    ) -> LibResult<()> {
        check(unsafe { PH_SetPHR800CFD(index, channel, level, zero_cross) })?;
        Ok(())
    }
}
