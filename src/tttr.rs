//! Time-tagged (TTTR) acquisition: drain the FIFO into a binary file.

use crate::console::Console;
use crate::library::PhLib;
use crate::phlib::Flags;
use crate::session::Session;
use crate::writer::RecordWriter;
use crate::Result;
use log::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TttrSummary {
    pub records: u64,
    /// FIFO reads issued, including the ones that returned nothing.
    pub reads: u64,
    /// The acquisition was cut short because the FIFO filled up.
    pub fifo_overrun: bool,
    pub completed: bool,
}

/// Runs one TTTR acquisition in the configured mode (T2 or T3).
///
/// Each loop iteration first checks the flags: a full FIFO ends the loop
/// at once, without another read. Otherwise one FIFO read is issued; a
/// non-empty read is appended to `writer`, an empty one checks whether the
/// acquisition time is up. The measurement is always stopped afterwards,
/// and the session is closed on return.
pub fn run<L: PhLib, C: Console>(
    session: &mut Session<L>,
    console: &mut C,
    writer: RecordWriter,
) -> Result<TttrSummary> {
    let result = acquire(session, console, writer);
    session.close();
    result
}

fn acquire<L: PhLib, C: Console>(
    session: &mut Session<L>,
    console: &mut C,
    mut writer: RecordWriter,
) -> Result<TttrSummary> {
    let mode = session.conf().tttr.mode;
    let block_size = session.conf().tttr.block_size;
    session.prepare(mode)?;

    let mut summary = TttrSummary::default();
    let res = console.progress(0);
    session.io(res)?;

    session.start()?;
    loop {
        let flags = session.flags()?;
        if flags.intersects(Flags::FIFOFULL) {
            warn!("FiFo Overrun!");
            summary.fifo_overrun = true;
            break;
        }

        let n = session.read_fifo(block_size)?;
        summary.reads += 1;
        if n > 0 {
            let res = writer.write_records(session.records(n));
            session.io(res)?;
            summary.records += n as u64;
            let res = console.progress(summary.records);
            session.io(res)?;
        } else if session.ctc_done()? {
            summary.completed = true;
            break;
        }
    }
    session.stop()?;

    let res = console.finish_progress();
    session.io(res)?;
    if summary.completed {
        info!("Done");
    }
    let res = writer.finish();
    let written = session.io(res)?;
    info!("{} records written", written);
    Ok(summary)
}
