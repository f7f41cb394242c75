//! Interactive histogram acquisition.

use crate::console::Console;
use crate::library::PhLib;
use crate::phlib::{Flags, Mode};
use crate::session::Session;
use crate::writer::HistogramWriter;
use crate::Result;
use log::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleReport {
    pub wait_loops: u64,
    pub total_count: u64,
    pub overflow: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HistogramSummary {
    pub cycles: Vec<CycleReport>,
}

impl HistogramSummary {
    pub fn last(&self) -> Option<&CycleReport> {
        self.cycles.last()
    }
}

/// One clear/start/poll/stop/read cycle on histogram block 0.
fn cycle<L: PhLib, C: Console>(
    session: &mut Session<L>,
    console: &mut C,
) -> Result<CycleReport> {
    session.clear_histogram(0)?;

    let res = console.wait_for_start();
    session.io(res)?;

    let (rate0, rate1) = session.count_rates()?;
    info!("Countrate0={}/s Countrate1={}/s", rate0, rate1);

    session.start()?;
    let wait_loops = session.poll_until_complete()?;
    session.stop()?;

    let total_count = session.read_histogram(0)?;
    let flags = session.flags()?;
    let overflow = flags.contains(Flags::OVERFLOW);

    info!("Waitloop={}  TotalCount={}", wait_loops, total_count);
    if overflow {
        warn!("Overflow.");
    }
    Ok(CycleReport {
        wait_loops,
        total_count,
        overflow,
    })
}

/// Runs histogram mode to completion: prepares the session, repeats
/// acquisition cycles until the operator quits, then saves the last
/// histogram to `writer`. The session is closed on return, whatever the
/// outcome.
pub fn run<L: PhLib, C: Console>(
    session: &mut Session<L>,
    console: &mut C,
    writer: HistogramWriter,
) -> Result<HistogramSummary> {
    let result = acquire(session, console, writer);
    session.close();
    result
}

fn acquire<L: PhLib, C: Console>(
    session: &mut Session<L>,
    console: &mut C,
    writer: HistogramWriter,
) -> Result<HistogramSummary> {
    session.prepare(Mode::Histogram)?;
    let stop = session.conf().histogram.stop_overflow;
    let stop_count = session.conf().histogram.stop_count;
    session.set_stop_overflow(stop, stop_count)?;

    let mut summary = HistogramSummary::default();
    loop {
        summary.cycles.push(cycle(session, console)?);
        let res = console.continue_or_quit();
        if !session.io(res)? {
            break;
        }
    }

    info!("Saving histogram to {}", writer.path().display());
    let res = match session.histogram(0) {
        Some(hist) => writer.write_histogram(hist),
        None => Ok(()),
    };
    session.io(res)?;
    Ok(summary)
}
