//! Histogramming with a PHR 402/403/800 router: four histograms per cycle.

use crate::console::Console;
use crate::library::{PhLib, RouterInfo};
use crate::phlib::{Flags, Mode, ROUTING_CHANNELS};
use crate::session::Session;
use crate::writer::HistogramWriter;
use crate::{Error, Result};
use log::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoutingCycle {
    pub wait_loops: u64,
    /// Integral count per routing channel.
    pub totals: [u64; ROUTING_CHANNELS],
    pub overflow: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoutingSummary {
    pub router: RouterInfo,
    pub cycles: Vec<RoutingCycle>,
}

/// Enables routing and checks the router. PHR 800 inputs and CFDs are set
/// leniently: a channel that is not installed only produces a warning.
fn setup_router<L: PhLib>(session: &mut Session<L>) -> Result<RouterInfo> {
    if let Err(e) = session.enable_routing() {
        error!("No router connected.");
        return Err(e);
    }
    let channels = session.call("PH_GetRoutingChannels", |lib, dev| {
        lib.routing_channels(dev)
    })?;
    if channels != ROUTING_CHANNELS as i32 {
        session.close();
        return Err(Error::InvalidRoutingChannels(channels));
    }
    let router = session.call("PH_GetRouterVersion", |lib, dev| lib.router_version(dev))?;
    info!("Found Router Model {} Version {}", router.model, router.version);

    if router.model == "PHR 800" {
        let rc = session.conf().routing.clone();
        let (lib, dev) = session.lib_mut();
        for ch in 0..ROUTING_CHANNELS as i32 {
            if lib
                .set_phr800_input(dev, ch, rc.phr800_level, rc.phr800_edge)
                .is_err()
            {
                warn!("PH_SetPHR800Input (ch{}) failed. Maybe not installed.", ch);
            }
        }
        for ch in 0..ROUTING_CHANNELS as i32 {
            if lib
                .set_phr800_cfd(dev, ch, rc.phr800_cfd_level, rc.phr800_cfd_zero_cross)
                .is_err()
            {
                warn!("PH_SetPHR800CFD (ch{}) failed. Maybe not installed.", ch);
            }
        }
    }
    Ok(router)
}

fn cycle<L: PhLib, C: Console>(
    session: &mut Session<L>,
    console: &mut C,
) -> Result<RoutingCycle> {
    for block in 0..ROUTING_CHANNELS as i32 {
        session.clear_histogram(block)?;
    }
    // reading the flags clears them
    session.flags()?;

    let res = console.wait_for_start();
    session.io(res)?;

    let (rate0, rate1) = session.count_rates()?;
    info!("Countrate0={}/s Countrate1={}/s", rate0, rate1);

    session.start()?;
    let wait_loops = session.poll_until_complete()?;
    session.stop()?;

    let mut totals = [0u64; ROUTING_CHANNELS];
    for (block, total) in totals.iter_mut().enumerate() {
        *total = session.read_histogram(block)?;
        info!("Total count in channel {} = {}", block + 1, total);
    }

    let overflow = session.flags()?.contains(Flags::OVERFLOW);
    if overflow {
        warn!("Overflow.");
    }
    Ok(RoutingCycle {
        wait_loops,
        totals,
        overflow,
    })
}

/// Runs routed histogram mode until the operator quits, then saves the
/// four histograms of the last cycle as a table. Closes the session on
/// return.
pub fn run<L: PhLib, C: Console>(
    session: &mut Session<L>,
    console: &mut C,
    writer: HistogramWriter,
) -> Result<RoutingSummary> {
    let result = acquire(session, console, writer);
    session.close();
    result
}

fn acquire<L: PhLib, C: Console>(
    session: &mut Session<L>,
    console: &mut C,
    writer: HistogramWriter,
) -> Result<RoutingSummary> {
    let (_, router) = session.prepare_with(Mode::Histogram, setup_router)?;
    let stop = session.conf().histogram.stop_overflow;
    let stop_count = session.conf().histogram.stop_count;
    session.set_stop_overflow(stop, stop_count)?;

    let mut summary = RoutingSummary {
        router,
        cycles: Vec::new(),
    };
    loop {
        summary.cycles.push(cycle(session, console)?);
        let res = console.continue_or_quit();
        if !session.io(res)? {
            break;
        }
    }

    info!("Saving routed histograms to {}", writer.path().display());
    let res = writer.write_table(session.histograms());
    session.io(res)?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Conf;
    use crate::console::Unattended;
    use crate::sim::SimulatedLib;
    use crate::writer::{read_histogram_file, HistogramHeader};

    fn start(lib: &SimulatedLib) -> (tempfile::TempDir, Result<RoutingSummary>) {
        let mut conf = Conf::defaults().unwrap();
        conf.device.settle_ms = 0;
        let dir = tempfile::tempdir().unwrap();
        let writer =
            HistogramWriter::create(dir.path().join("r.out"), &HistogramHeader::from_conf(&conf))
                .unwrap();
        let mut session = Session::new(lib.clone(), conf).unwrap();
        let result = run(&mut session, &mut Unattended::new(1), writer);
        (dir, result)
    }

    #[test]
    fn writes_four_column_table() {
        let lib = SimulatedLib::new();
        let (dir, result) = start(&lib);
        let summary = result.unwrap();
        assert_eq!(summary.router.model, "PHR 800");
        assert_eq!(lib.count("PH_SetPHR800Input"), 4);
        assert_eq!(lib.count("PH_SetPHR800CFD"), 4);
        assert_eq!(lib.count("PH_GetHistogram"), 4);

        let file = read_histogram_file(dir.path().join("r.out")).unwrap();
        assert_eq!(file.rows.len(), crate::phlib::HISTCHAN);
        assert!(file.rows.iter().all(|r| r.len() == 4));
        for (i, total) in summary.cycles[0].totals.iter().enumerate() {
            let col: u64 = file.column(i).into_iter().map(u64::from).sum();
            assert_eq!(col, *total);
        }
    }

    #[test]
    fn routing_is_enabled_right_after_offset() {
        let lib = SimulatedLib::new();
        let (_dir, result) = start(&lib);
        result.unwrap();
        let names = lib.call_names();
        let offset = names.iter().position(|&n| n == "PH_SetOffset").unwrap();
        assert_eq!(names[offset + 1], "PH_EnableRouting");
        let resolution = names.iter().position(|&n| n == "PH_GetResolution").unwrap();
        let cfd = names.iter().rposition(|&n| n == "PH_SetPHR800CFD").unwrap();
        assert!(cfd < resolution);
    }

    #[test]
    fn stop_overflow_follows_configuration() {
        let lib = SimulatedLib::new();
        let mut conf = Conf::defaults().unwrap();
        conf.device.settle_ms = 0;
        conf.histogram.stop_overflow = false;
        conf.histogram.stop_count = 1000;
        let dir = tempfile::tempdir().unwrap();
        let writer =
            HistogramWriter::create(dir.path().join("r.out"), &HistogramHeader::from_conf(&conf))
                .unwrap();
        let mut session = Session::new(lib.clone(), conf).unwrap();
        run(&mut session, &mut Unattended::new(1), writer).unwrap();
        assert_eq!(lib.args("PH_SetStopOverflow"), vec![vec![0, 1000]]);
    }

    #[test]
    fn wrong_channel_count_aborts() {
        let lib = SimulatedLib::new().with_routing_channels(2);
        let (_dir, result) = start(&lib);
        assert!(matches!(result, Err(Error::InvalidRoutingChannels(2))));
        assert_eq!(lib.count("PH_StartMeas"), 0);
        assert_eq!(lib.count("PH_CloseDevice"), 8);
    }

    #[test]
    fn phr800_setup_failures_are_tolerated() {
        let lib = SimulatedLib::new().fail_on("PH_SetPHR800CFD", -17);
        let (_dir, result) = start(&lib);
        assert!(result.is_ok());
        assert_eq!(lib.count("PH_SetPHR800CFD"), 4);
    }

    #[test]
    fn other_routers_skip_phr800_setup() {
        let lib = SimulatedLib::new().with_router_model("PHR 402");
        let (_dir, result) = start(&lib);
        assert!(result.is_ok());
        assert_eq!(lib.count("PH_SetPHR800Input"), 0);
    }

    #[test]
    fn missing_router_is_fatal() {
        let lib = SimulatedLib::new().fail_on("PH_EnableRouting", -19);
        let (_dir, result) = start(&lib);
        assert!(matches!(
            result,
            Err(Error::Library {
                call: "PH_EnableRouting",
                ..
            })
        ));
    }
}
