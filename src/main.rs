use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use picoharp_daq::{
    histogram, routing, tttr,
    writer::{HistogramHeader, HistogramWriter, RecordWriter},
    Conf, Console, Mode, PhLib, Prompt, Session, SimulatedLib, Unattended,
};
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::{fs::File, path::Path, path::PathBuf};
use time::macros::format_description;

#[derive(Parser, Debug)]
#[command(version, about = "PicoHarp 300 acquisition through PHLib")]
struct Cli {
    /// Configuration file (TOML). Missing file means built-in defaults.
    #[arg(short, long, default_value = "picoharp.toml")]
    config: PathBuf,
    /// Use the simulated library instead of the vendor one.
    #[arg(long)]
    simulate: bool,
    /// Also write the log to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// More output; repeat for trace level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Output file, overriding the configured one.
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Histogram mode: 65536-channel histogram saved as text.
    Hist,
    /// Time-tagged mode (T2/T3): raw records saved as binary.
    Tttr,
    /// Histogram mode with a router: four histograms saved as a table.
    Routing,
}

fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<()> {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let config = ConfigBuilder::new()
        .set_time_format_custom(format_description!(
            "[hour]:[minute]:[second].[subsecond digits:3]"
        ))
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    loggers.push(TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ));
    if let Some(path) = log_file {
        let file = File::create(path)
            .with_context(|| format!("cannot create log file {}", path.display()))?;
        loggers.push(WriteLogger::new(LevelFilter::Debug, config, file));
    }
    CombinedLogger::init(loggers).context("logger already initialized")?;
    Ok(())
}

fn log_settings(conf: &Conf, command: Command) {
    let mode = match command {
        Command::Tttr => conf.tttr.mode,
        Command::Hist | Command::Routing => Mode::Histogram,
    };
    let setup = conf.setup(mode);
    info!("Mode             : {:?}", mode);
    info!("Binning          : {}", setup.binning);
    info!("Offset           : {}", setup.offset);
    info!("AcquisitionTime  : {}", setup.acquisition_time);
    info!("SyncDivider      : {}", setup.sync_divider);
    info!("CFDZeroCross0    : {}", setup.cfd_zero_cross0);
    info!("CFDLevel0        : {}", setup.cfd_level0);
    info!("CFDZeroCross1    : {}", setup.cfd_zero_cross1);
    info!("CFDLevel1        : {}", setup.cfd_level1);
}

fn run_histogram<L: PhLib, C: Console>(
    lib: L,
    conf: Conf,
    console: &mut C,
    routed: bool,
) -> Result<()> {
    let output = if routed {
        conf.routing.output.clone()
    } else {
        conf.histogram.output.clone()
    };
    // create the output before touching the device
    let writer = HistogramWriter::create(&output, &HistogramHeader::from_conf(&conf))
        .with_context(|| format!("cannot open output file {}", output))?;
    let mut session = Session::new(lib, conf)?;
    if routed {
        let summary = routing::run(&mut session, console, writer)?;
        info!(
            "Saved {} cycle(s) from router {} to {}",
            summary.cycles.len(),
            summary.router.model,
            output
        );
    } else {
        let summary = histogram::run(&mut session, console, writer)?;
        info!("Saved {} cycle(s) to {}", summary.cycles.len(), output);
    }
    Ok(())
}

fn run<L: PhLib>(lib: L, conf: Conf, command: Command) -> Result<()> {
    conf.validate()?;
    log_settings(&conf, command);
    match command {
        Command::Hist | Command::Routing => {
            let routed = matches!(command, Command::Routing);
            match conf.histogram.cycles {
                Some(n) => run_histogram(lib, conf, &mut Unattended::new(n), routed),
                None => run_histogram(lib, conf, &mut Prompt::terminal(), routed),
            }
        }
        Command::Tttr => {
            let output = conf.tttr.output.clone();
            let writer = RecordWriter::create(&output)
                .with_context(|| format!("cannot open output file {}", output))?;
            let mut session = Session::new(lib, conf)?;
            let summary = tttr::run(&mut session, &mut Prompt::terminal(), writer)?;
            if summary.fifo_overrun {
                bail!(
                    "FIFO overrun after {} records; data in {} is incomplete",
                    summary.records,
                    output
                );
            }
            info!("Saved {} records to {}", summary.records, output);
            Ok(())
        }
    }
}

#[cfg(feature = "phlib")]
fn run_vendor(conf: Conf, command: Command) -> Result<()> {
    run(picoharp_daq::VendorLib::new(), conf, command)
}

#[cfg(not(feature = "phlib"))]
fn run_vendor(_conf: Conf, _command: Command) -> Result<()> {
    bail!("built without the `phlib` feature; rebuild with it or pass --simulate")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_deref())?;
    info!("picoharp_daq {}", env!("CARGO_PKG_VERSION"));

    let mut conf = Conf::load(Some(cli.config.as_path()))
        .with_context(|| format!("cannot load configuration {}", cli.config.display()))?;
    if let Some(output) = &cli.output {
        let output = output.display().to_string();
        match cli.command {
            Command::Hist => conf.histogram.output = output,
            Command::Tttr => conf.tttr.output = output,
            Command::Routing => conf.routing.output = output,
        }
    }

    if cli.simulate {
        run(SimulatedLib::new(), conf, cli.command)
    } else {
        run_vendor(conf, cli.command)
    }
}
