#![allow(dead_code)]

use picoharp_daq::writer::{HistogramHeader, HistogramWriter, RecordWriter};
use picoharp_daq::Conf;
use std::path::PathBuf;
use tempfile::TempDir;

/// Default configuration without the settling pause, so tests run fast.
pub fn conf() -> Conf {
    let mut conf = Conf::defaults().unwrap();
    conf.device.settle_ms = 0;
    conf
}

pub struct Output {
    pub dir: TempDir,
    pub path: PathBuf,
}

pub fn output(name: &str) -> Output {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    Output { dir, path }
}

pub fn histogram_writer(out: &Output, conf: &Conf) -> HistogramWriter {
    HistogramWriter::create(&out.path, &HistogramHeader::from_conf(conf)).unwrap()
}

pub fn record_writer(out: &Output) -> RecordWriter {
    RecordWriter::create(&out.path).unwrap()
}
