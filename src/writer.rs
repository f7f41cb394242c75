use crate::config::Conf;
use crate::phlib::{Mode, HISTCHAN, ROUTING_CHANNELS};
use crate::Histogram;
use anyhow::{anyhow, bail, Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// The eight settings recorded at the top of every histogram file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistogramHeader {
    pub binning: i32,
    pub offset: i32,
    pub acquisition_time: i32,
    pub sync_divider: i32,
    pub cfd_zero_cross0: i32,
    pub cfd_level0: i32,
    pub cfd_zero_cross1: i32,
    pub cfd_level1: i32,
}

const LABELS: [&str; 8] = [
    "Binning",
    "Offset",
    "AcquisitionTime",
    "SyncDivider",
    "CFDZeroCross0",
    "CFDLevel0",
    "CFDZeroCross1",
    "CFDLevel1",
];

impl HistogramHeader {
    pub fn from_conf(conf: &Conf) -> Self {
        let setup = conf.setup(Mode::Histogram);
        Self {
            binning: setup.binning,
            offset: setup.offset,
            acquisition_time: setup.acquisition_time,
            sync_divider: setup.sync_divider,
            cfd_zero_cross0: setup.cfd_zero_cross0,
            cfd_level0: setup.cfd_level0,
            cfd_zero_cross1: setup.cfd_zero_cross1,
            cfd_level1: setup.cfd_level1,
        }
    }

    fn values(&self) -> [i32; 8] {
        [
            self.binning,
            self.offset,
            self.acquisition_time,
            self.sync_divider,
            self.cfd_zero_cross0,
            self.cfd_level0,
            self.cfd_zero_cross1,
            self.cfd_level1,
        ]
    }

    fn from_values(v: [i32; 8]) -> Self {
        Self {
            binning: v[0],
            offset: v[1],
            acquisition_time: v[2],
            sync_divider: v[3],
            cfd_zero_cross0: v[4],
            cfd_level0: v[5],
            cfd_zero_cross1: v[6],
            cfd_level1: v[7],
        }
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for (label, value) in LABELS.iter().zip(self.values()) {
            writeln!(out, "{:<17}: {}", label, value)?;
        }
        Ok(())
    }

    pub fn read_from<R: BufRead>(input: &mut R) -> Result<Self> {
        let mut values = [0i32; 8];
        let mut line = String::new();
        for (i, label) in LABELS.iter().enumerate() {
            line.clear();
            if input.read_line(&mut line)? == 0 {
                bail!("header ends before {}", label);
            }
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| anyhow!("malformed header line {:?}", line.trim_end()))?;
            if key.trim() != *label {
                bail!("expected header field {}, found {:?}", label, key.trim());
            }
            values[i] = value
                .trim()
                .parse()
                .with_context(|| format!("invalid value for {}", label))?;
        }
        Ok(Self::from_values(values))
    }
}

/// Text output of histogram mode: the header, then one count per line.
///
/// The file is created (and the header written) up front so that an
/// unwritable path is detected before the device is opened.
pub struct HistogramWriter {
    out: BufWriter<File>,
    path: PathBuf,
}

impl HistogramWriter {
    pub fn create(path: impl AsRef<Path>, header: &HistogramHeader) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut out = BufWriter::new(File::create(&path)?);
        header.write_to(&mut out)?;
        Ok(Self { out, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_histogram(mut self, hist: &Histogram) -> io::Result<()> {
        for count in hist.iter() {
            write!(self.out, "\n{:>5}", count)?;
        }
        self.out.flush()
    }

    /// Routed histograms as a table: one row per channel, one column per
    /// routing channel.
    pub fn write_table(mut self, hists: &[Histogram]) -> io::Result<()> {
        if hists.len() != ROUTING_CHANNELS {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("expected {} histograms, got {}", ROUTING_CHANNELS, hists.len()),
            ));
        }
        for ch in 0..HISTCHAN {
            write!(
                self.out,
                "\n{:>9} {:>9} {:>9} {:>9}",
                hists[0][ch], hists[1][ch], hists[2][ch], hists[3][ch]
            )?;
        }
        self.out.flush()
    }
}

/// Contents of a histogram file read back from disk.
#[derive(Debug)]
pub struct HistogramFile {
    pub header: HistogramHeader,
    /// One row per line after the header; a single column for plain
    /// histogram files, four for routed ones.
    pub rows: Vec<Vec<u32>>,
}

impl HistogramFile {
    pub fn counts(&self) -> impl Iterator<Item = u32> + '_ {
        self.rows.iter().flatten().copied()
    }

    pub fn column(&self, i: usize) -> Vec<u32> {
        self.rows.iter().filter_map(|r| r.get(i).copied()).collect()
    }
}

pub fn read_histogram_file(path: impl AsRef<Path>) -> Result<HistogramFile> {
    let path = path.as_ref();
    let mut input = BufReader::new(
        File::open(path).with_context(|| format!("cannot open {}", path.display()))?,
    );
    let header = HistogramHeader::read_from(&mut input)
        .with_context(|| format!("bad header in {}", path.display()))?;
    let mut rows = Vec::with_capacity(HISTCHAN);
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row = line
            .split_whitespace()
            .map(|v| v.parse::<u32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("bad count line {:?}", line))?;
        rows.push(row);
    }
    Ok(HistogramFile { header, rows })
}

/// Binary output of TTTR mode: records appended in acquisition order as
/// little-endian 32-bit words, no header.
pub struct RecordWriter {
    out: BufWriter<File>,
    written: u64,
}

impl RecordWriter {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            out: BufWriter::new(File::create(path)?),
            written: 0,
        })
    }

    pub fn write_records(&mut self, records: &[u32]) -> io::Result<()> {
        for record in records {
            self.out.write_all(&record.to_le_bytes())?;
        }
        self.written += records.len() as u64;
        Ok(())
    }

    pub fn finish(mut self) -> io::Result<u64> {
        self.out.flush()?;
        Ok(self.written)
    }
}

pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path.as_ref())?;
    if bytes.len() % 4 != 0 {
        bail!("record file length {} is not a multiple of 4", bytes.len());
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> HistogramHeader {
        HistogramHeader {
            binning: 2,
            offset: 1500,
            acquisition_time: 750,
            sync_divider: 4,
            cfd_zero_cross0: 9,
            cfd_level0: 120,
            cfd_zero_cross1: 11,
            cfd_level1: 80,
        }
    }

    #[test]
    fn header_layout_is_label_colon_value() {
        let mut out = Vec::new();
        header().write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0], "Binning          : 2");
        assert_eq!(lines[2], "AcquisitionTime  : 750");
        assert_eq!(lines[7], "CFDLevel1        : 80");
    }

    #[test]
    fn header_parses_back() {
        let mut out = Vec::new();
        header().write_to(&mut out).unwrap();
        let parsed = HistogramHeader::read_from(&mut out.as_slice()).unwrap();
        assert_eq!(parsed, header());
    }

    #[test]
    fn header_rejects_reordered_fields() {
        let text = "Offset : 0\nBinning : 0\n";
        assert!(HistogramHeader::read_from(&mut text.as_bytes()).is_err());
    }

    #[test]
    fn histogram_file_has_one_count_per_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hist.out");
        let mut hist = Histogram::new();
        hist[0] = 12345;
        hist[HISTCHAN - 1] = 7;
        HistogramWriter::create(&path, &header())
            .unwrap()
            .write_histogram(&hist)
            .unwrap();

        let file = read_histogram_file(&path).unwrap();
        assert_eq!(file.header, header());
        let counts: Vec<u32> = file.counts().collect();
        assert_eq!(counts.len(), HISTCHAN);
        assert_eq!(counts[0], 12345);
        assert_eq!(counts[HISTCHAN - 1], 7);
    }

    #[test]
    fn table_needs_four_histograms() {
        let dir = tempfile::tempdir().unwrap();
        let writer = HistogramWriter::create(dir.path().join("r.out"), &header()).unwrap();
        let err = writer.write_table(&[Histogram::new()]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn records_are_little_endian_words() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.out");
        let mut writer = RecordWriter::create(&path).unwrap();
        writer.write_records(&[1, 0xdeadbeef]).unwrap();
        writer.write_records(&[]).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes, vec![1, 0, 0, 0, 0xef, 0xbe, 0xad, 0xde]);
        assert_eq!(read_records(&path).unwrap(), vec![1, 0xdeadbeef]);
    }
}
