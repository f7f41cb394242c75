use picoharp_daq::writer::read_records;
use picoharp_daq::{tttr, Conf, Mode, Session, SimulatedLib, Unattended};

mod common;

fn tttr_conf(mode: Mode) -> Conf {
    let mut conf = common::conf();
    conf.tttr.mode = mode;
    conf
}

#[test]
fn every_transferred_record_is_written() {
    let counts = [512, 131072, 0, 7, 1024];
    let lib = SimulatedLib::new().with_fifo_counts(counts).with_ctc_polls(2);
    let out = common::output("tttrmode.out");
    let mut session = Session::new(lib.clone(), tttr_conf(Mode::T2)).unwrap();

    let summary =
        tttr::run(&mut session, &mut Unattended::new(1), common::record_writer(&out)).unwrap();
    let expected: usize = counts.iter().sum();
    assert!(summary.completed);
    assert_eq!(summary.records, expected as u64);

    let metadata = std::fs::metadata(&out.path).unwrap();
    assert_eq!(metadata.len(), 4 * expected as u64);
    let records = read_records(&out.path).unwrap();
    assert_eq!(records.len(), expected);
    assert!(records.windows(2).all(|w| w[1] == w[0] + 1));
}

#[test]
fn t3_mode_is_passed_to_initialize() {
    let lib = SimulatedLib::new().with_fifo_counts([100]);
    let out = common::output("tttrmode.out");
    let mut session = Session::new(lib.clone(), tttr_conf(Mode::T3)).unwrap();
    let summary =
        tttr::run(&mut session, &mut Unattended::new(1), common::record_writer(&out)).unwrap();
    assert_eq!(summary.records, 100);
    assert_eq!(lib.count("PH_Initialize"), 1);
}

#[test]
fn full_fifo_stops_reading_immediately() {
    let lib = SimulatedLib::new()
        .with_fifo_counts([512, 512, 512])
        .with_flags([0, 0x0003]);
    let out = common::output("tttrmode.out");
    let mut session = Session::new(lib.clone(), tttr_conf(Mode::T2)).unwrap();

    let summary =
        tttr::run(&mut session, &mut Unattended::new(1), common::record_writer(&out)).unwrap();
    assert!(summary.fifo_overrun);
    assert!(!summary.completed);
    assert_eq!(summary.records, 512);
    assert_eq!(lib.count("PH_ReadFiFo"), 1);

    let names = lib.call_names();
    let last_flags = names.iter().rposition(|&n| n == "PH_GetFlags").unwrap();
    assert_eq!(names[last_flags + 1], "PH_StopMeas");
    assert_eq!(read_records(&out.path).unwrap().len(), 512);
}

#[test]
fn either_fifo_full_bit_counts_as_overrun() {
    for bits in [0x0001, 0x0002] {
        let lib = SimulatedLib::new().with_flags([bits]);
        let out = common::output("tttrmode.out");
        let mut session = Session::new(lib.clone(), tttr_conf(Mode::T2)).unwrap();
        let summary =
            tttr::run(&mut session, &mut Unattended::new(1), common::record_writer(&out))
                .unwrap();
        assert!(summary.fifo_overrun, "flags {:#06x}", bits);
        assert_eq!(lib.count("PH_ReadFiFo"), 0);
    }
}

#[test]
fn overflow_bit_alone_does_not_end_tttr() {
    let lib = SimulatedLib::new()
        .with_fifo_counts([10])
        .with_flags([0x0040]);
    let out = common::output("tttrmode.out");
    let mut session = Session::new(lib, tttr_conf(Mode::T2)).unwrap();
    let summary =
        tttr::run(&mut session, &mut Unattended::new(1), common::record_writer(&out)).unwrap();
    assert!(!summary.fifo_overrun);
    assert_eq!(summary.records, 10);
}
