use picoharp_daq::{Conf, Error, Mode};

#[test]
fn file_values_override_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("picoharp.toml");
    std::fs::write(
        &path,
        r#"
[acquisition]
binning = 2
sync_divider = 4

[inputs]
cfd_level1 = 55

[histogram]
cycles = 3

[tttr]
mode = "T3"
block_size = 4096

[routing]
phr800_level = -400
"#,
    )
    .unwrap();

    let conf = Conf::load(Some(path.as_path())).unwrap();
    assert_eq!(conf.acquisition.binning, 2);
    assert_eq!(conf.acquisition.sync_divider, 4);
    assert_eq!(conf.acquisition.offset, 0);
    assert_eq!(conf.inputs.cfd_level1, 55);
    assert_eq!(conf.inputs.cfd_level0, 100);
    assert_eq!(conf.histogram.cycles, Some(3));
    assert_eq!(conf.tttr.mode, Mode::T3);
    assert_eq!(conf.tttr.block_size, 4096);
    assert_eq!(conf.routing.phr800_level, -400);
    conf.validate().unwrap();
}

#[test]
fn missing_file_means_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let conf = Conf::load(Some(dir.path().join("absent.toml").as_path())).unwrap();
    assert_eq!(conf.acquisition.sync_divider, 8);
    assert_eq!(conf.histogram.output, "dlldemo.out");
}

#[test]
fn unknown_mode_is_rejected_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("picoharp.toml");
    std::fs::write(&path, "[tttr]\nmode = \"T4\"\n").unwrap();
    assert!(Conf::load(Some(path.as_path())).is_err());
}

#[test]
fn zero_unattended_cycles_fail_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("picoharp.toml");
    std::fs::write(&path, "[histogram]\ncycles = 0\n").unwrap();
    let conf = Conf::load(Some(path.as_path())).unwrap();
    assert!(matches!(conf.validate(), Err(Error::InvalidConfig(_))));
}

#[test]
fn tttr_section_carries_its_own_timing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("picoharp.toml");
    std::fs::write(
        &path,
        "[acquisition]\nsync_divider = 8\n\n[tttr]\nsync_divider = 2\nacquisition_time = 500\n",
    )
    .unwrap();
    let conf = Conf::load(Some(path.as_path())).unwrap();
    assert_eq!(conf.setup(Mode::Histogram).sync_divider, 8);
    let tttr = conf.setup(Mode::T2);
    assert_eq!(tttr.sync_divider, 2);
    assert_eq!(tttr.acquisition_time, 500);
    assert_eq!(tttr.cfd_level1, 150);
}
