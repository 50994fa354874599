// vim: tw=80
use std::fs;

use assert_cmd::prelude::*;
use pretty_assertions::assert_eq;
use rstest::{fixture, rstest};
use tempfile::{Builder, TempDir};

use super::super::*;

struct Harness {
    tempdir: TempDir,
    dev:     String,
}

/// A 64 KiB zero-filled file to use as a device
#[fixture]
fn harness() -> Harness {
    let tempdir = Builder::new()
        .prefix(concat!(module_path!(), "."))
        .tempdir()
        .unwrap();
    let path = tempdir.path().join("dev");
    fs::write(&path, vec![0u8; 1 << 16]).unwrap();
    let dev = path.to_str().unwrap().to_owned();
    Harness { tempdir, dev }
}

#[rstest]
fn roundtrip(harness: Harness) {
    let input = harness.tempdir.path().join("input");
    let output = harness.tempdir.path().join("output");
    let data = (0..1024).map(|i| (i % 251) as u8).collect::<Vec<_>>();
    fs::write(&input, &data).unwrap();

    nvmio()
        .args(["write", &harness.dev, "--slba", "4", "--nlb", "1", "--input"])
        .arg(&input)
        .assert()
        .success();
    nvmio()
        .args(["read", &harness.dev, "--slba", "4", "--nlb", "1", "--output"])
        .arg(&output)
        .assert()
        .success();

    assert_eq!(fs::read(&output).unwrap(), data);
    let contents = fs::read(&harness.dev).unwrap();
    assert_eq!(&contents[4 * 512..6 * 512], &data[..]);
}

/// Short input is padded with zeros
#[rstest]
fn short_input(harness: Harness) {
    let input = harness.tempdir.path().join("input");
    fs::write(&input, b"abc").unwrap();
    fs::write(&harness.dev, vec![0xFFu8; 1 << 16]).unwrap();
    nvmio()
        .args(["write", &harness.dev, "--input"])
        .arg(&input)
        .assert()
        .success();
    let contents = fs::read(&harness.dev).unwrap();
    assert_eq!(&contents[..3], b"abc");
    assert!(contents[3..512].iter().all(|&b| b == 0));
    assert_eq!(contents[512], 0xFF);
}

/// Reads past the end fail in the completion, which exits with EIO
#[test]
fn out_of_range() {
    nvmio()
        .args(["read", "ram:1MB", "--slba", "2047", "--nlb", "1"])
        .assert()
        .failure()
        .code(5);
}

#[rstest]
fn hexdump(harness: Harness) {
    nvmio()
        .args(["read", &harness.dev])
        .assert()
        .success();
}
