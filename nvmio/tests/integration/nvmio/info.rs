// vim: tw=80
use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::Builder;

use super::super::*;

#[test]
fn ramdisk() {
    nvmio()
        .args(["info", "ram:1MB"])
        .assert()
        .success()
        .stdout(predicate::str::contains("backend: ramdisk"))
        .stdout(predicate::str::contains("tbytes: 1048576"));
}

/// Options from a config file are frozen into the device's options
#[test]
fn config() {
    let tempdir = Builder::new()
        .prefix(concat!(module_path!(), "."))
        .tempdir()
        .unwrap();
    let path = tempdir.path().join("opts.yaml");
    std::fs::write(&path, "async: nil\n").unwrap();
    nvmio()
        .arg("--config")
        .arg(&path)
        .args(["info", "ram:1MB"])
        .assert()
        .success()
        .stdout(predicate::str::contains("async: nil"));
}

#[test]
fn no_backend() {
    nvmio()
        .args(["info", "ram:1MB?be=posix"])
        .assert()
        .failure()
        .code(6)    // ENXIO
        .stderr(predicate::str::starts_with("Error:"));
}

#[test]
fn missing_file() {
    let tempdir = Builder::new()
        .prefix(concat!(module_path!(), "."))
        .tempdir()
        .unwrap();
    let path = tempdir.path().join("nope");
    nvmio()
        .args(["--be", "posix", "info"])
        .arg(&path)
        .assert()
        .failure()
        .code(2);
}
