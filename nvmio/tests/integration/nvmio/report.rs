// vim: tw=80
use assert_cmd::prelude::*;

use super::super::*;

/// A ramdisk has no zones to report
#[test]
fn not_zoned() {
    nvmio()
        .args(["report", "ram:1MB"])
        .assert()
        .failure()
        .code(22);
}
