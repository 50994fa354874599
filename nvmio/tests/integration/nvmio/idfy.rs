// vim: tw=80
use assert_cmd::prelude::*;
use predicates::prelude::*;

use super::super::*;

#[test]
fn fields() {
    nvmio()
        .args(["idfy", "ram:1MB"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nvmio ramdisk"))
        .stdout(predicate::str::contains("nsze"));
}

#[test]
fn raw() {
    nvmio()
        .args(["idfy", "--raw", "ram:1MB"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Identify Controller:"))
        .stdout(predicate::str::contains("Identify Namespace:"));
}
