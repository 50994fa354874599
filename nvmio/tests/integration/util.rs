// vim: tw=80
use std::process::Command;

use assert_cmd::prelude::*;

pub fn nvmio() -> Command {
    Command::cargo_bin("nvmio").unwrap()
}
