// SPDX-License-Identifier: Apache-2.0

use assert_cmd::Command;
use predicates::prelude::*;

fn campipe() -> Command {
    Command::cargo_bin("campipe").unwrap()
}

#[test]
fn help_lists_the_capture_paths() {
    campipe()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--clipper"))
        .stdout(predicate::str::contains("--decimator"));
}

#[test]
fn input_size_is_required() {
    campipe().assert().failure().code(2);
}

#[test]
fn malformed_input_size_is_rejected() {
    campipe()
        .args(["-i", "1920"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Invalid arguments"));
}

#[test]
fn out_of_bounds_crop_is_rejected() {
    campipe()
        .args(["-i", "640x480", "-c", "600,0,100,100"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("crop"));
}

#[test]
fn yuyv_on_the_decimator_is_rejected() {
    campipe()
        .args(["--decimator", "-i", "640x480", "-f", "yuyv"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("YUYV"));
}

#[test]
fn decimator_upscale_is_rejected() {
    campipe()
        .args(["--decimator", "-i", "640x480", "-s", "1920x1080"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("upscale"));
}

#[test]
fn display_on_a_disabled_path_is_rejected() {
    campipe()
        .args(["--clipper", "-i", "640x480", "-d", "decimator"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn zero_save_frame_is_rejected() {
    campipe()
        .args(["-i", "640x480", "-S", "0"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("1-based"));
}
