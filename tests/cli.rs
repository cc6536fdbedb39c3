//! Binary smoke tests.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn version_prints_the_crate_version() {
    Command::cargo_bin("uget")
        .unwrap()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    Command::cargo_bin("uget")
        .unwrap()
        .arg("frobnicate")
        .assert()
        .failure()
        .code(2);
}

#[test]
fn get_with_garbage_inline_url_is_a_usage_error() {
    Command::cargo_bin("uget")
        .unwrap()
        .args(["get", "-i", "not a url"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn help_lists_the_pipeline_commands() {
    Command::cargo_bin("uget")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("get")
                .and(predicate::str::contains("meta"))
                .and(predicate::str::contains("accounts"))
                .and(predicate::str::contains("server")),
        );
}
