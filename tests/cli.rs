mod common;

use common::TestEnv;
use predicates::str::contains;

#[test]
fn missing_subcommand_prints_help_and_fails() {
    let env = TestEnv::new();
    env.cmd()
        .assert()
        .code(1)
        .stderr(contains("Usage"))
        .stderr(contains("train"));
}

#[test]
fn every_command_has_help() {
    let env = TestEnv::new();
    for args in [
        vec!["--help"],
        vec!["init", "--help"],
        vec!["train", "--help"],
        vec!["replay", "--help"],
        vec!["ci", "--help"],
    ] {
        env.cmd().args(&args).assert().success().stdout(contains("Usage"));
    }
}

#[test]
fn unknown_flag_is_a_usage_error() {
    let env = TestEnv::new();
    env.cmd()
        .args(["train", "train.py", "--bogus"])
        .assert()
        .code(2);
}

#[test]
fn train_requires_a_script() {
    let env = TestEnv::new();
    env.cmd().arg("train").assert().failure();
}
