//! CLI tests for `sidecheck scan`, `filter` and `init`.
//!
//! Spawns the binary against a synthesized classpath and checks exit codes
//! and printed verdicts.

use std::path::Path;
use std::process::{Command, Output};

use sidecheck::core::side::Side;
use sidecheck::exit_codes;
use sidecheck::io::config::{CONFIG_FILE, load_config};
use sidecheck::test_support::{AnnotationSpec, CLIENT_ONLY, ClassFileBuilder, TempClasspath, only_in};

fn classpath() -> TempClasspath {
    let cp = TempClasspath::new().expect("temp classpath");
    cp.write_class(
        "ext.ClientExt",
        &ClassFileBuilder::new("ext/ClientExt")
            .annotation(AnnotationSpec::new(CLIENT_ONLY))
            .build(),
    )
    .expect("write client class");
    cp.write_class(
        "ext.ServerExt",
        &ClassFileBuilder::new("ext/ServerExt")
            .annotation(only_in("DEDICATED_SERVER"))
            .build(),
    )
    .expect("write server class");
    cp.write_class("ext.Common", &ClassFileBuilder::new("ext/Common").build())
        .expect("write common class");
    cp
}

fn sidecheck(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sidecheck"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("run sidecheck")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn scan_permitted_types_exit_ok() {
    let cp = classpath();
    let classes = cp.classes_dir();
    let output = sidecheck(
        cp.path(),
        &[
            "scan",
            "--side",
            "worker",
            "-c",
            classes.to_str().expect("utf8 path"),
            "ext.ServerExt",
            "ext.Common",
        ],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let text = stdout(&output);
    assert!(text.contains("ext.ServerExt: permitted (worker only)"), "{text}");
    assert!(text.contains("ext.Common: permitted"), "{text}");
}

#[test]
fn scan_excluded_type_exits_excluded() {
    let cp = classpath();
    let classes = cp.classes_dir();
    let output = sidecheck(
        cp.path(),
        &[
            "scan",
            "--side",
            "server",
            "-c",
            classes.to_str().expect("utf8 path"),
            "ext.ClientExt",
            "ext.Missing",
        ],
    );
    assert_eq!(output.status.code(), Some(exit_codes::EXCLUDED));
    let text = stdout(&output);
    assert!(text.contains("ext.ClientExt: excluded (controller only)"), "{text}");
    assert!(text.contains("ext.Missing: excluded (not found)"), "{text}");
}

#[test]
fn scan_logs_unreadable_classes_but_not_missing_ones() {
    let cp = classpath();
    cp.write_class("ext.Broken", &[0xCA, 0xFE, 0xBA, 0xBE, 0x00])
        .expect("write broken class");
    let classes = cp.classes_dir();
    let classes = classes.to_str().expect("utf8 path");

    let broken = sidecheck(
        cp.path(),
        &["scan", "--side", "worker", "-c", classes, "ext.Broken"],
    );
    assert_eq!(broken.status.code(), Some(exit_codes::EXCLUDED));
    let stderr = String::from_utf8_lossy(&broken.stderr);
    assert!(stderr.contains("ERROR"), "{stderr}");
    assert!(stderr.contains("failed to read side markers"), "{stderr}");
    assert!(stderr.contains("ext.Broken"), "{stderr}");

    let missing = sidecheck(
        cp.path(),
        &["scan", "--side", "worker", "-c", classes, "ext.Missing"],
    );
    assert_eq!(missing.status.code(), Some(exit_codes::EXCLUDED));
    assert!(
        missing.stderr.is_empty(),
        "{}",
        String::from_utf8_lossy(&missing.stderr)
    );
}

#[test]
fn scan_json_reports_markers() {
    let cp = classpath();
    let classes = cp.classes_dir();
    let output = sidecheck(
        cp.path(),
        &[
            "scan",
            "--json",
            "--side",
            "controller",
            "-c",
            classes.to_str().expect("utf8 path"),
            "ext.ServerExt",
        ],
    );
    assert_eq!(output.status.code(), Some(exit_codes::EXCLUDED));
    let reports: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    let report = &reports[0];
    assert_eq!(report["type_name"], "ext.ServerExt");
    assert_eq!(report["side"], "controller");
    assert_eq!(report["permitted"], false);
    assert_eq!(report["restricted_to"], "worker");
}

#[test]
fn scan_without_side_is_invalid() {
    let cp = classpath();
    let output = sidecheck(cp.path(), &["scan", "ext.Common"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no side given"));
}

#[test]
fn filter_prints_blanked_list() {
    let cp = classpath();
    let classes = cp.classes_dir();
    let output = sidecheck(
        cp.path(),
        &[
            "filter",
            "--side",
            "worker",
            "-c",
            classes.to_str().expect("utf8 path"),
            "ext.ClientExt,  ext.Common ,,ext.Gone",
        ],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&output).trim_end(), ",ext.Common,,");
}

#[test]
fn init_then_filter_uses_config() {
    let cp = classpath();
    let output = sidecheck(
        cp.path(),
        &["init", "--side", "controller", "-c", "classes"],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let cfg = load_config(&cp.path().join(CONFIG_FILE)).expect("load config");
    assert_eq!(cfg.side, Some(Side::Controller));
    assert_eq!(cfg.classpath, vec![cp.classes_dir()]);

    let output = sidecheck(cp.path(), &["filter", "ext.ClientExt;ext.ServerExt"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&output).trim_end(), "ext.ClientExt,");
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let cp = classpath();
    let first = sidecheck(cp.path(), &["init", "--side", "worker"]);
    assert_eq!(first.status.code(), Some(exit_codes::OK));

    let second = sidecheck(cp.path(), &["init", "--side", "controller"]);
    assert_eq!(second.status.code(), Some(exit_codes::INVALID));

    let forced = sidecheck(cp.path(), &["init", "--force", "--side", "controller"]);
    assert_eq!(forced.status.code(), Some(exit_codes::OK));
    let cfg = load_config(&cp.path().join(CONFIG_FILE)).expect("load config");
    assert_eq!(cfg.side, Some(Side::Controller));
}
