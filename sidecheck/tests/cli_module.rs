//! CLI tests for `sidecheck module` against descriptor files and jars.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use sidecheck::exit_codes;
use sidecheck::hooks::{DESCRIPTOR_PATH, INSTANCE_CLASSES_KEY, MODULE_NAME_KEY, STATIC_CLASSES_KEY};
use sidecheck::io::properties::load_properties;
use sidecheck::test_support::{
    AnnotationSpec, CLIENT_ONLY, ClassFileBuilder, TempClasspath, environment,
};

const DESCRIPTOR: &str = "\
# extension module
moduleName=demo-ext
moduleVersion=2.1
extensionClasses=ext.ClientExt, ext.Common
staticExtensionClasses=ext.ServerStatic
";

fn client_ext() -> Vec<u8> {
    ClassFileBuilder::new("ext/ClientExt")
        .annotation(AnnotationSpec::new(CLIENT_ONLY))
        .build()
}

fn server_static() -> Vec<u8> {
    ClassFileBuilder::new("ext/ServerStatic")
        .invisible_annotation(environment("SERVER"))
        .build()
}

fn common() -> Vec<u8> {
    ClassFileBuilder::new("ext/Common").build()
}

fn sidecheck(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sidecheck"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("run sidecheck")
}

#[test]
fn module_from_jar_lists_surviving_classes() {
    let cp = TempClasspath::new().expect("temp classpath");
    let (client, server, plain) = (client_ext(), server_static(), common());
    let jar = cp
        .write_jar(
            "demo-ext.jar",
            &[
                (DESCRIPTOR_PATH, DESCRIPTOR.as_bytes()),
                ("ext/ClientExt.class", client.as_slice()),
                ("ext/ServerStatic.class", server.as_slice()),
                ("ext/Common.class", plain.as_slice()),
            ],
        )
        .expect("write jar");

    let output = sidecheck(
        cp.path(),
        &["module", "--json", "--side", "worker", jar.to_str().expect("utf8 path")],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let module: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(module["name"], "demo-ext");
    assert_eq!(module["version"], "2.1");
    assert_eq!(module["instance_classes"], serde_json::json!(["ext.Common"]));
    assert_eq!(module["static_classes"], serde_json::json!(["ext.ServerStatic"]));
}

#[test]
fn module_text_output_on_controller() {
    let cp = TempClasspath::new().expect("temp classpath");
    cp.write_class("ext.ClientExt", &client_ext()).expect("write class");
    cp.write_class("ext.ServerStatic", &server_static()).expect("write class");
    cp.write_class("ext.Common", &common()).expect("write class");
    let descriptor = cp.path().join("ExtensionModule");
    fs::write(&descriptor, DESCRIPTOR).expect("write descriptor");
    let classes = cp.classes_dir();

    let output = sidecheck(
        cp.path(),
        &[
            "module",
            "--side",
            "client",
            "-c",
            classes.to_str().expect("utf8 path"),
            descriptor.to_str().expect("utf8 path"),
        ],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("module demo-ext 2.1"), "{text}");
    assert!(text.contains("instance: ext.ClientExt, ext.Common"), "{text}");
    assert!(text.contains("static: (none)"), "{text}");
}

#[test]
fn module_write_rewrites_registration_lists_only() {
    let cp = TempClasspath::new().expect("temp classpath");
    cp.write_class("ext.ClientExt", &client_ext()).expect("write class");
    cp.write_class("ext.Common", &common()).expect("write class");
    let descriptor = cp.path().join("ExtensionModule");
    fs::write(&descriptor, DESCRIPTOR).expect("write descriptor");
    let classes = cp.classes_dir();

    let output = sidecheck(
        cp.path(),
        &[
            "module",
            "--write",
            "--side",
            "worker",
            "-c",
            classes.to_str().expect("utf8 path"),
            descriptor.to_str().expect("utf8 path"),
        ],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let record = load_properties(&descriptor).expect("reload descriptor");
    assert_eq!(record.get(MODULE_NAME_KEY), Some("demo-ext"));
    assert_eq!(record.get(INSTANCE_CLASSES_KEY), Some(",ext.Common"));
    // ServerStatic is not on this classpath
    assert_eq!(record.get(STATIC_CLASSES_KEY), Some(""));
}

#[test]
fn module_write_rejects_archives() {
    let cp = TempClasspath::new().expect("temp classpath");
    let jar = cp
        .write_jar("demo-ext.jar", &[(DESCRIPTOR_PATH, DESCRIPTOR.as_bytes())])
        .expect("write jar");
    let output = sidecheck(
        cp.path(),
        &["module", "--write", "--side", "worker", jar.to_str().expect("utf8 path")],
    );
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn module_jar_without_descriptor_is_invalid() {
    let cp = TempClasspath::new().expect("temp classpath");
    let plain = common();
    let jar = cp
        .write_jar("plain.jar", &[("ext/Common.class", plain.as_slice())])
        .expect("write jar");
    let output = sidecheck(
        cp.path(),
        &["module", "--side", "worker", jar.to_str().expect("utf8 path")],
    );
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains(DESCRIPTOR_PATH));
}
