use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn write_scene() -> NamedTempFile {
    let scene = r#"<scene>
  <settings>
    <width>96</width>
    <height>64</height>
    <shadow_map_size>128</shadow_map_size>
  </settings>
  <object>
    <name>Sun</name>
    <type>light</type>
    <position>0 10 0</position>
    <target>0 0 0</target>
    <extent>6</extent>
  </object>
  <object>
    <name>Floor</name>
    <type>plane</type>
    <size>10 0 10</size>
    <color>128 128 128</color>
  </object>
  <object>
    <name>Box</name>
    <type>cube</type>
    <position>0 1.5 0</position>
    <size>2 2 2</size>
    <color>255 51 51</color>
  </object>
</scene>
"#;
    let mut tmp = NamedTempFile::new().expect("temp scene");
    tmp.write_all(scene.as_bytes()).expect("write scene");
    tmp
}

#[test]
fn cli_renders_demo_scene_by_default() {
    let mut cmd = Command::cargo_bin("shadow-pipeline").expect("binary exists");
    cmd.args(["--width", "80", "--height", "60"]);
    cmd.assert()
        .success()
        .stdout(contains("Loaded scene with 6 objects (1 lights)"))
        .stdout(contains(" - RedCube (Cube)"))
        .stdout(contains("Main pass:"))
        .stdout(contains("Rendered 1 frame(s) at 80x60"));
}

#[test]
fn cli_loads_scene_file_and_reports_shadowed_fragments() {
    let scene = write_scene();
    let mut cmd = Command::cargo_bin("shadow-pipeline").expect("binary exists");
    cmd.arg(scene.path()).args(["--frames", "2"]);
    cmd.assert()
        .success()
        .stdout(contains("Loaded scene with 3 objects (1 lights)"))
        .stdout(contains(" - Box (Cube)"))
        .stdout(contains("Rendered 2 frame(s) at 96x64"))
        .stdout(contains(" - Floor:"))
        .stdout(contains(" 0 shadowed").not());
}

#[test]
fn cli_writes_png_output() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output = dir.path().join("frame.png");
    let mut cmd = Command::cargo_bin("shadow-pipeline").expect("binary exists");
    cmd.args(["--width", "32", "--height", "24", "--output"])
        .arg(&output);
    cmd.assert().success().stdout(contains("Wrote"));

    let bytes = std::fs::read(&output).expect("png written");
    assert_eq!(&bytes[1..4], b"PNG");
}

#[test]
fn cli_rejects_unknown_flags() {
    let mut cmd = Command::cargo_bin("shadow-pipeline").expect("binary exists");
    cmd.arg("--bogus");
    cmd.assert()
        .failure()
        .stderr(contains("Unknown argument: --bogus"))
        .stderr(contains("Usage: shadow-pipeline"));
}

#[test]
fn cli_reports_missing_scene_file() {
    let mut cmd = Command::cargo_bin("shadow-pipeline").expect("binary exists");
    cmd.arg("does-not-exist.xml");
    cmd.assert()
        .failure()
        .stderr(contains("unable to read scene"));
}
