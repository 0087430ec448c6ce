use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn gpu_timers() -> Command {
    Command::cargo_bin("gpu-timers").expect("binary exists")
}

fn scene_file(contents: &str) -> NamedTempFile {
    let mut tmp = NamedTempFile::new().expect("temp scene");
    tmp.write_all(contents.as_bytes()).expect("write scene");
    tmp
}

#[test]
fn summary_prints_instructions_and_default_layout() {
    gpu_timers()
        .arg("--summary-only")
        .assert()
        .success()
        .stdout(contains(
            "Use WASD to move, and the mouse to look around.\nPress escape or alt-f4 to exit.\n",
        ))
        .stdout(contains("Scene with 3 instances (2 meshes, 4 textures)"))
        .stdout(contains(" - ground mesh=plane pos=(0.00, 0.00, -10.00)"))
        .stdout(contains(" - car mesh=car pos=(0.00, -1.00, -10.00)"))
        .stdout(contains(" - car-2 mesh=car pos=(5.00, -1.00, -10.00)"))
        .stdout(contains("Window 1366x768, split 45%/55%"))
        .stdout(contains("Left eye: x=0 y=0 w=614 h=768"))
        .stdout(contains("Right eye: x=751 y=0 w=614 h=768"))
        .stdout(contains("First Eye:").not());
}

#[test]
fn half_split_and_window_size_flags() {
    gpu_timers()
        .args(["--split", "half", "--width", "800", "--height", "600", "--summary-only"])
        .assert()
        .success()
        .stdout(contains("Window 800x600, split 50%/50%"))
        .stdout(contains("Left eye: x=0 y=0 w=400 h=600"))
        .stdout(contains("Right eye: x=400 y=0 w=400 h=600"));
}

#[test]
fn scene_file_replaces_instances_and_stereo_settings() {
    let scene = scene_file(
        r#"<scene>
    <stereo>
        <split>half</split>
        <width>1000</width>
    </stereo>
    <mesh><name>wall</name><source>builtin:plane</source></mesh>
    <texture><name>bricks</name><source>builtin:brick</source></texture>
    <texture><name>bumps</name><source>builtin:brick-normal</source><kind>normal</kind></texture>
    <instance>
        <name>backdrop</name>
        <mesh>wall</mesh>
        <color>bricks</color>
        <normal>bumps</normal>
        <position>1 2 -3</position>
    </instance>
</scene>
"#,
    );
    gpu_timers()
        .arg("--scene")
        .arg(scene.path())
        .arg("--summary-only")
        .assert()
        .success()
        .stdout(contains("Scene with 1 instances (1 meshes, 2 textures)"))
        .stdout(contains(" - backdrop mesh=wall pos=(1.00, 2.00, -3.00)"))
        .stdout(contains("Window 1000x768, split 50%/50%"))
        .stdout(contains("Right eye: x=500 y=0 w=500 h=768"));
}

#[test]
fn command_line_overrides_scene_settings() {
    let scene = scene_file(
        r#"<scene>
    <stereo><split>half</split></stereo>
    <mesh><name>wall</name><source>builtin:plane</source></mesh>
    <texture><name>bricks</name><source>builtin:brick</source></texture>
    <instance><name>w</name><mesh>wall</mesh><color>bricks</color><normal>bricks</normal></instance>
</scene>
"#,
    );
    gpu_timers()
        .arg("--scene")
        .arg(scene.path())
        .args(["--split", "iphone6", "--summary-only"])
        .assert()
        .success()
        .stdout(contains("Right eye: x=751 y=0 w=614 h=768"));
}

#[test]
fn unknown_argument_fails() {
    gpu_timers()
        .arg("--fullscreen")
        .assert()
        .failure()
        .code(1)
        .stderr(contains("Unknown argument: --fullscreen"));
}

#[test]
fn unknown_split_preset_fails() {
    gpu_timers()
        .args(["--split", "triple", "--summary-only"])
        .assert()
        .failure()
        .stderr(contains("unknown split preset `triple`"));
}

#[test]
fn overlapping_split_in_scene_fails() {
    let scene = scene_file(
        r#"<scene>
    <stereo><eye-width>60</eye-width><second-eye-start>50</second-eye-start></stereo>
    <mesh><name>wall</name><source>builtin:plane</source></mesh>
    <texture><name>bricks</name><source>builtin:brick</source></texture>
    <instance><name>w</name><mesh>wall</mesh><color>bricks</color><normal>bricks</normal></instance>
</scene>
"#,
    );
    gpu_timers()
        .arg("--scene")
        .arg(scene.path())
        .arg("--summary-only")
        .assert()
        .failure()
        .stderr(contains("overlaps or overflows"));
}

#[test]
fn non_numeric_offset_step_in_scene_fails() {
    let scene = scene_file(
        r#"<scene>
    <stereo><offset-step>NaN</offset-step></stereo>
    <mesh><name>wall</name><source>builtin:plane</source></mesh>
    <texture><name>bricks</name><source>builtin:brick</source></texture>
    <instance><name>w</name><mesh>wall</mesh><color>bricks</color><normal>bricks</normal></instance>
</scene>
"#,
    );
    gpu_timers()
        .arg("--scene")
        .arg(scene.path())
        .arg("--summary-only")
        .assert()
        .failure()
        .code(1)
        .stderr(contains("offset step must be a positive number, got NaN"));
}

#[test]
fn missing_scene_file_fails() {
    gpu_timers()
        .args(["--scene", "does-not-exist.xml", "--summary-only"])
        .assert()
        .failure()
        .stderr(contains("unable to read scene does-not-exist.xml"));
}
