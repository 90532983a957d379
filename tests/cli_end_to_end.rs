//! End-to-end tests for the `fundus-norm` binary

#![cfg(feature = "cli")]

mod common;

use common::{disk_photo, uniform_photo, write_photo};
use image::GenericImageView;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn run_cli(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fundus-norm"))
        .args(args)
        .current_dir(cwd)
        .output()
        .expect("Failed to run fundus-norm")
}

fn seed_directory(dir: &Path) {
    write_photo(dir, "img2.png", &disk_photo(320, 240, 160.0, 120.0, 100.0));
    write_photo(dir, "img10.jpg", &disk_photo(400, 300, 100.0, 150.0, 150.0));
    write_photo(dir, "blank.png", &uniform_photo(160, 160, 0));
    std::fs::write(dir.join("notes.txt"), "not an image").unwrap();
}

#[test]
fn test_single_file_with_explicit_output() {
    let temp_dir = TempDir::new().unwrap();
    write_photo(temp_dir.path(), "eye.png", &disk_photo(320, 240, 160.0, 120.0, 100.0));

    let output = run_cli(&["eye.png", "-o", "eye_out.png", "-d", "128"], temp_dir.path());
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let written = image::open(temp_dir.path().join("eye_out.png")).unwrap();
    assert_eq!(written.dimensions(), (128, 128));
}

#[test]
fn test_default_output_name_next_to_input() {
    let temp_dir = TempDir::new().unwrap();
    write_photo(temp_dir.path(), "eye.jpg", &disk_photo(320, 240, 160.0, 120.0, 100.0));

    let output = run_cli(&["eye.jpg"], temp_dir.path());
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let written = image::open(temp_dir.path().join("eye_normalized.jpg")).unwrap();
    assert_eq!(written.dimensions(), (299, 299));
}

#[test]
fn test_directory_batch_with_report() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("raw");
    std::fs::create_dir(&input).unwrap();
    seed_directory(&input);

    let output = run_cli(
        &["raw", "-o", "normalized", "-f", "png", "-j", "2", "--report", "report.json"],
        temp_dir.path(),
    );
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let out_dir = temp_dir.path().join("normalized");
    assert!(out_dir.join("img2.png").is_file());
    assert!(out_dir.join("img10.png").is_file());
    assert!(!out_dir.join("blank.png").exists());

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(temp_dir.path().join("report.json")).unwrap()).unwrap();
    assert_eq!(report["total"], 3);
    assert_eq!(report["normalized"], 2);
    assert_eq!(report["no_fundus"], 1);
    assert_eq!(report["failed"], 0);

    // Items are listed in sorted input order
    let sources: Vec<String> = report["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| {
            Path::new(item["source"].as_str().unwrap())
                .file_name()
                .unwrap()
                .to_string_lossy()
                .to_string()
        })
        .collect();
    assert_eq!(sources, vec!["blank.png", "img10.jpg", "img2.png"]);
}

#[test]
fn test_recursive_batch_keeps_structure() {
    let temp_dir = TempDir::new().unwrap();
    let nested = temp_dir.path().join("raw").join("left");
    std::fs::create_dir_all(&nested).unwrap();
    write_photo(&nested, "eye.png", &disk_photo(320, 240, 160.0, 120.0, 100.0));

    let output = run_cli(&["raw", "-r", "-o", "out"], temp_dir.path());
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(temp_dir.path().join("out").join("left").join("eye.png").is_file());
}

#[test]
fn test_in_place_batch() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_photo(temp_dir.path(), "eye.png", &disk_photo(320, 240, 160.0, 120.0, 100.0));

    let output = run_cli(&["eye.png", "--in-place", "-d", "96"], temp_dir.path());
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(image::open(&path).unwrap().dimensions(), (96, 96));
}

#[test]
fn test_fails_when_nothing_is_normalized() {
    let temp_dir = TempDir::new().unwrap();
    write_photo(temp_dir.path(), "blank.png", &uniform_photo(160, 160, 0));

    let output = run_cli(&["blank.png", "-o", "out.png"], temp_dir.path());
    assert!(!output.status.success());
    assert!(!temp_dir.path().join("out.png").exists());
}

#[test]
fn test_rejects_conflicting_flags() {
    let temp_dir = TempDir::new().unwrap();
    write_photo(temp_dir.path(), "eye.png", &disk_photo(320, 240, 160.0, 120.0, 100.0));

    let output = run_cli(&["eye.png", "--in-place", "-o", "x.png"], temp_dir.path());
    assert!(!output.status.success());

    let output = run_cli(&["eye.png", "-d", "0"], temp_dir.path());
    assert!(!output.status.success());
}

#[test]
fn test_missing_input_fails() {
    let temp_dir = TempDir::new().unwrap();
    let output = run_cli(&["missing.png"], temp_dir.path());
    assert!(!output.status.success());
}
