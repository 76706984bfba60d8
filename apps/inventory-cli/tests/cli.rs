use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use rust_xlsxwriter::Workbook;

fn write_workbook(dir: &Path, name: &str) -> PathBuf {
    let mut wb = Workbook::new();
    let config = wb.add_worksheet();
    config.set_name("Cau hinh").unwrap();
    config.write_string(0, 0, "Ten may").unwrap();
    config.write_string(0, 1, "He dieu hanh").unwrap();
    config.write_string(1, 0, name).unwrap();
    config.write_string(1, 1, "Windows 11").unwrap();
    let license = wb.add_worksheet();
    license.set_name("License").unwrap();
    license.write_string(0, 0, "Product").unwrap();
    license.write_string(0, 1, "Seats").unwrap();
    license.write_string(1, 0, "Office").unwrap();
    license.write_number(1, 1, 5).unwrap();

    let path = dir.join(format!("{name}_inventory.xlsx"));
    wb.save(&path).unwrap();
    path
}

fn inventory(data_dir: &Path, args: &[&str]) -> Output {
    Command::new(assert_cmd::cargo::cargo_bin!("inventory"))
        .env("INVENTORY_DATA_DIR", data_dir)
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("run inventory")
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "command failed\nstderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn scan_lists_sheets_without_touching_the_store() {
    let tmp = tempfile::tempdir().unwrap();
    let workbook = write_workbook(tmp.path(), "SRV01");
    let data_dir = tmp.path().join("data");

    let out = stdout(&inventory(&data_dir, &["scan", workbook.to_str().unwrap()]));
    assert_eq!(out.lines().collect::<Vec<_>>(), vec!["cau_hinh", "license"]);
    assert!(!data_dir.join("inventory.sqlite3").exists());
}

#[test]
fn imported_devices_persist_between_runs() {
    let tmp = tempfile::tempdir().unwrap();
    let data_dir = tmp.path().join("data");
    let srv = write_workbook(tmp.path(), "SRV01");
    let pc = write_workbook(tmp.path(), "PC02");

    let out = stdout(&inventory(
        &data_dir,
        &["import", srv.to_str().unwrap(), pc.to_str().unwrap()],
    ));
    assert!(out.contains("2 imported, 0 failed"), "{out}");

    let listing = stdout(&inventory(&data_dir, &["list"]));
    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("SRV01"));
    let id = lines[0].split('\t').next().unwrap().to_string();

    stdout(&inventory(&data_dir, &["tag", &id, "rack-3"]));
    stdout(&inventory(&data_dir, &["status", &id, "broken"]));
    stdout(&inventory(&data_dir, &["set-cell", &id, "License", "0", "Seats", "12"]));

    let json = stdout(&inventory(&data_dir, &["show", &id, "--json"]));
    let device: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(device["status"], "broken");
    assert_eq!(device["metadata"]["tags"][0], "rack-3");
    assert_eq!(device["sheets"]["license"][0]["Seats"], 12.0);
    assert_eq!(device["deviceInfo"]["os"], "Windows 11");

    let stats = stdout(&inventory(&data_dir, &["stats"]));
    assert!(stats.contains("devices: 2"), "{stats}");
    assert!(stats.contains("broken: 1"), "{stats}");
}

#[test]
fn import_with_sheet_selection() {
    let tmp = tempfile::tempdir().unwrap();
    let data_dir = tmp.path().join("data");
    let srv = write_workbook(tmp.path(), "SRV01");

    stdout(&inventory(
        &data_dir,
        &["import", srv.to_str().unwrap(), "--sheets", "license"],
    ));
    let listing = stdout(&inventory(&data_dir, &["list"]));
    assert!(listing.contains("1 sheets"), "{listing}");
}

#[test]
fn export_writes_a_workbook() {
    let tmp = tempfile::tempdir().unwrap();
    let data_dir = tmp.path().join("data");
    let out_dir = tmp.path().join("out");
    std::fs::create_dir_all(&out_dir).unwrap();
    let srv = write_workbook(tmp.path(), "SRV01");

    stdout(&inventory(&data_dir, &["import", srv.to_str().unwrap()]));
    let listing = stdout(&inventory(&data_dir, &["list"]));
    let id = listing.split('\t').next().unwrap().to_string();

    let printed = stdout(&inventory(
        &data_dir,
        &["export", &id, "--out", out_dir.to_str().unwrap()],
    ));
    let path = PathBuf::from(printed.trim());
    assert!(path.starts_with(&out_dir));
    assert!(path.file_name().unwrap().to_str().unwrap().starts_with("SRV01_"));
    assert!(std::fs::metadata(&path).unwrap().len() > 0);
}

#[test]
fn unknown_device_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let output = inventory(tmp.path(), &["tag", "device_missing", "x"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no device with id device_missing"), "{stderr}");
}

#[test]
fn corrupt_workbook_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let bad = tmp.path().join("broken.xlsx");
    std::fs::write(&bad, b"not a workbook").unwrap();

    let output = inventory(&tmp.path().join("data"), &["import", bad.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed: broken.xlsx"), "{stderr}");
}
