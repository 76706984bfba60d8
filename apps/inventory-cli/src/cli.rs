use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use inventory_io::{scan_sheet_names_async, WorkbookFile};
use inventory_model::{CellValue, Device, DeviceStatus};
use inventory_storage::PersistenceLocation;
use inventory_store::{DeviceStore, StoreConfig, StoreEvent};

const DATABASE_FILE: &str = "inventory.sqlite3";
const CONFIG_FILE: &str = "config.json";

#[derive(Parser)]
#[command(name = "inventory")]
#[command(about = "Import IT-asset inventory workbooks and manage the local device store.")]
pub struct Args {
    /// Directory holding the device database and optional `config.json`.
    ///
    /// Defaults to the platform data directory.
    #[arg(long, env = "INVENTORY_DATA_DIR", global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the worksheet names of a workbook without importing it.
    Scan { file: PathBuf },
    /// Import one or more workbooks as devices.
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Only materialize these sheets (comma separated, matched after normalization).
        #[arg(long, value_delimiter = ',')]
        sheets: Option<Vec<String>>,
    },
    /// List stored devices.
    List,
    /// Show one device.
    Show {
        id: String,
        /// Print the stored JSON document instead of a summary.
        #[arg(long)]
        json: bool,
    },
    /// Export a device to an `.xlsx` workbook.
    Export {
        id: String,
        #[arg(long, default_value = ".", value_name = "DIR")]
        out: PathBuf,
    },
    /// Remove a device.
    Remove { id: String },
    /// Add a tag to a device.
    Tag { id: String, tag: String },
    /// Remove a tag from a device.
    Untag { id: String, tag: String },
    /// Set a device's status (active, broken or inactive).
    Status { id: String, status: DeviceStatus },
    /// Replace one cell. Numbers and `true`/`false` are stored typed, anything else as text.
    SetCell {
        id: String,
        sheet: String,
        row: usize,
        column: String,
        value: String,
    },
    /// Set the sheets shown for a device, or clear the override with `--clear`.
    Visible {
        id: String,
        #[arg(required_unless_present = "clear")]
        sheets: Vec<String>,
        #[arg(long, conflicts_with = "sheets")]
        clear: bool,
    },
    /// Summary counters over all devices.
    Stats,
}

fn data_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    let dirs = ProjectDirs::from("", "", "inventory")
        .context("could not determine a data directory; pass --data-dir")?;
    Ok(dirs.data_dir().to_path_buf())
}

async fn open_store(dir: &Path) -> Result<DeviceStore> {
    let config_path = dir.join(CONFIG_FILE);
    let config = if config_path.exists() {
        StoreConfig::from_json_file(&config_path)?
    } else {
        StoreConfig::default()
    };
    let location = PersistenceLocation::Sqlite(dir.join(DATABASE_FILE));
    let store = DeviceStore::open(&location, config)
        .await
        .with_context(|| format!("failed to open device store in {}", dir.display()))?;
    store.subscribe(|event| {
        if let StoreEvent::PersistenceWarning(message) = event {
            log::warn!("{message}");
        }
    });
    Ok(store)
}

pub async fn run(args: Args) -> Result<()> {
    if let Command::Scan { file } = args.command {
        return scan(&file).await;
    }

    let dir = data_dir(args.data_dir)?;
    let store = open_store(&dir).await?;
    let outcome = execute(&store, args.command).await;
    store
        .shutdown()
        .await
        .context("failed to save the device store")?;
    outcome
}

async fn scan(path: &Path) -> Result<()> {
    let file = WorkbookFile::from_path(path)?;
    for name in scan_sheet_names_async(file).await? {
        println!("{name}");
    }
    Ok(())
}

fn require(store: &DeviceStore, id: &str) -> Result<Arc<Device>> {
    store
        .device(id)
        .with_context(|| format!("no device with id {id}"))
}

fn report(changed: bool, what: &str) {
    if changed {
        println!("{what}");
    } else {
        println!("unchanged");
    }
}

async fn execute(store: &DeviceStore, command: Command) -> Result<()> {
    match command {
        Command::Scan { file } => scan(&file).await,
        Command::Import { files, sheets } => import(store, files, sheets).await,
        Command::List => {
            for device in store.devices() {
                println!(
                    "{}\t{}\t{}\t{} sheets\t{} rows\t{}",
                    device.id,
                    device.name(),
                    device.status,
                    device.sheets.len(),
                    device.sheets.total_rows(),
                    device.metadata.tags.join(",")
                );
            }
            Ok(())
        }
        Command::Show { id, json } => {
            let device = require(store, &id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&*device)?);
            } else {
                show(&device, &store.default_visible_sheets());
            }
            Ok(())
        }
        Command::Export { id, out } => {
            let exported = store.export_device_by_id(&id).await?;
            let path = exported.write_to_dir(&out)?;
            println!("{}", path.display());
            Ok(())
        }
        Command::Remove { id } => {
            let removed = store.remove_device(&id)?;
            println!("removed {} ({})", removed.name(), removed.id);
            Ok(())
        }
        Command::Tag { id, tag } => {
            require(store, &id)?;
            report(store.add_tag(&id, &tag), "tagged");
            Ok(())
        }
        Command::Untag { id, tag } => {
            require(store, &id)?;
            report(store.remove_tag(&id, &tag), "untagged");
            Ok(())
        }
        Command::Status { id, status } => {
            require(store, &id)?;
            report(store.set_status(&id, status), "status updated");
            Ok(())
        }
        Command::SetCell {
            id,
            sheet,
            row,
            column,
            value,
        } => {
            let device = require(store, &id)?;
            let sheet_key = inventory_model::normalize_sheet_name(&sheet);
            let rows = device
                .sheets
                .get(&sheet_key)
                .with_context(|| format!("device {id} has no sheet {sheet:?}"))?;
            if row >= rows.len() {
                bail!("sheet {sheet:?} has {} rows; row {row} is out of range", rows.len());
            }
            report(
                store.update_sheet_cell(&id, &sheet, row, &column, parse_cell_value(&value)),
                "cell updated",
            );
            Ok(())
        }
        Command::Visible { id, sheets, clear } => {
            require(store, &id)?;
            let changed = if clear {
                store.clear_device_visible_sheets(&id)
            } else {
                store.update_device_visible_sheets(&id, sheets)
            };
            report(changed, "visible sheets updated");
            Ok(())
        }
        Command::Stats => {
            let stats = store.stats();
            println!("devices: {}", stats.total_devices);
            println!("sheets:  {}", stats.total_sheets);
            println!("rows:    {}", stats.total_rows);
            for status in DeviceStatus::ALL {
                println!("{status}: {}", stats.count(status));
            }
            if let Some(latest) = stats.latest_import {
                println!(
                    "latest import: {} ({}) at {}",
                    latest.name,
                    latest.device_id,
                    latest.imported_at.to_rfc3339()
                );
            }
            Ok(())
        }
    }
}

async fn import(
    store: &DeviceStore,
    paths: Vec<PathBuf>,
    sheets: Option<Vec<String>>,
) -> Result<()> {
    let mut files = Vec::with_capacity(paths.len());
    let mut unreadable = 0;
    for path in &paths {
        match WorkbookFile::from_path(path) {
            Ok(file) => files.push(file),
            Err(err) => {
                eprintln!("skipped: {err}");
                unreadable += 1;
            }
        }
    }

    let summary = store.add_multiple_devices(files, sheets).await;
    for id in &summary.device_ids {
        if let Some(device) = store.device(id) {
            println!("imported {} ({})", device.name(), device.id);
        }
    }
    for failure in &summary.failures {
        eprintln!("failed: {}: {}", failure.file_name, failure.message);
    }
    let failed = summary.fail_count + unreadable;
    println!("{} imported, {} failed", summary.success_count, failed);
    if summary.success_count == 0 {
        bail!("no workbook could be imported");
    }
    Ok(())
}

fn show(device: &Device, default_visible: &[String]) {
    let info = &device.device_info;
    println!("id:           {}", device.id);
    println!("name:         {}", info.name);
    println!("status:       {}", device.status);
    println!("os:           {}", info.os);
    println!("cpu:          {}", info.cpu);
    println!("ram:          {}", info.ram);
    println!("architecture: {}", info.architecture);
    println!("ip:           {}", info.ip);
    println!("mac:          {}", info.mac);
    println!("last update:  {}", info.last_update);
    println!("file:         {} ({})", device.file_name, device.metadata.file_size);
    println!("imported at:  {}", device.metadata.imported_at.to_rfc3339());
    println!("tags:         {}", device.metadata.tags.join(", "));
    let visible = device.effective_visible_sheets(default_visible);
    for (name, rows) in device.sheets.iter() {
        let marker = if visible.iter().any(|v| v == name) { "*" } else { " " };
        println!("{marker} {name}: {} rows", rows.len());
    }
}

fn parse_cell_value(raw: &str) -> CellValue {
    match raw {
        "true" => CellValue::Bool(true),
        "false" => CellValue::Bool(false),
        _ => match raw.parse::<f64>() {
            Ok(number) if number.is_finite() => CellValue::Number(number),
            _ => CellValue::from(raw),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_values_are_typed() {
        assert_eq!(parse_cell_value("16"), CellValue::Number(16.0));
        assert_eq!(parse_cell_value("true"), CellValue::Bool(true));
        assert_eq!(parse_cell_value("16 GB"), CellValue::from("16 GB"));
        assert_eq!(parse_cell_value("NaN"), CellValue::from("NaN"));
    }

    #[test]
    fn args_parse() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
