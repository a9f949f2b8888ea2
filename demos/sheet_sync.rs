//! CLI Tool Example
//!
//! This example shows a small command-line front end for sheetsync. Records
//! are kept in a JSON file; `import` refreshes them from a spreadsheet and
//! `export` writes them back.

use sheetsync::{Record, ReconcileError, ReconcileReport, ReconcilerBuilder};
use std::fs;
use std::process;

fn usage(program: &str) -> ! {
    eprintln!(
        "Usage: {} <import|export> <sheet.ods|sheet.xlsx> <records.json> [options]",
        program
    );
    eprintln!("\nOptions:");
    eprintln!("  --sheet-name <name>  Worksheet to reconcile (default: Techniques)");
    eprintln!("  --output <path>      Export destination (default: overwrite the input)");
    eprintln!("\nExamples:");
    eprintln!("  {} import evaluation.ods records.json", program);
    eprintln!(
        "  {} export evaluation.xlsx records.json --output upgraded.xlsx",
        program
    );
    process::exit(1);
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        usage(&args[0]);
    }

    let command = args[1].as_str();
    let sheet_path = &args[2];
    let records_path = &args[3];

    // Parse options
    let mut sheet_name = None;
    let mut output = None;
    let mut i = 4;
    while i < args.len() {
        match args[i].as_str() {
            "--sheet-name" | "--output" if i + 1 >= args.len() => {
                eprintln!("Error: {} requires a value", args[i]);
                process::exit(1);
            }
            "--sheet-name" => {
                sheet_name = Some(args[i + 1].clone());
                i += 2;
            }
            "--output" => {
                output = Some(args[i + 1].clone());
                i += 2;
            }
            _ => {
                eprintln!("Error: Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
    }

    let result = match command {
        "import" => run_import(sheet_path, records_path, sheet_name),
        "export" => run_export(
            sheet_path,
            output.as_deref().unwrap_or(sheet_path),
            records_path,
            sheet_name,
        ),
        _ => usage(&args[0]),
    };

    match result {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error: {}", e),
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            if let Some(err) = e.downcast_ref::<ReconcileError>() {
                handle_error(err);
            }
            process::exit(1);
        }
    }
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn builder(sheet_name: Option<String>) -> ReconcilerBuilder {
    match sheet_name {
        Some(name) => ReconcilerBuilder::new().with_sheet_name(name),
        None => ReconcilerBuilder::new(),
    }
}

fn load_records(path: &str) -> CliResult<Vec<Record>> {
    let json = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

fn run_import(
    sheet_path: &str,
    records_path: &str,
    sheet_name: Option<String>,
) -> CliResult<ReconcileReport> {
    let reconciler = builder(sheet_name).build()?;
    let mut records = load_records(records_path)?;
    let report = reconciler.import_file(sheet_path, &mut records)?;
    fs::write(records_path, serde_json::to_string_pretty(&records)?)?;
    Ok(report)
}

fn run_export(
    sheet_path: &str,
    dest: &str,
    records_path: &str,
    sheet_name: Option<String>,
) -> CliResult<ReconcileReport> {
    let reconciler = builder(sheet_name).build()?;
    let records = load_records(records_path)?;
    let report = reconciler.export_file(sheet_path, dest, &records)?;
    eprintln!("Export completed: {} -> {}", sheet_path, dest);
    Ok(report)
}

fn handle_error(error: &ReconcileError) {
    match error {
        ReconcileError::SheetNotFound { sheet } => {
            eprintln!("Hint: check the worksheet name, or pass --sheet-name (tried \"{}\")", sheet);
        }
        ReconcileError::UnsupportedFileType(_) => {
            eprintln!("Hint: only .ods, .xlsx and .xlsm files are supported");
        }
        ReconcileError::SecurityViolation(_) => {
            eprintln!("Hint: the file was rejected by the archive safety limits");
        }
        _ => {}
    }
}
