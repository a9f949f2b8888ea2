//! sheetsync - Spreadsheet reconciliation for taxonomy upgrade tracking
//!
//! This crate imports annotation data (criticality scores, CIA flags, evaluation
//! status, reasoning) from externally-authored spreadsheets into typed records,
//! and exports records back into the same files without destroying their
//! existing structure, formulas or formatting.
//!
//! Two formats are supported behind one [`SheetAdapter`] contract:
//!
//! - **ODS** ([`OdsAdapter`]): repeated cells are stored once with a repeat
//!   count. Rows are decoded with bounded expansion, and a housekeeping pass
//!   removes accumulated empty rows and trailing empty runs on load.
//! - **XLSX** ([`XlsxAdapter`]): computed values are read through calamine
//!   while writes go to the formula-preserving sheet XML. Keys embedded in
//!   `HYPERLINK(...)` formulas are recovered with [`extract_key`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use sheetsync::{ChangeCategory, Record, ReconcilerBuilder};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let reconciler = ReconcilerBuilder::new().build()?;
//!
//!     let mut records = vec![
//!         Record::new("T1055", ChangeCategory::MinorVersionChanges),
//!         Record::new("T1099", ChangeCategory::Additions),
//!     ];
//!
//!     // Spreadsheet -> records
//!     let report = reconciler.import_file("evaluation.xlsx", &mut records)?;
//!     println!("{} matched, {} reset", report.matched, report.reset);
//!
//!     // Records -> spreadsheet (written atomically to the destination)
//!     records[1].client.criticality = 2;
//!     records[1].refresh_sums();
//!     reconciler.export_file("evaluation.xlsx", "evaluation-upgraded.xlsx", &records)?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Custom Configuration
//!
//! ```rust,no_run
//! use sheetsync::{ReconcilerBuilder, SheetAdapter};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let reconciler = ReconcilerBuilder::new()
//!         .with_sheet_name("Techniques")
//!         .with_column_limit(64)
//!         .with_repeat_threshold(10)
//!         .build()?;
//!
//!     // Open an adapter directly to inspect the decoded rows
//!     let adapter = reconciler.open("evaluation.ods")?;
//!     for row in adapter.decode_rows() {
//!         println!("{}: {:?}", row.position, row.values);
//!     }
//!
//!     Ok(())
//! }
//! ```

mod adapter;
mod api;
mod builder;
mod error;
mod index;
mod package;
mod reconcile;
mod record;
mod schema;
mod security;
mod types;

// 公開API
pub use adapter::{
    extract_key, HousekeepingReport, OdsAdapter, SheetAdapter, SheetOptions, XlsxAdapter,
};
pub use api::{SpreadsheetFormat, DEFAULT_REPEAT_THRESHOLD, DEFAULT_SHEET_NAME};
pub use builder::{Reconciler, ReconcilerBuilder};
pub use error::{ReconcileError, Result};
pub use index::{DecodedRow, RowIndex};
pub use reconcile::ReconcileReport;
pub use record::{
    ChangeCategory, CiaFlags, EvaluationGroup, EvaluationStatus, GroupEvaluation, Record,
};
pub use schema::{ColumnRole, ColumnSchema};
pub use types::{CellValue, FLAG_MARKER};
