//! Adapter Module
//!
//! 2つの物理フォーマットに共通する読み書きの契約。
//! 照合エンジンはこのトレイトだけに依存し、フォーマットを意識しません。

mod housekeeping;
mod ods;
mod xlsx;

pub use housekeeping::HousekeepingReport;
pub use ods::OdsAdapter;
pub use xlsx::{extract_key, XlsxAdapter};

use std::path::Path;

use crate::api::{SpreadsheetFormat, DEFAULT_REPEAT_THRESHOLD, DEFAULT_SHEET_NAME};
use crate::error::Result;
use crate::index::{DecodedRow, RowIndex};
use crate::schema::ColumnSchema;
use crate::types::CellValue;

/// アダプタを開く際の設定
#[derive(Debug, Clone)]
pub struct SheetOptions {
    /// 対象シート名
    pub sheet_name: String,
    /// 1行あたりにデコードする論理列数の上限
    pub column_limit: usize,
    /// 繰り返しセルを個別セルに展開する上限
    pub repeat_threshold: usize,
    /// データより前にあるヘッダー行の数（計算値と数式を分けて持つ形式のみ）
    pub header_rows: usize,
    /// 列スキーマ
    pub schema: ColumnSchema,
}

impl Default for SheetOptions {
    fn default() -> Self {
        let schema = ColumnSchema::standard();
        Self {
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            column_limit: schema.width(),
            repeat_threshold: DEFAULT_REPEAT_THRESHOLD,
            header_rows: 1,
            schema,
        }
    }
}

/// フォーマットアダプタの共通操作
///
/// 1回の照合処理の間、アダプタは読み込んだドキュメントを排他的に所有します。
/// `persist`を呼ぶまでディスク上のファイルは変更されません。
pub trait SheetAdapter {
    /// アダプタのフォーマット
    fn format(&self) -> SpreadsheetFormat;

    /// 全行をデコード
    fn decode_rows(&self) -> Vec<DecodedRow>;

    /// 読み込み時に構築したキー -> 行のインデックス
    fn row_index(&self) -> &RowIndex;

    /// 既存セルを上書き（範囲外の場合はドキュメントを拡張）
    fn set_cell(&mut self, row: usize, col: usize, value: &CellValue) -> Result<()>;

    /// ドキュメント末尾に新しい行を追加
    fn append_row(&mut self, values: &[CellValue]) -> Result<()>;

    /// すべての変更の後、保存の前に行う構造的な後処理
    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }

    /// ドキュメントを`dest`に保存
    fn persist(&self, dest: &Path) -> Result<()>;
}

/// パスの拡張子に応じてアダプタを開く
pub(crate) fn open_adapter(
    path: &Path,
    options: &SheetOptions,
) -> Result<Box<dyn SheetAdapter>> {
    match SpreadsheetFormat::from_path(path)? {
        SpreadsheetFormat::Ods => Ok(Box::new(OdsAdapter::open(path, options.clone())?)),
        SpreadsheetFormat::Xlsx => Ok(Box::new(XlsxAdapter::open(path, options.clone())?)),
    }
}
