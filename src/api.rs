//! Public API Types
//!
//! 公開APIで使用する列挙型と定数を定義するモジュール。

use std::path::Path;

use crate::error::{ReconcileError, Result};

/// 既定のシート名（両フォーマット共通）
pub const DEFAULT_SHEET_NAME: &str = "Techniques";

/// ハウスキーピングで個別セルに展開する繰り返し数の上限（既定値）
pub const DEFAULT_REPEAT_THRESHOLD: usize = 10;

/// スプレッドシートのファイル形式
///
/// 拡張子から判定されます。実際の内容（MIMEタイプ）の検証は呼び出し側の責務です。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SpreadsheetFormat {
    /// OpenDocument Spreadsheet（`.ods`）
    ///
    /// 同一セルの連続を繰り返し数で圧縮して保存する形式。
    Ods,

    /// Office Open XML Workbook（`.xlsx` / `.xlsm`）
    ///
    /// 計算済みの値と数式を別々に保持する形式。
    Xlsx,
}

impl SpreadsheetFormat {
    /// 拡張子（ドットなし、大文字小文字を区別しない）から判定
    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "ods" => Ok(SpreadsheetFormat::Ods),
            "xlsx" | "xlsm" => Ok(SpreadsheetFormat::Xlsx),
            _ => Err(ReconcileError::UnsupportedFileType(ext.to_string())),
        }
    }

    /// ファイルパスから判定
    ///
    /// # 使用例
    ///
    /// ```rust
    /// use sheetsync::SpreadsheetFormat;
    ///
    /// assert_eq!(
    ///     SpreadsheetFormat::from_path("upgrade/v15.ods").unwrap(),
    ///     SpreadsheetFormat::Ods
    /// );
    /// assert!(SpreadsheetFormat::from_path("notes.csv").is_err());
    /// ```
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| ReconcileError::UnsupportedFileType(path.display().to_string()))?;
        Self::from_extension(ext)
    }
}
