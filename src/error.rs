//! Error Types Module
//!
//! クレート全体で使用する構造化エラー型を定義するモジュール。
//! `thiserror`を使用して、エラーの自動変換とメッセージフォーマットを実現する。

use thiserror::Error;

/// sheetsyncクレート全体で使用するエラー型
///
/// スプレッドシートの読み込み、照合（インポート/エクスポート）、保存処理中に
/// 発生するすべての致命的エラーを統一的に扱います。
///
/// 行単位の異常（キーの不一致、埋め込みキーの抽出失敗など）はエラーではなく、
/// 既定値へのリセットや照合対象からの除外として処理されます。
///
/// # 使用例
///
/// ```rust,no_run
/// use sheetsync::{ReconcileError, ReconcilerBuilder};
///
/// let reconciler = ReconcilerBuilder::new().build().unwrap();
/// match reconciler.import_file("upgrade.csv", &mut []) {
///     Err(ReconcileError::UnsupportedFileType(ext)) => {
///         println!("未対応の形式: {}", ext);
///     }
///     _ => {}
/// }
/// ```
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// I/O操作中に発生したエラー
    ///
    /// `#[from]`属性により、`std::io::Error`から自動的に変換されます。
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 値ビュー（計算済みの値）の読み込み中に発生したエラー（calamine由来）
    #[error("Failed to parse spreadsheet: {0}")]
    Parse(#[from] calamine::Error),

    /// UTF-8文字列の変換エラー
    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// ZIPアーカイブの読み書きエラー
    #[error("ZIP archive error: {0}")]
    Zip(String),

    /// ドキュメントXMLの解析エラー
    #[error("XML error: {0}")]
    Xml(String),

    /// 指定された名前のシートが存在しない
    ///
    /// インデックスを構築できないため、照合処理全体を中断します。
    #[error("Worksheet \"{sheet}\" not found")]
    SheetNotFound {
        /// 検索したシート名
        sheet: String,
    },

    /// サポートされていないファイル形式
    ///
    /// アダプタを開く前に拡張子で判定されます。
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// 設定の検証に失敗したエラー
    ///
    /// `ReconcilerBuilder::build()`時に検出されます。
    #[error("Configuration error: {0}")]
    Config(String),

    /// セキュリティ制限に違反したエラー
    ///
    /// ZIP bomb攻撃、パストラバーサル攻撃、ファイルサイズ制限などの
    /// セキュリティ制限に違反した場合に発生します。
    #[error("Security violation: {0}")]
    SecurityViolation(String),
}

impl ReconcileError {
    pub(crate) fn zip(err: zip::result::ZipError) -> Self {
        ReconcileError::Zip(format!("{}", err))
    }

    pub(crate) fn xml(err: impl std::fmt::Display) -> Self {
        ReconcileError::Xml(format!("{}", err))
    }
}

/// クレート内で使用する結果型
pub type Result<T> = std::result::Result<T, ReconcileError>;
