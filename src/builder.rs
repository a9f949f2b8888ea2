//! Builder Module
//!
//! Fluent Builder APIを提供し、`Reconciler`インスタンスを段階的に構築する。

use std::path::Path;

use crate::adapter::{open_adapter, SheetAdapter, SheetOptions};
use crate::api::{DEFAULT_REPEAT_THRESHOLD, DEFAULT_SHEET_NAME};
use crate::error::{ReconcileError, Result};
use crate::reconcile::{self, ReconcileReport};
use crate::record::Record;
use crate::schema::ColumnSchema;

/// Fluent Builder APIを提供する構造体
///
/// `Reconciler`インスタンスを段階的に構築するためのビルダーです。
/// すべての設定項目にデフォルト値が設定されており、必要な設定のみをオーバーライドできます。
///
/// # 使用例
///
/// ```rust
/// use sheetsync::ReconcilerBuilder;
///
/// # fn main() -> Result<(), sheetsync::ReconcileError> {
/// let reconciler = ReconcilerBuilder::new()
///     .with_sheet_name("Techniques")
///     .with_repeat_threshold(10)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ReconcilerBuilder {
    /// 内部設定（構築中）
    options: SheetOptions,
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconcilerBuilder {
    /// デフォルト設定でビルダーを生成
    ///
    /// | 設定 | デフォルト値 |
    /// |------|-------------|
    /// | シート名 | `"Techniques"` |
    /// | 列数上限 | 列スキーマの幅（26） |
    /// | 繰り返し閾値 | 10 |
    /// | ヘッダー行数 | 1 |
    pub fn new() -> Self {
        let schema = ColumnSchema::standard();
        Self {
            options: SheetOptions {
                sheet_name: DEFAULT_SHEET_NAME.to_string(),
                column_limit: schema.width(),
                repeat_threshold: DEFAULT_REPEAT_THRESHOLD,
                header_rows: 1,
                schema,
            },
        }
    }

    /// 対象シート名を設定する
    pub fn with_sheet_name(mut self, name: impl Into<String>) -> Self {
        self.options.sheet_name = name.into();
        self
    }

    /// 1行あたりにデコードする論理列数の上限を設定する
    ///
    /// 繰り返しセルはこの列数を超えて展開されません。列スキーマの幅より
    /// 小さい値は`build()`でエラーになります。
    pub fn with_column_limit(mut self, limit: usize) -> Self {
        self.options.column_limit = limit;
        self
    }

    /// ハウスキーピングで個別セルに展開する繰り返し数の上限を設定する
    ///
    /// 空セルの連続のうち、この値を超えるものは行末尾にある場合に削除されます。
    pub fn with_repeat_threshold(mut self, threshold: usize) -> Self {
        self.options.repeat_threshold = threshold;
        self
    }

    /// データより前にあるヘッダー行の数を設定する
    ///
    /// 計算値と数式を別々に持つ形式（XLSX）でのみ使用します。
    pub fn with_header_rows(mut self, rows: usize) -> Self {
        self.options.header_rows = rows;
        self
    }

    /// 設定を検証してReconcilerインスタンスを生成
    ///
    /// # 戻り値
    ///
    /// * `Ok(Reconciler)`: 設定が有効な場合
    /// * `Err(ReconcileError::Config)`: 設定が無効な場合
    ///
    /// # 発生し得るエラー
    ///
    /// * `ReconcileError::Config(String)`: 設定の検証に失敗した場合
    ///   * シート名が空
    ///   * 列数上限が列スキーマの幅より小さい
    ///   * 繰り返し閾値が0
    pub fn build(self) -> Result<Reconciler> {
        if self.options.sheet_name.trim().is_empty() {
            return Err(ReconcileError::Config("Sheet name must not be empty".to_string()));
        }

        let width = self.options.schema.width();
        if self.options.column_limit < width {
            return Err(ReconcileError::Config(format!(
                "Invalid column limit: {} (schema needs at least {} columns)",
                self.options.column_limit, width
            )));
        }

        if self.options.repeat_threshold == 0 {
            return Err(ReconcileError::Config(
                "Repeat threshold must be at least 1".to_string(),
            ));
        }

        Ok(Reconciler::new(self.options))
    }
}

/// 照合処理のファサード
///
/// スプレッドシートとレコードの間でインポート/エクスポートを行うメインエントリーポイントです。
/// 1回の呼び出しでファイルを開き、処理し、（エクスポートの場合は）保存まで行います。
///
/// # 使用例
///
/// ```rust,no_run
/// use sheetsync::{ChangeCategory, Record, ReconcilerBuilder};
///
/// # fn main() -> Result<(), sheetsync::ReconcileError> {
/// let reconciler = ReconcilerBuilder::new().build()?;
/// let mut records = vec![Record::new("T1055", ChangeCategory::MinorVersionChanges)];
///
/// reconciler.import_file("evaluation.ods", &mut records)?;
/// records[0].client.criticality = 2;
/// reconciler.export_file("evaluation.ods", "evaluation-v15.ods", &records)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Reconciler {
    /// アダプタ設定
    options: SheetOptions,
}

impl Reconciler {
    pub(crate) fn new(options: SheetOptions) -> Self {
        Self { options }
    }

    /// 有効な設定
    pub fn options(&self) -> &SheetOptions {
        &self.options
    }

    /// 拡張子に応じたアダプタでファイルを開く
    ///
    /// 対応していない拡張子はファイルを読む前に`ReconcileError::UnsupportedFileType`になります。
    pub fn open(&self, path: impl AsRef<Path>) -> Result<Box<dyn SheetAdapter>> {
        open_adapter(path.as_ref(), &self.options)
    }

    /// ファイルからレコードへインポート
    ///
    /// # 引数
    ///
    /// * `path` - `.ods`または`.xlsx`ファイル
    /// * `records` - 更新するレコード（キーが見つからないものは基準値にリセット）
    ///
    /// # 戻り値
    ///
    /// * `Ok(ReconcileReport)` - 照合結果の集計
    /// * `Err(ReconcileError)` - ファイルを開けない、シートがないなど
    pub fn import_file(
        &self,
        path: impl AsRef<Path>,
        records: &mut [Record],
    ) -> Result<ReconcileReport> {
        let adapter = self.open(path)?;
        Ok(self.import(adapter.as_ref(), records))
    }

    /// レコードを`source`に書き戻した結果を`dest`に保存
    ///
    /// `source`と`dest`は同じパスでも構いません。処理がすべて成功するまで
    /// `dest`は変更されません。
    ///
    /// # 引数
    ///
    /// * `source` - 元になるファイル
    /// * `dest` - 保存先（`source`と同じ形式で書き出す）
    /// * `records` - 書き戻すレコード
    pub fn export_file(
        &self,
        source: impl AsRef<Path>,
        dest: impl AsRef<Path>,
        records: &[Record],
    ) -> Result<ReconcileReport> {
        let mut adapter = self.open(source)?;
        let report = self.export(adapter.as_mut(), records)?;
        adapter.persist(dest.as_ref())?;
        Ok(report)
    }

    /// 開いているアダプタからインポート
    pub fn import<A: SheetAdapter + ?Sized>(
        &self,
        adapter: &A,
        records: &mut [Record],
    ) -> ReconcileReport {
        reconcile::import(adapter, &self.options.schema, records)
    }

    /// 開いているアダプタへエクスポート（保存は行わない）
    pub fn export<A: SheetAdapter + ?Sized>(
        &self,
        adapter: &mut A,
        records: &[Record],
    ) -> Result<ReconcileReport> {
        reconcile::export(adapter, &self.options.schema, records)
    }
}
