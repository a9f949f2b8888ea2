//! Row Index Module
//!
//! レコードのキーから行の物理位置とデコード済みの値への対応表。
//! ファイル読み込みごとに1回だけ構築され、行の挿入・削除の後は無効になります。

use std::collections::HashMap;

use crate::types::CellValue;

/// アダプタがデコードした1行
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRow {
    /// ドキュメント内の物理位置（アダプタ固有の行番号、0始まり）
    pub position: usize,
    /// 列ごとの値
    pub values: Vec<CellValue>,
}

impl DecodedRow {
    pub fn new(position: usize, values: Vec<CellValue>) -> Self {
        Self { position, values }
    }

    /// 列の値（範囲外は`Empty`）
    pub fn value(&self, col: usize) -> &CellValue {
        self.values.get(col).unwrap_or(&CellValue::Empty)
    }
}

/// キー -> 行の対応表
#[derive(Debug, Clone, Default)]
pub struct RowIndex {
    entries: HashMap<String, DecodedRow>,
    excluded: usize,
}

impl RowIndex {
    /// デコード済みの行からインデックスを構築
    ///
    /// 同じキーが複数行に現れた場合は後の行が優先されます（last-row-wins）。
    /// キー列が空の行は登録しません。
    pub fn build(rows: impl IntoIterator<Item = DecodedRow>, key_column: usize) -> Self {
        let mut entries = HashMap::new();
        for row in rows {
            let key = row.value(key_column).as_text().trim().to_string();
            if key.is_empty() {
                continue;
            }
            if let Some(previous) = entries.insert(key.clone(), row) {
                log::debug!(
                    "duplicate key {} (row {} replaced by a later row)",
                    key,
                    previous.position
                );
            }
        }
        Self {
            entries,
            excluded: 0,
        }
    }

    /// 照合から除外された行数を記録
    pub(crate) fn with_excluded(mut self, excluded: usize) -> Self {
        self.excluded = excluded;
        self
    }

    pub fn get(&self, key: &str) -> Option<&DecodedRow> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// キーを抽出できず照合対象から外れた行数
    pub fn excluded(&self) -> usize {
        self.excluded
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }
}
