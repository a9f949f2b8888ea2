//! Reconciliation Module
//!
//! フォーマットに依存しないインポート/エクスポート処理。
//! アダプタの`SheetAdapter`トレイトだけを通してドキュメントにアクセスします。

use serde::Serialize;

use crate::adapter::SheetAdapter;
use crate::error::Result;
use crate::index::DecodedRow;
use crate::record::{EvaluationGroup, EvaluationStatus, Record};
use crate::schema::{ColumnRole, ColumnSchema};
use crate::types::CellValue;

/// 1回の照合処理の集計
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// インポートでスプレッドシートの行と一致したレコード数
    pub matched: usize,
    /// インポートで該当行がなく基準値にリセットしたレコード数
    pub reset: usize,
    /// エクスポートで既存行を更新したレコード数
    pub updated: usize,
    /// エクスポートで新しい行として追加したレコード数
    pub appended: usize,
    /// エクスポートで該当行がないが削除済みのため追加しなかったレコード数
    pub skipped: usize,
    /// キーを取り出せず照合対象から外れた行数
    pub excluded: usize,
}

/// スプレッドシートの値をレコードに取り込む
///
/// キーが見つからないレコードはすべての同期フィールドを基準値にリセットします。
pub(crate) fn import<A: SheetAdapter + ?Sized>(
    adapter: &A,
    schema: &ColumnSchema,
    records: &mut [Record],
) -> ReconcileReport {
    let index = adapter.row_index();
    let mut report = ReconcileReport {
        excluded: index.excluded(),
        ..Default::default()
    };

    for record in records.iter_mut() {
        match index.get(&record.key) {
            Some(row) => {
                apply_row(record, row, schema);
                report.matched += 1;
            }
            None => {
                log::debug!("{}: not in spreadsheet, reset to baseline", record.key);
                record.reset_to_baseline();
                report.reset += 1;
            }
        }
    }

    log::info!(
        "import: {} matched, {} reset, {} rows excluded",
        report.matched,
        report.reset,
        report.excluded
    );
    report
}

/// レコードの値をスプレッドシートに書き戻す
///
/// 既存行のセル更新をすべて終えてから行の追加を行い、最後にアダプタの
/// 後処理（末尾の空行削除など）を呼びます。保存は呼び出し側で行います。
pub(crate) fn export<A: SheetAdapter + ?Sized>(
    adapter: &mut A,
    schema: &ColumnSchema,
    records: &[Record],
) -> Result<ReconcileReport> {
    let mut report = ReconcileReport {
        excluded: adapter.row_index().excluded(),
        ..Default::default()
    };

    let mut updates = Vec::new();
    let mut additions = Vec::new();
    for record in records {
        match adapter.row_index().get(&record.key) {
            Some(row) => updates.push((row.position, record)),
            None if record.is_deletion() => {
                log::debug!("{}: deleted entry not in spreadsheet, skipped", record.key);
                report.skipped += 1;
            }
            None => additions.push(record),
        }
    }

    for (position, record) in updates {
        for (role, col) in schema.columns().filter(|(role, _)| role.is_exported()) {
            adapter.set_cell(position, col, &field_value(record, role))?;
        }
        report.updated += 1;
    }

    for record in additions {
        adapter.append_row(&full_row(record, schema))?;
        report.appended += 1;
    }

    adapter.finalize()?;

    log::info!(
        "export: {} updated, {} appended, {} skipped",
        report.updated,
        report.appended,
        report.skipped
    );
    Ok(report)
}

fn apply_row(record: &mut Record, row: &DecodedRow, schema: &ColumnSchema) {
    for group in EvaluationGroup::ALL {
        let criticality = integer_field(row.value(schema.index(ColumnRole::Criticality(group))));
        let criticality_sum =
            integer_field(row.value(schema.index(ColumnRole::CriticalitySum(group))));
        let status = if criticality == 0 {
            EvaluationStatus::NotApplicable
        } else {
            status_field(row.value(schema.index(ColumnRole::EvaluationStatus(group))))
        };

        let evaluation = record.group_mut(group);
        evaluation.criticality = criticality;
        evaluation.criticality_sum = criticality_sum;
        evaluation.status = status;
        evaluation.reasoning = row.value(schema.index(ColumnRole::Reasoning(group))).as_text();
        evaluation.measures = row.value(schema.index(ColumnRole::Measures(group))).as_text();
    }

    record.flags.confidentiality = row.value(schema.index(ColumnRole::Confidentiality)).is_marker();
    record.flags.integrity = row.value(schema.index(ColumnRole::Integrity)).is_marker();
    record.flags.availability = row.value(schema.index(ColumnRole::Availability)).is_marker();
}

/// `"n.a."`と解釈できない値は0
fn integer_field(value: &CellValue) -> i64 {
    match value {
        CellValue::Text(s) if s.trim() == EvaluationStatus::NOT_APPLICABLE => 0,
        other => other.as_integer().unwrap_or(0),
    }
}

fn status_field(value: &CellValue) -> EvaluationStatus {
    let text = value.as_text();
    if text.trim().is_empty() {
        EvaluationStatus::NotEvaluated
    } else {
        EvaluationStatus::from(text)
    }
}

/// レコードのフィールドをセル値に変換
fn field_value(record: &Record, role: ColumnRole) -> CellValue {
    match role {
        ColumnRole::Key => CellValue::text(record.key.as_str()),
        ColumnRole::Tactics => CellValue::text(record.tactics.as_str()),
        ColumnRole::Technique => CellValue::text(record.technique.as_str()),
        ColumnRole::SubTechnique => CellValue::text(record.sub_technique.as_str()),
        ColumnRole::Criticality(group) => CellValue::from(record.group(group).criticality),
        ColumnRole::CriticalitySum(group) => CellValue::from(record.group(group).criticality_sum),
        ColumnRole::Confidentiality => CellValue::marker(record.flags.confidentiality),
        ColumnRole::Integrity => CellValue::marker(record.flags.integrity),
        ColumnRole::Availability => CellValue::marker(record.flags.availability),
        ColumnRole::EvaluationStatus(group) => CellValue::text(record.group(group).status.as_str()),
        ColumnRole::Reasoning(group) => CellValue::text(record.group(group).reasoning.as_str()),
        ColumnRole::Measures(group) => CellValue::text(record.group(group).measures.as_str()),
    }
}

/// 新しい行として追加する全列の値
fn full_row(record: &Record, schema: &ColumnSchema) -> Vec<CellValue> {
    let mut values = vec![CellValue::Empty; schema.width()];
    for (role, col) in schema.columns() {
        values[col] = field_value(record, role);
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SpreadsheetFormat;
    use crate::index::RowIndex;
    use crate::record::ChangeCategory;
    use std::path::Path;

    /// 呼び出し順を記録するメモリ上のアダプタ
    struct MemoryAdapter {
        rows: Vec<DecodedRow>,
        index: RowIndex,
        calls: Vec<String>,
    }

    impl MemoryAdapter {
        fn new(rows: Vec<Vec<CellValue>>) -> Self {
            let rows: Vec<DecodedRow> = rows
                .into_iter()
                .enumerate()
                .map(|(i, values)| DecodedRow::new(i, values))
                .collect();
            let index = RowIndex::build(rows.clone(), 1);
            Self {
                rows,
                index,
                calls: Vec::new(),
            }
        }
    }

    impl SheetAdapter for MemoryAdapter {
        fn format(&self) -> SpreadsheetFormat {
            SpreadsheetFormat::Ods
        }

        fn decode_rows(&self) -> Vec<DecodedRow> {
            self.rows.clone()
        }

        fn row_index(&self) -> &RowIndex {
            &self.index
        }

        fn set_cell(&mut self, row: usize, col: usize, value: &CellValue) -> Result<()> {
            self.calls.push(format!("set {} {}", row, col));
            let target = &mut self.rows[row].values;
            if target.len() <= col {
                target.resize(col + 1, CellValue::Empty);
            }
            target[col] = value.clone();
            Ok(())
        }

        fn append_row(&mut self, values: &[CellValue]) -> Result<()> {
            self.calls.push("append".to_string());
            let position = self.rows.len();
            self.rows.push(DecodedRow::new(position, values.to_vec()));
            Ok(())
        }

        fn finalize(&mut self) -> Result<()> {
            self.calls.push("finalize".to_string());
            Ok(())
        }

        fn persist(&self, _dest: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn sheet_row(key: &str, edit: impl FnOnce(&mut Vec<CellValue>)) -> Vec<CellValue> {
        let mut values = vec![CellValue::Empty; 26];
        values[1] = CellValue::text(key);
        edit(&mut values);
        values
    }

    #[test]
    fn test_import_sentinel_and_markers() {
        let adapter = MemoryAdapter::new(vec![sheet_row("T1001", |v| {
            v[5] = CellValue::text("n.a.");
            v[6] = CellValue::Number(3.0);
            v[8] = CellValue::text("x");
            v[9] = CellValue::text("X");
            v[10] = CellValue::text("no");
            v[11] = CellValue::text("n.a.");
            v[12] = CellValue::text("in review");
            v[17] = CellValue::text("mitigated");
            v[19] = CellValue::text("because");
            v[20] = CellValue::text("patch");
        })]);
        let schema = ColumnSchema::standard();
        let mut records = vec![Record::new("T1001", ChangeCategory::MinorVersionChanges)];

        let report = import(&adapter, &schema, &mut records);
        assert_eq!(report.matched, 1);

        let record = &records[0];
        assert_eq!(record.client.criticality, 0);
        assert_eq!(record.client.criticality_sum, 0);
        // 重要度が0のときはステータス列の内容に関わらず"n.a."
        assert_eq!(record.client.status, EvaluationStatus::NotApplicable);
        assert_eq!(record.infrastructure.criticality, 3);
        assert_eq!(
            record.infrastructure.status,
            EvaluationStatus::Custom("mitigated".to_string())
        );
        assert_eq!(record.infrastructure.reasoning, "because");
        assert_eq!(record.infrastructure.measures, "patch");
        assert!(record.flags.confidentiality);
        assert!(!record.flags.integrity);
        assert!(!record.flags.availability);
    }

    #[test]
    fn test_import_missing_key_resets() {
        let adapter = MemoryAdapter::new(vec![sheet_row("T1001", |_| {})]);
        let mut record = Record::new("T1002", ChangeCategory::Additions);
        record.service.criticality = 4;
        record.flags.integrity = true;
        let mut records = vec![record];

        let report = import(&adapter, &ColumnSchema::standard(), &mut records);
        assert_eq!(report.reset, 1);
        assert_eq!(records[0].service, crate::record::GroupEvaluation::baseline());
        assert_eq!(records[0].service.status, EvaluationStatus::NotEvaluated);
        assert!(!records[0].flags.integrity);
    }

    #[test]
    fn test_empty_status_with_criticality_is_not_evaluated() {
        let adapter = MemoryAdapter::new(vec![sheet_row("T1001", |v| v[7] = CellValue::Number(2.0))]);
        let mut records = vec![Record::new("T1001", ChangeCategory::Patches)];
        import(&adapter, &ColumnSchema::standard(), &mut records);
        assert_eq!(records[0].service.status, EvaluationStatus::NotEvaluated);
    }

    #[test]
    fn test_export_updates_before_appends() {
        let mut adapter = MemoryAdapter::new(vec![
            sheet_row("T1001", |v| v[11] = CellValue::Number(9.0)),
            sheet_row("T1002", |_| {}),
        ]);
        let schema = ColumnSchema::standard();

        let mut new_entry = Record::new("T1099", ChangeCategory::Additions);
        new_entry.client.criticality = 2;
        new_entry.flags.availability = true;
        new_entry.refresh_sums();
        let mut existing = Record::new("T1001", ChangeCategory::MinorVersionChanges);
        existing.client.criticality = 1;
        existing.client.status = EvaluationStatus::Custom("done".to_string());
        let deleted = Record::new("T1500", ChangeCategory::Deletions);

        let report = export(&mut adapter, &schema, &[new_entry, existing, deleted]).unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.appended, 1);
        assert_eq!(report.skipped, 1);

        let first_append = adapter.calls.iter().position(|c| c == "append").unwrap();
        assert!(adapter.calls[..first_append].iter().all(|c| c.starts_with("set")));
        assert_eq!(adapter.calls.last().map(String::as_str), Some("finalize"));

        // 合計列は書き戻さない
        assert!(!adapter.calls.iter().any(|c| c == "set 0 11"));
        assert_eq!(adapter.rows[0].values[11], CellValue::Number(9.0));
        assert_eq!(adapter.rows[0].values[5], CellValue::Number(1.0));
        assert_eq!(adapter.rows[0].values[12], CellValue::text("done"));

        let appended = &adapter.rows[2];
        assert_eq!(appended.values[1], CellValue::text("T1099"));
        assert_eq!(appended.values[5], CellValue::Number(2.0));
        assert_eq!(appended.values[11], CellValue::Number(3.0));
        assert!(appended.values[10].is_marker());
        assert_eq!(appended.values.len(), schema.width());
    }

    #[test]
    fn test_round_trip_through_memory() {
        let mut adapter = MemoryAdapter::new(vec![sheet_row("T1001", |v| {
            v[5] = CellValue::Number(2.0);
            v[12] = CellValue::text("reviewed");
            v[9] = CellValue::text("x");
            v[24] = CellValue::text("line one\nline two");
        })]);
        let schema = ColumnSchema::standard();
        let mut records = vec![Record::new("T1001", ChangeCategory::Patches)];
        import(&adapter, &schema, &mut records);
        let before = records.clone();

        export(&mut adapter, &schema, &records).unwrap();
        adapter.index = RowIndex::build(adapter.rows.clone(), 1);
        import(&adapter, &schema, &mut records);

        assert_eq!(records, before);
        assert_eq!(records[0].group(EvaluationGroup::Service).reasoning, "line one\nline two");
    }
}
