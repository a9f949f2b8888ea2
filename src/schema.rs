//! Column Schema Module
//!
//! 論理フィールドと物理列インデックス（0始まり）の対応表。
//! ODS/XLSXの両アダプタで共有され、1ファイルの処理中は不変です。

use crate::record::EvaluationGroup;

/// 列の役割
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnRole {
    /// エントリのキー（例: "T1055"）
    Key,
    /// 戦術
    Tactics,
    /// テクニック名
    Technique,
    /// サブテクニック名
    SubTechnique,
    /// グループごとの重要度
    Criticality(EvaluationGroup),
    /// 機密性フラグ
    Confidentiality,
    /// 完全性フラグ
    Integrity,
    /// 可用性フラグ
    Availability,
    /// グループごとの重要度合計
    CriticalitySum(EvaluationGroup),
    /// グループごとの評価ステータス
    EvaluationStatus(EvaluationGroup),
    /// グループごとの根拠
    Reasoning(EvaluationGroup),
    /// グループごとの対策
    Measures(EvaluationGroup),
}

impl ColumnRole {
    /// 整数型として扱う列かどうか
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnRole::Criticality(_) | ColumnRole::CriticalitySum(_)
        )
    }

    /// エクスポート時に既存行へ書き戻す列かどうか
    ///
    /// 記述子列とキーは上流の変更履歴が所有し、合計列はファイル側の数式が所有します。
    pub fn is_exported(&self) -> bool {
        matches!(
            self,
            ColumnRole::Criticality(_)
                | ColumnRole::Confidentiality
                | ColumnRole::Integrity
                | ColumnRole::Availability
                | ColumnRole::EvaluationStatus(_)
                | ColumnRole::Reasoning(_)
                | ColumnRole::Measures(_)
        )
    }
}

/// 列スキーマ
///
/// インデックス0と各グループのステータス直後の列は予約済み（未使用）です。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    columns: Vec<(ColumnRole, usize)>,
    width: usize,
}

impl ColumnSchema {
    /// 標準スキーマ
    ///
    /// | 列 | 役割 |
    /// |----|------|
    /// | 0 | 予約 |
    /// | 1 | キー |
    /// | 2-4 | 戦術 / テクニック / サブテクニック |
    /// | 5-7 | 重要度（client / infrastructure / service） |
    /// | 8-10 | C / I / A フラグ |
    /// | 11-15 | client: 合計 / ステータス / 予約 / 根拠 / 対策 |
    /// | 16-20 | infrastructure: 同上 |
    /// | 21-25 | service: 同上 |
    pub fn standard() -> Self {
        use ColumnRole::*;
        use EvaluationGroup::*;

        let mut columns = vec![
            (Key, 1),
            (Tactics, 2),
            (Technique, 3),
            (SubTechnique, 4),
            (Criticality(Client), 5),
            (Criticality(Infrastructure), 6),
            (Criticality(Service), 7),
            (Confidentiality, 8),
            (Integrity, 9),
            (Availability, 10),
        ];

        for (group, base) in [(Client, 11), (Infrastructure, 16), (Service, 21)] {
            columns.push((CriticalitySum(group), base));
            columns.push((EvaluationStatus(group), base + 1));
            columns.push((Reasoning(group), base + 3));
            columns.push((Measures(group), base + 4));
        }

        let width = columns.iter().map(|(_, index)| index + 1).max().unwrap_or(0);
        Self { columns, width }
    }

    /// 役割に対応する列インデックス
    pub fn index(&self, role: ColumnRole) -> usize {
        self.columns
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, index)| *index)
            // 標準スキーマはすべての役割を持つ
            .unwrap_or(0)
    }

    /// キー列のインデックス
    pub fn key_column(&self) -> usize {
        self.index(ColumnRole::Key)
    }

    /// スキーマが占める列数（最大インデックス + 1）
    pub fn width(&self) -> usize {
        self.width
    }

    /// すべての（役割, 列）の組を列順で返す
    pub fn columns(&self) -> impl Iterator<Item = (ColumnRole, usize)> + '_ {
        self.columns.iter().copied()
    }
}

impl Default for ColumnSchema {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_standard_layout() {
        let schema = ColumnSchema::standard();
        assert_eq!(schema.key_column(), 1);
        assert_eq!(schema.index(ColumnRole::Criticality(EvaluationGroup::Client)), 5);
        assert_eq!(schema.index(ColumnRole::Availability), 10);
        assert_eq!(schema.index(ColumnRole::CriticalitySum(EvaluationGroup::Infrastructure)), 16);
        assert_eq!(schema.index(ColumnRole::Measures(EvaluationGroup::Service)), 25);
        assert_eq!(schema.width(), 26);
    }

    #[test]
    fn test_indices_are_unique_and_skip_reserved() {
        let schema = ColumnSchema::standard();
        let indices: HashSet<usize> = schema.columns().map(|(_, i)| i).collect();
        assert_eq!(indices.len(), schema.columns().count());
        for reserved in [0, 13, 18, 23] {
            assert!(!indices.contains(&reserved));
        }
    }

    #[test]
    fn test_sums_are_not_exported() {
        assert!(!ColumnRole::CriticalitySum(EvaluationGroup::Client).is_exported());
        assert!(!ColumnRole::Key.is_exported());
        assert!(ColumnRole::Integrity.is_exported());
        assert!(ColumnRole::CriticalitySum(EvaluationGroup::Service).is_integer());
    }
}
