//! Record Model Module
//!
//! アップグレード中に追跡される1エントリ（変更されたテクニック）の型定義。
//! 呼び出し側がレコードを所有し、照合エンジンはインポート時にフィールドを書き換え、
//! エクスポート時に読み取ります。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 評価グループ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationGroup {
    /// クライアント
    Client,
    /// インフラストラクチャ
    Infrastructure,
    /// サービス
    Service,
}

impl EvaluationGroup {
    /// すべてのグループ（列順）
    pub const ALL: [EvaluationGroup; 3] = [
        EvaluationGroup::Client,
        EvaluationGroup::Infrastructure,
        EvaluationGroup::Service,
    ];
}

/// 評価ステータス
///
/// 既知の2値以外は自由記述としてスプレッドシートの文字列をそのまま保持します。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EvaluationStatus {
    /// 未評価（`"not evaluated"`）
    NotEvaluated,
    /// 該当なし（`"n.a."`）
    NotApplicable,
    /// その他の自由記述ステータス
    Custom(String),
}

impl EvaluationStatus {
    /// 未評価を表す文字列
    pub const NOT_EVALUATED: &'static str = "not evaluated";
    /// 該当なしを表す文字列（数値列ではセンチネル値としても使われる）
    pub const NOT_APPLICABLE: &'static str = "n.a.";

    /// 表示文字列
    pub fn as_str(&self) -> &str {
        match self {
            EvaluationStatus::NotEvaluated => Self::NOT_EVALUATED,
            EvaluationStatus::NotApplicable => Self::NOT_APPLICABLE,
            EvaluationStatus::Custom(s) => s,
        }
    }
}

impl From<String> for EvaluationStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            Self::NOT_EVALUATED => EvaluationStatus::NotEvaluated,
            Self::NOT_APPLICABLE => EvaluationStatus::NotApplicable,
            _ => EvaluationStatus::Custom(value),
        }
    }
}

impl From<&str> for EvaluationStatus {
    fn from(value: &str) -> Self {
        EvaluationStatus::from(value.to_string())
    }
}

impl From<EvaluationStatus> for String {
    fn from(value: EvaluationStatus) -> Self {
        match value {
            EvaluationStatus::Custom(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 変更履歴上のカテゴリ
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChangeCategory {
    /// 新規追加
    Additions,
    /// メジャーバージョン変更
    MajorVersionChanges,
    /// マイナーバージョン変更
    MinorVersionChanges,
    /// その他のバージョン変更
    OtherVersionChanges,
    /// パッチ
    Patches,
    /// 非推奨化
    Deprecations,
    /// 取り消し
    Revocations,
    /// 削除
    Deletions,
    /// 変更なし
    #[default]
    Unchanged,
    /// 未知のカテゴリ
    Other(String),
}

impl ChangeCategory {
    /// 変更履歴で使われる名前
    pub fn as_str(&self) -> &str {
        match self {
            ChangeCategory::Additions => "additions",
            ChangeCategory::MajorVersionChanges => "major_version_changes",
            ChangeCategory::MinorVersionChanges => "minor_version_changes",
            ChangeCategory::OtherVersionChanges => "other_version_changes",
            ChangeCategory::Patches => "patches",
            ChangeCategory::Deprecations => "deprecations",
            ChangeCategory::Revocations => "revocations",
            ChangeCategory::Deletions => "deletions",
            ChangeCategory::Unchanged => "unchanged",
            ChangeCategory::Other(s) => s,
        }
    }
}

impl From<String> for ChangeCategory {
    fn from(value: String) -> Self {
        match value.as_str() {
            "additions" => ChangeCategory::Additions,
            "major_version_changes" => ChangeCategory::MajorVersionChanges,
            "minor_version_changes" => ChangeCategory::MinorVersionChanges,
            "other_version_changes" => ChangeCategory::OtherVersionChanges,
            "patches" => ChangeCategory::Patches,
            "deprecations" => ChangeCategory::Deprecations,
            "revocations" => ChangeCategory::Revocations,
            "deletions" => ChangeCategory::Deletions,
            "unchanged" => ChangeCategory::Unchanged,
            _ => ChangeCategory::Other(value),
        }
    }
}

impl From<ChangeCategory> for String {
    fn from(value: ChangeCategory) -> Self {
        match value {
            ChangeCategory::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

/// 1グループ分の評価
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupEvaluation {
    /// 重要度（0-N）
    pub criticality: i64,
    /// 重要度合計
    pub criticality_sum: i64,
    /// 評価ステータス
    pub status: EvaluationStatus,
    /// 根拠
    pub reasoning: String,
    /// 対策
    pub measures: String,
}

impl GroupEvaluation {
    /// スプレッドシートに該当行がない場合の基準値
    pub fn baseline() -> Self {
        Self {
            criticality: 0,
            criticality_sum: 0,
            status: EvaluationStatus::NotEvaluated,
            reasoning: String::new(),
            measures: String::new(),
        }
    }
}

impl Default for GroupEvaluation {
    fn default() -> Self {
        Self {
            status: EvaluationStatus::NotApplicable,
            ..Self::baseline()
        }
    }
}

/// 機密性・完全性・可用性フラグ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CiaFlags {
    pub confidentiality: bool,
    pub integrity: bool,
    pub availability: bool,
}

impl CiaFlags {
    /// 立っているフラグの数
    pub fn count(&self) -> i64 {
        [self.confidentiality, self.integrity, self.availability]
            .iter()
            .filter(|flag| **flag)
            .count() as i64
    }
}

/// 照合対象のレコード
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// 安定したキー（1アップグレード内で一意）
    pub key: String,
    #[serde(default)]
    pub tactics: String,
    #[serde(default)]
    pub technique: String,
    #[serde(default)]
    pub sub_technique: String,
    /// 変更カテゴリ（追加/削除マーカーを含む）
    #[serde(default)]
    pub change_category: ChangeCategory,
    #[serde(default)]
    pub flags: CiaFlags,
    #[serde(default)]
    pub client: GroupEvaluation,
    #[serde(default)]
    pub infrastructure: GroupEvaluation,
    #[serde(default)]
    pub service: GroupEvaluation,
}

impl Record {
    /// 同期フィールドがすべて既定値のレコードを生成
    pub fn new(key: impl Into<String>, change_category: ChangeCategory) -> Self {
        Self {
            key: key.into(),
            tactics: String::new(),
            technique: String::new(),
            sub_technique: String::new(),
            change_category,
            flags: CiaFlags::default(),
            client: GroupEvaluation::default(),
            infrastructure: GroupEvaluation::default(),
            service: GroupEvaluation::default(),
        }
    }

    pub fn group(&self, group: EvaluationGroup) -> &GroupEvaluation {
        match group {
            EvaluationGroup::Client => &self.client,
            EvaluationGroup::Infrastructure => &self.infrastructure,
            EvaluationGroup::Service => &self.service,
        }
    }

    pub fn group_mut(&mut self, group: EvaluationGroup) -> &mut GroupEvaluation {
        match group {
            EvaluationGroup::Client => &mut self.client,
            EvaluationGroup::Infrastructure => &mut self.infrastructure,
            EvaluationGroup::Service => &mut self.service,
        }
    }

    /// 削除されたエントリかどうか
    pub fn is_deletion(&self) -> bool {
        self.change_category == ChangeCategory::Deletions
    }

    /// すべての同期フィールドを基準値にリセット
    pub fn reset_to_baseline(&mut self) {
        for group in EvaluationGroup::ALL {
            *self.group_mut(group) = GroupEvaluation::baseline();
        }
        self.flags = CiaFlags::default();
    }

    /// 重要度合計を計算（C + I + A + グループの重要度）
    pub fn compute_sum(&self, group: EvaluationGroup) -> i64 {
        self.flags.count() + self.group(group).criticality
    }

    /// すべてのグループの重要度合計を再計算
    pub fn refresh_sums(&mut self) {
        for group in EvaluationGroup::ALL {
            let sum = self.compute_sum(group);
            self.group_mut(group).criticality_sum = sum;
        }
    }
}
