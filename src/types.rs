//! Types Module
//!
//! クレート全体で使用する共通データ型を定義するモジュール。

use serde::{Deserialize, Serialize};

/// 真偽フラグの列に書き込まれるマーカー文字列
pub const FLAG_MARKER: &str = "x";

/// セルの値を表す列挙型
///
/// 物理フォーマットに依存しない、閉じた値の集合です。数値は常に
/// 物理フォーマットのネイティブな数値表現で保存されます。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    /// 数値（整数も小数もf64で保持）
    Number(f64),

    /// 文字列
    Text(String),

    /// 空セル
    Empty,
}

impl CellValue {
    /// 文字列からセル値を生成（空文字列は`Empty`になる）
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value)
        }
    }

    /// 真偽値をマーカー表現に変換（`true` -> `"x"`, `false` -> 空）
    pub fn marker(flag: bool) -> Self {
        if flag {
            CellValue::Text(FLAG_MARKER.to_string())
        } else {
            CellValue::Empty
        }
    }

    /// 値が空かどうかを判定
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            CellValue::Number(_) => false,
        }
    }

    /// マーカー（`"x"`）と完全一致するかどうか
    pub fn is_marker(&self) -> bool {
        matches!(self, CellValue::Text(s) if s == FLAG_MARKER)
    }

    /// 値を表示用の文字列として取得
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Number(n) => format_number(*n),
            CellValue::Text(s) => s.clone(),
            CellValue::Empty => String::new(),
        }
    }

    /// 整数として解釈
    ///
    /// 数値セルは小数部を切り捨てます（ファイル内部では常に`.0`付きの
    /// 浮動小数点で保存されているため）。数字のみの文字列も受け付けます。
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            CellValue::Number(n) if n.is_finite() => Some(n.trunc() as i64),
            CellValue::Number(_) => None,
            CellValue::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|n| n.is_finite()).map(|n| n.trunc() as i64))
            }
            CellValue::Empty => None,
        }
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::text(value)
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::text(value)
    }
}

/// 数値を表示用の文字列に変換（整数値は小数点なし）
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// セル座標（0始まり）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CellCoord {
    pub row: u32,
    pub col: u32,
}

impl CellCoord {
    /// 新しい座標を生成
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// A1形式の文字列に変換（例: (0, 0) -> "A1"）
    #[allow(clippy::wrong_self_convention)]
    pub fn to_a1_notation(&self) -> String {
        format!("{}{}", Self::col_index_to_letter(self.col), self.row + 1)
    }

    /// A1形式の文字列から座標を生成（例: "B3" -> (2, 1)）
    ///
    /// `$`による絶対参照記号は無視します。
    pub fn from_a1_notation(reference: &str) -> Option<Self> {
        let reference = reference.trim().replace('$', "");
        let split = reference.find(|c: char| c.is_ascii_digit())?;
        let (col_str, row_str) = reference.split_at(split);
        let col = Self::col_letter_to_index(col_str)?;
        let row = row_str.parse::<u32>().ok()?.checked_sub(1)?;
        Some(Self { row, col })
    }

    /// 列インデックスを文字列に変換（0 -> "A", 25 -> "Z", 26 -> "AA"）
    pub fn col_index_to_letter(mut col: u32) -> String {
        let mut result = String::new();
        loop {
            let remainder = col % 26;
            result.insert(0, (b'A' + remainder as u8) as char);
            if col < 26 {
                break;
            }
            col = col / 26 - 1;
        }
        result
    }

    /// 列文字列をインデックスに変換（"A" -> 0, "AA" -> 26）
    pub fn col_letter_to_index(letters: &str) -> Option<u32> {
        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        let value = letters.chars().try_fold(0u32, |acc, ch| {
            let digit = ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
            acc.checked_mul(26)?.checked_add(digit)
        })?;
        Some(value - 1)
    }
}
