//! ODS Housekeeping
//!
//! 読み込み直後の構造的な正規化。
//!
//! 1. すべてのセルが空の行を削除
//! 2. 行末尾の空セルのうち、繰り返し数が閾値を超えるものを削除
//! 3. 繰り返し数が2以上・閾値以下のセルを同じ内容の個別セルに展開
//!
//! 空セルの連続を行の途中で削除すると後続の列がずれるため、
//! 削除対象は最後の非空セルより後ろに限ります。

use super::ods::{is_cell, is_cell_empty, repeat_count, row_paths, COLUMNS_REPEATED};
use crate::package::xml::{Element, Node};

/// ハウスキーピングの結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HousekeepingReport {
    /// 削除した空行の数
    pub removed_rows: usize,
    /// 削除した末尾の空セルの連続の数
    pub removed_runs: usize,
    /// 個別セルに展開した繰り返しセルの数
    pub expanded_runs: usize,
}

impl HousekeepingReport {
    /// 何も変更しなかったかどうか
    pub fn is_clean(&self) -> bool {
        self.removed_rows == 0 && self.removed_runs == 0 && self.expanded_runs == 0
    }
}

pub(crate) fn run(table: &mut Element, threshold: usize) -> HousekeepingReport {
    let mut report = HousekeepingReport {
        removed_rows: drop_empty_rows(table),
        ..Default::default()
    };

    for path in row_paths(table) {
        if let Some(row) = table.descend_mut(&path) {
            report.removed_runs += drop_trailing_empty_runs(row, threshold);
            report.expanded_runs += expand_runs(row, threshold);
        }
    }

    if report.is_clean() {
        log::debug!("housekeeping: nothing to do");
    } else {
        log::info!(
            "housekeeping: removed {} empty rows and {} trailing runs, expanded {} runs",
            report.removed_rows,
            report.removed_runs,
            report.expanded_runs
        );
    }
    report
}

fn is_row_empty(row: &Element) -> bool {
    row.elements().filter(|el| is_cell(el)).all(is_cell_empty)
}

fn drop_empty_rows(table: &mut Element) -> usize {
    let mut removed = 0;
    // 後ろから削除して前の行の位置を保つ
    for mut path in row_paths(table).into_iter().rev() {
        let empty = table.descend(&path).is_some_and(is_row_empty);
        if !empty {
            continue;
        }
        let Some(position) = path.pop() else { continue };
        if let Some(parent) = table.descend_mut(&path) {
            parent.children.remove(position);
            removed += 1;
        }
    }
    removed
}

fn drop_trailing_empty_runs(row: &mut Element, threshold: usize) -> usize {
    let mut doomed = Vec::new();
    for (position, node) in row.children.iter().enumerate().rev() {
        let Node::Element(cell) = node else { continue };
        if !is_cell(cell) {
            continue;
        }
        if !is_cell_empty(cell) {
            break;
        }
        if repeat_count(cell, COLUMNS_REPEATED) > threshold {
            doomed.push(position);
        }
    }
    // 降順に並んでいる
    for &position in &doomed {
        row.children.remove(position);
    }
    doomed.len()
}

fn expand_runs(row: &mut Element, threshold: usize) -> usize {
    let expandable = |cell: &Element| {
        is_cell(cell) && (2..=threshold).contains(&repeat_count(cell, COLUMNS_REPEATED))
    };
    if !row.elements().any(expandable) {
        return 0;
    }

    let mut expanded = 0;
    let mut children = Vec::with_capacity(row.children.len());
    for node in row.children.drain(..) {
        match node {
            Node::Element(mut cell) if expandable(&cell) => {
                let count = repeat_count(&cell, COLUMNS_REPEATED);
                cell.remove_attr(COLUMNS_REPEATED);
                children.extend(std::iter::repeat(Node::Element(cell)).take(count));
                expanded += 1;
            }
            other => children.push(other),
        }
    }
    row.children = children;
    expanded
}
