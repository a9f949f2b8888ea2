//! ODS Adapter
//!
//! `content.xml`を書き戻し可能なツリーとして保持し、圧縮グリッド
//! （`table:number-columns-repeated`による繰り返しセル）を論理列で読み書きします。
//!
//! 行の位置は`table:table`要素からの子要素インデックスの列で表し、
//! `table:table-header-rows`などの行コンテナ内の行も対象にします。

use std::path::Path;

use super::housekeeping::{self, HousekeepingReport};
use super::{SheetAdapter, SheetOptions};
use crate::api::SpreadsheetFormat;
use crate::error::{ReconcileError, Result};
use crate::index::{DecodedRow, RowIndex};
use crate::package::xml::{local_name, unescape_text, Element, Node, XmlDocument};
use crate::package::{Package, PackageChanges};
use crate::types::{format_number, CellValue};

const CONTENT_PART: &str = "content.xml";

pub(crate) const COLUMNS_REPEATED: &str = "table:number-columns-repeated";
pub(crate) const ROWS_REPEATED: &str = "table:number-rows-repeated";

/// ODSファイルのアダプタ
pub struct OdsAdapter {
    package: Package,
    content: XmlDocument,
    table_path: Vec<usize>,
    row_paths: Vec<Vec<usize>>,
    options: SheetOptions,
    index: RowIndex,
    housekeeping: HousekeepingReport,
}

impl OdsAdapter {
    /// ファイルを開き、ハウスキーピングを行ってからインデックスを構築
    ///
    /// # 引数
    ///
    /// * `path` - `.ods`ファイルのパス
    /// * `options` - シート名・列数上限・繰り返し閾値
    ///
    /// # 戻り値
    ///
    /// 対象シートが存在しない場合は`ReconcileError::SheetNotFound`
    pub fn open(path: impl AsRef<Path>, options: SheetOptions) -> Result<Self> {
        let path = path.as_ref();
        let adapter = Self::from_package(Package::open(path)?, options)?;
        log::info!(
            "opened {} (sheet '{}', {} rows, {} keys)",
            path.display(),
            adapter.options.sheet_name,
            adapter.row_count(),
            adapter.index.len()
        );
        Ok(adapter)
    }

    /// メモリ上のバイト列から開く
    pub fn from_bytes(bytes: Vec<u8>, options: SheetOptions) -> Result<Self> {
        Self::from_package(Package::from_bytes(bytes)?, options)
    }

    fn from_package(package: Package, options: SheetOptions) -> Result<Self> {
        let bytes = package
            .read_part(CONTENT_PART)?
            .ok_or_else(|| ReconcileError::xml(format!("{} not found in package", CONTENT_PART)))?;
        let content = XmlDocument::parse(&bytes)?;
        let root = content
            .root()
            .ok_or_else(|| ReconcileError::xml("document has no root element"))?;
        let table_path = find_table(root, &options.sheet_name)?;

        let mut adapter = Self {
            package,
            content,
            table_path,
            row_paths: Vec::new(),
            options,
            index: RowIndex::default(),
            housekeeping: HousekeepingReport::default(),
        };
        adapter.housekeeping = adapter.housekeeping()?;
        Ok(adapter)
    }

    /// 空行・末尾の空セルの連続を削除し、短い繰り返しを個別セルに展開
    ///
    /// 何度呼んでも結果は変わりません。実行後は行の位置とインデックスを再構築します。
    pub fn housekeeping(&mut self) -> Result<HousekeepingReport> {
        let threshold = self.options.repeat_threshold;
        let report = housekeeping::run(self.table_mut()?, threshold);
        self.refresh()?;
        Ok(report)
    }

    /// 読み込み時のハウスキーピング結果
    pub fn housekeeping_report(&self) -> &HousekeepingReport {
        &self.housekeeping
    }

    /// 物理行の数（行の繰り返しは1行として数える）
    pub fn row_count(&self) -> usize {
        self.row_paths.len()
    }

    /// 指定した論理列数で全行をデコード
    ///
    /// 繰り返し数がどれだけ大きくても、1行は`column_limit`列に切り詰め
    /// （または`Empty`で補完）されます。
    pub fn decode_rows_with_limit(&self, column_limit: usize) -> Vec<DecodedRow> {
        let Ok(table) = self.table() else {
            return Vec::new();
        };
        self.row_paths
            .iter()
            .enumerate()
            .filter_map(|(position, path)| {
                let row = table.descend(path)?;
                Some(DecodedRow::new(position, decode_row(row, column_limit)))
            })
            .collect()
    }

    fn refresh(&mut self) -> Result<()> {
        self.row_paths = row_paths(self.table()?);
        self.index = RowIndex::build(self.decode_rows(), self.options.schema.key_column());
        Ok(())
    }

    fn table(&self) -> Result<&Element> {
        self.content
            .root()
            .and_then(|root| root.descend(&self.table_path))
            .ok_or_else(|| ReconcileError::xml("table element missing"))
    }

    fn table_mut(&mut self) -> Result<&mut Element> {
        let path = &self.table_path;
        self.content
            .root_mut()
            .and_then(|root| root.descend_mut(path))
            .ok_or_else(|| ReconcileError::xml("table element missing"))
    }

    /// 最後の行の直後（同じ親の中、見出し行のコンテナは除く）に行を挿入
    fn insert_row(&mut self, row: Element) -> Result<()> {
        let path = match self.row_paths.last().cloned() {
            Some(mut path) => {
                let table = self.table_mut()?;
                // 見出し行のコンテナの中には追加せず、コンテナの直後に置く
                if let Some(depth) = (1..path.len()).find(|&depth| {
                    table
                        .descend(&path[..depth])
                        .is_some_and(|el| el.local_name() == "table-header-rows")
                }) {
                    path.truncate(depth);
                }
                let position = path.pop().map_or(0, |last| last + 1);
                let parent = table
                    .descend_mut(&path)
                    .ok_or_else(|| ReconcileError::xml("row container missing"))?;
                parent.children.insert(position, Node::Element(row));
                path.push(position);
                path
            }
            None => {
                let table = self.table_mut()?;
                // 列定義の後ろ
                let position = table
                    .children
                    .iter()
                    .rposition(|node| {
                        matches!(node, Node::Element(el) if el.local_name().contains("column"))
                    })
                    .map_or(table.children.len(), |p| p + 1);
                table.children.insert(position, Node::Element(row));
                vec![position]
            }
        };
        self.row_paths.push(path);
        Ok(())
    }

    /// 繰り返し行の最後の1行を単独の行として切り出し、その位置を返す
    ///
    /// 残りの繰り返しは直前の行として残ります。行の位置（インデックス）は変わらず、
    /// 同じコンテナ内の後続の行の`children`内の位置だけがずれます。
    fn split_repeated_row(&mut self, row: usize, path: Vec<usize>) -> Result<Vec<usize>> {
        let Some((&index, parent_path)) = path.split_last() else {
            return Ok(path);
        };
        let parent = self
            .table_mut()?
            .descend_mut(parent_path)
            .ok_or_else(|| ReconcileError::xml("row container missing"))?;
        let Some(Node::Element(run)) = parent.children.get(index).cloned() else {
            return Ok(path);
        };
        let repeat = repeat_count(&run, ROWS_REPEATED);
        if repeat <= 1 {
            return Ok(path);
        }

        let mut before = run.clone();
        set_repeat(&mut before, ROWS_REPEATED, repeat - 1);
        let mut target = run;
        target.remove_attr(ROWS_REPEATED);
        parent
            .children
            .splice(index..=index, [Node::Element(before), Node::Element(target)]);

        let depth = parent_path.len();
        for other in &mut self.row_paths {
            if other.len() > depth && other[..depth] == parent_path[..] && other[depth] >= index {
                other[depth] += 1;
            }
        }
        log::debug!("split repeated row {} ({} copies)", row, repeat);
        Ok(self.row_paths[row].clone())
    }

    fn ensure_row(&mut self, row: usize) -> Result<Vec<usize>> {
        while self.row_paths.len() <= row {
            let mut filler = Element::new("table:table-row");
            filler.push_element(Element::new("table:table-cell"));
            self.insert_row(filler)?;
        }
        Ok(self.row_paths[row].clone())
    }
}

impl SheetAdapter for OdsAdapter {
    fn format(&self) -> SpreadsheetFormat {
        SpreadsheetFormat::Ods
    }

    fn decode_rows(&self) -> Vec<DecodedRow> {
        self.decode_rows_with_limit(self.options.column_limit)
    }

    fn row_index(&self) -> &RowIndex {
        &self.index
    }

    fn set_cell(&mut self, row: usize, col: usize, value: &CellValue) -> Result<()> {
        let path = self.ensure_row(row)?;
        let path = self.split_repeated_row(row, path)?;
        let row_el = self
            .table_mut()?
            .descend_mut(&path)
            .ok_or_else(|| ReconcileError::xml(format!("row {} missing", row)))?;

        let position = cell_position(row_el, col);
        let cell = row_el
            .element_at_mut(position)
            .ok_or_else(|| ReconcileError::xml(format!("cell ({}, {}) missing", row, col)))?;
        write_value(cell, value);
        Ok(())
    }

    fn append_row(&mut self, values: &[CellValue]) -> Result<()> {
        let mut row = Element::new("table:table-row");
        for value in values {
            let mut cell = Element::new("table:table-cell");
            write_value(&mut cell, value);
            row.push_element(cell);
        }
        if values.is_empty() {
            row.push_element(Element::new("table:table-cell"));
        }
        self.insert_row(row)?;
        log::debug!("appended row {}", self.row_paths.len() - 1);
        Ok(())
    }

    fn persist(&self, dest: &Path) -> Result<()> {
        let mut changes = PackageChanges::new();
        changes.replace(CONTENT_PART, self.content.to_bytes()?);
        self.package.write_to(dest, &changes)
    }
}

/// `office:body/office:spreadsheet`の下から名前の一致するテーブルを探す
fn find_table(root: &Element, sheet_name: &str) -> Result<Vec<usize>> {
    let not_found = || ReconcileError::SheetNotFound {
        sheet: sheet_name.to_string(),
    };
    let body = root.child_position("body").ok_or_else(not_found)?;
    let body_el = root.element_at(body).ok_or_else(not_found)?;
    let spreadsheet = body_el.child_position("spreadsheet").ok_or_else(not_found)?;
    let spreadsheet_el = body_el.element_at(spreadsheet).ok_or_else(not_found)?;

    spreadsheet_el
        .children
        .iter()
        .position(|node| {
            matches!(node, Node::Element(el)
                if el.local_name() == "table"
                    && el.attr("table:name").as_deref() == Some(sheet_name))
        })
        .map(|table| vec![body, spreadsheet, table])
        .ok_or_else(not_found)
}

/// テーブル配下のすべての行の位置（文書順）
pub(crate) fn row_paths(table: &Element) -> Vec<Vec<usize>> {
    fn collect(el: &Element, prefix: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        for (position, node) in el.children.iter().enumerate() {
            let Node::Element(child) = node else { continue };
            match child.local_name() {
                "table-row" => {
                    let mut path = prefix.clone();
                    path.push(position);
                    out.push(path);
                }
                "table-header-rows" | "table-row-group" | "table-rows" => {
                    prefix.push(position);
                    collect(child, prefix, out);
                    prefix.pop();
                }
                _ => {}
            }
        }
    }

    let mut out = Vec::new();
    collect(table, &mut Vec::new(), &mut out);
    out
}

pub(crate) fn is_cell(el: &Element) -> bool {
    matches!(el.local_name(), "table-cell" | "covered-table-cell")
}

/// 繰り返し数（属性がない・不正な場合は1）
pub(crate) fn repeat_count(el: &Element, attr: &str) -> usize {
    el.attr(attr)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .max(1)
}

pub(crate) fn set_repeat(el: &mut Element, attr: &str, count: usize) {
    if count > 1 {
        el.set_attr(attr, &count.to_string());
    } else {
        el.remove_attr(attr);
    }
}

/// 子を持たず値属性もないセル
pub(crate) fn is_cell_empty(cell: &Element) -> bool {
    let has_content = cell.children.iter().any(|node| match node {
        Node::Element(_) | Node::Other(_) => true,
        Node::Text(raw) => !raw.trim().is_empty(),
    });
    !has_content && !cell.attributes.iter().any(|(k, _)| is_office_value_attr(k))
}

fn is_office_value_attr(name: &str) -> bool {
    name.starts_with("office:")
        && matches!(
            local_name(name),
            "value" | "string-value" | "date-value" | "time-value" | "boolean-value"
        )
}

fn decode_row(row: &Element, column_limit: usize) -> Vec<CellValue> {
    let mut values = Vec::with_capacity(column_limit);
    for cell in row.elements().filter(|el| is_cell(el)) {
        if values.len() >= column_limit {
            break;
        }
        let repeat = repeat_count(cell, COLUMNS_REPEATED).min(column_limit - values.len());
        let value = decode_cell(cell);
        values.extend(std::iter::repeat(value).take(repeat));
    }
    values.resize(column_limit, CellValue::Empty);
    values
}

fn decode_cell(cell: &Element) -> CellValue {
    let numeric = matches!(
        cell.attr("office:value-type").as_deref(),
        Some("float" | "percentage" | "currency")
    );
    if numeric {
        if let Some(n) = cell
            .attr("office:value")
            .and_then(|v| v.trim().parse::<f64>().ok())
        {
            return CellValue::Number(n);
        }
    }
    CellValue::text(cell_text(cell))
}

/// 段落ごとのテキストを改行で連結（注釈は除く）
fn cell_text(cell: &Element) -> String {
    cell.elements()
        .filter(|el| matches!(el.local_name(), "p" | "h"))
        .map(paragraph_text)
        .collect::<Vec<_>>()
        .join("\n")
}

fn paragraph_text(p: &Element) -> String {
    fn collect(el: &Element, out: &mut String) {
        for node in &el.children {
            match node {
                Node::Text(raw) => out.push_str(&unescape_text(raw)),
                Node::Element(child) => match child.local_name() {
                    "s" => {
                        let count = child
                            .attr("text:c")
                            .and_then(|c| c.parse::<usize>().ok())
                            .unwrap_or(1);
                        out.push_str(&" ".repeat(count));
                    }
                    "tab" => out.push('\t'),
                    "line-break" => out.push('\n'),
                    "note" | "annotation" | "bookmark" | "bookmark-start" | "bookmark-end" => {}
                    _ => collect(child, out),
                },
                Node::Other(_) => {}
            }
        }
    }

    let mut out = String::new();
    collect(p, &mut out);
    out
}

/// 1行分のテキストを`text:p`要素に変換
///
/// 連続する空白は`text:s`、タブは`text:tab`で表します。
fn encode_paragraph(line: &str) -> Element {
    fn flush(p: &mut Element, buf: &mut String) {
        if !buf.is_empty() {
            p.push_text(buf);
            buf.clear();
        }
    }

    let mut p = Element::new("text:p");
    let mut buf = String::new();
    let mut chars = line.chars().peekable();
    let mut at_start = true;

    while let Some(ch) = chars.next() {
        match ch {
            ' ' => {
                let mut count = 1;
                while chars.peek() == Some(&' ') {
                    chars.next();
                    count += 1;
                }
                // 段落先頭の空白はすべて`text:s`にする
                let literal = usize::from(!at_start);
                if literal == 1 {
                    buf.push(' ');
                }
                let extra = count - literal;
                if extra > 0 {
                    flush(&mut p, &mut buf);
                    let mut space = Element::new("text:s");
                    if extra > 1 {
                        space.set_attr("text:c", &extra.to_string());
                    }
                    p.push_element(space);
                }
            }
            '\t' => {
                flush(&mut p, &mut buf);
                p.push_element(Element::new("text:tab"));
            }
            _ => buf.push(ch),
        }
        at_start = false;
    }
    flush(&mut p, &mut buf);
    p
}

/// セルの値・数式・子要素を消去してから新しい値を書き込む
fn write_value(cell: &mut Element, value: &CellValue) {
    cell.remove_attrs_where(|k| {
        k == "table:formula"
            || local_name(k) == "value-type"
            || (k.starts_with("office:")
                && matches!(
                    local_name(k),
                    "value"
                        | "string-value"
                        | "date-value"
                        | "time-value"
                        | "boolean-value"
                        | "currency"
                ))
    });
    cell.children.clear();

    match value {
        CellValue::Number(n) => {
            cell.set_attr("office:value-type", "float");
            cell.set_attr("office:value", &n.to_string());
            let mut p = Element::new("text:p");
            p.push_text(&format_number(*n));
            cell.push_element(p);
        }
        CellValue::Text(text) if !text.is_empty() => {
            cell.set_attr("office:value-type", "string");
            for line in text.split('\n') {
                cell.push_element(encode_paragraph(line));
            }
        }
        CellValue::Text(_) | CellValue::Empty => {}
    }
}

/// 論理列`col`に対応する単独セルの`children`内の位置を返す
///
/// 繰り返しセルの中に当たる場合は前・対象・後ろの3つに分割し、
/// 行の末尾を越える場合は空セルで埋めて延長します。
fn cell_position(row: &mut Element, col: usize) -> usize {
    let mut logical = 0;
    for idx in 0..row.children.len() {
        let repeat = match &row.children[idx] {
            Node::Element(el) if is_cell(el) => repeat_count(el, COLUMNS_REPEATED),
            _ => continue,
        };
        if col < logical + repeat {
            let offset = col - logical;
            if repeat > 1 {
                split_run(row, idx, offset, repeat);
                return idx + usize::from(offset > 0);
            }
            return idx;
        }
        logical += repeat;
    }

    let gap = col - logical;
    if gap > 0 {
        let mut padding = Element::new("table:table-cell");
        set_repeat(&mut padding, COLUMNS_REPEATED, gap);
        row.push_element(padding);
    }
    row.push_element(Element::new("table:table-cell"));
    row.children.len() - 1
}

fn split_run(row: &mut Element, idx: usize, offset: usize, repeat: usize) {
    let Some(Node::Element(run)) = row.children.get(idx).cloned() else {
        return;
    };

    let mut parts = Vec::with_capacity(3);
    if offset > 0 {
        let mut before = run.clone();
        set_repeat(&mut before, COLUMNS_REPEATED, offset);
        parts.push(Node::Element(before));
    }
    let mut target = run.clone();
    target.remove_attr(COLUMNS_REPEATED);
    parts.push(Node::Element(target));
    let rest = repeat - offset - 1;
    if rest > 0 {
        let mut after = run;
        set_repeat(&mut after, COLUMNS_REPEATED, rest);
        parts.push(Node::Element(after));
    }
    row.children.splice(idx..=idx, parts);
}
