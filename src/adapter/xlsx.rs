//! XLSX Adapter
//!
//! 計算済みの値（calamineで読み込む値ビュー）と、数式を保持したシートXML
//! （書き戻し用の数式ビュー）の2つを扱います。
//!
//! 行の位置はシート上の0始まりの絶対行番号です（`r="5"`の行は位置4）。
//! 書き込みは数式ビューにだけ行い、値ビューは読み込み時点のスナップショットとして扱います。

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use once_cell::sync::Lazy;
use regex::Regex;

use super::{SheetAdapter, SheetOptions};
use crate::api::SpreadsheetFormat;
use crate::error::{ReconcileError, Result};
use crate::index::{DecodedRow, RowIndex};
use crate::package::xml::{local_name, Element, Node, XmlDocument};
use crate::package::{Package, PackageChanges};
use crate::types::{CellCoord, CellValue};

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const CALC_CHAIN_PART: &str = "xl/calcChain.xml";

/// `HYPERLINK(<URL>, "<キー>")`（区切りは`,`または`;`）
static LINK_FORMULA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)HYPERLINK\(\s*[^,;]+[,;]\s*"([^"]+)"\s*\)"#)
        .expect("link formula pattern must compile")
});

/// A1形式のセル参照（`$`付きの絶対指定を含む）
static CELL_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\$?)([A-Z]{1,3})(\$?)([0-9]+)").expect("cell reference pattern must compile")
});

/// シートの最大列数・最大行数
const MAX_COLUMNS: i64 = 16_384;
const MAX_ROWS: i64 = 1_048_576;

/// リンク数式に埋め込まれたキーを取り出す
///
/// 数式ではない値や、パターンに一致しない数式の場合は`None`を返します。
///
/// インデックス構築では、キー列に数式を持つ行だけがこの関数の結果で判定され、
/// `None`の行はキー照合から除外されます。キー列が数式ではなく値だけのセルは、
/// 計算済みの値をそのままキーとして使います。
///
/// # 使用例
///
/// ```rust
/// use sheetsync::extract_key;
///
/// let formula = r#"=HYPERLINK("https://attack.mitre.org/techniques/T1055","T1055")"#;
/// assert_eq!(extract_key(formula).as_deref(), Some("T1055"));
/// assert_eq!(extract_key("T1055"), None);
/// ```
pub fn extract_key(formula: &str) -> Option<String> {
    LINK_FORMULA
        .captures(formula)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|key| !key.is_empty())
}

/// XLSXファイルのアダプタ
pub struct XlsxAdapter {
    package: Package,
    workbook: XmlDocument,
    sheet_part: String,
    sheet: XmlDocument,
    prefix: String,
    options: SheetOptions,
    rows: Vec<DecodedRow>,
    index: RowIndex,
    formulas_removed: usize,
}

impl XlsxAdapter {
    /// ファイルを開き、値ビューからインデックスを構築
    ///
    /// # 引数
    ///
    /// * `path` - `.xlsx`ファイルのパス
    /// * `options` - シート名・ヘッダー行数など
    ///
    /// # 戻り値
    ///
    /// シートが値ビュー・数式ビューのどちらかに存在しない場合は
    /// `ReconcileError::SheetNotFound`
    pub fn open(path: impl AsRef<Path>, options: SheetOptions) -> Result<Self> {
        let path = path.as_ref();
        let adapter = Self::from_package(Package::open(path)?, options)?;
        log::info!(
            "opened {} (sheet '{}', {} rows, {} keys, {} excluded)",
            path.display(),
            adapter.options.sheet_name,
            adapter.rows.len(),
            adapter.index.len(),
            adapter.index.excluded()
        );
        Ok(adapter)
    }

    /// メモリ上のバイト列から開く
    pub fn from_bytes(bytes: Vec<u8>, options: SheetOptions) -> Result<Self> {
        Self::from_package(Package::from_bytes(bytes)?, options)
    }

    fn from_package(package: Package, options: SheetOptions) -> Result<Self> {
        let rows = read_values(package.bytes(), &options)?;

        let workbook = parse_part(&package, WORKBOOK_PART)?;
        let sheet_part = locate_sheet_part(&package, &workbook, &options.sheet_name)?;
        let sheet = parse_part(&package, &sheet_part)?;
        let prefix = sheet
            .root()
            .map(|root| prefix_of(&root.name).to_string())
            .unwrap_or_default();

        let mut adapter = Self {
            package,
            workbook,
            sheet_part,
            sheet,
            prefix,
            options,
            rows,
            index: RowIndex::default(),
            formulas_removed: 0,
        };
        adapter.index = adapter.build_index()?;
        Ok(adapter)
    }

    /// キー列に数式がある行はリンク数式からキーを取り出し、失敗した行は除外する
    ///
    /// 数式を持たないキーセルは値ビューの値がそのままキーになります。
    fn build_index(&self) -> Result<RowIndex> {
        let key_column = self.options.schema.key_column();
        let formulas = self.key_formulas(key_column as u32)?;

        let mut excluded = 0;
        let mut rows = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            match formulas.get(&row.position) {
                Some(formula) => match extract_key(formula) {
                    Some(key) => {
                        let mut row = row.clone();
                        if let Some(slot) = row.values.get_mut(key_column) {
                            *slot = CellValue::Text(key);
                        }
                        rows.push(row);
                    }
                    None => {
                        log::debug!(
                            "row {}: no key in formula '{}', excluded",
                            row.position + 1,
                            formula
                        );
                        excluded += 1;
                    }
                },
                None => rows.push(row.clone()),
            }
        }

        Ok(RowIndex::build(rows, key_column).with_excluded(excluded))
    }

    /// 位置 -> キー列の数式テキスト
    fn key_formulas(&self, key_column: u32) -> Result<HashMap<usize, String>> {
        let sheet_data = self.sheet_data()?;
        let mut formulas = HashMap::new();
        for (position, number) in row_numbers(sheet_data) {
            let Some(row) = sheet_data.element_at(position) else { continue };
            let cell = cell_columns(row)
                .into_iter()
                .find(|(_, col)| *col == key_column)
                .and_then(|(pos, _)| row.element_at(pos));
            let formula = cell
                .and_then(|c| c.child("f"))
                .map(|f| f.text_content())
                .filter(|text| !text.trim().is_empty());
            if let Some(formula) = formula {
                formulas.insert(number as usize - 1, formula);
            }
        }
        Ok(formulas)
    }

    /// 値を書き込んだ際に消去した数式の数
    pub fn formulas_removed(&self) -> usize {
        self.formulas_removed
    }

    /// 末尾から連続する空行を削除し、削除した行数を返す
    ///
    /// 値・数式のどちらも持たない行を空とみなします（書式だけの行も削除対象）。
    /// 途中の空行は後続の行番号と数式の参照がずれるため削除しません。
    pub fn remove_empty_trailing_rows(&mut self) -> Result<usize> {
        let sheet_data = self.sheet_data_mut()?;
        let mut removed = 0;
        while let Some(position) = sheet_data
            .children
            .iter()
            .rposition(|node| matches!(node, Node::Element(el) if el.local_name() == "row"))
        {
            if sheet_data.element_at(position).is_some_and(row_has_content) {
                break;
            }
            sheet_data.children.remove(position);
            removed += 1;
        }
        if removed > 0 {
            log::debug!("removed {} empty trailing rows", removed);
        }
        Ok(removed)
    }

    fn sheet_data(&self) -> Result<&Element> {
        self.sheet
            .root()
            .and_then(|root| root.child("sheetData"))
            .ok_or_else(|| ReconcileError::xml("worksheet has no sheetData"))
    }

    fn sheet_data_mut(&mut self) -> Result<&mut Element> {
        self.sheet
            .root_mut()
            .and_then(|root| root.child_mut("sheetData"))
            .ok_or_else(|| ReconcileError::xml("worksheet has no sheetData"))
    }

    /// 値か数式を持つ最後の行の番号（1始まり、なければ0）
    fn last_used_row(&self) -> Result<u32> {
        let sheet_data = self.sheet_data()?;
        Ok(row_numbers(sheet_data)
            .into_iter()
            .filter(|(pos, _)| sheet_data.element_at(*pos).is_some_and(row_has_content))
            .map(|(_, number)| number)
            .max()
            .unwrap_or(0))
    }

    /// `<dimension ref>`を実際のセル範囲に合わせる
    fn refresh_dimension(&mut self) -> Result<()> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        let sheet_data = self.sheet_data()?;
        for (position, number) in row_numbers(sheet_data) {
            let Some(row) = sheet_data.element_at(position) else { continue };
            for (_, col) in cell_columns(row) {
                let row_index = number - 1;
                bounds = Some(match bounds {
                    None => (row_index, col, row_index, col),
                    Some((r0, c0, r1, c1)) => {
                        (r0.min(row_index), c0.min(col), r1.max(row_index), c1.max(col))
                    }
                });
            }
        }

        let reference = match bounds {
            Some((r0, c0, r1, c1)) if (r0, c0) != (r1, c1) => format!(
                "{}:{}",
                CellCoord::new(r0, c0).to_a1_notation(),
                CellCoord::new(r1, c1).to_a1_notation()
            ),
            Some((r0, c0, _, _)) => CellCoord::new(r0, c0).to_a1_notation(),
            None => "A1".to_string(),
        };

        if let Some(dimension) = self
            .sheet
            .root_mut()
            .and_then(|root| root.child_mut("dimension"))
        {
            dimension.set_attr("ref", &reference);
        }
        Ok(())
    }

    /// 書き込み先のセルにかかる共有数式・配列数式を、ほかのセルが壊れない形にほどく
    ///
    /// - 共有数式の親セル: グループ内の子セルをそれぞれ独立した数式にする
    /// - 配列数式の範囲内（親セル以外）: 配列数式を消去し、計算済みの値だけを残す
    ///
    /// 書き込み先そのものの数式は`write_value`が消去します。
    fn release_formula_groups(&mut self, target: CellCoord) -> Result<()> {
        let prefix = self.prefix.clone();
        let sheet_data = self.sheet_data_mut()?;
        let cells = formula_cells(sheet_data);

        let master = cells.iter().find(|c| {
            c.coord == target && c.kind == "shared" && c.range.is_some() && c.shared_index.is_some()
        });
        if let Some(master) = master {
            let mut expanded = 0;
            for dependent in cells.iter().filter(|c| {
                c.coord != target && c.kind == "shared" && c.shared_index == master.shared_index
            }) {
                let formula = shift_formula(
                    &master.text,
                    i64::from(dependent.coord.row) - i64::from(master.coord.row),
                    i64::from(dependent.coord.col) - i64::from(master.coord.col),
                );
                let Some(f) = sheet_data
                    .element_at_mut(dependent.row)
                    .and_then(|row| row.element_at_mut(dependent.cell))
                    .and_then(|cell| cell.child_mut("f"))
                else {
                    continue;
                };
                *f = Element::new(format!("{}f", prefix));
                f.push_text(&formula);
                expanded += 1;
            }
            log::debug!(
                "expanded shared formula {} into {} cells before writing {}",
                master.text,
                expanded,
                target.to_a1_notation()
            );
        }

        let mut dissolved = 0;
        for array in cells.iter().filter(|c| {
            c.kind == "array"
                && c.coord != target
                && c.range.is_some_and(|range| range_contains(range, target))
        }) {
            let Some(cell) = sheet_data
                .element_at_mut(array.row)
                .and_then(|row| row.element_at_mut(array.cell))
            else {
                continue;
            };
            cell.children
                .retain(|node| !matches!(node, Node::Element(el) if el.local_name() == "f"));
            dissolved += 1;
            log::warn!(
                "writing {} inside array formula at {}; the array keeps its computed values only",
                target.to_a1_notation(),
                array.coord.to_a1_notation()
            );
        }
        self.formulas_removed += dissolved;
        Ok(())
    }

    /// 保存用の`xl/workbook.xml`（開いたときに再計算させる）
    fn workbook_with_full_calc(&self) -> Result<Vec<u8>> {
        let mut workbook = self.workbook.clone();
        let root = workbook
            .root_mut()
            .ok_or_else(|| ReconcileError::xml("workbook has no root element"))?;

        match root.child_mut("calcPr") {
            Some(calc) => calc.set_attr("fullCalcOnLoad", "1"),
            None => {
                let mut calc = Element::new(format!("{}calcPr", prefix_of(&root.name)));
                calc.set_attr("fullCalcOnLoad", "1");
                // CT_Workbookの要素順でdefinedNamesの後ろ
                let position = root
                    .children
                    .iter()
                    .rposition(|node| {
                        matches!(node, Node::Element(el) if matches!(
                            el.local_name(),
                            "sheets" | "functionGroups" | "externalReferences" | "definedNames"
                        ))
                    })
                    .map_or(root.children.len(), |p| p + 1);
                root.children.insert(position, Node::Element(calc));
            }
        }
        workbook.to_bytes()
    }
}

impl SheetAdapter for XlsxAdapter {
    fn format(&self) -> SpreadsheetFormat {
        SpreadsheetFormat::Xlsx
    }

    fn decode_rows(&self) -> Vec<DecodedRow> {
        self.rows.clone()
    }

    fn row_index(&self) -> &RowIndex {
        &self.index
    }

    fn set_cell(&mut self, row: usize, col: usize, value: &CellValue) -> Result<()> {
        let number = u32::try_from(row + 1)
            .map_err(|_| ReconcileError::xml(format!("row {} out of range", row)))?;
        let col = u32::try_from(col)
            .map_err(|_| ReconcileError::xml(format!("column {} out of range", col)))?;
        let prefix = self.prefix.clone();
        self.release_formula_groups(CellCoord::new(number - 1, col))?;

        let sheet_data = self.sheet_data_mut()?;
        let row_pos = find_or_create_row(sheet_data, &prefix, number);
        let row_el = sheet_data
            .element_at_mut(row_pos)
            .ok_or_else(|| ReconcileError::xml(format!("row {} missing", number)))?;
        row_el.remove_attr("spans");

        let cell_pos = find_or_create_cell(row_el, &prefix, number, col);
        let cell = row_el
            .element_at_mut(cell_pos)
            .ok_or_else(|| ReconcileError::xml(format!("cell ({}, {}) missing", row, col)))?;
        if write_value(cell, &prefix, value) {
            self.formulas_removed += 1;
        }
        Ok(())
    }

    fn append_row(&mut self, values: &[CellValue]) -> Result<()> {
        let header_rows = u32::try_from(self.options.header_rows).unwrap_or(u32::MAX);
        let target = self.last_used_row()?.max(header_rows) as usize;
        for (col, value) in values.iter().enumerate() {
            if !value.is_empty() {
                self.set_cell(target, col, value)?;
            }
        }
        log::debug!("appended row {}", target + 1);
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.remove_empty_trailing_rows()?;
        self.refresh_dimension()
    }

    fn persist(&self, dest: &Path) -> Result<()> {
        let mut changes = PackageChanges::new();
        changes.replace(self.sheet_part.clone(), self.sheet.to_bytes()?);
        changes.replace(WORKBOOK_PART, self.workbook_with_full_calc()?);

        if self.formulas_removed > 0 && self.package.read_part(CALC_CHAIN_PART)?.is_some() {
            changes.remove(CALC_CHAIN_PART);
            if let Some(bytes) = self.package.read_part(CONTENT_TYPES_PART)? {
                changes.replace(
                    CONTENT_TYPES_PART,
                    without_children(&bytes, |el| {
                        el.local_name() == "Override"
                            && el.attr("PartName").as_deref() == Some("/xl/calcChain.xml")
                    })?,
                );
            }
            if let Some(bytes) = self.package.read_part(WORKBOOK_RELS_PART)? {
                changes.replace(
                    WORKBOOK_RELS_PART,
                    without_children(&bytes, |el| {
                        el.attr("Target")
                            .is_some_and(|target| target.ends_with("calcChain.xml"))
                    })?,
                );
            }
            log::info!(
                "dropped calculation chain after clearing {} formulas",
                self.formulas_removed
            );
        }

        self.package.write_to(dest, &changes)
    }
}

/// 値ビューを読み込み、ヘッダー行より後ろをデコード
fn read_values(bytes: &[u8], options: &SheetOptions) -> Result<Vec<DecodedRow>> {
    let mut workbook: Xlsx<_> =
        open_workbook_from_rs(Cursor::new(bytes)).map_err(calamine::Error::Xlsx)?;

    if !workbook.sheet_names().iter().any(|n| n == &options.sheet_name) {
        return Err(ReconcileError::SheetNotFound {
            sheet: options.sheet_name.clone(),
        });
    }

    let range = workbook
        .worksheet_range(&options.sheet_name)
        .map_err(calamine::Error::Xlsx)?;
    let (row_offset, col_offset) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut rows = Vec::new();
    for (i, cells) in range.rows().enumerate() {
        let position = row_offset + i;
        if position < options.header_rows {
            continue;
        }
        let mut values = vec![CellValue::Empty; options.column_limit];
        for (j, cell) in cells.iter().enumerate() {
            let col = col_offset + j;
            if col >= options.column_limit {
                break;
            }
            values[col] = decode_data(cell);
        }
        rows.push(DecodedRow::new(position, values));
    }
    Ok(rows)
}

fn decode_data(cell: &Data) -> CellValue {
    match cell {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::text(s.as_str()),
        Data::Bool(b) => CellValue::text(if *b { "TRUE" } else { "FALSE" }),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::text(s.as_str()),
        Data::Error(e) => CellValue::text(e.to_string()),
        Data::Empty => CellValue::Empty,
    }
}

fn parse_part(package: &Package, name: &str) -> Result<XmlDocument> {
    let bytes = package
        .read_part(name)?
        .ok_or_else(|| ReconcileError::xml(format!("{} not found in package", name)))?;
    XmlDocument::parse(&bytes)
}

/// `<sheet name r:id>`とワークブックのリレーションからシートのパートを求める
fn locate_sheet_part(package: &Package, workbook: &XmlDocument, sheet_name: &str) -> Result<String> {
    let not_found = || ReconcileError::SheetNotFound {
        sheet: sheet_name.to_string(),
    };

    let sheet = workbook
        .root()
        .and_then(|root| root.child("sheets"))
        .and_then(|sheets| {
            sheets
                .elements()
                .find(|el| el.local_name() == "sheet" && el.attr("name").as_deref() == Some(sheet_name))
        })
        .ok_or_else(not_found)?;

    let rel_id = sheet
        .attributes
        .iter()
        .find(|(k, _)| k.contains(':') && local_name(k) == "id")
        .and_then(|(k, _)| sheet.attr(k))
        .ok_or_else(|| ReconcileError::xml(format!("sheet '{}' has no relationship id", sheet_name)))?;

    let rels = parse_part(package, WORKBOOK_RELS_PART)?;
    let target = rels
        .root()
        .and_then(|root| {
            root.elements()
                .find(|el| el.attr("Id").as_deref() == Some(rel_id.as_str()))
        })
        .and_then(|rel| rel.attr("Target"))
        .ok_or_else(not_found)?;

    Ok(match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    })
}

/// 名前空間接頭辞（`:`を含む、なければ空文字列）
fn prefix_of(name: &str) -> &str {
    name.rfind(':').map_or("", |i| &name[..=i])
}

/// (`children`内の位置, 1始まりの行番号)
fn row_numbers(sheet_data: &Element) -> Vec<(usize, u32)> {
    let mut out = Vec::new();
    let mut previous = 0;
    for (position, node) in sheet_data.children.iter().enumerate() {
        let Node::Element(el) = node else { continue };
        if el.local_name() != "row" {
            continue;
        }
        // `r`は省略可能で、その場合は直前の行の次
        let number = el
            .attr("r")
            .and_then(|r| r.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(previous + 1);
        out.push((position, number));
        previous = number;
    }
    out
}

/// (`children`内の位置, 0始まりの列番号)
fn cell_columns(row: &Element) -> Vec<(usize, u32)> {
    let mut out = Vec::new();
    let mut previous: Option<u32> = None;
    for (position, node) in row.children.iter().enumerate() {
        let Node::Element(el) = node else { continue };
        if el.local_name() != "c" {
            continue;
        }
        let col = el
            .attr("r")
            .and_then(|r| CellCoord::from_a1_notation(&r))
            .map(|coord| coord.col)
            .unwrap_or_else(|| previous.map_or(0, |p| p + 1));
        out.push((position, col));
        previous = Some(col);
    }
    out
}

fn find_or_create_row(sheet_data: &mut Element, prefix: &str, number: u32) -> usize {
    let rows = row_numbers(sheet_data);
    if let Some(&(position, _)) = rows.iter().find(|(_, n)| *n == number) {
        return position;
    }

    let position = match rows.iter().find(|(_, n)| *n > number) {
        Some(&(position, _)) => position,
        None => rows.last().map_or(sheet_data.children.len(), |(p, _)| p + 1),
    };
    let mut row = Element::new(format!("{}row", prefix));
    row.set_attr("r", &number.to_string());
    sheet_data.children.insert(position, Node::Element(row));
    position
}

fn find_or_create_cell(row: &mut Element, prefix: &str, number: u32, col: u32) -> usize {
    let cells = cell_columns(row);
    if let Some(&(position, _)) = cells.iter().find(|(_, c)| *c == col) {
        return position;
    }

    let position = match cells.iter().find(|(_, c)| *c > col) {
        Some(&(position, _)) => position,
        None => cells.last().map_or(row.children.len(), |(p, _)| p + 1),
    };
    let mut cell = Element::new(format!("{}c", prefix));
    cell.set_attr("r", &CellCoord::new(number - 1, col).to_a1_notation());
    row.children.insert(position, Node::Element(cell));
    position
}

fn cell_has_content(cell: &Element) -> bool {
    cell.elements().any(|el| match el.local_name() {
        "f" => true,
        "v" | "is" => !el.text_content().is_empty(),
        _ => false,
    })
}

fn row_has_content(row: &Element) -> bool {
    row.elements()
        .filter(|el| el.local_name() == "c")
        .any(cell_has_content)
}

/// セルの型・数式・値を消去してから書き込み、数式を消去したかどうかを返す
///
/// 書式（`s`属性）は維持します。
fn write_value(cell: &mut Element, prefix: &str, value: &CellValue) -> bool {
    let had_formula = cell.child("f").is_some();
    cell.remove_attrs_where(|k| matches!(k, "t" | "cm" | "vm"));
    cell.children.clear();

    match value {
        CellValue::Number(n) => {
            let mut v = Element::new(format!("{}v", prefix));
            v.push_text(&n.to_string());
            cell.push_element(v);
        }
        CellValue::Text(text) if !text.is_empty() => {
            cell.set_attr("t", "inlineStr");
            let mut t = Element::new(format!("{}t", prefix));
            t.set_attr("xml:space", "preserve");
            t.push_text(text);
            let mut is = Element::new(format!("{}is", prefix));
            is.push_element(t);
            cell.push_element(is);
        }
        CellValue::Text(_) | CellValue::Empty => {}
    }
    had_formula
}

/// 数式を持つセル
struct FormulaCell {
    /// 行要素の`sheetData`内の位置
    row: usize,
    /// セル要素の行要素内の位置
    cell: usize,
    coord: CellCoord,
    /// `t`属性（`shared`・`array`、通常の数式は空）
    kind: String,
    shared_index: Option<String>,
    range: Option<(CellCoord, CellCoord)>,
    text: String,
}

fn formula_cells(sheet_data: &Element) -> Vec<FormulaCell> {
    let mut out = Vec::new();
    for (row_pos, number) in row_numbers(sheet_data) {
        let Some(row) = sheet_data.element_at(row_pos) else { continue };
        for (cell_pos, col) in cell_columns(row) {
            let Some(f) = row.element_at(cell_pos).and_then(|cell| cell.child("f")) else {
                continue;
            };
            out.push(FormulaCell {
                row: row_pos,
                cell: cell_pos,
                coord: CellCoord::new(number - 1, col),
                kind: f.attr("t").unwrap_or_default(),
                shared_index: f.attr("si"),
                range: f.attr("ref").and_then(|r| parse_range(&r)),
                text: f.text_content(),
            });
        }
    }
    out
}

/// `ref`属性の範囲（`F2:F3`または単一セル）
fn parse_range(reference: &str) -> Option<(CellCoord, CellCoord)> {
    let (start, end) = reference.split_once(':').unwrap_or((reference, reference));
    Some((
        CellCoord::from_a1_notation(start)?,
        CellCoord::from_a1_notation(end)?,
    ))
}

fn range_contains((start, end): (CellCoord, CellCoord), coord: CellCoord) -> bool {
    (start.row..=end.row).contains(&coord.row) && (start.col..=end.col).contains(&coord.col)
}

/// 数式中の相対参照を行・列方向にずらす
///
/// 文字列リテラルと引用符付きのシート名の中は変更しません。
/// シートの範囲外に出た参照は`#REF!`になります。
fn shift_formula(formula: &str, row_offset: i64, col_offset: i64) -> String {
    let mut out = String::with_capacity(formula.len());
    let mut rest = formula;
    while let Some(start) = rest.find(|c: char| c == '"' || c == '\'') {
        out.push_str(&shift_references(&rest[..start], row_offset, col_offset));
        let quote = &rest[start..start + 1];
        let end = rest[start + 1..]
            .find(quote)
            .map_or(rest.len(), |i| start + i + 2);
        out.push_str(&rest[start..end]);
        rest = &rest[end..];
    }
    out.push_str(&shift_references(rest, row_offset, col_offset));
    out
}

fn shift_references(segment: &str, row_offset: i64, col_offset: i64) -> String {
    CELL_REFERENCE
        .replace_all(segment, |caps: &regex::Captures| {
            let whole = &caps[0];
            let start = caps.get(0).map_or(0, |m| m.start());
            let before = segment[..start].chars().next_back();
            let after = segment[start + whole.len()..].chars().next();
            // 関数名・定義名・シート名の一部
            let is_name = before.is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.'))
                || after.is_some_and(|c| {
                    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '(' | '!')
                });
            let (Some(col), Ok(row)) = (
                CellCoord::col_letter_to_index(&caps[2]),
                caps[4].parse::<i64>(),
            ) else {
                return whole.to_string();
            };
            if is_name || i64::from(col) >= MAX_COLUMNS || row > MAX_ROWS {
                return whole.to_string();
            }

            let col = if caps[1].is_empty() {
                i64::from(col) + col_offset
            } else {
                i64::from(col)
            };
            let row = if caps[3].is_empty() { row + row_offset } else { row };
            if !(0..MAX_COLUMNS).contains(&col) || !(1..=MAX_ROWS).contains(&row) {
                return "#REF!".to_string();
            }
            format!(
                "{}{}{}{}",
                &caps[1],
                CellCoord::col_index_to_letter(col as u32),
                &caps[3],
                row
            )
        })
        .into_owned()
}

/// 条件に一致するルート直下の子要素を削除したXMLを返す
fn without_children(bytes: &[u8], predicate: impl Fn(&Element) -> bool) -> Result<Vec<u8>> {
    let mut doc = XmlDocument::parse(bytes)?;
    if let Some(root) = doc.root_mut() {
        root.children
            .retain(|node| !matches!(node, Node::Element(el) if predicate(el)));
    }
    doc.to_bytes()
}
