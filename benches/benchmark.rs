//! パフォーマンスベンチマーク
//!
//! 生成したODS/XLSXファイルに対するインポートとエクスポートの速度を測定します。
//!
//! 実装するベンチマーク:
//! - 読み込み（ハウスキーピング・インデックス構築を含む）とインポート
//! - エクスポートと保存（既存行の更新と新規行の追加）

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_xlsxwriter::Workbook;
use sheetsync::{ChangeCategory, OdsAdapter, Record, ReconcilerBuilder, XlsxAdapter};
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const ROW_COUNTS: [usize; 2] = [500, 5_000];

fn key(i: usize) -> String {
    format!("T{:04}", 1000 + i)
}

/// 評価済みの行を持つXLSXファイルを生成
fn generate_xlsx(rows: usize) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Techniques").unwrap();
    sheet.write_string(0, 1, "ID").unwrap();
    for i in 0..rows {
        let row = (i + 1) as u32;
        sheet.write_string(row, 1, &key(i)).unwrap();
        sheet.write_number(row, 5, (i % 4) as f64).unwrap();
        sheet.write_string(row, 8, "x").unwrap();
        sheet.write_string(row, 12, "in progress").unwrap();
        sheet.write_string(row, 13, "reasoning text").unwrap();
    }
    workbook.save_to_buffer().unwrap()
}

/// 評価済みの行と、末尾に巨大な空行の繰り返しを持つODSファイルを生成
fn generate_ods(rows: usize) -> Vec<u8> {
    let mut body = String::new();
    for i in 0..rows {
        body.push_str(&format!(
            r#"<table:table-row><table:table-cell/><table:table-cell office:value-type="string"><text:p>{}</text:p></table:table-cell><table:table-cell table:number-columns-repeated="3"/><table:table-cell office:value-type="float" office:value="{}"><text:p>{}</text:p></table:table-cell><table:table-cell table:number-columns-repeated="2"/><table:table-cell office:value-type="string"><text:p>x</text:p></table:table-cell><table:table-cell table:number-columns-repeated="3"/><table:table-cell office:value-type="string"><text:p>in progress</text:p></table:table-cell><table:table-cell table:number-columns-repeated="1011"/></table:table-row>"#,
            key(i),
            i % 4,
            i % 4
        ));
    }
    let content = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:table="urn:oasis:names:tc:opendocument:xmlns:table:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0"><office:body><office:spreadsheet><table:table table:name="Techniques">{}<table:table-row table:number-rows-repeated="1048000"><table:table-cell table:number-columns-repeated="1024"/></table:table-row></table:table></office:spreadsheet></office:body></office:document-content>"#,
        body
    );

    let mut data = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut data));
        zip.start_file(
            "mimetype",
            FileOptions::default().compression_method(CompressionMethod::Stored),
        )
        .unwrap();
        zip.write_all(b"application/vnd.oasis.opendocument.spreadsheet")
            .unwrap();
        zip.start_file("content.xml", FileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    data
}

/// 既存キーの半分と同数の新規キーを持つレコード
fn generate_records(rows: usize) -> Vec<Record> {
    (rows / 2..rows + rows / 2)
        .map(|i| {
            let category = if i < rows {
                ChangeCategory::MinorVersionChanges
            } else {
                ChangeCategory::Additions
            };
            let mut record = Record::new(key(i), category);
            record.client.criticality = 2;
            record.flags.availability = true;
            record.refresh_sums();
            record
        })
        .collect()
}

fn benchmark_import(c: &mut Criterion) {
    let reconciler = ReconcilerBuilder::new().build().unwrap();
    let mut group = c.benchmark_group("import");
    group.sample_size(10);

    for rows in ROW_COUNTS {
        let ods = generate_ods(rows);
        let xlsx = generate_xlsx(rows);
        let records = generate_records(rows);

        group.bench_with_input(BenchmarkId::new("ods", rows), &ods, |b, data| {
            b.iter(|| {
                let adapter =
                    OdsAdapter::from_bytes(data.clone(), reconciler.options().clone()).unwrap();
                let mut records = records.clone();
                black_box(reconciler.import(&adapter, &mut records))
            });
        });

        group.bench_with_input(BenchmarkId::new("xlsx", rows), &xlsx, |b, data| {
            b.iter(|| {
                let adapter =
                    XlsxAdapter::from_bytes(data.clone(), reconciler.options().clone()).unwrap();
                let mut records = records.clone();
                black_box(reconciler.import(&adapter, &mut records))
            });
        });
    }

    group.finish();
}

fn benchmark_export(c: &mut Criterion) {
    let reconciler = ReconcilerBuilder::new().build().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let mut group = c.benchmark_group("export");
    group.sample_size(10);

    for rows in ROW_COUNTS {
        let records = generate_records(rows);

        let source = dir.path().join(format!("source-{}.ods", rows));
        std::fs::write(&source, generate_ods(rows)).unwrap();
        let dest = dir.path().join(format!("dest-{}.ods", rows));
        group.bench_function(BenchmarkId::new("ods", rows), |b| {
            b.iter(|| black_box(reconciler.export_file(&source, &dest, &records).unwrap()));
        });

        let source = dir.path().join(format!("source-{}.xlsx", rows));
        std::fs::write(&source, generate_xlsx(rows)).unwrap();
        let dest = dir.path().join(format!("dest-{}.xlsx", rows));
        group.bench_function(BenchmarkId::new("xlsx", rows), |b| {
            b.iter(|| black_box(reconciler.export_file(&source, &dest, &records).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_import, benchmark_export);
criterion_main!(benches);
