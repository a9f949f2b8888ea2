//! Package Module
//!
//! スプレッドシートのコンテナ（ZIPアーカイブ）の読み込みと書き戻し。
//! 変更していないエントリは圧縮済みのまま複製し、変更したエントリだけを再圧縮します。
//! 書き出しは一時ファイル経由で行い、完了後に保存先へアトミックに置き換えます。

pub(crate) mod xml;

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File, Permissions};
use std::io::{Cursor, Read, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{ReconcileError, Result};
use crate::security::{validate_zip_path, SecurityConfig};

/// メモリ上に読み込んだコンテナ
pub(crate) struct Package {
    bytes: Vec<u8>,
    /// 読み込んだファイルの権限（バイト列から生成した場合は`None`）
    permissions: Option<Permissions>,
}

/// 書き戻し時に適用する変更
#[derive(Debug, Default)]
pub(crate) struct PackageChanges {
    replaced: BTreeMap<String, Vec<u8>>,
    removed: HashSet<String>,
}

impl PackageChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// エントリの内容を置き換える（存在しない場合は末尾に追加）
    pub fn replace(&mut self, name: impl Into<String>, data: Vec<u8>) {
        self.replaced.insert(name.into(), data);
    }

    /// エントリを削除する
    pub fn remove(&mut self, name: impl Into<String>) {
        self.removed.insert(name.into());
    }
}

impl Package {
    /// ファイルを読み込む
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let permissions = file.metadata()?.permissions();
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let mut package = Self::from_bytes(bytes)?;
        package.permissions = Some(permissions);
        Ok(package)
    }

    /// バイト列からコンテナを生成し、セキュリティ制限を検証
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let security_config = SecurityConfig::default();

        if bytes.len() as u64 > security_config.max_input_file_size {
            return Err(ReconcileError::SecurityViolation(format!(
                "Input file size exceeds maximum: {} bytes (max: {} bytes)",
                bytes.len(),
                security_config.max_input_file_size
            )));
        }

        let package = Self {
            bytes,
            permissions: None,
        };
        let mut archive = package.archive()?;

        if archive.len() > security_config.max_file_count {
            return Err(ReconcileError::SecurityViolation(format!(
                "ZIP archive contains too many files: {} (max: {})",
                archive.len(),
                security_config.max_file_count
            )));
        }

        let mut total_decompressed_size = 0u64;
        for i in 0..archive.len() {
            let file = archive.by_index(i).map_err(ReconcileError::zip)?;

            let file_name = file.name();
            validate_zip_path(file_name).map_err(|e| {
                ReconcileError::SecurityViolation(format!("Invalid ZIP path: {}", e))
            })?;

            let file_size = file.size();
            if file_size > security_config.max_file_size {
                return Err(ReconcileError::SecurityViolation(format!(
                    "File '{}' exceeds maximum size: {} bytes (max: {} bytes)",
                    file_name, file_size, security_config.max_file_size
                )));
            }

            total_decompressed_size = total_decompressed_size
                .checked_add(file_size)
                .ok_or_else(|| {
                    ReconcileError::SecurityViolation(
                        "Total decompressed size calculation overflow".to_string(),
                    )
                })?;

            if total_decompressed_size > security_config.max_decompressed_size {
                return Err(ReconcileError::SecurityViolation(format!(
                    "Total decompressed size exceeds maximum: {} bytes (max: {} bytes)",
                    total_decompressed_size, security_config.max_decompressed_size
                )));
            }
        }

        Ok(package)
    }

    /// 元のファイルのバイト列
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn archive(&self) -> Result<ZipArchive<Cursor<&[u8]>>> {
        ZipArchive::new(Cursor::new(self.bytes.as_slice())).map_err(ReconcileError::zip)
    }

    /// エントリを読み込む（存在しない場合は`None`）
    pub fn read_part(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let mut archive = self.archive()?;
        let mut file = match archive.by_name(name) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(ReconcileError::zip(e)),
        };
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(Some(data))
    }

    /// 変更を適用したコンテナを`dest`に書き出す
    ///
    /// 書き込みが完了するまで`dest`には触れません。
    /// 保存先が既にあればその権限を、なければ読み込んだファイルの権限を引き継ぎます。
    pub fn write_to(&self, dest: &Path, changes: &PackageChanges) -> Result<()> {
        let dir = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;

        {
            let mut archive = self.archive()?;
            let mut writer = ZipWriter::new(tmp.as_file_mut());
            let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
            let mut written = HashSet::new();

            for i in 0..archive.len() {
                let file = archive.by_index_raw(i).map_err(ReconcileError::zip)?;
                let name = file.name().to_string();

                if changes.removed.contains(&name) {
                    continue;
                }

                match changes.replaced.get(&name) {
                    Some(data) => {
                        drop(file);
                        writer
                            .start_file(name.as_str(), options)
                            .map_err(ReconcileError::zip)?;
                        writer.write_all(data)?;
                    }
                    None => writer.raw_copy_file(file).map_err(ReconcileError::zip)?,
                }
                written.insert(name);
            }

            for (name, data) in &changes.replaced {
                if written.contains(name) || changes.removed.contains(name) {
                    continue;
                }
                writer
                    .start_file(name.as_str(), options)
                    .map_err(ReconcileError::zip)?;
                writer.write_all(data)?;
            }

            writer.finish().map_err(ReconcileError::zip)?;
        }

        let permissions = fs::metadata(dest)
            .map(|meta| meta.permissions())
            .ok()
            .or_else(|| self.permissions.clone());
        if let Some(permissions) = permissions {
            tmp.as_file().set_permissions(permissions)?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(dest).map_err(|e| ReconcileError::Io(e.error))?;
        log::info!("wrote {}", dest.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut data = Vec::new();
        {
            let mut zip = ZipWriter::new(Cursor::new(&mut data));
            for (name, content) in entries {
                let options = FileOptions::default().compression_method(CompressionMethod::Stored);
                zip.start_file(*name, options).unwrap();
                zip.write_all(content).unwrap();
            }
            zip.finish().unwrap();
        }
        data
    }

    #[test]
    fn test_read_part() {
        let package = Package::from_bytes(build_zip(&[("a.xml", b"<a/>")])).unwrap();
        assert_eq!(package.read_part("a.xml").unwrap().unwrap(), b"<a/>");
        assert!(package.read_part("missing.xml").unwrap().is_none());
    }

    #[test]
    fn test_write_to_replaces_and_removes() {
        let package = Package::from_bytes(build_zip(&[
            ("mimetype", b"application/test"),
            ("a.xml", b"<a/>"),
            ("b.xml", b"<b/>"),
        ]))
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.zip");
        let mut changes = PackageChanges::new();
        changes.replace("a.xml", b"<a>changed</a>".to_vec());
        changes.remove("b.xml");
        changes.replace("c.xml", b"<c/>".to_vec());
        package.write_to(&dest, &changes).unwrap();

        let written = Package::open(&dest).unwrap();
        assert_eq!(written.read_part("mimetype").unwrap().unwrap(), b"application/test");
        assert_eq!(written.read_part("a.xml").unwrap().unwrap(), b"<a>changed</a>");
        assert!(written.read_part("b.xml").unwrap().is_none());
        assert_eq!(written.read_part("c.xml").unwrap().unwrap(), b"<c/>");

        // mimetypeは先頭のまま
        let mut archive = written.archive().unwrap();
        assert_eq!(archive.by_index(0).unwrap().name(), "mimetype");
    }

    #[cfg(unix)]
    #[test]
    fn test_write_to_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.zip");
        fs::write(&source, build_zip(&[("a.xml", b"<a/>")])).unwrap();
        fs::set_permissions(&source, Permissions::from_mode(0o644)).unwrap();
        let package = Package::open(&source).unwrap();
        let mode = |path: &Path| fs::metadata(path).unwrap().permissions().mode() & 0o777;

        // 新しい保存先は元のファイルの権限
        let dest = dir.path().join("out.zip");
        package.write_to(&dest, &PackageChanges::new()).unwrap();
        assert_eq!(mode(&dest), 0o644);

        // 既存の保存先は自身の権限を保つ
        fs::set_permissions(&dest, Permissions::from_mode(0o640)).unwrap();
        package.write_to(&dest, &PackageChanges::new()).unwrap();
        assert_eq!(mode(&dest), 0o640);

        // 上書き保存も同じ
        package.write_to(&source, &PackageChanges::new()).unwrap();
        assert_eq!(mode(&source), 0o644);
    }

    #[test]
    fn test_path_traversal_rejected() {
        let result = Package::from_bytes(build_zip(&[("../evil.xml", b"x")]));
        assert!(matches!(result, Err(ReconcileError::SecurityViolation(_))));
    }

    #[test]
    fn test_not_a_zip() {
        assert!(matches!(
            Package::from_bytes(b"plain text".to_vec()),
            Err(ReconcileError::Zip(_))
        ));
    }
}
