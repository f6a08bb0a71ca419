use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::ConsolidateError;
use crate::model::ArchiveEntry;

/// Turns an ordered list of files into one archive.
pub trait Packager {
    fn package(&self, entries: &[ArchiveEntry]) -> Result<Vec<u8>, ConsolidateError>;
}

/// Deflate-compressed ZIP archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipPackager;

impl Packager for ZipPackager {
    fn package(&self, entries: &[ArchiveEntry]) -> Result<Vec<u8>, ConsolidateError> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, entry) in unique_entry_names(entries).into_iter().zip(entries) {
            zip.start_file(name, options)?;
            zip.write_all(&entry.bytes)?;
        }
        Ok(zip.finish()?.into_inner())
    }
}

fn replace_illegal_file_chars(value: &str) -> String {
    value
        .chars()
        .map(|ch| {
            if matches!(ch, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
                || ch.is_control()
            {
                '_'
            } else {
                ch
            }
        })
        .collect()
}

/// Final path component of an upload or attachment name.
pub(crate) fn base_name(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        "arquivo".to_string()
    } else {
        replace_illegal_file_chars(base)
    }
}

fn with_suffix(name: &str, counter: usize) -> String {
    match name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => format!("{stem}_{counter}.{extension}"),
        _ => format!("{name}_{counter}"),
    }
}

/// Entry names in archive order: base names only, later duplicates get
/// `_2`, `_3`, … before the extension.
pub(crate) fn unique_entry_names(entries: &[ArchiveEntry]) -> Vec<String> {
    let mut used = HashSet::new();
    let mut names = Vec::with_capacity(entries.len());
    for entry in entries {
        let base = base_name(&entry.name);
        let mut candidate = base.clone();
        let mut counter = 2;
        while !used.insert(candidate.to_lowercase()) {
            candidate = with_suffix(&base, counter);
            counter += 1;
        }
        names.push(candidate);
    }
    names
}

/// `{token}_{YYYYMMDD}.zip`, with characters illegal in file names replaced.
#[must_use]
pub fn archive_file_name(token: &str, date: NaiveDate) -> String {
    format!(
        "{}_{}.zip",
        replace_illegal_file_chars(token),
        date.format("%Y%m%d")
    )
}

/// First path inside `dir` not taken yet: `name` itself, then `_2`, `_3`, …
/// before the extension.
#[must_use]
pub fn vacant_path(dir: &Path, name: &str) -> PathBuf {
    let mut candidate = dir.join(name);
    let mut counter = 2;
    while candidate.exists() {
        candidate = dir.join(with_suffix(name, counter));
        counter += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use chrono::NaiveDate;
    use zip::ZipArchive;

    use super::{
        Packager, ZipPackager, archive_file_name, base_name, unique_entry_names, vacant_path,
    };
    use crate::model::ArchiveEntry;

    #[test]
    fn archive_name_uses_token_and_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).expect("date should be valid");
        assert_eq!(archive_file_name("sem_nome", date), "sem_nome_20240305.zip");
        assert_eq!(archive_file_name("A/B:C", date), "A_B_C_20240305.zip");
    }

    #[test]
    fn strips_directories_from_names() {
        assert_eq!(base_name("C:\\Users\\ana\\relatorio.pdf"), "relatorio.pdf");
        assert_eq!(base_name("../../etc/passwd"), "passwd");
        assert_eq!(base_name("dir/"), "arquivo");
    }

    #[test]
    fn duplicate_names_get_numbered() {
        let entries = ["a/notes.txt", "b/notes.txt", "notes.txt", "README", "readme"]
            .iter()
            .map(|name| ArchiveEntry::new(*name, Vec::new()))
            .collect::<Vec<_>>();
        assert_eq!(
            unique_entry_names(&entries),
            vec!["notes.txt", "notes_2.txt", "notes_3.txt", "README", "readme_2"]
        );
    }

    #[test]
    fn vacant_path_never_reuses_an_existing_file() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let first = vacant_path(dir.path(), "sem_nome_20240305.zip");
        assert_eq!(first, dir.path().join("sem_nome_20240305.zip"));

        std::fs::write(&first, b"a").expect("archive should be written");
        std::fs::write(dir.path().join("sem_nome_20240305_2.zip"), b"b")
            .expect("archive should be written");
        assert_eq!(
            vacant_path(dir.path(), "sem_nome_20240305.zip"),
            dir.path().join("sem_nome_20240305_3.zip")
        );
    }

    #[test]
    fn zip_keeps_entry_order_and_bytes() {
        let entries = vec![
            ArchiveEntry::new("report.pdf", b"%PDF-1.5".to_vec()),
            ArchiveEntry::new("consolidado_final.xlsx", vec![1, 2, 3]),
            ArchiveEntry::new("arquivo_info.txt", "Olá".as_bytes().to_vec()),
        ];
        let bytes = ZipPackager.package(&entries).expect("archive should be built");

        let mut archive = ZipArchive::new(Cursor::new(bytes)).expect("archive should open");
        let names = archive.file_names().map(str::to_string).collect::<Vec<_>>();
        assert_eq!(names.len(), 3);
        assert_eq!(
            archive.by_index(0).expect("first entry").name(),
            "report.pdf"
        );

        let mut info = String::new();
        archive
            .by_name("arquivo_info.txt")
            .expect("info entry should exist")
            .read_to_string(&mut info)
            .expect("info should be utf-8");
        assert_eq!(info, "Olá");
    }
}
