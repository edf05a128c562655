use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A file to place in the archive under `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub source: PathBuf,
    pub name: String,
}

/// `<dest>.part`, where the archive is assembled before it is renamed.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Zips `entries` into `dest` at maximum deflate compression.
///
/// The archive only appears under `dest` once it is complete and synced; on
/// failure the partial file is removed.
pub async fn package(entries: Vec<ArchiveEntry>, dest: PathBuf) -> Result<PathBuf> {
    tokio::task::spawn_blocking(move || {
        package_blocking(&entries, &dest)?;
        Ok(dest)
    })
    .await
    .context("archive task panicked")?
}

fn package_blocking(entries: &[ArchiveEntry], dest: &Path) -> Result<()> {
    let part = part_path(dest);
    let written = write_zip(entries, &part).and_then(|()| {
        fs::rename(&part, dest).with_context(|| format!("moving archive to {}", dest.display()))
    });
    if written.is_err() {
        let _ = fs::remove_file(&part);
    }
    written
}

fn write_zip(entries: &[ArchiveEntry], path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9));

    for entry in entries {
        let mut src = File::open(&entry.source)
            .with_context(|| format!("opening {}", entry.source.display()))?;
        zip.start_file(entry.name.as_str(), options)
            .with_context(|| format!("adding {}", entry.name))?;
        io::copy(&mut src, &mut zip).with_context(|| format!("compressing {}", entry.name))?;
    }

    let file = zip.finish().context("finalizing archive")?;
    file.sync_all().context("syncing archive")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[tokio::test]
    async fn packages_and_renames() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("book.xlsx");
        std::fs::write(&src, b"sheet bytes").unwrap();
        let dest = dir.path().join("out.zip");

        let out = package(
            vec![ArchiveEntry {
                source: src,
                name: "book.xlsx".into(),
            }],
            dest.clone(),
        )
        .await
        .unwrap();

        assert_eq!(out, dest);
        assert!(!part_path(&dest).exists());
        let mut archive = zip::ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        let mut body = String::new();
        archive
            .by_name("book.xlsx")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "sheet bytes");
    }

    #[tokio::test]
    async fn missing_source_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.zip");

        let err = package(
            vec![ArchiveEntry {
                source: dir.path().join("missing.xlsx"),
                name: "missing.xlsx".into(),
            }],
            dest.clone(),
        )
        .await;

        assert!(err.is_err());
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }
}
