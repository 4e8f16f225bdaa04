//! Draft text archive: where expired revisions go.
//!
//! The tracker only needs to know whether archiving succeeded. [`DirArchive`]
//! moves `<name>-<rev>.txt` out of the drafts directory into a `zstd`
//! compressed copy, and can put it back.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use tracing::debug;

const LEVEL: i32 = 19;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("nothing to move: {0} does not exist")]
    Missing(PathBuf),
}

pub trait Archive: Send + Sync + fmt::Debug {
    fn archive(&self, document: &str, rev: &str) -> Result<(), ArchiveError>;
    fn restore(&self, document: &str, rev: &str) -> Result<(), ArchiveError>;
}

/// Accepts every request and does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoArchive;

impl Archive for NoArchive {
    fn archive(&self, _document: &str, _rev: &str) -> Result<(), ArchiveError> {
        Ok(())
    }

    fn restore(&self, _document: &str, _rev: &str) -> Result<(), ArchiveError> {
        Ok(())
    }
}

/// Compresses draft text between two directories.
#[derive(Debug, Clone)]
pub struct DirArchive {
    drafts: PathBuf,
    archive: PathBuf,
}

impl DirArchive {
    pub fn new(drafts: impl Into<PathBuf>, archive: impl Into<PathBuf>) -> Self {
        Self {
            drafts: drafts.into(),
            archive: archive.into(),
        }
    }

    fn draft_path(&self, document: &str, rev: &str) -> PathBuf {
        self.drafts.join(format!("{document}-{rev}.txt"))
    }

    fn archived_path(&self, document: &str, rev: &str) -> PathBuf {
        self.archive.join(format!("{document}-{rev}.txt.zst"))
    }
}

impl Archive for DirArchive {
    fn archive(&self, document: &str, rev: &str) -> Result<(), ArchiveError> {
        let source = self.draft_path(document, rev);
        let target = self.archived_path(document, rev);
        if !source.exists() {
            // Already archived by an earlier, interrupted sweep.
            if target.exists() {
                return Ok(());
            }
            return Err(ArchiveError::Missing(source));
        }
        fs::create_dir_all(&self.archive)?;
        compress(&source, &target)?;
        fs::remove_file(&source)?;
        debug!(from = %source.display(), to = %target.display(), "archived draft");
        Ok(())
    }

    fn restore(&self, document: &str, rev: &str) -> Result<(), ArchiveError> {
        let source = self.archived_path(document, rev);
        let target = self.draft_path(document, rev);
        if !source.exists() {
            return Err(ArchiveError::Missing(source));
        }
        fs::create_dir_all(&self.drafts)?;
        let input = fs::File::open(&source)?;
        let mut output = fs::File::create(&target)?;
        zstd::stream::copy_decode(input, &mut output)?;
        output.sync_all()?;
        fs::remove_file(&source)?;
        debug!(from = %source.display(), to = %target.display(), "restored draft");
        Ok(())
    }
}

fn compress(source: &Path, target: &Path) -> io::Result<()> {
    let input = fs::File::open(source)?;
    let mut output = fs::File::create(target)?;
    zstd::stream::copy_encode(input, &mut output, LEVEL)?;
    output.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn setup() -> (TempDir, DirArchive) {
        let dir = TempDir::new().unwrap();
        let archive = DirArchive::new(dir.path().join("drafts"), dir.path().join("archive"));
        fs::create_dir_all(dir.path().join("drafts")).unwrap();
        (dir, archive)
    }

    #[test]
    fn archive_then_restore() {
        let (dir, archive) = setup();
        let text = "Internet-Draft\n\nAbstract\n".repeat(50);
        let draft = dir.path().join("drafts").join("draft-foo-03.txt");
        fs::write(&draft, &text).unwrap();

        archive.archive("draft-foo", "03").unwrap();
        assert!(!draft.exists());
        let packed = dir.path().join("archive").join("draft-foo-03.txt.zst");
        assert!(fs::metadata(&packed).unwrap().len() < text.len() as u64);

        archive.restore("draft-foo", "03").unwrap();
        assert_eq!(fs::read_to_string(&draft).unwrap(), text);
        assert!(!packed.exists());
    }

    #[test]
    fn archiving_twice_is_harmless() {
        let (dir, archive) = setup();
        fs::write(dir.path().join("drafts").join("draft-foo-00.txt"), "text").unwrap();
        archive.archive("draft-foo", "00").unwrap();
        archive.archive("draft-foo", "00").unwrap();
    }

    #[test]
    fn missing_draft_is_an_error() {
        let (_dir, archive) = setup();
        assert!(matches!(
            archive.archive("draft-nope", "00"),
            Err(ArchiveError::Missing(_))
        ));
        assert!(matches!(
            archive.restore("draft-nope", "00"),
            Err(ArchiveError::Missing(_))
        ));
    }
}
