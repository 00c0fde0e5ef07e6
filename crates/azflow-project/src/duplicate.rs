//! Overwrite handling for synthesized files
//!
//! Before generated files are written into the project, the files that already exist are
//! listed and a [`DuplicatePrompt`] decides whether they are overwritten or kept.

use crate::error::{Result, ResultExt};
use crate::scaffold::MemoryFs;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What to do with files that would be overwritten
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateChoice {
    Overwrite,
    KeepExisting,
}

/// Asks what to do with existing files
#[async_trait]
pub trait DuplicatePrompt: Send + Sync {
    async fn choose(&self, duplicates: &[PathBuf]) -> Result<DuplicateChoice>;
}

/// Overwrites without asking (`--force`)
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOverwrite;

#[async_trait]
impl DuplicatePrompt for AlwaysOverwrite {
    async fn choose(&self, _duplicates: &[PathBuf]) -> Result<DuplicateChoice> {
        Ok(DuplicateChoice::Overwrite)
    }
}

/// Never touches existing files
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepExisting;

#[async_trait]
impl DuplicatePrompt for KeepExisting {
    async fn choose(&self, _duplicates: &[PathBuf]) -> Result<DuplicateChoice> {
        Ok(DuplicateChoice::KeepExisting)
    }
}

/// Paths of `source` that already exist below `target`, relative to both
pub fn determine_duplicates(source: &MemoryFs, target: &Path) -> Vec<PathBuf> {
    source
        .paths()
        .filter(|path| target.join(path).exists())
        .map(Path::to_path_buf)
        .collect()
}

/// Files to leave out when writing, for the given choice
pub fn skip_set(choice: DuplicateChoice, duplicates: &[PathBuf]) -> BTreeSet<PathBuf> {
    match choice {
        DuplicateChoice::Overwrite => BTreeSet::new(),
        DuplicateChoice::KeepExisting => duplicates.iter().cloned().collect(),
    }
}

/// Write `files` below `target`, asking `prompt` about files that already exist
///
/// Returns the paths that were written.
pub async fn write_synthesized(
    files: &MemoryFs,
    target: &Path,
    prompt: &dyn DuplicatePrompt,
) -> Result<Vec<PathBuf>> {
    let duplicates = determine_duplicates(files, target);
    debug!(target = %target.display(), duplicates = duplicates.len(), "Checked for existing files");

    let skip = if duplicates.is_empty() {
        BTreeSet::new()
    } else {
        let choice = prompt.choose(&duplicates).await.context("prompting to overwrite")?;
        skip_set(choice, &duplicates)
    };

    let mut written = Vec::new();
    for (path, contents) in files.iter() {
        if skip.contains(path) {
            info!(path = %path.display(), "Keeping existing file");
            continue;
        }
        let destination = target.join(path);
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&destination, contents).await?;
        written.push(path.to_path_buf());
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct RecordingPrompt {
        choice: DuplicateChoice,
        asked: Mutex<Vec<Vec<PathBuf>>>,
    }

    #[async_trait]
    impl DuplicatePrompt for RecordingPrompt {
        async fn choose(&self, duplicates: &[PathBuf]) -> Result<DuplicateChoice> {
            self.asked.lock().unwrap().push(duplicates.to_vec());
            Ok(self.choice)
        }
    }

    fn files() -> MemoryFs {
        let mut files = MemoryFs::new();
        files.write("infra/main.bicep", "generated main");
        files.write("infra/app/api.bicep", "generated api");
        files
    }

    fn existing_main() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("infra")).unwrap();
        std::fs::write(dir.path().join("infra/main.bicep"), "mine").unwrap();
        dir
    }

    #[test]
    fn test_determine_duplicates() {
        let dir = existing_main();
        assert_eq!(
            determine_duplicates(&files(), dir.path()),
            vec![PathBuf::from("infra/main.bicep")]
        );
    }

    #[test]
    fn test_skip_set() {
        let duplicates = vec![PathBuf::from("infra/main.bicep")];
        assert!(skip_set(DuplicateChoice::Overwrite, &duplicates).is_empty());
        assert!(skip_set(DuplicateChoice::KeepExisting, &duplicates).contains(Path::new("infra/main.bicep")));
    }

    #[tokio::test]
    async fn test_keep_existing_skips_duplicates() {
        let dir = existing_main();
        let prompt = RecordingPrompt {
            choice: DuplicateChoice::KeepExisting,
            asked: Mutex::new(Vec::new()),
        };

        let written = write_synthesized(&files(), dir.path(), &prompt).await.unwrap();

        assert_eq!(written, vec![PathBuf::from("infra/app/api.bicep")]);
        assert_eq!(std::fs::read_to_string(dir.path().join("infra/main.bicep")).unwrap(), "mine");
        assert_eq!(prompt.asked.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_duplicates() {
        let dir = existing_main();
        let written = write_synthesized(&files(), dir.path(), &AlwaysOverwrite).await.unwrap();

        assert_eq!(written.len(), 2);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("infra/main.bicep")).unwrap(),
            "generated main"
        );
    }

    #[tokio::test]
    async fn test_no_prompt_without_duplicates() {
        let dir = TempDir::new().unwrap();
        let prompt = RecordingPrompt {
            choice: DuplicateChoice::KeepExisting,
            asked: Mutex::new(Vec::new()),
        };

        let written = write_synthesized(&files(), dir.path(), &prompt).await.unwrap();
        assert_eq!(written.len(), 2);
        assert!(prompt.asked.lock().unwrap().is_empty());
    }
}
