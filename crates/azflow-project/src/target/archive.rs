//! Zip packages for zip-deployed hosts

use crate::error::Result;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Read glob patterns from an ignore file (`.funcignore`, `.webappignore`)
pub fn read_ignore_file(path: &Path) -> Result<Vec<glob::Pattern>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| glob::Pattern::new(line.trim_end_matches('/')).ok())
        .collect())
}

fn is_ignored(relative: &Path, patterns: &[glob::Pattern]) -> bool {
    patterns.iter().any(|p| {
        p.matches_path(relative) || relative.components().next().is_some_and(|first| {
            p.matches(&first.as_os_str().to_string_lossy())
        })
    })
}

/// Zip the contents of `source` into a temporary file and return its path
pub fn create_zip(source: &Path, service_name: &str, ignore: &[glob::Pattern]) -> Result<PathBuf> {
    let zip_path = std::env::temp_dir().join(format!(
        "azflow-{}-{}.zip",
        service_name,
        uuid::Uuid::new_v4().simple()
    ));
    let file = File::create(&zip_path)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    add_dir(&mut writer, source, Path::new(""), ignore, options)?;
    writer.finish()?;
    Ok(zip_path)
}

fn add_dir(
    writer: &mut ZipWriter<File>,
    root: &Path,
    relative: &Path,
    ignore: &[glob::Pattern],
    options: SimpleFileOptions,
) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(root.join(relative))?.collect::<io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let rel = relative.join(entry.file_name());
        if is_ignored(&rel, ignore) {
            continue;
        }
        // zip entries always use forward slashes
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type()?.is_dir() {
            writer.add_directory(format!("{name}/"), options)?;
            add_dir(writer, root, &rel, ignore, options)?;
        } else {
            writer.start_file(name, options)?;
            let data = std::fs::read(entry.path())?;
            writer.write_all(&data)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_zip_contains_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("static/css")).unwrap();
        std::fs::write(dir.path().join("app.py"), "print()").unwrap();
        std::fs::write(dir.path().join("static/css/site.css"), "body{}").unwrap();

        let zip_path = create_zip(dir.path(), "web", &[]).unwrap();
        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let mut content = String::new();
        archive
            .by_name("static/css/site.css")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "body{}");
        assert!(archive.by_name("app.py").is_ok());
        std::fs::remove_file(zip_path).unwrap();
    }

    #[test]
    fn test_ignore_file_patterns() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".venv/lib")).unwrap();
        std::fs::write(dir.path().join(".venv/lib/x.py"), "").unwrap();
        std::fs::write(dir.path().join("local.settings.json"), "{}").unwrap();
        std::fs::write(dir.path().join("function_app.py"), "").unwrap();
        std::fs::write(
            dir.path().join(".funcignore"),
            "# local only\n.venv/\nlocal.settings.json\n",
        )
        .unwrap();

        let ignore = read_ignore_file(&dir.path().join(".funcignore")).unwrap();
        assert_eq!(ignore.len(), 2);

        let zip_path = create_zip(dir.path(), "func", &ignore).unwrap();
        let archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        assert!(names.contains(&"function_app.py"));
        assert!(!names.iter().any(|n| n.starts_with(".venv")));
        assert!(!names.contains(&"local.settings.json"));
        std::fs::remove_file(zip_path).unwrap();
    }

    #[test]
    fn test_missing_ignore_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_ignore_file(&dir.path().join(".webappignore")).unwrap().is_empty());
    }
}
