use crate::config::ARCHIVE_DIR_SUFFIX;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Expands every input into its leaf files, recursing into directories up front.
/// Paths are canonicalised; directory entries are visited in name order.
pub fn collect_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        let path = fs::canonicalize(input)
            .with_context(|| format!("Input does not exist: {}", input.display()))?;
        collect_into(&path, &mut files)?;
    }
    Ok(files)
}

fn collect_into(path: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let metadata =
        fs::metadata(path).with_context(|| format!("Failed to stat: {}", path.display()))?;

    if !metadata.is_dir() {
        files.push(path.to_path_buf());
        return Ok(());
    }

    let mut entries: Vec<PathBuf> = fs::read_dir(path)
        .with_context(|| format!("Failed to read directory: {}", path.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()
        .with_context(|| format!("Failed to list directory: {}", path.display()))?;
    entries.sort();

    for entry in entries {
        collect_into(&entry, files)?;
    }
    Ok(())
}

/// Longest run of leading path components shared by every path.
pub fn common_prefix(paths: &[PathBuf]) -> PathBuf {
    let mut iter = paths.iter();
    let Some(first) = iter.next() else {
        return PathBuf::new();
    };

    let mut prefix: Vec<Component<'_>> = first.components().collect();
    for path in iter {
        let shared = prefix
            .iter()
            .zip(path.components())
            .take_while(|(a, b)| **a == *b)
            .count();
        prefix.truncate(shared);
    }
    prefix.into_iter().collect()
}

/// Lower-cased extension with a leading dot, or empty when there is none.
pub fn extension_key(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Maps input files to their mirrored location under the output root.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    base: PathBuf,
    out_root: PathBuf,
}

impl OutputLayout {
    pub fn new(base: PathBuf, out_root: PathBuf) -> Self {
        Self { base, out_root }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn out_root(&self) -> &Path {
        &self.out_root
    }

    /// Path of `file` relative to the shared input prefix. Files that already live
    /// under the output root (recursive discoveries) keep their place there.
    pub fn relative(&self, file: &Path) -> PathBuf {
        let stripped = if let Ok(rest) = file.strip_prefix(&self.out_root) {
            rest.to_path_buf()
        } else if let Ok(rest) = file.strip_prefix(&self.base) {
            rest.to_path_buf()
        } else {
            file.components()
                .filter(|c| matches!(c, Component::Normal(_)))
                .collect()
        };

        if stripped.as_os_str().is_empty() {
            file.file_name().map(PathBuf::from).unwrap_or_default()
        } else {
            stripped
        }
    }

    fn mirrored(&self, file: &Path) -> PathBuf {
        self.out_root.join(self.relative(file))
    }

    /// Directory receiving the per-message artifacts of an archive.
    ///
    /// An archive written under the output root by an earlier job already occupies
    /// its mirrored path, so its artifacts go to a `.d` sibling instead.
    pub fn output_dir(&self, file: &Path) -> PathBuf {
        let dir = self.mirrored(file);
        if file.starts_with(&self.out_root) {
            with_suffix(dir, ARCHIVE_DIR_SUFFIX)
        } else {
            dir
        }
    }

    /// File receiving the text conversion of a document.
    pub fn text_output(&self, file: &Path) -> PathBuf {
        with_suffix(self.mirrored(file), ".txt")
    }
}

fn with_suffix(path: PathBuf, suffix: &str) -> PathBuf {
    let mut path = path.into_os_string();
    path.push(suffix);
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    #[test]
    fn common_prefix_of_siblings() {
        let prefix = common_prefix(&[p("/data/mail/a.mbox"), p("/data/mail/sub/b.mbox")]);
        assert_eq!(prefix, p("/data/mail"));
    }

    #[test]
    fn common_prefix_respects_segment_boundaries() {
        let prefix = common_prefix(&[p("/data/mailbox/a"), p("/data/mail/b")]);
        assert_eq!(prefix, p("/data"));
    }

    #[test]
    fn common_prefix_of_single_path_is_itself() {
        assert_eq!(common_prefix(&[p("/a/b.mbox")]), p("/a/b.mbox"));
    }

    #[test]
    fn common_prefix_of_nothing_is_empty() {
        assert_eq!(common_prefix(&[]), PathBuf::new());
    }

    #[test]
    fn relative_mirrors_under_output() {
        let layout = OutputLayout::new(p("/data/mail"), p("/out"));
        assert_eq!(layout.output_dir(Path::new("/data/mail/2019/a.mbox")), p("/out/2019/a.mbox"));
        assert_eq!(
            layout.text_output(Path::new("/data/mail/doc.pdf")),
            p("/out/doc.pdf.txt")
        );
    }

    #[test]
    fn relative_of_base_itself_uses_file_name() {
        let layout = OutputLayout::new(p("/data/a.mbox"), p("/out"));
        assert_eq!(layout.output_dir(Path::new("/data/a.mbox")), p("/out/a.mbox"));
    }

    #[test]
    fn discovered_files_stay_under_output_root() {
        let layout = OutputLayout::new(p("/data"), p("/data/extract"));
        assert_eq!(
            layout.text_output(Path::new("/data/extract/a.mbox/id@x/report.pdf")),
            p("/data/extract/a.mbox/id@x/report.pdf.txt")
        );
    }

    #[test]
    fn discovered_archives_get_a_separate_directory() {
        let layout = OutputLayout::new(p("/data"), p("/out"));
        let store = layout.output_dir(Path::new("/data/mail.pst"));
        assert_eq!(store, p("/out/mail.pst"));

        let mailbox = store.join("Inbox");
        assert_eq!(layout.output_dir(&mailbox), p("/out/mail.pst/Inbox.d"));
        assert_eq!(
            layout.output_dir(Path::new("/out/a.mbox/fwd.eml")),
            p("/out/a.mbox/fwd.eml.d")
        );
        assert_ne!(layout.output_dir(&mailbox), mailbox);
    }

    #[test]
    fn unrelated_paths_are_rooted_under_output() {
        let layout = OutputLayout::new(p("/data"), p("/out"));
        assert_eq!(layout.output_dir(Path::new("/elsewhere/x.mbox")), p("/out/elsewhere/x.mbox"));
    }

    #[test]
    fn extension_key_forms() {
        assert_eq!(extension_key(Path::new("a/b.MBOX")), ".mbox");
        assert_eq!(extension_key(Path::new("a/Inbox")), "");
        assert_eq!(extension_key(Path::new("x.tar.bz2")), ".bz2");
    }

    #[test]
    fn collect_files_expands_directories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        fs::write(dir.path().join("a.pst"), b"").unwrap();
        fs::write(dir.path().join("nested/b.mbox"), b"").unwrap();
        fs::write(dir.path().join("nested/deeper/c.txt"), b"").unwrap();

        let files = collect_files(&[dir.path().to_path_buf()]).unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![
                root.join("a.pst"),
                root.join("nested/b.mbox"),
                root.join("nested/deeper/c.txt"),
            ]
        );
    }

    #[test]
    fn collect_files_fails_on_missing_input() {
        assert!(collect_files(&[p("/definitely/not/here")]).is_err());
    }
}
