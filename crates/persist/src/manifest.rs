//! Per-tree content manifests.
//!
//! A manifest maps every non-excluded regular file of a tree, by its
//! slash-separated path relative to the tree root, to the SHA-256 of its
//! contents. Directories are not entries.
//!
//! On disk a manifest is plain text, one `path:digest` record per line,
//! sorted by path. Readers split on the first colon only and skip lines
//! that have none.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use crate::error::StoreError;
use crate::hasher::hash_file;
use crate::tree::{EntryKind, Exclusion, walk};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<String, String>,
}

/// Differences found when checking a tree against a recorded manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDiff {
    /// Recorded but no longer present.
    pub missing: Vec<String>,
    /// Present but never recorded.
    pub unexpected: Vec<String>,
    /// Present in both with different digests.
    pub changed: Vec<String>,
}

impl ManifestDiff {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.changed.is_empty()
    }
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash every non-excluded regular file under `root`.
    pub fn build(root: &Path, exclusion: &Exclusion) -> Result<Self, StoreError> {
        let mut manifest = Self::new();
        for entry in walk(root, exclusion)? {
            if entry.kind != EntryKind::File {
                continue;
            }
            let key = manifest_key(&entry.relative)?;
            let digest = hash_file(root.join(&entry.relative))?;
            manifest.entries.insert(key, digest);
        }
        tracing::debug!(root = %root.display(), files = manifest.len(), "manifest built");
        Ok(manifest)
    }

    pub fn insert(&mut self, path: impl Into<String>, digest: impl Into<String>) {
        self.entries.insert(path.into(), digest.into());
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Same paths with the same digest for each.
    pub fn equals(&self, other: &Manifest) -> bool {
        self == other
    }

    /// What changed going from `self` (recorded) to `actual`.
    pub fn diff(&self, actual: &Manifest) -> ManifestDiff {
        let mut diff = ManifestDiff::default();
        for (path, digest) in &self.entries {
            match actual.entries.get(path) {
                None => diff.missing.push(path.clone()),
                Some(d) if d != digest => diff.changed.push(path.clone()),
                Some(_) => {}
            }
        }
        diff.unexpected = actual
            .entries
            .keys()
            .filter(|path| !self.entries.contains_key(*path))
            .cloned()
            .collect();
        diff
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (path, digest) in &self.entries {
            out.push_str(path);
            out.push(':');
            out.push_str(digest);
            out.push('\n');
        }
        out
    }

    pub fn parse(text: &str) -> Self {
        let mut manifest = Self::new();
        for line in text.lines() {
            if let Some((path, digest)) = line.split_once(':') {
                manifest.insert(path, digest);
            }
        }
        manifest
    }

    /// Read a manifest file; `Ok(None)` when it does not exist.
    pub fn read(path: &Path) -> Result<Option<Self>, StoreError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(Self::parse(&text))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write via a temp file and rename, so readers never see a partial manifest.
    pub fn write(&self, path: &Path) -> Result<(), StoreError> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let file_name = path
            .file_name()
            .ok_or_else(|| StoreError::UnrecordablePath(path.to_path_buf()))?;
        let temp_path = parent.join(format!(
            ".{}.tmp-{}",
            file_name.to_string_lossy(),
            std::process::id()
        ));

        let write_result = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(self.to_text().as_bytes())?;
            file.sync_all()
        })();
        if let Err(e) = write_result {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        fs::rename(&temp_path, path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StoreError::from(e)
        })
    }
}

/// Slash-joined relative path. Paths that would not survive the line format
/// are rejected rather than recorded lossily.
fn manifest_key(relative: &Path) -> Result<String, StoreError> {
    let mut parts = Vec::new();
    for component in relative.components() {
        let part = component
            .as_os_str()
            .to_str()
            .filter(|s| !s.contains(['\n', '\r']))
            .ok_or_else(|| StoreError::UnrecordablePath(relative.to_path_buf()))?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::hash_reader;
    use crate::tree::copy_tree;

    fn sample_world(root: &Path) {
        fs::create_dir_all(root.join("region")).unwrap();
        fs::create_dir_all(root.join("playerdata")).unwrap();
        fs::write(root.join("level.dat"), b"level").unwrap();
        fs::write(root.join("session.lock"), b"lock").unwrap();
        fs::write(root.join("region/r.0.0.mca"), b"chunk").unwrap();
        fs::write(root.join("playerdata/a.dat"), b"alice").unwrap();
    }

    #[test]
    fn build_records_files_with_slash_paths() {
        let tmp = tempfile::tempdir().unwrap();
        sample_world(tmp.path());

        let m = Manifest::build(tmp.path(), &Exclusion::default()).unwrap();
        assert_eq!(m.len(), 3);
        assert_eq!(
            m.get("region/r.0.0.mca"),
            Some(hash_reader(&b"chunk"[..]).unwrap().as_str())
        );
        assert!(m.get("session.lock").is_none());
        assert!(m.get("region").is_none());
    }

    #[test]
    fn build_is_deterministic() {
        let tmp = tempfile::tempdir().unwrap();
        sample_world(tmp.path());
        let a = Manifest::build(tmp.path(), &Exclusion::default()).unwrap();
        let b = Manifest::build(tmp.path(), &Exclusion::default()).unwrap();
        assert!(a.equals(&b));
    }

    #[test]
    fn copy_preserves_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("world");
        let dst = tmp.path().join("copy");
        sample_world(&src);
        copy_tree(&src, &dst, &Exclusion::default()).unwrap();

        let ex = Exclusion::default();
        assert!(Manifest::build(&src, &ex).unwrap().equals(&Manifest::build(&dst, &ex).unwrap()));
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let mut a = Manifest::new();
        a.insert("b", "2");
        a.insert("a", "1");
        let mut b = Manifest::new();
        b.insert("a", "1");
        b.insert("b", "2");
        assert!(a.equals(&b));

        b.insert("c", "3");
        assert!(!a.equals(&b));
    }

    #[test]
    fn diff_classifies_each_kind_of_change() {
        let mut recorded = Manifest::new();
        recorded.insert("gone", "1");
        recorded.insert("same", "2");
        recorded.insert("edited", "3");
        let mut actual = Manifest::new();
        actual.insert("same", "2");
        actual.insert("edited", "4");
        actual.insert("new", "5");

        let diff = recorded.diff(&actual);
        assert_eq!(diff.missing, ["gone"]);
        assert_eq!(diff.changed, ["edited"]);
        assert_eq!(diff.unexpected, ["new"]);
        assert!(recorded.diff(&recorded).is_empty());
    }

    #[test]
    fn text_is_sorted_path_colon_digest() {
        let mut m = Manifest::new();
        m.insert("region/r.0.0.mca", "bb");
        m.insert("level.dat", "aa");
        assert_eq!(m.to_text(), "level.dat:aa\nregion/r.0.0.mca:bb\n");
        assert!(Manifest::parse(&m.to_text()).equals(&m));
    }

    #[test]
    fn parse_splits_on_first_colon_and_skips_malformed_lines() {
        let m = Manifest::parse("odd:name.dat:abc\nno colon here\n\nlevel.dat:def\r\n");
        assert_eq!(m.len(), 2);
        assert_eq!(m.get("odd"), Some("name.dat:abc"));
        assert_eq!(m.get("level.dat"), Some("def"));
    }

    #[test]
    fn read_missing_file_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(Manifest::read(&tmp.path().join("world.manifest")).unwrap().is_none());
    }

    #[test]
    fn write_then_read_leaves_no_temp_file() {
        let tmp = tempfile::tempdir().unwrap();
        sample_world(&tmp.path().join("world"));
        let m = Manifest::build(&tmp.path().join("world"), &Exclusion::default()).unwrap();
        let path = tmp.path().join("world.manifest");
        m.write(&path).unwrap();

        assert_eq!(Manifest::read(&path).unwrap(), Some(m));
        let names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn newline_in_file_name_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("bad\nname"), b"x").unwrap();
        assert!(matches!(
            Manifest::build(tmp.path(), &Exclusion::default()),
            Err(StoreError::UnrecordablePath(_))
        ));
    }
}
