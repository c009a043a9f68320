//! Flat-file persistence keyed by filename convention.
//!
//! Artifacts live under one data root:
//!   syllabus/syllabus_grade{g}_{subject_lower}.json
//!   worksheets/grade{g}_{safe_title}.html
//!   grading_results/grade_{safe_name}_{timestamp}.json
//!
//! There is no locking: files are read-then-overwritten and concurrent
//! writers targeting the same key race, last writer wins. Grading-result
//! keys embed a timestamp and so never overwrite earlier results.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, instrument};

use crate::util::{sanitize_student_name, sanitize_title};

/// Typed primary keys; each renders to a relative path under the data root.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreKey {
  Syllabus { grade: u32, subject: String },
  Worksheet { grade: u32, title: String },
  GradingResult { student: String, timestamp: String },
}

impl StoreKey {
  pub fn relative_path(&self) -> PathBuf {
    match self {
      StoreKey::Syllabus { grade, subject } => PathBuf::from("syllabus")
        .join(format!("syllabus_grade{}_{}.json", grade, subject.to_lowercase())),
      StoreKey::Worksheet { grade, title } => {
        PathBuf::from("worksheets").join(format!("grade{}_{}.html", grade, sanitize_title(title)))
      }
      StoreKey::GradingResult { student, timestamp } => PathBuf::from("grading_results")
        .join(format!("grade_{}_{}.json", sanitize_student_name(student), timestamp)),
    }
  }
}

#[derive(Clone, Debug)]
pub struct FileStore {
  root: PathBuf,
}

impl FileStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// Create the artifact directories up front so first writes don't race
  /// directory creation.
  #[instrument(level = "info", skip(self))]
  pub fn bootstrap(&self) -> io::Result<()> {
    for dir in ["syllabus", "worksheets", "grading_results"] {
      fs::create_dir_all(self.root.join(dir))?;
    }
    info!(target: "worksheetforge_backend", root = %self.root.display(), "Data directories ready");
    Ok(())
  }

  pub fn path_for(&self, key: &StoreKey) -> PathBuf {
    self.root.join(key.relative_path())
  }

  /// Absolute location of one artifact directory (for read-only serving).
  pub fn path_for_dir(&self, dir: &str) -> PathBuf {
    self.root.join(dir)
  }

  /// Read the artifact at `key`. None when it does not exist or is
  /// unreadable.
  pub fn get(&self, key: &StoreKey) -> Option<String> {
    fs::read_to_string(self.path_for(key)).ok()
  }

  /// Write (or overwrite) the artifact at `key`. Returns the final path.
  pub fn put(&self, key: &StoreKey, contents: &str) -> io::Result<PathBuf> {
    let path = self.path_for(key);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    fs::write(&path, contents)?;
    Ok(path)
  }

  /// Filenames of all persisted worksheets, unordered.
  pub fn list_worksheets(&self) -> Vec<String> {
    list_filenames(&self.root.join("worksheets"), "html")
  }
}

fn list_filenames(dir: &Path, extension: &str) -> Vec<String> {
  let Ok(entries) = fs::read_dir(dir) else {
    return Vec::new();
  };
  entries
    .filter_map(|e| e.ok())
    .map(|e| e.path())
    .filter(|p| p.extension().map_or(false, |ext| ext == extension))
    .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn keys_render_to_convention_paths() {
    let k = StoreKey::Syllabus { grade: 3, subject: "Math".into() };
    assert_eq!(k.relative_path(), PathBuf::from("syllabus/syllabus_grade3_math.json"));

    let k = StoreKey::Worksheet { grade: 4, title: "Mixed Review!".into() };
    assert_eq!(k.relative_path(), PathBuf::from("worksheets/grade4_mixed_review_.html"));

    let k = StoreKey::GradingResult { student: "Ana P.".into(), timestamp: "20260101_090000".into() };
    assert_eq!(
      k.relative_path(),
      PathBuf::from("grading_results/grade_Ana_P__20260101_090000.json")
    );
  }

  #[test]
  fn put_then_get_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());
    store.bootstrap().unwrap();

    let key = StoreKey::Syllabus { grade: 3, subject: "Math".into() };
    store.put(&key, "{\"grade\": 3}").unwrap();
    assert_eq!(store.get(&key).as_deref(), Some("{\"grade\": 3}"));

    // Same key, case-folded subject: same file, last write wins.
    let key_upper = StoreKey::Syllabus { grade: 3, subject: "MATH".into() };
    store.put(&key_upper, "{\"grade\": 3, \"v\": 2}").unwrap();
    assert_eq!(store.get(&key).as_deref(), Some("{\"grade\": 3, \"v\": 2}"));
  }

  #[test]
  fn missing_artifacts_read_as_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());
    let key = StoreKey::Syllabus { grade: 9, subject: "History".into() };
    assert_eq!(store.get(&key), None);
  }

  #[test]
  fn worksheet_listing_only_sees_html() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());
    store.bootstrap().unwrap();

    store.put(&StoreKey::Worksheet { grade: 3, title: "Shapes".into() }, "<html/>").unwrap();
    std::fs::write(dir.path().join("worksheets/notes.txt"), "x").unwrap();

    assert_eq!(store.list_worksheets(), vec!["grade3_shapes.html".to_string()]);
  }
}
