use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use mission_core::Category;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::classify::{ClassifierRules, ROOT_DOCUMENTS};
use super::fingerprint::{Fingerprint, fingerprint};
use super::ignore::IgnoreRules;
use super::paths::{relative_key, title_for};

const DEFAULT_SCAN_DIRS: [&str; 3] = ["memory", "projects", "apps"];
const DEFAULT_EXTENSIONS: [&str; 9] = [
    "md", "txt", "json", "ts", "tsx", "js", "jsx", "yml", "yaml",
];

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("cannot access workspace root {path:?}: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("workspace root {0:?} is not a directory")]
    NotADirectory(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Files directly under the workspace root, synced regardless of extension.
    pub root_files: Vec<String>,
    pub scan_dirs: Vec<String>,
    /// Lowercase, without the leading dot.
    pub allowed_extensions: Vec<String>,
    pub ignore: IgnoreRules,
    pub classifier: ClassifierRules,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root_files: ROOT_DOCUMENTS.map(String::from).to_vec(),
            scan_dirs: DEFAULT_SCAN_DIRS.map(String::from).to_vec(),
            allowed_extensions: DEFAULT_EXTENSIONS.map(String::from).to_vec(),
            ignore: IgnoreRules::default(),
            classifier: ClassifierRules::default(),
        }
    }
}

impl ScanConfig {
    pub fn is_allowed_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(OsStr::to_str)
            .map(str::to_ascii_lowercase)
            .is_some_and(|ext| self.allowed_extensions.iter().any(|allowed| *allowed == ext))
    }
}

/// One local file as seen by a single scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub absolute_path: PathBuf,
    pub relative_path: String,
    pub content: String,
    pub fingerprint: Fingerprint,
    pub category: Category,
    pub size: u64,
    /// Unix milliseconds.
    pub last_modified: i64,
}

impl FileDescriptor {
    pub fn title(&self) -> String {
        title_for(&self.relative_path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanDiagnostic {
    MissingRoot { dir: String },
    ReadFailed { path: String, reason: String },
    WalkFailed { path: String, reason: String },
}

impl fmt::Display for ScanDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanDiagnostic::MissingRoot { dir } => write!(f, "{dir}/ does not exist, skipped"),
            ScanDiagnostic::ReadFailed { path, reason } => {
                write!(f, "failed to read {path}: {reason}")
            }
            ScanDiagnostic::WalkFailed { path, reason } => {
                write!(f, "failed to scan {path}: {reason}")
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ScanReport {
    pub files: Vec<FileDescriptor>,
    pub diagnostics: Vec<ScanDiagnostic>,
}

pub struct Scanner {
    root: PathBuf,
    config: ScanConfig,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>, config: ScanConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Root files first in declared order, then each scan directory
    /// depth-first. Unreadable entries become diagnostics, never errors.
    pub fn scan(&self) -> Result<ScanReport, ScanError> {
        let metadata = fs::metadata(&self.root).map_err(|source| ScanError::Root {
            path: self.root.clone(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(ScanError::NotADirectory(self.root.clone()));
        }

        let mut report = ScanReport::default();
        self.scan_root_files(&mut report);
        for dir in &self.config.scan_dirs {
            self.scan_directory(dir, &mut report);
        }
        info!(
            files = report.files.len(),
            skipped = report.diagnostics.len(),
            "workspace scan complete"
        );
        Ok(report)
    }

    fn scan_root_files(&self, report: &mut ScanReport) {
        let before = report.files.len();
        for name in &self.config.root_files {
            let path = self.root.join(name);
            if !path.is_file() {
                continue;
            }
            match read_descriptor(&path, name.clone(), Category::Config) {
                Ok(file) => report.files.push(file),
                Err(err) => {
                    warn!(path = %name, error = %err, "failed to read root file");
                    report.diagnostics.push(ScanDiagnostic::ReadFailed {
                        path: name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        info!(found = report.files.len() - before, "scanned root files");
    }

    fn scan_directory(&self, dir: &str, report: &mut ScanReport) {
        let base = self.root.join(dir);
        if !base.is_dir() {
            info!(dir, "scan directory does not exist, skipping");
            report.diagnostics.push(ScanDiagnostic::MissingRoot {
                dir: dir.to_string(),
            });
            return;
        }

        let before = report.files.len();
        let walker = WalkDir::new(&base)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !self.is_ignored_path(entry.path()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .map(|path| self.display_key(path))
                        .unwrap_or_else(|| dir.to_string());
                    warn!(%path, error = %err, "failed to scan directory entry");
                    report.diagnostics.push(ScanDiagnostic::WalkFailed {
                        path,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() || !self.config.is_allowed_extension(entry.path()) {
                continue;
            }

            let relative = match relative_key(&self.root, entry.path()) {
                Ok(relative) => relative,
                Err(err) => {
                    let path = self.display_key(entry.path());
                    warn!(%path, error = %err, "skipping file with unusable path");
                    report.diagnostics.push(ScanDiagnostic::ReadFailed {
                        path,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };
            let category = self.config.classifier.classify(&relative);
            match read_descriptor(entry.path(), relative.clone(), category) {
                Ok(file) => {
                    debug!(path = %relative, %category, "scanned file");
                    report.files.push(file);
                }
                Err(err) => {
                    warn!(path = %relative, error = %err, "failed to read file");
                    report.diagnostics.push(ScanDiagnostic::ReadFailed {
                        path: relative,
                        reason: err.to_string(),
                    });
                }
            }
        }
        info!(dir, found = report.files.len() - before, "scanned directory");
    }

    fn is_ignored_path(&self, path: &Path) -> bool {
        match relative_key(&self.root, path) {
            Ok(relative) => self.config.ignore.is_ignored(&relative),
            Err(_) => false,
        }
    }

    fn display_key(&self, path: &Path) -> String {
        relative_key(&self.root, path)
            .unwrap_or_else(|_| path.to_string_lossy().replace('\\', "/"))
    }
}

fn read_descriptor(
    path: &Path,
    relative_path: String,
    category: Category,
) -> io::Result<FileDescriptor> {
    let bytes = fs::read(path)?;
    let metadata = fs::metadata(path)?;
    let content = String::from_utf8_lossy(&bytes).into_owned();
    let fingerprint = fingerprint(content.as_bytes());
    let last_modified = metadata.modified().map(unix_millis).unwrap_or(0);
    Ok(FileDescriptor {
        absolute_path: path.to_path_buf(),
        relative_path,
        content,
        fingerprint,
        category,
        size: metadata.len(),
        last_modified,
    })
}

fn unix_millis(time: SystemTime) -> i64 {
    let nanos = OffsetDateTime::from(time).unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}
