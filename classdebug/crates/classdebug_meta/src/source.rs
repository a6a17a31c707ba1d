use std::ffi::OsStr;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::result::ZipError;
use zip::ZipArchive;

/// Upper bound on the buffer reserved from an entry's declared size. The
/// central directory is untrusted; larger entries still read fully.
const MAX_PREALLOCATION: u64 = 1 << 20;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("IO error while reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("ZIP error while reading {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: ZipError,
    },
    #[error("runtime image {path} is unreadable: {reason}")]
    Image { path: PathBuf, reason: String },
}

/// Bytes of a class file plus a printable location it came from.
#[derive(Debug, Clone)]
pub struct ClassBytes {
    pub bytes: Vec<u8>,
    pub origin: String,
}

/// A unit that can supply class file bytes by internal name
/// (`java/lang/String`).
pub trait ClassSource: fmt::Debug + Send {
    fn location(&self) -> &Path;

    fn find_class(&mut self, internal_name: &str) -> Result<Option<ClassBytes>, SourceError>;
}

/// An exploded class directory, `<root>/java/lang/String.class`.
#[derive(Debug)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ClassSource for DirectorySource {
    fn location(&self) -> &Path {
        &self.root
    }

    fn find_class(&mut self, internal_name: &str) -> Result<Option<ClassBytes>, SourceError> {
        let path = self.root.join(format!("{internal_name}.class"));
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Some(ClassBytes {
            bytes,
            origin: path.display().to_string(),
        }))
    }
}

/// A single `.class` file. It answers for the binary name matching its file
/// stem; the resolver verifies the declared name after parsing.
#[derive(Debug)]
pub struct ClassFileSource {
    path: PathBuf,
}

impl ClassFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ClassSource for ClassFileSource {
    fn location(&self) -> &Path {
        &self.path
    }

    fn find_class(&mut self, internal_name: &str) -> Result<Option<ClassBytes>, SourceError> {
        let simple_name = internal_name.rsplit('/').next().unwrap_or(internal_name);
        if self.path.file_stem().and_then(OsStr::to_str) != Some(simple_name) {
            return Ok(None);
        }
        let bytes = fs::read(&self.path).map_err(|source| SourceError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(ClassBytes {
            bytes,
            origin: self.path.display().to_string(),
        }))
    }
}

/// A JAR, ZIP or JMOD archive. The archive handle stays open for the
/// lifetime of the source and is closed on drop.
pub struct ArchiveSource {
    path: PathBuf,
    archive: ZipArchive<BufReader<File>>,
    entry_prefix: &'static str,
}

impl fmt::Debug for ArchiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveSource")
            .field("path", &self.path)
            .field("entries", &self.archive.len())
            .field("entry_prefix", &self.entry_prefix)
            .finish()
    }
}

impl ArchiveSource {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SourceError> {
        let path = path.into();
        let file = File::open(&path).map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;
        let archive = ZipArchive::new(BufReader::new(file)).map_err(|source| SourceError::Zip {
            path: path.clone(),
            source,
        })?;
        // JMOD files keep class files under `classes/` behind a 4-byte
        // `JM` header; the ZIP reader skips the prepended bytes itself.
        let entry_prefix = if has_extension(&path, &["jmod"]) {
            "classes/"
        } else {
            ""
        };
        Ok(Self {
            path,
            archive,
            entry_prefix,
        })
    }
}

impl ClassSource for ArchiveSource {
    fn location(&self) -> &Path {
        &self.path
    }

    fn find_class(&mut self, internal_name: &str) -> Result<Option<ClassBytes>, SourceError> {
        let name = format!("{}{internal_name}.class", self.entry_prefix);
        let mut entry = match self.archive.by_name(&name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(source) => {
                return Err(SourceError::Zip {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mut bytes = Vec::with_capacity(entry.size().min(MAX_PREALLOCATION) as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|source| SourceError::Io {
                path: self.path.clone(),
                source,
            })?;
        Ok(Some(ClassBytes {
            bytes,
            origin: archive_entry_path(&self.path, &name),
        }))
    }
}

pub(crate) fn is_archive(path: &Path) -> bool {
    has_extension(path, &["jar", "zip", "jmod"])
}

pub(crate) fn has_extension(path: &Path, values: &[&str]) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| values.iter().any(|value| ext.eq_ignore_ascii_case(value)))
        .unwrap_or(false)
}

fn archive_entry_path(archive: &Path, entry: &str) -> String {
    format!("{}!/{}", archive.display(), entry)
}
