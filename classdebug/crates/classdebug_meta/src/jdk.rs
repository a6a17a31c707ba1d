use crate::jimage::RuntimeImage;
use crate::source::{is_archive, ArchiveSource, ClassSource, SourceError};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Locates a JDK or JRE home from `JAVA_HOME`, `JDK_HOME`, or the `java`
/// executable on `PATH`.
pub fn detect_java_home() -> Option<PathBuf> {
    for var in ["JAVA_HOME", "JDK_HOME"] {
        if let Some(value) = env::var_os(var) {
            let candidate = PathBuf::from(value);
            if candidate.is_dir() {
                return Some(candidate);
            }
        }
    }

    let java_path = which::which("java").ok()?;
    // `/usr/bin/java` is usually a symlink into the real installation.
    let java_path = fs::canonicalize(&java_path).unwrap_or(java_path);
    let home = java_path.parent()?.parent()?;
    Some(home.to_path_buf())
}

/// Opens the class sources that make up the platform classes of the
/// runtime at `java_home`, in lookup order.
///
/// Modern runtimes ship a `lib/modules` image; JDKs may additionally ship
/// `jmods/`, used when the image is missing. Legacy (Java 8) layouts keep
/// everything in `rt.jar`.
pub fn runtime_sources(java_home: &Path) -> Result<Vec<Box<dyn ClassSource>>, SourceError> {
    let image = java_home.join("lib").join("modules");
    if image.is_file() {
        debug!(path = %image.display(), "using runtime image");
        return Ok(vec![Box::new(RuntimeImage::open(image)?)]);
    }

    let jmods = java_home.join("jmods");
    if jmods.is_dir() {
        let mut sources: Vec<Box<dyn ClassSource>> = Vec::new();
        for path in sorted_entries(&jmods)? {
            if is_archive(&path) {
                sources.push(Box::new(ArchiveSource::open(path)?));
            }
        }
        debug!(path = %jmods.display(), modules = sources.len(), "using jmods");
        return Ok(sources);
    }

    for candidate in [
        java_home.join("jre").join("lib").join("rt.jar"),
        java_home.join("lib").join("rt.jar"),
    ] {
        if candidate.is_file() {
            debug!(path = %candidate.display(), "using rt.jar");
            return Ok(vec![Box::new(ArchiveSource::open(candidate)?)]);
        }
    }

    Ok(Vec::new())
}

/// Splits classpath strings on the platform separator and expands `dir/*`
/// wildcards to the JAR files in `dir`.
pub fn expand_classpath(raw: &[String]) -> Vec<PathBuf> {
    let separator = if cfg!(windows) { ';' } else { ':' };
    let mut result = Vec::new();
    for entry in raw {
        for part in entry.split(separator) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.strip_suffix('*') {
                Some(dir) if dir.is_empty() || dir.ends_with(['/', '\\']) => {
                    let dir = if dir.is_empty() { Path::new(".") } else { Path::new(dir) };
                    let jars = sorted_entries(dir).unwrap_or_default();
                    result.extend(jars.into_iter().filter(|path| is_archive(path)));
                }
                _ => result.push(PathBuf::from(part)),
            }
        }
    }
    result
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let entries = fs::read_dir(dir).map_err(|source| SourceError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| SourceError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
