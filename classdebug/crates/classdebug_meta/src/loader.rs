use crate::classfile::{parse_class, ClassFile, ClassParseError};
use crate::jdk::{detect_java_home, runtime_sources};
use crate::source::{
    has_extension, is_archive, ArchiveSource, ClassBytes, ClassFileSource, ClassSource,
    DirectorySource, SourceError,
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Invalid file path: {path}")]
    InvalidLocation {
        path: PathBuf,
        #[source]
        source: Option<SourceError>,
    },
    #[error("Class '{name}' not found")]
    ClassNotFound { name: String },
    #[error("Class '{name}' could not be parsed from {origin}")]
    ClassFormat {
        name: String,
        origin: String,
        #[source]
        source: ClassParseError,
    },
    #[error("Failed to read class sources")]
    Source(#[from] SourceError),
}

/// A class loaded from a loading context, tagged with where it came from.
#[derive(Debug, Clone)]
pub struct ResolvedClass {
    class: ClassFile,
    origin: String,
}

impl ResolvedClass {
    pub fn new(class: ClassFile, origin: impl Into<String>) -> Self {
        Self {
            class,
            origin: origin.into(),
        }
    }

    /// Binary name, e.g. `java.util.Map$Entry`.
    pub fn name(&self) -> &str {
        &self.class.name
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn class_file(&self) -> &ClassFile {
        &self.class
    }
}

/// An ordered set of class sources with an optional parent context.
///
/// Lookups delegate to the parent first, so platform classes can never be
/// shadowed by an external library.
#[derive(Debug)]
pub struct LoadingContext {
    label: String,
    sources: Vec<Box<dyn ClassSource>>,
    parent: Option<Box<LoadingContext>>,
}

impl LoadingContext {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            sources: Vec::new(),
            parent: None,
        }
    }

    pub fn with_source(mut self, source: Box<dyn ClassSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn chained_to(mut self, parent: LoadingContext) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    fn find_bytes(&mut self, internal_name: &str) -> Result<Option<ClassBytes>, SourceError> {
        if let Some(parent) = self.parent.as_mut() {
            if let Some(found) = parent.find_bytes(internal_name)? {
                return Ok(Some(found));
            }
        }
        for source in &mut self.sources {
            if let Some(found) = source.find_class(internal_name)? {
                debug!(
                    context = %self.label,
                    source = %source.location().display(),
                    class = internal_name,
                    "class bytes located"
                );
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Loads and parses the class with the given binary name.
    pub fn load(&mut self, class_name: &str) -> Result<ResolvedClass, ResolveError> {
        let not_found = || ResolveError::ClassNotFound {
            name: class_name.to_string(),
        };
        let internal_name = internal_name(class_name).ok_or_else(not_found)?;
        let found = self.find_bytes(&internal_name)?.ok_or_else(not_found)?;

        let class = parse_class(&found.bytes).map_err(|source| ResolveError::ClassFormat {
            name: class_name.to_string(),
            origin: found.origin.clone(),
            source,
        })?;
        if class.name != class_name {
            // A file at the expected path declaring another class.
            warn!(
                requested = class_name,
                declared = %class.name,
                origin = %found.origin,
                "class file declares a different name"
            );
            return Err(not_found());
        }
        Ok(ResolvedClass::new(class, found.origin))
    }
}

/// Maps `java.lang.String` to `java/lang/String`, rejecting names that can
/// never denote a class.
fn internal_name(class_name: &str) -> Option<String> {
    let valid = !class_name.is_empty()
        && class_name
            .split('.')
            .all(|segment| !segment.is_empty() && !segment.contains(['/', '[', ';']));
    valid.then(|| class_name.replace('.', "/"))
}

/// Resolves classes either from the default context (the Java runtime plus
/// the classpath) or from an external unit chained to it.
#[derive(Debug, Clone, Default)]
pub struct ClassResolver {
    java_home: Option<PathBuf>,
    classpath: Vec<PathBuf>,
}

impl ClassResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses the detected Java installation and no classpath.
    pub fn from_environment() -> Self {
        Self {
            java_home: detect_java_home(),
            classpath: Vec::new(),
        }
    }

    pub fn with_java_home(mut self, java_home: impl Into<PathBuf>) -> Self {
        self.java_home = Some(java_home.into());
        self
    }

    pub fn with_classpath<I>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.classpath.extend(entries);
        self
    }

    /// The ambient context. Unreadable classpath entries are skipped, as
    /// the JVM does.
    pub fn default_context(&self) -> Result<LoadingContext, ResolveError> {
        let mut context = LoadingContext::new("default");
        match &self.java_home {
            Some(home) => {
                for source in runtime_sources(home)? {
                    context = context.with_source(source);
                }
                if context.source_count() == 0 {
                    warn!(java_home = %home.display(), "no platform classes found in Java home");
                }
            }
            None => warn!("no Java runtime found; only the classpath is searched"),
        }

        for entry in &self.classpath {
            match open_unit(entry) {
                Ok(Some(source)) => context = context.with_source(source),
                Ok(None) => debug!(entry = %entry.display(), "skipping classpath entry"),
                Err(error) => {
                    warn!(entry = %entry.display(), error = %error, "skipping classpath entry")
                }
            }
        }
        Ok(context)
    }

    /// An isolated context rooted at `path`, chained to the default one.
    pub fn external_context(&self, path: &Path) -> Result<LoadingContext, ResolveError> {
        let invalid = |source: Option<SourceError>| ResolveError::InvalidLocation {
            path: path.to_path_buf(),
            source,
        };
        let source = match open_unit(path) {
            Ok(Some(source)) => source,
            Ok(None) => return Err(invalid(None)),
            Err(error) => return Err(invalid(Some(error))),
        };
        let external = LoadingContext::new(path.display().to_string()).with_source(source);
        Ok(external.chained_to(self.default_context()?))
    }

    /// Resolves `class_name`, from `external_unit` when one is given.
    /// An empty path means no external unit.
    pub fn resolve(
        &self,
        class_name: &str,
        external_unit: Option<&Path>,
    ) -> Result<ResolvedClass, ResolveError> {
        let external_unit = external_unit.filter(|path| !path.as_os_str().is_empty());
        let mut context = match external_unit {
            Some(path) => self.external_context(path)?,
            None => self.default_context()?,
        };
        let resolved = context.load(class_name)?;
        let class = resolved.class_file();
        debug!(
            class = resolved.name(),
            origin = resolved.origin(),
            version = %format!("{}.{}", class.major_version, class.minor_version),
            access = ?class.access_flags,
            super_class = class.super_class.as_deref().unwrap_or("-"),
            interfaces = class.interfaces.len(),
            "class resolved"
        );
        Ok(resolved)
    }
}

/// Opens a directory, archive or single class file as a class source.
/// Returns `None` for paths that are not loadable units.
fn open_unit(path: &Path) -> Result<Option<Box<dyn ClassSource>>, SourceError> {
    if path.is_dir() {
        return Ok(Some(Box::new(DirectorySource::new(path))));
    }
    if !path.is_file() {
        return Ok(None);
    }
    if is_archive(path) {
        return Ok(Some(Box::new(ArchiveSource::open(path)?)));
    }
    if has_extension(path, &["class"]) {
        return Ok(Some(Box::new(ClassFileSource::new(path))));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{class_entry_name, write_jar, write_jmod, ClassFileBuilder};
    use std::fs;
    use tempfile::tempdir;

    fn write_class(root: &Path, name: &str, bytes: &[u8]) {
        let path = root.join(class_entry_name(name));
        fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
        fs::write(path, bytes).expect("write class");
    }

    #[test]
    fn internal_name_rejects_malformed_identifiers() {
        assert_eq!(internal_name("java.lang.String").as_deref(), Some("java/lang/String"));
        assert_eq!(internal_name("Outer$Inner").as_deref(), Some("Outer$Inner"));
        for bad in ["", ".", "java..String", "java/lang/String", "[I", "a.b."] {
            assert!(internal_name(bad).is_none(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn resolves_from_classpath_directory() {
        let dir = tempdir().expect("temp dir");
        write_class(dir.path(), "com.example.Foo", &ClassFileBuilder::new("com.example.Foo").build());

        let resolver = ClassResolver::new().with_classpath([dir.path().to_path_buf()]);
        let class = resolver.resolve("com.example.Foo", None).expect("resolve");
        assert_eq!(class.name(), "com.example.Foo");
    }

    #[test]
    fn empty_external_path_uses_default_context() {
        let dir = tempdir().expect("temp dir");
        write_class(dir.path(), "a.B", &ClassFileBuilder::new("a.B").build());

        let resolver = ClassResolver::new().with_classpath([dir.path().to_path_buf()]);
        let class = resolver
            .resolve("a.B", Some(Path::new("")))
            .expect("empty path is no external unit");
        assert_eq!(class.name(), "a.B");
    }

    #[test]
    fn missing_external_path_is_invalid_location() {
        let dir = tempdir().expect("temp dir");
        let missing = dir.path().join("nope.jar");
        let error = ClassResolver::new()
            .resolve("a.B", Some(missing.as_path()))
            .expect_err("missing file");
        assert!(matches!(error, ResolveError::InvalidLocation { ref path, .. } if *path == missing));
    }

    #[test]
    fn corrupt_archive_is_invalid_location() {
        let dir = tempdir().expect("temp dir");
        let jar = dir.path().join("broken.jar");
        fs::write(&jar, b"garbage").expect("write");
        let error = ClassResolver::new()
            .resolve("a.B", Some(jar.as_path()))
            .expect_err("corrupt archive");
        assert!(matches!(
            error,
            ResolveError::InvalidLocation {
                source: Some(SourceError::Zip { .. }),
                ..
            }
        ));
    }

    #[test]
    fn external_jar_is_searched_after_parent() {
        let dir = tempdir().expect("temp dir");
        let classpath = dir.path().join("classes");
        write_class(
            &classpath,
            "shared.Thing",
            &ClassFileBuilder::new("shared.Thing").field(0x0001, "fromParent", "I").build(),
        );

        let jar = dir.path().join("lib.jar");
        write_jar(
            &jar,
            &[
                (
                    class_entry_name("shared.Thing"),
                    ClassFileBuilder::new("shared.Thing").field(0x0001, "fromJar", "I").build(),
                ),
                (
                    class_entry_name("lib.Only"),
                    ClassFileBuilder::new("lib.Only").build(),
                ),
            ],
        )
        .expect("write jar");

        let resolver = ClassResolver::new().with_classpath([classpath.clone()]);
        let shared = resolver.resolve("shared.Thing", Some(jar.as_path())).expect("shared");
        assert!(shared.origin().starts_with(&classpath.display().to_string()));

        let only = resolver.resolve("lib.Only", Some(jar.as_path())).expect("jar only");
        assert!(only.origin().contains("lib.jar!/lib/Only.class"));

        // Without the external unit the jar's class is invisible.
        assert!(matches!(
            resolver.resolve("lib.Only", None),
            Err(ResolveError::ClassNotFound { .. })
        ));
    }

    #[test]
    fn mismatched_declared_name_is_not_found() {
        let dir = tempdir().expect("temp dir");
        write_class(dir.path(), "a.Expected", &ClassFileBuilder::new("a.Actual").build());

        let error = ClassResolver::new()
            .resolve("a.Expected", Some(dir.path()))
            .expect_err("name mismatch");
        assert!(matches!(error, ResolveError::ClassNotFound { ref name } if name == "a.Expected"));
    }

    #[test]
    fn unparsable_class_is_class_format_error() {
        let dir = tempdir().expect("temp dir");
        write_class(dir.path(), "a.Junk", b"\xCA\xFE\xBA\xBE\x00");

        let error = ClassResolver::new()
            .resolve("a.Junk", Some(dir.path()))
            .expect_err("truncated class");
        assert!(matches!(
            error,
            ResolveError::ClassFormat {
                source: ClassParseError::UnexpectedEof,
                ..
            }
        ));
    }

    #[test]
    fn single_class_file_as_external_unit() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("Tool.class");
        fs::write(&path, ClassFileBuilder::new("org.Tool").build()).expect("write");

        let class = ClassResolver::new()
            .resolve("org.Tool", Some(path.as_path()))
            .expect("resolve single file");
        assert_eq!(class.name(), "org.Tool");
    }

    #[test]
    fn java_home_runtime_is_part_of_default_context() {
        let home = tempdir().expect("temp dir");
        let lib = home.path().join("lib");
        fs::create_dir_all(&lib).expect("lib");
        write_jar(
            &lib.join("rt.jar"),
            &[(
                class_entry_name("java.lang.String"),
                ClassFileBuilder::new("java.lang.String").build(),
            )],
        )
        .expect("write rt.jar");

        let resolver = ClassResolver::new().with_java_home(home.path());
        let class = resolver.resolve("java.lang.String", None).expect("resolve");
        assert_eq!(class.name(), "java.lang.String");
        assert!(matches!(
            resolver.resolve("java.lang.Nope", None),
            Err(ResolveError::ClassNotFound { .. })
        ));
    }

    #[test]
    fn jmod_runtime_resolves_platform_classes() {
        let home = tempdir().expect("temp dir");
        let jmods = home.path().join("jmods");
        fs::create_dir_all(&jmods).expect("jmods");
        write_jmod(
            &jmods.join("java.base.jmod"),
            &[(
                class_entry_name("java.lang.Object"),
                ClassFileBuilder::new("java.lang.Object").build(),
            )],
        )
        .expect("write jmod");

        let resolver = ClassResolver::new().with_java_home(home.path());
        let class = resolver.resolve("java.lang.Object", None).expect("resolve");
        assert_eq!(class.name(), "java.lang.Object");
        assert!(class.origin().contains("java.base.jmod!/classes/"));
    }
}
