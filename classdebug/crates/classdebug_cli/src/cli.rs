use classdebug_meta::{expand_classpath, DebugTarget};
use clap::{CommandFactory, Parser};
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

pub const DEFAULT_CLASS: &str = "java.lang.String";

#[derive(Debug, Parser)]
#[command(name = "classdebug")]
#[command(version, about = "Print the declared members of a JVM class, including non-public ones")]
pub struct Cli {
    /// Library (JAR, JMOD, class directory or .class file) to load the class from
    #[arg(long, default_value = "")]
    pub file: String,

    /// Which declared members to print
    #[arg(long, default_value = "FIELDS", value_parser = parse_target)]
    pub target: DebugTarget,

    /// Fully-qualified binary name of the class to inspect
    #[arg(long = "class", default_value = DEFAULT_CLASS)]
    pub class_name: String,

    /// Additional classpath entries searched after the Java runtime (defaults to $CLASSPATH)
    #[arg(long)]
    pub classpath: Option<String>,

    /// Java installation providing the platform classes (defaults to $JAVA_HOME or `java` on PATH)
    #[arg(long)]
    pub java_home: Option<PathBuf>,

    /// Log filter, a level or `target=level` list such as `debug` (defaults to $RUST_LOG, then `info`)
    #[arg(long)]
    pub log_level: Option<String>,
}

fn parse_target(value: &str) -> Result<DebugTarget, String> {
    value.parse::<DebugTarget>().map_err(|error| error.to_string())
}

impl Cli {
    /// Parses the process arguments, ignoring unrecognized options.
    pub fn parse_lenient() -> Self {
        Self::parse_from(retain_known_options(env::args_os()))
    }

    pub fn into_configuration(self) -> Configuration {
        let file = if self.file.is_empty() {
            None
        } else {
            Some(PathBuf::from(self.file))
        };
        let classpath = self
            .classpath
            .or_else(|| env::var("CLASSPATH").ok())
            .map(|raw| expand_classpath(&[raw]))
            .unwrap_or_default();

        Configuration {
            file,
            target: self.target,
            class_name: self.class_name,
            classpath,
            java_home: self.java_home,
        }
    }
}

/// Immutable run configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub file: Option<PathBuf>,
    pub target: DebugTarget,
    pub class_name: String,
    pub classpath: Vec<PathBuf>,
    pub java_home: Option<PathBuf>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            file: None,
            target: DebugTarget::Fields,
            class_name: DEFAULT_CLASS.to_string(),
            classpath: Vec::new(),
            java_home: None,
        }
    }
}

/// Option names declared on [`Cli`], split by whether they take a value.
/// Includes the generated help and version flags.
#[derive(Debug, Default)]
struct KnownOptions {
    with_value: Vec<String>,
    flags: Vec<String>,
}

impl KnownOptions {
    fn from_cli() -> Self {
        let mut command = Cli::command();
        command.build();

        let mut known = Self::default();
        for arg in command.get_arguments() {
            let names = arg
                .get_long()
                .map(|long| format!("--{long}"))
                .into_iter()
                .chain(arg.get_short().map(|short| format!("-{short}")));
            if arg.get_action().takes_values() {
                known.with_value.extend(names);
            } else {
                known.flags.extend(names);
            }
        }
        known
    }

    fn takes_value(&self, name: &str) -> bool {
        self.with_value.iter().any(|known| known == name)
    }

    fn is_flag(&self, name: &str) -> bool {
        self.flags.iter().any(|known| known == name)
    }
}

/// Keeps the program name, recognized options with their values (both
/// `--opt value` and `--opt=value`), and help/version flags. Everything
/// else is dropped.
pub fn retain_known_options<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let known = KnownOptions::from_cli();
    let mut args = args.into_iter().map(Into::into);
    let mut kept: Vec<OsString> = args.next().into_iter().collect();

    while let Some(arg) = args.next() {
        let Some(text) = arg.to_str() else {
            continue;
        };
        if known.takes_value(text) {
            kept.push(arg.clone());
            if let Some(value) = args.next() {
                kept.push(value);
            }
        } else if known.is_flag(text)
            || text
                .split_once('=')
                .map(|(name, _)| known.takes_value(name))
                .unwrap_or(false)
        {
            kept.push(arg.clone());
        }
    }
    kept
}
