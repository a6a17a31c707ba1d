//! Member enumeration and the textual report.

use crate::access::{AccessPolicy, ClassFileAccess, MemberAccessError, MemberDescriptor};
use crate::flags::MemberKind;
use crate::loader::ResolvedClass;
use std::error::Error;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which declared members a report lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DebugTarget {
    #[default]
    Fields,
    Methods,
    Constructors,
}

impl DebugTarget {
    pub const ALL: [DebugTarget; 3] = [
        DebugTarget::Fields,
        DebugTarget::Methods,
        DebugTarget::Constructors,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DebugTarget::Fields => "FIELDS",
            DebugTarget::Methods => "METHODS",
            DebugTarget::Constructors => "CONSTRUCTORS",
        }
    }

    pub fn member_kind(self) -> MemberKind {
        match self {
            DebugTarget::Fields => MemberKind::Field,
            DebugTarget::Methods => MemberKind::Method,
            DebugTarget::Constructors => MemberKind::Constructor,
        }
    }

    fn section_title(self) -> &'static str {
        match self {
            DebugTarget::Fields => "Fields",
            DebugTarget::Methods => "Methods",
            DebugTarget::Constructors => "Constructors",
        }
    }
}

impl fmt::Display for DebugTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown target '{0}' (expected FIELDS, METHODS or CONSTRUCTORS)")]
pub struct UnknownTarget(pub String);

impl FromStr for DebugTarget {
    type Err = UnknownTarget;

    /// Case-sensitive: only the upper-case names are accepted.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        DebugTarget::ALL
            .into_iter()
            .find(|target| target.as_str() == value)
            .ok_or_else(|| UnknownTarget(value.to_string()))
    }
}

/// Receives report lines as they are produced.
pub trait ReportSink {
    fn line(&mut self, line: &str);

    fn error(&mut self, error: &(dyn Error + 'static));
}

/// Emits report lines as `INFO` events and errors as `ERROR` events.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn line(&mut self, line: &str) {
        tracing::info!("{line}");
    }

    fn error(&mut self, error: &(dyn Error + 'static)) {
        tracing::error!("{}", error_chain(error));
    }
}

/// Keeps everything in memory; errors are stored with their causes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollectingSink {
    pub lines: Vec<String>,
    pub errors: Vec<String>,
}

impl ReportSink for CollectingSink {
    fn line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    fn error(&mut self, error: &(dyn Error + 'static)) {
        self.errors.push(error_chain(error));
    }
}

/// `outer: cause: root cause`
pub fn error_chain(error: &(dyn Error + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

pub fn header_lines(class_name: &str, target: DebugTarget) -> [String; 2] {
    [
        format!("--- Debugging {target} in class '{class_name}' ---"),
        format!("-- {}", target.section_title()),
    ]
}

/// Report lines for one accessible member.
///
/// Types are written in Java source form (`byte[]`, `java.lang.String`,
/// `int`), not the `Class::toString` form (`class [B`,
/// `interface java.util.Comparator`).
pub fn render(member: &MemberDescriptor) -> Vec<String> {
    match member {
        MemberDescriptor::Field(field) => vec![format!(
            "{:<30.30} {:<40.100} {}",
            member.modifiers(),
            field.field_type.to_string(),
            field.name
        )],
        MemberDescriptor::Method(method) => {
            invocable_lines(&method.name, method.parameters.iter().map(ToString::to_string))
        }
        MemberDescriptor::Constructor(constructor) => invocable_lines(
            &constructor.name,
            constructor.parameters.iter().map(ToString::to_string),
        ),
    }
}

fn invocable_lines(name: &str, parameters: impl Iterator<Item = String>) -> Vec<String> {
    let mut lines = vec![format!("Name: {name}"), "- Parameters".to_string()];
    lines.extend(parameters.map(|parameter| format!("  {parameter}")));
    lines
}

/// Walks the declared members of a class and reports them.
#[derive(Debug, Clone, Default)]
pub struct Inspector<P = ClassFileAccess> {
    policy: P,
}

impl Inspector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<P: AccessPolicy> Inspector<P> {
    pub fn with_policy(policy: P) -> Self {
        Self { policy }
    }

    /// Every declared member of the target category, in declaration order,
    /// each either accessible or with the reason it is not.
    pub fn describe(
        &self,
        class: &ResolvedClass,
        target: DebugTarget,
    ) -> Vec<Result<MemberDescriptor, MemberAccessError>> {
        class
            .declared_members(target.member_kind())
            .into_iter()
            .map(|member| self.policy.force_accessible(member))
            .collect()
    }

    /// Writes the report to `sink` as members are made accessible. A member
    /// that fails is reported as an error and the walk continues.
    pub fn inspect(&self, class: &ResolvedClass, target: DebugTarget, sink: &mut dyn ReportSink) {
        for line in header_lines(class.name(), target) {
            sink.line(&line);
        }
        for member in class.declared_members(target.member_kind()) {
            match self.policy.force_accessible(member) {
                Ok(described) => {
                    for line in render(&described) {
                        sink.line(&line);
                    }
                }
                Err(error) => sink.error(&error),
            }
        }
    }
}
