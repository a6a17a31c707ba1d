// classdebug_meta - JVM class resolution and declared-member inspection
//!
//! Classes are located in a loading context (the Java runtime image, the
//! classpath, or an external library chained to them), parsed from their
//! class file bytes, and their declared fields, methods or constructors are
//! reported regardless of visibility.

mod access;
mod classfile;
mod flags;
mod inspect;
mod jdk;
mod jimage;
mod loader;
mod source;
mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use access::{
    AccessPolicy, ClassFileAccess, ConstructorDescriptor, FieldDescriptor, MemberAccessError,
    MemberDescriptor, MethodDescriptor, RawMember,
};
pub use classfile::{parse_class, ClassFile, ClassParseError, MemberInfo};
pub use flags::{AccessFlags, MemberKind};
pub use inspect::{
    error_chain, header_lines, render, CollectingSink, DebugTarget, Inspector, ReportSink,
    TracingSink, UnknownTarget,
};
pub use jdk::{detect_java_home, expand_classpath, runtime_sources};
pub use jimage::RuntimeImage;
pub use loader::{ClassResolver, LoadingContext, ResolveError, ResolvedClass};
pub use source::{
    ArchiveSource, ClassBytes, ClassFileSource, ClassSource, DirectorySource, SourceError,
};
pub use types::{parse_field_descriptor, parse_method_descriptor, JavaMethodSignature, JavaType};
