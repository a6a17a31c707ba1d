//! Turning raw member table entries into accessible member descriptors.

use crate::classfile::{ClassFile, ClassParseError, MemberInfo};
use crate::flags::{AccessFlags, MemberKind};
use crate::loader::ResolvedClass;
use crate::types::{parse_field_descriptor, parse_method_descriptor, JavaType};
use thiserror::Error;

const CONSTRUCTOR_NAME: &str = "<init>";
const STATIC_INITIALIZER_NAME: &str = "<clinit>";

#[derive(Debug, Error)]
pub enum MemberAccessError {
    #[error("cannot read the name of {kind} #{position} in {owner}")]
    Name {
        kind: MemberKind,
        owner: String,
        position: usize,
        #[source]
        source: ClassParseError,
    },
    #[error("cannot read the type of {kind} '{name}' in {owner}")]
    Descriptor {
        kind: MemberKind,
        owner: String,
        name: String,
        #[source]
        source: ClassParseError,
    },
    #[error("access to {kind} '{name}' in {owner} was denied: {reason}")]
    Denied {
        kind: MemberKind,
        owner: String,
        name: String,
        reason: String,
    },
}

/// An undecoded member table entry of a resolved class.
#[derive(Debug, Clone, Copy)]
pub struct RawMember<'c> {
    pub kind: MemberKind,
    /// Index in the class file's field or method table.
    pub position: usize,
    pub info: &'c MemberInfo,
    class: &'c ClassFile,
}

impl<'c> RawMember<'c> {
    pub fn owner(&self) -> &'c str {
        let class: &'c ClassFile = self.class;
        &class.name
    }

    pub fn flags(&self) -> AccessFlags {
        AccessFlags::from_bits_retain(self.info.access_flags)
    }

    pub fn name(&self) -> Result<&'c str, MemberAccessError> {
        let class: &'c ClassFile = self.class;
        class
            .utf8(self.info.name_index)
            .map_err(|source| MemberAccessError::Name {
                kind: self.kind,
                owner: self.class.name.clone(),
                position: self.position,
                source,
            })
    }

    pub fn descriptor(&self) -> Result<&'c str, MemberAccessError> {
        let class: &'c ClassFile = self.class;
        class
            .utf8(self.info.descriptor_index)
            .map_err(|source| self.descriptor_error(source))
    }

    fn descriptor_error(&self, source: ClassParseError) -> MemberAccessError {
        MemberAccessError::Descriptor {
            kind: self.kind,
            owner: self.class.name.clone(),
            name: self.name().unwrap_or("?").to_string(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub flags: AccessFlags,
    pub name: String,
    pub field_type: JavaType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub flags: AccessFlags,
    pub name: String,
    pub parameters: Vec<JavaType>,
    pub return_type: JavaType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructorDescriptor {
    pub flags: AccessFlags,
    /// The declaring class's binary name.
    pub name: String,
    pub parameters: Vec<JavaType>,
}

/// A member whose metadata has been fully decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberDescriptor {
    Field(FieldDescriptor),
    Method(MethodDescriptor),
    Constructor(ConstructorDescriptor),
}

impl MemberDescriptor {
    pub fn kind(&self) -> MemberKind {
        match self {
            MemberDescriptor::Field(_) => MemberKind::Field,
            MemberDescriptor::Method(_) => MemberKind::Method,
            MemberDescriptor::Constructor(_) => MemberKind::Constructor,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            MemberDescriptor::Field(field) => &field.name,
            MemberDescriptor::Method(method) => &method.name,
            MemberDescriptor::Constructor(constructor) => &constructor.name,
        }
    }

    pub fn flags(&self) -> AccessFlags {
        match self {
            MemberDescriptor::Field(field) => field.flags,
            MemberDescriptor::Method(method) => method.flags,
            MemberDescriptor::Constructor(constructor) => constructor.flags,
        }
    }

    pub fn modifiers(&self) -> String {
        self.flags().modifiers(self.kind())
    }
}

/// The privileged-access capability: makes one declared member accessible
/// regardless of its visibility, or explains why it cannot.
pub trait AccessPolicy {
    fn force_accessible(&self, member: RawMember<'_>) -> Result<MemberDescriptor, MemberAccessError>;
}

/// Reads everything straight from the class file, where non-public members
/// are as visible as public ones. Only malformed metadata fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassFileAccess;

impl AccessPolicy for ClassFileAccess {
    fn force_accessible(&self, member: RawMember<'_>) -> Result<MemberDescriptor, MemberAccessError> {
        let name = member.name()?;
        let descriptor = member.descriptor()?;
        let flags = member.flags();

        let described = match member.kind {
            MemberKind::Field => {
                let field_type =
                    parse_field_descriptor(descriptor).map_err(|e| member.descriptor_error(e))?;
                MemberDescriptor::Field(FieldDescriptor {
                    flags,
                    name: name.to_string(),
                    field_type,
                })
            }
            MemberKind::Method => {
                let signature =
                    parse_method_descriptor(descriptor).map_err(|e| member.descriptor_error(e))?;
                MemberDescriptor::Method(MethodDescriptor {
                    flags,
                    name: name.to_string(),
                    parameters: signature.parameters,
                    return_type: signature.return_type,
                })
            }
            MemberKind::Constructor => {
                let signature =
                    parse_method_descriptor(descriptor).map_err(|e| member.descriptor_error(e))?;
                MemberDescriptor::Constructor(ConstructorDescriptor {
                    flags,
                    name: member.owner().to_string(),
                    parameters: signature.parameters,
                })
            }
        };
        Ok(described)
    }
}

impl ResolvedClass {
    /// Declared members of one kind, in class file order.
    ///
    /// Methods exclude constructors and the static initializer. A method
    /// whose name cannot be read is kept in the method list so the failure
    /// surfaces when it is made accessible.
    pub fn declared_members(&self, kind: MemberKind) -> Vec<RawMember<'_>> {
        let class = self.class_file();
        let table = match kind {
            MemberKind::Field => &class.fields,
            MemberKind::Method | MemberKind::Constructor => &class.methods,
        };

        table
            .iter()
            .enumerate()
            .map(|(position, info)| RawMember {
                kind,
                position,
                info,
                class,
            })
            .filter(|member| {
                let name = member.name().ok();
                match kind {
                    MemberKind::Field => true,
                    MemberKind::Method => {
                        !matches!(name, Some(CONSTRUCTOR_NAME | STATIC_INITIALIZER_NAME))
                    }
                    MemberKind::Constructor => name == Some(CONSTRUCTOR_NAME),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::parse_class;
    use crate::testing::ClassFileBuilder;

    fn resolved(builder: ClassFileBuilder) -> ResolvedClass {
        ResolvedClass::new(parse_class(&builder.build()).expect("parse"), "test")
    }

    fn names(class: &ResolvedClass, kind: MemberKind) -> Vec<String> {
        class
            .declared_members(kind)
            .into_iter()
            .map(|member| ClassFileAccess.force_accessible(member).expect("accessible"))
            .map(|member| member.name().to_string())
            .collect()
    }

    #[test]
    fn partitions_methods_and_constructors() {
        let class = resolved(
            ClassFileBuilder::new("demo.Counter")
                .method(0x0008, "<clinit>", "()V")
                .method(0x0001, "<init>", "()V")
                .method(0x0001, "increment", "()V")
                .method(0x0002, "<init>", "(I)V")
                .method(0x0009, "zero", "()Ldemo/Counter;"),
        );

        assert_eq!(names(&class, MemberKind::Method), vec!["increment", "zero"]);
        assert_eq!(
            names(&class, MemberKind::Constructor),
            vec!["demo.Counter", "demo.Counter"]
        );
    }

    #[test]
    fn private_members_are_accessible() {
        let class = resolved(
            ClassFileBuilder::new("demo.Secret")
                .field(0x001A, "KEY", "Ljava/lang/String;")
                .method(0x0002, "reveal", "(I[Ljava/lang/Object;)Ljava/lang/String;"),
        );

        let field = ClassFileAccess
            .force_accessible(class.declared_members(MemberKind::Field)[0])
            .expect("field");
        assert_eq!(field.modifiers(), "private static final");
        match field {
            MemberDescriptor::Field(field) => {
                assert_eq!(field.field_type, JavaType::Reference("java.lang.String".into()))
            }
            other => panic!("unexpected member: {other:?}"),
        }

        let method = ClassFileAccess
            .force_accessible(class.declared_members(MemberKind::Method)[0])
            .expect("method");
        match method {
            MemberDescriptor::Method(method) => {
                assert_eq!(method.name, "reveal");
                assert_eq!(method.parameters.len(), 2);
                assert_eq!(method.parameters[1].to_string(), "java.lang.Object[]");
                assert_eq!(method.return_type.to_string(), "java.lang.String");
            }
            other => panic!("unexpected member: {other:?}"),
        }
    }

    #[test]
    fn malformed_descriptor_fails_only_that_member() {
        let class = resolved(
            ClassFileBuilder::new("demo.Odd")
                .field(0x0001, "good", "J")
                .field(0x0001, "bad", "Lunterminated")
                .field(0x0001, "alsoGood", "Z"),
        );

        let results: Vec<_> = class
            .declared_members(MemberKind::Field)
            .into_iter()
            .map(|member| ClassFileAccess.force_accessible(member))
            .collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(
            &results[1],
            Err(MemberAccessError::Descriptor { name, .. }) if name == "bad"
        ));
        assert!(results[2].is_ok());
    }

    #[test]
    fn unreadable_method_name_stays_in_method_list() {
        let class = resolved(
            ClassFileBuilder::new("demo.Broken")
                .raw_method(0x0001, 500, 500)
                .method(0x0001, "<init>", "()V"),
        );

        let methods = class.declared_members(MemberKind::Method);
        assert_eq!(methods.len(), 1);
        assert!(matches!(
            ClassFileAccess.force_accessible(methods[0]),
            Err(MemberAccessError::Name { position: 0, .. })
        ));
        assert_eq!(class.declared_members(MemberKind::Constructor).len(), 1);
    }
}
