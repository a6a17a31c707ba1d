//! Access flags shared by classes, fields and methods.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Raw `access_flags` bits from the class file.
    ///
    /// Several bits are overloaded per member kind (`0x0040` is `volatile`
    /// on fields but `bridge` on methods), so textual rendering always goes
    /// through [`AccessFlags::modifiers`] with the member kind.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
    }
}

/// The three kinds of declared members a class exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Field,
    Method,
    Constructor,
}

impl MemberKind {
    fn modifier_mask(self) -> AccessFlags {
        match self {
            MemberKind::Field => {
                AccessFlags::PUBLIC
                    | AccessFlags::PRIVATE
                    | AccessFlags::PROTECTED
                    | AccessFlags::STATIC
                    | AccessFlags::FINAL
                    | AccessFlags::TRANSIENT
                    | AccessFlags::VOLATILE
            }
            MemberKind::Method => {
                AccessFlags::PUBLIC
                    | AccessFlags::PRIVATE
                    | AccessFlags::PROTECTED
                    | AccessFlags::ABSTRACT
                    | AccessFlags::STATIC
                    | AccessFlags::FINAL
                    | AccessFlags::SYNCHRONIZED
                    | AccessFlags::NATIVE
                    | AccessFlags::STRICT
            }
            MemberKind::Constructor => {
                AccessFlags::PUBLIC | AccessFlags::PRIVATE | AccessFlags::PROTECTED
            }
        }
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MemberKind::Field => "field",
            MemberKind::Method => "method",
            MemberKind::Constructor => "constructor",
        };
        f.write_str(label)
    }
}

/// Canonical keyword order used by the JVM's own modifier rendering.
const MODIFIER_ORDER: &[(AccessFlags, &str)] = &[
    (AccessFlags::PUBLIC, "public"),
    (AccessFlags::PROTECTED, "protected"),
    (AccessFlags::PRIVATE, "private"),
    (AccessFlags::ABSTRACT, "abstract"),
    (AccessFlags::STATIC, "static"),
    (AccessFlags::FINAL, "final"),
    (AccessFlags::TRANSIENT, "transient"),
    (AccessFlags::VOLATILE, "volatile"),
    (AccessFlags::SYNCHRONIZED, "synchronized"),
    (AccessFlags::NATIVE, "native"),
    (AccessFlags::STRICT, "strictfp"),
];

impl AccessFlags {
    /// Space separated modifier keywords meaningful for `kind`.
    pub fn modifiers(self, kind: MemberKind) -> String {
        let visible = self & kind.modifier_mask();
        MODIFIER_ORDER
            .iter()
            .filter(|(flag, _)| visible.contains(*flag))
            .map(|(_, keyword)| *keyword)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
