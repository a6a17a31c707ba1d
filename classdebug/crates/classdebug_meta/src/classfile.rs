use crate::flags::AccessFlags;
use thiserror::Error;

const MAGIC: u32 = 0xCAFE_BABE;

#[derive(Debug, Error)]
pub enum ClassParseError {
    #[error("unexpected end of class file")]
    UnexpectedEof,
    #[error("invalid class file magic header")]
    InvalidMagic,
    #[error("unsupported constant pool tag {tag}")]
    UnsupportedConstant { tag: u8 },
    #[error("invalid constant pool index {index}")]
    InvalidConstantIndex { index: u16 },
    #[error("invalid modified UTF-8 string at constant pool index {index}")]
    InvalidUtf8 { index: u16 },
    #[error("malformed descriptor: {0}")]
    InvalidDescriptor(String),
}

/// A parsed class file. Member tables are kept undecoded so that a single
/// broken member does not prevent inspecting the rest of the class.
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub access_flags: AccessFlags,
    /// Binary name with `.` separators.
    pub name: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    constant_pool: ConstantPool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes_count: u16,
}

impl ClassFile {
    pub fn utf8(&self, index: u16) -> Result<&str, ClassParseError> {
        self.constant_pool.utf8(index)
    }
}

pub fn parse_class(bytes: &[u8]) -> Result<ClassFile, ClassParseError> {
    let mut reader = ClassReader::new(bytes);
    reader.expect_magic()?;
    let minor_version = reader.read_u2()?;
    let major_version = reader.read_u2()?;
    let constant_pool = ConstantPool::parse(&mut reader)?;

    let access_flags = AccessFlags::from_bits_retain(reader.read_u2()?);
    let this_class = reader.read_u2()?;
    let super_class = reader.read_u2()?;

    let interfaces_count = reader.read_u2()?;
    let mut interfaces = Vec::with_capacity(interfaces_count as usize);
    for _ in 0..interfaces_count {
        let index = reader.read_u2()?;
        interfaces.push(constant_pool.binary_class_name(index)?);
    }

    let fields = read_members(&mut reader)?;
    let methods = read_members(&mut reader)?;

    // Class attributes carry nothing the inspector reports.
    let attributes_count = reader.read_u2()?;
    skip_attributes(&mut reader, attributes_count)?;

    let name = constant_pool.binary_class_name(this_class)?;
    let super_class = if super_class == 0 {
        None
    } else {
        Some(constant_pool.binary_class_name(super_class)?)
    };

    Ok(ClassFile {
        minor_version,
        major_version,
        access_flags,
        name,
        super_class,
        interfaces,
        fields,
        methods,
        constant_pool,
    })
}

fn read_members(reader: &mut ClassReader<'_>) -> Result<Vec<MemberInfo>, ClassParseError> {
    let count = reader.read_u2()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let access_flags = reader.read_u2()?;
        let name_index = reader.read_u2()?;
        let descriptor_index = reader.read_u2()?;
        let attributes_count = reader.read_u2()?;
        skip_attributes(reader, attributes_count)?;
        members.push(MemberInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes_count,
        });
    }
    Ok(members)
}

#[derive(Debug, Clone)]
enum Constant {
    Utf8(Result<String, ()>),
    Class { name_index: u16 },
    Other,
    Unusable,
}

#[derive(Debug, Clone)]
struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn parse(reader: &mut ClassReader<'_>) -> Result<Self, ClassParseError> {
        let count = reader.read_u2()? as usize;
        let mut entries = Vec::with_capacity(count);
        entries.push(Constant::Unusable); // index 0 unused

        let mut index = 1;
        while index < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                1 => {
                    let length = reader.read_u2()? as usize;
                    let bytes = reader.read_slice(length)?;
                    Constant::Utf8(decode_modified_utf8(bytes))
                }
                3 | 4 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                5 | 6 => {
                    // 8-byte constants occupy two pool slots.
                    reader.skip(8)?;
                    entries.push(Constant::Other);
                    index += 1;
                    Constant::Unusable
                }
                7 => {
                    let name_index = reader.read_u2()?;
                    Constant::Class { name_index }
                }
                8 | 16 | 19 | 20 => {
                    reader.skip(2)?;
                    Constant::Other
                }
                9 | 10 | 11 | 12 | 17 | 18 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                15 => {
                    reader.skip(3)?;
                    Constant::Other
                }
                other => return Err(ClassParseError::UnsupportedConstant { tag: other }),
            };

            entries.push(entry);
            index += 1;
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&Constant, ClassParseError> {
        self.entries
            .get(index as usize)
            .ok_or(ClassParseError::InvalidConstantIndex { index })
    }

    fn utf8(&self, index: u16) -> Result<&str, ClassParseError> {
        match self.get(index)? {
            Constant::Utf8(Ok(value)) => Ok(value.as_str()),
            Constant::Utf8(Err(())) => Err(ClassParseError::InvalidUtf8 { index }),
            _ => Err(ClassParseError::InvalidConstantIndex { index }),
        }
    }

    fn binary_class_name(&self, index: u16) -> Result<String, ClassParseError> {
        match self.get(index)? {
            Constant::Class { name_index } => Ok(self.utf8(*name_index)?.replace('/', ".")),
            _ => Err(ClassParseError::InvalidConstantIndex { index }),
        }
    }
}

/// Decodes the JVM's modified UTF-8: `NUL` is encoded as `C0 80` and
/// supplementary characters as two three-byte surrogate halves.
fn decode_modified_utf8(bytes: &[u8]) -> Result<String, ()> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(text.to_string());
    }

    let mut units = Vec::with_capacity(bytes.len());
    let mut pos = 0;
    while pos < bytes.len() {
        let first = bytes[pos] as u16;
        let (unit, width) = match first {
            0x01..=0x7F => (first, 1),
            0xC0..=0xDF => {
                let second = continuation(bytes, pos + 1)?;
                (((first & 0x1F) << 6) | second, 2)
            }
            0xE0..=0xEF => {
                let second = continuation(bytes, pos + 1)?;
                let third = continuation(bytes, pos + 2)?;
                (((first & 0x0F) << 12) | (second << 6) | third, 3)
            }
            _ => return Err(()),
        };
        units.push(unit);
        pos += width;
    }

    String::from_utf16(&units).map_err(|_| ())
}

fn continuation(bytes: &[u8], pos: usize) -> Result<u16, ()> {
    match bytes.get(pos) {
        Some(byte) if byte & 0xC0 == 0x80 => Ok((byte & 0x3F) as u16),
        _ => Err(()),
    }
}

struct ClassReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn expect_magic(&mut self) -> Result<(), ClassParseError> {
        if self.read_u4()? != MAGIC {
            return Err(ClassParseError::InvalidMagic);
        }
        Ok(())
    }

    fn read_u1(&mut self) -> Result<u8, ClassParseError> {
        Ok(self.read_slice(1)?[0])
    }

    fn read_u2(&mut self) -> Result<u16, ClassParseError> {
        let bytes = self.read_slice(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u4(&mut self) -> Result<u32, ClassParseError> {
        let bytes = self.read_slice(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], ClassParseError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(ClassParseError::UnexpectedEof)?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<(), ClassParseError> {
        self.read_slice(len).map(|_| ())
    }
}

fn skip_attributes(reader: &mut ClassReader<'_>, count: u16) -> Result<(), ClassParseError> {
    for _ in 0..count {
        reader.read_u2()?; // attribute_name_index
        let length = reader.read_u4()? as usize;
        reader.skip(length)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ClassFileBuilder;

    #[test]
    fn parses_names_and_member_tables_in_order() {
        let bytes = ClassFileBuilder::new("com.example.Sample")
            .interface("java.io.Serializable")
            .field(0x0012, "value", "[B")
            .attribute("ConstantValue", &[0x00, 0x01])
            .field(0x0002, "hash", "I")
            .method(0x0001, "<init>", "()V")
            .method(0x0001, "length", "()I")
            .build();

        let class = parse_class(&bytes).expect("parse class");
        assert_eq!(class.name, "com.example.Sample");
        assert_eq!((class.major_version, class.minor_version), (52, 0));
        assert_eq!(class.access_flags, AccessFlags::from_bits_retain(0x0021));
        assert_eq!(class.super_class.as_deref(), Some("java.lang.Object"));
        assert_eq!(class.interfaces, vec!["java.io.Serializable".to_string()]);

        let field_names: Vec<&str> = class
            .fields
            .iter()
            .map(|field| class.utf8(field.name_index).expect("field name"))
            .collect();
        assert_eq!(field_names, vec!["value", "hash"]);
        assert_eq!(class.fields[0].attributes_count, 1);

        let method_names: Vec<&str> = class
            .methods
            .iter()
            .map(|method| class.utf8(method.name_index).expect("method name"))
            .collect();
        assert_eq!(method_names, vec!["<init>", "length"]);
    }

    #[test]
    fn rejects_bad_magic_and_truncation() {
        assert!(matches!(
            parse_class(&[0xCA, 0xFE, 0xBA, 0xBF]),
            Err(ClassParseError::InvalidMagic)
        ));

        let bytes = ClassFileBuilder::new("a.B").field(0, "x", "I").build();
        assert!(matches!(
            parse_class(&bytes[..bytes.len() - 3]),
            Err(ClassParseError::UnexpectedEof)
        ));
    }

    #[test]
    fn interface_header_without_super_class() {
        let bytes = ClassFileBuilder::new("Top")
            .access_flags(0x0601)
            .without_super_class()
            .build();
        let class = parse_class(&bytes).expect("parse");
        assert_eq!(class.name, "Top");
        assert!(class.access_flags.contains(AccessFlags::INTERFACE | AccessFlags::ABSTRACT));
        assert_eq!(class.super_class, None);
        assert!(class.interfaces.is_empty());
    }

    #[test]
    fn decodes_modified_utf8_nul_and_surrogates() {
        assert_eq!(decode_modified_utf8(&[0x61, 0xC0, 0x80, 0x62]), Ok("a\0b".to_string()));
        // U+1F600 as a CESU-8 surrogate pair
        let smile = [0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80];
        assert_eq!(decode_modified_utf8(&smile), Ok("\u{1F600}".to_string()));
        assert!(decode_modified_utf8(&[0xC0]).is_err());
    }

    #[test]
    fn invalid_member_name_index_is_deferred_to_lookup() {
        let bytes = ClassFileBuilder::new("a.Broken")
            .raw_method(0x0001, 999, 999)
            .build();
        let class = parse_class(&bytes).expect("member indices are not validated eagerly");
        assert!(matches!(
            class.utf8(class.methods[0].name_index),
            Err(ClassParseError::InvalidConstantIndex { index: 999 })
        ));
    }
}
