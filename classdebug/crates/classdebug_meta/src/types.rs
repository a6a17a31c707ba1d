use crate::classfile::ClassParseError;
use std::fmt;

/// A JVM type as named by a field or method descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JavaType {
    Primitive(&'static str),
    /// Binary name with `.` separators, e.g. `java.util.Map$Entry`.
    Reference(String),
    Array {
        element_type: Box<JavaType>,
        dimensions: usize,
    },
    Void,
}

impl fmt::Display for JavaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JavaType::Primitive(name) => f.write_str(name),
            JavaType::Reference(name) => f.write_str(name),
            JavaType::Array {
                element_type,
                dimensions,
            } => {
                write!(f, "{element_type}")?;
                for _ in 0..*dimensions {
                    f.write_str("[]")?;
                }
                Ok(())
            }
            JavaType::Void => f.write_str("void"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaMethodSignature {
    pub parameters: Vec<JavaType>,
    pub return_type: JavaType,
}

pub fn parse_field_descriptor(descriptor: &str) -> Result<JavaType, ClassParseError> {
    let mut parser = DescriptorParser::new(descriptor);
    let ty = parser.parse_type()?;
    if parser.remaining() != 0 {
        return Err(ClassParseError::InvalidDescriptor(descriptor.to_string()));
    }
    Ok(ty)
}

pub fn parse_method_descriptor(descriptor: &str) -> Result<JavaMethodSignature, ClassParseError> {
    let mut parser = DescriptorParser::new(descriptor);
    parser.expect(b'(')?;
    let mut parameters = Vec::new();
    while !parser.peek_is(b')')? {
        parameters.push(parser.parse_type()?);
    }
    parser.expect(b')')?;
    let return_type = if parser.peek_is(b'V')? {
        parser.pos += 1;
        JavaType::Void
    } else {
        parser.parse_type()?
    };

    if parser.remaining() != 0 {
        return Err(ClassParseError::InvalidDescriptor(descriptor.to_string()));
    }

    Ok(JavaMethodSignature {
        parameters,
        return_type,
    })
}

struct DescriptorParser<'a> {
    descriptor: &'a str,
    pos: usize,
}

impl<'a> DescriptorParser<'a> {
    fn new(descriptor: &'a str) -> Self {
        Self { descriptor, pos: 0 }
    }

    fn bytes(&self) -> &'a [u8] {
        self.descriptor.as_bytes()
    }

    fn remaining(&self) -> usize {
        self.bytes().len().saturating_sub(self.pos)
    }

    fn truncated(&self) -> ClassParseError {
        ClassParseError::InvalidDescriptor(format!("truncated descriptor '{}'", self.descriptor))
    }

    fn expect(&mut self, byte: u8) -> Result<(), ClassParseError> {
        match self.bytes().get(self.pos) {
            Some(found) if *found == byte => {
                self.pos += 1;
                Ok(())
            }
            Some(_) => Err(ClassParseError::InvalidDescriptor(format!(
                "expected '{}' in descriptor '{}'",
                byte as char, self.descriptor
            ))),
            None => Err(self.truncated()),
        }
    }

    fn peek_is(&self, byte: u8) -> Result<bool, ClassParseError> {
        self.bytes()
            .get(self.pos)
            .map(|found| *found == byte)
            .ok_or_else(|| self.truncated())
    }

    fn parse_type(&mut self) -> Result<JavaType, ClassParseError> {
        let start = *self.bytes().get(self.pos).ok_or_else(|| self.truncated())?;
        let primitive = match start {
            b'B' => "byte",
            b'C' => "char",
            b'D' => "double",
            b'F' => "float",
            b'I' => "int",
            b'J' => "long",
            b'S' => "short",
            b'Z' => "boolean",
            b'L' => return self.parse_reference_type(),
            b'[' => return self.parse_array_type(),
            other => {
                return Err(ClassParseError::InvalidDescriptor(format!(
                    "unexpected descriptor tag '{}' in '{}'",
                    other as char, self.descriptor
                )))
            }
        };
        self.pos += 1;
        Ok(JavaType::Primitive(primitive))
    }

    fn parse_reference_type(&mut self) -> Result<JavaType, ClassParseError> {
        self.expect(b'L')?;
        let start = self.pos;
        let end = self.bytes()[start..]
            .iter()
            .position(|byte| *byte == b';')
            .map(|offset| start + offset)
            .ok_or_else(|| {
                ClassParseError::InvalidDescriptor(format!(
                    "unterminated reference in descriptor '{}'",
                    self.descriptor
                ))
            })?;
        if end == start {
            return Err(ClassParseError::InvalidDescriptor(format!(
                "empty class name in descriptor '{}'",
                self.descriptor
            )));
        }
        self.pos = end + 1; // consume ';'
        Ok(JavaType::Reference(
            self.descriptor[start..end].replace('/', "."),
        ))
    }

    fn parse_array_type(&mut self) -> Result<JavaType, ClassParseError> {
        let mut dimensions = 0;
        while self.remaining() > 0 && self.bytes()[self.pos] == b'[' {
            dimensions += 1;
            self.pos += 1;
        }
        let element = self.parse_type()?;
        Ok(JavaType::Array {
            element_type: Box::new(element),
            dimensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_descriptors_render_in_source_form() {
        let cases = [
            ("I", "int"),
            ("[B", "byte[]"),
            ("[[Ljava/lang/String;", "java.lang.String[][]"),
            ("Ljava/util/Map$Entry;", "java.util.Map$Entry"),
        ];
        for (descriptor, expected) in cases {
            let ty = parse_field_descriptor(descriptor).expect(descriptor);
            assert_eq!(ty.to_string(), expected);
        }
    }

    #[test]
    fn method_descriptor_keeps_parameter_order() {
        let signature =
            parse_method_descriptor("(Ljava/lang/String;[IJ)Z").expect("valid descriptor");
        let rendered: Vec<String> = signature
            .parameters
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(rendered, vec!["java.lang.String", "int[]", "long"]);
        assert_eq!(signature.return_type, JavaType::Primitive("boolean"));
    }

    #[test]
    fn void_is_only_valid_as_return_type() {
        let signature = parse_method_descriptor("()V").expect("void return");
        assert!(signature.parameters.is_empty());
        assert_eq!(signature.return_type, JavaType::Void);

        assert!(parse_field_descriptor("V").is_err());
        assert!(parse_method_descriptor("(V)V").is_err());
    }

    #[test]
    fn malformed_descriptors_are_rejected() {
        for descriptor in ["", "Ljava/lang/String", "II", "L;", "(I", "(I)", "[", "Q"] {
            assert!(
                parse_field_descriptor(descriptor).is_err(),
                "field descriptor {descriptor:?} should fail"
            );
        }
        assert!(parse_method_descriptor("(I").is_err());
        assert!(parse_method_descriptor("(I)").is_err());
        assert!(parse_method_descriptor("(I)VV").is_err());
    }
}
