//! Fixture builders for tests: minimal class files and JAR archives.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Cursor, Write};
use std::path::Path;
use zip::write::FileOptions;

enum PoolEntry {
    Utf8(String),
    Class(u16),
}

struct MemberEntry {
    flags: u16,
    name_index: u16,
    descriptor_index: u16,
    attributes: Vec<(u16, Vec<u8>)>,
}

/// Assembles a syntactically valid class file with the given members.
pub struct ClassFileBuilder {
    pool: Vec<PoolEntry>,
    utf8_slots: HashMap<String, u16>,
    access_flags: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<MemberEntry>,
    methods: Vec<MemberEntry>,
    last_is_method: bool,
}

impl ClassFileBuilder {
    /// `name` is a binary name such as `com.example.Outer$Inner`.
    pub fn new(name: &str) -> Self {
        let mut builder = Self {
            pool: Vec::new(),
            utf8_slots: HashMap::new(),
            access_flags: 0x0021,
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            last_is_method: false,
        };
        builder.this_class = builder.class_entry(name);
        builder.super_class = builder.class_entry("java.lang.Object");
        builder
    }

    pub fn access_flags(mut self, flags: u16) -> Self {
        self.access_flags = flags;
        self
    }

    /// Writes a zero `super_class`, as `java.lang.Object` itself does.
    pub fn without_super_class(mut self) -> Self {
        self.super_class = 0;
        self
    }

    pub fn interface(mut self, name: &str) -> Self {
        let index = self.class_entry(name);
        self.interfaces.push(index);
        self
    }

    pub fn field(mut self, flags: u16, name: &str, descriptor: &str) -> Self {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.fields.push(MemberEntry {
            flags,
            name_index,
            descriptor_index,
            attributes: Vec::new(),
        });
        self.last_is_method = false;
        self
    }

    pub fn method(mut self, flags: u16, name: &str, descriptor: &str) -> Self {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.raw_method(flags, name_index, descriptor_index)
    }

    /// Adds a method whose constant pool indices are taken verbatim.
    pub fn raw_method(mut self, flags: u16, name_index: u16, descriptor_index: u16) -> Self {
        self.methods.push(MemberEntry {
            flags,
            name_index,
            descriptor_index,
            attributes: Vec::new(),
        });
        self.last_is_method = true;
        self
    }

    /// Attaches an opaque attribute to the most recently added member.
    pub fn attribute(mut self, name: &str, payload: &[u8]) -> Self {
        let name_index = self.utf8(name);
        let member = if self.last_is_method {
            self.methods.last_mut()
        } else {
            self.fields.last_mut()
        };
        if let Some(member) = member {
            member.attributes.push((name_index, payload.to_vec()));
        }
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&52u16.to_be_bytes());

        out.extend_from_slice(&(self.pool.len() as u16 + 1).to_be_bytes());
        for entry in &self.pool {
            match entry {
                PoolEntry::Utf8(value) => {
                    out.push(1);
                    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
                    out.extend_from_slice(value.as_bytes());
                }
                PoolEntry::Class(name_index) => {
                    out.push(7);
                    out.extend_from_slice(&name_index.to_be_bytes());
                }
            }
        }

        out.extend_from_slice(&self.access_flags.to_be_bytes());
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&self.super_class.to_be_bytes());
        out.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for interface in &self.interfaces {
            out.extend_from_slice(&interface.to_be_bytes());
        }

        for members in [&self.fields, &self.methods] {
            out.extend_from_slice(&(members.len() as u16).to_be_bytes());
            for member in members {
                out.extend_from_slice(&member.flags.to_be_bytes());
                out.extend_from_slice(&member.name_index.to_be_bytes());
                out.extend_from_slice(&member.descriptor_index.to_be_bytes());
                out.extend_from_slice(&(member.attributes.len() as u16).to_be_bytes());
                for (name_index, payload) in &member.attributes {
                    out.extend_from_slice(&name_index.to_be_bytes());
                    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
                    out.extend_from_slice(payload);
                }
            }
        }

        out.extend_from_slice(&0u16.to_be_bytes()); // class attributes
        out
    }

    fn utf8(&mut self, value: &str) -> u16 {
        if let Some(index) = self.utf8_slots.get(value) {
            return *index;
        }
        self.pool.push(PoolEntry::Utf8(value.to_string()));
        let index = self.pool.len() as u16;
        self.utf8_slots.insert(value.to_string(), index);
        index
    }

    fn class_entry(&mut self, binary_name: &str) -> u16 {
        let name_index = self.utf8(&binary_name.replace('.', "/"));
        self.pool.push(PoolEntry::Class(name_index));
        self.pool.len() as u16
    }
}

/// Class file path inside an archive or directory for a binary name.
pub fn class_entry_name(binary_name: &str) -> String {
    format!("{}.class", binary_name.replace('.', "/"))
}

/// Builds an in-memory ZIP archive holding the given `(entry name, bytes)`
/// pairs, in order.
pub fn zip_bytes(entries: &[(String, Vec<u8>)]) -> io::Result<Vec<u8>> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default();
    for (name, bytes) in entries {
        writer.start_file(name.as_str(), options)?;
        writer.write_all(bytes)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Writes a JAR with a manifest followed by the given entries.
pub fn write_jar(path: &Path, entries: &[(String, Vec<u8>)]) -> io::Result<()> {
    let mut all = vec![(
        "META-INF/MANIFEST.MF".to_string(),
        b"Manifest-Version: 1.0\n".to_vec(),
    )];
    all.extend_from_slice(entries);
    fs::write(path, zip_bytes(&all)?)
}

/// Writes a JMOD: the `JM` magic and version, then a ZIP whose class
/// entries sit under `classes/`.
pub fn write_jmod(path: &Path, entries: &[(String, Vec<u8>)]) -> io::Result<()> {
    let prefixed: Vec<(String, Vec<u8>)> = entries
        .iter()
        .map(|(name, bytes)| (format!("classes/{name}"), bytes.clone()))
        .collect();
    let mut out = b"JM\x01\x00".to_vec();
    out.extend(zip_bytes(&prefixed)?);
    fs::write(path, out)
}
