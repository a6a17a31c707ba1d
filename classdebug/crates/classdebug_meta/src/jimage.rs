//! Reader for the JDK runtime image (`lib/modules`, the "jimage" format).
//!
//! The image starts with a seven-word header followed by the index:
//! a redirect table, an offsets table, the packed location attributes and a
//! NUL-terminated strings table. Resource bytes follow the index. Header and
//! tables use the byte order of the platform that produced the image, which
//! is detected from the magic number. Location attributes are always
//! big-endian.
//!
//! Only uncompressed resources are supported.

use crate::source::{ClassBytes, ClassSource, SourceError};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

const IMAGE_MAGIC: u32 = 0xCAFE_DADA;
const MAJOR_VERSION: u32 = 1;
const HEADER_SIZE: usize = 7 * 4;

const ATTRIBUTE_END: u8 = 0;
const ATTRIBUTE_MODULE: usize = 1;
const ATTRIBUTE_PARENT: usize = 2;
const ATTRIBUTE_BASE: usize = 3;
const ATTRIBUTE_EXTENSION: usize = 4;
const ATTRIBUTE_OFFSET: usize = 5;
const ATTRIBUTE_COMPRESSED: usize = 6;
const ATTRIBUTE_UNCOMPRESSED: usize = 7;
const ATTRIBUTE_COUNT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn u32(self, bytes: &[u8]) -> u32 {
        let word = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match self {
            ByteOrder::Little => u32::from_le_bytes(word),
            ByteOrder::Big => u32::from_be_bytes(word),
        }
    }
}

/// An open runtime image. The file handle is held for the lifetime of the
/// value; only the index is kept in memory.
#[derive(Debug)]
pub struct RuntimeImage {
    path: PathBuf,
    file: File,
    offsets: Vec<u32>,
    locations: Vec<u8>,
    strings: Vec<u8>,
    index_size: u64,
}

type Attributes = [u64; ATTRIBUTE_COUNT];

impl RuntimeImage {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SourceError> {
        let path = path.into();
        let mut file = File::open(&path).map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;

        let mut header = [0u8; HEADER_SIZE];
        read_exact(&mut file, &mut header, &path)?;

        let order = if u32::from_le_bytes([header[0], header[1], header[2], header[3]])
            == IMAGE_MAGIC
        {
            ByteOrder::Little
        } else if u32::from_be_bytes([header[0], header[1], header[2], header[3]]) == IMAGE_MAGIC
        {
            ByteOrder::Big
        } else {
            return Err(image_error(&path, "bad magic number"));
        };

        let word = |slot: usize| order.u32(&header[slot * 4..slot * 4 + 4]);
        let version = word(1);
        if version >> 16 != MAJOR_VERSION {
            return Err(image_error(
                &path,
                format!("unsupported image version {}.{}", version >> 16, version & 0xFFFF),
            ));
        }
        let table_length = word(4) as usize;
        let locations_size = word(5) as usize;
        let strings_size = word(6) as usize;

        // The redirect table is only needed for hashed lookups by full
        // module path; class lookups scan the offsets table instead.
        let mut redirect = vec![0u8; table_length * 4];
        read_exact(&mut file, &mut redirect, &path)?;

        let mut raw_offsets = vec![0u8; table_length * 4];
        read_exact(&mut file, &mut raw_offsets, &path)?;
        let offsets = raw_offsets.chunks_exact(4).map(|word| order.u32(word)).collect();

        let mut locations = vec![0u8; locations_size];
        read_exact(&mut file, &mut locations, &path)?;
        let mut strings = vec![0u8; strings_size];
        read_exact(&mut file, &mut strings, &path)?;

        let index_size = (HEADER_SIZE + table_length * 8 + locations_size + strings_size) as u64;

        Ok(Self {
            path,
            file,
            offsets,
            locations,
            strings,
            index_size,
        })
    }

    pub fn resource_count(&self) -> usize {
        self.offsets.len()
    }

    /// Finds the `.class` resource for an internal name in any module.
    fn find_location(&self, internal_name: &str) -> Result<Option<Attributes>, SourceError> {
        let (parent, base) = internal_name
            .rsplit_once('/')
            .unwrap_or(("", internal_name));

        for offset in &self.offsets {
            let attributes = self.decode_location(*offset as usize)?;
            if self.string(attributes[ATTRIBUTE_BASE])? != base.as_bytes()
                || self.string(attributes[ATTRIBUTE_EXTENSION])? != b"class"
                || self.string(attributes[ATTRIBUTE_PARENT])? != parent.as_bytes()
            {
                continue;
            }
            // `/modules/...` and `/packages/...` are directory views, not modules.
            let module = self.string(attributes[ATTRIBUTE_MODULE])?;
            if module.is_empty() || module == b"modules" || module == b"packages" {
                continue;
            }
            return Ok(Some(attributes));
        }
        Ok(None)
    }

    fn decode_location(&self, offset: usize) -> Result<Attributes, SourceError> {
        let mut attributes = [0u64; ATTRIBUTE_COUNT];
        let mut pos = offset;
        loop {
            let byte = *self
                .locations
                .get(pos)
                .ok_or_else(|| image_error(&self.path, "location attributes out of bounds"))?;
            let kind = byte >> 3;
            if kind == ATTRIBUTE_END {
                break;
            }
            if kind as usize >= ATTRIBUTE_COUNT {
                return Err(image_error(
                    &self.path,
                    format!("invalid location attribute kind {kind}"),
                ));
            }
            let length = (byte & 0x7) as usize + 1;
            let value_bytes = self
                .locations
                .get(pos + 1..pos + 1 + length)
                .ok_or_else(|| image_error(&self.path, "location attributes out of bounds"))?;
            attributes[kind as usize] = value_bytes
                .iter()
                .fold(0u64, |value, byte| (value << 8) | u64::from(*byte));
            pos += 1 + length;
        }
        Ok(attributes)
    }

    fn string(&self, offset: u64) -> Result<&[u8], SourceError> {
        let tail = self
            .strings
            .get(offset as usize..)
            .ok_or_else(|| image_error(&self.path, "string offset out of bounds"))?;
        let end = tail.iter().position(|byte| *byte == 0).unwrap_or(tail.len());
        Ok(&tail[..end])
    }

    fn read_resource(&mut self, attributes: &Attributes) -> Result<Vec<u8>, SourceError> {
        if attributes[ATTRIBUTE_COMPRESSED] != 0 {
            return Err(image_error(
                &self.path,
                "compressed resources are not supported",
            ));
        }
        let start = self.index_size + attributes[ATTRIBUTE_OFFSET];
        let size = attributes[ATTRIBUTE_UNCOMPRESSED] as usize;
        self.file
            .seek(SeekFrom::Start(start))
            .map_err(|source| SourceError::Io {
                path: self.path.clone(),
                source,
            })?;
        let mut bytes = vec![0u8; size];
        read_exact(&mut self.file, &mut bytes, &self.path)?;
        Ok(bytes)
    }
}

impl ClassSource for RuntimeImage {
    fn location(&self) -> &Path {
        &self.path
    }

    fn find_class(&mut self, internal_name: &str) -> Result<Option<ClassBytes>, SourceError> {
        let Some(attributes) = self.find_location(internal_name)? else {
            return Ok(None);
        };
        let module = String::from_utf8_lossy(self.string(attributes[ATTRIBUTE_MODULE])?)
            .into_owned();
        let bytes = self.read_resource(&attributes)?;
        Ok(Some(ClassBytes {
            bytes,
            origin: format!("jrt:/{module}/{internal_name}.class"),
        }))
    }
}

fn read_exact(file: &mut File, buffer: &mut [u8], path: &Path) -> Result<(), SourceError> {
    file.read_exact(buffer).map_err(|source| match source.kind() {
        io::ErrorKind::UnexpectedEof => image_error(path, "truncated image"),
        _ => SourceError::Io {
            path: path.to_path_buf(),
            source,
        },
    })
}

fn image_error(path: &Path, reason: impl Into<String>) -> SourceError {
    SourceError::Image {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ClassFileBuilder;
    use std::fs;
    use tempfile::tempdir;

    struct Resource {
        module: &'static str,
        parent: &'static str,
        base: &'static str,
        extension: &'static str,
        bytes: Vec<u8>,
        compressed: bool,
    }

    fn resource(module: &'static str, name: &'static str, bytes: Vec<u8>) -> Resource {
        let (path, extension) = name.rsplit_once('.').expect("extension");
        let (parent, base) = path.rsplit_once('/').unwrap_or(("", path));
        Resource {
            module,
            parent,
            base,
            extension,
            bytes,
            compressed: false,
        }
    }

    fn push_attribute(out: &mut Vec<u8>, kind: usize, value: u64) {
        let bytes = value.to_be_bytes();
        let skip = bytes.iter().take_while(|byte| **byte == 0).count().min(7);
        let significant = &bytes[skip..];
        out.push(((kind as u8) << 3) | (significant.len() as u8 - 1));
        out.extend_from_slice(significant);
    }

    fn write_image(path: &Path, resources: &[Resource], order: ByteOrder) {
        let mut strings = vec![0u8];
        let mut intern = |value: &str| -> u64 {
            if value.is_empty() {
                return 0;
            }
            let offset = strings.len() as u64;
            strings.extend_from_slice(value.as_bytes());
            strings.push(0);
            offset
        };

        let mut locations = Vec::new();
        let mut offsets = Vec::new();
        let mut content = Vec::new();
        for resource in resources {
            offsets.push(locations.len() as u32);
            push_attribute(&mut locations, ATTRIBUTE_MODULE, intern(resource.module));
            push_attribute(&mut locations, ATTRIBUTE_PARENT, intern(resource.parent));
            push_attribute(&mut locations, ATTRIBUTE_BASE, intern(resource.base));
            push_attribute(&mut locations, ATTRIBUTE_EXTENSION, intern(resource.extension));
            push_attribute(&mut locations, ATTRIBUTE_OFFSET, content.len() as u64);
            if resource.compressed {
                push_attribute(&mut locations, ATTRIBUTE_COMPRESSED, 1);
            }
            push_attribute(
                &mut locations,
                ATTRIBUTE_UNCOMPRESSED,
                resource.bytes.len() as u64,
            );
            locations.push(0);
            content.extend_from_slice(&resource.bytes);
        }

        let word = |value: u32| match order {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        };
        let mut out = Vec::new();
        out.extend_from_slice(&word(IMAGE_MAGIC));
        out.extend_from_slice(&word(MAJOR_VERSION << 16));
        out.extend_from_slice(&word(0));
        out.extend_from_slice(&word(resources.len() as u32));
        out.extend_from_slice(&word(resources.len() as u32));
        out.extend_from_slice(&word(locations.len() as u32));
        out.extend_from_slice(&word(strings.len() as u32));
        for _ in resources {
            out.extend_from_slice(&word(0));
        }
        for offset in &offsets {
            out.extend_from_slice(&word(*offset));
        }
        out.extend_from_slice(&locations);
        out.extend_from_slice(&strings);
        out.extend_from_slice(&content);
        fs::write(path, out).expect("write image");
    }

    #[test]
    fn finds_class_in_any_module() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modules");
        let string_class = ClassFileBuilder::new("java.lang.String").build();
        write_image(
            &path,
            &[
                resource("java.base", "module-info.class", vec![0xCA]),
                resource("java.sql", "java/sql/Date.class", vec![1, 2, 3]),
                resource("java.base", "java/lang/String.class", string_class.clone()),
            ],
            ByteOrder::Little,
        );

        let mut image = RuntimeImage::open(&path).expect("open image");
        assert_eq!(image.resource_count(), 3);

        let found = image
            .find_class("java/lang/String")
            .expect("lookup")
            .expect("class present");
        assert_eq!(found.bytes, string_class);
        assert_eq!(found.origin, "jrt:/java.base/java/lang/String.class");

        let sql = image.find_class("java/sql/Date").expect("lookup").expect("present");
        assert_eq!(sql.bytes, vec![1, 2, 3]);

        assert!(image.find_class("java/lang/Missing").expect("lookup").is_none());
    }

    #[test]
    fn reads_big_endian_images() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modules");
        write_image(
            &path,
            &[resource("app", "Main.class", vec![9, 9])],
            ByteOrder::Big,
        );

        let mut image = RuntimeImage::open(&path).expect("open image");
        let found = image.find_class("Main").expect("lookup").expect("present");
        assert_eq!(found.bytes, vec![9, 9]);
    }

    #[test]
    fn compressed_resources_are_reported() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modules");
        let mut packed = resource("java.base", "java/lang/Object.class", vec![0; 4]);
        packed.compressed = true;
        write_image(&path, &[packed], ByteOrder::Little);

        let mut image = RuntimeImage::open(&path).expect("open image");
        assert!(matches!(
            image.find_class("java/lang/Object"),
            Err(SourceError::Image { .. })
        ));
    }

    #[test]
    fn rejects_files_without_image_magic() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modules");
        fs::write(&path, vec![0u8; 64]).expect("write file");
        assert!(matches!(
            RuntimeImage::open(&path),
            Err(SourceError::Image { .. })
        ));
    }
}
