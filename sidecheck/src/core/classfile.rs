//! Structural class-file reader that extracts type-level annotations.
//!
//! Only what is needed to enumerate class annotations is decoded: the
//! constant pool, the class attribute table, and the two annotation
//! attributes. Field and method attributes (including `Code`) are skipped by
//! length, so bytecode is never inspected and nothing is loaded or verified.

use std::fmt;

/// Class file magic number.
pub const CLASS_MAGIC: u32 = 0xCAFE_BABE;

/// Attribute holding annotations retained at runtime.
pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
/// Attribute holding annotations with class retention.
pub const RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";

/// Maximum nesting of annotation element values (arrays, nested annotations).
pub const MAX_ELEMENT_DEPTH: usize = 64;

/// Constant pool tags.
mod tag {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELDREF: u8 = 9;
    pub const METHODREF: u8 = 10;
    pub const INTERFACE_METHODREF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}

/// Errors raised while reading a class file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassFileError {
    #[error("invalid class file magic: {0:#010x}")]
    InvalidMagic(u32),

    #[error("truncated class file: need {needed} bytes at offset {offset}, have {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownConstantTag { tag: u8, index: u16 },

    #[error("constant pool index {0} out of range")]
    BadConstantIndex(u16),

    #[error("constant pool entry {index} is not a {expected} constant")]
    UnexpectedConstant { index: u16, expected: &'static str },

    #[error("invalid modified UTF-8 in constant pool entry {0}")]
    InvalidUtf8(u16),

    #[error("unknown annotation element tag {0:#04x}")]
    UnknownElementTag(u8),

    #[error("annotation element values nested deeper than {MAX_ELEMENT_DEPTH}")]
    NestingTooDeep,
}

pub type ClassFileResult<T> = Result<T, ClassFileError>;

/// Type-level metadata read from a class file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHeader {
    pub minor_version: u16,
    pub major_version: u16,
    pub access_flags: u16,
    /// Internal name of the class (`a/b/C`).
    pub this_class: String,
    /// Class annotations: runtime-visible first, then invisible.
    pub annotations: Vec<Annotation>,
}

/// One annotation attached to the class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Field descriptor of the annotation type (`Lpkg/Name;`).
    pub descriptor: String,
    /// `true` when read from `RuntimeVisibleAnnotations`.
    pub visible: bool,
    pub elements: Vec<ElementPair>,
}

impl Annotation {
    /// Enum constant held directly by the named element, if any.
    pub fn enum_element(&self, name: &str) -> Option<&str> {
        self.elements.iter().find_map(|pair| match &pair.value {
            ElementValue::Enum { constant, .. } if pair.name == name => Some(constant.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementPair {
    pub name: String,
    pub value: ElementValue,
}

/// Annotation element value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    /// Primitive or string constant; `tag` is one of `BCDFIJSZs`.
    Const { tag: char, index: u16 },
    Enum {
        type_descriptor: String,
        constant: String,
    },
    Class(String),
    Annotation(Box<Annotation>),
    Array(Vec<ElementValue>),
}

impl ClassHeader {
    /// Parse the class header and its type-level annotations.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a structurally valid class file
    /// up to and including the class attribute table.
    pub fn parse(data: &[u8]) -> ClassFileResult<Self> {
        let mut reader = ByteReader::new(data);

        let magic = reader.u32()?;
        if magic != CLASS_MAGIC {
            return Err(ClassFileError::InvalidMagic(magic));
        }
        let minor_version = reader.u16()?;
        let major_version = reader.u16()?;
        let pool = ConstantPool::parse(&mut reader)?;

        let access_flags = reader.u16()?;
        let this_index = reader.u16()?;
        let this_class = pool.class_name(this_index)?;
        let _super_class = reader.u16()?;
        let interfaces = reader.u16()?;
        reader.skip(usize::from(interfaces) * 2)?;

        // fields, then methods: skipped without decoding their attributes
        for _ in 0..2 {
            let members = reader.u16()?;
            for _ in 0..members {
                reader.skip(6)?;
                skip_attributes(&mut reader)?;
            }
        }

        // visible annotations come first, whatever the table order
        let mut annotations = Vec::new();
        let mut invisible = Vec::new();
        let attributes = reader.u16()?;
        for _ in 0..attributes {
            let name_index = reader.u16()?;
            let length = reader.u32()? as usize;
            let body = reader.take(length)?;
            let (visible, sink) = match pool.utf8(name_index)?.as_str() {
                RUNTIME_VISIBLE_ANNOTATIONS => (true, &mut annotations),
                RUNTIME_INVISIBLE_ANNOTATIONS => (false, &mut invisible),
                _ => continue,
            };
            let mut body = ByteReader::new(body);
            let count = body.u16()?;
            for _ in 0..count {
                sink.push(read_annotation(&mut body, &pool, visible, 0)?);
            }
        }
        annotations.append(&mut invisible);

        Ok(Self {
            minor_version,
            major_version,
            access_flags,
            this_class,
            annotations,
        })
    }

    /// Dotted binary name of the class (`a.b.C`).
    pub fn class_name(&self) -> String {
        self.this_class.replace('/', ".")
    }
}

fn skip_attributes(reader: &mut ByteReader<'_>) -> ClassFileResult<()> {
    let count = reader.u16()?;
    for _ in 0..count {
        reader.skip(2)?;
        let length = reader.u32()? as usize;
        reader.skip(length)?;
    }
    Ok(())
}

fn read_annotation(
    reader: &mut ByteReader<'_>,
    pool: &ConstantPool<'_>,
    visible: bool,
    depth: usize,
) -> ClassFileResult<Annotation> {
    let descriptor = pool.utf8(reader.u16()?)?;
    let pairs = reader.u16()?;
    let mut elements = Vec::with_capacity(usize::from(pairs));
    for _ in 0..pairs {
        let name = pool.utf8(reader.u16()?)?;
        let value = read_element_value(reader, pool, visible, depth)?;
        elements.push(ElementPair { name, value });
    }
    Ok(Annotation {
        descriptor,
        visible,
        elements,
    })
}

fn read_element_value(
    reader: &mut ByteReader<'_>,
    pool: &ConstantPool<'_>,
    visible: bool,
    depth: usize,
) -> ClassFileResult<ElementValue> {
    if depth >= MAX_ELEMENT_DEPTH {
        return Err(ClassFileError::NestingTooDeep);
    }
    let element_tag = reader.u8()?;
    let value = match element_tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => {
            let index = reader.u16()?;
            pool.check(index)?;
            ElementValue::Const {
                tag: char::from(element_tag),
                index,
            }
        }
        b'e' => ElementValue::Enum {
            type_descriptor: pool.utf8(reader.u16()?)?,
            constant: pool.utf8(reader.u16()?)?,
        },
        b'c' => ElementValue::Class(pool.utf8(reader.u16()?)?),
        b'@' => ElementValue::Annotation(Box::new(read_annotation(
            reader,
            pool,
            visible,
            depth + 1,
        )?)),
        b'[' => {
            let count = reader.u16()?;
            let mut values = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                values.push(read_element_value(reader, pool, visible, depth + 1)?);
            }
            ElementValue::Array(values)
        }
        other => return Err(ClassFileError::UnknownElementTag(other)),
    };
    Ok(value)
}

#[derive(Debug, Clone, Copy)]
enum Constant<'a> {
    /// Index 0 and the second slot of `Long`/`Double`.
    Unusable,
    Utf8(&'a [u8]),
    Class { name_index: u16 },
    Other,
}

/// Constant pool with lazily decoded strings.
struct ConstantPool<'a> {
    entries: Vec<Constant<'a>>,
}

impl<'a> ConstantPool<'a> {
    fn parse(reader: &mut ByteReader<'a>) -> ClassFileResult<Self> {
        let count = reader.u16()?;
        let mut entries = Vec::with_capacity(usize::from(count));
        entries.push(Constant::Unusable);
        let mut index: u16 = 1;
        while index < count {
            let entry_tag = reader.u8()?;
            let entry = match entry_tag {
                tag::UTF8 => {
                    let len = reader.u16()?;
                    Constant::Utf8(reader.take(usize::from(len))?)
                }
                tag::CLASS => Constant::Class {
                    name_index: reader.u16()?,
                },
                tag::STRING | tag::METHOD_TYPE | tag::MODULE | tag::PACKAGE => {
                    reader.skip(2)?;
                    Constant::Other
                }
                tag::METHOD_HANDLE => {
                    reader.skip(3)?;
                    Constant::Other
                }
                tag::INTEGER
                | tag::FLOAT
                | tag::FIELDREF
                | tag::METHODREF
                | tag::INTERFACE_METHODREF
                | tag::NAME_AND_TYPE
                | tag::DYNAMIC
                | tag::INVOKE_DYNAMIC => {
                    reader.skip(4)?;
                    Constant::Other
                }
                tag::LONG | tag::DOUBLE => {
                    reader.skip(8)?;
                    entries.push(Constant::Other);
                    entries.push(Constant::Unusable);
                    index = index.saturating_add(2);
                    continue;
                }
                other => return Err(ClassFileError::UnknownConstantTag { tag: other, index }),
            };
            entries.push(entry);
            index += 1;
        }
        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> ClassFileResult<Constant<'a>> {
        match self.entries.get(usize::from(index)) {
            Some(Constant::Unusable) | None => Err(ClassFileError::BadConstantIndex(index)),
            Some(entry) => Ok(*entry),
        }
    }

    fn check(&self, index: u16) -> ClassFileResult<()> {
        self.get(index).map(|_| ())
    }

    fn utf8(&self, index: u16) -> ClassFileResult<String> {
        match self.get(index)? {
            Constant::Utf8(bytes) => {
                decode_modified_utf8(bytes).ok_or(ClassFileError::InvalidUtf8(index))
            }
            _ => Err(ClassFileError::UnexpectedConstant {
                index,
                expected: "Utf8",
            }),
        }
    }

    fn class_name(&self, index: u16) -> ClassFileResult<String> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(name_index),
            _ => Err(ClassFileError::UnexpectedConstant {
                index,
                expected: "Class",
            }),
        }
    }
}

/// Decode the JVM's modified UTF-8 (two-byte NUL, surrogate pairs as two
/// three-byte sequences).
fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    if bytes.iter().all(|b| (1..0x80).contains(b)) {
        return std::str::from_utf8(bytes).ok().map(str::to_owned);
    }
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let continuation = |offset: usize| -> Option<u16> {
            let next = *bytes.get(i + offset)?;
            (next & 0xC0 == 0x80).then_some(u16::from(next & 0x3F))
        };
        if b & 0x80 == 0 {
            units.push(u16::from(b));
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            units.push((u16::from(b & 0x1F) << 6) | continuation(1)?);
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            units.push((u16::from(b & 0x0F) << 12) | (continuation(1)? << 6) | continuation(2)?);
            i += 3;
        } else {
            return None;
        }
    }
    String::from_utf16(&units).ok()
}

/// Big-endian cursor over a byte slice.
struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> ClassFileResult<&'a [u8]> {
        let available = self.data.len() - self.pos;
        if len > available {
            return Err(ClassFileError::Truncated {
                offset: self.pos,
                needed: len,
                available,
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> ClassFileResult<()> {
        self.take(len).map(|_| ())
    }

    fn u8(&mut self) -> ClassFileResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> ClassFileResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> ClassFileResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .descriptor
            .strip_prefix('L')
            .and_then(|rest| rest.strip_suffix(';'))
            .unwrap_or(&self.descriptor);
        write!(f, "@{}", name.replace('/', "."))
    }
}
