//! Test-only helpers for synthesizing class files and classpaths.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::io::resolver::{ResourceResolver, resource_path};

pub const ONLY_IN: &str = "Lnet/minecraftforge/api/distmarker/OnlyIn;";
pub const DIST: &str = "Lnet/minecraftforge/api/distmarker/Dist;";
pub const ENVIRONMENT: &str = "Lnet/fabricmc/api/Environment;";
pub const ENV_TYPE: &str = "Lnet/fabricmc/api/EnvType;";
pub const CLIENT_ONLY: &str = "Lorg/quiltmc/loader/api/minecraft/ClientOnly;";
pub const SERVER_ONLY: &str = "Lorg/quiltmc/loader/api/minecraft/DedicatedServerOnly;";

/// `@OnlyIn(Dist.<constant>)`.
pub fn only_in(constant: &str) -> AnnotationSpec {
    AnnotationSpec::new(ONLY_IN).enum_value("value", DIST, constant)
}

/// `@Environment(EnvType.<constant>)`.
pub fn environment(constant: &str) -> AnnotationSpec {
    AnnotationSpec::new(ENVIRONMENT).enum_value("value", ENV_TYPE, constant)
}

/// Annotation to attach to a synthesized class.
#[derive(Debug, Clone)]
pub struct AnnotationSpec {
    descriptor: String,
    elements: Vec<(String, ElementSpec)>,
}

#[derive(Debug, Clone)]
enum ElementSpec {
    Int(i32),
    Enum { type_descriptor: String, constant: String },
    Class(String),
    Annotation(AnnotationSpec),
    Array(Vec<ElementSpec>),
}

impl AnnotationSpec {
    pub fn new(descriptor: &str) -> Self {
        Self {
            descriptor: descriptor.to_string(),
            elements: Vec::new(),
        }
    }

    pub fn enum_value(mut self, name: &str, type_descriptor: &str, constant: &str) -> Self {
        self.elements
            .push((name.to_string(), enum_spec(type_descriptor, constant)));
        self
    }

    pub fn enum_array(mut self, name: &str, type_descriptor: &str, constants: &[&str]) -> Self {
        let values = constants
            .iter()
            .map(|constant| enum_spec(type_descriptor, constant))
            .collect();
        self.elements
            .push((name.to_string(), ElementSpec::Array(values)));
        self
    }

    pub fn int_value(mut self, name: &str, value: i32) -> Self {
        self.elements.push((name.to_string(), ElementSpec::Int(value)));
        self
    }

    pub fn class_value(mut self, name: &str, descriptor: &str) -> Self {
        self.elements
            .push((name.to_string(), ElementSpec::Class(descriptor.to_string())));
        self
    }

    pub fn nested(mut self, name: &str, annotation: AnnotationSpec) -> Self {
        self.elements
            .push((name.to_string(), ElementSpec::Annotation(annotation)));
        self
    }
}

fn enum_spec(type_descriptor: &str, constant: &str) -> ElementSpec {
    ElementSpec::Enum {
        type_descriptor: type_descriptor.to_string(),
        constant: constant.to_string(),
    }
}

#[derive(Debug, Clone)]
enum AttributeSpec {
    SourceFile(String),
    Annotations {
        visible: bool,
        annotations: Vec<AnnotationSpec>,
    },
}

/// Builds minimal, structurally valid class files.
#[derive(Debug, Clone)]
pub struct ClassFileBuilder {
    this_class: String,
    long_constants: Vec<i64>,
    fields: Vec<(String, String)>,
    methods: Vec<(String, String, Vec<u8>)>,
    attributes: Vec<AttributeSpec>,
}

impl ClassFileBuilder {
    /// `this_class` is an internal name (`a/b/C`).
    pub fn new(this_class: &str) -> Self {
        Self {
            this_class: this_class.to_string(),
            long_constants: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Add a runtime-visible class annotation.
    pub fn annotation(self, annotation: AnnotationSpec) -> Self {
        self.push_annotation(true, annotation)
    }

    /// Add a class-retention (invisible) annotation.
    pub fn invisible_annotation(self, annotation: AnnotationSpec) -> Self {
        self.push_annotation(false, annotation)
    }

    fn push_annotation(mut self, visible: bool, annotation: AnnotationSpec) -> Self {
        let existing = self.attributes.iter_mut().find_map(|attr| match attr {
            AttributeSpec::Annotations {
                visible: v,
                annotations,
            } if *v == visible => Some(annotations),
            _ => None,
        });
        match existing {
            Some(annotations) => annotations.push(annotation),
            None => self.attributes.push(AttributeSpec::Annotations {
                visible,
                annotations: vec![annotation],
            }),
        }
        self
    }

    pub fn long_constant(mut self, value: i64) -> Self {
        self.long_constants.push(value);
        self
    }

    pub fn field(mut self, name: &str, descriptor: &str) -> Self {
        self.fields.push((name.to_string(), descriptor.to_string()));
        self
    }

    /// Add a method whose `Code` attribute holds `code` verbatim.
    pub fn method(mut self, name: &str, descriptor: &str, code: &[u8]) -> Self {
        self.methods
            .push((name.to_string(), descriptor.to_string(), code.to_vec()));
        self
    }

    pub fn source_file(mut self, name: &str) -> Self {
        self.attributes.push(AttributeSpec::SourceFile(name.to_string()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pool = PoolWriter::default();
        let mut body = Vec::new();

        let this_name = pool.utf8(&self.this_class);
        let this_class = pool.class(this_name);
        let object_name = pool.utf8("java/lang/Object");
        let super_class = pool.class(object_name);
        for value in &self.long_constants {
            pool.long(*value);
        }

        put_u16(&mut body, 0x0021);
        put_u16(&mut body, this_class);
        put_u16(&mut body, super_class);
        put_u16(&mut body, 0);

        put_u16(&mut body, self.fields.len() as u16);
        for (name, descriptor) in &self.fields {
            put_u16(&mut body, 0x0002);
            put_u16(&mut body, pool.utf8(name));
            put_u16(&mut body, pool.utf8(descriptor));
            put_u16(&mut body, 0);
        }

        put_u16(&mut body, self.methods.len() as u16);
        for (name, descriptor, code) in &self.methods {
            put_u16(&mut body, 0x0001);
            put_u16(&mut body, pool.utf8(name));
            put_u16(&mut body, pool.utf8(descriptor));
            put_u16(&mut body, 1);
            put_u16(&mut body, pool.utf8("Code"));
            put_u32(&mut body, code.len() as u32);
            body.extend_from_slice(code);
        }

        put_u16(&mut body, self.attributes.len() as u16);
        for attribute in &self.attributes {
            let mut payload = Vec::new();
            let name = match attribute {
                AttributeSpec::SourceFile(file) => {
                    put_u16(&mut payload, pool.utf8(file));
                    "SourceFile"
                }
                AttributeSpec::Annotations {
                    visible,
                    annotations,
                } => {
                    put_u16(&mut payload, annotations.len() as u16);
                    for annotation in annotations {
                        write_annotation(&mut payload, &mut pool, annotation);
                    }
                    if *visible {
                        "RuntimeVisibleAnnotations"
                    } else {
                        "RuntimeInvisibleAnnotations"
                    }
                }
            };
            put_u16(&mut body, pool.utf8(name));
            put_u32(&mut body, payload.len() as u32);
            body.extend_from_slice(&payload);
        }

        let mut out = Vec::new();
        put_u32(&mut out, 0xCAFE_BABE);
        put_u16(&mut out, 0);
        put_u16(&mut out, 61);
        put_u16(&mut out, pool.next_index);
        out.extend_from_slice(&pool.bytes);
        out.extend_from_slice(&body);
        out
    }
}

fn write_annotation(buf: &mut Vec<u8>, pool: &mut PoolWriter, annotation: &AnnotationSpec) {
    put_u16(buf, pool.utf8(&annotation.descriptor));
    put_u16(buf, annotation.elements.len() as u16);
    for (name, value) in &annotation.elements {
        put_u16(buf, pool.utf8(name));
        write_element(buf, pool, value);
    }
}

fn write_element(buf: &mut Vec<u8>, pool: &mut PoolWriter, value: &ElementSpec) {
    match value {
        ElementSpec::Int(v) => {
            buf.push(b'I');
            put_u16(buf, pool.integer(*v));
        }
        ElementSpec::Enum {
            type_descriptor,
            constant,
        } => {
            buf.push(b'e');
            put_u16(buf, pool.utf8(type_descriptor));
            put_u16(buf, pool.utf8(constant));
        }
        ElementSpec::Class(descriptor) => {
            buf.push(b'c');
            put_u16(buf, pool.utf8(descriptor));
        }
        ElementSpec::Annotation(nested) => {
            buf.push(b'@');
            write_annotation(buf, pool, nested);
        }
        ElementSpec::Array(values) => {
            buf.push(b'[');
            put_u16(buf, values.len() as u16);
            for value in values {
                write_element(buf, pool, value);
            }
        }
    }
}

/// Constant pool under construction. Utf8 entries are deduplicated.
struct PoolWriter {
    bytes: Vec<u8>,
    next_index: u16,
    utf8_indices: HashMap<String, u16>,
}

impl Default for PoolWriter {
    fn default() -> Self {
        Self {
            bytes: Vec::new(),
            next_index: 1,
            utf8_indices: HashMap::new(),
        }
    }
}

impl PoolWriter {
    fn utf8(&mut self, text: &str) -> u16 {
        if let Some(index) = self.utf8_indices.get(text) {
            return *index;
        }
        let encoded = encode_modified_utf8(text);
        self.bytes.push(1);
        put_u16(&mut self.bytes, encoded.len() as u16);
        self.bytes.extend_from_slice(&encoded);
        let index = self.claim(1);
        self.utf8_indices.insert(text.to_string(), index);
        index
    }

    fn class(&mut self, name_index: u16) -> u16 {
        self.bytes.push(7);
        put_u16(&mut self.bytes, name_index);
        self.claim(1)
    }

    fn integer(&mut self, value: i32) -> u16 {
        self.bytes.push(3);
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self.claim(1)
    }

    fn long(&mut self, value: i64) -> u16 {
        self.bytes.push(5);
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self.claim(2)
    }

    fn claim(&mut self, slots: u16) -> u16 {
        let index = self.next_index;
        self.next_index += slots;
        index
    }
}

fn encode_modified_utf8(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for unit in text.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// Temporary directory holding a `classes/` tree and jars.
pub struct TempClasspath {
    dir: TempDir,
}

impl TempClasspath {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        fs::create_dir_all(dir.path().join("classes")).context("create classes dir")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn classes_dir(&self) -> PathBuf {
        self.dir.path().join("classes")
    }

    /// Write `bytes` as the class file for a dotted type name.
    pub fn write_class(&self, type_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let relative =
            resource_path(type_name).ok_or_else(|| anyhow!("invalid type name {type_name}"))?;
        let path = self.classes_dir().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&path, bytes).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// Write a stored (uncompressed) jar with the given entries.
    pub fn write_jar(&self, name: &str, entries: &[(&str, &[u8])]) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        let file = fs::File::create(&path).with_context(|| format!("create {}", path.display()))?;
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (entry, bytes) in entries {
            zip.start_file(*entry, options)
                .with_context(|| format!("start jar entry {entry}"))?;
            zip.write_all(bytes)
                .with_context(|| format!("write jar entry {entry}"))?;
        }
        zip.finish().context("finish jar")?;
        Ok(path)
    }
}

/// Resolver that fails every lookup with an I/O-style error.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingResolver;

impl ResourceResolver for FailingResolver {
    fn resolve(&self, type_name: &str) -> Result<Option<Vec<u8>>> {
        Err(anyhow!("simulated read failure for {type_name}"))
    }
}
