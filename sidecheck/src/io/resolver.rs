//! Resource resolution: mapping a type name to its class-file bytes.
//!
//! Resolvers report absence as `Ok(None)`; `Err` is reserved for failures
//! that are not a plain "not found" (unreadable file, corrupt archive).

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, instrument, warn};
use zip::ZipArchive;
use zip::result::ZipError;

/// Maps a fully qualified type name to the bytes of its class file.
pub trait ResourceResolver {
    /// Bytes of the compiled type, or `None` when it cannot be found.
    fn resolve(&self, type_name: &str) -> Result<Option<Vec<u8>>>;
}

impl<T: ResourceResolver + ?Sized> ResourceResolver for &T {
    fn resolve(&self, type_name: &str) -> Result<Option<Vec<u8>>> {
        (**self).resolve(type_name)
    }
}

impl<T: ResourceResolver + ?Sized> ResourceResolver for Box<T> {
    fn resolve(&self, type_name: &str) -> Result<Option<Vec<u8>>> {
        (**self).resolve(type_name)
    }
}

/// Resource path of a type (`a.b.C` becomes `a/b/C.class`).
///
/// Returns `None` for names that cannot denote a class: empty segments,
/// path separators, or a leading/trailing dot.
pub fn resource_path(type_name: &str) -> Option<String> {
    if type_name.is_empty()
        || type_name
            .split('.')
            .any(|segment| segment.is_empty() || segment.contains(['/', '\\']))
    {
        return None;
    }
    Some(format!("{}.class", type_name.replace('.', "/")))
}

/// Resolves classes from an exploded class directory.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    root: PathBuf,
}

impl DirectoryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceResolver for DirectoryResolver {
    fn resolve(&self, type_name: &str) -> Result<Option<Vec<u8>>> {
        let Some(relative) = resource_path(type_name) else {
            return Ok(None);
        };
        let path = self.root.join(relative);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
        }
    }
}

/// Largest jar entry read into memory. Sizes come from the archive and are
/// not trusted.
pub const MAX_ENTRY_BYTES: u64 = 16 * 1024 * 1024;

/// Resolves classes from a jar (zip) archive.
///
/// The archive handle is shared behind a mutex so one resolver can serve
/// concurrent lookups.
pub struct JarResolver {
    path: PathBuf,
    archive: Mutex<ZipArchive<File>>,
}

impl JarResolver {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::open(&path).with_context(|| format!("open {}", path.display()))?;
        let archive =
            ZipArchive::new(file).with_context(|| format!("read archive {}", path.display()))?;
        debug!(jar = %path.display(), entries = archive.len(), "opened jar");
        Ok(Self {
            path,
            archive: Mutex::new(archive),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read an arbitrary entry (e.g. a `META-INF` descriptor).
    pub fn read_entry(&self, entry: &str) -> Result<Option<Vec<u8>>> {
        let mut archive = self
            .archive
            .lock()
            .map_err(|_| anyhow!("jar lock poisoned: {}", self.path.display()))?;
        let mut file = match archive.by_name(entry) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("read {entry} from {}", self.path.display()));
            }
        };
        let declared = file.size();
        if declared > MAX_ENTRY_BYTES {
            bail!(
                "{entry} in {} declares {declared} bytes (limit {MAX_ENTRY_BYTES})",
                self.path.display()
            );
        }
        let mut bytes = Vec::with_capacity(usize::try_from(declared).unwrap_or_default());
        (&mut file)
            .take(MAX_ENTRY_BYTES + 1)
            .read_to_end(&mut bytes)
            .with_context(|| format!("read {entry} from {}", self.path.display()))?;
        if bytes.len() as u64 > MAX_ENTRY_BYTES {
            bail!(
                "{entry} in {} exceeds {MAX_ENTRY_BYTES} bytes",
                self.path.display()
            );
        }
        Ok(Some(bytes))
    }
}

impl ResourceResolver for JarResolver {
    fn resolve(&self, type_name: &str) -> Result<Option<Vec<u8>>> {
        match resource_path(type_name) {
            Some(entry) => self.read_entry(&entry),
            None => Ok(None),
        }
    }
}

/// Ordered list of resolvers; the first entry that has the class wins.
///
/// An entry that fails is logged and skipped. The first failure is only
/// returned when no later entry has the class.
#[derive(Default)]
pub struct Classpath {
    entries: Vec<Box<dyn ResourceResolver + Send + Sync>>,
}

impl Classpath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a classpath from directories and jar/zip files.
    ///
    /// Missing entries are skipped with a warning, like a JVM class loader.
    #[instrument(skip_all, fields(entries = paths.len()))]
    pub fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut classpath = Self::new();
        for path in paths {
            classpath.push_path(path.as_ref())?;
        }
        Ok(classpath)
    }

    /// Append a directory or jar/zip file.
    pub fn push_path(&mut self, path: &Path) -> Result<()> {
        if path.is_dir() {
            self.push(DirectoryResolver::new(path));
        } else if path.is_file() {
            self.push(JarResolver::open(path)?);
        } else {
            warn!(path = %path.display(), "classpath entry does not exist, skipping");
        }
        Ok(())
    }

    pub fn push(&mut self, resolver: impl ResourceResolver + Send + Sync + 'static) {
        self.entries.push(Box::new(resolver));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResourceResolver for Classpath {
    fn resolve(&self, type_name: &str) -> Result<Option<Vec<u8>>> {
        let mut failure = None;
        for (idx, entry) in self.entries.iter().enumerate() {
            match entry.resolve(type_name) {
                Ok(Some(bytes)) => return Ok(Some(bytes)),
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        type_name,
                        entry = idx,
                        error = %format!("{err:#}"),
                        "classpath entry failed, trying the next one"
                    );
                    failure.get_or_insert(err);
                }
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }
}

/// In-memory resolver keyed by dotted type name.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    classes: HashMap<String, Vec<u8>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, type_name: impl Into<String>, bytes: Vec<u8>) {
        self.classes.insert(type_name.into(), bytes);
    }

    pub fn with(mut self, type_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(type_name, bytes);
        self
    }
}

impl ResourceResolver for MemoryResolver {
    fn resolve(&self, type_name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.classes.get(type_name).cloned())
    }
}
