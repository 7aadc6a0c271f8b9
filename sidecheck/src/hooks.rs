//! Integration points that filter an extension module descriptor before the
//! module is built.
//!
//! Hosts either let us replace the module factory ([`SidedModuleFactory`])
//! or only let us intercept the construction entry point
//! ([`before_new_module`]). Both go through [`filter_extension_record`].

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::debug;

use crate::core::marker::MarkerRegistry;
use crate::core::registration::split_entries;
use crate::core::side::SideSource;
use crate::filter::SideFilter;
use crate::io::properties::PropertiesRecord;
use crate::io::resolver::ResourceResolver;
use crate::scan::SideScanner;

/// Descriptor resource inside a jar.
pub const DESCRIPTOR_PATH: &str = "META-INF/groovy/org.codehaus.groovy.runtime.ExtensionModule";

pub const MODULE_NAME_KEY: &str = "moduleName";
pub const MODULE_VERSION_KEY: &str = "moduleVersion";
/// Instance-style extension classes.
pub const INSTANCE_CLASSES_KEY: &str = "extensionClasses";
/// Static-style extension classes.
pub const STATIC_CLASSES_KEY: &str = "staticExtensionClasses";

/// Keys whose values are registration lists.
pub const REGISTRATION_KEYS: [&str; 2] = [INSTANCE_CLASSES_KEY, STATIC_CLASSES_KEY];

/// Filter both registration lists of `record` in place.
///
/// Keys that are absent stay absent.
pub fn filter_extension_record(record: &mut PropertiesRecord, filter: &SideFilter<'_>) {
    for key in REGISTRATION_KEYS {
        if let Some(raw) = record.get(key) {
            let filtered = filter.filter(raw);
            debug!(key, before = raw, after = %filtered, "filtered registration list");
            record.set(key, filtered);
        }
    }
}

/// Construction-entry hook: rewrite `record` before the host builds the
/// module from it.
pub fn before_new_module(
    record: &mut PropertiesRecord,
    resolver: &dyn ResourceResolver,
    side: &dyn SideSource,
) {
    let filter = SideFilter::new(SideScanner::builtin(), resolver, side);
    filter_extension_record(record, &filter);
}

/// Builds extension modules from descriptor records.
pub trait ModuleFactory {
    type Module;

    fn new_module(
        &self,
        record: PropertiesRecord,
        resolver: &dyn ResourceResolver,
    ) -> Result<Self::Module>;
}

/// Factory override: filters the record, then delegates to `inner`.
pub struct SidedModuleFactory<F, S> {
    inner: F,
    side: S,
    registry: MarkerRegistry,
}

impl<F, S> SidedModuleFactory<F, S>
where
    F: ModuleFactory,
    S: SideSource,
{
    pub fn new(inner: F, side: S) -> Self {
        Self::with_registry(inner, side, MarkerRegistry::builtin().clone())
    }

    pub fn with_registry(inner: F, side: S, registry: MarkerRegistry) -> Self {
        Self {
            inner,
            side,
            registry,
        }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

impl<F, S> ModuleFactory for SidedModuleFactory<F, S>
where
    F: ModuleFactory,
    S: SideSource,
{
    type Module = F::Module;

    fn new_module(
        &self,
        mut record: PropertiesRecord,
        resolver: &dyn ResourceResolver,
    ) -> Result<Self::Module> {
        let filter = SideFilter::new(SideScanner::new(&self.registry), resolver, &self.side);
        filter_extension_record(&mut record, &filter);
        self.inner.new_module(record, resolver)
    }
}

/// Extension module as described by its descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionModule {
    pub name: String,
    pub version: String,
    pub instance_classes: Vec<String>,
    pub static_classes: Vec<String>,
}

/// Builds an [`ExtensionModule`] listing the classes that survive in the
/// descriptor. Blank entries are dropped here.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorModuleFactory;

impl ModuleFactory for DescriptorModuleFactory {
    type Module = ExtensionModule;

    fn new_module(
        &self,
        record: PropertiesRecord,
        _resolver: &dyn ResourceResolver,
    ) -> Result<ExtensionModule> {
        let name = required(&record, MODULE_NAME_KEY)?;
        let version = required(&record, MODULE_VERSION_KEY)?;
        let classes = |key: &str| -> Vec<String> {
            record
                .get(key)
                .map(|raw| {
                    split_entries(raw)
                        .into_iter()
                        .filter(|entry| !entry.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(ExtensionModule {
            instance_classes: classes(INSTANCE_CLASSES_KEY),
            static_classes: classes(STATIC_CLASSES_KEY),
            name,
            version,
        })
    }
}

fn required(record: &PropertiesRecord, key: &str) -> Result<String> {
    record
        .get(key)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("module descriptor does not set '{key}'"))
        .context("build extension module")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::marker::MarkerRule;
    use crate::core::side::Side;
    use crate::io::resolver::MemoryResolver;
    use crate::test_support::{AnnotationSpec, CLIENT_ONLY, ClassFileBuilder, only_in};
    use std::cell::RefCell;

    fn resolver() -> MemoryResolver {
        MemoryResolver::new()
            .with(
                "ext.ClientExt",
                ClassFileBuilder::new("ext/ClientExt")
                    .annotation(AnnotationSpec::new(CLIENT_ONLY))
                    .build(),
            )
            .with(
                "ext.ServerExt",
                ClassFileBuilder::new("ext/ServerExt")
                    .annotation(only_in("DEDICATED_SERVER"))
                    .build(),
            )
            .with("ext.Common", ClassFileBuilder::new("ext/Common").build())
    }

    fn descriptor() -> PropertiesRecord {
        PropertiesRecord::parse(
            "moduleName=demo\nmoduleVersion=1.0\n\
             extensionClasses=ext.ClientExt, ext.Common\n\
             staticExtensionClasses=ext.ServerExt;ext.Gone\n",
        )
    }

    /// Records the record it was handed.
    #[derive(Default)]
    struct RecordingFactory {
        seen: RefCell<Option<PropertiesRecord>>,
    }

    impl ModuleFactory for RecordingFactory {
        type Module = ();

        fn new_module(
            &self,
            record: PropertiesRecord,
            _resolver: &dyn ResourceResolver,
        ) -> Result<()> {
            *self.seen.borrow_mut() = Some(record);
            Ok(())
        }
    }

    #[test]
    fn construction_hook_filters_both_keys() {
        let mut record = descriptor();
        before_new_module(&mut record, &resolver(), &Side::Worker);
        assert_eq!(record.get(INSTANCE_CLASSES_KEY), Some(",ext.Common"));
        assert_eq!(record.get(STATIC_CLASSES_KEY), Some("ext.ServerExt,"));
        assert_eq!(record.get(MODULE_NAME_KEY), Some("demo"));
    }

    #[test]
    fn absent_keys_stay_absent() {
        let mut record = PropertiesRecord::parse("moduleName=demo\nextensionClasses=ext.Common\n");
        before_new_module(&mut record, &resolver(), &Side::Controller);
        assert_eq!(record.get(INSTANCE_CLASSES_KEY), Some("ext.Common"));
        assert!(!record.contains_key(STATIC_CLASSES_KEY));
    }

    #[test]
    fn factory_override_matches_construction_hook() {
        let resolver = resolver();
        for side in [Side::Controller, Side::Worker] {
            let mut hooked = descriptor();
            before_new_module(&mut hooked, &resolver, &side);

            let factory = SidedModuleFactory::new(RecordingFactory::default(), side);
            factory
                .new_module(descriptor(), &resolver)
                .expect("new module");
            assert_eq!(factory.inner().seen.borrow().as_ref(), Some(&hooked));
        }
    }

    #[test]
    fn factory_override_uses_its_registry() {
        let registry = MarkerRegistry::from_entries([(
            "com.example.Headless".to_string(),
            MarkerRule::Worker,
        )]);
        let resolver = MemoryResolver::new().with(
            "ext.Headless",
            ClassFileBuilder::new("ext/Headless")
                .annotation(AnnotationSpec::new("Lcom/example/Headless;"))
                .build(),
        );
        let factory =
            SidedModuleFactory::with_registry(DescriptorModuleFactory, Side::Controller, registry);
        let module = factory
            .new_module(
                PropertiesRecord::parse(
                    "moduleName=m\nmoduleVersion=1\nextensionClasses=ext.Headless\n",
                ),
                &resolver,
            )
            .expect("new module");
        assert!(module.instance_classes.is_empty());
    }

    #[test]
    fn descriptor_factory_drops_blank_entries() {
        let factory = SidedModuleFactory::new(DescriptorModuleFactory, Side::Controller);
        let module = factory
            .new_module(descriptor(), &resolver())
            .expect("new module");
        assert_eq!(
            module,
            ExtensionModule {
                name: "demo".to_string(),
                version: "1.0".to_string(),
                instance_classes: vec!["ext.ClientExt".to_string(), "ext.Common".to_string()],
                static_classes: Vec::new(),
            }
        );
    }

    #[test]
    fn descriptor_factory_requires_name_and_version() {
        let record = PropertiesRecord::parse("moduleVersion=1.0\n");
        let err = DescriptorModuleFactory
            .new_module(record, &MemoryResolver::new())
            .expect_err("missing name");
        assert!(format!("{err:#}").contains(MODULE_NAME_KEY));
    }
}
