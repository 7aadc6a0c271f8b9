//! Side scanning: resolve a type, read its markers, decide whether it may
//! run on the current side.
//!
//! Classification failures never escape [`SideScanner::scan`]; they degrade
//! to "not permitted". A missing type is expected and stays quiet, anything
//! else is logged at error level.

use tracing::{debug, error, info, warn};

use crate::core::classfile::{ClassFileError, ClassHeader};
use crate::core::classify::{Classification, classify};
use crate::core::marker::MarkerRegistry;
use crate::core::side::SideSource;
use crate::io::resolver::ResourceResolver;

/// Why a type could not be classified.
#[derive(Debug, thiserror::Error)]
pub enum ScanFailure {
    #[error("type not found")]
    NotFound,

    #[error("resolve failed: {0:#}")]
    Resolve(anyhow::Error),

    #[error("malformed class file: {0}")]
    Malformed(#[from] ClassFileError),
}

/// Scanner bound to a marker registry.
#[derive(Debug, Clone, Copy)]
pub struct SideScanner<'r> {
    registry: &'r MarkerRegistry,
}

impl SideScanner<'static> {
    /// Scanner using the built-in markers.
    pub fn builtin() -> Self {
        Self::new(MarkerRegistry::builtin())
    }
}

impl Default for SideScanner<'static> {
    fn default() -> Self {
        Self::builtin()
    }
}

impl<'r> SideScanner<'r> {
    pub fn new(registry: &'r MarkerRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r MarkerRegistry {
        self.registry
    }

    /// Classify `type_name`, reporting why classification failed.
    ///
    /// The current side is queried from `side` on every call.
    pub fn inspect<R, S>(
        &self,
        type_name: &str,
        resolver: &R,
        side: &S,
    ) -> Result<Classification, ScanFailure>
    where
        R: ResourceResolver + ?Sized,
        S: SideSource + ?Sized,
    {
        let bytes = resolver
            .resolve(type_name)
            .map_err(ScanFailure::Resolve)?
            .ok_or(ScanFailure::NotFound)?;
        let header = ClassHeader::parse(&bytes)?;
        Ok(classify(&header, self.registry, side.current_side()))
    }

    /// Whether `type_name` may run on the current side.
    ///
    /// Unmarked types are permitted. Types that cannot be found or read are
    /// not.
    pub fn scan<R, S>(&self, type_name: &str, resolver: &R, side: &S) -> bool
    where
        R: ResourceResolver + ?Sized,
        S: SideSource + ?Sized,
    {
        settle(type_name, &self.inspect(type_name, resolver, side))
    }
}

/// Reduce an [`SideScanner::inspect`] outcome to a verdict, emitting the
/// traces for it.
pub fn settle(type_name: &str, outcome: &Result<Classification, ScanFailure>) -> bool {
    match outcome {
        Ok(classification) => {
            report(type_name, classification);
            classification.permitted
        }
        Err(ScanFailure::NotFound) => false,
        Err(err) => {
            error!(type_name, error = %err, "failed to read side markers");
            false
        }
    }
}

fn report(type_name: &str, classification: &Classification) {
    for hit in classification.excluding_markers() {
        info!(
            type_name,
            marker = %hit.annotation,
            "skipping extension class as we are on the {}",
            classification.current_side
        );
    }
    if classification.has_conflict() {
        warn!(
            type_name,
            markers = classification.markers.len(),
            "conflicting side markers, last marker decides"
        );
    }
    debug!(type_name, permitted = classification.permitted, "scanned");
}

/// Scan with the built-in markers.
pub fn scan<R, S>(type_name: &str, resolver: &R, side: &S) -> bool
where
    R: ResourceResolver + ?Sized,
    S: SideSource + ?Sized,
{
    SideScanner::builtin().scan(type_name, resolver, side)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::marker::MarkerRule;
    use crate::core::side::Side;
    use crate::io::resolver::MemoryResolver;
    use crate::test_support::{
        AnnotationSpec, CLIENT_ONLY, ClassFileBuilder, FailingResolver, ONLY_IN, SERVER_ONLY,
        only_in,
    };
    use std::cell::Cell;

    fn resolver() -> MemoryResolver {
        MemoryResolver::new()
            .with("a.Plain", ClassFileBuilder::new("a/Plain").build())
            .with(
                "a.Client",
                ClassFileBuilder::new("a/Client")
                    .annotation(AnnotationSpec::new(CLIENT_ONLY))
                    .build(),
            )
            .with(
                "a.Server",
                ClassFileBuilder::new("a/Server")
                    .annotation(only_in("DEDICATED_SERVER"))
                    .build(),
            )
            .with("a.Garbage", vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00])
    }

    #[test]
    fn unmarked_type_is_permitted_everywhere() {
        let resolver = resolver();
        assert!(scan("a.Plain", &resolver, &Side::Controller));
        assert!(scan("a.Plain", &resolver, &Side::Worker));
    }

    #[test]
    fn marked_types_follow_their_side() {
        let resolver = resolver();
        assert!(scan("a.Client", &resolver, &Side::Controller));
        assert!(!scan("a.Client", &resolver, &Side::Worker));
        assert!(scan("a.Server", &resolver, &Side::Worker));
        assert!(!scan("a.Server", &resolver, &Side::Controller));
    }

    #[test]
    fn missing_type_is_not_permitted() {
        let resolver = resolver();
        assert!(!scan("a.Missing", &resolver, &Side::Worker));
        assert!(matches!(
            SideScanner::builtin().inspect("a.Missing", &resolver, &Side::Worker),
            Err(ScanFailure::NotFound)
        ));
    }

    #[test]
    fn malformed_class_is_not_permitted() {
        let resolver = resolver();
        assert!(!scan("a.Garbage", &resolver, &Side::Controller));
        assert!(matches!(
            SideScanner::builtin().inspect("a.Garbage", &resolver, &Side::Controller),
            Err(ScanFailure::Malformed(ClassFileError::Truncated { .. }))
        ));
    }

    #[test]
    fn resolver_failure_is_not_permitted() {
        assert!(!scan("a.Any", &FailingResolver, &Side::Worker));
        assert!(matches!(
            SideScanner::builtin().inspect("a.Any", &FailingResolver, &Side::Worker),
            Err(ScanFailure::Resolve(_))
        ));
    }

    #[test]
    fn scan_is_idempotent() {
        let resolver = resolver();
        for name in ["a.Plain", "a.Client", "a.Server", "a.Missing", "a.Garbage"] {
            for side in [Side::Controller, Side::Worker] {
                assert_eq!(
                    scan(name, &resolver, &side),
                    scan(name, &resolver, &side),
                    "name={name} side={side}"
                );
            }
        }
    }

    #[test]
    fn side_is_queried_on_every_scan() {
        let resolver = resolver();
        let calls = Cell::new(0);
        let flip = || {
            calls.set(calls.get() + 1);
            if calls.get() % 2 == 1 {
                Side::Controller
            } else {
                Side::Worker
            }
        };
        assert!(scan("a.Client", &resolver, &flip));
        assert!(!scan("a.Client", &resolver, &flip));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn last_marker_decides_when_markers_conflict() {
        let resolver = MemoryResolver::new().with(
            "a.Both",
            ClassFileBuilder::new("a/Both")
                .annotation(only_in("CLIENT"))
                .annotation(AnnotationSpec::new(SERVER_ONLY))
                .build(),
        );
        assert!(scan("a.Both", &resolver, &Side::Worker));
        assert!(!scan("a.Both", &resolver, &Side::Controller));
    }

    #[test]
    fn custom_registry_is_honored() {
        let registry = MarkerRegistry::from_entries([(ONLY_IN.to_string(), MarkerRule::Worker)]);
        let resolver = MemoryResolver::new().with(
            "a.Forced",
            ClassFileBuilder::new("a/Forced")
                .annotation(only_in("CLIENT"))
                .build(),
        );
        let scanner = SideScanner::new(&registry);
        assert!(scanner.scan("a.Forced", &resolver, &Side::Worker));
        assert!(!scanner.scan("a.Forced", &resolver, &Side::Controller));
    }
}
