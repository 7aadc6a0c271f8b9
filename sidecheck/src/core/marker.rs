//! Registry of type-level annotations that restrict a type to one side.
//!
//! Markers are keyed by their JVM field descriptor (`Lpkg/Name;`), which is
//! what the class file stores for each annotation. The registry is built once
//! and never mutated; extending it means building a new registry.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use super::side::Side;

/// Annotation element inspected on parameterized markers.
pub const VALUE_ELEMENT: &str = "value";

/// How a recognized marker determines its side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerRule {
    /// Side comes from the enum constant in the `value` element.
    Parameterized,
    /// Presence alone restricts the type to the controller side.
    Controller,
    /// Presence alone restricts the type to the worker side.
    Worker,
}

impl MarkerRule {
    /// Side implied by the marker's presence, for fixed markers.
    pub fn fixed_side(self) -> Option<Side> {
        match self {
            MarkerRule::Parameterized => None,
            MarkerRule::Controller => Some(Side::Controller),
            MarkerRule::Worker => Some(Side::Worker),
        }
    }
}

const BUILTIN_MARKERS: &[(&str, MarkerRule)] = &[
    ("net.minecraftforge.api.distmarker.OnlyIn", MarkerRule::Parameterized),
    ("net.fabricmc.api.Environment", MarkerRule::Parameterized),
    (
        "io.github.groovymc.cgl.extension.EnvironmentExtension",
        MarkerRule::Parameterized,
    ),
    (
        "org.quiltmc.loader.api.minecraft.ClientOnly",
        MarkerRule::Controller,
    ),
    (
        "org.quiltmc.loader.api.minecraft.DedicatedServerOnly",
        MarkerRule::Worker,
    ),
];

static BUILTIN: LazyLock<MarkerRegistry> = LazyLock::new(|| {
    MarkerRegistry::from_entries(
        BUILTIN_MARKERS
            .iter()
            .map(|(name, rule)| (name.to_string(), *rule)),
    )
});

/// Immutable mapping from annotation descriptor to [`MarkerRule`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerRegistry {
    rules: BTreeMap<String, MarkerRule>,
}

impl MarkerRegistry {
    /// Registry with the markers recognized out of the box.
    pub fn builtin() -> &'static MarkerRegistry {
        &BUILTIN
    }

    /// Build a registry from `(annotation, rule)` pairs.
    ///
    /// Annotations may be given as dotted class names, internal names
    /// (`a/b/C`) or descriptors (`La/b/C;`). Later duplicates replace earlier
    /// ones.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, MarkerRule)>,
    {
        let rules = entries
            .into_iter()
            .map(|(name, rule)| (annotation_descriptor(&name), rule))
            .collect();
        Self { rules }
    }

    /// New registry holding this registry's rules plus `extra`.
    pub fn extended<I>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = (String, MarkerRule)>,
    {
        let mut rules = self.rules.clone();
        for (name, rule) in extra {
            rules.insert(annotation_descriptor(&name), rule);
        }
        Self { rules }
    }

    /// Rule for an annotation descriptor, if it is a recognized marker.
    pub fn rule_for(&self, descriptor: &str) -> Option<MarkerRule> {
        self.rules.get(descriptor).copied()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, MarkerRule)> {
        self.rules.iter().map(|(desc, rule)| (desc.as_str(), *rule))
    }
}

/// Normalize an annotation name to its JVM descriptor form.
pub fn annotation_descriptor(name: &str) -> String {
    let name = name.trim();
    if name.starts_with('L') && name.ends_with(';') {
        return name.to_string();
    }
    format!("L{};", name.replace('.', "/"))
}
