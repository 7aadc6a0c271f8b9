//! Side classification of a parsed class header.
//!
//! Pure: takes the parsed annotations, the marker registry and the current
//! side, and returns the verdict with the markers that produced it.

use serde::Serialize;

use super::classfile::{ClassHeader, ElementValue};
use super::marker::{MarkerRegistry, MarkerRule, VALUE_ELEMENT};
use super::side::Side;

/// A recognized marker found on the class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkerHit {
    /// Annotation descriptor (`Lpkg/Name;`).
    pub annotation: String,
    /// Side the marker restricts the class to.
    pub side: Side,
}

/// Outcome of classifying one class against the current side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// Internal name read from the class file.
    pub class_name: String,
    pub current_side: Side,
    pub permitted: bool,
    /// Markers in scan order; the last one decides.
    pub markers: Vec<MarkerHit>,
}

impl Classification {
    /// Side the class is restricted to, if any marker applied.
    pub fn restricted_to(&self) -> Option<Side> {
        self.markers.last().map(|hit| hit.side)
    }

    /// True when markers on the class name different sides.
    pub fn has_conflict(&self) -> bool {
        self.markers
            .windows(2)
            .any(|pair| pair[0].side != pair[1].side)
    }

    /// Markers that exclude the class from the current side.
    pub fn excluding_markers(&self) -> impl Iterator<Item = &MarkerHit> {
        self.markers
            .iter()
            .filter(move |hit| hit.side != self.current_side)
    }
}

/// Classify a class header.
///
/// The verdict starts out permitted. Every recognized marker overwrites it
/// with `marker side == current side`, so the last marker wins. Runtime
/// visible annotations are walked before invisible ones, each group in
/// attribute order. Parameterized markers with an unrecognized argument leave the
/// verdict unchanged.
pub fn classify(header: &ClassHeader, registry: &MarkerRegistry, current: Side) -> Classification {
    let mut markers = Vec::new();
    for annotation in &header.annotations {
        let Some(rule) = registry.rule_for(&annotation.descriptor) else {
            continue;
        };
        match rule {
            MarkerRule::Parameterized => {
                for pair in &annotation.elements {
                    if pair.name != VALUE_ELEMENT {
                        continue;
                    }
                    if let ElementValue::Enum { constant, .. } = &pair.value
                        && let Some(side) = Side::from_marker_argument(constant)
                    {
                        markers.push(MarkerHit {
                            annotation: annotation.descriptor.clone(),
                            side,
                        });
                    }
                }
            }
            MarkerRule::Controller | MarkerRule::Worker => {
                if let Some(side) = rule.fixed_side() {
                    markers.push(MarkerHit {
                        annotation: annotation.descriptor.clone(),
                        side,
                    });
                }
            }
        }
    }

    let permitted = markers.last().is_none_or(|hit| hit.side == current);
    Classification {
        class_name: header.this_class.clone(),
        current_side: current,
        permitted,
        markers,
    }
}
