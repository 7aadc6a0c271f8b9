//! Registration list filtering.
//!
//! Every non-empty entry is scanned; entries not permitted on the current
//! side are blanked. The list keeps its field count so positional consumers
//! still line up.

use crate::core::registration::blank_rejected;
use crate::core::side::SideSource;
use crate::io::resolver::ResourceResolver;
use crate::scan::SideScanner;

/// A scanner bound to a resolver and a side source.
#[derive(Clone, Copy)]
pub struct SideFilter<'a> {
    scanner: SideScanner<'a>,
    resolver: &'a dyn ResourceResolver,
    side: &'a dyn SideSource,
}

impl<'a> SideFilter<'a> {
    pub fn new(
        scanner: SideScanner<'a>,
        resolver: &'a dyn ResourceResolver,
        side: &'a dyn SideSource,
    ) -> Self {
        Self {
            scanner,
            resolver,
            side,
        }
    }

    /// Whether a single type may run on the current side.
    pub fn permits(&self, type_name: &str) -> bool {
        self.scanner.scan(type_name, self.resolver, self.side)
    }

    /// Rewrite a registration list, blanking entries not permitted here.
    pub fn filter(&self, raw: &str) -> String {
        blank_rejected(raw, |type_name| self.permits(type_name))
    }
}

/// Filter a registration list with the built-in markers.
pub fn filter<R, S>(raw: &str, resolver: &R, side: &S) -> String
where
    R: ResourceResolver,
    S: SideSource,
{
    SideFilter::new(SideScanner::builtin(), resolver, side).filter(raw)
}
