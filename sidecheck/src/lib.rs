//! Side-restricted extension filtering from compiled class metadata.
//!
//! Decides, from a class file alone, whether a type may run on the current
//! side of a two-sided runtime (controller/client vs worker/server), and
//! uses that verdict to blank entries of extension registration lists. The
//! architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure logic (class-file reading, marker registry,
//!   classification, list splitting). No I/O.
//! - **[`io`]**: Resource resolution, configuration and descriptor files.
//!
//! [`scan`], [`filter`] and [`hooks`] compose the two into the scanner, the
//! list filter and the integration shims.

pub mod core;
pub mod exit_codes;
pub mod filter;
pub mod hooks;
pub mod io;
pub mod logging;
pub mod scan;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
