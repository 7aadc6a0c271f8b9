//! Deterministic, pure logic shared by the scanner.
//!
//! Core modules must be free of I/O side effects. They operate on byte
//! slices and in-memory data and return deterministic outputs suitable for
//! tests.

pub mod classfile;
pub mod classify;
pub mod marker;
pub mod registration;
pub mod side;
