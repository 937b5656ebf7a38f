//! Domain Layer - Movement classification.
//!
//! Pure types and rules with no I/O.

/// Moving vs. dwelling classification of location samples.
pub mod movement;
