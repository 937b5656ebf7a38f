//! Application Layer - Use cases wiring the stream to the classifier.

/// Application services.
pub mod services;
