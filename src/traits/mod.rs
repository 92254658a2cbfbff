//! Trait definitions for extensible components

pub mod job;
