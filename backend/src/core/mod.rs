//! Core primitives shared by all simulation components

pub mod time;
