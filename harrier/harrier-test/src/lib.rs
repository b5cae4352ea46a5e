//! This crate is a testing utility for harrier.
//! It runs real programs through the public API.
