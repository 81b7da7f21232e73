//! Test utilities for MatrixGraph integration tests
//!
//! Every fixture owns a fresh in-process server and a uniquely named graph
//! key, so tests never observe each other's data.

#![allow(dead_code)]

pub mod test_fixture;
