//! Common test utilities
#![allow(dead_code)]

pub mod portal_mock;
