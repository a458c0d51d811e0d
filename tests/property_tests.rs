// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Entry Point
//!
//! This test suite uses proptest to verify properties that must hold for
//! every input sequence: lifecycle monotonicity and lease uniqueness.

mod common;
mod property;
