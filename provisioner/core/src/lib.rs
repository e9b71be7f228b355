// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # AEGIS Provisioner Core
//!
//! Infrastructure lifecycle orchestration: Quoin deployment templates,
//! Infrastructure environments, the message-bus job protocol between the
//! API-facing services and the async provisioning workers, and the
//! execution engine that drives the external provisioning CLI.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, application services, infrastructure adapters

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
