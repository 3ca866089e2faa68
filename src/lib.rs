/*
 * 5D Labs Fleet Platform - Deployment Orchestration Engine
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc, clippy::doc_markdown)]

//! Deployment-orchestration engine core library
//!
//! Translates abstract jobs into multi-cluster manifest bundles, submits
//! them through the hub's resource-distribution API, and reconciles their
//! live status back into the job state machine.

pub mod api;
pub mod config;
pub mod crds;
pub mod jobs;
pub mod work;

// Re-export commonly used types
pub use config::EngineConfig;
pub use crds::{Condition, ManifestWork, ManifestWorkSpec, ManifestWorkStatus};
pub use jobs::{Dispatcher, Error, Job, JobState, JobType, MonitorRegistry, Result};
pub use work::{WorkClient, WorkStore};
