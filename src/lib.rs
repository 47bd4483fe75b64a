// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # EdgeFirst PSYS Layout Library
//!
//! This library builds, validates and instantiates the relocatable binary
//! blobs that describe image processing pipelines for the IPU processing
//! subsystem (PSYS).
//!
//! ## Features
//!
//! - **Manifests**: Lay out a [`ProgramGroupManifest`] of programs and typed
//!   terminals as one position-independent blob, with every offset relative
//!   to the structure that owns it.
//! - **Validation**: Check the program taxonomy, kernel partitioning and
//!   terminal ownership of a manifest with the [`GraphValidator`].
//! - **Process Groups**: Instantiate a manifest for a kernel enable bitmap
//!   and fragment count as a [`ProcessGroup`] with live buffer bindings.
//! - **Buffer Sets**: Rebind buffers per frame through a small
//!   [`BufferSet`] without rebuilding the process group.
//!
//! ## Example
//!
//! ```
//! use edgefirst_psys::{
//!     bitmap::KernelBitmap,
//!     description::ProgramGroupDescription,
//!     param::{ProgramGroupParam, TerminalParam},
//!     format::FrameFormat,
//!     process_group::{ProcessGroup, ProcessGroupConfig},
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let description = ProgramGroupDescription::from_json(
//!     r#"{
//!         "id": 7,
//!         "programs": [{ "id": 1, "kernels": [0], "terminal_dependencies": [0, 1] }],
//!         "terminals": [
//!             { "kind": "data", "direction": "in", "kernel": 0 },
//!             { "kind": "data", "direction": "out", "kernel": 0 }
//!         ]
//!     }"#,
//! )?;
//! let manifest = description.compile()?;
//!
//! let mut param = ProgramGroupParam::new(&manifest, KernelBitmap::from_indices([0]), 1);
//! for terminal in param.terminals.iter_mut() {
//!     *terminal = TerminalParam::frame(FrameFormat::Nv12, 64, 32, 64, 8);
//! }
//! let group = ProcessGroup::create(&manifest, &param, &ProcessGroupConfig::default())?;
//! assert_eq!(group.process_count(), 1);
//! assert_eq!(group.terminal_count(), 2);
//! # Ok(())
//! # }
//! ```

pub mod bitmap;
pub mod blob;
pub mod buffer_set;
pub mod description;
pub mod error;
pub mod format;
pub mod manifest;
pub mod param;
pub mod process_group;
pub mod validate;

pub use buffer_set::BufferSet;
pub use error::{Error, Result};
pub use manifest::ProgramGroupManifest;
pub use process_group::ProcessGroup;
pub use validate::GraphValidator;
