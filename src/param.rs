// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Instantiation parameters for a process group.
//!
//! A [`ProgramGroupParam`] carries everything that varies per streaming
//! session: the kernel enable bitmap, the fragment count, the buffer
//! protocol and one [`TerminalParam`] per manifest terminal. It is plain
//! data and round-trips through JSON.

use crate::{
    bitmap::KernelBitmap,
    error::{Error, Result},
    format::{FrameFormat, COL, ROW},
    manifest::ProgramGroupManifest,
};
use serde::{Deserialize, Serialize};

/// How terminal buffers are referenced by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Protocol {
    /// Terminals carry the buffer virtual address directly.
    #[default]
    Legacy = 0,
    /// Terminals carry an index into a per-frame buffer set.
    Ppg = 1,
}

impl TryFrom<u8> for Protocol {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Protocol::Legacy),
            1 => Ok(Protocol::Ppg),
            _ => Err(Error::InvalidArgument(format!(
                "unknown protocol version {value}"
            ))),
        }
    }
}

/// Per-terminal instantiation parameters.
///
/// Only data terminals read the frame fields and only sliced terminals read
/// `slice_counts`; every other terminal is sized from its manifest alone.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalParam {
    /// Raw frame format wire value. Kept raw so that formats without a
    /// plane rule can still be described.
    pub frame_format_type: u32,
    /// Frame width and height in pixels.
    pub dimensions: [u16; 2],
    /// Size of one fragment.
    pub fragment_dimensions: [u16; 2],
    /// Position of the first fragment in the frame.
    pub index: [u16; 2],
    /// Phase offset of the first fragment.
    pub offset: [u16; 2],
    /// Row stride in bytes.
    pub stride: u32,
    /// Bits per pixel.
    pub bpp: u8,
    /// Bits per element.
    pub bpe: u8,
    /// Number of slices in each fragment.
    pub slice_counts: Vec<u16>,
}

impl TerminalParam {
    /// Frame parameters for a packed frame of `width` by `height` pixels.
    pub fn frame(format: FrameFormat, width: u16, height: u16, stride: u32, bpp: u8) -> Self {
        Self {
            frame_format_type: format.raw(),
            dimensions: [width, height],
            fragment_dimensions: [width, height],
            stride,
            bpp,
            bpe: bpp,
            ..Default::default()
        }
    }

    pub fn frame_format(&self) -> Option<FrameFormat> {
        FrameFormat::try_from(self.frame_format_type).ok()
    }

    /// Column index of fragment `fragment`. Fragments tile the frame
    /// horizontally, each one fragment width to the right of the previous.
    pub fn fragment_index(&self, fragment: u16) -> [u16; 2] {
        [
            self.index[COL].saturating_add(
                fragment.saturating_mul(self.fragment_dimensions[COL]),
            ),
            self.index[ROW],
        ]
    }

    /// Slices in fragment `fragment`, zero when not given.
    pub fn slice_count(&self, fragment: usize) -> u16 {
        self.slice_counts.get(fragment).copied().unwrap_or(0)
    }
}

/// Parameters for instantiating one process group from a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramGroupParam {
    /// Kernels enabled for this session, as a list of kernel IDs.
    pub kernel_enable_bitmap: KernelBitmap,
    #[serde(default = "default_fragment_count")]
    pub fragment_count: u16,
    #[serde(default)]
    pub protocol_version: Protocol,
    /// One entry per manifest terminal, in manifest order.
    #[serde(default)]
    pub terminals: Vec<TerminalParam>,
}

fn default_fragment_count() -> u16 {
    1
}

impl ProgramGroupParam {
    /// Parameters with default terminal parameters for every terminal of
    /// `manifest`.
    pub fn new(
        manifest: &ProgramGroupManifest,
        kernel_enable_bitmap: KernelBitmap,
        fragment_count: u16,
    ) -> Self {
        Self {
            kernel_enable_bitmap,
            fragment_count,
            protocol_version: Protocol::Legacy,
            terminals: vec![TerminalParam::default(); manifest.terminal_count()],
        }
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol_version = protocol;
        self
    }

    pub fn terminal(&self, index: usize) -> Result<&TerminalParam> {
        self.terminals
            .get(index)
            .ok_or_else(|| Error::index("terminal param", index, self.terminals.len()))
    }

    pub fn terminal_mut(&mut self, index: usize) -> Result<&mut TerminalParam> {
        let count = self.terminals.len();
        self.terminals
            .get_mut(index)
            .ok_or_else(|| Error::index("terminal param", index, count))
    }

    /// Check that the parameters fit `manifest`.
    pub fn check(&self, manifest: &ProgramGroupManifest) -> Result<()> {
        if self.terminals.len() != manifest.terminal_count() {
            return Err(Error::InvalidArgument(format!(
                "{} terminal params for {} terminals",
                self.terminals.len(),
                manifest.terminal_count()
            )));
        }
        if self.fragment_count == 0 {
            return Err(Error::InvalidArgument("fragment count is zero".into()));
        }
        if self.kernel_enable_bitmap.is_empty() {
            return Err(Error::InvalidArgument("kernel enable bitmap is empty".into()));
        }
        if !self.kernel_enable_bitmap.is_subset(&manifest.kernel_bitmap()) {
            return Err(Error::InvalidArgument(format!(
                "kernel enable bitmap {} is not within the group kernels {}",
                self.kernel_enable_bitmap,
                manifest.kernel_bitmap()
            )));
        }
        Ok(())
    }
}
