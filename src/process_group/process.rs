// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Runtime processes, one per enabled program.

use crate::{
    bitmap::KernelBitmap,
    blob::{align_up, records, to_u16, to_u8, Blob, Record},
    error::{Error, Result},
    manifest::NO_CELL,
};
use bytemuck::{Pod, Zeroable};
use std::fmt;

/// Dependency slot that could not be resolved to an instantiated process or
/// terminal because its target is disabled.
pub const UNRESOLVED_DEPENDENCY: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ProcessState {
    #[default]
    Created = 0,
    Ready,
    Started,
    Running,
    Stopped,
}

impl ProcessState {
    pub fn name(self) -> &'static str {
        match self {
            ProcessState::Created => "created",
            ProcessState::Ready => "ready",
            ProcessState::Started => "started",
            ProcessState::Running => "running",
            ProcessState::Stopped => "stopped",
        }
    }
}

impl TryFrom<u8> for ProcessState {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => ProcessState::Created,
            1 => ProcessState::Ready,
            2 => ProcessState::Started,
            3 => ProcessState::Running,
            4 => ProcessState::Stopped,
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "unknown process state {value}"
                )))
            }
        })
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ProcessHeader {
    /// Enabled kernels of the program.
    pub kernel_bitmap: KernelBitmap,
    /// Offset from this process back to the process group base (negative).
    pub parent_offset: i32,
    /// Program ID copied from the manifest.
    pub id: u32,
    pub size: u16,
    pub cell_dependency_offset: u16,
    pub terminal_dependency_offset: u16,
    /// Index of the program manifest this process was built from.
    pub program_idx: u8,
    pub state: u8,
    /// Assigned cell, or [`NO_CELL`].
    pub cell: u8,
    pub cell_dependency_count: u8,
    pub terminal_dependency_count: u8,
    pub padding: [u8; 5],
}

records! {
    ProcessHeader => 320,
}

pub(crate) fn sizeof_process(cell_dependencies: usize, terminal_dependencies: usize) -> usize {
    align_up(ProcessHeader::SIZE + cell_dependencies + terminal_dependencies)
}

/// Inputs for one process record, with dependencies already resolved to
/// runtime indices.
pub(crate) struct ProcessInit<'a> {
    pub program_idx: usize,
    pub id: u32,
    pub kernel_bitmap: KernelBitmap,
    pub cell: u8,
    pub cell_dependencies: &'a [u8],
    pub terminal_dependencies: &'a [u8],
}

/// Write a process record at absolute `offset` and return the number of
/// bytes consumed. The process is left in [`ProcessState::Ready`].
pub(crate) fn init_process(blob: &mut Blob, offset: usize, init: &ProcessInit) -> Result<usize> {
    if init.id == 0 {
        return Err(Error::InvalidArgument(format!(
            "program {} has no program ID",
            init.program_idx
        )));
    }
    if init.cell_dependencies.is_empty() && init.terminal_dependencies.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "program {} has no dependencies",
            init.program_idx
        )));
    }

    let size = sizeof_process(init.cell_dependencies.len(), init.terminal_dependencies.len());
    let cell_offset = ProcessHeader::SIZE;
    let terminal_offset = cell_offset + init.cell_dependencies.len();
    let header = ProcessHeader {
        kernel_bitmap: init.kernel_bitmap,
        parent_offset: -(i32::try_from(offset).map_err(|_| Error::Overflow {
            what: "process offset",
            size: offset,
            limit: i32::MAX as usize,
        })?),
        id: init.id,
        size: to_u16("process", size)?,
        cell_dependency_offset: cell_offset as u16,
        terminal_dependency_offset: to_u16("process terminal dependencies", terminal_offset)?,
        program_idx: to_u8("program index", init.program_idx)?,
        state: ProcessState::Created as u8,
        cell: init.cell,
        cell_dependency_count: to_u8("cell dependencies", init.cell_dependencies.len())?,
        terminal_dependency_count: to_u8(
            "terminal dependencies",
            init.terminal_dependencies.len(),
        )?,
        padding: [0; 5],
    };
    blob.store(offset, &header)?;
    blob.bytes_mut(offset + cell_offset, init.cell_dependencies.len())?
        .copy_from_slice(init.cell_dependencies);
    blob.bytes_mut(offset + terminal_offset, init.terminal_dependencies.len())?
        .copy_from_slice(init.terminal_dependencies);

    blob.update(offset, |h: &mut ProcessHeader| {
        h.state = ProcessState::Ready as u8
    })?;
    Ok(size)
}

/// A process read from a process group blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Process {
    /// Absolute position of the record in the process group blob.
    pub offset: usize,
    pub header: ProcessHeader,
    pub state: ProcessState,
    /// Process indices this process waits on.
    pub cell_dependencies: Vec<u8>,
    /// Runtime terminal indices this process reads or writes.
    pub terminal_dependencies: Vec<u8>,
}

impl Process {
    pub(crate) fn load(blob: &Blob, offset: usize) -> Result<Self> {
        let header: ProcessHeader = blob.load(offset)?;
        let state = ProcessState::try_from(header.state)?;
        let cell_dependencies = blob
            .bytes(
                offset + header.cell_dependency_offset as usize,
                header.cell_dependency_count as usize,
            )?
            .to_vec();
        let terminal_dependencies = blob
            .bytes(
                offset + header.terminal_dependency_offset as usize,
                header.terminal_dependency_count as usize,
            )?
            .to_vec();
        Ok(Self {
            offset,
            header,
            state,
            cell_dependencies,
            terminal_dependencies,
        })
    }

    pub fn id(&self) -> u32 {
        self.header.id
    }

    pub fn program_idx(&self) -> usize {
        self.header.program_idx as usize
    }

    pub fn kernel_bitmap(&self) -> KernelBitmap {
        self.header.kernel_bitmap
    }

    pub fn cell(&self) -> Option<u8> {
        (self.header.cell != NO_CELL).then_some(self.header.cell)
    }

    pub fn size(&self) -> usize {
        self.header.size as usize
    }
}
