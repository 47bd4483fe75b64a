// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Program manifests.
//!
//! A program record is a fixed header followed by two `u8` arrays: the
//! indices of the programs it depends on and the indices of the terminals it
//! owns. Both indices refer to siblings in the same manifest.

use crate::{
    bitmap::KernelBitmap,
    blob::{align_up, records, to_u16, Blob, Record},
    error::{Error, Result},
};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cell ID meaning "not bound to a fixed cell".
pub const NO_CELL: u8 = 0xFF;

/// Cell type ID meaning "no cell type requirement".
pub const NO_CELL_TYPE: u8 = 0xFF;

/// Role of a program within the sub/super taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ProgramType {
    Singular = 0,
    ExclusiveSub,
    ExclusiveSuper,
    ParallelSub,
    ParallelSuper,
    VirtualSub,
    VirtualSuper,
}

impl ProgramType {
    pub fn is_sub(self) -> bool {
        matches!(
            self,
            ProgramType::ExclusiveSub | ProgramType::ParallelSub | ProgramType::VirtualSub
        )
    }

    pub fn is_super(self) -> bool {
        matches!(
            self,
            ProgramType::ExclusiveSuper | ProgramType::ParallelSuper | ProgramType::VirtualSuper
        )
    }

    pub fn is_singular(self) -> bool {
        self == ProgramType::Singular
    }

    pub fn is_exclusive(self) -> bool {
        matches!(
            self,
            ProgramType::ExclusiveSub | ProgramType::ExclusiveSuper
        )
    }

    pub fn is_parallel(self) -> bool {
        matches!(self, ProgramType::ParallelSub | ProgramType::ParallelSuper)
    }

    pub fn is_virtual(self) -> bool {
        matches!(self, ProgramType::VirtualSub | ProgramType::VirtualSuper)
    }

    /// Exclusive and virtual subs do not own terminals or run on their own;
    /// their super stands in for them.
    pub fn is_excluded_sub(self) -> bool {
        matches!(self, ProgramType::ExclusiveSub | ProgramType::VirtualSub)
    }

    /// The super type a sub of this type must depend on.
    pub fn super_type(self) -> Option<ProgramType> {
        match self {
            ProgramType::ExclusiveSub => Some(ProgramType::ExclusiveSuper),
            ProgramType::ParallelSub => Some(ProgramType::ParallelSuper),
            ProgramType::VirtualSub => Some(ProgramType::VirtualSuper),
            _ => None,
        }
    }

    /// The sub type that may depend on a super of this type.
    pub fn sub_type(self) -> Option<ProgramType> {
        match self {
            ProgramType::ExclusiveSuper => Some(ProgramType::ExclusiveSub),
            ProgramType::ParallelSuper => Some(ProgramType::ParallelSub),
            ProgramType::VirtualSuper => Some(ProgramType::VirtualSub),
            _ => None,
        }
    }
}

impl TryFrom<u8> for ProgramType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => ProgramType::Singular,
            1 => ProgramType::ExclusiveSub,
            2 => ProgramType::ExclusiveSuper,
            3 => ProgramType::ParallelSub,
            4 => ProgramType::ParallelSuper,
            5 => ProgramType::VirtualSub,
            6 => ProgramType::VirtualSuper,
            _ => return Err(Error::UnknownProgramType(value)),
        })
    }
}

impl fmt::Display for ProgramType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ProgramManifestHeader {
    pub kernel_bitmap: KernelBitmap,
    pub id: u32,
    /// Offset from this program back to the manifest base (negative).
    pub parent_offset: i32,
    pub size: u16,
    pub program_dependency_offset: u16,
    pub terminal_dependency_offset: u16,
    pub program_type: u8,
    /// Fixed cell, or [`NO_CELL`].
    pub cell_id: u8,
    /// Required cell type, or [`NO_CELL_TYPE`].
    pub cell_type_id: u8,
    pub program_dependency_count: u8,
    pub terminal_dependency_count: u8,
    pub padding: [u8; 5],
}

records! {
    ProgramManifestHeader => 320,
}

/// Dependency counts of one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgramShape {
    pub program_dependency_count: u8,
    pub terminal_dependency_count: u8,
}

impl ProgramShape {
    pub fn new(program_dependency_count: u8, terminal_dependency_count: u8) -> Self {
        Self {
            program_dependency_count,
            terminal_dependency_count,
        }
    }

    /// Header plus both dependency arrays, padded to the blob alignment.
    pub fn sizeof(&self) -> usize {
        align_up(
            ProgramManifestHeader::SIZE
                + self.program_dependency_count as usize
                + self.terminal_dependency_count as usize,
        )
    }

    /// Write an empty program record at absolute `offset` and return the
    /// number of bytes consumed.
    pub(crate) fn init(&self, blob: &mut Blob, offset: usize) -> Result<usize> {
        let size = self.sizeof();
        let program_dependency_offset = ProgramManifestHeader::SIZE;
        let terminal_dependency_offset =
            program_dependency_offset + self.program_dependency_count as usize;

        let header = ProgramManifestHeader {
            kernel_bitmap: KernelBitmap::clear(),
            id: 0,
            parent_offset: -(offset as i32),
            size: to_u16("program manifest", size)?,
            program_dependency_offset: program_dependency_offset as u16,
            terminal_dependency_offset: terminal_dependency_offset as u16,
            program_type: ProgramType::Singular as u8,
            cell_id: NO_CELL,
            cell_type_id: NO_CELL_TYPE,
            program_dependency_count: self.program_dependency_count,
            terminal_dependency_count: self.terminal_dependency_count,
            padding: [0; 5],
        };
        blob.store(offset, &header)?;
        Ok(size)
    }
}

/// A program manifest read from a blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramManifest {
    /// Absolute position of the record in the manifest blob.
    pub offset: usize,
    pub header: ProgramManifestHeader,
    pub program_type: ProgramType,
    pub program_dependencies: Vec<u8>,
    pub terminal_dependencies: Vec<u8>,
}

impl ProgramManifest {
    pub(crate) fn load(blob: &Blob, offset: usize) -> Result<Self> {
        let header: ProgramManifestHeader = blob.load(offset)?;
        let program_type = ProgramType::try_from(header.program_type)?;
        let program_dependencies = blob
            .bytes(
                offset + header.program_dependency_offset as usize,
                header.program_dependency_count as usize,
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
            program_type,
            program_dependencies,
            terminal_dependencies,
        })
    }

    pub fn id(&self) -> u32 {
        self.header.id
    }

    pub fn kernel_bitmap(&self) -> KernelBitmap {
        self.header.kernel_bitmap
    }

    pub fn program_type(&self) -> ProgramType {
        self.program_type
    }

    pub fn size(&self) -> usize {
        self.header.size as usize
    }

    pub fn cell_id(&self) -> u8 {
        self.header.cell_id
    }

    pub fn cell_type_id(&self) -> u8 {
        self.header.cell_type_id
    }

    /// Bound to a specific cell rather than to any cell of a type.
    pub fn has_fixed_cell(&self) -> bool {
        self.header.cell_id != NO_CELL && self.header.cell_type_id == NO_CELL_TYPE
    }

    pub fn program_dependency_count(&self) -> usize {
        self.program_dependencies.len()
    }

    pub fn terminal_dependency_count(&self) -> usize {
        self.terminal_dependencies.len()
    }

    pub fn program_dependency(&self, index: usize) -> Option<u8> {
        self.program_dependencies.get(index).copied()
    }

    pub fn terminal_dependency(&self, index: usize) -> Option<u8> {
        self.terminal_dependencies.get(index).copied()
    }

    pub fn shape(&self) -> ProgramShape {
        ProgramShape::new(
            self.header.program_dependency_count,
            self.header.terminal_dependency_count,
        )
    }
}
