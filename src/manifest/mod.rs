// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Program group manifests.
//!
//! A manifest is one contiguous, relocatable blob laid out as
//!
//! ```text
//! +----------------+ 0
//! | ManifestHeader |
//! +----------------+ program_manifest_offset
//! | programs ...   |  variable size, walked by each record's size
//! +----------------+ terminal_manifest_offset
//! | terminals ...  |  variable size, walked by each record's size
//! +----------------+ private_data_offset
//! | private data   |
//! +----------------+ rbm_manifest_offset
//! | RBM manifest   |
//! +----------------+ size
//! ```
//!
//! Layout is a two-phase protocol. [`ProgramGroupManifest::sizeof`] computes
//! the total from a [`ManifestShape`], and [`ProgramGroupManifest::new`]
//! walks the same shape writing each member at a running cursor. A mismatch
//! between the two is reported as [`Error::LayoutMismatch`].

pub mod program;
pub mod terminal;

pub use program::{
    ProgramManifest, ProgramManifestHeader, ProgramShape, ProgramType, NO_CELL, NO_CELL_TYPE,
};
pub use terminal::{
    ConnectBufferType, DataTerminalManifest, FragmentParamManifestSection,
    FrameGridManifestSection, GridBounds, ParamManifestSection, ParamTerminalManifest,
    ProgramControlInitProgramDesc, ProgramControlInitTerminalManifest, ProgramTerminalManifest,
    RateOfUpdate, SectionInfo, SequencerInfoManifest, SlicedManifestSection,
    SlicedParamTerminalManifest, SpatialParamTerminalManifest, TerminalAttributes,
    TerminalCategory, TerminalDirection, TerminalManifest, TerminalManifestHeader,
    TerminalRecord, TerminalShape, TerminalType, INVALID_TERMINAL_ID,
};

use crate::{
    bitmap::KernelBitmap,
    blob::{align_up, records, to_u16, to_u8, Blob, Record, ALIGNMENT},
    error::{Error, Result},
};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// ID assigned to a freshly initialized manifest. Zero is reserved.
pub const DEFAULT_PROGRAM_GROUP_ID: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ManifestHeader {
    /// Union of every program's kernel bitmap.
    pub kernel_bitmap: KernelBitmap,
    pub id: u32,
    pub program_manifest_offset: u16,
    pub terminal_manifest_offset: u16,
    pub private_data_offset: u16,
    pub rbm_manifest_offset: u16,
    pub size: u16,
    pub alignment: u8,
    pub kernel_count: u8,
    pub program_count: u8,
    pub terminal_count: u8,
    pub subgraph_count: u8,
    pub reserved: [u8; 5],
}

records! {
    ManifestHeader => 320,
}

/// Count parameters of a whole manifest.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ManifestShape {
    pub programs: Vec<ProgramShape>,
    pub terminals: Vec<TerminalShape>,
    #[serde(default)]
    pub private_data_size: usize,
    #[serde(default)]
    pub rbm_manifest_size: usize,
}

/// Which trailing array of a terminal a section setter addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trailing {
    ParamSections,
    SpatialSections,
    SlicedSections,
    FragmentParamSections,
    SequencerInfos,
    ProgramDescs,
}

/// A program group manifest blob.
#[derive(Clone, PartialEq, Eq)]
pub struct ProgramGroupManifest {
    blob: Blob,
    header: ManifestHeader,
}

impl ProgramGroupManifest {
    /// Total size in bytes of a manifest with the given shape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Overflow`] when the program or terminal count does
    /// not fit in a `u8`, or when the total does not fit in the `u16` size
    /// field.
    pub fn sizeof(shape: &ManifestShape) -> Result<usize> {
        to_u8("program count", shape.programs.len())?;
        to_u8("terminal count", shape.terminals.len())?;

        let size = ManifestHeader::SIZE
            + shape.programs.iter().map(ProgramShape::sizeof).sum::<usize>()
            + shape.terminals.iter().map(TerminalShape::sizeof).sum::<usize>()
            + align_up(shape.private_data_size)
            + align_up(shape.rbm_manifest_size);

        to_u16("program group manifest", size)?;
        Ok(size)
    }

    /// Lay out an empty manifest for `shape`.
    ///
    /// Programs start as [`ProgramType::Singular`] with no kernels and no
    /// cell binding. Terminals carry their type, their index as ID, the
    /// attributes implied by the type, no association and an unbounded
    /// payload size. Everything else is zero and filled in by the setters.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`ProgramGroupManifest::sizeof`], and
    /// [`Error::LayoutMismatch`] if the init walk does not end exactly at the
    /// computed size.
    ///
    /// # Example
    ///
    /// ```
    /// use edgefirst_psys::manifest::{
    ///     ManifestShape, ProgramGroupManifest, ProgramShape, TerminalDirection, TerminalShape,
    /// };
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let shape = ManifestShape {
    ///     programs: vec![ProgramShape::new(0, 2)],
    ///     terminals: vec![
    ///         TerminalShape::Data { direction: TerminalDirection::In },
    ///         TerminalShape::Data { direction: TerminalDirection::Out },
    ///     ],
    ///     ..Default::default()
    /// };
    /// let manifest = ProgramGroupManifest::new(&shape)?;
    /// assert_eq!(manifest.size(), ProgramGroupManifest::sizeof(&shape)?);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(shape: &ManifestShape) -> Result<Self> {
        let size = Self::sizeof(shape)?;
        let mut blob = Blob::zeroed(size);

        let mut cursor = ManifestHeader::SIZE;
        let program_manifest_offset = cursor;
        for program in &shape.programs {
            cursor += program.init(&mut blob, cursor)?;
        }

        let terminal_manifest_offset = cursor;
        for (id, terminal) in shape.terminals.iter().enumerate() {
            cursor += terminal.init(&mut blob, cursor, id as u8)?;
        }

        let private_data_offset = cursor;
        cursor += align_up(shape.private_data_size);
        let rbm_manifest_offset = cursor;
        cursor += align_up(shape.rbm_manifest_size);

        if cursor != size {
            return Err(Error::LayoutMismatch {
                what: "program group manifest",
                consumed: cursor,
                expected: size,
            });
        }

        let header = ManifestHeader {
            kernel_bitmap: KernelBitmap::clear(),
            id: DEFAULT_PROGRAM_GROUP_ID,
            program_manifest_offset: program_manifest_offset as u16,
            terminal_manifest_offset: terminal_manifest_offset as u16,
            private_data_offset: private_data_offset as u16,
            rbm_manifest_offset: rbm_manifest_offset as u16,
            size: size as u16,
            alignment: ALIGNMENT as u8,
            kernel_count: 0,
            program_count: shape.programs.len() as u8,
            terminal_count: shape.terminals.len() as u8,
            subgraph_count: 1,
            reserved: [0; 5],
        };
        blob.store(0, &header)?;

        debug!(
            "manifest layout: size={} programs@{} terminals@{} private@{} rbm@{}",
            size,
            program_manifest_offset,
            terminal_manifest_offset,
            private_data_offset,
            rbm_manifest_offset
        );

        Ok(Self { blob, header })
    }

    /// Reinterpret a copied manifest blob.
    ///
    /// The header offsets and every program and terminal size are walked to
    /// confirm that the members tile the blob without gaps or overlap.
    pub fn from_bytes(bytes: impl Into<Blob>) -> Result<Self> {
        let blob: Blob = bytes.into();
        let header: ManifestHeader = blob.load(0)?;

        if header.size as usize != blob.len() {
            return Err(Error::LayoutMismatch {
                what: "program group manifest",
                consumed: blob.len(),
                expected: header.size as usize,
            });
        }

        let offsets = [
            ManifestHeader::SIZE,
            header.program_manifest_offset as usize,
            header.terminal_manifest_offset as usize,
            header.private_data_offset as usize,
            header.rbm_manifest_offset as usize,
            header.size as usize,
        ];
        if offsets.windows(2).any(|w| w[0] > w[1])
            || offsets.iter().any(|o| o % ALIGNMENT != 0)
        {
            return Err(Error::InvalidArgument(format!(
                "manifest member offsets out of order: {:?}",
                offsets
            )));
        }

        let manifest = Self { blob, header };

        let end = manifest.walk_programs()?.last().map_or(
            header.program_manifest_offset as usize,
            |p| p.offset + p.size(),
        );
        if end != header.terminal_manifest_offset as usize {
            return Err(Error::LayoutMismatch {
                what: "program manifests",
                consumed: end - header.program_manifest_offset as usize,
                expected: (header.terminal_manifest_offset - header.program_manifest_offset)
                    as usize,
            });
        }

        let mut end = header.terminal_manifest_offset as usize;
        for _ in 0..header.terminal_count {
            let terminal: TerminalManifestHeader = manifest.blob.load(end)?;
            end += terminal.size as usize;
        }
        if end != header.private_data_offset as usize {
            return Err(Error::LayoutMismatch {
                what: "terminal manifests",
                consumed: end - header.terminal_manifest_offset as usize,
                expected: (header.private_data_offset - header.terminal_manifest_offset)
                    as usize,
            });
        }

        Ok(manifest)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.blob.as_bytes()
    }

    pub fn blob(&self) -> &Blob {
        &self.blob
    }

    pub fn into_blob(self) -> Blob {
        self.blob
    }

    pub fn header(&self) -> &ManifestHeader {
        &self.header
    }

    pub fn size(&self) -> usize {
        self.header.size as usize
    }

    pub fn id(&self) -> u32 {
        self.header.id
    }

    pub fn kernel_bitmap(&self) -> KernelBitmap {
        self.header.kernel_bitmap
    }

    pub fn alignment(&self) -> u8 {
        self.header.alignment
    }

    pub fn program_count(&self) -> usize {
        self.header.program_count as usize
    }

    pub fn terminal_count(&self) -> usize {
        self.header.terminal_count as usize
    }

    pub fn subgraph_count(&self) -> u8 {
        self.header.subgraph_count
    }

    fn store_header(&mut self) -> Result<()> {
        self.blob.store(0, &self.header)
    }

    pub fn set_id(&mut self, id: u32) -> Result<()> {
        self.header.id = id;
        self.store_header()
    }

    /// Set the total kernel bitmap and its kernel count.
    pub fn set_kernel_bitmap(&mut self, bitmap: KernelBitmap) -> Result<()> {
        self.header.kernel_bitmap = bitmap;
        self.header.kernel_count = bitmap.weight() as u8;
        self.store_header()
    }

    pub fn set_alignment(&mut self, alignment: u8) -> Result<()> {
        self.header.alignment = alignment;
        self.store_header()
    }

    pub fn set_subgraph_count(&mut self, count: u8) -> Result<()> {
        self.header.subgraph_count = count;
        self.store_header()
    }

    /// Recompute the total kernel bitmap as the union of all programs.
    pub fn update_kernel_bitmap(&mut self) -> Result<KernelBitmap> {
        let bitmap = self
            .walk_programs()?
            .iter()
            .fold(KernelBitmap::clear(), |acc, p| acc.union(p.kernel_bitmap()));
        self.set_kernel_bitmap(bitmap)?;
        Ok(bitmap)
    }

    fn walk_programs(&self) -> Result<Vec<ProgramManifest>> {
        let mut offset = self.header.program_manifest_offset as usize;
        let mut programs = Vec::with_capacity(self.program_count());
        for _ in 0..self.program_count() {
            let program = ProgramManifest::load(&self.blob, offset)?;
            offset += program.size();
            programs.push(program);
        }
        Ok(programs)
    }

    /// Absolute position of program `index`, found by walking the sizes of
    /// the programs before it.
    pub fn program_offset(&self, index: usize) -> Result<usize> {
        if index >= self.program_count() {
            return Err(Error::index("program", index, self.program_count()));
        }
        let mut offset = self.header.program_manifest_offset as usize;
        for _ in 0..index {
            let header: ProgramManifestHeader = self.blob.load(offset)?;
            offset += header.size as usize;
        }
        Ok(offset)
    }

    pub fn program(&self, index: usize) -> Result<ProgramManifest> {
        ProgramManifest::load(&self.blob, self.program_offset(index)?)
    }

    /// All programs in declaration order.
    pub fn programs(&self) -> Result<Vec<ProgramManifest>> {
        self.walk_programs()
    }

    /// Absolute position of terminal `index`.
    pub fn terminal_offset(&self, index: usize) -> Result<usize> {
        if index >= self.terminal_count() {
            return Err(Error::index("terminal", index, self.terminal_count()));
        }
        let mut offset = self.header.terminal_manifest_offset as usize;
        for _ in 0..index {
            let header: TerminalManifestHeader = self.blob.load(offset)?;
            offset += header.size as usize;
        }
        Ok(offset)
    }

    pub fn terminal(&self, index: usize) -> Result<TerminalManifest> {
        TerminalManifest::load(&self.blob, self.terminal_offset(index)?)
    }

    pub fn terminal_header(&self, index: usize) -> Result<TerminalManifestHeader> {
        self.blob.load(self.terminal_offset(index)?)
    }

    /// All terminals in declaration order.
    pub fn terminals(&self) -> Result<Vec<TerminalManifest>> {
        let mut offset = self.header.terminal_manifest_offset as usize;
        let mut terminals = Vec::with_capacity(self.terminal_count());
        for _ in 0..self.terminal_count() {
            let terminal = TerminalManifest::load(&self.blob, offset)?;
            offset += terminal.size();
            terminals.push(terminal);
        }
        Ok(terminals)
    }

    /// The shape this manifest was laid out with.
    pub fn shape(&self) -> Result<ManifestShape> {
        Ok(ManifestShape {
            programs: self.walk_programs()?.iter().map(|p| p.shape()).collect(),
            terminals: self.terminals()?.iter().map(|t| t.shape()).collect(),
            private_data_size: (self.header.rbm_manifest_offset - self.header.private_data_offset)
                as usize,
            rbm_manifest_size: (self.header.size - self.header.rbm_manifest_offset) as usize,
        })
    }

    fn update_program<R>(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut ProgramManifestHeader) -> R,
    ) -> Result<R> {
        let offset = self.program_offset(index)?;
        self.blob.update(offset, f)
    }

    pub fn set_program_id(&mut self, index: usize, id: u32) -> Result<()> {
        self.update_program(index, |p| p.id = id)
    }

    pub fn set_program_type(&mut self, index: usize, program_type: ProgramType) -> Result<()> {
        self.update_program(index, |p| p.program_type = program_type as u8)
    }

    pub fn set_program_kernel_bitmap(&mut self, index: usize, bitmap: KernelBitmap) -> Result<()> {
        self.update_program(index, |p| p.kernel_bitmap = bitmap)
    }

    /// Bind program `index` to a fixed cell. Pass [`NO_CELL`] to unbind.
    pub fn set_program_cell(&mut self, index: usize, cell_id: u8) -> Result<()> {
        self.update_program(index, |p| p.cell_id = cell_id)
    }

    pub fn set_program_cell_type(&mut self, index: usize, cell_type_id: u8) -> Result<()> {
        self.update_program(index, |p| p.cell_type_id = cell_type_id)
    }

    /// Set program dependency `slot` of program `index` to `program`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `slot` is beyond the program's
    /// dependency count or `program` is not a program of this manifest.
    pub fn set_program_dependency(&mut self, index: usize, slot: usize, program: u8) -> Result<()> {
        if program as usize >= self.program_count() {
            return Err(Error::index(
                "program dependency",
                program as usize,
                self.program_count(),
            ));
        }
        let offset = self.program_offset(index)?;
        let header: ProgramManifestHeader = self.blob.load(offset)?;
        if slot >= header.program_dependency_count as usize {
            return Err(Error::index(
                "program dependency slot",
                slot,
                header.program_dependency_count as usize,
            ));
        }
        self.blob.store(
            offset + header.program_dependency_offset as usize + slot,
            &program,
        )
    }

    /// Set terminal dependency `slot` of program `index` to `terminal`.
    pub fn set_terminal_dependency(
        &mut self,
        index: usize,
        slot: usize,
        terminal: u8,
    ) -> Result<()> {
        if terminal as usize >= self.terminal_count() {
            return Err(Error::index(
                "terminal dependency",
                terminal as usize,
                self.terminal_count(),
            ));
        }
        let offset = self.program_offset(index)?;
        let header: ProgramManifestHeader = self.blob.load(offset)?;
        if slot >= header.terminal_dependency_count as usize {
            return Err(Error::index(
                "terminal dependency slot",
                slot,
                header.terminal_dependency_count as usize,
            ));
        }
        self.blob.store(
            offset + header.terminal_dependency_offset as usize + slot,
            &terminal,
        )
    }

    /// Read-modify-write the record of terminal `index` as `T`.
    ///
    /// The closure may change any content field. Layout fields (size, type,
    /// ID, parent offset, trailing array counts and offsets) and the
    /// association are rejected with [`Error::InvalidArgument`] if changed;
    /// use [`ProgramGroupManifest::set_terminal_connect_id`] for the latter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TerminalKind`] when terminal `index` is not a `T`.
    pub fn update_terminal<T: TerminalRecord, R>(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R> {
        let offset = self.terminal_offset(index)?;
        let header: TerminalManifestHeader = self.blob.load(offset)?;
        let terminal_type = header.terminal_type()?;
        if !T::accepts(terminal_type) {
            return Err(Error::TerminalKind {
                index,
                expected: T::KIND,
                actual: terminal_type.name(),
            });
        }

        let mut record: T = self.blob.load(offset)?;
        let layout = record.layout();
        let ret = f(&mut record);

        let base = record.base();
        if base.size != header.size
            || base.terminal_type != header.terminal_type
            || base.id != header.id
            || base.parent_offset != header.parent_offset
            || base.assoc_id != header.assoc_id
            || record.layout() != layout
        {
            return Err(Error::InvalidArgument(format!(
                "layout fields of terminal {index} are read-only"
            )));
        }

        self.blob.store(offset, &record)?;
        Ok(ret)
    }

    /// Pair terminal `index` with terminal `assoc_id`.
    ///
    /// Only load terminals can be paired; any terminal can be reset to
    /// [`INVALID_TERMINAL_ID`].
    pub fn set_terminal_connect_id(&mut self, index: usize, assoc_id: u8) -> Result<()> {
        let offset = self.terminal_offset(index)?;
        let mut header: TerminalManifestHeader = self.blob.load(offset)?;
        if assoc_id != INVALID_TERMINAL_ID
            && header.attributes().category() != TerminalCategory::Load
        {
            return Err(Error::InvalidArgument(format!(
                "terminal {index} is a connect terminal and cannot be paired"
            )));
        }
        header.assoc_id = assoc_id;
        self.blob.store(offset, &header)
    }

    fn trailing_slot(
        &self,
        index: usize,
        array: Trailing,
        slot: usize,
        element: usize,
    ) -> Result<usize> {
        let offset = self.terminal_offset(index)?;
        let terminal = TerminalManifest::load(&self.blob, offset)?;
        let (expected, base) = match (&terminal, array) {
            (TerminalManifest::Param { record, .. }, Trailing::ParamSections) => {
                ("param", Some((record.section_offset, record.section_count)))
            }
            (TerminalManifest::Spatial { record, .. }, Trailing::SpatialSections) => {
                ("spatial", Some((record.section_offset, record.section_count)))
            }
            (TerminalManifest::Sliced { record, .. }, Trailing::SlicedSections) => {
                ("sliced", Some((record.section_offset, record.section_count)))
            }
            (TerminalManifest::Program { record, .. }, Trailing::FragmentParamSections) => (
                "program",
                Some((
                    record.fragment_param_section_offset,
                    record.fragment_param_section_count,
                )),
            ),
            (TerminalManifest::Program { record, .. }, Trailing::SequencerInfos) => (
                "program",
                Some((record.sequencer_info_offset, record.sequencer_info_count)),
            ),
            (TerminalManifest::ProgramControlInit { record, .. }, Trailing::ProgramDescs) => (
                "program-control-init",
                Some((record.program_desc_offset, record.program_count as u16)),
            ),
            (_, Trailing::ParamSections) => ("param", None),
            (_, Trailing::SpatialSections) => ("spatial", None),
            (_, Trailing::SlicedSections) => ("sliced", None),
            (_, Trailing::FragmentParamSections | Trailing::SequencerInfos) => ("program", None),
            (_, Trailing::ProgramDescs) => ("program-control-init", None),
        };

        let (array_offset, count) = base.ok_or(Error::TerminalKind {
            index,
            expected,
            actual: terminal.terminal_type().name(),
        })?;
        if slot >= count as usize {
            return Err(Error::index("terminal section", slot, count as usize));
        }
        Ok(offset + array_offset as usize + slot * element)
    }

    pub fn set_param_section(
        &mut self,
        index: usize,
        slot: usize,
        section: ParamManifestSection,
    ) -> Result<()> {
        let at = self.trailing_slot(
            index,
            Trailing::ParamSections,
            slot,
            ParamManifestSection::SIZE,
        )?;
        self.blob.store(at, &section)
    }

    pub fn set_spatial_section(
        &mut self,
        index: usize,
        slot: usize,
        section: FrameGridManifestSection,
    ) -> Result<()> {
        let at = self.trailing_slot(
            index,
            Trailing::SpatialSections,
            slot,
            FrameGridManifestSection::SIZE,
        )?;
        self.blob.store(at, &section)
    }

    pub fn set_sliced_section(
        &mut self,
        index: usize,
        slot: usize,
        section: SlicedManifestSection,
    ) -> Result<()> {
        let at = self.trailing_slot(
            index,
            Trailing::SlicedSections,
            slot,
            SlicedManifestSection::SIZE,
        )?;
        self.blob.store(at, &section)
    }

    pub fn set_fragment_param_section(
        &mut self,
        index: usize,
        slot: usize,
        section: FragmentParamManifestSection,
    ) -> Result<()> {
        let at = self.trailing_slot(
            index,
            Trailing::FragmentParamSections,
            slot,
            FragmentParamManifestSection::SIZE,
        )?;
        self.blob.store(at, &section)
    }

    pub fn set_sequencer_info(
        &mut self,
        index: usize,
        slot: usize,
        info: SequencerInfoManifest,
    ) -> Result<()> {
        let at = self.trailing_slot(
            index,
            Trailing::SequencerInfos,
            slot,
            SequencerInfoManifest::SIZE,
        )?;
        self.blob.store(at, &info)
    }

    pub fn set_program_control_init_desc(
        &mut self,
        index: usize,
        slot: usize,
        desc: ProgramControlInitProgramDesc,
    ) -> Result<()> {
        let at = self.trailing_slot(
            index,
            Trailing::ProgramDescs,
            slot,
            ProgramControlInitProgramDesc::SIZE,
        )?;
        self.blob.store(at, &desc)
    }

    /// Opaque private data.
    pub fn private_data(&self) -> Result<&[u8]> {
        let offset = self.header.private_data_offset as usize;
        self.blob.bytes(
            offset,
            self.header.rbm_manifest_offset as usize - offset,
        )
    }

    pub fn private_data_mut(&mut self) -> Result<&mut [u8]> {
        let offset = self.header.private_data_offset as usize;
        let size = self.header.rbm_manifest_offset as usize - offset;
        self.blob.bytes_mut(offset, size)
    }

    /// Opaque routing bitmap sub-manifest.
    pub fn rbm_manifest(&self) -> Result<&[u8]> {
        let offset = self.header.rbm_manifest_offset as usize;
        self.blob.bytes(offset, self.size() - offset)
    }

    pub fn rbm_manifest_mut(&mut self) -> Result<&mut [u8]> {
        let offset = self.header.rbm_manifest_offset as usize;
        let size = self.size() - offset;
        self.blob.bytes_mut(offset, size)
    }
}

impl fmt::Debug for ProgramGroupManifest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ProgramGroupManifest")
            .field("header", &self.header)
            .finish()
    }
}

impl fmt::Display for ProgramGroupManifest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "manifest id:{} size:{} programs:{} terminals:{} kernels:{}",
            self.header.id,
            self.header.size,
            self.header.program_count,
            self.header.terminal_count,
            self.header.kernel_bitmap
        )
    }
}
