// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Terminal manifests: the static description of each connection point of a
//! program group.
//!
//! Every terminal record starts with a [`TerminalManifestHeader`] and may be
//! followed by trailing arrays whose offsets are stored relative to the
//! terminal's own base. The type tag in the header selects one of six
//! layouts, read back as a [`TerminalManifest`].

use crate::{
    bitmap::KernelBitmap,
    blob::{align_up, records, to_u16, Blob, Record},
    error::{Error, Result},
};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal ID marking an absent association.
pub const INVALID_TERMINAL_ID: u8 = 0xFF;

/// Terminal type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TerminalType {
    DataIn = 0,
    DataOut,
    ParamStream,
    ParamCachedIn,
    ParamCachedOut,
    ParamSpatialIn,
    ParamSpatialOut,
    ParamSlicedIn,
    ParamSlicedOut,
    StateIn,
    StateOut,
    Program,
    ProgramControlInit,
}

impl TerminalType {
    pub fn is_data(self) -> bool {
        matches!(self, TerminalType::DataIn | TerminalType::DataOut)
    }

    /// Cached parameter terminal.
    pub fn is_param(self) -> bool {
        matches!(
            self,
            TerminalType::ParamCachedIn | TerminalType::ParamCachedOut
        )
    }

    pub fn is_spatial(self) -> bool {
        matches!(
            self,
            TerminalType::ParamSpatialIn | TerminalType::ParamSpatialOut
        )
    }

    pub fn is_sliced(self) -> bool {
        matches!(
            self,
            TerminalType::ParamSlicedIn | TerminalType::ParamSlicedOut
        )
    }

    pub fn is_program(self) -> bool {
        self == TerminalType::Program
    }

    pub fn is_program_control_init(self) -> bool {
        self == TerminalType::ProgramControlInit
    }

    /// Direction implied by the type.
    pub fn direction(self) -> TerminalDirection {
        match self {
            TerminalType::DataOut
            | TerminalType::ParamCachedOut
            | TerminalType::ParamSpatialOut
            | TerminalType::ParamSlicedOut
            | TerminalType::StateOut => TerminalDirection::Out,
            _ => TerminalDirection::In,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TerminalType::DataIn => "data-in",
            TerminalType::DataOut => "data-out",
            TerminalType::ParamStream => "param-stream",
            TerminalType::ParamCachedIn => "param-cached-in",
            TerminalType::ParamCachedOut => "param-cached-out",
            TerminalType::ParamSpatialIn => "param-spatial-in",
            TerminalType::ParamSpatialOut => "param-spatial-out",
            TerminalType::ParamSlicedIn => "param-sliced-in",
            TerminalType::ParamSlicedOut => "param-sliced-out",
            TerminalType::StateIn => "state-in",
            TerminalType::StateOut => "state-out",
            TerminalType::Program => "program",
            TerminalType::ProgramControlInit => "program-control-init",
        }
    }
}

impl TryFrom<u8> for TerminalType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        use TerminalType::*;
        const TYPES: [TerminalType; 13] = [
            DataIn,
            DataOut,
            ParamStream,
            ParamCachedIn,
            ParamCachedOut,
            ParamSpatialIn,
            ParamSpatialOut,
            ParamSlicedIn,
            ParamSlicedOut,
            StateIn,
            StateOut,
            Program,
            ProgramControlInit,
        ];
        TYPES
            .get(value as usize)
            .copied()
            .ok_or(Error::UnknownTerminalType(value))
    }
}

impl fmt::Display for TerminalType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a terminal is loaded by the host or connected to another group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalCategory {
    Load,
    Connect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalDirection {
    In,
    Out,
}

/// How often the terminal payload changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateOfUpdate {
    Frame,
    Fragment,
    Stream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBufferType {
    Unknown,
    Data,
    Meta,
}

/// Packed terminal attributes.
///
/// | bits | field |
/// | --- | --- |
/// | 0 | category |
/// | 1 | direction |
/// | 2..4 | rate of update |
/// | 4..6 | connect buffer type |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TerminalAttributes(pub u8);

impl TerminalAttributes {
    /// Attributes implied by a terminal type.
    pub fn from_type(terminal_type: TerminalType) -> Self {
        let category = if terminal_type.is_data() || terminal_type.is_spatial() {
            TerminalCategory::Connect
        } else {
            TerminalCategory::Load
        };
        let rate = if terminal_type.is_data() {
            RateOfUpdate::Fragment
        } else if terminal_type.is_program_control_init() {
            RateOfUpdate::Stream
        } else {
            RateOfUpdate::Frame
        };
        let buffer = if terminal_type.is_data() {
            ConnectBufferType::Data
        } else if terminal_type.is_spatial() {
            ConnectBufferType::Meta
        } else {
            ConnectBufferType::Unknown
        };

        Self::new(category, terminal_type.direction(), rate, buffer)
    }

    pub fn new(
        category: TerminalCategory,
        direction: TerminalDirection,
        rate: RateOfUpdate,
        buffer: ConnectBufferType,
    ) -> Self {
        let category = match category {
            TerminalCategory::Load => 0,
            TerminalCategory::Connect => 1,
        };
        let direction = match direction {
            TerminalDirection::In => 0,
            TerminalDirection::Out => 1,
        };
        let rate = match rate {
            RateOfUpdate::Frame => 0,
            RateOfUpdate::Fragment => 1,
            RateOfUpdate::Stream => 2,
        };
        let buffer = match buffer {
            ConnectBufferType::Unknown => 0,
            ConnectBufferType::Data => 1,
            ConnectBufferType::Meta => 2,
        };
        Self(category | (direction << 1) | (rate << 2) | (buffer << 4))
    }

    pub fn category(self) -> TerminalCategory {
        if self.0 & 1 == 0 {
            TerminalCategory::Load
        } else {
            TerminalCategory::Connect
        }
    }

    pub fn direction(self) -> TerminalDirection {
        if self.0 & 2 == 0 {
            TerminalDirection::In
        } else {
            TerminalDirection::Out
        }
    }

    pub fn rate_of_update(self) -> RateOfUpdate {
        match (self.0 >> 2) & 3 {
            1 => RateOfUpdate::Fragment,
            2 => RateOfUpdate::Stream,
            _ => RateOfUpdate::Frame,
        }
    }

    pub fn connect_buffer_type(self) -> ConnectBufferType {
        match (self.0 >> 4) & 3 {
            1 => ConnectBufferType::Data,
            2 => ConnectBufferType::Meta,
            _ => ConnectBufferType::Unknown,
        }
    }
}

/// Kernel, region and memory type packed into a 16-bit section info word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectionInfo {
    pub kernel_id: u8,
    pub region_id: u8,
    pub mem_type: u8,
}

impl SectionInfo {
    pub fn pack(self) -> u16 {
        u16::from(self.kernel_id)
            | (u16::from(self.region_id & 0xF) << 8)
            | (u16::from(self.mem_type & 0xF) << 12)
    }

    pub fn unpack(info: u16) -> Self {
        Self {
            kernel_id: (info & 0xFF) as u8,
            region_id: ((info >> 8) & 0xF) as u8,
            mem_type: ((info >> 12) & 0xF) as u8,
        }
    }
}

/// Header shared by every terminal manifest.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct TerminalManifestHeader {
    /// Offset from this terminal back to the manifest base (negative).
    pub parent_offset: i32,
    pub size: u16,
    pub terminal_type: u8,
    pub id: u8,
    /// Paired terminal, [`INVALID_TERMINAL_ID`] when unpaired.
    pub assoc_id: u8,
    pub attributes: u8,
    pub reserved: [u8; 2],
    pub max_payload_size: u32,
}

impl TerminalManifestHeader {
    pub fn terminal_type(&self) -> Result<TerminalType> {
        TerminalType::try_from(self.terminal_type)
    }

    pub fn attributes(&self) -> TerminalAttributes {
        TerminalAttributes(self.attributes)
    }
}

/// Width and height bounds.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct GridBounds {
    pub min: [u16; 2],
    pub max: [u16; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DataTerminalManifest {
    pub base: TerminalManifestHeader,
    /// One bit per supported [`FrameFormat`](crate::format::FrameFormat).
    pub frame_format_bitmap: u64,
    /// Kernel owning the terminal, exactly one bit.
    pub kernel_bitmap: KernelBitmap,
    pub min_size: [u16; 2],
    pub max_size: [u16; 2],
    pub min_fragment_size: [u16; 2],
    pub max_fragment_size: [u16; 2],
    pub terminal_dependency: u16,
    pub connection_bitmap: u8,
    pub compression_support: u8,
    pub padding: [u8; 4],
}

/// Cached parameter terminal (in or out).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ParamTerminalManifest {
    pub base: TerminalManifestHeader,
    pub section_count: u16,
    pub section_offset: u16,
    pub padding: [u8; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct ParamManifestSection {
    pub max_mem_size: u32,
    /// Packed [`SectionInfo`].
    pub info: u16,
    pub padding: u16,
}

impl ParamManifestSection {
    pub fn new(max_mem_size: u32, info: SectionInfo) -> Self {
        Self {
            max_mem_size,
            info: info.pack(),
            padding: 0,
        }
    }

    pub fn info(&self) -> SectionInfo {
        SectionInfo::unpack(self.info)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SpatialParamTerminalManifest {
    pub base: TerminalManifestHeader,
    pub frame_grid: GridBounds,
    pub fragment_grid: GridBounds,
    pub section_count: u16,
    pub section_offset: u16,
    pub kernel_id: u8,
    pub compute_units_per_elem: u8,
    pub padding: [u8; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct FrameGridManifestSection {
    pub max_mem_size: u32,
    pub mem_type_id: u8,
    pub region_id: u8,
    pub elem_size: u8,
    pub padding: u8,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SlicedParamTerminalManifest {
    pub base: TerminalManifestHeader,
    pub section_count: u16,
    pub section_offset: u16,
    pub kernel_id: u8,
    pub padding: [u8; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct SlicedManifestSection {
    pub max_mem_size: u32,
    pub mem_type: u8,
    pub region: u8,
    pub padding: [u8; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ProgramTerminalManifest {
    pub base: TerminalManifestHeader,
    pub sequencer_info_kernel_id: u32,
    pub max_kernel_fragment_sequencer_command_desc: u16,
    pub fragment_param_section_count: u16,
    pub fragment_param_section_offset: u16,
    pub sequencer_info_count: u16,
    pub sequencer_info_offset: u16,
    pub padding: [u8; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct FragmentParamManifestSection {
    pub max_mem_size: u32,
    /// Packed [`SectionInfo`].
    pub info: u16,
    pub padding: u16,
}

impl FragmentParamManifestSection {
    pub fn new(max_mem_size: u32, info: SectionInfo) -> Self {
        Self {
            max_mem_size,
            info: info.pack(),
            padding: 0,
        }
    }

    pub fn info(&self) -> SectionInfo {
        SectionInfo::unpack(self.info)
    }
}

/// Bounds of the kernel fragment sequencer settings.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct SequencerInfoManifest {
    pub min_fragment_grid_slice_dimension: [u16; 2],
    pub max_fragment_grid_slice_dimension: [u16; 2],
    pub min_fragment_grid_slice_count: [u16; 2],
    pub max_fragment_grid_slice_count: [u16; 2],
    pub min_fragment_grid_point_decimation_factor: [u16; 2],
    pub max_fragment_grid_point_decimation_factor: [u16; 2],
    pub min_fragment_grid_overlay_pixel_topleft_index: [i16; 2],
    pub max_fragment_grid_overlay_pixel_topleft_index: [i16; 2],
    pub min_fragment_grid_overlay_pixel_dimension: [i16; 2],
    pub max_fragment_grid_overlay_pixel_dimension: [i16; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ProgramControlInitTerminalManifest {
    pub base: TerminalManifestHeader,
    pub program_count: u32,
    pub program_desc_offset: u16,
    pub padding: [u8; 2],
}

/// Load and connect section counts of one program.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct ProgramControlInitProgramDesc {
    pub load_section_count: u16,
    pub connect_section_count: u16,
    pub padding: [u8; 4],
}

impl ProgramControlInitProgramDesc {
    pub fn new(load_section_count: u16, connect_section_count: u16) -> Self {
        Self {
            load_section_count,
            connect_section_count,
            padding: [0; 4],
        }
    }
}

records! {
    TerminalManifestHeader => 128,
    DataTerminalManifest => 512,
    ParamTerminalManifest => 192,
    ParamManifestSection => 64,
    SpatialParamTerminalManifest => 320,
    FrameGridManifestSection => 64,
    SlicedParamTerminalManifest => 192,
    SlicedManifestSection => 64,
    ProgramTerminalManifest => 256,
    FragmentParamManifestSection => 64,
    SequencerInfoManifest => 320,
    ProgramControlInitTerminalManifest => 192,
    ProgramControlInitProgramDesc => 64,
}

/// Terminal records that can be updated in place through
/// [`ProgramGroupManifest::update_terminal`](super::ProgramGroupManifest::update_terminal).
pub trait TerminalRecord: Record {
    const KIND: &'static str;

    fn accepts(terminal_type: TerminalType) -> bool;

    fn base(&self) -> &TerminalManifestHeader;

    /// Counts and offsets of the trailing arrays. These are fixed by the
    /// layout and must not change after init.
    fn layout(&self) -> [u16; 4] {
        [0; 4]
    }
}

impl TerminalRecord for TerminalManifestHeader {
    const KIND: &'static str = "terminal";

    fn accepts(_: TerminalType) -> bool {
        true
    }

    fn base(&self) -> &TerminalManifestHeader {
        self
    }
}

impl TerminalRecord for DataTerminalManifest {
    const KIND: &'static str = "data";

    fn accepts(terminal_type: TerminalType) -> bool {
        terminal_type.is_data()
    }

    fn base(&self) -> &TerminalManifestHeader {
        &self.base
    }
}

impl TerminalRecord for ParamTerminalManifest {
    const KIND: &'static str = "param";

    fn accepts(terminal_type: TerminalType) -> bool {
        terminal_type.is_param()
    }

    fn base(&self) -> &TerminalManifestHeader {
        &self.base
    }

    fn layout(&self) -> [u16; 4] {
        [self.section_count, self.section_offset, 0, 0]
    }
}

impl TerminalRecord for SpatialParamTerminalManifest {
    const KIND: &'static str = "spatial";

    fn accepts(terminal_type: TerminalType) -> bool {
        terminal_type.is_spatial()
    }

    fn base(&self) -> &TerminalManifestHeader {
        &self.base
    }

    fn layout(&self) -> [u16; 4] {
        [self.section_count, self.section_offset, 0, 0]
    }
}

impl TerminalRecord for SlicedParamTerminalManifest {
    const KIND: &'static str = "sliced";

    fn accepts(terminal_type: TerminalType) -> bool {
        terminal_type.is_sliced()
    }

    fn base(&self) -> &TerminalManifestHeader {
        &self.base
    }

    fn layout(&self) -> [u16; 4] {
        [self.section_count, self.section_offset, 0, 0]
    }
}

impl TerminalRecord for ProgramTerminalManifest {
    const KIND: &'static str = "program";

    fn accepts(terminal_type: TerminalType) -> bool {
        terminal_type.is_program()
    }

    fn base(&self) -> &TerminalManifestHeader {
        &self.base
    }

    fn layout(&self) -> [u16; 4] {
        [
            self.fragment_param_section_count,
            self.fragment_param_section_offset,
            self.sequencer_info_count,
            self.sequencer_info_offset,
        ]
    }
}

impl TerminalRecord for ProgramControlInitTerminalManifest {
    const KIND: &'static str = "program-control-init";

    fn accepts(terminal_type: TerminalType) -> bool {
        terminal_type.is_program_control_init()
    }

    fn base(&self) -> &TerminalManifestHeader {
        &self.base
    }

    fn layout(&self) -> [u16; 4] {
        [
            (self.program_count & 0xFFFF) as u16,
            (self.program_count >> 16) as u16,
            self.program_desc_offset,
            0,
        ]
    }
}

/// Count parameters of one terminal manifest.
///
/// The same shape drives both [`TerminalShape::sizeof`] and the init walk,
/// so the two can never disagree on the inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminalShape {
    Data {
        direction: TerminalDirection,
    },
    Param {
        direction: TerminalDirection,
        section_count: u16,
    },
    Spatial {
        direction: TerminalDirection,
        section_count: u16,
    },
    Sliced {
        direction: TerminalDirection,
        section_count: u16,
    },
    Program {
        fragment_param_section_count: u16,
        sequencer_info_count: u16,
    },
    ProgramControlInit {
        program_count: u16,
    },
}

impl TerminalShape {
    pub fn terminal_type(&self) -> TerminalType {
        use TerminalDirection::*;
        match *self {
            TerminalShape::Data { direction: In } => TerminalType::DataIn,
            TerminalShape::Data { direction: Out } => TerminalType::DataOut,
            TerminalShape::Param { direction: In, .. } => TerminalType::ParamCachedIn,
            TerminalShape::Param { direction: Out, .. } => TerminalType::ParamCachedOut,
            TerminalShape::Spatial { direction: In, .. } => TerminalType::ParamSpatialIn,
            TerminalShape::Spatial { direction: Out, .. } => TerminalType::ParamSpatialOut,
            TerminalShape::Sliced { direction: In, .. } => TerminalType::ParamSlicedIn,
            TerminalShape::Sliced { direction: Out, .. } => TerminalType::ParamSlicedOut,
            TerminalShape::Program { .. } => TerminalType::Program,
            TerminalShape::ProgramControlInit { .. } => TerminalType::ProgramControlInit,
        }
    }

    /// Size in bytes of the terminal record plus its trailing arrays,
    /// padded to [`ALIGNMENT`](crate::blob::ALIGNMENT).
    pub fn sizeof(&self) -> usize {
        let size = match *self {
            TerminalShape::Data { .. } => DataTerminalManifest::SIZE,
            TerminalShape::Param { section_count, .. } => {
                ParamTerminalManifest::SIZE
                    + section_count as usize * ParamManifestSection::SIZE
            }
            TerminalShape::Spatial { section_count, .. } => {
                SpatialParamTerminalManifest::SIZE
                    + section_count as usize * FrameGridManifestSection::SIZE
            }
            TerminalShape::Sliced { section_count, .. } => {
                SlicedParamTerminalManifest::SIZE
                    + section_count as usize * SlicedManifestSection::SIZE
            }
            TerminalShape::Program {
                fragment_param_section_count,
                sequencer_info_count,
            } => {
                ProgramTerminalManifest::SIZE
                    + fragment_param_section_count as usize * FragmentParamManifestSection::SIZE
                    + sequencer_info_count as usize * SequencerInfoManifest::SIZE
            }
            TerminalShape::ProgramControlInit { program_count } => {
                ProgramControlInitTerminalManifest::SIZE
                    + program_count as usize * ProgramControlInitProgramDesc::SIZE
            }
        };
        align_up(size)
    }

    /// Write the terminal record at absolute `offset` and return the number
    /// of bytes consumed.
    pub(crate) fn init(&self, blob: &mut Blob, offset: usize, id: u8) -> Result<usize> {
        let terminal_type = self.terminal_type();
        let size = self.sizeof();
        let base = TerminalManifestHeader {
            parent_offset: -(i32::try_from(offset).map_err(|_| Error::Overflow {
                what: "terminal offset",
                size: offset,
                limit: i32::MAX as usize,
            })?),
            size: to_u16("terminal manifest", size)?,
            terminal_type: terminal_type as u8,
            id,
            assoc_id: INVALID_TERMINAL_ID,
            attributes: TerminalAttributes::from_type(terminal_type).0,
            reserved: [0; 2],
            max_payload_size: u32::MAX,
        };

        match *self {
            TerminalShape::Data { .. } => {
                let mut record = DataTerminalManifest::zeroed();
                record.base = base;
                blob.store(offset, &record)?;
            }
            TerminalShape::Param { section_count, .. } => {
                let mut record = ParamTerminalManifest::zeroed();
                record.base = base;
                record.section_count = section_count;
                record.section_offset = ParamTerminalManifest::SIZE as u16;
                blob.store(offset, &record)?;
            }
            TerminalShape::Spatial { section_count, .. } => {
                let mut record = SpatialParamTerminalManifest::zeroed();
                record.base = base;
                record.section_count = section_count;
                record.section_offset = SpatialParamTerminalManifest::SIZE as u16;
                blob.store(offset, &record)?;
            }
            TerminalShape::Sliced { section_count, .. } => {
                let mut record = SlicedParamTerminalManifest::zeroed();
                record.base = base;
                record.section_count = section_count;
                record.section_offset = SlicedParamTerminalManifest::SIZE as u16;
                blob.store(offset, &record)?;
            }
            TerminalShape::Program {
                fragment_param_section_count,
                sequencer_info_count,
            } => {
                let mut record = ProgramTerminalManifest::zeroed();
                record.base = base;
                record.fragment_param_section_count = fragment_param_section_count;
                record.fragment_param_section_offset = ProgramTerminalManifest::SIZE as u16;
                record.sequencer_info_count = sequencer_info_count;
                record.sequencer_info_offset = to_u16(
                    "sequencer info offset",
                    ProgramTerminalManifest::SIZE
                        + fragment_param_section_count as usize
                            * FragmentParamManifestSection::SIZE,
                )?;
                blob.store(offset, &record)?;
            }
            TerminalShape::ProgramControlInit { program_count } => {
                let mut record = ProgramControlInitTerminalManifest::zeroed();
                record.base = base;
                record.program_count = u32::from(program_count);
                record.program_desc_offset = ProgramControlInitTerminalManifest::SIZE as u16;
                blob.store(offset, &record)?;
            }
        }

        Ok(size)
    }
}

/// A terminal manifest read from a blob, dispatched once on its type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalManifest {
    Data(DataTerminalManifest),
    Param {
        record: ParamTerminalManifest,
        sections: Vec<ParamManifestSection>,
    },
    Spatial {
        record: SpatialParamTerminalManifest,
        sections: Vec<FrameGridManifestSection>,
    },
    Sliced {
        record: SlicedParamTerminalManifest,
        sections: Vec<SlicedManifestSection>,
    },
    Program {
        record: ProgramTerminalManifest,
        fragment_param_sections: Vec<FragmentParamManifestSection>,
        sequencer_infos: Vec<SequencerInfoManifest>,
    },
    ProgramControlInit {
        record: ProgramControlInitTerminalManifest,
        programs: Vec<ProgramControlInitProgramDesc>,
    },
}

impl TerminalManifest {
    /// Read the terminal at absolute `offset`.
    pub(crate) fn load(blob: &Blob, offset: usize) -> Result<Self> {
        let header: TerminalManifestHeader = blob.load(offset)?;
        let terminal_type = header.terminal_type()?;

        let terminal = match terminal_type {
            TerminalType::DataIn | TerminalType::DataOut => {
                TerminalManifest::Data(blob.load(offset)?)
            }
            TerminalType::ParamCachedIn | TerminalType::ParamCachedOut => {
                let record: ParamTerminalManifest = blob.load(offset)?;
                let sections = blob.load_slice(
                    offset + record.section_offset as usize,
                    record.section_count as usize,
                )?;
                TerminalManifest::Param { record, sections }
            }
            TerminalType::ParamSpatialIn | TerminalType::ParamSpatialOut => {
                let record: SpatialParamTerminalManifest = blob.load(offset)?;
                let sections = blob.load_slice(
                    offset + record.section_offset as usize,
                    record.section_count as usize,
                )?;
                TerminalManifest::Spatial { record, sections }
            }
            TerminalType::ParamSlicedIn | TerminalType::ParamSlicedOut => {
                let record: SlicedParamTerminalManifest = blob.load(offset)?;
                let sections = blob.load_slice(
                    offset + record.section_offset as usize,
                    record.section_count as usize,
                )?;
                TerminalManifest::Sliced { record, sections }
            }
            TerminalType::Program => {
                let record: ProgramTerminalManifest = blob.load(offset)?;
                let fragment_param_sections = blob.load_slice(
                    offset + record.fragment_param_section_offset as usize,
                    record.fragment_param_section_count as usize,
                )?;
                let sequencer_infos = blob.load_slice(
                    offset + record.sequencer_info_offset as usize,
                    record.sequencer_info_count as usize,
                )?;
                TerminalManifest::Program {
                    record,
                    fragment_param_sections,
                    sequencer_infos,
                }
            }
            TerminalType::ProgramControlInit => {
                let record: ProgramControlInitTerminalManifest = blob.load(offset)?;
                let programs = blob.load_slice(
                    offset + record.program_desc_offset as usize,
                    record.program_count as usize,
                )?;
                TerminalManifest::ProgramControlInit { record, programs }
            }
            TerminalType::ParamStream | TerminalType::StateIn | TerminalType::StateOut => {
                return Err(Error::UnsupportedTerminal(terminal_type.name()));
            }
        };
        Ok(terminal)
    }

    pub fn header(&self) -> &TerminalManifestHeader {
        match self {
            TerminalManifest::Data(record) => &record.base,
            TerminalManifest::Param { record, .. } => &record.base,
            TerminalManifest::Spatial { record, .. } => &record.base,
            TerminalManifest::Sliced { record, .. } => &record.base,
            TerminalManifest::Program { record, .. } => &record.base,
            TerminalManifest::ProgramControlInit { record, .. } => &record.base,
        }
    }

    pub fn terminal_type(&self) -> TerminalType {
        // The tag was checked when the terminal was loaded.
        TerminalType::try_from(self.header().terminal_type).unwrap_or(TerminalType::DataIn)
    }

    pub fn id(&self) -> u8 {
        self.header().id
    }

    pub fn size(&self) -> usize {
        self.header().size as usize
    }

    pub fn attributes(&self) -> TerminalAttributes {
        self.header().attributes()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TerminalManifest::Data(_) => DataTerminalManifest::KIND,
            TerminalManifest::Param { .. } => ParamTerminalManifest::KIND,
            TerminalManifest::Spatial { .. } => SpatialParamTerminalManifest::KIND,
            TerminalManifest::Sliced { .. } => SlicedParamTerminalManifest::KIND,
            TerminalManifest::Program { .. } => ProgramTerminalManifest::KIND,
            TerminalManifest::ProgramControlInit { .. } => {
                ProgramControlInitTerminalManifest::KIND
            }
        }
    }

    /// The shape this terminal was laid out with.
    pub fn shape(&self) -> TerminalShape {
        let direction = self.terminal_type().direction();
        match self {
            TerminalManifest::Data(_) => TerminalShape::Data { direction },
            TerminalManifest::Param { sections, .. } => TerminalShape::Param {
                direction,
                section_count: sections.len() as u16,
            },
            TerminalManifest::Spatial { sections, .. } => TerminalShape::Spatial {
                direction,
                section_count: sections.len() as u16,
            },
            TerminalManifest::Sliced { sections, .. } => TerminalShape::Sliced {
                direction,
                section_count: sections.len() as u16,
            },
            TerminalManifest::Program {
                fragment_param_sections,
                sequencer_infos,
                ..
            } => TerminalShape::Program {
                fragment_param_section_count: fragment_param_sections.len() as u16,
                sequencer_info_count: sequencer_infos.len() as u16,
            },
            TerminalManifest::ProgramControlInit { programs, .. } => {
                TerminalShape::ProgramControlInit {
                    program_count: programs.len() as u16,
                }
            }
        }
    }
}
