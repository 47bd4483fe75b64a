// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Runtime terminals: the buffer-bound counterpart of each enabled terminal
//! manifest.
//!
//! Every runtime terminal starts with a [`TerminalHeader`]. Data terminals
//! carry a [`Frame`] with the buffer binding, all other kinds carry a
//! [`ParamPayload`]. The trailing descriptor arrays depend on the fragment
//! count of the process group, so runtime terminals are sized per
//! instantiation rather than per manifest.

use crate::{
    bitmap::KernelBitmap,
    blob::{align_up, records, to_u16, Blob, Record},
    error::{Error, Result},
    format::{PlaneLayout, COL, N_FRAME_PLANES, ROW},
    manifest::{TerminalManifest, TerminalType},
    param::TerminalParam,
};
use bytemuck::{Pod, Zeroable};
use tracing::warn;

/// Buffer set index of a terminal with no buffer set binding.
pub const NO_BUFFER_INDEX: u32 = u32::MAX;

/// Ownership state of a data terminal frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BufferState {
    #[default]
    Null = 0,
    Undefined,
    Empty,
    NonEmpty,
    Full,
}

impl TryFrom<u8> for BufferState {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => BufferState::Null,
            1 => BufferState::Undefined,
            2 => BufferState::Empty,
            3 => BufferState::NonEmpty,
            4 => BufferState::Full,
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "unknown buffer state {value}"
                )))
            }
        })
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct TerminalHeader {
    /// Offset from this terminal back to the process group base (negative).
    pub parent_offset: i32,
    pub size: u16,
    /// Index of the terminal manifest this terminal was built from.
    pub tm_index: u16,
    pub terminal_type: u8,
    /// ID copied from the terminal manifest.
    pub id: u8,
    pub padding: [u8; 6],
}

impl TerminalHeader {
    pub fn terminal_type(&self) -> Result<TerminalType> {
        TerminalType::try_from(self.terminal_type)
    }
}

/// Buffer binding of a non-data terminal.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ParamPayload {
    pub host_buffer: u64,
    /// Buffer virtual address in the IPU address space.
    pub buffer: u32,
    /// Index into the buffer set, or [`NO_BUFFER_INDEX`].
    pub terminal_index: u32,
}

impl Default for ParamPayload {
    fn default() -> Self {
        Self {
            host_buffer: 0,
            buffer: 0,
            terminal_index: NO_BUFFER_INDEX,
        }
    }
}

/// Buffer binding of a data terminal.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct Frame {
    /// Buffer virtual address in the IPU address space.
    pub buffer: u32,
    /// Index into the buffer set, or [`NO_BUFFER_INDEX`].
    pub data_index: u32,
    /// Payload size, filled by the buffer owner.
    pub data_bytes: u32,
    pub buffer_state: u8,
    pub padding: [u8; 3],
}

impl Frame {
    pub fn buffer_state(&self) -> Result<BufferState> {
        BufferState::try_from(self.buffer_state)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct FrameDescriptor {
    pub frame_format_type: u32,
    pub plane_count: u32,
    /// Byte offset of each plane from the start of the frame buffer.
    pub plane_offsets: [u32; N_FRAME_PLANES],
    pub stride: u32,
    pub dimension: [u16; 2],
    pub bpp: u8,
    pub bpe: u8,
    pub is_compressed: u8,
    pub padding: [u8; 5],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct FragmentDescriptor {
    pub dimension: [u16; 2],
    pub index: [u16; 2],
    pub offset: [u16; 2],
    pub padding: [u8; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DataTerminal {
    pub base: TerminalHeader,
    pub frame: Frame,
    pub frame_descriptor: FrameDescriptor,
    pub fragment_descriptor_offset: u16,
    pub fragment_count: u16,
    /// The single enabled kernel owning this terminal.
    pub kernel_id: u8,
    pub connection_type: u8,
    pub stream2gen_buffer_size: u16,
}

/// Offset and size of one parameter section in the terminal payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct ParamSection {
    pub mem_offset: u32,
    pub mem_size: u32,
}

/// Cached parameter terminal. Input terminals hold one set of sections,
/// output terminals one set per fragment.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ParamTerminal {
    pub base: TerminalHeader,
    pub param_payload: ParamPayload,
    pub param_section_desc_offset: u16,
    pub section_count: u16,
    pub fragment_count: u16,
    pub padding: [u8; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SpatialParamTerminal {
    pub base: TerminalHeader,
    pub param_payload: ParamPayload,
    pub frame_grid_dimension: [u16; 2],
    pub kernel_id: u32,
    pub frame_grid_param_section_desc_offset: u16,
    pub fragment_grid_desc_offset: u16,
    pub fragment_count: u16,
    pub section_count: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct FragmentGridDesc {
    pub fragment_grid_index: [u16; 2],
    pub fragment_grid_dimension: [u16; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct FrameGridParamSection {
    pub mem_offset: u32,
    pub mem_size: u32,
    pub stride: u32,
    pub padding: [u8; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SlicedParamTerminal {
    pub base: TerminalHeader,
    pub param_payload: ParamPayload,
    pub kernel_id: u32,
    pub fragment_slice_desc_offset: u16,
    pub fragment_count: u16,
    /// Sections per slice.
    pub section_count: u16,
    pub padding: [u8; 6],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct FragmentSliceDesc {
    /// Offset from the terminal base to the first section of the first
    /// slice of this fragment.
    pub slice_section_desc_offset: u16,
    pub slice_count: u16,
    pub padding: [u8; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ProgramTerminal {
    pub base: TerminalHeader,
    pub param_payload: ParamPayload,
    /// Payload bytes per fragment.
    pub payload_fragment_stride: u32,
    pub sequencer_info_desc_offset: u16,
    pub fragment_param_section_desc_offset: u16,
    /// Start of the reserved command slots.
    pub command_desc_offset: u16,
    pub fragment_count: u16,
    pub sequencer_info_count: u16,
    pub fragment_param_section_count: u16,
    pub command_count: u16,
    pub padding: [u8; 6],
}

/// Kernel fragment sequencer settings for one fragment.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct SequencerInfoDesc {
    pub fragment_grid_slice_dimension: [u16; 2],
    pub fragment_grid_slice_count: [u16; 2],
    pub fragment_grid_point_decimation_factor: [u16; 2],
    pub fragment_grid_overlay_pixel_topleft_index: [i16; 2],
    pub fragment_grid_overlay_pixel_dimension: [i16; 2],
    pub command_count: u16,
    /// Offset of the first command of this sequencer. Zero until the caller
    /// binds commands.
    pub command_desc_offset: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct SequencerCommandDesc {
    pub line_count: [u16; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ProgramControlInitTerminal {
    pub base: TerminalHeader,
    pub param_payload: ParamPayload,
    pub payload_fragment_stride: u32,
    pub program_section_desc_offset: u16,
    pub program_count: u16,
}

/// Per-program entry of a program control init terminal. The section
/// offsets are relative to this entry.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct ProgramControlInitProgram {
    pub load_section_count: u16,
    pub load_section_desc_offset: u16,
    pub connect_section_count: u16,
    pub connect_section_desc_offset: u16,
    pub process_id: u16,
    pub num_done_events: u8,
    pub padding: u8,
    pub filled_load_sections: u8,
    pub filled_connect_sections: u8,
    pub load_section_mem_offset: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct LoadSectionDesc {
    pub device_descriptor_id: u32,
    pub mem_size: u16,
    pub mode_bitmask: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct ConnectSectionDesc {
    pub device_descriptor_id: u32,
    pub connect_section_idx: u16,
    pub mode_bitmask: u8,
    pub connect_terminal_id: u8,
}

records! {
    TerminalHeader => 128,
    ParamPayload => 128,
    Frame => 128,
    FrameDescriptor => 384,
    FragmentDescriptor => 128,
    DataTerminal => 704,
    ParamSection => 64,
    ParamTerminal => 320,
    SpatialParamTerminal => 384,
    FragmentGridDesc => 64,
    FrameGridParamSection => 128,
    SlicedParamTerminal => 384,
    FragmentSliceDesc => 64,
    ProgramTerminal => 448,
    SequencerInfoDesc => 192,
    SequencerCommandDesc => 64,
    ProgramControlInitTerminal => 320,
    ProgramControlInitProgram => 128,
    LoadSectionDesc => 64,
    ConnectSectionDesc => 64,
}

/// Session-wide inputs shared by every terminal of one process group.
pub(crate) struct TerminalContext<'a> {
    pub fragment_count: u16,
    pub enable_bitmap: KernelBitmap,
    /// Enable state of every program of the manifest.
    pub enabled_programs: &'a [bool],
    pub strict_frame_formats: bool,
}

impl TerminalContext<'_> {
    fn enabled_program_sections(
        &self,
        programs: &[crate::manifest::ProgramControlInitProgramDesc],
    ) -> Result<(usize, usize)> {
        if programs.len() > self.enabled_programs.len() {
            return Err(Error::InvalidArgument(format!(
                "program control init terminal describes {} programs, the group has {}",
                programs.len(),
                self.enabled_programs.len()
            )));
        }
        Ok(programs
            .iter()
            .zip(self.enabled_programs)
            .filter(|(_, &enabled)| enabled)
            .fold((0, 0), |(load, connect), (desc, _)| {
                (
                    load + desc.load_section_count as usize,
                    connect + desc.connect_section_count as usize,
                )
            }))
    }
}

/// Size in bytes of the runtime terminal built from `manifest`.
pub(crate) fn sizeof_terminal(
    manifest: &TerminalManifest,
    param: &TerminalParam,
    ctx: &TerminalContext,
) -> Result<usize> {
    let fragments = ctx.fragment_count as usize;
    let size = match manifest {
        TerminalManifest::Data(_) => DataTerminal::SIZE + fragments * FragmentDescriptor::SIZE,
        TerminalManifest::Param { record, sections } => {
            let sets = if record.base.terminal_type == TerminalType::ParamCachedOut as u8 {
                fragments
            } else {
                1
            };
            ParamTerminal::SIZE + sets * sections.len() * ParamSection::SIZE
        }
        TerminalManifest::Spatial { sections, .. } => {
            SpatialParamTerminal::SIZE
                + fragments * FragmentGridDesc::SIZE
                + sections.len() * FrameGridParamSection::SIZE
        }
        TerminalManifest::Sliced { sections, .. } => {
            let slices: usize = (0..fragments).map(|f| param.slice_count(f) as usize).sum();
            SlicedParamTerminal::SIZE
                + fragments * FragmentSliceDesc::SIZE
                + slices * sections.len() * ParamSection::SIZE
        }
        TerminalManifest::Program {
            record,
            fragment_param_sections,
            sequencer_infos,
        } => {
            ProgramTerminal::SIZE
                + fragments * sequencer_infos.len() * SequencerInfoDesc::SIZE
                + fragment_param_sections.len() * ParamSection::SIZE
                + fragments
                    * record.max_kernel_fragment_sequencer_command_desc as usize
                    * SequencerCommandDesc::SIZE
        }
        TerminalManifest::ProgramControlInit { programs, .. } => {
            let (load, connect) = ctx.enabled_program_sections(programs)?;
            ProgramControlInitTerminal::SIZE
                + programs.len() * ProgramControlInitProgram::SIZE
                + load * LoadSectionDesc::SIZE
                + connect * ConnectSectionDesc::SIZE
        }
    };
    Ok(align_up(size))
}

/// Lay out consecutive sections of the given sizes from offset zero.
fn pack_sections(sizes: impl Iterator<Item = u32>) -> Vec<ParamSection> {
    let mut offset = 0u32;
    sizes
        .map(|mem_size| {
            let section = ParamSection {
                mem_offset: offset,
                mem_size,
            };
            offset = offset.saturating_add(mem_size);
            section
        })
        .collect()
}

fn plane_layout(param: &TerminalParam, strict: bool) -> Result<PlaneLayout> {
    let rule = param.frame_format().and_then(|format| format.plane_rule());
    match rule {
        Some(rule) => rule.layout(param.stride, param.dimensions[ROW]),
        None if strict => Err(Error::UnknownFrameFormat(param.frame_format_type)),
        None => {
            warn!(
                "frame format {} has no plane layout, using a single plane",
                param.frame_format_type
            );
            Ok(PlaneLayout {
                count: 1,
                ..Default::default()
            })
        }
    }
}

/// Write the runtime terminal for terminal manifest `tm_index` at absolute
/// `offset` and return the number of bytes consumed.
pub(crate) fn init_terminal(
    blob: &mut Blob,
    offset: usize,
    tm_index: usize,
    manifest: &TerminalManifest,
    param: &TerminalParam,
    ctx: &TerminalContext,
) -> Result<usize> {
    let size = sizeof_terminal(manifest, param, ctx)?;
    let fragments = ctx.fragment_count as usize;
    let base = TerminalHeader {
        parent_offset: -(i32::try_from(offset).map_err(|_| Error::Overflow {
            what: "terminal offset",
            size: offset,
            limit: i32::MAX as usize,
        })?),
        size: to_u16("terminal", size)?,
        tm_index: to_u16("terminal manifest index", tm_index)?,
        terminal_type: manifest.terminal_type() as u8,
        id: manifest.id(),
        padding: [0; 6],
    };

    match manifest {
        TerminalManifest::Data(man) => {
            let kernels = ctx.enable_bitmap.intersection(man.kernel_bitmap);
            let kernel_id = match kernels.lowest_set() {
                Some(id) if kernels.is_onehot() => id as u8,
                _ => {
                    return Err(Error::InvalidArgument(format!(
                        "data terminal {tm_index} is not owned by exactly one enabled kernel"
                    )))
                }
            };
            let layout = plane_layout(param, ctx.strict_frame_formats)?;

            let record = DataTerminal {
                base,
                frame: Frame {
                    buffer: 0,
                    data_index: NO_BUFFER_INDEX,
                    data_bytes: 0,
                    buffer_state: BufferState::Null as u8,
                    padding: [0; 3],
                },
                frame_descriptor: FrameDescriptor {
                    frame_format_type: param.frame_format_type,
                    plane_count: layout.count,
                    plane_offsets: layout.offsets,
                    stride: param.stride,
                    dimension: param.dimensions,
                    bpp: param.bpp,
                    bpe: param.bpe,
                    is_compressed: 0,
                    padding: [0; 5],
                },
                fragment_descriptor_offset: DataTerminal::SIZE as u16,
                fragment_count: ctx.fragment_count,
                kernel_id,
                connection_type: 0,
                stream2gen_buffer_size: param.dimensions[ROW],
            };
            blob.store(offset, &record)?;

            let descriptors: Vec<FragmentDescriptor> = (0..ctx.fragment_count)
                .map(|f| FragmentDescriptor {
                    dimension: param.fragment_dimensions,
                    index: param.fragment_index(f),
                    offset: param.offset,
                    padding: [0; 4],
                })
                .collect();
            blob.store_slice(offset + DataTerminal::SIZE, &descriptors)?;
        }
        TerminalManifest::Param { record: man, sections } => {
            let sets = if man.base.terminal_type == TerminalType::ParamCachedOut as u8 {
                fragments
            } else {
                1
            };
            let record = ParamTerminal {
                base,
                param_payload: ParamPayload::default(),
                param_section_desc_offset: ParamTerminal::SIZE as u16,
                section_count: to_u16("param sections", sections.len())?,
                fragment_count: ctx.fragment_count,
                padding: [0; 2],
            };
            blob.store(offset, &record)?;
            let packed = pack_sections(
                (0..sets).flat_map(|_| sections.iter().map(|s| s.max_mem_size)),
            );
            blob.store_slice(offset + ParamTerminal::SIZE, &packed)?;
        }
        TerminalManifest::Spatial { record: man, sections } => {
            let grid_offset = SpatialParamTerminal::SIZE;
            let section_offset = grid_offset + fragments * FragmentGridDesc::SIZE;
            let record = SpatialParamTerminal {
                base,
                param_payload: ParamPayload::default(),
                frame_grid_dimension: man.frame_grid.max,
                kernel_id: u32::from(man.kernel_id),
                frame_grid_param_section_desc_offset: to_u16("spatial sections", section_offset)?,
                fragment_grid_desc_offset: grid_offset as u16,
                fragment_count: ctx.fragment_count,
                section_count: to_u16("spatial sections", sections.len())?,
            };
            blob.store(offset, &record)?;

            let dimension = man.fragment_grid.max;
            let grids: Vec<FragmentGridDesc> = (0..ctx.fragment_count)
                .map(|f| FragmentGridDesc {
                    fragment_grid_index: [f.saturating_mul(dimension[COL]), 0],
                    fragment_grid_dimension: dimension,
                })
                .collect();
            blob.store_slice(offset + grid_offset, &grids)?;

            let packed: Vec<FrameGridParamSection> =
                pack_sections(sections.iter().map(|s| s.max_mem_size))
                    .into_iter()
                    .map(|s| FrameGridParamSection {
                        mem_offset: s.mem_offset,
                        mem_size: s.mem_size,
                        stride: 0,
                        padding: [0; 4],
                    })
                    .collect();
            blob.store_slice(offset + section_offset, &packed)?;
        }
        TerminalManifest::Sliced { record: man, sections } => {
            let record = SlicedParamTerminal {
                base,
                param_payload: ParamPayload::default(),
                kernel_id: u32::from(man.kernel_id),
                fragment_slice_desc_offset: SlicedParamTerminal::SIZE as u16,
                fragment_count: ctx.fragment_count,
                section_count: to_u16("sliced sections", sections.len())?,
                padding: [0; 6],
            };
            blob.store(offset, &record)?;

            let mut cursor = SlicedParamTerminal::SIZE + fragments * FragmentSliceDesc::SIZE;
            let mut descs = Vec::with_capacity(fragments);
            let mut sizes = Vec::new();
            for f in 0..fragments {
                let slice_count = param.slice_count(f);
                descs.push(FragmentSliceDesc {
                    slice_section_desc_offset: to_u16("slice sections", cursor)?,
                    slice_count,
                    padding: [0; 4],
                });
                for _ in 0..slice_count {
                    sizes.extend(sections.iter().map(|s| s.max_mem_size));
                }
                cursor += slice_count as usize * sections.len() * ParamSection::SIZE;
            }
            blob.store_slice(offset + SlicedParamTerminal::SIZE, &descs)?;
            let packed = pack_sections(sizes.into_iter());
            blob.store_slice(
                offset + SlicedParamTerminal::SIZE + fragments * FragmentSliceDesc::SIZE,
                &packed,
            )?;
        }
        TerminalManifest::Program {
            record: man,
            fragment_param_sections,
            sequencer_infos,
        } => {
            let info_offset = ProgramTerminal::SIZE;
            let section_offset =
                info_offset + fragments * sequencer_infos.len() * SequencerInfoDesc::SIZE;
            let command_offset =
                section_offset + fragment_param_sections.len() * ParamSection::SIZE;
            let command_count =
                fragments * man.max_kernel_fragment_sequencer_command_desc as usize;

            let packed = pack_sections(fragment_param_sections.iter().map(|s| s.max_mem_size));
            let stride = packed
                .last()
                .map_or(0, |s| s.mem_offset.saturating_add(s.mem_size));

            let record = ProgramTerminal {
                base,
                param_payload: ParamPayload::default(),
                payload_fragment_stride: stride,
                sequencer_info_desc_offset: info_offset as u16,
                fragment_param_section_desc_offset: to_u16("program sections", section_offset)?,
                command_desc_offset: to_u16("program commands", command_offset)?,
                fragment_count: ctx.fragment_count,
                sequencer_info_count: to_u16("sequencer infos", sequencer_infos.len())?,
                fragment_param_section_count: to_u16(
                    "program sections",
                    fragment_param_sections.len(),
                )?,
                command_count: to_u16("program commands", command_count)?,
                padding: [0; 6],
            };
            blob.store(offset, &record)?;
            blob.store_slice(offset + section_offset, &packed)?;
        }
        TerminalManifest::ProgramControlInit { programs, .. } => {
            let (load_total, _) = ctx.enabled_program_sections(programs)?;
            let base_load = programs.len() * ProgramControlInitProgram::SIZE;
            let base_connect = base_load + load_total * LoadSectionDesc::SIZE;

            let record = ProgramControlInitTerminal {
                base,
                param_payload: ParamPayload::default(),
                payload_fragment_stride: 0,
                program_section_desc_offset: ProgramControlInitTerminal::SIZE as u16,
                program_count: to_u16("program control init programs", programs.len())?,
            };
            blob.store(offset, &record)?;

            let mut load_index = 0;
            let mut connect_index = 0;
            let mut descs = Vec::with_capacity(programs.len());
            for (i, (man, &enabled)) in programs.iter().zip(ctx.enabled_programs).enumerate() {
                if !enabled {
                    descs.push(ProgramControlInitProgram::default());
                    continue;
                }
                let here = i * ProgramControlInitProgram::SIZE;
                descs.push(ProgramControlInitProgram {
                    load_section_count: man.load_section_count,
                    load_section_desc_offset: to_u16(
                        "load section offset",
                        base_load + load_index * LoadSectionDesc::SIZE - here,
                    )?,
                    connect_section_count: man.connect_section_count,
                    connect_section_desc_offset: to_u16(
                        "connect section offset",
                        base_connect + connect_index * ConnectSectionDesc::SIZE - here,
                    )?,
                    ..Default::default()
                });
                load_index += man.load_section_count as usize;
                connect_index += man.connect_section_count as usize;
            }
            blob.store_slice(offset + ProgramControlInitTerminal::SIZE, &descs)?;
        }
    }

    Ok(size)
}

/// A runtime terminal read from a process group blob.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminal {
    Data {
        record: DataTerminal,
        fragments: Vec<FragmentDescriptor>,
    },
    Param {
        record: ParamTerminal,
        sections: Vec<ParamSection>,
    },
    Spatial {
        record: SpatialParamTerminal,
        fragment_grids: Vec<FragmentGridDesc>,
        sections: Vec<FrameGridParamSection>,
    },
    Sliced {
        record: SlicedParamTerminal,
        fragments: Vec<FragmentSliceDesc>,
    },
    Program {
        record: ProgramTerminal,
        sequencer_infos: Vec<SequencerInfoDesc>,
        fragment_param_sections: Vec<ParamSection>,
    },
    ProgramControlInit {
        record: ProgramControlInitTerminal,
        programs: Vec<ProgramControlInitProgram>,
    },
}

impl Terminal {
    pub(crate) fn load(blob: &Blob, offset: usize) -> Result<Self> {
        let header: TerminalHeader = blob.load(offset)?;
        let terminal_type = header.terminal_type()?;
        let terminal = match terminal_type {
            TerminalType::DataIn | TerminalType::DataOut => {
                let record: DataTerminal = blob.load(offset)?;
                let fragments = blob.load_slice(
                    offset + record.fragment_descriptor_offset as usize,
                    record.fragment_count as usize,
                )?;
                Terminal::Data { record, fragments }
            }
            TerminalType::ParamCachedIn | TerminalType::ParamCachedOut => {
                let record: ParamTerminal = blob.load(offset)?;
                let sets = if terminal_type == TerminalType::ParamCachedOut {
                    record.fragment_count as usize
                } else {
                    1
                };
                let sections = blob.load_slice(
                    offset + record.param_section_desc_offset as usize,
                    sets * record.section_count as usize,
                )?;
                Terminal::Param { record, sections }
            }
            TerminalType::ParamSpatialIn | TerminalType::ParamSpatialOut => {
                let record: SpatialParamTerminal = blob.load(offset)?;
                let fragment_grids = blob.load_slice(
                    offset + record.fragment_grid_desc_offset as usize,
                    record.fragment_count as usize,
                )?;
                let sections = blob.load_slice(
                    offset + record.frame_grid_param_section_desc_offset as usize,
                    record.section_count as usize,
                )?;
                Terminal::Spatial {
                    record,
                    fragment_grids,
                    sections,
                }
            }
            TerminalType::ParamSlicedIn | TerminalType::ParamSlicedOut => {
                let record: SlicedParamTerminal = blob.load(offset)?;
                let fragments = blob.load_slice(
                    offset + record.fragment_slice_desc_offset as usize,
                    record.fragment_count as usize,
                )?;
                Terminal::Sliced { record, fragments }
            }
            TerminalType::Program => {
                let record: ProgramTerminal = blob.load(offset)?;
                let sequencer_infos = blob.load_slice(
                    offset + record.sequencer_info_desc_offset as usize,
                    record.fragment_count as usize * record.sequencer_info_count as usize,
                )?;
                let fragment_param_sections = blob.load_slice(
                    offset + record.fragment_param_section_desc_offset as usize,
                    record.fragment_param_section_count as usize,
                )?;
                Terminal::Program {
                    record,
                    sequencer_infos,
                    fragment_param_sections,
                }
            }
            TerminalType::ProgramControlInit => {
                let record: ProgramControlInitTerminal = blob.load(offset)?;
                let programs = blob.load_slice(
                    offset + record.program_section_desc_offset as usize,
                    record.program_count as usize,
                )?;
                Terminal::ProgramControlInit { record, programs }
            }
            TerminalType::ParamStream | TerminalType::StateIn | TerminalType::StateOut => {
                return Err(Error::UnsupportedTerminal(terminal_type.name()));
            }
        };
        Ok(terminal)
    }

    pub fn header(&self) -> &TerminalHeader {
        match self {
            Terminal::Data { record, .. } => &record.base,
            Terminal::Param { record, .. } => &record.base,
            Terminal::Spatial { record, .. } => &record.base,
            Terminal::Sliced { record, .. } => &record.base,
            Terminal::Program { record, .. } => &record.base,
            Terminal::ProgramControlInit { record, .. } => &record.base,
        }
    }

    pub fn terminal_type(&self) -> TerminalType {
        // Checked when the terminal was loaded.
        TerminalType::try_from(self.header().terminal_type).unwrap_or(TerminalType::DataIn)
    }

    pub fn size(&self) -> usize {
        self.header().size as usize
    }

    /// Index of the terminal manifest this terminal was built from.
    pub fn manifest_index(&self) -> usize {
        self.header().tm_index as usize
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Terminal::Data { .. })
    }

    fn payload(&self) -> Option<&ParamPayload> {
        match self {
            Terminal::Data { .. } => None,
            Terminal::Param { record, .. } => Some(&record.param_payload),
            Terminal::Spatial { record, .. } => Some(&record.param_payload),
            Terminal::Sliced { record, .. } => Some(&record.param_payload),
            Terminal::Program { record, .. } => Some(&record.param_payload),
            Terminal::ProgramControlInit { record, .. } => Some(&record.param_payload),
        }
    }

    /// Buffer virtual address, wherever the terminal kind keeps it.
    pub fn buffer(&self) -> u32 {
        match self {
            Terminal::Data { record, .. } => record.frame.buffer,
            _ => self.payload().map_or(0, |p| p.buffer),
        }
    }

    /// Buffer set index, or [`NO_BUFFER_INDEX`].
    pub fn buffer_index(&self) -> u32 {
        match self {
            Terminal::Data { record, .. } => record.frame.data_index,
            _ => self.payload().map_or(NO_BUFFER_INDEX, |p| p.terminal_index),
        }
    }
}

trait PayloadRecord: Pod {
    fn payload_mut(&mut self) -> &mut ParamPayload;
}

macro_rules! payload_records {
    ($($ty:ty),*) => {
        $(
            impl PayloadRecord for $ty {
                fn payload_mut(&mut self) -> &mut ParamPayload {
                    &mut self.param_payload
                }
            }
        )*
    };
}

payload_records!(
    ParamTerminal,
    SpatialParamTerminal,
    SlicedParamTerminal,
    ProgramTerminal,
    ProgramControlInitTerminal
);

fn update_payload<T: PayloadRecord, R>(
    blob: &mut Blob,
    offset: usize,
    f: impl FnOnce(&mut u32, &mut u32, Option<&mut u8>) -> R,
) -> Result<R> {
    blob.update(offset, |record: &mut T| {
        let payload = record.payload_mut();
        f(&mut payload.buffer, &mut payload.terminal_index, None)
    })
}

/// Read-modify-write the buffer binding of the terminal at `offset`,
/// dispatching once on the stored type. The closure receives the buffer
/// address, the buffer set index and, for data terminals, the frame buffer
/// state.
pub(crate) fn update_binding<R>(
    blob: &mut Blob,
    offset: usize,
    f: impl FnOnce(&mut u32, &mut u32, Option<&mut u8>) -> R,
) -> Result<R> {
    let header: TerminalHeader = blob.load(offset)?;
    let terminal_type = header.terminal_type()?;
    match terminal_type {
        TerminalType::DataIn | TerminalType::DataOut => {
            blob.update(offset, |record: &mut DataTerminal| {
                let frame = &mut record.frame;
                f(
                    &mut frame.buffer,
                    &mut frame.data_index,
                    Some(&mut frame.buffer_state),
                )
            })
        }
        TerminalType::ParamCachedIn | TerminalType::ParamCachedOut => {
            update_payload::<ParamTerminal, R>(blob, offset, f)
        }
        TerminalType::ParamSpatialIn | TerminalType::ParamSpatialOut => {
            update_payload::<SpatialParamTerminal, R>(blob, offset, f)
        }
        TerminalType::ParamSlicedIn | TerminalType::ParamSlicedOut => {
            update_payload::<SlicedParamTerminal, R>(blob, offset, f)
        }
        TerminalType::Program => update_payload::<ProgramTerminal, R>(blob, offset, f),
        TerminalType::ProgramControlInit => {
            update_payload::<ProgramControlInitTerminal, R>(blob, offset, f)
        }
        TerminalType::ParamStream | TerminalType::StateIn | TerminalType::StateOut => {
            Err(Error::UnsupportedTerminal(terminal_type.name()))
        }
    }
}
