// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! JSON descriptions of program groups.
//!
//! Offline graph generators emit a [`ProgramGroupDescription`], which
//! [`ProgramGroupDescription::compile`] lays out and fills into a
//! [`ProgramGroupManifest`]. Kernel bitmaps are written as lists of kernel
//! IDs.
//!
//! ```json
//! {
//!   "id": 100,
//!   "programs": [
//!     { "id": 1, "type": "singular", "kernels": [0],
//!       "terminal_dependencies": [0, 1] }
//!   ],
//!   "terminals": [
//!     { "kind": "data", "direction": "in", "kernel": 0, "formats": ["nv12"] },
//!     { "kind": "data", "direction": "out", "kernel": 0 }
//!   ]
//! }
//! ```

use crate::{
    bitmap::KernelBitmap,
    blob::{to_u16, to_u8},
    error::{Error, Result},
    format::FrameFormat,
    manifest::{
        DataTerminalManifest, FragmentParamManifestSection, FrameGridManifestSection, GridBounds,
        ManifestShape, ParamManifestSection, ProgramControlInitProgramDesc, ProgramGroupManifest,
        ProgramShape, ProgramTerminalManifest, ProgramType, SectionInfo, SequencerInfoManifest,
        SlicedManifestSection, SlicedParamTerminalManifest, SpatialParamTerminalManifest,
        TerminalDirection, TerminalShape,
    },
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// A whole program group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramGroupDescription {
    pub id: u32,
    #[serde(default = "default_subgraph_count")]
    pub subgraph_count: u8,
    /// Declared kernel bitmap. When absent the union of the program kernel
    /// bitmaps is used.
    #[serde(default)]
    pub kernel_bitmap: Option<KernelBitmap>,
    pub programs: Vec<ProgramDescription>,
    pub terminals: Vec<TerminalDescription>,
    #[serde(default)]
    pub private_data_size: usize,
    #[serde(default)]
    pub rbm_manifest_size: usize,
}

fn default_subgraph_count() -> u8 {
    1
}

fn default_program_type() -> ProgramType {
    ProgramType::Singular
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramDescription {
    pub id: u32,
    #[serde(rename = "type", default = "default_program_type")]
    pub program_type: ProgramType,
    pub kernels: KernelBitmap,
    #[serde(default)]
    pub program_dependencies: Vec<u8>,
    #[serde(default)]
    pub terminal_dependencies: Vec<u8>,
    /// Fixed cell binding.
    #[serde(default)]
    pub cell: Option<u8>,
    /// Cell type requirement.
    #[serde(default)]
    pub cell_type: Option<u8>,
}

/// Minimum and maximum width and height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub min: [u16; 2],
    pub max: [u16; 2],
}

impl From<Bounds> for GridBounds {
    fn from(bounds: Bounds) -> Self {
        GridBounds {
            min: bounds.min,
            max: bounds.max,
        }
    }
}

/// A parameter section with its packed owner info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDescription {
    pub max_mem_size: u32,
    pub kernel: u8,
    #[serde(default)]
    pub region: u8,
    #[serde(default)]
    pub mem_type: u8,
}

impl SectionDescription {
    fn info(&self) -> SectionInfo {
        SectionInfo {
            kernel_id: self.kernel,
            region_id: self.region,
            mem_type: self.mem_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGridSectionDescription {
    pub max_mem_size: u32,
    #[serde(default)]
    pub mem_type: u8,
    #[serde(default)]
    pub region: u8,
    #[serde(default)]
    pub elem_size: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlicedSectionDescription {
    pub max_mem_size: u32,
    #[serde(default)]
    pub mem_type: u8,
    #[serde(default)]
    pub region: u8,
}

/// Section counts of one program in a program control init terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgramSections {
    #[serde(default)]
    pub load: u16,
    #[serde(default)]
    pub connect: u16,
}

/// One terminal, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminalDescription {
    Data {
        direction: TerminalDirection,
        kernel: u8,
        #[serde(default)]
        formats: Vec<FrameFormat>,
        #[serde(default)]
        size: Bounds,
        #[serde(default)]
        fragment_size: Bounds,
    },
    Param {
        direction: TerminalDirection,
        sections: Vec<SectionDescription>,
        /// Paired terminal.
        #[serde(default)]
        assoc: Option<u8>,
    },
    Spatial {
        direction: TerminalDirection,
        kernel: u8,
        #[serde(default)]
        frame_grid: Bounds,
        #[serde(default)]
        fragment_grid: Bounds,
        sections: Vec<FrameGridSectionDescription>,
    },
    Sliced {
        direction: TerminalDirection,
        kernel: u8,
        sections: Vec<SlicedSectionDescription>,
    },
    /// Sequencer bounds start fully open and are narrowed through
    /// [`ProgramGroupManifest::set_sequencer_info`].
    Program {
        #[serde(default)]
        sequencer_kernel: u32,
        #[serde(default)]
        max_commands: u16,
        fragment_param_sections: Vec<SectionDescription>,
        #[serde(default)]
        sequencer_info_count: u16,
    },
    ProgramControlInit {
        programs: Vec<ProgramSections>,
    },
}

impl TerminalDescription {
    fn shape(&self) -> Result<TerminalShape> {
        Ok(match self {
            TerminalDescription::Data { direction, .. } => TerminalShape::Data {
                direction: *direction,
            },
            TerminalDescription::Param {
                direction,
                sections,
                ..
            } => TerminalShape::Param {
                direction: *direction,
                section_count: to_u16("param sections", sections.len())?,
            },
            TerminalDescription::Spatial {
                direction,
                sections,
                ..
            } => TerminalShape::Spatial {
                direction: *direction,
                section_count: to_u16("spatial sections", sections.len())?,
            },
            TerminalDescription::Sliced {
                direction,
                sections,
                ..
            } => TerminalShape::Sliced {
                direction: *direction,
                section_count: to_u16("sliced sections", sections.len())?,
            },
            TerminalDescription::Program {
                fragment_param_sections,
                sequencer_info_count,
                ..
            } => TerminalShape::Program {
                fragment_param_section_count: to_u16(
                    "fragment param sections",
                    fragment_param_sections.len(),
                )?,
                sequencer_info_count: *sequencer_info_count,
            },
            TerminalDescription::ProgramControlInit { programs } => {
                TerminalShape::ProgramControlInit {
                    program_count: to_u16("program control init programs", programs.len())?,
                }
            }
        })
    }
}

/// Bounds that accept every sequencer setting.
fn open_sequencer_bounds() -> SequencerInfoManifest {
    SequencerInfoManifest {
        max_fragment_grid_slice_dimension: [u16::MAX; 2],
        max_fragment_grid_slice_count: [u16::MAX; 2],
        max_fragment_grid_point_decimation_factor: [u16::MAX; 2],
        min_fragment_grid_overlay_pixel_topleft_index: [i16::MIN; 2],
        max_fragment_grid_overlay_pixel_topleft_index: [i16::MAX; 2],
        min_fragment_grid_overlay_pixel_dimension: [i16::MIN; 2],
        max_fragment_grid_overlay_pixel_dimension: [i16::MAX; 2],
        ..Default::default()
    }
}

impl ProgramGroupDescription {
    /// Read a description from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The manifest shape implied by the description.
    pub fn shape(&self) -> Result<ManifestShape> {
        let programs = self
            .programs
            .iter()
            .map(|p| {
                Ok(ProgramShape::new(
                    to_u8("program dependencies", p.program_dependencies.len())?,
                    to_u8("terminal dependencies", p.terminal_dependencies.len())?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        let terminals = self
            .terminals
            .iter()
            .map(TerminalDescription::shape)
            .collect::<Result<Vec<_>>>()?;
        Ok(ManifestShape {
            programs,
            terminals,
            private_data_size: self.private_data_size,
            rbm_manifest_size: self.rbm_manifest_size,
        })
    }

    /// Lay out and fill a manifest.
    ///
    /// The result is not validated; run
    /// [`GraphValidator`](crate::validate::GraphValidator) on it before use.
    pub fn compile(&self) -> Result<ProgramGroupManifest> {
        let mut manifest = ProgramGroupManifest::new(&self.shape()?)?;
        manifest.set_id(self.id)?;
        manifest.set_subgraph_count(self.subgraph_count)?;

        for (index, program) in self.programs.iter().enumerate() {
            manifest.set_program_id(index, program.id)?;
            manifest.set_program_type(index, program.program_type)?;
            manifest.set_program_kernel_bitmap(index, program.kernels)?;
            if let Some(cell) = program.cell {
                manifest.set_program_cell(index, cell)?;
            }
            if let Some(cell_type) = program.cell_type {
                manifest.set_program_cell_type(index, cell_type)?;
            }
            for (slot, &dep) in program.program_dependencies.iter().enumerate() {
                manifest.set_program_dependency(index, slot, dep)?;
            }
            for (slot, &dep) in program.terminal_dependencies.iter().enumerate() {
                manifest.set_terminal_dependency(index, slot, dep)?;
            }
        }

        for (index, terminal) in self.terminals.iter().enumerate() {
            self.fill_terminal(&mut manifest, index, terminal)?;
        }

        match self.kernel_bitmap {
            Some(bitmap) => manifest.set_kernel_bitmap(bitmap)?,
            None => {
                manifest.update_kernel_bitmap()?;
            }
        }

        debug!("compiled description into {}", manifest);
        Ok(manifest)
    }

    fn fill_terminal(
        &self,
        manifest: &mut ProgramGroupManifest,
        index: usize,
        terminal: &TerminalDescription,
    ) -> Result<()> {
        match terminal {
            TerminalDescription::Data {
                kernel,
                formats,
                size,
                fragment_size,
                ..
            } => {
                let kernel_bitmap = KernelBitmap::bit_mask(*kernel as usize);
                if kernel_bitmap.is_empty() {
                    return Err(Error::InvalidArgument(format!(
                        "data terminal {index} names kernel {kernel}"
                    )));
                }
                manifest.update_terminal(index, |r: &mut DataTerminalManifest| {
                    r.kernel_bitmap = kernel_bitmap;
                    r.frame_format_bitmap = FrameFormat::bitmap(formats);
                    r.min_size = size.min;
                    r.max_size = size.max;
                    r.min_fragment_size = fragment_size.min;
                    r.max_fragment_size = fragment_size.max;
                })?;
            }
            TerminalDescription::Param {
                sections, assoc, ..
            } => {
                for (slot, section) in sections.iter().enumerate() {
                    manifest.set_param_section(
                        index,
                        slot,
                        ParamManifestSection::new(section.max_mem_size, section.info()),
                    )?;
                }
                if let Some(assoc) = assoc {
                    manifest.set_terminal_connect_id(index, *assoc)?;
                }
            }
            TerminalDescription::Spatial {
                kernel,
                frame_grid,
                fragment_grid,
                sections,
                ..
            } => {
                manifest.update_terminal(index, |r: &mut SpatialParamTerminalManifest| {
                    r.kernel_id = *kernel;
                    r.frame_grid = (*frame_grid).into();
                    r.fragment_grid = (*fragment_grid).into();
                })?;
                for (slot, section) in sections.iter().enumerate() {
                    manifest.set_spatial_section(
                        index,
                        slot,
                        FrameGridManifestSection {
                            max_mem_size: section.max_mem_size,
                            mem_type_id: section.mem_type,
                            region_id: section.region,
                            elem_size: section.elem_size,
                            padding: 0,
                        },
                    )?;
                }
            }
            TerminalDescription::Sliced {
                kernel, sections, ..
            } => {
                manifest
                    .update_terminal(index, |r: &mut SlicedParamTerminalManifest| {
                        r.kernel_id = *kernel
                    })?;
                for (slot, section) in sections.iter().enumerate() {
                    manifest.set_sliced_section(
                        index,
                        slot,
                        SlicedManifestSection {
                            max_mem_size: section.max_mem_size,
                            mem_type: section.mem_type,
                            region: section.region,
                            padding: [0; 2],
                        },
                    )?;
                }
            }
            TerminalDescription::Program {
                sequencer_kernel,
                max_commands,
                fragment_param_sections,
                sequencer_info_count,
            } => {
                manifest.update_terminal(index, |r: &mut ProgramTerminalManifest| {
                    r.sequencer_info_kernel_id = *sequencer_kernel;
                    r.max_kernel_fragment_sequencer_command_desc = *max_commands;
                })?;
                for (slot, section) in fragment_param_sections.iter().enumerate() {
                    manifest.set_fragment_param_section(
                        index,
                        slot,
                        FragmentParamManifestSection::new(section.max_mem_size, section.info()),
                    )?;
                }
                for slot in 0..*sequencer_info_count as usize {
                    manifest.set_sequencer_info(index, slot, open_sequencer_bounds())?;
                }
            }
            TerminalDescription::ProgramControlInit { programs } => {
                if programs.len() > self.programs.len() {
                    return Err(Error::InvalidArgument(format!(
                        "program control init terminal {index} describes {} programs, the group has {}",
                        programs.len(),
                        self.programs.len()
                    )));
                }
                for (slot, program) in programs.iter().enumerate() {
                    manifest.set_program_control_init_desc(
                        index,
                        slot,
                        ProgramControlInitProgramDesc::new(program.load, program.connect),
                    )?;
                }
            }
        }
        Ok(())
    }
}
