// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Process groups: the live, buffer-bound instantiation of a manifest.
//!
//! A process group is built for one kernel enable bitmap and fragment count.
//! Only enabled programs get a [`Process`] and only enabled terminals get a
//! runtime [`Terminal`], so the layout depends on the enable bitmap:
//!
//! ```text
//! +--------------------+ 0
//! | ProcessGroupHeader |
//! +--------------------+ processes_offset
//! | u16 process table  |  offset of each process from the group base
//! +--------------------+ terminals_offset
//! | u16 terminal table |  offset of each terminal from the group base
//! +--------------------+
//! | terminals ...      |  enabled terminals, manifest order
//! +--------------------+
//! | processes ...      |  enabled programs, manifest order
//! +--------------------+ size
//! ```
//!
//! As with manifests, [`ProcessGroup::sizeof`] and [`ProcessGroup::create`]
//! share one plan so they can never disagree.

pub mod process;
pub mod terminal;

pub use process::{Process, ProcessHeader, ProcessState, UNRESOLVED_DEPENDENCY};
pub use terminal::{
    BufferState, ConnectSectionDesc, DataTerminal, FragmentDescriptor, FragmentGridDesc,
    FragmentSliceDesc, Frame, FrameDescriptor, FrameGridParamSection, LoadSectionDesc,
    ParamPayload, ParamSection, ParamTerminal, ProgramControlInitProgram,
    ProgramControlInitTerminal, ProgramTerminal, SequencerCommandDesc, SequencerInfoDesc,
    SlicedParamTerminal, SpatialParamTerminal, Terminal, TerminalHeader, NO_BUFFER_INDEX,
};

use crate::{
    bitmap::{KernelBitmap, ResourceBitmap, RoutingBitmap},
    blob::{align_up, records, to_u16, to_u32, to_u8, Blob, Record, ALIGNMENT},
    error::{Error, Result},
    format::{FrameFormat, COL, ROW},
    manifest::{
        ProgramGroupManifest, ProgramManifest, ProgramType, SectionInfo, TerminalManifest,
        TerminalType, NO_CELL,
    },
    param::{ProgramGroupParam, Protocol},
    validate::ValidatorConfig,
};
use bytemuck::{Pod, Zeroable};
use process::{init_process, sizeof_process, ProcessInit};
use serde::{Deserialize, Serialize};
use std::fmt;
use terminal::{init_terminal, sizeof_terminal, update_binding, TerminalContext};
use tracing::{debug, trace};

/// Number of cells tracked by the resource bitmap.
pub const MAX_CELLS: usize = ResourceBitmap::BITS;

/// Life cycle of a process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ProcessGroupState {
    #[default]
    Created = 0,
    Ready,
    Blocked,
    Started,
    Running,
    Stalled,
    Stopped,
}

impl ProcessGroupState {
    pub fn name(self) -> &'static str {
        match self {
            ProcessGroupState::Created => "created",
            ProcessGroupState::Ready => "ready",
            ProcessGroupState::Blocked => "blocked",
            ProcessGroupState::Started => "started",
            ProcessGroupState::Running => "running",
            ProcessGroupState::Stalled => "stalled",
            ProcessGroupState::Stopped => "stopped",
        }
    }
}

impl TryFrom<u8> for ProcessGroupState {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => ProcessGroupState::Created,
            1 => ProcessGroupState::Ready,
            2 => ProcessGroupState::Blocked,
            3 => ProcessGroupState::Started,
            4 => ProcessGroupState::Running,
            5 => ProcessGroupState::Stalled,
            6 => ProcessGroupState::Stopped,
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "unknown process group state {value}"
                )))
            }
        })
    }
}

impl fmt::Display for ProcessGroupState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Process group commands.
///
/// | command | from | to |
/// | --- | --- | --- |
/// | submit | ready | blocked |
/// | start | blocked | started |
/// | run | started | running |
/// | suspend | running | stalled |
/// | resume | stalled | running |
/// | stop | running, stalled | stopped |
/// | abort | blocked, started, running, stalled | stopped |
/// | reset | stopped | ready |
/// | disown | blocked | running |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Submit,
    Start,
    Run,
    Suspend,
    Resume,
    Stop,
    Abort,
    Reset,
    /// Hand a submitted group to the firmware, which starts and runs it
    /// without further host commands.
    Disown,
}

impl Command {
    fn next_state(self, state: ProcessGroupState) -> Option<ProcessGroupState> {
        use ProcessGroupState::*;
        match (self, state) {
            (Command::Submit, Ready) => Some(Blocked),
            (Command::Start, Blocked) => Some(Started),
            (Command::Run, Started) => Some(Running),
            (Command::Suspend, Running) => Some(Stalled),
            (Command::Resume, Stalled) => Some(Running),
            (Command::Stop, Running | Stalled) => Some(Stopped),
            (Command::Abort, Blocked | Started | Running | Stalled) => Some(Stopped),
            (Command::Reset, Stopped) => Some(Ready),
            (Command::Disown, Blocked) => Some(Running),
            _ => None,
        }
    }

    fn expected(self) -> &'static str {
        match self {
            Command::Submit => "ready",
            Command::Start | Command::Disown => "blocked",
            Command::Run => "started",
            Command::Suspend => "running",
            Command::Resume => "stalled",
            Command::Stop => "running or stalled",
            Command::Abort => "blocked, started, running or stalled",
            Command::Reset => "stopped",
        }
    }

    /// State every process moves to along with the group.
    fn process_state(self) -> Option<ProcessState> {
        match self {
            Command::Start => Some(ProcessState::Started),
            Command::Run | Command::Resume | Command::Disown => Some(ProcessState::Running),
            Command::Stop | Command::Abort => Some(ProcessState::Stopped),
            Command::Reset => Some(ProcessState::Ready),
            Command::Submit | Command::Suspend => None,
        }
    }
}

/// Process group instantiation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessGroupConfig {
    /// Reject data terminals whose frame format has no plane layout instead
    /// of falling back to a single plane.
    #[serde(default)]
    pub strict_frame_formats: bool,
    /// Rules the manifest must pass before it is instantiated.
    #[serde(default)]
    pub validator: ValidatorConfig,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ProcessGroupHeader {
    pub token: u64,
    pub private_token: u64,
    pub routing_bitmap: RoutingBitmap,
    /// The enable bitmap the group was built for.
    pub kernel_bitmap: KernelBitmap,
    pub size: u32,
    /// ID copied from the manifest.
    pub id: u32,
    pub ipu_virtual_address: u32,
    /// Cells taken by processes of this group.
    pub resource_bitmap: ResourceBitmap,
    pub fragment_count: u16,
    pub fragment_state: u16,
    pub fragment_limit: u16,
    pub processes_offset: u16,
    pub terminals_offset: u16,
    pub process_count: u8,
    pub terminal_count: u8,
    pub subgraph_count: u8,
    pub protocol_version: u8,
    pub state: u8,
    pub base_queue_id: u8,
    pub num_queues: u8,
    pub padding: [u8; 3],
}

records! {
    ProcessGroupHeader => 704,
}

/// True when `program` is instantiated for `enable`.
///
/// Exclusive supers run only when all of their kernels are enabled. Exclusive
/// and virtual subs run when the enabled part of their super is exactly their
/// own kernels, so a sub and its super are never instantiated together.
/// Virtual supers are never instantiated; their subs run in their place.
/// `programs` is every program of the manifest, used to find the super of a
/// sub.
pub fn is_program_enabled(
    program: &ProgramManifest,
    programs: &[ProgramManifest],
    enable: KernelBitmap,
) -> bool {
    let kernels = program.kernel_bitmap();
    if !enable.intersects(&kernels) {
        return false;
    }
    let program_type = program.program_type();
    match program_type {
        ProgramType::ExclusiveSub | ProgramType::VirtualSub => {
            let parent = program
                .program_dependency(0)
                .and_then(|dep| programs.get(dep as usize));
            match parent {
                Some(parent) if Some(parent.program_type()) == program_type.super_type() => {
                    enable.intersection(parent.kernel_bitmap()).is_equal(&kernels)
                }
                _ => false,
            }
        }
        ProgramType::ExclusiveSuper => enable.intersection(kernels).is_equal(&kernels),
        ProgramType::VirtualSuper => false,
        _ => true,
    }
}

fn section_kernels(infos: impl Iterator<Item = u16>) -> KernelBitmap {
    infos.fold(KernelBitmap::clear(), |acc, info| {
        acc.set(SectionInfo::unpack(info).kernel_id as usize)
    })
}

/// True when `terminal` is instantiated for `enable`.
pub fn is_terminal_enabled(terminal: &TerminalManifest, enable: KernelBitmap) -> bool {
    match terminal {
        TerminalManifest::Data(record) => record.kernel_bitmap.intersects(&enable),
        TerminalManifest::Spatial { record, .. } => enable.is_set(record.kernel_id as usize),
        TerminalManifest::Sliced { record, .. } => enable.is_set(record.kernel_id as usize),
        TerminalManifest::Param { record, sections } => {
            record.base.terminal_type == TerminalType::ParamCachedIn as u8
                || section_kernels(sections.iter().map(|s| s.info)).intersects(&enable)
        }
        TerminalManifest::Program {
            fragment_param_sections,
            ..
        } => section_kernels(fragment_param_sections.iter().map(|s| s.info)).intersects(&enable),
        TerminalManifest::ProgramControlInit { .. } => true,
    }
}

/// Everything `sizeof` and `create` derive from the inputs.
struct Plan {
    programs: Vec<ProgramManifest>,
    terminals: Vec<TerminalManifest>,
    enabled_programs: Vec<bool>,
    /// Manifest program index of each process.
    process_programs: Vec<usize>,
    /// Manifest terminal index of each runtime terminal.
    terminal_manifests: Vec<usize>,
    terminal_sizes: Vec<usize>,
    process_sizes: Vec<usize>,
}

impl Plan {
    fn new(
        manifest: &ProgramGroupManifest,
        param: &ProgramGroupParam,
        config: &ProcessGroupConfig,
    ) -> Result<Self> {
        let (programs, terminals, enabled_programs) = enables(manifest, param, config)?;
        let enable = param.kernel_enable_bitmap;

        let process_programs: Vec<usize> = enabled_programs
            .iter()
            .enumerate()
            .filter_map(|(i, &enabled)| enabled.then_some(i))
            .collect();
        let terminal_manifests: Vec<usize> = terminals
            .iter()
            .enumerate()
            .filter_map(|(i, t)| is_terminal_enabled(t, enable).then_some(i))
            .collect();

        let ctx = TerminalContext {
            fragment_count: param.fragment_count,
            enable_bitmap: enable,
            enabled_programs: &enabled_programs,
            strict_frame_formats: config.strict_frame_formats,
        };
        let terminal_sizes = terminal_manifests
            .iter()
            .map(|&t| sizeof_terminal(&terminals[t], param.terminal(t)?, &ctx))
            .collect::<Result<Vec<_>>>()?;
        let process_sizes = process_programs
            .iter()
            .map(|&p| {
                sizeof_process(
                    programs[p].program_dependency_count(),
                    programs[p].terminal_dependency_count(),
                )
            })
            .collect();

        Ok(Self {
            programs,
            terminals,
            enabled_programs,
            process_programs,
            terminal_manifests,
            terminal_sizes,
            process_sizes,
        })
    }

    fn processes_offset(&self) -> usize {
        ProcessGroupHeader::SIZE
    }

    fn terminals_offset(&self) -> usize {
        self.processes_offset() + align_up(self.process_programs.len() * 2)
    }

    fn size(&self) -> usize {
        self.terminals_offset()
            + align_up(self.terminal_manifests.len() * 2)
            + self.terminal_sizes.iter().sum::<usize>()
            + self.process_sizes.iter().sum::<usize>()
    }
}

type Enables = (Vec<ProgramManifest>, Vec<TerminalManifest>, Vec<bool>);

fn enables(
    manifest: &ProgramGroupManifest,
    param: &ProgramGroupParam,
    config: &ProcessGroupConfig,
) -> Result<Enables> {
    manifest.validate(&config.validator)?;
    param.check(manifest)?;
    let programs = manifest.programs()?;
    let terminals = manifest.terminals()?;
    let enabled = programs
        .iter()
        .map(|p| is_program_enabled(p, &programs, param.kernel_enable_bitmap))
        .collect();
    Ok((programs, terminals, enabled))
}

/// Number of processes a group built from `manifest` and `param` holds.
///
/// # Errors
///
/// Fails when the manifest does not validate or when the enable bitmap is
/// empty or names kernels outside of the manifest.
pub fn compute_process_count(
    manifest: &ProgramGroupManifest,
    param: &ProgramGroupParam,
    config: &ProcessGroupConfig,
) -> Result<usize> {
    let (_, _, enabled) = enables(manifest, param, config)?;
    Ok(enabled.iter().filter(|&&e| e).count())
}

/// Number of runtime terminals a group built from `manifest` and `param`
/// holds.
pub fn compute_terminal_count(
    manifest: &ProgramGroupManifest,
    param: &ProgramGroupParam,
    config: &ProcessGroupConfig,
) -> Result<usize> {
    let (_, terminals, _) = enables(manifest, param, config)?;
    Ok(terminals
        .iter()
        .filter(|t| is_terminal_enabled(t, param.kernel_enable_bitmap))
        .count())
}

/// A process group blob.
#[derive(Clone, PartialEq, Eq)]
pub struct ProcessGroup {
    blob: Blob,
    header: ProcessGroupHeader,
}

impl ProcessGroup {
    /// Total size in bytes of the group built from `manifest` and `param`.
    pub fn sizeof(
        manifest: &ProgramGroupManifest,
        param: &ProgramGroupParam,
        config: &ProcessGroupConfig,
    ) -> Result<usize> {
        let size = Plan::new(manifest, param, config)?.size();
        to_u32("process group", size)?;
        Ok(size)
    }

    /// Instantiate `manifest` for the kernels, fragments and terminal
    /// parameters in `param`.
    ///
    /// The group is left in [`ProcessGroupState::Ready`] with every process
    /// ready, no buffers attached and a zero token.
    ///
    /// # Errors
    ///
    /// - [`Error::Invalid`] when the manifest fails validation.
    /// - [`Error::InvalidArgument`] when `param` does not fit the manifest, a
    ///   program has no ID or no dependencies, or two fixed cell programs
    ///   claim the same cell.
    /// - [`Error::UnknownFrameFormat`] for a data terminal without a plane
    ///   layout when [`ProcessGroupConfig::strict_frame_formats`] is set.
    /// - [`Error::Overflow`] when a count or offset does not fit its field.
    pub fn create(
        manifest: &ProgramGroupManifest,
        param: &ProgramGroupParam,
        config: &ProcessGroupConfig,
    ) -> Result<Self> {
        if manifest.id() == 0 {
            return Err(Error::InvalidArgument("program group ID is zero".into()));
        }
        let plan = Plan::new(manifest, param, config)?;
        let size = plan.size();
        let process_count = plan.process_programs.len();
        let terminal_count = plan.terminal_manifests.len();
        let mut blob = Blob::zeroed(size);

        let processes_offset = plan.processes_offset();
        let terminals_offset = plan.terminals_offset();
        let mut cursor = terminals_offset + align_up(terminal_count * 2);

        let ctx = TerminalContext {
            fragment_count: param.fragment_count,
            enable_bitmap: param.kernel_enable_bitmap,
            enabled_programs: &plan.enabled_programs,
            strict_frame_formats: config.strict_frame_formats,
        };
        let mut terminal_table = Vec::with_capacity(terminal_count);
        for &tm in &plan.terminal_manifests {
            terminal_table.push(to_u16("terminal offset", cursor)?);
            cursor += init_terminal(
                &mut blob,
                cursor,
                tm,
                &plan.terminals[tm],
                param.terminal(tm)?,
                &ctx,
            )?;
        }

        let mut resources = ResourceBitmap::clear();
        let mut process_table = Vec::with_capacity(process_count);
        for (process, &pm) in plan.process_programs.iter().enumerate() {
            let program = &plan.programs[pm];

            let cell_dependencies: Vec<u8> = program
                .program_dependencies
                .iter()
                .map(|&dep| {
                    let id = plan.programs.get(dep as usize).map(|p| p.id());
                    plan.process_programs[..process]
                        .iter()
                        .position(|&q| Some(plan.programs[q].id()) == id)
                        .map_or(UNRESOLVED_DEPENDENCY, |i| i as u8)
                })
                .collect();
            let terminal_dependencies: Vec<u8> = program
                .terminal_dependencies
                .iter()
                .map(|&t| {
                    plan.terminal_manifests
                        .iter()
                        .position(|&tm| tm == t as usize)
                        .map_or(UNRESOLVED_DEPENDENCY, |i| i as u8)
                })
                .collect();

            let cell = if program.has_fixed_cell() {
                let cell = program.cell_id();
                if cell as usize >= MAX_CELLS || resources.is_set(cell as usize) {
                    return Err(Error::InvalidArgument(format!(
                        "program {pm} cannot take cell {cell}"
                    )));
                }
                resources = resources.set(cell as usize);
                cell
            } else {
                NO_CELL
            };

            process_table.push(to_u16("process offset", cursor)?);
            cursor += init_process(
                &mut blob,
                cursor,
                &ProcessInit {
                    program_idx: pm,
                    id: program.id(),
                    kernel_bitmap: program.kernel_bitmap().intersection(param.kernel_enable_bitmap),
                    cell,
                    cell_dependencies: &cell_dependencies,
                    terminal_dependencies: &terminal_dependencies,
                },
            )?;
        }

        if cursor != size {
            return Err(Error::LayoutMismatch {
                what: "process group",
                consumed: cursor,
                expected: size,
            });
        }
        blob.store_slice(processes_offset, &process_table)?;
        blob.store_slice(terminals_offset, &terminal_table)?;

        let header = ProcessGroupHeader {
            token: 0,
            private_token: 0,
            routing_bitmap: RoutingBitmap::clear(),
            kernel_bitmap: param.kernel_enable_bitmap,
            size: to_u32("process group", size)?,
            id: manifest.id(),
            ipu_virtual_address: 0,
            resource_bitmap: resources,
            fragment_count: param.fragment_count,
            fragment_state: 0,
            fragment_limit: param.fragment_count,
            processes_offset: processes_offset as u16,
            terminals_offset: to_u16("terminal table", terminals_offset)?,
            process_count: to_u8("process count", process_count)?,
            terminal_count: to_u8("terminal count", terminal_count)?,
            subgraph_count: manifest.subgraph_count(),
            protocol_version: param.protocol_version as u8,
            state: ProcessGroupState::Ready as u8,
            base_queue_id: 0,
            num_queues: 0,
            padding: [0; 3],
        };
        blob.store(0, &header)?;

        debug!(
            "process group {}: size={} processes={} terminals={} fragments={} enable={}",
            header.id,
            size,
            process_count,
            terminal_count,
            param.fragment_count,
            param.kernel_enable_bitmap
        );

        Ok(Self { blob, header })
    }

    /// Reinterpret a copied process group blob.
    pub fn from_bytes(bytes: impl Into<Blob>) -> Result<Self> {
        let blob: Blob = bytes.into();
        let header: ProcessGroupHeader = blob.load(0)?;
        if header.size as usize != blob.len() {
            return Err(Error::LayoutMismatch {
                what: "process group",
                consumed: blob.len(),
                expected: header.size as usize,
            });
        }
        ProcessGroupState::try_from(header.state)?;
        Protocol::try_from(header.protocol_version)?;

        let group = Self { blob, header };
        for index in 0..group.terminal_count() {
            let offset = group.terminal_offset(index)?;
            if offset % ALIGNMENT != 0 {
                return Err(Error::InvalidArgument(format!(
                    "terminal {index} at unaligned offset {offset}"
                )));
            }
            Terminal::load(&group.blob, offset)?;
        }
        for index in 0..group.process_count() {
            group.process(index)?;
        }
        Ok(group)
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

    pub fn header(&self) -> &ProcessGroupHeader {
        &self.header
    }

    pub fn size(&self) -> usize {
        self.header.size as usize
    }

    pub fn id(&self) -> u32 {
        self.header.id
    }

    pub fn state(&self) -> ProcessGroupState {
        // Checked on create and from_bytes, and only written from the enum.
        ProcessGroupState::try_from(self.header.state).unwrap_or_default()
    }

    pub fn protocol(&self) -> Protocol {
        Protocol::try_from(self.header.protocol_version).unwrap_or_default()
    }

    pub fn kernel_bitmap(&self) -> KernelBitmap {
        self.header.kernel_bitmap
    }

    pub fn routing_bitmap(&self) -> RoutingBitmap {
        self.header.routing_bitmap
    }

    pub fn resource_bitmap(&self) -> ResourceBitmap {
        self.header.resource_bitmap
    }

    pub fn process_count(&self) -> usize {
        self.header.process_count as usize
    }

    pub fn terminal_count(&self) -> usize {
        self.header.terminal_count as usize
    }

    pub fn fragment_count(&self) -> u16 {
        self.header.fragment_count
    }

    pub fn fragment_state(&self) -> u16 {
        self.header.fragment_state
    }

    pub fn fragment_limit(&self) -> u16 {
        self.header.fragment_limit
    }

    pub fn token(&self) -> u64 {
        self.header.token
    }

    pub fn private_token(&self) -> u64 {
        self.header.private_token
    }

    pub fn ipu_virtual_address(&self) -> u32 {
        self.header.ipu_virtual_address
    }

    fn store_header(&mut self) -> Result<()> {
        self.blob.store(0, &self.header)
    }

    /// Set the host token. Zero is reserved for "no token".
    pub fn set_token(&mut self, token: u64) -> Result<()> {
        if token == 0 {
            return Err(Error::InvalidArgument("token must be non-zero".into()));
        }
        self.header.token = token;
        self.store_header()
    }

    pub fn set_private_token(&mut self, token: u64) -> Result<()> {
        if token == 0 {
            return Err(Error::InvalidArgument(
                "private token must be non-zero".into(),
            ));
        }
        self.header.private_token = token;
        self.store_header()
    }

    pub fn set_ipu_virtual_address(&mut self, address: u32) -> Result<()> {
        self.header.ipu_virtual_address = address;
        self.store_header()
    }

    pub fn set_routing_bitmap(&mut self, bitmap: RoutingBitmap) -> Result<()> {
        self.header.routing_bitmap = bitmap;
        self.store_header()
    }

    /// Limit processing to the first `limit` fragments.
    pub fn set_fragment_limit(&mut self, limit: u16) -> Result<()> {
        if limit > self.header.fragment_count || limit < self.header.fragment_state {
            return Err(Error::InvalidArgument(format!(
                "fragment limit {} outside of {}..={}",
                limit, self.header.fragment_state, self.header.fragment_count
            )));
        }
        self.header.fragment_limit = limit;
        self.store_header()
    }

    /// Record the fragment being processed.
    pub fn set_fragment_state(&mut self, fragment: u16) -> Result<()> {
        if fragment > self.header.fragment_limit {
            return Err(Error::InvalidArgument(format!(
                "fragment {} beyond limit {}",
                fragment, self.header.fragment_limit
            )));
        }
        self.header.fragment_state = fragment;
        self.store_header()
    }

    /// Issue `command`, moving the group and its processes to the next
    /// state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] when the command is not allowed in the
    /// current state. The group is left unchanged.
    pub fn command(&mut self, command: Command) -> Result<ProcessGroupState> {
        let state = self.state();
        let next = command.next_state(state).ok_or(Error::InvalidState {
            state: state.name(),
            expected: command.expected(),
        })?;

        if let Some(process_state) = command.process_state() {
            for index in 0..self.process_count() {
                let offset = self.process_offset(index)?;
                self.blob.update(offset, |p: &mut ProcessHeader| {
                    p.state = process_state as u8
                })?;
            }
        }
        if command == Command::Reset {
            self.header.fragment_state = 0;
        }
        self.header.state = next as u8;
        self.store_header()?;

        trace!("process group {}: {:?} {} -> {}", self.id(), command, state, next);
        Ok(next)
    }

    /// Absolute position of process `index`.
    pub fn process_offset(&self, index: usize) -> Result<usize> {
        if index >= self.process_count() {
            return Err(Error::index("process", index, self.process_count()));
        }
        let entry: u16 = self
            .blob
            .load(self.header.processes_offset as usize + index * 2)?;
        Ok(entry as usize)
    }

    pub fn process(&self, index: usize) -> Result<Process> {
        Process::load(&self.blob, self.process_offset(index)?)
    }

    pub fn processes(&self) -> Result<Vec<Process>> {
        (0..self.process_count()).map(|i| self.process(i)).collect()
    }

    /// Absolute position of runtime terminal `index`.
    pub fn terminal_offset(&self, index: usize) -> Result<usize> {
        if index >= self.terminal_count() {
            return Err(Error::index("terminal", index, self.terminal_count()));
        }
        let entry: u16 = self
            .blob
            .load(self.header.terminals_offset as usize + index * 2)?;
        Ok(entry as usize)
    }

    pub fn terminal(&self, index: usize) -> Result<Terminal> {
        Terminal::load(&self.blob, self.terminal_offset(index)?)
    }

    pub fn terminals(&self) -> Result<Vec<Terminal>> {
        (0..self.terminal_count()).map(|i| self.terminal(i)).collect()
    }

    /// Runtime index of the terminal built from terminal manifest
    /// `manifest_index`, if that terminal is enabled.
    pub fn terminal_index(&self, manifest_index: usize) -> Result<Option<usize>> {
        for index in 0..self.terminal_count() {
            let header: TerminalHeader = self.blob.load(self.terminal_offset(index)?)?;
            if header.tm_index as usize == manifest_index {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Buffer address bound to terminal `index`.
    pub fn terminal_buffer(&self, index: usize) -> Result<u32> {
        Ok(self.terminal(index)?.buffer())
    }

    /// Buffer set index bound to terminal `index`.
    pub fn terminal_buffer_index(&self, index: usize) -> Result<u32> {
        Ok(self.terminal(index)?.buffer_index())
    }

    /// Write a buffer address to terminal `index` regardless of protocol.
    pub fn set_terminal_buffer(&mut self, index: usize, buffer: u32) -> Result<()> {
        let offset = self.terminal_offset(index)?;
        update_binding(&mut self.blob, offset, |b, _, _| *b = buffer)
    }

    fn require_state(&self, allowed: &[ProcessGroupState], expected: &'static str) -> Result<()> {
        let state = self.state();
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                state: state.name(),
                expected,
            })
        }
    }

    /// Bind `buffer` to terminal `index`.
    ///
    /// Under [`Protocol::Legacy`] the address itself is stored. Under
    /// [`Protocol::Ppg`] the terminal records `index` as its buffer set
    /// slot and the address is carried by the [`BufferSet`](crate::buffer_set::BufferSet).
    /// Data terminal frames take `state`.
    pub fn attach_buffer(&mut self, index: usize, buffer: u32, state: BufferState) -> Result<()> {
        self.require_state(&[ProcessGroupState::Ready], "ready")?;
        let offset = self.terminal_offset(index)?;
        let protocol = self.protocol();
        let slot = to_u32("buffer set index", index)?;
        update_binding(&mut self.blob, offset, |b, i, frame_state| {
            match protocol {
                Protocol::Legacy => *b = buffer,
                Protocol::Ppg => *i = slot,
            }
            if let Some(frame_state) = frame_state {
                *frame_state = state as u8;
            }
        })
    }

    /// Unbind and return the buffer address of terminal `index`.
    pub fn detach_buffer(&mut self, index: usize) -> Result<u32> {
        self.require_state(&[ProcessGroupState::Ready], "ready")?;
        let offset = self.terminal_offset(index)?;
        update_binding(&mut self.blob, offset, |b, _, frame_state| {
            if let Some(frame_state) = frame_state {
                *frame_state = BufferState::Null as u8;
            }
            std::mem::take(b)
        })
    }

    /// Assign `cell` to process `index` and mark it taken.
    pub fn set_process_cell(&mut self, index: usize, cell: u8) -> Result<()> {
        self.require_state(
            &[
                ProcessGroupState::Created,
                ProcessGroupState::Ready,
                ProcessGroupState::Blocked,
                ProcessGroupState::Started,
            ],
            "created, ready, blocked or started",
        )?;
        let process = self.process(index)?;
        if !matches!(process.state, ProcessState::Ready | ProcessState::Stopped) {
            return Err(Error::InvalidState {
                state: process.state.name(),
                expected: "ready or stopped",
            });
        }
        if process.header.cell != NO_CELL {
            return Err(Error::InvalidArgument(format!(
                "process {index} already has cell {}",
                process.header.cell
            )));
        }
        if cell as usize >= MAX_CELLS || self.header.resource_bitmap.is_set(cell as usize) {
            return Err(Error::InvalidArgument(format!("cell {cell} is not available")));
        }

        self.blob
            .update(process.offset, |p: &mut ProcessHeader| p.cell = cell)?;
        self.header.resource_bitmap = self.header.resource_bitmap.set(cell as usize);
        self.store_header()
    }

    /// Release the cell of process `index`.
    pub fn clear_process_cell(&mut self, index: usize) -> Result<()> {
        self.require_state(
            &[ProcessGroupState::Blocked, ProcessGroupState::Started],
            "blocked or started",
        )?;
        let process = self.process(index)?;
        let cell = process.header.cell;
        if cell == NO_CELL || !self.header.resource_bitmap.is_set(cell as usize) {
            return Err(Error::InvalidArgument(format!(
                "process {index} holds no cell"
            )));
        }

        self.blob
            .update(process.offset, |p: &mut ProcessHeader| p.cell = NO_CELL)?;
        self.header.resource_bitmap = self.header.resource_bitmap.unset(cell as usize);
        self.store_header()
    }

    fn kind_error(&self, index: usize, expected: &'static str, terminal: &Terminal) -> Error {
        Error::TerminalKind {
            index,
            expected,
            actual: terminal.terminal_type().name(),
        }
    }

    fn program_control_init(
        &self,
        index: usize,
        program: usize,
    ) -> Result<(usize, ProgramControlInitProgram)> {
        match self.terminal(index)? {
            Terminal::ProgramControlInit { record, programs } => {
                let desc = *programs
                    .get(program)
                    .ok_or_else(|| Error::index("program", program, programs.len()))?;
                let offset = record.program_section_desc_offset as usize
                    + program * ProgramControlInitProgram::SIZE;
                Ok((offset, desc))
            }
            other => Err(self.kind_error(index, "program-control-init", &other)),
        }
    }

    /// Position of the first load section of `program`, relative to the
    /// base of program control init terminal `index`.
    pub fn load_section_offset(&self, index: usize, program: usize) -> Result<usize> {
        let (offset, desc) = self.program_control_init(index, program)?;
        Ok(offset + desc.load_section_desc_offset as usize)
    }

    /// Position of the first connect section of `program`, relative to the
    /// base of program control init terminal `index`.
    pub fn connect_section_offset(&self, index: usize, program: usize) -> Result<usize> {
        let (offset, desc) = self.program_control_init(index, program)?;
        Ok(offset + desc.connect_section_desc_offset as usize)
    }

    /// Fill the control info of `program` in program control init terminal
    /// `index`. The firmware signals completion by counting down
    /// `num_done_events`.
    pub fn set_program_control_info(
        &mut self,
        index: usize,
        program: usize,
        process_id: u16,
        num_done_events: u8,
    ) -> Result<()> {
        let (offset, _) = self.program_control_init(index, program)?;
        let base = self.terminal_offset(index)?;
        self.blob
            .update(base + offset, |p: &mut ProgramControlInitProgram| {
                p.process_id = process_id;
                p.num_done_events = num_done_events;
            })
    }

    /// Write load section `section` of `program`.
    pub fn set_load_section(
        &mut self,
        index: usize,
        program: usize,
        section: usize,
        desc: LoadSectionDesc,
    ) -> Result<()> {
        let (_, info) = self.program_control_init(index, program)?;
        if section >= info.load_section_count as usize {
            return Err(Error::index(
                "load section",
                section,
                info.load_section_count as usize,
            ));
        }
        let position = self.terminal_offset(index)?
            + self.load_section_offset(index, program)?
            + section * LoadSectionDesc::SIZE;
        self.blob.store(position, &desc)
    }

    /// Write connect section `section` of `program`.
    pub fn set_connect_section(
        &mut self,
        index: usize,
        program: usize,
        section: usize,
        desc: ConnectSectionDesc,
    ) -> Result<()> {
        let (_, info) = self.program_control_init(index, program)?;
        if section >= info.connect_section_count as usize {
            return Err(Error::index(
                "connect section",
                section,
                info.connect_section_count as usize,
            ));
        }
        let position = self.terminal_offset(index)?
            + self.connect_section_offset(index, program)?
            + section * ConnectSectionDesc::SIZE;
        self.blob.store(position, &desc)
    }

    /// Write sequencer info `info` of `fragment` in program terminal
    /// `index`.
    pub fn set_sequencer_info(
        &mut self,
        index: usize,
        fragment: usize,
        info: usize,
        desc: SequencerInfoDesc,
    ) -> Result<()> {
        let base = self.terminal_offset(index)?;
        let record = match self.terminal(index)? {
            Terminal::Program { record, .. } => record,
            other => return Err(self.kind_error(index, "program", &other)),
        };
        let per_fragment = record.sequencer_info_count as usize;
        if fragment >= record.fragment_count as usize {
            return Err(Error::index("fragment", fragment, record.fragment_count as usize));
        }
        if info >= per_fragment {
            return Err(Error::index("sequencer info", info, per_fragment));
        }
        let position = base
            + record.sequencer_info_desc_offset as usize
            + (fragment * per_fragment + info) * SequencerInfoDesc::SIZE;
        self.blob.store(position, &desc)
    }

    /// Sections of `slice` in `fragment` of sliced terminal `index`.
    pub fn slice_sections(
        &self,
        index: usize,
        fragment: usize,
        slice: usize,
    ) -> Result<Vec<ParamSection>> {
        let (position, count) = self.slice_position(index, fragment, slice)?;
        self.blob.load_slice(position, count)
    }

    /// Write section `section` of `slice` in `fragment` of sliced terminal
    /// `index`.
    pub fn set_slice_section(
        &mut self,
        index: usize,
        fragment: usize,
        slice: usize,
        section: usize,
        desc: ParamSection,
    ) -> Result<()> {
        let (position, count) = self.slice_position(index, fragment, slice)?;
        if section >= count {
            return Err(Error::index("slice section", section, count));
        }
        self.blob.store(position + section * ParamSection::SIZE, &desc)
    }

    fn slice_position(
        &self,
        index: usize,
        fragment: usize,
        slice: usize,
    ) -> Result<(usize, usize)> {
        let base = self.terminal_offset(index)?;
        match self.terminal(index)? {
            Terminal::Sliced { record, fragments } => {
                let desc = fragments
                    .get(fragment)
                    .ok_or_else(|| Error::index("fragment", fragment, fragments.len()))?;
                if slice >= desc.slice_count as usize {
                    return Err(Error::index("slice", slice, desc.slice_count as usize));
                }
                let sections = record.section_count as usize;
                Ok((
                    base + desc.slice_section_desc_offset as usize
                        + slice * sections * ParamSection::SIZE,
                    sections,
                ))
            }
            other => Err(self.kind_error(index, "sliced", &other)),
        }
    }

    /// Check the runtime settings of terminal `index` against the bounds of
    /// the terminal manifest it was built from.
    ///
    /// Data terminals check the frame format against the supported format
    /// bitmap and the frame size against the manifest bounds. Program
    /// terminals check every sequencer info against its bounds and sliced
    /// terminals check every slice section size. Other kinds have no bounds.
    pub fn is_terminal_valid(&self, manifest: &ProgramGroupManifest, index: usize) -> Result<bool> {
        let terminal = self.terminal(index)?;
        let man = manifest.terminal(terminal.manifest_index())?;

        let valid = match (&terminal, &man) {
            (Terminal::Data { record, .. }, TerminalManifest::Data(bounds)) => {
                let descriptor = &record.frame_descriptor;
                let format_ok = bounds.frame_format_bitmap == 0
                    || FrameFormat::try_from(descriptor.frame_format_type)
                        .ok()
                        .and_then(|f| f.bit())
                        .is_some_and(|bit| bounds.frame_format_bitmap & bit != 0);
                let size_ok = [COL, ROW].iter().all(|&d| {
                    bounds.max_size[d] == 0
                        || (bounds.min_size[d]..=bounds.max_size[d])
                            .contains(&descriptor.dimension[d])
                });
                format_ok && size_ok
            }
            (
                Terminal::Program {
                    sequencer_infos, ..
                },
                TerminalManifest::Program {
                    sequencer_infos: bounds,
                    ..
                },
            ) => {
                // Descriptors are stored fragment-major.
                sequencer_infos
                    .chunks(bounds.len().max(1))
                    .all(|fragment| {
                        fragment
                            .iter()
                            .zip(bounds)
                            .all(|(desc, bound)| sequencer_info_in_bounds(desc, bound))
                    })
            }
            (Terminal::Sliced { record, fragments }, TerminalManifest::Sliced { sections, .. }) => {
                let base = self.terminal_offset(index)?;
                let per_slice = record.section_count as usize;
                let mut ok = true;
                for desc in fragments {
                    let slices: Vec<ParamSection> = self.blob.load_slice(
                        base + desc.slice_section_desc_offset as usize,
                        desc.slice_count as usize * per_slice,
                    )?;
                    ok &= slices
                        .chunks(per_slice.max(1))
                        .all(|slice| {
                            slice
                                .iter()
                                .zip(sections)
                                .all(|(s, bound)| s.mem_size <= bound.max_mem_size)
                        });
                }
                ok
            }
            (Terminal::Data { .. } | Terminal::Program { .. } | Terminal::Sliced { .. }, _) => {
                return Err(Error::TerminalKind {
                    index,
                    expected: terminal.terminal_type().name(),
                    actual: man.terminal_type().name(),
                })
            }
            _ => true,
        };
        Ok(valid)
    }
}

fn within<T: PartialOrd + Copy>(value: [T; 2], min: [T; 2], max: [T; 2]) -> bool {
    (0..2).all(|d| min[d] <= value[d] && value[d] <= max[d])
}

fn sequencer_info_in_bounds(
    desc: &SequencerInfoDesc,
    bound: &crate::manifest::SequencerInfoManifest,
) -> bool {
    within(
        desc.fragment_grid_slice_dimension,
        bound.min_fragment_grid_slice_dimension,
        bound.max_fragment_grid_slice_dimension,
    ) && within(
        desc.fragment_grid_slice_count,
        bound.min_fragment_grid_slice_count,
        bound.max_fragment_grid_slice_count,
    ) && within(
        desc.fragment_grid_point_decimation_factor,
        bound.min_fragment_grid_point_decimation_factor,
        bound.max_fragment_grid_point_decimation_factor,
    ) && within(
        desc.fragment_grid_overlay_pixel_topleft_index,
        bound.min_fragment_grid_overlay_pixel_topleft_index,
        bound.max_fragment_grid_overlay_pixel_topleft_index,
    ) && within(
        desc.fragment_grid_overlay_pixel_dimension,
        bound.min_fragment_grid_overlay_pixel_dimension,
        bound.max_fragment_grid_overlay_pixel_dimension,
    )
}

impl fmt::Debug for ProcessGroup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ProcessGroup")
            .field("id", &self.header.id)
            .field("size", &self.header.size)
            .field("state", &self.state())
            .field("processes", &self.header.process_count)
            .field("terminals", &self.header.terminal_count)
            .finish()
    }
}
