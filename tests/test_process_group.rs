// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_psys::{
    bitmap::{KernelBitmap, RoutingBitmap},
    blob::Record,
    description::ProgramGroupDescription,
    format::FrameFormat,
    manifest::{ProgramGroupManifest, SequencerInfoManifest, TerminalType},
    param::{ProgramGroupParam, Protocol, TerminalParam},
    process_group::{
        compute_process_count, compute_terminal_count, is_program_enabled, BufferState, Command,
        LoadSectionDesc, ParamSection, ProcessGroup, ProcessGroupConfig, ProcessGroupState,
        ProcessState, SequencerInfoDesc, Terminal, NO_BUFFER_INDEX, UNRESOLVED_DEPENDENCY,
    },
    BufferSet, Error as PsysError,
};
use std::error::Error;

/// Three chained singular programs over kernels 0, 1 and 2 with one
/// terminal of every kind.
///
/// | terminal | kind | kernel |
/// | --- | --- | --- |
/// | 0 | data in, nv12 | 0 |
/// | 1 | data out, nv12 | 0 |
/// | 2 | param cached in | 0 |
/// | 3 | spatial in | 1 |
/// | 4 | sliced in | 1 |
/// | 5 | data out, yuv420 | 2 |
/// | 6 | param cached out | 2 |
/// | 7 | program | 1 |
/// | 8 | program control init | |
const PIPELINE: &str = r#"{
    "id": 77,
    "programs": [
        { "id": 10, "kernels": [0], "terminal_dependencies": [0, 1, 2] },
        { "id": 11, "kernels": [1], "program_dependencies": [0],
          "terminal_dependencies": [3, 4] },
        { "id": 12, "kernels": [2], "program_dependencies": [1],
          "terminal_dependencies": [5] }
    ],
    "terminals": [
        { "kind": "data", "direction": "in", "kernel": 0, "formats": ["nv12"],
          "size": { "min": [16, 16], "max": [4096, 4096] } },
        { "kind": "data", "direction": "out", "kernel": 0, "formats": ["nv12"] },
        { "kind": "param", "direction": "in",
          "sections": [{ "max_mem_size": 256, "kernel": 0 },
                       { "max_mem_size": 128, "kernel": 0 }] },
        { "kind": "spatial", "direction": "in", "kernel": 1,
          "frame_grid": { "min": [1, 1], "max": [8, 4] },
          "fragment_grid": { "min": [1, 1], "max": [4, 4] },
          "sections": [{ "max_mem_size": 64 }, { "max_mem_size": 32 }] },
        { "kind": "sliced", "direction": "in", "kernel": 1,
          "sections": [{ "max_mem_size": 100 }, { "max_mem_size": 50 }] },
        { "kind": "data", "direction": "out", "kernel": 2, "formats": ["yuv420"] },
        { "kind": "param", "direction": "out",
          "sections": [{ "max_mem_size": 512, "kernel": 2 }] },
        { "kind": "program", "max_commands": 2, "sequencer_info_count": 1,
          "fragment_param_sections": [{ "max_mem_size": 40, "kernel": 1 },
                                      { "max_mem_size": 24, "kernel": 1 }] },
        { "kind": "program_control_init",
          "programs": [{ "load": 1, "connect": 1 }, { "load": 2 },
                       { "load": 0, "connect": 2 }] }
    ]
}"#;

fn pipeline() -> Result<ProgramGroupManifest, Box<dyn Error>> {
    Ok(ProgramGroupDescription::from_json(PIPELINE)?.compile()?)
}

fn pipeline_param(
    manifest: &ProgramGroupManifest,
    kernels: &[usize],
    fragments: u16,
) -> Result<ProgramGroupParam, Box<dyn Error>> {
    let enable = KernelBitmap::from_indices(kernels.iter().copied());
    let mut param = ProgramGroupParam::new(manifest, enable, fragments);
    let nv12 = TerminalParam::frame(FrameFormat::Nv12, 64, 32, 64, 8);
    *param.terminal_mut(0)? = nv12.clone();
    *param.terminal_mut(1)? = nv12;
    *param.terminal_mut(5)? = TerminalParam::frame(FrameFormat::Yuv420, 64, 32, 64, 8);
    param.terminal_mut(4)?.slice_counts = vec![2, 1];
    Ok(param)
}

fn create(kernels: &[usize], fragments: u16) -> Result<ProcessGroup, Box<dyn Error>> {
    let manifest = pipeline()?;
    let param = pipeline_param(&manifest, kernels, fragments)?;
    Ok(ProcessGroup::create(
        &manifest,
        &param,
        &ProcessGroupConfig::default(),
    )?)
}

/// A super over kernels 0 and 1 with one sub over kernel 0, both reading
/// terminal 0. `kind` is `exclusive` or `virtual`.
fn super_sub_pair(kind: &str) -> Result<ProgramGroupManifest, Box<dyn Error>> {
    let text = format!(
        r#"{{
            "id": 42,
            "programs": [
                {{ "id": 1, "type": "{kind}_super", "kernels": [0, 1],
                   "terminal_dependencies": [0, 1] }},
                {{ "id": 2, "type": "{kind}_sub", "kernels": [0],
                   "program_dependencies": [0], "terminal_dependencies": [0] }}
            ],
            "terminals": [
                {{ "kind": "data", "direction": "in", "kernel": 0, "formats": ["nv12"] }},
                {{ "kind": "data", "direction": "out", "kernel": 1, "formats": ["nv12"] }}
            ]
        }}"#
    );
    Ok(ProgramGroupDescription::from_json(&text)?.compile()?)
}

fn pair_group(
    manifest: &ProgramGroupManifest,
    kernels: &[usize],
) -> Result<ProcessGroup, Box<dyn Error>> {
    let enable = KernelBitmap::from_indices(kernels.iter().copied());
    let mut param = ProgramGroupParam::new(manifest, enable, 1);
    for terminal in param.terminals.iter_mut() {
        *terminal = TerminalParam::frame(FrameFormat::Nv12, 64, 32, 64, 8);
    }
    Ok(ProcessGroup::create(
        manifest,
        &param,
        &ProcessGroupConfig::default(),
    )?)
}

#[test]
fn test_full_enable() -> Result<(), Box<dyn Error>> {
    let manifest = pipeline()?;
    let param = pipeline_param(&manifest, &[0, 1, 2], 2)?;
    let config = ProcessGroupConfig::default();

    let group = ProcessGroup::create(&manifest, &param, &config)?;
    println!("{:?}", group);

    assert_eq!(group.size(), ProcessGroup::sizeof(&manifest, &param, &config)?);
    assert_eq!(group.process_count(), 3);
    assert_eq!(group.terminal_count(), 9);
    assert_eq!(compute_process_count(&manifest, &param, &config)?, 3);
    assert_eq!(compute_terminal_count(&manifest, &param, &config)?, 9);
    assert_eq!(group.id(), 77);
    assert_eq!(group.state(), ProcessGroupState::Ready);
    assert_eq!(group.fragment_count(), 2);
    assert_eq!(group.fragment_limit(), 2);
    assert_eq!(group.token(), 0);
    assert_eq!(group.kernel_bitmap(), KernelBitmap::from_indices([0, 1, 2]));

    let processes = group.processes()?;
    let ids: Vec<u32> = processes.iter().map(|p| p.id()).collect();
    assert_eq!(ids, vec![10, 11, 12]);
    assert!(processes.iter().all(|p| p.state == ProcessState::Ready));
    assert!(processes.iter().all(|p| p.cell().is_none()));
    assert!(processes[0].cell_dependencies.is_empty());
    assert_eq!(processes[1].cell_dependencies, vec![0]);
    assert_eq!(processes[2].cell_dependencies, vec![1]);
    assert_eq!(processes[0].terminal_dependencies, vec![0, 1, 2]);
    assert_eq!(processes[1].terminal_dependencies, vec![3, 4]);

    let mut previous = 0;
    for (index, terminal) in group.terminals()?.iter().enumerate() {
        let offset = group.terminal_offset(index)?;
        assert!(offset > previous);
        assert_eq!(offset % 8, 0);
        assert_eq!(terminal.header().parent_offset, -(offset as i32));
        assert_eq!(terminal.manifest_index(), index);
        assert_eq!(terminal.buffer(), 0);
        previous = offset;
    }
    for process in &processes {
        assert_eq!(process.header.parent_offset, -(process.offset as i32));
    }

    Ok(())
}

#[test]
fn test_terminal_sizes() -> Result<(), Box<dyn Error>> {
    let group = create(&[0, 1, 2], 2)?;
    let sizes: Vec<usize> = group.terminals()?.iter().map(|t| t.size()).collect();
    // data 88 + 2 * 16, param in 40 + 2 * 8, spatial 48 + 2 * 8 + 2 * 16,
    // sliced 48 + 2 * 8 + 3 slices * 2 * 8, param out 40 + 2 fragments * 8,
    // program 56 + 2 * 24 + 2 * 8 + 2 * 2 * 8, control 40 + 3 * 16 + 3 * 8 + 3 * 8
    assert_eq!(sizes, vec![120, 120, 56, 96, 112, 120, 56, 152, 136]);
    Ok(())
}

#[test]
fn test_partial_enable() -> Result<(), Box<dyn Error>> {
    let group = create(&[0, 2], 1)?;
    assert_eq!(group.process_count(), 2);
    assert_eq!(group.terminal_count(), 6);

    let manifest_indices: Vec<usize> = group
        .terminals()?
        .iter()
        .map(|t| t.manifest_index())
        .collect();
    assert_eq!(manifest_indices, vec![0, 1, 2, 5, 6, 8]);
    assert_eq!(group.terminal_index(5)?, Some(3));
    assert_eq!(group.terminal_index(3)?, None);

    let last = group.process(1)?;
    assert_eq!(last.id(), 12);
    assert_eq!(last.program_idx(), 2);
    // Program 1 is not instantiated.
    assert_eq!(last.cell_dependencies, vec![UNRESOLVED_DEPENDENCY]);
    assert_eq!(last.terminal_dependencies, vec![3]);
    Ok(())
}

#[test]
fn test_enable_rules() -> Result<(), Box<dyn Error>> {
    let manifest = pipeline()?;
    let config = ProcessGroupConfig::default();

    let empty = ProgramGroupParam::new(&manifest, KernelBitmap::clear(), 1);
    assert!(ProcessGroup::create(&manifest, &empty, &config).is_err());

    let outside = pipeline_param(&manifest, &[0, 9], 1)?;
    assert!(ProcessGroup::create(&manifest, &outside, &config).is_err());

    let mut short = pipeline_param(&manifest, &[0], 1)?;
    short.terminals.pop();
    assert!(ProcessGroup::create(&manifest, &short, &config).is_err());

    let no_fragments = pipeline_param(&manifest, &[0], 0)?;
    assert!(ProcessGroup::create(&manifest, &no_fragments, &config).is_err());

    let mut anonymous = manifest.clone();
    anonymous.set_id(0)?;
    let param = pipeline_param(&anonymous, &[0], 1)?;
    assert!(ProcessGroup::create(&anonymous, &param, &config).is_err());

    Ok(())
}

#[test]
fn test_exclusive_enable() -> Result<(), Box<dyn Error>> {
    let manifest = super_sub_pair("exclusive")?;
    let programs = manifest.programs()?;

    // All of the super's kernels run the super alone.
    let both = KernelBitmap::from_indices([0, 1]);
    assert!(is_program_enabled(&programs[0], &programs, both));
    assert!(!is_program_enabled(&programs[1], &programs, both));

    let group = pair_group(&manifest, &[0, 1])?;
    let ids: Vec<u32> = group.processes()?.iter().map(|p| p.id()).collect();
    assert_eq!(ids, vec![1]);
    assert_eq!(group.terminal_count(), 2);

    // Exactly the sub's kernels run the sub alone.
    let first = KernelBitmap::from_indices([0]);
    assert!(!is_program_enabled(&programs[0], &programs, first));
    assert!(is_program_enabled(&programs[1], &programs, first));

    let group = pair_group(&manifest, &[0])?;
    assert_eq!(group.process_count(), 1);
    assert_eq!(group.terminal_count(), 1);
    let sub = group.process(0)?;
    assert_eq!(sub.id(), 2);
    assert_eq!(sub.program_idx(), 1);
    assert_eq!(sub.cell_dependencies, vec![UNRESOLVED_DEPENDENCY]);
    assert_eq!(sub.terminal_dependencies, vec![0]);

    // Kernel 1 alone matches neither program.
    let second = KernelBitmap::from_indices([1]);
    assert!(!programs.iter().any(|p| is_program_enabled(p, &programs, second)));

    Ok(())
}

#[test]
fn test_virtual_enable() -> Result<(), Box<dyn Error>> {
    let manifest = super_sub_pair("virtual")?;
    let programs = manifest.programs()?;
    let config = ProcessGroupConfig::default();

    // The super is never instantiated, and the sub does not match the
    // enabled part of its super.
    let both = KernelBitmap::from_indices([0, 1]);
    assert!(!programs.iter().any(|p| is_program_enabled(p, &programs, both)));
    let param = ProgramGroupParam::new(&manifest, both, 1);
    assert_eq!(compute_process_count(&manifest, &param, &config)?, 0);

    let first = KernelBitmap::from_indices([0]);
    assert!(!is_program_enabled(&programs[0], &programs, first));
    assert!(is_program_enabled(&programs[1], &programs, first));

    let group = pair_group(&manifest, &[0])?;
    assert_eq!(group.process_count(), 1);
    let sub = group.process(0)?;
    assert_eq!(sub.id(), 2);
    assert_eq!(sub.cell_dependencies, vec![UNRESOLVED_DEPENDENCY]);

    Ok(())
}

#[test]
fn test_sub_with_mismatched_super() -> Result<(), Box<dyn Error>> {
    // Validation rejects this layout, so build the records by hand and
    // check the enable rule on its own.
    let manifest = super_sub_pair("exclusive")?;
    let mut programs = manifest.programs()?;
    let virtual_super = super_sub_pair("virtual")?.programs()?.remove(0);
    programs[0] = virtual_super;

    let first = KernelBitmap::from_indices([0]);
    assert!(!is_program_enabled(&programs[1], &programs, first));
    Ok(())
}

#[test]
fn test_plane_layouts() -> Result<(), Box<dyn Error>> {
    let group = create(&[0, 1, 2], 2)?;

    match group.terminal(0)? {
        Terminal::Data { record, fragments } => {
            let descriptor = record.frame_descriptor;
            assert_eq!(descriptor.plane_count, 2);
            assert_eq!(&descriptor.plane_offsets[..2], &[0, 2048]);
            assert_eq!(descriptor.dimension, [64, 32]);
            assert_eq!(record.kernel_id, 0);
            assert_eq!(record.stream2gen_buffer_size, 32);
            assert_eq!(record.frame.data_index, NO_BUFFER_INDEX);
            assert_eq!(fragments.len(), 2);
            assert_eq!(fragments[0].index, [0, 0]);
            assert_eq!(fragments[1].index, [64, 0]);
        }
        other => panic!("expected a data terminal, got {:?}", other),
    }

    match group.terminal(5)? {
        Terminal::Data { record, .. } => {
            let descriptor = record.frame_descriptor;
            assert_eq!(descriptor.plane_count, 3);
            assert_eq!(&descriptor.plane_offsets[..3], &[0, 2048, 2560]);
            assert_eq!(record.kernel_id, 2);
        }
        other => panic!("expected a data terminal, got {:?}", other),
    }

    Ok(())
}

#[test]
fn test_unknown_frame_format() -> Result<(), Box<dyn Error>> {
    let manifest = pipeline()?;
    let mut param = pipeline_param(&manifest, &[0, 1, 2], 1)?;
    *param.terminal_mut(1)? = TerminalParam::default();

    // Formats without a plane rule fall back to a single plane.
    let group = ProcessGroup::create(&manifest, &param, &ProcessGroupConfig::default())?;
    match group.terminal(1)? {
        Terminal::Data { record, .. } => assert_eq!(record.frame_descriptor.plane_count, 1),
        other => panic!("expected a data terminal, got {:?}", other),
    }

    let strict = ProcessGroupConfig {
        strict_frame_formats: true,
        ..Default::default()
    };
    assert!(matches!(
        ProcessGroup::create(&manifest, &param, &strict),
        Err(PsysError::UnknownFrameFormat(0))
    ));
    Ok(())
}

#[test]
fn test_plane_offset_overflow() -> Result<(), Box<dyn Error>> {
    let manifest = pipeline()?;
    let config = ProcessGroupConfig::default();
    let mut param = pipeline_param(&manifest, &[0, 1, 2], 1)?;
    // Two full rgb888 planes of 4 GiB each do not fit 32-bit offsets.
    *param.terminal_mut(1)? = TerminalParam::frame(FrameFormat::Rgb888, 4096, 4096, 1 << 20, 8);

    assert!(matches!(
        ProcessGroup::create(&manifest, &param, &config),
        Err(PsysError::Overflow {
            what: "plane offset",
            ..
        })
    ));
    Ok(())
}

#[test]
fn test_param_terminals() -> Result<(), Box<dyn Error>> {
    let group = create(&[0, 1, 2], 2)?;

    match group.terminal(2)? {
        Terminal::Param { record, sections } => {
            assert_eq!(record.section_count, 2);
            assert_eq!(record.param_payload.terminal_index, NO_BUFFER_INDEX);
            let packed: Vec<(u32, u32)> =
                sections.iter().map(|s| (s.mem_offset, s.mem_size)).collect();
            assert_eq!(packed, vec![(0, 256), (256, 128)]);
        }
        other => panic!("expected a param terminal, got {:?}", other),
    }

    // Cached out sections repeat for every fragment.
    match group.terminal(6)? {
        Terminal::Param { record, sections } => {
            assert_eq!(record.base.terminal_type, TerminalType::ParamCachedOut as u8);
            let packed: Vec<(u32, u32)> =
                sections.iter().map(|s| (s.mem_offset, s.mem_size)).collect();
            assert_eq!(packed, vec![(0, 512), (512, 512)]);
        }
        other => panic!("expected a param terminal, got {:?}", other),
    }

    match group.terminal(3)? {
        Terminal::Spatial {
            record,
            fragment_grids,
            sections,
        } => {
            assert_eq!(record.kernel_id, 1);
            assert_eq!(record.frame_grid_dimension, [8, 4]);
            assert_eq!(fragment_grids[0].fragment_grid_index, [0, 0]);
            assert_eq!(fragment_grids[1].fragment_grid_index, [4, 0]);
            assert_eq!(fragment_grids[1].fragment_grid_dimension, [4, 4]);
            assert_eq!(sections[1].mem_offset, 64);
            assert_eq!(sections[1].mem_size, 32);
        }
        other => panic!("expected a spatial terminal, got {:?}", other),
    }

    match group.terminal(7)? {
        Terminal::Program {
            record,
            sequencer_infos,
            fragment_param_sections,
        } => {
            assert_eq!(record.payload_fragment_stride, 64);
            assert_eq!(record.command_count, 4);
            assert_eq!(sequencer_infos.len(), 2);
            assert_eq!(fragment_param_sections[1].mem_offset, 40);
        }
        other => panic!("expected a program terminal, got {:?}", other),
    }

    Ok(())
}

#[test]
fn test_sliced_terminal() -> Result<(), Box<dyn Error>> {
    let manifest = pipeline()?;
    let mut group = create(&[0, 1, 2], 2)?;

    match group.terminal(4)? {
        Terminal::Sliced { record, fragments } => {
            assert_eq!(record.kernel_id, 1);
            assert_eq!(fragments[0].slice_count, 2);
            assert_eq!(fragments[1].slice_count, 1);
            assert_eq!(fragments[1].slice_section_desc_offset, 96);
        }
        other => panic!("expected a sliced terminal, got {:?}", other),
    }

    let sections = group.slice_sections(4, 1, 0)?;
    assert_eq!(
        sections,
        vec![
            ParamSection {
                mem_offset: 300,
                mem_size: 100
            },
            ParamSection {
                mem_offset: 400,
                mem_size: 50
            }
        ]
    );
    assert!(group.slice_sections(4, 1, 1).is_err());
    assert!(group.is_terminal_valid(&manifest, 4)?);

    group.set_slice_section(
        4,
        0,
        1,
        1,
        ParamSection {
            mem_offset: 250,
            mem_size: 51,
        },
    )?;
    assert!(!group.is_terminal_valid(&manifest, 4)?);
    assert!(group.set_slice_section(0, 0, 0, 0, ParamSection::default()).is_err());

    Ok(())
}

#[test]
fn test_terminal_validity() -> Result<(), Box<dyn Error>> {
    let mut manifest = pipeline()?;
    let narrow = SequencerInfoManifest {
        max_fragment_grid_slice_dimension: [64, 64],
        max_fragment_grid_slice_count: [u16::MAX; 2],
        max_fragment_grid_point_decimation_factor: [u16::MAX; 2],
        min_fragment_grid_overlay_pixel_topleft_index: [i16::MIN; 2],
        max_fragment_grid_overlay_pixel_topleft_index: [i16::MAX; 2],
        min_fragment_grid_overlay_pixel_dimension: [i16::MIN; 2],
        max_fragment_grid_overlay_pixel_dimension: [i16::MAX; 2],
        ..Default::default()
    };
    manifest.set_sequencer_info(7, 0, narrow)?;

    let param = pipeline_param(&manifest, &[0, 1, 2], 2)?;
    let mut group = ProcessGroup::create(&manifest, &param, &ProcessGroupConfig::default())?;

    for index in 0..group.terminal_count() {
        assert!(group.is_terminal_valid(&manifest, index)?, "terminal {}", index);
    }

    let desc = SequencerInfoDesc {
        fragment_grid_slice_dimension: [128, 16],
        ..Default::default()
    };
    group.set_sequencer_info(7, 1, 0, desc)?;
    assert!(!group.is_terminal_valid(&manifest, 7)?);
    assert!(group.set_sequencer_info(7, 2, 0, desc).is_err());
    assert!(group.set_sequencer_info(7, 0, 1, desc).is_err());
    assert!(group.set_sequencer_info(3, 0, 0, desc).is_err());

    // Frames smaller than the manifest bounds are rejected.
    let mut small = pipeline_param(&manifest, &[0, 1, 2], 1)?;
    *small.terminal_mut(0)? = TerminalParam::frame(FrameFormat::Nv12, 8, 8, 8, 8);
    let group = ProcessGroup::create(&manifest, &small, &ProcessGroupConfig::default())?;
    assert!(!group.is_terminal_valid(&manifest, 0)?);

    // So are formats the terminal does not declare.
    let mut other = pipeline_param(&manifest, &[0, 1, 2], 1)?;
    *other.terminal_mut(1)? = TerminalParam::frame(FrameFormat::Yuyv, 64, 32, 128, 16);
    let group = ProcessGroup::create(&manifest, &other, &ProcessGroupConfig::default())?;
    assert!(!group.is_terminal_valid(&manifest, 1)?);
    assert!(group.is_terminal_valid(&manifest, 0)?);

    Ok(())
}

#[test]
fn test_program_control_init() -> Result<(), Box<dyn Error>> {
    let description = ProgramGroupDescription::from_json(
        r#"{
            "id": 3,
            "programs": [
                { "id": 1, "kernels": [0], "terminal_dependencies": [0] },
                { "id": 2, "kernels": [1], "terminal_dependencies": [2] },
                { "id": 3, "kernels": [2], "terminal_dependencies": [1] }
            ],
            "terminals": [
                { "kind": "data", "direction": "in", "kernel": 0 },
                { "kind": "data", "direction": "out", "kernel": 2 },
                { "kind": "data", "direction": "out", "kernel": 1 },
                { "kind": "program_control_init",
                  "programs": [{ "load": 2 }, { "load": 0 }, { "load": 3 }] }
            ]
        }"#,
    )?;
    let manifest = description.compile()?;
    let param = ProgramGroupParam::new(&manifest, KernelBitmap::from_indices([0, 2]), 1);
    let mut group = ProcessGroup::create(&manifest, &param, &ProcessGroupConfig::default())?;

    assert_eq!(group.terminal_count(), 3);
    assert_eq!(group.process_count(), 2);

    let pci = group
        .terminal_index(3)?
        .ok_or("program control init terminal missing")?;
    assert_eq!(pci, 2);
    // The load sections of enabled programs are packed back to back.
    let first = group.load_section_offset(pci, 0)?;
    let third = group.load_section_offset(pci, 2)?;
    assert_eq!(third - first, 16);
    assert_eq!(third, 104);

    match group.terminal(pci)? {
        Terminal::ProgramControlInit { record, programs } => {
            assert_eq!(record.program_count, 3);
            assert_eq!(programs[1].load_section_count, 0);
            assert_eq!(programs[2].load_section_count, 3);
            assert_eq!(group.terminal(pci)?.size(), 128);
        }
        other => panic!("expected a program control init terminal, got {:?}", other),
    }

    let desc = LoadSectionDesc {
        device_descriptor_id: 0xabcd,
        mem_size: 64,
        ..Default::default()
    };
    group.set_load_section(pci, 2, 2, desc)?;
    assert!(group.set_load_section(pci, 2, 3, desc).is_err());
    assert!(group.set_load_section(pci, 1, 0, desc).is_err());
    let at = group.terminal_offset(pci)? + third + 2 * LoadSectionDesc::SIZE;
    assert_eq!(group.blob().load::<LoadSectionDesc>(at)?, desc);

    group.set_program_control_info(pci, 2, 1, 3)?;
    match group.terminal(pci)? {
        Terminal::ProgramControlInit { programs, .. } => {
            assert_eq!(programs[2].process_id, 1);
            assert_eq!(programs[2].num_done_events, 3);
        }
        other => panic!("expected a program control init terminal, got {:?}", other),
    }

    assert!(matches!(
        group.load_section_offset(0, 0),
        Err(PsysError::TerminalKind { index: 0, .. })
    ));
    Ok(())
}

#[test]
fn test_state_machine() -> Result<(), Box<dyn Error>> {
    let mut group = create(&[0, 1, 2], 1)?;
    assert_eq!(group.state(), ProcessGroupState::Ready);

    // Running requires a submitted and started group.
    assert!(matches!(
        group.command(Command::Run),
        Err(PsysError::InvalidState { .. })
    ));
    assert_eq!(group.state(), ProcessGroupState::Ready);

    assert_eq!(group.command(Command::Submit)?, ProcessGroupState::Blocked);
    assert_eq!(group.command(Command::Start)?, ProcessGroupState::Started);
    assert!(group
        .processes()?
        .iter()
        .all(|p| p.state == ProcessState::Started));
    assert_eq!(group.command(Command::Run)?, ProcessGroupState::Running);
    assert_eq!(group.command(Command::Suspend)?, ProcessGroupState::Stalled);
    assert!(group.command(Command::Suspend).is_err());
    assert_eq!(group.command(Command::Resume)?, ProcessGroupState::Running);
    group.set_fragment_state(1)?;
    assert_eq!(group.command(Command::Stop)?, ProcessGroupState::Stopped);
    assert!(group
        .processes()?
        .iter()
        .all(|p| p.state == ProcessState::Stopped));
    assert!(group.command(Command::Start).is_err());

    assert_eq!(group.command(Command::Reset)?, ProcessGroupState::Ready);
    assert_eq!(group.fragment_state(), 0);
    assert!(group
        .processes()?
        .iter()
        .all(|p| p.state == ProcessState::Ready));

    group.command(Command::Submit)?;
    assert_eq!(group.command(Command::Disown)?, ProcessGroupState::Running);
    assert_eq!(group.command(Command::Abort)?, ProcessGroupState::Stopped);

    // The state survives a copy of the blob.
    let copy = ProcessGroup::from_bytes(group.as_bytes().to_vec())?;
    assert_eq!(copy.state(), ProcessGroupState::Stopped);

    Ok(())
}

#[test]
fn test_fragments() -> Result<(), Box<dyn Error>> {
    let mut group = create(&[0, 1, 2], 4)?;
    assert!(group.set_fragment_limit(5).is_err());
    group.set_fragment_limit(2)?;
    assert_eq!(group.fragment_limit(), 2);
    assert!(group.set_fragment_state(3).is_err());
    group.set_fragment_state(2)?;
    assert!(group.set_fragment_limit(1).is_err());
    Ok(())
}

#[test]
fn test_legacy_buffers() -> Result<(), Box<dyn Error>> {
    let mut group = create(&[0, 1, 2], 1)?;

    group.attach_buffer(0, 0x1000_0000, BufferState::Full)?;
    group.attach_buffer(2, 0x2000_0000, BufferState::Full)?;
    assert_eq!(group.terminal_buffer(0)?, 0x1000_0000);
    assert_eq!(group.terminal_buffer(2)?, 0x2000_0000);
    assert_eq!(group.terminal_buffer_index(0)?, NO_BUFFER_INDEX);
    match group.terminal(0)? {
        Terminal::Data { record, .. } => {
            assert_eq!(record.frame.buffer_state()?, BufferState::Full)
        }
        other => panic!("expected a data terminal, got {:?}", other),
    }

    assert_eq!(group.detach_buffer(0)?, 0x1000_0000);
    assert_eq!(group.terminal_buffer(0)?, 0);
    match group.terminal(0)? {
        Terminal::Data { record, .. } => {
            assert_eq!(record.frame.buffer_state()?, BufferState::Null)
        }
        other => panic!("expected a data terminal, got {:?}", other),
    }

    group.command(Command::Submit)?;
    assert!(matches!(
        group.attach_buffer(1, 0x3000_0000, BufferState::Empty),
        Err(PsysError::InvalidState { .. })
    ));
    assert!(group.detach_buffer(2).is_err());
    // Direct writes ignore the state.
    group.set_terminal_buffer(1, 0x4000_0000)?;
    assert_eq!(group.terminal_buffer(1)?, 0x4000_0000);
    assert!(group.terminal_buffer(9).is_err());

    Ok(())
}

#[test]
fn test_buffer_set() -> Result<(), Box<dyn Error>> {
    let manifest = pipeline()?;
    let param = pipeline_param(&manifest, &[0, 1, 2], 1)?.with_protocol(Protocol::Ppg);
    let mut group = ProcessGroup::create(&manifest, &param, &ProcessGroupConfig::default())?;
    assert_eq!(group.protocol(), Protocol::Ppg);
    group.set_token(0xfeed)?;
    group.set_ipu_virtual_address(0x8000_0000)?;
    group.set_routing_bitmap(RoutingBitmap::from_indices([3]))?;

    group.attach_buffer(3, 0xdead_0000, BufferState::Empty)?;
    group.attach_buffer(5, 0xbeef_0000, BufferState::Empty)?;
    // Under the buffer set protocol the terminal records its slot only.
    assert_eq!(group.terminal_buffer(3)?, 0);
    assert_eq!(group.terminal_buffer_index(3)?, 3);
    assert_eq!(group.terminal_buffer_index(5)?, 5);

    let mut set = BufferSet::create(&group, 17)?;
    println!("{:?}", set);
    assert_eq!(set.as_bytes().len(), BufferSet::sizeof(&group));
    assert_eq!(BufferSet::sizeof(&group), 120 + 9 * 8);
    assert_eq!(set.terminal_count(), 9);
    assert_eq!(set.token(), 0xfeed);
    assert_eq!(set.frame_counter(), 17);
    assert_eq!(set.process_group_handle(), 0x8000_0000);
    assert_eq!(set.kernel_enable_bitmap(), group.kernel_bitmap());
    assert_eq!(set.routing_enable_bitmap(), group.routing_bitmap());
    assert_eq!(set.terminal_enable_bitmap().weight(), 9);

    set.set_buffer(3, 0xdead_0000)?;
    set.set_buffer(5, 0xbeef_0000)?;
    set.set_compression(5, true)?;
    assert_eq!(set.get_buffer(&group.terminal(3)?)?, 0xdead_0000);
    assert_eq!(set.get_buffer(&group.terminal(5)?)?, 0xbeef_0000);
    assert_eq!(set.descriptor(5)?.enable_compression, 1);
    assert!(set.get_buffer(&group.terminal(0)?).is_err());
    assert!(set.set_buffer(9, 0).is_err());

    set.set_frame_counter(18)?;
    let copy = BufferSet::from_bytes(set.as_bytes().to_vec())?;
    assert_eq!(copy, set);
    assert_eq!(copy.frame_counter(), 18);
    assert!(BufferSet::from_bytes(&set.as_bytes()[..128]).is_err());

    Ok(())
}

#[test]
fn test_tokens_and_relocation() -> Result<(), Box<dyn Error>> {
    let mut group = create(&[0, 1, 2], 2)?;
    assert!(group.set_token(0).is_err());
    assert!(group.set_private_token(0).is_err());
    group.set_token(42)?;
    group.set_private_token(43)?;
    group.attach_buffer(1, 0x1234_5678, BufferState::NonEmpty)?;

    let copy = ProcessGroup::from_bytes(group.as_bytes().to_vec())?;
    assert_eq!(copy, group);
    assert_eq!(copy.token(), 42);
    assert_eq!(copy.private_token(), 43);
    assert_eq!(copy.terminal_buffer(1)?, 0x1234_5678);
    assert_eq!(copy.terminals()?, group.terminals()?);
    assert_eq!(copy.processes()?, group.processes()?);

    let truncated = &group.as_bytes()[..group.size() - 8];
    assert!(ProcessGroup::from_bytes(truncated).is_err());
    Ok(())
}

#[test]
fn test_cells() -> Result<(), Box<dyn Error>> {
    let mut description = ProgramGroupDescription::from_json(PIPELINE)?;
    description.programs[0].cell = Some(3);
    let manifest = description.compile()?;
    let param = pipeline_param(&manifest, &[0, 1, 2], 1)?;
    let mut group = ProcessGroup::create(&manifest, &param, &ProcessGroupConfig::default())?;

    assert_eq!(group.process(0)?.cell(), Some(3));
    assert!(group.resource_bitmap().is_set(3));

    assert!(group.set_process_cell(1, 3).is_err());
    assert!(group.set_process_cell(1, 32).is_err());
    group.set_process_cell(1, 5)?;
    assert_eq!(group.process(1)?.cell(), Some(5));
    assert!(group.resource_bitmap().is_set(5));
    assert!(group.set_process_cell(1, 6).is_err());

    // Cells are released once the group has been submitted.
    assert!(matches!(
        group.clear_process_cell(1),
        Err(PsysError::InvalidState { .. })
    ));
    group.command(Command::Submit)?;
    group.clear_process_cell(1)?;
    assert_eq!(group.process(1)?.cell(), None);
    assert!(!group.resource_bitmap().is_set(5));
    assert!(group.clear_process_cell(1).is_err());
    assert!(group.clear_process_cell(2).is_err());

    // Two fixed programs cannot share a cell.
    description.programs[1].cell = Some(3);
    let manifest = description.compile()?;
    let param = pipeline_param(&manifest, &[0, 1, 2], 1)?;
    assert!(ProcessGroup::create(&manifest, &param, &ProcessGroupConfig::default()).is_err());

    Ok(())
}
