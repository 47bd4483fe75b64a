// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_psys::{
    bitmap::KernelBitmap,
    blob::{Record, ALIGNMENT},
    description::ProgramGroupDescription,
    format::FrameFormat,
    manifest::{
        DataTerminalManifest, ManifestHeader, ManifestShape, ParamManifestSection,
        ParamTerminalManifest, ProgramGroupManifest, ProgramShape, ProgramType, SectionInfo,
        TerminalDirection, TerminalManifest, TerminalShape, TerminalType, INVALID_TERMINAL_ID,
        NO_CELL,
    },
    Error as PsysError,
};
use std::error::Error;

fn every_kind() -> ManifestShape {
    ManifestShape {
        programs: vec![ProgramShape::new(0, 3), ProgramShape::new(1, 2)],
        terminals: vec![
            TerminalShape::Data {
                direction: TerminalDirection::In,
            },
            TerminalShape::Param {
                direction: TerminalDirection::In,
                section_count: 3,
            },
            TerminalShape::Spatial {
                direction: TerminalDirection::Out,
                section_count: 1,
            },
            TerminalShape::Sliced {
                direction: TerminalDirection::In,
                section_count: 2,
            },
            TerminalShape::Program {
                fragment_param_section_count: 2,
                sequencer_info_count: 1,
            },
            TerminalShape::ProgramControlInit { program_count: 2 },
        ],
        private_data_size: 13,
        rbm_manifest_size: 4,
    }
}

#[test]
fn test_layout_sizes() -> Result<(), Box<dyn Error>> {
    let shape = ManifestShape {
        programs: vec![ProgramShape::new(0, 2)],
        terminals: vec![
            TerminalShape::Data {
                direction: TerminalDirection::In,
            },
            TerminalShape::Data {
                direction: TerminalDirection::Out,
            },
            TerminalShape::Param {
                direction: TerminalDirection::In,
                section_count: 2,
            },
        ],
        private_data_size: 5,
        rbm_manifest_size: 12,
    };

    // header 40, program 42 -> 48, data 64 + 64, param 24 + 2 * 8,
    // private 5 -> 8, rbm 12 -> 16
    assert_eq!(ProgramGroupManifest::sizeof(&shape)?, 280);

    let manifest = ProgramGroupManifest::new(&shape)?;
    println!("{}", manifest);
    let header = manifest.header();
    assert_eq!(manifest.size(), 280);
    assert_eq!(header.program_manifest_offset, 40);
    assert_eq!(header.terminal_manifest_offset, 88);
    assert_eq!(header.private_data_offset, 256);
    assert_eq!(header.rbm_manifest_offset, 264);
    assert_eq!(manifest.alignment() as usize, ALIGNMENT);
    assert_eq!(manifest.private_data()?.len(), 8);
    assert_eq!(manifest.rbm_manifest()?.len(), 16);
    assert_eq!(manifest.shape()?.programs, shape.programs);
    assert_eq!(manifest.shape()?.terminals, shape.terminals);

    Ok(())
}

#[test]
fn test_fresh_records() -> Result<(), Box<dyn Error>> {
    let shape = every_kind();
    let manifest = ProgramGroupManifest::new(&shape)?;
    assert_eq!(manifest.size(), ProgramGroupManifest::sizeof(&shape)?);
    assert_eq!(manifest.id(), 1);
    assert_eq!(manifest.subgraph_count(), 1);
    assert!(manifest.kernel_bitmap().is_empty());

    for (index, program) in manifest.programs()?.iter().enumerate() {
        assert_eq!(program.program_type(), ProgramType::Singular);
        assert_eq!(program.cell_id(), NO_CELL);
        assert_eq!(program.header.parent_offset, -(program.offset as i32));
        assert_eq!(program.offset, manifest.program_offset(index)?);
        assert!(program.kernel_bitmap().is_empty());
    }

    let mut previous = 0;
    for (index, terminal) in manifest.terminals()?.iter().enumerate() {
        let offset = manifest.terminal_offset(index)?;
        let header = terminal.header();
        assert!(offset > previous);
        assert_eq!(offset % ALIGNMENT, 0);
        assert_eq!(header.parent_offset, -(offset as i32));
        assert_eq!(header.id as usize, index);
        assert_eq!(header.assoc_id, INVALID_TERMINAL_ID);
        assert_eq!(header.max_payload_size, u32::MAX);
        assert_eq!(terminal.terminal_type(), shape.terminals[index].terminal_type());
        assert_eq!(header.size as usize, shape.terminals[index].sizeof());
        previous = offset;
    }

    assert!(matches!(
        manifest.terminal(1)?,
        TerminalManifest::Param { ref sections, .. } if sections.len() == 3
    ));
    assert_eq!(manifest.terminal(0)?.terminal_type(), TerminalType::DataIn);
    assert_eq!(
        manifest.terminal(2)?.terminal_type(),
        TerminalType::ParamSpatialOut
    );

    Ok(())
}

#[test]
fn test_overflow() -> Result<(), Box<dyn Error>> {
    let shape = ManifestShape {
        programs: vec![ProgramShape::new(0, 1); 256],
        ..Default::default()
    };
    assert!(matches!(
        ProgramGroupManifest::sizeof(&shape),
        Err(PsysError::Overflow { .. })
    ));

    let shape = ManifestShape {
        private_data_size: 70000,
        ..Default::default()
    };
    assert!(matches!(
        ProgramGroupManifest::new(&shape),
        Err(PsysError::Overflow { .. })
    ));
    Ok(())
}

#[test]
fn test_setters() -> Result<(), Box<dyn Error>> {
    let mut manifest = ProgramGroupManifest::new(&every_kind())?;
    manifest.set_id(99)?;
    manifest.set_program_id(0, 7)?;
    manifest.set_program_type(1, ProgramType::ParallelSub)?;
    manifest.set_program_kernel_bitmap(0, KernelBitmap::from_indices([2, 3]))?;
    manifest.set_program_kernel_bitmap(1, KernelBitmap::from_indices([3]))?;
    manifest.set_program_dependency(1, 0, 0)?;
    manifest.set_terminal_dependency(0, 2, 5)?;
    assert_eq!(manifest.update_kernel_bitmap()?, KernelBitmap::from_indices([2, 3]));
    assert_eq!(manifest.header().kernel_count, 2);

    let program = manifest.program(1)?;
    assert_eq!(program.program_type(), ProgramType::ParallelSub);
    assert_eq!(program.program_dependencies, vec![0]);
    assert_eq!(manifest.program(0)?.terminal_dependencies, vec![0, 0, 5]);
    assert_eq!(manifest.program(0)?.id(), 7);

    // Dependencies must name existing members and fit the reserved slots.
    assert!(manifest.set_program_dependency(1, 0, 2).is_err());
    assert!(manifest.set_program_dependency(1, 1, 0).is_err());
    assert!(manifest.set_terminal_dependency(0, 0, 6).is_err());
    assert!(manifest.set_terminal_dependency(1, 2, 0).is_err());

    manifest.update_terminal(0, |r: &mut DataTerminalManifest| {
        r.kernel_bitmap = KernelBitmap::bit_mask(2);
        r.frame_format_bitmap = FrameFormat::bitmap(&[FrameFormat::Nv12]);
    })?;
    match manifest.terminal(0)? {
        TerminalManifest::Data(record) => {
            assert_eq!(record.kernel_bitmap, KernelBitmap::bit_mask(2));
            assert_eq!(record.frame_format_bitmap, 1 << FrameFormat::Nv12.raw());
        }
        other => panic!("expected a data terminal, got {:?}", other),
    }

    // Wrong record kind and layout fields are rejected.
    assert!(matches!(
        manifest.update_terminal(0, |_: &mut ParamTerminalManifest| ()),
        Err(PsysError::TerminalKind { index: 0, .. })
    ));
    assert!(manifest
        .update_terminal(1, |r: &mut ParamTerminalManifest| r.section_count = 9)
        .is_err());
    assert!(manifest
        .update_terminal(1, |r: &mut ParamTerminalManifest| r.base.size += 8)
        .is_err());

    let info = SectionInfo {
        kernel_id: 3,
        region_id: 1,
        mem_type: 2,
    };
    manifest.set_param_section(1, 2, ParamManifestSection::new(4096, info))?;
    assert!(manifest
        .set_param_section(1, 3, ParamManifestSection::new(1, info))
        .is_err());
    assert!(manifest
        .set_param_section(0, 0, ParamManifestSection::new(1, info))
        .is_err());
    match manifest.terminal(1)? {
        TerminalManifest::Param { sections, .. } => {
            assert_eq!(sections[2].max_mem_size, 4096);
            assert_eq!(sections[2].info(), info);
        }
        other => panic!("expected a param terminal, got {:?}", other),
    }

    // Param in pairs with the spatial out terminal, connect terminals never
    // initiate a pairing.
    manifest.set_terminal_connect_id(1, 2)?;
    assert_eq!(manifest.terminal_header(1)?.assoc_id, 2);
    assert!(manifest.set_terminal_connect_id(2, 1).is_err());
    manifest.set_terminal_connect_id(1, INVALID_TERMINAL_ID)?;

    manifest.private_data_mut()?[..4].copy_from_slice(&[1, 2, 3, 4]);
    assert_eq!(&manifest.private_data()?[..4], &[1, 2, 3, 4]);

    Ok(())
}

#[test]
fn test_relocation() -> Result<(), Box<dyn Error>> {
    let mut manifest = ProgramGroupManifest::new(&every_kind())?;
    manifest.set_id(1234)?;
    manifest.set_program_id(1, 55)?;
    manifest.set_terminal_dependency(1, 1, 4)?;

    // A copy at a different address is a complete deserialization.
    let copy: Vec<u8> = manifest.as_bytes().to_vec();
    let moved = ProgramGroupManifest::from_bytes(copy)?;
    assert_eq!(moved, manifest);
    assert_eq!(moved.id(), 1234);
    assert_eq!(moved.program(1)?.id(), 55);
    assert_eq!(moved.program(1)?.terminal_dependencies, vec![0, 4]);
    assert_eq!(moved.terminals()?, manifest.terminals()?);

    let truncated = &manifest.as_bytes()[..manifest.size() - 8];
    assert!(matches!(
        ProgramGroupManifest::from_bytes(truncated),
        Err(PsysError::LayoutMismatch { .. })
    ));

    // Growing a terminal breaks the tiling of the terminal section.
    let mut corrupt = manifest.as_bytes().to_vec();
    let at = manifest.terminal_offset(0)? + 4;
    let size = u16::from_le_bytes([corrupt[at], corrupt[at + 1]]) + 8;
    corrupt[at..at + 2].copy_from_slice(&size.to_le_bytes());
    assert!(ProgramGroupManifest::from_bytes(corrupt).is_err());

    assert!(ProgramGroupManifest::from_bytes(&manifest.as_bytes()[..ManifestHeader::SIZE - 1])
        .is_err());

    Ok(())
}

#[test]
fn test_description() -> Result<(), Box<dyn Error>> {
    let description = ProgramGroupDescription::from_json(
        r#"{
            "id": 300,
            "programs": [
                { "id": 1, "type": "parallel_super", "kernels": [0, 1],
                  "terminal_dependencies": [0, 1] },
                { "id": 2, "type": "parallel_sub", "kernels": [0],
                  "program_dependencies": [0], "cell": 4 }
            ],
            "terminals": [
                { "kind": "data", "direction": "in", "kernel": 0,
                  "formats": ["nv12", "yuv420"],
                  "size": { "min": [16, 16], "max": [1920, 1080] } },
                { "kind": "param", "direction": "in",
                  "sections": [{ "max_mem_size": 512, "kernel": 1 }] }
            ],
            "private_data_size": 8
        }"#,
    )?;

    let manifest = description.compile()?;
    println!("{}", manifest);
    assert_eq!(manifest.id(), 300);
    assert_eq!(manifest.kernel_bitmap(), KernelBitmap::from_indices([0, 1]));
    assert_eq!(manifest.program(0)?.program_type(), ProgramType::ParallelSuper);
    assert_eq!(manifest.program(1)?.cell_id(), 4);
    assert!(manifest.program(1)?.has_fixed_cell());
    assert_eq!(manifest.terminal(1)?.terminal_type(), TerminalType::ParamCachedIn);

    match manifest.terminal(0)? {
        TerminalManifest::Data(record) => {
            assert_eq!(
                record.frame_format_bitmap,
                (1 << FrameFormat::Nv12.raw()) | (1 << FrameFormat::Yuv420.raw())
            );
            assert_eq!(record.max_size, [1920, 1080]);
        }
        other => panic!("expected a data terminal, got {:?}", other),
    }

    let json = description.to_json()?;
    assert_eq!(ProgramGroupDescription::from_json(&json)?, description);

    // A data terminal kernel must fit the kernel bitmap.
    let mut wide = description.clone();
    wide.terminals[0] =
        serde_json::from_str(r#"{ "kind": "data", "direction": "in", "kernel": 200 }"#)?;
    assert!(wide.compile().is_err());

    Ok(())
}
