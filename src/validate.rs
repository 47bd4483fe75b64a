// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Semantic validation of program group manifests.
//!
//! Manifests usually come from an offline generator and may be legitimately
//! invalid. [`GraphValidator::validate`] never panics; it returns the first
//! rule that failed as a [`ValidationError`].
//!
//! The rules cover three areas:
//!
//! - **Header and terminals**: non-zero ID, alignment and counts; data
//!   terminals owned by exactly one known kernel; dense terminal IDs and
//!   well-formed associations.
//! - **Program taxonomy**: sub programs depend on exactly one super of the
//!   matching kind and cover a strict subset of its kernels; sibling subs
//!   and super/sub pairs are checked pairwise; non-sub programs never
//!   depend on exclusive or virtual subs.
//! - **Ownership**: the union of program kernel bitmaps equals the declared
//!   total, and each terminal is claimed by at most one program that runs on
//!   its own.

use crate::{
    bitmap::{KernelBitmap, TerminalBitmap},
    manifest::{
        ProgramGroupManifest, ProgramManifest, ProgramType, TerminalDirection, TerminalManifest,
        INVALID_TERMINAL_ID,
    },
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// A failed validation rule.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("manifest could not be read: {0}")]
    Malformed(String),

    #[error("manifest size is zero")]
    ZeroSize,

    #[error("manifest alignment is zero")]
    ZeroAlignment,

    #[error("program group ID is zero")]
    ZeroId,

    #[error("manifest has no programs")]
    NoPrograms,

    #[error("manifest has no terminals")]
    NoTerminals,

    #[error("manifest kernel bitmap is empty")]
    EmptyKernelBitmap,

    #[error("terminal {terminal} has ID {id}")]
    TerminalId { terminal: usize, id: u8 },

    #[error("terminal {terminal} is associated with invalid terminal {assoc_id}")]
    TerminalAssociation { terminal: usize, assoc_id: u8 },

    /// A data terminal must belong to exactly one kernel of the group.
    #[error("data terminal {terminal} kernel bitmap {bitmap} is not a single known kernel")]
    DataTerminalKernel {
        terminal: usize,
        bitmap: KernelBitmap,
    },

    #[error("parameter terminal {terminal} references unknown kernel {kernel_id}")]
    ParamTerminalKernel { terminal: usize, kernel_id: u32 },

    #[error("program {program} kernel bitmap {bitmap} is empty or outside the group")]
    ProgramKernelBitmap {
        program: usize,
        bitmap: KernelBitmap,
    },

    #[error("program {program} has no program or terminal dependencies")]
    ProgramUnconnected { program: usize },

    #[error("sub program {program} has {count} program dependencies, expected 1")]
    SubDependencyCount { program: usize, count: usize },

    #[error("program {program} depends on program {dependency} which does not exist")]
    DependencyRange { program: usize, dependency: u8 },

    #[error("sub program {program} depends on more terminals than its super allows")]
    SubTerminalCount { program: usize },

    #[error("sub program {program} depends on a {actual} program, expected {expected}")]
    SuperType {
        program: usize,
        expected: ProgramType,
        actual: ProgramType,
    },

    #[error("sub program {program} kernels are not a strict subset of its super")]
    SubKernelBitmap { program: usize },

    #[error("program {program} depends on exclusive or virtual sub program {dependency}")]
    ExcludedDependency { program: usize, dependency: usize },

    #[error("programs {program} and {other} have overlapping kernels")]
    KernelOverlap { program: usize, other: usize },

    #[error("sub programs {program} and {other} of the same kind are inconsistent")]
    SiblingSubs { program: usize, other: usize },

    #[error("super program {program} and sub program {other} are inconsistent")]
    SuperSub { program: usize, other: usize },

    #[error("super programs {program} and {other} have equal kernels")]
    SuperOverlap { program: usize, other: usize },

    #[error("program {program} depends on terminal {terminal} which does not exist")]
    TerminalDependencyRange { program: usize, terminal: u8 },

    #[error("terminal {terminal} claimed by program {program} is already owned")]
    TerminalOwnership { program: usize, terminal: u8 },

    #[error("declared kernel bitmap {declared} differs from program union {computed}")]
    KernelUnion {
        declared: KernelBitmap,
        computed: KernelBitmap,
    },

    #[error("{owned} terminals have an owning program, expected {expected}")]
    TerminalCount { owned: u32, expected: i64 },
}

/// Validator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Relax the kernel overlap, singular intersection and terminal
    /// ownership rules for graphs produced by the simplified graph model.
    #[serde(default)]
    pub simplified_graph_model: bool,
}

/// Tallies of terminals whose ownership is implied by their type.
#[derive(Debug, Default)]
struct ImplicitTerminals {
    param_in: i64,
    param_out: i64,
    program: i64,
    sequencer_info: i64,
    program_control_init: i64,
}

impl ImplicitTerminals {
    fn any(&self) -> bool {
        self.param_in != 0
            || self.param_out != 0
            || self.program != 0
            || self.program_control_init != 0
    }

    fn skipped(&self) -> i64 {
        self.param_in + self.param_out + self.program - self.sequencer_info
            + self.program_control_init
    }
}

/// Whole-manifest semantic validation.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphValidator {
    config: ValidatorConfig,
}

macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}

impl GraphValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// True when `manifest` passes every rule.
    pub fn is_valid(&self, manifest: &ProgramGroupManifest) -> bool {
        self.validate(manifest).is_ok()
    }

    /// Check every rule and report the first failure.
    pub fn validate(&self, manifest: &ProgramGroupManifest) -> Result<(), ValidationError> {
        let result = self.check(manifest);
        if let Err(err) = &result {
            debug!("manifest {} failed validation: {}", manifest.id(), err);
        }
        result
    }

    fn check(&self, manifest: &ProgramGroupManifest) -> Result<(), ValidationError> {
        let simplified = self.config.simplified_graph_model;

        ensure!(manifest.size() != 0, ValidationError::ZeroSize);
        ensure!(manifest.alignment() != 0, ValidationError::ZeroAlignment);
        ensure!(manifest.id() != 0, ValidationError::ZeroId);

        let program_count = manifest.program_count();
        let terminal_count = manifest.terminal_count();
        let total = manifest.kernel_bitmap();

        ensure!(program_count != 0, ValidationError::NoPrograms);
        ensure!(terminal_count != 0, ValidationError::NoTerminals);
        ensure!(!total.is_empty(), ValidationError::EmptyKernelBitmap);

        let terminals = manifest
            .terminals()
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;
        let programs = manifest
            .programs()
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;

        let implicit = Self::check_terminals(&terminals, total)?;

        let mut check_bitmap = KernelBitmap::clear();
        let mut owned = TerminalBitmap::clear();

        for (i, program_i) in programs.iter().enumerate() {
            let bitmap_i = program_i.kernel_bitmap();
            ensure!(
                !bitmap_i.is_empty() && bitmap_i.is_subset(&total),
                ValidationError::ProgramKernelBitmap {
                    program: i,
                    bitmap: bitmap_i,
                }
            );
            ensure!(
                program_i.program_dependency_count() + program_i.terminal_dependency_count() != 0,
                ValidationError::ProgramUnconnected { program: i }
            );

            if program_i.program_type().is_sub() {
                self.check_sub(i, program_i, &programs)?;
            } else {
                self.check_non_sub(i, program_i, &programs)?;
            }

            for (j, program_j) in programs.iter().enumerate() {
                if i != j {
                    self.check_pair(program_count, i, program_i, j, program_j)?;
                }
            }

            check_bitmap = check_bitmap.union(bitmap_i);

            for &terminal in &program_i.terminal_dependencies {
                ensure!(
                    (terminal as usize) < terminal_count,
                    ValidationError::TerminalDependencyRange {
                        program: i,
                        terminal,
                    }
                );
                if program_i.program_type().is_excluded_sub() {
                    continue;
                }
                let claimed = owned.set_unique(terminal as usize);
                if claimed.is_empty() {
                    ensure!(
                        simplified,
                        ValidationError::TerminalOwnership {
                            program: i,
                            terminal,
                        }
                    );
                } else {
                    owned = claimed;
                }
            }
        }

        ensure!(
            total == check_bitmap,
            ValidationError::KernelUnion {
                declared: total,
                computed: check_bitmap,
            }
        );

        let weight = owned.weight();
        if implicit.any() {
            let expected = terminal_count as i64 - implicit.skipped();
            ensure!(
                simplified || i64::from(weight) == expected,
                ValidationError::TerminalCount {
                    owned: weight,
                    expected,
                }
            );
        } else {
            ensure!(
                weight as usize == terminal_count,
                ValidationError::TerminalCount {
                    owned: weight,
                    expected: terminal_count as i64,
                }
            );
        }

        Ok(())
    }

    fn check_terminals(
        terminals: &[TerminalManifest],
        total: KernelBitmap,
    ) -> Result<ImplicitTerminals, ValidationError> {
        let mut implicit = ImplicitTerminals::default();
        let mut param_kernels = KernelBitmap::clear();

        for (index, terminal) in terminals.iter().enumerate() {
            let header = terminal.header();
            ensure!(
                header.id as usize == index,
                ValidationError::TerminalId {
                    terminal: index,
                    id: header.id,
                }
            );

            if header.assoc_id != INVALID_TERMINAL_ID {
                let paired = terminals.get(header.assoc_id as usize);
                ensure!(
                    paired.is_some_and(|p| {
                        p.terminal_type().direction() != terminal.terminal_type().direction()
                    }),
                    ValidationError::TerminalAssociation {
                        terminal: index,
                        assoc_id: header.assoc_id,
                    }
                );
            }

            let kernel_id = match terminal {
                TerminalManifest::Data(record) => {
                    let bitmap = record.kernel_bitmap;
                    ensure!(
                        !bitmap.is_empty() && bitmap.is_subset(&total) && bitmap.is_onehot(),
                        ValidationError::DataTerminalKernel {
                            terminal: index,
                            bitmap,
                        }
                    );
                    None
                }
                TerminalManifest::Param { .. } => {
                    if terminal.terminal_type().direction() == TerminalDirection::In {
                        implicit.param_in += 1;
                    } else {
                        implicit.param_out += 1;
                    }
                    None
                }
                TerminalManifest::Program { record, .. } => {
                    implicit.program += 1;
                    implicit.sequencer_info += i64::from(record.sequencer_info_count);
                    None
                }
                TerminalManifest::ProgramControlInit { .. } => {
                    implicit.program_control_init += 1;
                    None
                }
                TerminalManifest::Spatial { record, .. } => Some(u32::from(record.kernel_id)),
                TerminalManifest::Sliced { record, .. } => Some(u32::from(record.kernel_id)),
            };

            if let Some(kernel_id) = kernel_id {
                ensure!(
                    (kernel_id as usize) < KernelBitmap::BITS,
                    ValidationError::ParamTerminalKernel {
                        terminal: index,
                        kernel_id,
                    }
                );
                param_kernels = param_kernels.set(kernel_id as usize);
                ensure!(
                    param_kernels.is_subset(&total),
                    ValidationError::ParamTerminalKernel {
                        terminal: index,
                        kernel_id,
                    }
                );
            }
        }

        Ok(implicit)
    }

    fn check_sub(
        &self,
        i: usize,
        program_i: &ProgramManifest,
        programs: &[ProgramManifest],
    ) -> Result<(), ValidationError> {
        let count = program_i.program_dependency_count();
        ensure!(
            count == 1,
            ValidationError::SubDependencyCount { program: i, count }
        );

        let dependency = program_i.program_dependencies[0];
        let super_k = programs
            .get(dependency as usize)
            .ok_or(ValidationError::DependencyRange {
                program: i,
                dependency,
            })?;

        let type_i = program_i.program_type();
        if type_i.is_excluded_sub() {
            ensure!(
                program_i.terminal_dependency_count() <= super_k.terminal_dependency_count(),
                ValidationError::SubTerminalCount { program: i }
            );
        } else {
            ensure!(
                program_i.terminal_dependency_count() == 0,
                ValidationError::SubTerminalCount { program: i }
            );
        }

        if let Some(expected) = type_i.super_type() {
            ensure!(
                super_k.program_type() == expected,
                ValidationError::SuperType {
                    program: i,
                    expected,
                    actual: super_k.program_type(),
                }
            );
        }

        let bitmap_i = program_i.kernel_bitmap();
        let bitmap_k = super_k.kernel_bitmap();
        ensure!(
            bitmap_i != bitmap_k && bitmap_i.is_subset(&bitmap_k),
            ValidationError::SubKernelBitmap { program: i }
        );

        Ok(())
    }

    fn check_non_sub(
        &self,
        i: usize,
        program_i: &ProgramManifest,
        programs: &[ProgramManifest],
    ) -> Result<(), ValidationError> {
        for &dependency in &program_i.program_dependencies {
            let program_k =
                programs
                    .get(dependency as usize)
                    .ok_or(ValidationError::DependencyRange {
                        program: i,
                        dependency,
                    })?;
            ensure!(
                !program_k.program_type().is_excluded_sub(),
                ValidationError::ExcludedDependency {
                    program: i,
                    dependency: dependency as usize,
                }
            );
            ensure!(
                self.config.simplified_graph_model
                    || !program_i.kernel_bitmap().intersects(&program_k.kernel_bitmap()),
                ValidationError::KernelOverlap {
                    program: i,
                    other: dependency as usize,
                }
            );
        }
        Ok(())
    }

    fn check_pair(
        &self,
        program_count: usize,
        i: usize,
        program_i: &ProgramManifest,
        j: usize,
        program_j: &ProgramManifest,
    ) -> Result<(), ValidationError> {
        let simplified = self.config.simplified_graph_model;
        let type_i = program_i.program_type();
        let type_j = program_j.program_type();
        let bitmap_i = program_i.kernel_bitmap();
        let bitmap_j = program_j.kernel_bitmap();
        let dep_i0 = program_i.program_dependency(0).map(usize::from);
        let dep_j0 = program_j.program_dependency(0).map(usize::from);
        let j_subset_i = bitmap_j.is_subset(&bitmap_i);
        let i_subset_j = bitmap_i.is_subset(&bitmap_j);

        ensure!(
            !bitmap_j.is_empty(),
            ValidationError::ProgramKernelBitmap {
                program: j,
                bitmap: bitmap_j,
            }
        );

        // Sibling subs of the same kind.
        if type_i.is_sub() && type_i == type_j {
            let sibling = ValidationError::SiblingSubs {
                program: i,
                other: j,
            };
            ensure!(program_j.program_dependency_count() == 1, sibling);
            ensure!(dep_i0 != Some(i) && dep_j0 != Some(i), sibling);

            if dep_i0 == dep_j0 {
                if type_i != ProgramType::VirtualSub {
                    ensure!(j_subset_i || i_subset_j, sibling);
                }
                // Parallel siblings cover the same kernels, exclusive and
                // virtual siblings never do.
                ensure!((j_subset_i && i_subset_j) ^ type_i.is_excluded_sub(), sibling);
            }
            if type_i.is_excluded_sub() && bitmap_i == bitmap_j {
                ensure!(dep_i0 != dep_j0, sibling);
            }
        }

        // A super and a sub of the matching kind.
        if type_i.sub_type() == Some(type_j) {
            let pair = ValidationError::SuperSub {
                program: i,
                other: j,
            };
            ensure!(program_j.program_dependency_count() == 1, pair);
            ensure!(!i_subset_j, pair);
            if dep_j0 == Some(i) {
                ensure!(dep_i0 != dep_j0 && type_i.is_super() && j_subset_i, pair);
            }
        }

        // Programs that depend on program i.
        for &dependency in &program_j.program_dependencies {
            ensure!(
                (dependency as usize) < program_count,
                ValidationError::DependencyRange {
                    program: j,
                    dependency,
                }
            );
            if dependency as usize == i {
                ensure!(
                    !type_i.is_excluded_sub(),
                    ValidationError::ExcludedDependency {
                        program: j,
                        dependency: i,
                    }
                );
                ensure!(
                    simplified || (!bitmap_i.intersects(&bitmap_j) ^ type_j.is_sub()),
                    ValidationError::KernelOverlap {
                        program: j,
                        other: i,
                    }
                );
            }
        }

        if bitmap_i.intersects(&bitmap_j) {
            let overlap = ValidationError::KernelOverlap {
                program: i,
                other: j,
            };
            ensure!(
                simplified || !(type_i.is_singular() || type_j.is_singular()),
                overlap
            );
            if type_j != ProgramType::VirtualSub {
                ensure!(simplified || j_subset_i || i_subset_j, overlap);
            }
            if type_i.is_super() && type_j.is_super() {
                ensure!(
                    bitmap_i != bitmap_j,
                    ValidationError::SuperOverlap {
                        program: i,
                        other: j,
                    }
                );
            }
        }

        Ok(())
    }
}

/// Validate `manifest` with `config`.
pub fn validate(
    manifest: &ProgramGroupManifest,
    config: &ValidatorConfig,
) -> Result<(), ValidationError> {
    GraphValidator::new(*config).validate(manifest)
}

/// True when `manifest` passes validation with `config`.
pub fn is_valid(manifest: &ProgramGroupManifest, config: &ValidatorConfig) -> bool {
    validate(manifest, config).is_ok()
}

impl ProgramGroupManifest {
    /// Validate this manifest with `config`.
    pub fn validate(&self, config: &ValidatorConfig) -> Result<(), ValidationError> {
        validate(self, config)
    }

    pub fn is_valid(&self, config: &ValidatorConfig) -> bool {
        is_valid(self, config)
    }
}
