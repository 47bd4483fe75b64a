// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_psys::{
    param::Protocol, process_group::ProcessGroupConfig, validate::ValidatorConfig,
};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

/// Terminal buffer protocol.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum ProtocolSetting {
    /// Terminals carry buffer addresses
    Legacy,
    /// Terminals carry buffer set indices
    Ppg,
}

impl From<ProtocolSetting> for Protocol {
    fn from(setting: ProtocolSetting) -> Self {
        match setting {
            ProtocolSetting::Legacy => Protocol::Legacy,
            ProtocolSetting::Ppg => Protocol::Ppg,
        }
    }
}

/// Command-line arguments for the PSYS layout tool.
///
/// The tool compiles a JSON program group description into a manifest,
/// validates it and optionally instantiates a process group and buffer set.
/// Arguments can be specified via command line or environment variables.
///
/// # Example
///
/// ```bash
/// # Validate a description
/// psys-tool --description isp.json --validate-only
///
/// # Instantiate kernels 0, 1 and 4 with two fragments and write the blobs
/// psys-tool --description isp.json --enable 0,1,4 --fragments 2 --output out/
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Program group description (JSON)
    #[arg(short, long, env = "DESCRIPTION")]
    pub description: PathBuf,

    /// Instantiation parameters (JSON), overrides --enable, --fragments and
    /// --protocol
    #[arg(long, env = "PARAM")]
    pub param: Option<PathBuf>,

    /// Kernel IDs to enable, comma separated (default: every kernel)
    #[arg(long, env = "ENABLE", value_delimiter = ',')]
    pub enable: Vec<usize>,

    /// Number of fragments per frame
    #[arg(long, env = "FRAGMENTS", default_value = "1")]
    pub fragments: u16,

    /// Terminal buffer protocol
    #[arg(long, env = "PROTOCOL", default_value = "legacy", value_enum)]
    pub protocol: ProtocolSetting,

    /// Process group token
    #[arg(long, env = "TOKEN")]
    pub token: Option<u64>,

    /// Frame counter stored in the buffer set
    #[arg(long, env = "FRAME_COUNTER", default_value = "0")]
    pub frame_counter: u32,

    /// Relax the validator for graphs from the simplified graph model
    #[arg(long, env = "SIMPLIFIED_GRAPH_MODEL")]
    pub simplified_graph_model: bool,

    /// Fail on data terminal formats without a plane layout
    #[arg(long, env = "STRICT_FORMATS")]
    pub strict_formats: bool,

    /// Stop after validating the manifest
    #[arg(long)]
    pub validate_only: bool,

    /// Directory to write manifest.bin, process_group.bin and buffer_set.bin
    #[arg(short, long, env = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable Tracy profiler for performance analysis
    #[arg(long, env = "TRACY")]
    pub tracy: bool,

    /// Log level
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub rust_log: LevelFilter,
}

impl From<&Args> for ValidatorConfig {
    fn from(args: &Args) -> Self {
        ValidatorConfig {
            simplified_graph_model: args.simplified_graph_model,
        }
    }
}

impl From<&Args> for ProcessGroupConfig {
    fn from(args: &Args) -> Self {
        ProcessGroupConfig {
            strict_frame_formats: args.strict_formats,
            validator: args.into(),
        }
    }
}
