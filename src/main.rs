// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::Args;
use clap::Parser;
use edgefirst_psys::{
    bitmap::KernelBitmap,
    description::ProgramGroupDescription,
    param::ProgramGroupParam,
    process_group::{ProcessGroupConfig, Terminal},
    validate::ValidatorConfig,
    BufferSet, ProcessGroup, ProgramGroupManifest,
};
use std::{error::Error, fs, path::Path};
use tracing::{debug, error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, Layer, Registry};

fn init_tracing(args: &Args) -> Result<(), Box<dyn Error>> {
    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        args.rust_log
    };

    let stdout = tracing_subscriber::fmt::layer().with_filter(level);
    let journald = tracing_journald::layer()
        .ok()
        .map(|layer| layer.with_filter(level));
    let tracy = if args.tracy {
        tracy_client::Client::start();
        Some(tracing_tracy::TracyLayer::default().with_filter(level))
    } else {
        None
    };

    let subscriber = Registry::default().with(stdout).with(journald).with(tracy);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

fn load_param(
    args: &Args,
    manifest: &ProgramGroupManifest,
) -> Result<ProgramGroupParam, Box<dyn Error>> {
    if let Some(path) = &args.param {
        let param: ProgramGroupParam = serde_json::from_str(&fs::read_to_string(path)?)?;
        return Ok(param);
    }

    let enable = if args.enable.is_empty() {
        manifest.kernel_bitmap()
    } else {
        KernelBitmap::from_indices(args.enable.iter().copied())
    };
    Ok(ProgramGroupParam::new(manifest, enable, args.fragments)
        .with_protocol(args.protocol.into()))
}

fn write_blob(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), Box<dyn Error>> {
    let path = dir.join(name);
    fs::write(&path, bytes)?;
    info!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(&args)?;

    let description = ProgramGroupDescription::from_path(&args.description)?;
    let manifest = description.compile()?;
    info!("{}", manifest);

    let validator = ValidatorConfig::from(&args);
    if let Err(err) = manifest.validate(&validator) {
        error!("{} is not valid: {}", args.description.display(), err);
        return Err(err.into());
    }
    info!("manifest {} is valid", manifest.id());

    if let Some(dir) = &args.output {
        fs::create_dir_all(dir)?;
        write_blob(dir, "manifest.bin", manifest.as_bytes())?;
    }
    if args.validate_only {
        return Ok(());
    }

    let param = load_param(&args, &manifest)?;
    let config = ProcessGroupConfig::from(&args);
    let mut group = ProcessGroup::create(&manifest, &param, &config)?;
    if let Some(token) = args.token {
        group.set_token(token)?;
    }
    info!(
        "process group {}: {} bytes, {} processes, {} terminals, enable {}",
        group.id(),
        group.size(),
        group.process_count(),
        group.terminal_count(),
        group.kernel_bitmap()
    );

    for process in group.processes()? {
        debug!(
            "process {} program {} kernels {} cell {:?}",
            process.id(),
            process.program_idx(),
            process.kernel_bitmap(),
            process.cell()
        );
    }
    for (index, terminal) in group.terminals()?.iter().enumerate() {
        debug!(
            "terminal {} {} from manifest terminal {} ({} bytes)",
            index,
            terminal.terminal_type(),
            terminal.manifest_index(),
            terminal.size()
        );
        if let Terminal::Data { record, .. } = terminal {
            debug!(
                "  {}x{} planes {} kernel {}",
                record.frame_descriptor.dimension[0],
                record.frame_descriptor.dimension[1],
                record.frame_descriptor.plane_count,
                record.kernel_id
            );
        }
    }

    let buffer_set = BufferSet::create(&group, args.frame_counter)?;
    info!(
        "buffer set: {} bytes, frame {}",
        buffer_set.as_bytes().len(),
        buffer_set.frame_counter()
    );

    if let Some(dir) = &args.output {
        write_blob(dir, "process_group.bin", group.as_bytes())?;
        write_blob(dir, "buffer_set.bin", buffer_set.as_bytes())?;
    }

    Ok(())
}
