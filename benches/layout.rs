use criterion::{criterion_group, criterion_main, Criterion};
use edgefirst_psys::{
    bitmap::KernelBitmap,
    description::{Bounds, ProgramDescription, ProgramGroupDescription, TerminalDescription},
    format::FrameFormat,
    manifest::{ProgramType, TerminalDirection},
    param::{ProgramGroupParam, TerminalParam},
    process_group::{ProcessGroup, ProcessGroupConfig},
    ProgramGroupManifest,
};

/// A chain of `n` singular programs, one kernel and one input and output
/// data terminal each.
fn chain(n: usize) -> ProgramGroupDescription {
    let programs = (0..n)
        .map(|i| ProgramDescription {
            id: i as u32 + 1,
            program_type: ProgramType::Singular,
            kernels: KernelBitmap::bit_mask(i),
            program_dependencies: if i == 0 { vec![] } else { vec![i as u8 - 1] },
            terminal_dependencies: vec![2 * i as u8, 2 * i as u8 + 1],
            cell: None,
            cell_type: None,
        })
        .collect();
    let terminals = (0..n)
        .flat_map(|i| {
            [TerminalDirection::In, TerminalDirection::Out].map(|direction| {
                TerminalDescription::Data {
                    direction,
                    kernel: i as u8,
                    formats: vec![FrameFormat::Nv12],
                    size: Bounds::default(),
                    fragment_size: Bounds::default(),
                }
            })
        })
        .collect();
    ProgramGroupDescription {
        id: 0x1000 + n as u32,
        subgraph_count: 1,
        kernel_bitmap: None,
        programs,
        terminals,
        private_data_size: 0,
        rbm_manifest_size: 0,
    }
}

pub fn benchmark_manifest(c: &mut Criterion) {
    let mut group = c.benchmark_group("manifest");
    for n in [2, 8, 32, 64] {
        let description = chain(n);
        group.bench_with_input(format!("compile/{}", n), &description, |b, d| {
            b.iter(|| d.compile().unwrap())
        });
        let manifest = description.compile().unwrap();
        let bytes = manifest.as_bytes().to_vec();
        group.bench_with_input(format!("relocate/{}", n), &bytes, |b, bytes| {
            b.iter(|| ProgramGroupManifest::from_bytes(bytes.clone()).unwrap())
        });
    }
}

pub fn benchmark_process_group(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_group");
    let config = ProcessGroupConfig::default();
    for n in [2, 8, 32, 64] {
        let manifest = chain(n).compile().unwrap();
        for fragments in [1, 4] {
            let mut param = ProgramGroupParam::new(&manifest, manifest.kernel_bitmap(), fragments);
            for terminal in param.terminals.iter_mut() {
                *terminal = TerminalParam::frame(FrameFormat::Nv12, 1920, 1080, 1920, 8);
            }
            group.bench_with_input(
                format!("create/{}x{}", n, fragments),
                &(&manifest, &param),
                |b, (manifest, param)| {
                    b.iter(|| ProcessGroup::create(manifest, param, &config).unwrap())
                },
            );
        }
    }
}

criterion_group!(benches, benchmark_manifest, benchmark_process_group);
criterion_main!(benches);
