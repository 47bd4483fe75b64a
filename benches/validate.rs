use criterion::{criterion_group, criterion_main, Criterion};
use edgefirst_psys::{
    description::ProgramGroupDescription,
    validate::{GraphValidator, ValidatorConfig},
};

/// One exclusive super over `n` kernels with `n - 1` nested exclusive subs,
/// each one kernel narrower than the last, plus a singular tail program.
fn exclusive_fan(n: usize) -> ProgramGroupDescription {
    let all: Vec<String> = (0..n).map(|k| k.to_string()).collect();
    let mut programs = vec![format!(
        r#"{{ "id": 1, "type": "exclusive_super", "kernels": [{}],
             "terminal_dependencies": [0, 1] }}"#,
        all.join(",")
    )];
    for sub in 1..n {
        let kernels = &all[..n - sub];
        programs.push(format!(
            r#"{{ "id": {}, "type": "exclusive_sub", "kernels": [{}],
                 "program_dependencies": [0], "terminal_dependencies": [0] }}"#,
            sub + 1,
            kernels.join(",")
        ));
    }
    programs.push(format!(
        r#"{{ "id": {}, "kernels": [{}], "program_dependencies": [0],
             "terminal_dependencies": [2] }}"#,
        n + 1,
        n
    ));

    let text = format!(
        r#"{{ "id": 7, "programs": [{}], "terminals": [
            {{ "kind": "data", "direction": "in", "kernel": 0 }},
            {{ "kind": "data", "direction": "out", "kernel": 1 }},
            {{ "kind": "data", "direction": "out", "kernel": {} }}
        ] }}"#,
        programs.join(","),
        n
    );
    ProgramGroupDescription::from_json(&text).unwrap()
}

pub fn benchmark_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate");
    for n in [3, 8, 16, 32] {
        let manifest = exclusive_fan(n).compile().unwrap();
        for simplified in [false, true] {
            let validator = GraphValidator::new(ValidatorConfig {
                simplified_graph_model: simplified,
            });
            let name = if simplified { "simplified" } else { "full" };
            group.bench_with_input(format!("{}/{}", name, n), &manifest, |b, m| {
                b.iter(|| validator.validate(m).unwrap())
            });
        }
    }
}

criterion_group!(benches, benchmark_validate);
criterion_main!(benches);
