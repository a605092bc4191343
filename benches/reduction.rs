//! Reduction throughput over Peano addition nets.

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use portweave::{
    transform, AgentType, Net, NoIo, Pattern, Port, Replacement, Rule, RuleSet, TemplatePort,
};

fn add_ty() -> AgentType {
    AgentType::new("Add", 2)
}

fn succ_ty() -> AgentType {
    AgentType::new("Succ", 1)
}

fn zero_ty() -> AgentType {
    AgentType::new("Zero", 0)
}

fn rules() -> RuleSet {
    let mut zero_lhs = Pattern::new();
    let a = zero_lhs.add_node(add_ty());
    let z = zero_lhs.add_node(zero_ty());
    zero_lhs.add_wire(TemplatePort::principal(a), TemplatePort::principal(z));
    zero_lhs.add_boundary(TemplatePort::aux(a, 1));
    zero_lhs.add_boundary(TemplatePort::aux(a, 2));
    let mut zero_rhs = Replacement::new(2);
    zero_rhs.bind_passthrough(0, 1).unwrap();

    let mut succ_lhs = Pattern::new();
    let a = succ_lhs.add_node(add_ty());
    let s = succ_lhs.add_node(succ_ty());
    succ_lhs.add_wire(TemplatePort::principal(a), TemplatePort::principal(s));
    succ_lhs.add_boundary(TemplatePort::aux(s, 1));
    succ_lhs.add_boundary(TemplatePort::aux(a, 1));
    succ_lhs.add_boundary(TemplatePort::aux(a, 2));
    let mut succ_rhs = Replacement::new(3);
    let a2 = succ_rhs.add_node(add_ty());
    let s2 = succ_rhs.add_node(succ_ty());
    succ_rhs.add_wire(TemplatePort::aux(a2, 2), TemplatePort::aux(s2, 1));
    succ_rhs.bind_port(0, TemplatePort::principal(a2)).unwrap();
    succ_rhs.bind_port(1, TemplatePort::aux(a2, 1)).unwrap();
    succ_rhs.bind_port(2, TemplatePort::principal(s2)).unwrap();

    RuleSet::new(
        vec![
            Rule::new("add-zero", zero_lhs, zero_rhs).unwrap(),
            Rule::new("add-succ", succ_lhs, succ_rhs).unwrap(),
        ],
        &NoIo,
    )
    .unwrap()
}

fn numeral(mut net: Net, mut open: Port, n: usize) -> Net {
    for _ in 0..n {
        let (next, s) = net.add_agent(succ_ty());
        net = next.connect(open, Port::principal(s)).unwrap();
        open = Port::aux(s, 1);
    }
    let (net, z) = net.add_agent(zero_ty());
    net.connect(open, Port::principal(z)).unwrap()
}

fn addition(n: usize, m: usize) -> Net {
    let (net, a) = Net::new().add_agent(add_ty());
    let (net, o) = net.add_agent(AgentType::new("Out", 0));
    let net = net.connect(Port::aux(a, 2), Port::principal(o)).unwrap();
    let net = numeral(net, Port::principal(a), n);
    numeral(net, Port::aux(a, 1), m)
}

fn bench_reduction(c: &mut Criterion) {
    let rules = rules();
    let mut group = c.benchmark_group("peano_addition");
    for n in [4usize, 16, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || addition(n, n),
                |net| transform(&rules, net, usize::MAX).unwrap(),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_reduction);
criterion_main!(benches);
