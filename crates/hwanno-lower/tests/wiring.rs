//! End-to-end tests of cross-module wiring.

use hwanno_core::{
    Annotation, Design, Direction, HwType, ModuleId, ModuleKind, OpKind, Operation, ValueId,
};
use hwanno_lower::registry::{applier, resolver, WIRING_SINK_CLASS, WIRING_SOURCE_CLASS};
use hwanno_lower::target::{std_resolve, target_value};
use hwanno_lower::{
    AnnoRecord, LowerAnnotationsOptions, LowerAnnotationsPass, LowerError, LowerReport,
    WiringProblem,
};
use serde_json::json;

fn source(target: &str, pin: &str) -> Annotation {
    let mut anno = Annotation::targeted(WIRING_SOURCE_CLASS, target);
    anno.insert("pin", json!(pin));
    anno
}

fn sink(target: &str, pin: &str) -> Annotation {
    let mut anno = Annotation::targeted(WIRING_SINK_CLASS, target);
    anno.insert("pin", json!(pin));
    anno
}

fn lower(design: &mut Design, annotations: Vec<Annotation>) -> LowerReport {
    design.raw_annotations = annotations;
    match LowerAnnotationsPass::new(LowerAnnotationsOptions::default()).run(design) {
        Ok(report) => report,
        Err(failure) => failure.report,
    }
}

fn connects(design: &Design, module: ModuleId) -> Vec<(ValueId, ValueId)> {
    design
        .ops_in(module)
        .filter_map(|op| match op.kind {
            OpKind::Connect { dest, src } => Some((dest, src)),
            _ => None,
        })
        .collect()
}

fn instance<'d>(design: &'d Design, module: ModuleId, name: &str) -> &'d Operation {
    design
        .instances_in(module)
        .find(|op| op.name() == Some(name))
        .unwrap()
}

fn port_value(design: &Design, module: ModuleId, name: &str) -> ValueId {
    let def = design.module(module).unwrap();
    def.ports[def.port_index(name).unwrap()].value
}

struct Tree {
    design: Design,
    top: ModuleId,
    a: ModuleId,
    b: ModuleId,
    leaf: ModuleId,
    leaf_src: ValueId,
    b_dst: ValueId,
}

/// Top instantiates A (a) and B (b); A instantiates Leaf (l).
fn tree() -> Tree {
    let mut design = Design::new("Top");
    let top = design.top();
    let a = design.add_module("A", ModuleKind::Module).unwrap();
    let b = design.add_module("B", ModuleKind::Module).unwrap();
    let leaf = design.add_module("Leaf", ModuleKind::Module).unwrap();
    design
        .add_port(leaf, hwanno_core::PortInfo::new("in", HwType::uint(1), Direction::In))
        .unwrap();
    let (_, leaf_src) = design.add_wire(leaf, "src", HwType::uint(8)).unwrap();
    let (_, b_dst) = design.add_wire(b, "dst", HwType::uint(8)).unwrap();
    let l = design.add_instance(a, "l", leaf).unwrap();
    let (_, one) = design.add_wire(a, "one", HwType::uint(1)).unwrap();
    let l_in = design.op(l).unwrap().results[0];
    design.add_connect(a, l_in, one).unwrap();
    design.add_instance(top, "a", a).unwrap();
    design.add_instance(top, "b", b).unwrap();
    Tree {
        design,
        top,
        a,
        b,
        leaf,
        leaf_src,
        b_dst,
    }
}

#[test]
fn lca_closes_problem_with_single_uturn() {
    let mut t = tree();
    let report = lower(
        &mut t.design,
        vec![source("~Top|Leaf>src", "tap"), sink("~Top|B>dst", "tap")],
    );
    assert!(report.succeeded(), "{:?}", report.diagnostics);
    assert_eq!(report.statistics.wiring_problems, 1);
    assert_eq!(report.statistics.ports_added, 3);
    t.design.verify().unwrap();

    // Ports: outputs below the LCA on the source side, input on the sink side.
    let leaf_port = &t.design.module(t.leaf).unwrap().ports[1];
    assert_eq!((leaf_port.name.as_str(), leaf_port.direction), ("tap", Direction::Out));
    let a_port = &t.design.module(t.a).unwrap().ports[0];
    assert_eq!((a_port.name.as_str(), a_port.direction), ("tap", Direction::Out));
    let b_port = &t.design.module(t.b).unwrap().ports[0];
    assert_eq!((b_port.name.as_str(), b_port.direction), ("tap", Direction::In));
    assert_eq!(b_port.ty, HwType::uint(8));
    assert_eq!(t.design.module(t.top).unwrap().num_ports(), 0);

    // Leaf drives its new port, B drives its sink from its new port.
    assert_eq!(
        connects(&t.design, t.leaf),
        vec![(port_value(&t.design, t.leaf, "tap"), t.leaf_src)]
    );
    assert_eq!(
        connects(&t.design, t.b),
        vec![(t.b_dst, port_value(&t.design, t.b, "tap"))]
    );

    // A forwards the new result of the re-issued Leaf instance and keeps the
    // rewired existing connection.
    let l = instance(&t.design, t.a, "l");
    assert_eq!(l.results.len(), 2);
    let a_connects = connects(&t.design, t.a);
    assert_eq!(a_connects.len(), 2);
    assert_eq!(a_connects[0].0, l.results[0]);
    assert_eq!(a_connects[1], (port_value(&t.design, t.a, "tap"), l.results[1]));

    // Top closes the problem: b.tap <= a.tap.
    let a_inst = instance(&t.design, t.top, "a");
    let b_inst = instance(&t.design, t.top, "b");
    assert_eq!(
        connects(&t.design, t.top),
        vec![(b_inst.results[0], a_inst.results[0])]
    );
}

#[test]
fn strict_prefix_paths_use_shorter_endpoint_as_lca() {
    let mut t = tree();
    let (_, a_src) = t.design.add_wire(t.a, "asrc", HwType::uint(8)).unwrap();
    let (_, leaf_dst) = t.design.add_wire(t.leaf, "ldst", HwType::uint(8)).unwrap();
    let report = lower(
        &mut t.design,
        vec![source("~Top|A>asrc", "down"), sink("~Top|Leaf>ldst", "down")],
    );
    assert!(report.succeeded(), "{:?}", report.diagnostics);
    assert_eq!(report.statistics.ports_added, 1);

    let leaf_port = port_value(&t.design, t.leaf, "down");
    assert_eq!(
        t.design.module(t.leaf).unwrap().ports[1].direction,
        Direction::In
    );
    assert!(connects(&t.design, t.leaf).contains(&(leaf_dst, leaf_port)));

    let l = instance(&t.design, t.a, "l");
    assert!(connects(&t.design, t.a).contains(&(l.results[1], a_src)));
    assert!(connects(&t.design, t.top).is_empty());
    assert_eq!(t.design.module(t.a).unwrap().num_ports(), 0);
}

#[test]
fn sink_below_source_in_reverse_order() {
    // Sink above source: the u-turn must still drive the sink side.
    let mut t = tree();
    let (_, a_dst) = t.design.add_wire(t.a, "adst", HwType::uint(8)).unwrap();
    let report = lower(
        &mut t.design,
        vec![sink("~Top|A>adst", "up"), source("~Top|Leaf>src", "up")],
    );
    assert!(report.succeeded(), "{:?}", report.diagnostics);
    let l = instance(&t.design, t.a, "l");
    assert!(connects(&t.design, t.a).contains(&(a_dst, l.results[1])));
    assert_eq!(
        t.design.module(t.leaf).unwrap().ports[1].direction,
        Direction::Out
    );
}

#[test]
fn same_module_problem_is_a_local_connection() {
    let mut t = tree();
    let (_, x) = t.design.add_wire(t.b, "x", HwType::uint(8)).unwrap();
    let report = lower(
        &mut t.design,
        vec![source("~Top|B>x", "p"), sink("~Top|B>dst", "p")],
    );
    assert!(report.succeeded());
    assert_eq!(report.statistics.ports_added, 0);
    assert_eq!(connects(&t.design, t.b), vec![(t.b_dst, x)]);
    assert_eq!(report.statistics.instances_replaced, 0);
}

#[test]
fn one_source_feeds_several_sinks() {
    let mut t = tree();
    let (_, top_dst) = t.design.add_wire(t.top, "tdst", HwType::uint(8)).unwrap();
    let report = lower(
        &mut t.design,
        vec![
            source("~Top|Leaf>src", "fan"),
            sink("~Top|B>dst", "fan"),
            sink("~Top|Top>tdst", "fan"),
        ],
    );
    assert!(report.succeeded(), "{:?}", report.diagnostics);
    assert_eq!(report.statistics.wiring_problems, 2);

    // Two output ports on each source-side module, one per problem.
    let leaf_ports: Vec<String> = t
        .design
        .module(t.leaf)
        .unwrap()
        .ports
        .iter()
        .map(|p| p.name.clone())
        .collect();
    assert_eq!(leaf_ports, vec!["in", "fan", "fan_0"]);

    let a_inst = instance(&t.design, t.top, "a");
    let b_inst = instance(&t.design, t.top, "b");
    let top_connects = connects(&t.design, t.top);
    assert!(top_connects.contains(&(b_inst.results[0], a_inst.results[0])));
    assert!(top_connects.contains(&(top_dst, a_inst.results[1])));
    t.design.verify().unwrap();
}

#[test]
fn pin_without_source_fails() {
    let mut t = tree();
    let report = lower(&mut t.design, vec![sink("~Top|B>dst", "orphan")]);
    assert_eq!(report.statistics.failures, 1);
    assert!(matches!(
        &report.diagnostics[0].error,
        LowerError::Apply { reason, .. } if reason.contains("orphan")
    ));
}

#[test]
fn second_source_on_a_pin_fails() {
    let mut t = tree();
    let report = lower(
        &mut t.design,
        vec![
            source("~Top|Leaf>src", "p"),
            source("~Top|B>dst", "p"),
        ],
    );
    assert_eq!(report.statistics.failures, 1);
    assert!(report.diagnostics[0].annotation.is_some());
}

#[test]
fn ambiguous_endpoint_fails_but_other_problems_are_wired() {
    let mut t = tree();
    t.design.add_instance(t.top, "b2", t.b).unwrap();
    let (_, top_dst) = t.design.add_wire(t.top, "tdst", HwType::uint(8)).unwrap();
    let report = lower(
        &mut t.design,
        vec![
            source("~Top|Leaf>src", "p"),
            sink("~Top|B>dst", "p"),
            sink("~Top|Top>tdst", "p"),
        ],
    );
    assert_eq!(report.statistics.failures, 1);
    assert_eq!(
        report.diagnostics[0].error,
        LowerError::AmbiguousPath {
            problem: 0,
            module: "B".into(),
            count: 2
        }
    );
    assert_eq!(t.design.module(t.b).unwrap().num_ports(), 0);
    let a_inst = instance(&t.design, t.top, "a");
    assert!(connects(&t.design, t.top).contains(&(top_dst, a_inst.results[0])));
}

#[test]
fn reference_problems_insert_conversions() {
    let mut t = tree();
    let (_, a_probe) = t.design.add_wire(t.a, "probe", HwType::uint(8)).unwrap();
    let mut pass = LowerAnnotationsPass::new(LowerAnnotationsOptions::default());
    pass.registry_mut().register(
        "test.probe",
        AnnoRecord::new(
            resolver(std_resolve),
            applier(|target, anno, state| {
                let apply_error = || LowerError::Apply {
                    class: "test.probe".into(),
                    reason: "endpoint without a value".into(),
                };
                let source = target_value(state.design, &target.target)?.ok_or_else(apply_error)?;
                let sink_path = anno.get_str("sink").unwrap_or_default();
                let sink_target = std_resolve(&Annotation::targeted("test.probe", sink_path), state)?;
                let sink = target_value(state.design, &sink_target.target)?.ok_or_else(apply_error)?;
                state.add_wiring_problem(WiringProblem {
                    source,
                    sink,
                    is_ref_type: true,
                    name_hint: "probe".into(),
                });
                Ok(())
            }),
        ),
    );
    let mut anno = Annotation::targeted("test.probe", "~Top|A>probe");
    anno.insert("sink", json!("~Top|B>dst"));
    t.design.raw_annotations = vec![anno];
    let report = pass.run(&mut t.design).unwrap();
    assert_eq!(report.statistics.wiring_problems, 1);

    let ref_ty = HwType::uint(8).reference();
    let a_def = t.design.module(t.a).unwrap();
    assert_eq!(a_def.ports[0].ty, ref_ty);
    assert_eq!(t.design.module(t.b).unwrap().ports[0].ty, ref_ty);

    let has = |module, pred: fn(&OpKind) -> bool| t.design.ops_in(module).any(|op| pred(&op.kind));
    assert!(has(t.b, |k| matches!(k, OpKind::RefResolve { .. })));
    assert!(!has(t.top, |k| matches!(k, OpKind::RefSend { .. } | OpKind::RefResolve { .. })));
    assert!(t
        .design
        .ops_in(t.a)
        .any(|op| op.kind == OpKind::RefSend { base: a_probe }));
    t.design.verify().unwrap();
}

#[test]
fn instance_port_endpoint_follows_reissued_instance() {
    // Top holds b: B. Pin p1 grows B by a port and re-issues `b`; pin p2
    // reads the existing result `b.o`, which must follow the new instance.
    let mut design = Design::new("Top");
    let top = design.top();
    let b = design.add_module("B", ModuleKind::Module).unwrap();
    design
        .add_port(b, hwanno_core::PortInfo::new("o", HwType::uint(8), Direction::Out))
        .unwrap();
    design.add_wire(b, "x", HwType::uint(8)).unwrap();
    design.add_instance(top, "b", b).unwrap();
    let (_, tdst) = design.add_wire(top, "tdst", HwType::uint(8)).unwrap();
    let (_, t2) = design.add_wire(top, "t2", HwType::uint(8)).unwrap();

    let report = lower(
        &mut design,
        vec![
            source("~Top|B>x", "p1"),
            sink("~Top|Top>tdst", "p1"),
            source("~Top|Top>b.o", "p2"),
            sink("~Top|Top>t2", "p2"),
        ],
    );
    assert!(report.succeeded(), "{:?}", report.diagnostics);
    assert_eq!(report.statistics.wiring_problems, 2);
    assert_eq!(report.statistics.instances_replaced, 1);
    design.verify().unwrap();

    let b_inst = instance(&design, top, "b");
    assert_eq!(b_inst.results.len(), 2);
    let top_connects = connects(&design, top);
    assert_eq!(top_connects.len(), 2);
    assert!(top_connects.contains(&(tdst, b_inst.results[1])));
    assert!(top_connects.contains(&(t2, b_inst.results[0])));
}
