use jdecomp::decompile::{
    analyze_methods, Decoded, Decoder, DiagnosticKind, Error, MethodAnalyzer, MethodOutput,
    Severity, Settings,
};
use jdecomp::expr::{infer, ExprArena};
use jdecomp::flow::{flatten, JumpGraph, LoopKind, Reinference, StructuredBlock, Structurer};
use jdecomp::jvm::class_graph::{ClassGraph, ClassGraphArenas, HierarchyMap};
use jdecomp::jvm::code::listing::Listing;
use jdecomp::locals::resolver::Resolver;
use jdecomp::locals::{LocalTable, Slot};
use jdecomp::render::{render_method, type_name};
use jdecomp::types::{TypeArenas, TypeContext};

/// Run `test` with a type context over the Java library and the hierarchies of the listing
fn with_listing<R>(source: &str, test: impl for<'g> FnOnce(TypeContext<'g>, &Listing) -> R) -> R {
    let listing = Listing::parse(source).unwrap();
    let mut hierarchies = HierarchyMap::with_java_library();
    hierarchies.extend(listing.hierarchies.iter().cloned());

    let class_arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&class_arenas, Box::new(hierarchies));
    let type_arenas = TypeArenas::new();
    let tcx = TypeContext::new(&class_graph, &type_arenas);
    test(tcx, &listing)
}

fn decompile<R>(source: &str, check: impl for<'g> FnOnce(&MethodOutput<'g>) -> R) -> R {
    with_listing(source, |tcx, listing| {
        let settings = Settings::new();
        let output = MethodAnalyzer::new(tcx, &settings)
            .analyze(&listing.methods[0])
            .unwrap();
        check(&output)
    })
}

fn errors(output: &MethodOutput<'_>) -> Vec<String> {
    output
        .diagnostics
        .iter()
        .filter(|diagnostic| diagnostic.severity == Severity::Error)
        .map(|diagnostic| diagnostic.to_string())
        .collect()
}

fn find_loop(block: &StructuredBlock) -> Option<LoopKind> {
    match block {
        StructuredBlock::Loop { kind, .. } => Some(*kind),
        StructuredBlock::Sequence(blocks) => blocks.iter().find_map(find_loop),
        StructuredBlock::If {
            then, otherwise, ..
        } => find_loop(then).or_else(|| otherwise.as_deref().and_then(find_loop)),
        StructuredBlock::Labeled { body, .. } => find_loop(body),
        _ => None,
    }
}

const COUNT_LOOP: &str = r#"
.class com/example/Demo
.method static count(I)I
    iconst_0
    istore_1
Head:
    iload_1
    iload_0
    if_icmpge Done
    iinc 1 1
    goto Head
Done:
    iload_1
    ireturn
.end
"#;

const LIST_JOIN: &str = r#"
.class com/example/Demo
.method public static pick(Z)Ljava/util/List;
    iload_0
    ifeq Else
    new java/util/ArrayList
    dup
    invokespecial java/util/ArrayList.<init> ()V
    astore_1
    goto Join
Else:
    new java/util/LinkedList
    dup
    invokespecial java/util/LinkedList.<init> ()V
    astore_1
Join:
    aload_1
    areturn
.end
"#;

#[test]
fn join_of_list_implementations() {
    decompile(LIST_JOIN, |output| {
        assert_eq!(errors(output), Vec::<String>::new());
        let list = output
            .locals
            .iter()
            .find(|local| local.slot == Slot::Bytecode(1))
            .expect("variable for slot 1");
        assert_eq!(type_name(list.declared), "java.util.List");
        assert_eq!(list.name, "list");

        let rendered = render_method(output);
        assert!(rendered.contains("new java.util.ArrayList()"), "{}", rendered);
        assert!(rendered.contains("new java.util.LinkedList()"), "{}", rendered);
    });
}

#[test]
fn top_tested_loop() {
    decompile(COUNT_LOOP, |output| {
        assert_eq!(errors(output), Vec::<String>::new());
        assert_eq!(find_loop(&output.root), Some(LoopKind::While));
        let rendered = render_method(output);
        assert!(rendered.contains("while ("), "{}", rendered);
        assert!(!rendered.contains("goto"), "{}", rendered);
    });
}

#[test]
fn reused_slot_splits_into_variables() {
    let source = r#"
    .class com/example/Demo
    .method static reuse()V
        iconst_5
        istore_0
        iload_0
        invokestatic java/lang/Integer.valueOf (I)Ljava/lang/Integer;
        pop
        ldc "text"
        astore_0
        aload_0
        invokevirtual java/lang/String.length ()I
        pop
        return
    .end
    "#;

    decompile(source, |output| {
        assert!(output
            .diagnostics
            .iter()
            .all(|diagnostic| diagnostic.kind != DiagnosticKind::TypeConflict));

        let mut declared: Vec<String> = output
            .locals
            .iter()
            .filter(|local| local.slot == Slot::Bytecode(0))
            .map(|local| type_name(local.declared))
            .collect();
        declared.sort();
        assert_eq!(declared, vec!["int", "java.lang.String"]);
    });
}

#[test]
fn unreachable_code_is_dropped() {
    let source = r#"
    .class com/example/Demo
    .method static answer()I
        iconst_1
        ireturn
    Dead:
        iconst_2
        ireturn
    .end
    "#;

    decompile(source, |output| {
        let rendered = render_method(output);
        assert!(rendered.contains("return 1;"), "{}", rendered);
        assert!(!rendered.contains("return 2;"), "{}", rendered);
    });
}

#[test]
fn duplicated_handler_code_becomes_finally() {
    let source = r#"
    .class com/example/Demo
    .method static guarded()V
    Start:
        invokestatic com/example/Demo.work ()V
    End:
        invokestatic com/example/Demo.cleanup ()V
        return
    Handler:
        astore_0
        invokestatic com/example/Demo.cleanup ()V
        aload_0
        athrow
    .catch any from Start to End using Handler
    .end
    "#;

    decompile(source, |output| {
        let rendered = render_method(output);
        assert!(rendered.contains("} finally {"), "{}", rendered);
        assert_eq!(rendered.matches("cleanup()").count(), 1, "{}", rendered);
        assert!(!rendered.contains("throw"), "{}", rendered);
    });
}

#[test]
fn structuring_preserves_control_flow() {
    with_listing(COUNT_LOOP, |tcx, listing| {
        let method = &listing.methods[0];
        let mut arena = ExprArena::new();
        let mut locals = LocalTable::new();
        let mut diagnostics = vec![];
        let Decoded { graph, .. } = Decoder::new(tcx, method, &mut arena, &mut locals, true)
            .decode()
            .unwrap();

        let mut before = JumpGraph::from_flow_graph(&graph).unwrap();
        let root = Structurer::new(graph, &mut arena, &mut diagnostics).structure();
        let mut after = flatten(&root, &arena);

        before.canonicalize();
        after.canonicalize();
        assert!(before.is_isomorphic(&after), "{:#?}\n{:#?}", before, after);
    });
}

#[test]
fn inference_reaches_a_fixpoint() {
    with_listing(COUNT_LOOP, |tcx, listing| {
        let method = &listing.methods[0];
        let mut arena = ExprArena::new();
        let mut locals = LocalTable::new();
        let mut diagnostics = vec![];
        let Decoded {
            graph,
            accesses,
            entry_definitions,
        } = Decoder::new(tcx, method, &mut arena, &mut locals, true)
            .decode()
            .unwrap();
        let mut resolver = Resolver::new(tcx, &mut arena, &mut locals, &mut diagnostics);
        let joins = resolver.resolve(graph.entry, &accesses, &entry_definitions);
        for join in &joins {
            resolver.join(join);
        }

        infer(tcx, &mut arena, &mut locals, &mut diagnostics, 32);
        assert_eq!(infer(tcx, &mut arena, &mut locals, &mut diagnostics, 32), 0);
    });
}

#[test]
fn batch_reports_errors_per_method() {
    let source = r#"
    .class com/example/Demo
    .method static underflow()V
        pop
        return
    .end
    .method static fine()V
        return
    .end
    "#;

    with_listing(source, |tcx, listing| {
        let mut settings = Settings::new();
        settings.workers = 2;
        let results = analyze_methods(tcx, &listing.methods, &settings);
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(Error::MalformedCode { .. })));
        let fine = results[1].as_ref().unwrap();
        assert_eq!(render_method(fine), "static void fine() {\n    return;\n}\n");
    });
}

#[test]
fn joins_wait_for_the_structurer() {
    with_listing(LIST_JOIN, |tcx, listing| {
        let method = &listing.methods[0];
        let mut arena = ExprArena::new();
        let mut locals = LocalTable::new();
        let mut diagnostics = vec![];
        let Decoded {
            graph,
            accesses,
            entry_definitions,
        } = Decoder::new(tcx, method, &mut arena, &mut locals, true)
            .decode()
            .unwrap();
        let joins = Resolver::new(tcx, &mut arena, &mut locals, &mut diagnostics).resolve(
            graph.entry,
            &accesses,
            &entry_definitions,
        );
        assert_eq!(joins.len(), 1);
        let (load, definitions) = (joins[0].load, joins[0].definitions.clone());
        assert_eq!(definitions.len(), 2);
        assert!(definitions
            .iter()
            .all(|definition| locals.find(*definition) != locals.find(load)));

        Structurer::new(graph, &mut arena, &mut diagnostics)
            .with_inference(Reinference {
                tcx,
                locals: &mut locals,
                max_narrowings: 32,
                joins,
            })
            .structure();
        assert!(definitions
            .iter()
            .all(|definition| locals.find(*definition) == locals.find(load)));
    });
}

#[test]
fn returned_constant_is_a_boolean() {
    let source = r#"
    .class com/example/Demo
    .method static yes()Z
        iconst_1
        ireturn
    .end
    "#;

    decompile(source, |output| {
        assert_eq!(errors(output), Vec::<String>::new());
        let rendered = render_method(output);
        assert!(rendered.contains("return true;"), "{}", rendered);
    });
}

#[test]
fn switch_ends_at_the_default_target() {
    let source = r#"
    .class com/example/Demo
    .method static pick(I)V
        iload_0
        lookupswitch 0 First 1 Second 2 Third default Rest
    First:
        invokestatic com/example/Demo.a ()V
    Second:
        invokestatic com/example/Demo.b ()V
        goto Rest
    Third:
        invokestatic com/example/Demo.c ()V
    Rest:
        return
    .end
    "#;

    decompile(source, |output| {
        let rendered = render_method(output);
        assert!(rendered.contains("switch ("), "{}", rendered);
        assert!(!rendered.contains("label"), "{}", rendered);
        assert!(!rendered.contains("goto"), "{}", rendered);

        // `case 0` falls through into `case 1`, which breaks; `case 2` is last
        assert_eq!(rendered.matches("break;").count(), 1, "{}", rendered);
        let first = rendered.find("a();").unwrap();
        let second = rendered.find("b();").unwrap();
        assert!(!rendered[first..second].contains("break"), "{}", rendered);
    });
}

#[test]
fn short_circuit_conditions() {
    let both = r#"
    .class com/example/Demo
    .method static both(II)V
        iload_0
        ifle Rest
        iload_1
        ifle Rest
        invokestatic com/example/Demo.a ()V
    Rest:
        return
    .end
    "#;
    let either = r#"
    .class com/example/Demo
    .method static either(II)V
        iload_0
        ifgt Body
        iload_1
        ifle Rest
    Body:
        invokestatic com/example/Demo.a ()V
    Rest:
        return
    .end
    "#;

    for (source, combinator) in [(both, "&&"), (either, "||")] {
        decompile(source, |output| {
            let rendered = render_method(output);
            assert_eq!(rendered.matches("if (").count(), 1, "{}", rendered);
            assert!(rendered.contains(combinator), "{}", rendered);
        });
    }
}

#[test]
fn bottom_tested_loop() {
    let source = r#"
    .class com/example/Demo
    .method static climb(I)I
        iconst_0
        istore_1
    Top:
        iinc 1 1
        iload_1
        iload_0
        if_icmplt Top
        iload_1
        ireturn
    .end
    "#;

    decompile(source, |output| {
        assert_eq!(find_loop(&output.root), Some(LoopKind::DoWhile));
        let rendered = render_method(output);
        assert!(rendered.contains("do {"), "{}", rendered);
        assert!(rendered.contains("} while ("), "{}", rendered);
    });
}

#[test]
fn break_out_of_nested_loops() {
    let source = r#"
    .class com/example/Demo
    .method static search(II)V
        iconst_0
        istore_2
    Outer:
        iload_2
        iload_0
        if_icmpge Done
        iconst_0
        istore_3
    Inner:
        iload_3
        iload_1
        if_icmpge Next
        iload_2
        iload_3
        if_icmpeq Done
        iinc 3 1
        goto Inner
    Next:
        iinc 2 1
        goto Outer
    Done:
        return
    .end
    "#;

    decompile(source, |output| {
        let rendered = render_method(output);
        assert_eq!(rendered.matches("while (").count(), 2, "{}", rendered);
        assert!(rendered.contains("break label"), "{}", rendered);
        assert!(!rendered.contains("goto"), "{}", rendered);
    });
}

#[test]
fn catch_with_finally() {
    let source = r#"
    .class com/example/Demo
    .method static guarded()V
    Start:
        invokestatic com/example/Demo.work ()V
    End:
        invokestatic com/example/Demo.cleanup ()V
        goto After
    Catch:
        astore_0
        invokestatic com/example/Demo.log ()V
    CatchEnd:
        invokestatic com/example/Demo.cleanup ()V
        goto After
    Any:
        astore_1
        invokestatic com/example/Demo.cleanup ()V
        aload_1
        athrow
    After:
        return
    .catch java/lang/Exception from Start to End using Catch
    .catch any from Start to End using Any
    .catch any from Catch to CatchEnd using Any
    .end
    "#;

    decompile(source, |output| {
        let rendered = render_method(output);
        assert!(rendered.contains("catch (java.lang.Exception"), "{}", rendered);
        assert!(rendered.contains("} finally {"), "{}", rendered);
        assert_eq!(rendered.matches("cleanup()").count(), 1, "{}", rendered);
        assert_eq!(rendered.matches("try {").count(), 1, "{}", rendered);

        // declared by the catch clause only
        assert_eq!(
            rendered.matches("java.lang.Exception").count(),
            1,
            "{}",
            rendered
        );
    });
}

#[test]
fn irreducible_flow_falls_back_to_jumps() {
    let source = r#"
    .class com/example/Demo
    .method static tangle(I)V
        iload_0
        ifeq Second
    First:
        invokestatic com/example/Demo.a ()V
    Second:
        invokestatic com/example/Demo.b ()V
        iload_0
        ifne First
        return
    .end
    "#;

    decompile(source, |output| {
        assert!(output
            .diagnostics
            .iter()
            .any(|diagnostic| diagnostic.kind == DiagnosticKind::StructuringFailure));
        assert!(matches!(output.root, StructuredBlock::Unstructured(_)));
        let rendered = render_method(output);
        assert!(rendered.contains("goto"), "{}", rendered);
        assert_eq!(rendered.matches("a();").count(), 1, "{}", rendered);
    });
}
