use jdecomp::decompile::{analyze_methods, Settings};
use jdecomp::jvm;
use jdecomp::jvm::class_graph::{ClassGraph, ClassGraphArenas, HierarchyMap};
use jdecomp::jvm::code::listing::Listing;
use jdecomp::jvm::code::MethodInfo;
use jdecomp::render::Rendered;
use jdecomp::types::{TypeArenas, TypeContext};

use clap::{crate_version, value_parser, Arg, ArgAction, Command};
use std::fs;

fn main() -> Result<(), jvm::Error> {
    env_logger::init();

    let matches = Command::new("JVM method decompiler")
        .version(crate_version!())
        .about("Decompiles JVM method listings into typed, structured Java-like source")
        .arg(
            Arg::new("keep stack ops")
                .long("keep-stack-ops")
                .help("Leave dup, swap, and friends as explicit stack operations")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no inline")
                .long("no-inline")
                .help("Keep every single-use temporary")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no finally")
                .long("no-finally")
                .help("Don't recognize duplicated finally blocks")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no conditions")
                .long("no-conditions")
                .help("Don't merge branches into && and ||")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no debug names")
                .long("no-debug-names")
                .help("Ignore local variable tables")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("max narrowings")
                .long("max-narrowings")
                .value_name("COUNT")
                .help("How often inference may narrow one expression")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("workers")
                .long("workers")
                .value_name("COUNT")
                .help("Analysis threads (0 for one per CPU)")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("INPUT")
                .help("Method listing files to decompile")
                .required(true)
                .num_args(1..)
                .index(1),
        )
        .get_matches();

    let mut settings = Settings::new();
    settings.resolve_stack_operations = !matches.get_flag("keep stack ops");
    settings.inline_temporaries = !matches.get_flag("no inline");
    settings.detect_finally = !matches.get_flag("no finally");
    settings.combine_conditions = !matches.get_flag("no conditions");
    settings.use_debug_names = !matches.get_flag("no debug names");
    if let Some(max_narrowings) = matches.get_one::<usize>("max narrowings") {
        settings.max_narrowings = *max_narrowings;
    }
    if let Some(workers) = matches.get_one::<usize>("workers") {
        settings.workers = *workers;
    }

    let mut hierarchies = HierarchyMap::with_java_library();
    let mut methods: Vec<MethodInfo> = vec![];
    for input in matches.get_many::<String>("INPUT").into_iter().flatten() {
        log::info!("Reading listing '{}'", input);
        let source = fs::read_to_string(input)?;
        let listing = Listing::parse(&source)?;
        hierarchies.extend(listing.hierarchies);
        methods.extend(listing.methods);
    }

    let class_arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&class_arenas, Box::new(hierarchies));
    let type_arenas = TypeArenas::new();
    let tcx = TypeContext::new(&class_graph, &type_arenas);

    let results = analyze_methods(tcx, &methods, &settings);
    for (method, result) in methods.iter().zip(results) {
        println!("// {}", method.qualified_name());
        match result {
            Ok(output) => {
                for diagnostic in &output.diagnostics {
                    println!("// {}", diagnostic);
                }
                println!("{}", Rendered(&output));
            }
            Err(err) => {
                log::error!("Failed to decompile {}: {:?}", method.qualified_name(), err);
                println!("// could not be decompiled: {:?}\n", err);
            }
        }
    }

    Ok(())
}
