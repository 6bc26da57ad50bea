//! Command-line driver for the heap snapshot analysis engine.
//!
//! Loads a `.heapsnapshot` file, runs every analysis pass once, and answers
//! retainer/dominator/aggregate/diff/search queries against it.
//!
//! # Usage
//!
//! ```bash
//! heapgraph aggregates Heap.heapsnapshot
//! heapgraph dominators Heap.heapsnapshot 123
//! heapgraph retainers Heap.heapsnapshot 123
//! heapgraph diff before.heapsnapshot after.heapsnapshot Detached-HTMLDivElement
//! heapgraph duplicated-strings Heap.heapsnapshot
//! heapgraph search Heap.heapsnapshot EventListener
//! ```

use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use heapgraph::allocation::NullAllocationProfile;
use heapgraph::diff;
use heapgraph::engine::Engine;
use heapgraph::filters;
use heapgraph_model::RawSnapshot;

#[derive(Parser, Debug)]
#[command(name = "heapgraph")]
#[command(about = "Analyze V8/Chromium heap snapshots")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Per-class aggregates (count, self size, max retained size), sorted
    /// by retained size descending.
    Aggregates {
        snapshot: PathBuf,
        #[arg(long, default_value_t = 20)]
        top: usize,
    },
    /// Walk the dominator chain from a node id up to the root.
    Dominators { snapshot: PathBuf, node_id: u32 },
    /// List the direct retainers of a node id.
    Retainers { snapshot: PathBuf, node_id: u32 },
    /// Diff one class's instances between two snapshots.
    Diff {
        base: PathBuf,
        current: PathBuf,
        class_name: String,
    },
    /// Run a named filter ("objectsRetainedByDetachedDomNodes",
    /// "objectsRetainedByConsole", "duplicatedStrings") and list the node
    /// ids it rejects.
    Filter { snapshot: PathBuf, name: String },
    /// Search node names for a substring.
    Search { snapshot: PathBuf, needle: String },
}

fn load(path: &PathBuf) -> Result<Engine, Box<dyn std::error::Error>> {
    let file = File::open(path).map_err(|e| format!("failed to open '{}': {}", path.display(), e))?;
    let raw = RawSnapshot::parse(file)?;
    Ok(Engine::initialize(&raw, Box::new(NullAllocationProfile), None)?)
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    match args.command {
        Command::Aggregates { snapshot, top } => {
            let mut engine = load(&snapshot)?;
            let by_class = engine.get_aggregates_by_class_name(false, "allObjects");
            let mut rows: Vec<_> = by_class.values().collect();
            rows.sort_by(|a, b| b.max_retained_size.partial_cmp(&a.max_retained_size).unwrap());
            for agg in rows.into_iter().take(top) {
                println!(
                    "{:<30} count={:<8} self={:<10} retained={:.0}",
                    agg.name.as_deref().unwrap_or(&agg.type_name),
                    agg.count,
                    agg.self_size,
                    agg.max_retained_size,
                );
            }
        }

        Command::Dominators { snapshot, node_id } => {
            let engine = load(&snapshot)?;
            let mut ordinal = engine
                .node_id_to_ordinal(node_id)
                .ok_or_else(|| format!("no node with id {node_id}"))?;
            loop {
                let node = engine.serialize_node(ordinal);
                println!(
                    "{} #{} ({}) retained={:.0}",
                    node.name, node.id, node.type_name, node.retained_size
                );
                let dom = engine.dominators_tree[ordinal as usize];
                if dom == ordinal {
                    break;
                }
                ordinal = dom;
            }
        }

        Command::Retainers { snapshot, node_id } => {
            let engine = load(&snapshot)?;
            let ordinal = engine
                .node_id_to_ordinal(node_id)
                .ok_or_else(|| format!("no node with id {node_id}"))?;
            let node_index = engine.view.ordinal_to_index(ordinal) as u32;
            for edge in engine.retainers_of(node_index) {
                println!("<- {} ({}) from node index #{}", edge.name, edge.type_name, edge.node);
            }
        }

        Command::Diff { base, current, class_name } => {
            let mut base_engine = load(&base)?;
            let mut current_engine = load(&current)?;
            let base_snapshot = base_engine.diff_snapshot();
            let current_snapshot = current_engine.diff_snapshot();
            let empty = heapgraph::aggregate::AggregateForDiff {
                ids: Vec::new(),
                indexes: Vec::new(),
                self_sizes: Vec::new(),
            };
            let a = base_snapshot.get(&class_name).unwrap_or(&empty);
            let b = current_snapshot.get(&class_name).unwrap_or(&empty);
            match diff::compute(a, b) {
                Some(d) => println!(
                    "{class_name}: +{} (-{}) instances, {:+} bytes",
                    d.added_count, d.removed_count, d.size_delta
                ),
                None => println!("{class_name}: no instances in either snapshot"),
            }
        }

        Command::Filter { snapshot, name } => {
            let mut engine = load(&snapshot)?;
            let distances = engine.distances.clone();
            let node_count = engine.node_count();
            let filter = filters::create_named_filter(&name, &engine.view, &distances)?;
            let mut matched = 0u64;
            for ordinal in 0..node_count {
                if !filter.accepts(ordinal) {
                    let node = engine.serialize_node(ordinal);
                    println!("{} #{}", node.name, node.id);
                    matched += 1;
                }
            }
            engine.reset();
            println!("{matched} node(s) rejected by '{name}'");
        }

        Command::Search { snapshot, needle } => {
            let engine = load(&snapshot)?;
            for ordinal in 0..engine.node_count() {
                let node = engine.serialize_node(ordinal);
                if node.name.contains(&needle) {
                    println!("{} #{} ({})", node.name, node.id, node.type_name);
                }
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
