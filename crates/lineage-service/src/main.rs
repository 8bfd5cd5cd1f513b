use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use lineage_service::prelude::*;
use lineage_service::{RetryPolicy, WriteCounts};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

const SAMPLE_TYPE: TypeKey = TypeKey::SampleType(1);
const DATA_CLASS: TypeKey = TypeKey::DataClass(1);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Command::new("lineage-sim")
        .version(lineage_service::VERSION)
        .about("Lineage graph simulator")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .help("Path to a TOML configuration file"),
        )
        .subcommand(
            Command::new("scenario")
                .about("Build the sample/data scenario and print its lineage")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("stress")
                .about("Run concurrent derivations against one parent")
                .arg(
                    Arg::new("nodes")
                        .long("nodes")
                        .default_value("2000")
                        .value_parser(value_parser!(u64))
                        .help("Number of derived samples to create"),
                )
                .arg(
                    Arg::new("writers")
                        .long("writers")
                        .default_value("8")
                        .value_parser(value_parser!(u64))
                        .help("Number of concurrent writer threads"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                ),
        );

    let matches = cli.get_matches();
    let config = match matches.get_one::<String>("config") {
        Some(path) => LineageConfig::load(path)?,
        None => LineageConfig::default(),
    };

    match matches.subcommand() {
        Some(("scenario", args)) => run_scenario(config, args.get_flag("json")),
        Some(("stress", args)) => run_stress(config, args),
        _ => Ok(()),
    }
}

fn node(kind: NodeKind, row: i64, name: &str, container: ContainerId) -> anyhow::Result<NewNode> {
    let type_key = match kind {
        NodeKind::Sample => SAMPLE_TYPE,
        NodeKind::Data => DATA_CLASS,
        NodeKind::Run => TypeKey::Protocol(1),
    };
    Ok(NewNode::new(kind, row, GlobalId::parse(name)?, container, name).with_type(type_key))
}

fn run_scenario(config: LineageConfig, json: bool) -> anyhow::Result<()> {
    let service = LineageService::new(config)?;
    let container = ContainerId::new();

    let s1 = service.register_node(node(NodeKind::Sample, 1, "S-1", container)?)?;
    let s2 = service.register_node(node(NodeKind::Sample, 2, "S-2", container)?)?;
    let derivations: [(&str, Vec<ObjectId>); 3] = [
        ("bob", vec![s1.object_id]),
        ("sally", vec![s2.object_id]),
        ("mike", vec![s1.object_id, s2.object_id]),
    ];

    let mut datas: Vec<ObjectId> = Vec::new();
    for (row, (name, samples)) in (1_i64..).zip(derivations) {
        let run = service.register_node(node(
            NodeKind::Run,
            row,
            &format!("run-{row}"),
            container,
        )?)?;
        let parents: Vec<Parent> = datas
            .iter()
            .copied()
            .chain(samples)
            .map(Parent::new)
            .collect();
        let (child, _) = service.insert_derived(
            node(NodeKind::Data, row, name, container)?,
            &parents,
            Some(run.object_id),
        )?;
        datas.push(child.object_id);
    }
    service.validate_graph()?;

    let options = LineageOptions::parents().with_depth(2).with_edges();
    for name in ["mike", "bob"] {
        let result = service.get_lineage(&[GlobalId::parse(name)?], &options)?;
        if json {
            println!(
                "{}",
                serde_json::to_string_pretty(&result).context("serializing lineage")?
            );
            continue;
        }

        println!("Ancestors of {} (depth 2):", name);
        for entry in &result.ancestors {
            println!(
                "  {:>3}  {:<6}  {}",
                entry.depth,
                entry.node.kind.as_str(),
                entry.node.name
            );
        }
        let names = |nodes: Vec<&Node>| {
            nodes
                .iter()
                .map(|n| n.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!("  datas:     {{{}}}", names(result.datas()));
        println!("  materials: {{{}}}", names(result.materials()));
        println!();
    }

    let mike = GlobalId::parse("mike")?;
    if let Some(lookup) = service.ancestor_lookup(&mike, SAMPLE_TYPE)? {
        println!("Sample ancestor of mike: {:?}", lookup);
    }
    Ok(())
}

fn run_stress(config: LineageConfig, args: &ArgMatches) -> anyhow::Result<()> {
    let nodes = args.get_one::<u64>("nodes").copied().unwrap_or(2000);
    let writers = args.get_one::<u64>("writers").copied().unwrap_or(8).max(1);
    let seed = args.get_one::<u64>("seed").copied().unwrap_or(42);

    println!("Running stress test...");
    println!("Nodes: {}", nodes);
    println!("Writers: {}", writers);
    println!("Seed: {}", seed);
    println!();

    let retry = RetryPolicy {
        max_attempts: config.retry.max_attempts.max(20),
        backoff_ms: config.retry.backoff_ms,
    };
    let config = config.with_retry(retry);
    let service = LineageService::new(config)?;
    let container = ContainerId::new();
    let root = service.register_node(node(NodeKind::Sample, 1, "root", container)?)?;
    let root_id = root.object_id;

    let per_writer = nodes / writers;
    let start = Instant::now();
    let failures: u64 = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..writers)
            .map(|writer| {
                let service = &service;
                scope.spawn(move || {
                    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(writer));
                    let mut mine = vec![root_id];
                    let mut failed = 0_u64;
                    for i in 0..per_writer {
                        let row = i64::try_from(2 + writer * per_writer + i).unwrap_or(i64::MAX);
                        let parent = mine[rng.random_range(0..mine.len())];
                        let request = node(NodeKind::Sample, row, &format!("S-{row}"), container)
                            .and_then(|n| {
                                service
                                    .insert_derived(n, &[Parent::new(parent)], None)
                                    .map_err(anyhow::Error::from)
                            });
                        match request {
                            Ok((child, _)) => mine.push(child.object_id),
                            Err(e) => {
                                tracing::warn!("Writer {} failed: {}", writer, e);
                                failed += 1;
                            }
                        }
                    }
                    failed
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or(per_writer))
            .sum()
    });
    let elapsed = start.elapsed();

    service.validate_graph()?;
    let lineage = service.get_lineage(
        &[root.global_id.clone()],
        &LineageOptions::children(),
    )?;
    let WriteCounts {
        commits,
        retries,
        exhausted,
        ..
    } = service.write_stats();

    println!("Stress Test Report:");
    println!("  Elapsed: {:?}", elapsed);
    println!("  Commits: {}", commits);
    println!("  Retries: {}", retries);
    println!("  Exhausted: {}", exhausted);
    println!("  Failures: {}", failures);
    println!("  Descendants of root: {}", lineage.descendants.len());
    println!("  Truncated: {}", lineage.truncated);

    if failures > 0 {
        anyhow::bail!("{failures} derivation(s) failed");
    }
    Ok(())
}
