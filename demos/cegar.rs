use std::rc::Rc;
use std::time::Duration;

use clap::Parser;
use log::info;

use cpa_rs::cegar::{Cegar, Verdict};
use cpa_rs::cfa::{return_variable, Cfa, CfaBuilder};
use cpa_rs::config::CegarConfig;
use cpa_rs::counterexample::Witness;
use cpa_rs::cpa::callstack::CallstackCpa;
use cpa_rs::cpa::composite::{Component, CompositeCpa};
use cpa_rs::cpa::interval::IntervalCpa;
use cpa_rs::cpa::location::LocationCpa;
use cpa_rs::cpa::precision::{Precision, PrecisionScope};
use cpa_rs::formula::{Formula, Term};
use cpa_rs::interpolation::InterpolationPartition;
use cpa_rs::multiproperty::{MultiPropertyDriver, Partitioning, PropertyVerdict};
use cpa_rs::reachability::ReachabilityEngine;
use cpa_rs::reached::WaitlistOrder;
use cpa_rs::shutdown::ShutdownNotifier;
use cpa_rs::solver::BddSolver;
use cpa_rs::statistics::Statistics;

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Bit width of program integers.
    #[clap(long, value_name = "INT", default_value = "8")]
    width: u32,

    /// Explore the ARG breadth-first.
    #[clap(long)]
    bfs: bool,

    /// Disable the interval analysis.
    #[clap(long)]
    no_intervals: bool,

    /// Cut interpolation queries at the innermost function entry.
    #[clap(long)]
    well_scoped: bool,

    /// Share refined predicates between all locations.
    #[clap(long)]
    global: bool,

    /// Maximum number of refinements per run.
    #[clap(long, value_name = "INT", default_value = "100")]
    max_refinements: usize,

    /// Time limit per property partition (in seconds).
    #[clap(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Check all properties in a single partition.
    #[clap(long)]
    together: bool,

    /// Print the ARG of a plain location and interval exploration in DOT format.
    #[clap(long)]
    dot: bool,
}

/// ```text
/// inc(a) { return a + 1; }
///
/// main() {
///     g = 0;
///     havoc n;
///     if (n > 10) g = 1;
///     r = inc(n);
///     if (g == 1 && n < 5) error("guard");
///     if (r == 0) error("overflow");
///     if (g < 0) error("sign");
/// }
/// ```
fn sample_program() -> color_eyre::Result<Cfa> {
    let mut b = CfaBuilder::new();
    let (m_entry, m_exit) = b.function("main", &[])?;
    let (f_entry, f_exit) = b.function("inc", &["a"])?;
    b.assign(
        f_entry,
        f_exit,
        &return_variable("inc"),
        Term::var("inc::a").add(Term::constant(1)),
    )?;

    let g_set = b.node("main")?;
    let havoc = b.node("main")?;
    let big = b.node("main")?;
    let call = b.node("main")?;
    let check_guard = b.node("main")?;
    let check_overflow = b.node("main")?;
    let check_sign = b.node("main")?;
    let guard = b.error_node("main", "guard")?;
    let overflow = b.error_node("main", "overflow")?;
    let sign = b.error_node("main", "sign")?;

    b.assign(m_entry, g_set, "g", Term::constant(0))?;
    b.havoc(g_set, havoc, "n")?;
    b.branch(havoc, Term::var("n").greater_than(Term::constant(10)), big, call)?;
    b.assign(big, call, "g", Term::constant(1))?;
    b.call(call, check_guard, "inc", vec![Term::var("n")], Some("r"))?;
    b.branch(
        check_guard,
        Formula::and([
            Term::var("g").equals(Term::constant(1)),
            Term::var("n").less_than(Term::constant(5)),
        ]),
        guard,
        check_overflow,
    )?;
    b.branch(
        check_overflow,
        Term::var("r").equals(Term::constant(0)),
        overflow,
        check_sign,
    )?;
    b.branch(check_sign, Term::var("g").less_than(Term::constant(0)), sign, m_exit)?;

    Ok(b.build("main")?)
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    let cfa = Rc::new(sample_program()?);
    println!(
        "cfa: {} nodes, {} functions, properties = {:?}",
        cfa.num_nodes(),
        cfa.functions().count(),
        cfa.properties()
    );

    if args.dot {
        let cpa = CompositeCpa::new(
            vec![
                Component::Location(LocationCpa::new(cfa.clone())),
                Component::Callstack(CallstackCpa::new("main", 16, false)),
                Component::Interval(IntervalCpa::new(cfa.clone(), args.width)),
            ],
            args.width,
        );
        let mut engine = ReachabilityEngine::new(
            cpa,
            cfa.clone(),
            Precision::empty(),
            WaitlistOrder::Bfs,
            ShutdownNotifier::new(),
            Rc::new(Statistics::new()),
        );
        let status = engine.run()?;
        info!("Plain exploration finished: {:?}", status);
        println!("{}", engine.arg().to_dot()?);
    }

    let config = CegarConfig {
        use_intervals: !args.no_intervals,
        order: if args.bfs { WaitlistOrder::Bfs } else { WaitlistOrder::Dfs },
        partition: if args.well_scoped {
            InterpolationPartition::WellScoped
        } else {
            InterpolationPartition::Unscoped
        },
        scope: if args.global {
            PrecisionScope::Global
        } else {
            PrecisionScope::Location
        },
        max_refinements: args.max_refinements,
        ..CegarConfig::default()
    };
    let solver = Rc::new(BddSolver::new(args.width));

    // Single run: stops at the first violated property.
    let cegar = Cegar::new(cfa.clone(), solver.clone(), config.clone());
    let verdict = cegar.run()?;
    println!("first verdict: {}", verdict);
    if let Verdict::False {
        witness: Witness::Path(cex),
        ..
    } = &verdict
    {
        println!("{}", cex.describe(&cfa));
    }
    println!("statistics:\n{}", cegar.statistics());

    // All properties, partition by partition.
    let partitioning = if args.together {
        Partitioning::All
    } else {
        Partitioning::Individual
    };
    let mut driver = MultiPropertyDriver::new(Cegar::new(cfa.clone(), solver, config)).with_partitioning(partitioning);
    if let Some(seconds) = args.timeout {
        driver = driver.with_inner_time_limit(Duration::from_secs(seconds));
    }
    let results = driver.run()?;
    println!("results:\n{}", results);
    for (property, verdict) in &results.verdicts {
        if let PropertyVerdict::False {
            witness: Witness::Path(cex),
            ..
        } = verdict
        {
            println!("witness for `{}`:\n{}", property, cex.describe(&cfa));
        }
    }
    println!("statistics:\n{}", driver.cegar().statistics());

    let time_total = time_total.elapsed();
    println!("Done in {:.2} s", time_total.as_secs_f64());

    Ok(())
}
