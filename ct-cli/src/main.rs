//! `ct`: the thin binary wiring `ct-core`'s engine to a terminal (spec.md
//! §1's "command-line driver ... out of the core's scope", §6's CLI
//! surface). Argument parsing, structured logging, progress display, and
//! regression-corpus file I/O live here; every actual algorithm lives in
//! `ct-core`.

mod cli;
mod dump;
mod logging;
mod progress;
mod reference_vm;
mod regressions;
mod subprocess_vm;

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use regex::Regex;

use cli::{Cli, Command, RunArgs};
use ct_core::{HarnessConfig, Specification};
use reference_vm::ReferenceVm;
use subprocess_vm::SubprocessVm;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_tracing(cli.opts.log_level, cli.opts.log_color);

    match run(cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(true)` on a clean pass, `Ok(false)` when the command
/// completed but found failures (matching spec.md §6's "non-zero on any
/// failed rule or internal error" without treating "found issues" as a
/// process-level error).
fn run(command: Command) -> eyre::Result<bool> {
    match command {
        Command::List { filter } => cmd_list(filter),
        Command::Stats => cmd_stats(),
        Command::GeneratorInfo { filter } => cmd_generator_info(filter),
        Command::Test(args) => cmd_test(args),
        Command::Run { vm, args } => cmd_run(&vm, args),
        Command::Probe { vm, rule, seed } => cmd_probe(&vm, &rule, seed),
        Command::Regressions { vm, corpus } => cmd_regressions(&vm, &corpus),
    }
}

fn compile_filter(filter: Option<String>) -> eyre::Result<Option<Regex>> {
    filter.map(|f| Regex::new(&f).map_err(|e| eyre::eyre!("invalid --filter regex: {e}"))).transpose()
}

fn cmd_list(filter: Option<String>) -> eyre::Result<bool> {
    let spec = Specification::new();
    let pattern = compile_filter(filter)?;
    let mut names: Vec<&str> = match &pattern {
        Some(p) => spec.rules_matching(p).into_iter().map(|r| r.name.as_str()).collect(),
        None => spec.rules().iter().map(|r| r.name.as_str()).collect(),
    };
    names.sort_unstable();
    for name in names {
        println!("{name}");
    }
    Ok(true)
}

fn cmd_stats() -> eyre::Result<bool> {
    let spec = Specification::new();
    let total = spec.len();
    let mut regular = 0usize;
    let mut oog = 0usize;
    let mut underflow = 0usize;
    let mut overflow = 0usize;
    let mut bespoke = 0usize;
    for rule in spec.rules() {
        if rule.name.ends_with("_regular") {
            regular += 1;
        } else if rule.name.ends_with("_with_too_little_gas") {
            oog += 1;
        } else if rule.name.ends_with("_with_too_few_stack_elements") {
            underflow += 1;
        } else if rule.name.ends_with("_with_not_enough_stack_space") {
            overflow += 1;
        } else {
            bespoke += 1;
        }
    }

    let mut per_opcode: std::collections::BTreeMap<String, usize> = std::collections::BTreeMap::new();
    for rule in spec.rules() {
        if let Some(op) = rule.opcode_tag {
            *per_opcode.entry(format!("{op:?}")).or_default() += 1;
        }
    }

    println!("{} rules total", total.to_string().bold());
    println!("  regular:            {regular}");
    println!("  out-of-gas:         {oog}");
    println!("  stack underflow:    {underflow}");
    println!("  stack overflow:     {overflow}");
    println!("  bespoke/other:      {bespoke}");
    println!();
    println!("rules per instruction:");
    for (op, count) in per_opcode {
        println!("  {op:<16} {count}");
    }
    Ok(true)
}

fn cmd_generator_info(filter: Option<String>) -> eyre::Result<bool> {
    let spec = Specification::new();
    let pattern = compile_filter(filter)?;
    let rules: Vec<_> = match &pattern {
        Some(p) => spec.rules_matching(p),
        None => spec.rules().iter().collect(),
    };

    let mut total_cases: u64 = 0;
    for rule in rules {
        let test_values = rule.condition.get_test_values();
        let groups = ct_core::testvalue::group_by_property(test_values);
        let cases = ct_core::total_number_of_cases(rule);
        total_cases += cases;
        println!("{}", rule.name.bold());
        for (property, values) in &groups {
            println!("  {property}: {} values", values.len());
        }
        println!("  -> {cases} total cases");
    }
    println!("\n{} cases across all reported rules", total_cases);
    Ok(true)
}

fn cmd_test(args: RunArgs) -> eyre::Result<bool> {
    let vm = ReferenceVm::new();
    run_harness(&vm, args)
}

fn cmd_run(vm_path: &std::path::Path, args: RunArgs) -> eyre::Result<bool> {
    let vm = SubprocessVm::spawn(vm_path)
        .map_err(|e| eyre::eyre!("spawning VM binary {}: {e}", vm_path.display()))?;
    run_harness(&vm, args)
}

fn run_harness(vm: &dyn ct_core::harness::TargetVm, args: RunArgs) -> eyre::Result<bool> {
    let spec = Specification::new();
    let pattern = compile_filter(args.filter)?;
    let rules: Vec<ct_core::Rule> = match &pattern {
        Some(p) => spec.rules_matching(p).into_iter().cloned().collect(),
        None => spec.rules().to_vec(),
    };
    if rules.is_empty() {
        eprintln!("{}", "no rules matched --filter".yellow());
        return Ok(false);
    }

    let profiler_guard = args
        .cpuprofile
        .is_some()
        .then(|| pprof::ProfilerGuardBuilder::default().frequency(1000).build())
        .transpose()
        .map_err(|e| eyre::eyre!("starting cpu profiler: {e}"))?;

    let config = HarnessConfig {
        num_jobs: args.jobs.max(1),
        seed: args.seed,
        full_mode: args.full_mode,
        max_errors: args.max_errors,
        timeout: args.timeout.map(|minutes| std::time::Duration::from_secs(minutes * 60)),
    };

    let printer = std::sync::Mutex::new(progress::ProgressPrinter::new());
    let report = ct_core::harness::run(&rules, vm, config, |update| {
        printer.lock().unwrap_or_else(|e| e.into_inner()).on_update(update);
    });
    let printer = printer.into_inner().unwrap_or_else(|e| e.into_inner());

    if let Some(guard) = profiler_guard {
        if let Some(path) = &args.cpuprofile {
            let report = guard.report().build().map_err(|e| eyre::eyre!("building cpu profile report: {e}"))?;
            let file = std::fs::File::create(path)
                .map_err(|e| eyre::eyre!("creating cpuprofile file {}: {e}", path.display()))?;
            report.flamegraph(file).map_err(|e| eyre::eyre!("writing flamegraph: {e}"))?;
        }
    }

    for issue in &report.issues {
        progress::print_issue(issue);
    }
    if let Some(dir) = &args.dump_dir {
        dump::dump_issues(dir, &report.issues)?;
    }

    let clean = report.issues.is_empty() && !report.aborted;
    printer.finish(&report);
    Ok(clean)
}

fn cmd_probe(vm_path: &std::path::Path, rule_name: &str, seed: u64) -> eyre::Result<bool> {
    let spec = Specification::new();
    let rule = spec
        .rule_by_name(rule_name)
        .ok_or_else(|| eyre::eyre!("no such rule: {rule_name}"))?;
    let vm = SubprocessVm::spawn(vm_path)
        .map_err(|e| eyre::eyre!("spawning VM binary {}: {e}", vm_path.display()))?;

    let mut found_disagreement = false;
    ct_core::enumerate(rule, seed, |case| {
        let mut expected = case.state.clone();
        rule.effect.apply(&mut expected);
        match vm.step(&case.state) {
            Ok(actual) if actual.pc == expected.pc && actual.status == expected.status => {
                ct_core::ConsumerAction::Continue
            }
            Ok(actual) => {
                println!("{} rule {rule_name} disagreed", "probe:".red().bold());
                println!("  pre.pc={} pre.gas={}", case.state.pc, case.state.gas);
                println!("  expected.pc={} expected.status={:?}", expected.pc, expected.status);
                println!("  actual.pc={} actual.status={:?}", actual.pc, actual.status);
                found_disagreement = true;
                ct_core::ConsumerAction::Abort
            }
            Err(e) => {
                println!("{} rule {rule_name} VM error: {e}", "probe:".red().bold());
                found_disagreement = true;
                ct_core::ConsumerAction::Abort
            }
        }
    });

    if !found_disagreement {
        println!("{} no disagreement found for {rule_name}", "probe:".green().bold());
    }
    Ok(!found_disagreement)
}

fn cmd_regressions(vm_path: &std::path::Path, corpus_path: &std::path::Path) -> eyre::Result<bool> {
    let corpus = regressions::load(corpus_path)?;
    let vm = SubprocessVm::spawn(vm_path)
        .map_err(|e| eyre::eyre!("spawning VM binary {}: {e}", vm_path.display()))?;
    let results = regressions::replay(&corpus, &vm);

    let mut all_ok = true;
    for result in &results {
        if result.matched {
            println!("{} {}", "ok".green(), result.rule_name);
        } else {
            all_ok = false;
            println!("{} {}: {}", "FAIL".red().bold(), result.rule_name, result.detail.as_deref().unwrap_or(""));
        }
    }
    println!("\n{}/{} entries matched", results.iter().filter(|r| r.matched).count(), results.len());
    Ok(all_ok)
}
