use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

use sb_core::SectionId;
use sb_interlock::{Interlocking, SignalFunction};
use sb_project::{
    Layout, ProjectResult, SnapshotFile, build_interlocking, load_layout, load_scenario, load_snapshot,
    restore_snapshot, run_scenario, save_snapshot,
};

#[derive(Parser)]
#[command(name = "sb-cli")]
#[command(about = "Signalbox CLI - railway interlocking and signal clearance", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and compile a layout file
    Validate {
        /// Path to the layout YAML file
        layout_path: PathBuf,
    },
    /// List the signals of a layout with their routes and aspects
    Signals {
        /// Path to the layout YAML file
        layout_path: PathBuf,
        /// Snapshot to restore before listing
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Run a scenario against a layout
    Run {
        /// Path to the layout YAML file
        layout_path: PathBuf,
        /// Path to the scenario YAML file
        scenario_path: Option<PathBuf>,
        /// Update ticks to run after the scenario actions
        #[arg(long, default_value_t = 0)]
        ticks: usize,
        /// Snapshot to restore before placing trains
        #[arg(long)]
        restore: Option<PathBuf>,
        /// Write a snapshot file when the run finishes
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Restore a snapshot onto a layout and summarize it
    Snapshot {
        /// Path to the layout YAML file
        layout_path: PathBuf,
        /// Path to the snapshot JSON file
        snapshot_path: PathBuf,
    },
}

fn main() -> ProjectResult<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { layout_path } => cmd_validate(&layout_path),
        Commands::Signals {
            layout_path,
            snapshot,
        } => cmd_signals(&layout_path, snapshot.as_deref()),
        Commands::Run {
            layout_path,
            scenario_path,
            ticks,
            restore,
            snapshot,
        } => cmd_run(
            &layout_path,
            scenario_path.as_deref(),
            ticks,
            restore.as_deref(),
            snapshot.as_deref(),
        ),
        Commands::Snapshot {
            layout_path,
            snapshot_path,
        } => cmd_snapshot(&layout_path, &snapshot_path),
    }
}

fn cmd_validate(layout_path: &Path) -> ProjectResult<()> {
    println!("Validating layout: {}", layout_path.display());
    let layout = load_layout(layout_path)?;
    let compiled = build_interlocking(&layout)?;
    if compiled.dropped.is_empty() {
        println!("✓ Layout is valid");
    } else {
        println!("Layout loaded with {} item(s) dropped:", compiled.dropped.len());
        for dropped in &compiled.dropped {
            println!("  {} {}: {}", dropped.kind, dropped.name, dropped.reason);
        }
    }
    println!(
        "  Sections: {}  Signals: {}  Fingerprint: {}",
        compiled.interlocking.graph().len(),
        compiled.interlocking.signals().len(),
        short(&compiled.fingerprint)
    );
    Ok(())
}

fn cmd_signals(layout_path: &Path, snapshot: Option<&Path>) -> ProjectResult<()> {
    let layout = load_layout(layout_path)?;
    let mut il = build_interlocking(&layout)?.interlocking;
    if let Some(path) = snapshot {
        let file = load_snapshot(path)?;
        restore_snapshot(&mut il, &layout, &file)?;
    } else {
        il.tick(true);
    }
    print_signals(&il);
    Ok(())
}

fn cmd_run(
    layout_path: &Path,
    scenario_path: Option<&Path>,
    ticks: usize,
    restore: Option<&Path>,
    snapshot: Option<&Path>,
) -> ProjectResult<()> {
    let layout = load_layout(layout_path)?;
    let mut il = build_interlocking(&layout)?.interlocking;
    println!("Running layout: {}", layout.name);

    if let Some(path) = restore {
        let file = load_snapshot(path)?;
        restore_snapshot(&mut il, &layout, &file)?;
        println!("✓ Restored snapshot taken {}", file.saved_at);
    }

    let started = Instant::now();
    if let Some(path) = scenario_path {
        let scenario = load_scenario(path, &layout)?;
        for (step, outcome) in run_scenario(&mut il, &scenario)?.iter().enumerate() {
            println!("  [{step:>3}] {outcome}");
        }
    }

    let mut updated = 0;
    let mut rotations = 0;
    for tick in 0..ticks {
        let report = il.tick(tick == 0 && restore.is_none());
        updated += report.updated;
        if report.rotation_complete {
            rotations += 1;
        }
    }
    info!(ticks, updated, rotations, "run finished");
    if ticks > 0 {
        println!("  {ticks} tick(s): {updated} signal update(s), {rotations} full rotation(s)");
    }
    println!("✓ Run completed in {:.3} ms", started.elapsed().as_secs_f64() * 1000.0);

    print_signals(&il);
    print_reservations(&il);

    if let Some(path) = snapshot {
        write_snapshot(path, &layout, &il)?;
    }
    Ok(())
}

fn cmd_snapshot(layout_path: &Path, snapshot_path: &Path) -> ProjectResult<()> {
    let layout = load_layout(layout_path)?;
    let file = load_snapshot(snapshot_path)?;
    println!("Snapshot: {}", snapshot_path.display());
    println!("  Layout: {} ({})", file.layout_name, short(&file.layout_fingerprint));
    println!("  Saved at: {}", file.saved_at);
    println!(
        "  Sections: {}  Signals: {}  Passing areas: {}",
        file.state.section_count,
        file.state.signals.len(),
        file.state.deadlocks.len()
    );

    let mut il = build_interlocking(&layout)?.interlocking;
    restore_snapshot(&mut il, &layout, &file)?;
    println!("✓ Restored onto layout: {}", layout.name);
    print_signals(&il);
    print_reservations(&il);
    Ok(())
}

fn write_snapshot(path: &Path, layout: &Layout, il: &Interlocking) -> ProjectResult<()> {
    let file = SnapshotFile::capture(layout, il);
    save_snapshot(path, &file)?;
    println!("✓ Snapshot written: {}", path.display());
    Ok(())
}

fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}

fn print_signals(il: &Interlocking) {
    if il.signals().is_empty() {
        println!("No signals in layout");
        return;
    }
    println!("Signals:");
    for signal in il.signals() {
        let section = section_name(il, signal.section);
        let functions: Vec<&str> = signal
            .heads
            .iter()
            .map(|h| il.function_names().name(h.function))
            .collect();
        let next = signal
            .next_signal(SignalFunction::Normal)
            .and_then(|id| il.signal(id))
            .map(|s| s.name.as_str())
            .unwrap_or("-");
        let train = signal
            .enabled_train()
            .map(|t| format!("train {}", t.train))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<12} {:<8} {:<8} {:<18} next {:<12} {:<24} {:<10} {:?}",
            signal.name,
            section,
            format!("{:?}", signal.direction),
            functions.join("+"),
            next,
            format!("{:?}", signal.block_state()),
            train,
            signal.displayed_aspect()
        );
    }
}

fn print_reservations(il: &Interlocking) {
    let mut lines = Vec::new();
    for section in il.graph().sections() {
        let Some(state) = il.circuit_state(section.id) else {
            continue;
        };
        let occupants: Vec<String> = state
            .occupants()
            .iter()
            .map(|o| format!("train {}", o.train.train))
            .collect();
        let reserved = state.reserved().map(|r| format!("train {}", r.train));
        let locked = state
            .signal_reserved()
            .and_then(|id| il.signal(id))
            .map(|s| format!("signal {}", s.name));
        if occupants.is_empty() && reserved.is_none() && locked.is_none() {
            continue;
        }
        lines.push(format!(
            "  {:<8} occupied [{}] reserved {} locked {}",
            section.name,
            occupants.join(", "),
            reserved.as_deref().unwrap_or("-"),
            locked.as_deref().unwrap_or("-")
        ));
    }
    if lines.is_empty() {
        println!("No sections occupied or reserved");
        return;
    }
    println!("Sections:");
    for line in lines {
        println!("{line}");
    }
}

fn section_name(il: &Interlocking, id: SectionId) -> &str {
    il.graph().section(id).map(|s| s.name.as_str()).unwrap_or("?")
}
