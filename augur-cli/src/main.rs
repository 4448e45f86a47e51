//! Augur CLI — lottery suggestions, equities screening, calibration and
//! history ingestion.
//!
//! Commands:
//! - `draw` — suggest picks for a preset game
//! - `screen` — rank a universe of tickers
//! - `ingest` — merge a CSV file into the history store
//! - `calibrate` — label archived runs, refit agent weights, append bins
//! - `show-weights` — print the active agent weights and cap
//! - `autotune` — pick κ from temporal logs and outcomes
//! - `replay` — re-run an archived run from its recorded inputs

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use augur_core::domain::{Bar, DrawRow, GameRules};
use augur_core::history::HistoryStore;
use augur_core::selector::Mode;
use augur_runner::autotune::{self, Metric, DEFAULT_GRID, DEFAULT_GRID_STEPS};
use augur_runner::calibrate::{self, CalibrateOptions, WEIGHTS_FILE};
use augur_runner::orchestrator::AgentWeights;
use augur_runner::{AugurConfig, Core, LotteryOutput, Replay, RunInputs, ScreenInputs, ScreenOutput};

#[derive(Parser)]
#[command(
    name = "augur",
    about = "Augur CLI — probabilistic lottery suggester and breakout screener"
)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "augur.toml")]
    config: PathBuf,

    /// Offline mode: no network access for oracle signals.
    #[arg(long, global = true, default_value_t = false)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Auto,
    MostLikely,
    Rainbow,
    OracleForward,
}

impl From<ModeArg> for Mode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Auto => Mode::Auto,
            ModeArg::MostLikely => Mode::MostLikely,
            ModeArg::Rainbow => Mode::Rainbow,
            ModeArg::OracleForward => Mode::OracleForward,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Suggest picks for a preset game.
    Draw {
        /// Game preset: powerball, mega_millions, lotto_texas, cash_five, pick3, pick4.
        #[arg(long)]
        game: String,

        /// Master seed. Derived from game and date when omitted.
        #[arg(long)]
        seed: Option<u64>,

        #[arg(long = "n-picks", alias = "n_picks", default_value_t = 10)]
        n_picks: usize,

        /// As-of date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        as_of: Option<String>,

        #[arg(long, value_enum, default_value_t = ModeArg::Auto)]
        mode: ModeArg,

        /// User chaos in [0, 1].
        #[arg(long, default_value_t = 0.0)]
        chaos: f64,

        /// Override the tuned κ.
        #[arg(long, allow_hyphen_values = true)]
        kappa: Option<f64>,

        /// Advertised jackpot, in dollars.
        #[arg(long)]
        jackpot: Option<f64>,

        /// Print the full output bundle as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Rank a universe of tickers by fused breakout score.
    Screen {
        /// Comma-separated tickers, or a file listing them.
        #[arg(long)]
        universe: String,

        /// Archive name for the run. Defaults to the file stem or "universe".
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        benchmark: Option<String>,

        #[arg(long)]
        as_of: Option<String>,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, allow_hyphen_values = true)]
        kappa: Option<f64>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Merge a CSV file into the history store.
    Ingest {
        /// Entity id: a game name or a ticker.
        #[arg(long)]
        entity: String,

        #[arg(long)]
        file: PathBuf,

        /// Game preset for draw history. Without it the file is read as OHLCV bars.
        #[arg(long)]
        game: Option<String>,
    },
    /// Label archived runs, refit agent weights and append calibration bins.
    Calibrate {
        #[arg(long = "lookback_days", alias = "lookback-days", default_value_t = 90)]
        lookback_days: i64,

        #[arg(long = "horizon_days", alias = "horizon-days", default_value_t = 5)]
        horizon_days: usize,

        #[arg(long = "target_pct", alias = "target-pct", default_value_t = 3.0)]
        target_pct: f64,

        #[arg(long)]
        as_of: Option<String>,
    },
    /// Print the active agent weights and multiplier cap.
    ShowWeights,
    /// Scan κ over a grid and persist the best value.
    Autotune {
        /// Grid bounds as `lo,hi`.
        #[arg(long, allow_hyphen_values = true)]
        grid: Option<String>,

        #[arg(long, default_value_t = DEFAULT_GRID_STEPS)]
        steps: usize,

        /// log_loss, auc or mse.
        #[arg(long, default_value_t = Metric::LogLoss)]
        metric: Metric,
    },
    /// Re-run an archived run without persisting.
    Replay {
        /// Run directory, e.g. data/runs/powerball/20240601T120000000Z.
        dir: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = AugurConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    if cli.offline {
        config.oracle.offline = true;
    }

    match cli.command {
        Commands::Draw {
            game,
            seed,
            n_picks,
            as_of,
            mode,
            chaos,
            kappa,
            jackpot,
            json,
        } => {
            let mut inputs = RunInputs::for_game(&game, parse_date(as_of.as_deref())?)?;
            inputs.options.seed = seed;
            inputs.options.n_picks = n_picks;
            inputs.options.mode = mode.into();
            inputs.options.chaos = chaos;
            inputs.options.kappa = kappa;
            inputs.jackpot = jackpot;
            let core = Core::new(config)?;
            let out = core.run_lottery(&inputs)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_lottery(&out);
            }
            Ok(())
        }
        Commands::Screen {
            universe,
            name,
            benchmark,
            as_of,
            seed,
            kappa,
            json,
        } => {
            let (default_name, tickers) = read_universe(&universe)?;
            let mut inputs = ScreenInputs::new(
                name.as_deref().unwrap_or(&default_name),
                parse_date(as_of.as_deref())?,
                tickers,
            );
            inputs.benchmark = benchmark;
            inputs.options.seed = seed;
            inputs.options.kappa = kappa;
            let core = Core::new(config)?;
            let out = core.run_screen(&inputs)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_screen(&out);
            }
            Ok(())
        }
        Commands::Ingest { entity, file, game } => run_ingest(&config, &entity, &file, game.as_deref()),
        Commands::Calibrate {
            lookback_days,
            horizon_days,
            target_pct,
            as_of,
        } => {
            let opts = CalibrateOptions {
                as_of: parse_date(as_of.as_deref())?,
                lookback_days,
                horizon_days,
                target_pct,
            };
            let store = HistoryStore::new(config.paths.history_dir());
            let report = calibrate::run_calibration(&config.paths, &config.calibration, &store, &opts)?;
            println!("Runs scanned:     {}", report.runs_scanned);
            println!("Labelled samples: {}", report.samples);
            println!("Outcomes written: {}", report.outcomes_written);
            println!("Cap high:         {:.4}", report.cap_high);
            match (&report.weights, &report.weights_path) {
                (Some(w), Some(path)) => {
                    println!("Weights (L1 {:.3}) saved to {}", w.l1(), path.display());
                    print_weights(w);
                }
                _ => println!("Weights unchanged"),
            }
            Ok(())
        }
        Commands::ShowWeights => {
            let dir = config.paths.calibration_dir();
            let weights = AgentWeights::load_or_neutral(&dir.join(WEIGHTS_FILE));
            if weights.weights.is_empty() {
                println!("No learned weights; multiplier is neutral.");
            } else {
                println!("Weights from {}", weights.timestamp);
                print_weights(&weights);
            }
            println!("Cap high: {:.4}", calibrate::current_cap(&dir));
            Ok(())
        }
        Commands::Autotune { grid, steps, metric } => {
            let (lo, hi) = match grid.as_deref() {
                Some(g) => parse_grid(g)?,
                None => DEFAULT_GRID,
            };
            let grid = autotune::linear_grid(lo, hi, steps);
            match autotune::autotune(&config.paths, &grid, metric)? {
                Some(t) => println!(
                    "kappa = {:e} ({} = {:.6}, {} samples) saved to {}",
                    t.kappa,
                    t.metric,
                    t.score,
                    t.samples,
                    config.paths.kappa_path().display()
                ),
                None => println!("No joined log/outcome rows; kappa unchanged."),
            }
            Ok(())
        }
        Commands::Replay { dir } => {
            let core = Core::new(config)?;
            match core.replay(&dir)? {
                Replay::Lottery(out) => print_lottery(&out),
                Replay::Screen(out) => print_screen(&out),
            }
            Ok(())
        }
    }
}

fn parse_date(raw: Option<&str>) -> Result<NaiveDate> {
    match raw {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD")),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

fn parse_grid(raw: &str) -> Result<(f64, f64)> {
    let Some((lo, hi)) = raw.split_once(',') else {
        bail!("--grid expects 'lo,hi', got '{raw}'");
    };
    let lo: f64 = lo.trim().parse().with_context(|| format!("bad grid bound '{lo}'"))?;
    let hi: f64 = hi.trim().parse().with_context(|| format!("bad grid bound '{hi}'"))?;
    if !lo.is_finite() || !hi.is_finite() {
        bail!("grid bounds must be finite");
    }
    Ok((lo, hi))
}

/// `(name, tickers)` from a comma list or a file of tickers.
fn read_universe(raw: &str) -> Result<(String, Vec<String>)> {
    let path = Path::new(raw);
    let (name, content) = if path.is_file() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read universe {}", path.display()))?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("universe")
            .to_string();
        (stem, content)
    } else {
        ("universe".to_string(), raw.to_string())
    };
    let tickers: Vec<String> = content
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(|t| t.trim().to_ascii_uppercase())
        .filter(|t| !t.is_empty() && !t.starts_with('#'))
        .collect();
    if tickers.is_empty() {
        bail!("universe '{raw}' lists no tickers");
    }
    Ok((name, tickers))
}

fn run_ingest(config: &AugurConfig, entity: &str, file: &Path, game: Option<&str>) -> Result<()> {
    let store = HistoryStore::new(config.paths.history_dir());
    let (parsed, dropped, stored) = match game {
        Some(game) => {
            let rules = GameRules::preset(game)?;
            let loaded = HistoryStore::import::<DrawRow>(file, &rules)?;
            let stored = store.append(entity, loaded.rows.as_slice(), &rules)?;
            (loaded.rows.len(), loaded.dropped, stored)
        }
        None => {
            let loaded = HistoryStore::import::<Bar>(file, &())?;
            let stored = store.append(entity, loaded.rows.as_slice(), &())?;
            (loaded.rows.len(), loaded.dropped, stored)
        }
    };
    println!("{entity}: {parsed} rows parsed, {dropped} dropped, {stored} stored");
    Ok(())
}

fn print_weights(weights: &AgentWeights) {
    for (agent, w) in &weights.weights {
        println!("  {agent:<16} {w:>8.4}");
    }
}

fn print_lottery(out: &LotteryOutput) {
    println!(
        "{} as of {} — mode {}, health {:?}",
        out.entity, out.as_of, out.telemetry.mode, out.health.status
    );
    println!(
        "Combined {:.2} (base {:.2} × {:.4}) {} confidence {:.2}",
        out.fused.combined,
        out.fused.base,
        out.fused.multiplier,
        out.fused.label.as_str(),
        out.fused.confidence
    );
    println!();
    for (i, pick) in out.picks.iter().enumerate() {
        let whites: Vec<String> = pick.white.iter().map(|w| format!("{w:>2}")).collect();
        match pick.special {
            Some(s) => println!("{:>3}. {}  [{s:>2}]", i + 1, whites.join(" ")),
            None => println!("{:>3}. {}", i + 1, whites.join(" ")),
        }
    }
    println!();
    print!("{}", out.explain.to_text());
    for issue in &out.health.issues {
        println!("! {issue}");
    }
    if let Some(dir) = &out.run_dir {
        println!("Archived to: {}", dir.display());
    }
}

fn print_screen(out: &ScreenOutput) {
    println!(
        "{} as of {} — {} tickers, health {:?}",
        out.name,
        out.as_of,
        out.ranked.len(),
        out.health.status
    );
    println!();
    println!(
        "{:<8} {:>7} {:>9} {:>8} {:>8} {:<7} {:>6}",
        "Ticker", "P_up", "Base", "Mult", "Combined", "Label", "Conf"
    );
    println!("{}", "-".repeat(60));
    for r in &out.ranked {
        println!(
            "{:<8} {:>7.3} {:>9.2} {:>8.4} {:>8.2} {:<7} {:>6.2}",
            r.ticker(),
            r.row.p_up,
            r.fused.base,
            r.fused.multiplier,
            r.fused.combined,
            r.fused.label.as_str(),
            r.fused.confidence
        );
    }
    if !out.telemetry.why_hints.is_empty() {
        println!();
        println!("Why: {}", out.telemetry.why_hints.join("; "));
    }
    if let Some(dir) = &out.run_dir {
        println!("Archived to: {}", dir.display());
    }
}
