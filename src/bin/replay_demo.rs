//! Drive a prioritized replay buffer with a synthetic market stream.
//!
//! A writer thread feeds transitions (flagging crash bars as critical events)
//! while a consumer thread samples batches and reports surrogate errors back,
//! the way a training loop would. At the end the buffer is snapshotted and
//! reloaded to check crash recovery.
//!
//! Usage:
//! ```bash
//! cargo run --release --bin replay_demo
//! cargo run --release --bin replay_demo -- --steps 200000 --capacity 50000 --snapshot data/replay.snap
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array1;
use prioritized_replay::{
    load_snapshot, EventSignal, ReplayBuffer, ReplayConfig, SharedReplayBuffer, SlotHandle,
    Transition,
};
use rand::prelude::*;
use rand_distr::Normal;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(author, version, about = "Prioritized replay on a synthetic market stream")]
struct Args {
    /// JSON config file (defaults plus REPLAY_* env overrides when absent)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override buffer capacity
    #[arg(long)]
    capacity: Option<usize>,

    /// Number of market bars to generate
    #[arg(long, default_value = "50000")]
    steps: usize,

    /// Training batch size
    #[arg(long, default_value = "64")]
    batch_size: usize,

    /// Per-bar return volatility
    #[arg(long, default_value = "0.002")]
    volatility: f64,

    /// Probability of a crash bar
    #[arg(long, default_value = "0.001")]
    crash_prob: f64,

    /// Retroactive boost applied to the bars leading into a crash
    #[arg(long, default_value = "3.0")]
    boost: f64,

    /// Number of bars before a crash that get boosted
    #[arg(long, default_value = "16")]
    boost_window: usize,

    /// Snapshot output path
    #[arg(long, default_value = "data/replay.snap")]
    snapshot: PathBuf,

    /// Sampling seed
    #[arg(long)]
    seed: Option<u64>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Synthetic bar generator: Gaussian returns with occasional crashes
struct MarketStream {
    rng: StdRng,
    returns: Normal<f64>,
    volatility: f64,
    crash_prob: f64,
}

impl MarketStream {
    fn new(volatility: f64, crash_prob: f64, seed: u64) -> Result<Self> {
        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            returns: Normal::new(0.0, volatility)?,
            volatility,
            crash_prob,
        })
    }

    /// Next bar return and its size in units of volatility
    fn next_return(&mut self) -> (f64, f64) {
        let mut r = self.returns.sample(&mut self.rng);
        if self.rng.gen::<f64>() < self.crash_prob {
            r -= self.volatility * self.rng.gen_range(5.0..12.0);
        }
        (r, r.abs() / self.volatility)
    }

    fn action(&mut self) -> usize {
        self.rng.gen_range(0..3)
    }
}

/// Position implied by a discrete action: flat, long, short
fn position(action: usize) -> f64 {
    match action {
        1 => 1.0,
        2 => -1.0,
        _ => 0.0,
    }
}

fn run_writer(
    buffer: SharedReplayBuffer,
    args: &Args,
    state_dim: usize,
    seed: u64,
    progress: ProgressBar,
) -> Result<usize> {
    let mut market = MarketStream::new(args.volatility, args.crash_prob, seed)?;
    let mut window: VecDeque<f64> = VecDeque::from(vec![0.0; state_dim]);
    let mut lookback: VecDeque<SlotHandle> = VecDeque::with_capacity(args.boost_window);
    let mut crashes = 0;

    for step in 0..args.steps {
        let state = Array1::from_iter(window.iter().copied());
        let action = market.action();
        let (r, sigmas) = market.next_return();

        window.pop_front();
        window.push_back(r);
        let next_state = Array1::from_iter(window.iter().copied());

        let reward = position(action) * r;
        let critical = sigmas > 4.0;
        let signal = if critical {
            EventSignal::critical((sigmas / 12.0).min(1.0))
        } else {
            EventSignal::none()
        };

        let mut transition = Transition::new(state, action, reward, next_state, false);
        if critical {
            transition = transition
                .with_tag("event", "crash")
                .with_tag("sigmas", format!("{:.1}", sigmas));
        }
        let handle = buffer.add(transition, None, signal)?;

        if critical {
            crashes += 1;
            let handles: Vec<SlotHandle> = lookback.iter().copied().collect();
            let outcome = buffer.boost(&handles, args.boost)?;
            progress.println(format!(
                "Bar {}: crash of {:.1} sigma, boosted {} preceding bars ({} already overwritten)",
                step, sigmas, outcome.applied, outcome.stale
            ));
        }

        if lookback.len() == args.boost_window {
            lookback.pop_front();
        }
        if args.boost_window > 0 {
            lookback.push_back(handle);
        }
        progress.inc(1);
    }

    Ok(crashes)
}

fn run_consumer(
    buffer: SharedReplayBuffer,
    batch_size: usize,
    writer_done: Arc<AtomicBool>,
) -> Result<(usize, usize)> {
    let mut baseline = 0.0;
    let mut batches = 0;
    let mut stale = 0;

    loop {
        let finished = writer_done.load(Ordering::Acquire);
        let batch = match buffer.sample(batch_size) {
            Ok(batch) => batch,
            Err(e) if e.is_retryable() => {
                if finished {
                    break;
                }
                thread::yield_now();
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        // Surrogate error: weighted distance of the reward from a running baseline
        let errors: Vec<f64> = batch
            .iter()
            .map(|(experience, _, weight)| weight * (experience.reward - baseline).abs() * 1e3)
            .collect();
        let mean_reward =
            batch.experiences.iter().map(|e| e.reward).sum::<f64>() / batch.len() as f64;
        baseline = 0.99 * baseline + 0.01 * mean_reward;

        stale += buffer.update_priorities(&batch.handles, &errors)?.stale;
        batches += 1;

        if finished {
            break;
        }
    }

    Ok((batches, stale))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level: Level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &args.config {
        Some(path) => ReplayConfig::from_file(path)
            .with_context(|| format!("loading config from {:?}", path))?,
        None => ReplayConfig::from_env(),
    };
    if let Some(capacity) = args.capacity {
        config.capacity = capacity;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    let seed = config.seed.unwrap_or_else(rand::random);
    let state_dim = config.state_dim;

    info!(
        "Replay buffer: capacity {}, alpha {}, beta {} over {} samples, critical boost {}",
        config.capacity,
        config.alpha,
        config.beta_start,
        config.beta_frames,
        config.critical_boost_factor
    );

    let buffer = SharedReplayBuffer::new(config.clone())?;
    let writer_done = Arc::new(AtomicBool::new(false));

    let progress = ProgressBar::new(args.steps as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let consumer = {
        let buffer = buffer.clone();
        let writer_done = Arc::clone(&writer_done);
        let batch_size = args.batch_size;
        thread::spawn(move || run_consumer(buffer, batch_size, writer_done))
    };

    let crashes = run_writer(buffer.clone(), &args, state_dim, seed, progress.clone());
    writer_done.store(true, Ordering::Release);
    progress.finish_with_message("Stream complete");

    let crashes = crashes?;
    let (batches, stale) = consumer
        .join()
        .map_err(|_| anyhow::anyhow!("consumer thread panicked"))??;

    let stats = buffer.stats();
    info!("Crash bars: {}", crashes);
    info!("Trained on {} batches, {} stale priority updates", batches, stale);
    info!("{}", stats);

    let latest = buffer.recent(5, false);
    for experience in &latest {
        info!(
            "#{}: action {}, reward {:+.6}, priority {:.4}, tags {:?}",
            experience.inserted_at,
            experience.action,
            experience.reward,
            experience.priority,
            experience.metadata
        );
    }

    if let Some(parent) = args.snapshot.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    buffer.save(&args.snapshot)?;

    let restored = ReplayBuffer::from_snapshot(load_snapshot(&args.snapshot)?, Some(seed))?;
    let restored_stats = restored.stats();
    if restored_stats.size == stats.size
        && restored_stats.write_cursor == stats.write_cursor
        && restored_stats.total_mass == stats.total_mass
    {
        info!(
            "Snapshot verified: {} experiences restored from {:?}",
            restored_stats.size, args.snapshot
        );
    } else {
        warn!("Restored buffer differs from live buffer: {}", restored_stats);
    }

    Ok(())
}
