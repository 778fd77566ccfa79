use std::{
  fs::File,
  io::{BufWriter, Write},
  path::PathBuf,
  sync::Mutex,
  time::{Duration, Instant},
};

use cellar::{Cellar, CellarParams};
use clap::Parser;
use flexi_logger::Logger;
use log::{debug, error, info};
use pomcp::{Params, Pomcp};
use pomdp::{utils, Simulator};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rocksample::RockSample;
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(about = "Batch experiment driver for the online POMDP planner")]
struct Opt {
  /// built-in domain name: bandit, chain, rocksample, rockline, cellar
  #[arg(long)]
  problem: String,
  /// domain size parameter
  #[arg(long)]
  size: Option<usize>,
  /// domain count parameter (rocks, bottles, ...)
  #[arg(long)]
  number: Option<usize>,
  /// independent experiments per sweep point
  #[arg(long, default_value_t = 1)]
  runs: u32,
  /// per-decision simulation budget, given as log2
  #[arg(long)]
  simulations: Option<u32>,
  /// sweep start, log2 of the budget
  #[arg(long)]
  mindoubles: Option<u32>,
  /// sweep end, log2 of the budget
  #[arg(long)]
  maxdoubles: Option<u32>,
  /// wall-clock safety stop per run, in seconds
  #[arg(long)]
  timeout: Option<f64>,
  #[arg(long, default_value = "results.txt")]
  outputfile: PathBuf,
  #[arg(long)]
  usetransforms: bool,
  #[arg(long)]
  userave: bool,
  #[arg(long)]
  usepgs: bool,
  #[arg(long)]
  reusetree: bool,
  /// master seed; RNG_SEED or system entropy when absent
  #[arg(long)]
  seed: Option<u64>,
  /// decisions per run before giving up on the episode
  #[arg(long, default_value_t = 200)]
  horizon: u32,
  #[arg(long)]
  verbose: bool,
}

#[derive(Error, Debug)]
enum DriverError {
  #[error("unknown problem '{0}'")]
  UnknownProblem(String),
  #[error("bad sweep range {0}..{1}")]
  BadRange(u32, u32),
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

fn main() {
  let opt = Opt::parse();
  Logger::try_with_env_or_str(if opt.verbose { "debug" } else { "info" })
    .unwrap()
    .start()
    .unwrap();
  if let Err(e) = dispatch(&opt) {
    error!("{e}");
    std::process::exit(1);
  }
}

fn dispatch(opt: &Opt) -> Result<(), DriverError> {
  match opt.problem.as_str() {
    "bandit" => sweep(&problems::two_armed_bandit(0.0, 1.0), opt),
    "chain" => sweep(&problems::hidden_chain(), opt),
    "rocksample" => sweep(
      &RockSample::new(opt.size.unwrap_or(7), opt.number.unwrap_or(8)),
      opt,
    ),
    "rockline" => sweep(&RockSample::line(opt.size.unwrap_or(5)), opt),
    "cellar" => match (opt.size.unwrap_or(5), opt.number.unwrap_or(2)) {
      (7, 8) => sweep(&Cellar::seven_eight(), opt),
      (11, 11) => sweep(&Cellar::eleven_eleven(), opt),
      (5, 1) => sweep(&Cellar::five_one(), opt),
      (size, bottles) => sweep(
        &Cellar::new(CellarParams {
          size,
          bottles,
          crates: 6,
          shelves: 4,
        }),
        opt,
      ),
    },
    other => Err(DriverError::UnknownProblem(other.to_string())),
  }
}

struct RunResult {
  run: u32,
  discounted: f32,
  undiscounted: f32,
  simulations: u64,
  lines: Vec<String>,
}

fn sweep<P>(problem: &P, opt: &Opt) -> Result<(), DriverError>
where
  P: Simulator + Sync,
  P::State: Send,
{
  let (lo, hi) = match (opt.mindoubles, opt.maxdoubles, opt.simulations) {
    (Some(lo), Some(hi), _) => (lo, hi),
    (None, None, Some(s)) => (s, s),
    (None, None, None) => (10, 10),
    _ => return Err(DriverError::BadRange(0, 0)),
  };
  if lo > hi || hi >= 31 {
    return Err(DriverError::BadRange(lo, hi));
  }
  let master_seed = opt
    .seed
    .or_else(utils::env_seed)
    .unwrap_or_else(|| StdRng::from_entropy().gen());
  info!(
    "problem {} runs {} budget 2^{}..2^{} seed {}",
    opt.problem, opt.runs, lo, hi, master_seed
  );

  let mut out = BufWriter::new(File::create(&opt.outputfile)?);
  writeln!(out, "run,step,action,observation,reward,discounted")?;
  for doubles in lo..=hi {
    let budget = 1u32 << doubles;
    let results = Mutex::new(Vec::with_capacity(opt.runs as usize));
    rayon::scope(|s| {
      for run in 0..opt.runs {
        let results = &results;
        s.spawn(move |_| {
          let record = single_run(problem, opt, budget, master_seed, doubles, run);
          results.lock().unwrap().push(record);
        });
      }
    });
    let mut results = results.into_inner().unwrap();
    results.sort_by_key(|r| r.run);

    for record in &results {
      for line in &record.lines {
        writeln!(out, "{line}")?;
      }
    }
    let returns: Vec<f32> = results.iter().map(|r| r.discounted).collect();
    let mean = returns.iter().sum::<f32>() / returns.len() as f32;
    let stderr = if returns.len() > 1 {
      let var = returns.iter().map(|x| (x - mean) * (x - mean)).sum::<f32>()
        / (returns.len() as f32 - 1.0);
      (var / returns.len() as f32).sqrt()
    } else {
      0.0
    };
    let undiscounted =
      results.iter().map(|r| r.undiscounted).sum::<f32>() / results.len() as f32;
    let simulations: u64 = results.iter().map(|r| r.simulations).sum();
    writeln!(
      out,
      "# budget {budget} runs {} mean {mean:.4} stderr {stderr:.4} undiscounted {undiscounted:.4} simulations {simulations}",
      results.len()
    )?;
    out.flush()?;
    info!("budget {budget}: mean {mean:.3} stderr {stderr:.3}");
  }
  Ok(())
}

fn single_run<P>(
  problem: &P,
  opt: &Opt,
  budget: u32,
  master_seed: u64,
  doubles: u32,
  run: u32,
) -> RunResult
where
  P: Simulator,
{
  // one deterministic stream per (sweep point, run), independent of thread
  // scheduling
  let seed = master_seed
    .wrapping_add(doubles as u64 * 1_000_003)
    .wrapping_add(run as u64 * 7919);
  let params = Params {
    num_simulations: budget,
    exploration_constant: problem.reward_range(),
    num_start_states: budget.clamp(64, 4096) as usize,
    num_transforms: (budget / 16).max(4) as usize,
    max_attempts: (budget / 4).max(16) as usize,
    use_rave: opt.userave,
    use_transforms: opt.usetransforms,
    use_pgs: opt.usepgs,
    reuse_tree: opt.reusetree,
    ..Params::default()
  };
  let deadline = opt
    .timeout
    .map(|s| Instant::now() + Duration::from_secs_f64(s));
  let mut engine = Pomcp::new(problem, params, StdRng::seed_from_u64(seed));
  let mut world = StdRng::seed_from_u64(seed ^ 0x9e37_79b9_7f4a_7c15);
  let mut state = problem.create_start_state(&mut world);

  let mut lines = Vec::new();
  let mut discounted = 0.0;
  let mut undiscounted = 0.0;
  let mut factor = 1.0;
  let mut simulations = 0u64;
  for step in 0..opt.horizon {
    let (action, used) = plan(&mut engine, budget, deadline);
    simulations += used;
    let outcome = problem.step(&mut world, &mut state, action);
    discounted += factor * outcome.reward;
    undiscounted += outcome.reward;
    factor *= problem.discount();
    debug!(
      "run {run} step {step}: {} -> {} r {}\n{}",
      problem.action_name(action),
      problem.observation_name(outcome.observation),
      outcome.reward,
      problem.display_state(&state)
    );
    lines.push(format!(
      "{run},{step},{action},{},{},{discounted}",
      outcome.observation, outcome.reward
    ));
    engine.update(action, outcome.observation, outcome.reward);
    if outcome.terminal {
      break;
    }
    if deadline.map(|d| Instant::now() > d).unwrap_or(false) {
      debug!("run {run}: wall clock expired after step {step}");
      break;
    }
  }
  RunResult {
    run,
    discounted,
    undiscounted,
    simulations,
    lines,
  }
}

// budgeted planning loop over the single-simulation hook, so the wall clock
// can cut a decision short
fn plan<P: Simulator>(
  engine: &mut Pomcp<'_, P>,
  budget: u32,
  deadline: Option<Instant>,
) -> (usize, u64) {
  let mut done = 0u64;
  while done < budget as u64 {
    engine.run_single_simulation();
    done += 1;
    if done % 32 == 0 && deadline.map(|d| Instant::now() > d).unwrap_or(false) {
      break;
    }
  }
  (engine.best_action(), done)
}
