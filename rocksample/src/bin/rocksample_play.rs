use std::fs::File;

use pomcp::{render, Params, Pomcp};
use pomdp::{utils, Simulator};
use rocksample::{RockSample, A_CHECK, A_SAMPLE};
use text_io::read;

fn main() {
  let prompt = ">";
  let problem = RockSample::new(7, 8);
  let mut rng = utils::rng_from_env();
  let mut state = problem.create_start_state(&mut rng);
  let params = Params {
    num_simulations: 4096,
    num_start_states: 1024,
    exploration_constant: problem.reward_range(),
    reuse_tree: true,
    ..Params::default()
  };
  let mut engine = Pomcp::new(&problem, params, utils::rng_from_env());
  loop {
    print!("{}", prompt);
    let command: String = read!();
    let action = match command.as_str() {
      "print" => {
        println!("{}", problem.display_state(&state));
        continue;
      }
      "dot" => {
        render::save(
          engine.tree(),
          engine.root(),
          File::create("rocksample.dot").unwrap(),
          0.0,
          4,
        );
        continue;
      }
      "auto" => engine.select_action(),
      "n" => 0,
      "s" => 1,
      "e" => 2,
      "w" => 3,
      "sample" => A_SAMPLE,
      "check" => {
        let rock: usize = read!();
        A_CHECK + rock
      }
      "exit" | "quit" | "bye" => {
        return;
      }
      _ => continue,
    };
    let outcome = problem.step(&mut rng, &mut state, action);
    println!(
      "{} -> {} reward {}",
      problem.action_name(action),
      problem.observation_name(outcome.observation),
      outcome.reward
    );
    engine.update(action, outcome.observation, outcome.reward);
    if outcome.terminal {
      println!("episode over");
      return;
    }
  }
}
