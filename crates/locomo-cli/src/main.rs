//! locomo CLI - run locomotion environments from the terminal
//!
//! Rolls out episodes with simple policies, prints spaces and default
//! configurations, and renders camera frames.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use locomo_envs::{
    make, make_with_config, Ant, Env, EnvId, HalfCheetah, Hopper, Humanoid, Locomotor,
    RacecarConfig, RacecarZedEnv, Step, TimeLimit, Walker2D, WalkerBaseEnv, WalkerConfig,
    DEFAULT_MAX_EPISODE_STEPS, TRUNCATED,
};
use locomo_physics::Image;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Racecar action with no throttle and straight wheels.
const COAST: usize = 4;

#[derive(Parser)]
#[command(name = "locomo")]
#[command(about = "Locomotion reinforcement-learning environments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Roll out episodes with a fixed policy and report returns
    Run(RunArgs),
    /// Print the action and observation spaces as JSON
    Spaces {
        /// Environment name, e.g. HopperBulletEnv or hopper
        #[arg(short, long)]
        env: String,
    },
    /// Print the default configuration as TOML
    Config {
        /// Environment name
        #[arg(short, long, default_value = "hopper")]
        env: String,
    },
    /// Render a camera frame to a PNG file
    Frame {
        /// Environment name
        #[arg(short, long)]
        env: String,
        /// Output PNG file
        output: PathBuf,
        /// Image width in pixels (walker tasks only)
        #[arg(long, default_value_t = 320)]
        width: usize,
        /// Image height in pixels (walker tasks only)
        #[arg(long, default_value_t = 240)]
        height: usize,
        /// Steps to simulate with a zero action before rendering
        #[arg(long, default_value_t = 0)]
        steps: usize,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Environment name, e.g. HopperBulletEnv or hopper
    #[arg(short, long)]
    env: String,
    /// Number of episodes
    #[arg(short = 'n', long, default_value_t = 1)]
    episodes: usize,
    /// Seed for the environment and the policy
    #[arg(short, long)]
    seed: Option<u64>,
    /// Action policy
    #[arg(short, long, value_enum, default_value_t = Policy::Random)]
    policy: Policy,
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Episode step limit
    #[arg(long)]
    max_steps: Option<u64>,
    /// Print episode summaries as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Policy {
    /// Uniform samples from the action space
    Random,
    /// All-zero torques (coasting for the racecar)
    Zero,
}

#[derive(Debug, Serialize)]
struct EpisodeSummary {
    episode: usize,
    steps: u64,
    total_reward: f64,
    truncated: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(&args)?,
        Commands::Spaces { env } => show_spaces(&env)?,
        Commands::Config { env } => show_config(&env)?,
        Commands::Frame {
            env,
            output,
            width,
            height,
            steps,
        } => render_frame(&env, &output, width, height, steps)?,
    }

    Ok(())
}

fn read_config(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn policy_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
        None => StdRng::from_entropy(),
    }
}

fn run(args: &RunArgs) -> Result<()> {
    let id: EnvId = args.env.parse()?;
    let max_steps = args.max_steps.unwrap_or(DEFAULT_MAX_EPISODE_STEPS);
    let mut rng = policy_rng(args.seed);
    let policy = args.policy;

    let summaries = if id.is_vision() {
        let config = match &args.config {
            Some(path) => RacecarConfig::from_toml_str(&read_config(path)?)?,
            None => RacecarConfig::default(),
        };
        let mut env = TimeLimit::with_max_steps(RacecarZedEnv::with_config(config)?, max_steps);
        if let Some(seed) = args.seed {
            env.seed(seed);
        }
        let space = env.action_space();
        run_episodes(&mut env, args.episodes, |env| {
            let action = match policy {
                Policy::Random => space.sample_discrete(&mut rng).unwrap_or(COAST),
                Policy::Zero => COAST,
            };
            env.step(&action)
        })?
    } else {
        let config = args
            .config
            .as_deref()
            .map(|path| -> Result<WalkerConfig> {
                Ok(WalkerConfig::from_toml_str(&read_config(path)?)?)
            })
            .transpose()?;
        let env = make_with_config(id.name(), config)?;
        let mut env = TimeLimit::with_max_steps(env.into_inner(), max_steps);
        if let Some(seed) = args.seed {
            env.seed(seed);
        }
        let space = env.action_space();
        run_episodes(&mut env, args.episodes, |env| {
            let action = match policy {
                Policy::Random => space.sample_box(&mut rng).unwrap_or_default(),
                Policy::Zero => vec![0.0; space.dim()],
            };
            env.step(action.as_slice())
        })?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        println!("{} ({:?} policy)", id, policy);
        for s in &summaries {
            println!(
                "  episode {}: {} steps, return {:.3}{}",
                s.episode + 1,
                s.steps,
                s.total_reward,
                if s.truncated { " (time limit)" } else { "" }
            );
        }
        if !summaries.is_empty() {
            let mean =
                summaries.iter().map(|s| s.total_reward).sum::<f64>() / summaries.len() as f64;
            println!("  mean return: {:.3}", mean);
        }
    }
    Ok(())
}

fn run_episodes<E, F>(env: &mut E, episodes: usize, mut act: F) -> Result<Vec<EpisodeSummary>>
where
    E: Env,
    F: FnMut(&mut E) -> locomo_envs::Result<Step<E::Observation>>,
{
    let mut summaries = Vec::with_capacity(episodes);
    for episode in 0..episodes {
        env.reset()?;
        let mut summary = EpisodeSummary {
            episode,
            steps: 0,
            total_reward: 0.0,
            truncated: false,
        };
        loop {
            let step = act(env)?;
            summary.steps += 1;
            summary.total_reward += step.reward;
            if step.done {
                summary.truncated = step.info.contains_key(TRUNCATED);
                break;
            }
        }
        info!(
            episode,
            steps = summary.steps,
            reward = summary.total_reward,
            "episode finished"
        );
        summaries.push(summary);
    }
    Ok(summaries)
}

fn show_spaces(name: &str) -> Result<()> {
    let id: EnvId = name.parse()?;
    let (action, observation) = if id.is_vision() {
        let env = RacecarZedEnv::new()?;
        (env.action_space(), env.observation_space())
    } else {
        let env = make(id.name())?;
        (env.action_space(), env.observation_space())
    };
    let spaces = serde_json::json!({
        "env": id.name(),
        "action_space": action,
        "observation_space": observation,
    });
    println!("{}", serde_json::to_string_pretty(&spaces)?);
    Ok(())
}

fn show_config(name: &str) -> Result<()> {
    let id: EnvId = name.parse()?;
    let toml = match id.default_walker_config() {
        Some(config) => config.to_toml_string()?,
        None => RacecarConfig::default().to_toml_string()?,
    };
    print!("{toml}");
    Ok(())
}

fn walker_frame<L: Locomotor>(robot: L, width: usize, height: usize, steps: usize) -> Result<Image> {
    let mut env = WalkerBaseEnv::new(robot)?;
    env.reset()?;
    let zero = vec![0.0f32; env.robot().action_dim()];
    for _ in 0..steps {
        if env.step(zero.as_slice())?.done {
            break;
        }
    }
    Ok(env.render(width, height))
}

fn render_frame(name: &str, output: &Path, width: usize, height: usize, steps: usize) -> Result<()> {
    let id: EnvId = name.parse()?;
    let frame = match id {
        EnvId::Hopper => walker_frame(Hopper, width, height, steps)?,
        EnvId::Walker2D => walker_frame(Walker2D, width, height, steps)?,
        EnvId::HalfCheetah => walker_frame(HalfCheetah, width, height, steps)?,
        EnvId::Ant => walker_frame(Ant, width, height, steps)?,
        EnvId::Humanoid => walker_frame(Humanoid, width, height, steps)?,
        EnvId::RacecarZed => {
            let mut env = RacecarZedEnv::new()?;
            let mut frame = env.reset()?;
            for _ in 0..steps {
                let step = env.step(&COAST)?;
                frame = step.observation;
                if step.done {
                    break;
                }
            }
            frame
        }
    };
    debug!(width = frame.width, height = frame.height, "rendered frame");

    let (w, h) = (frame.width as u32, frame.height as u32);
    let png = image::RgbaImage::from_raw(w, h, frame.data)
        .context("frame buffer does not match its dimensions")?;
    png.save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Wrote {}x{} frame to {}", w, h, output.display());
    Ok(())
}
