use anyhow::{Context, Result, bail};
use clap::Parser;
use rs_arm_replay::config::ExecutorConfig;
use rs_arm_replay::executor::MotionExecutor;
use rs_arm_replay::frame_transform::FrameTransform;
use rs_arm_replay::pose::Pose6D;
use rs_arm_replay::sim_arm::{SimulatedArm, SimulatedCommand};
use rs_arm_replay::trajectory::Trajectory;

/// Dry run of the trajectory replay against a simulated arm.
///
/// The target is given in the camera frame, as detected. It is converted into the base frame
/// with the calibration of the configuration, the reference trajectory is adapted to reach it
/// and executed with the milestones and fallback policy of the configuration.
#[derive(Parser, Debug)]
#[command(author, version, name = "rs-arm-replay")]
struct CommandLineArguments {
    /// YAML configuration of the executor
    #[arg(long)]
    config: String,

    /// Detected target in the camera frame: x,y,z,roll,pitch,yaw
    #[arg(long, allow_hyphen_values = true)]
    target: String,

    /// Start pose of the simulated arm in the base frame, defaults to the first waypoint
    /// of the reference trajectory
    #[arg(long, allow_hyphen_values = true)]
    start: Option<String>,

    /// Reach of the simulated arm
    #[arg(long, default_value_t = 1.0)]
    reach: f64,

    /// Write the adapted trajectory to this CSV file
    #[arg(long)]
    save_trajectory: Option<String>,

    /// Print the effective configuration
    #[arg(long)]
    print_config: bool,

    /// Return to the home configuration after the execution
    #[arg(long)]
    home: bool,
}

fn parse_pose(text: &str) -> Result<Pose6D> {
    let values = text
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<f64>, _>>()
        .with_context(|| format!("Pose '{}' is not a list of numbers", text))?;
    if values.len() != 6 {
        bail!("Pose '{}' must have 6 values, x,y,z,roll,pitch,yaw, has {}", text, values.len());
    }
    Ok(Pose6D::from_array([values[0], values[1], values[2], values[3], values[4], values[5]]))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rs_arm_replay=info".parse()?)
                .add_directive("warn".parse()?),
        )
        .init();

    let args = CommandLineArguments::parse();
    let config = ExecutorConfig::from_yaml_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;
    if args.print_config {
        println!("{}", config.to_yaml());
    }

    let detected = parse_pose(&args.target)?;
    let goal = FrameTransform::new(&config.calibration_path)
        .convert(&detected)
        .context("Failed to convert the target into the base frame")?;
    println!("Target in camera frame: {}", detected);
    println!("Target in base frame:   {}", goal);

    let start = match &args.start {
        Some(text) => parse_pose(text)?,
        None => {
            let reference = Trajectory::load_reference(&config.reference_trajectory_path)
                .context("Failed to read the reference trajectory")?;
            match reference.first() {
                Some(pose) => *pose,
                None => bail!("Reference trajectory is empty"),
            }
        }
    };

    let mut arm = SimulatedArm::new(start, config.home_state.clone(), args.reach)
        .with_configuration(config.fallback_joint_state.clone(), start);
    arm.timeout = config.command_timeout();

    let mut executor = MotionExecutor::new(arm, &config)?;
    if let Some(path) = &args.save_trajectory {
        executor = executor.with_trajectory_dump(path);
    }

    let result = executor.execute_configured(&goal)?;
    if args.home {
        executor.go_home().context("Failed to return home")?;
    }

    let arm = executor.into_arm();
    let moves = arm
        .log()
        .iter()
        .filter(|command| !matches!(command, SimulatedCommand::Stop))
        .count();
    println!(
        "Execution {}: {} of {} milestones, {} motion commands{}",
        result.state,
        result.milestones_reached,
        config.milestone_indices.len(),
        moves,
        if result.fallback_used { ", fallback used" } else { "" }
    );
    result.into_result()?;
    Ok(())
}
