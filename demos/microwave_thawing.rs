// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use manipulator::simulation::kinematic::KinematicSim;
use manipulator::simulation::scene::SceneConfig;
use manipulator::{
    Manipulator, ManipulatorConfig, ManipulatorException, ManipulatorResult, Simulation, ToolCall,
    ToolOutput,
};

/// Thaws food in the microwave of the kinematic scene: opens the door, puts the object inside,
/// closes the door and presses the button.
#[derive(Parser, Debug)]
#[clap(author, version, name = "microwave_thawing")]
struct CommandLineArguments {
    /// JSON file with the controller configuration
    #[clap(short, long)]
    pub config: Option<PathBuf>,
    /// Paces the simulation so that simulated time passes in real time
    #[clap(short, long, action)]
    pub realtime: bool,
    /// Do not render frames
    #[clap(long, action)]
    pub headless: bool,
}

fn main() -> ManipulatorResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = CommandLineArguments::parse();
    let mut config = match &args.config {
        Some(path) => ManipulatorConfig::from_json_file(path)?,
        None => ManipulatorConfig::default(),
    };
    let scene = SceneConfig {
        render_frames: !args.headless,
        ..SceneConfig::default()
    };
    if args.realtime {
        config.simulation.tick_period = Some(Duration::from_secs_f64(scene.dt));
    }

    let mut simulation = Simulation::new(KinematicSim::new(scene), config.simulation)?;
    simulation.start()?;
    let mut manipulator = Manipulator::from_config(simulation.handle(), &config);
    let plan = [
        ToolCall::OpenDoor,
        ToolCall::GripObjectFromAbove {
            object_name: "obj".to_string(),
        },
        ToolCall::PlaceObjectAtDestination {
            object_name: "obj".to_string(),
            destination: Some(config.skills.appliance.fixture.clone()),
            height_offset: 0.04,
            front_offset: 0.,
        },
        ToolCall::CloseDoor,
        ToolCall::PressButton,
    ];
    for call in plan.iter() {
        match call.execute(&mut manipulator) {
            Ok(output) => {
                println!("{}", output);
                if let ToolOutput::Done {
                    succeeded: false, ..
                } = output
                {
                    break;
                }
            }
            Err(ManipulatorException::SimulationStopped { succeeded: true }) => {
                println!("task accomplished during {}", call.name());
                break;
            }
            Err(e) => {
                simulation.stop()?;
                return Err(e);
            }
        }
    }

    if let Some(frame) = simulation.capture_frame()? {
        println!("last frame: {}x{} pixels", frame.width, frame.height);
    }
    let report = simulation.with_backend(|sim| sim.task_report());
    println!("{:#?}", report);
    let succeeded = simulation.task_succeeded() || report.succeeded();
    simulation.stop()?;
    if succeeded {
        println!("Task accomplished successfully!");
    } else {
        println!("Task failed.");
    }
    Ok(())
}
