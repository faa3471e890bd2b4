// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later
use std::io::{self, BufRead};
use std::path::PathBuf;

use clap::Parser;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use manipulator::simulation::kinematic::KinematicSim;
use manipulator::{Manipulator, ManipulatorConfig, ManipulatorResult, Simulation, ToolCall};

/// Executes tool calls read from stdin, one JSON object per line, e.g.
/// {"name": "move_abs", "arguments": {"position": [0.4, 0.0, 1.0]}}
///
/// Prints one result line per call and stops once the task is accomplished.
#[derive(Parser, Debug)]
#[clap(author, version, name = "tool_loop")]
struct CommandLineArguments {
    /// Print the tool declarations as JSON and exit
    #[clap(long, action)]
    pub schemas: bool,
    /// JSON file with the controller configuration
    #[clap(short, long)]
    pub config: Option<PathBuf>,
    /// Maximum number of executed calls
    #[clap(long, default_value_t = 10)]
    pub max_calls: usize,
}

fn split_line(line: &str) -> Result<(String, String), String> {
    let value: Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
    let name = value["name"]
        .as_str()
        .ok_or_else(|| "missing tool name".to_string())?
        .to_string();
    let arguments = match &value["arguments"] {
        Value::Null => String::new(),
        // clients often send the arguments as an encoded string
        Value::String(arguments) => arguments.clone(),
        arguments => arguments.to_string(),
    };
    Ok((name, arguments))
}

fn main() -> ManipulatorResult<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    let args = CommandLineArguments::parse();
    if args.schemas {
        let schemas = Value::Array(ToolCall::schemas());
        println!("{:#}", schemas);
        return Ok(());
    }
    let config = match &args.config {
        Some(path) => ManipulatorConfig::from_json_file(path)?,
        None => ManipulatorConfig::default(),
    };
    let mut simulation = Simulation::new(KinematicSim::default(), config.simulation)?;
    simulation.start()?;
    let mut manipulator = Manipulator::from_config(simulation.handle(), &config);

    let mut calls = 0;
    for line in io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("cannot read stdin: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let result = match split_line(&line) {
            Ok((name, arguments)) => match ToolCall::parse(&name, &arguments) {
                Ok(call) => {
                    calls += 1;
                    call.run(&mut manipulator)
                }
                Err(e) => e.to_string(),
            },
            Err(e) => format!("malformed tool call: {}", e),
        };
        println!("{}", result);
        if manipulator.task_succeeded() || !simulation.is_running() || calls >= args.max_calls {
            break;
        }
    }
    let succeeded = manipulator.task_succeeded();
    simulation.stop()?;
    println!("task successful: {}", succeeded);
    Ok(())
}
