// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the closed menu of operations an external tool-calling client may invoke.
//!
//! A call arrives as a tool name plus a JSON object of arguments. [`ToolCall::parse`] turns it
//! into a typed [`ToolCall`] and validates it before anything is executed, so malformed calls
//! never reach the command buffer.
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::exception::{create_invalid_argument, ManipulatorResult};
use crate::gripper::gripper_state::GripperState;
use crate::robot::resolver::ObjectPose;
use crate::skills::approach::ApproachDirection;
use crate::skills::{Manipulator, PlacementOffsets};

/// One invocation of a tool with typed arguments.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ToolCall {
    GetEefPos,
    GetEefRot,
    GetGripperState,
    ResolveObjectFromName {
        object_name: String,
    },
    OpenGripper,
    CloseGripper,
    MoveAbs {
        position: [f64; 3],
    },
    RotateGripperAbs {
        orientation: Vec<f64>,
    },
    RotateAxis {
        orientation: Vec<f64>,
        axis: usize,
    },
    ApproachFromDirection {
        position: [f64; 3],
        direction: ApproachDirection,
    },
    GripObjectFromAbove {
        object_name: String,
    },
    PlaceObjectAtDestination {
        object_name: String,
        #[serde(default)]
        destination: Option<String>,
        #[serde(default)]
        height_offset: f64,
        #[serde(default)]
        front_offset: f64,
    },
    OpenDoor,
    CloseDoor,
    PressButton,
    CheckSuccessful,
}

/// Result of an executed [`ToolCall`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// End-effector position in the robot frame.
    Position([f64; 3]),
    /// End-effector orientation in the robot frame as Euler angles in \[deg\].
    Orientation([f64; 3]),
    Gripper(GripperState),
    Pose {
        name: String,
        pose: ObjectPose,
    },
    /// Outcome of a primitive or a skill.
    Done {
        tool: String,
        succeeded: bool,
        reason: Option<String>,
    },
    /// Value of the success predicate.
    TaskSucceeded(bool),
}

fn format_vector(values: &[f64]) -> String {
    let parts: Vec<String> = values
        .iter()
        // keeps rounding noise from printing as -0.000
        .map(|value| if value.abs() < 5e-4 { 0. } else { *value })
        .map(|value| format!("{:.3}", value))
        .collect();
    format!("[{}]", parts.join(", "))
}

impl fmt::Display for ToolOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolOutput::Position(position) => write!(f, "position {}", format_vector(position)),
            ToolOutput::Orientation(euler) => write!(f, "orientation {}", format_vector(euler)),
            ToolOutput::Gripper(state) => write!(
                f,
                "gripper is {} (width {:.3})",
                state.status, state.width
            ),
            ToolOutput::Pose { name, pose } => write!(
                f,
                "{}: position {} orientation {}",
                name,
                format_vector(pose.position.as_slice()),
                format_vector(pose.euler().as_slice())
            ),
            ToolOutput::Done {
                tool,
                succeeded: true,
                ..
            } => write!(f, "{} succeeded", tool),
            ToolOutput::Done {
                tool,
                succeeded: false,
                reason: Some(reason),
            } => write!(f, "{} failed: {}", tool, reason),
            ToolOutput::Done { tool, .. } => write!(f, "{} failed", tool),
            ToolOutput::TaskSucceeded(succeeded) => write!(f, "task successful: {}", succeeded),
        }
    }
}

fn check_orientation(orientation: &[f64]) -> ManipulatorResult<()> {
    if orientation.len() != 3 && orientation.len() != 4 {
        return Err(create_invalid_argument(format!(
            "orientation needs 3 Euler angles or 4 quaternion values, got {}",
            orientation.len()
        )));
    }
    Ok(())
}

fn check_finite(position: &[f64]) -> ManipulatorResult<()> {
    if !position.iter().all(|value| value.is_finite()) {
        return Err(create_invalid_argument(format!(
            "{:?} is not a valid position",
            position
        )));
    }
    Ok(())
}

fn function(name: &str, description: &str, properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            },
        },
    })
}

fn no_arguments(name: &str, description: &str) -> Value {
    function(name, description, json!({}), &[])
}

impl ToolCall {
    /// Parses and validates a tool call.
    ///
    /// # Arguments
    /// * `name` - name of the tool
    /// * `arguments` - JSON object with the arguments. An empty string counts as no arguments.
    /// # Errors
    /// * InvalidArgument for unknown tools, missing or malformed arguments, orientations with
    ///   the wrong number of values and unknown approach directions.
    pub fn parse(name: &str, arguments: &str) -> ManipulatorResult<ToolCall> {
        let mut object: Map<String, Value> = if arguments.trim().is_empty() {
            Map::new()
        } else {
            serde_json::from_str(arguments).map_err(|e| {
                create_invalid_argument(format!(
                    "arguments of {} are not a JSON object: {}",
                    name, e
                ))
            })?
        };
        object.insert("name".to_string(), Value::String(name.to_string()));
        let call: ToolCall = serde_json::from_value(Value::Object(object))
            .map_err(|e| create_invalid_argument(format!("{}: {}", name, e)))?;
        call.validate()?;
        Ok(call)
    }

    /// Checks the arguments that the type system does not cover.
    /// # Errors
    /// * InvalidArgument if an argument is out of range.
    pub fn validate(&self) -> ManipulatorResult<()> {
        match self {
            ToolCall::MoveAbs { position } | ToolCall::ApproachFromDirection { position, .. } => {
                check_finite(position)
            }
            ToolCall::RotateGripperAbs { orientation } => check_orientation(orientation),
            ToolCall::RotateAxis { orientation, axis } => {
                check_orientation(orientation)?;
                if *axis > 2 {
                    return Err(create_invalid_argument(format!(
                        "axis has to be 0, 1 or 2, got {}",
                        axis
                    )));
                }
                Ok(())
            }
            ToolCall::PlaceObjectAtDestination {
                height_offset,
                front_offset,
                ..
            } => check_finite(&[*height_offset, *front_offset]),
            _ => Ok(()),
        }
    }

    /// Name of the tool, as used by [`parse`](`Self::parse`).
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::GetEefPos => "get_eef_pos",
            ToolCall::GetEefRot => "get_eef_rot",
            ToolCall::GetGripperState => "get_gripper_state",
            ToolCall::ResolveObjectFromName { .. } => "resolve_object_from_name",
            ToolCall::OpenGripper => "open_gripper",
            ToolCall::CloseGripper => "close_gripper",
            ToolCall::MoveAbs { .. } => "move_abs",
            ToolCall::RotateGripperAbs { .. } => "rotate_gripper_abs",
            ToolCall::RotateAxis { .. } => "rotate_axis",
            ToolCall::ApproachFromDirection { .. } => "approach_from_direction",
            ToolCall::GripObjectFromAbove { .. } => "grip_object_from_above",
            ToolCall::PlaceObjectAtDestination { .. } => "place_object_at_destination",
            ToolCall::OpenDoor => "open_door",
            ToolCall::CloseDoor => "close_door",
            ToolCall::PressButton => "press_button",
            ToolCall::CheckSuccessful => "check_successful",
        }
    }

    /// JSON-schema function declarations of every tool.
    pub fn schemas() -> Vec<Value> {
        let position = json!({
            "type": "array",
            "items": {"type": "number"},
            "minItems": 3,
            "maxItems": 3,
            "description": "x, y, z in metres relative to the robot",
        });
        let orientation = json!({
            "type": "array",
            "items": {"type": "number"},
            "minItems": 3,
            "maxItems": 4,
            "description": "roll, pitch, yaw in degrees or a quaternion x, y, z, w",
        });
        let object_name = json!({"type": "string", "description": "name of the object"});
        vec![
            no_arguments("get_eef_pos", "Returns the gripper position relative to the robot"),
            no_arguments(
                "get_eef_rot",
                "Returns the gripper orientation relative to the robot in degrees",
            ),
            no_arguments(
                "get_gripper_state",
                "Returns whether the gripper is open, closed or gripping something",
            ),
            function(
                "resolve_object_from_name",
                "Finds position and orientation of the object with the given name",
                json!({ "object_name": object_name }),
                &["object_name"],
            ),
            no_arguments("open_gripper", "Opens the gripper"),
            no_arguments("close_gripper", "Closes the gripper"),
            function(
                "move_abs",
                "Moves the gripper in a straight line to the given position",
                json!({ "position": position }),
                &["position"],
            ),
            function(
                "rotate_gripper_abs",
                "Rotates the gripper to the given orientation",
                json!({ "orientation": orientation }),
                &["orientation"],
            ),
            function(
                "rotate_axis",
                "Rotates the gripper about a single axis towards the given orientation",
                json!({
                    "orientation": orientation,
                    "axis": {"type": "integer", "enum": [0, 1, 2]},
                }),
                &["orientation", "axis"],
            ),
            function(
                "approach_from_direction",
                "Moves to the position, arriving last from the given side (left +y, right -y)",
                json!({
                    "position": position,
                    "direction": {"type": "string", "enum": ["front", "left", "right", "up"]},
                }),
                &["position", "direction"],
            ),
            function(
                "grip_object_from_above",
                "Opens the gripper, moves above the object, descends and closes the gripper",
                json!({ "object_name": object_name }),
                &["object_name"],
            ),
            function(
                "place_object_at_destination",
                "Places the held object at the destination object or, without destination, \
                 on the surface below",
                json!({
                    "object_name": object_name,
                    "destination": {"type": "string", "description": "name of the destination"},
                    "height_offset": {
                        "type": "number",
                        "description": "metres above the destination",
                    },
                    "front_offset": {
                        "type": "number",
                        "description": "metres in front of the destination",
                    },
                }),
                &["object_name"],
            ),
            no_arguments("open_door", "Opens the microwave door"),
            no_arguments("close_door", "Closes the microwave door"),
            no_arguments("press_button", "Presses the microwave button"),
            no_arguments("check_successful", "Checks whether the task is accomplished"),
        ]
    }

    /// Executes the call.
    /// # Errors
    /// * Every error of the underlying routine.
    pub fn execute(&self, manipulator: &mut Manipulator) -> ManipulatorResult<ToolOutput> {
        info!(tool = self.name(), "executing tool call");
        let succeeded = match self {
            ToolCall::GetEefPos => {
                let position = manipulator.controller().eef_position()?;
                return Ok(ToolOutput::Position(position.into()));
            }
            ToolCall::GetEefRot => {
                let euler = manipulator.controller().eef_euler()?;
                return Ok(ToolOutput::Orientation(euler.into()));
            }
            ToolCall::GetGripperState => {
                return Ok(ToolOutput::Gripper(manipulator.controller().gripper_state()?));
            }
            ToolCall::ResolveObjectFromName { object_name } => {
                return Ok(ToolOutput::Pose {
                    name: object_name.clone(),
                    pose: manipulator.controller().resolve(object_name)?,
                });
            }
            ToolCall::CheckSuccessful => {
                return Ok(ToolOutput::TaskSucceeded(manipulator.task_succeeded()));
            }
            ToolCall::OpenGripper => manipulator.controller_mut().open_gripper()?,
            ToolCall::CloseGripper => manipulator.controller_mut().close_gripper()?,
            ToolCall::MoveAbs { position } => manipulator
                .controller_mut()
                .move_to(&(*position).into())?,
            ToolCall::RotateGripperAbs { orientation } => {
                manipulator.controller_mut().rotate_to(orientation)?
            }
            ToolCall::RotateAxis { orientation, axis } => {
                manipulator.controller_mut().rotate_axis(orientation, *axis)?
            }
            ToolCall::ApproachFromDirection {
                position,
                direction,
            } => manipulator.approach_from_direction(&(*position).into(), *direction)?,
            ToolCall::GripObjectFromAbove { object_name } => {
                manipulator.grip_object_from_above(object_name)?
            }
            ToolCall::PlaceObjectAtDestination {
                object_name,
                destination,
                height_offset,
                front_offset,
            } => manipulator.place_object_at_destination(
                object_name,
                destination.as_deref(),
                PlacementOffsets {
                    height_offset: *height_offset,
                    front_offset: *front_offset,
                },
            )?,
            ToolCall::OpenDoor => manipulator.open_door()?,
            ToolCall::CloseDoor => manipulator.close_door()?,
            ToolCall::PressButton => manipulator.press_button()?,
        };
        let reason = if succeeded {
            None
        } else {
            manipulator.controller().last_failure().map(String::from)
        };
        Ok(ToolOutput::Done {
            tool: self.name().to_string(),
            succeeded,
            reason,
        })
    }

    /// Executes the call and renders the outcome as text. Errors are rendered as well, so the
    /// caller can react to them.
    pub fn run(&self, manipulator: &mut Manipulator) -> String {
        match self.execute(manipulator) {
            Ok(output) => output.to_string(),
            Err(e) => format!("{} raised an error: {}", self.name(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::exception::ManipulatorException;
    use crate::robot::motion_config::MotionConfig;
    use crate::simulation::kinematic::KinematicSim;
    use crate::simulation::{Simulation, SimulationConfig};
    use crate::skills::approach::ApproachDirection;
    use crate::skills::tests::setup;
    use crate::skills::{Manipulator, SkillConfig};
    use crate::tools::ToolCall;
    use std::collections::BTreeSet;

    fn invalid(name: &str, arguments: &str) -> bool {
        matches!(
            ToolCall::parse(name, arguments),
            Err(ManipulatorException::InvalidArgument { .. })
        )
    }

    #[test]
    fn parse_calls() {
        assert_eq!(
            ToolCall::parse("move_abs", r#"{"position": [0.4, 0.1, 1.0]}"#).unwrap(),
            ToolCall::MoveAbs {
                position: [0.4, 0.1, 1.0]
            }
        );
        assert_eq!(ToolCall::parse("open_door", "").unwrap(), ToolCall::OpenDoor);
        assert_eq!(ToolCall::parse("open_door", "{}").unwrap(), ToolCall::OpenDoor);
        assert_eq!(
            ToolCall::parse(
                "approach_from_direction",
                r#"{"position": [0.5, 0.0, 1.0], "direction": "up"}"#
            )
            .unwrap(),
            ToolCall::ApproachFromDirection {
                position: [0.5, 0., 1.],
                direction: ApproachDirection::Up
            }
        );
        assert_eq!(
            ToolCall::parse(
                "place_object_at_destination",
                r#"{"object_name": "obj", "destination": "microwave", "height_offset": 0.04}"#
            )
            .unwrap(),
            ToolCall::PlaceObjectAtDestination {
                object_name: "obj".to_string(),
                destination: Some("microwave".to_string()),
                height_offset: 0.04,
                front_offset: 0.,
            }
        );
    }

    #[test]
    fn reject_malformed_calls() {
        assert!(invalid("teleport", "{}"));
        assert!(invalid("move_abs", "{}"));
        assert!(invalid("move_abs", r#"{"position": [0.4, 0.1]}"#));
        assert!(invalid("move_abs", "[1, 2, 3]"));
        assert!(invalid("rotate_gripper_abs", r#"{"orientation": [0, 90]}"#));
        assert!(invalid("rotate_axis", r#"{"orientation": [180, 0, 90], "axis": 3}"#));
        assert!(invalid(
            "approach_from_direction",
            r#"{"position": [0.5, 0.0, 1.0], "direction": "diagonal"}"#
        ));
        assert!(invalid("grip_object_from_above", "not json"));
    }

    #[test]
    fn every_tool_has_a_schema() {
        let schemas = ToolCall::schemas();
        let names: BTreeSet<String> = schemas
            .iter()
            .map(|schema| schema["function"]["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names.len(), schemas.len());
        assert_eq!(names.len(), 16);
        for name in &names {
            let required = schemas
                .iter()
                .find(|schema| schema["function"]["name"] == name.as_str())
                .map(|schema| schema["function"]["parameters"]["required"].clone())
                .unwrap();
            if required.as_array().unwrap().is_empty() {
                assert_eq!(ToolCall::parse(name, "").unwrap().name(), name.as_str());
            }
        }
    }

    #[test]
    fn queries_without_running_driver() {
        let simulation =
            Simulation::new(KinematicSim::default(), SimulationConfig::default()).unwrap();
        let mut manipulator = Manipulator::new(
            simulation.handle(),
            MotionConfig::default(),
            SkillConfig::default(),
        );
        assert_eq!(
            ToolCall::GetEefPos.run(&mut manipulator),
            "position [0.450, 0.000, 1.100]"
        );
        assert_eq!(
            ToolCall::CheckSuccessful.run(&mut manipulator),
            "task successful: false"
        );
        assert!(ToolCall::parse("resolve_object_from_name", r#"{"object_name": "obj"}"#)
            .unwrap()
            .run(&mut manipulator)
            .starts_with("obj: position [0.450, -0.250, 0.925]"));
        let missing = ToolCall::ResolveObjectFromName {
            object_name: "cup".to_string(),
        };
        assert!(missing
            .run(&mut manipulator)
            .starts_with("resolve_object_from_name raised an error"));
        let far = ToolCall::MoveAbs {
            position: [2., 0., 1.],
        };
        let text = far.run(&mut manipulator);
        assert!(text.starts_with("move_abs failed: "), "{}", text);
        assert!(text.contains("workspace"));
    }

    #[test]
    fn grip_through_the_menu() {
        let (mut simulation, mut manipulator) = setup();
        let call = ToolCall::parse("grip_object_from_above", r#"{"object_name": "obj"}"#).unwrap();
        assert_eq!(call.run(&mut manipulator), "grip_object_from_above succeeded");
        let state = ToolCall::GetGripperState.run(&mut manipulator);
        assert!(state.starts_with("gripper is gripping"), "{}", state);
        simulation.stop().unwrap();
    }
}
