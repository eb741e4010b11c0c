//! Arena constants and configuration intake for the marker arena simulator.

use crate::error::SimError;
use crate::world::TokenKind;
use serde_json::Value;
use std::f64::consts::{FRAC_PI_2, PI};
use std::fs;
use std::path::Path;

// Simulated clock
pub const TICK_SECONDS: f64 = 1.0 / 64.0; // One physics step, 15.625 ms
pub const DEFAULT_END_TIME: f64 = 180.0;

// Arena geometry (metres). The arena is a 6 m square centred on the origin;
// team k's side is team 0's rotated by -k * 90 degrees about the origin.
pub const TEAM_ANGLES: [f64; 4] = [0.0, -FRAC_PI_2, PI, FRAC_PI_2];
pub const WALL_SEGMENTS_PER_SIDE: u32 = 6;
pub const WALL_HALF_LENGTH: f64 = 0.5;
pub const WALL_THICKNESS: f64 = 0.1;
pub const ZONE_HALF_LENGTH: f64 = 0.5; // Along the local x axis
pub const ZONE_HALF_WIDTH: f64 = 1.0; // Along the local y axis

// Tokens
pub const TOKEN_HALF_EXTENT: f64 = 0.055;
pub const TOKEN_HEIGHT: f64 = 0.11;
pub const TOKEN_MASS: f64 = 0.02;
pub const TOKEN_COORD_LIMIT: f64 = 2.945; // Positions are clamped into the arena square
pub const ORE_BASE_ID: u32 = 32;
pub const GOLD_BASE_ID: u32 = 42;
pub const GOLD_IDS_PER_TEAM: u32 = 3;

// Markers
pub const WALL_MARKER_SIZE: f64 = 0.25;
pub const TOKEN_MARKER_SIZE: f64 = 0.1;
pub const WALL_MARKER_CENTRE_HEIGHT: f64 = 0.175;
pub const WALL_MARKER_HALF_EXTENT: f64 = 0.125;
pub const MARKER_BORDER_FRACTION: f64 = 5.0 / 110.0; // 5 mm border on an 11 cm face

// Physics behaviour
pub const BODY_FRICTION: f64 = 0.5;
pub const BODY_ELASTICITY: f64 = 0.0;
// Exponential damping rate equivalent to a fluid-like factor of 0.01/s:
// bodies retain 1 % of their velocity after one simulated second.
pub const FLUID_DAMPING: f64 = 4.605170185988091;
pub const MOVING_LINEAR_THRESHOLD: f64 = 0.02; // m/s
pub const MOVING_ANGULAR_THRESHOLD: f64 = 0.05; // rad/s

// Camera
pub const LEGAL_RESOLUTIONS: [(u32, u32); 5] = [
    (640, 480),
    (1296, 736),
    (1296, 976),
    (1920, 1088),
    (1920, 1440),
];
pub const SEE_SECONDS_PER_PIXEL: f64 = 0.001; // Simulated cost per pixel of image width

// Motors
pub const MOTOR_POWER_LIMIT: f64 = 100.0;

/// Clamp a numeric input into `[min, max]`, or fall back to `default` when the
/// field is missing or not a number. `default` must already lie in the range.
pub fn sanitise_f64(input: Option<&Value>, default: f64, min: Option<f64>, max: Option<f64>) -> f64 {
    debug_assert!(min.is_none_or(|m| m <= default));
    debug_assert!(max.is_none_or(|m| m >= default));
    match input.and_then(Value::as_f64) {
        Some(value) => {
            let value = min.map_or(value, |m| value.max(m));
            max.map_or(value, |m| value.min(m))
        }
        None => default,
    }
}

/// Integer-typed variant of [`sanitise_f64`]: non-integer inputs fall back to
/// the default.
pub fn sanitise_i64(input: Option<&Value>, default: i64, min: Option<i64>, max: Option<i64>) -> i64 {
    debug_assert!(min.is_none_or(|m| m <= default));
    debug_assert!(max.is_none_or(|m| m >= default));
    match input.and_then(Value::as_i64) {
        Some(value) => {
            let value = min.map_or(value, |m| value.max(m));
            max.map_or(value, |m| value.min(m))
        }
        None => default,
    }
}

pub fn sanitise_bool(input: Option<&Value>, default: bool) -> bool {
    input.and_then(Value::as_bool).unwrap_or(default)
}

/// Token coordinates have no default: a non-numeric entry drops the token.
fn sanitise_coord(input: Option<&Value>) -> Option<f64> {
    input
        .and_then(Value::as_f64)
        .map(|value| value.clamp(-TOKEN_COORD_LIMIT, TOKEN_COORD_LIMIT))
}

/// Robot parameters read from `Robot {team}.json`, sanitised per field.
#[derive(Debug, Clone)]
pub struct RobotSettings {
    pub width: f64,
    pub length: f64,
    pub height: f64,
    pub starting_offset: (f64, f64),
    pub mass: f64,
    pub axle_length: f64,
    pub base_max_power: f64,
    pub motor_noise_range: f64,
    pub camera_height: f64,
    pub field_of_view: f64, // Stored as the half-angle in radians
    pub marker_pixels_minimum: i64,
    pub marker_pixels_noise: i64,
    pub ignore_motion_blur: bool,
}

impl RobotSettings {
    /// Reads the first element of `Robot {team}.json` under `config_dir`.
    pub fn load(config_dir: &Path, team: usize) -> Result<RobotSettings, SimError> {
        let path = config_dir.join(format!("Robot {team}.json"));
        let text = fs::read_to_string(&path)
            .map_err(|e| SimError::Config(format!("cannot read {}: {e}", path.display())))?;
        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| SimError::Config(format!("cannot parse {}: {e}", path.display())))?;
        let record = parsed
            .get(0)
            .ok_or_else(|| SimError::Config(format!("{} holds no robot record", path.display())))?;
        Ok(RobotSettings::from_record(record))
    }

    /// Sanitises one robot record. Robot shapes cannot be degenerate, so the
    /// minimum footprint is 1 cm by 1 cm and the minimum mass one gram. The
    /// field of view is supplied as the full angle between opposite image
    /// sides in degrees, but used as the half-angle in radians.
    pub fn from_record(record: &Value) -> RobotSettings {
        let width = sanitise_f64(record.get("Width"), 0.3, Some(0.01), Some(0.4));
        let length = sanitise_f64(record.get("Length"), 0.4, Some(0.01), Some(0.4));
        let half_width = width / 2.0;
        let half_length = length / 2.0;
        // The starting offset is clamped so the footprint stays inside the
        // in-arena half of the robot's own zone.
        let starting = record.get("Starting Position");
        let offset_x = sanitise_f64(
            starting.and_then(|v| v.get(0)),
            0.0,
            Some(-0.25 + half_length),
            Some(0.25 - half_length),
        );
        let offset_y = sanitise_f64(
            starting.and_then(|v| v.get(1)),
            0.0,
            Some(-ZONE_HALF_WIDTH + half_width),
            Some(ZONE_HALF_WIDTH - half_width),
        );
        RobotSettings {
            width,
            length,
            height: sanitise_f64(record.get("Height"), 0.4, Some(0.0), None),
            starting_offset: (offset_x, offset_y),
            mass: sanitise_f64(record.get("Mass"), 1.0, Some(0.001), None),
            axle_length: sanitise_f64(record.get("Distance Between Wheels"), 0.0, Some(0.0), None),
            base_max_power: sanitise_f64(record.get("Maximum Motor Power"), 1.0, Some(0.0), None),
            motor_noise_range: sanitise_f64(record.get("Motor Noise Range"), 0.0, Some(0.0), None),
            camera_height: sanitise_f64(record.get("Camera Height"), 0.3, Some(0.0), None),
            field_of_view: sanitise_f64(
                record.get("Camera Field of View"),
                45.0,
                Some(0.0),
                Some(360.0),
            ) * PI
                / 360.0,
            marker_pixels_minimum: sanitise_i64(
                record.get("Marker Pixels Minimum"),
                0,
                Some(0),
                None,
            ),
            marker_pixels_noise: sanitise_i64(
                record.get("Marker Pixels Noise Range"),
                0,
                Some(0),
                None,
            ),
            ignore_motion_blur: sanitise_bool(record.get("Ignore Motion Blur"), false),
        }
    }
}

/// One token to place at startup, with its pre-assigned marker id.
#[derive(Debug, Clone, Copy)]
pub struct TokenSpec {
    pub id: u32,
    pub kind: TokenKind,
    pub x: f64,
    pub y: f64,
}

/// Reads `Token Position Config.json`: a mapping from token-type name to a
/// list of `[x, y]` positions. Ids are assigned sequentially from each type's
/// base; entries with a non-numeric coordinate are dropped without consuming
/// an id.
pub fn load_token_layout(config_dir: &Path) -> Result<Vec<TokenSpec>, SimError> {
    let path = config_dir.join("Token Position Config.json");
    let text = fs::read_to_string(&path)
        .map_err(|e| SimError::Config(format!("cannot read {}: {e}", path.display())))?;
    let parsed: Value = serde_json::from_str(&text)
        .map_err(|e| SimError::Config(format!("cannot parse {}: {e}", path.display())))?;
    let table = parsed
        .as_object()
        .ok_or_else(|| SimError::Config(format!("{} is not an object", path.display())))?;

    let mut specs = Vec::new();
    for (name, positions) in table {
        let kind = TokenKind::from_name(name)
            .ok_or_else(|| SimError::Config(format!("unknown token type {name:?}")))?;
        let mut id = kind.base_id();
        let positions = positions
            .as_array()
            .ok_or_else(|| SimError::Config(format!("positions for {name:?} are not a list")))?;
        for position in positions {
            let x = sanitise_coord(position.get(0));
            let y = sanitise_coord(position.get(1));
            if let (Some(x), Some(y)) = (x, y) {
                specs.push(TokenSpec { id, kind, x, y });
                id += 1;
            }
        }
    }
    Ok(specs)
}
