// The owned world: arena geometry, tokens, robots, the simulated clock and
// the bookkeeping shared between services, scoring and the main loop.

use crate::config::{self, RobotSettings, TokenSpec};
use crate::error::SimError;
use crate::physics::{BodyClass, PhysicsWorld};
use crate::vec3::Vector3;
use rand::Rng;
use rapier2d_f64::prelude::{ColliderHandle, RigidBodyHandle};

/// What a token is worth and to whom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ore,
    Gold(usize),
}

impl TokenKind {
    /// First marker id assigned to tokens of this kind.
    pub fn base_id(self) -> u32 {
        match self {
            TokenKind::Ore => config::ORE_BASE_ID,
            TokenKind::Gold(team) => config::GOLD_BASE_ID + config::GOLD_IDS_PER_TEAM * team as u32,
        }
    }

    /// Parses the configuration-file names "Ore" and "Team k Gold".
    pub fn from_name(name: &str) -> Option<TokenKind> {
        if name == "Ore" {
            return Some(TokenKind::Ore);
        }
        let team = name.strip_prefix("Team ")?.strip_suffix(" Gold")?;
        match team.parse::<usize>() {
            Ok(team) if team < 4 => Some(TokenKind::Gold(team)),
            _ => None,
        }
    }
}

pub struct Wall {
    pub id: u32,
    pub body: RigidBodyHandle,
    pub collider: ColliderHandle,
    pub last_seen: [f64; 4],
}

pub struct Zone {
    pub team: usize,
    pub body: RigidBodyHandle,
    pub collider: ColliderHandle,
}

pub struct Token {
    pub id: u32,
    pub kind: TokenKind,
    pub body: RigidBodyHandle,
    pub collider: ColliderHandle,
    pub last_seen: [f64; 4],
}

/// Camera parameters of one robot, fixed at creation.
#[derive(Debug, Clone, Copy)]
pub struct CameraSettings {
    pub height: f64,
    pub field_of_view: f64, // Half-angle in radians
    pub pixels_minimum: i64,
    pub pixels_noise: i64,
    pub ignore_motion_blur: bool,
}

pub struct RobotBody {
    pub team: usize,
    pub body: RigidBodyHandle,
    pub collider: ColliderHandle,
    pub width: f64,
    pub length: f64,
    pub height: f64,
    axle_length: f64,
    left_max_power: f64,
    right_max_power: f64,
    pub left_power: f64,
    pub right_power: f64,
    pub camera: CameraSettings,
    pub has_left_zone: bool,
}

pub struct World {
    pub physics: PhysicsWorld,
    pub walls: Vec<Wall>,
    pub zones: Vec<Zone>,
    pub tokens: Vec<Token>,
    pub robots: Vec<RobotBody>,
    pub now: f64,
    pub end_time: f64,
    pub pending_output: Vec<String>,
    /// Token ids currently touching each team's robot, maintained from the
    /// engine's contact events.
    pub scoring_collisions: [Vec<u32>; 4],
}

fn rotate2(point: (f64, f64), angle: f64) -> (f64, f64) {
    (
        point.0 * angle.cos() - point.1 * angle.sin(),
        point.0 * angle.sin() + point.1 * angle.cos(),
    )
}

impl World {
    /// Builds the arena: 24 wall segments, four sensor zones and the tokens
    /// from the layout. Robots are added later, one per createRobot call.
    pub fn new(end_time: f64, token_specs: &[TokenSpec]) -> World {
        let mut physics = PhysicsWorld::new(config::TICK_SECONDS);

        // Walls: ids run left-to-right along side 0, then side by side.
        let mut walls = Vec::new();
        let mut id = 0;
        for side in 0..4 {
            let angle = config::TEAM_ANGLES[side];
            for offset in 0..config::WALL_SEGMENTS_PER_SIDE {
                let position = rotate2((-3.0, offset as f64 - 2.5), angle);
                let (body, collider) = physics.add_static_box(
                    position,
                    angle,
                    (config::WALL_THICKNESS / 2.0, config::WALL_HALF_LENGTH),
                    // Inner face of the segment sits on the body origin.
                    (-config::WALL_THICKNESS / 2.0, 0.0),
                    false,
                );
                walls.push(Wall {
                    id,
                    body,
                    collider,
                    last_seen: [-5.0; 4],
                });
                id += 1;
            }
        }

        // Zones: half of each sensor sits inside the wall so tokens stay in
        // the sensor even when pushed up against it.
        let mut zones = Vec::new();
        for team in 0..4 {
            let angle = config::TEAM_ANGLES[team];
            let position = rotate2((-3.0, 0.0), angle);
            let (body, collider) = physics.add_static_box(
                position,
                angle,
                (config::ZONE_HALF_LENGTH, config::ZONE_HALF_WIDTH),
                (0.0, 0.0),
                true,
            );
            zones.push(Zone {
                team,
                body,
                collider,
            });
        }

        let mut tokens = Vec::new();
        for spec in token_specs {
            let (body, collider) = physics.add_dynamic_box(
                (spec.x, spec.y),
                0.0,
                (config::TOKEN_HALF_EXTENT, config::TOKEN_HALF_EXTENT),
                config::TOKEN_MASS,
                BodyClass::Token(spec.id),
                true,
            );
            tokens.push(Token {
                id: spec.id,
                kind: spec.kind,
                body,
                collider,
                last_seen: [-5.0; 4],
            });
        }

        World {
            physics,
            walls,
            zones,
            tokens,
            robots: Vec::new(),
            now: 0.0,
            end_time,
            pending_output: Vec::new(),
            scoring_collisions: Default::default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.now < self.end_time
    }

    /// Creates the dynamic body for one team's robot inside its own zone.
    /// The effective maximum of each motor is sampled once, here.
    pub fn create_robot(&mut self, team: usize, settings: &RobotSettings) -> Result<(), SimError> {
        if team > 3 {
            return Err(SimError::InvalidArgument(format!(
                "team number {team} is out of range"
            )));
        }
        if self.robot_by_team(team).is_some() {
            return Err(SimError::InvalidArgument(format!(
                "team {team} already has a robot"
            )));
        }

        let angle = config::TEAM_ANGLES[team];
        let position = rotate2(
            (
                -2.75 + settings.starting_offset.0,
                settings.starting_offset.1,
            ),
            angle,
        );
        let (body, collider) = self.physics.add_dynamic_box(
            position,
            angle,
            (settings.length / 2.0, settings.width / 2.0),
            settings.mass,
            BodyClass::Robot(team),
            false,
        );

        let mut rng = rand::thread_rng();
        let mut sample_max_power = || {
            if settings.motor_noise_range > 0.0 {
                settings.base_max_power + rng.gen_range(0.0..settings.motor_noise_range / 2.0)
            } else {
                settings.base_max_power
            }
        };
        let left_max_power = sample_max_power();
        let right_max_power = sample_max_power();

        self.robots.push(RobotBody {
            team,
            body,
            collider,
            width: settings.width,
            length: settings.length,
            height: settings.height,
            axle_length: settings.axle_length,
            left_max_power,
            right_max_power,
            left_power: 0.0,
            right_power: 0.0,
            camera: CameraSettings {
                height: settings.camera_height,
                field_of_view: settings.field_of_view,
                pixels_minimum: settings.marker_pixels_minimum,
                pixels_noise: settings.marker_pixels_noise,
                ignore_motion_blur: settings.ignore_motion_blur,
            },
            has_left_zone: false,
        });
        Ok(())
    }

    pub fn robot_by_team(&self, team: usize) -> Option<&RobotBody> {
        self.robots.iter().find(|robot| robot.team == team)
    }

    pub fn robot_by_team_mut(&mut self, team: usize) -> Option<&mut RobotBody> {
        self.robots.iter_mut().find(|robot| robot.team == team)
    }

    /// Converts the latched powers into wheel forces on each robot body.
    /// Powers latched during tick k take effect on the forces of tick k+1.
    pub fn apply_motor_forces(&mut self) {
        for robot in &self.robots {
            self.physics.reset_forces(robot.body);
            let left_force = (robot.left_power / 100.0) * robot.left_max_power;
            self.physics.apply_local_force(
                robot.body,
                (left_force, 0.0),
                (0.0, robot.axle_length / 2.0),
            );
            let right_force = (robot.right_power / 100.0) * robot.right_max_power;
            self.physics.apply_local_force(
                robot.body,
                (right_force, 0.0),
                (0.0, -robot.axle_length / 2.0),
            );
        }
    }

    /// Latches `has_left_zone` for any robot whose body is no longer fully
    /// contained in its own zone's bounding box. Once set it stays set.
    pub fn check_zone_exits(&mut self) {
        for robot in &mut self.robots {
            if robot.has_left_zone {
                continue;
            }
            let zone = &self.zones[robot.team];
            if !self.physics.aabb_contains(zone.collider, robot.collider) {
                log::info!("Robot {} has left its zone", robot.team);
                robot.has_left_zone = true;
            }
        }
    }

    /// One physics tick: step the engine, fold the contact changes into the
    /// scoring bookkeeping, advance the clock.
    pub fn step_tick(&mut self) {
        for change in self.physics.step() {
            let touched = &mut self.scoring_collisions[change.team];
            if change.began {
                touched.push(change.token_id);
            } else if let Some(index) = touched.iter().position(|id| *id == change.token_id) {
                touched.remove(index);
            }
        }
        self.now += config::TICK_SECONDS;
    }

    /// Ids of the tokens fully contained in a team's zone. Touching the edge
    /// does not count.
    pub fn tokens_in_zone(&self, team: usize) -> Vec<u32> {
        let zone = &self.zones[team];
        self.tokens
            .iter()
            .filter(|token| self.physics.aabb_contains(zone.collider, token.collider))
            .map(|token| token.id)
            .collect()
    }

    pub fn queue_print(&mut self, team: usize, message: &str) {
        self.pending_output
            .push(format!("Robot {} at {} printed: {}", team, self.now, message));
    }

    pub fn drain_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_output)
    }

    /// Ground-plane corners of a body's footprint, in the order the cuboid
    /// face construction expects.
    pub fn base_corners(&self, body: RigidBodyHandle, half_extents: (f64, f64)) -> [Vector3; 4] {
        let (position, angle) = self.physics.pose(body);
        let local = [
            (-half_extents.0, -half_extents.1),
            (half_extents.0, -half_extents.1),
            (half_extents.0, half_extents.1),
            (-half_extents.0, half_extents.1),
        ];
        local.map(|corner| {
            let (x, y) = rotate2(corner, angle);
            Vector3::new(position.0 + x, position.1 + y, 0.0)
        })
    }
}
