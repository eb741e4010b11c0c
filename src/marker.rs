// Client-side marker model: what a robot program reconstructs from a vision
// frame. Mirrors the marker API of a real robot, so programs written against
// the hardware work against the simulator unchanged.

use crate::config;
use crate::rpc::{MarkerDict, VisionFrame};
use crate::vec3::{Plane, Vector3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerType {
    Arena,
    Token,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    None,
    Ore,
    Gold,
    FoolsGold,
}

/// Classification of a marker code as seen by one team.
#[derive(Debug, Clone, Copy)]
pub struct MarkerInfo {
    pub code: u32,
    pub size: f64,
    pub marker_type: MarkerType,
    pub token_type: TokenType,
    pub offset: u32,
}

impl MarkerInfo {
    /// Codes 0-23 are wall markers, 32-41 ore, 42-53 gold. Whose gold a gold
    /// token is depends on who is looking: another team's gold reads as
    /// fool's gold.
    pub fn classify(code: u32, size: f64, observing_team: usize) -> MarkerInfo {
        if code <= 23 {
            MarkerInfo {
                code,
                size,
                marker_type: MarkerType::Arena,
                token_type: TokenType::None,
                offset: code,
            }
        } else if (32..=41).contains(&code) {
            MarkerInfo {
                code,
                size,
                marker_type: MarkerType::Token,
                token_type: TokenType::Ore,
                offset: code - 32,
            }
        } else {
            debug_assert!(
                (config::GOLD_BASE_ID..config::GOLD_BASE_ID + 4 * config::GOLD_IDS_PER_TEAM)
                    .contains(&code),
                "gold marker code {code} out of range"
            );
            let gold_team =
                ((code - config::GOLD_BASE_ID) / config::GOLD_IDS_PER_TEAM) as usize;
            MarkerInfo {
                code,
                size,
                marker_type: MarkerType::Token,
                token_type: if gold_team == observing_team {
                    TokenType::Gold
                } else {
                    TokenType::FoolsGold
                },
                offset: (code - config::GOLD_BASE_ID) % 4,
            }
        }
    }
}

/// A point in the camera's cartesian frame: Z along the camera normal, Y
/// pointing down (the inverse of the arena's Z), X completing the system.
#[derive(Debug, Clone, Copy)]
pub struct WorldPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// The same point in polar form; angles in degrees.
#[derive(Debug, Clone, Copy)]
pub struct PolarPoint {
    pub length: f64,
    pub rot_x: f64,
    pub rot_y: f64,
}

/// Pixel coordinates. The image is approximated as a circle, so the x
/// resolution scales both axes.
#[derive(Debug, Clone, Copy)]
pub struct ImagePoint {
    pub x: f64,
    pub y: f64,
}

/// One arena point projected into all three client coordinate systems.
#[derive(Debug, Clone, Copy)]
pub struct ViewPoint {
    pub world: WorldPoint,
    pub polar: PolarPoint,
    pub image: ImagePoint,
}

impl ViewPoint {
    pub fn project(
        resolution: (u32, u32),
        field_of_view: f64,
        camera_position: Vector3,
        camera_normal: Vector3,
        point: Vector3,
    ) -> ViewPoint {
        let to_point = point - camera_position;
        let z_axis = camera_normal;
        let y_axis = Vector3::new(0.0, 0.0, -1.0);
        let x_axis = y_axis.cross(z_axis);
        let world = WorldPoint {
            x: x_axis.dot(to_point),
            y: y_axis.dot(to_point),
            z: z_axis.dot(to_point),
        };
        let polar = PolarPoint {
            length: Vector3::new(world.x, world.y, world.z).magnitude(),
            rot_x: world.y.atan2(world.z).to_degrees(),
            rot_y: world.x.atan2(world.z).to_degrees(),
        };
        let fov_degrees = field_of_view.to_degrees();
        let width = resolution.0 as f64;
        let image = ImagePoint {
            x: width / 2.0 + width * polar.rot_y / fov_degrees,
            y: resolution.1 as f64 / 2.0 + width * polar.rot_x / fov_degrees,
        };
        ViewPoint {
            world,
            polar,
            image,
        }
    }
}

/// Rotation of the marker plane relative to the camera, in degrees. Only the
/// yaw component is modelled.
#[derive(Debug, Clone, Copy)]
pub struct Orientation {
    pub rot_x: f64,
    pub rot_y: f64,
    pub rot_z: f64,
}

/// A fully reconstructed marker sighting.
#[derive(Debug, Clone)]
pub struct Marker {
    pub info: MarkerInfo,
    pub centre: ViewPoint,
    pub vertices: [ViewPoint; 4],
    pub orientation: Orientation,
    pub resolution: (u32, u32),
    pub timestamp: f64,
}

impl Marker {
    pub fn from_frame(frame: &VisionFrame, observing_team: usize, dict: &MarkerDict) -> Marker {
        let info = MarkerInfo::classify(dict.id, dict.size, observing_team);
        let centre_point = (dict.corners[0] + dict.corners[2]) * 0.5;
        let project = |point: Vector3| {
            ViewPoint::project(
                frame.resolution,
                frame.field_of_view,
                frame.camera_position,
                frame.camera_normal,
                point,
            )
        };
        let marker_plane =
            Plane::from_corners(dict.corners[0], dict.corners[1], dict.corners[3]);
        let rot_y = frame
            .camera_normal
            .angle_between(-marker_plane.normal())
            .to_degrees();
        Marker {
            info,
            centre: project(centre_point),
            vertices: dict.corners.map(project),
            orientation: Orientation {
                rot_x: 0.0,
                rot_y,
                rot_z: 0.0,
            },
            resolution: frame.resolution,
            timestamp: frame.timestamp,
        }
    }

    pub fn dist(&self) -> f64 {
        self.centre.polar.length
    }

    pub fn rot_y(&self) -> f64 {
        self.centre.polar.rot_y
    }
}

/// Rebuilds every marker in a frame, classified for the observing team.
pub fn markers_from_frame(frame: &VisionFrame, observing_team: usize) -> Vec<Marker> {
    frame
        .markers
        .iter()
        .map(|dict| Marker::from_frame(frame, observing_team, dict))
        .collect()
}
