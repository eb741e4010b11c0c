// The simulated camera. Runs while the calling robot actor holds the
// simulation token, so the world is frozen at a single timestamp.

use crate::config;
use crate::debug_vision;
use crate::rpc::{MarkerDict, VisionFrame};
use crate::vec3::{Plane, Vector3};
use crate::world::World;
use rand::Rng;

/// The five vertical side faces and the roof of a cuboid standing on the
/// ground plane, filtered down to the ones that face the camera. The floor is
/// never tested: it cannot face a camera above the ground.
fn visible_cuboid_faces(base: &[Vector3; 4], height: f64, camera_position: Vector3) -> Vec<Plane> {
    let ground = *base;
    let raised = base.map(|corner| Vector3::new(corner.x, corner.y, height));
    let faces = [
        Plane::from_corners(ground[0], raised[0], ground[3]), // front-left
        Plane::from_corners(ground[1], raised[1], ground[0]), // front-right
        Plane::from_corners(ground[2], ground[3], raised[2]), // back-left
        Plane::from_corners(ground[1], ground[2], raised[1]), // back-right
        Plane::from_corners(raised[0], raised[1], raised[3]), // roof
    ];
    faces
        .into_iter()
        .filter(|face| face.is_facing(camera_position))
        .collect()
}

/// The single marker on a wall segment: a 0.25 m square centred on the inner
/// face, 0.175 m up.
fn wall_marker_corners(position: (f64, f64), angle: f64) -> [Vector3; 4] {
    let centre = Vector3::new(position.0, position.1, config::WALL_MARKER_CENTRE_HEIGHT);
    let radius =
        Vector3::new(0.0, config::WALL_MARKER_HALF_EXTENT, 0.0).rotate_around_z(angle);
    let lift = Vector3::new(0.0, 0.0, config::WALL_MARKER_HALF_EXTENT);
    [
        centre - radius - lift,
        centre + radius - lift,
        centre + radius + lift,
        centre - radius + lift,
    ]
}

/// One marker per face of the token cuboid that faces the camera, inset from
/// the face rectangle to leave the 5 mm printed border.
fn token_marker_corners(base: &[Vector3; 4], camera_position: Vector3) -> Vec<[Vector3; 4]> {
    visible_cuboid_faces(base, config::TOKEN_HEIGHT, camera_position)
        .into_iter()
        .map(|face| {
            let u_offset = face.u * config::MARKER_BORDER_FRACTION;
            let v_offset = face.v * config::MARKER_BORDER_FRACTION;
            [
                face.j + u_offset + v_offset,
                face.j + face.v + u_offset - v_offset,
                face.j + face.u + face.v - u_offset - v_offset,
                face.j + face.u - u_offset + v_offset,
            ]
        })
        .collect()
}

/// A marker resolves when both of two adjacent edges subtend more than the
/// minimum angle fixed by the image width, the field of view and the pixel
/// threshold. A slanted marker fails when either edge projects too short.
fn is_marker_resolvable(
    corners: &[Vector3; 4],
    camera_position: Vector3,
    field_of_view: f64,
    image_width: u32,
    pixel_threshold: i64,
) -> bool {
    if image_width == 0 || field_of_view == 0.0 {
        return false;
    }
    let pixels_per_radian = image_width as f64 / field_of_view;
    let minimum_angle = pixel_threshold as f64 / pixels_per_radian;

    let a = corners[0] - camera_position;
    let b = corners[1] - camera_position;
    let c = corners[3] - camera_position;
    a.angle_between(b) > minimum_angle && a.angle_between(c) > minimum_angle
}

enum SightTarget {
    Wall(usize),
    Token(usize),
}

/// Computes the markers visible to one robot's camera at the frozen time and
/// stamps `last_seen` on every body it saw.
pub fn see(world: &mut World, team: usize, resolution: (u32, u32)) -> VisionFrame {
    let robot = world
        .robot_by_team(team)
        .expect("vision queried for a team with no robot");
    let camera = robot.camera;
    let half_length = robot.length / 2.0;
    let robot_body = robot.body;

    let ((x, y), angle) = world.physics.pose(robot_body);
    let camera_normal = Vector3::new(angle.cos(), angle.sin(), 0.0);
    let camera_position = Vector3::new(x, y, camera.height) + camera_normal * half_length;
    let is_image_blurred = world.physics.is_moving(robot_body);

    let mut markers: Vec<MarkerDict> = Vec::new();
    if camera.ignore_motion_blur || !is_image_blurred {
        // Everything that can stand between the camera and a marker: the
        // other robots and every token, moving or not.
        let mut obstructions: Vec<Plane> = Vec::new();
        for other in &world.robots {
            if other.team == team {
                continue;
            }
            let base = world.base_corners(other.body, (other.length / 2.0, other.width / 2.0));
            obstructions.extend(visible_cuboid_faces(&base, other.height, camera_position));
        }
        for token in &world.tokens {
            let base = world.base_corners(
                token.body,
                (config::TOKEN_HALF_EXTENT, config::TOKEN_HALF_EXTENT),
            );
            obstructions.extend(visible_cuboid_faces(
                &base,
                config::TOKEN_HEIGHT,
                camera_position,
            ));
        }

        // Marker candidates: walls always, tokens unless their image would
        // smear. Robots carry no markers.
        let mut candidates: Vec<(SightTarget, u32, f64, Vec<[Vector3; 4]>)> = Vec::new();
        for (index, wall) in world.walls.iter().enumerate() {
            let (position, wall_angle) = world.physics.pose(wall.body);
            candidates.push((
                SightTarget::Wall(index),
                wall.id,
                config::WALL_MARKER_SIZE,
                vec![wall_marker_corners(position, wall_angle)],
            ));
        }
        for (index, token) in world.tokens.iter().enumerate() {
            if !camera.ignore_motion_blur && world.physics.is_moving(token.body) {
                continue;
            }
            let base = world.base_corners(
                token.body,
                (config::TOKEN_HALF_EXTENT, config::TOKEN_HALF_EXTENT),
            );
            candidates.push((
                SightTarget::Token(index),
                token.id,
                config::TOKEN_MARKER_SIZE,
                token_marker_corners(&base, camera_position),
            ));
        }

        let mut rng = rand::thread_rng();
        for (target, id, size, corner_sets) in candidates {
            for corners in corner_sets {
                // Fresh threshold noise per marker.
                let noise = camera.pixels_noise;
                let threshold = camera.pixels_minimum
                    + if noise > 0 {
                        rng.gen_range(-(noise / 2)..=noise / 2)
                    } else {
                        0
                    };
                if !is_marker_resolvable(
                    &corners,
                    camera_position,
                    camera.field_of_view,
                    resolution.0,
                    threshold,
                ) {
                    continue;
                }

                // A marker is visible when any corner is both inside the
                // field of view and unobstructed.
                let is_visible = corners.iter().any(|corner| {
                    camera_normal.angle_between(*corner - camera_position) <= camera.field_of_view
                        && !obstructions
                            .iter()
                            .any(|plane| plane.obstructs(*corner, camera_position))
                });
                if is_visible {
                    match target {
                        SightTarget::Wall(index) => {
                            world.walls[index].last_seen[team] = world.now;
                        }
                        SightTarget::Token(index) => {
                            world.tokens[index].last_seen[team] = world.now;
                        }
                    }
                    markers.push(MarkerDict { corners, id, size });
                }
            }
        }
        debug_vision!("Robot {} sees {} markers", team, markers.len());
    } else {
        debug_vision!("Robot {} took a blurred image", team);
    }

    VisionFrame {
        resolution,
        field_of_view: camera.field_of_view,
        camera_position,
        camera_normal,
        timestamp: world.now,
        markers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TokenSpec, RobotSettings};
    use crate::world::TokenKind;
    use assert_approx_eq::assert_approx_eq;
    use serde_json::json;

    fn ore(id: u32, x: f64, y: f64) -> TokenSpec {
        TokenSpec {
            id,
            kind: TokenKind::Ore,
            x,
            y,
        }
    }

    #[test]
    fn test_cuboid_faces_seen_from_ground_level() {
        let base = [
            Vector3::new(-0.5, -0.5, 0.0),
            Vector3::new(0.5, -0.5, 0.0),
            Vector3::new(0.5, 0.5, 0.0),
            Vector3::new(-0.5, 0.5, 0.0),
        ];
        // Camera below the roof, straight down the -x axis: only the x = -0.5
        // face points towards it.
        let faces = visible_cuboid_faces(&base, 1.0, Vector3::new(-5.0, 0.0, 0.5));
        assert_eq!(faces.len(), 1);
        assert!(faces[0].normal().x < 0.0);

        // Raise the camera above the roof and it also sees the top face.
        let faces = visible_cuboid_faces(&base, 1.0, Vector3::new(-5.0, 0.0, 2.0));
        assert_eq!(faces.len(), 2);

        // From a corner above the roof: two sides plus the roof.
        let faces = visible_cuboid_faces(&base, 1.0, Vector3::new(-5.0, -5.0, 2.0));
        assert_eq!(faces.len(), 3);
    }

    #[test]
    fn test_wall_marker_is_a_quarter_metre_square() {
        let corners = wall_marker_corners((-3.0, 0.0), 0.0);
        // Adjacent edges are 0.25 m and meet at a right angle.
        let edge_u = corners[1] - corners[0];
        let edge_v = corners[3] - corners[0];
        assert_approx_eq!(edge_u.magnitude(), config::WALL_MARKER_SIZE);
        assert_approx_eq!(edge_v.magnitude(), config::WALL_MARKER_SIZE);
        assert_approx_eq!(edge_u.dot(edge_v), 0.0);
        // Centred 0.175 m up the inner face.
        let centre = (corners[0] + corners[2]) * 0.5;
        assert_approx_eq!(centre.x, -3.0);
        assert_approx_eq!(centre.z, config::WALL_MARKER_CENTRE_HEIGHT);
    }

    #[test]
    fn test_token_markers_keep_their_border() {
        let base = [
            Vector3::new(-0.055, -0.055, 0.0),
            Vector3::new(0.055, -0.055, 0.0),
            Vector3::new(0.055, 0.055, 0.0),
            Vector3::new(-0.055, 0.055, 0.0),
        ];
        let sets = token_marker_corners(&base, Vector3::new(-5.0, 0.0, 0.05));
        assert_eq!(sets.len(), 1);
        let corners = sets[0];
        // A 10 cm marker centred on the 11 cm face.
        let edge = corners[1] - corners[0];
        assert_approx_eq!(edge.magnitude(), config::TOKEN_MARKER_SIZE);
        for corner in &corners {
            assert_approx_eq!(corner.x, -0.055);
        }
    }

    #[test]
    fn test_resolvability_monotone_in_resolution_and_fov() {
        let corners = [
            Vector3::new(5.0, -0.125, 0.05),
            Vector3::new(5.0, 0.125, 0.05),
            Vector3::new(5.0, 0.125, 0.3),
            Vector3::new(5.0, -0.125, 0.3),
        ];
        let camera = Vector3::new(0.0, 0.0, 0.175);
        assert!(is_marker_resolvable(&corners, camera, 0.4, 640, 40));
        // More pixels and a narrower field of view never lose a marker.
        assert!(is_marker_resolvable(&corners, camera, 0.2, 640, 40));
        assert!(is_marker_resolvable(&corners, camera, 0.4, 1920, 40));
        // Squeezing the same view into few pixels does.
        assert!(!is_marker_resolvable(&corners, camera, 0.4, 160, 40));
        // Degenerate cameras resolve nothing.
        assert!(!is_marker_resolvable(&corners, camera, 0.0, 640, 0));
        assert!(!is_marker_resolvable(&corners, camera, 0.4, 0, 0));
    }

    #[test]
    fn test_nearer_token_occludes_farther() {
        // Two tokens in line with the camera axis; the camera sits low enough
        // that the nearer one blocks every sight line to the farther one.
        let mut world = World::new(180.0, &[ore(32, -2.0, 0.0), ore(33, -1.0, 0.0)]);
        let settings = RobotSettings::from_record(&json!({"Camera Height": 0.05}));
        world.create_robot(0, &settings).unwrap();

        let frame = see(&mut world, 0, (640, 480));

        let ids: Vec<u32> = frame.markers.iter().map(|m| m.id).collect();
        assert!(ids.contains(&32), "nearer token missing from {ids:?}");
        assert!(!ids.contains(&33), "occluded token reported in {ids:?}");
        assert_eq!(ids.iter().filter(|id| **id == 32).count(), 1);
        // Only the bodies actually seen get their timestamps updated.
        assert_approx_eq!(world.tokens[0].last_seen[0], 0.0);
        assert_approx_eq!(world.tokens[1].last_seen[0], -5.0);
    }

    #[test]
    fn test_blurred_image_returns_empty_frame() {
        let mut world = World::new(180.0, &[ore(32, -2.0, 0.0)]);
        world
            .create_robot(0, &RobotSettings::from_record(&json!({})))
            .unwrap();
        let body = world.robot_by_team(0).unwrap().body;
        world.physics.set_linear_velocity(body, (0.5, 0.0));

        let frame = see(&mut world, 0, (640, 480));
        assert!(frame.markers.is_empty());
        // The frame header is still populated.
        assert_eq!(frame.resolution, (640, 480));
        assert_approx_eq!(frame.timestamp, 0.0);
        assert_approx_eq!(frame.camera_normal.x, 1.0);
        assert_approx_eq!(world.tokens[0].last_seen[0], -5.0);
    }

    #[test]
    fn test_ignore_motion_blur_sees_through_movement() {
        let mut world = World::new(180.0, &[ore(32, -2.0, 0.0)]);
        let settings = RobotSettings::from_record(&json!({"Ignore Motion Blur": true}));
        world.create_robot(0, &settings).unwrap();
        let body = world.robot_by_team(0).unwrap().body;
        world.physics.set_linear_velocity(body, (0.5, 0.0));

        let frame = see(&mut world, 0, (640, 480));
        assert!(frame.markers.iter().any(|m| m.id == 32));
    }

    #[test]
    fn test_moving_token_carries_no_marker_but_still_occludes() {
        let mut world = World::new(180.0, &[ore(32, -2.0, 0.0), ore(33, -1.0, 0.0)]);
        let settings = RobotSettings::from_record(&json!({"Camera Height": 0.05}));
        world.create_robot(0, &settings).unwrap();
        let nearer = world.tokens[0].body;
        world.physics.set_linear_velocity(nearer, (0.5, 0.0));

        let frame = see(&mut world, 0, (640, 480));
        let ids: Vec<u32> = frame.markers.iter().map(|m| m.id).collect();
        // The moving token is not reported, yet still blocks the one behind.
        assert!(!ids.contains(&32));
        assert!(!ids.contains(&33));
    }
}
