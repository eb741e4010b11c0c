// Token scoring over the collision and containment state at the end of the
// simulation.

use crate::world::{TokenKind, World};

/// The contribution of a single token: its point value and the team awarded.
/// A token no one is scoring for contributes (0, team 0).
///
/// Tokens score for one team only, and for the highest absolute value they
/// qualify for. When two or more robots touch a token, nobody "controls" it
/// and every touch score is discarded; zone containment still counts.
pub fn token_contribution(
    kind: TokenKind,
    id: u32,
    collisions: &[Vec<u32>; 4],
    tokens_in_zone: &[Vec<u32>; 4],
) -> (i32, usize) {
    let mut potential: Vec<(i32, usize)> = Vec::new();

    for (team, touched) in collisions.iter().enumerate() {
        if touched.contains(&id) {
            let value = match kind {
                TokenKind::Ore => 1,
                TokenKind::Gold(owner) if owner == team => 3,
                TokenKind::Gold(_) => -1,
            };
            potential.push((value, team));
        }
    }
    if potential.len() > 1 {
        potential.clear();
    }

    for (team, contained) in tokens_in_zone.iter().enumerate() {
        if contained.contains(&id) {
            let value = match kind {
                TokenKind::Ore => 5,
                TokenKind::Gold(owner) if owner == team => 7,
                TokenKind::Gold(_) => -2,
            };
            potential.push((value, team));
        }
    }

    let mut best: (i32, usize) = (0, 0);
    for candidate in potential {
        if candidate.0.abs() > best.0.abs() {
            best = candidate;
        }
    }
    best
}

/// Sums every token's contribution, then awards one extra point to each team
/// whose robot left its zone at any time.
pub fn compute_scores(world: &World) -> [i32; 4] {
    let tokens_in_zone: [Vec<u32>; 4] = std::array::from_fn(|team| world.tokens_in_zone(team));

    let mut scores = [0i32; 4];
    for token in &world.tokens {
        let (value, team) = token_contribution(
            token.kind,
            token.id,
            &world.scoring_collisions,
            &tokens_in_zone,
        );
        scores[team] += value;
    }
    for robot in &world.robots {
        if robot.has_left_zone {
            scores[robot.team] += 1;
        }
    }
    scores
}
