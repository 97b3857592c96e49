//! Formation maintenance: flocking dynamics plus virtual structures.
//!
//! Members of a formation steer by Reynolds' three rules — separation,
//! alignment, cohesion — computed over geodetic positions. Structured
//! formations (line, grid, leader-follower) additionally pin each member
//! to a relative slot in the virtual frame.

use crate::geo::{angle_diff_deg, bearing_deg, haversine_m};
use crate::rng::SwarmRng;
use crate::world::{FormationSlot, RelativePosition, Robot, WorldModel};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Spacing between adjacent slots in structured formations, in meters.
const SLOT_SPACING_M: f64 = 5.0;
/// Fewest members a formation can hold.
const MIN_FORMATION_SIZE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormationType {
    Flocking,
    Line,
    Grid,
    LeaderFollower,
}

impl FormationType {
    fn tag(self) -> &'static str {
        match self {
            Self::Flocking => "FLOCKING",
            Self::Line => "LINE",
            Self::Grid => "GRID",
            Self::LeaderFollower => "LEADER_FOLLOWER",
        }
    }
}

/// Tunable flocking parameters.
#[derive(Debug, Clone, Copy)]
pub struct FormationTuning {
    pub separation_weight: f64,
    pub alignment_weight: f64,
    pub cohesion_weight: f64,
    pub collision_radius_m: f64,
    pub perception_radius_m: f64,
}

impl Default for FormationTuning {
    fn default() -> Self {
        Self {
            separation_weight: 1.5,
            alignment_weight: 1.0,
            cohesion_weight: 1.2,
            collision_radius_m: 2.0,
            perception_radius_m: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Neighbor {
    pub robot_id: String,
    pub distance_m: f64,
    pub bearing_deg: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RobotFlockingUpdate {
    pub robot_id: String,
    pub neighbors_count: usize,
    pub separation_force: (f64, f64),
    pub alignment_adjustment_deg: f64,
    pub cohesion_force: (f64, f64),
    pub new_heading_deg: f64,
    pub distance_to_target_m: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormationQuality {
    pub cohesion: f64,
    pub alignment: f64,
    pub separation: f64,
    pub overall: f64,
    pub avg_distance_to_center_m: f64,
    pub collision_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FlockingUpdate {
    Updated {
        formation_id: String,
        robots_updated: usize,
        updates: Vec<RobotFlockingUpdate>,
        metrics: FormationQuality,
    },
    Failed {
        formation_id: String,
        reason: FormationFailureReason,
        robots_count: usize,
    },
}

impl FlockingUpdate {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormationFailureReason {
    InsufficientRobots,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CreateFormationOutcome {
    Created {
        formation_id: String,
        formation_type: FormationType,
        robots_count: usize,
        robots: Vec<String>,
        leader: Option<String>,
    },
    Failed {
        reason: FormationFailureReason,
        minimum_required: usize,
    },
}

impl CreateFormationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Created { .. })
    }

    pub fn formation_id(&self) -> Option<&str> {
        match self {
            Self::Created { formation_id, .. } => Some(formation_id),
            Self::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AverageQuality {
    pub cohesion: f64,
    pub alignment: f64,
    pub separation: f64,
    pub overall: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormationStatistics {
    pub total_formations: usize,
    pub total_robots_in_formation: usize,
    pub formations: BTreeMap<String, usize>,
    pub formation_quality: BTreeMap<String, FormationQuality>,
    pub average_quality: AverageQuality,
    pub formation_updates: u64,
    pub collision_count: u64,
}

/// Controls robot formations through flocking behavior and virtual
/// structures.
#[derive(Debug)]
pub struct FormationController {
    tuning: FormationTuning,
    formation_updates: u64,
    collision_count: u64,
    rng: SwarmRng,
}

impl FormationController {
    pub fn new(tuning: FormationTuning, rng: SwarmRng) -> Self {
        Self {
            tuning,
            formation_updates: 0,
            collision_count: 0,
            rng,
        }
    }

    /// Connected robots within the perception radius of `robot_id`, tagged
    /// with distance and bearing. The robot itself is excluded.
    pub fn get_neighbors(&self, world: &WorldModel, robot_id: &str) -> Result<Vec<Neighbor>> {
        let robot = world.require_robot(robot_id)?;
        let pos = robot.position;

        let mut neighbors = Vec::new();
        for other in world.robots() {
            if other.robot_id == robot_id || !other.communication.connected {
                continue;
            }

            let distance =
                haversine_m(pos.lat, pos.lon, other.position.lat, other.position.lon);
            if distance <= self.tuning.perception_radius_m {
                neighbors.push(Neighbor {
                    robot_id: other.robot_id.clone(),
                    distance_m: distance,
                    bearing_deg: bearing_deg(
                        pos.lat,
                        pos.lon,
                        other.position.lat,
                        other.position.lon,
                    ),
                });
            }
        }

        Ok(neighbors)
    }

    /// Repulsion away from neighbors inside the comfort zone (3× collision
    /// radius), inverse-square and clamped, in raw lat/lon delta space.
    fn separation_force(&self, robot: &Robot, neighbors: &[(f64, &Robot)]) -> (f64, f64) {
        let comfort_zone = self.tuning.collision_radius_m * 3.0;
        let mut force_x = 0.0;
        let mut force_y = 0.0;

        for (distance, other) in neighbors {
            if *distance >= comfort_zone {
                continue;
            }

            let delta_lat = robot.position.lat - other.position.lat;
            let delta_lon = robot.position.lon - other.position.lon;

            let magnitude = if *distance > 0.1 {
                (1.0 / (distance * distance)).min(10.0)
            } else {
                10.0
            };

            let norm = (delta_lat * delta_lat + delta_lon * delta_lon).sqrt();
            if norm > 0.0 {
                force_x += delta_lat / norm * magnitude;
                force_y += delta_lon / norm * magnitude;
            }
        }

        (
            force_x * self.tuning.separation_weight,
            force_y * self.tuning.separation_weight,
        )
    }

    /// Heading adjustment toward the circular mean of neighbor headings.
    fn alignment_adjustment(&self, robot: &Robot, neighbors: &[(f64, &Robot)]) -> f64 {
        if neighbors.is_empty() {
            return 0.0;
        }

        let mut sin_sum = 0.0;
        let mut cos_sum = 0.0;
        for (_, other) in neighbors {
            let heading = other.position.heading_deg.to_radians();
            sin_sum += heading.sin();
            cos_sum += heading.cos();
        }

        let n = neighbors.len() as f64;
        let mean_heading = (sin_sum / n).atan2(cos_sum / n).to_degrees();

        angle_diff_deg(robot.position.heading_deg, mean_heading) * self.tuning.alignment_weight
    }

    /// Attraction toward the local centroid of the neighborhood.
    fn cohesion_force(&self, robot: &Robot, neighbors: &[(f64, &Robot)]) -> (f64, f64) {
        if neighbors.is_empty() {
            return (0.0, 0.0);
        }

        let n = neighbors.len() as f64;
        let center_lat = neighbors.iter().map(|(_, r)| r.position.lat).sum::<f64>() / n;
        let center_lon = neighbors.iter().map(|(_, r)| r.position.lon).sum::<f64>() / n;

        let delta_lat = center_lat - robot.position.lat;
        let delta_lon = center_lon - robot.position.lon;
        let distance = (delta_lat * delta_lat + delta_lon * delta_lon).sqrt();
        if distance <= 0.0 {
            return (0.0, 0.0);
        }

        // Scale factor 100 lifts degree-space deltas into a usable range.
        let magnitude = (distance * 100.0).min(5.0);
        (
            delta_lat / distance * magnitude * self.tuning.cohesion_weight,
            delta_lon / distance * magnitude * self.tuning.cohesion_weight,
        )
    }

    /// Run one flocking pass over a formation, steering every connected
    /// member. Members are updated sequentially in world order, so earlier
    /// heading changes feed later members' alignment.
    pub fn update_flocking(&mut self, world: &mut WorldModel, formation_id: &str) -> FlockingUpdate {
        debug!(formation_id, "update_flocking");

        let member_ids: Vec<String> = world
            .robots()
            .filter(|r| {
                r.communication.connected
                    && r.formation
                        .as_ref()
                        .is_some_and(|f| f.formation_id == formation_id)
            })
            .map(|r| r.robot_id.clone())
            .collect();

        if member_ids.len() < MIN_FORMATION_SIZE {
            return FlockingUpdate::Failed {
                formation_id: formation_id.to_string(),
                reason: FormationFailureReason::InsufficientRobots,
                robots_count: member_ids.len(),
            };
        }

        let mut updates = Vec::new();

        for robot_id in &member_ids {
            let (update, new_heading) = {
                let Some(robot) = world.robot(robot_id) else {
                    continue;
                };
                let Ok(perceived) = self.get_neighbors(world, robot_id) else {
                    continue;
                };

                // Only flockmates of the same formation steer this robot.
                let formation_neighbors: Vec<(f64, &Robot)> = perceived
                    .iter()
                    .filter_map(|n| world.robot(&n.robot_id).map(|r| (n.distance_m, r)))
                    .filter(|(_, other)| {
                        other
                            .formation
                            .as_ref()
                            .is_some_and(|f| f.formation_id == formation_id)
                    })
                    .collect();

                if formation_neighbors.is_empty() {
                    continue;
                }

                let (sep_x, sep_y) = self.separation_force(robot, &formation_neighbors);
                let alignment_deg = self.alignment_adjustment(robot, &formation_neighbors);
                let (coh_x, coh_y) = self.cohesion_force(robot, &formation_neighbors);

                let force_x = sep_x + coh_x;
                let force_y = sep_y + coh_y;

                let current_heading = robot.position.heading_deg;
                let new_heading = if force_x.abs() > 0.01 || force_y.abs() > 0.01 {
                    let force_heading = force_y.atan2(force_x).to_degrees();
                    let position_adjustment =
                        angle_diff_deg(current_heading, force_heading) * 0.5;
                    let total_adjustment = position_adjustment + alignment_deg * 0.5;
                    (current_heading + total_adjustment).rem_euclid(360.0)
                } else {
                    current_heading
                };

                let distance_to_target = robot
                    .formation
                    .as_ref()
                    .and_then(|f| f.target_position)
                    .map_or(0.0, |t| {
                        (t.relative_x_m * t.relative_x_m + t.relative_y_m * t.relative_y_m).sqrt()
                    });

                (
                    RobotFlockingUpdate {
                        robot_id: robot_id.clone(),
                        neighbors_count: formation_neighbors.len(),
                        separation_force: (sep_x, sep_y),
                        alignment_adjustment_deg: alignment_deg,
                        cohesion_force: (coh_x, coh_y),
                        new_heading_deg: new_heading,
                        distance_to_target_m: distance_to_target,
                    },
                    new_heading,
                )
            };

            if let Some(robot) = world.robot_mut(robot_id) {
                robot.position.heading_deg = new_heading;
            }
            updates.push(update);
        }

        let metrics = self.formation_quality(world, &member_ids);
        self.formation_updates += 1;
        self.collision_count += metrics.collision_count as u64;

        FlockingUpdate::Updated {
            formation_id: formation_id.to_string(),
            robots_updated: updates.len(),
            updates,
            metrics,
        }
    }

    /// Cohesion / alignment / separation composite over one formation's
    /// members. Alignment uses the arithmetic variance of heading degrees.
    fn formation_quality(&self, world: &WorldModel, member_ids: &[String]) -> FormationQuality {
        let members: Vec<&Robot> = member_ids
            .iter()
            .filter_map(|id| world.robot(id))
            .collect();

        if members.len() < MIN_FORMATION_SIZE {
            return FormationQuality {
                cohesion: 0.0,
                alignment: 0.0,
                separation: 0.0,
                overall: 0.0,
                avg_distance_to_center_m: 0.0,
                collision_count: 0,
            };
        }

        let n = members.len() as f64;
        let center_lat = members.iter().map(|r| r.position.lat).sum::<f64>() / n;
        let center_lon = members.iter().map(|r| r.position.lon).sum::<f64>() / n;

        let avg_distance = members
            .iter()
            .map(|r| haversine_m(r.position.lat, r.position.lon, center_lat, center_lon))
            .sum::<f64>()
            / n;
        let cohesion = (1.0 - avg_distance / self.tuning.perception_radius_m).max(0.0);

        let mean_heading = members.iter().map(|r| r.position.heading_deg).sum::<f64>() / n;
        let heading_variance = members
            .iter()
            .map(|r| {
                let d = r.position.heading_deg - mean_heading;
                d * d
            })
            .sum::<f64>()
            / n;
        let alignment = (1.0 - heading_variance / (180.0 * 180.0)).max(0.0);

        let mut collision_count = 0;
        let mut total_pairs = 0;
        for (i, a) in members.iter().enumerate() {
            for b in &members[i + 1..] {
                total_pairs += 1;
                let distance =
                    haversine_m(a.position.lat, a.position.lon, b.position.lat, b.position.lon);
                if distance < self.tuning.collision_radius_m {
                    collision_count += 1;
                }
            }
        }
        let separation = if total_pairs > 0 {
            1.0 - f64::from(collision_count) / f64::from(total_pairs)
        } else {
            1.0
        };

        FormationQuality {
            cohesion,
            alignment,
            separation,
            overall: cohesion * 0.35 + alignment * 0.30 + separation * 0.35,
            avg_distance_to_center_m: avg_distance,
            collision_count: collision_count as usize,
        }
    }

    /// Create a formation over the given robots.
    ///
    /// Unknown ids are dropped; at least two valid members are required.
    /// For leader-follower formations the member list is reordered so the
    /// leader holds slot 0 and followers trail at 5 m spacing.
    pub fn create_formation(
        &mut self,
        world: &mut WorldModel,
        robot_ids: &[String],
        formation_type: FormationType,
        leader_id: Option<&str>,
    ) -> CreateFormationOutcome {
        let suffix = self.rng.int_between(1000, 9999);
        let formation_id = format!("FORMATION-{}-{}", formation_type.tag(), suffix);

        let mut members: Vec<String> = robot_ids
            .iter()
            .filter(|id| world.robot(id).is_some())
            .cloned()
            .collect();

        if members.len() < MIN_FORMATION_SIZE {
            return CreateFormationOutcome::Failed {
                reason: FormationFailureReason::InsufficientRobots,
                minimum_required: MIN_FORMATION_SIZE,
            };
        }

        let leader = if formation_type == FormationType::LeaderFollower {
            let chosen = leader_id
                .filter(|id| members.iter().any(|m| m.as_str() == *id))
                .unwrap_or(members[0].as_str())
                .to_string();
            // Slot indices must be distinct, so the leader moves to the front.
            members.retain(|m| *m != chosen);
            members.insert(0, chosen.clone());
            Some(chosen)
        } else {
            None
        };

        let grid_cols = (members.len() as f64).sqrt().ceil() as usize;

        for (i, member_id) in members.iter().enumerate() {
            let target = match formation_type {
                FormationType::Flocking => None,
                FormationType::Line | FormationType::LeaderFollower => Some(RelativePosition {
                    relative_x_m: i as f64 * SLOT_SPACING_M,
                    relative_y_m: 0.0,
                }),
                FormationType::Grid => Some(RelativePosition {
                    relative_x_m: (i % grid_cols) as f64 * SLOT_SPACING_M,
                    relative_y_m: (i / grid_cols) as f64 * SLOT_SPACING_M,
                }),
            };

            let structured = target.is_some();
            if let Some(robot) = world.robot_mut(member_id) {
                robot.formation = Some(FormationSlot {
                    formation_id: formation_id.clone(),
                    position_in_formation: i,
                    target_position: target,
                    distance_to_target_m: structured.then_some(0.0),
                    alignment_error_deg: structured.then_some(0.0),
                });
            }
        }

        info!(
            %formation_id,
            ?formation_type,
            members = members.len(),
            "formation created"
        );

        CreateFormationOutcome::Created {
            formation_id,
            formation_type,
            robots_count: members.len(),
            robots: members,
            leader,
        }
    }

    /// Snapshot of every live formation with per-formation and averaged
    /// quality scores.
    pub fn get_formation_statistics(&self, world: &WorldModel) -> FormationStatistics {
        let mut formations: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for robot in world.robots() {
            if let Some(slot) = &robot.formation {
                formations
                    .entry(slot.formation_id.clone())
                    .or_default()
                    .push(robot.robot_id.clone());
            }
        }

        let mut formation_quality = BTreeMap::new();
        for (formation_id, member_ids) in &formations {
            formation_quality.insert(
                formation_id.clone(),
                self.formation_quality(world, member_ids),
            );
        }

        let average_quality = if formation_quality.is_empty() {
            AverageQuality::default()
        } else {
            let n = formation_quality.len() as f64;
            AverageQuality {
                cohesion: formation_quality.values().map(|q| q.cohesion).sum::<f64>() / n,
                alignment: formation_quality.values().map(|q| q.alignment).sum::<f64>() / n,
                separation: formation_quality.values().map(|q| q.separation).sum::<f64>() / n,
                overall: formation_quality.values().map(|q| q.overall).sum::<f64>() / n,
            }
        };

        FormationStatistics {
            total_formations: formations.len(),
            total_robots_in_formation: formations.values().map(Vec::len).sum(),
            formations: formations
                .into_iter()
                .map(|(id, members)| (id, members.len()))
                .collect(),
            formation_quality,
            average_quality,
            formation_updates: self.formation_updates,
            collision_count: self.collision_count,
        }
    }
}
