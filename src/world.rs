//! Shared world model: robots, swarm state, communication mesh, task pool.
//!
//! Field names mirror the snapshot interchange format, so a world can be
//! loaded straight from the driver's JSON and handed back unchanged.

use crate::graph::{Edge, NetworkTopology};
use crate::time::Timestamp;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotType {
    Harvester,
    Transport,
    Inspector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationalState {
    Working,
    Idle,
    Charging,
    Fault,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotRole {
    Leader,
    Follower,
    Candidate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    Allocated,
    InProgress,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    pub heading_deg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotStatus {
    pub operational: OperationalState,
    pub battery_soc_percent: f64,
    pub uptime_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Communication {
    pub connected: bool,
    pub signal_strength_dbm: f64,
    pub latency_ms: f64,
    #[serde(default)]
    pub neighbors: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmRole {
    pub role: RobotRole,
    pub term: u64,
    #[serde(default)]
    pub voted_for: Option<String>,
    pub last_heartbeat: Timestamp,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RelativePosition {
    pub relative_x_m: f64,
    pub relative_y_m: f64,
}

/// Membership record a robot carries while part of a formation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormationSlot {
    pub formation_id: String,
    pub position_in_formation: usize,
    #[serde(default)]
    pub target_position: Option<RelativePosition>,
    #[serde(default)]
    pub distance_to_target_m: Option<f64>,
    #[serde(default)]
    pub alignment_error_deg: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub task_id: String,
    pub task_type: String,
    pub priority: TaskPriority,
    pub progress_percent: f64,
    pub estimated_completion_minutes: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Robot {
    pub robot_id: String,
    #[serde(rename = "type")]
    pub kind: RobotType,
    pub position: Position,
    pub status: RobotStatus,
    pub communication: Communication,
    pub swarm_role: SwarmRole,
    #[serde(default)]
    pub formation: Option<FormationSlot>,
    #[serde(default)]
    pub task_assignment: Option<TaskAssignment>,
}

impl Robot {
    /// Eligible to take work: powered up and not faulted.
    pub fn is_available_for_tasks(&self) -> bool {
        matches!(
            self.status.operational,
            OperationalState::Working | OperationalState::Idle
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Where a task takes place. Tried in resolution order: an area centroid,
/// a pickup origin, then a bare point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskLocation {
    Centroid { centroid: GeoPoint },
    Origin { origin: GeoPoint },
    Point(GeoPoint),
}

impl TaskLocation {
    pub fn resolve(&self) -> GeoPoint {
        match self {
            Self::Centroid { centroid } => *centroid,
            Self::Origin { origin } => *origin,
            Self::Point(point) => *point,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Route {
    pub origin: GeoPoint,
    pub destination: GeoPoint,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Cargo {
    pub mass_kg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequirements {
    pub robot_type: RobotType,
    pub min_battery_percent: f64,
    pub estimated_duration_minutes: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub task_type: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub requirements: TaskRequirements,
    #[serde(default)]
    pub location: Option<TaskLocation>,
    #[serde(default)]
    pub route: Option<Route>,
    #[serde(default)]
    pub cargo: Option<Cargo>,
    #[serde(default)]
    pub allocated_to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmState {
    #[serde(default)]
    pub leader_id: Option<String>,
    pub consensus_term: u64,
    pub timestamp: Timestamp,
}

fn default_heartbeat_interval() -> f64 {
    1.0
}

fn default_election_timeout() -> f64 {
    5.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: f64,
    #[serde(default = "default_election_timeout")]
    pub election_timeout_seconds: f64,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: default_heartbeat_interval(),
            election_timeout_seconds: default_election_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsensusMetrics {
    #[serde(default)]
    pub election_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    #[serde(default)]
    pub consensus: ConsensusMetrics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphData {
    #[serde(default)]
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkTopologyData {
    #[serde(default)]
    pub graph: GraphData,
}

/// Wire form of a complete world snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub robots: Vec<Robot>,
    pub swarm_state: SwarmState,
    #[serde(default)]
    pub swarm_config: SwarmConfig,
    #[serde(default)]
    pub network_topology: NetworkTopologyData,
    #[serde(default)]
    pub task_pool: Vec<Task>,
    #[serde(default)]
    pub performance_metrics: PerformanceMetrics,
}

/// In-memory world the engines operate on.
///
/// Robots keep snapshot order (iteration is deterministic) with an id
/// index for O(1) lookup. The communication adjacency is rebuilt once here
/// and stays frozen until the next snapshot load.
#[derive(Debug, Clone)]
pub struct WorldModel {
    robots: Vec<Robot>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
    pub swarm_state: SwarmState,
    pub swarm_config: SwarmConfig,
    pub topology: NetworkTopology,
    pub task_pool: Vec<Task>,
    pub metrics: PerformanceMetrics,
}

impl WorldModel {
    pub fn from_snapshot(snapshot: WorldSnapshot) -> Self {
        let WorldSnapshot {
            robots,
            swarm_state,
            swarm_config,
            network_topology,
            task_pool,
            performance_metrics,
        } = snapshot;

        let index = robots
            .iter()
            .enumerate()
            .map(|(i, r)| (r.robot_id.clone(), i))
            .collect();

        let edges = network_topology.graph.edges;
        let topology =
            NetworkTopology::from_edges(robots.iter().map(|r| r.robot_id.as_str()), &edges);

        Self {
            robots,
            index,
            edges,
            swarm_state,
            swarm_config,
            topology,
            task_pool,
            metrics: performance_metrics,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: WorldSnapshot = serde_json::from_str(json)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Rebuild the wire-form snapshot, carrying every mutation the engines
    /// have committed. Loading the result yields an equivalent world.
    pub fn to_snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            robots: self.robots.clone(),
            swarm_state: self.swarm_state.clone(),
            swarm_config: self.swarm_config.clone(),
            network_topology: NetworkTopologyData {
                graph: GraphData {
                    edges: self.edges.clone(),
                },
            },
            task_pool: self.task_pool.clone(),
            performance_metrics: self.metrics.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_snapshot())?)
    }

    pub fn total_robots(&self) -> usize {
        self.robots.len()
    }

    pub fn robots(&self) -> impl Iterator<Item = &Robot> {
        self.robots.iter()
    }

    pub fn robots_mut(&mut self) -> impl Iterator<Item = &mut Robot> {
        self.robots.iter_mut()
    }

    pub fn robot_ids(&self) -> impl Iterator<Item = &str> {
        self.robots.iter().map(|r| r.robot_id.as_str())
    }

    pub fn robot(&self, robot_id: &str) -> Option<&Robot> {
        self.index.get(robot_id).map(|&i| &self.robots[i])
    }

    pub fn robot_mut(&mut self, robot_id: &str) -> Option<&mut Robot> {
        self.index.get(robot_id).map(|&i| &mut self.robots[i])
    }

    pub fn require_robot(&self, robot_id: &str) -> Result<&Robot> {
        self.robot(robot_id).ok_or_else(|| Error::UnknownRobot {
            robot_id: robot_id.to_string(),
        })
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.task_pool.iter().find(|t| t.task_id == task_id)
    }

    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.task_pool.iter_mut().find(|t| t.task_id == task_id)
    }

    pub fn open_task_ids(&self) -> Vec<String> {
        self.task_pool
            .iter()
            .filter(|t| t.status == TaskStatus::Open)
            .map(|t| t.task_id.clone())
            .collect()
    }

    /// Majority threshold over the whole fleet: ⌊n/2⌋ + 1.
    pub fn majority(&self) -> usize {
        self.robots.len() / 2 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "robots": [
            {
                "robot_id": "HARV-001",
                "type": "harvester",
                "position": {"lat": -22.7001, "lon": -47.6001, "heading_deg": 45.0},
                "status": {"operational": "working", "battery_soc_percent": 82.5, "uptime_hours": 7.2},
                "communication": {
                    "connected": true,
                    "signal_strength_dbm": -62.0,
                    "latency_ms": 18.0,
                    "neighbors": ["TRAN-001"]
                },
                "swarm_role": {
                    "role": "leader",
                    "term": 3,
                    "voted_for": "HARV-001",
                    "last_heartbeat": "2026-03-01T11:59:58Z"
                },
                "formation": {
                    "formation_id": "FORMATION-LINE-1204",
                    "position_in_formation": 0,
                    "target_position": {"relative_x_m": 0.0, "relative_y_m": 0.0},
                    "distance_to_target_m": 0.0,
                    "alignment_error_deg": 0.0
                },
                "task_assignment": {
                    "task_id": "TASK-007",
                    "task_type": "harvest",
                    "priority": "high",
                    "progress_percent": 40.0,
                    "estimated_completion_minutes": 55.0
                }
            },
            {
                "robot_id": "TRAN-001",
                "type": "transport",
                "position": {"lat": -22.7003, "lon": -47.6001, "heading_deg": 90.0},
                "status": {"operational": "idle", "battery_soc_percent": 64.0, "uptime_hours": 3.0},
                "communication": {
                    "connected": true,
                    "signal_strength_dbm": -70.0,
                    "latency_ms": 25.0,
                    "neighbors": ["HARV-001"]
                },
                "swarm_role": {
                    "role": "follower",
                    "term": 3,
                    "voted_for": null,
                    "last_heartbeat": "2026-03-01T11:59:59Z"
                }
            }
        ],
        "swarm_state": {
            "leader_id": "HARV-001",
            "consensus_term": 3,
            "timestamp": "2026-03-01T12:00:00Z"
        },
        "swarm_config": {"heartbeat_interval_seconds": 1.0, "election_timeout_seconds": 5.0},
        "network_topology": {"graph": {"edges": [{"from": "HARV-001", "to": "TRAN-001"}]}},
        "task_pool": [
            {
                "task_id": "TASK-010",
                "task_type": "transport",
                "priority": "medium",
                "status": "open",
                "requirements": {
                    "robot_type": "transport",
                    "min_battery_percent": 30.0,
                    "estimated_duration_minutes": 20.0
                },
                "route": {
                    "origin": {"lat": -22.7005, "lon": -47.6002},
                    "destination": {"lat": -22.7100, "lon": -47.6050}
                },
                "cargo": {"mass_kg": 350.0}
            },
            {
                "task_id": "TASK-011",
                "task_type": "harvest",
                "priority": "high",
                "status": "open",
                "requirements": {
                    "robot_type": "harvester",
                    "min_battery_percent": 50.0,
                    "estimated_duration_minutes": 45.0
                },
                "location": {"centroid": {"lat": -22.7010, "lon": -47.6005}}
            }
        ],
        "performance_metrics": {"consensus": {"election_count": 12}}
    }"#;

    #[test]
    fn snapshot_parses_with_normative_field_names() {
        let world = WorldModel::from_json(SNAPSHOT).unwrap();

        assert_eq!(world.total_robots(), 2);
        let harv = world.robot("HARV-001").unwrap();
        assert_eq!(harv.kind, RobotType::Harvester);
        assert_eq!(harv.swarm_role.role, RobotRole::Leader);
        assert_eq!(harv.swarm_role.term, 3);
        assert_eq!(
            harv.formation.as_ref().unwrap().formation_id,
            "FORMATION-LINE-1204"
        );
        assert_eq!(world.swarm_state.leader_id.as_deref(), Some("HARV-001"));
        assert_eq!(world.metrics.consensus.election_count, 12);
        assert_eq!(world.majority(), 2);
    }

    #[test]
    fn adjacency_is_symmetric_after_load() {
        let world = WorldModel::from_json(SNAPSHOT).unwrap();
        assert!(world.topology.reachable("HARV-001", "TRAN-001"));
        assert!(world.topology.reachable("TRAN-001", "HARV-001"));
    }

    #[test]
    fn task_locations_resolve_in_declared_order() {
        let world = WorldModel::from_json(SNAPSHOT).unwrap();

        let harvest = world.task("TASK-011").unwrap();
        let point = harvest.location.as_ref().unwrap().resolve();
        assert!((point.lat - -22.7010).abs() < 1e-9);

        let transport = world.task("TASK-010").unwrap();
        assert!(transport.location.is_none());
        assert!((transport.route.unwrap().origin.lat - -22.7005).abs() < 1e-9);
    }

    #[test]
    fn snapshot_round_trips_with_every_field_intact() {
        let world = WorldModel::from_json(SNAPSHOT).unwrap();
        let json = world.to_json().unwrap();
        let reloaded = WorldModel::from_json(&json).unwrap();

        assert_eq!(
            serde_json::to_value(world.to_snapshot()).unwrap(),
            serde_json::to_value(reloaded.to_snapshot()).unwrap()
        );

        // The wire form keeps the normative key names.
        let value = serde_json::to_value(world.to_snapshot()).unwrap();
        assert!(value["robots"][0].get("type").is_some());
        assert!(value["network_topology"]["graph"]["edges"][0]
            .get("from")
            .is_some());

        let harv = reloaded.robot("HARV-001").unwrap();
        assert_eq!(harv.kind, RobotType::Harvester);
        assert_eq!(harv.swarm_role.voted_for.as_deref(), Some("HARV-001"));
        assert_eq!(harv.task_assignment.as_ref().unwrap().task_id, "TASK-007");
        assert_eq!(
            harv.formation.as_ref().unwrap().formation_id,
            "FORMATION-LINE-1204"
        );
        assert_eq!(reloaded.swarm_state.leader_id.as_deref(), Some("HARV-001"));
        assert_eq!(reloaded.swarm_state.consensus_term, 3);
        assert_eq!(reloaded.metrics.consensus.election_count, 12);
        assert_eq!(reloaded.task_pool.len(), 2);
        assert!(reloaded.topology.reachable("TRAN-001", "HARV-001"));
    }

    #[test]
    fn optional_sections_default_cleanly() {
        let minimal = r#"{
            "robots": [],
            "swarm_state": {"leader_id": null, "consensus_term": 0, "timestamp": "2026-03-01T12:00:00Z"}
        }"#;
        let world = WorldModel::from_json(minimal).unwrap();
        assert_eq!(world.total_robots(), 0);
        assert!(world.task_pool.is_empty());
        assert!((world.swarm_config.election_timeout_seconds - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn untagged_location_point_form_parses() {
        let json = r#"{"lat": -22.0, "lon": -47.0}"#;
        let loc: TaskLocation = serde_json::from_str(json).unwrap();
        assert!(matches!(loc, TaskLocation::Point(_)));

        let json = r#"{"origin": {"lat": -22.0, "lon": -47.0}}"#;
        let loc: TaskLocation = serde_json::from_str(json).unwrap();
        assert!(matches!(loc, TaskLocation::Origin { .. }));
    }
}
