//! Deterministic world fixtures for unit and integration tests.

use crate::graph::Edge;
use crate::time::Timestamp;
use crate::world::{
    Communication, ConsensusMetrics, GeoPoint, GraphData, NetworkTopologyData, OperationalState,
    PerformanceMetrics, Position, Robot, RobotRole, RobotStatus, RobotType, SwarmConfig,
    SwarmRole, SwarmState, Task, TaskLocation, TaskPriority, TaskRequirements, TaskStatus,
    WorldModel, WorldSnapshot,
};
use std::collections::BTreeSet;

/// Reference instant all fixtures are anchored to.
pub fn base_time() -> Timestamp {
    "2026-03-01T12:00:00Z".parse().expect("valid fixture time")
}

/// A connected, idle robot with healthy defaults at the fixture origin.
pub fn robot(robot_id: &str, kind: RobotType) -> Robot {
    Robot {
        robot_id: robot_id.to_string(),
        kind,
        position: Position {
            lat: -22.7000,
            lon: -47.6000,
            heading_deg: 0.0,
        },
        status: RobotStatus {
            operational: OperationalState::Idle,
            battery_soc_percent: 80.0,
            uptime_hours: 8.0,
        },
        communication: Communication {
            connected: true,
            signal_strength_dbm: -60.0,
            latency_ms: 10.0,
            neighbors: BTreeSet::new(),
        },
        swarm_role: SwarmRole {
            role: RobotRole::Follower,
            term: 0,
            voted_for: None,
            last_heartbeat: base_time(),
        },
        formation: None,
        task_assignment: None,
    }
}

/// An open harvest task at the given coordinates.
pub fn harvest_task(task_id: &str, lat: f64, lon: f64) -> Task {
    Task {
        task_id: task_id.to_string(),
        task_type: "harvest".to_string(),
        priority: TaskPriority::Medium,
        status: TaskStatus::Open,
        requirements: TaskRequirements {
            robot_type: RobotType::Harvester,
            min_battery_percent: 50.0,
            estimated_duration_minutes: 30.0,
        },
        location: Some(TaskLocation::Centroid {
            centroid: GeoPoint { lat, lon },
        }),
        route: None,
        cargo: None,
        allocated_to: None,
    }
}

/// An open transport task at the given coordinates.
pub fn transport_task(task_id: &str, lat: f64, lon: f64, min_battery_percent: f64) -> Task {
    Task {
        task_id: task_id.to_string(),
        task_type: "transport".to_string(),
        priority: TaskPriority::Medium,
        status: TaskStatus::Open,
        requirements: TaskRequirements {
            robot_type: RobotType::Transport,
            min_battery_percent,
            estimated_duration_minutes: 30.0,
        },
        location: Some(TaskLocation::Point(GeoPoint { lat, lon })),
        route: None,
        cargo: None,
        allocated_to: None,
    }
}

/// Builds a [`WorldModel`] from robots, edges, and tasks. Robot neighbor
/// sets are derived from the declared edges at build time.
#[derive(Debug, Default)]
pub struct WorldBuilder {
    robots: Vec<Robot>,
    edges: Vec<Edge>,
    fully_connected: bool,
    leader_id: Option<String>,
    consensus_term: u64,
    election_count: u64,
    tasks: Vec<Task>,
}

impl WorldBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn robot(mut self, robot: Robot) -> Self {
        self.robots.push(robot);
        self
    }

    #[must_use]
    pub fn edge(mut self, from: &str, to: &str) -> Self {
        self.edges.push(Edge {
            from: from.to_string(),
            to: to.to_string(),
        });
        self
    }

    /// Mesh every robot to every other robot.
    #[must_use]
    pub fn fully_connected(mut self) -> Self {
        self.fully_connected = true;
        self
    }

    #[must_use]
    pub fn leader(mut self, leader_id: &str) -> Self {
        self.leader_id = Some(leader_id.to_string());
        self
    }

    #[must_use]
    pub fn term(mut self, term: u64) -> Self {
        self.consensus_term = term;
        self
    }

    #[must_use]
    pub fn election_count(mut self, count: u64) -> Self {
        self.election_count = count;
        self
    }

    #[must_use]
    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn build(mut self) -> WorldModel {
        if self.fully_connected {
            for i in 0..self.robots.len() {
                for j in (i + 1)..self.robots.len() {
                    self.edges.push(Edge {
                        from: self.robots[i].robot_id.clone(),
                        to: self.robots[j].robot_id.clone(),
                    });
                }
            }
        }

        for edge in &self.edges {
            let (from, to) = (edge.from.clone(), edge.to.clone());
            if let Some(robot) = self.robots.iter_mut().find(|r| r.robot_id == from) {
                robot.communication.neighbors.insert(to.clone());
            }
            if let Some(robot) = self.robots.iter_mut().find(|r| r.robot_id == to) {
                robot.communication.neighbors.insert(from);
            }
        }

        WorldModel::from_snapshot(WorldSnapshot {
            robots: self.robots,
            swarm_state: SwarmState {
                leader_id: self.leader_id,
                consensus_term: self.consensus_term,
                timestamp: base_time(),
            },
            swarm_config: SwarmConfig::default(),
            network_topology: NetworkTopologyData {
                graph: GraphData { edges: self.edges },
            },
            task_pool: self.tasks,
            performance_metrics: PerformanceMetrics {
                consensus: ConsensusMetrics {
                    election_count: self.election_count,
                },
            },
        })
    }
}
