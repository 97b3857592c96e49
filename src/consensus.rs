//! Leader election, log replication, and swarm health over a
//! partial-connectivity mesh.
//!
//! The election is Raft-shaped: a term is raised, the best-scored candidate
//! requests votes from every robot it can reach, and a majority of the
//! whole fleet (⌊n/2⌋+1) commits the new leader. Vote responses and
//! replication acknowledgements are sampled through the injected RNG to
//! model channel noise and jitter.

use crate::rng::SwarmRng;
use crate::time::seconds_between;
use crate::world::{OperationalState, RobotRole, SwarmConfig, WorldModel};
use crate::{Error, Result};
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, info, warn};

/// Minimum state of charge for a robot to stand as candidate.
const CANDIDATE_MIN_BATTERY_PERCENT: f64 = 40.0;
/// Uptime that earns the full seniority score, in hours.
const UPTIME_NORMALIZATION_HOURS: f64 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnhealthyReason {
    NoLeader,
    LeaderDisconnected,
    LeaderNotOperational,
    HeartbeatTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    TriggerElection,
    RetryElection,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderHealth {
    pub healthy: bool,
    pub leader_id: Option<String>,
    pub time_since_heartbeat_s: Option<f64>,
    pub connected: bool,
    pub operational: bool,
    pub heartbeat_recent: bool,
    pub reason: Option<UnhealthyReason>,
    pub action: Option<RecoveryAction>,
}

impl LeaderHealth {
    fn no_leader() -> Self {
        Self {
            healthy: false,
            leader_id: None,
            time_since_heartbeat_s: None,
            connected: false,
            operational: false,
            heartbeat_recent: false,
            reason: Some(UnhealthyReason::NoLeader),
            action: Some(RecoveryAction::TriggerElection),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionFailureReason {
    NoViableCandidates,
    NoMajority,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VoteTally {
    pub votes_for: usize,
    pub votes_against: usize,
    pub no_response: usize,
    pub voted_for: Vec<String>,
    pub voted_against: Vec<String>,
    pub unresponsive: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ElectionWin {
    pub new_leader: String,
    pub term: u64,
    pub votes_received: usize,
    pub total_robots: usize,
    pub majority: usize,
    pub duration_seconds: f64,
    pub vote_details: VoteTally,
}

#[derive(Debug, Clone, Serialize)]
pub struct ElectionFailure {
    pub reason: ElectionFailureReason,
    pub term: u64,
    pub candidate: Option<String>,
    pub votes_received: usize,
    pub total_robots: usize,
    pub majority: usize,
    pub action: Option<RecoveryAction>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ElectionOutcome {
    Elected(ElectionWin),
    Failed(ElectionFailure),
}

impl ElectionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Elected(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplicationReport {
    pub leader_id: String,
    pub replicated_to: Vec<String>,
    pub failed_to: Vec<String>,
    pub majority: usize,
    pub committed: bool,
    pub state_update: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReplicationOutcome {
    NoLeader,
    Completed(ReplicationReport),
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RoleCounts {
    pub leader: usize,
    pub follower: usize,
    pub candidate: usize,
    pub disconnected: usize,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct HealthFactors {
    pub has_leader: bool,
    pub no_split_brain: bool,
    pub high_connectivity: bool,
    pub no_candidates: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsensusStatus {
    pub current_term: u64,
    pub current_leader: Option<String>,
    pub total_robots: usize,
    pub role_counts: RoleCounts,
    pub split_brain: bool,
    pub split_brain_incidents: u64,
    pub election_count: u64,
    pub health_score: f64,
    pub health_factors: HealthFactors,
    pub status: HealthStatus,
}

struct Candidate {
    robot_id: String,
    priority: f64,
}

/// Maintains exactly one operational leader and replicates state updates
/// to a majority of the fleet.
#[derive(Debug)]
pub struct ConsensusEngine {
    config: SwarmConfig,
    split_brain_incidents: u64,
    rng: SwarmRng,
}

impl ConsensusEngine {
    pub fn new(config: SwarmConfig, rng: SwarmRng) -> Self {
        Self {
            config,
            split_brain_incidents: 0,
            rng,
        }
    }

    /// Check whether the current leader is alive, connected, and heartbeating
    /// within the election timeout.
    pub fn check_leader_health(&self, world: &WorldModel) -> LeaderHealth {
        let Some(leader_id) = world.swarm_state.leader_id.clone() else {
            return LeaderHealth::no_leader();
        };
        let Some(leader) = world.robot(&leader_id) else {
            return LeaderHealth::no_leader();
        };

        let elapsed = seconds_between(
            &world.swarm_state.timestamp,
            &leader.swarm_role.last_heartbeat,
        );
        let connected = leader.communication.connected;
        let operational = leader.is_available_for_tasks();
        let heartbeat_recent = elapsed < self.config.election_timeout_seconds;
        let healthy = connected && operational && heartbeat_recent;

        let reason = if healthy {
            None
        } else if !connected {
            Some(UnhealthyReason::LeaderDisconnected)
        } else if !operational {
            Some(UnhealthyReason::LeaderNotOperational)
        } else {
            Some(UnhealthyReason::HeartbeatTimeout)
        };

        debug!(
            %leader_id,
            elapsed_s = elapsed,
            healthy, "check_leader_health"
        );

        LeaderHealth {
            healthy,
            leader_id: Some(leader_id),
            time_since_heartbeat_s: Some(elapsed),
            connected,
            operational,
            heartbeat_recent,
            reason,
            action: (!healthy).then_some(RecoveryAction::TriggerElection),
        }
    }

    /// Raise the term and run one election round.
    ///
    /// On success every robot's role and term are committed; on a failed
    /// round only the raised term, the election counter, and the
    /// candidate's own vote survive.
    pub fn trigger_leader_election(&self, world: &mut WorldModel) -> Result<ElectionOutcome> {
        let total_robots = world.total_robots();
        if total_robots == 0 {
            return Ok(ElectionOutcome::Failed(ElectionFailure {
                reason: ElectionFailureReason::NoViableCandidates,
                term: world.swarm_state.consensus_term,
                candidate: None,
                votes_received: 0,
                total_robots: 0,
                majority: 0,
                action: None,
            }));
        }

        let new_term = world.swarm_state.consensus_term + 1;
        world.swarm_state.consensus_term = new_term;
        world.metrics.consensus.election_count += 1;
        debug!(term = new_term, total_robots, "trigger_leader_election");

        let mut candidates = self.viable_candidates(world);
        if candidates.is_empty() {
            info!(term = new_term, "election failed: no viable candidates");
            return Ok(ElectionOutcome::Failed(ElectionFailure {
                reason: ElectionFailureReason::NoViableCandidates,
                term: new_term,
                candidate: None,
                votes_received: 0,
                total_robots,
                majority: world.majority(),
                action: None,
            }));
        }

        candidates.sort_by(|a, b| {
            b.priority
                .partial_cmp(&a.priority)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.robot_id.cmp(&b.robot_id))
        });
        let front_runner = &candidates[0];

        let tally = self.simulate_voting(world, &front_runner.robot_id, front_runner.priority);
        let majority = world.majority();
        let candidate_id = front_runner.robot_id.clone();

        if tally.votes_for >= majority {
            world.swarm_state.leader_id = Some(candidate_id.clone());
            for robot in world.robots_mut() {
                if robot.robot_id == candidate_id {
                    robot.swarm_role.role = RobotRole::Leader;
                    robot.swarm_role.voted_for = Some(candidate_id.clone());
                } else {
                    robot.swarm_role.role = RobotRole::Follower;
                    if tally.voted_for.contains(&robot.robot_id) {
                        robot.swarm_role.voted_for = Some(candidate_id.clone());
                    }
                }
                robot.swarm_role.term = new_term;
            }

            let leaders: Vec<String> = world
                .robots()
                .filter(|r| r.swarm_role.role == RobotRole::Leader)
                .map(|r| r.robot_id.clone())
                .collect();
            if leaders.len() != 1 {
                return Err(Error::DuplicateLeaders { leaders });
            }

            let duration_seconds = self.rng.uniform(1.5, 3.0);
            info!(
                new_leader = %candidate_id,
                term = new_term,
                votes = tally.votes_for,
                majority,
                "election won"
            );

            Ok(ElectionOutcome::Elected(ElectionWin {
                new_leader: candidate_id,
                term: new_term,
                votes_received: tally.votes_for,
                total_robots,
                majority,
                duration_seconds,
                vote_details: tally,
            }))
        } else {
            // The candidate still voted for itself this term.
            if let Some(candidate) = world.robot_mut(&candidate_id) {
                candidate.swarm_role.voted_for = Some(candidate_id.clone());
            }
            info!(
                candidate = %candidate_id,
                term = new_term,
                votes = tally.votes_for,
                majority,
                "election failed: no majority"
            );

            Ok(ElectionOutcome::Failed(ElectionFailure {
                reason: ElectionFailureReason::NoMajority,
                term: new_term,
                candidate: Some(candidate_id),
                votes_received: tally.votes_for,
                total_robots,
                majority,
                action: Some(RecoveryAction::RetryElection),
            }))
        }
    }

    fn viable_candidates(&self, world: &WorldModel) -> Vec<Candidate> {
        let total = world.total_robots() as f64;
        world
            .robots()
            .filter(|robot| {
                robot.communication.connected
                    && matches!(
                        robot.status.operational,
                        OperationalState::Working
                            | OperationalState::Idle
                            | OperationalState::Charging
                    )
                    && robot.status.battery_soc_percent >= CANDIDATE_MIN_BATTERY_PERCENT
            })
            .map(|robot| {
                let battery_score = robot.status.battery_soc_percent / 100.0;
                let uptime_score =
                    (robot.status.uptime_hours / UPTIME_NORMALIZATION_HOURS).min(1.0);
                let neighbor_score = robot.communication.neighbors.len() as f64 / total;
                Candidate {
                    robot_id: robot.robot_id.clone(),
                    priority: battery_score * 0.5 + uptime_score * 0.3 + neighbor_score * 0.2,
                }
            })
            .collect()
    }

    /// One RequestVote round. Unreachable or disconnected robots never
    /// answer; everyone else casts a Bernoulli vote weighted by the
    /// candidate's priority and its own link latency.
    fn simulate_voting(
        &self,
        world: &WorldModel,
        candidate_id: &str,
        candidate_priority: f64,
    ) -> VoteTally {
        let mut tally = VoteTally {
            votes_for: 1,
            voted_for: vec![candidate_id.to_string()],
            ..VoteTally::default()
        };

        for robot in world.robots() {
            if robot.robot_id == candidate_id {
                continue;
            }

            let reachable = world.topology.reachable(&robot.robot_id, candidate_id);
            if !robot.communication.connected || !reachable {
                tally.unresponsive.push(robot.robot_id.clone());
                continue;
            }

            let latency_score = (1.0 - robot.communication.latency_ms / 100.0).max(0.0);
            let vote_probability =
                candidate_priority * 0.6 + latency_score * 0.3 + self.rng.uniform(0.0, 0.1);

            if self.rng.chance(vote_probability) {
                tally.votes_for += 1;
                tally.voted_for.push(robot.robot_id.clone());
            } else {
                tally.voted_against.push(robot.robot_id.clone());
            }
        }

        tally.votes_against = tally.voted_against.len();
        tally.no_response = tally.unresponsive.len();
        tally
    }

    /// Replicate a state update from the leader to its connected followers.
    ///
    /// Per-follower delivery succeeds with a probability driven by signal
    /// strength and latency, gated on mesh reachability. The update commits
    /// iff the leader plus acknowledged followers reach a majority.
    pub fn replicate_state(
        &self,
        world: &WorldModel,
        state_update: serde_json::Value,
    ) -> ReplicationOutcome {
        let leader_id = match world.swarm_state.leader_id.as_deref() {
            Some(id) if world.robot(id).is_some() => id.to_string(),
            _ => return ReplicationOutcome::NoLeader,
        };

        let mut replicated_to = Vec::new();
        let mut failed_to = Vec::new();

        for robot in world.robots() {
            if robot.robot_id == leader_id
                || robot.swarm_role.role != RobotRole::Follower
                || !robot.communication.connected
            {
                continue;
            }

            let reachable = world.topology.reachable(&leader_id, &robot.robot_id);
            let signal_score =
                ((robot.communication.signal_strength_dbm + 100.0) / 50.0).min(1.0);
            let latency_score = (1.0 - robot.communication.latency_ms / 100.0).max(0.0);
            let success_probability = signal_score * 0.6 + latency_score * 0.3 + 0.1;

            if reachable && self.rng.chance(success_probability) {
                replicated_to.push(robot.robot_id.clone());
            } else {
                failed_to.push(robot.robot_id.clone());
            }
        }

        let majority = world.majority();
        let committed = replicated_to.len() + 1 >= majority;
        info!(
            %leader_id,
            acked = replicated_to.len(),
            majority,
            committed,
            "replicate_state"
        );

        ReplicationOutcome::Completed(ReplicationReport {
            leader_id,
            replicated_to,
            failed_to,
            majority,
            committed,
            state_update,
        })
    }

    /// Observe current roles and report overall consensus health.
    ///
    /// Counting more than one leader is a split-brain incident; it bumps
    /// the incident counter and forces a CRITICAL status.
    pub fn get_consensus_status(&mut self, world: &WorldModel) -> ConsensusStatus {
        let mut counts = RoleCounts::default();
        for robot in world.robots() {
            if !robot.communication.connected {
                counts.disconnected += 1;
                continue;
            }
            match robot.swarm_role.role {
                RobotRole::Leader => counts.leader += 1,
                RobotRole::Follower => counts.follower += 1,
                RobotRole::Candidate => counts.candidate += 1,
            }
        }

        let total = world.total_robots();
        let split_brain = counts.leader > 1;
        if split_brain {
            self.split_brain_incidents += 1;
            warn!(leaders = counts.leader, "split-brain detected");
        }

        let factors = HealthFactors {
            has_leader: counts.leader == 1,
            no_split_brain: !split_brain,
            high_connectivity: (counts.disconnected as f64) < total as f64 * 0.2,
            no_candidates: counts.candidate == 0,
        };
        let health_score = f64::from(u8::from(factors.has_leader))
            + f64::from(u8::from(factors.no_split_brain))
            + f64::from(u8::from(factors.high_connectivity))
            + f64::from(u8::from(factors.no_candidates));
        let health_score = health_score / 4.0;

        let status = if split_brain {
            HealthStatus::Critical
        } else if health_score >= 0.75 {
            HealthStatus::Healthy
        } else if health_score >= 0.5 {
            HealthStatus::Warning
        } else {
            HealthStatus::Critical
        };

        ConsensusStatus {
            current_term: world.swarm_state.consensus_term,
            current_leader: world.swarm_state.leader_id.clone(),
            total_robots: total,
            role_counts: counts,
            split_brain,
            split_brain_incidents: self.split_brain_incidents,
            election_count: world.metrics.consensus.election_count,
            health_score,
            health_factors: factors,
            status,
        }
    }
}
