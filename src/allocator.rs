//! Market-based task allocation: per-task auctions and a greedy min-cost
//! batch assignment.

use crate::geo::haversine_m;
use crate::world::{
    GeoPoint, Robot, RobotType, Task, TaskAssignment, TaskPriority, TaskStatus, WorldModel,
};
use crate::{Error, Result};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use tracing::{debug, info};

/// Assumed battery pack capacity, in kWh.
const BATTERY_CAPACITY_KWH: f64 = 10.0;
/// Fraction of available energy a task may consume.
const ENERGY_MARGIN: f64 = 0.8;
/// Cost sentinel for ineligible robot/task pairs.
const INELIGIBLE_COST: f64 = 999.0;
/// Distance used when a task carries no resolvable location, in km.
const DEFAULT_DISTANCE_KM: f64 = 0.1;
/// Nominal cargo mass for transport energy estimates, in kg.
const NOMINAL_CARGO_KG: f64 = 500.0;
/// Assumed cargo mass when a transport task does not declare one, in kg.
const DEFAULT_CARGO_KG: f64 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMethod {
    Auction,
    Hungarian,
}

impl FromStr for AllocationMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auction" => Ok(Self::Auction),
            "hungarian" => Ok(Self::Hungarian),
            other => Err(Error::InvalidMethod {
                method: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct BidComponents {
    pub distance_score: f64,
    pub battery_score: f64,
    pub workload_score: f64,
    pub priority_score: f64,
}

/// A robot's offer for a task, in [0, 1]. Higher is better.
#[derive(Debug, Clone, Serialize)]
pub struct Bid {
    pub robot_id: String,
    pub bid_value: f64,
    pub estimated_cost_kwh: f64,
    pub estimated_time_minutes: f64,
    pub distance_km: f64,
    pub components: BidComponents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationFailureReason {
    NoBids,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuctionOutcome {
    Allocated {
        task_id: String,
        winner: Bid,
        bids_received: usize,
        all_bids: Vec<Bid>,
    },
    Failed {
        task_id: String,
        reason: AllocationFailureReason,
        bids_received: usize,
    },
}

impl AuctionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Allocated { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentReport {
    pub assignments: BTreeMap<String, Option<String>>,
    pub total_cost: f64,
    pub tasks_assigned: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AllocationResult {
    Auction(AuctionOutcome),
    Assignment(AssignmentReport),
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchAllocation {
    pub success: bool,
    pub method: AllocationMethod,
    pub tasks_processed: usize,
    pub tasks_allocated: usize,
    pub tasks_failed: usize,
    pub results: Vec<AllocationResult>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct WorkloadCounts {
    pub idle: usize,
    pub working: usize,
    pub overloaded: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UtilizationStatus {
    Optimal,
    Good,
    Underutilized,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllocationStatistics {
    pub total_tasks: usize,
    pub status_distribution: BTreeMap<TaskStatus, usize>,
    pub total_robots: usize,
    pub robot_workload: WorkloadCounts,
    pub utilization_percent: f64,
    pub tasks_allocated_total: u64,
    pub average_priority: f64,
    pub idle_robots: usize,
    pub status: UtilizationStatus,
}

/// Allocates tasks to robots through bids: a robot's willingness is scored
/// from distance, battery, workload, and task priority, subject to hard
/// eligibility gates (type, battery floor, operational state, connectivity,
/// energy budget).
#[derive(Debug, Default)]
pub struct TaskAllocator {
    tasks_allocated: u64,
}

impl TaskAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    fn task_point(task: &Task) -> Option<GeoPoint> {
        task.location
            .as_ref()
            .map(|l| l.resolve())
            .or_else(|| task.route.map(|r| r.origin))
    }

    /// Compute a robot's bid for a task, or `None` when the robot is
    /// ineligible.
    pub fn compute_bid(&self, robot: &Robot, task: &Task) -> Option<Bid> {
        let requirements = &task.requirements;

        if robot.kind != requirements.robot_type
            || robot.status.battery_soc_percent < requirements.min_battery_percent
            || !robot.is_available_for_tasks()
            || !robot.communication.connected
        {
            return None;
        }

        let distance_km = Self::task_point(task).map_or(DEFAULT_DISTANCE_KM, |point| {
            haversine_m(robot.position.lat, robot.position.lon, point.lat, point.lon) / 1000.0
        });

        let travel_speed_kmh = if robot.kind == RobotType::Harvester {
            3.0
        } else {
            5.0
        };
        let task_duration_h = requirements.estimated_duration_minutes / 60.0;
        let total_time_h = distance_km / travel_speed_kmh + task_duration_h;

        let energy_per_km = if robot.kind == RobotType::Harvester {
            0.3
        } else {
            0.2
        };
        let task_energy_kwh = match robot.kind {
            RobotType::Harvester => task_duration_h * 1.2,
            RobotType::Transport => {
                let cargo_kg = task.cargo.map_or(DEFAULT_CARGO_KG, |c| c.mass_kg);
                task_duration_h * 0.6 * (1.0 + cargo_kg / NOMINAL_CARGO_KG)
            }
            RobotType::Inspector => task_duration_h * 0.4,
        };
        let total_energy_kwh = distance_km * energy_per_km + task_energy_kwh;

        let available_kwh = robot.status.battery_soc_percent / 100.0 * BATTERY_CAPACITY_KWH;
        if total_energy_kwh > available_kwh * ENERGY_MARGIN {
            return None;
        }

        let distance_score = (1.0 - distance_km / 5.0).max(0.0);
        let battery_score = robot.status.battery_soc_percent / 100.0;
        let workload_score = robot
            .task_assignment
            .as_ref()
            .map_or(1.0, |current| 1.0 - current.progress_percent / 100.0);
        let priority_score = match task.priority {
            TaskPriority::Low => 0.5,
            TaskPriority::Medium => 0.75,
            TaskPriority::High => 1.0,
        };

        Some(Bid {
            robot_id: robot.robot_id.clone(),
            bid_value: distance_score * 0.4
                + battery_score * 0.3
                + workload_score * 0.2
                + priority_score * 0.1,
            estimated_cost_kwh: total_energy_kwh,
            estimated_time_minutes: total_time_h * 60.0,
            distance_km,
            components: BidComponents {
                distance_score,
                battery_score,
                workload_score,
                priority_score,
            },
        })
    }

    fn commit_assignment(world: &mut WorldModel, task_id: &str, winner: &Bid) {
        let Some(task) = world.task(task_id) else {
            return;
        };
        let (task_type, priority) = (task.task_type.clone(), task.priority);

        if let Some(robot) = world.robot_mut(&winner.robot_id) {
            robot.task_assignment = Some(TaskAssignment {
                task_id: task_id.to_string(),
                task_type,
                priority,
                progress_percent: 0.0,
                estimated_completion_minutes: winner.estimated_time_minutes,
            });
        }
        if let Some(task) = world.task_mut(task_id) {
            task.status = TaskStatus::Allocated;
            task.allocated_to = Some(winner.robot_id.clone());
        }
    }

    /// Auction one task: every robot bids, the highest bid wins, ties break
    /// by ascending robot id.
    pub fn run_auction(&mut self, world: &mut WorldModel, task_id: &str) -> Result<AuctionOutcome> {
        let task = world.task(task_id).ok_or_else(|| Error::UnknownTask {
            task_id: task_id.to_string(),
        })?;

        let mut bids: Vec<Bid> = world
            .robots()
            .filter_map(|robot| self.compute_bid(robot, task))
            .collect();

        if bids.is_empty() {
            debug!(task_id, "auction received no bids");
            return Ok(AuctionOutcome::Failed {
                task_id: task_id.to_string(),
                reason: AllocationFailureReason::NoBids,
                bids_received: 0,
            });
        }

        bids.sort_by(|a, b| {
            b.bid_value
                .partial_cmp(&a.bid_value)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.robot_id.cmp(&b.robot_id))
        });
        let winner = bids[0].clone();

        Self::commit_assignment(world, task_id, &winner);
        self.tasks_allocated += 1;
        info!(
            task_id,
            winner = %winner.robot_id,
            bid = winner.bid_value,
            "auction allocated"
        );

        Ok(AuctionOutcome::Allocated {
            task_id: task_id.to_string(),
            winner,
            bids_received: bids.len(),
            all_bids: bids,
        })
    }

    /// Greedy min-cost assignment over a batch of tasks.
    ///
    /// Cost is `1 − bid_value`; ineligible pairs carry the 999 sentinel and
    /// are excluded. Triples are taken in ascending cost order and each
    /// robot receives at most one task per pass.
    pub fn assign_greedy(
        &mut self,
        world: &mut WorldModel,
        task_ids: &[String],
    ) -> Result<AssignmentReport> {
        for task_id in task_ids {
            if world.task(task_id).is_none() {
                return Err(Error::UnknownTask {
                    task_id: task_id.clone(),
                });
            }
        }

        let robot_ids: Vec<String> = world.robot_ids().map(String::from).collect();

        // (task index, robot index, cost) for every eligible pair.
        let mut candidates: Vec<(usize, usize, f64)> = Vec::new();
        for (task_idx, task_id) in task_ids.iter().enumerate() {
            let Some(task) = world.task(task_id) else {
                continue;
            };
            for (robot_idx, robot) in world.robots().enumerate() {
                if let Some(bid) = self.compute_bid(robot, task) {
                    let cost = 1.0 - bid.bid_value;
                    if cost < INELIGIBLE_COST {
                        candidates.push((task_idx, robot_idx, cost));
                    }
                }
            }
        }

        candidates.sort_by(|a, b| {
            a.2.partial_cmp(&b.2)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
                .then_with(|| a.1.cmp(&b.1))
        });

        let mut assignments: BTreeMap<String, Option<String>> = BTreeMap::new();
        let mut taken_robots: HashSet<usize> = HashSet::new();
        let mut total_cost = 0.0;

        for (task_idx, robot_idx, cost) in candidates {
            let task_id = &task_ids[task_idx];
            if assignments.contains_key(task_id) || taken_robots.contains(&robot_idx) {
                continue;
            }
            assignments.insert(task_id.clone(), Some(robot_ids[robot_idx].clone()));
            taken_robots.insert(robot_idx);
            total_cost += cost;
        }

        for task_id in task_ids {
            assignments.entry(task_id.clone()).or_insert(None);
        }

        let committed: Vec<(String, String)> = assignments
            .iter()
            .filter_map(|(task, robot)| robot.as_ref().map(|r| (task.clone(), r.clone())))
            .collect();
        for (task_id, robot_id) in &committed {
            let bid = match (world.task(task_id), world.robot(robot_id)) {
                (Some(task), Some(robot)) => self.compute_bid(robot, task),
                _ => None,
            };
            if let Some(bid) = bid {
                Self::commit_assignment(world, task_id, &bid);
                self.tasks_allocated += 1;
            }
        }

        let tasks_assigned = committed.len();
        info!(
            tasks = task_ids.len(),
            assigned = tasks_assigned,
            total_cost,
            "greedy assignment"
        );

        Ok(AssignmentReport {
            assignments,
            total_cost,
            tasks_assigned,
        })
    }

    /// Allocate every open task in the pool, in pool order.
    pub fn allocate_tasks(
        &mut self,
        world: &mut WorldModel,
        method: AllocationMethod,
    ) -> Result<BatchAllocation> {
        let open_tasks = world.open_task_ids();
        let tasks_processed = open_tasks.len();

        if open_tasks.is_empty() {
            return Ok(BatchAllocation {
                success: true,
                method,
                tasks_processed: 0,
                tasks_allocated: 0,
                tasks_failed: 0,
                results: Vec::new(),
            });
        }

        let (tasks_allocated, results) = match method {
            AllocationMethod::Auction => {
                let mut allocated = 0;
                let mut results = Vec::with_capacity(open_tasks.len());
                for task_id in &open_tasks {
                    let outcome = self.run_auction(world, task_id)?;
                    if outcome.is_success() {
                        allocated += 1;
                    }
                    results.push(AllocationResult::Auction(outcome));
                }
                (allocated, results)
            }
            AllocationMethod::Hungarian => {
                let report = self.assign_greedy(world, &open_tasks)?;
                let allocated = report.tasks_assigned;
                (allocated, vec![AllocationResult::Assignment(report)])
            }
        };

        Ok(BatchAllocation {
            success: tasks_allocated > 0,
            method,
            tasks_processed,
            tasks_allocated,
            tasks_failed: tasks_processed - tasks_allocated,
            results,
        })
    }

    /// Fleet utilization and task status summary.
    pub fn get_allocation_statistics(&self, world: &WorldModel) -> AllocationStatistics {
        let mut status_distribution: BTreeMap<TaskStatus, usize> = BTreeMap::new();
        for task in &world.task_pool {
            *status_distribution.entry(task.status).or_default() += 1;
        }

        let mut workload = WorkloadCounts::default();
        for robot in world.robots() {
            match &robot.task_assignment {
                None => workload.idle += 1,
                Some(assignment) if assignment.progress_percent < 80.0 => workload.working += 1,
                Some(_) => workload.overloaded += 1,
            }
        }

        let total_robots = world.total_robots();
        let utilization = if total_robots > 0 {
            (workload.working + workload.overloaded) as f64 / total_robots as f64
        } else {
            0.0
        };

        let average_priority = if world.task_pool.is_empty() {
            0.0
        } else {
            world
                .task_pool
                .iter()
                .map(|t| match t.priority {
                    TaskPriority::Low => 1.0,
                    TaskPriority::Medium => 2.0,
                    TaskPriority::High => 3.0,
                })
                .sum::<f64>()
                / world.task_pool.len() as f64
        };

        let status = if utilization > 0.7 {
            UtilizationStatus::Optimal
        } else if utilization > 0.5 {
            UtilizationStatus::Good
        } else {
            UtilizationStatus::Underutilized
        };

        AllocationStatistics {
            total_tasks: world.task_pool.len(),
            status_distribution,
            total_robots,
            robot_workload: workload,
            utilization_percent: utilization * 100.0,
            tasks_allocated_total: self.tasks_allocated,
            average_priority,
            idle_robots: workload.idle,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{harvest_task, robot, WorldBuilder};
    use crate::world::OperationalState;

    #[test]
    fn wrong_type_cannot_bid() {
        let transporter = robot("T1", RobotType::Transport);
        let task = harvest_task("TASK-1", -22.7010, -47.6000);

        assert!(TaskAllocator::new().compute_bid(&transporter, &task).is_none());
    }

    #[test]
    fn battery_floor_gates_bids() {
        let mut harvester = robot("H1", RobotType::Harvester);
        harvester.status.battery_soc_percent = 49.0;
        let task = harvest_task("TASK-1", -22.7010, -47.6000);

        assert!(TaskAllocator::new().compute_bid(&harvester, &task).is_none());
    }

    #[test]
    fn offline_and_disconnected_robots_cannot_bid() {
        let task = harvest_task("TASK-1", -22.7010, -47.6000);
        let allocator = TaskAllocator::new();

        let mut charging = robot("H1", RobotType::Harvester);
        charging.status.operational = OperationalState::Charging;
        assert!(allocator.compute_bid(&charging, &task).is_none());

        let mut unlinked = robot("H2", RobotType::Harvester);
        unlinked.communication.connected = false;
        assert!(allocator.compute_bid(&unlinked, &task).is_none());
    }

    #[test]
    fn energy_hungry_tasks_are_refused() {
        let mut harvester = robot("H1", RobotType::Harvester);
        harvester.status.battery_soc_percent = 55.0;
        let mut task = harvest_task("TASK-1", -22.7010, -47.6000);
        // 55% of 10 kWh leaves 4.4 kWh usable; 4 h of harvesting needs 4.8.
        task.requirements.min_battery_percent = 50.0;
        task.requirements.estimated_duration_minutes = 240.0;

        assert!(TaskAllocator::new().compute_bid(&harvester, &task).is_none());
    }

    #[test]
    fn missing_location_falls_back_to_minimal_distance() {
        let harvester = robot("H1", RobotType::Harvester);
        let mut task = harvest_task("TASK-1", 0.0, 0.0);
        task.location = None;

        let bid = TaskAllocator::new().compute_bid(&harvester, &task).unwrap();
        assert!((bid.distance_km - DEFAULT_DISTANCE_KM).abs() < 1e-9);
    }

    #[test]
    fn unknown_method_string_is_rejected() {
        assert!("auction".parse::<AllocationMethod>().is_ok());
        assert!("hungarian".parse::<AllocationMethod>().is_ok());
        assert!(matches!(
            "simplex".parse::<AllocationMethod>(),
            Err(Error::InvalidMethod { .. })
        ));
    }

    #[test]
    fn empty_pool_allocation_is_a_successful_no_op() {
        let mut world = WorldBuilder::new()
            .robot(robot("H1", RobotType::Harvester))
            .build();
        let mut allocator = TaskAllocator::new();

        let batch = allocator
            .allocate_tasks(&mut world, AllocationMethod::Auction)
            .unwrap();
        assert!(batch.success);
        assert_eq!(batch.tasks_processed, 0);
        assert!(batch.results.is_empty());
    }
}
