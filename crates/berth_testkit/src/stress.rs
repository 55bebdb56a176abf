//! Stress runs for the state coordinator.
//!
//! These drive many writers and readers at one [`State`] and report
//! throughput. Callers check consistency afterwards.

use berth_core::{Entity, Project, ProjectRef, State, Target};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Number of projects targets are spread over.
    pub projects: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 200,
            threads: 4,
            projects: 3,
        }
    }
}

fn seed_projects(state: &State, count: usize) -> Vec<ProjectRef> {
    (0..count.max(1))
        .map(|i| {
            state
                .project_put(Project::new(format!("project-{i}"), format!("/work/{i}")))
                .expect("Failed to seed project")
                .to_ref()
        })
        .collect()
}

/// Every thread puts fresh targets, round-robin over the projects.
pub fn stress_concurrent_target_puts(state: &State, config: &StressConfig) -> StressTestResult {
    let projects = seed_projects(state, config.projects);
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    let start = Instant::now();
    thread::scope(|scope| {
        for t in 0..config.threads {
            let (projects, successful, failed) = (&projects, &successful, &failed);
            scope.spawn(move || {
                for i in 0..config.operations {
                    let project = &projects[(t + i) % projects.len()];
                    let target = Target::new(format!("t{t}-{i}"), project.clone());
                    match state.target_put(target) {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            });
        }
    });

    StressTestResult::new(
        successful.into_inner(),
        failed.into_inner(),
        start.elapsed(),
    )
}

/// Half the threads put and delete targets while the other half read.
///
/// Reads count as failed only on errors other than not-found, since a
/// reader may race a delete.
pub fn stress_mixed_operations(state: &State, config: &StressConfig) -> StressTestResult {
    let projects = seed_projects(state, config.projects);
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let writers = (config.threads / 2).max(1);

    let start = Instant::now();
    thread::scope(|scope| {
        for t in 0..config.threads.max(2) {
            let (projects, successful, failed) = (&projects, &successful, &failed);
            scope.spawn(move || {
                for i in 0..config.operations {
                    let ok = if t < writers {
                        let project = &projects[i % projects.len()];
                        let put = state.target_put(Target::new(format!("w{t}-{i}"), project.clone()));
                        match put {
                            Ok(target) if i % 2 == 0 => state.target_delete(&target.to_ref()).is_ok(),
                            Ok(_) => true,
                            Err(_) => false,
                        }
                    } else {
                        let project = &projects[i % projects.len()];
                        let read = state.project_get(project).and_then(|p| {
                            for reference in p.targets.iter().take(4) {
                                match state.target_get(reference) {
                                    Err(e) if !e.is_not_found() => return Err(e),
                                    _ => {}
                                }
                            }
                            state.target_list().map(|_| ())
                        });
                        read.is_ok()
                    };
                    if ok {
                        successful.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    StressTestResult::new(
        successful.into_inner(),
        failed.into_inner(),
        start.elapsed(),
    )
}
