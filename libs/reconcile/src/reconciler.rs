//! Fleet reconciliation: diff required labels against the instance inventory
//! and power instances on or off.
//!
//! A pass:
//! - resolves the required labels (see [`DemandResolver`])
//! - lists the managed instances of the zone, dropping those scoped to another
//!   repository
//! - starts TERMINATED instances whose label is required
//! - stops RUNNING instances whose label is not required
//!
//! Starts are applied before stops. Transitions already issued when a later
//! one fails are not rolled back; the next pass works from a fresh snapshot.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::demand::{DemandResolver, RequiredLabels};
use crate::error::{ReconcileError, RemoteError};
use crate::ports::{BuildSystem, ComputeFleet};
use crate::types::{ComputeInstance, InstanceStatus, ReconcileTarget};

/// Instances to start and stop, at most one of each per runner label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcilePlan {
    pub to_start: Vec<ComputeInstance>,
    pub to_stop: Vec<ComputeInstance>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.to_start.is_empty() && self.to_stop.is_empty()
    }
}

/// Result of a completed pass, reported by the adapters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub required_labels: Vec<String>,
    pub started_instances: Vec<ComputeInstance>,
    pub stopped_instances: Vec<ComputeInstance>,
}

/// Keep the first instance seen for each runner label.
fn dedupe_by_label<'a>(
    instances: impl Iterator<Item = &'a ComputeInstance>,
) -> Vec<ComputeInstance> {
    let mut seen = HashSet::new();
    instances
        .filter(|instance| seen.insert(instance.runner_label.clone()))
        .cloned()
        .collect()
}

/// Compute the start and stop sets for an inventory snapshot.
///
/// The two sets are disjoint: an instance is started only when TERMINATED and
/// stopped only when RUNNING.
pub fn plan(required: &RequiredLabels, inventory: &[ComputeInstance]) -> ReconcilePlan {
    let to_start = dedupe_by_label(inventory.iter().filter(|instance| {
        required.contains(&instance.runner_label) && instance.status == InstanceStatus::Terminated
    }));

    let to_stop = dedupe_by_label(inventory.iter().filter(|instance| {
        !required.contains(&instance.runner_label) && instance.status == InstanceStatus::Running
    }));

    ReconcilePlan { to_start, to_stop }
}

/// Long-lived handle on both remote systems, shared by every pass.
#[derive(Clone)]
pub struct Reconciler {
    build_system: Arc<dyn BuildSystem>,
    fleet: Arc<dyn ComputeFleet>,
}

impl Reconciler {
    pub fn new(build_system: Arc<dyn BuildSystem>, fleet: Arc<dyn ComputeFleet>) -> Self {
        Self {
            build_system,
            fleet,
        }
    }

    /// Resolve demand and inventory without touching any instance.
    pub async fn plan(
        &self,
        target: &ReconcileTarget,
    ) -> Result<(RequiredLabels, ReconcilePlan), ReconcileError> {
        let required = DemandResolver::new(self.build_system.as_ref())
            .resolve_required_labels(&target.organization, &target.repository)
            .await?;

        let inventory = self.inventory(target).await?;
        let plan = plan(&required, &inventory);

        info!(
            to_start = ?names(&plan.to_start),
            to_stop = ?names(&plan.to_stop),
            "Computed reconcile plan"
        );
        Ok((required, plan))
    }

    /// Run one full reconciliation pass.
    pub async fn reconcile(
        &self,
        target: &ReconcileTarget,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        info!(
            project = %target.project,
            zone = %target.zone,
            scope = %target.scope(),
            "Starting reconciliation pass"
        );

        let (required, plan) = self.plan(target).await?;
        self.apply(target, &plan).await?;

        let outcome = ReconcileOutcome {
            required_labels: required.into_vec(),
            started_instances: plan.to_start,
            stopped_instances: plan.to_stop,
        };
        info!(
            started = outcome.started_instances.len(),
            stopped = outcome.stopped_instances.len(),
            "Reconciliation pass complete"
        );
        Ok(outcome)
    }

    /// Managed instances of the target zone that belong to the target scope.
    async fn inventory(
        &self,
        target: &ReconcileTarget,
    ) -> Result<Vec<ComputeInstance>, RemoteError> {
        let scope = target.scope();
        let instances = self
            .fleet
            .list_managed_instances(&target.project, &target.zone)
            .await?;

        let inventory: Vec<_> = instances
            .into_iter()
            .filter(|instance| {
                let in_scope = instance.is_in_scope(&scope);
                debug!(
                    instance = %instance.instance_name,
                    label = %instance.runner_label,
                    scope = ?instance.scope,
                    status = %instance.status,
                    in_scope,
                    "Enumerated instance"
                );
                in_scope
            })
            .collect();

        Ok(inventory)
    }

    /// Issue every start, then every stop, one at a time.
    async fn apply(
        &self,
        target: &ReconcileTarget,
        plan: &ReconcilePlan,
    ) -> Result<(), RemoteError> {
        for instance in &plan.to_start {
            info!(
                instance = %instance.instance_name,
                label = %instance.runner_label,
                "Starting instance"
            );
            self.fleet
                .start(&target.project, &target.zone, &instance.instance_name)
                .await
                .inspect_err(|e| {
                    error!(
                        instance = %instance.instance_name,
                        error = %e,
                        "Failed to start instance"
                    )
                })?;
        }

        for instance in &plan.to_stop {
            info!(
                instance = %instance.instance_name,
                label = %instance.runner_label,
                "Stopping instance"
            );
            self.fleet
                .stop(&target.project, &target.zone, &instance.instance_name)
                .await
                .inspect_err(|e| {
                    error!(
                        instance = %instance.instance_name,
                        error = %e,
                        "Failed to stop instance"
                    )
                })?;
        }

        Ok(())
    }
}

fn names(instances: &[ComputeInstance]) -> Vec<&str> {
    instances
        .iter()
        .map(|instance| instance.instance_name.as_str())
        .collect()
}
