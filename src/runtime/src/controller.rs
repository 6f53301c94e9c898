//! Lifecycle controller - drives instances through the state machine.
//!
//! Requests are validated and committed synchronously; provisioner work
//! (bring-up, restart) runs on spawned legs that converge the record later.
//! Callers observe progress through `get_instance` / `list_instances` or
//! the event stream.
//!
//! Every mutation is a compare-and-swap against the registry. A writer that
//! loses the race re-reads the record and decides again, so concurrent
//! requests for the same instance settle on exactly one outcome.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::task::AbortHandle;

use harness_core::config::{InstanceConfig, LimitsConfig};
use harness_core::error::{HarnessError, Result};
use harness_core::event::{events, EventEmitter, InstanceEvent};
use harness_core::instance::{FaultType, Instance, InstanceId, InstanceState, ProvisionHandle};

use crate::provisioner::Provisioner;
use crate::registry::{InstanceRegistry, Snapshot};
use crate::retry::RetryPolicy;

/// `last_error` of an instance whose provisioning was cut short by terminate.
pub const CANCELLED_BY_TERMINATE: &str = "provisioning cancelled by terminate request";

/// A pending edit to an instance record.
#[derive(Debug, Clone)]
enum Change {
    /// Move to `to`, recording `error` when set.
    Transition {
        to: InstanceState,
        error: Option<String>,
    },
    /// Bring-up finished: `Pending -> Running` with the provisioner handle.
    Provisioned(ProvisionHandle),
    /// Mark a fault active or inactive.
    Fault { fault: FaultType, active: bool },
}

impl Change {
    fn apply(self, instance: &mut Instance) {
        match self {
            Change::Transition { to, error } => {
                instance.state = to;
                if let Some(error) = error {
                    instance.last_error = Some(error);
                }
                if to != InstanceState::Running {
                    instance.faults.clear();
                }
                if to == InstanceState::Terminated {
                    instance.handle = None;
                    instance.terminated_at = Some(chrono::Utc::now());
                }
            }
            Change::Provisioned(handle) => {
                instance.state = InstanceState::Running;
                instance.handle = Some(handle);
            }
            Change::Fault { fault, active } => {
                instance.faults.retain(|f| *f != fault);
                if active {
                    instance.faults.push(fault);
                    instance.faults.sort();
                }
            }
        }
    }
}

/// An in-flight provisioner leg.
struct InflightLeg {
    generation: u64,
    task: AbortHandle,
}

type InflightMap = Arc<DashMap<InstanceId, InflightLeg>>;

/// Deregisters a leg when it finishes or is aborted.
struct LegGuard {
    inflight: InflightMap,
    id: InstanceId,
    generation: u64,
}

impl Drop for LegGuard {
    fn drop(&mut self) {
        let generation = self.generation;
        self.inflight
            .remove_if(&self.id, |_, leg| leg.generation == generation);
    }
}

/// Instance lifecycle controller.
///
/// Cheap to clone; clones share the registry, provisioner and leg table.
/// Operations that start legs must be called from within a Tokio runtime.
#[derive(Clone)]
pub struct LifecycleController {
    registry: Arc<InstanceRegistry>,
    provisioner: Arc<dyn Provisioner>,
    retry: RetryPolicy,
    limits: LimitsConfig,
    events: EventEmitter,
    inflight: InflightMap,
    next_generation: Arc<AtomicU64>,
}

impl LifecycleController {
    /// Create a controller over `registry`, provisioning through `provisioner`.
    pub fn new(
        registry: Arc<InstanceRegistry>,
        provisioner: Arc<dyn Provisioner>,
        retry: RetryPolicy,
        limits: LimitsConfig,
        events: EventEmitter,
    ) -> Self {
        Self {
            registry,
            provisioner,
            retry,
            limits,
            events,
            inflight: Arc::new(DashMap::new()),
            next_generation: Arc::new(AtomicU64::new(1)),
        }
    }

    /// The registry this controller writes to.
    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.registry
    }

    /// The lifecycle event stream.
    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Number of provisioner legs currently in flight.
    pub fn inflight_legs(&self) -> usize {
        self.inflight.len()
    }

    /// Validate `config`, record a `Pending` instance and start bringing it up.
    ///
    /// Returns as soon as the record is written.
    pub fn create_instance(&self, config: InstanceConfig) -> Result<InstanceId> {
        config.validate(&self.limits)?;

        let id = InstanceId::generate();
        let instance = Instance::pending(id.clone(), config.clone());
        self.registry.put(instance.clone())?;
        self.events.emit(InstanceEvent::for_state(&instance));

        tracing::info!(
            instance_id = %id,
            cpus = config.cpus,
            memory_mb = config.memory_mb,
            node_type = %config.node_type,
            "Instance created"
        );

        let this = self.clone();
        let leg_id = id.clone();
        self.spawn_leg(&id, move |guard| this.bring_up_leg(leg_id, config, guard));
        Ok(id)
    }

    /// Snapshot of all instances.
    pub fn list_instances(&self) -> Snapshot {
        self.registry.list()
    }

    /// Current record for `id`.
    pub fn get_instance(&self, id: &InstanceId) -> Result<Instance> {
        self.registry.get(id)
    }

    /// Restart a running instance.
    ///
    /// A restart already in progress makes this a no-op, so concurrent
    /// requests produce a single provisioner call.
    pub fn restart(&self, id: &InstanceId) -> Result<()> {
        let updated = self.mutate(id, |current| match current.state {
            InstanceState::Running => Ok(Some(Change::Transition {
                to: InstanceState::Restarting,
                error: None,
            })),
            InstanceState::Restarting => Ok(None),
            state => Err(HarnessError::InvalidState {
                id: id.to_string(),
                state,
                operation: "restart",
            }),
        })?;

        let Some(updated) = updated else {
            tracing::debug!(instance_id = %id, "Restart already in progress");
            return Ok(());
        };
        self.events.emit(InstanceEvent::for_state(&updated));
        tracing::info!(instance_id = %id, version = updated.version, "Instance restarting");

        let Some(handle) = updated.handle.clone() else {
            let message = format!("running instance {} has no provisioner handle", id);
            tracing::error!(instance_id = %id, "{}", message);
            self.settle_failed(id, InstanceState::Restarting, message.clone());
            return Err(HarnessError::internal(message));
        };

        let this = self.clone();
        let leg_id = id.clone();
        self.spawn_leg(id, move |guard| this.restart_leg(leg_id, handle, guard));
        Ok(())
    }

    /// Terminate an instance.
    ///
    /// In-flight provisioning is cancelled first (the record passes through
    /// `Failed`). Terminating a terminated instance is a no-op. The
    /// provisioner handle is released in the background.
    pub fn terminate(&self, id: &InstanceId) -> Result<()> {
        loop {
            let current = self.registry.get(id)?;
            match current.state {
                InstanceState::Terminated => return Ok(()),
                InstanceState::Pending | InstanceState::Restarting => {
                    self.cancel(&current);
                }
                InstanceState::Running | InstanceState::Failed => {
                    let change = Change::Transition {
                        to: InstanceState::Terminated,
                        error: None,
                    };
                    match self
                        .registry
                        .compare_and_swap(id, current.version, |i| change.apply(i))
                    {
                        Ok(updated) => {
                            self.events.emit(InstanceEvent::for_state(&updated));
                            tracing::info!(
                                instance_id = %id,
                                from = %current.state,
                                version = updated.version,
                                "Instance terminated"
                            );
                            if let Some(handle) = current.handle {
                                self.spawn_tear_down(id.clone(), handle);
                            }
                            return Ok(());
                        }
                        Err(HarnessError::VersionConflict { .. }) => continue,
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }

    /// Start injecting `fault` into a running instance.
    pub async fn inject_fault(&self, id: &InstanceId, fault: FaultType) -> Result<Instance> {
        self.set_fault(id, fault, true).await
    }

    /// Stop injecting `fault` into a running instance.
    pub async fn undo_fault(&self, id: &InstanceId, fault: FaultType) -> Result<Instance> {
        self.set_fault(id, fault, false).await
    }

    async fn set_fault(&self, id: &InstanceId, fault: FaultType, active: bool) -> Result<Instance> {
        let operation = if active { "inject fault" } else { "undo fault" };
        let current = self.registry.get(id)?;
        if current.state != InstanceState::Running {
            return Err(HarnessError::InvalidState {
                id: id.to_string(),
                state: current.state,
                operation,
            });
        }
        if current.has_fault(fault) == active {
            return Ok(current);
        }
        let handle = current.handle.clone().ok_or_else(|| {
            HarnessError::internal(format!("running instance {} has no provisioner handle", id))
        })?;

        let provisioner = &*self.provisioner;
        let handle = &handle;
        if active {
            self.retry
                .run("inject_fault", move || provisioner.inject_fault(handle, fault))
                .await?;
        } else {
            self.retry
                .run("undo_fault", move || provisioner.undo_fault(handle, fault))
                .await?;
        }

        let updated = self.mutate(id, |current| {
            if current.state != InstanceState::Running {
                return Err(HarnessError::InvalidState {
                    id: id.to_string(),
                    state: current.state,
                    operation,
                });
            }
            if current.has_fault(fault) == active {
                return Ok(None);
            }
            Ok(Some(Change::Fault { fault, active }))
        })?;

        match updated {
            Some(updated) => {
                let key = if active {
                    events::FAULT_INJECTED
                } else {
                    events::FAULT_UNDONE
                };
                self.events.emit(InstanceEvent::new(key, &updated));
                tracing::info!(instance_id = %id, fault = %fault, active, "Fault updated");
                Ok(updated)
            }
            None => self.registry.get(id),
        }
    }

    /// Re-read, decide, swap; repeat on version conflicts.
    ///
    /// `decide` returns `None` when the record needs no change.
    fn mutate<F>(&self, id: &InstanceId, mut decide: F) -> Result<Option<Instance>>
    where
        F: FnMut(&Instance) -> Result<Option<Change>>,
    {
        loop {
            let current = self.registry.get(id)?;
            let Some(change) = decide(&current)? else {
                return Ok(None);
            };
            match self
                .registry
                .compare_and_swap(id, current.version, |i| change.apply(i))
            {
                Ok(updated) => return Ok(Some(updated)),
                Err(HarnessError::VersionConflict { expected, actual, .. }) => {
                    tracing::trace!(instance_id = %id, expected, actual, "Version conflict, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Register and spawn a provisioner leg for `id`.
    ///
    /// The leg is entered into the table before it can run, so a concurrent
    /// `terminate` always finds it.
    fn spawn_leg<F, Fut>(&self, id: &InstanceId, leg: F)
    where
        F: FnOnce(LegGuard) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let guard = LegGuard {
            inflight: self.inflight.clone(),
            id: id.clone(),
            generation,
        };

        let entry = self.inflight.entry(id.clone());
        let task = tokio::spawn(leg(guard)).abort_handle();
        entry.insert(InflightLeg { generation, task });
    }

    /// Abort the leg of a `Pending`/`Restarting` record and mark it `Failed`.
    fn cancel(&self, current: &Instance) {
        if let Some((_, leg)) = self.inflight.remove(&current.id) {
            leg.task.abort();
            tracing::debug!(instance_id = %current.id, generation = leg.generation, "Aborted provisioner leg");
        }

        let change = Change::Transition {
            to: InstanceState::Failed,
            error: Some(CANCELLED_BY_TERMINATE.to_string()),
        };
        // On conflict the caller re-reads and decides again.
        if let Ok(updated) =
            self.registry
                .compare_and_swap(&current.id, current.version, |i| change.apply(i))
        {
            self.events.emit(InstanceEvent::for_state(&updated));
            tracing::info!(instance_id = %current.id, from = %current.state, "Provisioning cancelled");
        }
    }

    async fn bring_up_leg(self, id: InstanceId, config: InstanceConfig, guard: LegGuard) {
        let provisioner = &*self.provisioner;
        let (leg_id, leg_config) = (&id, &config);
        let result = self
            .retry
            .run("bring_up", move || provisioner.bring_up(leg_id, leg_config))
            .await;

        let handle = match result {
            Ok(handle) => handle,
            Err(e) => {
                drop(guard);
                self.settle_failed(&id, InstanceState::Pending, e.to_string());
                return;
            }
        };

        let committed = self.mutate(&id, |current| {
            Ok((current.state == InstanceState::Pending)
                .then(|| Change::Provisioned(handle.clone())))
        });
        drop(guard);

        match committed {
            Ok(Some(updated)) => {
                self.events.emit(InstanceEvent::for_state(&updated));
                tracing::info!(
                    instance_id = %id,
                    endpoint = %handle.endpoint,
                    version = updated.version,
                    "Instance running"
                );
            }
            Ok(None) => {
                tracing::info!(instance_id = %id, "Instance left pending during bring-up, releasing");
                // Detached: a terminate may already have aborted this task.
                self.spawn_tear_down(id, handle);
            }
            Err(e) => {
                self.report_leg_error(&id, "bring_up", e);
                self.spawn_tear_down(id, handle);
            }
        }
    }

    async fn restart_leg(self, id: InstanceId, handle: ProvisionHandle, guard: LegGuard) {
        let provisioner = &*self.provisioner;
        let leg_handle = &handle;
        let result = self
            .retry
            .run("restart", move || provisioner.restart(leg_handle))
            .await;
        drop(guard);

        if let Err(e) = result {
            self.settle_failed(&id, InstanceState::Restarting, e.to_string());
            return;
        }

        let committed = self.mutate(&id, |current| {
            Ok((current.state == InstanceState::Restarting).then_some(Change::Transition {
                to: InstanceState::Running,
                error: None,
            }))
        });
        match committed {
            Ok(Some(updated)) => {
                self.events.emit(InstanceEvent::for_state(&updated));
                tracing::info!(instance_id = %id, version = updated.version, "Instance restarted");
            }
            Ok(None) => {
                tracing::debug!(instance_id = %id, "Instance left restarting during restart");
            }
            Err(e) => self.report_leg_error(&id, "restart", e),
        }
    }

    /// Move a record still in `from` to `Failed` with `error`.
    fn settle_failed(&self, id: &InstanceId, from: InstanceState, error: String) {
        let committed = self.mutate(id, |current| {
            Ok((current.state == from).then(|| Change::Transition {
                to: InstanceState::Failed,
                error: Some(error.clone()),
            }))
        });
        match committed {
            Ok(Some(updated)) => {
                self.events.emit(InstanceEvent::for_state(&updated));
                tracing::warn!(instance_id = %id, from = %from, error = %error, "Instance failed");
            }
            Ok(None) => {}
            Err(e) => self.report_leg_error(id, "settle_failed", e),
        }
    }

    fn report_leg_error(&self, id: &InstanceId, leg: &str, e: HarnessError) {
        let e = match e {
            HarnessError::NotFound(_) => HarnessError::internal(format!(
                "record {} vanished while its {} leg was running",
                id, leg
            )),
            other => other,
        };
        tracing::error!(instance_id = %id, leg, error = %e, "Provisioner leg could not commit");
    }

    fn spawn_tear_down(&self, id: InstanceId, handle: ProvisionHandle) {
        let this = self.clone();
        tokio::spawn(async move { this.tear_down(&id, &handle).await });
    }

    /// Release a provisioner handle; failures are logged, not returned.
    async fn tear_down(&self, id: &InstanceId, handle: &ProvisionHandle) {
        let provisioner = &*self.provisioner;
        match self
            .retry
            .run("tear_down", move || provisioner.tear_down(handle))
            .await
        {
            Ok(()) => tracing::debug!(instance_id = %id, token = %handle.token, "Provisioner handle released"),
            Err(e) => tracing::warn!(instance_id = %id, token = %handle.token, error = %e, "Tear-down failed"),
        }
    }
}
