// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Swarm Lifecycle Manager
//!
//! Top-level state machine of one swarm. Composes the readiness tracker,
//! config fanout, aggregators and journal with the workload, topology,
//! queue-stats and control-plane ports.
//!
//! `prepare`, `start`, `stop` and `remove` run one at a time; a second
//! call while one is in flight fails fast with
//! [`SwarmError::OperationInFlight`]. Heartbeat and status ingestion run
//! concurrently with them and never return errors to the consumer loop.
//!
//! Containers are launched in plan order. The computed start order is kept
//! on the [`RuntimeContext`], logged and journaled, and drives teardown
//! (reverse start order) in `remove`.

use crate::application::aggregators::{
    CapabilitiesRegistry, DiagnosticsAggregator, IoStateAggregator, WorkerStatusReport, WorkersAggregator,
};
use crate::application::config_fanout::{ConfigFanout, FanoutSettings};
use crate::application::environment::{instance_name, WorkerEnvSettings};
use crate::application::journal::{JournalFailureSuppressor, SuppressionSettings, SwarmJournal};
use crate::application::readiness::{ReadinessSettings, ReadinessTracker};
use crate::application::status::{collect_queue_stats, SwarmStatusReport};
use crate::domain::fanout::ConfigUpdateRequest;
use crate::domain::planner::{compute_start_order, StartOrder};
use crate::domain::swarm::{RuntimeContext, RuntimeState, SwarmError, SwarmStatus};
use aegis_core::domain::control_plane::{
    events, signals, CommandTarget, ControlEvent, ControlPlaneError, ControlPlanePublisher, ControlScope,
    ControlSignal, ControllerIdentity, RoutingKey,
};
use aegis_core::domain::controller_config::ControllerConfigManifest;
use aegis_core::domain::journal::{Journal, JournalDirection, JournalSeverity};
use aegis_core::domain::plan::{Bee, SwarmPlan};
use aegis_core::domain::runtime::{RuntimeError, WorkerSpec, WorkloadRuntime};
use aegis_core::domain::topology::{QueueStatsProvider, QueueTopology};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// External collaborators the lifecycle drives.
#[derive(Clone)]
pub struct LifecyclePorts {
    pub runtime: Arc<dyn WorkloadRuntime>,
    pub topology: Arc<dyn QueueTopology>,
    pub queue_stats: Arc<dyn QueueStatsProvider>,
    pub publisher: Arc<dyn ControlPlanePublisher>,
}

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub readiness: ReadinessSettings,
    pub fanout: FanoutSettings,
    pub worker_env: WorkerEnvSettings,
    pub suppression: SuppressionSettings,
    pub worker_stale_after: Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            readiness: ReadinessSettings::default(),
            fanout: FanoutSettings::default(),
            worker_env: WorkerEnvSettings::default(),
            suppression: SuppressionSettings::default(),
            worker_stale_after: Duration::from_secs(30),
        }
    }
}

impl From<&ControllerConfigManifest> for LifecycleSettings {
    fn from(config: &ControllerConfigManifest) -> Self {
        Self {
            readiness: ReadinessSettings::from(config),
            fanout: FanoutSettings::from(config),
            worker_env: WorkerEnvSettings::from(config),
            suppression: SuppressionSettings::from(config),
            worker_stale_after: config.spec.workers.stale_after,
        }
    }
}

type StatusRequest = (String, String);

pub struct SwarmLifecycleManager {
    identity: ControllerIdentity,
    ports: LifecyclePorts,
    settings: LifecycleSettings,
    journal: SwarmJournal,
    suppressor: JournalFailureSuppressor,
    readiness: ReadinessTracker,
    fanout: ConfigFanout,
    workers: WorkersAggregator,
    io_state: IoStateAggregator,
    diagnostics: DiagnosticsAggregator,
    capabilities: CapabilitiesRegistry,
    status: RwLock<SwarmStatus>,
    context: RwLock<Option<Arc<RuntimeContext>>>,
    runtime_state: RwLock<RuntimeState>,
    declared_queues: RwLock<BTreeSet<String>>,
    controller_enabled: AtomicBool,
    operation: tokio::sync::Mutex<()>,
    status_requests: Mutex<mpsc::UnboundedReceiver<StatusRequest>>,
}

impl SwarmLifecycleManager {
    pub fn new(
        identity: ControllerIdentity,
        ports: LifecyclePorts,
        journal_sink: Arc<dyn Journal>,
        settings: LifecycleSettings,
    ) -> Self {
        let journal = SwarmJournal::new(journal_sink, &identity);
        let suppressor = JournalFailureSuppressor::new(journal.clone(), settings.suppression);

        // The tracker reports stale instances from inside synchronous reads;
        // requests are queued here and published by `dispatch_status_requests`.
        let (tx, rx) = mpsc::unbounded_channel::<StatusRequest>();
        let readiness = ReadinessTracker::new(
            settings.readiness,
            Arc::new(move |role: &str, instance: &str| {
                let _ = tx.send((role.to_string(), instance.to_string()));
            }),
        );

        let fanout = ConfigFanout::new(
            identity.clone(),
            ports.publisher.clone(),
            journal.clone(),
            settings.fanout,
        );

        Self {
            workers: WorkersAggregator::new(settings.worker_stale_after),
            io_state: IoStateAggregator::new(),
            diagnostics: DiagnosticsAggregator::new(),
            capabilities: CapabilitiesRegistry::new(),
            status: RwLock::new(SwarmStatus::New),
            context: RwLock::new(None),
            runtime_state: RwLock::new(RuntimeState::new()),
            declared_queues: RwLock::new(BTreeSet::new()),
            controller_enabled: AtomicBool::new(false),
            operation: tokio::sync::Mutex::new(()),
            status_requests: Mutex::new(rx),
            identity,
            ports,
            settings,
            journal,
            suppressor,
            readiness,
            fanout,
        }
    }

    pub fn from_config(
        config: &ControllerConfigManifest,
        ports: LifecyclePorts,
        journal_sink: Arc<dyn Journal>,
    ) -> Self {
        Self::new(config.identity(), ports, journal_sink, LifecycleSettings::from(config))
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn swarm_id(&self) -> &str {
        &self.identity.swarm_id
    }

    pub fn identity(&self) -> &ControllerIdentity {
        &self.identity
    }

    pub fn status(&self) -> SwarmStatus {
        *self.status.read()
    }

    pub fn controller_enabled(&self) -> bool {
        self.controller_enabled.load(Ordering::SeqCst)
    }

    pub fn context(&self) -> Option<Arc<RuntimeContext>> {
        self.context.read().clone()
    }

    pub fn start_order(&self) -> Option<StartOrder> {
        self.context.read().as_ref().map(|c| c.start_order.clone())
    }

    /// Copy of the current runtime bookkeeping.
    pub fn runtime_state(&self) -> RuntimeState {
        self.runtime_state.read().clone()
    }

    pub fn declared_queues(&self) -> BTreeSet<String> {
        self.declared_queues.read().clone()
    }

    pub fn readiness(&self) -> &ReadinessTracker {
        &self.readiness
    }

    pub fn fanout(&self) -> &ConfigFanout {
        &self.fanout
    }

    pub fn journal(&self) -> &SwarmJournal {
        &self.journal
    }

    fn swarm_scope(&self) -> ControlScope {
        ControlScope::swarm(&self.identity.swarm_id)
    }

    fn instance_scope(&self, role: &str, instance: &str) -> ControlScope {
        ControlScope::instance(&self.identity.swarm_id, role, instance)
    }

    fn begin_operation(&self) -> Result<tokio::sync::MutexGuard<'_, ()>, SwarmError> {
        self.operation
            .try_lock()
            .map_err(|_| SwarmError::OperationInFlight(self.identity.swarm_id.clone()))
    }

    // ------------------------------------------------------------------
    // Status transitions
    // ------------------------------------------------------------------

    fn transition(&self, next: SwarmStatus) -> Result<SwarmStatus, SwarmError> {
        let previous = {
            let mut status = self.status.write();
            let current = *status;
            if !current.can_transition_to(next) {
                return Err(SwarmError::InvalidTransition {
                    from: current,
                    to: next,
                });
            }
            *status = next;
            current
        };

        info!(swarm_id = %self.identity.swarm_id, from = %previous, to = %next, "Swarm status changed");
        self.journal.local(
            JournalSeverity::Info,
            "status-changed",
            self.swarm_scope(),
            json!({"from": previous, "to": next}),
        );
        Ok(previous)
    }

    /// Force the swarm into FAILED. Used when a target instance rejects its
    /// config update or a lifecycle step fails irrecoverably.
    pub async fn fail(&self, reason: &str) {
        let previous = {
            let mut status = self.status.write();
            let current = *status;
            if current.can_transition_to(SwarmStatus::Failed) {
                *status = SwarmStatus::Failed;
                Some(current)
            } else {
                None
            }
        };

        let Some(previous) = previous else {
            warn!(swarm_id = %self.identity.swarm_id, status = %self.status(), reason, "Ignoring failure in terminal status");
            return;
        };

        error!(swarm_id = %self.identity.swarm_id, from = %previous, reason, "Swarm failed");
        self.journal.local(
            JournalSeverity::Error,
            "swarm-failed",
            self.swarm_scope(),
            json!({"from": previous, "reason": reason}),
        );
        self.raise_alert(JournalSeverity::Error, "swarm-failed", reason).await;
    }

    async fn fail_operation(&self, stage: &str, err: SwarmError) -> SwarmError {
        self.fail(&format!("{} failed: {}", stage, err)).await;
        err
    }

    // ------------------------------------------------------------------
    // Lifecycle operations
    // ------------------------------------------------------------------

    /// Parse the plan, declare the work topology and launch one container
    /// per runnable bee.
    pub async fn prepare(&self, plan_json: &str) -> Result<(), SwarmError> {
        let _op = self.begin_operation()?;
        self.prepare_locked(plan_json).await
    }

    async fn prepare_locked(&self, plan_json: &str) -> Result<(), SwarmError> {
        let plan = match SwarmPlan::from_json(plan_json) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(swarm_id = %self.identity.swarm_id, error = %e, "Rejected swarm plan");
                self.journal.local(
                    JournalSeverity::Error,
                    "plan-rejected",
                    self.swarm_scope(),
                    json!({"error": e.to_string()}),
                );
                return Err(e.into());
            }
        };

        if !self.runtime_state.read().is_empty() {
            return Err(SwarmError::AlreadyProvisioned(self.identity.swarm_id.clone()));
        }
        self.transition(SwarmStatus::Creating)?;

        let start_order = compute_start_order(&plan);
        info!(
            swarm_id = %self.identity.swarm_id,
            start_order = ?start_order.roles,
            "Computed start order; containers are launched in plan order"
        );
        if !start_order.is_strict() {
            self.journal.local(
                JournalSeverity::Warn,
                "start-order-cycle",
                self.swarm_scope(),
                json!({"roles": start_order.cyclic}),
            );
            let message = format!(
                "Work queue dependency cycle between roles {:?}; start order is best-effort",
                start_order.cyclic
            );
            self.raise_alert(JournalSeverity::Warn, "dependency-cycle", &message).await;
        }

        let context = Arc::new(RuntimeContext::new(plan, start_order));

        self.readiness.reset();
        self.fanout.clear();
        self.clear_aggregators();
        for bee in context.plan.runnable_bees() {
            self.readiness.register_expected(&bee.role);
        }
        *self.context.write() = Some(context.clone());

        if let Err(e) = self.declare_topology(&context).await {
            return Err(self.fail_operation("Queue topology declaration", e).await);
        }

        for bee in context.plan.runnable_bees() {
            if let Err(e) = self.launch_worker(&context, bee).await {
                return Err(self.fail_operation(&format!("Launching role '{}'", bee.role), e).await);
            }
        }

        self.transition(SwarmStatus::Ready)?;

        let containers = self.runtime_state.read().container_count();
        self.journal.local(
            JournalSeverity::Info,
            "prepare",
            self.swarm_scope(),
            json!({
                "planId": context.plan.id,
                "startOrder": context.start_order,
                "containers": containers,
            }),
        );
        self.emit_outcome(
            events::SWARM_CREATE,
            json!({"startOrder": context.start_order.roles, "containers": containers}),
        )
        .await;
        Ok(())
    }

    async fn declare_topology(&self, context: &RuntimeContext) -> Result<(), SwarmError> {
        let exchange = self.ports.topology.declare_work_exchange().await?;

        let mut declared = BTreeSet::new();
        let result = self
            .ports
            .topology
            .declare_work_queues(&exchange, &context.queue_suffixes, &mut declared)
            .await;
        debug!(swarm_id = %self.identity.swarm_id, exchange = %exchange, queues = ?declared, "Declared work topology");
        *self.declared_queues.write() = declared;
        result?;
        Ok(())
    }

    async fn launch_worker(&self, context: &RuntimeContext, bee: &Bee) -> Result<(), SwarmError> {
        let Some(image) = bee.image.as_deref() else {
            return Ok(());
        };
        let swarm_id = &self.identity.swarm_id;
        let instance = instance_name(swarm_id, &bee.role);
        let env = self
            .settings
            .worker_env
            .compose(swarm_id, bee, &instance, context.sut_environment.as_ref());

        let spec = WorkerSpec {
            image: image.to_string(),
            name: instance.clone(),
            env,
        };
        let container = self.ports.runtime.start_worker(spec).await?;
        info!(swarm_id = %swarm_id, role = %bee.role, instance = %instance, container = %container, "Launched worker");

        self.runtime_state
            .write()
            .record(&bee.role, container.clone(), instance.clone());
        self.fanout
            .register_bootstrap_config(&instance, &bee.role, bee.config.clone());
        self.journal.local(
            JournalSeverity::Info,
            "worker-started",
            self.instance_scope(&bee.role, &instance),
            json!({"containerId": container.as_str(), "image": image}),
        );
        Ok(())
    }

    /// Prepare if no containers are recorded yet, then enable the controller
    /// and broadcast a swarm-wide enable.
    pub async fn start(&self, plan_json: &str) -> Result<(), SwarmError> {
        let _op = self.begin_operation()?;

        // A prepared plan with no runnable bees stays READY without containers.
        let has_containers = !self.runtime_state.read().is_empty();
        let provisioned = has_containers || !self.status().can_transition_to(SwarmStatus::Creating);
        if provisioned {
            debug!(swarm_id = %self.identity.swarm_id, "Reusing existing runtime state");
        } else {
            self.prepare_locked(plan_json).await?;
        }

        self.transition(SwarmStatus::Starting)?;
        self.controller_enabled.store(true, Ordering::SeqCst);
        if let Err(e) = self.broadcast_enabled(true, "start").await {
            self.controller_enabled.store(false, Ordering::SeqCst);
            return Err(self.fail_operation("Swarm enable broadcast", e).await);
        }
        self.transition(SwarmStatus::Running)?;

        let order = self.start_order().map(|o| o.roles).unwrap_or_default();
        self.emit_outcome(events::SWARM_START, json!({"startOrder": order})).await;
        Ok(())
    }

    /// Broadcast a swarm-wide disable, disable the controller and publish a
    /// status delta.
    pub async fn stop(&self) -> Result<(), SwarmError> {
        let _op = self.begin_operation()?;
        self.transition(SwarmStatus::Stopping)?;

        let broadcast = self.broadcast_enabled(false, "stop").await;
        self.controller_enabled.store(false, Ordering::SeqCst);
        if let Err(e) = broadcast {
            return Err(self.fail_operation("Swarm disable broadcast", e).await);
        }

        self.transition(SwarmStatus::Stopped)?;
        if let Err(e) = self.publish_status(false).await {
            warn!(swarm_id = %self.identity.swarm_id, error = %e, "Failed to publish status delta after stop");
        }
        self.emit_outcome(events::SWARM_STOP, json!({})).await;
        Ok(())
    }

    /// Tear everything down in reverse start order. Each deletion is
    /// attempted independently; failures are logged and journaled.
    pub async fn remove(&self) -> Result<(), SwarmError> {
        let _op = self.begin_operation()?;
        self.transition(SwarmStatus::Removing)?;

        if let Err(e) = self.broadcast_enabled(false, "remove").await {
            warn!(swarm_id = %self.identity.swarm_id, error = %e, "Disable broadcast failed during remove");
        }
        self.controller_enabled.store(false, Ordering::SeqCst);

        let context = self.context();
        let state = self.runtime_state();
        let mut failures = 0usize;
        let mut stopped = 0usize;

        for role in teardown_order(context.as_deref(), &state) {
            let Some(workers) = state.role(&role) else {
                continue;
            };
            for (container, instance) in workers.containers.iter().zip(&workers.instances) {
                match self.ports.runtime.stop_worker(container).await {
                    Ok(()) => {
                        stopped += 1;
                        self.journal.local(
                            JournalSeverity::Info,
                            "worker-stopped",
                            self.instance_scope(&role, instance),
                            json!({"containerId": container.as_str()}),
                        );
                    }
                    Err(RuntimeError::ContainerNotFound(_)) => {
                        debug!(role = %role, instance = %instance, container = %container, "Container already gone");
                    }
                    Err(e) => {
                        failures += 1;
                        warn!(role = %role, instance = %instance, container = %container, error = %e, "Failed to stop worker");
                        self.journal.local(
                            JournalSeverity::Warn,
                            "worker-stop-failed",
                            self.instance_scope(&role, instance),
                            json!({"containerId": container.as_str(), "error": e.to_string()}),
                        );
                    }
                }
            }
        }

        let naming = &self.settings.worker_env.naming;
        let swarm_id = &self.identity.swarm_id;
        let mut control_queues: Vec<String> = state
            .instances()
            .map(|(role, instance)| naming.control_queue(swarm_id, role, instance))
            .collect();
        control_queues.push(naming.control_queue(swarm_id, &self.identity.role, &self.identity.instance_id));
        for queue in &control_queues {
            if let Err(e) = self.ports.topology.delete_control_queue(queue).await {
                failures += 1;
                warn!(queue = %queue, error = %e, "Failed to delete control queue");
            }
        }

        if let Some(context) = &context {
            if let Err(e) = self.ports.topology.delete_work_queues(&context.queue_suffixes).await {
                failures += 1;
                warn!(swarm_id = %swarm_id, error = %e, "Failed to delete work queues");
            }
            if let Err(e) = self.ports.topology.delete_work_exchange().await {
                failures += 1;
                warn!(swarm_id = %swarm_id, error = %e, "Failed to delete work exchange");
            }
        }

        self.runtime_state.write().clear();
        self.declared_queues.write().clear();
        *self.context.write() = None;
        self.readiness.reset();
        self.fanout.clear();
        self.clear_aggregators();

        self.transition(SwarmStatus::Removed)?;
        self.emit_outcome(
            events::SWARM_REMOVE,
            json!({"stoppedContainers": stopped, "failures": failures}),
        )
        .await;
        Ok(())
    }

    fn clear_aggregators(&self) {
        self.workers.clear();
        self.io_state.clear();
        self.diagnostics.clear();
        self.capabilities.clear();
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Record a heartbeat and retry the instance's bootstrap config if due.
    pub async fn update_heartbeat(&self, role: &str, instance: &str, at: DateTime<Utc>) {
        self.readiness.record_heartbeat(role, instance, at);
        self.retry_bootstrap(role, instance).await;
        self.dispatch_status_requests().await;
    }

    pub fn update_enabled(&self, role: &str, instance: &str, enabled: bool) {
        self.readiness.record_enabled(role, instance, enabled);
    }

    /// Mark an instance ready; returns whether the whole swarm is ready.
    pub async fn mark_ready(&self, role: &str, instance: &str) -> bool {
        let ready = self.readiness.mark_ready(role, instance);
        self.journal.inbound(
            JournalSeverity::Info,
            "lifecycle",
            "instance-ready",
            self.instance_scope(role, instance),
            json!({"swarmReady": ready}),
            None,
        );
        if ready {
            info!(swarm_id = %self.identity.swarm_id, "All expected instances ready");
        }
        self.dispatch_status_requests().await;
        ready
    }

    /// An instance acknowledged its bootstrap config.
    pub fn acknowledge_config(&self, role: &str, instance: &str) -> bool {
        let acknowledged = self.fanout.acknowledge_bootstrap(instance);
        if acknowledged {
            self.journal.inbound(
                JournalSeverity::Info,
                "outcome",
                "config-ack",
                self.instance_scope(role, instance),
                json!({}),
                None,
            );
        }
        acknowledged
    }

    /// An instance rejected its bootstrap config. The pending entry is
    /// dropped and the swarm fails; returns the failure message.
    pub async fn handle_config_update_error(&self, role: &str, instance: &str, error: &str) -> Option<String> {
        self.journal.inbound(
            JournalSeverity::Error,
            "outcome",
            "config-update-error",
            self.instance_scope(role, instance),
            json!({"error": error}),
            None,
        );
        let message = self.fanout.handle_config_update_error(instance, error)?;
        self.fail(&message).await;
        Some(message)
    }

    /// Fold a worker status report into readiness and the aggregators.
    pub async fn ingest_status(&self, role: &str, instance: &str, report: WorkerStatusReport) {
        let at = report.timestamp.unwrap_or_else(Utc::now);
        self.readiness.record_heartbeat(role, instance, at);
        self.readiness.record_status_snapshot(role, instance, at);
        if let Some(enabled) = report.enabled {
            self.readiness.record_enabled(role, instance, enabled);
        }

        self.workers.record(role, instance, &report, at);
        if let Some(io_state) = report.io_state {
            self.io_state.record(role, instance, io_state);
        }
        if let Some(diagnostics) = &report.diagnostics {
            self.diagnostics.record(role, diagnostics.clone());
        }
        if let Some(manifest) = report.capabilities {
            self.capabilities.record(role, instance, manifest);
        }

        self.retry_bootstrap(role, instance).await;
        self.dispatch_status_requests().await;
    }

    /// Parse and ingest a raw status payload. Malformed payloads are a
    /// contract violation: journaled (rate limited) and rejected.
    pub async fn ingest_status_json(&self, role: &str, instance: &str, raw: &str) -> Result<(), SwarmError> {
        let report: WorkerStatusReport = match serde_json::from_str(raw) {
            Ok(report) => report,
            Err(e) => {
                let scope = self.instance_scope(role, instance);
                let routing_key = RoutingKey::event(events::METRIC, events::STATUS_FULL, &scope);
                let entry = self
                    .journal
                    .entry(JournalSeverity::Warn, JournalDirection::In, "metric", "status-rejected", scope)
                    .with_data(json!({"error": e.to_string()}))
                    .with_raw(raw);
                self.suppressor
                    .record(routing_key.as_str(), &format!("{:?}", e.classify()), entry);
                return Err(SwarmError::Contract(format!(
                    "status from {}/{} is not valid: {}",
                    role, instance, e
                )));
            }
        };
        self.ingest_status(role, instance, report).await;
        Ok(())
    }

    /// Journal a message the transport dropped or rejected, rate limited per
    /// (type, routing key, reason).
    pub fn record_transport_drop(&self, entry_type: &str, routing_key: &str, reason: &str, raw: Option<&str>) {
        let mut entry = self
            .journal
            .entry(JournalSeverity::Warn, JournalDirection::In, "transport", entry_type, self.swarm_scope())
            .with_data(json!({"reason": reason}));
        if let Some(raw) = raw {
            entry = entry.with_raw(raw);
        }
        self.suppressor.record(routing_key, reason, entry);
    }

    async fn retry_bootstrap(&self, role: &str, instance: &str) {
        if let Err(e) = self.fanout.publish_bootstrap_config_if_necessary(instance, false).await {
            let routing_key = RoutingKey::signal(signals::CONFIG_UPDATE, &self.instance_scope(role, instance));
            self.record_publish_failure(&routing_key, signals::CONFIG_UPDATE, &e.to_string());
        }
    }

    /// Publish a `status-request` to every instance the readiness tracker
    /// reported stale since the last call. Returns how many were sent.
    pub async fn dispatch_status_requests(&self) -> usize {
        let requests: BTreeSet<StatusRequest> = {
            let mut rx = self.status_requests.lock();
            std::iter::from_fn(|| rx.try_recv().ok()).collect()
        };

        let mut sent = 0;
        for (role, instance) in requests {
            let signal = ControlSignal {
                signal: signals::STATUS_REQUEST.to_string(),
                correlation_id: Uuid::new_v4(),
                idempotency_key: Uuid::new_v4(),
                swarm_id: self.identity.swarm_id.clone(),
                role: Some(role),
                instance: Some(instance),
                command_target: CommandTarget::Instance,
                origin: self.identity.instance_id.clone(),
                args: json!({}),
            };
            let routing_key = signal.routing_key();
            match self.ports.publisher.publish_signal(&routing_key, &signal).await {
                Ok(()) => {
                    sent += 1;
                    self.journal.signal_out(&routing_key, &signal);
                }
                Err(e) => self.record_publish_failure(&routing_key, signals::STATUS_REQUEST, &e.to_string()),
            }
        }
        sent
    }

    // ------------------------------------------------------------------
    // Config fanout and readiness queries
    // ------------------------------------------------------------------

    pub async fn publish_config_update(
        &self,
        request: &ConfigUpdateRequest,
        context: &str,
    ) -> Result<ControlSignal, SwarmError> {
        match self.fanout.publish_config_update(request, context).await {
            Ok(signal) => Ok(signal),
            Err(e) => {
                let routing_key = RoutingKey::signal(signals::CONFIG_UPDATE, &self.swarm_scope());
                self.record_publish_failure(&routing_key, signals::CONFIG_UPDATE, &e.to_string());
                Err(e.into())
            }
        }
    }

    async fn broadcast_enabled(&self, enabled: bool, context: &str) -> Result<(), SwarmError> {
        let mut data = serde_json::Map::new();
        data.insert("enabled".to_string(), enabled.into());
        self.publish_config_update(&ConfigUpdateRequest::for_swarm(data), context)
            .await
            .map(|_| ())
    }

    /// At least one role is expected and every expected instance is ready
    /// with a fresh heartbeat.
    pub fn is_ready_for_work(&self) -> bool {
        self.readiness.expected_total() > 0 && self.readiness.is_fully_ready()
    }

    // ------------------------------------------------------------------
    // Status reporting
    // ------------------------------------------------------------------

    pub async fn status_report(&self) -> SwarmStatusReport {
        let queues = self.declared_queues();
        let queue_stats = collect_queue_stats(self.ports.queue_stats.as_ref(), &queues).await;
        let ready_for_work = self.is_ready_for_work();

        let report = SwarmStatusReport {
            swarm_id: self.identity.swarm_id.clone(),
            status: self.status(),
            controller_enabled: self.controller_enabled(),
            ready_for_work,
            timestamp: Utc::now(),
            metrics: self.readiness.metrics(),
            workers: self.workers.snapshot(),
            work: self.io_state.aggregate_work(),
            diagnostics: self.diagnostics.snapshot(),
            capabilities: self.capabilities.view(),
            queues: queue_stats,
        };
        self.dispatch_status_requests().await;
        report
    }

    /// Publish the status report as `status-full` or `status-delta`.
    pub async fn publish_status(&self, full: bool) -> Result<SwarmStatusReport, SwarmError> {
        let report = self.status_report().await;
        let (event_type, data) = if full {
            let data = serde_json::to_value(&report).map_err(ControlPlaneError::Encoding)?;
            (events::STATUS_FULL, data)
        } else {
            (events::STATUS_DELTA, report.delta())
        };
        let event = self.event(events::METRIC, event_type, data);
        self.publish_event(&event, JournalSeverity::Info).await?;
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Event helpers
    // ------------------------------------------------------------------

    fn event(&self, kind: &str, event_type: &str, data: serde_json::Value) -> ControlEvent {
        ControlEvent {
            kind: kind.to_string(),
            event_type: event_type.to_string(),
            swarm_id: self.identity.swarm_id.clone(),
            role: self.identity.role.clone(),
            instance: self.identity.instance_id.clone(),
            origin: self.identity.instance_id.clone(),
            correlation_id: Some(Uuid::new_v4()),
            idempotency_key: None,
            timestamp: Utc::now(),
            data,
        }
    }

    async fn publish_event(&self, event: &ControlEvent, severity: JournalSeverity) -> Result<(), SwarmError> {
        let routing_key = event.routing_key();
        match self.ports.publisher.publish_event(&routing_key, event).await {
            Ok(()) => {
                self.journal.event_out(&routing_key, event, severity);
                Ok(())
            }
            Err(e) => {
                self.record_publish_failure(&routing_key, &event.event_type, &e.to_string());
                Err(e.into())
            }
        }
    }

    async fn emit_outcome(&self, event_type: &str, data: serde_json::Value) {
        let mut data = data;
        if let Some(map) = data.as_object_mut() {
            map.insert("status".to_string(), json!(self.status()));
        }
        let event = self.event(events::OUTCOME, event_type, data);
        if let Err(e) = self.publish_event(&event, JournalSeverity::Info).await {
            warn!(swarm_id = %self.identity.swarm_id, event_type, error = %e, "Failed to publish lifecycle outcome");
        }
    }

    async fn raise_alert(&self, severity: JournalSeverity, code: &str, message: &str) {
        let event = self.event(
            events::ALERT,
            events::ALERT_RAISED,
            json!({"code": code, "message": message, "severity": severity}),
        );
        if let Err(e) = self.publish_event(&event, severity).await {
            warn!(swarm_id = %self.identity.swarm_id, code, error = %e, "Failed to publish alert");
        }
    }

    fn record_publish_failure(&self, routing_key: &RoutingKey, entry_type: &str, reason: &str) {
        let entry = self
            .journal
            .entry(
                JournalSeverity::Error,
                JournalDirection::Out,
                "transport",
                entry_type,
                self.swarm_scope(),
            )
            .with_data(json!({"error": reason}));
        self.suppressor.record(routing_key.as_str(), reason, entry);
    }
}

/// Reverse start order, followed by any provisioned role the start order
/// does not mention (reverse insertion order).
fn teardown_order(context: Option<&RuntimeContext>, state: &RuntimeState) -> Vec<String> {
    let mut order: Vec<String> = context
        .map(|c| c.start_order.reversed().map(str::to_string).collect())
        .unwrap_or_default();
    let extra: Vec<String> = state
        .roles()
        .map(|r| r.role.clone())
        .filter(|role| !order.contains(role))
        .collect();
    order.extend(extra.into_iter().rev());
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::domain::runtime::ContainerId;

    #[test]
    fn test_teardown_order_reverses_start_order() {
        let plan = SwarmPlan::from_json(
            r#"{"bees": [
                {"role": "c", "image": "x", "work": {"in": "q2"}},
                {"role": "a", "image": "x", "work": {"out": "q1"}},
                {"role": "b", "image": "x", "work": {"in": "q1", "out": "q2"}}
            ]}"#,
        )
        .unwrap();
        let order = compute_start_order(&plan);
        assert_eq!(order.roles, vec!["a", "b", "c"]);
        let context = RuntimeContext::new(plan, order);

        let mut state = RuntimeState::new();
        state.record("c", ContainerId::new("3"), "i-3");
        state.record("a", ContainerId::new("1"), "i-1");
        state.record("b", ContainerId::new("2"), "i-2");
        state.record("orphan", ContainerId::new("4"), "i-4");

        assert_eq!(teardown_order(Some(&context), &state), vec!["c", "b", "a", "orphan"]);
        assert_eq!(teardown_order(None, &state), vec!["orphan", "b", "a", "c"]);
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = ControllerConfigManifest::default();
        config.spec.readiness.heartbeat_ttl = Duration::from_secs(20);
        config.spec.workers.stale_after = Duration::from_secs(45);
        config.spec.metrics.push_endpoint = Some("http://pushgateway:9091".to_string());

        let settings = LifecycleSettings::from(&config);
        assert_eq!(settings.readiness.heartbeat_ttl, Duration::from_secs(20));
        assert_eq!(settings.worker_stale_after, Duration::from_secs(45));
        assert_eq!(settings.fanout, FanoutSettings::default());
        assert_eq!(settings.suppression, SuppressionSettings::default());
        assert_eq!(
            settings.worker_env.metrics_push_url.as_deref(),
            Some("http://pushgateway:9091")
        );
    }
}
