// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

#![allow(dead_code)]

use aegis_core::domain::control_plane::{ControlEvent, ControlPlaneNaming, ControlSignal, ControllerIdentity};
use aegis_core::domain::runtime::{ContainerId, RuntimeError, WorkerSpec, WorkloadRuntime};
use aegis_core::domain::topology::{QueueStats, QueueStatsProvider, QueueTopology, TopologyError};
use aegis_core::infrastructure::event_bus::{ControlMessage, ControlPlaneBus, ControlReceiver};
use aegis_core::infrastructure::journal::InMemoryJournal;
use aegis_swarm::{LifecyclePorts, LifecycleSettings, SwarmLifecycleManager};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub const SWARM_ID: &str = "sw1";
pub const CONTROLLER_INSTANCE: &str = "ctrl-1";

/// Three runnable roles listed out of dependency order plus one bee without
/// an image. Start order is a, b, c.
pub const CHAIN_PLAN: &str = r#"{
    "id": "plan-chain",
    "bees": [
        {"role": "c", "image": "aegis/sink:1", "work": {"in": "q2"}, "config": {"flushEvery": 5}},
        {"role": "a", "image": "aegis/gen:1", "work": {"out": "q1"}, "config": {"ratePerSec": 10}},
        {"role": "b", "image": "aegis/proc:1", "work": {"in": "q1", "out": "q2"}},
        {"role": "observer", "work": {"in": "q2"}}
    ]
}"#;

/// Generator feeding a processor.
pub const GEN_PROC_PLAN: &str = r#"{
    "bees": [
        {"role": "gen", "image": "aegis/gen:1", "work": {"out": "gen"}, "config": {"ratePerSec": 50}},
        {"role": "proc", "image": "aegis/proc:1", "work": {"in": "gen", "out": "final"}, "env": {"LOG_LEVEL": "debug"}}
    ]
}"#;

#[derive(Default)]
pub struct RecordingRuntime {
    pub started: Mutex<Vec<WorkerSpec>>,
    pub stopped: Mutex<Vec<ContainerId>>,
    pub fail_image: Mutex<Option<String>>,
    pub gate: Option<Arc<Semaphore>>,
    next_id: AtomicUsize,
}

impl RecordingRuntime {
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn fail_on(&self, image: &str) {
        *self.fail_image.lock() = Some(image.to_string());
    }

    pub fn started_names(&self) -> Vec<String> {
        self.started.lock().iter().map(|s| s.name.clone()).collect()
    }

    /// Role of every stopped container, in stop order.
    pub fn stopped_roles(&self) -> Vec<String> {
        let started = self.started.lock();
        self.stopped
            .lock()
            .iter()
            .filter_map(|id| {
                let index: usize = id.as_str().trim_start_matches("container-").parse().ok()?;
                started
                    .get(index)
                    .and_then(|spec| spec.env.get("AEGIS_BEE_ROLE").cloned())
            })
            .collect()
    }
}

#[async_trait]
impl WorkloadRuntime for RecordingRuntime {
    async fn start_worker(&self, spec: WorkerSpec) -> Result<ContainerId, RuntimeError> {
        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        }
        if self.fail_image.lock().as_deref() == Some(spec.image.as_str()) {
            return Err(RuntimeError::StartFailed(format!("image {} not found", spec.image)));
        }
        let id = ContainerId::new(format!("container-{}", self.next_id.fetch_add(1, Ordering::SeqCst)));
        self.started.lock().push(spec);
        Ok(id)
    }

    async fn stop_worker(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        self.stopped.lock().push(id.clone());
        Ok(())
    }
}

pub struct RecordingTopology {
    naming: ControlPlaneNaming,
    pub declared: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
}

impl RecordingTopology {
    pub fn new() -> Self {
        Self {
            naming: ControlPlaneNaming::default(),
            declared: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }
}

#[async_trait]
impl QueueTopology for RecordingTopology {
    async fn declare_work_exchange(&self) -> Result<String, TopologyError> {
        let exchange = self.naming.work_exchange(SWARM_ID);
        self.declared.lock().push(exchange.clone());
        Ok(exchange)
    }

    async fn declare_work_queues(
        &self,
        _exchange: &str,
        suffixes: &BTreeSet<String>,
        declared: &mut BTreeSet<String>,
    ) -> Result<(), TopologyError> {
        for suffix in suffixes {
            let queue = self.naming.work_queue(SWARM_ID, suffix);
            self.declared.lock().push(queue.clone());
            declared.insert(queue);
        }
        Ok(())
    }

    async fn delete_work_queues(&self, suffixes: &BTreeSet<String>) -> Result<(), TopologyError> {
        let mut deleted = self.deleted.lock();
        deleted.extend(suffixes.iter().map(|s| self.naming.work_queue(SWARM_ID, s)));
        Ok(())
    }

    async fn delete_work_exchange(&self) -> Result<(), TopologyError> {
        self.deleted.lock().push(self.naming.work_exchange(SWARM_ID));
        Ok(())
    }

    async fn delete_control_queue(&self, queue: &str) -> Result<(), TopologyError> {
        self.deleted.lock().push(queue.to_string());
        Ok(())
    }
}

pub struct FixedQueueStats;

#[async_trait]
impl QueueStatsProvider for FixedQueueStats {
    async fn queue_stats(&self, _queue: &str) -> Result<QueueStats, TopologyError> {
        Ok(QueueStats {
            depth: 12,
            consumers: 1,
            oldest_age_seconds: Some(4),
        })
    }
}

pub struct Harness {
    pub manager: Arc<SwarmLifecycleManager>,
    pub runtime: Arc<RecordingRuntime>,
    pub topology: Arc<RecordingTopology>,
    pub bus: ControlPlaneBus,
    pub journal: Arc<InMemoryJournal>,
    pub receiver: ControlReceiver,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_runtime(RecordingRuntime::default(), LifecycleSettings::default())
    }

    pub fn with_runtime(runtime: RecordingRuntime, settings: LifecycleSettings) -> Self {
        let runtime = Arc::new(runtime);
        let topology = Arc::new(RecordingTopology::new());
        let bus = ControlPlaneBus::new(1024);
        let journal = Arc::new(InMemoryJournal::new());
        let receiver = bus.subscribe();

        let ports = LifecyclePorts {
            runtime: runtime.clone(),
            topology: topology.clone(),
            queue_stats: Arc::new(FixedQueueStats),
            publisher: Arc::new(bus.clone()),
        };
        let manager = Arc::new(SwarmLifecycleManager::new(
            ControllerIdentity::new(SWARM_ID, CONTROLLER_INSTANCE),
            ports,
            journal.clone(),
            settings,
        ));

        Self {
            manager,
            runtime,
            topology,
            bus,
            journal,
            receiver,
        }
    }

    /// Everything published since the last drain.
    pub fn drain(&mut self) -> Vec<ControlMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.receiver.try_recv() {
            messages.push(message);
        }
        messages
    }

    pub fn drain_signals(&mut self) -> Vec<ControlSignal> {
        self.drain()
            .into_iter()
            .filter_map(|m| match m {
                ControlMessage::Signal { signal, .. } => Some(signal),
                ControlMessage::Event { .. } => None,
            })
            .collect()
    }

    pub fn drain_events(&mut self) -> Vec<ControlEvent> {
        self.drain()
            .into_iter()
            .filter_map(|m| match m {
                ControlMessage::Event { event, .. } => Some(event),
                ControlMessage::Signal { .. } => None,
            })
            .collect()
    }

    /// Instance id the runtime was asked to launch for `role`.
    pub fn instance_of(&self, role: &str) -> String {
        self.runtime
            .started
            .lock()
            .iter()
            .find(|spec| spec.env.get("AEGIS_BEE_ROLE").map(String::as_str) == Some(role))
            .map(|spec| spec.name.clone())
            .unwrap_or_else(|| panic!("no worker launched for role {role}"))
    }
}
