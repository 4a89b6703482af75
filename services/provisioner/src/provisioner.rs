//! # Provisioner
//!
//! ## Purpose
//!
//! The broker. Keeps the live node registry and the handle cache, schedules
//! provision requests onto the best node and runs every per-instance
//! workflow as an awaited sequence of timed node requests.
//!
//! ## Architecture Role
//!
//! ```text
//!                 ┌──────── S.announce ◄──────── nodes
//!                 ▼
//! gateway ──► Provisioner ── S.discover ──► Barrier(live nodes, T) ──► argmax score
//!                 │                                                        │
//!                 │◄──────── timed request S.provision.N ◄─────────────────┘
//!                 │
//!                 ├── handle cache (instances + bindings)
//!                 └── orphan tracker ◄── S.node_handles
//! ```
//!
//! Every single-reply node request goes through [`MessageBus::request_timeout`],
//! so a node that never answers yields `GATEWAY_TIMEOUT` and its reply
//! subscription is gone before the caller sees the error. The cache is only
//! written after a node confirms.

use crate::cache::HandleCache;
use crate::orphan::OrphanTracker;
use crate::registry::NodeRegistry;
use crate::scoring::{select_best, AvailableCapacity, NodeScorer};
use crate::updater::{HandleUpdater, LocalOnly};
use broker_config::{defaults, BrokerConfig, PlanConfig};
use codec::{
    Announcement, BindRequest, BindResponse, Chunker, DiscoverRequest, MigrationAction, MigrationRequest,
    NodeHandlesReport, OrphanReport, ProvisionRequest, ProvisionResponse, RestoreRequest, ServiceMessage,
    SimpleResponse, Subjects, UnbindRequest, UnprovisionRequest, UpdateInstanceResponse, UpdatedInstance,
};
use futures::future::join_all;
use message_bus::{Barrier, BarrierConfig, BusError, MessageBus, Subscription};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use types::credentials::NODE_ID;
use types::{codes, Credentials, NodeAnnouncement, OrphanSet, ProvisionedServiceHandle, ServiceError, ServiceResult};
use uuid::Uuid;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ProvisionerSettings {
    pub service: String,
    pub node_timeout: Duration,
    pub discover_timeout: Duration,
    pub node_ttl: Duration,
    pub sweep_interval: Duration,
    pub max_payload: usize,
    /// Known plans; an empty table accepts any plan
    pub plans: HashMap<String, PlanConfig>,
}

impl ProvisionerSettings {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            node_timeout: Duration::from_millis(defaults::provisioner::NODE_TIMEOUT_MS),
            discover_timeout: Duration::from_millis(defaults::provisioner::DISCOVER_TIMEOUT_MS),
            node_ttl: Duration::from_secs(defaults::provisioner::NODE_TTL_SECS),
            sweep_interval: Duration::from_secs(defaults::provisioner::SWEEP_INTERVAL_SECS),
            max_payload: defaults::bus::MAX_PAYLOAD,
            plans: HashMap::new(),
        }
    }

    pub fn with_plan(mut self, plan: impl Into<String>, allow_over_provisioning: bool) -> Self {
        self.plans.insert(
            plan.into(),
            PlanConfig {
                allow_over_provisioning,
                description: String::new(),
            },
        );
        self
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            service: config.service.name.clone(),
            node_timeout: config.provisioner.node_timeout(),
            discover_timeout: config.provisioner.discover_timeout(),
            node_ttl: config.provisioner.node_ttl(),
            sweep_interval: config.provisioner.sweep_interval(),
            max_payload: config.bus.max_payload,
            plans: config.service.plans.clone(),
        }
    }

    fn knows_plan(&self, plan: &str) -> bool {
        self.plans.is_empty() || self.plans.contains_key(plan)
    }

    fn allows_over_provisioning(&self, plan: &str) -> bool {
        self.plans
            .get(plan)
            .map(|p| p.allow_over_provisioning)
            .unwrap_or(false)
    }
}

pub struct Provisioner {
    bus: Arc<dyn MessageBus>,
    subjects: Subjects,
    settings: ProvisionerSettings,
    chunker: Chunker,
    scorer: Arc<dyn NodeScorer>,
    updater: Arc<dyn HandleUpdater>,
    nodes: Arc<RwLock<NodeRegistry>>,
    handles: RwLock<HandleCache>,
    orphans: Arc<Mutex<OrphanTracker>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Provisioner {
    pub fn new(bus: Arc<dyn MessageBus>, settings: ProvisionerSettings) -> Self {
        Self {
            bus,
            subjects: Subjects::new(settings.service.clone()),
            chunker: Chunker::new(settings.max_payload),
            settings,
            scorer: Arc::new(AvailableCapacity),
            updater: Arc::new(LocalOnly),
            nodes: Arc::new(RwLock::new(NodeRegistry::new())),
            handles: RwLock::new(HandleCache::new()),
            orphans: Arc::new(Mutex::new(OrphanTracker::new())),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn NodeScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_handle_updater(mut self, updater: Arc<dyn HandleUpdater>) -> Self {
        self.updater = updater;
        self
    }

    pub fn settings(&self) -> &ProvisionerSettings {
        &self.settings
    }

    /// Listen for announcements and orphan reports; start the registry sweep
    pub async fn start(&self) -> message_bus::Result<()> {
        let announcements = self.bus.subscribe(&self.subjects.announce()).await?;
        let reports = self.bus.subscribe(&self.subjects.node_handles()).await?;

        let tasks = vec![
            self.spawn_announcement_listener(announcements),
            self.spawn_report_listener(reports),
            self.spawn_sweeper(),
        ];
        self.tasks.lock().extend(tasks);

        info!(
            service = %self.settings.service,
            node_timeout_ms = self.settings.node_timeout.as_millis() as u64,
            "Provisioner started"
        );
        Ok(())
    }

    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    fn spawn_announcement_listener(&self, mut subscription: Subscription) -> JoinHandle<()> {
        let nodes = self.nodes.clone();
        tokio::spawn(async move {
            while let Some(message) = subscription.next().await {
                match Announcement::decode(&message.payload) {
                    Ok(announcement) => record_node(&nodes, announcement),
                    Err(e) => debug!(error = %e, "Ignoring malformed announcement"),
                }
            }
        })
    }

    fn spawn_report_listener(&self, mut subscription: Subscription) -> JoinHandle<()> {
        let orphans = self.orphans.clone();
        tokio::spawn(async move {
            while let Some(message) = subscription.next().await {
                let report = match NodeHandlesReport::decode(&message.payload) {
                    Ok(report) => report,
                    Err(e) => {
                        debug!(error = %e, "Ignoring malformed handles report");
                        continue;
                    }
                };
                if orphans.lock().stage(&report) {
                    debug!(
                        node_id = %report.node_id,
                        instances = report.instances.len(),
                        bindings = report.bindings.len(),
                        "Staged handles report"
                    );
                } else {
                    debug!(node_id = %report.node_id, "No orphan check open, report ignored");
                }
            }
        })
    }

    fn spawn_sweeper(&self) -> JoinHandle<()> {
        let nodes = self.nodes.clone();
        let ttl = self.settings.node_ttl;
        let period = self.settings.sweep_interval.max(MIN_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = nodes.write().sweep(ttl, Instant::now());
                for node_id in evicted {
                    info!(node_id = %node_id, "Evicted stale node");
                }
            }
        })
    }

    /// Nodes currently in the registry
    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn node(&self, node_id: &str) -> Option<NodeAnnouncement> {
        self.nodes.read().get(node_id).cloned()
    }

    pub fn handle(&self, service_id: &str) -> Option<ProvisionedServiceHandle> {
        self.handles.read().get(service_id).cloned()
    }

    pub fn handles_snapshot(&self) -> Vec<ProvisionedServiceHandle> {
        self.handles.read().snapshot()
    }

    /// Rebuild the cache from an authoritative handle list
    pub fn update_handles(&self, handles: Vec<ProvisionedServiceHandle>) {
        let count = handles.len();
        self.handles.write().replace_all(handles);
        debug!(handles = count, "Handle cache rebuilt");
    }

    /// Cached instance ids owned by `node_id`
    pub fn get_instance_id_list(&self, node_id: &str) -> Vec<String> {
        self.handles.read().instance_ids_on(node_id)
    }

    /// Discover, score and provision on the best node
    pub async fn provision_service(&self, plan: &str, version: Option<&str>) -> ServiceResult<ProvisionedServiceHandle> {
        self.provision_with(plan, version, None).await
    }

    async fn provision_with(
        &self,
        plan: &str,
        version: Option<&str>,
        prior: Option<Credentials>,
    ) -> ServiceResult<ProvisionedServiceHandle> {
        if !self.settings.knows_plan(plan) {
            return Err(ServiceError::with_arg(codes::UNKNOWN_PLAN, plan));
        }

        let candidates: Vec<NodeAnnouncement> = self
            .discover(plan, version)
            .await?
            .into_iter()
            .filter(|node| node.plan == plan && node.supports_version(version))
            .collect();

        let Some((best, score)) = select_best(&candidates, self.scorer.as_ref()) else {
            warn!(plan, "No node answered discovery");
            return Err(ServiceError::with_arg(codes::NO_NODE_AVAILABLE, plan));
        };
        if score <= 0 && !self.settings.allows_over_provisioning(plan) {
            warn!(plan, node_id = %best.id, score, "Best node has no capacity left");
            return Err(ServiceError::with_arg(codes::NO_NODE_AVAILABLE, plan));
        }
        let node_id = best.id.clone();
        debug!(plan, node_id = %node_id, score, respondents = candidates.len(), "Selected node");

        let request = ProvisionRequest {
            plan: plan.to_string(),
            version: version.map(str::to_string),
            credentials: prior,
        };
        let mut credentials = self
            .call_node::<_, ProvisionResponse>(&self.subjects.provision(&node_id), &request)
            .await?
            .into_result()?;
        credentials.insert(NODE_ID, node_id.as_str());
        let Some(service_id) = credentials.name().map(str::to_string) else {
            warn!(node_id = %node_id, "Node returned credentials without a name");
            return Err(ServiceError::internal());
        };

        let handle = ProvisionedServiceHandle::instance(service_id, plan, version, credentials);
        self.handles.write().insert(handle.clone());
        info!(service_id = %handle.service_id, node_id = %node_id, plan, "Provisioned service");
        Ok(handle)
    }

    /// Broadcast discover and collect announcements until every live node
    /// answered or the discover timeout elapsed
    async fn discover(&self, plan: &str, version: Option<&str>) -> ServiceResult<Vec<NodeAnnouncement>> {
        let expected = self
            .nodes
            .read()
            .live_count_for_plan(plan, self.settings.node_ttl, Instant::now());
        let config = BarrierConfig::timeout(self.settings.discover_timeout).with_callbacks(expected);
        let (barrier, responses) = Barrier::channel(config).map_err(bus_failure)?;

        let inbox = self.bus.new_inbox();
        let mut subscription = self.bus.subscribe(&inbox).await.map_err(bus_failure)?;
        let request = DiscoverRequest {
            plan: plan.to_string(),
            version: version.map(str::to_string),
        };
        self.bus
            .publish_request(&self.subjects.discover(), &inbox, request.encode()?)
            .await
            .map_err(bus_failure)?;

        let collector = {
            let barrier = barrier.clone();
            let nodes = self.nodes.clone();
            tokio::spawn(async move {
                while let Some(message) = subscription.next().await {
                    match Announcement::decode(&message.payload) {
                        Ok(announcement) => {
                            record_node(&nodes, announcement.clone());
                            barrier.call(announcement);
                        }
                        Err(e) => debug!(error = %e, "Ignoring malformed discover reply"),
                    }
                    if barrier.is_fired() {
                        break;
                    }
                }
            })
        };

        let responses = responses.await.unwrap_or_default();
        collector.abort();
        debug!(plan, expected, responded = responses.len(), "Discovery complete");
        Ok(responses)
    }

    pub async fn bind_instance(&self, instance_id: &str, binding_options: Value) -> ServiceResult<ProvisionedServiceHandle> {
        let instance = self.instance_handle(instance_id)?;
        let handle_id = Uuid::new_v4().to_string();
        self.bind_with(&instance, handle_id, binding_options, None).await
    }

    async fn bind_with(
        &self,
        instance: &ProvisionedServiceHandle,
        handle_id: String,
        binding_options: Value,
        prior: Option<Credentials>,
    ) -> ServiceResult<ProvisionedServiceHandle> {
        let node_id = owner(instance)?;
        let request = BindRequest {
            name: instance.service_id.clone(),
            bind_opts: binding_options.clone(),
            credentials: prior,
        };
        let credentials = self
            .call_node::<_, BindResponse>(&self.subjects.bind(&node_id), &request)
            .await?
            .into_result()?;

        let handle = ProvisionedServiceHandle::binding(handle_id, instance.plan(), binding_options, credentials);
        self.handles.write().insert(handle.clone());
        info!(service_id = %instance.service_id, handle_id = %handle.service_id, node_id = %node_id, "Bound service");
        Ok(handle)
    }

    pub async fn unbind_instance(&self, instance_id: &str, handle_id: &str) -> ServiceResult<()> {
        let binding = self
            .handle(handle_id)
            .filter(|handle| handle.is_binding_of(instance_id))
            .ok_or_else(|| ServiceError::not_found(handle_id))?;
        let node_id = owner(&binding)?;

        let request = UnbindRequest {
            credentials: binding.credentials.clone(),
        };
        self.call_node::<_, SimpleResponse>(&self.subjects.unbind(&node_id), &request)
            .await?
            .into_result()?;

        self.handles.write().remove(handle_id);
        info!(service_id = %instance_id, handle_id, node_id = %node_id, "Unbound service");
        Ok(())
    }

    /// Delete an instance; on success the instance handle and every binding
    /// handle of it leave the cache. Returns the evicted ids.
    pub async fn unprovision_service(&self, instance_id: &str) -> ServiceResult<Vec<String>> {
        let instance = self.instance_handle(instance_id)?;
        let node_id = owner(&instance)?;
        let bindings: Vec<Credentials> = self
            .handles
            .read()
            .bindings_of(instance_id)
            .into_iter()
            .map(|handle| handle.credentials)
            .collect();

        let request = UnprovisionRequest {
            name: instance_id.to_string(),
            bindings,
        };
        self.call_node::<_, SimpleResponse>(&self.subjects.unprovision(&node_id), &request)
            .await?
            .into_result()?;

        let evicted = self.handles.write().evict_instance(instance_id);
        info!(service_id = %instance_id, node_id = %node_id, evicted = evicted.len(), "Unprovisioned service");
        Ok(evicted)
    }

    pub async fn restore_instance(&self, instance_id: &str, backup_path: &str) -> ServiceResult<()> {
        let instance = self.instance_handle(instance_id)?;
        let node_id = owner(&instance)?;
        let request = RestoreRequest {
            instance_id: instance_id.to_string(),
            backup_path: backup_path.to_string(),
        };
        self.call_node::<_, SimpleResponse>(&self.subjects.restore(&node_id), &request)
            .await?
            .into_result()?;
        info!(service_id = %instance_id, node_id = %node_id, backup_path, "Restored service");
        Ok(())
    }

    /// Re-provision an instance under its previous identity, push the new
    /// handle upstream, restore its data and rebind every known binding.
    ///
    /// Fails unless every rebind succeeds.
    pub async fn recover_instance(
        &self,
        instance_id: &str,
        backup_path: &str,
        handles: &[ProvisionedServiceHandle],
    ) -> ServiceResult<Vec<ProvisionedServiceHandle>> {
        let instance = handles
            .iter()
            .find(|handle| handle.service_id == instance_id && !handle.is_binding())
            .cloned()
            .or_else(|| self.handle(instance_id))
            .ok_or_else(|| ServiceError::not_found(instance_id))?;
        let plan = instance
            .plan()
            .map(str::to_string)
            .ok_or_else(ServiceError::malformatted_request)?;
        let bindings: Vec<ProvisionedServiceHandle> = handles
            .iter()
            .filter(|handle| handle.is_binding_of(instance_id))
            .cloned()
            .collect();
        info!(service_id = %instance_id, plan = %plan, bindings = bindings.len(), "Recovering service");

        let recovered = self
            .provision_with(&plan, instance.version(), Some(instance.credentials.clone()))
            .await?;
        if recovered.service_id != instance_id {
            warn!(service_id = %instance_id, recovered = %recovered.service_id, "Node changed the instance name");
        }
        self.push_update(&recovered).await?;
        self.restore_instance(&recovered.service_id, backup_path).await?;

        let rebound = self.rebind_all(&recovered, &bindings).await?;
        for handle in &rebound {
            self.push_update(handle).await?;
        }

        info!(service_id = %recovered.service_id, node_id = recovered.node_id().unwrap_or_default(), "Recovered service");
        let mut result = Vec::with_capacity(rebound.len() + 1);
        result.push(recovered);
        result.extend(rebound);
        Ok(result)
    }

    async fn rebind_all(
        &self,
        instance: &ProvisionedServiceHandle,
        bindings: &[ProvisionedServiceHandle],
    ) -> ServiceResult<Vec<ProvisionedServiceHandle>> {
        if bindings.is_empty() {
            return Ok(Vec::new());
        }

        let config = BarrierConfig::callbacks(bindings.len()).with_timeout(self.settings.node_timeout);
        let (barrier, outcomes) = Barrier::channel(config).map_err(bus_failure)?;

        let rebinds = bindings.iter().map(|binding| {
            let barrier = barrier.clone();
            async move {
                let outcome = self
                    .bind_with(
                        instance,
                        binding.service_id.clone(),
                        binding_options(binding),
                        Some(binding.credentials.clone()),
                    )
                    .await;
                if let Err(e) = &outcome {
                    warn!(handle_id = %binding.service_id, error = %e, "Rebind failed");
                }
                barrier.call(outcome);
            }
        });
        let (_, outcomes) = tokio::join!(join_all(rebinds), outcomes);
        let outcomes = outcomes.unwrap_or_default();

        if outcomes.len() < bindings.len() {
            warn!(
                service_id = %instance.service_id,
                expected = bindings.len(),
                completed = outcomes.len(),
                "Rebinds did not finish in time"
            );
            return Err(ServiceError::gateway_timeout());
        }
        outcomes.into_iter().collect()
    }

    /// Run one migration verb on `node_id`. `update` rewrites the cached
    /// credentials and pushes every rewritten handle upstream.
    pub async fn migrate_instance(&self, node_id: &str, instance_id: &str, action: MigrationAction) -> ServiceResult<()> {
        let (plan, bindings) = {
            let cache = self.handles.read();
            let plan = cache.get(instance_id).and_then(|h| h.plan()).map(str::to_string);
            let bindings: Vec<Credentials> = cache
                .bindings_of(instance_id)
                .into_iter()
                .map(|handle| handle.credentials)
                .collect();
            (plan, bindings)
        };
        let request = MigrationRequest {
            instance_id: instance_id.to_string(),
            plan,
            bindings,
        };
        let subject = self.subjects.migration(action, node_id);

        if action == MigrationAction::Update {
            let updated = self
                .call_node::<_, UpdateInstanceResponse>(&subject, &request)
                .await?
                .into_result()?;
            self.apply_update(instance_id, updated).await?;
        } else {
            self.call_node::<_, SimpleResponse>(&subject, &request)
                .await?
                .into_result()?;
        }

        info!(node_id, service_id = %instance_id, action = %action, "Migration step complete");
        Ok(())
    }

    async fn apply_update(&self, instance_id: &str, updated: UpdatedInstance) -> ServiceResult<()> {
        let rewritten = {
            let mut cache = self.handles.write();
            let mut rewritten = Vec::new();
            if let Some(mut handle) = cache.get(instance_id).cloned() {
                handle.credentials = updated.instance.clone();
                cache.insert(handle.clone());
                rewritten.push(handle);
            }
            for mut binding in cache.bindings_of(instance_id) {
                if let Some(fresh) = updated.bindings.iter().find(|c| c.same_binding(&binding.credentials)) {
                    binding.credentials = fresh.clone();
                    cache.insert(binding.clone());
                    rewritten.push(binding);
                }
            }
            rewritten
        };

        for handle in &rewritten {
            self.push_update(handle).await?;
        }
        Ok(())
    }

    /// Open a reconciliation cycle against `known` and ask every node for its
    /// inventory
    pub async fn check_orphan(&self, known: &[ProvisionedServiceHandle]) -> ServiceResult<()> {
        self.orphans.lock().open_cycle(known);
        if let Err(e) = self.bus.publish(&self.subjects.check_orphan(), b"{}".to_vec()).await {
            warn!(error = %e, "Failed to broadcast orphan check");
            return Err(ServiceError::with_arg(codes::ORPHAN_CHECK_FAILED, e.to_string()));
        }
        info!(known = known.len(), "Orphan check started");
        Ok(())
    }

    /// Re-filter the staged orphans against a later handle list and close the
    /// cycle
    pub fn double_check_orphan(&self, known: &[ProvisionedServiceHandle]) -> ServiceResult<OrphanSet> {
        let mut tracker = self.orphans.lock();
        if !tracker.is_open() {
            return Err(ServiceError::with_arg(codes::ORPHAN_CHECK_FAILED, "no orphan check in progress"));
        }
        let final_set = tracker.finish(known);
        info!(
            instances = final_set.instance_count(),
            bindings = final_set.binding_count(),
            "Orphan double check complete"
        );
        Ok(final_set)
    }

    /// Ask each node to delete the listed names. Fire-and-forget; returns
    /// the number of purge requests published.
    pub async fn purge_orphan(
        &self,
        instances: &BTreeMap<String, Vec<String>>,
        bindings: &BTreeMap<String, Vec<Credentials>>,
    ) -> ServiceResult<usize> {
        let node_ids: BTreeSet<&String> = instances.keys().chain(bindings.keys()).collect();
        let mut published = 0;

        for node_id in node_ids {
            let node_instances = instances.get(node_id).map(Vec::as_slice).unwrap_or_default();
            let node_bindings = bindings.get(node_id).map(Vec::as_slice).unwrap_or_default();
            if node_instances.is_empty() && node_bindings.is_empty() {
                continue;
            }

            let subject = self.subjects.purge_orphan(node_id);
            for request in self.chunker.purge_requests(node_instances, node_bindings) {
                match self.bus.publish(&subject, request.encode()?).await {
                    Ok(()) => published += 1,
                    Err(e) => warn!(node_id = %node_id, error = %e, "Failed to publish purge request"),
                }
            }
            info!(
                node_id = %node_id,
                instances = node_instances.len(),
                bindings = node_bindings.len(),
                "Purge requested"
            );
        }
        Ok(published)
    }

    pub fn orphan_report(&self) -> OrphanReport {
        self.orphans.lock().report()
    }

    fn instance_handle(&self, instance_id: &str) -> ServiceResult<ProvisionedServiceHandle> {
        self.handle(instance_id)
            .filter(|handle| !handle.is_binding())
            .ok_or_else(|| ServiceError::not_found(instance_id))
    }

    async fn push_update(&self, handle: &ProvisionedServiceHandle) -> ServiceResult<()> {
        self.updater.update_handle(handle).await.map_err(|e| {
            warn!(service_id = %handle.service_id, error = %e, "Failed to update upstream handle");
            ServiceError::internal()
        })
    }

    async fn call_node<Req, Rep>(&self, subject: &str, request: &Req) -> ServiceResult<Rep>
    where
        Req: ServiceMessage + Sync,
        Rep: ServiceMessage,
    {
        let payload = request.encode()?;
        let reply = self
            .bus
            .request_timeout(subject, payload, self.settings.node_timeout)
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    warn!(subject, timeout_ms = self.settings.node_timeout.as_millis() as u64, "Node did not reply in time");
                    ServiceError::gateway_timeout()
                } else {
                    warn!(subject, error = %e, "Node request failed");
                    ServiceError::internal()
                }
            })?;
        Rep::decode(&reply.payload).map_err(|e| {
            warn!(subject, error = %e, "Malformed node reply");
            ServiceError::internal()
        })
    }
}

impl Drop for Provisioner {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

fn record_node(nodes: &RwLock<NodeRegistry>, announcement: NodeAnnouncement) {
    let node_id = announcement.id.clone();
    let capacity = announcement.available_capacity;
    if nodes.write().upsert(announcement, Instant::now()) {
        info!(node_id = %node_id, capacity, "Discovered node");
    }
}

fn owner(handle: &ProvisionedServiceHandle) -> ServiceResult<String> {
    handle.node_id().map(str::to_string).ok_or_else(|| {
        warn!(service_id = %handle.service_id, "Handle has no node_id");
        ServiceError::internal()
    })
}

fn binding_options(handle: &ProvisionedServiceHandle) -> Value {
    handle
        .configuration
        .pointer("/data/binding_options")
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()))
}

fn bus_failure(err: BusError) -> ServiceError {
    warn!(error = %err, "Bus failure");
    ServiceError::internal()
}
