//! # Node Agent
//!
//! ## Purpose
//!
//! Serves the per-node verb subjects for one worker, answers discovery for
//! its plan, announces itself on a fixed interval and reports its inventory
//! when the provisioner opens an orphan check.
//!
//! ## Architecture Role
//!
//! ```text
//! S.discover ─────────┐
//! S.check_orphan ─────┤
//! S.<verb>.<node_id> ─┼──► listener task ──► handler task ──► ResourceDriver
//!                     │                          │
//!                     │                          └──► reply / S.node_handles
//! announce timer ─────┴──► S.announce
//! ```
//!
//! Each inbound message runs on its own task, so a slow driver call never
//! blocks discovery. Capacity is only adjusted after the driver succeeds.

use crate::driver::{to_service_error, ResourceDriver};
use crate::error::{NodeError, Result};
use broker_config::{defaults, BrokerConfig};
use codec::{
    Announcement, BindRequest, BindResponse, Chunker, DiscoverRequest, MigrationAction,
    MigrationRequest, ProvisionRequest, ProvisionResponse, PurgeOrphanRequest, RestoreRequest,
    ServiceMessage, SimpleResponse, Subjects, UnbindRequest, UnprovisionRequest, UpdateInstanceResponse,
    UpdatedInstance,
};
use message_bus::{BusMessage, MessageBus, Subscription};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use types::credentials::NODE_ID;
use types::{codes, Credentials, ServiceError, ServiceResult};
use uuid::Uuid;

const MIN_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(1);

/// Identity and limits of one node
#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub service: String,
    pub node_id: String,
    pub plan: String,
    pub capacity: i64,
    pub supported_versions: Vec<String>,
    pub announce_interval: Duration,
    pub max_payload: usize,
}

impl NodeSettings {
    pub fn new(node_id: impl Into<String>, plan: impl Into<String>) -> Self {
        Self {
            service: defaults::service::NAME.to_string(),
            node_id: node_id.into(),
            plan: plan.into(),
            capacity: defaults::node::CAPACITY,
            supported_versions: Vec::new(),
            announce_interval: Duration::from_secs(defaults::node::ANNOUNCE_INTERVAL_SECS),
            max_payload: defaults::bus::MAX_PAYLOAD,
        }
    }

    pub fn with_capacity(mut self, capacity: i64) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// An empty `node.node_id` gets a random id
    pub fn from_config(config: &BrokerConfig) -> Self {
        let node_id = if config.node.node_id.is_empty() {
            format!("node-{}", &Uuid::new_v4().simple().to_string()[..8])
        } else {
            config.node.node_id.clone()
        };
        Self {
            service: config.service.name.clone(),
            node_id,
            plan: config.node.plan.clone(),
            capacity: config.node.capacity,
            supported_versions: config.node.supported_versions.clone(),
            announce_interval: config.node.announce_interval(),
            max_payload: config.bus.max_payload,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Verb {
    Provision,
    Unprovision,
    Bind,
    Unbind,
    Restore,
    PurgeOrphan,
    Migrate(MigrationAction),
    Discover,
    CheckOrphan,
}

struct NodeInner {
    bus: Arc<dyn MessageBus>,
    driver: Arc<dyn ResourceDriver>,
    subjects: Subjects,
    settings: NodeSettings,
    chunker: Chunker,
    capacity: Mutex<i64>,
}

/// Node agent bound to one resource driver
pub struct Node {
    inner: Arc<NodeInner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
    pub fn new(bus: Arc<dyn MessageBus>, driver: Arc<dyn ResourceDriver>, settings: NodeSettings) -> Self {
        let inner = NodeInner {
            bus,
            driver,
            subjects: Subjects::new(settings.service.clone()),
            chunker: Chunker::new(settings.max_payload),
            capacity: Mutex::new(settings.capacity),
            settings,
        };
        Self {
            inner: Arc::new(inner),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.settings.node_id
    }

    pub fn capacity(&self) -> i64 {
        *self.inner.capacity.lock()
    }

    /// Current announcement, as sent on `S.announce`
    pub fn announcement(&self) -> Announcement {
        self.inner.announcement()
    }

    pub async fn announce(&self) {
        self.inner.announce().await;
    }

    /// Subscribe every subject and start announcing
    pub async fn start(&self) -> Result<()> {
        if !self.tasks.lock().is_empty() {
            return Err(NodeError::startup(format!("node {} already started", self.id())));
        }

        let subjects = &self.inner.subjects;
        let node_id = self.id();
        let mut routes = vec![
            (subjects.provision(node_id), Verb::Provision),
            (subjects.unprovision(node_id), Verb::Unprovision),
            (subjects.bind(node_id), Verb::Bind),
            (subjects.unbind(node_id), Verb::Unbind),
            (subjects.restore(node_id), Verb::Restore),
            (subjects.purge_orphan(node_id), Verb::PurgeOrphan),
        ];
        routes.extend(
            MigrationAction::ALL
                .into_iter()
                .map(|action| (subjects.migration(action, node_id), Verb::Migrate(action))),
        );
        routes.push((subjects.discover(), Verb::Discover));
        routes.push((subjects.check_orphan(), Verb::CheckOrphan));

        let mut tasks = Vec::with_capacity(routes.len() + 1);
        for (subject, verb) in routes {
            match self.inner.bus.subscribe(&subject).await {
                Ok(subscription) => tasks.push(self.spawn_listener(verb, subscription)),
                Err(e) => {
                    for task in tasks {
                        task.abort();
                    }
                    return Err(e.into());
                }
            }
        }
        tasks.push(self.spawn_announcer());

        info!(
            node_id = %self.id(),
            plan = %self.inner.settings.plan,
            capacity = self.capacity(),
            "Node started"
        );
        self.tasks.lock().extend(tasks);
        Ok(())
    }

    /// Stop listening; in-flight handlers run to completion
    pub fn shutdown(&self) {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        if !tasks.is_empty() {
            info!(node_id = %self.id(), "Node shutting down");
        }
        for task in tasks {
            task.abort();
        }
    }

    fn spawn_listener(&self, verb: Verb, mut subscription: Subscription) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            while let Some(message) = subscription.next().await {
                let inner = inner.clone();
                tokio::spawn(async move { inner.handle(verb, message).await });
            }
            debug!(subject = %subscription.subject(), "Subscription closed");
        })
    }

    fn spawn_announcer(&self) -> JoinHandle<()> {
        let inner = self.inner.clone();
        let period = inner.settings.announce_interval.max(MIN_ANNOUNCE_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                inner.announce().await;
            }
        })
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

impl NodeInner {
    async fn handle(&self, verb: Verb, message: BusMessage) {
        let payload = message.payload.as_slice();
        match verb {
            Verb::Provision => {
                let result = self.provision(payload).await;
                self.reply(&message, ProvisionResponse::from(result)).await;
            }
            Verb::Unprovision => {
                let result = self.unprovision(payload).await;
                self.reply(&message, SimpleResponse::from(result)).await;
            }
            Verb::Bind => {
                let result = self.bind(payload).await;
                self.reply(&message, BindResponse::from(result)).await;
            }
            Verb::Unbind => {
                let result = self.unbind(payload).await;
                self.reply(&message, SimpleResponse::from(result)).await;
            }
            Verb::Restore => {
                let result = self.restore(payload).await;
                self.reply(&message, SimpleResponse::from(result)).await;
            }
            Verb::Migrate(MigrationAction::Update) => {
                let result = self.update_instance(payload).await;
                self.reply(&message, UpdateInstanceResponse::from(result)).await;
            }
            Verb::Migrate(action) => {
                let result = self.migrate(action, payload).await;
                self.reply(&message, SimpleResponse::from(result)).await;
            }
            Verb::PurgeOrphan => self.purge_orphan(payload).await,
            Verb::Discover => self.discover(&message).await,
            Verb::CheckOrphan => self.report_handles().await,
        }
    }

    fn announcement(&self) -> Announcement {
        Announcement::new(
            self.settings.node_id.clone(),
            self.settings.plan.clone(),
            *self.capacity.lock(),
        )
        .with_capacity_unit(self.driver.capacity_unit())
        .with_versions(self.settings.supported_versions.clone())
    }

    async fn announce(&self) {
        if !self.driver.is_ready().await {
            debug!(node_id = %self.settings.node_id, "Driver not ready, skipping announcement");
            return;
        }
        self.publish(&self.subjects.announce(), &self.announcement()).await;
    }

    async fn discover(&self, message: &BusMessage) {
        let Some(reply_to) = message.reply_to.as_deref() else {
            debug!("Discover without reply subject");
            return;
        };
        let request = match DiscoverRequest::decode(&message.payload) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "Ignoring malformed discover");
                return;
            }
        };

        let announcement = self.announcement();
        if request.plan != announcement.plan || !announcement.supports_version(request.version.as_deref()) {
            return;
        }
        if !self.driver.is_ready().await {
            debug!(node_id = %self.settings.node_id, "Driver not ready, ignoring discover");
            return;
        }
        self.publish(reply_to, &announcement).await;
    }

    async fn provision(&self, payload: &[u8]) -> ServiceResult<Credentials> {
        let request = ProvisionRequest::decode(payload)?;
        self.check_plan(&request.plan)?;

        let mut credentials = self
            .driver
            .provision(&request.plan, request.version.as_deref(), request.credentials.as_ref())
            .await
            .map_err(|e| self.driver_error("provision", e))?;
        self.stamp(&mut credentials);

        let remaining = self.adjust_capacity(-self.unit());
        info!(
            node_id = %self.settings.node_id,
            instance = credentials.name().unwrap_or_default(),
            remaining,
            "Provisioned instance"
        );
        Ok(credentials)
    }

    async fn unprovision(&self, payload: &[u8]) -> ServiceResult<()> {
        let request = UnprovisionRequest::decode(payload)?;
        self.driver
            .unprovision(&request.name, &request.bindings)
            .await
            .map_err(|e| self.driver_error("unprovision", e))?;

        let remaining = self.adjust_capacity(self.unit());
        info!(node_id = %self.settings.node_id, instance = %request.name, remaining, "Unprovisioned instance");
        Ok(())
    }

    async fn bind(&self, payload: &[u8]) -> ServiceResult<Credentials> {
        let request = BindRequest::decode(payload)?;
        let mut credentials = self
            .driver
            .bind(&request.name, &request.bind_opts, request.credentials.as_ref())
            .await
            .map_err(|e| self.driver_error("bind", e))?;
        self.stamp(&mut credentials);
        debug!(node_id = %self.settings.node_id, instance = %request.name, "Bound instance");
        Ok(credentials)
    }

    async fn unbind(&self, payload: &[u8]) -> ServiceResult<()> {
        let request = UnbindRequest::decode(payload)?;
        self.driver
            .unbind(&request.credentials)
            .await
            .map_err(|e| self.driver_error("unbind", e))
    }

    async fn restore(&self, payload: &[u8]) -> ServiceResult<()> {
        let request = RestoreRequest::decode(payload)?;
        self.driver
            .restore(&request.instance_id, &request.backup_path)
            .await
            .map_err(|e| self.driver_error("restore", e))?;
        info!(instance = %request.instance_id, backup = %request.backup_path, "Restored instance");
        Ok(())
    }

    async fn migrate(&self, action: MigrationAction, payload: &[u8]) -> ServiceResult<()> {
        let request = MigrationRequest::decode(payload)?;
        let id = request.instance_id.as_str();
        let bindings = request.bindings.as_slice();
        let result = match action {
            MigrationAction::Disable => self.driver.disable_instance(id, bindings).await,
            MigrationAction::Enable => self.driver.enable_instance(id, bindings).await,
            MigrationAction::CleanupNfs => self.driver.cleanup_nfs_instance(id, bindings).await,
            MigrationAction::Update => self.driver.update_instance(id, bindings).await.map(drop),
            MigrationAction::Import => {
                if let Some(plan) = request.plan.as_deref() {
                    self.check_plan(plan)?;
                }
                self.driver.import_instance(id, request.plan.as_deref(), bindings).await
            }
        };
        result.map_err(|e| self.driver_error(action.verb(), e))?;

        if action == MigrationAction::Import {
            self.adjust_capacity(-self.unit());
        }
        info!(node_id = %self.settings.node_id, instance = id, action = %action, "Migration step complete");
        Ok(())
    }

    async fn update_instance(&self, payload: &[u8]) -> ServiceResult<UpdatedInstance> {
        let request = MigrationRequest::decode(payload)?;
        self.driver
            .update_instance(&request.instance_id, &request.bindings)
            .await
            .map_err(|e| self.driver_error("update_instance", e))
    }

    async fn report_handles(&self) {
        let instances = match self.driver.all_instances_list().await {
            Ok(instances) => instances,
            Err(e) => {
                warn!(node_id = %self.settings.node_id, error = %e, "Failed to list instances");
                return;
            }
        };
        let bindings = match self.driver.all_bindings_list().await {
            Ok(bindings) => bindings,
            Err(e) => {
                warn!(node_id = %self.settings.node_id, error = %e, "Failed to list bindings");
                return;
            }
        };

        let reports = self.chunker.reports(&self.settings.node_id, &instances, &bindings);
        debug!(
            node_id = %self.settings.node_id,
            instances = instances.len(),
            bindings = bindings.len(),
            chunks = reports.len(),
            "Reporting handles"
        );
        let subject = self.subjects.node_handles();
        for report in &reports {
            self.publish(&subject, report).await;
        }
    }

    async fn purge_orphan(&self, payload: &[u8]) {
        let request = match PurgeOrphanRequest::decode(payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed purge request");
                return;
            }
        };

        for instance in &request.instances {
            match self.driver.unprovision(instance, &[]).await {
                Ok(()) => {
                    self.adjust_capacity(self.unit());
                    info!(node_id = %self.settings.node_id, instance = %instance, "Purged orphan instance");
                }
                Err(e) => warn!(instance = %instance, error = %e, "Failed to purge orphan instance"),
            }
        }
        for binding in &request.bindings {
            match self.driver.unbind(binding).await {
                Ok(()) => info!(
                    node_id = %self.settings.node_id,
                    instance = binding.name().unwrap_or_default(),
                    "Purged orphan binding"
                ),
                Err(e) => warn!(error = %e, "Failed to purge orphan binding"),
            }
        }
    }

    fn check_plan(&self, plan: &str) -> ServiceResult<()> {
        if plan == self.settings.plan {
            Ok(())
        } else {
            Err(ServiceError::with_arg(codes::UNKNOWN_PLAN, plan))
        }
    }

    /// The hosting node always owns the credentials it hands out
    fn stamp(&self, credentials: &mut Credentials) {
        credentials.insert(NODE_ID, self.settings.node_id.as_str());
    }

    fn unit(&self) -> i64 {
        i64::try_from(self.driver.capacity_unit()).unwrap_or(i64::MAX)
    }

    fn adjust_capacity(&self, delta: i64) -> i64 {
        let mut capacity = self.capacity.lock();
        *capacity = capacity.saturating_add(delta);
        *capacity
    }

    fn driver_error(&self, operation: &str, err: anyhow::Error) -> ServiceError {
        let mapped = to_service_error(&err);
        if mapped.is(codes::INTERNAL_ERROR) {
            warn!(node_id = %self.settings.node_id, operation, error = %err, "Driver failed");
        } else {
            debug!(node_id = %self.settings.node_id, operation, error = %mapped, "Driver rejected request");
        }
        mapped
    }

    async fn reply<M: ServiceMessage>(&self, request: &BusMessage, reply: M) {
        match request.reply_to.as_deref() {
            Some(reply_to) => self.publish(reply_to, &reply).await,
            None => debug!(subject = %request.subject, "No reply subject, dropping reply"),
        }
    }

    async fn publish<M: ServiceMessage>(&self, subject: &str, message: &M) {
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(subject, error = %e, "Failed to encode message");
                return;
            }
        };
        if let Err(e) = self.bus.publish(subject, payload).await {
            warn!(subject, error = %e, "Failed to publish");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDriver;
    use message_bus::LocalBus;
    use serde_json::json;
    use types::credentials::NAME;

    const TIMEOUT: Duration = Duration::from_secs(2);

    async fn start_node(driver: Arc<MemoryDriver>, max_payload: usize) -> (LocalBus, Node) {
        let bus = LocalBus::new(max_payload);
        let settings = NodeSettings::new("n1", "free")
            .with_capacity(10)
            .with_max_payload(max_payload);
        let node = Node::new(Arc::new(bus.clone()), driver, settings);
        node.start().await.unwrap();
        (bus, node)
    }

    async fn provision(bus: &LocalBus, plan: &str) -> ServiceResult<Credentials> {
        let request = ProvisionRequest {
            plan: plan.to_string(),
            version: None,
            credentials: None,
        };
        let reply = bus
            .request_timeout("kv.provision.n1", request.encode().unwrap(), TIMEOUT)
            .await
            .unwrap();
        ProvisionResponse::decode(&reply.payload).unwrap().into_result()
    }

    #[tokio::test(start_paused = true)]
    async fn test_provision_consumes_capacity() {
        let driver = Arc::new(MemoryDriver::new("n1"));
        let (bus, node) = start_node(driver.clone(), 1 << 20).await;

        let credentials = provision(&bus, "free").await.unwrap();
        assert_eq!(credentials.node_id(), Some("n1"));
        assert_eq!(node.capacity(), 9);
        assert_eq!(node.announcement().available_capacity, 9);
        assert!(driver.has_instance(credentials.name().unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_provision_keeps_capacity() {
        let driver = Arc::new(MemoryDriver::new("n1").with_instance_limit(0));
        let (bus, node) = start_node(driver, 1 << 20).await;

        let err = provision(&bus, "free").await.unwrap_err();
        assert!(err.is(codes::INTERNAL_ERROR));
        assert_eq!(node.capacity(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_plan_mismatch_rejected() {
        let driver = Arc::new(MemoryDriver::new("n1"));
        let (bus, node) = start_node(driver.clone(), 1 << 20).await;

        let err = provision(&bus, "gold").await.unwrap_err();
        assert!(err.is(codes::UNKNOWN_PLAN));
        assert_eq!(node.capacity(), 10);
        assert_eq!(driver.instance_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_request_gets_error_reply() {
        let driver = Arc::new(MemoryDriver::new("n1"));
        let (bus, _node) = start_node(driver, 1 << 20).await;

        let reply = bus
            .request_timeout("kv.bind.n1", b"{not json".to_vec(), TIMEOUT)
            .await
            .unwrap();
        let err = BindResponse::decode(&reply.payload).unwrap().into_result().unwrap_err();
        assert!(err.is(codes::MALFORMATTED_REQ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bind_then_unprovision_releases_capacity() {
        let driver = Arc::new(MemoryDriver::new("n1"));
        let (bus, node) = start_node(driver.clone(), 1 << 20).await;
        let credentials = provision(&bus, "free").await.unwrap();
        let name = credentials.name().unwrap().to_string();

        let bind = BindRequest {
            name: name.clone(),
            bind_opts: json!({"role": "rw"}),
            credentials: None,
        };
        let reply = bus
            .request_timeout("kv.bind.n1", bind.encode().unwrap(), TIMEOUT)
            .await
            .unwrap();
        let binding = BindResponse::decode(&reply.payload).unwrap().into_result().unwrap();
        assert_eq!(binding.name(), Some(name.as_str()));

        let unprovision = UnprovisionRequest {
            name: name.clone(),
            bindings: vec![binding],
        };
        let reply = bus
            .request_timeout("kv.unprovision.n1", unprovision.encode().unwrap(), TIMEOUT)
            .await
            .unwrap();
        SimpleResponse::decode(&reply.payload).unwrap().into_result().unwrap();
        assert_eq!(node.capacity(), 10);
        assert!(!driver.has_instance(&name));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_instance_unbind_is_not_found() {
        let driver = Arc::new(MemoryDriver::new("n1"));
        let (bus, _node) = start_node(driver, 1 << 20).await;

        let unbind = UnbindRequest {
            credentials: Credentials::new().with(NAME, "ghost"),
        };
        let reply = bus
            .request_timeout("kv.unbind.n1", unbind.encode().unwrap(), TIMEOUT)
            .await
            .unwrap();
        let err = SimpleResponse::decode(&reply.payload).unwrap().into_result().unwrap_err();
        assert!(err.is(codes::NOT_FOUND));
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_answers_matching_plan_only() {
        let driver = Arc::new(MemoryDriver::new("n1"));
        let (bus, _node) = start_node(driver, 1 << 20).await;

        let gold = DiscoverRequest {
            plan: "gold".to_string(),
            version: None,
        };
        let result = bus
            .request_timeout("kv.discover", gold.encode().unwrap(), Duration::from_millis(200))
            .await;
        assert!(result.unwrap_err().is_timeout());

        let free = DiscoverRequest {
            plan: "free".to_string(),
            version: None,
        };
        let reply = bus
            .request_timeout("kv.discover", free.encode().unwrap(), TIMEOUT)
            .await
            .unwrap();
        let announcement = Announcement::decode(&reply.payload).unwrap();
        assert_eq!(announcement.id, "n1");
        assert_eq!(announcement.available_capacity, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unready_node_stays_silent() {
        let driver = Arc::new(MemoryDriver::new("n1"));
        driver.set_ready(false);
        let (bus, _node) = start_node(driver, 1 << 20).await;

        let free = DiscoverRequest {
            plan: "free".to_string(),
            version: None,
        };
        let result = bus
            .request_timeout("kv.discover", free.encode().unwrap(), Duration::from_millis(200))
            .await;
        assert!(result.unwrap_err().is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_announces_on_start() {
        let bus = LocalBus::new(1 << 20);
        let mut announcements = bus.subscribe("kv.announce").await.unwrap();
        let node = Node::new(
            Arc::new(bus.clone()),
            Arc::new(MemoryDriver::new("n1")),
            NodeSettings::new("n1", "free").with_capacity(3),
        );
        node.start().await.unwrap();

        let message = announcements.next().await.unwrap();
        let announcement = Announcement::decode(&message.payload).unwrap();
        assert_eq!(announcement.available_capacity, 3);
        assert!(node.start().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_orphan_reports_in_chunks() {
        let driver = Arc::new(MemoryDriver::new("n1"));
        for id in ["a", "b", "c"] {
            driver.adopt_instance(id);
        }
        let (bus, _node) = start_node(driver, codec::MIN_MAX_PAYLOAD).await;
        let mut reports = bus.subscribe("kv.node_handles").await.unwrap();

        bus.publish("kv.check_orphan", b"{}".to_vec()).await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            let message = reports.next().await.unwrap();
            let report = codec::NodeHandlesReport::decode(&message.payload).unwrap();
            assert_eq!(report.node_id, "n1");
            assert_eq!(report.instances.len(), 1);
            seen.extend(report.instances);
        }
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_orphan_deletes_and_releases() {
        let driver = Arc::new(MemoryDriver::new("n1"));
        driver.adopt_instance("stray");
        let (bus, node) = start_node(driver.clone(), 1 << 20).await;

        let purge = PurgeOrphanRequest {
            instances: vec!["stray".to_string()],
            bindings: Vec::new(),
        };
        bus.publish("kv.purge_orphan.n1", purge.encode().unwrap()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!driver.has_instance("stray"));
        assert_eq!(node.capacity(), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_migration_disable_and_update() {
        let driver = Arc::new(MemoryDriver::new("n1"));
        driver.adopt_instance("db-1");
        let (bus, _node) = start_node(driver.clone(), 1 << 20).await;

        let request = MigrationRequest {
            instance_id: "db-1".to_string(),
            plan: None,
            bindings: Vec::new(),
        };
        let reply = bus
            .request_timeout("kv.disable_instance.n1", request.encode().unwrap(), TIMEOUT)
            .await
            .unwrap();
        SimpleResponse::decode(&reply.payload).unwrap().into_result().unwrap();
        assert_eq!(driver.is_enabled("db-1"), Some(false));

        let reply = bus
            .request_timeout("kv.update_instance.n1", request.encode().unwrap(), TIMEOUT)
            .await
            .unwrap();
        let updated = UpdateInstanceResponse::decode(&reply.payload)
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(updated.instance.node_id(), Some("n1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_serving() {
        let driver = Arc::new(MemoryDriver::new("n1"));
        let (bus, node) = start_node(driver, 1 << 20).await;
        node.shutdown();
        tokio::task::yield_now().await;

        let request = ProvisionRequest {
            plan: "free".to_string(),
            version: None,
            credentials: None,
        };
        let result = bus
            .request_timeout("kv.provision.n1", request.encode().unwrap(), Duration::from_millis(200))
            .await;
        assert!(result.unwrap_err().is_timeout());
    }
}
