use async_trait::async_trait;
use fleetflow_cloud::{ClusterStore, MemorySecretSelector, MemoryStore, Patch};
use fleetflow_cloud_azure::{
    AzureCloudSpec, AzureDatacenter, AzureError, AzureProvider, ClientFactory, Cluster,
    Credentials, Operation, PollKind, ResourceClient, ResourceId, ResourceKind,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub const SUBSCRIPTION: &str = "sub-1";
pub const CLUSTER: &str = "c1";
pub const DEFAULT_NAME: &str = "kubernetes-c1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Put,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub verb: Verb,
    pub kind: ResourceKind,
    pub path: String,
}

#[derive(Default)]
struct ArmState {
    resources: HashMap<String, Value>,
    calls: Vec<Call>,
    waits: Vec<String>,
    failures: HashMap<(Verb, ResourceKind), u16>,
    credentials: Vec<Credentials>,
}

/// In-memory Azure Resource Manager
///
/// Every mutating call returns a pending operation so tests can see which
/// calls were waited on. Deleting a resource group cascades to everything
/// inside it, as in Azure.
#[derive(Clone, Default)]
pub struct FakeArm {
    state: Arc<Mutex<ArmState>>,
}

#[allow(dead_code)]
impl FakeArm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: &ResourceId, value: Value) {
        self.state.lock().unwrap().resources.insert(id.path(), value);
    }

    pub fn resource(&self, id: &ResourceId) -> Option<Value> {
        self.state.lock().unwrap().resources.get(&id.path()).cloned()
    }

    pub fn resource_count(&self) -> usize {
        self.state.lock().unwrap().resources.len()
    }

    /// Make every `verb` call on `kind` fail with `status`
    pub fn fail(&self, verb: Verb, kind: ResourceKind, status: u16) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((verb, kind), status);
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_of(&self, verb: Verb) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.verb == verb).collect()
    }

    pub fn kinds_of(&self, verb: Verb) -> Vec<ResourceKind> {
        self.calls_of(verb).into_iter().map(|c| c.kind).collect()
    }

    pub fn clear_calls(&self) {
        let mut state = self.state.lock().unwrap();
        state.calls.clear();
        state.waits.clear();
    }

    /// Poll URLs of the operations that were waited on
    pub fn waits(&self) -> Vec<String> {
        self.state.lock().unwrap().waits.clone()
    }

    pub fn credentials(&self) -> Vec<Credentials> {
        self.state.lock().unwrap().credentials.clone()
    }

    fn record(&self, verb: Verb, id: &ResourceId) -> Result<(), AzureError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call {
            verb,
            kind: id.kind,
            path: id.path(),
        });
        match state.failures.get(&(verb, id.kind)) {
            Some(404) => Err(AzureError::NotFound(id.path())),
            Some(status) => Err(AzureError::Api {
                status: *status,
                code: "InjectedFailure".to_string(),
                message: format!("{:?} {} failed", verb, id.path()),
            }),
            None => Ok(()),
        }
    }

    fn pending(id: &ResourceId) -> Operation {
        Operation::Pending {
            poll_url: format!("fake://{}", id.path()),
            kind: PollKind::AsyncOperation,
        }
    }
}

#[async_trait]
impl ResourceClient for FakeArm {
    async fn get(&self, id: &ResourceId) -> Result<Value, AzureError> {
        self.record(Verb::Get, id)?;
        self.resource(id)
            .ok_or_else(|| AzureError::NotFound(id.path()))
    }

    async fn create_or_update(&self, id: &ResourceId, body: Value) -> Result<Operation, AzureError> {
        self.record(Verb::Put, id)?;
        self.insert(id, body);
        Ok(Self::pending(id))
    }

    async fn delete(&self, id: &ResourceId) -> Result<Operation, AzureError> {
        self.record(Verb::Delete, id)?;
        let path = id.path();
        let mut state = self.state.lock().unwrap();
        if state.resources.remove(&path).is_none() {
            return Err(AzureError::NotFound(path));
        }
        if id.kind == ResourceKind::ResourceGroup {
            let prefix = format!("{}/", path.to_lowercase());
            state
                .resources
                .retain(|p, _| !p.to_lowercase().starts_with(&prefix));
        }
        Ok(Self::pending(id))
    }

    async fn wait(&self, operation: Operation) -> Result<(), AzureError> {
        if let Operation::Pending { poll_url, .. } = operation {
            self.state.lock().unwrap().waits.push(poll_url);
        }
        Ok(())
    }
}

impl ClientFactory for FakeArm {
    fn client(&self, credentials: &Credentials) -> Result<Arc<dyn ResourceClient>, AzureError> {
        self.state
            .lock()
            .unwrap()
            .credentials
            .push(credentials.clone());
        Ok(Arc::new(self.clone()))
    }
}

/// Memory store that keeps every snapshot it hands out
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore<Cluster>,
    history: Mutex<Vec<Cluster>>,
}

#[allow(dead_code)]
impl RecordingStore {
    pub fn with_cluster(cluster: Cluster) -> Self {
        Self {
            inner: MemoryStore::with_records([cluster]),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn history(&self) -> Vec<Cluster> {
        self.history.lock().unwrap().clone()
    }

    /// Kinds added by each update, in update order
    pub fn added_kinds(&self) -> Vec<ResourceKind> {
        self.diff_kinds(|before, after| after.difference(before).copied().collect())
    }

    /// Kinds removed by each update, in update order
    pub fn removed_kinds(&self) -> Vec<ResourceKind> {
        self.diff_kinds(|before, after| before.difference(after).copied().collect())
    }

    fn diff_kinds(
        &self,
        diff: impl Fn(&HashSet<ResourceKind>, &HashSet<ResourceKind>) -> Vec<ResourceKind>,
    ) -> Vec<ResourceKind> {
        let history = self.history();
        let mut previous: Option<HashSet<ResourceKind>> = None;
        let mut changes = Vec::new();
        for snapshot in history {
            let kinds: HashSet<ResourceKind> = snapshot.finalizers.kinds().into_iter().collect();
            if let Some(before) = &previous {
                let changed = diff(before, &kinds);
                assert!(changed.len() <= 1, "one finalizer per update, got {:?}", changed);
                changes.extend(changed);
            }
            previous = Some(kinds);
        }
        changes
    }
}

#[async_trait]
impl ClusterStore<Cluster> for RecordingStore {
    async fn get(&self, name: &str) -> fleetflow_cloud::Result<Cluster> {
        self.inner.get(name).await
    }

    async fn create(&self, record: Cluster) -> fleetflow_cloud::Result<Cluster> {
        let created = self.inner.create(record).await?;
        self.history.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update(&self, name: &str, patch: Patch<Cluster>) -> fleetflow_cloud::Result<Cluster> {
        let first_update = self.history.lock().unwrap().is_empty();
        if first_update {
            let current = self.inner.get(name).await?;
            self.history.lock().unwrap().push(current);
        }
        let updated = self.inner.update(name, patch).await?;
        self.history.lock().unwrap().push(updated.clone());
        Ok(updated)
    }

    async fn replace(&self, record: Cluster) -> fleetflow_cloud::Result<Cluster> {
        self.inner.replace(record).await
    }

    async fn delete(&self, name: &str) -> fleetflow_cloud::Result<()> {
        self.inner.delete(name).await
    }
}

/// Cloud spec with inline credentials and no resources
pub fn inline_spec() -> AzureCloudSpec {
    AzureCloudSpec {
        tenant_id: "tenant-1".to_string(),
        subscription_id: SUBSCRIPTION.to_string(),
        client_id: "client-1".to_string(),
        client_secret: "secret-1".to_string(),
        ..Default::default()
    }
}

pub fn new_cluster() -> Cluster {
    Cluster::new(CLUSTER, inline_spec())
}

pub fn provider(arm: &FakeArm, location: &str) -> AzureProvider {
    provider_with_secrets(arm, location, MemorySecretSelector::new())
}

pub fn provider_with_secrets(
    arm: &FakeArm,
    location: &str,
    secrets: MemorySecretSelector,
) -> AzureProvider {
    AzureProvider::new(
        AzureDatacenter::new(location),
        Arc::new(arm.clone()),
        Arc::new(secrets),
    )
}

/// Seed the store and provision every resource
#[allow(dead_code)]
pub async fn provisioned(arm: &FakeArm) -> (RecordingStore, Cluster) {
    let cluster = new_cluster();
    let store = RecordingStore::with_cluster(cluster.clone());
    let cluster = provider(arm, "westeurope")
        .initialize_cloud_provider(cluster, &store)
        .await
        .unwrap();
    (store, cluster)
}
