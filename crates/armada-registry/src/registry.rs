//! Cluster registry service
//!
//! [`ClusterRegistry`] owns the cluster cache and the consumer task that keeps
//! it in sync with the backend. Reads are served from the cache; writes go
//! to the backend and then straight into the cache so callers read their own
//! writes without waiting for the watch event.

use std::sync::Arc;

use armada_common::settings::{ConfigMapSettings, SettingsSource};
use armada_common::{
    Error, ErrorKind, Result, CLUSTER_SECRET_SELECTOR, LAST_APPLIED_CONFIG_ANNOTATION,
    REFRESH_ANNOTATION_KEY, SECRET_TYPE_LABEL_KEY,
};
use k8s_openapi::api::core::v1::Secret;
use kube::{Client, ResourceExt};
use parking_lot::Mutex;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::cache::ClusterCache;
use crate::cluster::{is_local_server, Cluster, ClusterLookup};
use crate::codec::{cluster_to_secret, secret_to_cluster, validate_cluster};
use crate::config::RegistryConfig;
use crate::naming::uri_to_secret_name;
use crate::store::{KubeSecretStore, SecretStore};
use crate::watch::{consume_events, decode, Fanout, StreamState};

/// State shared between the registry handle and its consumer task
pub(crate) struct Shared {
    pub(crate) store: Arc<dyn SecretStore>,
    pub(crate) settings: Arc<dyn SettingsSource>,
    pub(crate) config: RegistryConfig,
    pub(crate) cache: ClusterCache,
    pub(crate) fanout: Mutex<Fanout>,
    pub(crate) stream_state: watch::Sender<StreamState>,
    /// Serializes the existence check and backend write of creates
    pub(crate) create_lock: AsyncMutex<()>,
}

/// Registry of target clusters backed by Secrets
///
/// Dropping the registry stops its consumer task and ends every
/// [`watch_clusters`](Self::watch_clusters) call.
pub struct ClusterRegistry {
    pub(crate) shared: Arc<Shared>,
    pub(crate) shutdown: CancellationToken,
}

impl ClusterRegistry {
    /// Seed the cache from the backend and start consuming its change stream
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn start(
        store: Arc<dyn SecretStore>,
        settings: Arc<dyn SettingsSource>,
        config: RegistryConfig,
    ) -> Result<Self> {
        // Subscribe before listing so nothing committed in between is missed;
        // replayed events converge in the cache.
        let events = store.watch(CLUSTER_SECRET_SELECTOR);
        let records = store.list(CLUSTER_SECRET_SELECTOR).await?;

        let (stream_state, _) = watch::channel(StreamState::Running);
        let shared = Arc::new(Shared {
            store,
            settings,
            config,
            cache: ClusterCache::new(),
            fanout: Mutex::new(Fanout::default()),
            stream_state,
            create_lock: AsyncMutex::new(()),
        });

        {
            let mut fanout = shared.fanout.lock();
            shared.cache.replace_all(records.iter().cloned());
            fanout.seed(&records);
        }

        info!(
            namespace = %shared.config.namespace,
            clusters = shared.cache.len(),
            "Cluster registry started"
        );

        let shutdown = CancellationToken::new();
        tokio::spawn(consume_events(shared.clone(), events, shutdown.clone()));

        Ok(Self { shared, shutdown })
    }

    /// Start a registry backed by the Kubernetes API
    ///
    /// Secrets and the settings ConfigMap are read from `config.namespace`.
    pub async fn start_with_client(client: Client, config: RegistryConfig) -> Result<Self> {
        let store = Arc::new(KubeSecretStore::new(client.clone(), &config.namespace));
        let settings = Arc::new(ConfigMapSettings::new(
            client,
            &config.namespace,
            config.settings_config_map.clone(),
        ));
        Self::start(store, settings, config).await
    }

    /// Stop the consumer task; pending watches return
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Register a new cluster
    ///
    /// Spellings of one server (case, default port, trailing slash) hash to
    /// different record names, so uniqueness is enforced on the normalized
    /// server: creates are serialized, and a record that lost a race with
    /// another writer is rolled back.
    #[instrument(skip(self, cluster), fields(server = %cluster.server))]
    pub async fn create_cluster(&self, cluster: &Cluster) -> Result<Cluster> {
        let mut secret = Secret::default();
        cluster_to_secret(cluster, &mut secret)?;

        let in_cluster_enabled = self.shared.settings.in_cluster_enabled().await?;
        if cluster.is_local() && !in_cluster_enabled {
            return Err(Error::precondition_failed(format!(
                "cannot register cluster {:?}: in-cluster deployment is disabled",
                cluster.server
            )));
        }

        let name = uri_to_secret_name(&self.shared.config.name_prefix, &cluster.server)?;
        secret.metadata.name = Some(name.clone());
        secret.metadata.namespace = Some(self.shared.config.namespace.clone());

        let _guard = self.shared.create_lock.lock().await;
        if self.shared.cache.contains(&cluster.server) {
            return Err(Error::cluster_already_exists(&cluster.server));
        }

        let created = self.shared.store.create(&secret).await.map_err(|e| {
            if e.kind() == ErrorKind::AlreadyExists {
                Error::cluster_already_exists(&cluster.server)
            } else {
                e
            }
        })?;

        if let Some(owner) = self.shared.cache.get(&cluster.server) {
            if owner.name_any() != name {
                warn!(
                    record = %name,
                    owner = %owner.name_any(),
                    "Server registered concurrently under another record, rolling back"
                );
                if let Err(e) = self.shared.store.delete(&name).await {
                    warn!(record = %name, error = %e, "Failed to roll back duplicate record");
                }
                return Err(Error::cluster_already_exists(&cluster.server));
            }
        }
        self.shared.cache.upsert(created.clone());

        info!(record = %created.name_any(), "Cluster created");
        secret_to_cluster(&created)
    }

    /// Fetch a cluster by server
    pub async fn get_cluster(&self, server: &str) -> Result<Cluster> {
        self.lookup_cluster(server).await.map(ClusterLookup::into_cluster)
    }

    /// Fetch a cluster by server, reporting whether it is stored or synthesized
    ///
    /// The local cluster is synthesized when no record exists for it,
    /// regardless of the in-cluster setting.
    pub async fn lookup_cluster(&self, server: &str) -> Result<ClusterLookup> {
        if let Some(secret) = self.shared.cache.get(server) {
            return secret_to_cluster(&secret).map(ClusterLookup::Stored);
        }
        if is_local_server(server) {
            return Ok(ClusterLookup::Synthesized(Cluster::local()));
        }
        Err(Error::cluster_not_found(server))
    }

    /// All clusters sorted by server
    ///
    /// Includes the synthesized local cluster when the in-cluster setting is
    /// enabled and no record exists for it. Malformed records are skipped.
    pub async fn list_clusters(&self) -> Result<Vec<Cluster>> {
        let in_cluster_enabled = self.shared.settings.in_cluster_enabled().await?;
        let mut clusters = self.stored_clusters();
        if in_cluster_enabled && !clusters.iter().any(Cluster::is_local) {
            clusters.push(Cluster::local());
            clusters.sort_by(|a, b| a.server.cmp(&b.server));
        }
        Ok(clusters)
    }

    /// Update a registered cluster
    ///
    /// Labels and annotations are merged into the stored record; supplied
    /// keys win. The write is rejected with `Conflict` if the record changed
    /// since it was cached.
    #[instrument(skip(self, cluster), fields(server = %cluster.server))]
    pub async fn update_cluster(&self, cluster: &Cluster) -> Result<Cluster> {
        validate_cluster(cluster)?;
        uri_to_secret_name(&self.shared.config.name_prefix, &cluster.server)?;
        let existing = self
            .shared
            .cache
            .get(&cluster.server)
            .ok_or_else(|| Error::cluster_not_found(&cluster.server))?;

        let mut merged = cluster.clone();
        merged.labels = existing.labels().clone();
        merged.labels.remove(SECRET_TYPE_LABEL_KEY);
        merged.labels.extend(cluster.labels.clone());
        merged.annotations = existing.annotations().clone();
        merged.annotations.remove(LAST_APPLIED_CONFIG_ANNOTATION);
        merged.annotations.remove(REFRESH_ANNOTATION_KEY);
        merged.annotations.extend(cluster.annotations.clone());

        let mut secret = existing;
        cluster_to_secret(&merged, &mut secret)?;

        let updated = self.shared.store.update(&secret).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::cluster_not_found(&cluster.server)
            } else {
                e
            }
        })?;
        self.shared.cache.upsert(updated.clone());

        info!(record = %updated.name_any(), "Cluster updated");
        secret_to_cluster(&updated)
    }

    /// Remove a registered cluster
    #[instrument(skip(self))]
    pub async fn delete_cluster(&self, server: &str) -> Result<()> {
        uri_to_secret_name(&self.shared.config.name_prefix, server)?;
        let existing = self
            .shared
            .cache
            .get(server)
            .ok_or_else(|| Error::cluster_not_found(server))?;
        let name = existing.name_any();

        self.shared.store.delete(&name).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::cluster_not_found(server)
            } else {
                e
            }
        })?;
        self.shared.cache.remove(&name);

        info!(record = %name, "Cluster deleted");
        Ok(())
    }

    /// Servers of every cluster with the given display name
    pub async fn get_cluster_servers_by_name(&self, name: &str) -> Result<Vec<String>> {
        Ok(self
            .list_clusters()
            .await?
            .into_iter()
            .filter(|c| c.name == name)
            .map(|c| c.server)
            .collect())
    }

    /// Stored clusters assigned to a project
    pub async fn get_project_clusters(&self, project: &str) -> Result<Vec<Cluster>> {
        Ok(self
            .stored_clusters()
            .into_iter()
            .filter(|c| c.project == project)
            .collect())
    }

    /// Decodable stored clusters sorted by server
    fn stored_clusters(&self) -> Vec<Cluster> {
        let mut clusters: Vec<Cluster> = self
            .shared
            .cache
            .records()
            .iter()
            .filter_map(decode)
            .collect();
        clusters.sort_by(|a, b| a.server.cmp(&b.server));
        clusters
    }
}

impl Drop for ClusterRegistry {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemorySecretStore, MockSecretStore, SecretEvent};
    use armada_common::settings::{MockSettingsSource, StaticSettings};
    use armada_common::LOCAL_CLUSTER_SERVER;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use futures::stream::{self, BoxStream};
    use futures::StreamExt;
    use std::time::Duration;

    /// Memory store whose creates take a while, optionally letting another
    /// writer register a record first
    struct SlowCreateStore {
        inner: MemorySecretStore,
        delay: Duration,
        competitor: Option<Secret>,
    }

    #[async_trait]
    impl SecretStore for SlowCreateStore {
        async fn get(&self, name: &str) -> Result<Option<Secret>> {
            self.inner.get(name).await
        }

        async fn create(&self, secret: &Secret) -> Result<Secret> {
            if let Some(competitor) = &self.competitor {
                self.inner.create(competitor).await?;
            }
            tokio::time::sleep(self.delay).await;
            self.inner.create(secret).await
        }

        async fn update(&self, secret: &Secret) -> Result<Secret> {
            self.inner.update(secret).await
        }

        async fn delete(&self, name: &str) -> Result<()> {
            self.inner.delete(name).await
        }

        async fn list(&self, selector: &str) -> Result<Vec<Secret>> {
            self.inner.list(selector).await
        }

        fn watch(&self, selector: &str) -> BoxStream<'static, Result<SecretEvent>> {
            self.inner.watch(selector)
        }
    }

    fn stored_secret(server: &str, name: &str) -> Secret {
        let mut secret = Secret::default();
        cluster_to_secret(&Cluster::new(server, name), &mut secret).unwrap();
        secret.metadata.name = Some(uri_to_secret_name("cluster", server).unwrap());
        secret
    }

    struct Harness {
        registry: ClusterRegistry,
        store: MemorySecretStore,
        settings: Arc<StaticSettings>,
    }

    async fn harness() -> Harness {
        let store = MemorySecretStore::new();
        let settings = Arc::new(StaticSettings::default());
        let registry = ClusterRegistry::start(
            Arc::new(store.clone()),
            settings.clone(),
            RegistryConfig::new("armada"),
        )
        .await
        .unwrap();
        Harness {
            registry,
            store,
            settings,
        }
    }

    fn cluster(server: &str, name: &str) -> Cluster {
        Cluster::new(server, name)
    }

    #[tokio::test]
    async fn create_then_get_reads_own_write() {
        let h = harness().await;
        let created = h
            .registry
            .create_cluster(&cluster("http://mycluster", "mycluster"))
            .await
            .unwrap();
        assert_eq!(created.name, "mycluster");

        let fetched = h.registry.get_cluster("http://mycluster").await.unwrap();
        assert_eq!(fetched, created);

        let stored = h
            .store
            .get(&uri_to_secret_name("cluster", "http://mycluster").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.namespace().as_deref(), Some("armada"));
        assert_eq!(
            stored.labels().get(SECRET_TYPE_LABEL_KEY).map(String::as_str),
            Some("cluster")
        );
    }

    #[tokio::test]
    async fn create_defaults_name_to_server() {
        let h = harness().await;
        let created = h
            .registry
            .create_cluster(&cluster("http://unnamed", ""))
            .await
            .unwrap();
        assert_eq!(created.name, "http://unnamed");
    }

    #[tokio::test]
    async fn duplicate_create_is_already_exists() {
        let h = harness().await;
        h.registry
            .create_cluster(&cluster("http://mycluster", "a"))
            .await
            .unwrap();

        let err = h
            .registry
            .create_cluster(&cluster("http://mycluster", "b"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        // Same normalized server under a different spelling
        let err = h
            .registry
            .create_cluster(&cluster("HTTP://MyCluster/", "c"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(h.store.len(), 1);
    }

    #[tokio::test]
    async fn create_rejects_reserved_annotation_before_backend() {
        let mut store = MockSecretStore::new();
        store
            .expect_watch()
            .returning(|_| stream::pending().boxed());
        store.expect_list().returning(|_| Ok(Vec::new()));
        store.expect_create().never();

        let registry = ClusterRegistry::start(
            Arc::new(store),
            Arc::new(StaticSettings::default()),
            RegistryConfig::new("armada"),
        )
        .await
        .unwrap();

        let mut c = cluster("http://mycluster", "mycluster");
        c.annotations
            .insert(LAST_APPLIED_CONFIG_ANNOTATION.to_string(), "{}".to_string());
        let err = registry.create_cluster(&c).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn create_rejects_unparseable_server() {
        let h = harness().await;
        let err = h
            .registry
            .create_cluster(&cluster("not a uri", "x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn local_cluster_create_respects_setting() {
        let h = harness().await;
        h.settings.set_in_cluster_enabled(false);

        let err = h
            .registry
            .create_cluster(&cluster(LOCAL_CLUSTER_SERVER, "in-cluster"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert!(h.store.is_empty());

        h.settings.set_in_cluster_enabled(true);
        h.registry
            .create_cluster(&cluster(LOCAL_CLUSTER_SERVER, "in-cluster"))
            .await
            .unwrap();
        assert!(h
            .registry
            .lookup_cluster(LOCAL_CLUSTER_SERVER)
            .await
            .unwrap()
            .is_stored());
    }

    #[tokio::test]
    async fn settings_errors_propagate() {
        let mut settings = MockSettingsSource::new();
        settings
            .expect_in_cluster_enabled()
            .returning(|| Err(Error::unavailable("configmap read failed")));

        let registry = ClusterRegistry::start(
            Arc::new(MemorySecretStore::new()),
            Arc::new(settings),
            RegistryConfig::new("armada"),
        )
        .await
        .unwrap();

        let err = registry.list_clusters().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);

        // Read on every create, not only for the local server
        let err = registry
            .create_cluster(&cluster("http://remote", "remote"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn get_unknown_server_is_not_found() {
        let h = harness().await;
        let err = h.registry.get_cluster("http://unknown").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), r#"cluster "http://unknown" not found"#);
    }

    #[tokio::test]
    async fn local_cluster_is_synthesized_on_get() {
        let h = harness().await;
        h.settings.set_in_cluster_enabled(false);

        let lookup = h.registry.lookup_cluster(LOCAL_CLUSTER_SERVER).await.unwrap();
        assert!(!lookup.is_stored());
        assert_eq!(lookup.into_cluster(), Cluster::local());
    }

    #[tokio::test]
    async fn list_includes_local_cluster_only_when_enabled() {
        let h = harness().await;
        h.registry
            .create_cluster(&cluster("http://b", "b"))
            .await
            .unwrap();
        h.registry
            .create_cluster(&cluster("http://a", "a"))
            .await
            .unwrap();

        let servers: Vec<_> = h
            .registry
            .list_clusters()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.server)
            .collect();
        assert_eq!(servers, vec!["http://a", "http://b", LOCAL_CLUSTER_SERVER]);

        h.settings.set_in_cluster_enabled(false);
        let servers: Vec<_> = h
            .registry
            .list_clusters()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.server)
            .collect();
        assert_eq!(servers, vec!["http://a", "http://b"]);
    }

    #[tokio::test]
    async fn explicit_local_record_replaces_synthesized_one() {
        let h = harness().await;
        let mut local = cluster(LOCAL_CLUSTER_SERVER, "prod-control-plane");
        local.project = "platform".to_string();
        h.registry.create_cluster(&local).await.unwrap();

        let clusters = h.registry.list_clusters().await.unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].name, "prod-control-plane");
    }

    #[tokio::test]
    async fn explicit_local_record_listed_when_setting_disabled() {
        let h = harness().await;
        h.registry
            .create_cluster(&cluster(LOCAL_CLUSTER_SERVER, "prod-control-plane"))
            .await
            .unwrap();
        h.settings.set_in_cluster_enabled(false);

        let clusters = h.registry.list_clusters().await.unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].server, LOCAL_CLUSTER_SERVER);
        assert_eq!(clusters[0].name, "prod-control-plane");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_spellings_of_one_server_register_once() {
        let store = MemorySecretStore::new();
        let registry = Arc::new(
            ClusterRegistry::start(
                Arc::new(SlowCreateStore {
                    inner: store.clone(),
                    delay: Duration::from_millis(5),
                    competitor: None,
                }),
                Arc::new(StaticSettings::new(false)),
                RegistryConfig::new("armada"),
            )
            .await
            .unwrap(),
        );

        let tasks: Vec<_> = ["https://api.example.com", "https://API.example.com:443/"]
            .into_iter()
            .map(|server| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.create_cluster(&cluster(server, "api")).await })
            })
            .collect();

        let mut created = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => assert_eq!(e.kind(), ErrorKind::AlreadyExists),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(registry.list_clusters().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_losing_to_another_writer_is_rolled_back() {
        let store = MemorySecretStore::new();
        let registry = ClusterRegistry::start(
            Arc::new(SlowCreateStore {
                inner: store.clone(),
                delay: Duration::from_millis(200),
                competitor: Some(stored_secret("https://API.example.com:443/", "other")),
            }),
            Arc::new(StaticSettings::new(false)),
            RegistryConfig::new("armada"),
        )
        .await
        .unwrap();

        let err = registry
            .create_cluster(&cluster("https://api.example.com", "mine"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(store.len(), 1);

        let listed = registry.list_clusters().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "other");
    }

    #[tokio::test]
    async fn update_and_delete_reject_unparseable_server() {
        let h = harness().await;
        let err = h
            .registry
            .update_cluster(&cluster("not a uri", "x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = h.registry.delete_cluster("not a uri").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn list_skips_malformed_records() {
        let h = harness().await;
        let mut broken = Secret::default();
        cluster_to_secret(&cluster("http://broken", "broken"), &mut broken).unwrap();
        broken.metadata.name = Some("broken".to_string());
        broken
            .data
            .as_mut()
            .unwrap()
            .insert("config".to_string(), k8s_openapi::ByteString(b"not json".to_vec()));
        h.store.create(&broken).await.unwrap();
        h.registry
            .create_cluster(&cluster("http://ok", "ok"))
            .await
            .unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while h.registry.shared.cache.len() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        h.settings.set_in_cluster_enabled(false);
        let clusters = h.registry.list_clusters().await.unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].server, "http://ok");
    }

    #[tokio::test]
    async fn update_merges_metadata() {
        let h = harness().await;
        let mut original = cluster("http://mycluster", "mycluster");
        original.labels.insert("team".to_string(), "a".to_string());
        original.labels.insert("tier".to_string(), "gold".to_string());
        original.annotations.insert("note".to_string(), "keep".to_string());
        h.registry.create_cluster(&original).await.unwrap();

        let mut change = cluster("http://mycluster", "renamed");
        change.labels.insert("team".to_string(), "b".to_string());
        change.refresh_requested_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
        let updated = h.registry.update_cluster(&change).await.unwrap();

        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.labels.get("team").map(String::as_str), Some("b"));
        assert_eq!(updated.labels.get("tier").map(String::as_str), Some("gold"));
        assert_eq!(updated.annotations.get("note").map(String::as_str), Some("keep"));
        assert_eq!(updated.refresh_requested_at, change.refresh_requested_at);

        assert_eq!(h.registry.get_cluster("http://mycluster").await.unwrap(), updated);
    }

    #[tokio::test]
    async fn update_clears_refresh_when_unset() {
        let h = harness().await;
        let mut c = cluster("http://mycluster", "mycluster");
        c.refresh_requested_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
        h.registry.create_cluster(&c).await.unwrap();

        c.refresh_requested_at = None;
        let updated = h.registry.update_cluster(&c).await.unwrap();
        assert_eq!(updated.refresh_requested_at, None);
        assert!(updated.annotations.is_empty());
    }

    #[tokio::test]
    async fn update_missing_or_reserved_is_rejected() {
        let h = harness().await;
        let err = h
            .registry
            .update_cluster(&cluster("http://missing", "missing"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        h.registry
            .create_cluster(&cluster("http://mycluster", "mycluster"))
            .await
            .unwrap();
        let mut c = cluster("http://mycluster", "mycluster");
        c.annotations
            .insert(LAST_APPLIED_CONFIG_ANNOTATION.to_string(), "{}".to_string());
        let err = h.registry.update_cluster(&c).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn update_conflict_is_surfaced_without_retry() {
        let mut existing = Secret::default();
        cluster_to_secret(&cluster("http://mycluster", "mycluster"), &mut existing).unwrap();
        existing.metadata.name = Some("mycluster".to_string());
        existing.metadata.resource_version = Some("1".to_string());

        let mut store = MockSecretStore::new();
        store
            .expect_watch()
            .returning(|_| stream::pending().boxed());
        store
            .expect_list()
            .returning(move |_| Ok(vec![existing.clone()]));
        store
            .expect_update()
            .times(1)
            .withf(|s| s.metadata.resource_version.as_deref() == Some("1"))
            .returning(|s| Err(Error::conflict(s.name_any(), "the object has been modified")));

        let registry = ClusterRegistry::start(
            Arc::new(store),
            Arc::new(StaticSettings::default()),
            RegistryConfig::new("armada"),
        )
        .await
        .unwrap();

        let err = registry
            .update_cluster(&cluster("http://mycluster", "other"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.is_retryable());
        assert_eq!(
            registry.get_cluster("http://mycluster").await.unwrap().name,
            "mycluster"
        );
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let h = harness().await;
        h.registry
            .create_cluster(&cluster("http://mycluster", "mycluster"))
            .await
            .unwrap();
        h.registry.delete_cluster("http://mycluster").await.unwrap();

        assert!(h.store.is_empty());
        let err = h.registry.get_cluster("http://mycluster").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = h.registry.delete_cluster("http://mycluster").await.unwrap_err();
        assert_eq!(err.to_string(), r#"cluster "http://mycluster" not found"#);
    }

    #[tokio::test]
    async fn servers_by_name_and_project() {
        let h = harness().await;
        let mut a = cluster("http://a", "shared");
        a.project = "p1".to_string();
        let mut b = cluster("http://b", "shared");
        b.project = "p2".to_string();
        h.registry.create_cluster(&a).await.unwrap();
        h.registry.create_cluster(&b).await.unwrap();

        assert_eq!(
            h.registry.get_cluster_servers_by_name("shared").await.unwrap(),
            vec!["http://a", "http://b"]
        );
        assert_eq!(
            h.registry.get_cluster_servers_by_name("in-cluster").await.unwrap(),
            vec![LOCAL_CLUSTER_SERVER]
        );

        let p1 = h.registry.get_project_clusters("p1").await.unwrap();
        assert_eq!(p1.len(), 1);
        assert_eq!(p1[0].server, "http://a");
    }

    #[tokio::test]
    async fn start_seeds_cache_from_existing_records() {
        let store = MemorySecretStore::new();
        let mut secret = Secret::default();
        cluster_to_secret(&cluster("http://existing", "existing"), &mut secret).unwrap();
        secret.metadata.name = Some("mycluster".to_string());
        store.create(&secret).await.unwrap();

        let registry = ClusterRegistry::start(
            Arc::new(store),
            Arc::new(StaticSettings::new(false)),
            RegistryConfig::new("armada"),
        )
        .await
        .unwrap();

        assert_eq!(
            registry.get_cluster("http://existing").await.unwrap().name,
            "existing"
        );
        registry.delete_cluster("http://existing").await.unwrap();
    }
}
