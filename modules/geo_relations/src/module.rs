//! Module declaration and lifecycle
//!
//! `init` wires repositories, the domain service and the queue; `migrate`
//! applies the schema; `serve` runs the worker pool until cancelled.

use crate::api::native::NativeClient;
use crate::config::Config;
use crate::contract::GeoSyncApi;
use crate::domain::{EntityLock, EntityRegistry, Repositories, ResyncDispatcher, Service};
use crate::infra::storage::{
    PgAdvisoryLock, SeaOrmGeometryRepository, SeaOrmRelationRepository, SeaOrmSnapshotRepository,
};
use crate::infra::{QueueSettings, SyncQueue};
use anyhow::Result;
use parking_lot::RwLock;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Geo relations module
pub struct GeoRelationsModule {
    config: RwLock<Config>,
    service: RwLock<Option<Arc<Service>>>,
    queue: RwLock<Option<Arc<SyncQueue>>>,
    client: RwLock<Option<Arc<NativeClient>>>,
}

impl Default for GeoRelationsModule {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl GeoRelationsModule {
    pub fn new(config: Config) -> Self {
        Self {
            config: RwLock::new(config),
            service: RwLock::new(None),
            queue: RwLock::new(None),
            client: RwLock::new(None),
        }
    }

    pub fn config(&self) -> Config {
        self.config.read().clone()
    }

    /// Wire the PostGIS-backed repositories and advisory locks
    ///
    /// Fails when the connection pool is too small for the configured workers.
    pub async fn init(&self, db: DatabaseConnection) -> Result<()> {
        let max_connections = db
            .get_postgres_connection_pool()
            .options()
            .get_max_connections();
        self.config.read().check_pool(max_connections)?;

        let conn = Arc::new(db);
        let registry = EntityRegistry::builtin();
        let routes = registry
            .descriptor(crate::contract::EntityType::HikingRoute)?
            .clone();

        let repos = Repositories {
            geometry: Arc::new(SeaOrmGeometryRepository::new(conn.clone())),
            relations: Arc::new(SeaOrmRelationRepository::new(conn.clone())),
            snapshots: Arc::new(SeaOrmSnapshotRepository::new(conn.clone(), routes)),
        };
        let lock = Arc::new(PgAdvisoryLock::new(conn));
        self.init_with(registry, repos, lock)
    }

    /// Wire the module over arbitrary store handles
    pub fn init_with(
        &self,
        registry: EntityRegistry,
        repos: Repositories,
        lock: Arc<dyn EntityLock>,
    ) -> Result<()> {
        let cfg = self.config();
        let registry = Arc::new(registry);

        let service = Arc::new(Service::new(
            registry.clone(),
            repos,
            lock,
            cfg.area_srid,
            cfg.proximity.clone(),
            cfg.known_partitions.clone(),
        ));
        let queue = Arc::new(SyncQueue::new(QueueSettings::from(&cfg)));
        let dispatcher = Arc::new(ResyncDispatcher::new(registry, cfg.proximity, queue.clone()));

        *self.service.write() = Some(service);
        *self.queue.write() = Some(queue);
        *self.client.write() = Some(Arc::new(NativeClient::new(dispatcher)));

        tracing::info!(workers = cfg.workers, "Geo relations module initialized");
        Ok(())
    }

    pub async fn migrate(&self, db: &DatabaseConnection) -> Result<()> {
        use crate::infra::storage::migrations::Migrator;
        use sea_orm_migration::MigratorTrait;

        Migrator::up(db, None).await?;
        tracing::info!("Geo relations migrations completed");
        Ok(())
    }

    /// Run the workers until `cancel` fires
    pub async fn serve(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        let service = self.service()?;
        let queue = self.queue()?;
        queue.run(service, cancel).await;
        Ok(())
    }

    pub fn client(&self) -> Result<Arc<dyn GeoSyncApi>> {
        let client: Arc<dyn GeoSyncApi> = self
            .client
            .read()
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Module not initialized"))?
            .clone();
        Ok(client)
    }

    pub fn service(&self) -> Result<Arc<Service>> {
        self.service
            .read()
            .as_ref()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Module not initialized"))
    }

    pub fn queue(&self) -> Result<Arc<SyncQueue>> {
        self.queue
            .read()
            .as_ref()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Module not initialized"))
    }
}
