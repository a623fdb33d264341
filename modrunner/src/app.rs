use crate::config::Config;
use notifier::{ChatPlatform, FanoutEngine, Reconciler, ReconcilerConfig};
use platforms::{PlatformError, Platforms};
use std::sync::Arc;
use tracker::{
    PolicyDefaults, PolicyStore, ProjectRegistry, Store, StoreError, TrackingLedger,
};

#[derive(thiserror::Error, Debug)]
pub enum StartupError {
    #[error("could not open store: {0}")]
    Store(#[from] StoreError),
    #[error("could not build platform clients: {0}")]
    Platforms(#[from] PlatformError),
}

/// Every component, wired together over one store.
#[derive(Clone)]
pub struct App {
    pub registry: ProjectRegistry,
    pub ledger: TrackingLedger,
    pub policies: PolicyStore,
    pub reconciler: Reconciler,
}

impl App {
    pub async fn from_config(
        config: &Config,
        chat: Arc<dyn ChatPlatform>,
    ) -> Result<Self, StartupError> {
        let store = tracker::store::open(&config.store).await?;
        let platforms = Arc::new(Platforms::from_config(&config.platforms)?);
        Ok(Self::new(
            store,
            platforms,
            chat,
            config.reconciler.clone(),
            config.policy_defaults.clone(),
        ))
    }

    pub fn new(
        store: Arc<dyn Store>,
        platforms: Arc<Platforms>,
        chat: Arc<dyn ChatPlatform>,
        reconciler: ReconcilerConfig,
        policy_defaults: PolicyDefaults,
    ) -> Self {
        let policies = PolicyStore::new(store.clone(), policy_defaults);
        let ledger = TrackingLedger::new(store.clone(), policies.clone());
        let registry = ProjectRegistry::new(store, platforms);
        let fanout = FanoutEngine::new(ledger.clone(), policies.clone(), chat);
        let reconciler = Reconciler::new(registry.clone(), fanout, reconciler);

        App {
            registry,
            ledger,
            policies,
            reconciler,
        }
    }
}
