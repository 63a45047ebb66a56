//! Shared server state and its construction from configuration
//!
//! Every quota policy gets its own [`EntryStore`], and tokens get one more.
//! Each store is swept by its own background task.

use crate::config::{Config, StoreConfig};
use crate::metrics::Metrics;
use anyhow::{Context, Result};
use gatecrab::{
    EntryStore, QuotaPolicy, QuotaPreset, Sweeper, SweeperHandle, TokenPolicy, TokenService,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Everything the transports need to serve requests
pub struct AppState {
    quotas: BTreeMap<String, QuotaPolicy>,
    tokens: TokenService,
    metrics: Arc<Metrics>,
    sweep_interval: Duration,
}

impl AppState {
    /// Build policies and stores for `config`
    ///
    /// The preset table is applied first; `--quota` entries replace presets
    /// with the same name or add new policies.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut quotas = BTreeMap::new();

        for preset in QuotaPreset::ALL {
            let store = build_store(&config.store)?;
            quotas.insert(
                preset.name().to_string(),
                QuotaPolicy::from_preset(store, preset),
            );
        }
        for quota in &config.quotas {
            let store = build_store(&config.store)?;
            let policy = QuotaPolicy::new(store, quota.name.clone(), quota.config()?);
            if quotas.insert(quota.name.clone(), policy).is_some() {
                tracing::info!(
                    policy = %quota.name,
                    max_requests = quota.max_requests,
                    window_secs = quota.window_secs,
                    "quota preset overridden"
                );
            }
        }

        let tokens = TokenPolicy::new(build_store(&config.store)?)
            .with_default_ttl(Duration::from_secs(config.tokens.ttl))
            .with_max_payload_age(Duration::from_secs(config.tokens.max_payload_age));

        Ok(AppState {
            quotas,
            tokens: TokenService::new(tokens),
            metrics: Arc::new(Metrics::new()),
            sweep_interval: config.store.sweep_interval(),
        })
    }

    /// Assemble state from ready-made parts
    pub fn new(quotas: Vec<QuotaPolicy>, tokens: TokenService, sweep_interval: Duration) -> Self {
        AppState {
            quotas: quotas
                .into_iter()
                .map(|policy| (policy.name().to_string(), policy))
                .collect(),
            tokens,
            metrics: Arc::new(Metrics::new()),
            sweep_interval,
        }
    }

    pub fn quota(&self, name: &str) -> Option<&QuotaPolicy> {
        self.quotas.get(name)
    }

    pub fn quota_names(&self) -> impl Iterator<Item = &str> {
        self.quotas.keys().map(String::as_str)
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Start one sweeper per store
    ///
    /// The token store's sweeper also purges the backstop, if one is set.
    pub fn spawn_sweepers(&self) -> Vec<SweeperHandle> {
        let observer = {
            let metrics = self.metrics.clone();
            Arc::new(move |removed: usize| metrics.record_swept(removed))
        };

        let mut handles: Vec<SweeperHandle> = self
            .quotas
            .values()
            .map(|policy| {
                Sweeper::new(policy.store().clone())
                    .interval(self.sweep_interval)
                    .on_sweep(observer.clone())
                    .spawn()
            })
            .collect();

        let mut token_sweeper = Sweeper::new(self.tokens.policy().store().clone())
            .interval(self.sweep_interval)
            .on_sweep(observer);
        if let Some(backstop) = self.tokens.backstop() {
            token_sweeper = token_sweeper.backstop(backstop.clone());
        }
        handles.push(token_sweeper.spawn());

        handles
    }
}

fn build_store(config: &StoreConfig) -> Result<Arc<EntryStore>> {
    let mut builder = EntryStore::builder().capacity(config.capacity);
    if config.shards > 0 {
        builder = builder.shards(config.shards);
    }
    let store = builder.build().context("failed to build entry store")?;
    Ok(Arc::new(store))
}
