pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;

use std::sync::Arc;

use anyhow::Result;

use crate::app::audit::{AuditDispatcher, AuditStore};
use crate::app::notifier::ScoreNotifier;
use crate::app::store::VoteStore;
use crate::app::votes::VoteService;
use crate::config::{AppConfig, StoreBackend};
use crate::infra::cache::RedisCache;
use crate::infra::db::Db;
use crate::infra::memory::{MemoryAuditStore, MemoryVoteStore};
use crate::infra::postgres::{PgAuditStore, PgVoteStore};

#[derive(Clone)]
pub struct AppState {
    pub votes: VoteService,
    pub cache: Option<RedisCache>,
    pub admin_token: Option<String>,
    pub paseto_access_key: [u8; 32],
    pub access_ttl_minutes: u64,
}

impl AppState {
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let (store, audit): (Arc<dyn VoteStore>, Arc<dyn AuditStore>) = match config.store_backend
        {
            StoreBackend::Postgres => {
                let db = Db::connect(config).await?;
                (
                    Arc::new(PgVoteStore::new(db.clone())),
                    Arc::new(PgAuditStore::new(db)),
                )
            }
            StoreBackend::Memory => {
                tracing::warn!("using in-memory vote store; votes are lost on restart");
                (
                    Arc::new(MemoryVoteStore::new()),
                    Arc::new(MemoryAuditStore::new()),
                )
            }
        };

        let cache = match &config.redis_url {
            Some(url) => Some(RedisCache::connect(url).await?),
            None => None,
        };

        Ok(Self::with_stores(config, store, audit, cache))
    }

    pub fn with_stores(
        config: &AppConfig,
        store: Arc<dyn VoteStore>,
        audit: Arc<dyn AuditStore>,
        cache: Option<RedisCache>,
    ) -> Self {
        let votes = VoteService::new(
            store,
            AuditDispatcher::new(audit, config.audit_snapshot_max_chars),
            ScoreNotifier::new(cache.clone()),
            config.vote_max_attempts,
        );

        Self {
            votes,
            cache,
            admin_token: config.admin_token.clone(),
            paseto_access_key: config.paseto_access_key,
            access_ttl_minutes: config.access_ttl_minutes,
        }
    }
}
