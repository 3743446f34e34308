pub mod adjustments;
pub mod auth;
pub mod billing;
pub mod distribution;
pub mod health;
pub mod leads;
pub mod pools;
pub mod positions;
pub mod sessions;
pub mod withdrawals;

use crate::config::Config;
use crate::datasource::{PoolAprCache, YieldSource};
use crate::db::Repository;
use crate::engine::PenaltyPolicy;
use crate::orchestration::{DistributionScheduler, DistributionService};
use crate::session::SessionManager;
use axum::{
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub sessions: Arc<SessionManager>,
    pub pool_cache: Arc<PoolAprCache>,
    pub scheduler: Arc<DistributionScheduler>,
    pub penalty: PenaltyPolicy,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, config: Config, source: Arc<dyn YieldSource>) -> Self {
        let penalty = PenaltyPolicy::new(config.apr_penalty_pct, config.min_apr_for_penalty);
        let pool_cache = Arc::new(PoolAprCache::new(source, config.pool_cache_ttl));
        let sessions = Arc::new(SessionManager::new(
            config.session_ttl,
            config.session_activity_interval,
        ));
        let service = Arc::new(DistributionService::new(
            repo.clone(),
            pool_cache.clone(),
            penalty,
        ));
        let scheduler = Arc::new(DistributionScheduler::new(
            service,
            config.distribution_enabled,
        ));
        Self {
            repo,
            config,
            sessions,
            pool_cache,
            scheduler,
            penalty,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/api/session/login", post(sessions::login))
        .route("/api/session/logout", post(sessions::logout))
        .route("/api/session/validate", get(sessions::validate))
        .route("/api/session/renew", post(sessions::renew))
        .route("/api/session/stats", get(sessions::stats))
        .route("/api/pools", get(pools::list_pools).post(pools::create_pool))
        .route("/api/pools/:address/apr", get(pools::get_pool_apr))
        .route(
            "/api/positions",
            get(positions::list_positions).post(positions::create_position),
        )
        .route("/api/positions/:id", get(positions::get_position))
        .route("/api/positions/:id/close", post(positions::close_position))
        .route(
            "/api/fee-withdrawals",
            get(withdrawals::list_withdrawals).post(withdrawals::create_withdrawal),
        )
        .route("/api/fee-withdrawals/mine", get(withdrawals::my_withdrawals))
        .route(
            "/api/fee-withdrawals/total/:position_id",
            get(withdrawals::total_withdrawn),
        )
        .route("/api/fee-withdrawals/:id", patch(withdrawals::update_withdrawal))
        .route(
            "/api/timeframe-adjustments",
            get(adjustments::list_adjustments),
        )
        .route(
            "/api/timeframe-adjustments/:timeframe",
            put(adjustments::update_adjustment),
        )
        .route("/api/admin/distribution/status", get(distribution::status))
        .route("/api/admin/distribution/run", post(distribution::run))
        .route("/api/admin/distribution/preview", get(distribution::preview))
        .route("/api/admin/distribution/info", get(distribution::info))
        .route("/api/admin/distribution/history", get(distribution::history))
        .route("/api/leads", post(leads::create_lead))
        .route("/api/admin/leads", get(leads::list_leads))
        .route(
            "/api/admin/leads/:id",
            get(leads::get_lead).patch(leads::update_lead),
        )
        .route(
            "/api/billing-profile",
            get(billing::get_my_profile).post(billing::save_my_profile),
        )
        .route("/api/billing-profile/verify", post(billing::verify_my_profile))
        .route("/api/admin/billing-profiles", get(billing::list_profiles))
        .route(
            "/api/admin/billing-profiles/:id",
            get(billing::get_profile)
                .put(billing::update_profile)
                .delete(billing::delete_profile),
        )
        .route(
            "/api/admin/billing-profiles/:id/verify",
            put(billing::set_verification),
        )
        .route(
            "/api/admin/billing-profiles/wallet/:wallet_address",
            get(billing::profile_by_wallet),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
