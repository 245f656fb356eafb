use crate::{
    config::Config,
    handlers::{
        check_payment, get_task, health_check, upsert_task, verify_payment, HealthState,
        PaymentState,
    },
    middleware::{rate_limit_middleware, RateLimiter},
    services::{ChainRegistry, KeyValueStore, PaymentVerifier, TaskMetadataStore, VerificationCache},
};
use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

/// Everything the HTTP layer needs, wired over one shared store.
#[derive(Clone)]
pub struct AppServices {
    pub store: Arc<dyn KeyValueStore>,
    pub tasks: Arc<TaskMetadataStore>,
    pub verifications: Arc<VerificationCache>,
    pub verifier: Arc<PaymentVerifier>,
    pub limiter: Arc<RateLimiter>,
}

impl AppServices {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        chains: ChainRegistry,
        task_cache_ttl: Duration,
        rate_limit_per_window: u64,
        rate_limit_window: Duration,
    ) -> Self {
        Self {
            tasks: Arc::new(TaskMetadataStore::new(store.clone(), task_cache_ttl)),
            verifications: Arc::new(VerificationCache::new(store.clone())),
            verifier: Arc::new(PaymentVerifier::new(chains)),
            limiter: Arc::new(RateLimiter::new(
                store.clone(),
                rate_limit_per_window,
                rate_limit_window,
            )),
            store,
        }
    }

    pub fn from_config(config: &Config, store: Arc<dyn KeyValueStore>) -> anyhow::Result<Self> {
        let chains = ChainRegistry::from_networks(&config.networks, config.rpc_timeout)?;
        let mut services = Self::new(
            store,
            chains,
            config.task_cache_ttl,
            config.rate_limit_per_window,
            config.rate_limit_window,
        );
        services.limiter = Arc::new(
            RateLimiter::new(
                services.store.clone(),
                config.rate_limit_per_window,
                config.rate_limit_window,
            )
            .trust_forwarded_for(config.trust_forwarded_for),
        );
        Ok(services)
    }
}

pub fn router(services: &AppServices) -> Router {
    let payment_state = PaymentState {
        tasks: services.tasks.clone(),
        verifications: services.verifications.clone(),
        verifier: services.verifier.clone(),
    };

    let health_state = HealthState {
        store: services.store.clone(),
        chains: services.verifier.chains().clone(),
    };

    let payments = Router::new()
        .route(
            "/verify-payment",
            post(verify_payment).layer(axum_middleware::from_fn_with_state(
                services.limiter.clone(),
                rate_limit_middleware,
            )),
        )
        .route("/check-payment", get(check_payment))
        .with_state(payment_state);

    let tasks = Router::new()
        .route(
            "/tasks/:campaign_id/:task_index",
            put(upsert_task).get(get_task),
        )
        .with_state(services.tasks.clone());

    let health = Router::new()
        .route("/health", get(health_check))
        .with_state(health_state);

    Router::new()
        .merge(payments)
        .merge(tasks)
        .merge(health)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}
