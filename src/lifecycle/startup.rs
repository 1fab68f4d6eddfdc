//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration and assemble every component
//! - Bind listeners
//! - Start background tasks and serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: any error before serving is fatal
//! - A shared rate store URL must parse, but the store need not be reachable
//! - Listeners bind last, after every component is ready

use std::net::{AddrParseError, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::uri::InvalidUri;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::admin::{setup_admin_router, AdminState};
use crate::config::validation::validate_config;
use crate::config::{ConfigError, GatewayConfig};
use crate::events::EventLog;
use crate::http::server::{self, HttpServer};
use crate::inspection::{InspectionEngine, PatternRuleEngine};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::pipeline::forward::{Forwarder, HttpForwarder};
use crate::pipeline::request::Upstream;
use crate::pipeline::{AdmissionPipeline, PipelineParts};
use crate::security::rate_limit::StoreError;
use crate::security::{ClientKeyExtractor, ModeController, RateLimiter, SignatureFilter};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid upstream: {0}")]
    Upstream(#[from] InvalidUri),

    #[error("rate store error: {0}")]
    RateStore(#[from] StoreError),

    #[error("invalid inspection rule: {0}")]
    Rules(#[from] regex::Error),

    #[error("invalid address: {0}")]
    Address(#[from] AddrParseError),

    #[error("metrics exporter error: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Every component, assembled and ready to serve.
pub struct Gateway {
    config: GatewayConfig,
    pipeline: Arc<AdmissionPipeline>,
    limiter: Arc<RateLimiter>,
    admin: Option<AdminState>,
}

/// Listeners bound for a [`Gateway`].
pub struct Listeners {
    pub proxy: TcpListener,
    pub admin: Option<TcpListener>,
}

impl Listeners {
    pub fn proxy_addr(&self) -> std::io::Result<SocketAddr> {
        self.proxy.local_addr()
    }

    pub fn admin_addr(&self) -> Option<std::io::Result<SocketAddr>> {
        self.admin.as_ref().map(TcpListener::local_addr)
    }
}

impl Gateway {
    /// Assemble with the default hyper forwarder.
    pub fn build(config: GatewayConfig) -> Result<Self, StartupError> {
        Self::build_with_forwarder(config, Arc::new(HttpForwarder::new()))
    }

    pub fn build_with_forwarder(
        config: GatewayConfig,
        forwarder: Arc<dyn Forwarder>,
    ) -> Result<Self, StartupError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let upstream: Upstream = config.upstream.url.parse()?;
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit)?);
        let mode = Arc::new(ModeController::new(config.mode.initial));
        let events = Arc::new(EventLog::new(
            config.event_log.capacity,
            config.event_log.allow_sample_rate,
        ));

        let inspector = if config.inspection.enabled {
            let engine = PatternRuleEngine::from_config(&config.inspection)?;
            Some(InspectionEngine::new(Arc::new(engine)))
        } else {
            tracing::warn!("Request inspection disabled");
            None
        };

        let signatures = SignatureFilter::new(&config.signatures.deny_list);
        tracing::info!(patterns = signatures.len(), "Signature filter loaded");

        let pipeline = Arc::new(AdmissionPipeline::new(PipelineParts {
            keys: ClientKeyExtractor::new(config.client_key.trust_forwarded_for),
            signatures,
            limiter: Arc::clone(&limiter),
            mode: Arc::clone(&mode),
            inspector,
            events: Arc::clone(&events),
            forwarder,
            upstream,
            max_body_bytes: config.inspection.max_body_bytes,
        }));

        let admin = config.admin.enabled.then(|| AdminState {
            mode,
            events,
            limiter: Arc::clone(&limiter),
            api_key: Arc::from(config.admin.api_key.as_str()),
            upstream: Arc::from(config.upstream.url.as_str()),
            rate_backend: limiter.backend_name(),
            started: Instant::now(),
        });

        tracing::info!(
            upstream = %config.upstream.url,
            mode = %config.mode.initial,
            "Gateway assembled"
        );

        Ok(Self {
            config,
            pipeline,
            limiter,
            admin,
        })
    }

    pub fn pipeline(&self) -> &Arc<AdmissionPipeline> {
        &self.pipeline
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Bind the proxy listener, and the admin listener when enabled.
    pub async fn bind(&self) -> Result<Listeners, StartupError> {
        let proxy = bind(&self.config.listener.bind_address).await?;
        let admin = match self.admin {
            Some(_) => Some(bind(&self.config.admin.bind_address).await?),
            None => None,
        };
        Ok(Listeners { proxy, admin })
    }

    /// Serve on `listeners` until `shutdown` is triggered.
    pub async fn serve(self, listeners: Listeners, shutdown: Shutdown) -> Result<(), StartupError> {
        let sweeper = self.limiter.tracked_clients().map(|_| {
            self.limiter.spawn_sweeper(
                Duration::from_secs(self.config.rate_limit.gc_interval_secs),
                shutdown.subscribe(),
            )
        });

        let Listeners {
            proxy: proxy_listener,
            admin: admin_listener,
        } = listeners;

        let proxy = HttpServer::new(Arc::clone(&self.pipeline), &self.config.timeouts)
            .run(proxy_listener, shutdown.subscribe());

        let admin_state = self.admin;
        let admin_shutdown = shutdown.subscribe();
        let admin = async move {
            match (admin_listener, admin_state) {
                (Some(listener), Some(state)) => {
                    server::serve(listener, setup_admin_router(state), admin_shutdown, "admin").await
                }
                _ => Ok(()),
            }
        };

        let (proxy, admin) = tokio::join!(proxy, admin);

        if let Some(sweeper) = sweeper {
            if let Err(e) = sweeper.await {
                tracing::error!(error = %e, "Rate sweeper task failed");
            }
        }

        proxy?;
        admin?;
        Ok(())
    }
}

/// Install the metrics exporter when enabled.
pub fn init_metrics(config: &GatewayConfig) -> Result<(), StartupError> {
    if !config.observability.metrics_enabled {
        return Ok(());
    }
    let addr: SocketAddr = config.observability.metrics_address.parse()?;
    metrics::init_metrics(addr)?;
    Ok(())
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    let listener = TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.to_string(),
            source,
        })?;
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, "Listening for connections");
    }
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RateBackend, RuleConfig, RulePhase, RuleTarget};

    #[test]
    fn invalid_config_is_fatal() {
        let mut config = GatewayConfig::default();
        config.rate_limit.window_secs = 0;
        assert!(matches!(
            Gateway::build(config),
            Err(StartupError::Config(ConfigError::Validation(_)))
        ));
    }

    #[test]
    fn admin_without_key_is_fatal() {
        match Gateway::build(GatewayConfig::default()) {
            Err(StartupError::Config(ConfigError::Validation(errors))) => {
                assert_eq!(errors[0].field, "admin.api_key");
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("expected startup to fail"),
        }
    }

    #[test]
    fn malformed_rule_is_fatal() {
        let mut config = GatewayConfig::default();
        config.inspection.rules.push(RuleConfig {
            id: "9".into(),
            phase: RulePhase::Body,
            targets: vec![RuleTarget::Body],
            pattern: "(unclosed".into(),
            message: "broken".into(),
        });
        assert!(Gateway::build(config).is_err());
    }

    #[tokio::test]
    async fn unreachable_shared_store_is_not_fatal() {
        let mut config = GatewayConfig::default();
        config.rate_limit.backend = RateBackend::Redis;
        config.rate_limit.redis_url = "redis://127.0.0.1:1".into();
        config.admin.api_key = "0f1e2d3c4b5a".into();
        let gateway = Gateway::build(config).unwrap();
        assert!(gateway.limiter.tracked_clients().is_none());
    }

    #[tokio::test]
    async fn bind_failure_is_fatal() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = GatewayConfig::default();
        config.listener.bind_address = taken.local_addr().unwrap().to_string();
        config.admin.enabled = false;

        let gateway = Gateway::build(config).unwrap();
        assert!(matches!(gateway.bind().await, Err(StartupError::Bind { .. })));
    }
}
