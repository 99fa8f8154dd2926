//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up the admission stack (panic containment, request ID, tracing,
//!   timeout, body limit, rate limiter, authenticator)
//! - Bind server to listener and run the rate limit sweeper beside it
//! - Drain on shutdown
//!
//! # Layer order (outermost first)
//! ```text
//! contain_panics → SetRequestId → PropagateRequestId → TraceLayer (span)
//!     → log_request → request_timeout → DefaultBodyLimit → rate_limit → authenticate
//!     → handler
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::DefaultBodyLimit, middleware, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::api;
use crate::auth::{authenticate, Authenticator, TokenService, TokenStore, UserStore};
use crate::config::AppConfig;
use crate::http::access_log::log_request;
use crate::http::panic::contain_panics;
use crate::observability::tracing::request_span;
use crate::resilience::timeouts::request_timeout;
use crate::security::{rate_limit, RateLimiter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tokens: Arc<TokenService>,
    pub users: Arc<dyn UserStore>,
}

/// Wrap `routes` in the full admission stack.
///
/// `routes` must already have its state applied. Exposed separately from
/// [`HttpServer`] so any router can be run behind the same middleware.
pub fn with_admission(
    routes: Router,
    config: &AppConfig,
    limiter: Arc<RateLimiter>,
    authenticator: Authenticator,
) -> Router {
    routes
        .layer(middleware::from_fn_with_state(authenticator, authenticate))
        .layer(middleware::from_fn_with_state(limiter, rate_limit))
        .layer(DefaultBodyLimit::max(config.limits.max_body_bytes))
        .layer(middleware::from_fn_with_state(
            Duration::from_secs(config.timeouts.request_secs),
            request_timeout,
        ))
        .layer(middleware::from_fn(log_request))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_request(())
                .on_response(()),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(middleware::from_fn(contain_panics))
}

/// HTTP server for the portal API.
pub struct HttpServer {
    router: Router,
    config: Arc<AppConfig>,
    limiter: Arc<RateLimiter>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and stores.
    pub fn new(config: AppConfig, tokens: Arc<dyn TokenStore>, users: Arc<dyn UserStore>) -> Self {
        let config = Arc::new(config);
        let token_service = Arc::new(TokenService::new(tokens, config.auth.store_timeout()));
        let limiter = Arc::new(RateLimiter::new(config.limiter.clone()));
        let authenticator = Authenticator::new(token_service.clone(), &config.auth.scope);

        let state = AppState {
            config: config.clone(),
            tokens: token_service,
            users,
        };

        let router = with_admission(
            api::routes().with_state(state),
            &config,
            limiter.clone(),
            authenticator,
        );

        Self {
            router,
            config,
            limiter,
        }
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn limiter(&self) -> Arc<RateLimiter> {
        self.limiter.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            rate_limit = self.config.limiter.enabled,
            rps = self.config.limiter.requests_per_second,
            burst = self.config.limiter.burst,
            "HTTP server starting"
        );

        let sweeper = self.limiter.spawn_sweeper(shutdown.resubscribe());

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Draining connections");
            })
            .await?;

        if let Some(sweeper) = sweeper {
            if let Err(e) = sweeper.await {
                tracing::warn!(error = %e, "Rate limit sweeper ended abnormally");
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
