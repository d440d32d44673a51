//! Tutora backend server
//!
//! Scheduling, enrollment and star-ledger API for the tutoring marketplace.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpResponse, HttpServer};
use anyhow::Context;
use std::env;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tutora_api::configure;
use tutora_auth::JwtService;
use tutora_core::traits::{SystemClock, VideoRoomProvider};
use tutora_core::AppConfig;
use tutora_db::{
    create_pool, run_migrations, PgIdentityDirectory, PgNotificationSink, PgStore,
};
use tutora_services::{AppServices, HttpRoomProvider, LocalRoomProvider};

/// Initialize tracing; `LOG_FORMAT=json` switches to structured output
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "tutora_backend={lvl},tutora_api={lvl},tutora_services={lvl},tutora_db={lvl},tutora_auth={lvl},actix_web=info,sqlx=warn",
            lvl = log_level
        ))
    });

    let registry = tracing_subscriber::registry().with(env_filter);
    if env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false) {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
            .init();
    }
}

fn room_provider(config: &AppConfig) -> anyhow::Result<Arc<dyn VideoRoomProvider>> {
    if config.video.enabled {
        let provider = HttpRoomProvider::from_config(&config.video)
            .context("failed to build video room client")?;
        info!(base_url = %provider.base_url(), "Video rooms served by external provider");
        Ok(Arc::new(provider))
    } else {
        warn!("Video provider disabled, using local rooms");
        Ok(Arc::new(LocalRoomProvider::new()))
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting Tutora backend v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    info!("Connecting to database...");
    let pool = create_pool(&config.database)
        .await
        .context("failed to create database pool")?;
    if config.database.run_migrations {
        run_migrations(&pool).await.context("migrations failed")?;
    }

    let services = web::Data::new(
        AppServices::new(
            Arc::new(PgStore::new(pool.clone())),
            Arc::new(PgIdentityDirectory::new(pool.clone())),
            Arc::new(PgNotificationSink::new(pool)),
            room_provider(&config)?,
            Arc::new(SystemClock),
            &config,
        )
        .context("failed to build services")?,
    );

    let jwt_service = web::Data::new(Arc::new(JwtService::new(
        &config.auth.jwt_secret,
        config.auth.jwt_expiration_minutes * 60,
    )));

    let cors_origins = config.server.cors_origins.clone();
    let bind_addr = config.server_addr();
    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, config.server.workers
    );

    HttpServer::new(move || {
        let origins = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _req_head| match origin.to_str() {
                Ok(origin) => origins.split(',').any(|o| o.trim() == origin),
                Err(_) => false,
            })
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
            .max_age(3600);

        App::new()
            .app_data(services.clone())
            .app_data(jwt_service.clone())
            .app_data(web::JsonConfig::default().limit(256 * 1024))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                let error_message = err.to_string();
                actix_web::error::InternalError::from_response(
                    err,
                    HttpResponse::BadRequest().json(serde_json::json!({
                        "error": "invalid_query",
                        "message": error_message,
                        "status": 400
                    })),
                )
                .into()
            }))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(configure::<PgStore>)
    })
    .workers(config.server.workers)
    .client_request_timeout(std::time::Duration::from_secs(config.server.timeout_secs))
    .bind(&bind_addr)
    .with_context(|| format!("failed to bind {}", bind_addr))?
    .run()
    .await?;

    info!("Server stopped");
    Ok(())
}
