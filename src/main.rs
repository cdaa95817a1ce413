use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sportschool_api::config::Config;
use sportschool_api::db::{self, postgres::PgStore};
use sportschool_api::middleware::auth::JwtSecret;
use sportschool_api::services::{
    lifecycle::LifecycleService, metrics, notifications::{NotificationSink, PushNotifier},
    qr::HttpQrIssuer, reconciliation_scheduler, store::LifecycleStore,
};
use sportschool_api::{routes, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    metrics::register_all();

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    db::migrate_all_existing_schools(&pool).await?;
    info!("Database connected and migrations applied");

    let store: Arc<dyn LifecycleStore> = Arc::new(PgStore::new(pool.clone()));
    let notifier: Arc<dyn NotificationSink> =
        Arc::new(PushNotifier::new(pool, config.fcm_api_key.clone()));
    let qr = Arc::new(HttpQrIssuer::new(config.qr_service_url.clone()));

    let lifecycle = Arc::new(LifecycleService::new(
        store.clone(),
        qr,
        notifier.clone(),
        config.lifecycle_settings(),
    ));

    reconciliation_scheduler::start(
        store,
        notifier,
        config.price_recompute_hour,
        config.reminder_hour,
    );
    info!(
        "Reconciliation scheduled: prices at {:02}:00, reminders at {:02}:00",
        config.price_recompute_hour, config.reminder_hour
    );

    // Allow the app base domain and its school subdomains.
    // Localhost is always allowed for development.
    let base = config.app_base_url.clone();
    let cors_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let o = match origin.to_str() {
            Ok(s) => s,
            Err(_) => return false,
        };
        if o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1") {
            return true;
        }
        if o == base {
            return true;
        }
        if let Some(idx) = base.find("://") {
            let after_scheme = &base[idx + 3..];
            let domain = after_scheme.split('/').next().unwrap_or(after_scheme);
            let domain_clean = domain.split(':').next().unwrap_or(domain);
            if o.contains(&format!(".{domain_clean}")) {
                return true;
            }
        }
        false
    });

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::HeaderName::from_static("x-school"),
        ]))
        .allow_origin(cors_origin);

    let app = routes::router(AppState::new(lifecycle), JwtSecret(config.jwt_secret.clone())).layer(cors);

    let addr = format!("{}:{}", config.host, config.port);
    info!("sportschool API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
