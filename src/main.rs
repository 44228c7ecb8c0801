use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, put},
};
use presence_backend::{
    AppState,
    cache::RedisAppCache,
    cache::operations::dedupe::NotificationDedupe,
    cache::operations::location::{HttpIpLocator, LocationOperations},
    cache::operations::presence::PresenceOperations,
    config::Config,
    database::PgDeviceSource,
    middleware::{auth_middleware, log_errors, record_presence},
    notify::{DeviceDirectory, GorushClient, OnlineMonitor, PushGateway, PushService},
    routes,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'presence_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    // 设置 Redis 客户端
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");
    let cache = Arc::new(RedisAppCache::new(Arc::new(redis_client)));

    // 组装各组件：全部显式构造并按引用传递，没有全局单例
    let presence = Arc::new(PresenceOperations::new(
        cache.clone(),
        config.online_user_expire_secs,
    ));
    let location = Arc::new(LocationOperations::new(
        cache.clone(),
        config.user_location_expire_secs,
    ));
    let locator = Arc::new(HttpIpLocator::new(config.geoip_url.clone()));
    let dedupe = Arc::new(NotificationDedupe::new(
        cache.clone(),
        config.contact_matched_expire_secs,
        config.contact_online_expire_secs,
    ));
    let devices = Arc::new(DeviceDirectory::new(
        Arc::new(PgDeviceSource::new(pool.clone())),
        config.device_cache_expiry(),
    ));
    let gateway = Arc::new(GorushClient::new(config.gorush_url.clone()));

    // 启动诊断：推送网关连通性检查失败只警告，不阻止启动
    match gateway.health_check().await {
        Ok(()) => tracing::info!("gorush connection test successful"),
        Err(e) => tracing::warn!("gorush connection test failed: {}", e),
    }

    let push_service = PushService::new(
        devices,
        gateway,
        presence.clone(),
        dedupe,
        config.push_batch_size,
        config.push_batch_delay(),
    );

    let monitor = Arc::new(OnlineMonitor::new(
        presence.clone(),
        Arc::new(push_service),
        config.monitor_check_interval(),
        config.monitor_check_interval_secs as i64,
    ));
    monitor.clone().start().await;

    // 设置应用状态
    let state = AppState {
        pool,
        config: config.clone(),
        cache,
        presence,
        location,
        locator,
    };

    // 所有路由都需要认证；认证之后的每个请求顺带刷新在线状态
    let protected_routes = Router::new()
        .route("/presence/online-users", get(routes::presence::online_users))
        .route("/presence/location", put(routes::presence::update_location))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            record_presence,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let router = Router::new().nest(&config.api_base_uri.clone(), protected_routes);

    // 添加日志中间件
    let router = router.layer(axum::middleware::from_fn(log_errors));

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(CorsLayer::permissive())
    };

    let app = router.with_state(state.clone());

    // 启动服务器
    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    // 服务器退出后停掉在线监控；在途的扇出任务自行结束
    monitor.stop();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
}
