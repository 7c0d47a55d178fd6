//! 工作许可服务主入口

use ptw_service::{
    config::{AppConfig, StorageBackend},
    db,
    middleware::AppState,
    notifications::{Notifier, PgNotificationSink, TracingNotifier},
    repository::{MemoryStore, PgStore, Store},
    routes, telemetry,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ===== CLI 参数处理 =====
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--version" => {
                println!("ptw-service {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("未知参数: {}", args[1]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    // 加载 .env 文件（开发环境）
    // 按优先级加载：.env.local > .env.development > .env
    if let Ok(env) = std::env::var("PTW_ENV") {
        dotenv::from_filename(format!(".env.{}", env)).ok();
    } else {
        dotenv::from_filename(".env.local").ok();
        dotenv::from_filename(".env.development").ok();
        dotenv::dotenv().ok();
    }

    // 1. 加载配置
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    // 2. 初始化日志
    telemetry::init_telemetry(&config)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "PTW service starting...");

    // 3. 存储 + 通知
    let (store, notifier): (Arc<dyn Store>, Arc<dyn Notifier>) = match config.storage.backend {
        StorageBackend::Postgres => {
            let pool = db::create_pool(&config.database).await?;
            db::run_migrations(&pool).await?;
            db::record_pool_metrics(&pool);
            tracing::info!("Database initialized");
            (
                Arc::new(PgStore::new(pool.clone())),
                Arc::new(PgNotificationSink::new(pool)),
            )
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            (Arc::new(MemoryStore::new()), Arc::new(TracingNotifier))
        }
    };

    // 4. 构建应用状态
    let app_state = Arc::new(AppState::new(config.clone(), store, notifier)?);

    // 5. 构建路由
    let app = routes::create_router(app_state);

    // 6. 启动服务器
    let addr = &config.server.addr;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(addr = %addr, "Server listening");

    // 7. 优雅关闭：收到信号后最多等待 timeout 让在途请求完成
    let timeout = Duration::from_secs(config.server.graceful_shutdown_timeout_secs);
    let (signal_tx, signal_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = signal_tx.send(());
    });
    let mut server = tokio::spawn(async move { server.await });

    let finished = tokio::select! {
        joined = &mut server => Some(joined),
        _ = signal_rx => None,
    };

    let joined = match finished {
        Some(joined) => joined,
        None => match tokio::time::timeout(timeout, server).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    "Graceful shutdown timeout reached, forcing exit"
                );
                return Ok(());
            }
        },
    };
    joined??;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Terminate signal received, starting graceful shutdown");
        },
    }
}

/// 打印帮助信息
fn print_help() {
    println!("ptw-service {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("用法: ptw-service [选项]");
    println!();
    println!("选项:");
    println!("  --version     打印版本信息并退出");
    println!("  --help        打印此帮助信息并退出");
    println!();
    println!("环境变量:");
    println!("  所有配置通过 PTW_ 前缀的环境变量完成");
    println!("  例如 PTW_DATABASE__URL、PTW_STORAGE__BACKEND=memory");
}
