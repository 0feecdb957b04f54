//! MIRS服务器主程序

use clap::Parser;
use mirs_core::{MirsError, Result};
use mirs_database::{DatabasePool, DatabaseQueries, PoolSettings};
use mirs_imaging::EncodeOptions;
use mirs_storage::ImageStore;
use mirs_web::auth::AuthService;
use mirs_web::{AppState, TtlCache, WebServer};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
use config::MirsConfig;

/// MIRS服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "mirs-server")]
#[command(about = "MIRS (Medical Imaging Record System) 服务器")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 监听端口（覆盖配置文件）
    #[arg(short, long)]
    port: Option<u16>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志，RUST_LOG优先于命令行参数
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    info!("启动MIRS服务器...");

    let mut cfg = MirsConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        cfg.server.port = port;
    }
    if cfg.auth.jwt_secret == config::DEFAULT_JWT_SECRET {
        warn!("正在使用默认JWT密钥，生产环境请设置MIRS__AUTH__JWT_SECRET");
    }

    info!("MIRS服务器配置:");
    info!("  监听地址: {}:{}", cfg.server.host, cfg.server.port);
    info!("  存储目录: {}", cfg.storage.root);
    info!("  token有效期: {}分钟", cfg.auth.token_expiry_minutes);

    // 数据库连接与建表
    let pool_settings = PoolSettings {
        max_connections: cfg.database.max_connections,
        min_connections: cfg.database.min_connections,
        acquire_timeout_secs: cfg.database.acquire_timeout_secs,
    };
    let db = DatabasePool::new(&cfg.database.url, &pool_settings).await?;
    DatabaseQueries::new(&db).create_tables().await?;

    // 影像文件存储
    let store = ImageStore::new(cfg.storage.root.clone());
    store.ensure_dirs().await?;

    let state = Arc::new(AppState {
        db,
        store,
        auth: AuthService::new(&cfg.auth.jwt_secret, cfg.auth.token_expiry_minutes),
        cache: TtlCache::new(),
        encode_opts: EncodeOptions {
            max_dimension: cfg.imaging.max_dimension,
            thumbnail_size: (cfg.imaging.thumbnail_size, cfg.imaging.thumbnail_size),
        },
    });

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .map_err(|e| MirsError::Config(format!("监听地址无效: {}", e)))?;

    WebServer::new(addr, state).run().await
}
