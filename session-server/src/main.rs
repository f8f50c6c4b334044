use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use protocol::{Listener, TcpListener};
use xiangqi_session::{FileArchive, RoomRegistry, ServerConfig, SessionServer};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("xiangqi_session=debug".parse()?),
        )
        .init();

    info!("象棋会话服务启动中...");

    // 第一个参数为配置文件路径
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Arc::new(ServerConfig::load(config_path.as_deref())?);

    let archive = FileArchive::new(config.archive_dir.clone())?;
    info!(dir = ?archive.directory(), "归档目录");
    let (archive_tx, archive_rx) = mpsc::unbounded_channel();
    let _writer = archive.spawn_writer(archive_rx);

    let registry = Arc::new(RoomRegistry::new(config.clone(), Some(archive_tx)));
    let server = Arc::new(SessionServer::new(registry));

    let listener = TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("无法监听 {}", config.bind_address))?;
    info!(addr = %config.bind_address, "监听中");

    tokio::select! {
        result = server.run(listener) => {
            if let Err(e) = &result {
                error!("服务异常退出: {e:#}");
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("收到退出信号");
        }
    }

    Ok(())
}
