//! 连接处理
//!
//! 每条连接两个任务：读循环把帧解码成指令转交房间，写任务把房间推送写回连接。
//! 连接断开只结束自己的循环，再通知房间走断线宽限流程。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use protocol::{
    ClientMessage, Color, Connection, ErrorCode, FrameReader, Listener, PlayerId, ProtocolError,
    ServerMessage, SessionSnapshot, TcpConnection, TcpListener,
};

use crate::error::SessionError;
use crate::registry::{RoomLookup, RoomRegistry};
use crate::room::RoomHandle;

/// 每条连接的发送队列容量
const OUTBOUND_BUFFER: usize = 64;

/// 会话服务
pub struct SessionServer {
    registry: Arc<RoomRegistry>,
    next_conn_id: AtomicU64,
}

/// 连接已加入的房间
struct Binding {
    player_id: PlayerId,
    room: RoomHandle,
}

impl SessionServer {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self {
            registry,
            next_conn_id: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// 接受连接直到监听出错
    pub async fn run(self: Arc<Self>, mut listener: TcpListener) -> Result<()> {
        info!(addr = ?listener.local_addr(), "开始接受连接");
        loop {
            let conn = match listener.accept().await {
                Ok(conn) => conn,
                Err(ProtocolError::Io(e)) => {
                    warn!("接受连接失败: {e}");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let conn_id = self.next_conn_id.fetch_add(1, Ordering::SeqCst);
            let server = self.clone();
            tokio::spawn(async move {
                server.serve(conn, conn_id).await;
            });
        }
    }

    /// 处理单条连接
    pub async fn serve(&self, conn: TcpConnection, conn_id: u64) {
        let peer = conn.peer_addr();
        debug!(conn_id, ?peer, "新连接");

        let (mut reader, mut writer) = conn.split();
        let (tx, mut rx) = mpsc::channel::<ServerMessage>(OUTBOUND_BUFFER);

        let write_task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = writer.write_frame(&msg).await {
                    debug!(conn_id, "写入失败: {e}");
                    break;
                }
            }
            let _ = writer.shutdown().await;
        });

        let binding = self.read_loop(&mut reader, conn_id, &tx).await;

        if let Some(binding) = binding {
            binding.room.disconnect(binding.player_id.clone(), conn_id).await;
            info!(conn_id, player_id = %binding.player_id, "连接断开");
        }
        // 房间可能仍持有发送端，写任务不会自行结束
        write_task.abort();
    }

    async fn read_loop<R>(
        &self,
        reader: &mut FrameReader<R>,
        conn_id: u64,
        tx: &mpsc::Sender<ServerMessage>,
    ) -> Option<Binding>
    where
        R: tokio::io::AsyncRead + Unpin + Send,
    {
        let heartbeat = self.registry.config().heartbeat_timeout();
        let mut binding: Option<Binding> = None;

        loop {
            let message = match timeout(heartbeat, reader.read_frame::<ClientMessage>()).await {
                Err(_) => {
                    info!(conn_id, "心跳超时");
                    break;
                }
                Ok(Ok(message)) => message,
                Ok(Err(e)) if e.is_recoverable() => {
                    debug!(conn_id, "无法解析的消息: {e}");
                    reply(tx, ServerMessage::rejected(ErrorCode::MalformedMessage, e.to_string()))
                        .await;
                    continue;
                }
                Ok(Err(ProtocolError::ConnectionClosed)) => break,
                Ok(Err(e)) => {
                    warn!(conn_id, "连接错误: {e}");
                    break;
                }
            };

            match message {
                ClientMessage::Heartbeat => reply(tx, ServerMessage::HeartbeatAck).await,
                ClientMessage::Join {
                    session_id,
                    player_id,
                } => {
                    if binding.is_some() {
                        let msg = "Connection already joined a session";
                        reply(tx, ServerMessage::rejected(ErrorCode::SessionFull, msg)).await;
                        continue;
                    }
                    match self.join(&session_id, &player_id, conn_id, tx).await {
                        Ok(room) => binding = Some(Binding { player_id, room }),
                        Err(e) => reply(tx, ServerMessage::rejected(e.code(), e.to_string())).await,
                    }
                }
                message => {
                    let Some(bound) = &binding else {
                        let e = SessionError::NotInSession;
                        reply(tx, ServerMessage::rejected(e.code(), e.to_string())).await;
                        continue;
                    };
                    if let Err(e) = bound.room.send(bound.player_id.clone(), message).await {
                        reply(tx, ServerMessage::rejected(e.code(), e.to_string())).await;
                    }
                }
            }
        }
        binding
    }

    /// 加入房间；房间恰好在关闭时重试一次
    ///
    /// 对局已结束时送回终局快照并拒绝加入。
    async fn join(
        &self,
        session_id: &str,
        player_id: &str,
        conn_id: u64,
        tx: &mpsc::Sender<ServerMessage>,
    ) -> Result<RoomHandle, SessionError> {
        for _ in 0..2 {
            let room = match self.registry.get_or_create(session_id).await {
                RoomLookup::Open(room) => room,
                RoomLookup::Finished(state) => {
                    debug!(conn_id, session_id, player_id, "对局已结束，送回终局快照");
                    let view = finished_view(&state, player_id);
                    reply(tx, ServerMessage::StateSnapshot(Box::new(view))).await;
                    return Err(SessionError::GameAlreadyEnded);
                }
            };
            match room.join(player_id, conn_id, tx.clone()).await {
                Ok(color) => {
                    info!(conn_id, session_id, player_id, %color, "加入会话");
                    return Ok(room);
                }
                Err(SessionError::RoomClosed) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(SessionError::RoomClosed)
    }
}

/// 已结束对局的快照，按加入者补上执子颜色
fn finished_view(state: &SessionSnapshot, player_id: &str) -> SessionSnapshot {
    let mut view = state.clone();
    view.your_color = if view.red_player.as_deref() == Some(player_id) {
        Some(Color::Red)
    } else if view.black_player.as_deref() == Some(player_id) {
        Some(Color::Black)
    } else {
        None
    };
    view.opponent_connected = false;
    view
}

async fn reply(tx: &mpsc::Sender<ServerMessage>, msg: ServerMessage) {
    let _ = tx.send(msg).await;
}
