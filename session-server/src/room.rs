//! 对局房间
//!
//! 每个房间是一个独立任务，持有一个 `GameSession` 和至多两条连接。
//! 客户端指令与计时事件（计时广播、超时、悔棋超时、断线宽限期）
//! 都在同一个循环里串行处理，房间之外不直接修改对局状态。

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use protocol::{
    ClientMessage, Color, PlayerId, ServerMessage, SessionId, SessionRecord, SessionSnapshot,
};

use crate::config::ServerConfig;
use crate::error::{SessionError, SessionResult};
use crate::session::{DrawOfferOutcome, GameSession, SessionStatus};

/// 房间指令队列容量
const COMMAND_BUFFER: usize = 64;

/// 房间计时参数
#[derive(Debug, Clone, Copy)]
pub struct RoomSettings {
    pub tick_interval: Duration,
    pub reconnect_grace: Duration,
}

impl RoomSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            tick_interval: config.tick_interval(),
            reconnect_grace: config.reconnect_grace(),
        }
    }
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

/// 房间任务退出的通知，登记表据此移除房间或留下终局快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRetired {
    pub session_id: SessionId,
    pub instance: u64,
}

/// 房间对外的出口
#[derive(Debug, Clone, Default)]
pub struct RoomHooks {
    /// 终局记录交给持久化
    pub archive: Option<mpsc::UnboundedSender<SessionRecord>>,
    /// 退役通知
    pub retired: Option<mpsc::UnboundedSender<RoomRetired>>,
}

/// 房间指令
#[derive(Debug)]
pub enum RoomCommand {
    /// 加入或重连
    Join {
        player_id: PlayerId,
        conn_id: u64,
        outbound: mpsc::Sender<ServerMessage>,
        reply: oneshot::Sender<SessionResult<Color>>,
    },
    /// 已加入玩家的指令
    Client {
        player_id: PlayerId,
        message: ClientMessage,
    },
    /// 连接断开
    Disconnect { player_id: PlayerId, conn_id: u64 },
    /// 查询当前状态
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// 到期的计时事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerEvent {
    Tick,
    ClockExpired,
    RollbackTimeout { request_id: u64 },
    GraceExpired { color: Color },
}

/// 一方的连接
struct Peer {
    conn_id: u64,
    tx: mpsc::Sender<ServerMessage>,
    connected: bool,
    grace_deadline: Option<Instant>,
}

/// 待发送的消息
struct Outbox {
    messages: Vec<(Color, ServerMessage)>,
}

impl Outbox {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    fn send(&mut self, color: Color, msg: ServerMessage) {
        self.messages.push((color, msg));
    }

    fn broadcast(&mut self, msg: ServerMessage) {
        self.messages.push((Color::Red, msg.clone()));
        self.messages.push((Color::Black, msg));
    }

    /// 尽力投递：对方发送队列满或已关闭时丢弃，不阻塞另一方
    fn flush(self, session_id: &str, peers: &[Option<Peer>; 2]) {
        for (color, msg) in self.messages {
            let Some(peer) = peers[color.index()].as_ref().filter(|p| p.connected) else {
                continue;
            };
            if let Err(mpsc::error::TrySendError::Full(_)) = peer.tx.try_send(msg) {
                warn!(session_id, %color, "发送队列已满，丢弃消息");
            }
        }
    }
}

/// 房间句柄，可任意克隆
#[derive(Debug, Clone)]
pub struct RoomHandle {
    session_id: SessionId,
    instance: u64,
    tx: mpsc::Sender<RoomCommand>,
    final_state: Arc<OnceLock<Arc<SessionSnapshot>>>,
}

impl RoomHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn instance(&self) -> u64 {
        self.instance
    }

    /// 房间任务是否已退出
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// 终局快照，对局结束后才有
    pub fn final_state(&self) -> Option<Arc<SessionSnapshot>> {
        self.final_state.get().cloned()
    }

    async fn command(&self, command: RoomCommand) -> SessionResult<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| SessionError::RoomClosed)
    }

    /// 加入房间，返回执子颜色；之后的推送经 `outbound` 送出
    pub async fn join(
        &self,
        player_id: impl Into<PlayerId>,
        conn_id: u64,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> SessionResult<Color> {
        let (reply, rx) = oneshot::channel();
        self.command(RoomCommand::Join {
            player_id: player_id.into(),
            conn_id,
            outbound,
            reply,
        })
        .await?;
        rx.await.map_err(|_| SessionError::RoomClosed)?
    }

    /// 转发客户端指令
    pub async fn send(
        &self,
        player_id: impl Into<PlayerId>,
        message: ClientMessage,
    ) -> SessionResult<()> {
        self.command(RoomCommand::Client {
            player_id: player_id.into(),
            message,
        })
        .await
    }

    /// 通知连接断开
    pub async fn disconnect(&self, player_id: impl Into<PlayerId>, conn_id: u64) {
        let _ = self
            .command(RoomCommand::Disconnect {
                player_id: player_id.into(),
                conn_id,
            })
            .await;
    }

    /// 当前状态快照
    pub async fn snapshot(&self) -> SessionResult<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.command(RoomCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| SessionError::RoomClosed)
    }
}

/// 对局房间
pub struct SessionRoom {
    session: GameSession,
    instance: u64,
    settings: RoomSettings,
    hooks: RoomHooks,
    peers: [Option<Peer>; 2],
    rx: mpsc::Receiver<RoomCommand>,
    final_state: Arc<OnceLock<Arc<SessionSnapshot>>>,
    next_tick: Option<Instant>,
    /// 终局已广播并归档
    finalized: bool,
    /// 开局前无人等待，房间作废
    abandoned_lobby: bool,
}

impl SessionRoom {
    /// 启动房间任务
    pub fn spawn(
        session: GameSession,
        instance: u64,
        settings: RoomSettings,
        hooks: RoomHooks,
    ) -> RoomHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let final_state = Arc::new(OnceLock::new());
        let handle = RoomHandle {
            session_id: session.id().to_string(),
            instance,
            tx,
            final_state: final_state.clone(),
        };
        let room = Self {
            session,
            instance,
            settings,
            hooks,
            peers: [None, None],
            rx,
            final_state,
            next_tick: None,
            finalized: false,
            abandoned_lobby: false,
        };
        tokio::spawn(room.run());
        handle
    }

    async fn run(mut self) {
        debug!(session_id = %self.session.id(), "房间任务启动");
        loop {
            let deadline = self.next_deadline();
            // 到期的计时事件先于同时到达的指令处理
            tokio::select! {
                biased;
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let now = Instant::now();
                    for event in self.due_events(now) {
                        self.handle_timer(event, now);
                    }
                }
                command = self.rx.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command, Instant::now());
                }
            }

            if self.should_close() {
                break;
            }
        }
        self.retire();
        debug!(session_id = %self.session.id(), "房间任务退出");
    }

    fn should_close(&self) -> bool {
        let anyone_connected = self.peers.iter().flatten().any(|p| p.connected);
        self.abandoned_lobby || (self.finalized && !anyone_connected)
    }

    fn retire(&self) {
        if let Some(retired) = &self.hooks.retired {
            let _ = retired.send(RoomRetired {
                session_id: self.session.id().to_string(),
                instance: self.instance,
            });
        }
    }

    // ========================================================================
    // 计时
    // ========================================================================

    fn next_deadline(&self) -> Option<Instant> {
        let mut deadlines = Vec::with_capacity(5);
        if self.session.status() == SessionStatus::Active {
            deadlines.extend(self.next_tick);
            deadlines.extend(self.session.clock().deadline());
            deadlines.extend(self.session.rollback().pending().map(|r| r.deadline));
        }
        deadlines.extend(self.peers.iter().flatten().filter_map(|p| p.grace_deadline));
        deadlines.into_iter().min()
    }

    fn due_events(&self, now: Instant) -> Vec<TimerEvent> {
        let mut events = Vec::new();
        if self.session.status() == SessionStatus::Active {
            if self.session.clock().deadline().is_some_and(|d| d <= now) {
                events.push(TimerEvent::ClockExpired);
            }
            if self.next_tick.is_some_and(|t| t <= now) {
                events.push(TimerEvent::Tick);
            }
            if let Some(request) = self.session.rollback().pending() {
                if request.deadline <= now {
                    events.push(TimerEvent::RollbackTimeout {
                        request_id: request.id,
                    });
                }
            }
        }
        for color in Color::BOTH {
            let expired = self.peers[color.index()]
                .as_ref()
                .and_then(|p| p.grace_deadline)
                .is_some_and(|d| d <= now);
            if expired {
                events.push(TimerEvent::GraceExpired { color });
            }
        }
        events
    }

    fn handle_timer(&mut self, event: TimerEvent, now: Instant) {
        let mut outbox = Outbox::new();
        match event {
            TimerEvent::ClockExpired => {
                if let Some(result) = self.session.tick(now) {
                    info!(session_id = %self.session.id(), ?result, "超时判负");
                }
            }
            TimerEvent::Tick => {
                self.next_tick = Some(now + self.settings.tick_interval);
                if self.session.tick(now).is_none()
                    && self.session.status() == SessionStatus::Active
                {
                    let clocks = self.session.clocks(now);
                    outbox.broadcast(ServerMessage::TimerTick {
                        red_seconds: clocks.seconds(Color::Red),
                        black_seconds: clocks.seconds(Color::Black),
                    });
                }
            }
            TimerEvent::RollbackTimeout { request_id } => {
                if let Some(expired) = self.session.expire_rollback(request_id, now) {
                    debug!(requester = %expired.requester, "悔棋请求自动拒绝");
                    outbox.broadcast(ServerMessage::RollbackResult {
                        accepted: false,
                        new_state: None,
                    });
                }
            }
            TimerEvent::GraceExpired { color } => {
                if let Some(peer) = self.peers[color.index()].as_mut() {
                    peer.grace_deadline = None;
                }
                let awaiting = self.session.status() == SessionStatus::AwaitingStart;
                if awaiting && !self.is_connected(color.opponent()) {
                    info!(session_id = %self.session.id(), "开局前双方都未到场，房间作废");
                    self.abandoned_lobby = true;
                } else if let Some(result) = self.session.abandon(color, now) {
                    info!(session_id = %self.session.id(), %color, ?result, "断线超过宽限期，判负");
                }
            }
        }
        self.after_change(outbox, now);
    }

    // ========================================================================
    // 指令
    // ========================================================================

    fn handle_command(&mut self, command: RoomCommand, now: Instant) {
        let mut outbox = Outbox::new();
        match command {
            RoomCommand::Join {
                player_id,
                conn_id,
                outbound,
                reply,
            } => {
                let joined = self.on_join(&player_id, conn_id, outbound, now, &mut outbox);
                let _ = reply.send(joined);
            }
            RoomCommand::Client { player_id, message } => {
                self.on_client(&player_id, message, now, &mut outbox);
            }
            RoomCommand::Disconnect { player_id, conn_id } => {
                self.on_disconnect(&player_id, conn_id, now, &mut outbox);
            }
            RoomCommand::Snapshot { reply } => {
                // 旁观视角：双方都在线才算对手在线
                let opponent_connected = self.all_connected();
                let _ = reply.send(self.session.snapshot(None, opponent_connected, now));
            }
        }
        self.after_change(outbox, now);
    }

    fn on_join(
        &mut self,
        player_id: &str,
        conn_id: u64,
        outbound: mpsc::Sender<ServerMessage>,
        now: Instant,
        outbox: &mut Outbox,
    ) -> SessionResult<Color> {
        let color = self.session.seat(player_id)?;
        let session_id = self.session.id().to_string();

        let previous = self.peers[color.index()].replace(Peer {
            conn_id,
            tx: outbound,
            connected: true,
            grace_deadline: None,
        });
        match previous {
            Some(peer) if peer.connected => {
                // 同一玩家新连接顶替旧连接
                info!(session_id, player_id, %color, "连接被新连接顶替");
            }
            Some(_) => {
                info!(session_id, player_id, %color, "玩家重连");
                outbox.send(
                    color.opponent(),
                    ServerMessage::PeerConnectionChanged {
                        color,
                        connected: true,
                        grace_secs: None,
                    },
                );
            }
            None => {
                info!(session_id, player_id, %color, "玩家加入");
                outbox.send(
                    color.opponent(),
                    ServerMessage::PeerConnectionChanged {
                        color,
                        connected: true,
                        grace_secs: None,
                    },
                );
            }
        }

        if self.all_connected() {
            if self.session.start(now) {
                self.next_tick = Some(now + self.settings.tick_interval);
                let opponent = color.opponent();
                outbox.send(opponent, self.snapshot_message(opponent, now));
            } else {
                self.session.resume_clock(now);
            }
        }

        outbox.send(color, self.snapshot_message(color, now));
        Ok(color)
    }

    fn on_disconnect(&mut self, player_id: &str, conn_id: u64, now: Instant, outbox: &mut Outbox) {
        let Some(color) = self.session.color_of(player_id) else {
            return;
        };
        let grace = self.settings.reconnect_grace;
        let status = self.session.status();
        // 撮合开局的座位已定，开局前离开同样进入宽限期
        let keeps_seat = match status {
            SessionStatus::Active => true,
            SessionStatus::AwaitingStart => self.session.is_full(),
            SessionStatus::Completed(_) | SessionStatus::Abandoned(_) => false,
        };
        let Some(peer) = self.peers[color.index()].as_mut() else {
            return;
        };
        // 已被新连接顶替的旧连接
        if peer.conn_id != conn_id || !peer.connected {
            return;
        }
        peer.connected = false;

        if keeps_seat {
            peer.grace_deadline = Some(now + grace);
            self.session.pause_clock(now);
            info!(
                session_id = %self.session.id(),
                player_id,
                %color,
                grace_secs = grace.as_secs(),
                "玩家断线，计时暂停"
            );
            outbox.send(
                color.opponent(),
                ServerMessage::PeerConnectionChanged {
                    color,
                    connected: false,
                    grace_secs: Some(grace.as_secs()),
                },
            );
        } else if status == SessionStatus::AwaitingStart {
            info!(session_id = %self.session.id(), player_id, "开局前离开");
            outbox.send(
                color.opponent(),
                ServerMessage::PeerConnectionChanged {
                    color,
                    connected: false,
                    grace_secs: None,
                },
            );
            if !self.peers.iter().flatten().any(|p| p.connected) {
                self.abandoned_lobby = true;
            }
        }
    }

    fn on_client(
        &mut self,
        player_id: &str,
        message: ClientMessage,
        now: Instant,
        outbox: &mut Outbox,
    ) {
        let Some(color) = self.session.color_of(player_id) else {
            warn!(session_id = %self.session.id(), player_id, "未入座玩家的指令被忽略");
            return;
        };

        let outcome: SessionResult<()> = match message {
            ClientMessage::Move { from, to } => {
                self.session
                    .apply_move(player_id, from, to, now)
                    .map(|outcome| {
                        if let Some(cancelled) = outcome.cancelled_rollback {
                            outbox.send(
                                cancelled.requester,
                                ServerMessage::RollbackResult {
                                    accepted: false,
                                    new_state: None,
                                },
                            );
                        }
                        outbox.broadcast(ServerMessage::MoveApplied {
                            record: outcome.record,
                            is_check: outcome.is_check,
                        });
                    })
            }
            ClientMessage::RollbackRequest => {
                self.session.request_rollback(player_id, now).map(|request| {
                    let timeout_secs = request.deadline.saturating_duration_since(now).as_secs();
                    outbox.send(
                        color.opponent(),
                        ServerMessage::RollbackRequested {
                            requester: color,
                            timeout_secs,
                        },
                    );
                })
            }
            ClientMessage::RollbackResponse { accept } => self
                .session
                .respond_rollback(player_id, accept, now)
                .map(|resolution| {
                    if resolution.reverted.is_some() {
                        for c in Color::BOTH {
                            let state = self.session.snapshot(
                                Some(c),
                                self.is_connected(c.opponent()),
                                now,
                            );
                            outbox.send(
                                c,
                                ServerMessage::RollbackResult {
                                    accepted: true,
                                    new_state: Some(Box::new(state)),
                                },
                            );
                        }
                    } else {
                        outbox.broadcast(ServerMessage::RollbackResult {
                            accepted: false,
                            new_state: None,
                        });
                    }
                }),
            ClientMessage::DrawOffer => {
                self.session
                    .offer_draw(player_id, now)
                    .map(|outcome| match outcome {
                        DrawOfferOutcome::Offered(by) => {
                            outbox.send(by.opponent(), ServerMessage::DrawOffered { by });
                        }
                        DrawOfferOutcome::Agreed(_) => {}
                    })
            }
            ClientMessage::DrawResponse { accept } => self
                .session
                .respond_draw(player_id, accept, now)
                .map(|result| {
                    if result.is_none() {
                        outbox.send(color.opponent(), ServerMessage::DrawDeclined { by: color });
                    }
                }),
            ClientMessage::Resign => self.session.resign(player_id, now).map(|_| ()),
            ClientMessage::Heartbeat => {
                outbox.send(color, ServerMessage::HeartbeatAck);
                Ok(())
            }
            ClientMessage::Join { .. } => Err(SessionError::SessionFull),
        };

        if let Err(e) = outcome {
            debug!(session_id = %self.session.id(), player_id, error = %e, "指令被拒绝");
            outbox.send(color, ServerMessage::rejected(e.code(), e.to_string()));
        }
    }

    // ========================================================================
    // 辅助
    // ========================================================================

    /// 状态变化后统一处理终局并发出消息
    fn after_change(&mut self, mut outbox: Outbox, now: Instant) {
        if !self.finalized && self.session.status().is_terminal() {
            self.finalize(&mut outbox, now);
        }
        outbox.flush(self.session.id(), &self.peers);
    }

    /// 终局：广播结果、交付记录、留下终局快照
    fn finalize(&mut self, outbox: &mut Outbox, now: Instant) {
        self.finalized = true;
        self.next_tick = None;
        for peer in self.peers.iter_mut().flatten() {
            peer.grace_deadline = None;
        }

        if let Some(result) = self.session.status().result() {
            outbox.broadcast(ServerMessage::GameEnded {
                winner_id: self.session.winner_id(),
                result,
            });
        }

        match (self.session.to_record(), &self.hooks.archive) {
            (Some(record), Some(archive)) => {
                info!(session_id = %self.session.id(), moves = record.moves.len(), "提交对局记录");
                if archive.send(record).is_err() {
                    warn!(session_id = %self.session.id(), "归档通道已关闭");
                }
            }
            (None, _) => warn!(session_id = %self.session.id(), "无法生成对局记录"),
            (Some(_), None) => {}
        }
        let state = self.session.snapshot(None, false, now);
        let _ = self.final_state.set(Arc::new(state));
        debug!(session_id = %self.session.id(), clocks = ?self.session.clocks(now), "房间进入终局");
    }

    fn is_connected(&self, color: Color) -> bool {
        self.peers[color.index()].as_ref().is_some_and(|p| p.connected)
    }

    fn all_connected(&self) -> bool {
        Color::BOTH.into_iter().all(|c| self.is_connected(c))
    }

    fn snapshot_message(&self, color: Color, now: Instant) -> ServerMessage {
        let snapshot = self
            .session
            .snapshot(Some(color), self.is_connected(color.opponent()), now);
        ServerMessage::StateSnapshot(Box::new(snapshot))
    }
}
