//! 房间登记表
//!
//! 会话 ID 到房间句柄的映射。登记表只做查找和创建，从不等待房间处理指令；
//! 房间任务退出时经通道通知后台任务：未开局的房间直接移除，
//! 已结束的对局换成终局快照，同一会话 ID 不会再开出新局。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use protocol::{PlayerId, SessionId, SessionRecord, SessionSnapshot};

use crate::config::ServerConfig;
use crate::room::{RoomHandle, RoomHooks, RoomRetired, RoomSettings, SessionRoom};
use crate::session::GameSession;

type RoomMap = Arc<Mutex<HashMap<SessionId, RoomLookup>>>;

/// 按会话 ID 查到的房间
#[derive(Debug, Clone)]
pub enum RoomLookup {
    /// 房间任务仍在运行
    Open(RoomHandle),
    /// 对局已结束，房间已关闭
    Finished(Arc<SessionSnapshot>),
}

impl RoomLookup {
    /// 登记表里的条目还能否使用；已关闭且未结束的房间返回 None
    fn current(&self) -> Option<RoomLookup> {
        match self {
            RoomLookup::Open(handle) if !handle.is_closed() => Some(self.clone()),
            RoomLookup::Open(handle) => handle.final_state().map(RoomLookup::Finished),
            RoomLookup::Finished(_) => Some(self.clone()),
        }
    }
}

/// 房间登记表
pub struct RoomRegistry {
    rooms: RoomMap,
    config: Arc<ServerConfig>,
    hooks: RoomHooks,
    next_instance: AtomicU64,
}

impl RoomRegistry {
    /// 创建登记表并启动清理任务
    pub fn new(
        config: Arc<ServerConfig>,
        archive: Option<mpsc::UnboundedSender<SessionRecord>>,
    ) -> Self {
        let rooms: RoomMap = Arc::new(Mutex::new(HashMap::new()));
        let (retired_tx, retired_rx) = mpsc::unbounded_channel();
        tokio::spawn(reap_retired(rooms.clone(), retired_rx));

        Self {
            rooms,
            config,
            hooks: RoomHooks {
                archive,
                retired: Some(retired_tx),
            },
            next_instance: AtomicU64::new(1),
        }
    }

    fn spawn_room(&self, session: GameSession) -> RoomHandle {
        let instance = self.next_instance.fetch_add(1, Ordering::SeqCst);
        SessionRoom::spawn(
            session,
            instance,
            RoomSettings::from_config(&self.config),
            self.hooks.clone(),
        )
    }

    /// 取得房间；不存在或未开局就已关闭时新建一个等待入座的房间
    pub async fn get_or_create(&self, session_id: &str) -> RoomLookup {
        let mut rooms = self.rooms.lock().await;
        if let Some(found) = rooms.get(session_id).and_then(RoomLookup::current) {
            return found;
        }

        let session = GameSession::new(session_id, self.config.session_rules());
        let handle = self.spawn_room(session);
        info!(session_id, instance = handle.instance(), "创建房间");
        rooms.insert(session_id.to_string(), RoomLookup::Open(handle.clone()));
        RoomLookup::Open(handle)
    }

    /// 撮合服务开局：双方座位已定；会话 ID 已在使用时返回 None
    pub async fn open_session(
        &self,
        session_id: &str,
        red: impl Into<PlayerId>,
        black: impl Into<PlayerId>,
    ) -> Option<RoomHandle> {
        let mut rooms = self.rooms.lock().await;
        if rooms.get(session_id).and_then(RoomLookup::current).is_some() {
            return None;
        }

        let rules = self.config.session_rules();
        let session = GameSession::with_players(session_id, red, black, rules);
        let handle = self.spawn_room(session);
        info!(session_id, instance = handle.instance(), "撮合开局");
        rooms.insert(session_id.to_string(), RoomLookup::Open(handle.clone()));
        Some(handle)
    }

    /// 仍在运行的房间
    pub async fn get(&self, session_id: &str) -> Option<RoomHandle> {
        match self.rooms.lock().await.get(session_id) {
            Some(RoomLookup::Open(handle)) if !handle.is_closed() => Some(handle.clone()),
            _ => None,
        }
    }

    /// 已结束对局的终局快照
    pub async fn finished(&self, session_id: &str) -> Option<Arc<SessionSnapshot>> {
        match self.rooms.lock().await.get(session_id).and_then(RoomLookup::current) {
            Some(RoomLookup::Finished(state)) => Some(state),
            _ => None,
        }
    }

    /// 登记的条目数量（含已结束的对局）
    pub async fn len(&self) -> usize {
        self.rooms.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// 清理已退出的房间；同一会话 ID 已被新房间占用时保留新房间
async fn reap_retired(rooms: RoomMap, mut rx: mpsc::UnboundedReceiver<RoomRetired>) {
    while let Some(retired) = rx.recv().await {
        let mut rooms = rooms.lock().await;
        let final_state = match rooms.get(&retired.session_id) {
            Some(RoomLookup::Open(h)) if h.instance() == retired.instance => h.final_state(),
            _ => continue,
        };
        match final_state {
            Some(state) => {
                rooms.insert(retired.session_id.clone(), RoomLookup::Finished(state));
                debug!(session_id = %retired.session_id, "房间关闭，保留终局快照");
            }
            None => {
                rooms.remove(&retired.session_id);
                debug!(session_id = %retired.session_id, "房间已移除");
            }
        }
    }
}
