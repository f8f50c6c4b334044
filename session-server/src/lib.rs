//! 象棋对局会话服务
//!
//! 包含:
//! - 对局状态机（走棋、将死/困毙、长将与重复局面、提和、认输）
//! - 双方计时与悔棋协商
//! - 房间任务（每局串行处理指令与计时事件）与房间登记表
//! - TCP 连接处理
//! - 对局归档与配置

pub mod clock;
pub mod config;
pub mod error;
pub mod registry;
pub mod rollback;
pub mod room;
pub mod server;
pub mod session;
pub mod storage;

pub use clock::TurnClock;
pub use config::ServerConfig;
pub use error::{SessionError, SessionResult};
pub use registry::{RoomLookup, RoomRegistry};
pub use rollback::{RollbackNegotiator, RollbackRequest, RollbackStatus};
pub use room::{RoomCommand, RoomHandle, RoomHooks, RoomRetired, RoomSettings, SessionRoom};
pub use server::SessionServer;
pub use session::{
    DrawOfferOutcome, GameSession, MoveOutcome, RollbackResolution, SessionRules, SessionStatus,
};
pub use storage::{ArchivedSession, FileArchive};
