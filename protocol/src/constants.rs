//! 协议常量定义

use std::time::Duration;

/// 协议版本号
pub const PROTOCOL_VERSION: u8 = 2;

/// 棋盘宽度（列数，a-i）
pub const BOARD_WIDTH: usize = 9;

/// 棋盘高度（行数，0-9）
pub const BOARD_HEIGHT: usize = 10;

/// 棋盘格点总数
pub const BOARD_SQUARES: usize = BOARD_WIDTH * BOARD_HEIGHT;

/// 每方最多棋子数
pub const MAX_PIECES_PER_SIDE: usize = 16;

/// 棋子 ID 上限（双方合计）
pub const MAX_PIECE_IDS: usize = MAX_PIECES_PER_SIDE * 2;

/// 消息帧最大大小
pub const MAX_FRAME_SIZE: usize = 65536;

/// 每方悔棋次数
pub const ROLLBACK_BUDGET: u8 = 3;

/// 悔棋请求等待应答时间（秒）
pub const ROLLBACK_TIMEOUT_SECS: u64 = 30;

/// 断线重连宽限期（秒）
pub const RECONNECT_GRACE_SECS: u64 = 60;

/// 服务端心跳超时（秒）- 超过此时间无消息视为断线
pub const HEARTBEAT_TIMEOUT_SECS: u64 = 30;

/// 连接超时（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 每方初始时间（毫秒）- 10分钟
pub const INITIAL_TIME_MS: u64 = 10 * 60 * 1000;

/// 计时广播间隔（毫秒）
pub const TICK_INTERVAL_MS: u64 = 1000;

/// 无吃子半回合上限（60 回合）
pub const NO_CAPTURE_PLY_LIMIT: u32 = 120;

/// 同一局面出现次数达到该值即判定重复
pub const REPETITION_THRESHOLD: usize = 3;

/// 悔棋应答 Duration
pub const ROLLBACK_TIMEOUT: Duration = Duration::from_secs(ROLLBACK_TIMEOUT_SECS);

/// 连接超时 Duration
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(CONNECT_TIMEOUT_SECS);

