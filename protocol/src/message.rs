//! 消息类型定义

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::error::RuleViolation;
use crate::piece::{Color, Piece, Position};
use crate::record::MoveRecord;

/// 玩家 ID（由外部身份服务分配）
pub type PlayerId = String;

/// 会话 ID（由撮合服务分配）
pub type SessionId = String;

/// 游戏结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameResult {
    /// 红方胜
    RedWin(WinReason),
    /// 黑方胜
    BlackWin(WinReason),
    /// 和棋
    Draw(DrawReason),
}

impl GameResult {
    /// 指定阵营获胜
    pub fn win(winner: Color, reason: WinReason) -> Self {
        match winner {
            Color::Red => GameResult::RedWin(reason),
            Color::Black => GameResult::BlackWin(reason),
        }
    }

    /// 胜方（和棋为 None）
    pub fn winner(&self) -> Option<Color> {
        match self {
            GameResult::RedWin(_) => Some(Color::Red),
            GameResult::BlackWin(_) => Some(Color::Black),
            GameResult::Draw(_) => None,
        }
    }

    /// 结果类型字符串，如 `checkmate`、`repetition`
    pub fn reason(&self) -> &'static str {
        match self {
            GameResult::RedWin(r) | GameResult::BlackWin(r) => r.as_str(),
            GameResult::Draw(r) => r.as_str(),
        }
    }
}

/// 胜利原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WinReason {
    /// 将死
    Checkmate,
    /// 对方无子可动（困毙）
    Stalemate,
    /// 吃掉对方将/帅
    GeneralCapture,
    /// 对方超时
    Timeout,
    /// 对方认输
    Resign,
    /// 对方断线超过宽限期
    Abandonment,
    /// 对方长将
    PerpetualCheck,
}

impl WinReason {
    pub fn as_str(self) -> &'static str {
        match self {
            WinReason::Checkmate => "checkmate",
            WinReason::Stalemate => "stalemate",
            WinReason::GeneralCapture => "general-capture",
            WinReason::Timeout => "timeout",
            WinReason::Resign => "resign",
            WinReason::Abandonment => "abandonment",
            WinReason::PerpetualCheck => "perpetual-check",
        }
    }
}

/// 和棋原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DrawReason {
    /// 双方同意
    Agreement,
    /// 重复局面
    Repetition,
    /// 60 回合无吃子
    MoveLimit,
}

impl DrawReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DrawReason::Agreement => "agreement",
            DrawReason::Repetition => "repetition",
            DrawReason::MoveLimit => "move-limit",
        }
    }
}

/// 双方剩余时间（毫秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockReading {
    pub red_ms: u64,
    pub black_ms: u64,
}

impl ClockReading {
    pub fn get(&self, color: Color) -> u64 {
        match color {
            Color::Red => self.red_ms,
            Color::Black => self.black_ms,
        }
    }

    /// 向上取整到秒，只有真正用完才显示 0
    pub fn seconds(&self, color: Color) -> u64 {
        self.get(color).div_ceil(1000)
    }
}

/// 双方剩余悔棋次数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackBudgets {
    pub red: u8,
    pub black: u8,
}

impl RollbackBudgets {
    pub fn get(&self, color: Color) -> u8 {
        match color {
            Color::Red => self.red,
            Color::Black => self.black,
        }
    }
}

/// 会话完整快照（加入或重连时推送，客户端无需回放）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub red_player: Option<PlayerId>,
    pub black_player: Option<PlayerId>,
    /// 接收方执子颜色
    pub your_color: Option<Color>,
    pub board: Board,
    pub turn: Color,
    pub clocks: ClockReading,
    pub rollback_budgets: RollbackBudgets,
    /// 当前走子方是否被将军
    pub in_check: bool,
    pub move_count: u32,
    pub last_move: Option<MoveRecord>,
    /// 被吃掉的棋子（按吃子顺序）
    pub captured: Vec<Piece>,
    pub pending_rollback: Option<Color>,
    pub pending_draw: Option<Color>,
    /// 对手是否在线
    pub opponent_connected: bool,
    pub result: Option<GameResult>,
}

/// 客户端发送给服务端的消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// 加入（或重新加入）会话
    Join {
        session_id: SessionId,
        player_id: PlayerId,
    },
    /// 走棋
    Move { from: Position, to: Position },
    /// 请求悔棋
    RollbackRequest,
    /// 响应悔棋请求
    RollbackResponse { accept: bool },
    /// 提和
    DrawOffer,
    /// 响应提和
    DrawResponse { accept: bool },
    /// 认输
    Resign,
    /// 心跳
    Heartbeat,
}

/// 服务端发送给客户端的消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// 权威状态快照
    StateSnapshot(Box<SessionSnapshot>),
    /// 走棋完成
    MoveApplied { record: MoveRecord, is_check: bool },
    /// 指令被拒绝（只发给出错的一方）
    MoveRejected { code: ErrorCode, message: String },
    /// 对方请求悔棋
    RollbackRequested { requester: Color, timeout_secs: u64 },
    /// 悔棋结果，接受时附带回退后的状态
    RollbackResult {
        accepted: bool,
        new_state: Option<Box<SessionSnapshot>>,
    },
    /// 计时广播（秒）
    TimerTick { red_seconds: u64, black_seconds: u64 },
    /// 对手连接状态变化
    PeerConnectionChanged {
        color: Color,
        connected: bool,
        /// 断线时的宽限秒数
        grace_secs: Option<u64>,
    },
    /// 对方提和
    DrawOffered { by: Color },
    /// 提和被拒绝
    DrawDeclined { by: Color },
    /// 游戏结束
    GameEnded {
        winner_id: Option<PlayerId>,
        result: GameResult,
    },
    /// 心跳响应
    HeartbeatAck,
}

impl ServerMessage {
    /// 构造拒绝消息
    pub fn rejected(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::MoveRejected {
            code,
            message: message.into(),
        }
    }
}

/// 错误码定义，字符串形式为 kebab-case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    // === 走法校验 ===
    NotYourTurn,
    NoPieceAtSource,
    CannotMoveOpponentPiece,
    InvalidMoveForThisPiece,
    MoveExposesOwnCheck,
    MoveCreatesFlyingGeneral,

    // === 会话状态 ===
    GameNotStarted,
    GameAlreadyEnded,
    NoPendingRollback,
    RollbackBudgetExhausted,
    DuplicateRollbackRequest,
    NoMoveToRollback,
    NoPendingDraw,
    DuplicateDrawOffer,

    // === 连接 ===
    MalformedMessage,
    NotInSession,
    SessionFull,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotYourTurn => "not-your-turn",
            ErrorCode::NoPieceAtSource => "no-piece-at-source",
            ErrorCode::CannotMoveOpponentPiece => "cannot-move-opponent-piece",
            ErrorCode::InvalidMoveForThisPiece => "invalid-move-for-this-piece",
            ErrorCode::MoveExposesOwnCheck => "move-exposes-own-check",
            ErrorCode::MoveCreatesFlyingGeneral => "move-creates-flying-general",
            ErrorCode::GameNotStarted => "game-not-started",
            ErrorCode::GameAlreadyEnded => "game-already-ended",
            ErrorCode::NoPendingRollback => "no-pending-rollback",
            ErrorCode::RollbackBudgetExhausted => "rollback-budget-exhausted",
            ErrorCode::DuplicateRollbackRequest => "duplicate-rollback-request",
            ErrorCode::NoMoveToRollback => "no-move-to-rollback",
            ErrorCode::NoPendingDraw => "no-pending-draw",
            ErrorCode::DuplicateDrawOffer => "duplicate-draw-offer",
            ErrorCode::MalformedMessage => "malformed-message",
            ErrorCode::NotInSession => "not-in-session",
            ErrorCode::SessionFull => "session-full",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RuleViolation> for ErrorCode {
    fn from(violation: RuleViolation) -> Self {
        match violation {
            RuleViolation::NotYourTurn => ErrorCode::NotYourTurn,
            RuleViolation::NoPieceAtSource(_) => ErrorCode::NoPieceAtSource,
            RuleViolation::CannotMoveOpponentPiece(_) => ErrorCode::CannotMoveOpponentPiece,
            RuleViolation::InvalidMoveForPiece { .. } => ErrorCode::InvalidMoveForThisPiece,
            RuleViolation::ExposesOwnCheck => ErrorCode::MoveExposesOwnCheck,
            RuleViolation::CreatesFlyingGeneral => ErrorCode::MoveCreatesFlyingGeneral,
        }
    }
}
