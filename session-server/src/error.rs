//! 会话错误类型

use thiserror::Error;

use protocol::{ErrorCode, RuleViolation};

/// 会话指令失败原因（只回复给发起方，不改变状态）
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("Game has not started yet")]
    GameNotStarted,

    #[error("Game has already ended")]
    GameAlreadyEnded,

    #[error("Player is not seated in this session")]
    NotInSession,

    #[error("Both seats are already taken")]
    SessionFull,

    /// 房间任务已退出
    #[error("Session room is closed")]
    RoomClosed,

    #[error("No rollback request is pending")]
    NoPendingRollback,

    #[error("No rollbacks remaining")]
    RollbackBudgetExhausted,

    #[error("A rollback request is already pending")]
    DuplicateRollbackRequest,

    #[error("No move of yours to roll back")]
    NoMoveToRollback,

    #[error("No draw offer is pending")]
    NoPendingDraw,

    #[error("A draw offer is already pending")]
    DuplicateDrawOffer,

    #[error(transparent)]
    Rule(#[from] RuleViolation),
}

impl SessionError {
    /// 对应的线上错误码
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::GameNotStarted => ErrorCode::GameNotStarted,
            SessionError::GameAlreadyEnded => ErrorCode::GameAlreadyEnded,
            SessionError::NotInSession | SessionError::RoomClosed => ErrorCode::NotInSession,
            SessionError::SessionFull => ErrorCode::SessionFull,
            SessionError::NoPendingRollback => ErrorCode::NoPendingRollback,
            SessionError::RollbackBudgetExhausted => ErrorCode::RollbackBudgetExhausted,
            SessionError::DuplicateRollbackRequest => ErrorCode::DuplicateRollbackRequest,
            SessionError::NoMoveToRollback => ErrorCode::NoMoveToRollback,
            SessionError::NoPendingDraw => ErrorCode::NoPendingDraw,
            SessionError::DuplicateDrawOffer => ErrorCode::DuplicateDrawOffer,
            SessionError::Rule(violation) => ErrorCode::from(*violation),
        }
    }
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
