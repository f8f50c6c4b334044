//! 悔棋协商
//!
//! 同一时刻最多一个待处理请求。请求方须在超时前得到对方应答，否则视为拒绝。
//! 只有被接受时才扣减请求方的悔棋次数。

use tokio::time::{Duration, Instant};

use protocol::{Color, RollbackBudgets};

use crate::error::{SessionError, SessionResult};

/// 悔棋请求状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

/// 悔棋请求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollbackRequest {
    /// 请求编号，用于丢弃过期的超时事件
    pub id: u64,
    pub requester: Color,
    /// 要撤销的那一步
    pub target_move_number: u32,
    pub status: RollbackStatus,
    pub deadline: Instant,
}

/// 悔棋协商器
#[derive(Debug, Clone)]
pub struct RollbackNegotiator {
    budgets: [u8; 2],
    pending: Option<RollbackRequest>,
    next_id: u64,
}

impl RollbackNegotiator {
    pub fn new(budget: u8) -> Self {
        Self {
            budgets: [budget; 2],
            pending: None,
            next_id: 1,
        }
    }

    /// 发起请求
    ///
    /// `target` 为请求方最近一步的步数，没有可撤销的步时为 None。
    pub fn request(
        &mut self,
        requester: Color,
        target: Option<u32>,
        now: Instant,
        timeout: Duration,
    ) -> SessionResult<RollbackRequest> {
        if self.budgets[requester.index()] == 0 {
            return Err(SessionError::RollbackBudgetExhausted);
        }
        if self.pending.is_some() {
            return Err(SessionError::DuplicateRollbackRequest);
        }
        let target_move_number = target.ok_or(SessionError::NoMoveToRollback)?;

        let request = RollbackRequest {
            id: self.next_id,
            requester,
            target_move_number,
            status: RollbackStatus::Pending,
            deadline: now + timeout,
        };
        self.next_id += 1;
        self.pending = Some(request);
        Ok(request)
    }

    /// 对方应答，返回已结束的请求
    pub fn respond(&mut self, responder: Color, accept: bool) -> SessionResult<RollbackRequest> {
        let mut request = match self.pending {
            Some(request) if request.requester != responder => request,
            _ => return Err(SessionError::NoPendingRollback),
        };
        self.pending = None;

        if accept {
            let slot = &mut self.budgets[request.requester.index()];
            *slot = slot.saturating_sub(1);
            request.status = RollbackStatus::Accepted;
        } else {
            request.status = RollbackStatus::Declined;
        }
        Ok(request)
    }

    /// 超时自动拒绝；编号不符或尚未到期时不做任何事
    pub fn expire(&mut self, id: u64, now: Instant) -> Option<RollbackRequest> {
        let mut request = self.pending.filter(|r| r.id == id && now >= r.deadline)?;
        self.pending = None;
        request.status = RollbackStatus::Expired;
        Some(request)
    }

    /// 撤销待处理请求（视同拒绝）
    pub fn cancel(&mut self) -> Option<RollbackRequest> {
        let mut request = self.pending.take()?;
        request.status = RollbackStatus::Declined;
        Some(request)
    }

    pub fn pending(&self) -> Option<&RollbackRequest> {
        self.pending.as_ref()
    }

    pub fn remaining(&self, color: Color) -> u8 {
        self.budgets[color.index()]
    }

    pub fn budgets(&self) -> RollbackBudgets {
        RollbackBudgets {
            red: self.budgets[Color::Red.index()],
            black: self.budgets[Color::Black.index()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(30);

    #[test]
    fn test_accept_spends_budget() {
        let now = Instant::now();
        let mut negotiator = RollbackNegotiator::new(3);
        let request = negotiator
            .request(Color::Red, Some(3), now, TIMEOUT)
            .unwrap();
        assert_eq!(request.target_move_number, 3);
        assert_eq!(request.deadline, now + TIMEOUT);

        let done = negotiator.respond(Color::Black, true).unwrap();
        assert_eq!(done.status, RollbackStatus::Accepted);
        assert_eq!(negotiator.budgets(), RollbackBudgets { red: 2, black: 3 });
        assert!(negotiator.pending().is_none());
    }

    #[test]
    fn test_decline_keeps_budget() {
        let now = Instant::now();
        let mut negotiator = RollbackNegotiator::new(1);
        negotiator.request(Color::Black, Some(2), now, TIMEOUT).unwrap();
        let done = negotiator.respond(Color::Red, false).unwrap();
        assert_eq!(done.status, RollbackStatus::Declined);
        assert_eq!(negotiator.remaining(Color::Black), 1);
    }

    #[test]
    fn test_request_rejections() {
        let now = Instant::now();
        let mut negotiator = RollbackNegotiator::new(0);
        assert_eq!(
            negotiator.request(Color::Red, Some(1), now, TIMEOUT),
            Err(SessionError::RollbackBudgetExhausted)
        );

        let mut negotiator = RollbackNegotiator::new(3);
        assert_eq!(
            negotiator.request(Color::Red, None, now, TIMEOUT),
            Err(SessionError::NoMoveToRollback)
        );
        negotiator.request(Color::Red, Some(1), now, TIMEOUT).unwrap();
        assert_eq!(
            negotiator.request(Color::Black, Some(2), now, TIMEOUT),
            Err(SessionError::DuplicateRollbackRequest)
        );
    }

    #[test]
    fn test_requester_cannot_answer_own_request() {
        let now = Instant::now();
        let mut negotiator = RollbackNegotiator::new(3);
        assert_eq!(
            negotiator.respond(Color::Black, true),
            Err(SessionError::NoPendingRollback)
        );
        negotiator.request(Color::Red, Some(1), now, TIMEOUT).unwrap();
        assert_eq!(
            negotiator.respond(Color::Red, true),
            Err(SessionError::NoPendingRollback)
        );
        assert!(negotiator.pending().is_some());
    }

    #[test]
    fn test_expire_checks_id_and_deadline() {
        let now = Instant::now();
        let mut negotiator = RollbackNegotiator::new(3);
        let request = negotiator.request(Color::Red, Some(1), now, TIMEOUT).unwrap();

        assert!(negotiator.expire(request.id + 1, now + TIMEOUT).is_none());
        assert!(negotiator.expire(request.id, now + Duration::from_secs(29)).is_none());

        let expired = negotiator.expire(request.id, now + TIMEOUT).unwrap();
        assert_eq!(expired.status, RollbackStatus::Expired);
        assert_eq!(negotiator.remaining(Color::Red), 3);
        assert!(negotiator.pending().is_none());
    }
}
