//! 对局状态机
//!
//! `GameSession` 只做纯状态变换：所有时间相关操作显式传入当前时刻，
//! 不做任何 IO，也不持有连接。房间任务串行调用这里的指令接口。

use chrono::{DateTime, Utc};
use tokio::time::{Duration, Instant};
use tracing::{debug, info};

use protocol::{
    position_hash, Board, ChessError, ClockReading, Color, DrawReason, Fen, FenPosition,
    GameResult, MoveRecord, Piece, PieceType, PlayerId, Position, RuleViolation, RulesEngine,
    SessionId, SessionRecord, SessionSnapshot, WinReason, INITIAL_FEN, INITIAL_TIME_MS,
    NO_CAPTURE_PLY_LIMIT, RECORD_VERSION, REPETITION_THRESHOLD, ROLLBACK_BUDGET, ROLLBACK_TIMEOUT,
};

use crate::clock::TurnClock;
use crate::error::{SessionError, SessionResult};
use crate::rollback::{RollbackNegotiator, RollbackRequest};

/// 单局规则参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRules {
    pub initial_time_ms: u64,
    pub rollback_budget: u8,
    pub rollback_timeout: Duration,
    pub no_capture_ply_limit: u32,
    pub repetition_threshold: usize,
}

impl Default for SessionRules {
    fn default() -> Self {
        Self {
            initial_time_ms: INITIAL_TIME_MS,
            rollback_budget: ROLLBACK_BUDGET,
            rollback_timeout: ROLLBACK_TIMEOUT,
            no_capture_ply_limit: NO_CAPTURE_PLY_LIMIT,
            repetition_threshold: REPETITION_THRESHOLD,
        }
    }
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// 等待双方入座
    AwaitingStart,
    /// 对局中
    Active,
    /// 正常结束（将死、困毙、超时、认输、和棋等）
    Completed(GameResult),
    /// 断线超过宽限期
    Abandoned(GameResult),
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed(_) | SessionStatus::Abandoned(_))
    }

    pub fn result(&self) -> Option<GameResult> {
        match self {
            SessionStatus::Completed(result) | SessionStatus::Abandoned(result) => Some(*result),
            _ => None,
        }
    }
}

/// 走子前的完整状态，悔棋时整体恢复
#[derive(Debug, Clone)]
struct UndoSnapshot {
    board: Board,
    turn: Color,
    captured_len: usize,
    clocks: ClockReading,
    history_len: usize,
    no_capture_plies: u32,
    in_check: bool,
}

/// 局面历史项（用于重复局面判定）
#[derive(Debug, Clone, Copy)]
struct PositionEntry {
    hash: u64,
    /// 走出该局面的一方（初始局面为 None）
    mover: Option<Color>,
    gave_check: bool,
}

/// 走棋结果
#[derive(Debug, Clone)]
pub struct MoveOutcome {
    pub record: MoveRecord,
    /// 走后对方是否被将军
    pub is_check: bool,
    /// 被这步棋自动拒绝的悔棋请求
    pub cancelled_rollback: Option<RollbackRequest>,
    /// 这步棋导致对局结束
    pub result: Option<GameResult>,
}

/// 提和结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOfferOutcome {
    /// 提和已登记，等待对方应答
    Offered(Color),
    /// 对方此前已提和，双方同意
    Agreed(GameResult),
}

/// 悔棋应答结果
#[derive(Debug, Clone)]
pub struct RollbackResolution {
    pub request: RollbackRequest,
    /// 被撤销的那一步（拒绝时为 None）
    pub reverted: Option<MoveRecord>,
}

/// 一局对局
pub struct GameSession {
    id: SessionId,
    players: [Option<PlayerId>; 2],
    rules: SessionRules,
    status: SessionStatus,
    board: Board,
    turn: Color,
    in_check: bool,
    move_log: Vec<MoveRecord>,
    captured: Vec<Piece>,
    undo_stack: Vec<UndoSnapshot>,
    history: Vec<PositionEntry>,
    no_capture_plies: u32,
    clock: TurnClock,
    rollback: RollbackNegotiator,
    draw_offer: Option<Color>,
    initial_fen: String,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl GameSession {
    /// 标准开局
    pub fn new(id: impl Into<SessionId>, rules: SessionRules) -> Self {
        let position = FenPosition {
            board: Board::initial(),
            side_to_move: Color::Red,
            no_capture_plies: 0,
            round: 1,
        };
        Self::from_position(id.into(), position, INITIAL_FEN.to_string(), rules)
    }

    /// 撮合服务已确定双方座位
    pub fn with_players(
        id: impl Into<SessionId>,
        red: impl Into<PlayerId>,
        black: impl Into<PlayerId>,
        rules: SessionRules,
    ) -> Self {
        let mut session = Self::new(id, rules);
        session.players = [Some(red.into()), Some(black.into())];
        session
    }

    /// 从 FEN 局面开始（排局、测试）
    pub fn from_fen(
        id: impl Into<SessionId>,
        fen: &str,
        rules: SessionRules,
    ) -> Result<Self, ChessError> {
        let mut position = Fen::parse(fen)?;
        let normalized = Fen::to_string(&position);
        if normalized == INITIAL_FEN {
            // 标准开局使用固定棋子 ID
            position.board = Board::initial();
        }
        Ok(Self::from_position(id.into(), position, normalized, rules))
    }

    fn from_position(
        id: SessionId,
        position: FenPosition,
        initial_fen: String,
        rules: SessionRules,
    ) -> Self {
        let in_check = RulesEngine::is_in_check(&position.board, position.side_to_move);
        let history = vec![PositionEntry {
            hash: position_hash(&position.board, position.side_to_move),
            mover: None,
            gave_check: false,
        }];
        Self {
            id,
            players: [None, None],
            rules,
            status: SessionStatus::AwaitingStart,
            board: position.board,
            turn: position.side_to_move,
            in_check,
            move_log: Vec::new(),
            captured: Vec::new(),
            undo_stack: Vec::new(),
            history,
            no_capture_plies: position.no_capture_plies,
            clock: TurnClock::new(rules.initial_time_ms),
            rollback: RollbackNegotiator::new(rules.rollback_budget),
            draw_offer: None,
            initial_fen,
            started_at: None,
            ended_at: None,
        }
    }

    // ========================================================================
    // 座位与开局
    // ========================================================================

    /// 入座：已入座的玩家返回原座位，否则依次分配红、黑
    pub fn seat(&mut self, player_id: &str) -> SessionResult<Color> {
        if let Some(color) = self.color_of(player_id) {
            return Ok(color);
        }
        let color = Color::BOTH
            .into_iter()
            .find(|c| self.players[c.index()].is_none())
            .ok_or(SessionError::SessionFull)?;
        self.players[color.index()] = Some(player_id.to_string());
        debug!(session_id = %self.id, player_id, %color, "玩家入座");
        Ok(color)
    }

    /// 双方都已入座时开局，返回是否发生了开局
    pub fn start(&mut self, now: Instant) -> bool {
        if self.status != SessionStatus::AwaitingStart || !self.is_full() {
            return false;
        }
        self.status = SessionStatus::Active;
        self.clock.start(self.turn, now);
        self.started_at = Some(Utc::now());
        info!(session_id = %self.id, "对局开始");
        true
    }

    fn ensure_active(&self) -> SessionResult<()> {
        match self.status {
            SessionStatus::AwaitingStart => Err(SessionError::GameNotStarted),
            SessionStatus::Active => Ok(()),
            _ => Err(SessionError::GameAlreadyEnded),
        }
    }

    fn seated_color(&self, player_id: &str) -> SessionResult<Color> {
        self.color_of(player_id).ok_or(SessionError::NotInSession)
    }

    // ========================================================================
    // 走棋
    // ========================================================================

    /// 校验并执行走棋
    pub fn apply_move(
        &mut self,
        player_id: &str,
        from: Position,
        to: Position,
        now: Instant,
    ) -> SessionResult<MoveOutcome> {
        self.ensure_active()?;
        let mover = self.seated_color(player_id)?;
        if mover != self.turn {
            return Err(RuleViolation::NotYourTurn.into());
        }
        let piece = RulesEngine::validate_move(&self.board, mover, from, to)?;

        // 走子前保存快照
        self.undo_stack.push(UndoSnapshot {
            board: self.board.clone(),
            turn: self.turn,
            captured_len: self.captured.len(),
            clocks: self.clock.reading(now),
            history_len: self.history.len(),
            no_capture_plies: self.no_capture_plies,
            in_check: self.in_check,
        });
        let cancelled_rollback = self.rollback.cancel();
        self.draw_offer = None;

        let captured = self.board.move_piece(from, to);
        match captured {
            Some(victim) => {
                self.captured.push(victim);
                self.no_capture_plies = 0;
            }
            None => self.no_capture_plies += 1,
        }

        self.turn = mover.opponent();
        self.clock.switch(now);
        self.in_check = RulesEngine::is_in_check(&self.board, self.turn);

        let record = MoveRecord {
            move_number: self.move_log.len() as u32 + 1,
            from,
            to,
            piece_type: piece.piece_type,
            captured: captured.map(|p| p.piece_type),
            player_id: player_id.to_string(),
            is_check: self.in_check,
            timestamp: Utc::now(),
        };
        self.move_log.push(record.clone());
        self.history.push(PositionEntry {
            hash: position_hash(&self.board, self.turn),
            mover: Some(mover),
            gave_check: self.in_check,
        });

        debug!(
            session_id = %self.id,
            player_id,
            %mover,
            mv = %record.as_move(),
            check = self.in_check,
            "走棋"
        );

        let result = self.evaluate_after_move(mover, captured);
        if let Some(result) = result {
            self.finish(SessionStatus::Completed(result), now);
        }

        Ok(MoveOutcome {
            record,
            is_check: self.in_check,
            cancelled_rollback,
            result,
        })
    }

    /// 走子后的终局判定
    fn evaluate_after_move(&self, mover: Color, captured: Option<Piece>) -> Option<GameResult> {
        let defender = mover.opponent();

        if captured.is_some_and(|p| p.piece_type == PieceType::General) {
            return Some(GameResult::win(mover, WinReason::GeneralCapture));
        }
        if !RulesEngine::has_legal_moves(&self.board, defender) {
            let reason = if self.in_check {
                WinReason::Checkmate
            } else {
                WinReason::Stalemate
            };
            return Some(GameResult::win(mover, reason));
        }
        if let Some(result) = self.repetition_result() {
            return Some(result);
        }
        if self.no_capture_plies >= self.rules.no_capture_ply_limit {
            return Some(GameResult::Draw(DrawReason::MoveLimit));
        }
        None
    }

    /// 重复局面判定
    ///
    /// 当前局面出现次数达到阈值时，查看自其首次出现以来的所有着法：
    /// 恰有一方每步都在将军则该方判负（长将），否则判和。
    fn repetition_result(&self) -> Option<GameResult> {
        let current = self.history.last()?.hash;
        let occurrences = self.history.iter().filter(|e| e.hash == current).count();
        if occurrences < self.rules.repetition_threshold {
            return None;
        }

        let first = self.history.iter().position(|e| e.hash == current)?;
        let window = &self.history[first + 1..];
        let always_checking = |color: Color| {
            let mut moves = window.iter().filter(|e| e.mover == Some(color)).peekable();
            moves.peek().is_some() && moves.all(|e| e.gave_check)
        };

        match (always_checking(Color::Red), always_checking(Color::Black)) {
            (true, false) => Some(GameResult::win(Color::Black, WinReason::PerpetualCheck)),
            (false, true) => Some(GameResult::win(Color::Red, WinReason::PerpetualCheck)),
            _ => Some(GameResult::Draw(DrawReason::Repetition)),
        }
    }

    // ========================================================================
    // 悔棋
    // ========================================================================

    /// 请求撤销自己最近的一步
    pub fn request_rollback(
        &mut self,
        player_id: &str,
        now: Instant,
    ) -> SessionResult<RollbackRequest> {
        self.ensure_active()?;
        let requester = self.seated_color(player_id)?;
        // 最近一步必须是请求方走的
        let target = self
            .move_log
            .last()
            .filter(|_| self.turn == requester.opponent())
            .map(|record| record.move_number);
        let request = self
            .rollback
            .request(requester, target, now, self.rules.rollback_timeout)?;
        info!(
            session_id = %self.id,
            player_id,
            target = request.target_move_number,
            "请求悔棋"
        );
        Ok(request)
    }

    /// 对方应答悔棋请求，接受时立即撤销一步
    pub fn respond_rollback(
        &mut self,
        player_id: &str,
        accept: bool,
        now: Instant,
    ) -> SessionResult<RollbackResolution> {
        self.ensure_active()?;
        let responder = self.seated_color(player_id)?;
        let request = self.rollback.respond(responder, accept)?;

        let reverted = if accept { self.undo_last(now) } else { None };
        info!(
            session_id = %self.id,
            requester = %request.requester,
            accept,
            "悔棋应答"
        );
        Ok(RollbackResolution { request, reverted })
    }

    /// 悔棋超时自动拒绝；请求已被处理过时返回 None
    pub fn expire_rollback(&mut self, request_id: u64, now: Instant) -> Option<RollbackRequest> {
        let expired = self.rollback.expire(request_id, now)?;
        info!(session_id = %self.id, requester = %expired.requester, "悔棋请求超时");
        Some(expired)
    }

    /// 恢复最近一步之前的快照
    fn undo_last(&mut self, now: Instant) -> Option<MoveRecord> {
        let snapshot = self.undo_stack.pop()?;
        let record = self.move_log.pop();

        self.board = snapshot.board;
        self.turn = snapshot.turn;
        self.captured.truncate(snapshot.captured_len);
        self.history.truncate(snapshot.history_len);
        self.no_capture_plies = snapshot.no_capture_plies;
        self.in_check = snapshot.in_check;
        self.draw_offer = None;
        self.clock.restore(snapshot.clocks, snapshot.turn, now);
        record
    }

    // ========================================================================
    // 提和、认输、超时、弃局
    // ========================================================================

    /// 提和；对方已有待应答的提和时视为同意
    pub fn offer_draw(&mut self, player_id: &str, now: Instant) -> SessionResult<DrawOfferOutcome> {
        self.ensure_active()?;
        let color = self.seated_color(player_id)?;
        match self.draw_offer {
            Some(existing) if existing == color => Err(SessionError::DuplicateDrawOffer),
            Some(_) => {
                let result = GameResult::Draw(DrawReason::Agreement);
                self.finish(SessionStatus::Completed(result), now);
                Ok(DrawOfferOutcome::Agreed(result))
            }
            None => {
                self.draw_offer = Some(color);
                debug!(session_id = %self.id, player_id, "提和");
                Ok(DrawOfferOutcome::Offered(color))
            }
        }
    }

    /// 应答对方的提和；接受时返回对局结果
    pub fn respond_draw(
        &mut self,
        player_id: &str,
        accept: bool,
        now: Instant,
    ) -> SessionResult<Option<GameResult>> {
        self.ensure_active()?;
        let color = self.seated_color(player_id)?;
        if self.draw_offer != Some(color.opponent()) {
            return Err(SessionError::NoPendingDraw);
        }
        self.draw_offer = None;
        if !accept {
            return Ok(None);
        }
        let result = GameResult::Draw(DrawReason::Agreement);
        self.finish(SessionStatus::Completed(result), now);
        Ok(Some(result))
    }

    /// 认输
    pub fn resign(&mut self, player_id: &str, now: Instant) -> SessionResult<GameResult> {
        self.ensure_active()?;
        let color = self.seated_color(player_id)?;
        let result = GameResult::win(color.opponent(), WinReason::Resign);
        self.finish(SessionStatus::Completed(result), now);
        Ok(result)
    }

    /// 检查走子方是否超时
    pub fn tick(&mut self, now: Instant) -> Option<GameResult> {
        if self.status != SessionStatus::Active {
            return None;
        }
        let loser = self.clock.expired(now)?;
        let result = GameResult::win(loser.opponent(), WinReason::Timeout);
        self.finish(SessionStatus::Completed(result), now);
        Some(result)
    }

    /// 宽限期内未重连，判负；开局前只有双方座位已定时才判
    pub fn abandon(&mut self, color: Color, now: Instant) -> Option<GameResult> {
        if self.status.is_terminal() || !self.is_full() {
            return None;
        }
        let result = GameResult::win(color.opponent(), WinReason::Abandonment);
        self.finish(SessionStatus::Abandoned(result), now);
        Some(result)
    }

    pub fn pause_clock(&mut self, now: Instant) {
        self.clock.pause(now);
    }

    pub fn resume_clock(&mut self, now: Instant) {
        self.clock.resume(now);
    }

    fn finish(&mut self, status: SessionStatus, now: Instant) {
        self.status = status;
        self.clock.stop(now);
        self.rollback.cancel();
        self.draw_offer = None;
        self.ended_at = Some(Utc::now());
        info!(session_id = %self.id, ?status, "对局结束");
    }

    // ========================================================================
    // 查询
    // ========================================================================

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn turn(&self) -> Color {
        self.turn
    }

    /// 当前走子方是否被将军
    pub fn in_check(&self) -> bool {
        self.in_check
    }

    pub fn move_log(&self) -> &[MoveRecord] {
        &self.move_log
    }

    pub fn captured(&self) -> &[Piece] {
        &self.captured
    }

    pub fn player(&self, color: Color) -> Option<&PlayerId> {
        self.players[color.index()].as_ref()
    }

    pub fn color_of(&self, player_id: &str) -> Option<Color> {
        Color::BOTH
            .into_iter()
            .find(|c| self.players[c.index()].as_deref() == Some(player_id))
    }

    pub fn is_full(&self) -> bool {
        self.players.iter().all(Option::is_some)
    }

    pub fn rules(&self) -> &SessionRules {
        &self.rules
    }

    pub fn clock(&self) -> &TurnClock {
        &self.clock
    }

    pub fn clocks(&self, now: Instant) -> ClockReading {
        self.clock.reading(now)
    }

    pub fn rollback(&self) -> &RollbackNegotiator {
        &self.rollback
    }

    pub fn draw_offer(&self) -> Option<Color> {
        self.draw_offer
    }

    /// 胜方玩家 ID
    pub fn winner_id(&self) -> Option<PlayerId> {
        let winner = self.status.result()?.winner()?;
        self.player(winner).cloned()
    }

    /// 当前局面 FEN
    pub fn fen(&self) -> String {
        Fen::to_string(&FenPosition {
            board: self.board.clone(),
            side_to_move: self.turn,
            no_capture_plies: self.no_capture_plies,
            round: self.move_log.len() as u32 / 2 + 1,
        })
    }

    /// 完整快照
    pub fn snapshot(
        &self,
        for_color: Option<Color>,
        opponent_connected: bool,
        now: Instant,
    ) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            red_player: self.players[Color::Red.index()].clone(),
            black_player: self.players[Color::Black.index()].clone(),
            your_color: for_color,
            board: self.board.clone(),
            turn: self.turn,
            clocks: self.clock.reading(now),
            rollback_budgets: self.rollback.budgets(),
            in_check: self.in_check,
            move_count: self.move_log.len() as u32,
            last_move: self.move_log.last().cloned(),
            captured: self.captured.clone(),
            pending_rollback: self.rollback.pending().map(|r| r.requester),
            pending_draw: self.draw_offer,
            opponent_connected,
            result: self.status.result(),
        }
    }

    /// 终局后交给持久化的记录
    pub fn to_record(&self) -> Option<SessionRecord> {
        let result = self.status.result()?;
        let ended_at = self.ended_at?;
        Some(SessionRecord {
            version: RECORD_VERSION.to_string(),
            session_id: self.id.clone(),
            red_player: self.player(Color::Red)?.clone(),
            black_player: self.player(Color::Black)?.clone(),
            result,
            winner_id: self.winner_id(),
            initial_fen: self.initial_fen.clone(),
            final_fen: self.fen(),
            started_at: self.started_at.unwrap_or(ended_at),
            ended_at,
            moves: self.move_log.clone(),
        })
    }
}
