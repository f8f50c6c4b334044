//! 对局计时
//!
//! 双方各一个倒计时，对局进行且未暂停时恰好一方在走。
//! 所有操作显式传入当前时刻，由会话所在任务统一取时，便于在测试中控制时间。

use tokio::time::{Duration, Instant};

use protocol::{ClockReading, Color};

/// 双方倒计时
#[derive(Debug, Clone)]
pub struct TurnClock {
    /// 已结算的剩余时间（毫秒），按 `Color::index` 存放
    remaining_ms: [u64; 2],
    /// 当前走子方（计时器停止时为 None）
    running: Option<Color>,
    /// 当前计时段开始时刻（暂停时为 None）
    segment_start: Option<Instant>,
    /// 是否暂停
    paused: bool,
}

impl TurnClock {
    /// 创建计时器，双方时间相同，尚未开始
    pub fn new(initial_ms: u64) -> Self {
        Self {
            remaining_ms: [initial_ms; 2],
            running: None,
            segment_start: None,
            paused: false,
        }
    }

    /// 开始为 `color` 计时
    pub fn start(&mut self, color: Color, now: Instant) {
        self.running = Some(color);
        self.paused = false;
        self.segment_start = Some(now);
    }

    /// 把当前计时段的消耗计入剩余时间
    fn settle(&mut self, now: Instant) {
        if let (Some(color), Some(start)) = (self.running, self.segment_start) {
            let elapsed = now.saturating_duration_since(start).as_millis() as u64;
            let slot = &mut self.remaining_ms[color.index()];
            *slot = slot.saturating_sub(elapsed);
            self.segment_start = Some(now);
        }
    }

    /// 获取某方剩余时间（毫秒）
    pub fn remaining(&self, color: Color, now: Instant) -> u64 {
        let base = self.remaining_ms[color.index()];
        match (self.running, self.segment_start) {
            (Some(running), Some(start)) if running == color => {
                base.saturating_sub(now.saturating_duration_since(start).as_millis() as u64)
            }
            _ => base,
        }
    }

    /// 双方剩余时间
    pub fn reading(&self, now: Instant) -> ClockReading {
        ClockReading {
            red_ms: self.remaining(Color::Red, now),
            black_ms: self.remaining(Color::Black, now),
        }
    }

    /// 走子后切换：停止走子方，开始对方
    ///
    /// 暂停中切换时保持暂停，恢复后从对方开始走。
    pub fn switch(&mut self, now: Instant) {
        self.settle(now);
        if let Some(color) = self.running {
            self.running = Some(color.opponent());
        }
        if !self.paused {
            self.segment_start = Some(now);
        }
    }

    /// 暂停（断线时冻结当前值）
    pub fn pause(&mut self, now: Instant) {
        if !self.paused {
            self.settle(now);
            self.segment_start = None;
            self.paused = true;
        }
    }

    /// 恢复计时
    pub fn resume(&mut self, now: Instant) {
        if self.paused {
            self.paused = false;
            if self.running.is_some() {
                self.segment_start = Some(now);
            }
        }
    }

    /// 停止计时（对局结束）
    pub fn stop(&mut self, now: Instant) {
        self.settle(now);
        self.running = None;
        self.segment_start = None;
    }

    /// 恢复到之前的读数并从 `turn` 开始计时（悔棋使用），保留暂停状态
    pub fn restore(&mut self, reading: ClockReading, turn: Color, now: Instant) {
        self.remaining_ms = [reading.red_ms, reading.black_ms];
        self.running = Some(turn);
        self.segment_start = if self.paused { None } else { Some(now) };
    }

    /// 正在走的一方时间是否已用完
    pub fn expired(&self, now: Instant) -> Option<Color> {
        let color = self.running?;
        if self.paused {
            return None;
        }
        (self.remaining(color, now) == 0).then_some(color)
    }

    /// 正在走的一方用完时间的时刻
    pub fn deadline(&self) -> Option<Instant> {
        let color = self.running?;
        let start = self.segment_start?;
        Some(start + Duration::from_millis(self.remaining_ms[color.index()]))
    }

    pub fn running(&self) -> Option<Color> {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}
