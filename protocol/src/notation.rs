//! 坐标记谱
//!
//! 位置写作 `e0`（列 a-i + 行 0-9），走法写作起点接终点，如 `h2e2`。

use std::fmt;
use std::str::FromStr;

use crate::error::ChessError;
use crate::rules::Move;

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)
    }
}

impl FromStr for Move {
    type Err = ChessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 4 || !s.is_ascii() {
            return Err(ChessError::InvalidNotation {
                notation: s.to_string(),
            });
        }
        let (from, to) = s.split_at(2);
        Ok(Move::new(from.parse()?, to.parse()?))
    }
}

/// 把一串以空白分隔的走法解析出来（测试和回放常用）
pub fn parse_moves(line: &str) -> Result<Vec<Move>, ChessError> {
    line.split_whitespace().map(str::parse).collect()
}
