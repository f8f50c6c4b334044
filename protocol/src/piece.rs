//! 棋子与位置定义

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{BOARD_HEIGHT, BOARD_WIDTH};
use crate::error::ChessError;

/// 棋子类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceType {
    /// 将/帅
    General,
    /// 士/仕
    Advisor,
    /// 象/相
    Elephant,
    /// 马/傌
    Horse,
    /// 车/俥
    Chariot,
    /// 炮/砲
    Cannon,
    /// 兵/卒
    Soldier,
}

impl PieceType {
    /// 全部七种棋子
    pub const ALL: [PieceType; 7] = [
        PieceType::General,
        PieceType::Advisor,
        PieceType::Elephant,
        PieceType::Horse,
        PieceType::Chariot,
        PieceType::Cannon,
        PieceType::Soldier,
    ];

    /// 连续索引（用于 Zobrist 表）
    pub fn index(self) -> usize {
        match self {
            PieceType::General => 0,
            PieceType::Advisor => 1,
            PieceType::Elephant => 2,
            PieceType::Horse => 3,
            PieceType::Chariot => 4,
            PieceType::Cannon => 5,
            PieceType::Soldier => 6,
        }
    }

    /// 获取 FEN 字符（红方大写，黑方小写）
    pub fn to_fen_char(self, color: Color) -> char {
        let c = match self {
            PieceType::General => 'k',
            PieceType::Advisor => 'a',
            PieceType::Elephant => 'b',
            PieceType::Horse => 'n',
            PieceType::Chariot => 'r',
            PieceType::Cannon => 'c',
            PieceType::Soldier => 'p',
        };
        match color {
            Color::Red => c.to_ascii_uppercase(),
            Color::Black => c,
        }
    }

    /// 从 FEN 字符解析，兼容 e/h 写法
    pub fn from_fen_char(c: char) -> Option<(PieceType, Color)> {
        let color = if c.is_ascii_uppercase() {
            Color::Red
        } else {
            Color::Black
        };
        let piece_type = match c.to_ascii_lowercase() {
            'k' => PieceType::General,
            'a' => PieceType::Advisor,
            'b' | 'e' => PieceType::Elephant,
            'n' | 'h' => PieceType::Horse,
            'r' => PieceType::Chariot,
            'c' => PieceType::Cannon,
            'p' => PieceType::Soldier,
            _ => return None,
        };
        Some((piece_type, color))
    }

    /// 小写名称（日志、棋谱使用）
    pub fn name(self) -> &'static str {
        match self {
            PieceType::General => "general",
            PieceType::Advisor => "advisor",
            PieceType::Elephant => "elephant",
            PieceType::Horse => "horse",
            PieceType::Chariot => "chariot",
            PieceType::Cannon => "cannon",
            PieceType::Soldier => "soldier",
        }
    }
}

impl fmt::Display for PieceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 阵营
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    /// 红方（先手，在下方 rank 0-4）
    Red,
    /// 黑方（后手，在上方 rank 5-9）
    Black,
}

impl Color {
    /// 双方
    pub const BOTH: [Color; 2] = [Color::Red, Color::Black];

    /// 获取对方阵营
    pub fn opponent(self) -> Color {
        match self {
            Color::Red => Color::Black,
            Color::Black => Color::Red,
        }
    }

    /// 数组索引
    pub fn index(self) -> usize {
        match self {
            Color::Red => 0,
            Color::Black => 1,
        }
    }

    /// 兵卒前进方向（rank 增量）
    pub fn forward(self) -> i8 {
        match self {
            Color::Red => 1,
            Color::Black => -1,
        }
    }

    /// 获取 FEN 字符
    pub fn to_fen_char(self) -> char {
        match self {
            Color::Red => 'r',
            Color::Black => 'b',
        }
    }

    /// 从 FEN 字符解析（兼容 w 表示红方）
    pub fn from_fen_char(c: char) -> Option<Color> {
        match c {
            'w' | 'W' | 'r' | 'R' => Some(Color::Red),
            'b' | 'B' => Some(Color::Black),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Red => f.write_str("red"),
            Color::Black => f.write_str("black"),
        }
    }
}

/// 棋子身份，整局不变（被吃后仍可在吃子列表中引用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PieceId(pub u8);

impl PieceId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// 棋子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Piece {
    pub id: PieceId,
    pub piece_type: PieceType,
    pub color: Color,
    pub position: Position,
}

impl Piece {
    /// 创建新棋子
    pub fn new(id: PieceId, piece_type: PieceType, color: Color, position: Position) -> Self {
        Self {
            id,
            piece_type,
            color,
            position,
        }
    }

    /// 获取棋子显示的汉字
    pub fn display_char(&self) -> char {
        match (self.piece_type, self.color) {
            (PieceType::General, Color::Red) => '帥',
            (PieceType::General, Color::Black) => '將',
            (PieceType::Advisor, Color::Red) => '仕',
            (PieceType::Advisor, Color::Black) => '士',
            (PieceType::Elephant, Color::Red) => '相',
            (PieceType::Elephant, Color::Black) => '象',
            (PieceType::Horse, Color::Red) => '傌',
            (PieceType::Horse, Color::Black) => '馬',
            (PieceType::Chariot, Color::Red) => '俥',
            (PieceType::Chariot, Color::Black) => '車',
            (PieceType::Cannon, Color::Red) => '炮',
            (PieceType::Cannon, Color::Black) => '砲',
            (PieceType::Soldier, Color::Red) => '兵',
            (PieceType::Soldier, Color::Black) => '卒',
        }
    }

    /// 获取 FEN 字符
    pub fn to_fen_char(&self) -> char {
        self.piece_type.to_fen_char(self.color)
    }
}

/// 棋盘位置，边界处使用 `e0` 形式（列 a-i + 行 0-9）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Position {
    /// 列 (0-8)
    pub file: u8,
    /// 行 (0-9)
    pub rank: u8,
}

impl Position {
    /// 创建新位置
    pub fn new(file: u8, rank: u8) -> Option<Self> {
        if (file as usize) < BOARD_WIDTH && (rank as usize) < BOARD_HEIGHT {
            Some(Self { file, rank })
        } else {
            None
        }
    }

    /// 创建新位置（不检查边界，内部使用）
    pub const fn new_unchecked(file: u8, rank: u8) -> Self {
        Self { file, rank }
    }

    /// 检查位置是否在棋盘内
    pub fn in_bounds(&self) -> bool {
        (self.file as usize) < BOARD_WIDTH && (self.rank as usize) < BOARD_HEIGHT
    }

    /// 是否在指定阵营的本方半场
    pub fn is_own_side(&self, color: Color) -> bool {
        match color {
            Color::Red => self.rank <= 4,
            Color::Black => self.rank >= 5,
        }
    }

    /// 对指定阵营而言是否已过河
    pub fn crossed_river(&self, color: Color) -> bool {
        !self.is_own_side(color)
    }

    /// 检查位置是否在九宫格内
    pub fn in_palace(&self, color: Color) -> bool {
        let in_file = (3..=5).contains(&self.file);
        let in_rank = match color {
            Color::Red => self.rank <= 2,
            Color::Black => self.rank >= 7,
        };
        in_file && in_rank
    }

    /// 获取偏移后的位置
    pub fn offset(&self, df: i8, dr: i8) -> Option<Position> {
        let file = self.file as i8 + df;
        let rank = self.rank as i8 + dr;
        if file < 0 || rank < 0 {
            return None;
        }
        Position::new(file as u8, rank as u8)
    }

    /// 转换为数组索引
    pub fn index(&self) -> usize {
        self.rank as usize * BOARD_WIDTH + self.file as usize
    }

    /// 从数组索引转换
    pub fn from_index(index: usize) -> Option<Self> {
        if index < BOARD_WIDTH * BOARD_HEIGHT {
            Some(Position {
                file: (index % BOARD_WIDTH) as u8,
                rank: (index / BOARD_WIDTH) as u8,
            })
        } else {
            None
        }
    }

    /// 全部 90 个位置，按索引顺序
    pub fn all() -> impl Iterator<Item = Position> {
        (0..BOARD_WIDTH * BOARD_HEIGHT).filter_map(Position::from_index)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", (b'a' + self.file) as char, self.rank)
    }
}

impl FromStr for Position {
    type Err = ChessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ChessError::InvalidNotation {
            notation: s.to_string(),
        };
        let mut chars = s.chars();
        let (Some(f), Some(r), None) = (chars.next(), chars.next(), chars.next()) else {
            return Err(invalid());
        };
        if !f.is_ascii_lowercase() {
            return Err(invalid());
        }
        let file = (f as u8).wrapping_sub(b'a');
        let rank = r.to_digit(10).ok_or_else(invalid)? as u8;
        Position::new(file, rank).ok_or_else(invalid)
    }
}

impl From<Position> for String {
    fn from(pos: Position) -> Self {
        pos.to_string()
    }
}

impl TryFrom<String> for Position {
    type Error = ChessError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piece_display_char() {
        let pos = Position::new_unchecked(4, 0);
        let red_general = Piece::new(PieceId(0), PieceType::General, Color::Red, pos);
        assert_eq!(red_general.display_char(), '帥');

        let black_soldier = Piece::new(PieceId(1), PieceType::Soldier, Color::Black, pos);
        assert_eq!(black_soldier.display_char(), '卒');
    }

    #[test]
    fn test_fen_char() {
        assert_eq!(PieceType::General.to_fen_char(Color::Red), 'K');
        assert_eq!(PieceType::Horse.to_fen_char(Color::Black), 'n');
        assert_eq!(
            PieceType::from_fen_char('R'),
            Some((PieceType::Chariot, Color::Red))
        );
        assert_eq!(
            PieceType::from_fen_char('h'),
            Some((PieceType::Horse, Color::Black))
        );
        assert_eq!(PieceType::from_fen_char('x'), None);
    }

    #[test]
    fn test_position_valid() {
        assert!(Position::new(0, 0).is_some());
        assert!(Position::new(8, 9).is_some());
        assert!(Position::new(9, 0).is_none());
        assert!(Position::new(0, 10).is_none());
        assert!(Position::new_unchecked(0, 0).offset(-1, 0).is_none());
    }

    #[test]
    fn test_position_palace() {
        assert!(Position::new_unchecked(4, 0).in_palace(Color::Red));
        assert!(Position::new_unchecked(3, 2).in_palace(Color::Red));
        assert!(!Position::new_unchecked(4, 3).in_palace(Color::Red));
        assert!(!Position::new_unchecked(2, 1).in_palace(Color::Red));

        assert!(Position::new_unchecked(4, 9).in_palace(Color::Black));
        assert!(Position::new_unchecked(5, 7).in_palace(Color::Black));
        assert!(!Position::new_unchecked(4, 6).in_palace(Color::Black));
    }

    #[test]
    fn test_river() {
        assert!(!Position::new_unchecked(0, 4).crossed_river(Color::Red));
        assert!(Position::new_unchecked(0, 5).crossed_river(Color::Red));
        assert!(Position::new_unchecked(0, 4).crossed_river(Color::Black));
        assert!(!Position::new_unchecked(0, 5).crossed_river(Color::Black));
    }

    #[test]
    fn test_notation() {
        assert_eq!(Position::new_unchecked(4, 0).to_string(), "e0");
        assert_eq!(Position::new_unchecked(8, 9).to_string(), "i9");
        assert_eq!("b2".parse::<Position>(), Ok(Position::new_unchecked(1, 2)));
        assert!("j0".parse::<Position>().is_err());
        assert!("e10".parse::<Position>().is_err());
        assert!("E0".parse::<Position>().is_err());
        assert!("".parse::<Position>().is_err());
    }

    #[test]
    fn test_position_serializes_as_notation() {
        let json = serde_json::to_string(&Position::new_unchecked(2, 7)).unwrap();
        assert_eq!(json, "\"c7\"");
        let back: Position = serde_json::from_str("\"h9\"").unwrap();
        assert_eq!(back, Position::new_unchecked(7, 9));
        assert!(serde_json::from_str::<Position>("\"z9\"").is_err());
    }

    #[test]
    fn test_color_opponent() {
        assert_eq!(Color::Red.opponent(), Color::Black);
        assert_eq!(Color::Black.opponent(), Color::Red);
        assert_eq!(Color::Red.forward(), 1);
        assert_eq!(Color::Black.forward(), -1);
    }
}
