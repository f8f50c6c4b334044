//! 对局归档
//!
//! 终局记录经通道送到归档写入任务，以 JSON 文件保存在数据目录下。

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use protocol::{GameResult, SessionRecord};

/// 文件归档
#[derive(Debug, Clone)]
pub struct FileArchive {
    dir: PathBuf,
}

/// 归档列表项
#[derive(Debug, Clone)]
pub struct ArchivedSession {
    /// 文件名
    pub name: String,
    pub session_id: String,
    pub red_player: String,
    pub black_player: String,
    pub result: GameResult,
    pub ended_at: DateTime<Utc>,
    pub move_count: usize,
}

impl FileArchive {
    /// 创建归档，未指定目录时使用 `<data_dir>/xiangqi/archive`
    pub fn new(dir: Option<PathBuf>) -> Result<Self> {
        let dir = match dir {
            Some(dir) => dir,
            None => default_archive_directory()?,
        };
        if !dir.exists() {
            fs::create_dir_all(&dir).with_context(|| format!("无法创建归档目录: {:?}", dir))?;
        }
        Ok(Self { dir })
    }

    /// 写入一局记录，返回文件名
    pub fn save(&self, record: &SessionRecord) -> Result<String> {
        let filename = generate_filename(record);
        let filepath = self.dir.join(&filename);

        let json_content = record.to_json().context("序列化对局记录失败")?;
        fs::write(&filepath, json_content)
            .with_context(|| format!("写入文件失败: {:?}", filepath))?;
        Ok(filename)
    }

    /// 读取一局记录
    pub fn load(&self, name: &str) -> Result<SessionRecord> {
        let filepath = self.dir.join(name);
        if !filepath.exists() {
            anyhow::bail!("归档文件不存在: {}", name);
        }
        let content = fs::read_to_string(&filepath)
            .with_context(|| format!("读取文件失败: {:?}", filepath))?;
        SessionRecord::from_json(&content).context("解析对局记录失败")
    }

    /// 列出全部归档，最近结束的在前；无法解析的文件跳过
    pub fn list(&self) -> Result<Vec<ArchivedSession>> {
        let mut sessions = Vec::new();
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("读取归档目录失败: {:?}", self.dir))?;

        for entry in entries {
            let path = entry.context("读取目录项失败")?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(record) = self.load(name) {
                sessions.push(ArchivedSession {
                    name: name.to_string(),
                    session_id: record.session_id,
                    red_player: record.red_player,
                    black_player: record.black_player,
                    result: record.result,
                    ended_at: record.ended_at,
                    move_count: record.moves.len(),
                });
            }
        }

        sessions.sort_by(|a, b| b.ended_at.cmp(&a.ended_at));
        Ok(sessions)
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// 启动写入任务，通道关闭后退出
    pub fn spawn_writer(self, mut rx: mpsc::UnboundedReceiver<SessionRecord>) -> JoinHandle<()> {
        tokio::task::spawn_blocking(move || {
            while let Some(record) = rx.blocking_recv() {
                match self.save(&record) {
                    Ok(name) => info!(session_id = %record.session_id, file = %name, "对局已归档"),
                    Err(e) => error!(session_id = %record.session_id, "归档失败: {e:#}"),
                }
            }
        })
    }
}

fn default_archive_directory() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().context("无法获取应用数据目录")?;
    Ok(data_dir.join("xiangqi").join("archive"))
}

/// 生成文件名
fn generate_filename(record: &SessionRecord) -> String {
    format!(
        "{}_{}_{}vs{}.json",
        record.ended_at.format("%Y%m%d_%H%M%S"),
        sanitize_filename(&record.session_id),
        sanitize_filename(&record.red_player),
        sanitize_filename(&record.black_player)
    )
}

/// 清理文件名中的特殊字符
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '.' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{GameSession, SessionRules};
    use protocol::{Fen, WinReason};
    use tempfile::TempDir;
    use tokio::time::Instant;

    fn create_test_archive() -> (FileArchive, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let archive = FileArchive::new(Some(temp_dir.path().to_path_buf())).unwrap();
        (archive, temp_dir)
    }

    fn finished_record(session_id: &str, moves: &[&str]) -> SessionRecord {
        let now = Instant::now();
        let mut session =
            GameSession::with_players(session_id, "张三", "李四", SessionRules::default());
        session.start(now);
        for (i, notation) in moves.iter().enumerate() {
            let player = if i % 2 == 0 { "张三" } else { "李四" };
            let from = notation[..2].parse().unwrap();
            let to = notation[2..].parse().unwrap();
            session.apply_move(player, from, to, now).unwrap();
        }
        session.resign("李四", now).unwrap();
        session.to_record().unwrap()
    }

    #[test]
    fn test_save_and_load() {
        let (archive, _temp_dir) = create_test_archive();
        let record = finished_record("s-1", &["h2e2", "h9g7", "e2e6"]);

        let name = archive.save(&record).unwrap();
        assert!(name.contains("s-1_张三vs李四"));
        assert!(name.ends_with(".json"));

        let loaded = archive.load(&name).unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.result, GameResult::RedWin(WinReason::Resign));
        assert!(archive.load("missing.json").is_err());
    }

    #[test]
    fn test_loaded_record_replays() {
        let (archive, _temp_dir) = create_test_archive();
        let record = finished_record("s-2", &["h2e2", "h9g7", "e2e6", "b9c7"]);
        let name = archive.save(&record).unwrap();

        let loaded = archive.load(&name).unwrap();
        let board = loaded.replay().unwrap();
        let final_board = Fen::parse(&loaded.final_fen).unwrap().board;
        assert_eq!(Fen::board_to_string(&board), Fen::board_to_string(&final_board));
    }

    #[test]
    fn test_list_skips_garbage() {
        let (archive, temp_dir) = create_test_archive();
        archive.save(&finished_record("s-1", &["b0c2"])).unwrap();
        archive.save(&finished_record("s-2", &["b0c2", "b9c7"])).unwrap();
        fs::write(temp_dir.path().join("broken.json"), "{ not json").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "hello").unwrap();

        let sessions = archive.list().unwrap();
        assert_eq!(sessions.len(), 2);
        for pair in sessions.windows(2) {
            assert!(pair[0].ended_at >= pair[1].ended_at);
        }
        assert!(sessions.iter().any(|s| s.session_id == "s-2" && s.move_count == 2));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("正常名称"), "正常名称");
        assert_eq!(sanitize_filename("包含/特殊\\字符"), "包含_特殊_字符");
        assert_eq!(sanitize_filename("../etc"), "___etc");
    }

    #[tokio::test]
    async fn test_writer_task() {
        let (archive, _temp_dir) = create_test_archive();
        let reader = archive.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = archive.spawn_writer(rx);

        tx.send(finished_record("s-3", &["b0c2"])).unwrap();
        drop(tx);
        writer.await.unwrap();

        let sessions = reader.list().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, "s-3");
    }
}
