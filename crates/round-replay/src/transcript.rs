//! Transcript files: one JSON step per line.
//!
//! ```text
//! {"push": {"t": "full", "d": {...}}}
//! {"wait_ms": 1500}
//! "connection_lost"
//! "suspend"
//! {"resume": {...game data...}}
//! {"move": "e2e4"}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use chess_round::{GameData, MessageError, ServerMessage};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("Failed to read transcript: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("line {line}: {source}")]
    ParseError {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {line}: {source}")]
    FrameError {
        line: usize,
        #[source]
        source: MessageError,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayStep {
    /// A raw socket frame.
    Push(Value),
    WaitMs(u64),
    ConnectionLost,
    Suspend,
    Resume(Box<GameData>),
    Move(String),
}

/// A step whose frame, if any, has been decoded.
#[derive(Debug)]
pub enum Step {
    Push(ServerMessage),
    WaitMs(u64),
    ConnectionLost,
    Suspend,
    Resume(Box<GameData>),
    Move(String),
}

pub fn parse(text: &str) -> Result<Vec<Step>, TranscriptError> {
    let mut steps = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }
        let step: ReplayStep =
            serde_json::from_str(raw).map_err(|source| TranscriptError::ParseError { line, source })?;
        steps.push(match step {
            ReplayStep::Push(frame) => {
                let frame = serde_json::from_value(frame)
                    .map_err(|source| TranscriptError::ParseError { line, source })?;
                let message = ServerMessage::from_frame(frame)
                    .map_err(|source| TranscriptError::FrameError { line, source })?;
                Step::Push(message)
            }
            ReplayStep::WaitMs(ms) => Step::WaitMs(ms),
            ReplayStep::ConnectionLost => Step::ConnectionLost,
            ReplayStep::Suspend => Step::Suspend,
            ReplayStep::Resume(data) => Step::Resume(data),
            ReplayStep::Move(uci) => Step::Move(uci),
        });
    }
    Ok(steps)
}

pub async fn load(path: &Path) -> Result<Vec<Step>, TranscriptError> {
    let text = tokio::fs::read_to_string(path).await?;
    parse(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_step_kind() {
        let text = r#"
# opening
{"push": {"t": "clock", "d": {"white": 60, "black": 59}}}
{"wait_ms": 250}
"connection_lost"
"suspend"
{"move": "e2e4"}
{"push": {"t": "n", "d": 1700000000000, "r": 50}}
"#;
        let steps = parse(text).unwrap();
        assert_eq!(steps.len(), 6);
        assert!(matches!(steps[0], Step::Push(ServerMessage::Clock(_))));
        assert!(matches!(steps[1], Step::WaitMs(250)));
        assert!(matches!(steps[2], Step::ConnectionLost));
        assert!(matches!(steps[3], Step::Suspend));
        assert!(matches!(&steps[4], Step::Move(uci) if uci == "e2e4"));
        assert!(matches!(steps[5], Step::Push(ServerMessage::Pong(_))));
    }

    #[test]
    fn reports_line_of_bad_step() {
        let text = "\"suspend\"\n{\"push\": {\"t\": \"clock\"}}\n";
        match parse(text) {
            Err(TranscriptError::FrameError { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {:?}", other),
        }
        match parse("{\"jump\": 1}") {
            Err(TranscriptError::ParseError { line, .. }) => assert_eq!(line, 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn bundled_demo_parses() {
        let steps = parse(include_str!("../../../demos/blitz.jsonl")).unwrap();
        assert!(matches!(&steps[0], Step::Push(ServerMessage::Full(data)) if data.steps.len() == 1));
        assert!(matches!(steps.last(), Some(Step::Push(ServerMessage::EndData(_)))));
    }

    #[tokio::test]
    async fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.jsonl");
        std::fs::write(&path, "{\"wait_ms\": 10}\n").unwrap();
        let steps = load(&path).await.unwrap();
        assert!(matches!(steps[..], [Step::WaitMs(10)]));
    }
}
