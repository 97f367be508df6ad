//! The `run` subcommand: a tracker fed from stdin lines.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use presence_core::{
    Collaborators, FilePresenceStore, InteractionEvent, InteractionHub, InteractionKind,
    JsonlAuditSink, PresenceConfig, PresenceError, PresenceTracker, Result, SharedLocation,
    SystemClock, TracingNotifier, TrackerParts,
};

const PRESENCE_FILE: &str = "presence.json";
const AUDIT_FILE: &str = "audit.jsonl";
const INITIAL_LOCATION: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Interaction(InteractionKind),
    Navigate(String),
    Stats,
    Quit,
}

/// Parses one stdin line. Blank lines are `Ok(None)`.
pub fn parse_command(line: &str) -> std::result::Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word {
        "nav" if rest.is_empty() => Err("nav requires a path".to_string()),
        "nav" => Ok(Some(Command::Navigate(rest.to_string()))),
        "stats" => Ok(Some(Command::Stats)),
        "quit" | "exit" => Ok(Some(Command::Quit)),
        other => InteractionKind::parse(other)
            .map(|kind| Some(Command::Interaction(kind)))
            .ok_or_else(|| format!("Unknown command: {other}")),
    }
}

pub fn default_state_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(PresenceError::HomeDirNotFound)?;
    Ok(home.join(".presence"))
}

fn io_error(context: &str) -> impl FnOnce(io::Error) -> PresenceError + '_ {
    move |source| PresenceError::Io {
        context: context.to_string(),
        source,
    }
}

pub fn run(config: PresenceConfig, state_dir: &Path) -> Result<()> {
    fs_err::create_dir_all(state_dir).map_err(io_error("create state directory"))?;

    let hub = Arc::new(InteractionHub::new());
    let location = Arc::new(SharedLocation::new(INITIAL_LOCATION));
    let tracker = PresenceTracker::new(
        config,
        TrackerParts {
            clock: Arc::new(SystemClock),
            interactions: hub.clone(),
            location: location.clone(),
            collaborators: Collaborators {
                status: Arc::new(FilePresenceStore::new(state_dir.join(PRESENCE_FILE))),
                audit: Arc::new(JsonlAuditSink::new(state_dir.join(AUDIT_FILE))),
                notifier: Arc::new(TracingNotifier),
            },
        },
    );
    tracker.initialize();
    tracing::info!(state_dir = %state_dir.display(), "presence-agent running");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line.map_err(io_error("read stdin"))?;
        match parse_command(&line) {
            Ok(None) => {}
            Ok(Some(Command::Interaction(kind))) => hub.emit(InteractionEvent::new(kind)),
            Ok(Some(Command::Navigate(path))) => location.set(path),
            Ok(Some(Command::Stats)) => {
                let stats = serde_json::to_string(&tracker.activity_stats()).map_err(|source| {
                    PresenceError::Json {
                        context: "encode stats".to_string(),
                        source,
                    }
                })?;
                writeln!(stdout, "{stats}")
                    .and_then(|()| stdout.flush())
                    .map_err(io_error("write stats"))?;
            }
            Ok(Some(Command::Quit)) => break,
            Err(message) => tracing::warn!(line = %line, "{message}"),
        }
    }

    tracker.destroy();
    tracker.flush_effects();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_interactions_navigation_and_control() {
        assert_eq!(
            parse_command("key"),
            Ok(Some(Command::Interaction(InteractionKind::KeyDown)))
        );
        assert_eq!(
            parse_command("  pointer "),
            Ok(Some(Command::Interaction(InteractionKind::PointerDown)))
        );
        assert_eq!(
            parse_command("nav /clients/42"),
            Ok(Some(Command::Navigate("/clients/42".to_string())))
        );
        assert_eq!(parse_command("stats"), Ok(Some(Command::Stats)));
        assert_eq!(parse_command("quit"), Ok(Some(Command::Quit)));
        assert_eq!(parse_command(""), Ok(None));
    }

    #[test]
    fn rejects_unknown_words_and_bare_nav() {
        assert!(parse_command("hover").is_err());
        assert!(parse_command("nav").is_err());
        assert!(parse_command("nav   ").is_err());
    }

    #[test]
    fn run_reports_unusable_state_dir_as_io_error() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let blocker = temp_dir.path().join("not-a-dir");
        fs_err::write(&blocker, "").expect("write blocker");

        let err = run(PresenceConfig::default(), &blocker.join("state")).expect_err("should fail");
        match err {
            PresenceError::Io { context, .. } => assert_eq!(context, "create state directory"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
