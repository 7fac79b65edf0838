use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Local;
use tracing::warn;

use crate::config::LoggingConfig;

/// Set up tracing-subscriber to write `concept.log` into the log directory.
/// Returns the directory, or None when logging is disabled or unavailable.
pub fn init_tracing(config: &LoggingConfig) -> Option<PathBuf> {
    if !config.enabled {
        return None;
    }
    let dir = config.log_directory()?;
    fs::create_dir_all(&dir).ok()?;

    let level = tracing::Level::from_str(&config.level).unwrap_or(tracing::Level::INFO);
    let file_appender = tracing_appender::rolling::never(&dir, "concept.log");
    let subscriber = tracing_subscriber::fmt()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
    Some(dir)
}

/// Plain-text transcript of one concept session, one file per session.
#[derive(Debug, Clone)]
pub struct SessionLog {
    path: PathBuf,
}

impl SessionLog {
    /// Create `{slug}_{timestamp}.txt` in `dir` and write the header.
    pub fn create(dir: &Path, concept_name: &str) -> Option<Self> {
        fs::create_dir_all(dir).ok()?;

        let slug = slugify(concept_name);
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
        let path = dir.join(format!("{slug}_{timestamp}.txt"));

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&path)
            .ok()?;

        let header = format!(
            "=== Game Concept Builder - Session Log ===\nConcept: {}\nDate: {}\n==========================================\n\n",
            if concept_name.trim().is_empty() { "Untitled" } else { concept_name.trim() },
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        file.write_all(header.as_bytes()).ok()?;

        Some(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a user+assistant pair. Failures are logged and otherwise ignored.
    pub fn log_exchange(&self, user_msg: &str, assistant_msg: &str) {
        let mut file = match OpenOptions::new().append(true).open(&self.path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Session log {} unavailable: {e}", self.path.display());
                return;
            }
        };

        let now = Local::now().format("%H:%M:%S");
        let entry = format!("[{now}] You:\n{user_msg}\n\n[{now}] Designer:\n{assistant_msg}\n\n");

        if let Err(e) = file.write_all(entry.as_bytes()) {
            warn!("Failed to append to session log: {e}");
        }
    }
}

fn slugify(name: &str) -> String {
    let slug = name
        .trim()
        .replace(' ', "-")
        .replace(|c: char| !c.is_alphanumeric() && c != '-', "");
    if slug.is_empty() {
        "Untitled".into()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_keeps_alphanumerics_and_dashes() {
        assert_eq!(slugify("Star Farm: Redux!"), "Star-Farm-Redux");
        assert_eq!(slugify("  ???  "), "Untitled");
    }

    #[test]
    fn session_log_writes_header_and_exchanges() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLog::create(dir.path(), "Dungeon Crawl").unwrap();
        let name = log.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("Dungeon-Crawl_"));
        assert!(name.ends_with(".txt"));

        log.log_exchange("Make an RPG", "Sounds fun.");
        let contents = fs::read_to_string(log.path()).unwrap();
        assert!(contents.starts_with("=== Game Concept Builder - Session Log ==="));
        assert!(contents.contains("Concept: Dungeon Crawl"));
        assert!(contents.contains("You:\nMake an RPG\n"));
        assert!(contents.contains("Designer:\nSounds fun.\n"));
    }

    #[test]
    fn disabled_logging_skips_tracing_setup() {
        let config = LoggingConfig {
            enabled: false,
            directory: None,
            level: "debug".into(),
        };
        assert_eq!(init_tracing(&config), None);
    }
}
