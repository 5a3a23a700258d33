//! Session persistence and forking.
//!
//! Saves are versioned JSON documents. Backward compatibility is handled
//! by per-field defaulting at decode time: every optional `GameState`
//! field carries a serde default (inactive combat, empty secrets, root
//! lineage, zeroed cursors), so documents written before a field existed
//! still load. A malformed document fails as a whole; a partial state is
//! never reconstructed.

use crate::state::GameState;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: this build reads up to {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Current save file version. Older versions load through field
/// defaulting; newer versions are rejected.
const SAVE_VERSION: u32 = 1;

fn default_version() -> u32 {
    1
}

/// A saved session with everything needed to resume play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSession {
    /// Save format version for compatibility checking.
    #[serde(default = "default_version")]
    pub version: u32,

    /// When the save was created (unix seconds).
    #[serde(default)]
    pub saved_at: String,

    /// The complete session state.
    pub state: GameState,

    /// Quick-access metadata, duplicated for peeking without a full load.
    #[serde(default)]
    pub metadata: SaveMetadata,
}

/// Metadata about a save file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveMetadata {
    #[serde(default)]
    pub session_name: String,

    #[serde(default)]
    pub turn_number: u64,

    #[serde(default)]
    pub pc_count: usize,

    #[serde(default)]
    pub in_combat: bool,

    /// Branch name when this save is a fork.
    #[serde(default)]
    pub branch: Option<String>,
}

impl SavedSession {
    /// Create a new save document from a state snapshot.
    pub fn new(state: GameState) -> Self {
        let metadata = SaveMetadata {
            session_name: state.session_name.clone(),
            turn_number: state.turn_number,
            pc_count: state.pc_ids().len(),
            in_combat: state.combat.active,
            branch: state.lineage.branch.clone(),
        };

        Self {
            version: SAVE_VERSION,
            saved_at: unix_now(),
            state,
            metadata,
        }
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        Self::from_json(&content)
    }

    /// Decode from a JSON string.
    pub fn from_json(content: &str) -> Result<Self, PersistError> {
        let saved: Self = serde_json::from_str(content)?;

        if saved.version > SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: saved.version,
            });
        }

        Ok(saved)
    }

    /// Read a save's metadata without decoding the full state.
    pub async fn peek_metadata(path: impl AsRef<Path>) -> Result<SaveMetadata, PersistError> {
        let content = fs::read_to_string(path).await?;

        #[derive(Deserialize)]
        struct Partial {
            #[serde(default = "default_version")]
            version: u32,
            #[serde(default)]
            metadata: SaveMetadata,
        }

        let partial: Partial = serde_json::from_str(&content)?;

        if partial.version > SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: partial.version,
            });
        }

        Ok(partial.metadata)
    }
}

/// Information about a save file.
#[derive(Debug, Clone)]
pub struct SaveInfo {
    pub path: String,
    pub metadata: SaveMetadata,
}

/// List all save files in a directory. Unreadable files are skipped.
pub async fn list_saves(dir: impl AsRef<Path>) -> Result<Vec<SaveInfo>, PersistError> {
    let mut saves = Vec::new();
    let dir_path = dir.as_ref();
    if !dir_path.exists() {
        fs::create_dir_all(dir_path).await?;
        return Ok(saves);
    }

    let mut entries = fs::read_dir(dir_path).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            if let Ok(metadata) = SavedSession::peek_metadata(&path).await {
                saves.push(SaveInfo {
                    path: path.to_string_lossy().to_string(),
                    metadata,
                });
            }
        }
    }

    saves.sort_by(|a, b| a.metadata.session_name.cmp(&b.metadata.session_name));
    Ok(saves)
}

/// Auto-save file path for a session name.
pub fn autosave_path(base_dir: impl AsRef<Path>, session_name: &str) -> std::path::PathBuf {
    let sanitized = session_name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>();
    base_dir.as_ref().join(format!("{sanitized}_autosave.json"))
}

/// Clone a state snapshot into an independently mutable branch.
///
/// The fork gets a fresh session id and lineage pointing back at the
/// parent session and the turn it branched from. Everything else is a
/// value copy, so later mutation of either timeline leaves the other
/// untouched.
pub fn fork_state(state: &GameState, branch_name: impl Into<String>) -> GameState {
    let mut fork = state.clone();
    fork.lineage.branch = Some(branch_name.into());
    fork.lineage.parent_session = Some(state.session_id);
    fork.lineage.forked_at_turn = Some(state.turn_number);
    fork.session_id = Uuid::new_v4();
    fork
}

/// Current timestamp as unix seconds.
fn unix_now() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    format!("{}", now.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CharacterSheet;

    fn sample_state() -> GameState {
        GameState::new("Epic Quest")
            .with_player(CharacterSheet::new("Mira", "Wizard", 18))
            .with_player(CharacterSheet::new("Bruga", "Barbarian", 30))
    }

    #[test]
    fn test_saved_session_metadata() {
        let saved = SavedSession::new(sample_state());
        assert_eq!(saved.version, SAVE_VERSION);
        assert_eq!(saved.metadata.session_name, "Epic Quest");
        assert_eq!(saved.metadata.pc_count, 2);
        assert!(!saved.metadata.in_combat);
        assert!(saved.metadata.branch.is_none());
    }

    #[test]
    fn test_round_trip_equality() {
        let saved = SavedSession::new(sample_state());
        let json = serde_json::to_string_pretty(&saved).unwrap();
        let loaded = SavedSession::from_json(&json).unwrap();
        assert_eq!(loaded, saved);
    }

    #[test]
    fn test_future_version_rejected() {
        let mut saved = SavedSession::new(sample_state());
        saved.version = SAVE_VERSION + 1;
        let json = serde_json::to_string(&saved).unwrap();
        assert!(matches!(
            SavedSession::from_json(&json),
            Err(PersistError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_malformed_document_is_a_load_failure() {
        assert!(SavedSession::from_json("{not json").is_err());
        assert!(SavedSession::from_json("{\"version\": 1}").is_err());
    }

    #[test]
    fn test_fork_is_independent() {
        let mut original = sample_state();
        original.turn_number = 7;

        let mut fork = fork_state(&original, "what-if");
        assert_ne!(fork.session_id, original.session_id);
        assert_eq!(fork.lineage.parent_session, Some(original.session_id));
        assert_eq!(fork.lineage.forked_at_turn, Some(7));
        assert_eq!(fork.lineage.branch.as_deref(), Some("what-if"));
        assert!(!fork.lineage.is_root());
        assert!(original.lineage.is_root());

        // Mutating the fork leaves the original untouched
        fork.character_sheets
            .get_mut("Mira")
            .unwrap()
            .hit_points
            .set_current(1);
        assert_eq!(
            original.sheet("Mira").unwrap().hit_points.current,
            18
        );
    }

    #[test]
    fn test_autosave_path() {
        let path = autosave_path("/saves", "My Campaign!");
        assert!(path.to_string_lossy().contains("My_Campaign__autosave"));
    }

    #[tokio::test]
    async fn test_save_and_load_file() {
        use tempfile::TempDir;

        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let save_path = temp_dir.path().join("session.json");

        let saved = SavedSession::new(sample_state());
        saved
            .save_json(&save_path)
            .await
            .expect("Save should succeed");

        let loaded = SavedSession::load_json(&save_path)
            .await
            .expect("Load should succeed");
        assert_eq!(loaded, saved);

        let metadata = SavedSession::peek_metadata(&save_path)
            .await
            .expect("Peek should succeed");
        assert_eq!(metadata.session_name, "Epic Quest");
    }

    #[tokio::test]
    async fn test_list_saves() {
        use tempfile::TempDir;

        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        for name in ["Alpha", "Beta"] {
            let state = GameState::new(name);
            let saved = SavedSession::new(state);
            let path = temp_dir.path().join(format!("{name}.json"));
            saved.save_json(&path).await.expect("Save should succeed");
        }

        let saves = list_saves(temp_dir.path()).await.expect("List should succeed");
        assert_eq!(saves.len(), 2);
        let names: Vec<_> = saves
            .iter()
            .map(|s| s.metadata.session_name.as_str())
            .collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);
    }
}
