//! Canonical session state.
//!
//! Everything here is structure plus invariants. Mutation happens by
//! replacement: transition code clones the current state, patches the
//! clone, and hands the new value back. Nothing outside this crate ever
//! edits a live `GameState` in place.

use crate::combat::CombatState;
use crate::secrets::Whisper;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// The director's fixed agent identifier.
pub const DIRECTOR_ID: &str = "director";

/// Identity of an agent participating in the session.
///
/// Three shapes exist: the single director (`director`), player characters
/// (`pc:<slug>`), and combat-only NPC routing slots (`director:<npc_key>`)
/// which route an NPC's initiative turn to the director agent. NPC slots
/// never appear in the exploration turn queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn director() -> Self {
        Self(DIRECTOR_ID.to_string())
    }

    /// The agent identifier for a player character, derived from the
    /// character's display name.
    pub fn pc(name: &str) -> Self {
        Self(format!("pc:{}", slug(name)))
    }

    /// The routing key for an NPC's combat turn.
    pub fn npc_slot(npc_key: &str) -> Self {
        Self(format!("{DIRECTOR_ID}:{npc_key}"))
    }

    /// Wrap a raw identifier string as-is.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn is_director(&self) -> bool {
        self.0 == DIRECTOR_ID
    }

    pub fn is_pc(&self) -> bool {
        self.0.starts_with("pc:")
    }

    /// The NPC key if this is an NPC routing slot.
    pub fn as_npc_key(&self) -> Option<&str> {
        self.0
            .strip_prefix(DIRECTOR_ID)
            .and_then(|rest| rest.strip_prefix(':'))
            .filter(|key| !key.is_empty())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lowercase a name into a stable key: alphanumerics kept, runs of
/// anything else collapse to a single underscore.
pub(crate) fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = true;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Kind tag on a ground-truth log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogKind {
    Narrative,
    DiceRoll,
    SecretReveal,
    SheetChange,
}

/// One entry in the append-only narrative log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub turn: u64,
    pub kind: LogKind,
    pub speaker: String,
    pub content: String,
}

impl LogEntry {
    pub fn new(
        turn: u64,
        kind: LogKind,
        speaker: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            turn,
            kind,
            speaker: speaker.into(),
            content: content.into(),
        }
    }
}

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

impl AbilityScores {
    pub fn new(str: u8, dex: u8, con: u8, int: u8, wis: u8, cha: u8) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }

    /// Standard array: 15, 14, 13, 12, 10, 8.
    pub fn standard_array() -> Self {
        Self::new(15, 14, 13, 12, 10, 8)
    }

    /// Modifier for a score: (score - 10) / 2, rounded down.
    pub fn modifier_of(score: u8) -> i32 {
        (score as i32 - 10).div_euclid(2)
    }

    pub fn dexterity_modifier(&self) -> i32 {
        Self::modifier_of(self.dexterity)
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(10, 10, 10, 10, 10, 10)
    }
}

/// Hit point tracking. `current` stays in `[0, maximum]`; the setters
/// clamp so the invariant holds no matter what delta callers request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitPoints {
    pub current: i32,
    pub maximum: i32,
}

impl HitPoints {
    pub fn new(maximum: i32) -> Self {
        Self {
            current: maximum,
            maximum,
        }
    }

    /// Set current HP, clamped into `[0, maximum]`.
    pub fn set_current(&mut self, value: i32) {
        self.current = value.clamp(0, self.maximum);
    }

    /// Apply a signed delta, clamped into `[0, maximum]`.
    pub fn apply_delta(&mut self, delta: i32) {
        self.set_current(self.current.saturating_add(delta));
    }

    pub fn is_down(&self) -> bool {
        self.current == 0
    }
}

/// Spellcasting data for casters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spellcasting {
    pub ability: String,
    pub slots_total: u8,
    pub slots_remaining: u8,
    pub known_spells: Vec<String>,
}

/// A player character's sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSheet {
    pub name: String,
    pub class: String,
    pub ability_scores: AbilityScores,
    pub hit_points: HitPoints,
    pub armor_class: u8,
    #[serde(default)]
    pub proficiencies: Vec<String>,
    #[serde(default)]
    pub equipment: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub spellcasting: Option<Spellcasting>,
}

impl CharacterSheet {
    pub fn new(name: impl Into<String>, class: impl Into<String>, max_hp: i32) -> Self {
        Self {
            name: name.into(),
            class: class.into(),
            ability_scores: AbilityScores::default(),
            hit_points: HitPoints::new(max_hp),
            armor_class: 10,
            proficiencies: Vec::new(),
            equipment: Vec::new(),
            conditions: Vec::new(),
            spellcasting: None,
        }
    }

    /// Initiative modifier, derived from dexterity.
    pub fn initiative_modifier(&self) -> i32 {
        self.ability_scores.dexterity_modifier()
    }

    /// The agent identifier this sheet belongs to.
    pub fn agent_id(&self) -> AgentId {
        AgentId::pc(&self.name)
    }
}

/// Fork metadata: where this timeline came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub parent_session: Option<Uuid>,
    #[serde(default)]
    pub forked_at_turn: Option<u64>,
}

impl Lineage {
    pub fn is_root(&self) -> bool {
        self.parent_session.is_none()
    }
}

/// The complete session state.
///
/// Serde defaults on the optional fields are the backward-compatibility
/// contract: a save written before a field existed decodes to that field's
/// documented default (inactive combat, empty secrets, root lineage,
/// zeroed cursors).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub session_id: Uuid,
    pub session_name: String,

    /// Round-robin order outside combat: the director exactly once plus
    /// each PC exactly once.
    pub turn_queue: Vec<AgentId>,
    #[serde(default)]
    pub queue_index: usize,
    #[serde(default)]
    pub turn_number: u64,

    /// Append-only. Entries are never reordered or edited after append.
    pub ground_truth_log: Vec<LogEntry>,

    /// Keyed by the character's proper display name.
    pub character_sheets: HashMap<String, CharacterSheet>,

    /// Keyed by the receiving agent. Readable only by the director and
    /// the owning agent; the context builder enforces this.
    #[serde(default)]
    pub agent_secrets: HashMap<AgentId, Vec<Whisper>>,

    #[serde(default)]
    pub combat: CombatState,

    #[serde(default)]
    pub lineage: Lineage,
}

impl GameState {
    pub fn new(session_name: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            session_name: session_name.into(),
            turn_queue: vec![AgentId::director()],
            queue_index: 0,
            turn_number: 0,
            ground_truth_log: Vec::new(),
            character_sheets: HashMap::new(),
            agent_secrets: HashMap::new(),
            combat: CombatState::default(),
            lineage: Lineage::default(),
        }
    }

    /// Add a player character: stores the sheet and appends the PC's
    /// agent id to the turn queue.
    pub fn with_player(mut self, sheet: CharacterSheet) -> Self {
        let id = sheet.agent_id();
        self.character_sheets.insert(sheet.name.clone(), sheet);
        if !self.turn_queue.contains(&id) {
            self.turn_queue.push(id);
        }
        self
    }

    /// All PC agent ids in queue order.
    pub fn pc_ids(&self) -> Vec<AgentId> {
        self.turn_queue
            .iter()
            .filter(|id| id.is_pc())
            .cloned()
            .collect()
    }

    /// Look up a sheet by name, case-insensitively. Returns the exact map
    /// key alongside the sheet so callers can patch the right entry.
    pub fn sheet_entry(&self, name: &str) -> Option<(&String, &CharacterSheet)> {
        if let Some((k, v)) = self.character_sheets.get_key_value(name) {
            return Some((k, v));
        }
        let wanted = name.to_lowercase();
        self.character_sheets
            .iter()
            .find(|(k, _)| k.to_lowercase() == wanted)
    }

    pub fn sheet(&self, name: &str) -> Option<&CharacterSheet> {
        self.sheet_entry(name).map(|(_, sheet)| sheet)
    }

    /// The sheet belonging to a PC agent id, if any.
    pub fn sheet_for_agent(&self, id: &AgentId) -> Option<&CharacterSheet> {
        self.character_sheets
            .values()
            .find(|sheet| &sheet.agent_id() == id)
    }

    /// Human-readable name for an agent id: sheet names for PCs, profile
    /// names for NPC slots, "Director" otherwise.
    pub fn display_name(&self, id: &AgentId) -> String {
        if id.is_director() {
            return "Director".to_string();
        }
        if let Some(key) = id.as_npc_key() {
            if let Some(profile) = self.combat.npc_profiles.get(key) {
                return profile.name.clone();
            }
            return key.to_string();
        }
        self.sheet_for_agent(id)
            .map(|sheet| sheet.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub(crate) fn push_log(&mut self, entry: LogEntry) {
        self.ground_truth_log.push(entry);
    }

    /// Log entries appended at or after the given turn.
    pub fn log_since(&self, turn: u64) -> Vec<&LogEntry> {
        self.ground_truth_log
            .iter()
            .filter(|entry| entry.turn >= turn)
            .collect()
    }
}
