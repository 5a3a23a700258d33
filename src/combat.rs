//! Tactical combat state and the initiative engine.
//!
//! Initiative is rolled once at combat start for every PC and NPC, sorted
//! with deterministic tie-breaking, and bookended by a single director slot
//! at the front of the order. The director narrates from the bookend and
//! controls NPC turns through `director:<npc_key>` routing slots.

use crate::dice::DiceRoller;
use crate::state::{slug, AgentId, GameState, HitPoints};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A director-controlled combatant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcProfile {
    pub name: String,
    #[serde(default)]
    pub initiative_modifier: i32,
    pub hit_points: HitPoints,
    pub armor_class: u8,
    /// Free-text director guidance; never shown to PC agents.
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub tactics: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub conditions: Vec<String>,
}

impl NpcProfile {
    pub fn new(name: impl Into<String>, max_hp: i32, armor_class: u8) -> Self {
        Self {
            name: name.into(),
            initiative_modifier: 0,
            hit_points: HitPoints::new(max_hp.max(1)),
            armor_class,
            personality: String::new(),
            tactics: String::new(),
            secret: String::new(),
            conditions: Vec::new(),
        }
    }
}

/// Combat encounter state. The default is "no combat".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombatState {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub round_number: u32,
    /// Cursor into `initiative_order` for the turn router.
    #[serde(default)]
    pub turn_index: usize,
    /// Director bookend first, then combatants by descending initiative.
    #[serde(default)]
    pub initiative_order: Vec<AgentId>,
    /// Rolled totals, keyed identically to `initiative_order` entries.
    /// The bookend does not roll and has no entry here.
    #[serde(default)]
    pub initiative_rolls: HashMap<AgentId, i32>,
    /// Snapshot of the exploration turn queue taken at combat start.
    #[serde(default)]
    pub original_turn_queue: Vec<AgentId>,
    #[serde(default)]
    pub npc_profiles: HashMap<String, NpcProfile>,
}

impl CombatState {
    /// Number of combatants excluding the director bookend.
    pub fn combatant_count(&self) -> usize {
        self.initiative_order.len().saturating_sub(1)
    }
}

/// Stable map key for an NPC, unique within the given profile set.
/// Duplicate display names get `_2`, `_3`, ... suffixes in arrival order.
pub fn unique_npc_key(existing: &HashMap<String, NpcProfile>, name: &str) -> String {
    let base = slug(name);
    let base = if base.is_empty() { "npc".to_string() } else { base };
    if !existing.contains_key(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}_{n}");
        if !existing.contains_key(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// One combatant's initiative roll, for logging.
#[derive(Debug, Clone, PartialEq)]
pub struct InitiativeRoll {
    pub key: AgentId,
    pub name: String,
    pub die: u32,
    pub modifier: i32,
    pub total: i32,
}

/// Roll initiative for every PC in the turn queue and every supplied NPC,
/// and build the resulting combat state.
///
/// Sort order: total descending, then modifier descending, then display
/// name ascending. No silent randomness in tie resolution.
pub fn roll_initiative(
    state: &GameState,
    npcs: Vec<NpcProfile>,
    roller: &mut dyn DiceRoller,
) -> (CombatState, Vec<InitiativeRoll>) {
    let mut npc_profiles: HashMap<String, NpcProfile> = HashMap::new();
    let mut rolls: Vec<InitiativeRoll> = Vec::new();

    for id in state.pc_ids() {
        let (name, modifier) = match state.sheet_for_agent(&id) {
            Some(sheet) => (sheet.name.clone(), sheet.initiative_modifier()),
            None => (id.to_string(), 0),
        };
        let die = roller.roll(20);
        rolls.push(InitiativeRoll {
            key: id,
            name,
            die,
            modifier,
            total: die as i32 + modifier,
        });
    }

    for npc in npcs {
        let key = unique_npc_key(&npc_profiles, &npc.name);
        let die = roller.roll(20);
        rolls.push(InitiativeRoll {
            key: AgentId::npc_slot(&key),
            name: npc.name.clone(),
            die,
            modifier: npc.initiative_modifier,
            total: die as i32 + npc.initiative_modifier,
        });
        npc_profiles.insert(key, npc);
    }

    rolls.sort_by(|a, b| {
        b.total
            .cmp(&a.total)
            .then_with(|| b.modifier.cmp(&a.modifier))
            .then_with(|| a.name.cmp(&b.name))
    });

    let mut initiative_order = Vec::with_capacity(rolls.len() + 1);
    initiative_order.push(AgentId::director());
    let mut initiative_rolls = HashMap::new();
    for roll in &rolls {
        initiative_order.push(roll.key.clone());
        initiative_rolls.insert(roll.key.clone(), roll.total);
    }

    let combat = CombatState {
        active: true,
        round_number: 1,
        turn_index: 0,
        initiative_order,
        initiative_rolls,
        original_turn_queue: state.turn_queue.clone(),
        npc_profiles,
    };

    (combat, rolls)
}
