//! Per-agent context construction with visibility filtering.
//!
//! This is where information partitioning is enforced: a PC agent's bundle
//! is assembled exclusively from the shared log, that PC's own sheet, and
//! that PC's own secrets. Only the director path walks the full secret map.
//! Everything here is a pure projection over `GameState`.

use crate::secrets;
use crate::state::{AgentId, GameState, LogEntry};

/// How many trailing log entries a context carries.
const RECENT_LOG_LIMIT: usize = 50;

/// The assembled, visibility-filtered context for one agent's turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextBundle {
    pub actor: AgentId,
    pub text: String,
}

/// Build the context bundle for the given actor identity.
///
/// The actor may be the director, a PC agent id, or an NPC routing slot
/// (`director:<npc_key>`), which gets the director's view plus a spotlight
/// block for that NPC.
pub fn build_context(state: &GameState, actor: &AgentId) -> ContextBundle {
    let mut text = String::new();

    text.push_str(&format!("# Session: {}\n", state.session_name));
    text.push_str(&format!("Turn {}", state.turn_number));
    if state.combat.active {
        text.push_str(&format!(" - Combat, round {}", state.combat.round_number));
    }
    text.push('\n');

    push_log_section(&mut text, state);

    if actor.is_director() || actor.as_npc_key().is_some() {
        push_director_view(&mut text, state);
        if let Some(key) = actor.as_npc_key() {
            push_npc_spotlight(&mut text, state, key);
        }
    } else {
        push_pc_view(&mut text, state, actor);
    }

    ContextBundle {
        actor: actor.clone(),
        text,
    }
}

fn push_log_section(text: &mut String, state: &GameState) {
    text.push_str("\n## Story So Far\n");
    let log = &state.ground_truth_log;
    let start = log.len().saturating_sub(RECENT_LOG_LIMIT);
    if log.is_empty() {
        text.push_str("(nothing has happened yet)\n");
        return;
    }
    if start > 0 {
        text.push_str(&format!("({start} earlier entries omitted)\n"));
    }
    for entry in &log[start..] {
        text.push_str(&format!("{}: {}\n", entry.speaker, entry.content));
    }
}

fn push_director_view(text: &mut String, state: &GameState) {
    text.push_str("\n## Party\n");
    text.push_str(&sheet_summary(state));

    // Active secrets across every agent; revealed ones are a separate
    // projection (`revealed_history`).
    let mut any = false;
    let mut agents: Vec<&AgentId> = state.agent_secrets.keys().collect();
    agents.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    for agent in agents {
        let active = secrets::active_for(state, agent);
        if active.is_empty() {
            continue;
        }
        if !any {
            text.push_str("\n## Active Secrets\n");
            any = true;
        }
        for whisper in active {
            text.push_str(&format!(
                "- to {} (id {}, turn {}): {}\n",
                agent, whisper.id, whisper.turn_created, whisper.content
            ));
        }
    }

    if let Some(summary) = combat_summary(state, true) {
        text.push('\n');
        text.push_str(&summary);
    }
}

fn push_pc_view(text: &mut String, state: &GameState, actor: &AgentId) {
    if let Some(sheet) = state.sheet_for_agent(actor) {
        text.push_str("\n## Your Character\n");
        push_sheet(text, state, &sheet.name);
    }

    let active = secrets::active_for(state, actor);
    if !active.is_empty() {
        text.push_str("\n## Things Only You Know\n");
        for whisper in active {
            text.push_str(&format!("- {}\n", whisper.content));
        }
    }

    if let Some(summary) = combat_summary(state, false) {
        text.push('\n');
        text.push_str(&summary);
    }
}

fn push_npc_spotlight(text: &mut String, state: &GameState, key: &str) {
    let Some(profile) = state.combat.npc_profiles.get(key) else {
        return;
    };
    text.push_str(&format!("\n## Spotlight: {}\n", profile.name));
    text.push_str(&format!(
        "HP {}/{} ({}), AC {}\n",
        profile.hit_points.current,
        profile.hit_points.maximum,
        hp_descriptor(profile.hit_points.current, profile.hit_points.maximum),
        profile.armor_class
    ));
    if !profile.personality.is_empty() {
        text.push_str(&format!("Personality: {}\n", profile.personality));
    }
    if !profile.tactics.is_empty() {
        text.push_str(&format!("Tactics: {}\n", profile.tactics));
    }
    if !profile.secret.is_empty() {
        text.push_str(&format!("Secret: {}\n", profile.secret));
    }
    if !profile.conditions.is_empty() {
        text.push_str(&format!("Conditions: {}\n", profile.conditions.join(", ")));
    }
}

fn push_sheet(text: &mut String, state: &GameState, name: &str) {
    let Some(sheet) = state.sheet(name) else {
        return;
    };
    text.push_str(&format!(
        "**{}** ({}) - HP {}/{} ({}), AC {}, init {:+}\n",
        sheet.name,
        sheet.class,
        sheet.hit_points.current,
        sheet.hit_points.maximum,
        hp_descriptor(sheet.hit_points.current, sheet.hit_points.maximum),
        sheet.armor_class,
        sheet.initiative_modifier()
    ));
    let a = &sheet.ability_scores;
    text.push_str(&format!(
        "STR {} DEX {} CON {} INT {} WIS {} CHA {}\n",
        a.strength, a.dexterity, a.constitution, a.intelligence, a.wisdom, a.charisma
    ));
    if !sheet.conditions.is_empty() {
        text.push_str(&format!("Conditions: {}\n", sheet.conditions.join(", ")));
    }
    if !sheet.equipment.is_empty() {
        text.push_str(&format!("Equipment: {}\n", sheet.equipment.join(", ")));
    }
    if let Some(ref spellcasting) = sheet.spellcasting {
        text.push_str(&format!(
            "Spells ({}, {}/{} slots): {}\n",
            spellcasting.ability,
            spellcasting.slots_remaining,
            spellcasting.slots_total,
            spellcasting.known_spells.join(", ")
        ));
    }
}

/// Formatted projection of every character sheet, sorted by name, for a
/// presentation layer.
pub fn sheet_summary(state: &GameState) -> String {
    let mut out = String::new();
    let mut names: Vec<&String> = state.character_sheets.keys().collect();
    names.sort();
    for name in names {
        push_sheet(&mut out, state, name);
    }
    out
}

/// Combat summary projection. With `include_hidden`, NPC hit points and
/// conditions are listed; the public variant shows only round and order.
pub fn combat_summary(state: &GameState, include_hidden: bool) -> Option<String> {
    if !state.combat.active {
        return None;
    }
    let combat = &state.combat;
    let mut out = String::new();
    out.push_str(&format!("## Combat - Round {}\n", combat.round_number));

    for (index, key) in combat.initiative_order.iter().enumerate() {
        let marker = if index == combat.turn_index { ">" } else { " " };
        if key.is_director() {
            out.push_str(&format!("{marker} -. Director\n"));
            continue;
        }
        let name = state.display_name(key);
        let initiative = combat
            .initiative_rolls
            .get(key)
            .map(|total| total.to_string())
            .unwrap_or_else(|| "?".to_string());
        if include_hidden {
            if let Some(npc_key) = key.as_npc_key() {
                if let Some(profile) = combat.npc_profiles.get(npc_key) {
                    out.push_str(&format!(
                        "{marker} {initiative}. {name} - HP {}/{}, AC {}\n",
                        profile.hit_points.current,
                        profile.hit_points.maximum,
                        profile.armor_class
                    ));
                    continue;
                }
            }
        }
        out.push_str(&format!("{marker} {initiative}. {name}\n"));
    }

    Some(out)
}

/// The director's separate history projection of revealed secrets.
pub fn revealed_history(state: &GameState) -> String {
    let mut out = String::new();
    let mut agents: Vec<&AgentId> = state.agent_secrets.keys().collect();
    agents.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    for agent in agents {
        for whisper in secrets::revealed_for(state, agent) {
            let turn = whisper
                .turn_revealed
                .map(|t| t.to_string())
                .unwrap_or_else(|| "?".to_string());
            out.push_str(&format!(
                "- to {} (revealed turn {}): {}\n",
                agent, turn, whisper.content
            ));
        }
    }
    if out.is_empty() {
        out.push_str("(no secrets have been revealed)\n");
    }
    out
}

/// Log entries appended at or after the given turn, for incremental
/// rendering by a presentation layer.
pub fn log_since<'a>(state: &'a GameState, turn: u64) -> Vec<&'a LogEntry> {
    state.log_since(turn)
}

/// Narrative description of a HP total, used in sheet and spotlight lines.
fn hp_descriptor(current: i32, max: i32) -> &'static str {
    if current <= 0 {
        "down"
    } else if current == max {
        "uninjured"
    } else {
        let ratio = current as f32 / max as f32;
        if ratio > 0.75 {
            "lightly wounded"
        } else if ratio > 0.5 {
            "bloodied"
        } else if ratio > 0.25 {
            "badly wounded"
        } else {
            "near death"
        }
    }
}
