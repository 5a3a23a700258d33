//! Tool-call interception.
//!
//! Agents never mutate state directly: they request an action by name with
//! JSON arguments. The engine validates the request, resolves it against
//! the current state into a narrative confirmation plus a batch of effects,
//! and commits the whole batch onto a fresh copy of the state. A failed
//! validation returns the input state untouched along with a descriptive
//! failure string, which the orchestration loop hands back to the agent as
//! an ordinary observation.

use crate::combat::{roll_initiative, CombatState, NpcProfile};
use crate::dice::{DiceExpression, DiceRoller};
use crate::router;
use crate::secrets::{self, SecretLookup, Whisper};
use crate::state::{slug, AgentId, GameState, LogEntry, LogKind};
use serde_json::{json, Value};
use uuid::Uuid;

/// A named action offered to an agent, with its JSON argument schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// The catalog of actions agents may request.
pub struct ActionCatalog;

impl ActionCatalog {
    /// Every action the engine understands.
    pub fn all() -> Vec<ActionSpec> {
        vec![
            Self::roll_dice(),
            Self::update_sheet(),
            Self::whisper(),
            Self::reveal_secret(),
            Self::start_combat(),
            Self::end_combat(),
        ]
    }

    /// The actions available to the given actor. The director (including
    /// NPC turns it controls) gets everything; PC agents get dice and
    /// their own sheet.
    pub fn for_actor(actor: &AgentId) -> Vec<ActionSpec> {
        if actor.is_director() || actor.as_npc_key().is_some() {
            Self::all()
        } else {
            vec![Self::roll_dice(), Self::update_sheet()]
        }
    }

    fn roll_dice() -> ActionSpec {
        ActionSpec {
            name: "roll_dice".to_string(),
            description: "Roll dice using standard notation like '1d20+5' or '2d6'. Returns the individual dice and the total. Has no effect on game state.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "notation": {
                        "type": "string",
                        "description": "Dice notation, e.g. '1d20+3'"
                    },
                    "purpose": {
                        "type": "string",
                        "description": "What the roll is for"
                    }
                },
                "required": ["notation"]
            }),
        }
    }

    fn update_sheet() -> ActionSpec {
        ActionSpec {
            name: "update_sheet".to_string(),
            description: "Apply changes to a character sheet: hit points, equipment, or conditions. Hit points are always clamped between 0 and the character's maximum.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "character": {
                        "type": "string",
                        "description": "The character's name"
                    },
                    "hp_delta": {
                        "type": "integer",
                        "description": "Signed hit point change (damage is negative)"
                    },
                    "hp_set": {
                        "type": "integer",
                        "description": "Set current hit points to this value"
                    },
                    "equip_add": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Items to add to equipment"
                    },
                    "equip_remove": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Items to remove from equipment"
                    },
                    "condition_add": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Conditions to apply (e.g. 'poisoned')"
                    },
                    "condition_remove": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Conditions to clear"
                    }
                },
                "required": ["character"]
            }),
        }
    }

    fn whisper() -> ActionSpec {
        ActionSpec {
            name: "whisper".to_string(),
            description: "Send private information to a single agent. Only that agent and the director can ever see it; it never enters the shared story log.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "to_agent": {
                        "type": "string",
                        "description": "Agent id or character name to whisper to"
                    },
                    "content": {
                        "type": "string",
                        "description": "The private information"
                    }
                },
                "required": ["to_agent", "content"]
            }),
        }
    }

    fn reveal_secret() -> ActionSpec {
        ActionSpec {
            name: "reveal_secret".to_string(),
            description: "Reveal one of an agent's unrevealed secrets to the whole table. Identify the secret by its id or by a fragment of its content. A secret can be revealed only once.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "agent": {
                        "type": "string",
                        "description": "Agent id or character name the secret was whispered to"
                    },
                    "secret": {
                        "type": "string",
                        "description": "Whisper id or a fragment of its content"
                    }
                },
                "required": ["agent", "secret"]
            }),
        }
    }

    fn start_combat() -> ActionSpec {
        ActionSpec {
            name: "start_combat".to_string(),
            description: "Begin tactical combat. Rolls initiative for every player character and each supplied NPC, and switches the turn order to initiative order. Only takes effect when the session runs with tactical combat enabled.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "participants": {
                        "type": "array",
                        "description": "NPC combatants (player characters join automatically)",
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": { "type": "string" },
                                "hp_max": { "type": "integer", "minimum": 1 },
                                "hp_current": { "type": "integer", "minimum": 0 },
                                "armor_class": { "type": "integer" },
                                "initiative_modifier": { "type": "integer" },
                                "personality": { "type": "string" },
                                "tactics": { "type": "string" },
                                "secret": { "type": "string" }
                            },
                            "required": ["name"]
                        }
                    }
                },
                "required": []
            }),
        }
    }

    fn end_combat() -> ActionSpec {
        ActionSpec {
            name: "end_combat".to_string(),
            description: "End the current combat encounter and return to the normal turn order.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }
}

/// Field-level changes to a character sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetDelta {
    pub hp_delta: Option<i32>,
    pub hp_set: Option<i32>,
    pub equip_add: Vec<String>,
    pub equip_remove: Vec<String>,
    pub condition_add: Vec<String>,
    pub condition_remove: Vec<String>,
}

impl SheetDelta {
    pub fn is_empty(&self) -> bool {
        self.hp_delta.is_none()
            && self.hp_set.is_none()
            && self.equip_add.is_empty()
            && self.equip_remove.is_empty()
            && self.condition_add.is_empty()
            && self.condition_remove.is_empty()
    }
}

/// A validated, supported action. Unknown names never reach this enum.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    RollDice {
        notation: String,
        purpose: String,
    },
    UpdateSheet {
        character: String,
        delta: SheetDelta,
    },
    Whisper {
        to_agent: String,
        content: String,
    },
    RevealSecret {
        agent: String,
        reference: String,
    },
    StartCombat {
        participants: Vec<NpcProfile>,
    },
    EndCombat,
}

/// Parse a requested action. Returns a descriptive failure string for
/// unknown names or malformed arguments; never panics, never silently
/// ignores a request.
pub fn parse_action(name: &str, args: &Value) -> Result<Action, String> {
    match name {
        "roll_dice" => {
            let notation = required_str(args, "notation", name)?;
            let purpose = args["purpose"].as_str().unwrap_or("general roll");
            Ok(Action::RollDice {
                notation: notation.to_string(),
                purpose: purpose.to_string(),
            })
        }
        "update_sheet" => {
            let character = required_str(args, "character", name)?;
            let delta = SheetDelta {
                hp_delta: args["hp_delta"].as_i64().map(|v| v as i32),
                hp_set: args["hp_set"].as_i64().map(|v| v as i32),
                equip_add: string_list(&args["equip_add"]),
                equip_remove: string_list(&args["equip_remove"]),
                condition_add: string_list(&args["condition_add"]),
                condition_remove: string_list(&args["condition_remove"]),
            };
            Ok(Action::UpdateSheet {
                character: character.to_string(),
                delta,
            })
        }
        "whisper" => {
            let to_agent = required_str(args, "to_agent", name)?;
            let content = required_str(args, "content", name)?;
            Ok(Action::Whisper {
                to_agent: to_agent.to_string(),
                content: content.to_string(),
            })
        }
        "reveal_secret" => {
            let agent = required_str(args, "agent", name)?;
            let reference = required_str(args, "secret", name)?;
            Ok(Action::RevealSecret {
                agent: agent.to_string(),
                reference: reference.to_string(),
            })
        }
        "start_combat" => {
            let mut participants = Vec::new();
            if let Some(entries) = args["participants"].as_array() {
                for entry in entries {
                    let Some(participant_name) = entry["name"].as_str() else {
                        return Err(
                            "start_combat: every participant needs a 'name'".to_string()
                        );
                    };
                    let hp_max = entry["hp_max"].as_i64().unwrap_or(10) as i32;
                    if hp_max < 1 {
                        return Err(format!(
                            "start_combat: participant '{participant_name}' must have hp_max of at least 1"
                        ));
                    }
                    let hp_current = entry["hp_current"]
                        .as_i64()
                        .map(|v| v as i32)
                        .unwrap_or(hp_max);
                    let mut profile = NpcProfile::new(
                        participant_name,
                        hp_max,
                        entry["armor_class"].as_u64().unwrap_or(10) as u8,
                    );
                    profile.hit_points.set_current(hp_current);
                    profile.initiative_modifier =
                        entry["initiative_modifier"].as_i64().unwrap_or(0) as i32;
                    profile.personality =
                        entry["personality"].as_str().unwrap_or("").to_string();
                    profile.tactics = entry["tactics"].as_str().unwrap_or("").to_string();
                    profile.secret = entry["secret"].as_str().unwrap_or("").to_string();
                    participants.push(profile);
                }
            }
            Ok(Action::StartCombat { participants })
        }
        "end_combat" => Ok(Action::EndCombat),
        other => Err(format!("Unknown action: '{other}'")),
    }
}

fn required_str<'a>(args: &'a Value, key: &str, action: &str) -> Result<&'a str, String> {
    match args[key].as_str() {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(format!("{action} requires a '{key}' argument")),
    }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// A concrete state patch. Effects in one resolution commit together or
/// not at all.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Effect {
    LogAppended(LogEntry),
    HpChanged {
        character: String,
        from: i32,
        to: i32,
    },
    ItemAdded {
        character: String,
        item: String,
    },
    ItemRemoved {
        character: String,
        item: String,
    },
    ConditionAdded {
        character: String,
        condition: String,
    },
    ConditionRemoved {
        character: String,
        condition: String,
    },
    WhisperCreated(Whisper),
    WhisperRevealed {
        agent: AgentId,
        whisper_id: Uuid,
        turn: u64,
    },
    CombatStarted(Box<CombatState>),
    CombatEnded,
}

/// The result of resolving an action against a state snapshot.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub narrative: String,
    pub effects: Vec<Effect>,
}

impl Resolution {
    pub fn new(narrative: impl Into<String>) -> Self {
        Self {
            narrative: narrative.into(),
            effects: Vec::new(),
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Result of applying one requested action: the text observation for the
/// requesting agent plus the (possibly unchanged) successor state.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub reply: String,
    pub state: GameState,
}

/// The interceptor engine. Holds session-level policy (tactical combat)
/// and the injected dice roller.
pub struct ActionEngine {
    tactical_combat: bool,
    roller: Box<dyn DiceRoller>,
}

impl ActionEngine {
    pub fn new(roller: Box<dyn DiceRoller>) -> Self {
        Self {
            tactical_combat: false,
            roller,
        }
    }

    pub fn with_tactical_combat(mut self, enabled: bool) -> Self {
        self.tactical_combat = enabled;
        self
    }

    /// Validate and apply one requested action. Failures leave the state
    /// untouched and surface as the reply text.
    pub fn apply(
        &mut self,
        state: &GameState,
        actor: &AgentId,
        name: &str,
        args: &Value,
    ) -> ActionOutcome {
        match parse_action(name, args) {
            Err(reason) => {
                tracing::debug!(action = name, %reason, "rejected action request");
                ActionOutcome {
                    reply: reason,
                    state: state.clone(),
                }
            }
            Ok(action) => {
                let resolution = self.resolve(state, actor, action);
                let next = apply_effects(state, &resolution.effects);
                tracing::debug!(
                    action = name,
                    actor = %actor,
                    effects = resolution.effects.len(),
                    "action applied"
                );
                ActionOutcome {
                    reply: resolution.narrative,
                    state: next,
                }
            }
        }
    }

    fn resolve(&mut self, state: &GameState, actor: &AgentId, action: Action) -> Resolution {
        let directs = actor.is_director() || actor.as_npc_key().is_some();
        match action {
            Action::RollDice { notation, purpose } => self.resolve_roll_dice(&notation, &purpose),
            Action::UpdateSheet { character, delta } => {
                resolve_update_sheet(state, actor, &character, &delta)
            }
            Action::Whisper { to_agent, content } if directs => {
                resolve_whisper(state, &to_agent, &content)
            }
            Action::RevealSecret { agent, reference } if directs => {
                resolve_reveal_secret(state, &agent, &reference)
            }
            Action::StartCombat { participants } if directs => {
                self.resolve_start_combat(state, participants)
            }
            Action::EndCombat if directs => resolve_end_combat(state),
            Action::Whisper { .. } => Resolution::new("Only the director may whisper."),
            Action::RevealSecret { .. } => {
                Resolution::new("Only the director may reveal secrets.")
            }
            Action::StartCombat { .. } | Action::EndCombat => {
                Resolution::new("Only the director may control combat.")
            }
        }
    }

    fn resolve_roll_dice(&mut self, notation: &str, purpose: &str) -> Resolution {
        match DiceExpression::parse(notation) {
            Ok(expr) => {
                let result = expr.roll_with(&mut *self.roller);
                Resolution::new(format!("Rolling {notation} for {purpose}: {result}"))
            }
            Err(e) => Resolution::new(format!("Could not roll '{notation}': {e}")),
        }
    }

    fn resolve_start_combat(
        &mut self,
        state: &GameState,
        participants: Vec<NpcProfile>,
    ) -> Resolution {
        if !self.tactical_combat {
            return Resolution::new(
                "Tactical combat is disabled for this session; describe the fight narratively instead.",
            );
        }
        if state.combat.active {
            return Resolution::new(format!(
                "Combat is already underway (round {}).",
                state.combat.round_number
            ));
        }

        let (combat, rolls) = roll_initiative(state, participants, &mut *self.roller);

        let order_line = rolls
            .iter()
            .map(|r| format!("{} {}", r.name, r.total))
            .collect::<Vec<_>>()
            .join(", ");

        let mut resolution = Resolution::new(format!("Combat begins! Initiative: {order_line}."))
            .with_effect(Effect::LogAppended(LogEntry::new(
                state.turn_number,
                LogKind::Narrative,
                "Director",
                "Combat begins!",
            )));
        for roll in &rolls {
            resolution = resolution.with_effect(Effect::LogAppended(LogEntry::new(
                state.turn_number,
                LogKind::DiceRoll,
                roll.name.clone(),
                format!(
                    "Initiative roll: [{}] {:+} = {}",
                    roll.die, roll.modifier, roll.total
                ),
            )));
        }
        resolution.with_effect(Effect::CombatStarted(Box::new(combat)))
    }
}

fn resolve_update_sheet(
    state: &GameState,
    actor: &AgentId,
    character: &str,
    delta: &SheetDelta,
) -> Resolution {
    let Some((_, sheet)) = state.sheet_entry(character) else {
        return Resolution::new(format!("No character named '{character}'."));
    };
    if actor.is_pc() && sheet.agent_id() != *actor {
        return Resolution::new(format!(
            "You may only update your own sheet, not {}'s.",
            sheet.name
        ));
    }
    if delta.is_empty() {
        return Resolution::new(format!("No changes requested for {}.", sheet.name));
    }

    let name = sheet.name.clone();
    let mut parts = Vec::new();
    let mut resolution = Resolution::new(String::new());

    if delta.hp_set.is_some() || delta.hp_delta.is_some() {
        let from = sheet.hit_points.current;
        let requested = match (delta.hp_set, delta.hp_delta) {
            (Some(set), _) => set,
            (None, Some(d)) => from.saturating_add(d),
            (None, None) => from,
        };
        let to = requested.clamp(0, sheet.hit_points.maximum);
        parts.push(format!("{name}: {from} \u{2192} {to} ({:+})", to - from));
        resolution = resolution.with_effect(Effect::HpChanged {
            character: name.clone(),
            from,
            to,
        });
    }

    for item in &delta.equip_add {
        parts.push(format!("+{item}"));
        resolution = resolution.with_effect(Effect::ItemAdded {
            character: name.clone(),
            item: item.clone(),
        });
    }
    for item in &delta.equip_remove {
        if sheet
            .equipment
            .iter()
            .any(|e| e.eq_ignore_ascii_case(item))
        {
            parts.push(format!("-{item}"));
            resolution = resolution.with_effect(Effect::ItemRemoved {
                character: name.clone(),
                item: item.clone(),
            });
        } else {
            parts.push(format!("no '{item}' carried"));
        }
    }

    for condition in &delta.condition_add {
        if sheet
            .conditions
            .iter()
            .any(|c| c.eq_ignore_ascii_case(condition))
        {
            parts.push(format!("already {condition}"));
        } else {
            parts.push(format!("now {condition}"));
            resolution = resolution.with_effect(Effect::ConditionAdded {
                character: name.clone(),
                condition: condition.clone(),
            });
        }
    }
    for condition in &delta.condition_remove {
        if sheet
            .conditions
            .iter()
            .any(|c| c.eq_ignore_ascii_case(condition))
        {
            parts.push(format!("no longer {condition}"));
            resolution = resolution.with_effect(Effect::ConditionRemoved {
                character: name.clone(),
                condition: condition.clone(),
            });
        } else {
            parts.push(format!("not {condition}"));
        }
    }

    let summary = parts.join("; ");
    resolution.narrative = summary.clone();
    resolution.with_effect(Effect::LogAppended(LogEntry::new(
        state.turn_number,
        LogKind::SheetChange,
        state.display_name(actor),
        format!("[SHEET] {summary}"),
    )))
}

fn resolve_whisper(state: &GameState, to_agent: &str, content: &str) -> Resolution {
    let to = match resolve_agent_key(state, to_agent) {
        Ok(id) => id,
        Err(reason) => return Resolution::new(reason),
    };
    let whisper = Whisper::new(AgentId::director(), to.clone(), content, state.turn_number);
    let display = state.display_name(&to);
    Resolution::new(format!(
        "Whispered to {display}: \"{content}\" (id {})",
        whisper.id
    ))
    .with_effect(Effect::WhisperCreated(whisper))
}

fn resolve_reveal_secret(state: &GameState, agent: &str, reference: &str) -> Resolution {
    let target = match resolve_agent_key(state, agent) {
        Ok(id) => id,
        Err(reason) => return Resolution::new(reason),
    };
    let display = state.display_name(&target);
    let Some(whispers) = state.agent_secrets.get(&target) else {
        return Resolution::new(format!("{display} has no secrets."));
    };

    match secrets::find_unrevealed(whispers, reference) {
        SecretLookup::Unrevealed(index) => {
            let whisper = &whispers[index];
            Resolution::new(format!(
                "Secret revealed to the table: \"{}\"",
                whisper.content
            ))
            .with_effect(Effect::WhisperRevealed {
                agent: target.clone(),
                whisper_id: whisper.id,
                turn: state.turn_number,
            })
            .with_effect(Effect::LogAppended(LogEntry::new(
                state.turn_number,
                LogKind::SecretReveal,
                "Director",
                format!("A secret concerning {display} comes to light: {}", whisper.content),
            )))
        }
        SecretLookup::AlreadyRevealed { turn: Some(turn) } => Resolution::new(format!(
            "That secret was already revealed on turn {turn}."
        )),
        SecretLookup::AlreadyRevealed { turn: None } => {
            Resolution::new("That secret was already revealed.")
        }
        SecretLookup::NotFound => Resolution::new(format!(
            "No secret matching '{reference}' for {display}."
        )),
    }
}

fn resolve_end_combat(state: &GameState) -> Resolution {
    if !state.combat.active {
        return Resolution::new("No combat is underway.");
    }
    Resolution::new(format!(
        "Combat ends after {} round(s).",
        state.combat.round_number
    ))
    .with_effect(Effect::LogAppended(LogEntry::new(
        state.turn_number,
        LogKind::Narrative,
        "Director",
        "Combat ends.",
    )))
    .with_effect(Effect::CombatEnded)
}

/// Resolve a raw agent reference: the director, a queued agent id, a
/// character name, or a plausible new key. Only unusable references fail.
fn resolve_agent_key(state: &GameState, raw: &str) -> Result<AgentId, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("An agent or character name is required.".to_string());
    }
    if trimmed.eq_ignore_ascii_case("director") || trimmed.eq_ignore_ascii_case("dm") {
        return Ok(AgentId::director());
    }
    let literal = AgentId::from_raw(trimmed);
    if state.turn_queue.contains(&literal) {
        return Ok(literal);
    }
    if let Some((_, sheet)) = state.sheet_entry(trimmed) {
        return Ok(sheet.agent_id());
    }
    if slug(trimmed).is_empty() {
        return Err(format!("No agent or character named '{trimmed}'."));
    }
    // Plausible but unknown: normalize like a PC key so a later join with
    // the same name lines up with the stored secrets.
    Ok(AgentId::pc(trimmed))
}

/// Apply a batch of effects to a state snapshot, producing the successor
/// state. The input is never modified.
pub fn apply_effects(state: &GameState, effects: &[Effect]) -> GameState {
    let mut next = state.clone();
    for effect in effects {
        apply_effect(&mut next, effect);
    }
    next
}

fn apply_effect(state: &mut GameState, effect: &Effect) {
    match effect {
        Effect::LogAppended(entry) => state.push_log(entry.clone()),
        Effect::HpChanged { character, to, .. } => {
            if let Some((key, _)) = state.sheet_entry(character) {
                let key = key.clone();
                if let Some(sheet) = state.character_sheets.get_mut(&key) {
                    sheet.hit_points.set_current(*to);
                }
            }
        }
        Effect::ItemAdded { character, item } => {
            if let Some((key, _)) = state.sheet_entry(character) {
                let key = key.clone();
                if let Some(sheet) = state.character_sheets.get_mut(&key) {
                    sheet.equipment.push(item.clone());
                }
            }
        }
        Effect::ItemRemoved { character, item } => {
            if let Some((key, _)) = state.sheet_entry(character) {
                let key = key.clone();
                if let Some(sheet) = state.character_sheets.get_mut(&key) {
                    if let Some(pos) = sheet
                        .equipment
                        .iter()
                        .position(|e| e.eq_ignore_ascii_case(item))
                    {
                        sheet.equipment.remove(pos);
                    }
                }
            }
        }
        Effect::ConditionAdded {
            character,
            condition,
        } => {
            if let Some((key, _)) = state.sheet_entry(character) {
                let key = key.clone();
                if let Some(sheet) = state.character_sheets.get_mut(&key) {
                    if !sheet
                        .conditions
                        .iter()
                        .any(|c| c.eq_ignore_ascii_case(condition))
                    {
                        sheet.conditions.push(condition.clone());
                    }
                }
            }
        }
        Effect::ConditionRemoved {
            character,
            condition,
        } => {
            if let Some((key, _)) = state.sheet_entry(character) {
                let key = key.clone();
                if let Some(sheet) = state.character_sheets.get_mut(&key) {
                    sheet
                        .conditions
                        .retain(|c| !c.eq_ignore_ascii_case(condition));
                }
            }
        }
        Effect::WhisperCreated(whisper) => {
            state
                .agent_secrets
                .entry(whisper.to_agent.clone())
                .or_default()
                .push(whisper.clone());
        }
        Effect::WhisperRevealed {
            agent,
            whisper_id,
            turn,
        } => {
            if let Some(whispers) = state.agent_secrets.get_mut(agent) {
                if let Some(whisper) = whispers.iter_mut().find(|w| w.id == *whisper_id) {
                    if !whisper.revealed {
                        whisper.revealed = true;
                        whisper.turn_revealed = Some(*turn);
                    }
                }
            }
        }
        Effect::CombatStarted(combat) => {
            state.combat = (**combat).clone();
        }
        Effect::CombatEnded => {
            *state = router::restore_exploration(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::SequenceRoller;
    use crate::state::CharacterSheet;

    fn engine(rolls: Vec<u32>) -> ActionEngine {
        ActionEngine::new(Box::new(SequenceRoller::new(rolls))).with_tactical_combat(true)
    }

    fn two_pc_state() -> GameState {
        let mut mira = CharacterSheet::new("Mira", "Wizard", 18);
        mira.hit_points.set_current(18);
        let bruga = CharacterSheet::new("Bruga", "Barbarian", 52);
        GameState::new("Test")
            .with_player(mira)
            .with_player(bruga)
    }

    #[test]
    fn test_unknown_action_is_validation_failure() {
        let state = two_pc_state();
        let mut engine = engine(vec![]);
        let outcome = engine.apply(
            &state,
            &AgentId::director(),
            "summon_dragon",
            &json!({}),
        );
        assert!(outcome.reply.contains("Unknown action"));
        assert_eq!(outcome.state, state);
    }

    #[test]
    fn test_roll_dice_is_pure() {
        let state = two_pc_state();
        let mut engine = engine(vec![4, 2]);
        let outcome = engine.apply(
            &state,
            &AgentId::pc("Mira"),
            "roll_dice",
            &json!({"notation": "2d6+3", "purpose": "arcana check"}),
        );
        assert!(outcome.reply.contains("arcana check"));
        assert!(outcome.reply.contains("= 9"));
        assert_eq!(outcome.state, state);
    }

    #[test]
    fn test_update_sheet_hp_clamps_and_logs() {
        let state = two_pc_state();
        let mut engine = engine(vec![]);

        let outcome = engine.apply(
            &state,
            &AgentId::director(),
            "update_sheet",
            &json!({"character": "Bruga", "hp_delta": -17}),
        );
        assert_eq!(outcome.reply, "Bruga: 52 \u{2192} 35 (-17)");
        assert_eq!(outcome.state.sheet("Bruga").unwrap().hit_points.current, 35);

        let entry = outcome.state.ground_truth_log.last().unwrap();
        assert_eq!(entry.kind, LogKind::SheetChange);
        assert!(entry.content.starts_with("[SHEET]"));

        // Overkill damage clamps at zero
        let outcome = engine.apply(
            &outcome.state,
            &AgentId::director(),
            "update_sheet",
            &json!({"character": "Bruga", "hp_delta": -900}),
        );
        assert_eq!(outcome.state.sheet("Bruga").unwrap().hit_points.current, 0);

        // Overhealing clamps at maximum
        let outcome = engine.apply(
            &outcome.state,
            &AgentId::director(),
            "update_sheet",
            &json!({"character": "Bruga", "hp_delta": 999}),
        );
        assert_eq!(outcome.state.sheet("Bruga").unwrap().hit_points.current, 52);
    }

    #[test]
    fn test_update_sheet_unknown_character() {
        let state = two_pc_state();
        let mut engine = engine(vec![]);
        let outcome = engine.apply(
            &state,
            &AgentId::director(),
            "update_sheet",
            &json!({"character": "Nobody", "hp_delta": -5}),
        );
        assert!(outcome.reply.contains("No character named"));
        assert_eq!(outcome.state, state);
    }

    #[test]
    fn test_pc_cannot_update_other_sheet() {
        let state = two_pc_state();
        let mut engine = engine(vec![]);
        let outcome = engine.apply(
            &state,
            &AgentId::pc("Mira"),
            "update_sheet",
            &json!({"character": "Bruga", "hp_delta": -5}),
        );
        assert!(outcome.reply.contains("only update your own sheet"));
        assert_eq!(outcome.state, state);
    }

    #[test]
    fn test_whisper_and_reveal_lifecycle() {
        let state = two_pc_state();
        let mut engine = engine(vec![]);

        let outcome = engine.apply(
            &state,
            &AgentId::director(),
            "whisper",
            &json!({"to_agent": "Mira", "content": "The innkeeper is a spy"}),
        );
        let mira = AgentId::pc("Mira");
        assert_eq!(outcome.state.agent_secrets[&mira].len(), 1);
        assert!(!outcome.state.agent_secrets[&mira][0].revealed);
        // Whispers never reach the shared log
        assert!(outcome.state.ground_truth_log.is_empty());

        let outcome = engine.apply(
            &outcome.state,
            &AgentId::director(),
            "reveal_secret",
            &json!({"agent": "Mira", "secret": "innkeeper"}),
        );
        assert!(outcome.reply.contains("Secret revealed"));
        let whisper = &outcome.state.agent_secrets[&mira][0];
        assert!(whisper.revealed);
        assert_eq!(whisper.turn_revealed, Some(0));
        let entry = outcome.state.ground_truth_log.last().unwrap();
        assert_eq!(entry.kind, LogKind::SecretReveal);

        // Second reveal reports the already-revealed state distinctly
        let again = engine.apply(
            &outcome.state,
            &AgentId::director(),
            "reveal_secret",
            &json!({"agent": "Mira", "secret": "innkeeper"}),
        );
        assert!(again.reply.contains("already revealed on turn 0"));
        assert_eq!(again.state, outcome.state);
    }

    #[test]
    fn test_reveal_secret_not_found() {
        let state = two_pc_state();
        let mut engine = engine(vec![]);

        let outcome = engine.apply(
            &state,
            &AgentId::director(),
            "reveal_secret",
            &json!({"agent": "Mira", "secret": "dragon"}),
        );
        assert!(outcome.reply.contains("has no secrets"));

        let outcome = engine.apply(
            &state,
            &AgentId::director(),
            "reveal_secret",
            &json!({"agent": "?!", "secret": "dragon"}),
        );
        assert!(outcome.reply.contains("No agent or character named"));
    }

    #[test]
    fn test_pc_cannot_whisper() {
        let state = two_pc_state();
        let mut engine = engine(vec![]);
        let outcome = engine.apply(
            &state,
            &AgentId::pc("Mira"),
            "whisper",
            &json!({"to_agent": "Bruga", "content": "psst"}),
        );
        assert!(outcome.reply.contains("Only the director"));
        assert_eq!(outcome.state, state);
    }

    #[test]
    fn test_start_combat_requires_tactical_mode() {
        let state = two_pc_state();
        let mut engine =
            ActionEngine::new(Box::new(SequenceRoller::new(vec![]))).with_tactical_combat(false);
        let outcome = engine.apply(
            &state,
            &AgentId::director(),
            "start_combat",
            &json!({"participants": [{"name": "Ogre"}]}),
        );
        assert!(outcome.reply.contains("disabled"));
        assert_eq!(outcome.state, state);
        assert!(!outcome.state.combat.active);
    }

    #[test]
    fn test_start_combat_builds_order() {
        let state = two_pc_state();
        // Mira, Bruga, then the Ogre
        let mut engine = engine(vec![12, 8, 17]);
        let outcome = engine.apply(
            &state,
            &AgentId::director(),
            "start_combat",
            &json!({"participants": [{"name": "Ogre", "hp_max": 40, "armor_class": 11, "tactics": "smash"}]}),
        );

        let combat = &outcome.state.combat;
        assert!(combat.active);
        assert_eq!(combat.round_number, 1);
        // 2 PCs + 1 NPC + director bookend
        assert_eq!(combat.initiative_order.len(), 4);
        assert_eq!(combat.initiative_order[0], AgentId::director());
        assert_eq!(combat.initiative_order[1], AgentId::npc_slot("ogre"));
        assert_eq!(combat.original_turn_queue, state.turn_queue);
        assert!(outcome.reply.contains("Combat begins"));

        // Initiative rolls landed in the log as dice results
        let dice_entries = outcome
            .state
            .ground_truth_log
            .iter()
            .filter(|e| e.kind == LogKind::DiceRoll)
            .count();
        assert_eq!(dice_entries, 3);
    }

    #[test]
    fn test_start_combat_twice_is_noop() {
        let state = two_pc_state();
        let mut engine = engine(vec![12, 8, 17]);
        let outcome = engine.apply(
            &state,
            &AgentId::director(),
            "start_combat",
            &json!({"participants": [{"name": "Ogre"}]}),
        );
        let again = engine.apply(
            &outcome.state,
            &AgentId::director(),
            "start_combat",
            &json!({"participants": [{"name": "Troll"}]}),
        );
        assert!(again.reply.contains("already underway"));
        assert_eq!(again.state, outcome.state);
    }

    #[test]
    fn test_start_combat_rejects_zero_hp_participant() {
        let state = two_pc_state();
        let mut engine = engine(vec![]);
        let outcome = engine.apply(
            &state,
            &AgentId::director(),
            "start_combat",
            &json!({"participants": [{"name": "Wisp", "hp_max": 0}]}),
        );
        assert!(outcome.reply.contains("hp_max of at least 1"));
        assert_eq!(outcome.state, state);
    }

    #[test]
    fn test_end_combat_without_combat() {
        let state = two_pc_state();
        let mut engine = engine(vec![]);
        let outcome = engine.apply(&state, &AgentId::director(), "end_combat", &json!({}));
        assert!(outcome.reply.contains("No combat"));
        assert_eq!(outcome.state, state);
    }

    #[test]
    fn test_end_combat_restores_queue() {
        let state = two_pc_state();
        let original_queue = state.turn_queue.clone();
        let mut engine = engine(vec![12, 8, 17]);

        let outcome = engine.apply(
            &state,
            &AgentId::director(),
            "start_combat",
            &json!({"participants": [{"name": "Ogre"}]}),
        );
        let outcome = engine.apply(
            &outcome.state,
            &AgentId::director(),
            "end_combat",
            &json!({}),
        );

        assert!(!outcome.state.combat.active);
        assert_eq!(outcome.state.turn_queue, original_queue);
        assert!(outcome.state.combat.initiative_order.is_empty());
    }

    #[test]
    fn test_equipment_and_conditions() {
        let state = two_pc_state();
        let mut engine = engine(vec![]);

        let outcome = engine.apply(
            &state,
            &AgentId::director(),
            "update_sheet",
            &json!({
                "character": "Mira",
                "equip_add": ["Staff of Embers"],
                "condition_add": ["poisoned"]
            }),
        );
        let sheet = outcome.state.sheet("Mira").unwrap();
        assert_eq!(sheet.equipment, vec!["Staff of Embers"]);
        assert_eq!(sheet.conditions, vec!["poisoned"]);

        let outcome = engine.apply(
            &outcome.state,
            &AgentId::director(),
            "update_sheet",
            &json!({
                "character": "Mira",
                "equip_remove": ["staff of embers"],
                "condition_remove": ["Poisoned"]
            }),
        );
        let sheet = outcome.state.sheet("Mira").unwrap();
        assert!(sheet.equipment.is_empty());
        assert!(sheet.conditions.is_empty());
    }

    #[test]
    fn test_catalog_partition() {
        let all = ActionCatalog::for_actor(&AgentId::director());
        assert_eq!(all.len(), 6);

        let pc = ActionCatalog::for_actor(&AgentId::pc("Mira"));
        let names: Vec<&str> = pc.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["roll_dice", "update_sheet"]);

        let slot = ActionCatalog::for_actor(&AgentId::npc_slot("ogre"));
        assert_eq!(slot.len(), 6);
    }
}
