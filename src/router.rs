//! Turn routing across exploration and combat.
//!
//! Exploration cycles the fixed turn queue round-robin. While combat is
//! active the initiative order is cycled instead; NPC slots route to the
//! director. Ending combat restores the queue snapshotted at combat start.

use crate::state::{AgentId, GameState};

/// The router's current mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterMode {
    Exploration,
    Combat { round: u32 },
}

pub fn mode(state: &GameState) -> RouterMode {
    if state.combat.active {
        RouterMode::Combat {
            round: state.combat.round_number,
        }
    } else {
        RouterMode::Exploration
    }
}

/// Whose turn it is right now.
///
/// In combat the result may be an NPC routing slot (`director:<npc_key>`);
/// the session invokes the director agent for those with the NPC's profile
/// injected into context.
pub fn current_actor(state: &GameState) -> AgentId {
    if state.combat.active && !state.combat.initiative_order.is_empty() {
        let index = state.combat.turn_index % state.combat.initiative_order.len();
        return state.combat.initiative_order[index].clone();
    }
    if state.turn_queue.is_empty() {
        return AgentId::director();
    }
    state.turn_queue[state.queue_index % state.turn_queue.len()].clone()
}

/// Advance to the next turn, producing the successor state.
///
/// Wrapping the initiative order starts a new combat round.
pub fn advance(state: &GameState) -> GameState {
    let mut next = state.clone();
    next.turn_number += 1;

    if next.combat.active && !next.combat.initiative_order.is_empty() {
        next.combat.turn_index += 1;
        if next.combat.turn_index >= next.combat.initiative_order.len() {
            next.combat.turn_index = 0;
            next.combat.round_number += 1;
        }
    } else if !next.turn_queue.is_empty() {
        next.queue_index = (next.queue_index + 1) % next.turn_queue.len();
    }

    next
}

/// Leave combat mode: restore the turn queue captured at combat start and
/// reset the combat record to its inactive default. The routing queue
/// belongs to the router; `end_combat` only signals the transition.
pub fn restore_exploration(state: &GameState) -> GameState {
    let mut next = state.clone();
    if !next.combat.original_turn_queue.is_empty() {
        next.turn_queue = next.combat.original_turn_queue.clone();
    }
    next.queue_index = 0;
    next.combat = Default::default();
    next
}
