//! QA tests for the whisper subsystem: lifecycle, matching rules, and the
//! information-hiding guarantee in context construction.

use serde_json::json;
use tabletop_core::agent::AgentReply;
use tabletop_core::context::{build_context, revealed_history};
use tabletop_core::state::{AgentId, LogKind};
use tabletop_core::testing::TestHarness;

async fn whisper(harness: &mut TestHarness, to: &str, content: &str) {
    harness.director.push(
        AgentReply::narrative("").with_request(
            "whisper",
            json!({"to_agent": to, "content": content}),
        ),
    );
    // Advance until the director's turn comes up again
    while !harness.session.current_actor().is_director() {
        let actor = harness.session.current_actor();
        if let Some(script) = harness.script_for(&harness.state().display_name(&actor)) {
            script.push_narrative("...");
        }
        harness.run_turn().await;
    }
    harness.run_turn().await;
}

// =============================================================================
// Whispers stay out of the shared log and out of other agents' contexts
// =============================================================================

#[tokio::test]
async fn test_whisper_isolation_across_agents() {
    let mut harness = TestHarness::new();
    harness.add_pc("Mira", "Wizard");
    harness.add_pc("Bruga", "Barbarian");

    whisper(&mut harness, "Mira", "The amulet is cursed").await;
    whisper(&mut harness, "Bruga", "Your axe hums near the door").await;

    let mira = AgentId::pc("Mira");
    let bruga = AgentId::pc("Bruga");
    assert_eq!(harness.active_secret_count(&mira), 1);
    assert_eq!(harness.active_secret_count(&bruga), 1);

    // Nothing secret in the shared log
    assert!(harness
        .state()
        .ground_truth_log
        .iter()
        .all(|entry| !entry.content.contains("amulet") && !entry.content.contains("hums")));

    // Each PC sees only its own whisper
    let mira_ctx = build_context(harness.state(), &mira);
    assert!(mira_ctx.text.contains("amulet"));
    assert!(!mira_ctx.text.contains("hums"));

    let bruga_ctx = build_context(harness.state(), &bruga);
    assert!(bruga_ctx.text.contains("hums"));
    assert!(!bruga_ctx.text.contains("amulet"));

    // The director sees both
    let director_ctx = build_context(harness.state(), &AgentId::director());
    assert!(director_ctx.text.contains("amulet"));
    assert!(director_ctx.text.contains("hums"));
}

// =============================================================================
// Reveal lifecycle: exactly once, with distinct already-revealed reporting
// =============================================================================

#[tokio::test]
async fn test_reveal_exactly_once() {
    let mut harness = TestHarness::new();
    harness.add_pc("Mira", "Wizard");

    whisper(&mut harness, "Mira", "The innkeeper is a spy").await;
    let mira = AgentId::pc("Mira");

    harness.director.push(AgentReply::narrative("").with_request(
        "reveal_secret",
        json!({"agent": "Mira", "secret": "innkeeper"}),
    ));
    harness.script_for("Mira").unwrap().push_narrative("...");
    harness.run_turn().await; // Mira's turn
    let report = harness.run_turn().await; // director reveals
    assert!(report.observations[0].contains("Secret revealed"));

    let whisper_record = &harness.state().agent_secrets[&mira][0];
    assert!(whisper_record.revealed);
    let revealed_turn = whisper_record.turn_revealed.expect("reveal turn stamped");

    // The reveal hit the shared log atomically with the flip
    assert!(harness
        .state()
        .ground_truth_log
        .iter()
        .any(|entry| entry.kind == LogKind::SecretReveal && entry.content.contains("spy")));

    // Active projection no longer carries it; history does
    assert_eq!(harness.active_secret_count(&mira), 0);
    assert!(revealed_history(harness.state()).contains("spy"));

    // Second reveal attempt: distinct message, no state change
    harness.director.push(AgentReply::narrative("").with_request(
        "reveal_secret",
        json!({"agent": "Mira", "secret": "innkeeper"}),
    ));
    harness.script_for("Mira").unwrap().push_narrative("...");
    harness.run_turn().await;
    let report = harness.run_turn().await;
    assert!(report.observations[0]
        .contains(&format!("already revealed on turn {revealed_turn}")));
    assert_eq!(
        harness.state().agent_secrets[&mira][0].turn_revealed,
        Some(revealed_turn)
    );
}

// =============================================================================
// Matching: substring among unrevealed only, first match in list order
// =============================================================================

#[tokio::test]
async fn test_reveal_matching_rules() {
    let mut harness = TestHarness::new();
    harness.add_pc("Mira", "Wizard");

    whisper(&mut harness, "Mira", "The spy watches the docks").await;
    whisper(&mut harness, "Mira", "The spy answers to the baron").await;

    // Both whispers match "spy": the first in list order is revealed
    harness.director.push(AgentReply::narrative("").with_request(
        "reveal_secret",
        json!({"agent": "Mira", "secret": "spy"}),
    ));
    harness.script_for("Mira").unwrap().push_narrative("...");
    harness.run_turn().await;
    let report = harness.run_turn().await;
    assert!(report.observations[0].contains("docks"));

    let mira = AgentId::pc("Mira");
    let whispers = &harness.state().agent_secrets[&mira];
    assert!(whispers[0].revealed);
    assert!(!whispers[1].revealed);

    // The same hint now matches the remaining unrevealed whisper
    harness.director.push(AgentReply::narrative("").with_request(
        "reveal_secret",
        json!({"agent": "Mira", "secret": "spy"}),
    ));
    harness.script_for("Mira").unwrap().push_narrative("...");
    harness.run_turn().await;
    let report = harness.run_turn().await;
    assert!(report.observations[0].contains("baron"));
}

// =============================================================================
// Not-found conditions are reported distinctly
// =============================================================================

#[tokio::test]
async fn test_reveal_not_found_variants() {
    let mut harness = TestHarness::new();
    harness.add_pc("Mira", "Wizard");

    // No secrets at all for a known character
    harness.director.push(AgentReply::narrative("").with_request(
        "reveal_secret",
        json!({"agent": "Mira", "secret": "anything"}),
    ));
    let report = harness.run_turn().await;
    assert!(report.observations[0].contains("has no secrets"));

    // Unusable agent reference
    harness.director.push(AgentReply::narrative("").with_request(
        "reveal_secret",
        json!({"agent": "???", "secret": "anything"}),
    ));
    harness.script_for("Mira").unwrap().push_narrative("...");
    harness.run_turn().await;
    let report = harness.run_turn().await;
    assert!(report.observations[0].contains("No agent or character named"));

    // Known character, no matching whisper
    whisper(&mut harness, "Mira", "The amulet is cursed").await;
    harness.director.push(AgentReply::narrative("").with_request(
        "reveal_secret",
        json!({"agent": "Mira", "secret": "dragon"}),
    ));
    harness.script_for("Mira").unwrap().push_narrative("...");
    harness.run_turn().await;
    let report = harness.run_turn().await;
    assert!(report.observations[0].contains("No secret matching 'dragon'"));
}
