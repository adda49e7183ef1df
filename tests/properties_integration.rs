//! Property-based tests for the queue, markup slot and fallback counter
//!
//! Properties:
//! - The reprompt queue never holds more than its capacity, one entry per module
//! - Clearing empties the queue whatever came before
//! - After k restore toggles the slot is k mod 2
//! - Within unresolved fallbacks the counter never decreases
//! - An aborted turn leaves the fallback state as it found it

use fallback_arbiter::config::{Config, TrackerConfig};
use fallback_arbiter::core::engine::{functions, variables, CLARIFICATION_SIGNAL};
use fallback_arbiter::core::{CommandCall, EngineScript, RepromptQueue, RepromptTracker, Session, StaticCatalog, TurnScript};
use fallback_arbiter::types::{MarkupSlot, OutputType, Turn, TurnInput, TurnOutput};
use fallback_arbiter::REPROMPT_QUEUE_CAPACITY;
use proptest::prelude::*;
use std::collections::BTreeSet;

const MODULES: [&str; 6] = ["root", "side", "game", "quiz", "story", "song"];

// ============================================================================
// STRATEGIES
// ============================================================================

fn arb_record() -> impl Strategy<Value = (usize, usize, String)> {
    (0..MODULES.len(), 0..3usize, "[a-z ]{1,12}")
}

fn arb_engine() -> impl Strategy<Value = EngineScript> {
    (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
        |(clarify, confirm, move_on, reprompt, end)| {
            let mut engine = EngineScript::default();
            engine.signals.insert(CLARIFICATION_SIGNAL.to_string(), clarify);
            engine.functions.insert(functions::GAMBIT_TANGENT.to_string(), confirm);
            engine.functions.insert(functions::MOVE_ON.to_string(), move_on);
            engine.functions.insert(functions::MARKUP_RESTORE.to_string(), reprompt);
            engine.functions.insert(functions::REPROMPT.to_string(), reprompt);
            if end {
                engine.variables.insert(variables::END_SIGNAL.to_string(), "true".to_string());
            }
            engine
        },
    )
}

#[derive(Debug, Clone)]
enum Step {
    Fallback,
    Resume,
    Normal(usize),
    Event,
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Fallback),
        Just(Step::Resume),
        (0..MODULES.len()).prop_map(Step::Normal),
        Just(Step::Event),
    ]
}

fn script_for(step: &Step) -> TurnScript {
    let fallback = |input: TurnInput| TurnScript::new(input).with_command(CommandCall::new("handle_fallback"));
    match step {
        Step::Fallback => fallback(TurnInput::speech("blorp")),
        Step::Resume => fallback(TurnInput::event("eb-remote-act-speak")),
        Step::Normal(i) => {
            let module = MODULES[*i];
            let topic = format!("~{}_main", module);
            TurnScript::new(TurnInput::speech("okay"))
                .with_output(TurnOutput::new("Sure.", OutputType::Normal).in_module(module, &[topic.as_str()]))
        }
        Step::Event => TurnScript::new(TurnInput::event("eb-timer-done"))
            .with_output(TurnOutput::new("", OutputType::EventInput)),
    }
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn prop_queue_bounded_one_per_module(records in prop::collection::vec(arb_record(), 0..40)) {
        let mut queue = RepromptQueue::new();
        for (module, topic, text) in &records {
            queue.record(text, &format!("{}_t{}", MODULES[*module], topic));
            prop_assert!(queue.len() <= REPROMPT_QUEUE_CAPACITY);

            let modules: BTreeSet<_> = queue.iter().map(|e| e.module.clone()).collect();
            prop_assert_eq!(modules.len(), queue.len());
        }
    }

    #[test]
    fn prop_latest_record_survives(records in prop::collection::vec(arb_record(), 1..40)) {
        let mut queue = RepromptQueue::new();
        for (module, topic, text) in &records {
            queue.record(text, &format!("{}_t{}", MODULES[*module], topic));
        }
        let (module, topic, text) = records.last().unwrap();
        let entry = queue.find_by_topic(&format!("{}_t{}", MODULES[*module], topic));
        prop_assert_eq!(entry.map(|e| e.text.as_str()), Some(text.as_str()));
    }

    #[test]
    fn prop_clear_all_empties(records in prop::collection::vec(arb_record(), 0..20)) {
        let mut queue = RepromptQueue::new();
        for (module, topic, text) in &records {
            queue.record(text, &format!("{}_t{}", MODULES[*module], topic));
        }
        queue.clear_all();
        prop_assert!(queue.is_empty());
        prop_assert!(queue.iter().next().is_none());
    }

    #[test]
    fn prop_slot_parity(k in 0usize..64) {
        let mut tracker = RepromptTracker::new(TrackerConfig::default());
        for _ in 0..k {
            tracker.on_turn_started(&Turn::new(TurnInput::speech("x")));
            tracker.restore_markup_state();
        }
        let expected = if k % 2 == 0 { MarkupSlot::Slot0 } else { MarkupSlot::Slot1 };
        prop_assert_eq!(tracker.slot(), expected);
    }

    #[test]
    fn prop_counter_monotone_across_fallbacks(engines in prop::collection::vec(arb_engine(), 1..12)) {
        let mut session = Session::new(Config::default(), StaticCatalog::new());
        let mut last = 0;
        for engine in engines {
            let speech = TurnScript::new(TurnInput::speech("blorp"))
                .with_command(CommandCall::new("handle_fallback"))
                .with_engine(engine.clone());
            let resume = TurnScript::new(TurnInput::event("eb-remote-act-speak"))
                .with_command(CommandCall::new("handle_fallback"))
                .with_engine(engine);
            for report in [session.run_turn(speech), session.run_turn(resume)] {
                prop_assert!(report.counter >= last);
                last = report.counter;
            }
        }
    }

    #[test]
    fn prop_abort_restores_state(steps in prop::collection::vec(arb_step(), 0..16), last in arb_step()) {
        let mut session = Session::new(Config::default(), StaticCatalog::new());
        for step in &steps {
            session.run_turn(script_for(step));
        }
        let state = session.arbitrator().default_state();
        let counter = session.arbitrator().default_counter();
        let slot = session.tracker().slot();

        let report = session.run_turn(script_for(&last).aborted());
        prop_assert_eq!(report.fallback_state, state);
        prop_assert_eq!(report.counter, counter);
        prop_assert_eq!(report.markup_slot, slot);
    }
}
