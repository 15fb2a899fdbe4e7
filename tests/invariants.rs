//! Random operation sequences must never leave the engine inconsistent.

use std::time::Duration;

use proptest::prelude::*;
use rand::{SeedableRng, rngs::StdRng};
use strangers::{
    Config, Engine,
    engine::Outbox,
    profile::{Gender, Preference, ProfileForm},
    protocol::{ConnId, MessageKind},
};
use tokio::time::Instant;

const INTERESTS: [&str; 4] = ["music", "gaming", "travel", "film"];

#[derive(Debug, Clone)]
enum Op {
    Connect,
    FindMatch { who: usize, gender: Gender, looking_for: Preference, interests: Vec<usize> },
    LeaveQueue(usize),
    Message(usize),
    Typing(usize),
    EndChat(usize),
    Disconnect(usize),
    Advance(u64),
    Sweep,
}

fn op() -> impl Strategy<Value = Op> {
    let gender = prop_oneof![Just(Gender::Male), Just(Gender::Female)];
    let looking_for = prop_oneof![Just(Preference::Male), Just(Preference::Female), Just(Preference::Any)];
    prop_oneof![
        3 => Just(Op::Connect),
        5 => (any::<usize>(), gender, looking_for, prop::collection::vec(0..INTERESTS.len(), 0..3))
            .prop_map(|(who, gender, looking_for, interests)| Op::FindMatch { who, gender, looking_for, interests }),
        1 => any::<usize>().prop_map(Op::LeaveQueue),
        2 => any::<usize>().prop_map(Op::Message),
        1 => any::<usize>().prop_map(Op::Typing),
        1 => any::<usize>().prop_map(Op::EndChat),
        2 => any::<usize>().prop_map(Op::Disconnect),
        2 => (1u64..90).prop_map(Op::Advance),
        2 => Just(Op::Sweep),
    ]
}

fn config() -> Config {
    Config {
        max_waiting: 3,
        max_sessions: 2,
        queue_timeout: Duration::from_secs(30),
        idle_timeout: Duration::from_secs(60),
        ..Config::default()
    }
}

fn pick(handles: &[ConnId], who: usize) -> Option<ConnId> {
    (!handles.is_empty()).then(|| handles[who % handles.len()])
}

fn apply(engine: &mut Engine, handles: &mut Vec<ConnId>, now: &mut Instant, op: Op) -> Outbox {
    match op {
        Op::Connect => {
            let handle = ConnId::new();
            if engine.connect(handle).is_ok() {
                handles.push(handle);
            }
            Vec::new()
        }
        Op::FindMatch { who, gender, looking_for, interests } => {
            let Some(handle) = pick(handles, who) else { return Vec::new() };
            let form = ProfileForm {
                name: "anon".to_owned(),
                gender,
                looking_for,
                interests: interests.into_iter().map(|i| INTERESTS[i].to_owned()).collect(),
            };
            engine.find_match(handle, form, *now).unwrap_or_default()
        }
        Op::LeaveQueue(who) => pick(handles, who)
            .and_then(|handle| engine.leave_queue(handle).ok())
            .unwrap_or_default(),
        Op::Message(who) => pick(handles, who)
            .and_then(|handle| engine.relay_message(handle, "hi".to_owned(), MessageKind::Text, *now).ok())
            .map(|(_, outbox)| outbox)
            .unwrap_or_default(),
        Op::Typing(who) => pick(handles, who)
            .and_then(|handle| engine.relay_typing(handle, true, *now).ok())
            .unwrap_or_default(),
        Op::EndChat(who) => pick(handles, who)
            .and_then(|handle| engine.end_chat(handle).ok())
            .unwrap_or_default(),
        Op::Disconnect(who) => pick(handles, who).map(|handle| engine.disconnect(handle)).unwrap_or_default(),
        Op::Advance(secs) => {
            *now += Duration::from_secs(secs);
            Vec::new()
        }
        Op::Sweep => {
            let (_, outbox) = engine.sweep(*now);
            let stats = engine.stats();
            assert!(stats.waiting <= 3, "{stats:?}");
            assert!(stats.sessions <= 2, "{stats:?}");
            outbox
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn engine_stays_consistent(seed in any::<u64>(), ops in prop::collection::vec(op(), 1..80)) {
        let mut engine = Engine::with_rng(config(), StdRng::seed_from_u64(seed));
        let mut handles = Vec::new();
        let mut now = Instant::now();

        for op in ops {
            let outbox = apply(&mut engine, &mut handles, &mut now, op.clone());

            if let Err(problem) = engine.check_consistency() {
                prop_assert!(false, "after {op:?}: {problem}");
            }
            for &(to, _) in &outbox {
                prop_assert!(engine.is_connected(to), "after {op:?}: event for gone connection {to}");
            }
            for &handle in &handles {
                prop_assert!(
                    !(engine.is_waiting(handle) && engine.session_of(handle).is_some()),
                    "after {op:?}: {handle} is both waiting and in a session"
                );
                if !engine.is_connected(handle) {
                    prop_assert!(!engine.is_waiting(handle));
                    prop_assert!(engine.session_of(handle).is_none());
                }
            }
        }
    }
}
