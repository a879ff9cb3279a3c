use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use keydrill::config::Config;
use keydrill::game::{Game, Phase};
use keydrill::keys::parse_sequence;
use keydrill::pack::Pack;
use keydrill::progress::{ProgressStore, SqliteProgressStore};
use keydrill::runtime::{key_to_string, DrillEvent, FixedTicker, Runner, TestEventSource};
use keydrill::timer::ManualClock;

fn to_event(token: &str) -> KeyEvent {
    if let Some(rest) = token.strip_prefix("ctrl+") {
        let c = rest.chars().next().unwrap();
        return KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL);
    }
    let c = token.chars().next().unwrap();
    let modifiers = if c.is_ascii_uppercase() {
        KeyModifiers::SHIFT
    } else {
        KeyModifiers::NONE
    };
    KeyEvent::new(KeyCode::Char(c), modifiers)
}

fn drive<S: ProgressStore>(game: &mut Game<S>, runner: &Runner<TestEventSource, FixedTicker>) {
    for _ in 0..50u32 {
        match runner.step() {
            DrillEvent::Tick => {
                game.on_tick().unwrap();
                return;
            }
            DrillEvent::Resize => {}
            DrillEvent::Key(key) => {
                game.handle_key(&key).unwrap();
            }
        }
    }
}

// Plays a short session from decoded terminal events without a TTY and
// checks that progress survives into the next run.
#[test]
fn headless_session_completes_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("progress.db");
    let pack = Pack::builtin("vim").unwrap();
    let clock = ManualClock::new();
    let config = Config {
        commands_per_session: 3,
        ..Default::default()
    };

    let store = SqliteProgressStore::open(&db).unwrap();
    let mut game = Game::new(&pack, store, &config, Arc::new(clock.clone()))
        .unwrap()
        .with_seed(7);

    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(5)),
    );

    game.start().unwrap();
    let mut played = Vec::new();
    while game.phase() == Phase::Presenting {
        let keys = game.current_command().unwrap().keys().to_string();
        for token in parse_sequence(&keys) {
            let ev = DrillEvent::from_terminal(Event::Key(to_event(&token))).unwrap();
            tx.send(ev).unwrap();
        }
        clock.advance_secs(1.0);
        drive(&mut game, &runner);
        played.push(keys);
        assert!(played.len() <= 3, "session ran past its length");
    }

    assert_eq!(game.phase(), Phase::Finished);
    let stats = game.stats();
    assert_eq!(stats.correct_count, 3);
    assert_eq!(stats.incorrect_count, 0);
    assert_eq!(stats.accuracy, 100.0);
    assert!(stats.total_score > 0);
    drop(game);

    let reopened = SqliteProgressStore::open(&db).unwrap();
    let record = reopened.load("vim").unwrap();
    assert_eq!(record.stats.sessions_played, 1);
    assert_eq!(record.stats.total_correct, 3);
    for keys in &played {
        assert!(record.commands[keys].successes >= 1);
    }
}

#[test]
fn ctrl_keys_decode_to_pack_tokens() {
    for keys in ["ctrl+w v", "ctrl+r", "gg", "G", ">>"] {
        let decoded: Vec<String> = parse_sequence(keys)
            .iter()
            .filter_map(|t| key_to_string(&to_event(t)))
            .collect();
        assert_eq!(decoded, parse_sequence(keys), "{keys}");
    }
}
