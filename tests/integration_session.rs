use std::sync::mpsc;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use typerate::clock::ManualClock;
use typerate::runtime::{AppEvent, FixedTicker, Runner, TestEventSource};
use typerate::session::{Phase, Session};
use typerate::store::{ResultSink, ResultsDb};

#[test]
fn cat_typed_in_three_second_steps() {
    let clock = ManualClock::new();
    let mut session = Session::with_clock("cat".to_string(), Box::new(clock.clone()));

    assert!(session.on_input("c").is_none());
    clock.advance(Duration::from_secs(3));
    assert!(session.on_input("ca").is_none());
    clock.advance(Duration::from_secs(3));
    let result = session
        .on_input("cat")
        .expect("exact match should complete the session");

    assert_eq!(session.phase, Phase::Completed);
    assert_eq!(result.total_characters, 3);
    assert_eq!(result.correct_characters, 3);
    assert_eq!(result.incorrect_characters, 0);
    assert_eq!(result.time_elapsed, 6);
    // one word over six seconds
    assert_eq!(result.wpm, 10);
    assert_eq!(result.accuracy, 100);
    assert_eq!(result.text_sample, "cat");
}

#[test]
fn mistype_dips_accuracy_then_correction_completes() {
    let clock = ManualClock::new();
    let mut session = Session::with_clock("cat".to_string(), Box::new(clock.clone()));

    session.on_input("c");
    clock.advance(Duration::from_secs(2));

    assert!(session.on_input("cbt").is_none());
    assert_eq!(session.phase, Phase::Active);
    assert_eq!(session.accuracy, 67);

    clock.advance(Duration::from_secs(2));
    let result = session.on_input("cat").expect("corrected input completes");

    assert_eq!(result.accuracy, 100);
    assert_eq!(result.correct_characters, 3);
    assert_eq!(result.incorrect_characters, 0);
}

#[test]
fn completed_result_persists_and_deduplicates() {
    let clock = ManualClock::new();
    let mut session = Session::with_clock("hello there".to_string(), Box::new(clock.clone()));

    session.on_input("h");
    clock.advance(Duration::from_secs(10));
    let result = session.on_input("hello there").unwrap();

    let db = ResultsDb::open_in_memory("mira").unwrap();
    db.submit(&result).unwrap();
    // a retried submission with the same session id is a no-op
    db.submit(&result).unwrap();

    let stored = db.fetch_all().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].session_id, result.session_id);
    assert_eq!(stored[0].username.as_deref(), Some("mira"));
    assert!(stored[0].created_at.is_some());
    assert_eq!(stored[0].wpm, result.wpm);
}

// Headless flow using the runtime without a TTY: keystrokes arrive through
// the serialized event stream and build the full-buffer snapshots.
#[test]
fn headless_typing_flow_completes() {
    let mut session = Session::new("hi".to_string());

    let (tx, rx) = mpsc::channel();
    let es = TestEventSource::new(rx);
    let ticker = FixedTicker::new(Duration::from_millis(5));
    let runner = Runner::new(es, ticker);

    for c in ['h', 'i'] {
        tx.send(AppEvent::Key(KeyEvent::new(
            KeyCode::Char(c),
            KeyModifiers::NONE,
        )))
        .unwrap();
    }

    let mut buffer = String::new();
    let mut finished = None;
    for _ in 0..100u32 {
        match runner.step() {
            AppEvent::Tick => session.on_tick(),
            AppEvent::Resize => {}
            AppEvent::Key(key) => {
                if let KeyCode::Char(c) = key.code {
                    buffer.push(c);
                    finished = session.on_input(&buffer);
                    if finished.is_some() {
                        break;
                    }
                }
            }
        }
    }

    assert!(session.has_finished(), "session should have completed");
    let result = finished.unwrap();
    assert_eq!(result.total_characters, 2);
    assert_eq!(result.correct_characters, 2);
}

#[test]
fn headless_backspace_correction_flow() {
    let mut session = Session::new("ab".to_string());

    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(5)),
    );

    tx.send(AppEvent::Key(KeyEvent::new(
        KeyCode::Char('a'),
        KeyModifiers::NONE,
    )))
    .unwrap();
    tx.send(AppEvent::Key(KeyEvent::new(
        KeyCode::Char('x'),
        KeyModifiers::NONE,
    )))
    .unwrap();
    tx.send(AppEvent::Key(KeyEvent::new(
        KeyCode::Backspace,
        KeyModifiers::NONE,
    )))
    .unwrap();
    tx.send(AppEvent::Key(KeyEvent::new(
        KeyCode::Char('b'),
        KeyModifiers::NONE,
    )))
    .unwrap();

    let mut buffer = String::new();
    let mut finished = None;
    for _ in 0..100u32 {
        match runner.step() {
            AppEvent::Tick => session.on_tick(),
            AppEvent::Resize => {}
            AppEvent::Key(key) => match key.code {
                KeyCode::Char(c) => {
                    buffer.push(c);
                    finished = session.on_input(&buffer);
                    if finished.is_some() {
                        break;
                    }
                }
                KeyCode::Backspace => {
                    buffer.pop();
                    session.on_input(&buffer);
                }
                _ => {}
            },
        }
    }

    assert!(session.has_finished());
    let result = finished.unwrap();
    assert_eq!(result.correct_characters, 2);
    assert_eq!(result.incorrect_characters, 0);
}
