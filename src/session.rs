use crate::clock::{Clock, SystemClock};
use crate::result::TestResult;
use rand::Rng;
use std::time::{Duration, SystemTime};

/// Lifecycle of a single typing attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Active,
    Completed,
}

/// Read-only classification of one reference position against the current
/// input snapshot, for live rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CharState {
    Pending,
    Correct,
    Incorrect,
}

/// One typing attempt: reference text, live input buffer, timing anchor, and
/// the metrics derived from them.
///
/// The engine never diffs incrementally; every input event replaces the whole
/// buffer and metrics are recomputed from that snapshot, so backspace and
/// mid-text edits need no extra state.
#[derive(Debug)]
pub struct Session {
    pub prompt: String,
    pub input: String,
    pub phase: Phase,
    pub started_at: Option<SystemTime>,
    pub wpm: u32,
    pub accuracy: u8,
    pub elapsed_secs: u64,
    prompt_chars: Vec<char>,
    input_chars: Vec<char>,
    clock: Box<dyn Clock>,
}

impl Session {
    pub fn new(prompt: String) -> Self {
        Self::with_clock(prompt, Box::new(SystemClock))
    }

    pub fn with_clock(prompt: String, clock: Box<dyn Clock>) -> Self {
        let prompt_chars = prompt.chars().collect();
        Self {
            prompt,
            input: String::new(),
            phase: Phase::Idle,
            started_at: None,
            wpm: 0,
            accuracy: 100,
            elapsed_secs: 0,
            prompt_chars,
            input_chars: Vec::new(),
            clock,
        }
    }

    /// Discard all attempt state and install a fresh reference text.
    pub fn reset(&mut self, new_prompt: String) {
        self.prompt_chars = new_prompt.chars().collect();
        self.prompt = new_prompt;
        self.input.clear();
        self.input_chars.clear();
        self.phase = Phase::Idle;
        self.started_at = None;
        self.wpm = 0;
        self.accuracy = 100;
        self.elapsed_secs = 0;
    }

    pub fn has_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn has_finished(&self) -> bool {
        self.phase == Phase::Completed
    }

    /// Core transition: replace the input buffer with `new_value`, recompute
    /// accuracy and cumulative WPM, and detect completion.
    ///
    /// Returns the finalized result on the completing call, `None` otherwise.
    /// Exact equality with the reference is the sole completion trigger;
    /// reaching the reference length with any mismatch stays `Active`. Once
    /// `Completed` the session is frozen and further calls are ignored.
    pub fn on_input(&mut self, new_value: &str) -> Option<TestResult> {
        if self.phase == Phase::Completed {
            return None;
        }

        if self.phase == Phase::Idle {
            if new_value.is_empty() {
                return None;
            }
            self.phase = Phase::Active;
            self.started_at = Some(self.clock.now());
        }

        self.input = new_value.to_string();
        self.input_chars = self.input.chars().collect();

        let correct = self
            .input_chars
            .iter()
            .enumerate()
            .filter(|&(i, c)| self.prompt_chars.get(i) == Some(c))
            .count();
        self.accuracy = if self.input_chars.is_empty() {
            100
        } else {
            ((correct as f64 / self.input_chars.len() as f64) * 100.0).round() as u8
        };

        let words = self.input.split_whitespace().count();
        let minutes = self.elapsed().as_secs_f64() / 60.0;
        self.wpm = if minutes > 0.0 {
            (words as f64 / minutes).round() as u32
        } else {
            0
        };
        self.elapsed_secs = self.elapsed().as_secs();

        if self.input == self.prompt {
            self.phase = Phase::Completed;
            return Some(self.finalize());
        }
        None
    }

    /// Advance the displayed elapsed time while the attempt is running.
    /// Input-driven metrics are untouched.
    pub fn on_tick(&mut self) {
        if self.phase == Phase::Active {
            self.elapsed_secs = self.elapsed().as_secs();
        }
    }

    pub fn char_state(&self, idx: usize) -> CharState {
        match self.input_chars.get(idx) {
            None => CharState::Pending,
            Some(&c) if self.prompt_chars.get(idx) == Some(&c) => CharState::Correct,
            Some(_) => CharState::Incorrect,
        }
    }

    /// Classification of every reference position in one pass.
    pub fn char_states(&self) -> Vec<CharState> {
        (0..self.prompt_chars.len())
            .map(|i| self.char_state(i))
            .collect()
    }

    fn elapsed(&self) -> Duration {
        self.started_at
            .map(|t| self.clock.now().duration_since(t).unwrap_or_default())
            .unwrap_or_default()
    }

    fn finalize(&self) -> TestResult {
        let total = self.prompt_chars.len();
        let correct = self
            .input_chars
            .iter()
            .zip(self.prompt_chars.iter())
            .filter(|(typed, expected)| typed == expected)
            .count();

        TestResult {
            wpm: self.wpm,
            accuracy: self.accuracy,
            time_elapsed: self.elapsed_secs,
            total_characters: total,
            correct_characters: correct,
            incorrect_characters: total - correct,
            text_sample: self.prompt.clone(),
            session_id: mint_session_id(self.clock.as_ref()),
            created_at: None,
            username: None,
        }
    }
}

/// Unique submission token: epoch millis plus a random suffix so two
/// completions in the same millisecond still get distinct ids.
fn mint_session_id(clock: &dyn Clock) -> String {
    let millis = clock
        .now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{}-{:04x}", millis, rand::thread_rng().gen::<u16>())
}
