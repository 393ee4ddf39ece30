use include_dir::{include_dir, Dir};
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::from_str;
use std::error::Error;

static PASSAGE_DIR: Dir = include_dir!("src/passages");

/// Substituted whenever the configured text source fails; practicing must
/// stay possible without material from outside.
pub const FALLBACK_PASSAGE: &str = "The quick brown fox jumps over the lazy dog. \
Technology empowers us to achieve new things.";

/// External provider of reference passages.
pub trait TextSource {
    fn fetch_text(&self) -> Result<String, Box<dyn Error>>;
}

/// Fetch from `source`, falling back to the constant passage on any error.
pub fn fetch_or_fallback(source: &dyn TextSource) -> String {
    source
        .fetch_text()
        .unwrap_or_else(|_| FALLBACK_PASSAGE.to_string())
}

#[derive(Deserialize, Clone, Debug)]
pub struct PassageSet {
    pub name: String,
    pub size: u32,
    pub passages: Vec<String>,
}

/// Passage bank embedded at compile time.
#[derive(Clone, Debug)]
pub struct PassageBank {
    set: PassageSet,
}

impl PassageBank {
    pub fn new() -> Self {
        Self {
            set: read_passage_set("english.json".to_string()).unwrap(),
        }
    }
}

impl Default for PassageBank {
    fn default() -> Self {
        Self::new()
    }
}

impl TextSource for PassageBank {
    fn fetch_text(&self) -> Result<String, Box<dyn Error>> {
        self.set
            .passages
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| "empty passage bank".into())
    }
}

/// Source with a fixed passage, for custom prompts and tests.
#[derive(Clone, Debug)]
pub struct FixedTextSource(pub String);

impl TextSource for FixedTextSource {
    fn fetch_text(&self) -> Result<String, Box<dyn Error>> {
        Ok(self.0.clone())
    }
}

fn read_passage_set(file_name: String) -> Result<PassageSet, Box<dyn Error>> {
    let file = PASSAGE_DIR
        .get_file(file_name)
        .expect("Passage file not found");

    let file_as_str = file
        .contents_utf8()
        .expect("Unable to interpret file as a string");

    let set = from_str(file_as_str).expect("Unable to deserialize passage json");

    Ok(set)
}
