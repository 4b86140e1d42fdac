//! Instruction parsing: task text to (target, anchor)

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Robot part concepts appended to prompts that must cover the arm
pub const ROBOT_CONCEPTS: &[&str] = &["robot arm", "robot gripper"];

/// Task-relevant objects named by an instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedInstruction {
    pub target: String,
    pub anchor: Option<String>,
}

/// Known task phrasings with a fixed (target, anchor) pair
const TASK_TEMPLATES: &[(&str, &str, Option<&str>)] = &[
    ("put the spoon on the towel", "spoon", Some("towel")),
    ("put spoon on towel", "spoon", Some("towel")),
    ("put carrot on plate", "carrot", Some("plate")),
    ("put the carrot on the plate", "carrot", Some("plate")),
    ("stack the green block on the yellow block", "green block", Some("yellow block")),
    ("stack green block on yellow block", "green block", Some("yellow block")),
    ("put eggplant into yellow basket", "eggplant", Some("yellow basket")),
    ("put the eggplant in the basket", "eggplant", Some("basket")),
    ("pick coke can", "coke can", None),
    ("pick up the coke can", "coke can", None),
    ("open top drawer", "drawer", None),
    ("open middle drawer", "drawer", None),
    ("open bottom drawer", "drawer", None),
    ("close top drawer", "drawer", None),
    ("close middle drawer", "drawer", None),
    ("close bottom drawer", "drawer", None),
    ("put the black bowl on the plate", "black bowl", Some("plate")),
    ("put the bowl on the stove", "bowl", Some("stove")),
    ("put the cream cheese in the bowl", "cream cheese", Some("bowl")),
    ("put the wine bottle on top of the cabinet", "wine bottle", Some("cabinet")),
];

const ACTION_VERBS: &[&str] = &[
    "put", "place", "pick", "pickup", "move", "grab", "take", "stack", "push", "pull", "lift",
    "set", "drop", "bring", "carry", "open", "close", "turn", "slide", "insert", "transfer",
    "get", "fetch", "up",
];

const ARTICLES: &[&str] = &["the", "a", "an", "please", "it"];

const CONJUNCTIONS: &[&str] = &["and", "then"];

/// Prepositions introducing the anchor, longest first
const PREPOSITIONS: &[&[&str]] = &[
    &["on", "top", "of"],
    &["in", "front", "of"],
    &["next", "to"],
    &["onto"],
    &["into"],
    &["inside"],
    &["on"],
    &["in"],
    &["to"],
    &["near"],
    &["beside"],
    &["under"],
];

/// Two-tier instruction parser: template table first, then a verb/preposition heuristic
#[derive(Debug, Clone, Default)]
pub struct InstructionParser;

impl InstructionParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse an instruction; never fails, worst case a best-effort noun and no anchor
    pub fn parse(&self, instruction: &str) -> ParsedInstruction {
        let tokens = tokenize(instruction);
        let normalized = tokens.join(" ");

        if let Some((_, target, anchor)) = TASK_TEMPLATES.iter().find(|(t, _, _)| *t == normalized) {
            debug!("Instruction {:?} matched task template", instruction);
            return ParsedInstruction {
                target: target.to_string(),
                anchor: anchor.map(|a| a.to_string()),
            };
        }

        let parsed = parse_heuristic(&tokens);
        debug!(
            "Instruction {:?} parsed heuristically: target={:?} anchor={:?}",
            instruction, parsed.target, parsed.anchor
        );
        parsed
    }
}

/// Lowercase words with punctuation removed
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(|w| w.trim_matches('\'').to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

fn is_filler(word: &str) -> bool {
    ACTION_VERBS.contains(&word) || ARTICLES.contains(&word)
}

/// Length of the preposition starting at `tokens[i]`, if any
fn preposition_at(tokens: &[String], i: usize) -> Option<usize> {
    PREPOSITIONS
        .iter()
        .find(|prep| {
            i + prep.len() <= tokens.len()
                && prep.iter().zip(&tokens[i..]).all(|(p, t)| *p == t.as_str())
        })
        .map(|prep| prep.len())
}

/// Content words starting at `start`, stopping at a preposition or conjunction
fn noun_phrase(tokens: &[String], start: usize) -> (Vec<String>, usize) {
    let mut words = Vec::new();
    let mut i = start;
    while i < tokens.len() {
        let word = tokens[i].as_str();
        if CONJUNCTIONS.contains(&word) || (preposition_at(tokens, i).is_some() && !words.is_empty()) {
            break;
        }
        if !is_filler(word) && preposition_at(tokens, i).is_none() {
            words.push(word.to_string());
        }
        i += 1;
    }
    (words, i)
}

fn parse_heuristic(tokens: &[String]) -> ParsedInstruction {
    let (target_words, end) = noun_phrase(tokens, 0);

    let mut anchor = None;
    let mut i = end;
    while i < tokens.len() {
        if CONJUNCTIONS.contains(&tokens[i].as_str()) {
            break;
        }
        if let Some(len) = preposition_at(tokens, i) {
            let (anchor_words, _) = noun_phrase(tokens, i + len);
            if !anchor_words.is_empty() {
                anchor = Some(anchor_words.join(" "));
            }
            break;
        }
        i += 1;
    }

    let target = if target_words.is_empty() {
        // Best effort: last non-filler word, else a generic noun
        tokens
            .iter()
            .rev()
            .find(|w| !is_filler(w) && !PREPOSITIONS.iter().any(|p| p.len() == 1 && p[0] == w.as_str()))
            .cloned()
            .unwrap_or_else(|| "object".to_string())
    } else {
        target_words.join(" ")
    };

    // An anchor identical to the target carries no information
    let anchor = anchor.filter(|a| *a != target);

    ParsedInstruction { target, anchor }
}

/// Join target, anchor and optionally the robot parts into the oracle's
/// concept-list format: "spoon. towel. robot arm. robot gripper"
pub fn build_concept_prompt(target: &str, anchor: Option<&str>, include_robot: bool) -> String {
    let mut concepts: Vec<&str> = vec![target];
    if let Some(anchor) = anchor {
        concepts.push(anchor);
    }
    if include_robot {
        concepts.extend_from_slice(ROBOT_CONCEPTS);
    }
    join_concepts(concepts)
}

/// Join arbitrary concept names into the oracle's concept-list format
pub fn join_concepts<S: AsRef<str>>(concepts: impl IntoIterator<Item = S>) -> String {
    concepts
        .into_iter()
        .map(|c| c.as_ref().trim().to_string())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(". ")
}
