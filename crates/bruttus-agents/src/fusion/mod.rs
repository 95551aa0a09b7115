//! Heuristic merge of two independently generated answers.
//!
//! Both providers answer the same prompt and tend to repeat each other. Rather
//! than asking a third model to merge them, the fusion keeps the distinct
//! prose lines as a short summary and the distinct command blocks as one
//! fenced section. Deduplication is exact-text only.

pub mod rules;

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

pub use rules::FusionRules;

/// Summary lines kept in the fused reply.
pub const MAX_BULLETS: usize = 8;
/// Length cap, in characters, for the raw-text fallback.
pub const FALLBACK_CHAR_LIMIT: usize = 2000;
/// Reply used when neither provider produced any text.
pub const EMPTY_REPLY: &str = "Sem conteúdo útil retornado. Tente reenviar.";

const FALLBACK_MARKER: &str = "*(Fusão empregada.)*";
const SUMMARY_HEADING: &str = "**Resumo direto:**";
const COMMANDS_HEADING: &str = "**Comandos:**";

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(.*?)```").expect("fence regex should compile"));

static INFO_STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_+.\-]+$").expect("info string regex should compile")
});

static DEFAULT_RULES: LazyLock<FusionRules> = LazyLock::new(FusionRules::default);

/// Fuse two provider replies with the default rule table.
pub fn fuse(a: Option<&str>, b: Option<&str>) -> String {
    fuse_with(&DEFAULT_RULES, a, b)
}

/// Fuse two provider replies. `a` is processed before `b`, so on ties its
/// lines come first. The result is trimmed and never empty.
pub fn fuse_with(rules: &FusionRules, a: Option<&str>, b: Option<&str>) -> String {
    let inputs: Vec<&str> = [a, b]
        .into_iter()
        .flatten()
        .filter(|s| !s.trim().is_empty())
        .collect();

    let mut blocks = OrderedSet::default();
    let mut bullets = OrderedSet::default();
    for input in &inputs {
        for block in extract_blocks(rules, input) {
            blocks.insert(block);
        }
        for bullet in bullet_candidates(rules, input) {
            bullets.insert(bullet);
        }
    }

    let mut out = String::new();
    if !bullets.is_empty() {
        out.push_str(SUMMARY_HEADING);
        out.push('\n');
        for bullet in bullets.iter().take(MAX_BULLETS) {
            out.push_str("- ");
            out.push_str(bullet);
            out.push('\n');
        }
        out.push('\n');
    }
    if !blocks.is_empty() {
        out.push_str(COMMANDS_HEADING);
        out.push_str("\n```\n");
        out.push_str(&blocks.items.join("\n\n"));
        out.push_str("\n```\n");
    }

    let fused = out.trim();
    if !fused.is_empty() {
        return fused.to_string();
    }
    fallback(&inputs)
}

fn fallback(inputs: &[&str]) -> String {
    let Some(first) = inputs.first() else {
        return EMPTY_REPLY.to_string();
    };
    let mut text: String = first.chars().take(FALLBACK_CHAR_LIMIT).collect();
    if inputs.len() > 1 {
        text.push_str("\n\n");
        text.push_str(FALLBACK_MARKER);
    }
    text.trim().to_string()
}

/// Fenced blocks (trimmed, info string removed) plus one block made of the
/// command-looking lines found outside fences.
fn extract_blocks(rules: &FusionRules, input: &str) -> Vec<String> {
    let mut blocks: Vec<String> = FENCE
        .captures_iter(input)
        .filter_map(|caps| caps.get(1))
        .map(|m| strip_info_string(m.as_str()).trim().to_string())
        .filter(|block| !block.is_empty())
        .collect();

    let unfenced = FENCE.replace_all(input, "\n");
    let command_lines: Vec<&str> = unfenced
        .lines()
        .map(str::trim)
        .filter(|line| rules.is_command_line(line))
        .collect();
    if !command_lines.is_empty() {
        blocks.push(command_lines.join("\n"));
    }
    blocks
}

/// Drop a language tag written on the opening fence line (```` ```bash ````).
/// Content starting on the next line is kept whole, even a one-word command.
fn strip_info_string(raw: &str) -> &str {
    match raw.split_once('\n') {
        Some((first, rest)) if INFO_STRING.is_match(first.trim()) => rest,
        _ => raw,
    }
}

fn bullet_candidates(rules: &FusionRules, input: &str) -> Vec<String> {
    let unfenced = FENCE.replace_all(input, "\n");
    unfenced
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        // an unterminated fence leaves its opening line behind
        .filter(|line| !line.starts_with("```"))
        .filter(|line| !rules.is_shell_prompt(line))
        .filter(|line| !rules.is_disclaimer(line))
        .map(strip_list_marker)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    ["- ", "* ", "• "]
        .iter()
        .find_map(|marker| line.strip_prefix(marker))
        .map(str::trim)
        .unwrap_or(line)
}

/// Insertion-ordered set of strings.
#[derive(Default)]
struct OrderedSet {
    seen: HashSet<String>,
    items: Vec<String>,
}

impl OrderedSet {
    fn insert(&mut self, value: String) {
        if self.seen.insert(value.clone()) {
            self.items.push(value);
        }
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = &String> {
        self.items.iter()
    }
}
