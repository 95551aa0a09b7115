use bruttus_config::FusionConfig;
use regex::Regex;

/// Tools whose invocation lines are lifted into the commands section.
pub const DEFAULT_TOOLS: &[&str] = &[
    "nmap",
    "nikto",
    "ffuf",
    "burp",
    "sqlmap",
    "amass",
    "subfinder",
    "httpx",
    "feroxbuster",
    "wpscan",
    "whatweb",
    "dnsrecon",
    "dig",
    "curl",
    "wget",
    "dirsearch",
    "gobuster",
    "masscan",
];

/// Phrases that mark a refusal, an apology or the model talking about itself.
/// Matched case-insensitively anywhere in a line.
pub const DEFAULT_DISCLAIMERS: &[&str] = &[
    "sou um modelo",
    "desculp",
    "como IA",
    "agrade",
    "por favor",
    "as an ai",
    "language model",
    "i'm sorry",
];

/// Line prefixes that mark a shell prompt. Matched case-sensitively.
pub const DEFAULT_SHELL_PROMPTS: &[&str] = &["$", "sudo "];

/// The heuristic rule table behind [`super::fuse_with`].
///
/// Rules are plain lists compiled into regexes, so a locale or a tool can be
/// added without touching the fusion algorithm.
#[derive(Debug, Clone)]
pub struct FusionRules {
    tools: Vec<String>,
    disclaimers: Vec<String>,
    shell_prompts: Vec<String>,
    command_line: Option<Regex>,
    disclaimer: Option<Regex>,
}

impl Default for FusionRules {
    fn default() -> Self {
        Self::new(DEFAULT_TOOLS, DEFAULT_DISCLAIMERS, DEFAULT_SHELL_PROMPTS)
    }
}

impl FusionRules {
    pub fn new<S: AsRef<str>>(tools: &[S], disclaimers: &[S], shell_prompts: &[S]) -> Self {
        let owned = |items: &[S]| {
            items
                .iter()
                .map(|s| s.as_ref().to_string())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        };
        let mut rules = Self {
            tools: owned(tools),
            disclaimers: owned(disclaimers),
            shell_prompts: owned(shell_prompts),
            command_line: None,
            disclaimer: None,
        };
        rules.compile();
        rules
    }

    /// Built-in tables extended with the configured extras.
    pub fn from_config(config: &FusionConfig) -> Self {
        let mut rules = Self::default();
        let non_blank = |items: &[String]| {
            items
                .iter()
                .filter(|s| !s.trim().is_empty())
                .cloned()
                .collect::<Vec<_>>()
        };
        rules.tools.extend(non_blank(&config.extra_tools));
        rules.disclaimers.extend(non_blank(&config.extra_disclaimers));
        rules.compile();
        rules
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tools.push(tool.into());
        self.compile();
        self
    }

    pub fn with_disclaimer(mut self, phrase: impl Into<String>) -> Self {
        self.disclaimers.push(phrase.into());
        self.compile();
        self
    }

    /// A trimmed line that looks like a command: shell prompt or a known
    /// tool name as its first word (case-insensitive).
    pub fn is_command_line(&self, line: &str) -> bool {
        self.command_line.as_ref().is_some_and(|re| re.is_match(line))
    }

    pub fn is_shell_prompt(&self, line: &str) -> bool {
        self.shell_prompts.iter().any(|p| line.starts_with(p.as_str()))
    }

    pub fn is_disclaimer(&self, line: &str) -> bool {
        self.disclaimer.as_ref().is_some_and(|re| re.is_match(line))
    }

    fn compile(&mut self) {
        let prompts = alternation(&self.shell_prompts);
        let tools = alternation(&self.tools).map(|alt| format!(r"(?:{alt})\b"));
        let command = match (prompts, tools) {
            (Some(p), Some(t)) => Some(format!("{p}|{t}")),
            (Some(p), None) => Some(p),
            (None, Some(t)) => Some(t),
            (None, None) => None,
        };

        self.command_line = command.and_then(|alt| compile(&format!("(?i)^(?:{alt})")));
        self.disclaimer =
            alternation(&self.disclaimers).and_then(|alt| compile(&format!("(?i)(?:{alt})")));
    }
}

fn alternation(items: &[String]) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    Some(
        items
            .iter()
            .map(|item| regex::escape(item))
            .collect::<Vec<_>>()
            .join("|"),
    )
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!("fusion rule failed to compile: {e}");
            None
        }
    }
}
