//! Headless mode for the tracker.
//!
//! A simple line-oriented protocol for manual use and scripted smoke tests:
//! - Lines starting with `#` are commands (add, list, select, show, ...)
//! - Any other line is recorded as an interaction with the selected character
//! - Output lines are tagged (`[OK]`, `[ERROR]`, `[RESPONSE]`, ...)

use affinity_core::{
    Character, CharacterDraft, CharacterId, Evaluate, Provider, Tracker, TrackerConfig,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

const HELP: &[&str] = &[
    "  #add name | relationship | personality | description | avatar",
    "                  - Add a character (name and personality required)",
    "  #list           - List characters",
    "  #select <n>     - Select character n from #list",
    "  #show           - Show the selected character and recent history",
    "  #remove <n>     - Remove character n",
    "  #ping           - Check the model provider answers",
    "  #help           - Show this help",
    "  #quit           - Exit",
    "  (anything else is recorded as an interaction with the selected character)",
];

/// How many history entries `#show` prints.
const SHOW_HISTORY: usize = 5;

/// Command line options that override the environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub help: bool,
}

impl Options {
    /// Layer these options over `config`.
    pub fn apply(&self, mut config: TrackerConfig) -> TrackerConfig {
        if let Some(provider) = self.provider {
            config.evaluator.provider = provider;
        }
        if let Some(ref model) = self.model {
            config.evaluator.model = Some(model.clone());
        }
        if let Some(ref dir) = self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(timeout) = self.timeout {
            config.evaluator.timeout = timeout;
        }
        config
    }
}

/// Parse command line arguments (without the program name).
pub fn parse_options(args: &[String]) -> Result<Options, String> {
    let mut options = Options::default();
    let mut args = args.iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => options.help = true,
            "--provider" => {
                let value = value_for(arg, args.next())?;
                options.provider = Some(value.parse::<Provider>().map_err(|e| e.to_string())?);
            }
            "--model" => options.model = Some(value_for(arg, args.next())?.to_string()),
            "--data-dir" => options.data_dir = Some(PathBuf::from(value_for(arg, args.next())?)),
            "--timeout" => {
                let value = value_for(arg, args.next())?;
                let secs: u64 = value
                    .parse()
                    .map_err(|_| format!("--timeout expects seconds, got '{value}'"))?;
                options.timeout = Some(Duration::from_secs(secs));
            }
            other => return Err(format!("unknown argument '{other}'")),
        }
    }

    Ok(options)
}

fn value_for<'a>(flag: &str, value: Option<&'a String>) -> Result<&'a str, String> {
    value
        .map(String::as_str)
        .ok_or_else(|| format!("{flag} needs a value"))
}

/// What the driver should do after a line.
#[derive(Debug, PartialEq)]
pub enum Reply {
    Lines(Vec<String>),
    Quit,
}

/// One interactive session: a tracker plus the current selection.
pub struct Session<E> {
    tracker: Tracker<E>,
    selected: Option<CharacterId>,
}

impl<E: Evaluate> Session<E> {
    pub fn new(tracker: Tracker<E>) -> Self {
        Self {
            tracker,
            selected: None,
        }
    }

    pub fn selected(&self) -> Option<CharacterId> {
        self.selected
    }

    /// Handle one input line.
    pub async fn handle_line(&mut self, line: &str) -> Reply {
        let line = line.trim();
        if line.is_empty() {
            return Reply::Lines(Vec::new());
        }

        let Some(command) = line.strip_prefix('#') else {
            return Reply::Lines(self.record(line).await);
        };

        let (name, rest) = command
            .split_once(char::is_whitespace)
            .map(|(name, rest)| (name, rest.trim()))
            .unwrap_or((command, ""));

        let lines = match name {
            "quit" | "exit" => return Reply::Quit,
            "add" => self.add(rest).await,
            "list" => self.list().await,
            "select" => self.select(rest).await,
            "show" => self.show().await,
            "remove" => self.remove(rest).await,
            "ping" => self.ping().await,
            "help" => {
                let mut lines = vec!["[HELP]".to_string()];
                lines.extend(HELP.iter().map(|l| l.to_string()));
                lines
            }
            _ => vec!["[ERROR] Unknown command. Type #help for help.".to_string()],
        };
        Reply::Lines(lines)
    }

    async fn add(&mut self, rest: &str) -> Vec<String> {
        let fields: Vec<&str> = rest.split('|').map(str::trim).collect();
        let field = |i: usize| fields.get(i).copied().unwrap_or("");

        let draft = CharacterDraft::new(field(0), field(2))
            .with_relationship(field(1))
            .with_description(field(3))
            .with_avatar_url(field(4));

        let missing = draft.missing_fields();
        if !missing.is_empty() {
            return vec![format!(
                "[ERROR] Missing {}. Usage: #add name | relationship | personality | description | avatar",
                missing.join(" and ")
            )];
        }

        let character = self.tracker.add_character(draft).await;
        self.selected = Some(character.id);
        vec![format!(
            "[ADDED] {} ({}) - selected",
            character.name, character.status
        )]
    }

    async fn list(&self) -> Vec<String> {
        let characters = self.tracker.characters().await;
        if characters.is_empty() {
            return vec!["[LIST] No characters yet. Use #add to create one.".to_string()];
        }

        let mut lines = vec!["[LIST]".to_string()];
        for (i, c) in characters.iter().enumerate() {
            let marker = if Some(c.id) == self.selected { "*" } else { " " };
            lines.push(format!(
                "{marker}{:>3}. {} [{}] {} ({}, {})",
                i + 1,
                c.name,
                or_dash(&c.relationship_type),
                c.favorability,
                c.tier(),
                c.status
            ));
        }
        lines
    }

    async fn select(&mut self, rest: &str) -> Vec<String> {
        match self.nth(rest).await {
            Ok(character) => {
                self.selected = Some(character.id);
                vec![format!("[SELECTED] {}", character.name)]
            }
            Err(e) => vec![e],
        }
    }

    async fn show(&self) -> Vec<String> {
        let Some(character) = self.current().await else {
            return vec!["[ERROR] No character selected. Use #select <n>.".to_string()];
        };

        let mut lines = vec![
            format!("[CHARACTER] {}", character.name),
            format!("  Relationship: {}", or_dash(&character.relationship_type)),
            format!("  Personality: {}", character.personality),
            format!("  Background: {}", or_dash(&character.description)),
            format!(
                "  Favorability: {} ({})",
                character.favorability,
                character.tier()
            ),
            format!("  Status: {}", character.status),
            format!("  Interactions: {}", character.history.len()),
        ];
        for interaction in character.history.iter().take(SHOW_HISTORY) {
            lines.push(format!(
                "  {} {:+} \"{}\" -> {}",
                interaction.timestamp.format("%Y-%m-%d %H:%M"),
                interaction.favorability_change,
                interaction.user_input,
                interaction.character_response
            ));
        }
        lines
    }

    async fn remove(&mut self, rest: &str) -> Vec<String> {
        let character = match self.nth(rest).await {
            Ok(character) => character,
            Err(e) => return vec![e],
        };

        self.tracker.remove_character(character.id).await;
        if self.selected == Some(character.id) {
            self.selected = None;
        }
        vec![format!("[REMOVED] {}", character.name)]
    }

    async fn ping(&self) -> Vec<String> {
        match self.tracker.evaluator().test_connection().await {
            Ok(()) => vec!["[OK] Model provider is reachable".to_string()],
            Err(e) => vec![format!("[ERROR] {}", e.user_message())],
        }
    }

    async fn record(&mut self, text: &str) -> Vec<String> {
        let Some(id) = self.selected else {
            return vec!["[ERROR] No character selected. Use #add or #select <n>.".to_string()];
        };

        match self.tracker.record_interaction(id, text).await {
            Ok(recorded) => {
                let mut lines = vec![
                    "[RESPONSE]".to_string(),
                    recorded.verdict.character_response.clone(),
                ];
                if let Some(ref reasoning) = recorded.verdict.reasoning {
                    lines.push(format!("[REASONING] {reasoning}"));
                }
                if let Some(character) = recorded.character {
                    lines.push(format!(
                        "[STATUS] {:+} -> {} ({}), {}",
                        recorded.verdict.favorability_change,
                        character.favorability,
                        character.tier(),
                        character.status
                    ));
                }
                lines
            }
            Err(e) => vec![format!("[ERROR] {}", e.user_message())],
        }
    }

    async fn current(&self) -> Option<Character> {
        self.tracker.character(self.selected?).await
    }

    /// Resolve a 1-based list position.
    async fn nth(&self, arg: &str) -> Result<Character, String> {
        let n: usize = arg
            .parse()
            .map_err(|_| format!("[ERROR] Expected a list number, got '{arg}'"))?;

        let characters = self.tracker.characters().await;
        n.checked_sub(1)
            .and_then(|i| characters.get(i))
            .cloned()
            .ok_or_else(|| format!("[ERROR] No character #{n}. Use #list."))
    }
}

fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}

/// Run the line protocol over stdin/stdout until EOF or `#quit`.
pub async fn run_headless<E: Evaluate>(tracker: Tracker<E>) -> io::Result<()> {
    let mut session = Session::new(tracker);
    let count = session.tracker.characters().await.len();

    println!("=== Affinity Headless Mode ===");
    println!("Characters: {count}");
    println!();
    println!("Commands:");
    for line in HELP {
        println!("{line}");
    }
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        let is_interaction = !line.trim().is_empty() && !line.trim_start().starts_with('#');
        if is_interaction {
            print!("[PROCESSING]");
            stdout.flush()?;
        }

        let reply = session.handle_line(&line).await;

        if is_interaction {
            // Clear the processing indicator
            print!("\r            \r");
        }

        match reply {
            Reply::Quit => {
                println!("Goodbye!");
                break;
            }
            Reply::Lines(lines) => {
                for line in lines {
                    println!("{line}");
                }
            }
        }
        stdout.flush()?;
    }

    Ok(())
}
