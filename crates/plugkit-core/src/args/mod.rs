//! Declarative command-line argument parsing.
//!
//! A schema is built from positional arguments, named arguments, value
//! options with defaults and boolean flags, then applied to a command line
//! in one pass. A parser constructed with [`Arguments::prefixed`] acts as a
//! namespace that only recognizes `--<prefix>-<key>` options and ignores
//! everything else, which lets several cooperating parsers consume the same
//! command line. [`Arguments::add_skipped_prefix`] declares the namespaces
//! the current parser should step over.
//!
//! Schema misuse (duplicate keys, querying a flag as a value and similar)
//! is a programmer error: it aborts in debug builds and degrades to a
//! logged no-op in release builds. Parse errors are reported to the caller
//! through [`Arguments::try_parse`] and printed to standard error.

use crate::assert::soft_assert;


#[derive(Debug, Clone, PartialEq, Eq)]
enum EntryKind {
    Positional,
    NamedArgument,
    Option { default: String },
    BooleanFlag,
}

#[derive(Debug, Clone)]
struct Entry {
    kind: EntryKind,
    short_key: Option<char>,
    /// Long key, including the namespace prefix in prefixed parsers.
    key: String,
    help: String,
    /// Rendered form, `KEY PLACEHOLDER` for value-taking entries.
    help_key: String,
    /// Slot in the values or booleans vector, depending on the kind.
    id: usize,
}

/// Argument schema and parser.
///
/// ```no_run
/// use plugkit_core::Arguments;
///
/// let mut args = Arguments::new();
/// args.add_argument("input")
///     .set_key_help("input", "file to process")
///     .add_option("output", "out.bin")
///     .set_key_help("output", "where to write the result")
///     .add_boolean_flag_short('v', "verbose");
/// args.parse(std::env::args());
///
/// let input = args.value("input");
/// let verbose = args.is_set("verbose");
/// ```
#[derive(Debug, Clone)]
pub struct Arguments {
    /// Namespace prefix including the trailing dash, empty when unprefixed.
    prefix: String,
    command: Option<String>,
    help_text: Option<String>,
    entries: Vec<Entry>,
    values: Vec<String>,
    booleans: Vec<bool>,
    /// Prefixes to step over, stored with the trailing dash.
    skipped_prefixes: Vec<(String, String)>,
}

const MAX_KEY_COLUMN_WIDTH: usize = 27;

fn verify_key(key: &str) -> bool {
    key.len() > 1
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn verify_short_key(key: char) -> bool {
    key.is_ascii_alphanumeric()
}

impl Default for Arguments {
    fn default() -> Self {
        Arguments::new()
    }
}

impl Arguments {
    fn bare(prefix: String) -> Self {
        Arguments {
            prefix,
            command: None,
            help_text: None,
            entries: Vec::new(),
            values: Vec::new(),
            booleans: Vec::new(),
            skipped_prefixes: Vec::new(),
        }
    }

    /// An unprefixed parser with the reserved `-h, --help` flag.
    pub fn new() -> Self {
        let mut args = Arguments::bare(String::new());
        args.add_boolean_flag_short('h', "help")
            .set_key_help("help", "display this help message and exit");
        args
    }

    /// A prefixed parser recognizing only `--<prefix>-<key>` long options.
    ///
    /// Positional arguments, named arguments and short keys are not
    /// available in this mode; `--<prefix>-help` is the single boolean flag.
    pub fn prefixed(prefix: &str) -> Self {
        let mut args = Arguments::bare(format!("{}-", prefix));
        args.add_boolean_flag("help")
            .set_key_help("help", "display this help message and exit");
        args
    }

    /// Adds a required positional argument, parsed in declaration order.
    pub fn add_argument(&mut self, key: &str) -> &mut Self {
        soft_assert!(
            self.prefix.is_empty(),
            self,
            "argument '{}' not allowed in the prefixed variant",
            key
        );
        soft_assert!(!key.is_empty(), self, "positional argument key must not be empty");
        soft_assert!(
            self.find(key).is_none(),
            self,
            "the key '{}' is already used",
            key
        );

        let id = self.values.len();
        self.values.push(String::new());
        self.push_entry(EntryKind::Positional, None, key.to_string(), id);
        self
    }

    /// Adds a required `--key VALUE` argument.
    pub fn add_named_argument(&mut self, key: &str) -> &mut Self {
        self.named_argument(None, key)
    }

    /// Adds a required `--key VALUE` argument with a short variant.
    pub fn add_named_argument_short(&mut self, short_key: char, key: &str) -> &mut Self {
        self.named_argument(Some(short_key), key)
    }

    fn named_argument(&mut self, short_key: Option<char>, key: &str) -> &mut Self {
        soft_assert!(
            short_key.map_or(true, verify_short_key) && verify_key(key),
            self,
            "invalid key '{}' or its short variant",
            key
        );
        soft_assert!(
            short_key.map_or(true, |c| self.find_short(c).is_none())
                && self.find(&format!("{}{}", self.prefix, key)).is_none(),
            self,
            "the key '{}' or its short variant is already used",
            key
        );
        soft_assert!(
            self.prefix.is_empty(),
            self,
            "named argument '{}' not allowed in the prefixed variant",
            key
        );

        let id = self.values.len();
        self.values.push(String::new());
        self.push_entry(EntryKind::NamedArgument, short_key, key.to_string(), id);
        self
    }

    /// Adds an optional `--key VALUE` option with a default.
    pub fn add_option(&mut self, key: &str, default: &str) -> &mut Self {
        self.option(None, key, default)
    }

    /// Adds an optional `--key VALUE` option with a short variant.
    pub fn add_option_short(&mut self, short_key: char, key: &str, default: &str) -> &mut Self {
        self.option(Some(short_key), key, default)
    }

    fn option(&mut self, short_key: Option<char>, key: &str, default: &str) -> &mut Self {
        soft_assert!(
            short_key.map_or(true, verify_short_key) && verify_key(key),
            self,
            "invalid key '{}' or its short variant",
            key
        );
        soft_assert!(
            short_key.map_or(true, |c| self.find_short(c).is_none())
                && self.find(&format!("{}{}", self.prefix, key)).is_none(),
            self,
            "the key '{}' or its short variant is already used",
            key
        );
        soft_assert!(
            self.prefix.is_empty() || short_key.is_none(),
            self,
            "short option not allowed in the prefixed variant of '{}'",
            key
        );
        soft_assert!(
            !self.has_skipped_prefix(key),
            self,
            "key '{}' conflicts with skipped prefixes",
            key
        );

        let id = self.values.len();
        self.values.push(String::new());
        self.push_entry(
            EntryKind::Option {
                default: default.to_string(),
            },
            short_key,
            key.to_string(),
            id,
        );
        self
    }

    /// Adds a boolean flag, false unless present on the command line.
    pub fn add_boolean_flag(&mut self, key: &str) -> &mut Self {
        self.boolean_flag(None, key)
    }

    /// Adds a boolean flag with a short variant.
    pub fn add_boolean_flag_short(&mut self, short_key: char, key: &str) -> &mut Self {
        self.boolean_flag(Some(short_key), key)
    }

    fn boolean_flag(&mut self, short_key: Option<char>, key: &str) -> &mut Self {
        soft_assert!(
            short_key.map_or(true, verify_short_key) && verify_key(key),
            self,
            "invalid key '{}' or its short variant",
            key
        );
        soft_assert!(
            short_key.map_or(true, |c| self.find_short(c).is_none())
                && self.find(&format!("{}{}", self.prefix, key)).is_none(),
            self,
            "the key '{}' or its short variant is already used",
            key
        );
        soft_assert!(
            self.prefix.is_empty() || key == "help",
            self,
            "boolean flag '{}' not allowed in the prefixed variant",
            key
        );
        soft_assert!(
            !self.has_skipped_prefix(key),
            self,
            "key '{}' conflicts with skipped prefixes",
            key
        );

        let id = self.booleans.len();
        self.booleans.push(false);
        self.push_entry(EntryKind::BooleanFlag, short_key, key.to_string(), id);
        self
    }

    /// Instructs the parser to step over `--<prefix>-...` options, consuming
    /// a following value except for `--<prefix>-help`. Skipped namespaces
    /// show up in usage and help so the application surface stays visible.
    pub fn add_skipped_prefix(&mut self, prefix: &str, help: &str) -> &mut Self {
        soft_assert!(
            !self.has_skipped_prefix(prefix),
            self,
            "skipped prefix '{}' was already added",
            prefix
        );
        let conflicts = self
            .entries
            .iter()
            .any(|entry| entry.key.starts_with(prefix));
        soft_assert!(
            !conflicts,
            self,
            "skipped prefix '{}' conflicts with existing keys",
            prefix
        );

        self.skipped_prefixes
            .push((format!("{}-", prefix), help.to_string()));
        self
    }

    /// Command name used in usage output. Defaults to the first parsed
    /// token.
    pub fn set_command(&mut self, name: &str) -> &mut Self {
        self.command = Some(name.to_string());
        self
    }

    /// Global help text printed between usage and the argument list.
    pub fn set_help(&mut self, help: &str) -> &mut Self {
        soft_assert!(
            self.prefix.is_empty(),
            self,
            "global help text only allowed in the unprefixed variant"
        );
        self.help_text = Some(help.to_string());
        self
    }

    /// Help text of one entry.
    pub fn set_key_help(&mut self, key: &str, help: &str) -> &mut Self {
        let found = self.find(&format!("{}{}", self.prefix, key));
        soft_assert!(found.is_some(), self, "key '{}' does not exist", key);
        self.entries[found.expect("presence checked above")].help = help.to_string();
        self
    }

    /// Overrides the rendered value placeholder of one entry. Unavailable
    /// for boolean flags, which have no value to render.
    pub fn set_help_key(&mut self, key: &str, help_key: &str) -> &mut Self {
        let found = self.find(&format!("{}{}", self.prefix, key));
        soft_assert!(found.is_some(), self, "key '{}' does not exist", key);
        let entry = &mut self.entries[found.expect("presence checked above")];
        soft_assert!(
            entry.kind != EntryKind::BooleanFlag,
            self,
            "help key cannot be set for boolean flag '{}'",
            key
        );

        entry.help_key = match entry.kind {
            EntryKind::NamedArgument | EntryKind::Option { .. } => {
                format!("{} {}", entry.key, help_key)
            }
            _ => help_key.to_string(),
        };
        self
    }

    /// Parses a command line, printing help or usage and exiting the
    /// process when asked to or on failure. On success, control returns to
    /// the caller and values are ready to read.
    pub fn parse<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let status = self.try_parse(args);

        if self.is_set("help") {
            println!("{}", self.help());
            std::process::exit(0);
        }

        if !status {
            eprint!("{}", self.usage());
            std::process::exit(1);
        }
    }

    /// Parses a command line (the first token being the command name) and
    /// reports success. Previously parsed values are reset first.
    pub fn try_parse<I, S>(&mut self, args: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();

        if self.command.is_none() {
            if let Some(first) = args.first() {
                self.command = Some(first.clone());
            }
        }

        for boolean in &mut self.booleans {
            *boolean = false;
        }
        for entry in &self.entries {
            match &entry.kind {
                EntryKind::BooleanFlag => {}
                EntryKind::Option { default } => self.values[entry.id] = default.clone(),
                _ => self.values[entry.id].clear(),
            }
        }

        let mut value_for: Option<usize> = None;
        let mut options_allowed = true;
        let mut next_positional = 0usize;
        let mut parsed = vec![false; self.entries.len()];

        let mut i = 1;
        while i < args.len() {
            let token = &args[i];

            // Value for the entry recognized in the previous step.
            if let Some(index) = value_for {
                let slot = self.entries[index].id;
                self.values[slot] = token.clone();
                parsed[index] = true;
                value_for = None;
                i += 1;
                continue;
            }

            let bytes = token.as_bytes();
            if options_allowed && !bytes.is_empty() && bytes[0] == b'-' {
                let found;

                // Short option.
                if bytes.len() == 2 {
                    // The prefixed variant has no short keys, ignore.
                    if !self.prefix.is_empty() {
                        i += 1;
                        continue;
                    }

                    let key = bytes[1] as char;

                    // Option and positional separator.
                    if key == '-' {
                        options_allowed = false;
                        i += 1;
                        continue;
                    }

                    if !verify_short_key(key) {
                        eprintln!("Invalid command-line argument -{}", key);
                        return false;
                    }
                    match self.find_short(key) {
                        Some(index) => found = index,
                        None => {
                            eprintln!("Unknown command-line argument -{}", key);
                            return false;
                        }
                    }

                // Long option.
                } else if token.starts_with("--") {
                    let key = &token[2..];
                    if !verify_key(key) {
                        eprintln!("Invalid command-line argument --{}", key);
                        return false;
                    }

                    // Not in this parser's namespace, ignore.
                    if !self.prefix.is_empty() && !key.starts_with(self.prefix.as_str()) {
                        i += 1;
                        continue;
                    }

                    // A skipped namespace: ignore the option and its value,
                    // except for the help flag which has none.
                    let mut skip = false;
                    for (prefix, _) in &self.skipped_prefixes {
                        if !key.starts_with(prefix.as_str()) {
                            continue;
                        }
                        skip = true;
                        if key != format!("{}help", prefix) {
                            i += 1;
                        }
                        break;
                    }
                    if skip {
                        i += 1;
                        continue;
                    }

                    match self.find(key) {
                        Some(index) => found = index,
                        None => {
                            eprintln!("Unknown command-line argument --{}", key);
                            return false;
                        }
                    }

                // Long option with a single dash, or a lone dash.
                } else if bytes.len() > 2 {
                    eprintln!(
                        "Invalid command-line argument {} (did you mean -{}?)",
                        token, token
                    );
                    return false;
                } else {
                    eprintln!("Invalid command-line argument {}", token);
                    return false;
                }

                if self.entries[found].kind == EntryKind::BooleanFlag {
                    let slot = self.entries[found].id;
                    self.booleans[slot] = true;
                    parsed[found] = true;
                } else {
                    value_for = Some(found);
                }

            // Positional argument.
            } else {
                // The prefixed variant has no positionals, ignore.
                if !self.prefix.is_empty() {
                    i += 1;
                    continue;
                }

                let Some(index) = self.find_next_positional(next_positional) else {
                    eprintln!("Superfluous command-line argument {}", token);
                    return false;
                };
                let slot = self.entries[index].id;
                self.values[slot] = token.clone();
                parsed[index] = true;
                next_positional = index + 1;
            }

            i += 1;
        }

        if let Some(index) = value_for {
            eprintln!(
                "Missing value for command-line argument {}",
                self.key_name(index)
            );
            return false;
        }

        let mut success = true;
        for (index, entry) in self.entries.iter().enumerate() {
            // Options and flags are not mandatory.
            if matches!(
                entry.kind,
                EntryKind::BooleanFlag | EntryKind::Option { .. }
            ) {
                continue;
            }
            if !parsed[index] {
                eprintln!("Missing command-line argument {}", self.key_name(index));
                success = false;
            }
        }

        success
    }

    /// Value of a positional argument, named argument or option. Asking for
    /// a boolean flag or an unknown key is a programmer error.
    pub fn value(&self, key: &str) -> &str {
        let found = self.find(&format!("{}{}", self.prefix, key));
        soft_assert!(found.is_some(), "", "key '{}' was not found", key);
        let entry = &self.entries[found.expect("presence checked above")];
        soft_assert!(
            entry.kind != EntryKind::BooleanFlag,
            "",
            "cannot use value() for boolean flag '{}'",
            key
        );
        &self.values[entry.id]
    }

    /// Whether a boolean flag was present. Asking for a non-boolean entry
    /// or an unknown key is a programmer error.
    pub fn is_set(&self, key: &str) -> bool {
        let found = self.find(&format!("{}{}", self.prefix, key));
        soft_assert!(found.is_some(), false, "key '{}' was not found", key);
        let entry = &self.entries[found.expect("presence checked above")];
        soft_assert!(
            entry.kind == EntryKind::BooleanFlag,
            false,
            "cannot use is_set() for non-boolean key '{}'",
            key
        );
        self.booleans[entry.id]
    }

    /// One-line usage synopsis.
    pub fn usage(&self) -> String {
        let mut out = String::from("Usage:\n  ");
        out.push_str(self.command.as_deref().unwrap_or("./app"));

        for (prefix, _) in &self.skipped_prefixes {
            out.push_str(&format!(" [--{}...]", prefix));
        }

        let mut has_positionals = false;
        for entry in &self.entries {
            if entry.kind == EntryKind::Positional {
                has_positionals = true;
                continue;
            }

            out.push(' ');
            let optional = matches!(
                entry.kind,
                EntryKind::Option { .. } | EntryKind::BooleanFlag
            );
            if optional {
                out.push('[');
            }
            if let Some(short) = entry.short_key {
                out.push_str(&format!("-{}|", short));
            }
            out.push_str(&format!("--{}", entry.help_key));
            if optional {
                out.push(']');
            }
        }

        // Separator between options and positionals. The help flag makes
        // the option list always non-empty.
        if has_positionals {
            out.push_str(" [--]");
        }
        for entry in &self.entries {
            if entry.kind != EntryKind::Positional {
                continue;
            }
            out.push_str(&format!(" {}", entry.help_key));
        }

        // A prefixed parser handles a slice of a larger command line.
        if !self.prefix.is_empty() {
            out.push_str(" ...");
        }

        out.push('\n');
        out
    }

    /// Usage synopsis followed by the argument list.
    pub fn help(&self) -> String {
        let mut out = self.usage();

        if let Some(help) = &self.help_text {
            out.push_str(&format!("\n{}\n", help));
        }

        // Key column is wide enough for `-h, --help` at minimum and capped
        // so overlong keys only push their own help text aside.
        let mut key_column_width = 11usize;
        for (prefix, _) in &self.skipped_prefixes {
            // Space for `--` in front and `...` at the end.
            key_column_width = key_column_width.max(prefix.len() + 5);
            if key_column_width >= MAX_KEY_COLUMN_WIDTH {
                key_column_width = MAX_KEY_COLUMN_WIDTH;
                break;
            }
        }
        for entry in &self.entries {
            // Entries which will not be printed don't take part.
            let default_empty = match &entry.kind {
                EntryKind::Option { default } => default.is_empty(),
                _ => false,
            };
            if entry.help.is_empty() && default_empty {
                continue;
            }

            let mut current = 1 + entry.help_key.len();
            if entry.kind != EntryKind::Positional {
                current += 2;
                if entry.short_key.is_some() {
                    current += 4;
                }
            }
            key_column_width = key_column_width.max(current);
            if key_column_width >= MAX_KEY_COLUMN_WIDTH {
                key_column_width = MAX_KEY_COLUMN_WIDTH;
                break;
            }
        }

        out.push_str("\nArguments:\n");

        if !self.prefix.is_empty() {
            out.push_str(&format!(
                "  {:<width$} main application arguments\n",
                "...",
                width = key_column_width
            ));
            out.push_str(&format!(
                "{}(see -h or --help for details)\n",
                " ".repeat(key_column_width + 3)
            ));
        }

        // Positional arguments first, those without help text omitted.
        for entry in &self.entries {
            if entry.kind != EntryKind::Positional || entry.help.is_empty() {
                continue;
            }
            out.push_str(&format!(
                "  {:<width$} {}\n",
                entry.help_key,
                entry.help,
                width = key_column_width
            ));
        }

        // Named arguments, options and flags second.
        for entry in &self.entries {
            if entry.kind == EntryKind::Positional {
                continue;
            }
            let default = match &entry.kind {
                EntryKind::Option { default } => default.as_str(),
                _ => "",
            };
            if default.is_empty() && entry.help.is_empty() {
                continue;
            }

            out.push_str("  ");
            if let Some(short) = entry.short_key {
                out.push_str(&format!("-{}, ", short));
            }
            let pad = key_column_width - if entry.short_key.is_some() { 6 } else { 2 };
            out.push_str(&format!("--{:<pad$} ", entry.help_key, pad = pad));

            if !entry.help.is_empty() {
                out.push_str(&format!("{}\n", entry.help));
            }

            // The default goes on its own indented line if there was help
            // text, inline otherwise.
            if !default.is_empty() {
                if !entry.help.is_empty() {
                    out.push_str(&" ".repeat(key_column_width + 3));
                }
                out.push_str(&format!("(default: {})\n", default));
            }
        }

        // Skipped namespaces last.
        for (prefix, help) in &self.skipped_prefixes {
            out.push_str(&format!(
                "  --{:<pad$}",
                format!("{}... ", prefix),
                pad = key_column_width - 1
            ));
            if !help.is_empty() {
                out.push_str(&format!("{}\n{}", help, " ".repeat(key_column_width + 3)));
            }
            out.push_str(&format!("(see --{}help for details)\n", prefix));
        }

        out
    }

    fn push_entry(&mut self, kind: EntryKind, short_key: Option<char>, key: String, id: usize) {
        let full_key = if kind == EntryKind::Positional {
            key
        } else {
            format!("{}{}", self.prefix, key)
        };
        let help_key = match kind {
            EntryKind::NamedArgument | EntryKind::Option { .. } => {
                // The unprefixed key doubles as the default placeholder.
                let placeholder = full_key
                    .strip_prefix(self.prefix.as_str())
                    .unwrap_or(&full_key)
                    .to_uppercase();
                format!("{} {}", full_key, placeholder)
            }
            _ => full_key.clone(),
        };
        self.entries.push(Entry {
            kind,
            short_key,
            key: full_key,
            help: String::new(),
            help_key,
            id,
        });
    }

    fn has_skipped_prefix(&self, key: &str) -> bool {
        self.skipped_prefixes
            .iter()
            .any(|(prefix, _)| key.starts_with(prefix.as_str()))
    }

    fn find(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.key == key)
    }

    fn find_short(&self, short_key: char) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.short_key == Some(short_key))
    }

    fn find_next_positional(&self, start: usize) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, entry)| entry.kind == EntryKind::Positional)
            .map(|(index, _)| index)
    }

    fn key_name(&self, index: usize) -> String {
        let entry = &self.entries[index];
        if entry.kind == EntryKind::Positional {
            entry.help_key.clone()
        } else {
            format!("--{}", entry.key)
        }
    }
}
