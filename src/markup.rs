//! Minimal tag markup for colored and aligned terminal text.
//!
//! Wrap text in `<color-name>...</>` to colorize it. Each color tag replaces
//! the current color and any closing color tag (including the bare `</>`)
//! switches back to the default. Attributes use matching pairs: `<b>...</b>`
//! for bold, `<u>...</u>` for underline, `<r>...</r>` for reverse. They stack
//! on top of whatever color is active. `<right>...</right>` right-aligns the
//! enclosed text against the terminal edge and has no visual attribute.
//!
//! ```text
//! <green>Hello, <red>world!</>
//! ```

use anyhow::{Context, Result};
use ratatui::style::{Color, Modifier, Style};
use regex::Regex;
use std::collections::BTreeMap;

/// What a tag name translates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// Base foreground color; only one may be active at a time.
    Color(Color),
    /// Bold/underline/reverse bit, composable with the color.
    Attribute(Modifier),
    /// Right alignment toggle.
    Right,
    /// The bare `</>` closer.
    Reset,
}

/// Style state while rendering a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkupState {
    pub foreground: Color,
    pub background: Color,
    pub attributes: Modifier,
    pub right_aligned: bool,
}

impl Default for MarkupState {
    fn default() -> Self {
        Self {
            foreground: Color::Reset,
            background: Color::Reset,
            attributes: Modifier::empty(),
            right_aligned: false,
        }
    }
}

impl MarkupState {
    /// Terminal style for the text that follows.
    pub fn style(&self) -> Style {
        Style::default()
            .fg(self.foreground)
            .bg(self.background)
            .add_modifier(self.attributes)
    }
}

/// Tag table plus the alternation pattern that recognizes its names.
#[derive(Debug, Clone)]
pub struct Markup {
    tags: BTreeMap<String, Tag>,
    regex: Regex,
    state: MarkupState,
}

impl Markup {
    /// Build the default tag table extended with user-defined colors.
    pub fn new(custom_colors: &BTreeMap<String, Color>) -> Result<Self> {
        let tags = default_tags();
        let mut markup = Self {
            regex: supported_tags(&tags)?,
            tags,
            state: MarkupState::default(),
        };
        for (name, color) in custom_colors {
            markup.add_color(name, *color)?;
        }
        Ok(markup)
    }

    /// Register an extra color tag and rebuild the tag pattern.
    pub fn add_color(&mut self, name: &str, color: Color) -> Result<()> {
        self.tags.insert(name.to_string(), Tag::Color(color));
        self.regex = supported_tags(&self.tags)?;
        Ok(())
    }

    /// Current style state.
    pub fn state(&self) -> &MarkupState {
        &self.state
    }

    /// Back to default attributes; called at the start of every line.
    pub fn reset(&mut self) {
        self.state = MarkupState::default();
    }

    /// Split text into literal runs and known tags, keeping the tags.
    ///
    /// ```text
    /// "<green>Hello, <red>world!</>" => ["<green>", "Hello, ", "<red>", "world!", "</>"]
    /// ```
    pub fn tokenize<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut tokens = Vec::new();
        let mut head = 0;

        for found in self.regex.find_iter(text) {
            if found.start() > head {
                tokens.push(&text[head..found.start()]);
            }
            tokens.push(found.as_str());
            head = found.end();
        }
        if head < text.len() {
            tokens.push(&text[head..]);
        }

        tokens
    }

    /// Returns true and updates the style state when the token is a known tag.
    /// Anything else, including unknown `<x>` text, is literal.
    pub fn is_tag(&mut self, token: &str) -> bool {
        match split_tag(token) {
            Some((name, open)) => match self.tags.get(name).copied() {
                Some(tag) => {
                    self.process(tag, open);
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    fn process(&mut self, tag: Tag, open: bool) {
        match tag {
            Tag::Right => self.state.right_aligned = open,
            Tag::Attribute(bit) => {
                if open {
                    self.state.attributes.insert(bit);
                } else {
                    self.state.attributes.remove(bit);
                }
            }
            Tag::Color(color) => {
                self.state.foreground = if open { color } else { Color::Reset };
            }
            Tag::Reset => self.state.foreground = Color::Reset,
        }
    }
}

fn default_tags() -> BTreeMap<String, Tag> {
    let entries = [
        ("/", Tag::Reset),
        ("black", Tag::Color(Color::Black)),
        ("red", Tag::Color(Color::Red)),
        ("green", Tag::Color(Color::Green)),
        ("yellow", Tag::Color(Color::Yellow)),
        ("blue", Tag::Color(Color::Blue)),
        ("magenta", Tag::Color(Color::Magenta)),
        ("cyan", Tag::Color(Color::Cyan)),
        ("white", Tag::Color(Color::White)),
        ("gray", Tag::Color(Color::Gray)),
        ("right", Tag::Right),
        ("b", Tag::Attribute(Modifier::BOLD)),
        ("u", Tag::Attribute(Modifier::UNDERLINED)),
        ("r", Tag::Attribute(Modifier::REVERSED)),
    ];

    entries
        .into_iter()
        .map(|(name, tag)| (name.to_string(), tag))
        .collect()
}

/// `</?black>|</?red>| ... |</?right>|</>`
fn supported_tags(tags: &BTreeMap<String, Tag>) -> Result<Regex> {
    let names: Vec<String> = tags
        .keys()
        .filter(|name| name.as_str() != "/")
        .map(|name| regex::escape(name))
        .collect();
    let pattern = format!("</>|</?(?:{})>", names.join("|"));

    Regex::new(&pattern).context("Failed to build markup tag pattern")
}

/// `<hello>` => ("hello", true), `</hello>` => ("hello", false), `</>` => ("/", false).
fn split_tag(token: &str) -> Option<(&str, bool)> {
    if token.len() < 3 || !token.starts_with('<') || !token.ends_with('>') {
        return None;
    }

    let inner = &token[1..token.len() - 1];
    match inner.strip_prefix('/') {
        Some("") => Some(("/", false)),
        Some(name) => Some((name, false)),
        None => Some((inner, true)),
    }
}
