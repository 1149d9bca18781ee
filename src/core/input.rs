//! Keystroke normalization.
//!
//! Turns one raw terminal sequence (as split by
//! [`KeystrokeBuffer`](crate::platform::keystroke_buffer::KeystrokeBuffer)) into a
//! [`NormalizedKey`]. Legacy xterm/rxvt/SS3 encodings, xterm modifier parameters,
//! modifyOtherKeys and the kitty `CSI u` protocol are understood. Anything else is passed
//! through as [`KeyName::Unknown`] with `raw` intact.

use std::borrow::Cow;

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthChar;

const ESC: char = '\x1b';

const MOD_SHIFT: u8 = 1;
const MOD_ALT: u8 = 2;
const MOD_CTRL: u8 = 4;
const MOD_SUPER: u8 = 8;
const LOCK_MASK: u8 = 64 + 128;

const CODEPOINT_ESCAPE: u32 = 27;
const CODEPOINT_TAB: u32 = 9;
const CODEPOINT_ENTER: u32 = 13;
const CODEPOINT_SPACE: u32 = 32;
const CODEPOINT_BACKSPACE: u32 = 127;
const CODEPOINT_KP_ENTER: u32 = 57414;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyEventType {
    #[default]
    Press,
    Repeat,
    Release,
}

/// Logical key identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyName {
    Return,
    Escape,
    Tab,
    Backspace,
    Delete,
    Insert,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Space,
    Function(u8),
    /// A single printable character (or the letter of a Ctrl combination).
    Char(char),
    /// A printable grapheme made of several codepoints; see [`NormalizedKey::text`].
    Text,
    /// Bracketed paste; see [`NormalizedKey::text`].
    Paste,
    Unknown,
}

impl KeyName {
    fn from_id(name: &str) -> Option<Self> {
        let key = match name {
            "enter" | "return" => Self::Return,
            "esc" | "escape" => Self::Escape,
            "tab" => Self::Tab,
            "backspace" => Self::Backspace,
            "delete" => Self::Delete,
            "insert" => Self::Insert,
            "up" => Self::Up,
            "down" => Self::Down,
            "left" => Self::Left,
            "right" => Self::Right,
            "home" => Self::Home,
            "end" => Self::End,
            "pageup" => Self::PageUp,
            "pagedown" => Self::PageDown,
            "space" => Self::Space,
            "paste" => Self::Paste,
            other => {
                if let Some(num) = other.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
                    if (1..=12).contains(&num) {
                        return Some(Self::Function(num));
                    }
                }
                let mut chars = other.chars();
                let ch = chars.next()?;
                if chars.next().is_some() {
                    return None;
                }
                Self::Char(ch)
            }
        };
        Some(key)
    }
}

/// Canonical form of one keystroke. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedKey {
    pub name: KeyName,
    pub ctrl: bool,
    pub shift: bool,
    pub meta: bool,
    /// Exact sequence received from the terminal.
    pub raw: String,
    /// Printable payload for characters, text and paste.
    pub text: Option<String>,
    pub event_type: KeyEventType,
}

impl NormalizedKey {
    pub fn new(name: KeyName) -> Self {
        let text = match name {
            KeyName::Char(ch) if !ch.is_control() => Some(ch.to_string()),
            KeyName::Space => Some(" ".to_string()),
            _ => None,
        };
        Self {
            name,
            ctrl: false,
            shift: false,
            meta: false,
            raw: String::new(),
            text,
            event_type: KeyEventType::Press,
        }
    }

    pub fn paste(text: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            raw: raw.into(),
            ..Self::new(KeyName::Paste)
        }
    }

    pub fn unknown(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            ..Self::new(KeyName::Unknown)
        }
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self.text = None;
        self
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn with_meta(mut self) -> Self {
        self.meta = true;
        self.text = None;
        self
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = raw.into();
        self
    }

    pub fn with_event_type(mut self, event_type: KeyEventType) -> Self {
        self.event_type = event_type;
        self
    }

    fn with_modifier_bits(mut self, modifier: u8) -> Self {
        let modifier = modifier & !LOCK_MASK;
        if modifier & MOD_SHIFT != 0 {
            self = self.with_shift();
        }
        if modifier & (MOD_ALT | MOD_SUPER) != 0 {
            self = self.with_meta();
        }
        if modifier & MOD_CTRL != 0 {
            self = self.with_ctrl();
        }
        self
    }

    /// Ctrl+C.
    pub fn is_interrupt(&self) -> bool {
        self.ctrl && !self.meta && matches!(self.name, KeyName::Char('c' | 'C'))
    }

    pub fn is_release(&self) -> bool {
        self.event_type == KeyEventType::Release
    }

    pub fn is_unknown(&self) -> bool {
        self.name == KeyName::Unknown
    }

    /// Textual identifier such as `"ctrl+c"`, `"shift+tab"` or `"return"`.
    pub fn key_id(&self) -> String {
        let (name, implied_shift) = self.base_id();
        let mut id = String::new();
        if self.shift || implied_shift {
            id.push_str("shift+");
        }
        if self.ctrl {
            id.push_str("ctrl+");
        }
        if self.meta {
            id.push_str("meta+");
        }
        id.push_str(&name);
        id
    }

    /// Whether this key matches an identifier like `"ctrl+c"`, `"enter"` or `"alt+left"`.
    ///
    /// Identifiers are case-insensitive; `alt` is accepted for `meta`, `enter` for `return`
    /// and `esc` for `escape`. An uppercase character matches its `shift+` form.
    pub fn matches(&self, key_id: &str) -> bool {
        let lowered = key_id.to_lowercase();
        let parts: Vec<&str> = lowered.split('+').collect();
        let Some(&last) = parts.last() else {
            return false;
        };
        // "ctrl++" names the plus key.
        let key_part = if last.is_empty() && lowered.ends_with("++") {
            "+"
        } else {
            last
        };
        let Some(expected) = KeyName::from_id(key_part) else {
            return false;
        };
        let modifiers = &parts[..parts.len() - 1];
        let want_ctrl = modifiers.contains(&"ctrl");
        let want_shift = modifiers.contains(&"shift");
        let want_meta = modifiers.iter().any(|part| *part == "meta" || *part == "alt");

        let (name_matches, implied_shift) = match (self.name, expected) {
            (KeyName::Char(actual), KeyName::Char(wanted)) => {
                let implied = actual.is_ascii_uppercase();
                (actual.to_ascii_lowercase() == wanted, implied)
            }
            (actual, wanted) => (actual == wanted, false),
        };

        name_matches
            && self.ctrl == want_ctrl
            && self.meta == want_meta
            && (self.shift || implied_shift) == want_shift
    }

    fn base_id(&self) -> (Cow<'static, str>, bool) {
        let name: Cow<'static, str> = match self.name {
            KeyName::Return => "return".into(),
            KeyName::Escape => "escape".into(),
            KeyName::Tab => "tab".into(),
            KeyName::Backspace => "backspace".into(),
            KeyName::Delete => "delete".into(),
            KeyName::Insert => "insert".into(),
            KeyName::Up => "up".into(),
            KeyName::Down => "down".into(),
            KeyName::Left => "left".into(),
            KeyName::Right => "right".into(),
            KeyName::Home => "home".into(),
            KeyName::End => "end".into(),
            KeyName::PageUp => "pageup".into(),
            KeyName::PageDown => "pagedown".into(),
            KeyName::Space => "space".into(),
            KeyName::Function(num) => format!("f{num}").into(),
            KeyName::Char(ch) if ch.is_ascii_uppercase() => {
                return (ch.to_ascii_lowercase().to_string().into(), true);
            }
            KeyName::Char(ch) => ch.to_string().into(),
            KeyName::Text => self.text.clone().unwrap_or_default().into(),
            KeyName::Paste => "paste".into(),
            KeyName::Unknown => "unknown".into(),
        };
        (name, false)
    }
}

/// Raw sequence to [`NormalizedKey`] mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    kitty_protocol: bool,
}

impl Normalizer {
    pub fn new(kitty_protocol: bool) -> Self {
        Self { kitty_protocol }
    }

    pub fn kitty_protocol(&self) -> bool {
        self.kitty_protocol
    }

    pub fn set_kitty_protocol(&mut self, active: bool) {
        self.kitty_protocol = active;
    }

    /// Normalizes a raw read after [`decode_input`].
    pub fn normalize_bytes(&self, data: &[u8]) -> NormalizedKey {
        self.normalize(&decode_input(data))
    }

    pub fn normalize(&self, raw: &str) -> NormalizedKey {
        self.parse(raw)
            .unwrap_or_else(|| NormalizedKey::unknown(raw))
            .with_raw(raw)
    }

    fn parse(&self, raw: &str) -> Option<NormalizedKey> {
        if raw.is_empty() {
            return None;
        }

        if let Some(body) = raw.strip_prefix("\x1b[") {
            if body.is_empty() {
                return Some(NormalizedKey::new(KeyName::Char('[')).with_meta());
            }
            return parse_csi(body);
        }
        if let Some(body) = raw.strip_prefix("\x1bO") {
            if body.is_empty() {
                return Some(
                    NormalizedKey::new(KeyName::Char('O'))
                        .with_shift()
                        .with_meta(),
                );
            }
            return parse_ss3(body);
        }

        if raw == "\x1b" {
            return Some(NormalizedKey::new(KeyName::Escape));
        }
        if let Some(rest) = raw.strip_prefix(ESC) {
            if self.kitty_protocol && rest == "\r" {
                return Some(NormalizedKey::new(KeyName::Return).with_shift());
            }
            let inner = if rest == "\x1b" {
                Some(NormalizedKey::new(KeyName::Escape))
            } else {
                self.parse_plain(rest)
            };
            return inner.map(NormalizedKey::with_meta);
        }

        self.parse_plain(raw)
    }

    fn parse_plain(&self, raw: &str) -> Option<NormalizedKey> {
        let mut chars = raw.chars();
        let first = chars.next()?;
        let single = chars.next().is_none();

        if single {
            let key = match first {
                '\r' => NormalizedKey::new(KeyName::Return),
                '\n' if self.kitty_protocol => NormalizedKey::new(KeyName::Return).with_shift(),
                '\n' => NormalizedKey::new(KeyName::Return),
                '\t' => NormalizedKey::new(KeyName::Tab),
                '\x7f' | '\x08' => NormalizedKey::new(KeyName::Backspace),
                '\x00' => NormalizedKey::new(KeyName::Space).with_ctrl(),
                ' ' => NormalizedKey::new(KeyName::Space),
                '\x1c' => NormalizedKey::new(KeyName::Char('\\')).with_ctrl(),
                '\x1d' => NormalizedKey::new(KeyName::Char(']')).with_ctrl(),
                '\x1e' => NormalizedKey::new(KeyName::Char('^')).with_ctrl(),
                '\x1f' => NormalizedKey::new(KeyName::Char('-')).with_ctrl(),
                ch @ '\x01'..='\x1a' => {
                    let letter = ((ch as u8) + 96) as char;
                    NormalizedKey::new(KeyName::Char(letter)).with_ctrl()
                }
                ch if is_printable(ch) => {
                    let key = NormalizedKey::new(KeyName::Char(ch));
                    if ch.is_ascii_uppercase() {
                        key.with_shift()
                    } else {
                        key
                    }
                }
                _ => return None,
            };
            return Some(key);
        }

        let one_grapheme = raw.graphemes(true).nth(1).is_none();
        if one_grapheme && raw.chars().all(is_printable_in_cluster) {
            let mut key = NormalizedKey::new(KeyName::Text);
            key.text = Some(raw.to_string());
            return Some(key);
        }

        None
    }
}

/// Normalizes with the kitty protocol off.
/// Decodes a raw terminal read. A lone high-bit byte is legacy meta (`ESC` + byte-128);
/// anything else is UTF-8 with replacement.
pub fn decode_input(data: &[u8]) -> Cow<'_, str> {
    match data {
        [byte] if *byte > 127 => {
            let mut converted = String::from(ESC);
            converted.push(char::from(byte - 128));
            Cow::Owned(converted)
        }
        _ => String::from_utf8_lossy(data),
    }
}

pub fn normalize(raw: &str) -> NormalizedKey {
    Normalizer::default().normalize(raw)
}

fn is_printable(ch: char) -> bool {
    !ch.is_control() && UnicodeWidthChar::width(ch).is_some()
}

fn is_printable_in_cluster(ch: char) -> bool {
    // ZWJ and variation selectors are format characters but belong inside emoji clusters.
    is_printable(ch) || matches!(ch, '\u{200D}' | '\u{FE00}'..='\u{FE0F}')
}

fn parse_event_type(event_type: Option<&str>) -> KeyEventType {
    match event_type.and_then(|value| value.parse::<u8>().ok()) {
        Some(2) => KeyEventType::Repeat,
        Some(3) => KeyEventType::Release,
        _ => KeyEventType::Press,
    }
}

/// Splits `"<mod>[:<event>]"` into modifier bits (already minus one) and event type.
fn parse_modifier_param(param: Option<&str>) -> (u8, KeyEventType) {
    let Some(param) = param else {
        return (0, KeyEventType::Press);
    };
    let (mod_value, event_value) = match param.split_once(':') {
        Some((left, right)) => (left, Some(right)),
        None => (param, None),
    };
    let mod_value = mod_value.parse::<u8>().unwrap_or(1);
    (mod_value.saturating_sub(1), parse_event_type(event_value))
}

fn parse_csi(body: &str) -> Option<NormalizedKey> {
    let final_char = body.chars().last()?;
    let params = &body[..body.len() - final_char.len_utf8()];

    match final_char {
        'u' => parse_kitty_u(params),
        '~' => parse_tilde(params),
        '$' | '^' => {
            let name = tilde_key(params.parse::<u16>().ok()?)?;
            let key = NormalizedKey::new(name);
            Some(if final_char == '$' {
                key.with_shift()
            } else {
                key.with_ctrl()
            })
        }
        'Z' if params.is_empty() => Some(NormalizedKey::new(KeyName::Tab).with_shift()),
        'a' | 'b' | 'c' | 'd' | 'e' if params.is_empty() => {
            let name = letter_key(final_char.to_ascii_uppercase())?;
            Some(NormalizedKey::new(name).with_shift())
        }
        _ => {
            // Linux console F1-F5: ESC [ [ A..E
            if params == "[" {
                return match final_char {
                    'A'..='E' => Some(NormalizedKey::new(KeyName::Function(
                        final_char as u8 - b'A' + 1,
                    ))),
                    _ => None,
                };
            }
            let name = letter_key(final_char)?;
            let (modifier, event_type) = match params {
                "" => (0, KeyEventType::Press),
                _ => {
                    let modifiers = params.strip_prefix("1;")?;
                    parse_modifier_param(Some(modifiers))
                }
            };
            Some(
                NormalizedKey::new(name)
                    .with_modifier_bits(modifier)
                    .with_event_type(event_type),
            )
        }
    }
}

fn parse_ss3(body: &str) -> Option<NormalizedKey> {
    let mut chars = body.chars();
    let final_char = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    match final_char {
        'M' => Some(NormalizedKey::new(KeyName::Return)),
        'a' | 'b' | 'c' | 'd' | 'e' => {
            let name = letter_key(final_char.to_ascii_uppercase())?;
            Some(NormalizedKey::new(name).with_ctrl())
        }
        other => letter_key(other).map(NormalizedKey::new),
    }
}

fn letter_key(final_char: char) -> Option<KeyName> {
    let name = match final_char {
        'A' => KeyName::Up,
        'B' => KeyName::Down,
        'C' => KeyName::Right,
        'D' => KeyName::Left,
        // Keypad 5 ("clear") has no logical meaning here.
        'E' => KeyName::Unknown,
        'H' => KeyName::Home,
        'F' => KeyName::End,
        'P' => KeyName::Function(1),
        'Q' => KeyName::Function(2),
        'R' => KeyName::Function(3),
        'S' => KeyName::Function(4),
        _ => return None,
    };
    Some(name)
}

fn tilde_key(num: u16) -> Option<KeyName> {
    let name = match num {
        1 | 7 => KeyName::Home,
        2 => KeyName::Insert,
        3 => KeyName::Delete,
        4 | 8 => KeyName::End,
        5 => KeyName::PageUp,
        6 => KeyName::PageDown,
        11..=15 => KeyName::Function((num - 10) as u8),
        17..=21 => KeyName::Function((num - 11) as u8),
        23 | 24 => KeyName::Function((num - 12) as u8),
        _ => return None,
    };
    Some(name)
}

fn parse_tilde(params: &str) -> Option<NormalizedKey> {
    let mut parts = params.split(';');
    let first = parts.next()?;
    let second = parts.next();
    let third = parts.next();
    if parts.next().is_some() {
        return None;
    }

    // xterm modifyOtherKeys: CSI 27 ; <mod> ; <code> ~
    if first == "27" {
        let (modifier, event_type) = parse_modifier_param(second);
        let code = third?.parse::<u32>().ok()?;
        return codepoint_key(code, None).map(|key| {
            key.with_modifier_bits(modifier)
                .with_event_type(event_type)
        });
    }
    if third.is_some() {
        return None;
    }

    let name = tilde_key(first.parse::<u16>().ok()?)?;
    let (modifier, event_type) = parse_modifier_param(second);
    Some(
        NormalizedKey::new(name)
            .with_modifier_bits(modifier)
            .with_event_type(event_type),
    )
}

/// Kitty keyboard protocol: `CSI code[:shifted[:base]] [; mods[:event]] u`.
fn parse_kitty_u(params: &str) -> Option<NormalizedKey> {
    let (code_part, mod_part) = match params.split_once(';') {
        Some((left, right)) => (left, Some(right)),
        None => (params, None),
    };

    let mut code_iter = code_part.split(':');
    let codepoint = code_iter.next()?.parse::<u32>().ok()?;
    let _shifted = code_iter.next();
    let base_layout_key = code_iter.next().and_then(|value| value.parse::<u32>().ok());
    if code_iter.next().is_some() {
        return None;
    }

    // Non-latin layouts report the physical key as the base layout key; prefer it so that
    // ctrl+c still reads as ctrl+c on a Cyrillic layout.
    let is_latin_letter = (97..=122).contains(&codepoint);
    let is_known_symbol = codepoint <= 127 && is_symbol_key(codepoint as u8 as char);
    let effective = if is_latin_letter || is_known_symbol {
        codepoint
    } else {
        base_layout_key.unwrap_or(codepoint)
    };

    let (modifier, event_type) = parse_modifier_param(mod_part);
    codepoint_key(effective, Some(codepoint)).map(|key| {
        key.with_modifier_bits(modifier)
            .with_event_type(event_type)
    })
}

fn codepoint_key(codepoint: u32, original: Option<u32>) -> Option<NormalizedKey> {
    let name = match codepoint {
        CODEPOINT_ESCAPE => KeyName::Escape,
        CODEPOINT_TAB => KeyName::Tab,
        CODEPOINT_ENTER | CODEPOINT_KP_ENTER => KeyName::Return,
        CODEPOINT_SPACE => KeyName::Space,
        CODEPOINT_BACKSPACE | 8 => KeyName::Backspace,
        cp => {
            let ch = char::from_u32(cp)?;
            if !is_printable(ch) {
                return None;
            }
            KeyName::Char(ch)
        }
    };
    let mut key = NormalizedKey::new(name);
    // Keep the typed character as payload when the base layout key was substituted.
    if let (KeyName::Char(_), Some(original)) = (name, original) {
        if let Some(ch) = char::from_u32(original).filter(|ch| is_printable(*ch)) {
            key.text = Some(ch.to_string());
        }
    }
    Some(key)
}

fn is_symbol_key(ch: char) -> bool {
    matches!(
        ch,
        '`' | '-' | '=' | '[' | ']' | '\\' | ';' | '\'' | ',' | '.' | '/' | '!' | '@' | '#'
            | '$' | '%' | '^' | '&' | '*' | '(' | ')' | '_' | '+' | '|' | '~' | '{' | '}'
            | ':' | '<' | '>' | '?'
    )
}
