use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// What a viewer shortcut does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerAction {
    PreviousPage,
    NextPage,
    ZoomIn,
    ZoomOut,
    ToggleFullscreen,
    Close,
}

impl ViewerAction {
    pub const ALL: [ViewerAction; 6] = [
        Self::PreviousPage,
        Self::NextPage,
        Self::ZoomIn,
        Self::ZoomOut,
        Self::ToggleFullscreen,
        Self::Close,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreviousPage => "previous_page",
            Self::NextPage => "next_page",
            Self::ZoomIn => "zoom_in",
            Self::ZoomOut => "zoom_out",
            Self::ToggleFullscreen => "toggle_fullscreen",
            Self::Close => "close",
        }
    }
}

impl FromStr for ViewerAction {
    type Err = KeymapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == normalized)
            .ok_or_else(|| KeymapError::UnknownAction(s.to_owned()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeymapError {
    #[error("empty key chord")]
    Empty,
    #[error("unknown modifier `{0}`")]
    UnknownModifier(String),
    #[error("unknown key `{0}`")]
    UnknownKey(String),
    #[error("unknown viewer action `{0}`")]
    UnknownAction(String),
}

const NAMED_KEYS: &[(&str, &[&str])] = &[
    ("ArrowLeft", &["arrowleft", "left"]),
    ("ArrowRight", &["arrowright", "right"]),
    ("ArrowUp", &["arrowup", "up"]),
    ("ArrowDown", &["arrowdown", "down"]),
    ("PageUp", &["pageup", "pgup"]),
    ("PageDown", &["pagedown", "pgdn"]),
    ("Home", &["home"]),
    ("End", &["end"]),
    ("Escape", &["escape", "esc"]),
    ("Enter", &["enter", "return"]),
    ("Space", &["space"]),
    ("Tab", &["tab"]),
    ("Backspace", &["backspace"]),
    ("F11", &["f11"]),
];

/// A key plus modifiers, e.g. `ctrl+shift+f` or `ArrowLeft`.
///
/// Single-character keys are stored lowercase; named keys use their DOM
/// spelling. Parsing and [`Display`](fmt::Display) round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyChord {
    key: String,
    ctrl: bool,
    alt: bool,
    shift: bool,
    meta: bool,
}

impl KeyChord {
    /// A chord without modifiers.
    pub fn key(key: &str) -> Result<Self, KeymapError> {
        Ok(Self { key: normalize_key(key)?, ctrl: false, alt: false, shift: false, meta: false })
    }

    pub fn ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn key_name(&self) -> &str {
        &self.key
    }

    /// Shift held on a punctuation key, where the key already is the shifted glyph.
    fn is_shifted_symbol(&self) -> bool {
        let mut chars = self.key.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => self.shift && c.is_ascii_punctuation(),
            _ => false,
        }
    }
}

impl FromStr for KeyChord {
    type Err = KeymapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(KeymapError::Empty);
        }

        // `ctrl++` binds the plus key itself.
        let (modifiers, key) = match s.strip_suffix("++") {
            Some(rest) => (rest, "+"),
            None if s == "+" => ("", "+"),
            None => match s.rsplit_once('+') {
                Some((rest, key)) => (rest, key),
                None => ("", s),
            },
        };

        let mut chord = Self::key(key)?;
        for modifier in modifiers.split('+').filter(|m| !m.is_empty()) {
            match modifier.trim().to_ascii_lowercase().as_str() {
                "ctrl" | "control" => chord.ctrl = true,
                "alt" | "option" => chord.alt = true,
                "shift" => chord.shift = true,
                "meta" | "cmd" | "super" => chord.meta = true,
                other => return Err(KeymapError::UnknownModifier(other.to_owned())),
            }
        }
        Ok(chord)
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (held, name) in
            [(self.ctrl, "ctrl"), (self.alt, "alt"), (self.shift, "shift"), (self.meta, "meta")]
        {
            if held {
                write!(f, "{name}+")?;
            }
        }
        f.write_str(&self.key)
    }
}

fn normalize_key(raw: &str) -> Result<String, KeymapError> {
    let raw = raw.trim();
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (None, _) => Err(KeymapError::Empty),
        (Some(c), None) => Ok(c.to_lowercase().collect()),
        _ => {
            let lower = raw.to_ascii_lowercase();
            NAMED_KEYS
                .iter()
                .find(|(_, aliases)| aliases.contains(&lower.as_str()))
                .map(|(canonical, _)| (*canonical).to_owned())
                .ok_or_else(|| KeymapError::UnknownKey(raw.to_owned()))
        }
    }
}

/// Viewer shortcut table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keymap {
    bindings: Vec<(KeyChord, ViewerAction)>,
}

impl Default for Keymap {
    fn default() -> Self {
        let defaults = [
            ("ArrowLeft", ViewerAction::PreviousPage),
            ("PageUp", ViewerAction::PreviousPage),
            ("ArrowRight", ViewerAction::NextPage),
            ("PageDown", ViewerAction::NextPage),
            ("ctrl+=", ViewerAction::ZoomIn),
            ("ctrl++", ViewerAction::ZoomIn),
            ("ctrl+-", ViewerAction::ZoomOut),
            ("f", ViewerAction::ToggleFullscreen),
            ("Escape", ViewerAction::Close),
        ];

        let bindings = defaults
            .into_iter()
            .filter_map(|(chord, action)| {
                chord.parse::<KeyChord>().ok().map(|chord| (chord, action))
            })
            .collect();
        Self { bindings }
    }
}

impl Keymap {
    pub fn empty() -> Self {
        Self { bindings: Vec::new() }
    }

    /// Modifiers must match exactly, except that `ctrl+shift++` also finds
    /// `ctrl++`: US layouts report the shift used to type the symbol.
    pub fn action_for(&self, chord: &KeyChord) -> Option<ViewerAction> {
        self.exact(chord).or_else(|| {
            if !chord.is_shifted_symbol() {
                return None;
            }
            let unshifted = KeyChord { shift: false, ..chord.clone() };
            self.exact(&unshifted)
        })
    }

    fn exact(&self, chord: &KeyChord) -> Option<ViewerAction> {
        self.bindings.iter().find(|(bound, _)| bound == chord).map(|(_, action)| *action)
    }

    pub fn chords_for(&self, action: ViewerAction) -> impl Iterator<Item = &KeyChord> {
        self.bindings.iter().filter(move |(_, a)| *a == action).map(|(chord, _)| chord)
    }

    /// Bind `chord` to `action`, replacing whatever the chord did before.
    pub fn bind(&mut self, chord: KeyChord, action: ViewerAction) {
        self.bindings.retain(|(bound, _)| *bound != chord);
        self.bindings.push((chord, action));
    }

    /// Replace all chords of each named action.
    ///
    /// Keys are action names (`next_page`), values are chord strings. Nothing
    /// is applied unless every entry parses.
    pub fn apply_overrides(
        &mut self,
        overrides: &BTreeMap<String, Vec<String>>,
    ) -> Result<(), KeymapError> {
        let parsed = overrides
            .iter()
            .map(|(action, chords)| {
                let action: ViewerAction = action.parse()?;
                let chords = chords
                    .iter()
                    .map(|chord| chord.parse::<KeyChord>())
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((action, chords))
            })
            .collect::<Result<Vec<_>, KeymapError>>()?;

        for (action, chords) in parsed {
            self.bindings.retain(|(_, bound)| *bound != action);
            for chord in chords {
                self.bind(chord, action);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chord(s: &str) -> KeyChord {
        s.parse().expect("chord should parse")
    }

    #[test]
    fn parses_modifiers_and_named_keys() {
        let f = KeyChord::key("f").expect("key should parse");
        assert_eq!(chord("Ctrl+Shift+F"), f.ctrl().shift());
        assert_eq!(chord("left"), chord("ArrowLeft"));
        assert_eq!(chord("esc").key_name(), "Escape");
        assert_eq!(chord("ctrl++").key_name(), "+");
        assert_eq!(chord("ctrl+-").key_name(), "-");
    }

    #[test]
    fn display_round_trips() {
        for raw in ["ctrl+shift+f", "ArrowRight", "ctrl++", "alt+meta+PageDown"] {
            let parsed = chord(raw);
            assert_eq!(parsed.to_string().parse::<KeyChord>(), Ok(parsed));
        }
    }

    #[test]
    fn rejects_unknown_parts() {
        let modifier = "hyper+f".parse::<KeyChord>();
        assert_eq!(modifier, Err(KeymapError::UnknownModifier("hyper".into())));
        let key = "ctrl+banana".parse::<KeyChord>();
        assert_eq!(key, Err(KeymapError::UnknownKey("banana".into())));
        assert_eq!(" ".parse::<KeyChord>(), Err(KeymapError::Empty));
    }

    #[test]
    fn default_bindings() {
        let keymap = Keymap::default();
        assert_eq!(keymap.action_for(&chord("ArrowLeft")), Some(ViewerAction::PreviousPage));
        assert_eq!(keymap.action_for(&chord("PageDown")), Some(ViewerAction::NextPage));
        assert_eq!(keymap.action_for(&chord("ctrl+=")), Some(ViewerAction::ZoomIn));
        assert_eq!(keymap.action_for(&chord("ctrl++")), Some(ViewerAction::ZoomIn));
        assert_eq!(keymap.action_for(&chord("ctrl+-")), Some(ViewerAction::ZoomOut));
        assert_eq!(keymap.action_for(&chord("F")), Some(ViewerAction::ToggleFullscreen));
        assert_eq!(keymap.action_for(&chord("Escape")), Some(ViewerAction::Close));
        assert_eq!(keymap.action_for(&chord("ctrl+f")), None);
        assert_eq!(keymap.len(), 9);
    }

    #[test]
    fn shift_typed_symbols_match_their_binding() {
        let keymap = Keymap::default();
        assert_eq!(keymap.action_for(&chord("ctrl+shift++")), Some(ViewerAction::ZoomIn));
        assert_eq!(keymap.action_for(&chord("ctrl+shift+=")), Some(ViewerAction::ZoomIn));
        assert_eq!(keymap.action_for(&chord("shift+f")), None);
        assert_eq!(keymap.action_for(&chord("shift+ArrowLeft")), None);
    }

    #[test]
    fn shifted_binding_wins_over_fallback() {
        let mut keymap = Keymap::default();
        keymap.bind(chord("ctrl+shift++"), ViewerAction::Close);
        assert_eq!(keymap.action_for(&chord("ctrl+shift++")), Some(ViewerAction::Close));
        assert_eq!(keymap.action_for(&chord("ctrl++")), Some(ViewerAction::ZoomIn));
    }

    #[test]
    fn overrides_replace_every_chord_of_an_action() {
        let mut keymap = Keymap::default();
        let overrides = BTreeMap::from([("next_page".to_owned(), vec!["j".to_owned()])]);
        keymap.apply_overrides(&overrides).expect("overrides should apply");

        assert_eq!(keymap.action_for(&chord("j")), Some(ViewerAction::NextPage));
        assert_eq!(keymap.action_for(&chord("ArrowRight")), None);
        assert_eq!(keymap.chords_for(ViewerAction::NextPage).count(), 1);
    }

    #[test]
    fn invalid_override_leaves_keymap_untouched() {
        let mut keymap = Keymap::default();
        let overrides = BTreeMap::from([
            ("next_page".to_owned(), vec!["j".to_owned()]),
            ("warp".to_owned(), vec!["w".to_owned()]),
        ]);

        assert_eq!(
            keymap.apply_overrides(&overrides),
            Err(KeymapError::UnknownAction("warp".into()))
        );
        assert_eq!(keymap, Keymap::default());
    }

    #[test]
    fn action_names_parse() {
        assert_eq!("toggle-fullscreen".parse::<ViewerAction>(), Ok(ViewerAction::ToggleFullscreen));
        let round_trip = ViewerAction::ZoomOut.as_str().parse::<ViewerAction>();
        assert_eq!(round_trip, Ok(ViewerAction::ZoomOut));
    }
}
