//! Keyboard and paste input for the console.
//!
//! Keystrokes become the string chunks the surface reports through
//! `on_data`; the remote shell receives them verbatim inside `data` frames.
//!
//! | Key | Chunk | With `APP_CURSOR` |
//! |-----|-------|-------------------|
//! | Enter | `\r` | |
//! | Backspace | `\x7f` | |
//! | Shift+Tab | `\x1b[Z` | |
//! | Arrows | `\x1b[A`..`\x1b[D` | `\x1bOA`..`\x1bOD` |
//! | Home / End | `\x1b[H` / `\x1b[F` | `\x1bOH` / `\x1bOF` |
//! | F1-F4 | `\x1bOP`..`\x1bOS` | |
//! | F5-F12 | `\x1b[15~`..`\x1b[24~` | |
//! | Ctrl+letter | `0x01`..`0x1a` | |
//! | Alt+key | `\x1b` + key | |

use alacritty_terminal::term::TermMode;
use gpui::Keystroke;

const BRACKETED_PASTE_START: &str = "\x1b[200~";
const BRACKETED_PASTE_END: &str = "\x1b[201~";

fn fixed_key(key: &str) -> Option<&'static str> {
    Some(match key {
        "enter" => "\r",
        "escape" => "\x1b",
        "backspace" => "\x7f",
        "pageup" => "\x1b[5~",
        "pagedown" => "\x1b[6~",
        "insert" => "\x1b[2~",
        "delete" => "\x1b[3~",
        "f1" => "\x1bOP",
        "f2" => "\x1bOQ",
        "f3" => "\x1bOR",
        "f4" => "\x1bOS",
        "f5" => "\x1b[15~",
        "f6" => "\x1b[17~",
        "f7" => "\x1b[18~",
        "f8" => "\x1b[19~",
        "f9" => "\x1b[20~",
        "f10" => "\x1b[21~",
        "f11" => "\x1b[23~",
        "f12" => "\x1b[24~",
        _ => return None,
    })
}

/// Final byte of the cursor keys, which switch between CSI and SS3.
fn cursor_key(key: &str) -> Option<char> {
    Some(match key {
        "up" => 'A',
        "down" => 'B',
        "right" => 'C',
        "left" => 'D',
        "home" => 'H',
        "end" => 'F',
        _ => return None,
    })
}

fn control_char(ch: char) -> Option<char> {
    match ch {
        'a'..='z' => Some((ch as u8 - b'a' + 1) as char),
        '@' | ' ' | '2' => Some('\0'),
        '[' => Some('\x1b'),
        '\\' => Some('\x1c'),
        ']' => Some('\x1d'),
        '^' => Some('\x1e'),
        '_' => Some('\x1f'),
        '?' => Some('\x7f'),
        _ => None,
    }
}

fn single_char(key: &str) -> Option<char> {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Some(ch),
        _ => None,
    }
}

/// Converts a keystroke into the chunk sent to the remote shell.
///
/// Returns `None` for keystrokes that produce no input, such as bare
/// modifiers or platform shortcuts.
pub fn key_chunk(keystroke: &Keystroke, mode: TermMode) -> Option<String> {
    let modifiers = &keystroke.modifiers;
    if modifiers.platform {
        return None;
    }
    let key = keystroke.key.as_str();

    if let Some(chunk) = fixed_key(key) {
        return Some(chunk.to_string());
    }
    if let Some(final_byte) = cursor_key(key) {
        let intro = if mode.contains(TermMode::APP_CURSOR) { "\x1bO" } else { "\x1b[" };
        return Some(format!("{intro}{final_byte}"));
    }

    match key {
        "tab" if modifiers.shift => return Some("\x1b[Z".to_string()),
        "tab" => return Some("\t".to_string()),
        "space" if modifiers.control => return Some("\0".to_string()),
        "space" => return Some(" ".to_string()),
        _ => {}
    }

    let ch = single_char(key)?;
    if modifiers.control {
        return control_char(ch.to_ascii_lowercase()).map(String::from);
    }
    if modifiers.alt {
        return Some(format!("\x1b{ch}"));
    }

    match &keystroke.key_char {
        Some(typed) => Some(typed.clone()),
        None if modifiers.shift => Some(ch.to_uppercase().collect()),
        None => Some(ch.to_string()),
    }
}

/// Wraps pasted text for the remote shell.
///
/// Line endings are normalized to `\r`. When the remote program enabled
/// bracketed paste, the text is wrapped in the paste markers with any embedded
/// end marker stripped so the paste cannot terminate itself early.
pub fn paste_chunk(text: &str, mode: TermMode) -> String {
    let normalized = text.replace("\r\n", "\r").replace('\n', "\r");
    if mode.contains(TermMode::BRACKETED_PASTE) {
        let inner = normalized.replace(BRACKETED_PASTE_END, "");
        format!("{BRACKETED_PASTE_START}{inner}{BRACKETED_PASTE_END}")
    } else {
        normalized
    }
}
