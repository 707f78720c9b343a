// ---------------- Keymap ----------------
// 揭晓答案后的单键动作，可在 config.toml 的 [ui.keys] 覆盖：
//   z = "wrong"
//   x = "vague"
//   g = "correct"
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    RateWrong,
    RateVague,
    RateCorrect,
    ToggleFavorite,
    Quit,
}

pub fn action_from_str(s: &str) -> Option<KeyAction> {
    use KeyAction::*;
    Some(match s {
        "wrong" | "grade_again" => RateWrong,
        "vague" | "grade_hard" => RateVague,
        "correct" | "grade_good" => RateCorrect,
        "favorite" => ToggleFavorite,
        "quit" => Quit,
        _ => return None,
    })
}

pub fn parse_keymap(map: &HashMap<String, String>) -> HashMap<char, KeyAction> {
    let mut out = default_keymap();
    for (k, v) in map {
        let mut chars = k.chars();
        match (chars.next(), chars.next(), action_from_str(v)) {
            (Some(ch), None, Some(act)) => {
                out.retain(|_, a| *a != act);
                out.insert(ch, act);
            }
            _ => log::warn!("忽略无效按键配置: {k} = {v}"),
        }
    }
    out
}

pub fn default_keymap() -> HashMap<char, KeyAction> {
    use KeyAction::*;
    let mut m = HashMap::new();
    m.insert('z', RateWrong);
    m.insert('x', RateVague);
    m.insert('g', RateCorrect);
    m.insert('f', ToggleFavorite);
    m.insert('q', Quit);
    m
}

/// 底栏提示用：动作对应的键
pub fn key_for(map: &HashMap<char, KeyAction>, action: KeyAction) -> char {
    map.iter()
        .find(|(_, a)| **a == action)
        .map(|(k, _)| *k)
        .unwrap_or('?')
}
