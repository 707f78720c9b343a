use serde::{Deserialize, Serialize};

use crate::card::{Card, DEFAULT_SOURCE};

fn default_source() -> String {
    DEFAULT_SOURCE.into()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    pub question: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default = "default_source")]
    pub source: String,
}

impl From<&Card> for Favorite {
    fn from(card: &Card) -> Self {
        Self {
            question: card.question.clone(),
            answer: card.answer.clone(),
            source: card.source.clone(),
        }
    }
}

/// 收藏夹，按题干去重，与熟练度/错题本互不影响。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Favorites {
    items: Vec<Favorite>,
}

impl Favorites {
    pub fn contains(&self, question: &str) -> bool {
        self.items.iter().any(|f| f.question == question)
    }

    /// 返回切换后是否处于收藏状态。
    pub fn toggle(&mut self, card: &Card) -> bool {
        if let Some(pos) = self.items.iter().position(|f| f.question == card.question) {
            self.items.remove(pos);
            false
        } else {
            self.items.push(Favorite::from(card));
            true
        }
    }

    pub fn cards(&self) -> Vec<Card> {
        self.items
            .iter()
            .map(|f| Card::new(&f.question, &f.answer, &f.source))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle() {
        let mut favs = Favorites::default();
        let c = Card::new("A", "1", "ch1");
        assert!(favs.toggle(&c));
        assert!(favs.contains("A"));
        // 同题干不同答案视为同一张卡
        assert!(!favs.toggle(&Card::new("A", "other", "ch2")));
        assert!(favs.is_empty());
    }
}
