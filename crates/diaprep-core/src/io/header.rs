/// Typed value of a single FITS header card.
#[derive(Clone, Debug, PartialEq)]
pub enum CardValue {
    Str(String),
    Logical(bool),
    Int(i64),
    Float(f64),
    /// COMMENT / HISTORY / blank-keyword text. Never deduplicated.
    Commentary(String),
}

impl CardValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Logical(b) => Some(*b),
            _ => None,
        }
    }
}

/// One header keyword record as cfitsio reports it.
#[derive(Clone, Debug, PartialEq)]
pub struct Card {
    pub keyword: String,
    pub value: CardValue,
    pub comment: Option<String>,
}

impl Card {
    pub fn new(keyword: &str, value: CardValue) -> Self {
        Self {
            keyword: keyword.trim().to_ascii_uppercase(),
            value,
            comment: None,
        }
    }

    pub fn is_commentary(&self) -> bool {
        matches!(self.value, CardValue::Commentary(_))
    }
}

/// Ordered FITS header.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FitsHeader {
    cards: Vec<Card>,
}

impl FitsHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cards(cards: Vec<Card>) -> Self {
        Self { cards }
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn get(&self, keyword: &str) -> Option<&CardValue> {
        let key = keyword.to_ascii_uppercase();
        self.cards
            .iter()
            .find(|c| !c.is_commentary() && c.keyword == key)
            .map(|c| &c.value)
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.get(keyword).is_some()
    }

    pub fn get_f64(&self, keyword: &str) -> Option<f64> {
        self.get(keyword).and_then(CardValue::as_f64)
    }

    pub fn get_i64(&self, keyword: &str) -> Option<i64> {
        self.get(keyword).and_then(CardValue::as_i64)
    }

    pub fn get_str(&self, keyword: &str) -> Option<&str> {
        self.get(keyword).and_then(CardValue::as_str)
    }

    /// Set a keyword, replacing the first existing card in place.
    pub fn set(&mut self, keyword: &str, value: CardValue) {
        self.set_card(Card::new(keyword, value));
    }

    pub fn set_card(&mut self, card: Card) {
        if card.is_commentary() {
            self.cards.push(card);
            return;
        }
        match self
            .cards
            .iter_mut()
            .find(|c| !c.is_commentary() && c.keyword == card.keyword)
        {
            Some(existing) => {
                existing.value = card.value;
                if card.comment.is_some() {
                    existing.comment = card.comment;
                }
            }
            None => self.cards.push(card),
        }
    }

    /// Merge keyword cards from `cards`, overwriting existing values.
    pub fn merge(&mut self, cards: &[Card]) {
        for card in cards {
            self.set_card(card.clone());
        }
    }

    /// Remove every non-commentary card whose keyword satisfies `pred`.
    pub fn remove_where(&mut self, pred: impl Fn(&str) -> bool) {
        self.cards.retain(|c| c.is_commentary() || !pred(&c.keyword));
    }

    /// Image dimensions as (width, height) from NAXIS1/NAXIS2.
    pub fn image_dims(&self) -> Option<(usize, usize)> {
        let w = self.get_i64("NAXIS1")?;
        let h = self.get_i64("NAXIS2")?;
        if w <= 0 || h <= 0 {
            return None;
        }
        Some((w as usize, h as usize))
    }
}
