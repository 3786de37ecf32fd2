//! Rewrite-system storage shared by the sequencer modules.
//!
//! A small L-system: four symbols (tags 0..=3), one production rule per
//! symbol, and a current word that is expanded in place by substituting
//! every symbol with its rule. Word and rule storage are fixed-capacity;
//! anything past capacity is silently dropped so the audio thread never
//! allocates.

use arrayvec::ArrayVec;

/// Number of symbols (and production rules): A, B, C, D.
pub const SYMBOL_COUNT: usize = 4;

/// A rewrite system with `WORD_MAX` word capacity and `RULE_MAX` symbols
/// per rule. A cursor tracks the current position in the word and a
/// selection tracks which rule user edits apply to.
#[derive(Clone, Debug)]
pub struct RewriteSystem<const WORD_MAX: usize, const RULE_MAX: usize> {
    rules: [ArrayVec<u8, RULE_MAX>; SYMBOL_COUNT],
    word: ArrayVec<u8, WORD_MAX>,
    selection: usize,
    pos: usize,
}

impl<const WORD_MAX: usize, const RULE_MAX: usize> Default
    for RewriteSystem<WORD_MAX, RULE_MAX>
{
    fn default() -> Self {
        Self {
            rules: Default::default(),
            word: ArrayVec::new(),
            selection: 0,
            pos: 0,
        }
    }
}

impl<const WORD_MAX: usize, const RULE_MAX: usize> RewriteSystem<WORD_MAX, RULE_MAX> {
    pub fn len(&self) -> usize {
        self.word.len()
    }

    pub fn is_empty(&self) -> bool {
        self.word.is_empty()
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn selection(&self) -> usize {
        self.selection
    }

    /// The symbol under the cursor (symbol A when the word is empty).
    pub fn current(&self) -> u8 {
        self.word.get(self.pos).copied().unwrap_or(0)
    }

    pub fn word(&self) -> &[u8] {
        &self.word
    }

    pub fn rule(&self, symbol: usize) -> &[u8] {
        &self.rules[symbol % SYMBOL_COUNT]
    }

    /// Reset the word to a single symbol A with the cursor at 0.
    pub fn seed(&mut self) {
        self.word.clear();
        self.word.push(0);
        self.pos = 0;
    }

    /// Clear word, rules, and cursor.
    pub fn clear(&mut self) {
        self.word.clear();
        for rule in &mut self.rules {
            rule.clear();
        }
        self.pos = 0;
    }

    /// Advance the cursor one step, wrapping at the end of the word.
    /// Returns true when the cursor wrapped back to 0.
    pub fn advance(&mut self) -> bool {
        if self.word.is_empty() {
            self.pos = 0;
            return true;
        }
        self.pos = (self.pos + 1) % self.word.len();
        self.pos == 0
    }

    /// Expand the word by substituting every symbol with its rule,
    /// left to right, truncating silently at capacity. Symbols with an
    /// empty rule contribute nothing, so an all-empty rule set collapses
    /// the word to empty.
    pub fn rewrite(&mut self) {
        let mut next: ArrayVec<u8, WORD_MAX> = ArrayVec::new();
        'outer: for &symbol in &self.word {
            for &out in &self.rules[(symbol as usize) % SYMBOL_COUNT] {
                if next.try_push(out).is_err() {
                    break 'outer;
                }
            }
        }
        self.word = next;
        if self.pos >= self.word.len() {
            self.pos = 0;
        }
    }

    // === Edit operations (dispatched from the UI thread) ===

    pub fn move_selection_up(&mut self) {
        self.selection = (self.selection + SYMBOL_COUNT - 1) % SYMBOL_COUNT;
    }

    pub fn move_selection_down(&mut self) {
        self.selection = (self.selection + 1) % SYMBOL_COUNT;
    }

    pub fn clear_selected_rule(&mut self) {
        self.rules[self.selection].clear();
    }

    /// Append a symbol to the selected rule. Invalid tags and appends past
    /// capacity are silently ignored.
    pub fn append_to_selected_rule(&mut self, symbol: u8) {
        if (symbol as usize) >= SYMBOL_COUNT {
            return;
        }
        let _ = self.rules[self.selection].try_push(symbol);
    }

    // === State restore helpers ===

    pub fn set_selection(&mut self, selection: usize) {
        self.selection = selection % SYMBOL_COUNT;
    }

    /// Clamp the cursor into the current word.
    pub fn set_pos(&mut self, pos: usize) {
        self.pos = if self.word.is_empty() {
            0
        } else {
            pos % self.word.len()
        };
    }

    /// Replace the word, skipping invalid tags and truncating at capacity.
    pub fn set_word<I: IntoIterator<Item = u8>>(&mut self, symbols: I) {
        self.word.clear();
        for s in symbols {
            if (s as usize) >= SYMBOL_COUNT {
                continue;
            }
            if self.word.try_push(s).is_err() {
                break;
            }
        }
        if self.pos >= self.word.len() {
            self.pos = 0;
        }
    }

    /// Replace one rule, skipping invalid tags and truncating at capacity.
    pub fn set_rule<I: IntoIterator<Item = u8>>(&mut self, symbol: usize, out: I) {
        let rule = &mut self.rules[symbol % SYMBOL_COUNT];
        rule.clear();
        for s in out {
            if (s as usize) >= SYMBOL_COUNT {
                continue;
            }
            if rule.try_push(s).is_err() {
                break;
            }
        }
    }
}
