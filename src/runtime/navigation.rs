//! Screen navigation stack.

use std::fmt;

/// Identifier of a screen on the navigation stack.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ScreenId(String);

impl ScreenId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScreenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScreenId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ScreenId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl PartialEq<str> for ScreenId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ScreenId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Identity of one push. Never reused within a stack, so a screen pushed twice occupies
/// two distinct entries.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EntryId(u64);

impl EntryId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A screen together with the push that placed it on the stack.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct StackEntry {
    pub screen: ScreenId,
    pub id: EntryId,
}

impl fmt::Display for StackEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.screen, self.id.0)
    }
}

/// Back-navigable screen history.
///
/// Never empty: the initial screen sits at the bottom and cannot be popped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScreenStack {
    screens: Vec<ScreenId>,
    entries: Vec<EntryId>,
    next_entry: u64,
}

impl ScreenStack {
    pub fn new(initial: impl Into<ScreenId>) -> Self {
        Self {
            screens: vec![initial.into()],
            entries: vec![EntryId(0)],
            next_entry: 1,
        }
    }

    pub fn current(&self) -> &ScreenId {
        // The bottom entry is never removed.
        &self.screens[self.screens.len() - 1]
    }

    pub fn current_entry(&self) -> StackEntry {
        self.entry_at(self.screens.len() - 1)
    }

    /// Topmost entry showing `screen`.
    pub fn entry_of(&self, screen: &ScreenId) -> Option<StackEntry> {
        self.screens
            .iter()
            .rposition(|candidate| candidate == screen)
            .map(|depth| self.entry_at(depth))
    }

    pub fn contains_entry(&self, id: EntryId) -> bool {
        self.entries.contains(&id)
    }

    fn entry_at(&self, depth: usize) -> StackEntry {
        StackEntry {
            screen: self.screens[depth].clone(),
            id: self.entries[depth],
        }
    }

    pub fn initial(&self) -> &ScreenId {
        &self.screens[0]
    }

    pub fn len(&self) -> usize {
        self.screens.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn can_go_back(&self) -> bool {
        self.screens.len() > 1
    }

    pub fn contains(&self, screen: &ScreenId) -> bool {
        self.screens.contains(screen)
    }

    pub fn screens(&self) -> &[ScreenId] {
        &self.screens
    }

    pub fn push(&mut self, screen: impl Into<ScreenId>) -> EntryId {
        let id = EntryId(self.next_entry);
        self.next_entry += 1;
        self.screens.push(screen.into());
        self.entries.push(id);
        id
    }

    /// Removes and returns the top screen, or `None` when only the initial screen remains.
    pub fn pop(&mut self) -> Option<ScreenId> {
        self.pop_entry().map(|entry| entry.screen)
    }

    pub fn pop_entry(&mut self) -> Option<StackEntry> {
        if !self.can_go_back() {
            return None;
        }
        let screen = self.screens.pop()?;
        let id = self.entries.pop()?;
        Some(StackEntry { screen, id })
    }

    /// Truncates to the initial screen, returning what was removed (top first).
    pub fn reset(&mut self) -> Vec<ScreenId> {
        self.reset_entries()
            .into_iter()
            .map(|entry| entry.screen)
            .collect()
    }

    pub fn reset_entries(&mut self) -> Vec<StackEntry> {
        let screens = self.screens.split_off(1);
        let entries = self.entries.split_off(1);
        screens
            .into_iter()
            .zip(entries)
            .rev()
            .map(|(screen, id)| StackEntry { screen, id })
            .collect()
    }
}
