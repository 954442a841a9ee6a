//! Discovered field ordering and activation

/// Known field names, split into an ordered active block followed by an
/// ordered inactive block.
///
/// Discovery only ever appends to the inactive block, so the relative order
/// of fields seen in earlier refreshes never changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldCatalog {
    active: Vec<String>,
    inactive: Vec<String>,
}

impl FieldCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog whose active block starts with `fields`, duplicates dropped
    pub fn with_active<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut catalog = Self::new();
        for field in fields {
            let field = field.into();
            if !catalog.contains(&field) {
                catalog.active.push(field);
            }
        }
        catalog
    }

    /// Append never-seen fields to the end; returns how many were added
    pub fn merge<I, S>(&mut self, new_fields: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for field in new_fields {
            let field = field.as_ref();
            if !self.contains(field) {
                self.inactive.push(field.to_string());
                added += 1;
            }
        }
        added
    }

    pub fn contains(&self, field: &str) -> bool {
        self.is_active(field) || self.inactive.iter().any(|f| f == field)
    }

    pub fn is_active(&self, field: &str) -> bool {
        self.active.iter().any(|f| f == field)
    }

    /// Flip activation.
    ///
    /// Activating moves the field to the front of the active block;
    /// deactivating moves it to the very end. Unknown fields are left alone
    /// and yield `false`.
    pub fn toggle_active(&mut self, field: &str) -> bool {
        if let Some(pos) = self.active.iter().position(|f| f == field) {
            let name = self.active.remove(pos);
            self.inactive.push(name);
            return true;
        }
        if let Some(pos) = self.inactive.iter().position(|f| f == field) {
            let name = self.inactive.remove(pos);
            self.active.insert(0, name);
            return true;
        }
        false
    }

    /// Move an active field one slot up or down inside the active block.
    ///
    /// Returns `false` without changes for inactive or unknown fields and at
    /// either edge of the block.
    pub fn reorder(&mut self, field: &str, up: bool) -> bool {
        let Some(pos) = self.active.iter().position(|f| f == field) else {
            return false;
        };
        let target = if up {
            match pos.checked_sub(1) {
                Some(t) => t,
                None => return false,
            }
        } else {
            if pos + 1 >= self.active.len() {
                return false;
            }
            pos + 1
        };
        self.active.swap(pos, target);
        true
    }

    /// Every known field: the active block, then the inactive block
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.active
            .iter()
            .chain(self.inactive.iter())
            .map(String::as_str)
    }

    pub fn active_fields(&self) -> &[String] {
        &self.active
    }

    pub fn inactive_fields(&self) -> &[String] {
        &self.inactive
    }

    pub fn len(&self) -> usize {
        self.active.len() + self.inactive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
