use thiserror::Error;

use crate::models::PhoneId;

pub const MAX_COMPARE: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompareError {
    #[error("You can only compare 2 phones at a time.")]
    Full,
}

/// Phones ticked for side-by-side comparison, in the order they were picked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComparePicker {
    selected: Vec<PhoneId>,
}

impl ComparePicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirrors a compare checkbox changing state. A rejected check means the
    /// checkbox has to be unticked again.
    pub fn toggle(&mut self, id: PhoneId, checked: bool) -> Result<(), CompareError> {
        if !checked {
            self.selected.retain(|p| p != &id);
            return Ok(());
        }
        if self.selected.contains(&id) {
            return Ok(());
        }
        if self.selected.len() >= MAX_COMPARE {
            return Err(CompareError::Full);
        }
        self.selected.push(id);
        Ok(())
    }

    pub fn selected(&self) -> &[PhoneId] {
        &self.selected
    }

    pub fn is_ready(&self) -> bool {
        self.selected.len() == MAX_COMPARE
    }

    pub fn compare_url(&self) -> Option<String> {
        match self.selected.as_slice() {
            [a, b] => Some(format!("/phone/compare?phone1={a}&phone2={b}")),
            _ => None,
        }
    }
}
