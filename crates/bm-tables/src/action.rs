//! Action descriptors and action data.

use std::fmt;
use std::sync::Arc;

use crate::error::{MatchError, MatchResult};

/// A runtime parameter declared by an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionParam {
    pub name: String,
    pub bitwidth: u32,
}

/// Descriptor of a named action.
///
/// The primitive sequence the action runs belongs to the action interpreter;
/// tables only need the name and the declared runtime parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFn {
    name: String,
    id: u32,
    params: Vec<ActionParam>,
}

impl ActionFn {
    pub fn new(name: impl Into<String>, id: u32, params: Vec<ActionParam>) -> Self {
        Self {
            name: name.into(),
            id,
            params,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn params(&self) -> &[ActionParam] {
        &self.params
    }

    /// Checks that `data` binds exactly the declared parameters.
    pub fn check_data(&self, data: &ActionData) -> MatchResult<()> {
        if data.len() != self.params.len() {
            return Err(MatchError::BadActionData {
                action: self.name.clone(),
                expected: self.params.len(),
                actual: data.len(),
            });
        }
        Ok(())
    }
}

/// Parameter values bound to one use of an action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionData {
    values: Vec<Vec<u8>>,
}

impl ActionData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one parameter value.
    pub fn push_back(&mut self, value: impl Into<Vec<u8>>) {
        self.values.push(value.into());
    }

    /// Builder form of [`ActionData::push_back`].
    pub fn with(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.push_back(value);
        self
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.values.get(index).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<Vec<u8>> for ActionData {
    fn from_iter<I: IntoIterator<Item = Vec<u8>>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// An action together with the data bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionEntry {
    pub action: Arc<ActionFn>,
    pub data: ActionData,
}

impl ActionEntry {
    /// Binds `data` to `action` after checking the parameter count.
    pub fn bind(action: Arc<ActionFn>, data: ActionData) -> MatchResult<Self> {
        action.check_data(&data)?;
        Ok(Self { action, data })
    }
}

impl fmt::Display for ActionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.action.name())?;
        for (i, v) in self.data.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "0x")?;
            for b in v {
                write!(f, "{:02x}", b)?;
            }
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MatchErrorCode;

    fn set_port() -> Arc<ActionFn> {
        Arc::new(ActionFn::new(
            "set_port",
            1,
            vec![ActionParam {
                name: "port".to_string(),
                bitwidth: 9,
            }],
        ))
    }

    #[test]
    fn test_bind_checks_param_count() {
        let err = ActionEntry::bind(set_port(), ActionData::new()).unwrap_err();
        assert_eq!(err.code(), MatchErrorCode::BadActionData);

        let entry = ActionEntry::bind(set_port(), ActionData::new().with(vec![0, 3])).unwrap();
        assert_eq!(entry.data.get(0), Some(&[0u8, 3][..]));
    }

    #[test]
    fn test_action_entry_display() {
        let entry = ActionEntry::bind(set_port(), ActionData::new().with(vec![0x01, 0x0a])).unwrap();
        assert_eq!(entry.to_string(), "set_port(0x010a)");
    }

    #[test]
    fn test_action_data_from_iter() {
        let data: ActionData = vec![vec![1], vec![2, 3]].into_iter().collect();
        assert_eq!(data.len(), 2);
        assert!(!data.is_empty());
    }
}
