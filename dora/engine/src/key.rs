use std::fmt;

use smallvec::SmallVec;

/// A composite key of integer fields, most significant first.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(SmallVec<[i32; 4]>);

impl Key {
    pub fn new(fields: &[i32]) -> Self {
        Self(SmallVec::from_slice(fields))
    }

    /// The field partitions are routed on.
    pub fn lead(&self) -> Option<i32> {
        self.0.first().copied()
    }

    pub fn fields(&self) -> &[i32] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[i32]> for Key {
    fn from(fields: &[i32]) -> Self {
        Self::new(fields)
    }
}

impl<const N: usize> From<[i32; N]> for Key {
    fn from(fields: [i32; N]) -> Self {
        Self::new(&fields)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, field) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{field}")?;
        }
        f.write_str(")")
    }
}

/// The key range of one action.
///
/// `down` decides the partition an action is routed to; `up` names the keys
/// it actually touches and is checked against the partition's bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionKeys {
    pub down: Key,
    pub up: Key,
}

impl ActionKeys {
    /// Routes and touches the same key.
    pub fn point(key: impl Into<Key>) -> Self {
        let key = key.into();
        Self {
            down: key.clone(),
            up: key,
        }
    }

    pub fn range(down: impl Into<Key>, up: impl Into<Key>) -> Self {
        Self {
            down: down.into(),
            up: up.into(),
        }
    }
}

impl fmt::Display for ActionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.down, self.up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display_and_lead() {
        let key = Key::from([3, 7, 42]);
        assert_eq!(key.lead(), Some(3));
        assert_eq!(key.to_string(), "(3,7,42)");
        assert_eq!(Key::default().lead(), None);
        assert_eq!(ActionKeys::point([1, 2]).to_string(), "(1,2)..(1,2)");
    }
}
