use serde::{Deserialize, Serialize};

use crate::models::logical_form::VariableKey;
use crate::services::proof_tree::NodeId;

/// Temporal annotation of one slot, relative to a reference of type `R`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableTime<R> {
    /// Absolute point; equal points with the same key are the same moment
    Fixed(i64),
    /// Same moment as the referenced slot
    SameAs(R),
    /// Strictly earlier than the referenced slot
    Before(R),
    Unconstrained,
}

impl<R> VariableTime<R> {
    pub fn map_ref<S>(self, f: impl FnOnce(R) -> S) -> VariableTime<S> {
        match self {
            VariableTime::Fixed(t) => VariableTime::Fixed(t),
            VariableTime::SameAs(r) => VariableTime::SameAs(f(r)),
            VariableTime::Before(r) => VariableTime::Before(f(r)),
            VariableTime::Unconstrained => VariableTime::Unconstrained,
        }
    }

    pub fn reference(&self) -> Option<&R> {
        match self {
            VariableTime::SameAs(r) | VariableTime::Before(r) => Some(r),
            _ => None,
        }
    }
}

/// The moment at which a node states something about `key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSlot<R> {
    pub key: VariableKey,
    pub time: VariableTime<R>,
}

impl<R> TimeSlot<R> {
    pub fn new(key: VariableKey, time: VariableTime<R>) -> Self {
        Self { key, time }
    }
}

/// Reference used by rules, before the premises have node ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotTarget {
    Conclusion(VariableKey),
    /// Earlier premise of the same rule application, by position
    Premise(usize, VariableKey),
}

/// Reference to the first slot of `node` with the given key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeRef {
    pub node: NodeId,
    pub key: VariableKey,
}

impl TimeRef {
    pub fn new(node: NodeId, key: VariableKey) -> Self {
        Self { node, key }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_ref_keeps_kind() {
        let key = VariableKey::new(1, 1);
        let time: VariableTime<SlotTarget> = VariableTime::Before(SlotTarget::Conclusion(key));
        let resolved = time.map_ref(|_| TimeRef::new(NodeId(0), key));
        assert_eq!(resolved, VariableTime::Before(TimeRef::new(NodeId(0), key)));

        let fixed: VariableTime<SlotTarget> = VariableTime::Fixed(3);
        assert_eq!(fixed.map_ref(|_| 0u8), VariableTime::Fixed(3));
        assert!(fixed.reference().is_none());
    }
}
