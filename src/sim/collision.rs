//! Collision contract between the stepper and a physical model
//!
//! The stepper never interprets collision records. It only needs to know
//! whether a tentative state contains an event, and hands the last report it
//! saw back to the model for resolution.

use serde::{Deserialize, Serialize};

use super::system::StateSystem;

/// Outcome of a collision query on a tentative state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Detection<C> {
    /// Tentative state is collision free
    NoEvent,
    /// One or more collisions, in the order the model found them
    Event(Vec<C>),
}

impl<C> Detection<C> {
    /// Build from a report, mapping an empty report to `NoEvent`
    pub fn from_report(report: Vec<C>) -> Self {
        if report.is_empty() {
            Detection::NoEvent
        } else {
            Detection::Event(report)
        }
    }

    /// Single-record event, for models that stop at the first hit
    pub fn single(collision: C) -> Self {
        Detection::Event(vec![collision])
    }

    /// True when a non-empty report is present
    pub fn is_event(&self) -> bool {
        matches!(self, Detection::Event(report) if !report.is_empty())
    }

    /// The report, if non-empty
    pub fn into_report(self) -> Option<Vec<C>> {
        match self {
            Detection::Event(report) if !report.is_empty() => Some(report),
            _ => None,
        }
    }
}

impl<C> From<Vec<C>> for Detection<C> {
    fn from(report: Vec<C>) -> Self {
        Self::from_report(report)
    }
}

impl<C> From<Option<C>> for Detection<C> {
    fn from(collision: Option<C>) -> Self {
        match collision {
            Some(c) => Detection::single(c),
            None => Detection::NoEvent,
        }
    }
}

/// A system that can report and resolve collisions
pub trait CollisionSystem: StateSystem {
    /// Model specific collision record
    type Collision;

    /// Refresh derived geometry from the state vector.
    ///
    /// Called after every tentative step and again after a rollback, before
    /// any detection query.
    fn modify_objects(&mut self) {}

    /// Inspect the current (tentative) state.
    ///
    /// Models may return `Detection::Event` as soon as they find something
    /// conclusive instead of finishing the scan.
    fn find_collisions(&mut self) -> Detection<Self::Collision>;

    /// Apply the physical effect of `report` to the state vector.
    ///
    /// Called on the pre-collision state. Afterwards a fresh step from that
    /// state should no longer report the same collisions, and calling this
    /// again with the same report must leave the state unchanged.
    fn handle_collisions(&mut self, report: &[Self::Collision]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_is_no_event() {
        let detection: Detection<u32> = Detection::from_report(Vec::new());
        assert_eq!(detection, Detection::NoEvent);
        assert!(!detection.is_event());

        // A hand-built empty event is still treated as no event
        let detection: Detection<u32> = Detection::Event(Vec::new());
        assert!(!detection.is_event());
        assert_eq!(detection.into_report(), None);
    }

    #[test]
    fn test_event_conversions() {
        let detection: Detection<u32> = vec![3, 1].into();
        assert!(detection.is_event());
        assert_eq!(detection.into_report(), Some(vec![3, 1]));

        let detection: Detection<&str> = Some("floor").into();
        assert_eq!(detection, Detection::single("floor"));
        let detection: Detection<&str> = None.into();
        assert_eq!(detection, Detection::NoEvent);
    }
}
