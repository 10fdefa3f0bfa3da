use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::feature::FeatureId;
use super::predicate::PredicateId;

#[derive(Debug, Error)]
pub enum RelationshipError {
    #[error("relationship is missing an endpoint or predicate and cannot be locked")]
    Incomplete,
    #[error("relationship is already locked")]
    Locked,
    #[error("relationship would relate {0:?} to itself")]
    SelfRelation(FeatureId),
    #[error("feature not found: {0:?}")]
    MissingFeature(FeatureId),
    #[error("relationship not found: {0:?}")]
    NotFound(RelationshipId),
    #[error("predicate not found: {0:?}")]
    MissingPredicate(PredicateId),
}

/// Stable handle to a committed relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationshipId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipState {
    /// Object not yet found; retries remain.
    Pending,
    /// Locked with both endpoints and both predicates set.
    Complete,
    /// Ran out of retries without an object.
    Expired,
}

/// A relationship between a subject and an (eventually) resolved object.
///
/// `subject_predicate` is the predicate the subject holds and
/// `object_predicate` its opposite. Once locked a relationship never
/// reopens; it can only be destroyed through the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub subject: FeatureId,
    pub object: Option<FeatureId>,
    pub subject_predicate: Option<PredicateId>,
    pub object_predicate: Option<PredicateId>,
    locked: bool,
    /// Remaining resolver rounds while pending.
    countdown: u32,
}

impl Relationship {
    /// A relationship with its predicate pair chosen but no object yet.
    pub fn pending(
        subject: FeatureId,
        subject_predicate: PredicateId,
        object_predicate: PredicateId,
        countdown: u32,
    ) -> Self {
        Self {
            subject,
            object: None,
            subject_predicate: Some(subject_predicate),
            object_predicate: Some(object_predicate),
            locked: false,
            countdown,
        }
    }

    /// Build and lock a relationship in one step.
    pub fn complete(
        subject: FeatureId,
        object: FeatureId,
        subject_predicate: PredicateId,
        object_predicate: PredicateId,
    ) -> Result<Self, RelationshipError> {
        let mut relationship = Self::pending(subject, subject_predicate, object_predicate, 0);
        relationship.bind(object)?;
        relationship.lock()?;
        Ok(relationship)
    }

    pub fn bind(&mut self, object: FeatureId) -> Result<(), RelationshipError> {
        if self.locked {
            return Err(RelationshipError::Locked);
        }
        self.object = Some(object);
        Ok(())
    }

    /// Lock the relationship. Every endpoint and predicate must be present.
    pub fn lock(&mut self) -> Result<(), RelationshipError> {
        if self.locked {
            return Err(RelationshipError::Locked);
        }
        match (self.object, self.subject_predicate, self.object_predicate) {
            (Some(object), Some(_), Some(_)) => {
                if object == self.subject {
                    return Err(RelationshipError::SelfRelation(object));
                }
                self.locked = true;
                self.countdown = 0;
                Ok(())
            }
            _ => Err(RelationshipError::Incomplete),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn countdown(&self) -> u32 {
        self.countdown
    }

    /// Spend one resolver round. Returns the rounds left.
    pub fn tick(&mut self) -> u32 {
        self.countdown = self.countdown.saturating_sub(1);
        self.countdown
    }

    pub fn state(&self) -> RelationshipState {
        if self.locked {
            RelationshipState::Complete
        } else if self.countdown == 0 {
            RelationshipState::Expired
        } else {
            RelationshipState::Pending
        }
    }

    /// The endpoint opposite `feature`, if `feature` is an endpoint.
    pub fn other_end(&self, feature: FeatureId) -> Option<FeatureId> {
        if feature == self.subject {
            self.object
        } else if Some(feature) == self.object {
            Some(self.subject)
        } else {
            None
        }
    }
}
