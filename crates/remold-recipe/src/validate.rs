//! Option-validation combinators.
//!
//! Whether a recipe is allowed to run is decided by a small algebra of
//! validation results: a leaf is valid, invalid, or missing, and results
//! combine with [`Validated::and`] / [`Validated::or`]. An invalid recipe's
//! subtree is skipped for the remainder of the run, never fatally.

/// Result of validating one recipe option (or a combination of them).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validated {
    /// The property is well-formed.
    Valid {
        /// Property that was checked.
        property: String,
    },

    /// The property has a bad value.
    Invalid {
        /// Property that was checked.
        property: String,
        /// The offending value, when printable.
        value: Option<String>,
        /// Why the value was rejected.
        message: String,
    },

    /// A required property was not supplied.
    Missing {
        /// Property that was checked.
        property: String,
        /// What was expected.
        message: String,
    },

    /// Both sides must hold.
    Both {
        /// Left operand.
        left: Box<Validated>,
        /// Right operand.
        right: Box<Validated>,
    },

    /// At least one side must hold.
    Either {
        /// Left operand.
        left: Box<Validated>,
        /// Right operand.
        right: Box<Validated>,
    },
}

impl Validated {
    /// A valid leaf.
    pub fn valid(property: impl Into<String>) -> Self {
        Self::Valid {
            property: property.into(),
        }
    }

    /// An invalid leaf.
    pub fn invalid(
        property: impl Into<String>,
        value: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Invalid {
            property: property.into(),
            value,
            message: message.into(),
        }
    }

    /// A missing required property.
    pub fn missing(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Missing {
            property: property.into(),
            message: message.into(),
        }
    }

    /// Valid when `predicate` holds, invalid otherwise.
    pub fn test(
        property: impl Into<String>,
        message: impl Into<String>,
        value: Option<String>,
        predicate: bool,
    ) -> Self {
        let property = property.into();
        if predicate {
            Self::Valid { property }
        } else {
            Self::Invalid {
                property,
                value,
                message: message.into(),
            }
        }
    }

    /// Require both results to hold.
    #[must_use]
    pub fn and(self, other: Validated) -> Self {
        Self::Both {
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    /// Require at least one result to hold.
    #[must_use]
    pub fn or(self, other: Validated) -> Self {
        Self::Either {
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    /// Whether the combined result holds.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Valid { .. } => true,
            Self::Invalid { .. } | Self::Missing { .. } => false,
            Self::Both { left, right } => left.is_valid() && right.is_valid(),
            Self::Either { left, right } => left.is_valid() || right.is_valid(),
        }
    }

    /// The failing leaves, empty when the result holds.
    #[must_use]
    pub fn failures(&self) -> Vec<&Validated> {
        let mut failures = Vec::new();
        self.collect_failures(&mut failures);
        failures
    }

    fn collect_failures<'a>(&'a self, out: &mut Vec<&'a Validated>) {
        match self {
            Self::Valid { .. } => {}
            Self::Invalid { .. } | Self::Missing { .. } => out.push(self),
            Self::Both { left, right } => {
                left.collect_failures(out);
                right.collect_failures(out);
            }
            Self::Either { left, right } => {
                // Either holds when one side does; only report when both fail.
                if !left.is_valid() && !right.is_valid() {
                    left.collect_failures(out);
                    right.collect_failures(out);
                }
            }
        }
    }
}
