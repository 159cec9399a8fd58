// Topic schema registry
use crate::value::{describe, types_of, ArgType, Value};
use crate::{BusError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Static contract for topics: topic name -> expected argument types.
///
/// A bus built with a registry validates listener signatures at registration
/// and payloads at publish time; without one, mismatches only show up as
/// delivery failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaRegistry {
    topics: HashMap<String, Vec<ArgType>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `topic` with the given argument types, replacing any
    /// previous declaration.
    pub fn declare(mut self, topic: impl Into<String>, types: Vec<ArgType>) -> Self {
        self.topics.insert(topic.into(), types);
        self
    }

    /// Declares `topic` using the structural types of sample values.
    pub fn declare_samples(self, topic: impl Into<String>, samples: &[Value]) -> Self {
        self.declare(topic, types_of(samples))
    }

    /// Builds a registry from sample payloads, one per topic.
    pub fn from_samples<I, T>(entries: I) -> Self
    where
        I: IntoIterator<Item = (T, Vec<Value>)>,
        T: Into<String>,
    {
        entries
            .into_iter()
            .fold(Self::new(), |reg, (topic, samples)| {
                reg.declare_samples(topic, &samples)
            })
    }

    /// Declared argument types for `topic`, if any.
    pub fn declared(&self, topic: &str) -> Option<&[ArgType]> {
        self.topics.get(topic).map(Vec::as_slice)
    }

    /// Structural equality: same count, same types, same order.
    pub fn matches(expected: &[ArgType], found: &[ArgType]) -> bool {
        expected == found
    }

    /// Checks a listener signature against the declaration for `topic`.
    pub(crate) fn check(&self, topic: &str, found: &[ArgType]) -> Result<()> {
        let expected = self
            .declared(topic)
            .ok_or_else(|| BusError::UnknownTopic(topic.to_string()))?;
        if Self::matches(expected, found) {
            Ok(())
        } else {
            Err(BusError::SchemaViolation {
                topic: topic.to_string(),
                expected: describe(expected),
                found: describe(found),
            })
        }
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }
}

impl<T: Into<String>> FromIterator<(T, Vec<ArgType>)> for SchemaRegistry {
    fn from_iter<I: IntoIterator<Item = (T, Vec<ArgType>)>>(iter: I) -> Self {
        Self {
            topics: iter.into_iter().map(|(t, v)| (t.into(), v)).collect(),
        }
    }
}
