//! Aggregated batch result: one outcome per dispatched correlation id, in input order.

use std::collections::HashMap;

use crate::request::RequestOutcome;

#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    outcomes: Vec<(String, RequestOutcome)>,
    index: HashMap<String, usize>,
    not_dispatched: Vec<String>,
}

impl BatchResult {
    pub(crate) fn new(outcomes: Vec<(String, RequestOutcome)>, not_dispatched: Vec<String>) -> Self {
        let index = outcomes
            .iter()
            .enumerate()
            .map(|(i, (id, _))| (id.clone(), i))
            .collect();
        Self {
            outcomes,
            index,
            not_dispatched,
        }
    }

    /// Outcome for `correlation_id`, if it was dispatched.
    pub fn get(&self, correlation_id: &str) -> Option<&RequestOutcome> {
        self.index.get(correlation_id).map(|&i| &self.outcomes[i].1)
    }

    /// Outcomes in input order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RequestOutcome)> {
        self.outcomes.iter().map(|(id, o)| (id.as_str(), o))
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Correlation ids never sent because the batch was cancelled.
    pub fn not_dispatched(&self) -> &[String] {
        &self.not_dispatched
    }

    /// True when every input descriptor has an outcome.
    pub fn is_complete(&self) -> bool {
        self.not_dispatched.is_empty()
    }
}
