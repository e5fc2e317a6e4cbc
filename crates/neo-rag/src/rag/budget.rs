/// Rough token estimate: four characters per token, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Running token and cost counters for one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BudgetTracker {
    total_tokens: usize,
    total_cost: f64,
    last_query_cost: f64,
    queries: usize,
}

impl BudgetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charge `tokens` at `rate_per_1k` and return the cumulative cost.
    pub fn record(&mut self, tokens: usize, rate_per_1k: f64) -> f64 {
        let cost = tokens as f64 / 1000.0 * rate_per_1k;
        self.total_tokens += tokens;
        self.total_cost += cost;
        self.last_query_cost = cost;
        self.queries += 1;
        self.total_cost
    }

    pub fn last_query_cost(&self) -> f64 {
        self.last_query_cost
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    pub fn queries(&self) -> usize {
        self.queries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_record_accumulates() {
        let mut budget = BudgetTracker::new();
        assert_eq!(budget.record(500, 2.0), 1.0);
        assert_eq!(budget.record(1500, 2.0), 4.0);
        assert_eq!(budget.last_query_cost(), 3.0);
        assert_eq!(budget.total_tokens(), 2000);
        assert_eq!(budget.queries(), 2);
    }

    #[test]
    fn test_free_model_costs_nothing() {
        let mut budget = BudgetTracker::new();
        budget.record(10_000, 0.0);
        assert_eq!(budget.total_cost(), 0.0);
        assert_eq!(budget.total_tokens(), 10_000);
    }
}
