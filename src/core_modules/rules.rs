// THEORY:
// Every decision tree in the engine (lesion type, burn degree, brain region, surgical
// phase, surgical status, severity) is an ordered list of guarded outcomes. The
// `RuleChain` makes that shape explicit instead of burying it in nested conditionals.
//
// Key architectural principles:
// 1.  **First Match Wins**: Rules are tried top to bottom; once one fires, the ones
//     below it are never consulted.
// 2.  **Total by Construction**: A chain cannot be built without an `otherwise`
//     outcome, so every input, including NaN-laden ones, reaches a defined result.
// 3.  **Observable**: `evaluate` reports the name of the rule that fired alongside the
//     outcome. Tests pin down which branch was taken, not just what it returned.
// 4.  **Plain Functions**: Guards and outcomes are `fn` pointers. A chain holds no
//     state and can be rebuilt or shared freely.

use log::trace;

/// A named guard and the outcome it produces when the guard holds.
pub struct Rule<I, O> {
    pub name: &'static str,
    predicate: fn(&I) -> bool,
    outcome: fn(&I) -> O,
}

impl<I, O> Rule<I, O> {
    pub fn new(name: &'static str, predicate: fn(&I) -> bool, outcome: fn(&I) -> O) -> Self {
        Self { name, predicate, outcome }
    }
}

/// The outcome of a chain and the rule that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Fired<O> {
    pub rule: &'static str,
    pub outcome: O,
}

/// An ordered, total list of rules.
pub struct RuleChain<I, O> {
    rules: Vec<Rule<I, O>>,
    otherwise_name: &'static str,
    otherwise: fn(&I) -> O,
}

impl<I, O> RuleChain<I, O> {
    pub fn new(rules: Vec<Rule<I, O>>, otherwise_name: &'static str, otherwise: fn(&I) -> O) -> Self {
        Self { rules, otherwise_name, otherwise }
    }

    /// Names of every rule in evaluation order, the fallback last.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).chain(std::iter::once(self.otherwise_name)).collect()
    }

    pub fn evaluate(&self, input: &I) -> Fired<O> {
        for rule in &self.rules {
            if (rule.predicate)(input) {
                trace!("rule '{}' fired", rule.name);
                return Fired { rule: rule.name, outcome: (rule.outcome)(input) };
            }
        }
        trace!("fallback '{}' fired", self.otherwise_name);
        Fired { rule: self.otherwise_name, outcome: (self.otherwise)(input) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign_chain() -> RuleChain<i32, &'static str> {
        RuleChain::new(
            vec![
                Rule::new("negative", |n: &i32| *n < 0, |_: &i32| "negative"),
                Rule::new("small", |n: &i32| *n < 10, |_: &i32| "small"),
                // Shadowed for every n < 10 by the rule above.
                Rule::new("zero", |n: &i32| *n == 0, |_: &i32| "zero"),
            ],
            "large",
            |_: &i32| "large",
        )
    }

    #[test]
    fn first_matching_rule_wins() {
        let chain = sign_chain();
        assert_eq!(chain.evaluate(&-3), Fired { rule: "negative", outcome: "negative" });
        assert_eq!(chain.evaluate(&0).rule, "small");
        assert_eq!(chain.evaluate(&42).rule, "large");
    }

    #[test]
    fn names_are_in_order_with_fallback_last() {
        assert_eq!(sign_chain().rule_names(), vec!["negative", "small", "zero", "large"]);
    }

    #[test]
    fn outcome_can_read_input() {
        let chain: RuleChain<i32, i32> = RuleChain::new(
            vec![Rule::new("double", |n: &i32| *n > 0, |n: &i32| n * 2)],
            "identity",
            |n: &i32| *n,
        );
        assert_eq!(chain.evaluate(&4).outcome, 8);
        assert_eq!(chain.evaluate(&-4).outcome, -4);
    }
}
