//! Rule-based reminders injected into the live turn — e.g. "remind the
//! model to stay concise every 5 turns" or "warn once context crosses a
//! token threshold."

/// Condition under which a reminder fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionTrigger {
    /// Fires on turn numbers that are multiples of N (turn 0 never fires).
    EveryNTurns(u32),
    /// Fires once the estimated token count reaches or exceeds the threshold.
    OnTokenThreshold(usize),
}

struct Rule {
    trigger: InjectionTrigger,
    content: String,
}

/// Evaluates a set of injection rules against the current turn number and
/// token count, returning the reminders that should be appended to the
/// live-turn phase.
#[derive(Default)]
pub struct SystemInjector {
    rules: Vec<Rule>,
}

impl SystemInjector {
    /// Create an injector with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule.
    pub fn add_rule(&mut self, trigger: InjectionTrigger, content: String) {
        self.rules.push(Rule { trigger, content });
    }

    /// Evaluate all rules, returning the content of every rule that fires.
    pub fn check(&self, turn_number: u32, current_tokens: usize) -> Vec<String> {
        self.rules
            .iter()
            .filter(|rule| match rule.trigger {
                InjectionTrigger::EveryNTurns(n) => n > 0 && turn_number > 0 && turn_number % n == 0,
                InjectionTrigger::OnTokenThreshold(threshold) => current_tokens >= threshold,
            })
            .map(|rule| rule.content.clone())
            .collect()
    }
}
