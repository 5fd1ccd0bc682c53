//! Framing fitted memory into an agent's system prompt.

use wayfarer_config::BudgetConfig;
use wayfarer_core::agent::AgentKind;

use crate::budget::{TokenBudgeter, estimate_tokens};

/// Splits the model's input budget between the base prompt, the reserved
/// output and the agent's memory.
#[derive(Debug, Clone)]
pub struct PromptFramer {
    budget: BudgetConfig,
    budgeter: TokenBudgeter,
}

impl PromptFramer {
    pub fn new(config: &BudgetConfig) -> Self {
        Self {
            budget: config.clone(),
            budgeter: TokenBudgeter::new(),
        }
    }

    pub fn output_tokens(&self, agent: AgentKind) -> usize {
        self.budget.output_tokens_for(agent.name())
    }

    /// Tokens left for memory once the base prompt and output are accounted for.
    pub fn available(&self, agent: AgentKind, base_prompt: &str) -> usize {
        self.budget
            .input_tokens
            .saturating_sub(estimate_tokens(base_prompt))
            .saturating_sub(self.output_tokens(agent))
    }

    /// Append `memory` to `base_prompt`, fitted and wrapped in delimiters.
    pub fn frame(&self, agent: AgentKind, base_prompt: &str, memory: &str) -> String {
        if memory.trim().is_empty() {
            return base_prompt.to_string();
        }
        let fitted = self
            .budgeter
            .fit(agent, memory, self.available(agent, base_prompt));
        let tag = agent.name().to_uppercase();
        format!(
            "{base_prompt}\n--- {tag} MEMORY ---\n{}\n--- END {tag} MEMORY ---",
            fitted.trim_end()
        )
    }
}
