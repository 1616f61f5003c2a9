use crate::error::{MaxReviewError, Result};
use crate::types::AgentName;
use std::collections::BTreeMap;
use tracing::debug;

/// Agents selected for a run plus their per-agent model overrides.
///
/// `agents` is unique and in first-seen order; every key of `overrides`
/// is present in `agents` and no override is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSelection {
    pub agents: Vec<AgentName>,
    pub overrides: BTreeMap<AgentName, String>,
}

impl ResolvedSelection {
    /// All supported agents with no model overrides.
    pub fn all() -> Self {
        Self {
            agents: AgentName::ALL.to_vec(),
            overrides: BTreeMap::new(),
        }
    }

    pub fn contains(&self, agent: AgentName) -> bool {
        self.agents.contains(&agent)
    }

    pub fn model_for(&self, agent: AgentName) -> Option<&str> {
        self.overrides.get(&agent).map(String::as_str)
    }

    /// Canonical `name[:model]` form, comma-joined. Resolving it again yields `self`.
    pub fn canonical(&self) -> String {
        self.agents
            .iter()
            .map(|agent| match self.overrides.get(agent) {
                Some(model) => format!("{}:{}", agent, model),
                None => agent.to_string(),
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Parse an agent selection such as `"claude:opus codex,gemini:gemini-2.5-pro"`.
///
/// Tokens are split on commas and whitespace. A repeated agent keeps its
/// first position; a later `name:model` replaces its override.
pub fn resolve(spec: &str) -> Result<ResolvedSelection> {
    let mut agents: Vec<AgentName> = Vec::new();
    let mut overrides = BTreeMap::new();
    let mut invalid: Vec<String> = Vec::new();

    let tokens = spec
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty());

    for token in tokens {
        let (name, model) = match token.split_once(':') {
            Some((name, model)) => (name, Some(model.trim())),
            None => (token, None),
        };

        let agent = match name.parse::<AgentName>() {
            Ok(agent) => agent,
            Err(_) => {
                invalid.push(name.to_string());
                continue;
            }
        };

        if let Some(model) = model {
            if model.is_empty() {
                return Err(MaxReviewError::Validation(format!(
                    "Agent '{}' is missing a model after ':'",
                    agent
                )));
            }
            overrides.insert(agent, model.to_string());
        }

        if !agents.contains(&agent) {
            agents.push(agent);
        }
    }

    if !invalid.is_empty() {
        return Err(MaxReviewError::Validation(format!(
            "Invalid agent(s): {}. Valid agents are: {}",
            invalid.join(", "),
            AgentName::supported_list()
        )));
    }

    if agents.is_empty() {
        return Err(MaxReviewError::Validation(format!(
            "No agents specified. Valid agents are: {}",
            AgentName::supported_list()
        )));
    }

    debug!("Resolved agent selection: {:?} overrides: {:?}", agents, overrides);
    Ok(ResolvedSelection { agents, overrides })
}
