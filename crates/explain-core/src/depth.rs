use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Analysis depth requested by the user.
///
/// # Examples
///
/// ```
/// use explain_core::Depth;
///
/// let depth: Depth = "deep".parse().unwrap();
/// assert_eq!(depth, Depth::Deep);
/// assert_eq!(Depth::default(), Depth::Standard);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    /// Cheapest: few steps, no file reads.
    Quick,
    /// Default profile.
    #[default]
    Standard,
    /// Most permissive, with persistent conversation memory.
    Deep,
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Depth::Quick => write!(f, "quick"),
            Depth::Standard => write!(f, "standard"),
            Depth::Deep => write!(f, "deep"),
        }
    }
}

impl FromStr for Depth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quick" => Ok(Depth::Quick),
            "standard" => Ok(Depth::Standard),
            "deep" => Ok(Depth::Deep),
            other => Err(format!("unknown depth: {other} (expected quick, standard or deep)")),
        }
    }
}

/// How the context budget is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetMode {
    /// Estimated tokens across the whole transcript.
    TokenBudget,
}

/// What to do when the transcript exceeds the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStrategy {
    /// Shrink the oldest tool observations to an elided marker.
    SummarizeAndTruncate,
}

/// Context-window budget for one agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContextBudget {
    /// Measurement mode.
    pub mode: BudgetMode,
    /// Budget in estimated tokens.
    pub token_value: usize,
    /// Overflow strategy.
    pub strategy: BudgetStrategy,
}

/// Tool-output offload thresholds.
///
/// When enabled, tool outputs above `threshold_tokens` are stored under
/// `storage_dir` and only a `max_preview_tokens` preview stays inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToolOffload {
    /// Whether offloading is active.
    pub enabled: bool,
    /// Outputs larger than this (estimated tokens) are offloaded.
    pub threshold_tokens: Option<usize>,
    /// Size of the inline preview (estimated tokens).
    pub max_preview_tokens: Option<usize>,
    /// Directory receiving offloaded outputs.
    pub storage_dir: Option<&'static str>,
}

/// Backend for cross-call conversation memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryBackend {
    /// JSON file under the tool-offload storage directory.
    Local,
}

/// A named bundle of resource budgets for one analysis depth.
///
/// Exactly three profiles exist; they are looked up by [`Depth`] and never
/// constructed ad hoc.
///
/// # Examples
///
/// ```
/// use explain_core::{Depth, DepthProfile};
///
/// let quick = DepthProfile::for_depth(Depth::Quick);
/// let deep = DepthProfile::for_depth(Depth::Deep);
/// assert!(deep.max_steps > quick.max_steps);
/// assert!(quick.memory_backend.is_none());
/// assert!(deep.memory_backend.is_some());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DepthProfile {
    /// Depth this profile belongs to.
    pub depth: Depth,
    /// Maximum tool-calling steps per agent run.
    pub max_steps: usize,
    /// Whether the agent may read individual files.
    pub analyze_files: bool,
    /// Cap on file reads per run.
    pub max_files: Option<usize>,
    /// Transcript budget.
    pub context_budget: ContextBudget,
    /// Tool-output offload settings.
    pub tool_offload: ToolOffload,
    /// Conversation memory backend, if any.
    pub memory_backend: Option<MemoryBackend>,
}

const CACHE_DIR: &str = ".explain_cache";

static QUICK: DepthProfile = DepthProfile {
    depth: Depth::Quick,
    max_steps: 10,
    analyze_files: false,
    max_files: None,
    context_budget: ContextBudget {
        mode: BudgetMode::TokenBudget,
        token_value: 10_000,
        strategy: BudgetStrategy::SummarizeAndTruncate,
    },
    tool_offload: ToolOffload {
        enabled: false,
        threshold_tokens: None,
        max_preview_tokens: None,
        storage_dir: None,
    },
    memory_backend: None,
};

static STANDARD: DepthProfile = DepthProfile {
    depth: Depth::Standard,
    max_steps: 20,
    analyze_files: true,
    max_files: Some(10),
    context_budget: ContextBudget {
        mode: BudgetMode::TokenBudget,
        token_value: 50_000,
        strategy: BudgetStrategy::SummarizeAndTruncate,
    },
    tool_offload: ToolOffload {
        enabled: true,
        threshold_tokens: Some(1_000),
        max_preview_tokens: Some(200),
        storage_dir: Some(CACHE_DIR),
    },
    memory_backend: None,
};

// Deep offloads more aggressively so its larger step budget fits the window.
static DEEP: DepthProfile = DepthProfile {
    depth: Depth::Deep,
    max_steps: 50,
    analyze_files: true,
    max_files: Some(50),
    context_budget: ContextBudget {
        mode: BudgetMode::TokenBudget,
        token_value: 100_000,
        strategy: BudgetStrategy::SummarizeAndTruncate,
    },
    tool_offload: ToolOffload {
        enabled: true,
        threshold_tokens: Some(500),
        max_preview_tokens: Some(100),
        storage_dir: Some(CACHE_DIR),
    },
    memory_backend: Some(MemoryBackend::Local),
};

impl DepthProfile {
    /// Look up the fixed profile for `depth`.
    pub fn for_depth(depth: Depth) -> &'static DepthProfile {
        match depth {
            Depth::Quick => &QUICK,
            Depth::Standard => &STANDARD,
            Depth::Deep => &DEEP,
        }
    }

    /// All profiles, least to most permissive.
    pub fn all() -> [&'static DepthProfile; 3] {
        [&QUICK, &STANDARD, &DEEP]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_budgets_increase_with_depth() {
        let [quick, standard, deep] = DepthProfile::all();
        assert!(deep.max_steps > standard.max_steps);
        assert!(standard.max_steps > quick.max_steps);
        assert!(deep.context_budget.token_value > standard.context_budget.token_value);
        assert!(standard.context_budget.token_value > quick.context_budget.token_value);
        assert!(deep.max_files.unwrap() > standard.max_files.unwrap());
    }

    #[test]
    fn only_deep_has_memory() {
        for profile in DepthProfile::all() {
            assert_eq!(
                profile.memory_backend.is_some(),
                profile.depth == Depth::Deep,
                "{}",
                profile.depth
            );
        }
    }

    #[test]
    fn quick_disables_file_reads_and_offload() {
        let quick = DepthProfile::for_depth(Depth::Quick);
        assert!(!quick.analyze_files);
        assert!(!quick.tool_offload.enabled);
        assert_eq!(quick.max_steps, 10);
    }

    #[test]
    fn lookup_matches_depth() {
        for depth in [Depth::Quick, Depth::Standard, Depth::Deep] {
            assert_eq!(DepthProfile::for_depth(depth).depth, depth);
        }
    }

    #[test]
    fn deep_offloads_more_aggressively() {
        let standard = DepthProfile::for_depth(Depth::Standard).tool_offload;
        let deep = DepthProfile::for_depth(Depth::Deep).tool_offload;
        assert!(deep.threshold_tokens < standard.threshold_tokens);
        assert_eq!(deep.storage_dir, Some(".explain_cache"));
    }

    #[test]
    fn depth_from_str_is_case_insensitive() {
        assert_eq!("QUICK".parse::<Depth>().unwrap(), Depth::Quick);
        assert!("shallow".parse::<Depth>().is_err());
    }
}
