use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RubricKind {
    #[default]
    Generic,
    Mentorship,
}

impl RubricKind {
    pub fn name(&self) -> &'static str {
        match self {
            RubricKind::Generic => "generic",
            RubricKind::Mentorship => "mentorship",
        }
    }
}

impl fmt::Display for RubricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RubricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "generic" => Ok(RubricKind::Generic),
            "mentorship" => Ok(RubricKind::Mentorship),
            other => Err(format!("unknown rubric '{other}' (expected generic|mentorship)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Factor {
    pub name: &'static str,
    /// Percentage weight; weights of a rubric sum to 100.
    pub weight: f64,
    pub description: &'static str,
}

/// The named, weighted factor set the model justifies a viral score with.
///
/// The same rubric configures the prompt and the parser, so factor names the
/// model is told to emit are the ones read back out of its answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Rubric {
    pub kind: RubricKind,
    pub factors: Vec<Factor>,
}

impl Rubric {
    pub fn from_kind(kind: RubricKind) -> Self {
        match kind {
            RubricKind::Generic => Self::generic(),
            RubricKind::Mentorship => Self::mentorship(),
        }
    }

    pub fn generic() -> Self {
        let weight = 100.0 / 7.0;
        let factor = |name, description| Factor {
            name,
            weight,
            description,
        };
        Self {
            kind: RubricKind::Generic,
            factors: vec![
                factor("hook", "grabs attention in the first seconds"),
                factor("emotion", "provokes a strong feeling"),
                factor("controversy", "takes a stance people will argue about"),
                factor("insight", "teaches something non-obvious"),
                factor("storytelling", "has a beginning, tension and payoff"),
                factor("cliffhanger", "leaves the viewer wanting more"),
                factor("humor", "is genuinely funny"),
            ],
        }
    }

    pub fn mentorship() -> Self {
        Self {
            kind: RubricKind::Mentorship,
            factors: vec![
                Factor {
                    name: "insight",
                    weight: 25.0,
                    description: "hard-won lesson or counter-intuitive advice",
                },
                Factor {
                    name: "raw",
                    weight: 20.0,
                    description: "honest, vulnerable, unpolished delivery",
                },
                Factor {
                    name: "actionable",
                    weight: 20.0,
                    description: "viewer can apply it today",
                },
                Factor {
                    name: "hook",
                    weight: 15.0,
                    description: "opening line stops the scroll",
                },
                Factor {
                    name: "relatable",
                    weight: 10.0,
                    description: "mirrors a struggle the audience has",
                },
                Factor {
                    name: "standalone",
                    weight: 10.0,
                    description: "makes sense without the rest of the video",
                },
            ],
        }
    }

    pub fn factor(&self, name: &str) -> Option<&Factor> {
        self.factors
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }
}

impl Default for Rubric {
    fn default() -> Self {
        Self::generic()
    }
}
