//! Deterministic rubric scoring.
//!
//! Used when the remote model is unavailable or disabled. Every function in
//! here is pure: the same input always yields the same analysis.

use async_trait::async_trait;

use crate::evaluator::{DEFAULT_THRESHOLD, EvalContext, EvalError, Evaluator};
use crate::pipeline::types::{Analysis, Recommendation, Stage};

/// Output reported by the code runner when execution failed.
pub const RUN_FAILED_OUTPUT: &str = "Error executing code";

const STOPWORDS: &[&str] = &[
    "about", "after", "again", "their", "there", "these", "those", "which", "while", "would",
    "could", "should", "between", "explain", "describe", "example", "what", "when", "where",
    "your", "with", "from", "that", "this", "have", "does", "into",
];

/// One scoring rule of a rubric.
#[derive(Debug, Clone)]
pub enum Criterion {
    /// Answer longer than this many characters.
    MinChars(usize),
    /// Answer mentions any of these terms.
    Mentions(&'static [&'static str]),
    /// Answer mentions at least one term from every group.
    MentionsAll(&'static [&'static [&'static str]]),
    /// Answer reuses at least this many significant words of the question.
    QuestionOverlap(usize),
    /// Executed output agrees with the pinned expected output.
    OutputMatchesExpected,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub criterion: Criterion,
    pub points: u8,
    pub label: &'static str,
}

/// Base score plus additive rules, capped at 100.
#[derive(Debug, Clone)]
pub struct Rubric {
    pub base: u8,
    pub rules: Vec<Rule>,
}

const DEFINES_FUNCTION: &[&str] = &["def ", "fn ", "function", "func ", "lambda", "=>"];
const RETURNS: &[&str] = &["return"];
const PRINTS: &[&str] = &[
    "print", "console.log", "printf", "cout", "puts", "echo", "system.out",
];

impl Rubric {
    pub fn coding() -> Self {
        Self {
            base: 75,
            rules: vec![
                Rule {
                    criterion: Criterion::MentionsAll(&[DEFINES_FUNCTION, RETURNS]),
                    points: 10,
                    label: "defines a function that returns a value",
                },
                Rule {
                    criterion: Criterion::Mentions(PRINTS),
                    points: 5,
                    label: "prints its result",
                },
                Rule {
                    criterion: Criterion::OutputMatchesExpected,
                    points: 10,
                    label: "output matches the expected output",
                },
            ],
        }
    }

    pub fn technical() -> Self {
        Self {
            base: 70,
            rules: vec![
                Rule {
                    criterion: Criterion::MinChars(50),
                    points: 10,
                    label: "detailed answer",
                },
                Rule {
                    criterion: Criterion::MentionsAll(&[&["list"], &["tuple"]]),
                    points: 10,
                    label: "compares lists and tuples",
                },
                Rule {
                    criterion: Criterion::Mentions(&["mutable", "mutability"]),
                    points: 10,
                    label: "discusses mutability",
                },
                Rule {
                    criterion: Criterion::QuestionOverlap(2),
                    points: 10,
                    label: "addresses the question's terms",
                },
            ],
        }
    }

    pub fn hr() -> Self {
        Self {
            base: 70,
            rules: vec![
                Rule {
                    criterion: Criterion::MinChars(100),
                    points: 15,
                    label: "detailed answer",
                },
                Rule {
                    criterion: Criterion::Mentions(&["challenge", "difficult"]),
                    points: 5,
                    label: "names the challenge",
                },
                Rule {
                    criterion: Criterion::Mentions(&["solution", "resolve", "resolution"]),
                    points: 5,
                    label: "describes a resolution",
                },
                Rule {
                    criterion: Criterion::Mentions(&["team", "collaborat"]),
                    points: 5,
                    label: "mentions teamwork",
                },
            ],
        }
    }

    pub fn for_stage(stage: Stage) -> Option<Self> {
        match stage {
            Stage::CodingTest => Some(Self::coding()),
            Stage::TechInterview => Some(Self::technical()),
            Stage::HrInterview => Some(Self::hr()),
            Stage::IntakeMatch | Stage::Offer => None,
        }
    }

    /// Score `answer`, returning the score and the labels of matched rules.
    pub fn score(&self, question: &str, answer: &str, ctx: &EvalContext) -> (u8, Vec<&'static str>) {
        if answer.trim().is_empty() {
            return (0, Vec::new());
        }
        let lowered = answer.to_lowercase();
        let mut total = u32::from(self.base);
        let mut matched = Vec::new();
        for rule in &self.rules {
            if rule.criterion.holds(question, answer, &lowered, ctx) {
                total += u32::from(rule.points);
                matched.push(rule.label);
            }
        }
        (total.min(100) as u8, matched)
    }
}

impl Criterion {
    fn holds(&self, question: &str, answer: &str, lowered: &str, ctx: &EvalContext) -> bool {
        match self {
            Criterion::MinChars(n) => answer.trim().chars().count() > *n,
            Criterion::Mentions(terms) => terms.iter().any(|t| lowered.contains(t)),
            Criterion::MentionsAll(groups) => groups
                .iter()
                .all(|group| group.iter().any(|t| lowered.contains(t))),
            Criterion::QuestionOverlap(min) => {
                let terms = significant_terms(question);
                terms.iter().filter(|t| lowered.contains(t.as_str())).count() >= *min
            }
            Criterion::OutputMatchesExpected => match (&ctx.expected_output, &ctx.run_output) {
                (Some(expected), Some(output)) => output_matches(expected, output),
                _ => false,
            },
        }
    }
}

/// Distinct words of five or more letters that carry meaning.
fn significant_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.len() >= 5 && !STOPWORDS.contains(&w.as_str()))
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

/// Whether executed output agrees with an expected output such as
/// `"5 (for input 2, 3)"`: either exactly, or with its leading token.
pub fn output_matches(expected: &str, output: &str) -> bool {
    let output = output.trim();
    if output.is_empty() || output == RUN_FAILED_OUTPUT {
        return false;
    }
    let expected = expected.trim();
    expected == output || expected.split_whitespace().next() == Some(output)
}

/// Rubric-based evaluator. Never fails.
#[derive(Debug, Clone, Default)]
pub struct HeuristicEvaluator;

impl HeuristicEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Score synchronously. The recommendation uses the default threshold;
    /// callers normalize it to their scoring mode.
    pub fn score(&self, stage: Stage, question: &str, input: &str, ctx: &EvalContext) -> Analysis {
        if stage == Stage::IntakeMatch {
            return skill_match(ctx);
        }
        let Some(rubric) = Rubric::for_stage(stage) else {
            return Analysis::failed(format!("Stage '{}' is not evaluated", stage));
        };

        let (score, matched) = rubric.score(question, input, ctx);
        let feedback = if input.trim().is_empty() {
            "Fallback evaluation: no answer was submitted. Score: 0/100".to_string()
        } else if matched.is_empty() {
            format!("Fallback evaluation: basic answer. Score: {}/100", score)
        } else {
            format!("Fallback evaluation: {}. Score: {}/100", matched.join("; "), score)
        };
        Analysis::new(score, feedback, Recommendation::from_score(score, DEFAULT_THRESHOLD))
    }
}

/// Lowercased words of `text`. `+`, `#` and inner `.` stay part of a word so
/// that `c++`, `c#` and `node.js` survive; sentence dots do not.
fn skill_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || matches!(c, '+' | '#' | '.')))
        .map(|word| word.trim_matches('.'))
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether the word sequence `skill` occurs in `words`.
fn has_skill(words: &[String], skill: &[String]) -> bool {
    !skill.is_empty() && words.windows(skill.len()).any(|window| window == skill)
}

/// Share of required skills found in the candidate's skills and resume.
/// Skills match whole words, so `go` does not match `good`.
pub fn skill_match(ctx: &EvalContext) -> Analysis {
    let words = skill_tokens(&format!("{}\n{}", ctx.skills, ctx.resume_text));
    let required: Vec<&str> = ctx
        .required_skills
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    if required.is_empty() {
        return Analysis::new(
            100,
            "Fallback skill match: no required skills configured. Score: 100/100",
            Recommendation::Pass,
        );
    }

    let found: Vec<&str> = required
        .iter()
        .copied()
        .filter(|skill| has_skill(&words, &skill_tokens(skill)))
        .collect();
    let score = (found.len() * 100 / required.len()) as u8;
    let feedback = if found.is_empty() {
        format!(
            "Fallback skill match: none of the required skills ({}) found. Score: 0/100",
            required.join(", ")
        )
    } else {
        format!(
            "Fallback skill match: found {} ({} of {} required skills). Score: {}/100",
            found.join(", "),
            found.len(),
            required.len(),
            score
        )
    };
    Analysis::new(score, feedback, Recommendation::from_score(score, DEFAULT_THRESHOLD))
}

#[async_trait]
impl Evaluator for HeuristicEvaluator {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn evaluate(
        &self,
        stage: Stage,
        question: &str,
        input: &str,
        ctx: &EvalContext,
    ) -> Result<Analysis, EvalError> {
        Ok(self.score(stage, question, input, ctx))
    }
}
