use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// The seven free-text answers every team proposal carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalFields {
    pub problem_statement: String,
    pub target_audience: String,
    pub proposed_solution: String,
    pub data_needs: String,
    pub expected_impact: String,
    pub ethical_considerations: String,
    pub implementation_plan: String,
}

impl ProposalFields {
    pub fn labelled(&self) -> [(&'static str, &str); 7] {
        [
            ("problemStatement", &self.problem_statement),
            ("targetAudience", &self.target_audience),
            ("proposedSolution", &self.proposed_solution),
            ("dataNeeds", &self.data_needs),
            ("expectedImpact", &self.expected_impact),
            ("ethicalConsiderations", &self.ethical_considerations),
            ("implementationPlan", &self.implementation_plan),
        ]
    }

    /// Rejects the proposal if any field is empty or whitespace only.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let missing: Vec<&'static str> = self
            .labelled()
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::MissingFields(missing))
        }
    }
}

/// A proposal as sent in by a team, before it has an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubmission {
    pub team_name: String,
    #[serde(flatten)]
    pub fields: ProposalFields,
    #[serde(default)]
    pub image: Option<String>,
}

impl NewSubmission {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.team_name.trim().is_empty() {
            return Err(ValidationError::MissingFields(vec!["teamName"]));
        }
        self.fields.validate()
    }
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub id: Uuid,
    pub team_name: String,
    pub fields: ProposalFields,
    pub image_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub score: f64,
    pub feedback: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Evaluated {
    pub submission: Submission,
    pub result: EvaluationResult,
}

#[derive(Debug, Clone)]
pub struct RankedEntry {
    pub rank: u32,
    pub submission: Submission,
    pub result: EvaluationResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerSummary {
    pub rank: u32,
    pub team_name: String,
    pub score: f64,
    pub feedback: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub suggestions: Vec<String>,
}

impl From<&RankedEntry> for WinnerSummary {
    fn from(entry: &RankedEntry) -> Self {
        Self {
            rank: entry.rank,
            team_name: entry.submission.team_name.clone(),
            score: entry.result.score,
            feedback: entry.result.feedback.clone(),
            strengths: entry.result.strengths.clone(),
            weaknesses: entry.result.weaknesses.clone(),
            suggestions: entry.result.suggestions.clone(),
        }
    }
}

/// Business experience ladder, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Experience {
    Junior,
    Medior,
    Senior,
    Managing,
    Principal,
}

impl Experience {
    pub fn as_str(self) -> &'static str {
        match self {
            Experience::Junior => "junior",
            Experience::Medior => "medior",
            Experience::Senior => "senior",
            Experience::Managing => "managing",
            Experience::Principal => "principal",
        }
    }
}

impl FromStr for Experience {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "junior" => Ok(Experience::Junior),
            "medior" => Ok(Experience::Medior),
            "senior" => Ok(Experience::Senior),
            "managing" => Ok(Experience::Managing),
            "principal" => Ok(Experience::Principal),
            other => Err(ValidationError::InvalidValue {
                field: "experience",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Experience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Approach {
    #[serde(rename = "take charge")]
    TakeCharge,
    #[serde(rename = "research")]
    Research,
    #[serde(rename = "ask")]
    Ask,
    #[serde(rename = "observe")]
    Observe,
}

impl Approach {
    pub fn as_str(self) -> &'static str {
        match self {
            Approach::TakeCharge => "take charge",
            Approach::Research => "research",
            Approach::Ask => "ask",
            Approach::Observe => "observe",
        }
    }
}

impl FromStr for Approach {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "take charge" | "take-charge" => Ok(Approach::TakeCharge),
            "research" => Ok(Approach::Research),
            "ask" => Ok(Approach::Ask),
            "observe" => Ok(Approach::Observe),
            other => Err(ValidationError::InvalidValue {
                field: "approach",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Approach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check-in form answers. Every field is optional here so that a single
/// validation pass can report all of the missing ones at once.
#[derive(Debug, Clone, Default)]
pub struct CheckInForm {
    pub name: Option<String>,
    pub experience: Option<String>,
    pub ai_experience: Option<u8>,
    pub ai_image_guess: Option<String>,
    pub approach: Option<String>,
    pub not_robot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckIn {
    pub name: String,
    pub experience: Experience,
    pub ai_experience: u8,
    pub ai_image_guess: String,
    pub approach: Approach,
}

impl CheckInForm {
    pub fn validate(self) -> Result<CheckIn, ValidationError> {
        let blank = |value: &Option<String>| value.as_deref().map_or(true, |v| v.trim().is_empty());

        let mut missing = Vec::new();
        if blank(&self.name) {
            missing.push("name");
        }
        if blank(&self.experience) {
            missing.push("experience");
        }
        if self.ai_experience.is_none() {
            missing.push("aiExperience");
        }
        if blank(&self.ai_image_guess) {
            missing.push("aiImageGuess");
        }
        if blank(&self.approach) {
            missing.push("approach");
        }
        if !self.not_robot {
            missing.push("notRobot");
        }
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing));
        }

        let ai_experience = self.ai_experience.unwrap_or_default();
        if !(1..=5).contains(&ai_experience) {
            return Err(ValidationError::InvalidValue {
                field: "aiExperience",
                value: ai_experience.to_string(),
            });
        }

        let ai_image_guess = self.ai_image_guess.unwrap_or_default().trim().to_string();
        if ai_image_guess != "image1" && ai_image_guess != "image2" {
            return Err(ValidationError::InvalidValue {
                field: "aiImageGuess",
                value: ai_image_guess,
            });
        }

        Ok(CheckIn {
            name: self.name.unwrap_or_default().trim().to_string(),
            experience: self.experience.unwrap_or_default().parse()?,
            ai_experience,
            ai_image_guess,
            approach: self.approach.unwrap_or_default().parse()?,
        })
    }
}

/// The subset of a check-in used for team formation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub name: String,
    pub experience: Experience,
    #[serde(with = "ai_level")]
    pub ai_experience: u8,
    pub approach: Approach,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    pub leader: Participant,
    pub members: Vec<Participant>,
}

/// Models answer the AI level as either `"3"` or `3`.
mod ai_level {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u8, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Level {
            Number(u8),
            Text(String),
        }

        match Level::deserialize(deserializer)? {
            Level::Number(n) => Ok(n),
            Level::Text(s) => s.trim().parse().map_err(de::Error::custom),
        }
    }
}
