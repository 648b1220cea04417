//! Prompt templates and the fixed model options used at each call site.

use std::fmt::Write;

use crate::llm::CompletionRequest;
use crate::models::{Participant, ProposalFields, RankedEntry};

const JSON_ONLY_SYSTEM: &str = "You are a JSON-only response bot. You must ONLY respond with valid JSON objects, no other text or explanations.";

pub const DEFAULT_VOICE: &str = "alloy";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallProfile {
    Scoring,
    Narrative,
    Script,
    Teams,
    Extraction,
}

impl CallProfile {
    pub fn request(self, user: String) -> CompletionRequest {
        let (model, temperature, system, max_tokens) = match self {
            CallProfile::Scoring => ("gpt-4.1", Some(0.7), Some(JSON_ONLY_SYSTEM), None),
            CallProfile::Narrative => ("gpt-4", Some(0.8), None, None),
            CallProfile::Script => ("gpt-4", Some(0.8), None, None),
            CallProfile::Teams => ("gpt-4.1", Some(0.7), None, None),
            CallProfile::Extraction => ("gpt-4o", None, Some(JSON_ONLY_SYSTEM), Some(1000)),
        };
        CompletionRequest {
            model,
            temperature,
            max_tokens,
            system,
            user,
            image_url: None,
        }
    }
}

pub fn scoring_prompt(fields: &ProposalFields) -> String {
    format!(
        r#"Analyze this AI solution proposal and provide a score (0-100) and detailed feedback. Be sassy and witty in your analysis, but maintain professionalism. Consider the following aspects:

Problem Statement: {}
Target Audience: {}
Proposed Solution: {}
Data Needs: {}
Expected Impact: {}
Ethical Considerations: {}
Implementation Plan: {}

You MUST respond with ONLY a JSON object in this exact format:
{{
  "score": number,
  "feedback": "string (be sassy and witty but professional)",
  "strengths": ["string"],
  "weaknesses": ["string"],
  "suggestions": ["string"]
}}

DO NOT include any text before or after the JSON object. DO NOT use markdown formatting. DO NOT include any explanations or apologies."#,
        fields.problem_statement,
        fields.target_audience,
        fields.proposed_solution,
        fields.data_needs,
        fields.expected_impact,
        fields.ethical_considerations,
        fields.implementation_plan,
    )
}

pub fn narrative_prompt(top: &[RankedEntry]) -> String {
    let mut prompt = String::from(
        "Create a sassy and witty summary of the top winning teams from this AI solution competition. Here are the submissions:\n",
    );
    for entry in top {
        let _ = write!(
            prompt,
            "\n{}. Team: {}\nScore: {}\nFeedback: {}\n",
            entry.rank, entry.submission.team_name, entry.result.score, entry.result.feedback
        );
        write_list(&mut prompt, "Strengths", &entry.result.strengths);
        write_list(&mut prompt, "Weaknesses", &entry.result.weaknesses);
    }
    prompt.push_str(
        "\nMake it entertaining but professional, highlighting what made each team stand out and why they deserve their ranking.",
    );
    prompt
}

pub fn script_prompt(top: &[RankedEntry]) -> String {
    let mut prompt = String::from(
        "Create an engaging and entertaining script for announcing the winners of an AI solution competition. The script should be conversational, sassy, and professional. Include dramatic pauses and emphasis points.\n\nHere are the top teams:\n",
    );
    for entry in top {
        let fields = &entry.submission.fields;
        let _ = write!(
            prompt,
            "\n{}. Team: {}\nScore: {}\nFeedback: {}\nProblem: {}\nSolution: {}\nImpact: {}\n",
            entry.rank,
            entry.submission.team_name,
            entry.result.score,
            entry.result.feedback,
            fields.problem_statement,
            fields.proposed_solution,
            fields.expected_impact,
        );
        write_list(&mut prompt, "Strengths", &entry.result.strengths);
        write_list(&mut prompt, "Weaknesses", &entry.result.weaknesses);
    }
    prompt.push_str(
        "\nFormat the script with clear sections:\n\
         1. An exciting introduction (15 seconds)\n\
         2. Announcement of each winner with their key achievements (30 seconds)\n\
         3. What made each solution special (10 seconds)\n\
         4. A dramatic conclusion (5 seconds)\n\n\
         Make it sound natural and conversational, like a charismatic host announcing the winners.",
    );
    prompt
}

pub fn teams_prompt(participants: &[Participant], max_team_size: usize) -> String {
    let mut prompt = format!(
        r#"Create balanced teams of maximum {max_team_size} people from the following participants. Consider three equally important factors:
1. Business Experience Level (junior, medior, senior, managing, principal)
2. AI Experience Level (1-5, where 1 is no experience and 5 is expert)
3. Approach Style (take charge, research, ask, observe)

Each team should have a balanced mix of business and AI experience levels and different approach styles.
If someone has high business experience but low AI experience, pair them with someone who has high AI experience.
Balance a "take charge" approach with "research" or "observe" approaches.

For each team, select a leader: the member with the highest business experience level. If there is a tie, choose the one with the highest AI experience.

Make sure every participant is assigned to exactly one team. If the number of participants is not divisible by {max_team_size}, create a smaller last team. Do not leave anyone out. Return only the JSON, no extra text.

Participants:
"#
    );
    for p in participants {
        let _ = writeln!(
            prompt,
            "- {}: Business Experience: {}, AI Experience: {}, Approach: {}",
            p.name, p.experience, p.ai_experience, p.approach
        );
    }
    prompt.push_str(
        r#"
Format the response as JSON:
{
  "teams": [
    {
      "name": "Team 1",
      "leader": { "name": "John Doe", "experience": "senior", "aiExperience": "3", "approach": "take charge" },
      "members": [
        { "name": "John Doe", "experience": "senior", "aiExperience": "3", "approach": "take charge" },
        { "name": "Jane Smith", "experience": "medior", "aiExperience": "4", "approach": "research" }
      ]
    }
  ]
}"#,
    );
    prompt
}

pub fn extraction_prompt() -> String {
    r#"Analyze this image of a team proposal and extract the following information. You MUST respond with ONLY a JSON object, no other text or explanations.

Required fields to extract:
1. Problem Statement
2. Target Audience
3. Proposed AI Solution
4. Data Needs
5. Expected Impact
6. Ethical Considerations
7. Implementation Plan

Your response must be a single JSON object with exactly these keys:
{
  "problemStatement": "string",
  "targetAudience": "string",
  "proposedSolution": "string",
  "dataNeeds": "string",
  "expectedImpact": "string",
  "ethicalConsiderations": "string",
  "implementationPlan": "string"
}

DO NOT include any text before or after the JSON object. DO NOT use markdown formatting. DO NOT include any explanations or apologies."#
        .to_string()
}

fn write_list(prompt: &mut String, label: &str, items: &[String]) {
    if !items.is_empty() {
        let _ = writeln!(prompt, "{label}: {}", items.join(", "));
    }
}
