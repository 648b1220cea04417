use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::error::{LlmError, ParseFailure};
use crate::llm::LlmClient;
use crate::models::{Participant, Team};
use crate::parse::extract_json;
use crate::prompts::{self, CallProfile};

pub const MAX_TEAM_SIZE: usize = 5;

#[derive(Debug, Error)]
pub enum TeamError {
    #[error("no participants have checked in")]
    NoParticipants,
    #[error("team formation call failed: {0}")]
    Llm(#[from] LlmError),
    #[error("unusable team response: {0}")]
    Parse(#[from] ParseFailure),
    #[error("{name} was not assigned to any team")]
    Unassigned { name: String },
    #[error("{name} was assigned to more than one team")]
    Duplicated { name: String },
    #[error("{name} is not a checked-in participant")]
    Unknown { name: String },
    #[error("{team} has {size} members, more than {max}")]
    Oversized { team: String, size: usize, max: usize },
    #[error("leader of {team} is not one of its members")]
    LeaderNotMember { team: String },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TeamsPayload {
    Wrapped { teams: Vec<Team> },
    Bare(Vec<Team>),
}

pub async fn create_teams(
    client: &dyn LlmClient,
    participants: &[Participant],
    max_team_size: usize,
) -> Result<Vec<Team>, TeamError> {
    if participants.is_empty() {
        return Err(TeamError::NoParticipants);
    }

    let prompt = prompts::teams_prompt(participants, max_team_size);
    let raw = client.complete(CallProfile::Teams.request(prompt)).await?;
    let teams = parse_teams(&raw)?;
    check_assignment(&teams, participants, max_team_size)?;

    info!(teams = teams.len(), participants = participants.len(), "formed teams");
    Ok(teams)
}

pub fn parse_teams(raw: &str) -> Result<Vec<Team>, ParseFailure> {
    let value = extract_json(raw)?;
    let payload: TeamsPayload =
        serde_json::from_value(value).map_err(|e| ParseFailure::Shape(e.to_string()))?;
    Ok(match payload {
        TeamsPayload::Wrapped { teams } | TeamsPayload::Bare(teams) => teams,
    })
}

/// Every participant exactly once, nobody invented, no team over the cap.
///
/// Names are not unique at check-in, so each name must be placed as many
/// times as it was checked in.
pub fn check_assignment(
    teams: &[Team],
    participants: &[Participant],
    max_team_size: usize,
) -> Result<(), TeamError> {
    let mut expected: HashMap<&str, usize> = HashMap::new();
    for participant in participants {
        *expected.entry(participant.name.as_str()).or_default() += 1;
    }
    let mut placed: HashMap<&str, usize> = HashMap::new();

    for team in teams {
        if team.members.len() > max_team_size {
            return Err(TeamError::Oversized {
                team: team.name.clone(),
                size: team.members.len(),
                max: max_team_size,
            });
        }
        if !team.members.iter().any(|m| m.name == team.leader.name) {
            return Err(TeamError::LeaderNotMember {
                team: team.name.clone(),
            });
        }
        for member in &team.members {
            let name = member.name.as_str();
            let allowed = *expected.get(name).ok_or_else(|| TeamError::Unknown {
                name: member.name.clone(),
            })?;
            let count = placed.entry(name).or_default();
            *count += 1;
            if *count > allowed {
                return Err(TeamError::Duplicated {
                    name: member.name.clone(),
                });
            }
        }
    }

    if let Some(missing) = participants
        .iter()
        .find(|p| placed.get(p.name.as_str()).copied().unwrap_or(0) < expected[p.name.as_str()])
    {
        return Err(TeamError::Unassigned {
            name: missing.name.clone(),
        });
    }
    Ok(())
}
