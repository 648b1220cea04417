use std::fmt::Write;

use crate::models::{RankedEntry, Submission};

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSummary {
    pub count: usize,
    pub mean: f64,
    pub max: f64,
    pub min: f64,
}

pub fn summarize_scores(ranked: &[RankedEntry]) -> Option<ScoreSummary> {
    if ranked.is_empty() {
        return None;
    }

    let scores = ranked.iter().map(|e| e.result.score);
    let total: f64 = scores.clone().sum();
    Some(ScoreSummary {
        count: ranked.len(),
        mean: total / ranked.len() as f64,
        max: scores.clone().fold(f64::MIN, f64::max),
        min: scores.fold(f64::MAX, f64::min),
    })
}

pub fn build_report(
    ranked: &[RankedEntry],
    unranked: &[Submission],
    narrative: Option<&str>,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Workshop Proposal Standings");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Score Summary");

    match summarize_scores(ranked) {
        None => {
            let _ = writeln!(output, "No scored submissions yet.");
        }
        Some(summary) => {
            let _ = writeln!(
                output,
                "{} teams scored, mean {:.1}, highest {:.1}, lowest {:.1}",
                summary.count, summary.mean, summary.max, summary.min
            );
        }
    }

    if let Some(narrative) = narrative {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Winners");
        let _ = writeln!(output, "{}", narrative.trim());
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Standings");

    if ranked.is_empty() {
        let _ = writeln!(output, "No ranked submissions.");
    } else {
        for entry in ranked {
            let _ = writeln!(
                output,
                "### {}. {} ({:.1})",
                entry.rank, entry.submission.team_name, entry.result.score
            );
            let _ = writeln!(output, "{}", entry.result.feedback);
            if let Some(image) = &entry.submission.image_ref {
                let _ = writeln!(output, "\n_Whiteboard photo: {image}_");
            }
            write_section(&mut output, "Strengths", &entry.result.strengths);
            write_section(&mut output, "Weaknesses", &entry.result.weaknesses);
            write_section(&mut output, "Suggestions", &entry.result.suggestions);
            let _ = writeln!(output);
        }
    }

    if !unranked.is_empty() {
        let _ = writeln!(output, "## Not Ranked");
        for submission in unranked {
            let _ = writeln!(
                output,
                "- {} (submitted {})",
                submission.team_name,
                submission.created_at.format("%Y-%m-%d %H:%M")
            );
        }
    }

    output
}

fn write_section(output: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(output, "\n**{title}**");
    for item in items {
        let _ = writeln!(output, "- {item}");
    }
}
