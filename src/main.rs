use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

mod ceremony;
mod config;
mod db;
mod error;
mod extract;
mod llm;
mod models;
mod narrative;
mod parse;
mod pipeline;
mod prompts;
mod rank;
mod report;
mod store;
mod teams;

use crate::config::Settings;
use crate::error::PipelineError;
use crate::llm::OpenAiClient;
use crate::models::{CheckInForm, NewSubmission};
use crate::pipeline::{FailurePolicy, PipelineOptions, ScoringPipeline};
use crate::store::PgStore;

#[derive(Parser)]
#[command(name = "workshop-judge")]
#[command(about = "Check-in, team formation and proposal judging for AI workshops", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Register an attendee
    CheckIn {
        #[arg(long)]
        name: Option<String>,
        /// junior, medior, senior, managing or principal
        #[arg(long)]
        experience: Option<String>,
        /// 1 (none) to 5 (expert)
        #[arg(long)]
        ai_experience: Option<u8>,
        /// image1 or image2
        #[arg(long)]
        ai_image_guess: Option<String>,
        /// take charge, research, ask or observe
        #[arg(long)]
        approach: Option<String>,
        #[arg(long)]
        not_robot: bool,
    },
    /// List checked-in attendees
    Participants,
    /// Group checked-in attendees into balanced teams
    CreateTeams {
        #[arg(long, default_value_t = teams::MAX_TEAM_SIZE)]
        max_size: usize,
    },
    /// Submit one team proposal from a JSON file
    Submit {
        #[arg(long)]
        file: PathBuf,
    },
    /// Import team proposals from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Read a proposal off a photographed whiteboard
    Extract {
        #[arg(long)]
        team: String,
        #[arg(long)]
        image: PathBuf,
        /// Store the extracted proposal as the team's submission
        #[arg(long)]
        save: bool,
    },
    /// Score, rank and narrate every stored proposal
    Score {
        /// Rank the proposals that scored instead of failing the batch
        #[arg(long)]
        skip_failed: bool,
        #[arg(long, default_value_t = narrative::DEFAULT_TOP_N)]
        top: usize,
        /// Also write the markdown report here
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Generate the winners announcement script and speech
    Winners {
        #[arg(long, default_value_t = narrative::DEFAULT_TOP_N)]
        top: usize,
        #[arg(long, default_value = prompts::DEFAULT_VOICE)]
        voice: String,
        #[arg(long, default_value = "ceremony.json")]
        out: PathBuf,
        #[arg(long, default_value = "ceremony.mp3")]
        audio: PathBuf,
    },
    /// Generate a markdown report of the current standings
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::CheckIn {
            name,
            experience,
            ai_experience,
            ai_image_guess,
            approach,
            not_robot,
        } => {
            let check_in = CheckInForm {
                name,
                experience,
                ai_experience,
                ai_image_guess,
                approach,
                not_robot,
            }
            .validate()?;
            db::insert_check_in(&pool, &check_in).await?;
            println!("Checked in {}.", check_in.name);
        }
        Commands::Participants => {
            let participants = db::fetch_participants(&pool).await?;
            if participants.is_empty() {
                println!("Nobody has checked in yet.");
                return Ok(());
            }
            for p in &participants {
                println!(
                    "- {} ({}, AI {}, {})",
                    p.name, p.experience, p.ai_experience, p.approach
                );
            }
        }
        Commands::CreateTeams { max_size } => {
            let client = OpenAiClient::new(settings.openai()?)?;
            let participants = db::fetch_participants(&pool).await?;
            let teams = teams::create_teams(&client, &participants, max_size.max(1)).await?;
            for team in &teams {
                println!("{} (leader: {})", team.name, team.leader.name);
                for member in &team.members {
                    println!(
                        "  - {} ({}, AI {}, {})",
                        member.name, member.experience, member.ai_experience, member.approach
                    );
                }
            }
        }
        Commands::Submit { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let submission: NewSubmission = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a valid proposal", file.display()))?;
            submission.validate()?;
            if db::insert_submission(&pool, &submission).await? {
                println!("Proposal from {} submitted.", submission.team_name);
            } else {
                anyhow::bail!("{} has already submitted a proposal", submission.team_name);
            }
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} proposals from {}.", csv.display());
        }
        Commands::Extract { team, image, save } => {
            let client = OpenAiClient::new(settings.openai()?)?;
            let fields = extract::extract_proposal(&client, &image).await?;
            for (name, value) in fields.labelled() {
                println!("{name}: {value}");
            }
            if save {
                let submission = NewSubmission {
                    team_name: team,
                    fields,
                    image: Some(image.display().to_string()),
                };
                submission.validate()?;
                if !db::insert_submission(&pool, &submission).await? {
                    anyhow::bail!("{} has already submitted a proposal", submission.team_name);
                }
                println!("Saved proposal for {}.", submission.team_name);
            }
        }
        Commands::Score {
            skip_failed,
            top,
            report,
        } => {
            let client = Arc::new(OpenAiClient::new(settings.openai()?)?);
            let store = Arc::new(PgStore::new(pool.clone()));
            let options = PipelineOptions {
                concurrency: settings.concurrency,
                call_timeout: settings.call_timeout(),
                policy: if skip_failed {
                    FailurePolicy::Skip
                } else {
                    FailurePolicy::Abort
                },
                top_n: top.max(1),
            };

            let batch = match ScoringPipeline::new(store, client, options).run().await {
                Ok(batch) => batch,
                Err(PipelineError::Aborted { total, failures }) => {
                    for (team, err) in &failures {
                        eprintln!("- {team}: {err}");
                    }
                    anyhow::bail!(
                        "{} of {total} submissions failed to score; rerun with --skip-failed to rank the rest",
                        failures.len()
                    );
                }
                Err(err) => return Err(err.into()),
            };

            let leaders = batch.top().len();
            println!("Standings:");
            for (i, entry) in batch.entries.iter().enumerate() {
                let marker = if i < leaders { "*" } else { " " };
                println!(
                    "{marker}{:>2}. {} score {:.1}",
                    entry.rank, entry.submission.team_name, entry.result.score
                );
            }
            if !batch.skipped.is_empty() {
                println!("Skipped:");
                for (team, err) in &batch.skipped {
                    println!("- {team}: {err}");
                }
            }
            println!();
            println!("{}", batch.narrative);

            if let Some(out) = report {
                let unranked = db::fetch_unranked(&pool).await?;
                let report = report::build_report(
                    &batch.entries,
                    &unranked,
                    Some(batch.narrative.as_str()),
                );
                std::fs::write(&out, report)?;
                println!("Report written to {}.", out.display());
            }
        }
        Commands::Winners {
            top,
            voice,
            out,
            audio,
        } => {
            let client = OpenAiClient::new(settings.openai()?)?;
            let limit = i64::try_from(top.max(1)).context("--top is too large")?;
            let winners = db::fetch_ranked(&pool, Some(limit)).await?;
            let ceremony = ceremony::announce(&client, &winners, &voice).await?;

            std::fs::write(&out, ceremony.to_json()?)?;
            std::fs::write(&audio, &ceremony.audio)?;
            println!("{}", ceremony.script);
            println!(
                "Ceremony written to {} and {}.",
                out.display(),
                audio.display()
            );
        }
        Commands::Report { out } => {
            let ranked = db::fetch_ranked(&pool, None).await?;
            let unranked = db::fetch_unranked(&pool).await?;
            let report = report::build_report(&ranked, &unranked, None);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
