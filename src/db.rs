use anyhow::Context;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    CheckIn, EvaluationResult, NewSubmission, Participant, ProposalFields, RankedEntry,
    Submission,
};

const SUBMISSION_COLUMNS: &str = "s.id, s.team_name, s.problem_statement, s.target_audience, \
     s.proposed_solution, s.data_needs, s.expected_impact, s.ethical_considerations, \
     s.implementation_plan, s.image_ref, s.created_at";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let participants = vec![
        ("Avery Lee", "principal", 1i16, "take charge", "image1"),
        ("Jules Moreno", "junior", 5, "research", "image2"),
        ("Kiara Patel", "senior", 3, "observe", "image2"),
        ("Noor Haddad", "medior", 4, "ask", "image1"),
        ("Sam de Vries", "managing", 2, "research", "image1"),
        ("Lena Kowalski", "junior", 4, "take charge", "image2"),
    ];

    for (name, experience, ai_experience, approach, guess) in participants {
        sqlx::query(
            r#"
            INSERT INTO workshop.participants
            (id, full_name, experience, ai_experience, approach, ai_image_guess, not_robot)
            SELECT $1, $2, $3, $4, $5, $6, TRUE
            WHERE NOT EXISTS (
                SELECT 1 FROM workshop.participants WHERE full_name = $2
            )
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(experience)
        .bind(ai_experience)
        .bind(approach)
        .bind(guess)
        .execute(pool)
        .await?;
    }

    let submissions = vec![
        NewSubmission {
            team_name: "Neural Nomads".to_string(),
            fields: ProposalFields {
                problem_statement: "Support agents spend hours searching old tickets".to_string(),
                target_audience: "First-line customer support".to_string(),
                proposed_solution: "Retrieval assistant suggesting similar resolved tickets"
                    .to_string(),
                data_needs: "Two years of anonymised ticket history".to_string(),
                expected_impact: "30% faster resolution".to_string(),
                ethical_considerations: "Strip personal data before indexing".to_string(),
                implementation_plan: "Pilot with one support squad for six weeks".to_string(),
            },
            image: None,
        },
        NewSubmission {
            team_name: "Prompt Pioneers".to_string(),
            fields: ProposalFields {
                problem_statement: "Invoices are keyed in by hand".to_string(),
                target_audience: "Finance back office".to_string(),
                proposed_solution: "Document model that extracts invoice lines".to_string(),
                data_needs: "Scanned invoices with booked results".to_string(),
                expected_impact: "Fewer manual corrections".to_string(),
                ethical_considerations: "Human approval above a threshold".to_string(),
                implementation_plan: "Shadow mode first, then partial automation".to_string(),
            },
            image: None,
        },
    ];

    for submission in &submissions {
        insert_submission(pool, submission).await?;
    }

    Ok(())
}

pub async fn insert_check_in(pool: &PgPool, check_in: &CheckIn) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO workshop.participants
        (id, full_name, experience, ai_experience, approach, ai_image_guess, not_robot)
        VALUES ($1, $2, $3, $4, $5, $6, TRUE)
        "#,
    )
    .bind(id)
    .bind(&check_in.name)
    .bind(check_in.experience.as_str())
    .bind(i16::from(check_in.ai_experience))
    .bind(check_in.approach.as_str())
    .bind(&check_in.ai_image_guess)
    .execute(pool)
    .await
    .context("failed to store check-in")?;
    Ok(id)
}

pub async fn fetch_participants(pool: &PgPool) -> anyhow::Result<Vec<Participant>> {
    let rows = sqlx::query(
        "SELECT full_name, experience, ai_experience, approach \
         FROM workshop.participants ORDER BY created_at, full_name",
    )
    .fetch_all(pool)
    .await?;

    let mut participants = Vec::with_capacity(rows.len());
    for row in rows {
        let experience: String = row.try_get("experience")?;
        let approach: String = row.try_get("approach")?;
        let ai_experience: i16 = row.try_get("ai_experience")?;
        participants.push(Participant {
            name: row.try_get("full_name")?,
            experience: experience.parse()?,
            ai_experience: u8::try_from(ai_experience).context("ai_experience out of range")?,
            approach: approach.parse()?,
        });
    }
    Ok(participants)
}

/// Returns `false` when the team already has a submission.
pub async fn insert_submission(pool: &PgPool, submission: &NewSubmission) -> anyhow::Result<bool> {
    let fields = &submission.fields;
    let result = sqlx::query(
        r#"
        INSERT INTO workshop.submissions
        (id, team_name, problem_statement, target_audience, proposed_solution, data_needs,
         expected_impact, ethical_considerations, implementation_plan, image_ref)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (team_name) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(submission.team_name.trim())
    .bind(&fields.problem_statement)
    .bind(&fields.target_audience)
    .bind(&fields.proposed_solution)
    .bind(&fields.data_needs)
    .bind(&fields.expected_impact)
    .bind(&fields.ethical_considerations)
    .bind(&fields.implementation_plan)
    .bind(&submission.image)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        team_name: String,
        problem_statement: String,
        target_audience: String,
        proposed_solution: String,
        data_needs: String,
        expected_impact: String,
        ethical_considerations: String,
        implementation_plan: String,
        image: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let submission = NewSubmission {
            team_name: row.team_name,
            fields: ProposalFields {
                problem_statement: row.problem_statement,
                target_audience: row.target_audience,
                proposed_solution: row.proposed_solution,
                data_needs: row.data_needs,
                expected_impact: row.expected_impact,
                ethical_considerations: row.ethical_considerations,
                implementation_plan: row.implementation_plan,
            },
            image: row.image.filter(|image| !image.trim().is_empty()),
        };
        submission
            .validate()
            .with_context(|| format!("row {} ({})", line + 1, submission.team_name))?;

        if insert_submission(pool, &submission).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn fetch_submissions(pool: &PgPool) -> Result<Vec<Submission>, StoreError> {
    let query = format!(
        "SELECT {SUBMISSION_COLUMNS} FROM workshop.submissions s ORDER BY s.created_at, s.team_name"
    );
    let rows = sqlx::query(&query).fetch_all(pool).await?;
    let submissions = rows
        .iter()
        .map(submission_from_row)
        .collect::<Result<_, _>>()?;
    Ok(submissions)
}

/// Replaces any earlier evaluation of the submission, rank included.
pub async fn upsert_evaluation(
    pool: &PgPool,
    submission_id: Uuid,
    result: &EvaluationResult,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO workshop.evaluations
        (submission_id, score, feedback, strengths, weaknesses, suggestions, rank, evaluated_at)
        VALUES ($1, $2, $3, $4, $5, $6, NULL, now())
        ON CONFLICT (submission_id) DO UPDATE
        SET score = EXCLUDED.score,
            feedback = EXCLUDED.feedback,
            strengths = EXCLUDED.strengths,
            weaknesses = EXCLUDED.weaknesses,
            suggestions = EXCLUDED.suggestions,
            rank = NULL,
            evaluated_at = EXCLUDED.evaluated_at
        "#,
    )
    .bind(submission_id)
    .bind(result.score)
    .bind(&result.feedback)
    .bind(&result.strengths)
    .bind(&result.weaknesses)
    .bind(&result.suggestions)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn clear_ranks(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::query("UPDATE workshop.evaluations SET rank = NULL WHERE rank IS NOT NULL")
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_rank(pool: &PgPool, submission_id: Uuid, rank: u32) -> Result<(), StoreError> {
    let rank = i32::try_from(rank).map_err(|e| sqlx::Error::Encode(e.into()))?;
    let result = sqlx::query("UPDATE workshop.evaluations SET rank = $2 WHERE submission_id = $1")
        .bind(submission_id)
        .bind(rank)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(submission_id));
    }
    Ok(())
}

/// Ranked entries from the last scoring run, best first.
pub async fn fetch_ranked(pool: &PgPool, limit: Option<i64>) -> Result<Vec<RankedEntry>, StoreError> {
    let query = format!(
        "SELECT {SUBMISSION_COLUMNS}, e.score, e.feedback, e.strengths, e.weaknesses, \
         e.suggestions, e.rank \
         FROM workshop.submissions s \
         JOIN workshop.evaluations e ON e.submission_id = s.id \
         WHERE e.rank IS NOT NULL \
         ORDER BY e.rank \
         LIMIT $1"
    );
    let rows = sqlx::query(&query).bind(limit).fetch_all(pool).await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in &rows {
        let rank: i32 = row.try_get("rank")?;
        let rank = u32::try_from(rank).map_err(|e| sqlx::Error::Decode(e.into()))?;
        entries.push(RankedEntry {
            rank,
            submission: submission_from_row(row)?,
            result: EvaluationResult {
                score: row.try_get("score")?,
                feedback: row.try_get("feedback")?,
                strengths: row.try_get("strengths")?,
                weaknesses: row.try_get("weaknesses")?,
                suggestions: row.try_get("suggestions")?,
            },
        });
    }
    Ok(entries)
}

/// Submissions with no ranked evaluation.
pub async fn fetch_unranked(pool: &PgPool) -> Result<Vec<Submission>, StoreError> {
    let query = format!(
        "SELECT {SUBMISSION_COLUMNS} FROM workshop.submissions s \
         LEFT JOIN workshop.evaluations e ON e.submission_id = s.id \
         WHERE e.rank IS NULL \
         ORDER BY s.created_at, s.team_name"
    );
    let rows = sqlx::query(&query).fetch_all(pool).await?;
    let submissions = rows
        .iter()
        .map(submission_from_row)
        .collect::<Result<_, _>>()?;
    Ok(submissions)
}

fn submission_from_row(row: &PgRow) -> Result<Submission, sqlx::Error> {
    Ok(Submission {
        id: row.try_get("id")?,
        team_name: row.try_get("team_name")?,
        fields: ProposalFields {
            problem_statement: row.try_get("problem_statement")?,
            target_audience: row.try_get("target_audience")?,
            proposed_solution: row.try_get("proposed_solution")?,
            data_needs: row.try_get("data_needs")?,
            expected_impact: row.try_get("expected_impact")?,
            ethical_considerations: row.try_get("ethical_considerations")?,
            implementation_plan: row.try_get("implementation_plan")?,
        },
        image_ref: row.try_get("image_ref")?,
        created_at: row.try_get("created_at")?,
    })
}

// These run against a throwaway database created per test by `sqlx::test`.
#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(team: &str) -> NewSubmission {
        NewSubmission {
            team_name: team.to_string(),
            fields: ProposalFields {
                problem_statement: format!("{team} problem"),
                target_audience: "attendees".to_string(),
                proposed_solution: "an assistant".to_string(),
                data_needs: "logs".to_string(),
                expected_impact: "less toil".to_string(),
                ethical_considerations: "consent".to_string(),
                implementation_plan: "pilot".to_string(),
            },
            image: None,
        }
    }

    fn evaluation(score: f64) -> EvaluationResult {
        EvaluationResult {
            score,
            feedback: format!("scored {score}"),
            strengths: vec!["clear".to_string()],
            weaknesses: Vec::new(),
            suggestions: vec!["measure".to_string(), "iterate".to_string()],
        }
    }

    fn id_of(submissions: &[Submission], team: &str) -> Uuid {
        submissions
            .iter()
            .find(|s| s.team_name == team)
            .map(|s| s.id)
            .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a disposable Postgres"]
    async fn evaluation_round_trips_with_rank(pool: PgPool) {
        assert!(insert_submission(&pool, &proposal("Alpha")).await.unwrap());
        assert!(insert_submission(&pool, &proposal("Beta")).await.unwrap());
        assert!(!insert_submission(&pool, &proposal("Alpha")).await.unwrap());

        let submissions = fetch_submissions(&pool).await.unwrap();
        assert_eq!(submissions.len(), 2);
        let alpha = id_of(&submissions, "Alpha");
        let beta = id_of(&submissions, "Beta");

        upsert_evaluation(&pool, alpha, &evaluation(61.5)).await.unwrap();
        upsert_evaluation(&pool, beta, &evaluation(88.0)).await.unwrap();
        update_rank(&pool, beta, 1).await.unwrap();
        update_rank(&pool, alpha, 2).await.unwrap();

        let ranked = fetch_ranked(&pool, None).await.unwrap();
        let order: Vec<(u32, &str)> = ranked
            .iter()
            .map(|e| (e.rank, e.submission.team_name.as_str()))
            .collect();
        assert_eq!(order, vec![(1, "Beta"), (2, "Alpha")]);
        assert_eq!(ranked[1].result, evaluation(61.5));
        assert_eq!(ranked[1].submission.fields.problem_statement, "Alpha problem");

        let top = fetch_ranked(&pool, Some(1)).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].submission.team_name, "Beta");
        assert!(fetch_unranked(&pool).await.unwrap().is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a disposable Postgres"]
    async fn rescoring_and_clearing_drop_ranks(pool: PgPool) {
        insert_submission(&pool, &proposal("Alpha")).await.unwrap();
        insert_submission(&pool, &proposal("Beta")).await.unwrap();
        let submissions = fetch_submissions(&pool).await.unwrap();
        let alpha = id_of(&submissions, "Alpha");
        let beta = id_of(&submissions, "Beta");

        upsert_evaluation(&pool, alpha, &evaluation(40.0)).await.unwrap();
        upsert_evaluation(&pool, beta, &evaluation(50.0)).await.unwrap();
        update_rank(&pool, beta, 1).await.unwrap();
        update_rank(&pool, alpha, 2).await.unwrap();

        upsert_evaluation(&pool, alpha, &evaluation(95.0)).await.unwrap();
        let ranked = fetch_ranked(&pool, None).await.unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].submission.team_name, "Beta");
        let unranked = fetch_unranked(&pool).await.unwrap();
        assert_eq!(unranked.len(), 1);
        assert_eq!(unranked[0].team_name, "Alpha");

        clear_ranks(&pool).await.unwrap();
        assert!(fetch_ranked(&pool, None).await.unwrap().is_empty());
        assert_eq!(fetch_unranked(&pool).await.unwrap().len(), 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a disposable Postgres"]
    async fn ranking_an_unscored_submission_is_not_found(pool: PgPool) {
        insert_submission(&pool, &proposal("Alpha")).await.unwrap();
        let submissions = fetch_submissions(&pool).await.unwrap();
        let alpha = id_of(&submissions, "Alpha");

        let err = update_rank(&pool, alpha, 1).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == alpha));
    }
}
