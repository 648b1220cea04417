//! Batch scoring: score every stored submission, rank the results and
//! narrate the leaders.
//!
//! Each submission is scored in its own task. A failure in one task never
//! cancels the others; what happens to the batch afterwards is decided by
//! [`FailurePolicy`]. Ranks from any earlier run are cleared before scoring
//! starts, so a failed run leaves nothing ranked.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::{ItemError, LlmError, PipelineError};
use crate::llm::LlmClient;
use crate::models::{Evaluated, RankedEntry, Submission};
use crate::narrative;
use crate::parse::parse_evaluation;
use crate::prompts::{self, CallProfile};
use crate::rank;
use crate::store::SubmissionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Any failed submission fails the batch and nothing is ranked.
    Abort,
    /// Failed submissions are left out and the rest are ranked.
    Skip,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub concurrency: usize,
    pub call_timeout: Duration,
    pub policy: FailurePolicy,
    pub top_n: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            call_timeout: Duration::from_secs(60),
            policy: FailurePolicy::Abort,
            top_n: narrative::DEFAULT_TOP_N,
        }
    }
}

#[derive(Debug)]
pub struct RankedBatch {
    pub entries: Vec<RankedEntry>,
    /// Team name and reason for every submission left out of the ranking.
    pub skipped: Vec<(String, ItemError)>,
    pub narrative: String,
    top_n: usize,
}

impl RankedBatch {
    pub fn top(&self) -> &[RankedEntry] {
        rank::top(&self.entries, self.top_n)
    }
}

pub struct ScoringPipeline {
    store: Arc<dyn SubmissionStore>,
    client: Arc<dyn LlmClient>,
    options: PipelineOptions,
}

impl ScoringPipeline {
    pub fn new(
        store: Arc<dyn SubmissionStore>,
        client: Arc<dyn LlmClient>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            client,
            options,
        }
    }

    pub async fn run(&self) -> Result<RankedBatch, PipelineError> {
        let started = Instant::now();
        let submissions = self.store.fetch_all().await?;
        if submissions.is_empty() {
            return Err(PipelineError::NoSubmissions);
        }
        let total = submissions.len();
        // Ranks from an earlier run must not outlive this one, even if it aborts.
        self.store.clear_ranks().await?;

        let mut evaluated = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (team, outcome) in self.score_all(submissions).await {
            match outcome {
                Ok(item) => evaluated.push(item),
                Err(err) => failures.push((team, err)),
            }
        }

        if !failures.is_empty() {
            for (team, err) in &failures {
                warn!(team = %team, error = %err, "submission failed to score");
            }
            if self.options.policy == FailurePolicy::Abort {
                return Err(PipelineError::Aborted { total, failures });
            }
        }
        if evaluated.is_empty() {
            return Err(PipelineError::NothingRanked);
        }

        let entries = rank::rank(evaluated);
        for entry in &entries {
            self.store.update_rank(entry.submission.id, entry.rank).await?;
        }

        let narrative = narrative::narrate(
            self.client.as_ref(),
            rank::top(&entries, self.options.top_n),
        )
        .await?;

        info!(
            scored = entries.len(),
            skipped = failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scoring run complete"
        );

        Ok(RankedBatch {
            entries,
            skipped: failures,
            narrative,
            top_n: self.options.top_n,
        })
    }

    /// Outcomes come back in input order regardless of completion order.
    async fn score_all(
        &self,
        submissions: Vec<Submission>,
    ) -> Vec<(String, Result<Evaluated, ItemError>)> {
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut join_set = JoinSet::new();
        let teams: Vec<String> = submissions.iter().map(|s| s.team_name.clone()).collect();

        for (index, submission) in submissions.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let store = Arc::clone(&self.store);
            let client = Arc::clone(&self.client);
            let call_timeout = self.options.call_timeout;
            join_set.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        score_one(store.as_ref(), client.as_ref(), submission, call_timeout).await
                    }
                    Err(err) => Err(ItemError::Join(err.to_string())),
                };
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<Result<Evaluated, ItemError>>> =
            teams.iter().map(|_| None).collect();
        let mut join_error = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(err) => join_error = Some(err.to_string()),
            }
        }

        teams
            .into_iter()
            .zip(outcomes)
            .map(|(team, outcome)| {
                let outcome = outcome.unwrap_or_else(|| {
                    Err(ItemError::Join(
                        join_error
                            .clone()
                            .unwrap_or_else(|| "task did not complete".to_string()),
                    ))
                });
                (team, outcome)
            })
            .collect()
    }
}

async fn score_one(
    store: &dyn SubmissionStore,
    client: &dyn LlmClient,
    submission: Submission,
    call_timeout: Duration,
) -> Result<Evaluated, ItemError> {
    submission.fields.validate()?;

    let request = CallProfile::Scoring.request(prompts::scoring_prompt(&submission.fields));
    let raw = tokio::time::timeout(call_timeout, client.complete(request))
        .await
        .map_err(|_| LlmError::Timeout(call_timeout.as_secs()))??;

    let result = parse_evaluation(&raw)?;
    store.update_result(submission.id, &result).await?;
    info!(team = %submission.team_name, score = result.score, "scored submission");

    Ok(Evaluated { submission, result })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ParseFailure, StoreError};
    use crate::llm::CompletionRequest;
    use crate::models::{EvaluationResult, ProposalFields};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<StoredRow>>,
        fail_writes_for: Option<Uuid>,
    }

    #[derive(Clone)]
    struct StoredRow {
        submission: Submission,
        result: Option<EvaluationResult>,
        rank: Option<u32>,
    }

    impl MemoryStore {
        fn with(submissions: Vec<Submission>) -> Self {
            let rows = submissions
                .into_iter()
                .map(|submission| StoredRow {
                    submission,
                    result: None,
                    rank: None,
                })
                .collect();
            Self {
                rows: Mutex::new(rows),
                fail_writes_for: None,
            }
        }

        fn row(&self, team: &str) -> StoredRow {
            self.rows
                .lock()
                .unwrap()
                .iter()
                .find(|row| row.submission.team_name == team)
                .cloned()
                .unwrap()
        }
    }

    #[async_trait]
    impl SubmissionStore for MemoryStore {
        async fn fetch_all(&self) -> Result<Vec<Submission>, StoreError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .map(|row| row.submission.clone())
                .collect())
        }

        async fn update_result(
            &self,
            id: Uuid,
            result: &EvaluationResult,
        ) -> Result<(), StoreError> {
            if self.fail_writes_for == Some(id) {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .iter_mut()
                .find(|row| row.submission.id == id)
                .ok_or(StoreError::NotFound(id))?;
            row.result = Some(result.clone());
            row.rank = None;
            Ok(())
        }

        async fn clear_ranks(&self) -> Result<(), StoreError> {
            for row in self.rows.lock().unwrap().iter_mut() {
                row.rank = None;
            }
            Ok(())
        }

        async fn update_rank(&self, id: Uuid, rank: u32) -> Result<(), StoreError> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .iter_mut()
                .find(|row| row.submission.id == id)
                .ok_or(StoreError::NotFound(id))?;
            row.rank = Some(rank);
            Ok(())
        }
    }

    /// Answers scoring prompts by team and narrative prompts with a fixed line.
    #[derive(Default)]
    struct ScriptedClient {
        replies: HashMap<String, String>,
        delays: HashMap<String, Duration>,
        narrative_prompts: Mutex<Vec<String>>,
        scoring_calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedClient {
        fn scores(scores: &[(&str, f64)]) -> Self {
            let replies = scores
                .iter()
                .map(|(team, score)| {
                    (
                        team.to_string(),
                        format!(
                            r#"{{"score": {score}, "feedback": "{team} was fine", "strengths": ["effort"]}}"#
                        ),
                    )
                })
                .collect();
            Self {
                replies,
                ..Self::default()
            }
        }

        fn reply(mut self, team: &str, raw: &str) -> Self {
            self.replies.insert(team.to_string(), raw.to_string());
            self
        }

        fn delay(mut self, team: &str, delay: Duration) -> Self {
            self.delays.insert(team.to_string(), delay);
            self
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
            if request.system.is_none() {
                self.narrative_prompts.lock().unwrap().push(request.user);
                return Ok("What a night for the winners!".to_string());
            }

            self.scoring_calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let team = self
                .replies
                .keys()
                .find(|team| request.user.contains(&problem_of(team)))
                .cloned()
                .unwrap_or_default();
            let delay = self
                .delays
                .get(&team)
                .copied()
                .unwrap_or(Duration::from_millis(5));
            tokio::time::sleep(delay).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(self.replies.get(&team).cloned().unwrap_or_default())
        }
    }

    fn problem_of(team: &str) -> String {
        format!("problem of {team}")
    }

    fn submission(team: &str) -> Submission {
        Submission {
            id: Uuid::new_v4(),
            team_name: team.to_string(),
            fields: ProposalFields {
                problem_statement: problem_of(team),
                target_audience: "attendees".to_string(),
                proposed_solution: "an assistant".to_string(),
                data_needs: "logs".to_string(),
                expected_impact: "less toil".to_string(),
                ethical_considerations: "consent".to_string(),
                implementation_plan: "pilot".to_string(),
            },
            image_ref: None,
            created_at: Utc::now(),
        }
    }

    fn pipeline(store: Arc<MemoryStore>, client: Arc<ScriptedClient>, policy: FailurePolicy) -> ScoringPipeline {
        ScoringPipeline::new(
            store,
            client,
            PipelineOptions {
                concurrency: 4,
                call_timeout: Duration::from_secs(5),
                policy,
                top_n: 3,
            },
        )
    }

    fn four_teams() -> Vec<Submission> {
        ["Ninety", "SeventyA", "SeventyB", "Forty"]
            .into_iter()
            .map(submission)
            .collect()
    }

    fn four_scores() -> ScriptedClient {
        ScriptedClient::scores(&[
            ("Ninety", 90.0),
            ("SeventyA", 70.0),
            ("SeventyB", 70.0),
            ("Forty", 40.0),
        ])
    }

    #[tokio::test]
    async fn ranks_persists_and_narrates_a_full_batch() {
        let store = Arc::new(MemoryStore::with(four_teams()));
        // Finish in reverse order to show ranking ignores completion order.
        let client = Arc::new(
            four_scores()
                .delay("Ninety", Duration::from_millis(40))
                .delay("SeventyA", Duration::from_millis(30)),
        );

        let batch = pipeline(store.clone(), client.clone(), FailurePolicy::Abort)
            .run()
            .await
            .unwrap();

        let order: Vec<(u32, &str)> = batch
            .entries
            .iter()
            .map(|e| (e.rank, e.submission.team_name.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![(1, "Ninety"), (2, "SeventyA"), (3, "SeventyB"), (4, "Forty")]
        );
        assert!(batch.skipped.is_empty());
        assert_eq!(batch.top().len(), 3);
        assert_eq!(batch.narrative, "What a night for the winners!");

        let stored = store.row("SeventyB");
        let result = stored.result.unwrap();
        assert_eq!(result.score, 70.0);
        assert_eq!(result.feedback, "SeventyB was fine");
        assert_eq!(stored.rank, Some(3));

        let prompts = client.narrative_prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Ninety"));
        assert!(!prompts[0].contains("Forty"));
    }

    #[tokio::test]
    async fn abort_policy_fails_batch_and_writes_no_ranks() {
        let store = Arc::new(MemoryStore::with(four_teams()));
        let client = Arc::new(four_scores().reply("SeventyB", "I cannot comply."));

        let err = pipeline(store.clone(), client.clone(), FailurePolicy::Abort)
            .run()
            .await
            .unwrap_err();

        match err {
            PipelineError::Aborted { total, failures } => {
                assert_eq!(total, 4);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].0, "SeventyB");
                assert!(matches!(failures[0].1, ItemError::Parse(ParseFailure::NoJson)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The other three were still scored.
        assert_eq!(client.scoring_calls.load(Ordering::SeqCst), 4);
        assert!(store.row("Ninety").result.is_some());
        assert_eq!(store.row("Ninety").rank, None);
        assert!(client.narrative_prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn aborted_rerun_clears_earlier_ranks() {
        let store = Arc::new(MemoryStore::with(vec![
            submission("A"),
            submission("B"),
            submission("C"),
        ]));
        let first = Arc::new(ScriptedClient::scores(&[("A", 10.0), ("B", 50.0), ("C", 90.0)]));
        pipeline(store.clone(), first, FailurePolicy::Abort)
            .run()
            .await
            .unwrap();
        assert_eq!(store.row("A").rank, Some(3));

        let second = Arc::new(
            ScriptedClient::scores(&[("A", 10.0), ("B", 50.0), ("C", 90.0)])
                .reply("A", "I cannot comply."),
        );
        let err = pipeline(store.clone(), second, FailurePolicy::Abort)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Aborted { .. }));

        for team in ["A", "B", "C"] {
            assert_eq!(store.row(team).rank, None, "{team} kept a stale rank");
        }
        // The failed team keeps its last result, but unranked.
        assert_eq!(store.row("A").result.unwrap().score, 10.0);
    }

    #[tokio::test]
    async fn skip_policy_ranks_the_rest() {
        let store = Arc::new(MemoryStore::with(four_teams()));
        let client = Arc::new(four_scores().reply("Ninety", r#"{"feedback": "no score"}"#));

        let batch = pipeline(store.clone(), client, FailurePolicy::Skip)
            .run()
            .await
            .unwrap();

        let ranks: Vec<(u32, &str)> = batch
            .entries
            .iter()
            .map(|e| (e.rank, e.submission.team_name.as_str()))
            .collect();
        assert_eq!(ranks, vec![(1, "SeventyA"), (2, "SeventyB"), (3, "Forty")]);
        assert_eq!(batch.skipped.len(), 1);
        assert_eq!(batch.skipped[0].0, "Ninety");
        assert!(store.row("Ninety").result.is_none());
    }

    #[tokio::test]
    async fn skip_policy_with_no_survivors_is_an_error() {
        let store = Arc::new(MemoryStore::with(vec![submission("Only")]));
        let client = Arc::new(ScriptedClient::default().reply("Only", "nope"));

        let err = pipeline(store, client, FailurePolicy::Skip)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NothingRanked));
    }

    #[tokio::test]
    async fn empty_store_reports_no_submissions() {
        let store = Arc::new(MemoryStore::default());
        let client = Arc::new(ScriptedClient::default());
        let err = pipeline(store, client, FailurePolicy::Abort)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoSubmissions));
    }

    #[tokio::test]
    async fn slow_call_times_out_as_item_failure() {
        let store = Arc::new(MemoryStore::with(vec![submission("Fast"), submission("Slow")]));
        let client = Arc::new(
            ScriptedClient::scores(&[("Fast", 55.0), ("Slow", 99.0)])
                .delay("Slow", Duration::from_secs(2)),
        );
        let pipeline = ScoringPipeline::new(
            store,
            client,
            PipelineOptions {
                call_timeout: Duration::from_millis(100),
                policy: FailurePolicy::Skip,
                ..PipelineOptions::default()
            },
        );

        let batch = pipeline.run().await.unwrap();
        assert_eq!(batch.entries.len(), 1);
        assert_eq!(batch.entries[0].submission.team_name, "Fast");
        assert!(matches!(
            batch.skipped[0].1,
            ItemError::Llm(LlmError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn concurrency_cap_bounds_in_flight_calls() {
        let teams: Vec<String> = (0..6).map(|i| format!("Team{i}")).collect();
        let store = Arc::new(MemoryStore::with(
            teams.iter().map(|t| submission(t)).collect(),
        ));
        let scores: Vec<(&str, f64)> = teams.iter().map(|t| (t.as_str(), 50.0)).collect();
        let mut client = ScriptedClient::scores(&scores);
        for team in &teams {
            client = client.delay(team, Duration::from_millis(20));
        }
        let client = Arc::new(client);

        let pipeline = ScoringPipeline::new(
            store,
            client.clone(),
            PipelineOptions {
                concurrency: 2,
                ..PipelineOptions::default()
            },
        );
        let batch = pipeline.run().await.unwrap();

        assert_eq!(batch.entries.len(), 6);
        assert!(client.max_in_flight.load(Ordering::SeqCst) <= 2);
        // Equal scores: ranking follows store order.
        let order: Vec<&str> = batch
            .entries
            .iter()
            .map(|e| e.submission.team_name.as_str())
            .collect();
        assert_eq!(order, teams.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn invalid_submission_never_reaches_the_model() {
        let mut broken = submission("Broken");
        broken.fields.ethical_considerations = "  ".to_string();
        let store = Arc::new(MemoryStore::with(vec![broken, submission("Fine")]));
        let client = Arc::new(ScriptedClient::scores(&[("Broken", 10.0), ("Fine", 20.0)]));

        let batch = pipeline(store, client.clone(), FailurePolicy::Skip)
            .run()
            .await
            .unwrap();

        assert_eq!(client.scoring_calls.load(Ordering::SeqCst), 1);
        assert!(matches!(batch.skipped[0].1, ItemError::Invalid(_)));
    }

    #[tokio::test]
    async fn persistence_failure_is_an_item_failure() {
        let failing = submission("Unlucky");
        let mut store = MemoryStore::with(vec![failing.clone(), submission("Lucky")]);
        store.fail_writes_for = Some(failing.id);
        let client = Arc::new(ScriptedClient::scores(&[("Unlucky", 80.0), ("Lucky", 60.0)]));

        let err = pipeline(Arc::new(store), client, FailurePolicy::Abort)
            .run()
            .await
            .unwrap_err();
        match err {
            PipelineError::Aborted { failures, .. } => {
                assert!(matches!(failures[0].1, ItemError::Store(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rerun_overwrites_previous_results() {
        let store = Arc::new(MemoryStore::with(vec![submission("A"), submission("B")]));

        let first = Arc::new(ScriptedClient::scores(&[("A", 90.0), ("B", 10.0)]));
        pipeline(store.clone(), first, FailurePolicy::Abort)
            .run()
            .await
            .unwrap();
        assert_eq!(store.row("A").rank, Some(1));

        let second = Arc::new(ScriptedClient::scores(&[("A", 20.0), ("B", 95.0)]));
        pipeline(store.clone(), second, FailurePolicy::Abort)
            .run()
            .await
            .unwrap();

        assert_eq!(store.row("A").rank, Some(2));
        assert_eq!(store.row("A").result.unwrap().score, 20.0);
        assert_eq!(store.row("B").rank, Some(1));
    }
}
