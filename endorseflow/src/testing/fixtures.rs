//! Test fixtures for pipeline testing.

use chrono::TimeZone;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::context::ActingIdentity;
use crate::core::{ConfiguredOutcome, Endorsement, NewEndorsement, NewStage, Stage};
use crate::errors::PipelineResult;
use crate::events::CollectingEventSink;
use crate::pipeline::EndorsementPipeline;
use crate::store::InMemoryPipelineStore;
use crate::utils::{ManualClock, Timestamp};

/// The stage set most tests run against, in position order.
#[derive(Debug, Clone)]
pub struct StandardStages {
    /// "Research", position 0.
    pub research: Stage,
    /// "Interview", position 1.
    pub interview: Stage,
    /// "Endorsed", terminal with outcome `endorsed`.
    pub endorsed: Stage,
    /// "Not Endorsed", terminal with outcome `not-endorsed`.
    pub not_endorsed: Stage,
    /// "No Endorsement", terminal with outcome `no-endorsement`.
    pub no_endorsement: Stage,
}

impl StandardStages {
    /// All stages in position order.
    #[must_use]
    pub fn all(&self) -> Vec<Stage> {
        vec![
            self.research.clone(),
            self.interview.clone(),
            self.endorsed.clone(),
            self.not_endorsed.clone(),
            self.no_endorsement.clone(),
        ]
    }
}

/// A pipeline wired to an in-memory store, a collecting sink and a manual
/// clock.
#[derive(Debug, Clone)]
pub struct PipelineFixture {
    /// The pipeline under test.
    pub pipeline: EndorsementPipeline,
    /// The backing store, for row counts.
    pub store: InMemoryPipelineStore,
    /// Every audit fact the pipeline emitted.
    pub sink: Arc<CollectingEventSink>,
    /// The pipeline's clock.
    pub clock: Arc<ManualClock>,
    actor: ActingIdentity,
}

impl Default for PipelineFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineFixture {
    /// Creates a fixture with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    /// Creates a fixture with the given configuration.
    #[must_use]
    pub fn with_config(config: PipelineConfig) -> Self {
        let store = InMemoryPipelineStore::new();
        let sink = Arc::new(CollectingEventSink::new());
        let clock = Arc::new(ManualClock::new(fixture_epoch()));
        let pipeline = EndorsementPipeline::new(Arc::new(store.clone()))
            .with_config(config)
            .with_event_sink(sink.clone())
            .with_clock(clock.clone());

        Self {
            pipeline,
            store,
            sink,
            clock,
            actor: ActingIdentity::new(Uuid::new_v4())
                .with_display_name("Test Reviewer")
                .with_request_id(Uuid::new_v4()),
        }
    }

    /// The identity every fixture operation acts as.
    #[must_use]
    pub fn actor(&self) -> ActingIdentity {
        self.actor.clone()
    }

    /// The clock's current reading.
    #[must_use]
    pub fn clock_now(&self) -> Timestamp {
        use crate::utils::Clock;
        self.clock.now()
    }

    /// Creates the [`StandardStages`].
    pub async fn seed_standard_stages(&self) -> PipelineResult<StandardStages> {
        let actor = self.actor();
        let create = |input: NewStage| {
            let pipeline = self.pipeline.clone();
            let actor = actor.clone();
            async move { pipeline.create_stage(input, &actor).await }
        };

        Ok(StandardStages {
            research: create(NewStage::new("Research")).await?,
            interview: create(NewStage::new("Interview")).await?,
            endorsed: create(NewStage::terminal("Endorsed", ConfiguredOutcome::Endorsed)).await?,
            not_endorsed: create(NewStage::terminal(
                "Not Endorsed",
                ConfiguredOutcome::NotEndorsed,
            ))
            .await?,
            no_endorsement: create(NewStage::terminal(
                "No Endorsement",
                ConfiguredOutcome::NoEndorsement,
            ))
            .await?,
        })
    }

    /// Creates an endorsement for a fresh candidate and race at `stage_id`.
    pub async fn create_at(&self, stage_id: Uuid) -> PipelineResult<Endorsement> {
        let created = self
            .pipeline
            .create_endorsement(
                NewEndorsement::new(Uuid::new_v4(), Uuid::new_v4(), stage_id),
                &self.actor,
            )
            .await?;
        Ok(created.endorsement)
    }
}

fn fixture_epoch() -> Timestamp {
    chrono::Utc
        .with_ymd_and_hms(2024, 3, 1, 9, 0, 0)
        .single()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seed_standard_stages_positions() {
        let fixture = PipelineFixture::new();
        let stages = fixture.seed_standard_stages().await.unwrap();

        let positions: Vec<_> = stages.all().iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3, 4]);
        assert!(stages.endorsed.is_terminal);
        assert!(!stages.interview.is_terminal);
        assert_eq!(fixture.pipeline.list_stages().await.unwrap(), stages.all());
    }

    #[test]
    fn test_fixture_clock_is_pinned() {
        let fixture = PipelineFixture::new();
        assert_eq!(fixture.clock_now(), fixture_epoch());
    }
}
