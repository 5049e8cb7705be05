//! Pipeline orchestrator
//!
//! An explicit state machine over the five stages. Each call to
//! [`Pipeline::advance`] performs one transition; a failing stage moves the
//! machine to [`PipelineState::Failed`] and nothing already written is rolled
//! back.

use super::affinity::{cluster_products, ClusteringSummary};
use super::communities::{detect_section_communities, CommunitySummary};
use super::layout::{optimize_layout, LayoutSummary};
use super::transitions::{build_transition_graph, TransitionSummary};
use super::{PipelineError, Stage, StageError};
use crate::config::{ConfigError, PipelineConfig};
use crate::model::RunRecord;
use crate::persistence::{LayoutStorage, StoreSummary};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    Aggregating,
    DetectingCommunities,
    Clustering,
    Optimizing,
    Persisted,
    Failed { stage: Stage, message: String },
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Persisted | PipelineState::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub elapsed: Duration,
}

/// Everything a successful run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run: RunRecord,
    pub timings: Vec<StageTiming>,
    pub transitions: TransitionSummary,
    pub communities: CommunitySummary,
    pub clusters: ClusteringSummary,
    pub layout: LayoutSummary,
    pub store: StoreSummary,
}

impl PipelineReport {
    pub fn total_elapsed(&self) -> Duration {
        self.timings.iter().map(|t| t.elapsed).sum()
    }
}

#[derive(Default)]
struct StageOutputs {
    transitions: Option<TransitionSummary>,
    communities: Option<CommunitySummary>,
    clusters: Option<ClusteringSummary>,
    layout: Option<LayoutSummary>,
    run: Option<RunRecord>,
    store: Option<StoreSummary>,
}

pub struct Pipeline<'a> {
    storage: &'a LayoutStorage,
    config: PipelineConfig,
    state: PipelineState,
    timings: Vec<StageTiming>,
    outputs: StageOutputs,
}

impl<'a> Pipeline<'a> {
    /// Validate `config` and start in [`PipelineState::Idle`]
    pub fn new(storage: &'a LayoutStorage, config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            storage,
            config,
            state: PipelineState::Idle,
            timings: Vec::new(),
            outputs: StageOutputs::default(),
        })
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn timings(&self) -> &[StageTiming] {
        &self.timings
    }

    /// Perform one transition. Returns `Ok(false)` once the machine is terminal.
    pub fn advance(&mut self) -> Result<bool, PipelineError> {
        let next = match self.state {
            PipelineState::Idle => {
                info!("Starting layout pipeline (seed {})", self.config.seed);
                Ok(PipelineState::Aggregating)
            }
            PipelineState::Aggregating => self.aggregate(),
            PipelineState::DetectingCommunities => self.detect_communities(),
            PipelineState::Clustering => self.cluster(),
            PipelineState::Optimizing => self.optimize().and_then(|_| self.record_run()),
            PipelineState::Persisted | PipelineState::Failed { .. } => return Ok(false),
        };

        match next {
            Ok(state) => {
                self.state = state;
                Ok(!self.state.is_terminal())
            }
            Err(err) => {
                error!("Pipeline failed at stage {}: {}", err.stage, err.source);
                self.state = PipelineState::Failed {
                    stage: err.stage,
                    message: err.source.to_string(),
                };
                Err(err)
            }
        }
    }

    /// Drive the machine to completion
    pub fn run(mut self) -> Result<PipelineReport, PipelineError> {
        while self.advance()? {}
        self.into_report()
    }

    fn timed<T>(
        &mut self,
        stage: Stage,
        work: impl FnOnce(&LayoutStorage, &PipelineConfig) -> Result<T, StageError>,
    ) -> Result<T, PipelineError> {
        info!("Stage {}: starting", stage);
        let started = Instant::now();
        let result = work(self.storage, &self.config);
        let elapsed = started.elapsed();

        match result {
            Ok(value) => {
                info!("Stage {} completed in {:.2}s", stage, elapsed.as_secs_f64());
                self.timings.push(StageTiming { stage, elapsed });
                Ok(value)
            }
            Err(source) => Err(PipelineError { stage, source }),
        }
    }

    fn aggregate(&mut self) -> Result<PipelineState, PipelineError> {
        let summary = self.timed(Stage::Aggregate, |storage, _| build_transition_graph(storage))?;
        self.outputs.transitions = Some(summary);
        Ok(PipelineState::DetectingCommunities)
    }

    fn detect_communities(&mut self) -> Result<PipelineState, PipelineError> {
        let summary = self.timed(Stage::DetectCommunities, |storage, config| {
            detect_section_communities(storage, &config.communities, config.seed)
        })?;
        self.outputs.communities = Some(summary);
        Ok(PipelineState::Clustering)
    }

    fn cluster(&mut self) -> Result<PipelineState, PipelineError> {
        let summary = self.timed(Stage::ClusterProducts, |storage, config| {
            cluster_products(storage, &config.clustering, config.seed)
        })?;
        self.outputs.clusters = Some(summary);
        Ok(PipelineState::Optimizing)
    }

    fn optimize(&mut self) -> Result<(), PipelineError> {
        let summary = self.timed(Stage::OptimizeLayout, |storage, config| {
            optimize_layout(storage, &config.layout)
        })?;
        self.outputs.layout = Some(summary);
        Ok(())
    }

    fn record_run(&mut self) -> Result<PipelineState, PipelineError> {
        let (run, store) = self.timed(Stage::RecordRun, |storage, _| {
            let now = Utc::now();
            let run = storage.append_run(
                now.timestamp_millis(),
                format!("Full pipeline run at {}", now.to_rfc3339()),
            )?;
            let store = storage.summary()?;
            Ok((run, store))
        })?;

        info!("Run {} recorded", run.run_id);
        info!(
            "  sections: {}, products: {}, movements: {}",
            store.sections, store.products, store.movements
        );
        info!(
            "  edges: {}, communities: {}, clusters: {}, recommendations: {}",
            store.edges, store.communities, store.clusters, store.recommendations
        );

        self.outputs.run = Some(run);
        self.outputs.store = Some(store);
        Ok(PipelineState::Persisted)
    }

    fn into_report(self) -> Result<PipelineReport, PipelineError> {
        let incomplete = |stage: Stage| PipelineError {
            stage,
            source: StageError::DegenerateInput("stage did not produce output".to_string()),
        };
        let outputs = self.outputs;

        Ok(PipelineReport {
            transitions: outputs.transitions.ok_or_else(|| incomplete(Stage::Aggregate))?,
            communities: outputs
                .communities
                .ok_or_else(|| incomplete(Stage::DetectCommunities))?,
            clusters: outputs.clusters.ok_or_else(|| incomplete(Stage::ClusterProducts))?,
            layout: outputs.layout.ok_or_else(|| incomplete(Stage::OptimizeLayout))?,
            run: outputs.run.ok_or_else(|| incomplete(Stage::RecordRun))?,
            store: outputs.store.ok_or_else(|| incomplete(Stage::RecordRun))?,
            timings: self.timings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MovementEvent, Product, Section};
    use tempfile::TempDir;

    fn seed_store(storage: &LayoutStorage) {
        storage
            .put_sections(&[
                Section::new("A", "Entrance", 0, 0),
                Section::new("B", "Produce", 1, 0),
                Section::new("C", "Bakery", 2, 0),
            ])
            .unwrap();
        storage
            .put_products(&[
                Product::new(1, "Apples", "Produce", Some("B".into())),
                Product::new(2, "Bread", "Bakery", Some("C".into())),
            ])
            .unwrap();
        let mut events = Vec::new();
        for (session, path) in [("s1", ["A", "B", "C"]), ("s2", ["A", "C", "B"])] {
            for (step, section) in path.iter().enumerate() {
                events.push(MovementEvent::new(session, step as u32, *section, 0));
            }
        }
        storage.put_movements(&events).unwrap();
    }

    #[test]
    fn test_state_walk() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LayoutStorage::open(temp_dir.path()).unwrap();
        seed_store(&storage);

        let mut pipeline = Pipeline::new(&storage, PipelineConfig::default()).unwrap();
        let mut seen = vec![pipeline.state().clone()];
        while pipeline.advance().unwrap() {
            seen.push(pipeline.state().clone());
        }
        seen.push(pipeline.state().clone());

        assert_eq!(
            seen,
            vec![
                PipelineState::Idle,
                PipelineState::Aggregating,
                PipelineState::DetectingCommunities,
                PipelineState::Clustering,
                PipelineState::Optimizing,
                PipelineState::Persisted,
            ]
        );
        assert_eq!(pipeline.timings().len(), 5);
        assert!(!pipeline.advance().unwrap());
    }

    #[test]
    fn test_empty_store_fails_at_stage_one() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LayoutStorage::open(temp_dir.path()).unwrap();

        let mut pipeline = Pipeline::new(&storage, PipelineConfig::default()).unwrap();
        pipeline.advance().unwrap();
        let err = pipeline.advance().unwrap_err();

        assert_eq!(err.stage, Stage::Aggregate);
        assert!(matches!(
            pipeline.state(),
            PipelineState::Failed { stage: Stage::Aggregate, .. }
        ));
        assert!(!pipeline.advance().unwrap());
        assert!(storage.latest_run().unwrap().is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LayoutStorage::open(temp_dir.path()).unwrap();

        let mut config = PipelineConfig::default();
        config.clustering.n_init = 0;
        assert!(Pipeline::new(&storage, config).is_err());
    }

    #[test]
    fn test_run_reports() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LayoutStorage::open(temp_dir.path()).unwrap();
        seed_store(&storage);

        let report = Pipeline::new(&storage, PipelineConfig::default())
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(report.run.run_id, 1);
        assert!(report.run.notes.starts_with("Full pipeline run at "));
        assert_eq!(report.store.runs, 1);
        assert_eq!(report.layout.recommendations.len(), 2);
        assert_eq!(report.timings.len(), 5);
    }
}
