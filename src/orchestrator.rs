use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::draft::DraftGenerator;
use crate::humanize::Humanizer;
use crate::media::MediaGenerator;
use crate::research::{ResearchAdapter, ResearchRequest};
use crate::seo::SeoOptimizer;
use crate::store::ContentStore;
use crate::types::{
    EngineError, Pipeline, PipelineStage, PipelineStatus, Result, SectionKind,
};

/// The pipeline stage state machine. Owns persisted pipeline state,
/// validates stage preconditions before contacting any external service,
/// invokes the stage adapters, and records completion or failure in the
/// activity log.
///
/// Single-threaded cooperative per pipeline: only one stage advance may be
/// in flight per pipeline at a time; concurrent attempts are rejected with
/// `StageConflict`.
pub struct PipelineOrchestrator {
    store: Arc<dyn ContentStore>,
    research: ResearchAdapter,
    draft: DraftGenerator,
    humanizer: Humanizer,
    seo: SeoOptimizer,
    media: MediaGenerator,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

/// RAII marker for an in-flight stage advance on one pipeline.
struct AdvanceGuard {
    id: Uuid,
    set: Arc<Mutex<HashSet<Uuid>>>,
}

impl Drop for AdvanceGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.id);
        }
    }
}

impl PipelineOrchestrator {
    pub fn new(
        store: Arc<dyn ContentStore>,
        research: ResearchAdapter,
        draft: DraftGenerator,
        humanizer: Humanizer,
        seo: SeoOptimizer,
        media: MediaGenerator,
    ) -> Self {
        Self {
            store,
            research,
            draft,
            humanizer,
            seo,
            media,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub async fn create(&self, topic: impl Into<String>, silo_key: Option<String>) -> Result<Pipeline> {
        let mut pipeline = Pipeline::new(topic.into(), silo_key);
        pipeline.log_activity(PipelineStage::Idea, "pipeline created");
        self.store.insert_pipeline(&pipeline).await?;
        info!("created pipeline {} for topic '{}'", pipeline.id, pipeline.topic);
        Ok(pipeline)
    }

    pub async fn get(&self, id: Uuid) -> Result<Pipeline> {
        self.store.get_pipeline(id).await
    }

    /// Research stage: fan out to search + knowledge base, accept whatever
    /// succeeded. Branch failures degrade, they never fail the stage.
    pub async fn run_research(&self, id: Uuid, request: Option<ResearchRequest>) -> Result<Pipeline> {
        let _guard = self.begin_advance(id)?;
        let pipeline = self.load_for_stage(id, PipelineStage::Research).await?;

        let request = request.unwrap_or_else(|| ResearchRequest::new(pipeline.topic.clone()));
        let synthesis = self.research.run(&request).await;
        let degraded = synthesis.degraded;

        let mut pipeline = self.reload_unless_cancelled(id, PipelineStage::Research).await?;
        pipeline.research = Some(synthesis);
        let message = if degraded {
            "research complete (degraded: one or more sources unavailable)"
        } else {
            "research complete"
        };
        self.commit(pipeline, PipelineStage::Research, message).await
    }

    /// Draft stage: one generation call producing the three-part body.
    pub async fn run_draft(&self, id: Uuid) -> Result<Pipeline> {
        let _guard = self.begin_advance(id)?;
        let pipeline = self.load_for_stage(id, PipelineStage::Draft).await?;
        let research = pipeline.research.clone().ok_or_else(|| {
            EngineError::validation(PipelineStage::Draft, "no research artifact present")
        })?;

        let sections = match self.draft.generate(&pipeline.topic, &research).await {
            Ok(sections) => sections,
            Err(e) => return self.record_failure(id, PipelineStage::Draft, e).await,
        };

        let mut pipeline = self.reload_unless_cancelled(id, PipelineStage::Draft).await?;
        pipeline.draft = Some(sections);
        self.commit(pipeline, PipelineStage::Draft, "draft generated").await
    }

    /// Humanize stage: rewrite the whole draft into the target voice.
    pub async fn run_humanize(&self, id: Uuid) -> Result<Pipeline> {
        let _guard = self.begin_advance(id)?;
        let pipeline = self.load_for_stage(id, PipelineStage::Humanize).await?;
        let draft = pipeline.draft.clone().ok_or_else(|| {
            EngineError::validation(PipelineStage::Humanize, "no draft artifact present")
        })?;

        let humanized = match self.humanizer.humanize(&pipeline.topic, &draft).await {
            Ok(humanized) => humanized,
            Err(e) => return self.record_failure(id, PipelineStage::Humanize, e).await,
        };

        let mut pipeline = self.reload_unless_cancelled(id, PipelineStage::Humanize).await?;
        let score = humanized.score;
        pipeline.humanized = Some(humanized.sections);
        pipeline.humanization_score = Some(score);
        self.commit(
            pipeline,
            PipelineStage::Humanize,
            format!("draft humanized (score {score:.1})"),
        )
        .await
    }

    /// Rework a single humanized section in place. Same-stage rework: the
    /// pipeline's stage never moves.
    pub async fn improve_section(&self, id: Uuid, kind: SectionKind) -> Result<Pipeline> {
        let _guard = self.begin_advance(id)?;
        let pipeline = self.load_for_stage(id, PipelineStage::Humanize).await?;
        let humanized = pipeline.humanized.clone().ok_or_else(|| {
            EngineError::validation(PipelineStage::Humanize, "no humanized artifact present")
        })?;

        let current_text = match kind {
            SectionKind::Introduction => humanized.introduction.clone(),
            SectionKind::Body => humanized.body.clone(),
            SectionKind::Conclusion => humanized.conclusion.clone(),
        };
        let (rewritten, section_score) = match self
            .humanizer
            .humanize_section(&pipeline.topic, kind, &current_text)
            .await
        {
            Ok(result) => result,
            Err(e) => return self.record_failure(id, PipelineStage::Humanize, e).await,
        };

        let mut pipeline = self.reload_unless_cancelled(id, PipelineStage::Humanize).await?;
        let mut sections = pipeline.humanized.clone().unwrap_or(humanized);
        match kind {
            SectionKind::Introduction => sections.introduction = rewritten,
            SectionKind::Body => sections.body = rewritten,
            SectionKind::Conclusion => sections.conclusion = rewritten,
        }
        pipeline.humanized = Some(sections);
        pipeline.humanization_score = Some(match pipeline.humanization_score {
            Some(existing) => (existing + section_score) / 2.0,
            None => section_score,
        });
        let stage = pipeline.stage;
        self.commit(
            pipeline,
            stage,
            format!("{} section reworked (score {section_score:.1})", kind.as_str()),
        )
        .await
    }

    /// SEO stage: derive metadata from the humanized draft.
    pub async fn run_seo(&self, id: Uuid) -> Result<Pipeline> {
        let _guard = self.begin_advance(id)?;
        let pipeline = self.load_for_stage(id, PipelineStage::Seo).await?;
        let sections = pipeline.humanized.clone().ok_or_else(|| {
            EngineError::validation(PipelineStage::Seo, "no humanized artifact present")
        })?;

        let focus = pipeline.selected_silo_key.clone();
        let meta = match self
            .seo
            .optimize(&pipeline.topic, &sections, focus.as_deref())
            .await
        {
            Ok(meta) => meta,
            Err(e) => return self.record_failure(id, PipelineStage::Seo, e).await,
        };

        let mut pipeline = self.reload_unless_cancelled(id, PipelineStage::Seo).await?;
        let slug = meta.slug.clone();
        pipeline.seo = Some(meta);
        self.commit(
            pipeline,
            PipelineStage::Seo,
            format!("seo metadata derived (slug '{slug}')"),
        )
        .await
    }

    /// Media stage: hero video plus section images through the provider
    /// fallback chains. The only stage allowed to degrade without blocking
    /// publication: exhausting every attempt still completes the stage.
    pub async fn run_media(&self, id: Uuid) -> Result<Pipeline> {
        let _guard = self.begin_advance(id)?;
        let pipeline = self.load_for_stage(id, PipelineStage::Media).await?;
        if pipeline.seo.is_none() {
            return Err(EngineError::validation(
                PipelineStage::Media,
                "no seo artifact present",
            ));
        }

        let section_prompts: Vec<String> = [
            SectionKind::Introduction,
            SectionKind::Body,
            SectionKind::Conclusion,
        ]
        .iter()
        .map(|kind| {
            format!(
                "Illustration for the {} of an article about {}",
                kind.as_str(),
                pipeline.topic
            )
        })
        .collect();

        let refs = self.media.generate_media(&pipeline.topic, &section_prompts).await;
        let degraded = refs.manual_upload_required;

        let mut pipeline = self.reload_unless_cancelled(id, PipelineStage::Media).await?;
        pipeline.media = Some(refs);
        let message = if degraded {
            "media stage complete with degraded assets; manual upload required"
        } else {
            "media assets generated and stored"
        };
        self.commit(pipeline, PipelineStage::Media, message).await
    }

    /// Move a media-complete pipeline into review. No external calls.
    pub async fn advance_to_review(&self, id: Uuid) -> Result<Pipeline> {
        let _guard = self.begin_advance(id)?;
        let pipeline = self.load_for_stage(id, PipelineStage::Review).await?;
        if pipeline.media.is_none() {
            return Err(EngineError::validation(
                PipelineStage::Review,
                "media stage has not completed",
            ));
        }
        self.commit(pipeline, PipelineStage::Review, "ready for review").await
    }

    /// Best-effort cancellation: sets the flag; an advance already past its
    /// suspension point may still complete, but its result is discarded.
    pub async fn cancel(&self, id: Uuid) -> Result<Pipeline> {
        let mut pipeline = self.store.get_pipeline(id).await?;
        pipeline.cancelled = true;
        pipeline.log_activity(pipeline.stage, "pipeline cancelled");
        let updated = self.store.update_pipeline(&pipeline).await?;
        info!("cancelled pipeline {}", id);
        Ok(updated)
    }

    /// Mark a pipeline abandoned. Audit trail: the record stays.
    pub async fn mark_failed(&self, id: Uuid, reason: impl Into<String>) -> Result<Pipeline> {
        let mut pipeline = self.store.get_pipeline(id).await?;
        pipeline.status = PipelineStatus::Failed;
        let reason = reason.into();
        pipeline.log_activity(pipeline.stage, format!("marked failed: {reason}"));
        let updated = self.store.update_pipeline(&pipeline).await?;
        warn!("pipeline {} marked failed: {}", id, reason);
        Ok(updated)
    }

    fn begin_advance(&self, id: Uuid) -> Result<AdvanceGuard> {
        let mut set = self
            .in_flight
            .lock()
            .map_err(|_| EngineError::General("in-flight registry poisoned".to_string()))?;
        if !set.insert(id) {
            return Err(EngineError::StageConflict {
                id,
                reason: "another stage advance is already in flight".to_string(),
            });
        }
        Ok(AdvanceGuard {
            id,
            set: self.in_flight.clone(),
        })
    }

    /// Load and validate before any external call: the pipeline must be
    /// live and must have reached the target's predecessor. Re-running a
    /// stage the pipeline has already passed is an idempotent overwrite of
    /// that stage's own artifact.
    async fn load_for_stage(&self, id: Uuid, target: PipelineStage) -> Result<Pipeline> {
        let pipeline = self.store.get_pipeline(id).await?;
        if pipeline.cancelled {
            return Err(EngineError::validation(target, "pipeline is cancelled"));
        }
        if pipeline.status == PipelineStatus::Failed {
            return Err(EngineError::validation(target, "pipeline is marked failed"));
        }
        if pipeline.status == PipelineStatus::Published {
            return Err(EngineError::validation(target, "pipeline is already published"));
        }
        if let Some(predecessor) = target.predecessor() {
            if pipeline.stage < predecessor {
                return Err(EngineError::validation(
                    target,
                    format!(
                        "stage {} requires {} to be complete (currently at {})",
                        target, predecessor, pipeline.stage
                    ),
                ));
            }
        }
        Ok(pipeline)
    }

    /// Re-read the pipeline after the suspension to the external service;
    /// a cancellation raised meanwhile discards the stage result.
    async fn reload_unless_cancelled(&self, id: Uuid, target: PipelineStage) -> Result<Pipeline> {
        let pipeline = self.store.get_pipeline(id).await?;
        if pipeline.cancelled {
            warn!(
                "pipeline {} cancelled during {} stage; discarding result",
                id, target
            );
            return Err(EngineError::validation(
                target,
                "pipeline cancelled while stage was in flight",
            ));
        }
        Ok(pipeline)
    }

    /// Persist the stage artifact, advance the stage marker (never
    /// backwards), and append the completion entry in one store update.
    async fn commit(
        &self,
        mut pipeline: Pipeline,
        target: PipelineStage,
        message: impl Into<String>,
    ) -> Result<Pipeline> {
        pipeline.stage = pipeline.stage.max(target);
        pipeline.log_activity(target, message);
        let updated = self.store.update_pipeline(&pipeline).await?;
        info!(
            "pipeline {} advanced through {} (now at {})",
            updated.id, target, updated.stage
        );
        Ok(updated)
    }

    /// Record an adapter failure in the activity log without touching the
    /// stage marker or any prior artifact, then surface the error.
    async fn record_failure(
        &self,
        id: Uuid,
        target: PipelineStage,
        error: EngineError,
    ) -> Result<Pipeline> {
        match self.store.get_pipeline(id).await {
            Ok(mut pipeline) => {
                pipeline.log_activity(target, format!("stage failed: {error}"));
                if let Err(persist_err) = self.store.update_pipeline(&pipeline).await {
                    error!(
                        "failed to record stage failure for pipeline {}: {}",
                        id, persist_err
                    );
                }
            }
            Err(load_err) => {
                error!("failed to load pipeline {} after stage failure: {}", id, load_err);
            }
        }
        warn!("pipeline {} stage {} failed: {}", id, target, error);
        Err(error)
    }
}
