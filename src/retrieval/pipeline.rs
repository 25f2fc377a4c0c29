//! Retrieval pipeline: expansion, fan-out, fusion, capping, reformulation

use super::reformulation::{ReformulationController, ReformulationEvent, ReformulationState};
use super::{
    diversity, reciprocal_rank_fusion, AttemptRecord, CandidateSource, ListStatus,
    RetrievalError, RetrievalRun, SourceError, SourceKind, SourceList, Termination,
};
use crate::config::{PrefixMode, RetrievalConfig};
use crate::query::{FilterSet, Query, QueryExpander, QueryNormalizer, QueryRewriter};
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Single entry point from a user query to a fused, capped candidate list
pub struct RetrievalPipeline {
    sources: Vec<Arc<dyn CandidateSource>>,
    rewriter: Arc<dyn QueryRewriter>,
    normalizer: QueryNormalizer,
    expander: QueryExpander,
    config: RetrievalConfig,
}

impl RetrievalPipeline {
    /// Create a pipeline over a set of candidate sources
    ///
    /// At most one source per [`SourceKind`]; at least one of vector,
    /// lexical or metadata must be present.
    pub fn new(
        mut sources: Vec<Arc<dyn CandidateSource>>,
        rewriter: Arc<dyn QueryRewriter>,
        config: RetrievalConfig,
    ) -> Result<Self, RetrievalError> {
        if !(config.rrf_k.is_finite() && config.rrf_k > 0.0) {
            return Err(RetrievalError::Configuration(format!(
                "rrf_k must be a positive number, got {}",
                config.rrf_k
            )));
        }

        if config.diversity.max_per_document == 0 {
            return Err(RetrievalError::Configuration(
                "max_per_document must be at least 1".to_string(),
            ));
        }

        sources.sort_by_key(|s| s.kind());
        if sources.windows(2).any(|w| w[0].kind() == w[1].kind()) {
            return Err(RetrievalError::Configuration(
                "Each source kind may be registered once".to_string(),
            ));
        }

        let has_primary = sources.iter().any(|s| {
            matches!(
                s.kind(),
                SourceKind::Vector | SourceKind::Lexical | SourceKind::Metadata
            )
        });
        if !has_primary {
            return Err(RetrievalError::Configuration(
                "At least one vector, lexical or metadata source is required".to_string(),
            ));
        }

        let normalizer = QueryNormalizer::new(config.max_query_chars);
        let expander = QueryExpander::new(rewriter.clone(), normalizer.clone(), &config.expansion);

        Ok(Self {
            sources,
            rewriter,
            normalizer,
            expander,
            config,
        })
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &QueryNormalizer {
        &self.normalizer
    }

    /// Normalize raw text and retrieve
    pub async fn retrieve_text(
        &self,
        raw: &str,
        filters: &FilterSet,
    ) -> Result<RetrievalRun, RetrievalError> {
        let query = self.normalizer.normalize(raw)?;
        self.retrieve(&query, filters).await
    }

    /// Run the full pipeline for one query
    pub async fn retrieve(
        &self,
        query: &Query,
        filters: &FilterSet,
    ) -> Result<RetrievalRun, RetrievalError> {
        self.retrieve_with_cancellation(query, filters, &CancellationToken::new())
            .await
    }

    /// Run the full pipeline, stopping before any new attempt once
    /// `cancel` fires. The first attempt always runs to completion.
    pub async fn retrieve_with_cancellation(
        &self,
        query: &Query,
        filters: &FilterSet,
        cancel: &CancellationToken,
    ) -> Result<RetrievalRun, RetrievalError> {
        let run_id = Uuid::new_v4();
        tracing::info!(%run_id, "Retrieval started: {:?} (filters: {:?})", query.text(), filters);

        let mut controller =
            ReformulationController::new(self.config.min_results, self.config.retry_budget);
        let mut unavailable: BTreeSet<SourceKind> = BTreeSet::new();
        let mut consulted: BTreeSet<SourceKind> = BTreeSet::new();
        let mut degraded: BTreeSet<SourceKind> = BTreeSet::new();
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut current = query.clone();

        let mut state = controller.advance(ReformulationEvent::Start);
        let termination = loop {
            match state {
                ReformulationState::Searching { attempt } => {
                    let record = self
                        .run_attempt(run_id, attempt, &current, filters, &mut unavailable)
                        .await?;

                    for list in &record.lists {
                        consulted.insert(list.source);
                        if !list.is_ok() {
                            degraded.insert(list.source);
                        }
                    }

                    let result_count = record.result_count();
                    attempts.push(record);
                    state = controller.advance(ReformulationEvent::Completed {
                        result_count,
                        cancelled: cancel.is_cancelled(),
                    });
                }
                ReformulationState::Reformulating { attempt } => {
                    if cancel.is_cancelled() {
                        state = controller.advance(ReformulationEvent::Cancelled);
                        continue;
                    }
                    current = self.reformulate(run_id, &current, attempt + 1).await;
                    state = if cancel.is_cancelled() {
                        controller.advance(ReformulationEvent::Cancelled)
                    } else {
                        controller.advance(ReformulationEvent::Rewritten)
                    };
                }
                ReformulationState::Terminal(termination) => break termination,
                ReformulationState::Initial => {
                    state = controller.advance(ReformulationEvent::Start);
                }
            }
        };

        let candidates = best_attempt(&attempts)
            .map(|a| a.candidates.clone())
            .unwrap_or_default();

        match termination {
            Termination::Success => tracing::info!(
                %run_id,
                "Retrieval succeeded after {} attempt(s): {} candidates",
                attempts.len(),
                candidates.len()
            ),
            Termination::Exhausted => tracing::info!(
                %run_id,
                "Retrieval exhausted after {} attempt(s): {} candidates",
                attempts.len(),
                candidates.len()
            ),
            Termination::Cancelled => tracing::info!(
                %run_id,
                "Retrieval cancelled after {} attempt(s)",
                attempts.len()
            ),
        }

        Ok(RetrievalRun {
            run_id,
            query: query.clone(),
            filters: filters.clone(),
            attempts,
            candidates,
            termination,
            sources_consulted: consulted.into_iter().collect(),
            degraded_sources: degraded.into_iter().collect(),
        })
    }

    /// One attempt: expand, fan out, fuse once over every list, cap
    async fn run_attempt(
        &self,
        run_id: Uuid,
        attempt: u32,
        query: &Query,
        filters: &FilterSet,
        unavailable: &mut BTreeSet<SourceKind>,
    ) -> Result<AttemptRecord, RetrievalError> {
        let variants = self
            .expander
            .expand(query, self.config.expansion.variants)
            .await;

        // Phase 1: every primary source for every variant, concurrently
        let primary = self
            .sources
            .iter()
            .filter(|s| s.kind() != SourceKind::Prefix)
            .filter(|s| self.config.case_lookup || s.kind() != SourceKind::CaseLookup)
            .filter(|s| !unavailable.contains(&s.kind()));

        let mut calls = Vec::new();
        for source in primary {
            for (index, variant) in variants.iter().enumerate() {
                if source.applies_to(variant.text()) {
                    calls.push(self.call_source(source.as_ref(), index, variant.text(), filters));
                }
            }
        }
        let mut lists = join_all(calls).await;

        // Phase 2: prefix fallback, depending on how lexical search went
        if let Some(prefix) = self.prefix_source(unavailable) {
            let calls: Vec<_> = variants
                .iter()
                .enumerate()
                .filter(|(index, variant)| {
                    prefix.applies_to(variant.text()) && self.needs_prefix(&lists, *index)
                })
                .map(|(index, variant)| {
                    self.call_source(prefix.as_ref(), index, variant.text(), filters)
                })
                .collect();
            lists.extend(join_all(calls).await);
        }

        let succeeded = lists.iter().filter(|l| l.is_ok()).count();
        if succeeded == 0 {
            tracing::warn!(%run_id, "Attempt {}: no source answered ({} calls)", attempt, lists.len());
            return Err(RetrievalError::RetrievalTimeout {
                attempt,
                sources: lists.len(),
            });
        }

        for list in &lists {
            if list.status == ListStatus::Unavailable {
                unavailable.insert(list.source);
            }
            tracing::debug!(
                %run_id,
                "  {} / variant {}: {:?}, {} items",
                list.source,
                list.variant,
                list.status,
                list.items.len()
            );
        }

        lists.sort_by_key(|l| (l.source, l.variant));
        let ranked: Vec<_> = lists
            .iter()
            .filter(|l| l.is_ok())
            .map(|l| l.items.clone())
            .collect();

        let fused = reciprocal_rank_fusion(&ranked, self.config.rrf_k);
        let fused_count = fused.len();
        let candidates = diversity::apply(fused, &self.config.diversity);

        tracing::info!(
            %run_id,
            "Attempt {} ({:?}): {} variants, {}/{} lists ok, {} fused → {} after diversity cap",
            attempt,
            query.text(),
            variants.len(),
            succeeded,
            lists.len(),
            fused_count,
            candidates.len()
        );

        Ok(AttemptRecord {
            number: attempt,
            query: query.clone(),
            variants,
            lists,
            fused_count,
            candidates,
        })
    }

    fn prefix_source(&self, unavailable: &BTreeSet<SourceKind>) -> Option<&Arc<dyn CandidateSource>> {
        if self.config.prefix_mode == PrefixMode::Never || unavailable.contains(&SourceKind::Prefix) {
            return None;
        }
        self.sources.iter().find(|s| s.kind() == SourceKind::Prefix)
    }

    fn needs_prefix(&self, lists: &[SourceList], variant: usize) -> bool {
        match self.config.prefix_mode {
            PrefixMode::Never => false,
            PrefixMode::Always => true,
            PrefixMode::Fallback => {
                let lexical_hits = lists
                    .iter()
                    .find(|l| l.source == SourceKind::Lexical && l.variant == variant && l.is_ok())
                    .map(|l| l.items.len())
                    .unwrap_or(0);
                lexical_hits < self.config.prefix_fallback_below
            }
        }
    }

    fn limit_for(&self, kind: SourceKind) -> usize {
        match kind {
            SourceKind::CaseLookup => self.config.case_lookup_top_k,
            SourceKind::Vector => self.config.vector_top_k,
            SourceKind::Lexical | SourceKind::Prefix => self.config.lexical_top_k,
            SourceKind::Metadata => self.config.metadata_top_k,
        }
    }

    /// Call one source under its own timeout
    async fn call_source(
        &self,
        source: &dyn CandidateSource,
        variant: usize,
        text: &str,
        filters: &FilterSet,
    ) -> SourceList {
        let kind = source.kind();
        let timeout = Duration::from_millis(self.config.source_timeout_ms);
        let search = source.search(text, filters, self.limit_for(kind));

        let (status, items) = match tokio::time::timeout(timeout, search).await {
            Ok(Ok(items)) => (ListStatus::Ok, items),
            Ok(Err(SourceError::Unavailable(reason))) => {
                tracing::warn!("{} source unavailable: {}", kind, reason);
                (ListStatus::Unavailable, Vec::new())
            }
            Err(_) => {
                tracing::warn!(
                    "{} source timed out after {}ms",
                    kind,
                    self.config.source_timeout_ms
                );
                (ListStatus::TimedOut, Vec::new())
            }
        };

        SourceList {
            variant,
            source: kind,
            status,
            items,
        }
    }

    /// Broader rewrite of `query`; keeps the text when the rewriter fails
    async fn reformulate(&self, run_id: Uuid, query: &Query, next_attempt: u32) -> Query {
        let timeout = Duration::from_millis(self.config.expansion.timeout_ms);

        let rewritten = match tokio::time::timeout(timeout, self.rewriter.broaden(query.text())).await
        {
            Ok(Ok(text)) => match self.normalizer.canonical_text(&text) {
                Ok(text) => Some(text),
                Err(e) => {
                    tracing::warn!(%run_id, "Discarding reformulation: {}", e);
                    None
                }
            },
            Ok(Err(e)) => {
                tracing::warn!(%run_id, "Reformulation failed (non-critical): {}", e);
                None
            }
            Err(_) => {
                tracing::warn!(%run_id, "Reformulation timed out after {}ms", timeout.as_millis());
                None
            }
        };

        let text = rewritten.unwrap_or_else(|| query.text().to_string());
        tracing::info!(%run_id, "Reformulated for attempt {}: {:?} → {:?}", next_attempt, query.text(), text);
        query.reformulation(text, next_attempt)
    }
}

/// Attempt with the most candidates, earliest on ties
fn best_attempt(attempts: &[AttemptRecord]) -> Option<&AttemptRecord> {
    attempts
        .iter()
        .fold(None, |best: Option<&AttemptRecord>, attempt| match best {
            Some(b) if b.result_count() >= attempt.result_count() => Some(b),
            _ => Some(attempt),
        })
}
