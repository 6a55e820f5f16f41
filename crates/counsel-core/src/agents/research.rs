use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::{ResearchFinding, SearchQuerySet, truncate_chars};
use crate::ports::{DynModel, DynSearch};

pub const NO_RESEARCH_FOUND: &str = "No relevant external research found.";
pub const RESEARCH_FAILED: &str = "Research failed due to technical issues.";

/// Result of one research run. Both degraded variants are valid input for
/// the analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResearchOutcome {
    Findings(Vec<ResearchFinding>),
    /// Every search failed or returned nothing.
    NoResults,
    /// Query extraction itself failed.
    Failed(String),
}

impl ResearchOutcome {
    /// Text handed to downstream prompts.
    pub fn render(&self) -> String {
        match self {
            ResearchOutcome::Findings(findings) => findings
                .iter()
                .map(ResearchFinding::render)
                .collect::<Vec<_>>()
                .join("\n"),
            ResearchOutcome::NoResults => NO_RESEARCH_FOUND.to_string(),
            ResearchOutcome::Failed(_) => RESEARCH_FAILED.to_string(),
        }
    }

    pub fn findings(&self) -> &[ResearchFinding] {
        match self {
            ResearchOutcome::Findings(findings) => findings,
            _ => &[],
        }
    }

    pub fn is_degraded(&self) -> bool {
        !matches!(self, ResearchOutcome::Findings(_))
    }
}

#[derive(Debug, Clone)]
pub struct ResearchSettings {
    /// Leading characters of the document shown to the extraction prompt.
    pub context_chars: usize,
    pub max_results_per_query: usize,
    pub search_depth: String,
    pub max_findings: usize,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            context_chars: 2000,
            max_results_per_query: 5,
            search_depth: "basic".into(),
            max_findings: 10,
        }
    }
}

/// Derives search queries from the document and gathers external legal
/// material for them.
pub struct ResearchAgent {
    model: DynModel,
    search: DynSearch,
    settings: ResearchSettings,
}

impl ResearchAgent {
    pub fn new(model: DynModel, search: DynSearch, settings: ResearchSettings) -> Self {
        Self {
            model,
            search,
            settings,
        }
    }

    pub async fn run(&self, document_context: &str) -> ResearchOutcome {
        let prompt = extraction_prompt(truncate_chars(document_context, self.settings.context_chars));
        let reply = match self.model.generate(&prompt, None).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(error = %err, "search query extraction failed");
                return ResearchOutcome::Failed(err.to_string());
            }
        };

        let queries = SearchQuerySet::parse(&reply);
        if queries.is_empty() {
            warn!("query extraction returned no usable queries");
            return ResearchOutcome::NoResults;
        }
        info!(count = queries.len(), queries = ?queries.queries, "generated research queries");

        // join_all keeps query order, so the findings cap is deterministic.
        let searches = queries.queries.iter().map(|query| async move {
            let phrased = format!("legal {query} law judgment precedent");
            let result = self
                .search
                .search(
                    &phrased,
                    self.settings.max_results_per_query,
                    &self.settings.search_depth,
                )
                .await;
            (query, result)
        });

        let mut findings = Vec::new();
        for (query, result) in join_all(searches).await {
            match result {
                Ok(hits) => {
                    debug!(%query, hits = hits.len(), "search completed");
                    findings.extend(
                        hits.into_iter()
                            .map(|hit| ResearchFinding::new(hit.title, hit.url, &hit.content, query)),
                    );
                }
                Err(err) => warn!(%query, error = %err, "search failed; skipping query"),
            }
        }

        findings.truncate(self.settings.max_findings);
        if findings.is_empty() {
            ResearchOutcome::NoResults
        } else {
            ResearchOutcome::Findings(findings)
        }
    }
}

fn extraction_prompt(context: &str) -> String {
    format!(
        "From the legal document excerpt below, identify the key legal concepts, statutes, \
jurisdictions, named parties or cases, and areas of law involved.\n\n\
Return 3-5 focused web search queries that would surface relevant laws, judgments, \
precedents or commentary. Reply with one query per line and nothing else.\n\n\
Document excerpt:\n---\n{context}\n---"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::SearchHit;
    use crate::stub::{StubModel, StubSearch};
    use std::sync::Arc;

    fn hit(n: usize) -> SearchHit {
        SearchHit {
            title: format!("Judgment {n}"),
            url: format!("https://courts.example/{n}"),
            content: "The tribunal held that the deposit cap applies.".into(),
        }
    }

    #[tokio::test]
    async fn all_searches_failing_yields_no_results_sentinel() {
        let model = Arc::new(StubModel::new("fast").with_default_text("deposit cap\nnotice period"));
        let search = Arc::new(StubSearch::failing());
        let agent = ResearchAgent::new(model, search.clone(), ResearchSettings::default());

        let outcome = agent.run("Tenancy agreement text").await;

        assert_eq!(outcome, ResearchOutcome::NoResults);
        assert_eq!(outcome.render(), "No relevant external research found.");
        assert_eq!(search.queries().len(), 2);
    }

    #[tokio::test]
    async fn extraction_failure_yields_failed_sentinel() {
        let model = Arc::new(StubModel::new("fast").failing_by_default());
        let agent = ResearchAgent::new(model, Arc::new(StubSearch::new()), ResearchSettings::default());

        let outcome = agent.run("anything").await;

        assert!(matches!(outcome, ResearchOutcome::Failed(_)));
        assert_eq!(outcome.render(), "Research failed due to technical issues.");
    }

    #[tokio::test]
    async fn findings_are_capped_and_keep_query_order() {
        let model = Arc::new(
            StubModel::new("fast").with_default_text("- first\n- second\n- third\n- fourth\n- fifth\n- sixth"),
        );
        let search = Arc::new(StubSearch::new().with_hits((1..=3).map(hit).collect()));
        let agent = ResearchAgent::new(model, search.clone(), ResearchSettings::default());

        let outcome = agent.run("Lease").await;

        let findings = outcome.findings();
        assert_eq!(findings.len(), 10);
        assert_eq!(findings[0].originating_query, "first");
        assert_eq!(findings[3].originating_query, "second");
        assert_eq!(findings[9].originating_query, "fourth");
        assert_eq!(search.queries().len(), 5);
        assert!(
            search
                .queries()
                .iter()
                .any(|q| q == "legal first law judgment precedent")
        );
    }

    #[tokio::test]
    async fn one_failing_query_is_skipped() {
        let model = Arc::new(StubModel::new("fast").with_default_text("good\nbad"));
        let search = Arc::new(StubSearch::new().with_hits(vec![hit(1)]).fail_on("bad"));
        let agent = ResearchAgent::new(model, search, ResearchSettings::default());

        let outcome = agent.run("Lease").await;

        let findings = outcome.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].originating_query, "good");
        assert!(outcome.render().contains("**Query Context**: good"));
    }

    #[tokio::test]
    async fn blank_extraction_skips_searching() {
        let model = Arc::new(StubModel::new("fast").with_default_text("\n   \n\n"));
        let search = Arc::new(StubSearch::new().with_hits(vec![hit(1)]));
        let agent = ResearchAgent::new(model, search.clone(), ResearchSettings::default());

        let outcome = agent.run("Lease").await;

        assert_eq!(outcome, ResearchOutcome::NoResults);
        assert!(search.queries().is_empty());
    }

    #[tokio::test]
    async fn extraction_sees_only_leading_context() {
        let model = Arc::new(StubModel::new("fast").with_default_text(""));
        let agent = ResearchAgent::new(model.clone(), Arc::new(StubSearch::new()), ResearchSettings::default());
        let context = format!("{}TAIL-MARKER", "x".repeat(2000));

        let outcome = agent.run(&context).await;

        assert_eq!(outcome, ResearchOutcome::NoResults);
        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].prompt.contains("TAIL-MARKER"));
    }
}
