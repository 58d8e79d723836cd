//! Multi-tier course search aggregation.
//!
//! An external semantic index returns three independent hit lists: one for
//! courses, one for modules, one for lessons. This module folds them into a
//! single ranking of courses.
//!
//! # Aggregation Algorithm
//!
//! 1. Resolve each hit to its parent course (course hits are their own
//!    parent). Hits with no resolvable parent, or a score that is not a
//!    finite value in `[0, 1]`, are dropped silently.
//! 2. Weight the raw score by tier: course × 1.0, module × 0.8, lesson × 0.6.
//! 3. Keep one entry per course: the highest weighted score, tagged with the
//!    tier that produced it. Earlier tiers win exact ties.
//! 4. Sort by weighted score descending. The sort is stable, so equal scores
//!    keep first-insertion order.
//!
//! [`aggregate`] is the pure core. [`search_courses`] wraps it with parent
//! resolution and title enrichment through a [`Store`].

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::store::Store;

/// Granularity at which the external index produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchTier {
    Course,
    Module,
    Lesson,
}

impl MatchTier {
    /// Fixed priority weight applied to raw scores of this tier.
    pub fn weight(self) -> f64 {
        match self {
            MatchTier::Course => 1.0,
            MatchTier::Module => 0.8,
            MatchTier::Lesson => 0.6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchTier::Course => "course",
            MatchTier::Module => "module",
            MatchTier::Lesson => "lesson",
        }
    }
}

/// A raw hit as returned by the external search service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub slug: String,
    pub score: f64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl SearchMatch {
    /// Parent course slug carried in the hit's metadata, if any.
    pub fn metadata_course(&self) -> Option<&str> {
        self.metadata
            .get("course_slug")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}

/// A hit reduced to what aggregation needs.
#[derive(Debug, Clone, PartialEq)]
pub struct TierMatch {
    /// Parent course id; `None` when it could not be resolved.
    pub course_id: Option<String>,
    pub raw_score: f64,
}

/// One aggregated course result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedMatch {
    pub course_id: String,
    pub score: f64,
    pub match_type: MatchTier,
}

/// Merge the three tier lists into one ranked list of courses.
pub fn aggregate(
    course_matches: &[TierMatch],
    module_matches: &[TierMatch],
    lesson_matches: &[TierMatch],
) -> Vec<AggregatedMatch> {
    let tiers = [
        (MatchTier::Course, course_matches),
        (MatchTier::Module, module_matches),
        (MatchTier::Lesson, lesson_matches),
    ];

    let mut results: Vec<AggregatedMatch> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (tier, matches) in tiers {
        for m in matches {
            let Some(course_id) = m.course_id.as_deref().filter(|id| !id.is_empty()) else {
                continue;
            };
            if !(0.0..=1.0).contains(&m.raw_score) {
                continue;
            }
            let weighted = m.raw_score * tier.weight();

            match index.get(course_id) {
                Some(&i) => {
                    let entry = &mut results[i];
                    if weighted > entry.score {
                        entry.score = weighted;
                        entry.match_type = tier;
                    }
                }
                None => {
                    index.insert(course_id.to_string(), results.len());
                    results.push(AggregatedMatch {
                        course_id: course_id.to_string(),
                        score: weighted,
                        match_type: tier,
                    });
                }
            }
        }
    }

    // Scores are finite here, so `partial_cmp` never returns `None`.
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results
}

/// The three raw hit lists of a single search request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub course: Vec<SearchMatch>,
    #[serde(default)]
    pub module: Vec<SearchMatch>,
    #[serde(default)]
    pub lesson: Vec<SearchMatch>,
}

/// Result filtering, decoupled from application config.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Maximum results to return.
    pub final_limit: usize,
    /// Drop results whose weighted score is below this value.
    pub min_score: f64,
}

/// An aggregated result enriched with catalog data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseSearchResult {
    pub course_id: String,
    pub score: f64,
    pub match_type: MatchTier,
    /// `None` when the slug is not in the local catalog.
    pub course_title: Option<String>,
}

/// Resolve parents through `store`, aggregate, enrich, filter and truncate.
pub async fn search_courses<S: Store + ?Sized>(
    store: &S,
    req: &SearchRequest,
    params: &SearchParams,
) -> Result<Vec<CourseSearchResult>> {
    let course = resolve_tier(store, MatchTier::Course, &req.course).await?;
    let module = resolve_tier(store, MatchTier::Module, &req.module).await?;
    let lesson = resolve_tier(store, MatchTier::Lesson, &req.lesson).await?;

    let mut results = Vec::new();
    for m in aggregate(&course, &module, &lesson) {
        if m.score < params.min_score {
            continue;
        }
        if results.len() >= params.final_limit {
            break;
        }
        let course_title = store.get_course(&m.course_id).await?.map(|c| c.title);
        results.push(CourseSearchResult {
            course_id: m.course_id,
            score: m.score,
            match_type: m.match_type,
            course_title,
        });
    }
    Ok(results)
}

/// Resolve every hit of one tier to its parent course slug.
///
/// Course hits are their own parent. Module and lesson hits use
/// `metadata.course_slug` when present and fall back to the catalog.
pub async fn resolve_tier<S: Store + ?Sized>(
    store: &S,
    tier: MatchTier,
    matches: &[SearchMatch],
) -> Result<Vec<TierMatch>> {
    let mut out = Vec::with_capacity(matches.len());
    for m in matches {
        let course_id = match tier {
            MatchTier::Course => Some(m.slug.clone()).filter(|s| !s.is_empty()),
            MatchTier::Module | MatchTier::Lesson => match m.metadata_course() {
                Some(slug) => Some(slug.to_string()),
                None if m.slug.is_empty() => None,
                None => store.resolve_parent_course(tier, &m.slug).await?,
            },
        };
        out.push(TierMatch {
            course_id,
            raw_score: m.score,
        });
    }
    Ok(out)
}
