//! Selection Engine
//!
//! Picks one provider from the ranked scores. On a retry the provider that
//! just failed is dropped first unless it is the only one left. Qualified
//! candidates are those at or above the context's quality threshold (the top
//! three when none qualify); the draw is weighted by total score over the top 20% so the
//! single best provider is not hit by every request.

use crate::context::RoutingContext;
use crate::error::{Result, RoutingError};
use crate::scoring::ProviderScore;
use rand::Rng;

/// Candidates kept when nothing meets the quality threshold
const FALLBACK_POOL: usize = 3;

/// Select one provider from `scores`, which must be sorted descending
pub fn select_provider<R: Rng + ?Sized>(
    scores: &[ProviderScore],
    context: &RoutingContext,
    rng: &mut R,
) -> Result<ProviderScore> {
    if scores.is_empty() {
        return Err(RoutingError::NoEligibleProvider);
    }

    let mut eligible: Vec<&ProviderScore> = scores.iter().collect();
    if context.is_retry()
        && let Some(previous) = context.previous_provider.as_deref()
        && eligible.iter().any(|s| s.provider != previous)
    {
        eligible.retain(|s| s.provider != previous);
    }

    let mut qualified: Vec<&ProviderScore> = eligible
        .iter()
        .copied()
        .filter(|s| s.total >= context.quality_threshold)
        .collect();
    if qualified.is_empty() {
        qualified = eligible.into_iter().take(FALLBACK_POOL).collect();
    }

    let pool_size = (qualified.len() / 5).max(1);
    let pool = &qualified[..pool_size];
    let chosen = weighted_draw(pool, rng);

    tracing::debug!(
        provider = %chosen.provider,
        score = chosen.total,
        pool = pool_size,
        qualified = qualified.len(),
        "Selected provider"
    );
    Ok(chosen.clone())
}

fn weighted_draw<'a, R: Rng + ?Sized>(pool: &[&'a ProviderScore], rng: &mut R) -> &'a ProviderScore {
    let total: f64 = pool.iter().map(|s| s.total.max(0.0)).sum();
    if pool.len() == 1 || total <= 0.0 {
        return pool[0];
    }

    let mut point = rng.random_range(0.0..total);
    for score in pool {
        let weight = score.total.max(0.0);
        if point < weight {
            return score;
        }
        point -= weight;
    }
    // Float rounding can leave the point just past the last bucket
    pool[pool.len() - 1]
}
