//! Non-negative matrix factorization of the rating matrix.
//!
//! Only observed entries contribute to the updates, so the factorization
//! works directly on the rating triples without materialising the dense
//! `users × items` matrix.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::constants::factorization::{
    DEFAULT_ITERATIONS, DEFAULT_RANK, DEFAULT_SEED, EPSILON, MAX_FACTOR_CELLS,
};
use crate::error::{AppError, Result};
use crate::model::dataset::Dataset;

/// Factorization hyper-parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactorizationParams {
    /// Latent dimension shared by user and item factors.
    pub rank: usize,
    /// Alternating update sweeps.
    pub iterations: usize,
    /// Seed for factor initialisation.
    pub seed: u64,
}

impl Default for FactorizationParams {
    fn default() -> Self {
        Self {
            rank: DEFAULT_RANK,
            iterations: DEFAULT_ITERATIONS,
            seed: DEFAULT_SEED,
        }
    }
}

/// Read-only factor matrices `W (users × rank)` and `Hᵀ (items × rank)`.
#[derive(Debug, Clone)]
pub struct FactorizedModel {
    num_users: u32,
    num_items: u32,
    rank: usize,
    user_factors: Vec<f32>,
    item_factors: Vec<f32>,
}

impl FactorizedModel {
    /// Assemble a model from precomputed row-major factors.
    pub fn from_factors(
        num_users: u32,
        num_items: u32,
        rank: usize,
        user_factors: Vec<f32>,
        item_factors: Vec<f32>,
    ) -> Result<Self> {
        if rank == 0 {
            return Err(AppError::Model("rank must be at least 1".to_string()));
        }
        if user_factors.len() != num_users as usize * rank {
            return Err(AppError::Model(format!(
                "expected {} user factors, got {}",
                num_users as usize * rank,
                user_factors.len()
            )));
        }
        if item_factors.len() != num_items as usize * rank {
            return Err(AppError::Model(format!(
                "expected {} item factors, got {}",
                num_items as usize * rank,
                item_factors.len()
            )));
        }

        Ok(Self {
            num_users,
            num_items,
            rank,
            user_factors,
            item_factors,
        })
    }

    pub fn num_users(&self) -> u32 {
        self.num_users
    }

    pub fn num_items(&self) -> u32 {
        self.num_items
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Latent row of a user. Caller guarantees the index is in range.
    pub(crate) fn user_row(&self, user: usize) -> &[f32] {
        &self.user_factors[user * self.rank..(user + 1) * self.rank]
    }

    /// Latent row of an item. Caller guarantees the index is in range.
    pub(crate) fn item_row(&self, item: usize) -> &[f32] {
        &self.item_factors[item * self.rank..(item + 1) * self.rank]
    }

    /// Reconstruction `W[user] · H[:, item]`.
    pub(crate) fn score(&self, user: usize, item: usize) -> f32 {
        dot(self.user_row(user), self.item_row(item))
    }

    /// Root-mean-square error over the given dataset's observations.
    pub fn rmse(&self, dataset: &Dataset) -> f32 {
        let sq: f64 = dataset
            .ratings()
            .iter()
            .map(|r| {
                let err = self.score(r.user as usize, r.item as usize) - r.value;
                (err as f64) * (err as f64)
            })
            .sum();
        (sq / dataset.len() as f64).sqrt() as f32
    }
}

/// Factorize the dataset into non-negative user and item factors.
///
/// Uses multiplicative updates restricted to observed entries; the factors
/// stay non-negative as long as every rating is.
pub fn factorize(dataset: &Dataset, params: &FactorizationParams) -> Result<FactorizedModel> {
    if params.rank == 0 || params.iterations == 0 {
        return Err(AppError::Model(
            "rank and iterations must both be at least 1".to_string(),
        ));
    }
    if let Some(neg) = dataset.ratings().iter().find(|r| r.value < 0.0) {
        return Err(AppError::Model(format!(
            "negative rating {} for user {}, item {} cannot be factorized non-negatively",
            neg.value, neg.user, neg.item
        )));
    }

    let rank = params.rank;
    let users = dataset.num_users() as usize;
    let items = dataset.num_items() as usize;

    let mean = dataset.ratings().iter().map(|r| r.value as f64).sum::<f64>()
        / dataset.len() as f64;
    // Scale the initial factors so that W·H starts near the mean rating.
    let scale = ((mean.max(EPSILON as f64)) / rank as f64).sqrt() as f32;

    let cells = users
        .checked_add(items)
        .and_then(|rows| rows.checked_mul(rank))
        .filter(|&cells| cells <= MAX_FACTOR_CELLS)
        .ok_or_else(|| {
            AppError::Model(format!(
                "{} users x {} items at rank {} exceeds the factor limit of {} cells",
                users, items, rank, MAX_FACTOR_CELLS
            ))
        })?;
    debug!("Allocating {} factor cells", cells);

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut w = alloc_factors(users * rank)?;
    w.extend((0..users * rank).map(|_| rng.random_range(0.5f32..1.5) * scale));
    let mut h = alloc_factors(items * rank)?;
    h.extend((0..items * rank).map(|_| rng.random_range(0.5f32..1.5) * scale));

    let mut numer = alloc_factors(users.max(items) * rank)?;
    let mut denom = alloc_factors(users.max(items) * rank)?;

    for iteration in 0..params.iterations {
        // W ← W ∘ (R·Hᵀ) / ((W·H)·Hᵀ), accumulated over observed entries.
        accumulate(dataset, rank, &w, &h, Side::User, &mut numer, &mut denom, users);
        apply(&mut w, &numer, &denom);

        // H ← H ∘ (Wᵀ·R) / (Wᵀ·(W·H)).
        accumulate(dataset, rank, &w, &h, Side::Item, &mut numer, &mut denom, items);
        apply(&mut h, &numer, &denom);

        if iteration % 10 == 9 {
            debug!("Factorization sweep {} complete", iteration + 1);
        }
    }

    if w.iter().chain(h.iter()).any(|v| !v.is_finite()) {
        return Err(AppError::Model(
            "factorization diverged to non-finite factors".to_string(),
        ));
    }

    let model = FactorizedModel::from_factors(
        dataset.num_users(),
        dataset.num_items(),
        rank,
        w,
        h,
    )?;
    info!(
        "Factorized {} ratings into rank-{} model ({} users x {} items), training RMSE {:.4}",
        dataset.len(),
        rank,
        model.num_users(),
        model.num_items(),
        model.rmse(dataset)
    );

    Ok(model)
}

#[derive(Clone, Copy)]
enum Side {
    User,
    Item,
}

#[allow(clippy::too_many_arguments)]
fn accumulate(
    dataset: &Dataset,
    rank: usize,
    w: &[f32],
    h: &[f32],
    side: Side,
    numer: &mut Vec<f32>,
    denom: &mut Vec<f32>,
    rows: usize,
) {
    numer.clear();
    numer.resize(rows * rank, 0.0);
    denom.clear();
    denom.resize(rows * rank, 0.0);

    for r in dataset.ratings() {
        let u = r.user as usize * rank;
        let i = r.item as usize * rank;
        let wu = &w[u..u + rank];
        let hi = &h[i..i + rank];
        let pred = dot(wu, hi);

        let (row, other) = match side {
            Side::User => (u, hi),
            Side::Item => (i, wu),
        };
        for k in 0..rank {
            numer[row + k] += r.value * other[k];
            denom[row + k] += pred * other[k];
        }
    }
}

fn apply(factors: &mut [f32], numer: &[f32], denom: &[f32]) {
    for ((f, n), d) in factors.iter_mut().zip(numer).zip(denom) {
        // Rows without observations keep their initial values.
        if *d > 0.0 {
            *f *= n / (d + EPSILON);
        }
    }
}

/// Empty buffer with room for `len` factors, or a startup error if the
/// allocation is refused.
fn alloc_factors(len: usize) -> Result<Vec<f32>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|e| {
        AppError::Model(format!("cannot allocate {} factor cells: {}", len, e))
    })?;
    Ok(buf)
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::dataset::Rating;

    fn small_dataset() -> Dataset {
        Dataset::parse_text("0 0 5\n0 1 3\n1 0 4\n1 1 1\n2 0 1\n2 1 5\n").unwrap()
    }

    #[test]
    fn test_factorize_fits_observations() {
        let ds = small_dataset();
        let params = FactorizationParams { iterations: 200, ..Default::default() };
        let model = factorize(&ds, &params).unwrap();

        assert_eq!(model.num_users(), 3);
        assert_eq!(model.num_items(), 2);
        assert_eq!(model.rank(), DEFAULT_RANK);
        assert!(model.rmse(&ds) < 1.0, "rmse {}", model.rmse(&ds));
    }

    #[test]
    fn test_factorize_is_deterministic() {
        let ds = small_dataset();
        let params = FactorizationParams::default();
        let a = factorize(&ds, &params).unwrap();
        let b = factorize(&ds, &params).unwrap();

        assert_eq!(a.score(2, 1), b.score(2, 1));
    }

    #[test]
    fn test_factors_stay_non_negative() {
        let ds = small_dataset();
        let model = factorize(&ds, &FactorizationParams { iterations: 20, ..Default::default() }).unwrap();

        for u in 0..3 {
            assert!(model.user_row(u).iter().all(|v| *v >= 0.0));
        }
        for i in 0..2 {
            assert!(model.item_row(i).iter().all(|v| *v >= 0.0));
        }
    }

    #[test]
    fn test_rejects_negative_ratings_and_zero_rank() {
        let ds = Dataset::from_ratings(vec![Rating { user: 0, item: 0, value: -1.0 }]).unwrap();
        assert!(matches!(
            factorize(&ds, &FactorizationParams::default()),
            Err(AppError::Model(_))
        ));

        let ds = small_dataset();
        let params = FactorizationParams { rank: 0, ..Default::default() };
        assert!(factorize(&ds, &params).is_err());
    }

    #[test]
    fn test_oversized_dimensions_are_rejected() {
        let dataset = Dataset::from_ratings(vec![
            Rating { user: 0, item: 0, value: 1.0 },
            Rating { user: u32::MAX - 1, item: 0, value: 2.0 },
        ])
        .unwrap();
        assert_eq!(dataset.num_users(), u32::MAX);

        let err = factorize(&dataset, &FactorizationParams::default()).unwrap_err();
        assert!(matches!(err, AppError::Model(ref msg) if msg.contains("factor limit")));
    }

    #[test]
    fn test_from_factors_validates_shape() {
        assert!(FactorizedModel::from_factors(2, 1, 2, vec![1.0; 4], vec![1.0; 2]).is_ok());
        assert!(FactorizedModel::from_factors(2, 1, 2, vec![1.0; 3], vec![1.0; 2]).is_err());
        assert!(FactorizedModel::from_factors(2, 1, 2, vec![1.0; 4], vec![1.0; 3]).is_err());
    }
}
