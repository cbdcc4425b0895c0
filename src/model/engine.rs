//! Rating engine abstraction.
//!
//! The dispatcher only depends on [`RatingEngine`], so the factorized model
//! can be swapped for another backend, or wrapped in [`SerializedEngine`]
//! when a backend is not safe to call concurrently.

use parking_lot::Mutex;

use crate::error::{EntityKind, RequestError};
use crate::model::factorizer::FactorizedModel;
use crate::types::Query;

/// Predicts ratings against an already-built, read-only model.
///
/// Implementations are shared by every in-flight request and must not
/// mutate any state reachable from `&self` without synchronisation.
pub trait RatingEngine: Send + Sync {
    /// Predict the rating for a query.
    ///
    /// Out-of-range identifiers fail with [`RequestError::UnknownEntity`];
    /// a returned rating is always finite.
    fn predict(&self, query: Query) -> Result<f32, RequestError>;

    /// Trained `(users, items)` dimensions.
    fn dimensions(&self) -> (u32, u32);
}

impl RatingEngine for FactorizedModel {
    fn predict(&self, query: Query) -> Result<f32, RequestError> {
        if query.user.0 >= self.num_users() {
            return Err(RequestError::UnknownEntity {
                entity: EntityKind::User,
                id: query.user.0,
                bound: self.num_users(),
            });
        }
        if query.item.0 >= self.num_items() {
            return Err(RequestError::UnknownEntity {
                entity: EntityKind::Item,
                id: query.item.0,
                bound: self.num_items(),
            });
        }

        let rating = self.score(query.user.index(), query.item.index());
        if !rating.is_finite() {
            return Err(RequestError::Internal(format!(
                "non-finite prediction for {} / {}",
                query.user, query.item
            )));
        }

        Ok(rating)
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.num_users(), self.num_items())
    }
}

/// Serialises calls into an engine behind one process-wide lock.
///
/// The lock covers the inner `predict` call only; unpacking, dispersion and
/// packing of concurrent requests still run in parallel.
pub struct SerializedEngine<E> {
    inner: E,
    lock: Mutex<()>,
}

impl<E: RatingEngine> SerializedEngine<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            lock: Mutex::new(()),
        }
    }
}

impl<E: RatingEngine> RatingEngine for SerializedEngine<E> {
    fn predict(&self, query: Query) -> Result<f32, RequestError> {
        let _guard = self.lock.lock();
        self.inner.predict(query)
    }

    fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }
}
