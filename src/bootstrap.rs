//! Shard initialization.
//!
//! Loads the dataset, factorizes it and wires the resulting read-only model
//! into a [`ShardService`]. Runs to completion before the listener is bound,
//! so no request can observe a partially built model.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::config::{Config, ShardTuning};
use crate::error::Result;
use crate::model::{factorize, Dataset, DatasetFormat, RatingEngine, SerializedEngine};
use crate::server::{DispersionDelay, ShardService};
use crate::telemetry::ProcStatSampler;

/// Load the dataset and build the shared rating engine.
///
/// The dataset is dropped once the model exists.
pub fn build_engine(
    dataset_path: &Path,
    format: DatasetFormat,
    tuning: &ShardTuning,
) -> Result<Arc<dyn RatingEngine>> {
    info!("Loading {:?} dataset from {:?}", format, dataset_path);
    let dataset = Dataset::load(dataset_path, format)?;
    info!(
        "Loaded {} ratings ({} users x {} items)",
        dataset.len(),
        dataset.num_users(),
        dataset.num_items()
    );

    let model = factorize(&dataset, &tuning.factorization())?;
    drop(dataset);

    let engine: Arc<dyn RatingEngine> = if tuning.serialize_predictions {
        info!("Prediction calls serialized behind a process-wide lock");
        Arc::new(SerializedEngine::new(model))
    } else {
        Arc::new(model)
    };
    Ok(engine)
}

/// Wire an engine into a request handler using the configured tunables.
pub fn build_service(engine: Arc<dyn RatingEngine>, tuning: &ShardTuning) -> ShardService {
    let sampler = Arc::new(ProcStatSampler::new(tuning.proc_stat_path.clone()));
    ShardService::new(
        engine,
        sampler,
        DispersionDelay::new(tuning.dispersion_max_us),
    )
}

/// Full startup sequence for the configured shard.
pub fn initialize_shard(config: &Config) -> Result<ShardService> {
    info!(
        "Initializing shard {}/{}",
        config.args.shard_index, config.args.shard_count
    );

    let engine = build_engine(&config.args.dataset, config.args.dataset_format()?, &config.tuning)?;
    let (users, items) = engine.dimensions();
    info!(
        "Model ready: {} users x {} items, dispersion bound {}us",
        users, items, config.tuning.dispersion_max_us
    );

    Ok(build_service(engine, &config.tuning))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::server::proto;
    use std::io::Write;

    fn quick_tuning() -> ShardTuning {
        ShardTuning {
            dispersion_max_us: 0,
            factorization_iterations: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_build_engine_from_text_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0 0 5\n1 1 3\n2 0 1").unwrap();

        let engine = build_engine(file.path(), DatasetFormat::Text, &quick_tuning()).unwrap();
        assert_eq!(engine.dimensions(), (3, 2));
    }

    #[test]
    fn test_build_engine_serialized() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&Dataset::encode_binary(&[crate::model::Rating {
            user: 1,
            item: 0,
            value: 4.0,
        }]))
        .unwrap();

        let tuning = ShardTuning {
            serialize_predictions: true,
            ..quick_tuning()
        };
        let engine = build_engine(file.path(), DatasetFormat::Binary, &tuning).unwrap();
        assert_eq!(engine.dimensions(), (2, 1));
    }

    #[test]
    fn test_missing_dataset_is_startup_failure() {
        let err = build_engine(
            Path::new("/nonexistent/ratings.txt"),
            DatasetFormat::Text,
            &quick_tuning(),
        );
        assert!(matches!(err, Err(AppError::Dataset(_))));
    }

    #[test]
    fn test_built_service_answers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0 0 5\n0 1 3\n1 0 4").unwrap();

        let tuning = quick_tuning();
        let engine = build_engine(file.path(), DatasetFormat::Text, &tuning).unwrap();
        let service = build_service(engine, &tuning);

        let response = service.handle(proto::CfRequest {
            request_id: 11,
            user_id: Some(1),
            item_id: Some(1),
            util_request: None,
        });
        assert_eq!(response.request_id, 11);
        assert!(response.rating.unwrap().is_finite());
    }
}
