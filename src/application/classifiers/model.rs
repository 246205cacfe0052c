use super::features::{extract_features, FeatureScaler, FEATURE_COUNT, MIN_FEATURE_ROWS};
use crate::domain::market::{MarketData, MarketRegime, RegimeKind, StrategyKind};
use serde::Deserialize;
use smartcore::ensemble::random_forest_classifier::RandomForestClassifier;
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Confidence used when the bundle carries no per-class calibration.
const DEFAULT_CONFIDENCE: f64 = 0.8;

/// Hard gate: model output below this is discarded and the caller falls
/// back to the rule classifier. 0.70 exactly passes.
pub const CONFIDENCE_GATE: f64 = 0.70;

type ForestModel = RandomForestClassifier<f64, u32, DenseMatrix<f64>, Vec<u32>>;

/// Model bundle exported at training time as a single JSON document.
#[derive(Deserialize)]
struct ModelBundle {
    model: ForestModel,
    /// Label decoder: class index -> regime label string.
    labels: Option<Vec<String>>,
    feature_names: Option<Vec<String>>,
    /// Optional per-label calibrated confidence (out-of-bag precision).
    class_confidence: Option<HashMap<String, f64>>,
}

struct LoadedModel {
    bundle: ModelBundle,
    scaler: Option<FeatureScaler>,
}

static MODEL: OnceLock<Option<LoadedModel>> = OnceLock::new();

fn load_bundle(model_path: &Path, scaler_path: Option<&Path>) -> Option<LoadedModel> {
    let raw = match fs::read_to_string(model_path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(
                "Model bundle not available at {:?} ({}); model classifier disabled for this process",
                model_path, e
            );
            return None;
        }
    };
    let bundle: ModelBundle = match serde_json::from_str(&raw) {
        Ok(bundle) => bundle,
        Err(e) => {
            warn!("Failed to deserialize model bundle: {}", e);
            return None;
        }
    };
    if let Some(names) = &bundle.feature_names {
        if names.len() != FEATURE_COUNT {
            warn!(
                "Model bundle expects {} features, extractor produces {}; model classifier disabled",
                names.len(),
                FEATURE_COUNT
            );
            return None;
        }
    }

    let scaler = scaler_path.and_then(|path| match fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<FeatureScaler>(&raw) {
            Ok(scaler) => Some(scaler),
            Err(e) => {
                warn!("Failed to deserialize feature scaler: {}; using raw features", e);
                None
            }
        },
        Err(e) => {
            warn!("Scaler not available at {:?} ({}); using raw features", path, e);
            None
        }
    });

    info!("Loaded regime model bundle from {:?}", model_path);
    Some(LoadedModel { bundle, scaler })
}

/// Map a predicted label onto (regime, strategy) by keyword.
fn map_label(label: &str, confidence: f64) -> MarketRegime {
    let lower = label.to_lowercase();
    let (regime, strategy) = if lower.contains("trend") {
        (RegimeKind::Trend, StrategyKind::TrendFollowing)
    } else if lower.contains("scalp") {
        (RegimeKind::Volatile, StrategyKind::Scalping)
    } else if lower.contains("grid") {
        (RegimeKind::RangeTight, StrategyKind::Grid)
    } else {
        (RegimeKind::RangeWide, StrategyKind::MeanReversion)
    };
    MarketRegime::new(
        regime,
        strategy,
        confidence,
        format!("Model: {} ({:.0}%)", label, confidence * 100.0),
    )
}

/// Random-forest regime classifier, loaded lazily once per process.
///
/// Any failure here degrades to `None` so the factory falls back to the
/// rule classifier; the process never aborts over a missing artifact.
pub struct ModelClassifier;

impl ModelClassifier {
    pub fn classify(
        data: &MarketData,
        model_path: &Path,
        scaler_path: Option<&Path>,
    ) -> Option<MarketRegime> {
        if data.len() < MIN_FEATURE_ROWS {
            return None;
        }
        let loaded = MODEL
            .get_or_init(|| load_bundle(model_path, scaler_path))
            .as_ref()?;

        let features = extract_features(data)?;
        let features = match &loaded.scaler {
            Some(scaler) => scaler.transform(&features),
            None => features,
        };

        let matrix = match DenseMatrix::from_2d_vec(&vec![features]) {
            Ok(m) => m,
            Err(e) => {
                warn!("Feature matrix construction failed: {}", e);
                return None;
            }
        };
        let prediction = match loaded.bundle.model.predict(&matrix) {
            Ok(p) => *p.first()?,
            Err(e) => {
                warn!("Model inference failed for {}: {}", data.symbol, e);
                return None;
            }
        };

        let label = loaded
            .bundle
            .labels
            .as_ref()
            .and_then(|labels| labels.get(prediction as usize).cloned())
            .unwrap_or_else(|| prediction.to_string());
        let confidence = loaded
            .bundle
            .class_confidence
            .as_ref()
            .and_then(|m| m.get(&label).copied())
            .unwrap_or(DEFAULT_CONFIDENCE);

        if !Self::passes_gate(confidence) {
            return None;
        }
        Some(map_label(&label, confidence))
    }

    /// The 0.70 hard gate, inclusive at the boundary.
    pub fn passes_gate(confidence: f64) -> bool {
        confidence >= CONFIDENCE_GATE
    }
}
