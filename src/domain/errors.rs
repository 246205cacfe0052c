use thiserror::Error;

/// Errors raised along the per-symbol analysis path.
///
/// Neither aborts the event loop: both degrade to "no signal" for the
/// affected symbol and are logged through the throttled path at the spawn
/// boundary. Classifier and strategy fallbacks are not errors at all; they
/// degrade in place (model -> rule classifier, disabled family ->
/// MeanReversion).
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("insufficient data for {symbol}: {rows} rows (need {needed})")]
    DataUnavailable {
        symbol: String,
        rows: usize,
        needed: usize,
    },

    #[error("external collaborator failed: {source}")]
    ExternalFailure {
        #[from]
        source: anyhow::Error,
    },
}

/// Reasons the risk shield vetoes a trade.
#[derive(Debug, Error, PartialEq)]
pub enum TradeVeto {
    #[error("BUY rejected: black swan protocol active")]
    BlackSwanActive,

    #[error("rejected: exposure {current:.2} >= ceiling {ceiling:.2}")]
    ExposureCeiling { current: f64, ceiling: f64 },

    #[error("BUY rejected: portfolio correlation {correlation:.2} > {limit:.2}")]
    CorrelationLimit { correlation: f64, limit: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_error_formatting() {
        let err = AnalysisError::DataUnavailable {
            symbol: "BTCUSDT".to_string(),
            rows: 12,
            needed: 50,
        };
        let msg = err.to_string();
        assert!(msg.contains("BTCUSDT"));
        assert!(msg.contains("12"));
        assert!(msg.contains("50"));
    }

    #[test]
    fn test_trade_veto_formatting() {
        let veto = TradeVeto::ExposureCeiling {
            current: 0.55,
            ceiling: 0.50,
        };
        assert!(veto.to_string().contains("0.55"));
    }
}
