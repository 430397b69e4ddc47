//! Table rendering for `analyze`

use analyst_pipeline::{PipelineTrace, Recommendation};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn join_or_none<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = items
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() {
        "none".to_string()
    } else {
        joined
    }
}

pub fn recommendation_table(rec: &Recommendation) -> Table {
    let mut table = table();
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec!["Ticker".to_string(), rec.ticker.clone()]);
    table.add_row(vec!["Signal".to_string(), rec.signal.to_string()]);
    table.add_row(vec!["Confidence".to_string(), format!("{:.0}%", rec.confidence * 100.0)]);
    table.add_row(vec!["Horizon".to_string(), rec.time_horizon.to_string()]);
    table.add_row(vec!["Summary".to_string(), rec.summary.clone()]);
    table.add_row(vec!["Reasoning".to_string(), rec.reasoning.clone()]);
    table.add_row(vec![
        "Risk flags".to_string(),
        join_or_none(rec.risk_flags.iter().map(|f| f.as_str())),
    ]);
    table.add_row(vec![
        "Stages".to_string(),
        join_or_none(rec.stages_used.iter().map(|s| s.name())),
    ]);
    table.add_row(vec!["Sources".to_string(), join_or_none(&rec.sources)]);
    if !rec.top_headlines.is_empty() {
        table.add_row(vec!["Headlines".to_string(), rec.top_headlines.join("\n")]);
    }
    table
}

/// Key metrics, or `None` when there are none to show
pub fn metrics_table(rec: &Recommendation) -> Option<Table> {
    if rec.key_metrics.is_empty() {
        return None;
    }
    let mut table = table();
    table.set_header(vec!["Metric", "Value"]);
    for (name, value) in &rec.key_metrics {
        table.add_row(vec![name.clone(), value.to_string()]);
    }
    Some(table)
}

pub fn trace_table(trace: &PipelineTrace) -> Table {
    let mut table = table();
    table.set_header(vec!["Trace", "Detail"]);
    table.add_row(vec!["Session".to_string(), trace.session_id.clone()]);
    table.add_row(vec![
        "States".to_string(),
        trace
            .transitions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" → "),
    ]);
    for diagnostic in &trace.diagnostics {
        table.add_row(vec![
            format!("Absent: {}", diagnostic.stage.name()),
            diagnostic.reason.clone(),
        ]);
    }
    for fallback in &trace.parse_fallbacks {
        table.add_row(vec!["Fallback".to_string(), fallback.clone()]);
    }
    table.add_row(vec!["Elapsed".to_string(), format!("{} ms", trace.elapsed_ms)]);
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_pipeline::{RiskFlag, StageKind, TimeHorizon, TradeSignal};
    use std::collections::{BTreeMap, BTreeSet};

    fn recommendation() -> Recommendation {
        Recommendation {
            ticker: "SBIN".to_string(),
            query: "SBIN outlook".to_string(),
            time_horizon: TimeHorizon::Positional,
            signal: TradeSignal::Hold,
            confidence: 0.42,
            reasoning: "Mixed signals".to_string(),
            summary: "Wait for a breakout".to_string(),
            key_metrics: BTreeMap::new(),
            risk_flags: BTreeSet::from([RiskFlag::Overbought]),
            sources: vec!["yahoo:SBIN".to_string()],
            stages_used: BTreeSet::from([StageKind::Technical]),
            top_headlines: Vec::new(),
        }
    }

    #[test]
    fn test_recommendation_table() {
        let rendered = recommendation_table(&recommendation()).to_string();
        assert!(rendered.contains("SBIN"));
        assert!(rendered.contains("42%"));
        assert!(rendered.contains("OVERBOUGHT"));
        assert!(!rendered.contains("Headlines"));
    }

    #[test]
    fn test_metrics_table_empty() {
        assert!(metrics_table(&recommendation()).is_none());
    }

    #[test]
    fn test_join_or_none() {
        assert_eq!(join_or_none(Vec::<String>::new()), "none");
        assert_eq!(join_or_none(["a", "b"]), "a, b");
    }
}
