use super::hub::{HubClient, ModelSession};
use super::{Capability, LoadCell};
use crate::error::CapabilityError;
use crate::model::{CapabilityInfo, LabelScore, Prediction, TaskInput, TaskKind};
use anyhow::Result;
use serde_json::{json, Value};

pub(crate) struct SentimentAnalyzer {
    hub: HubClient,
    model_name: String,
    session: LoadCell<ModelSession>,
}

impl SentimentAnalyzer {
    pub fn new(hub: HubClient, model_name: String) -> Self {
        Self {
            hub,
            model_name,
            session: LoadCell::new(),
        }
    }

    fn session(&self) -> Result<ModelSession> {
        self.session.get_or_try_init(|| {
            tracing::info!(model = %self.model_name, "loading text model");
            self.hub.connect(&self.model_name)
        })
    }
}

impl Capability for SentimentAnalyzer {
    fn id(&self) -> TaskKind {
        TaskKind::Sentiment
    }

    fn load(&self) -> Result<()> {
        self.session().map(|_| ())
    }

    fn process(&self, input: &TaskInput) -> Result<Prediction> {
        let TaskInput::Text(text) = input else {
            return Err(CapabilityError::InputMismatch {
                capability: self.id(),
                got: "image",
            }
            .into());
        };
        let session = self.session()?;
        let body = session.post_json(&json!({ "inputs": text }))?;
        parse_labels(body)
    }

    fn info(&self) -> CapabilityInfo {
        CapabilityInfo {
            model_name: self.model_name.clone(),
            loaded: self.session.is_loaded(),
            last_time: None,
        }
    }
}

/// Accepts `[{label, score}]` and the batched `[[{label, score}]]` shape.
fn parse_labels(body: Value) -> Result<Prediction> {
    let flat = match body {
        Value::Array(mut outer) if matches!(outer.first(), Some(Value::Array(_))) => {
            outer.swap_remove(0)
        }
        other => other,
    };
    let mut labels: Vec<LabelScore> = serde_json::from_value(flat)
        .map_err(|e| CapabilityError::Decode(format!("label list: {e}")))?;
    if labels.is_empty() {
        return Err(CapabilityError::Decode("no labels returned".into()).into());
    }
    labels.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(Prediction::Labels(labels))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_labels_are_sorted_by_score() {
        let p = parse_labels(json!([
            {"label": "Negative", "score": 0.1},
            {"label": "Very Positive", "score": 0.7},
            {"label": "Neutral", "score": 0.2},
        ]))
        .unwrap();
        assert_eq!(p.top_label().unwrap().label, "Very Positive");
    }

    #[test]
    fn nested_batch_is_unwrapped() {
        let p = parse_labels(json!([[{"label": "POSITIVE", "score": 0.95}]])).unwrap();
        assert_eq!(p.top_label().unwrap().score, 0.95);
    }

    #[test]
    fn caption_shaped_payload_is_a_decode_error() {
        assert!(parse_labels(json!([{"generated_text": "oops"}])).is_err());
        assert!(parse_labels(json!([])).is_err());
    }
}
